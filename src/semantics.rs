//! Semantic checking: declaration recording, scope tracking, type
//! inference and arity checks. Errors are collected as formatted messages;
//! the driver prints them to stderr and decides the exit code from the
//! final count.

use crate::ast::{
    BinaryOperator, Body, Declaration, DeclarationKind, Expression, ExpressionKind, FunctionDecl,
    Inference, Program, Statement, StatementKind, UnaryOperator, VectorVarDecl, WriteArgument,
};
use crate::consteval;
use symtab::{SemanticType, Sym, SymData, SymbolTable, VarData};

enum OperationType {
    Arithmetic,
    Comparison,
    Logical,
}

fn binary_operation_type(operator: BinaryOperator) -> OperationType {
    match operator {
        BinaryOperator::Add | BinaryOperator::Sub | BinaryOperator::Mul | BinaryOperator::Div => {
            OperationType::Arithmetic
        }
        BinaryOperator::LessThan
        | BinaryOperator::GreaterThan
        | BinaryOperator::LessOrEquals
        | BinaryOperator::GreaterOrEquals
        | BinaryOperator::Equals
        | BinaryOperator::NotEqual => OperationType::Comparison,
        BinaryOperator::And | BinaryOperator::Or => OperationType::Logical,
    }
}

fn unary_operation_type(operator: UnaryOperator) -> OperationType {
    match operator {
        UnaryOperator::Not => OperationType::Logical,
    }
}

/// Runs all semantic passes over `program` and returns the collected error
/// messages, in source order of detection.
pub fn check_program(table: &mut SymbolTable, program: &mut Program) -> Vec<String> {
    let mut checker = Checker {
        table,
        messages: Vec::new(),
    };

    for declaration in &program.declarations {
        checker.fill_symbol_table(declaration);
    }
    for declaration in &mut program.declarations {
        checker.check_declaration_init(declaration);
    }
    for declaration in &mut program.declarations {
        if let DeclarationKind::Function(function) = &mut declaration.kind {
            checker.check_function(function);
        }
    }

    checker.messages
}

struct Checker<'t> {
    table: &'t mut SymbolTable,
    messages: Vec<String>,
}

impl<'t> Checker<'t> {
    fn type_mismatch(&mut self, expected: SemanticType, found: SemanticType, line: u32) {
        self.messages.push(format!(
            "expected type {} but found type {} at line {}",
            expected, found, line
        ));
    }

    fn unexpected_type(&mut self, unexpected: SemanticType, line: u32) {
        self.messages
            .push(format!("unexpected type {} at line {}", unexpected, line));
    }

    fn symbol_kind_mismatch(&mut self, expected: &str, found: Sym, line: u32) {
        let symbol = self.table.symbol(found);
        self.messages.push(format!(
            "expected {} but found {} (`{}`) at line {}",
            expected,
            symbol.data.kind_name(),
            symbol.content,
            line
        ));
    }

    fn not_in_scope(&mut self, symbol: Sym, line: u32) {
        self.messages.push(format!(
            "symbol `{}` is not in scope at line {}",
            self.table.content(symbol),
            line
        ));
    }

    fn index_must_be_int_char(&mut self, found: SemanticType, line: u32) {
        self.messages.push(format!(
            "index must be an inte or cara, found {} at line {}",
            found, line
        ));
    }

    fn length_must_be_constant(&mut self, line: u32) {
        self.messages.push(format!(
            "found vector length that is not a constant integer expression at line {}",
            line
        ));
    }

    fn argument_count_mismatch(&mut self, expected: usize, given: usize, line: u32) {
        self.messages.push(format!(
            "function call expects {} parameters, given {} at line {}",
            expected, given, line
        ));
    }

    fn element_count_mismatch(&mut self, expected: i64, given: usize, line: u32) {
        self.messages.push(format!(
            "vector initialization expects at most {} elements, given {} at line {}",
            expected, given, line
        ));
    }

    fn redeclared(&mut self, symbol: Sym, line: u32) {
        let symbol = self.table.symbol(symbol);
        self.messages.push(format!(
            "symbol `{}` (originally declared at line {}) redeclared at line {}",
            symbol.content, symbol.line, line
        ));
    }

    fn fill_symbol_table(&mut self, declaration: &Declaration) {
        match &declaration.kind {
            DeclarationKind::ScalarVar(decl) => {
                if !matches!(self.table.data(decl.name), SymData::Unknown) {
                    self.redeclared(decl.name, declaration.line);
                } else {
                    let mut var = VarData::new(decl.datatype);
                    var.in_scope = true;
                    self.table.symbol_mut(decl.name).data = SymData::ScalarVar(var);
                }
            }
            DeclarationKind::VectorVar(decl) => {
                if !matches!(self.table.data(decl.name), SymData::Unknown) {
                    self.redeclared(decl.name, declaration.line);
                } else {
                    let mut var = VarData::new(decl.datatype);
                    var.in_scope = true;
                    self.table.symbol_mut(decl.name).data = SymData::VectorVar(var);
                }
            }
            DeclarationKind::Function(decl) => {
                if !matches!(self.table.data(decl.name), SymData::Unknown) {
                    self.redeclared(decl.name, declaration.line);
                    return;
                }
                self.table.symbol_mut(decl.name).data = SymData::Function {
                    return_type: decl.return_datatype,
                    parameter_types: decl
                        .parameters
                        .iter()
                        .map(|parameter| parameter.datatype)
                        .collect(),
                };
                for parameter in &decl.parameters {
                    if !matches!(self.table.data(parameter.name), SymData::Unknown) {
                        self.redeclared(parameter.name, parameter.line);
                    } else {
                        self.table.symbol_mut(parameter.name).data =
                            SymData::ScalarVar(VarData::new(parameter.datatype));
                    }
                }
            }
        }
    }

    fn check_declaration_init(&mut self, declaration: &mut Declaration) {
        match &mut declaration.kind {
            DeclarationKind::ScalarVar(decl) => {
                let decl_type = decl.datatype.semantic_type();
                if let Some(init_type) = self.expression_type(&mut decl.init) {
                    if !init_type.equiv(decl_type) {
                        self.type_mismatch(decl_type, init_type, decl.init.line);
                    }
                }
            }
            DeclarationKind::VectorVar(decl) => self.check_vector_init(decl),
            DeclarationKind::Function(_) => {}
        }
    }

    fn check_vector_init(&mut self, decl: &mut VectorVarDecl) {
        let decl_type = decl.datatype.semantic_type();

        let length_type = match self.expression_type(&mut decl.length) {
            Some(length_type) => length_type,
            None => return,
        };
        if !length_type.equiv(SemanticType::Int) {
            self.type_mismatch(SemanticType::Int, length_type, decl.length.line);
            return;
        }
        let length_value = match consteval::eval_int(self.table, &decl.length) {
            Some(length_value) => length_value,
            None => {
                self.length_must_be_constant(decl.length.line);
                return;
            }
        };

        if length_value < decl.init.len() as i64 {
            let line = decl
                .init
                .first()
                .map(|element| element.line)
                .unwrap_or(decl.length.line);
            self.element_count_mismatch(length_value, decl.init.len(), line);
        }

        let checked = decl.init.len().min(length_value.max(0) as usize);
        for element in &mut decl.init[..checked] {
            if let Some(element_type) = self.expression_type(element) {
                if !element_type.equiv(decl_type) {
                    self.type_mismatch(decl_type, element_type, element.line);
                }
            }
        }
    }

    fn check_function(&mut self, function: &mut FunctionDecl) {
        for parameter in &function.parameters {
            if let Some(var) = self.table.var_data_mut(parameter.name) {
                var.in_scope = true;
            }
        }

        let expected_return = function.return_datatype.semantic_type();
        for statement in &mut function.body.statements {
            self.check_statement(statement, expected_return);
        }

        for parameter in &function.parameters {
            if let Some(var) = self.table.var_data_mut(parameter.name) {
                var.in_scope = false;
            }
        }
    }

    fn check_statement(&mut self, statement: &mut Statement, expected_return: SemanticType) {
        let line = statement.line;
        match &mut statement.kind {
            StatementKind::ScalarVarAssign { variable, value } => {
                let variable = *variable;
                let var = match self.table.data(variable) {
                    SymData::ScalarVar(var) => Some((var.in_scope, var.datatype)),
                    _ => None,
                };
                match var {
                    Some((in_scope, datatype)) => {
                        if !in_scope {
                            self.not_in_scope(variable, line);
                        }
                        let variable_type = datatype.semantic_type();
                        if let Some(assigned_type) = self.expression_type(value) {
                            if !assigned_type.equiv(variable_type) {
                                self.type_mismatch(variable_type, assigned_type, value.line);
                            }
                        }
                    }
                    None => self.symbol_kind_mismatch("scalar variable", variable, line),
                }
            }
            StatementKind::SubscriptedAssign {
                variable,
                index,
                value,
            } => {
                let variable = *variable;
                let var = match self.table.data(variable) {
                    SymData::VectorVar(var) => Some((var.in_scope, var.datatype)),
                    _ => None,
                };
                match var {
                    Some((in_scope, datatype)) => {
                        if !in_scope {
                            self.not_in_scope(variable, line);
                        }
                        let variable_type = datatype.semantic_type();
                        let assigned_type = self.expression_type(value);
                        let index_type = self.expression_type(index);

                        if let Some(index_type) = index_type {
                            if !index_type.equiv(SemanticType::Int) {
                                self.index_must_be_int_char(index_type, index.line);
                            }
                        }
                        if let Some(assigned_type) = assigned_type {
                            if !assigned_type.equiv(variable_type) {
                                self.type_mismatch(variable_type, assigned_type, value.line);
                            }
                        }
                    }
                    None => self.symbol_kind_mismatch("vector variable", variable, line),
                }
            }
            StatementKind::If {
                condition,
                then,
                otherwise,
            } => {
                self.check_statement(then, expected_return);
                if let Some(otherwise) = otherwise {
                    self.check_statement(otherwise, expected_return);
                }
                if let Some(condition_type) = self.expression_type(condition) {
                    if !condition_type.equiv(SemanticType::Bool) {
                        self.type_mismatch(SemanticType::Bool, condition_type, condition.line);
                    }
                }
            }
            StatementKind::While { condition, body } => {
                self.check_statement(body, expected_return);
                if let Some(condition_type) = self.expression_type(condition) {
                    if !condition_type.equiv(SemanticType::Bool) {
                        self.type_mismatch(SemanticType::Bool, condition_type, condition.line);
                    }
                }
            }
            StatementKind::Write { arguments } => {
                for argument in arguments {
                    if let WriteArgument::Expression(expression) = argument {
                        if let Some(argument_type) = self.expression_type(expression) {
                            if argument_type.equiv(SemanticType::Bool) {
                                self.unexpected_type(argument_type, expression.line);
                            }
                        }
                    }
                }
            }
            StatementKind::Return { value } => {
                if let Some(actual_return) = self.expression_type(value) {
                    if actual_return != expected_return {
                        self.type_mismatch(expected_return, actual_return, value.line);
                    }
                }
            }
            StatementKind::Body(body) => self.check_body(body, expected_return),
            StatementKind::Expression(expression) => {
                self.expression_type(expression);
            }
        }
    }

    fn check_body(&mut self, body: &mut Body, expected_return: SemanticType) {
        for statement in &mut body.statements {
            self.check_statement(statement, expected_return);
        }
    }

    /// Memoized type inference. `None` means inference failed and the error
    /// has already been reported.
    fn expression_type(&mut self, expression: &mut Expression) -> Option<SemanticType> {
        if expression.inference == Inference::Unknown {
            let inference = self.infer(expression);
            expression.inference = inference;
        }
        expression.semantic_type()
    }

    fn infer(&mut self, expression: &mut Expression) -> Inference {
        let line = expression.line;
        match &mut expression.kind {
            ExpressionKind::IntLiteral(_) => Inference::Ok(SemanticType::Int),
            ExpressionKind::CharLiteral(_) => Inference::Ok(SemanticType::Char),
            ExpressionKind::FloatLiteral(_) => Inference::Ok(SemanticType::Float),
            ExpressionKind::Input => Inference::Ok(SemanticType::Int),
            ExpressionKind::Variable(name) => {
                let name = *name;
                let var = match self.table.data(name) {
                    SymData::ScalarVar(var) => Some((var.in_scope, var.datatype)),
                    _ => None,
                };
                match var {
                    Some((true, datatype)) => Inference::Ok(datatype.semantic_type()),
                    Some((false, _)) => {
                        self.not_in_scope(name, line);
                        Inference::Error
                    }
                    None => {
                        self.symbol_kind_mismatch("scalar variable", name, line);
                        Inference::Error
                    }
                }
            }
            ExpressionKind::Subscription { variable, index } => {
                let variable = *variable;
                let mut failed = false;
                let mut element_type = None;
                let var = match self.table.data(variable) {
                    SymData::VectorVar(var) => Some((var.in_scope, var.datatype)),
                    _ => None,
                };
                match var {
                    Some((in_scope, datatype)) => {
                        if !in_scope {
                            self.not_in_scope(variable, line);
                            failed = true;
                        }
                        element_type = Some(datatype.semantic_type());
                    }
                    None => {
                        self.symbol_kind_mismatch("vector variable", variable, line);
                        failed = true;
                    }
                }
                let index_line = index.line;
                match self.expression_type(index) {
                    None => failed = true,
                    Some(index_type) => {
                        if !index_type.equiv(SemanticType::Int) {
                            self.index_must_be_int_char(index_type, index_line);
                        }
                    }
                }
                match element_type {
                    Some(element_type) if !failed => Inference::Ok(element_type),
                    _ => Inference::Error,
                }
            }
            ExpressionKind::BinaryOperation {
                operator,
                left,
                right,
            } => {
                let operator = *operator;
                let left_line = left.line;
                let right_line = right.line;
                let left_type = self.expression_type(left);
                let right_type = self.expression_type(right);

                match binary_operation_type(operator) {
                    OperationType::Arithmetic => {
                        let mut failed = left_type.is_none() && right_type.is_none();
                        if let Some(left_type) = left_type {
                            if left_type.equiv(SemanticType::Bool) {
                                self.unexpected_type(SemanticType::Bool, left_line);
                                failed = true;
                            }
                        }
                        if let Some(right_type) = right_type {
                            if right_type.equiv(SemanticType::Bool) {
                                self.unexpected_type(SemanticType::Bool, right_line);
                                failed = true;
                            }
                        }
                        if failed {
                            return Inference::Error;
                        }
                        match (left_type, right_type) {
                            (Some(left_type), None) => Inference::Ok(left_type),
                            (None, Some(right_type)) => Inference::Ok(right_type),
                            (Some(left_type), Some(right_type)) => {
                                if left_type.equiv(right_type) {
                                    Inference::Ok(left_type)
                                } else {
                                    self.type_mismatch(left_type, right_type, right_line);
                                    Inference::Error
                                }
                            }
                            (None, None) => Inference::Error,
                        }
                    }
                    OperationType::Logical => {
                        if let Some(left_type) = left_type {
                            if !left_type.equiv(SemanticType::Bool) {
                                self.type_mismatch(SemanticType::Bool, left_type, left_line);
                            }
                        }
                        if let Some(right_type) = right_type {
                            if !right_type.equiv(SemanticType::Bool) {
                                self.type_mismatch(SemanticType::Bool, right_type, right_line);
                            }
                        }
                        Inference::Ok(SemanticType::Bool)
                    }
                    OperationType::Comparison => {
                        let mut failed = false;
                        if let Some(left_type) = left_type {
                            if left_type.equiv(SemanticType::Bool) {
                                self.unexpected_type(SemanticType::Bool, left_line);
                                failed = true;
                            }
                        }
                        if let Some(right_type) = right_type {
                            if right_type.equiv(SemanticType::Bool) {
                                self.unexpected_type(SemanticType::Bool, right_line);
                                failed = true;
                            }
                        }
                        if let (false, Some(left_type), Some(right_type)) =
                            (failed, left_type, right_type)
                        {
                            if !left_type.equiv(right_type) {
                                self.type_mismatch(left_type, right_type, right_line);
                            }
                        }
                        Inference::Ok(SemanticType::Bool)
                    }
                }
            }
            ExpressionKind::UnaryOperation { operator, operand } => {
                let operator = *operator;
                let operand_line = operand.line;
                let operand_type = self.expression_type(operand);
                match unary_operation_type(operator) {
                    OperationType::Logical => {
                        if let Some(operand_type) = operand_type {
                            if !operand_type.equiv(SemanticType::Bool) {
                                self.type_mismatch(SemanticType::Bool, operand_type, operand_line);
                            }
                        }
                        Inference::Ok(SemanticType::Bool)
                    }
                    OperationType::Arithmetic | OperationType::Comparison => {
                        unreachable!("the only unary operator is logical")
                    }
                }
            }
            ExpressionKind::FunctionCall {
                function,
                arguments,
            } => {
                let function = *function;
                let (parameter_types, return_type) = match self.table.data(function) {
                    SymData::Function {
                        return_type,
                        parameter_types,
                    } => (parameter_types.clone(), *return_type),
                    _ => {
                        self.symbol_kind_mismatch("function identifier", function, line);
                        return Inference::Error;
                    }
                };

                if parameter_types.len() != arguments.len() {
                    self.argument_count_mismatch(parameter_types.len(), arguments.len(), line);
                }

                let checked = parameter_types.len().min(arguments.len());
                for (parameter_type, argument) in
                    parameter_types[..checked].iter().zip(&mut arguments[..checked])
                {
                    let parameter_type = parameter_type.semantic_type();
                    let argument_line = argument.line;
                    if let Some(argument_type) = self.expression_type(argument) {
                        if !argument_type.equiv(parameter_type) {
                            self.type_mismatch(parameter_type, argument_type, argument_line);
                        }
                    }
                }

                Inference::Ok(return_type.semantic_type())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parser;

    fn check(input: &str) -> Vec<String> {
        let mut table = SymbolTable::new();
        let mut program = parser::parse_program(input, &mut table).unwrap();
        check_program(&mut table, &mut program)
    }

    #[test]
    fn accepts_well_typed_program() {
        let errors = check(
            "inte x = 5;\n\
             inte dobro(inte n) { retorne n * 2; }\n\
             inte main() { x = dobro(x); escreva x \"\\n\"; retorne 0; }\n",
        );
        assert_eq!(errors, Vec::<String>::new());
    }

    #[test]
    fn reports_redeclaration_with_original_line() {
        let errors = check("inte x = 1;\ncara x = 'a';\n");
        assert_eq!(
            errors,
            vec!["symbol `x` (originally declared at line 1) redeclared at line 2".to_owned()]
        );
    }

    #[test]
    fn reports_out_of_scope_parameter_use() {
        let errors = check(
            "inte f(inte n) { retorne n; }\n\
             inte g() { retorne n; }\n",
        );
        assert_eq!(
            errors,
            vec!["symbol `n` is not in scope at line 2".to_owned()]
        );
    }

    #[test]
    fn reports_condition_type_mismatch() {
        let errors = check("inte f() { se (1 + 2) entaum retorne 1; retorne 0; }\n");
        assert_eq!(
            errors,
            vec!["expected type <bool> but found type inte at line 1".to_owned()]
        );
    }

    #[test]
    fn reports_index_type() {
        let errors = check("inte v[5];\ninte f() { retorne v[1.0]; }\n");
        assert_eq!(
            errors,
            vec!["index must be an inte or cara, found real at line 2".to_owned()]
        );
    }

    #[test]
    fn reports_arity_mismatch() {
        let errors = check(
            "inte f(inte a, inte b) { retorne a + b; }\n\
             inte g() { retorne f(1); }\n",
        );
        assert_eq!(
            errors,
            vec!["function call expects 2 parameters, given 1 at line 2".to_owned()]
        );
    }

    #[test]
    fn reports_excess_vector_initializers() {
        let errors = check("inte v[2] 1 2 3;\n");
        assert_eq!(
            errors,
            vec!["vector initialization expects at most 2 elements, given 3 at line 1".to_owned()]
        );
    }

    #[test]
    fn int_and_char_are_interchangeable() {
        let errors = check("inte x = 'a';\ncara f(inte n) { retorne 'b'; }\n");
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    }
}
