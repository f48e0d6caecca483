//! Lowering of the AST to three-address code.
//!
//! Expressions are lowered through [`lower_expression_with_dest`], which
//! applies destination propagation: a trailing destination-less `move`
//! produced for a plain literal or variable is consumed and its source is
//! handed to the consumer instead of materializing a copy.

use crate::ast::{
    BinaryOperator, Body, Declaration, DeclarationKind, Expression, ExpressionKind, FunctionDecl,
    Program, ScalarVarDecl, Statement, StatementKind, UnaryOperator, VectorVarDecl, WriteArgument,
    body_returns,
};
use crate::consteval;
use crate::tac::{Instruction, Opcode, Tac};
use symtab::{DataType, Sym, SymbolTable};

/// Lowers a whole checked program, declarations in source order.
pub fn lower(table: &mut SymbolTable, program: &Program) -> Tac {
    let mut tac = Tac::empty();
    for declaration in &program.declarations {
        tac.join(lower_declaration(table, declaration));
    }
    tac
}

fn lower_declaration(table: &mut SymbolTable, declaration: &Declaration) -> Tac {
    match &declaration.kind {
        DeclarationKind::ScalarVar(decl) => lower_scalar_var_decl(table, decl),
        DeclarationKind::VectorVar(decl) => lower_vector_var_decl(table, decl),
        DeclarationKind::Function(decl) => lower_function_decl(table, decl),
    }
}

/// Constant-folds `init` to a literal of the declared type, falling back to
/// the type's zero when folding fails.
fn folded_initializer(table: &mut SymbolTable, datatype: DataType, init: &Expression) -> Sym {
    match datatype {
        DataType::Inte => {
            let value = consteval::eval_int(table, init).unwrap_or(0);
            table.int_lit(value)
        }
        DataType::Cara => {
            let value = consteval::eval_char(table, init).unwrap_or(0);
            table.char_lit(value)
        }
        DataType::Real => {
            let value = consteval::eval_float(table, init).unwrap_or(0.0);
            table.float_lit(value)
        }
    }
}

fn zero_of(table: &mut SymbolTable, datatype: DataType) -> Sym {
    match datatype {
        DataType::Inte => table.int_lit(0),
        DataType::Cara => table.char_lit(0),
        DataType::Real => table.float_lit(0.0),
    }
}

fn lower_scalar_var_decl(table: &mut SymbolTable, decl: &ScalarVarDecl) -> Tac {
    let init = folded_initializer(table, decl.datatype, &decl.init);
    Tac::singleton(Instruction::new(
        Opcode::DefS,
        Some(decl.name),
        Some(init),
        None,
    ))
}

fn lower_vector_var_decl(table: &mut SymbolTable, decl: &VectorVarDecl) -> Tac {
    let length = consteval::eval_int(table, &decl.length).unwrap_or(0);
    let length_lit = table.int_lit(length);

    let mut tac = Tac::singleton(Instruction::new(
        Opcode::BeginVec,
        Some(decl.name),
        Some(length_lit),
        None,
    ));

    for element in &decl.init {
        let element_lit = folded_initializer(table, decl.datatype, element);
        tac.append(Instruction::new(
            Opcode::DefV,
            Some(decl.name),
            Some(element_lit),
            None,
        ));
    }

    let fill = table.int_lit(length - decl.init.len() as i64);
    tac.append(Instruction::new(
        Opcode::EndVec,
        Some(decl.name),
        Some(fill),
        None,
    ));
    tac
}

fn lower_function_decl(table: &mut SymbolTable, decl: &FunctionDecl) -> Tac {
    let mut tac = Tac::singleton(Instruction::new(
        Opcode::BeginFun,
        Some(decl.name),
        None,
        None,
    ));

    for parameter in &decl.parameters {
        tac.append(Instruction::new(
            Opcode::DefP,
            Some(parameter.name),
            None,
            None,
        ));
    }

    tac.join(lower_body(table, &decl.body));

    if !body_returns(&decl.body) {
        let default = zero_of(table, decl.return_datatype);
        tac.append(Instruction::new(Opcode::Ret, None, Some(default), None));
    }

    tac.append(Instruction::new(Opcode::EndFun, None, None, None));
    tac
}

fn lower_body(table: &mut SymbolTable, body: &Body) -> Tac {
    let mut tac = Tac::empty();
    for statement in &body.statements {
        tac.join(lower_statement(table, statement));
    }
    tac
}

fn lower_statement(table: &mut SymbolTable, statement: &Statement) -> Tac {
    match &statement.kind {
        StatementKind::ScalarVarAssign { variable, value } => {
            let mut tac = lower_expression(table, value);
            if let Some(last) = tac.last_instruction_mut() {
                last.dest = Some(*variable);
            }
            tac
        }
        StatementKind::SubscriptedAssign {
            variable,
            index,
            value,
        } => {
            let (mut tac, index_symbol) = lower_expression_with_dest(table, index);
            let (value_tac, value_symbol) = lower_expression_with_dest(table, value);
            tac.join(value_tac);
            if let (Some(index_symbol), Some(value_symbol)) = (index_symbol, value_symbol) {
                tac.append(Instruction::new(
                    Opcode::Movv,
                    Some(*variable),
                    Some(index_symbol),
                    Some(value_symbol),
                ));
            }
            tac
        }
        StatementKind::If {
            condition,
            then,
            otherwise,
        } => lower_if(table, condition, then, otherwise.as_deref()),
        StatementKind::While { condition, body } => lower_while(table, condition, body),
        StatementKind::Write { arguments } => lower_write(table, arguments),
        StatementKind::Return { value } => {
            let (mut tac, symbol) = lower_expression_with_dest(table, value);
            tac.append(Instruction::new(Opcode::Ret, None, symbol, None));
            tac
        }
        StatementKind::Body(body) => lower_body(table, body),
        StatementKind::Expression(expression) => {
            lower_expression_with_dest(table, expression).0
        }
    }
}

fn lower_if(
    table: &mut SymbolTable,
    condition: &Expression,
    then: &Statement,
    otherwise: Option<&Statement>,
) -> Tac {
    let post_then = table.label();
    let post_else = table.label();

    let (mut tac, condition_symbol) = lower_expression_with_dest(table, condition);
    tac.append(Instruction::new(
        Opcode::Ifz,
        Some(post_then),
        condition_symbol,
        None,
    ));

    tac.join(lower_statement(table, then));
    tac.append(Instruction::new(Opcode::Jump, Some(post_else), None, None));
    tac.append(Instruction::new(Opcode::Label, None, Some(post_then), None));

    if let Some(otherwise) = otherwise {
        tac.join(lower_statement(table, otherwise));
    }
    tac.append(Instruction::new(Opcode::Label, None, Some(post_else), None));

    tac
}

fn lower_while(table: &mut SymbolTable, condition: &Expression, body: &Statement) -> Tac {
    let pre_condition = table.label();
    let post_body = table.label();

    let (mut tac, condition_symbol) = lower_expression_with_dest(table, condition);
    tac.prepend(Instruction::new(
        Opcode::Label,
        None,
        Some(pre_condition),
        None,
    ));
    tac.append(Instruction::new(
        Opcode::Ifz,
        Some(post_body),
        condition_symbol,
        None,
    ));

    tac.join(lower_statement(table, body));
    tac.append(Instruction::new(
        Opcode::Jump,
        Some(pre_condition),
        None,
        None,
    ));
    tac.append(Instruction::new(Opcode::Label, None, Some(post_body), None));

    tac
}

fn lower_write(table: &mut SymbolTable, arguments: &[WriteArgument]) -> Tac {
    let mut tac = Tac::empty();
    for argument in arguments {
        let (mut argument_tac, symbol) = match argument {
            WriteArgument::Expression(expression) => {
                lower_expression_with_dest(table, expression)
            }
            WriteArgument::StringLit(symbol) => (Tac::empty(), Some(*symbol)),
        };
        argument_tac.append(Instruction::new(Opcode::Print, None, symbol, None));
        tac.join(argument_tac);
    }
    tac
}

/// Lowers `expression` and picks the symbol holding its value. A trailing
/// pseudo-`move` is consumed (destination propagation); any other trailing
/// instruction gets a fresh temporary as its destination.
fn lower_expression_with_dest(
    table: &mut SymbolTable,
    expression: &Expression,
) -> (Tac, Option<Sym>) {
    let mut tac = lower_expression(table, expression);

    let dest = match tac.last_instruction() {
        None => None,
        Some(last) if last.opcode == Opcode::Move && last.dest.is_none() => {
            let instruction = tac.pop().expect("non-empty tac has a last instruction");
            instruction.srcs[0]
        }
        Some(_) => {
            let semantic_type = expression
                .semantic_type()
                .expect("expression type must be inferred before lowering");
            let tmp = table.tmp_var(semantic_type.datatype());
            tac.last_instruction_mut()
                .expect("non-empty tac has a last instruction")
                .dest = Some(tmp);
            Some(tmp)
        }
    };

    (tac, dest)
}

fn lower_expression(table: &mut SymbolTable, expression: &Expression) -> Tac {
    match &expression.kind {
        ExpressionKind::IntLiteral(symbol)
        | ExpressionKind::CharLiteral(symbol)
        | ExpressionKind::FloatLiteral(symbol)
        | ExpressionKind::Variable(symbol) => lower_symbol_expression(*symbol),
        ExpressionKind::Subscription { variable, index } => {
            let (mut tac, index_symbol) = lower_expression_with_dest(table, index);
            tac.append(Instruction::new(
                Opcode::Movi,
                None,
                Some(*variable),
                index_symbol,
            ));
            tac
        }
        ExpressionKind::BinaryOperation {
            operator,
            left,
            right,
        } => {
            let (mut tac, left_symbol) = lower_expression_with_dest(table, left);
            let (right_tac, right_symbol) = lower_expression_with_dest(table, right);
            tac.join(right_tac);
            tac.append(Instruction::new(
                binary_operator_opcode(*operator),
                None,
                left_symbol,
                right_symbol,
            ));
            tac
        }
        ExpressionKind::UnaryOperation { operator, operand } => {
            let (mut tac, operand_symbol) = lower_expression_with_dest(table, operand);
            tac.append(Instruction::new(
                unary_operator_opcode(*operator),
                None,
                operand_symbol,
                None,
            ));
            tac
        }
        ExpressionKind::FunctionCall {
            function,
            arguments,
        } => {
            let mut tac = Tac::empty();
            for argument in arguments {
                let (mut argument_tac, symbol) = lower_expression_with_dest(table, argument);
                argument_tac.append(Instruction::new(Opcode::Arg, None, symbol, None));
                tac.join(argument_tac);
            }
            tac.append(Instruction::new(Opcode::Call, None, Some(*function), None));
            tac
        }
        ExpressionKind::Input => Tac::singleton(Instruction::new(Opcode::Read, None, None, None)),
    }
}

/// A literal or variable lowers to a destination-less pseudo-`move`; the
/// consumer either completes it or propagates the source away.
fn lower_symbol_expression(symbol: Sym) -> Tac {
    Tac::singleton(Instruction::new(Opcode::Move, None, Some(symbol), None))
}

fn binary_operator_opcode(operator: BinaryOperator) -> Opcode {
    match operator {
        BinaryOperator::Add => Opcode::Add,
        BinaryOperator::Sub => Opcode::Sub,
        BinaryOperator::Mul => Opcode::Mul,
        BinaryOperator::Div => Opcode::Div,
        BinaryOperator::LessThan => Opcode::Lt,
        BinaryOperator::GreaterThan => Opcode::Gt,
        BinaryOperator::LessOrEquals => Opcode::Le,
        BinaryOperator::GreaterOrEquals => Opcode::Ge,
        BinaryOperator::Equals => Opcode::Eq,
        BinaryOperator::NotEqual => Opcode::Ne,
        BinaryOperator::And => Opcode::And,
        BinaryOperator::Or => Opcode::Or,
    }
}

fn unary_operator_opcode(operator: UnaryOperator) -> Opcode {
    match operator {
        UnaryOperator::Not => Opcode::Not,
    }
}
