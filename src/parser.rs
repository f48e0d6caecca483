//! Parser for the source language, built on [pest]. The tree walk interns
//! every identifier and literal in the symbol table as it goes, so the AST
//! only ever carries [`Sym`](../../symtab/struct.Sym.html) handles.
//!
//! [pest]: https://docs.rs/pest/

use crate::ast::{
    BinaryOperator, Body, Declaration, DeclarationKind, Expression, ExpressionKind, FunctionDecl,
    Parameter, Program, ScalarVarDecl, Statement, StatementKind, UnaryOperator, VectorVarDecl,
    WriteArgument,
};
use matches::debug_assert_matches;
use pest::iterators::Pair;
use pest::{Parser, Span};
use pest_derive::Parser;
use symtab::{decode_escape, DataType, Sym, SymbolTable};

#[derive(Parser)]
#[grammar = "grammar.pest"]
struct SourceParser;

pub type Error = pest::error::Error<Rule>;

pub type Result<T> = std::result::Result<T, Error>;

/// Parses a whole translation unit.
pub fn parse_program(input: &str, table: &mut SymbolTable) -> Result<Program> {
    let pair = SourceParser::parse(Rule::program, input)?.next().unwrap();
    process_program(pair, table)
}

fn new_parser_error(span: Span, message: String) -> Error {
    Error::new_from_span(pest::error::ErrorVariant::CustomError { message }, span)
}

fn line_of(pair: &Pair<Rule>) -> u32 {
    pair.as_span().start_pos().line_col().0 as u32
}

fn process_program(pair: Pair<Rule>, table: &mut SymbolTable) -> Result<Program> {
    debug_assert_matches!(pair.as_rule(), Rule::program);
    let mut declarations = Vec::new();
    for inner in pair.into_inner() {
        if inner.as_rule() == Rule::declaration {
            declarations.push(process_declaration(inner, table)?);
        }
    }
    Ok(Program { declarations })
}

fn process_declaration(pair: Pair<Rule>, table: &mut SymbolTable) -> Result<Declaration> {
    let inner = pair.into_inner().next().unwrap();
    let line = line_of(&inner);
    let rule = inner.as_rule();
    let mut pairs = inner.into_inner();

    let kind = match rule {
        Rule::scalar_var_decl => {
            let datatype = process_datatype(&pairs.next().unwrap());
            let name = process_identifier(pairs.next().unwrap(), table);
            let init = process_expression(pairs.next().unwrap(), table)?;
            DeclarationKind::ScalarVar(ScalarVarDecl {
                datatype,
                name,
                init,
            })
        }
        Rule::vector_var_decl => {
            let datatype = process_datatype(&pairs.next().unwrap());
            let name = process_identifier(pairs.next().unwrap(), table);
            let length = process_expression(pairs.next().unwrap(), table)?;
            let mut init = Vec::new();
            for element in pairs {
                init.push(process_expression(element, table)?);
            }
            DeclarationKind::VectorVar(VectorVarDecl {
                datatype,
                name,
                length,
                init,
            })
        }
        Rule::function_decl => {
            let return_datatype = process_datatype(&pairs.next().unwrap());
            let name = process_identifier(pairs.next().unwrap(), table);
            let mut parameters = Vec::new();
            let mut next = pairs.next().unwrap();
            if next.as_rule() == Rule::parameter_list {
                for parameter in next.into_inner() {
                    parameters.push(process_parameter(parameter, table));
                }
                next = pairs.next().unwrap();
            }
            let body = process_body(next, table)?;
            DeclarationKind::Function(FunctionDecl {
                return_datatype,
                name,
                parameters,
                body,
            })
        }
        _ => unreachable!(),
    };

    Ok(Declaration { line, kind })
}

fn process_datatype(pair: &Pair<Rule>) -> DataType {
    debug_assert_matches!(pair.as_rule(), Rule::datatype);
    match pair.as_str() {
        "inte" => DataType::Inte,
        "cara" => DataType::Cara,
        "real" => DataType::Real,
        _ => unreachable!(),
    }
}

fn process_identifier(pair: Pair<Rule>, table: &mut SymbolTable) -> Sym {
    debug_assert_matches!(pair.as_rule(), Rule::identifier);
    table.set_current_line(line_of(&pair));
    table.intern(pair.as_str())
}

fn process_parameter(pair: Pair<Rule>, table: &mut SymbolTable) -> Parameter {
    debug_assert_matches!(pair.as_rule(), Rule::parameter);
    let line = line_of(&pair);
    let mut pairs = pair.into_inner();
    let datatype = process_datatype(&pairs.next().unwrap());
    let name = process_identifier(pairs.next().unwrap(), table);
    Parameter {
        line,
        datatype,
        name,
    }
}

fn process_body(pair: Pair<Rule>, table: &mut SymbolTable) -> Result<Body> {
    debug_assert_matches!(pair.as_rule(), Rule::body);
    let mut statements = Vec::new();
    for statement in pair.into_inner() {
        statements.push(process_statement(statement, table)?);
    }
    Ok(Body { statements })
}

fn process_statement(pair: Pair<Rule>, table: &mut SymbolTable) -> Result<Statement> {
    debug_assert_matches!(pair.as_rule(), Rule::statement);
    let inner = pair.into_inner().next().unwrap();
    let line = line_of(&inner);
    let rule = inner.as_rule();

    let kind = match rule {
        Rule::body => StatementKind::Body(process_body(inner, table)?),
        Rule::if_stmt => {
            let mut pairs = inner.into_inner();
            let condition = process_expression(pairs.next().unwrap(), table)?;
            let then = Box::new(process_statement(pairs.next().unwrap(), table)?);
            let otherwise = match pairs.next() {
                Some(statement) => Some(Box::new(process_statement(statement, table)?)),
                None => None,
            };
            StatementKind::If {
                condition,
                then,
                otherwise,
            }
        }
        Rule::while_stmt => {
            let mut pairs = inner.into_inner();
            let condition = process_expression(pairs.next().unwrap(), table)?;
            let body = Box::new(process_statement(pairs.next().unwrap(), table)?);
            StatementKind::While { condition, body }
        }
        Rule::write_stmt => {
            let mut arguments = Vec::new();
            for argument in inner.into_inner() {
                arguments.push(process_write_argument(argument, table)?);
            }
            StatementKind::Write { arguments }
        }
        Rule::return_stmt => {
            let value = process_expression(inner.into_inner().next().unwrap(), table)?;
            StatementKind::Return { value }
        }
        Rule::subscripted_assign => {
            let mut pairs = inner.into_inner();
            let variable = process_identifier(pairs.next().unwrap(), table);
            let index = process_expression(pairs.next().unwrap(), table)?;
            let value = process_expression(pairs.next().unwrap(), table)?;
            StatementKind::SubscriptedAssign {
                variable,
                index,
                value,
            }
        }
        Rule::scalar_assign => {
            let mut pairs = inner.into_inner();
            let variable = process_identifier(pairs.next().unwrap(), table);
            let value = process_expression(pairs.next().unwrap(), table)?;
            StatementKind::ScalarVarAssign { variable, value }
        }
        Rule::expr_stmt => {
            let value = process_expression(inner.into_inner().next().unwrap(), table)?;
            StatementKind::Expression(value)
        }
        _ => unreachable!(),
    };

    Ok(Statement { line, kind })
}

fn process_write_argument(pair: Pair<Rule>, table: &mut SymbolTable) -> Result<WriteArgument> {
    debug_assert_matches!(pair.as_rule(), Rule::write_argument);
    let inner = pair.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::string_lit => Ok(WriteArgument::StringLit(process_string_lit(inner, table))),
        Rule::expression => Ok(WriteArgument::Expression(process_expression(inner, table)?)),
        _ => unreachable!(),
    }
}

fn process_expression(pair: Pair<Rule>, table: &mut SymbolTable) -> Result<Expression> {
    debug_assert_matches!(pair.as_rule(), Rule::expression);
    process_binary_chain(pair, table)
}

/// Folds one left-associative `operand (op operand)*` level.
fn process_binary_chain(pair: Pair<Rule>, table: &mut SymbolTable) -> Result<Expression> {
    let mut pairs = pair.into_inner();
    let mut expression = process_operand(pairs.next().unwrap(), table)?;

    while let Some(op) = pairs.next() {
        let line = line_of(&op);
        let operator = process_binary_operator(&op);
        let right = process_operand(pairs.next().unwrap(), table)?;
        expression = Expression::new(
            line,
            ExpressionKind::BinaryOperation {
                operator,
                left: Box::new(expression),
                right: Box::new(right),
            },
        );
    }

    Ok(expression)
}

fn process_operand(pair: Pair<Rule>, table: &mut SymbolTable) -> Result<Expression> {
    match pair.as_rule() {
        Rule::and_chain | Rule::cmp_chain | Rule::add_chain | Rule::mul_chain => {
            process_binary_chain(pair, table)
        }
        Rule::unary_chain => process_unary_chain(pair, table),
        _ => unreachable!(),
    }
}

fn process_binary_operator(pair: &Pair<Rule>) -> BinaryOperator {
    match pair.as_rule() {
        Rule::or_op => BinaryOperator::Or,
        Rule::and_op => BinaryOperator::And,
        Rule::cmp_op => match pair.as_str() {
            "<" => BinaryOperator::LessThan,
            ">" => BinaryOperator::GreaterThan,
            "<=" => BinaryOperator::LessOrEquals,
            ">=" => BinaryOperator::GreaterOrEquals,
            "==" => BinaryOperator::Equals,
            "!=" => BinaryOperator::NotEqual,
            _ => unreachable!(),
        },
        Rule::add_op => match pair.as_str() {
            "+" => BinaryOperator::Add,
            "-" => BinaryOperator::Sub,
            _ => unreachable!(),
        },
        Rule::mul_op => match pair.as_str() {
            "*" => BinaryOperator::Mul,
            "/" => BinaryOperator::Div,
            _ => unreachable!(),
        },
        _ => unreachable!(),
    }
}

fn process_unary_chain(pair: Pair<Rule>, table: &mut SymbolTable) -> Result<Expression> {
    debug_assert_matches!(pair.as_rule(), Rule::unary_chain);
    let pairs: Vec<_> = pair.into_inner().collect();
    let (primary, operators) = pairs.split_last().unwrap();
    let mut expression = process_primary(primary.clone(), table)?;

    for op in operators.iter().rev() {
        debug_assert_matches!(op.as_rule(), Rule::not_op);
        expression = Expression::new(
            line_of(op),
            ExpressionKind::UnaryOperation {
                operator: UnaryOperator::Not,
                operand: Box::new(expression),
            },
        );
    }

    Ok(expression)
}

fn process_primary(pair: Pair<Rule>, table: &mut SymbolTable) -> Result<Expression> {
    debug_assert_matches!(pair.as_rule(), Rule::primary);
    let inner = pair.into_inner().next().unwrap();
    let line = line_of(&inner);

    let kind = match inner.as_rule() {
        Rule::input => ExpressionKind::Input,
        Rule::function_call => {
            let mut pairs = inner.into_inner();
            let function = process_identifier(pairs.next().unwrap(), table);
            let mut arguments = Vec::new();
            if let Some(argument_list) = pairs.next() {
                for argument in argument_list.into_inner() {
                    arguments.push(process_expression(argument, table)?);
                }
            }
            ExpressionKind::FunctionCall {
                function,
                arguments,
            }
        }
        Rule::subscription => {
            let mut pairs = inner.into_inner();
            let variable = process_identifier(pairs.next().unwrap(), table);
            let index = Box::new(process_expression(pairs.next().unwrap(), table)?);
            ExpressionKind::Subscription { variable, index }
        }
        Rule::float_lit => {
            let span = inner.as_span();
            let value: f64 = inner
                .as_str()
                .parse()
                .map_err(|err| new_parser_error(span, format!("parsing float failed: {}", err)))?;
            table.set_current_line(line);
            ExpressionKind::FloatLiteral(table.float_lit(value))
        }
        Rule::int_lit => {
            let span = inner.as_span();
            let value: i64 = inner.as_str().parse().map_err(|err| {
                new_parser_error(span, format!("parsing integer failed: {}", err))
            })?;
            table.set_current_line(line);
            ExpressionKind::IntLiteral(table.int_lit(value))
        }
        Rule::char_lit => {
            let bytes = inner.as_str().as_bytes();
            let value = if bytes[1] == b'\\' {
                decode_escape(bytes[2])
            } else {
                bytes[1]
            };
            table.set_current_line(line);
            ExpressionKind::CharLiteral(table.char_lit(value))
        }
        Rule::variable => {
            let name = process_identifier(inner.into_inner().next().unwrap(), table);
            ExpressionKind::Variable(name)
        }
        Rule::expression => return process_expression(inner, table),
        _ => unreachable!(),
    };

    Ok(Expression::new(line, kind))
}

fn process_string_lit(pair: Pair<Rule>, table: &mut SymbolTable) -> Sym {
    debug_assert_matches!(pair.as_rule(), Rule::string_lit);
    let line = line_of(&pair);
    let raw = pair.as_str().as_bytes();
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 1;
    while i < raw.len() - 1 {
        if raw[i] == b'\\' {
            i += 1;
            bytes.push(decode_escape(raw[i]));
        } else {
            bytes.push(raw[i]);
        }
        i += 1;
    }
    table.set_current_line(line);
    table.str_lit(&bytes)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::{DeclarationKind, ExpressionKind, StatementKind};

    fn parse(input: &str) -> (Program, SymbolTable) {
        let mut table = SymbolTable::new();
        let program = parse_program(input, &mut table).unwrap();
        (program, table)
    }

    #[test]
    fn parses_scalar_declaration() {
        let (program, table) = parse("inte x = 5;\n");
        assert_eq!(program.declarations.len(), 1);
        match &program.declarations[0].kind {
            DeclarationKind::ScalarVar(decl) => {
                assert_eq!(table.content(decl.name), "x");
                assert_eq!(decl.datatype, DataType::Inte);
            }
            other => panic!("unexpected declaration {:?}", other),
        }
    }

    #[test]
    fn parses_vector_declaration_with_initializers() {
        let (program, _) = parse("cara v[4] 'a' 'b';\n");
        match &program.declarations[0].kind {
            DeclarationKind::VectorVar(decl) => assert_eq!(decl.init.len(), 2),
            other => panic!("unexpected declaration {:?}", other),
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let (program, _) = parse("inte f() { retorne 1 + 2 * 3; }\n");
        let function = match &program.declarations[0].kind {
            DeclarationKind::Function(function) => function,
            other => panic!("unexpected declaration {:?}", other),
        };
        let value = match &function.body.statements[0].kind {
            StatementKind::Return { value } => value,
            other => panic!("unexpected statement {:?}", other),
        };
        match &value.kind {
            ExpressionKind::BinaryOperation { operator, right, .. } => {
                assert_eq!(*operator, BinaryOperator::Add);
                assert!(matches!(
                    right.kind,
                    ExpressionKind::BinaryOperation {
                        operator: BinaryOperator::Mul,
                        ..
                    }
                ));
            }
            other => panic!("unexpected expression {:?}", other),
        }
    }

    #[test]
    fn keywords_are_not_identifiers() {
        let mut table = SymbolTable::new();
        assert!(parse_program("inte se = 1;\n", &mut table).is_err());
    }

    #[test]
    fn if_with_else_and_while() {
        let (program, _) = parse(
            "inte f(inte n) {\n\
             \x20   enquanto (n > 0) se (n / 2 * 2 == n) entaum n = n - 1; senaum n = n - 3;\n\
             \x20   retorne n;\n\
             }\n",
        );
        let function = match &program.declarations[0].kind {
            DeclarationKind::Function(function) => function,
            other => panic!("unexpected declaration {:?}", other),
        };
        assert!(matches!(
            function.body.statements[0].kind,
            StatementKind::While { .. }
        ));
    }

    #[test]
    fn string_literals_are_decoded_and_unified() {
        let (program, mut table) = parse("inte f() { escreva \"a\\n\" 1; }\n");
        let function = match &program.declarations[0].kind {
            DeclarationKind::Function(function) => function,
            other => panic!("unexpected declaration {:?}", other),
        };
        let arguments = match &function.body.statements[0].kind {
            StatementKind::Write { arguments } => arguments,
            other => panic!("unexpected statement {:?}", other),
        };
        assert_eq!(arguments.len(), 2);
        match &arguments[0] {
            WriteArgument::StringLit(sym) => {
                assert_eq!(table.str_bytes(*sym), b"a\n");
                let again = table.str_lit(b"a\n");
                assert_eq!(again, *sym);
            }
            other => panic!("unexpected argument {:?}", other),
        }
    }
}
