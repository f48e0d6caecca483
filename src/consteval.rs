//! Constant folding of initializer expressions. Anything that is not a
//! literal or a `+ - * /` tree over constants simply is not constant.

use crate::ast::{BinaryOperator, Expression, ExpressionKind};
use symtab::SymbolTable;

pub fn eval_int(table: &SymbolTable, expression: &Expression) -> Option<i64> {
    match &expression.kind {
        ExpressionKind::IntLiteral(sym) => Some(table.parsed_int(*sym)),
        ExpressionKind::CharLiteral(sym) => Some(i64::from(table.parsed_char(*sym))),
        ExpressionKind::BinaryOperation {
            operator,
            left,
            right,
        } => {
            let left = eval_int(table, left)?;
            let right = eval_int(table, right)?;
            match operator {
                BinaryOperator::Add => Some(left.wrapping_add(right)),
                BinaryOperator::Sub => Some(left.wrapping_sub(right)),
                BinaryOperator::Mul => Some(left.wrapping_mul(right)),
                BinaryOperator::Div => left.checked_div(right),
                _ => None,
            }
        }
        _ => None,
    }
}

pub fn eval_char(table: &SymbolTable, expression: &Expression) -> Option<u8> {
    eval_int(table, expression).map(|value| value as u8)
}

pub fn eval_float(table: &SymbolTable, expression: &Expression) -> Option<f64> {
    match &expression.kind {
        ExpressionKind::FloatLiteral(sym) => match table.data(*sym) {
            symtab::SymData::FloatLit { parsed, .. } => Some(*parsed),
            data => panic!("symbol kind {} is not a float literal", data.kind_name()),
        },
        ExpressionKind::BinaryOperation {
            operator,
            left,
            right,
        } => {
            let left = eval_float(table, left)?;
            let right = eval_float(table, right)?;
            match operator {
                BinaryOperator::Add => Some(left + right),
                BinaryOperator::Sub => Some(left - right),
                BinaryOperator::Mul => Some(left * right),
                BinaryOperator::Div => Some(left / right),
                _ => None,
            }
        }
        _ => None,
    }
}
