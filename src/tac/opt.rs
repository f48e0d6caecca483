//! TAC-level optimizations, each behind its own flag.

use crate::tac::{Opcode, Tac};
use symtab::{SymData, SymbolTable};

/// Which TAC passes to run. Flags are unioned; `-O` turns on all of them.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct OptFlags {
    pub power_of_two: bool,
    pub reuse_tmps: bool,
}

impl OptFlags {
    pub const OFF: OptFlags = OptFlags {
        power_of_two: false,
        reuse_tmps: false,
    };

    pub const FULL: OptFlags = OptFlags {
        power_of_two: true,
        reuse_tmps: true,
    };
}

pub fn optimize(tac: &mut Tac, table: &mut SymbolTable, flags: OptFlags) {
    if flags.power_of_two {
        power_of_two(tac, table);
    }
    if flags.reuse_tmps {
        reuse_tmps(tac, table);
    }
}

/// Signed exact base-2 logarithm: `Some(k)` when `|integer| == 2^|k|`, with
/// `k` carrying the sign of `integer`.
fn exact_log2(integer: i64) -> Option<i64> {
    if integer == 0 {
        return None;
    }
    let magnitude = integer.unsigned_abs();
    if !magnitude.is_power_of_two() {
        return None;
    }
    let log = i64::from(magnitude.trailing_zeros() as u8);
    Some(if integer < 0 { -log } else { log })
}

/// Rewrites multiplications and divisions by a literal power of two into
/// shift instructions carrying the signed logarithm.
fn power_of_two(tac: &mut Tac, table: &mut SymbolTable) {
    for index in 0..tac.len() {
        let instruction = tac.nodes[index].instruction;
        match instruction.opcode {
            Opcode::Mul => {
                for operand in 0..2 {
                    let literal = match instruction.srcs[operand] {
                        Some(symbol) => match table.data(symbol) {
                            SymData::IntLit(value) => *value,
                            _ => continue,
                        },
                        None => continue,
                    };
                    if let Some(log) = exact_log2(literal) {
                        let other = instruction.srcs[1 - operand];
                        let log_lit = table.int_lit(log);
                        let rewritten = &mut tac.nodes[index].instruction;
                        rewritten.opcode = Opcode::ShMul;
                        rewritten.srcs = [other, Some(log_lit)];
                        break;
                    }
                }
            }
            Opcode::Div => {
                let literal = match instruction.srcs[1] {
                    Some(symbol) => match table.data(symbol) {
                        SymData::IntLit(value) => *value,
                        _ => continue,
                    },
                    None => continue,
                };
                if let Some(log) = exact_log2(literal) {
                    let log_lit = table.int_lit(log);
                    let rewritten = &mut tac.nodes[index].instruction;
                    rewritten.opcode = Opcode::ShDiv;
                    rewritten.srcs[1] = Some(log_lit);
                }
            }
            _ => {}
        }
    }
}

/// Renames temporaries so that live ranges that never overlap share one
/// symbol. The pool of freed ranges is kept per directive-delimited region
/// and ordered by `(start_id, block_id)`; reuse pops the greatest entry.
fn reuse_tmps(tac: &mut Tac, table: &mut SymbolTable) {
    tac.compute_locality(table);

    let mut index = 0;
    while index < tac.len() {
        if tac.nodes[index].instruction.opcode.is_directive() {
            index += 1;
            continue;
        }

        let mut pool: Vec<usize> = Vec::new();
        while index < tac.len() && !tac.nodes[index].instruction.opcode.is_directive() {
            if tac.nodes[index].instruction.opcode != Opcode::Label {
                substitute_sources(tac, table, index);
                release_ending_values(tac, table, index, &mut pool);
                reuse_at_start(tac, table, index, &mut pool);
            }
            index += 1;
        }
    }
}

fn substitute_sources(tac: &mut Tac, table: &SymbolTable, index: usize) {
    let instruction = &mut tac.nodes[index].instruction;
    for src in instruction.srcs.iter_mut() {
        if let Some(symbol) = *src {
            if let Some(replacement) = table.replacement(symbol) {
                *src = Some(replacement);
            }
        }
    }
}

/// Ranges ending here go into the pool and publish their current symbol as
/// available for takeover.
fn release_ending_values(
    tac: &mut Tac,
    table: &mut SymbolTable,
    index: usize,
    pool: &mut Vec<usize>,
) {
    let ending = tac.nodes[index].ending_local_values.clone();
    for value_id in ending {
        pool_insert(tac, pool, value_id);
        let value = &mut tac.local_values[value_id];
        let old_symbol = value.old_symbol;
        value.old_symbol = value.symbol_in_use;
        value.symbol_offered = Some(value.symbol_in_use);
        table.set_replacement(old_symbol, None);
    }
}

/// A range starting here takes over the offered symbol of the most recently
/// started freed range, and future in-region reads of the original symbol
/// are redirected.
fn reuse_at_start(tac: &mut Tac, table: &mut SymbolTable, index: usize, pool: &mut Vec<usize>) {
    let starting = match tac.nodes[index].starting_local_value {
        Some(starting) => starting,
        None => return,
    };
    let freed = match pool.pop() {
        Some(freed) => freed,
        None => return,
    };

    let offered = tac.local_values[freed]
        .symbol_offered
        .take()
        .expect("pooled local value always offers a symbol");
    let freed_in_use = tac.local_values[freed].symbol_in_use;

    let value = &mut tac.local_values[starting];
    let old_symbol = value.old_symbol;
    value.symbol_in_use = offered;
    value.old_symbol = freed_in_use;

    tac.nodes[index].instruction.dest = Some(offered);
    table.set_replacement(old_symbol, Some(offered));
}

/// Sorted insert by `(start_id, block_id)`; an entry with an equal key is
/// refused.
fn pool_insert(tac: &Tac, pool: &mut Vec<usize>, value_id: usize) {
    let key = tac.local_values[value_id].sort_key();
    match pool.binary_search_by_key(&key, |&existing| tac.local_values[existing].sort_key()) {
        Ok(_) => {}
        Err(position) => pool.insert(position, value_id),
    }
}
