//! Assembly-level peephole optimizations: redundant-move elimination and
//! `inc`/`dec` contraction.

use crate::x86_64::{
    AsmUnit, Instruction, Opcode, Operand, Reg, Stmt, OPERAND_0_DEST, OPERAND_0_SRC,
    OPERAND_1_DEST, OPERAND_1_SRC, OPERAND_RAX_DEST, OPERAND_RAX_SRC, OPERAND_RDX_DEST,
    OPERAND_RDX_SRC, OPERAND_RIP_DEST, OPERAND_RSP_DEST, OPERAND_RSP_SRC, RAX, RDX, RSP,
};
use symtab::{SymData, SymbolTable};

/// Which assembly passes to run; `-finc-decs` implies the dedup pass at the
/// driver level.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct OptFlags {
    pub dedup_movs: bool,
    pub inc_decs: bool,
}

impl OptFlags {
    pub const OFF: OptFlags = OptFlags {
        dedup_movs: false,
        inc_decs: false,
    };

    pub const FULL: OptFlags = OptFlags {
        dedup_movs: true,
        inc_decs: true,
    };
}

pub fn optimize(unit: &mut AsmUnit, table: &SymbolTable, flags: OptFlags) {
    if flags.dedup_movs {
        dedup_movs(unit, table);
    }
    if flags.inc_decs {
        use_inc_decs(unit, table);
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Status {
    /// No candidate armed.
    NotStarted,
    /// The armed candidate is a plain `mov`; its source can replace reads
    /// of its destination.
    MovFirst,
    /// The armed candidate computes into a register (e.g. `lea`); it can
    /// absorb a later `mov` that copies the result away.
    MovLast,
}

/// Two-cursor sweep. The back cursor marks where the current scan started;
/// the front cursor walks forward looking for an instruction that reads the
/// armed candidate's destination before anything clobbers it.
struct Deduplifier {
    back_cursor: usize,
    first_selected: usize,
    front_cursor: usize,
    status: Status,
}

fn dedup_movs(unit: &mut AsmUnit, table: &SymbolTable) {
    let mut dedup = Deduplifier {
        back_cursor: 0,
        first_selected: 0,
        front_cursor: 0,
        status: Status::NotStarted,
    };
    while dedup.transition(unit, table) {}
}

impl Deduplifier {
    fn next_raw(&mut self, length: usize) -> Option<usize> {
        if self.front_cursor >= length {
            if self.back_cursor >= length {
                return None;
            }
            self.back_cursor += 1;
            self.front_cursor = self.back_cursor;
            self.status = Status::NotStarted;
            if self.front_cursor >= length {
                return None;
            }
        }
        let current = self.front_cursor;
        self.front_cursor += 1;
        Some(current)
    }

    /// Next instruction statement; control flow (anything writing RIP)
    /// disarms the candidate and is skipped.
    fn next(&mut self, unit: &AsmUnit) -> Option<usize> {
        loop {
            let current = self.next_raw(unit.statements.len())?;
            let instruction = match &unit.statements[current] {
                Stmt::Instruction(instruction) => instruction,
                _ => continue,
            };
            if instruction.opcode.operand_flags() & OPERAND_RIP_DEST != 0 {
                self.status = Status::NotStarted;
                continue;
            }
            return Some(current);
        }
    }

    fn transition(&mut self, unit: &mut AsmUnit, table: &SymbolTable) -> bool {
        let index = match self.next(unit) {
            Some(index) => index,
            None => return false,
        };
        if self.status == Status::NotStarted {
            self.select_candidate(unit, index);
        } else {
            self.follow(unit, table, index);
        }
        true
    }

    /// Arms an instruction that writes a direct register from a plain
    /// source. `movq` is never a candidate since it crosses the GPR/XMM
    /// banks.
    fn select_candidate(&mut self, unit: &AsmUnit, index: usize) {
        let instruction = match &unit.statements[index] {
            Stmt::Instruction(instruction) => instruction,
            _ => return,
        };
        let flags = instruction.opcode.operand_flags();
        if flags & OPERAND_0_DEST != 0
            && flags & OPERAND_1_SRC != 0
            && instruction.opcode != Opcode::Movq
            && instruction.operands.len() == 2
            && matches!(instruction.operands[0], Operand::Direct(_))
        {
            self.status = if instruction.opcode == Opcode::Mov {
                Status::MovFirst
            } else {
                Status::MovLast
            };
            self.first_selected = index;
        }
    }

    fn follow(&mut self, unit: &mut AsmUnit, table: &SymbolTable, index: usize) {
        let first = match &unit.statements[self.first_selected] {
            Stmt::Instruction(instruction) => instruction.clone(),
            _ => return,
        };
        let current = match &unit.statements[index] {
            Stmt::Instruction(instruction) => instruction.clone(),
            _ => return,
        };

        let first_flags = first.opcode.operand_flags();
        let current_flags = current.opcode.operand_flags();
        let first_dest = match first.operands[0] {
            Operand::Direct(reg) => reg,
            _ => return,
        };

        let direct_source = |operand: Option<&Operand>, reg: Reg| {
            current_flags & OPERAND_1_SRC != 0
                && matches!(operand, Some(Operand::Direct(direct)) if *direct == reg)
        };
        let first_rax = first_flags & OPERAND_RAX_DEST != 0 || first_dest == RAX;
        let current_rax = current_flags & OPERAND_RAX_SRC != 0
            || direct_source(current.operands.get(1), RAX);
        let first_rdx = first_flags & OPERAND_RDX_DEST != 0 || first_dest == RDX;
        let current_rdx = current_flags & OPERAND_RDX_SRC != 0
            || direct_source(current.operands.get(1), RDX);
        let first_rsp = first_flags & OPERAND_RSP_DEST != 0 || first_dest == RSP;
        let current_rsp = current_flags & OPERAND_RSP_SRC != 0
            || direct_source(current.operands.get(1), RSP);

        let overwrites = |position: usize, dest_flag: u16| {
            current_flags & dest_flag != 0
                && matches!(
                    current.operands.get(position),
                    Some(Operand::Direct(reg)) if first_dest.family_eq(*reg)
                )
        };

        if (first_rax && current_rax) || (first_rdx && current_rdx) || (first_rsp && current_rsp) {
            // The follower depends on an implicit register the candidate's
            // side effects clobber.
            self.status = Status::NotStarted;
        } else if overwrites(0, OPERAND_0_DEST) || overwrites(1, OPERAND_1_DEST) {
            self.status = Status::NotStarted;
        } else if current_flags & OPERAND_0_DEST != 0
            && current_flags & OPERAND_1_SRC != 0
            && current.opcode != Opcode::Movq
            && current.operands.len() == 2
            && matches!(current.operands[1], Operand::Direct(reg) if reg == first_dest)
            && !(first.operands[1].is_memory() && current.operands[0].is_memory())
        {
            if first_flags & OPERAND_0_SRC != 0 {
                // The candidate reads its own destination; its source alone
                // does not reproduce the value.
                self.status = Status::NotStarted;
            } else if first.opcode == Opcode::Movabs && !current.operands[0].is_memory() {
                self.status = Status::NotStarted;
            } else if matches!(first.operands[1], Operand::Immediate(_))
                && first.operands[1].data_size(table) > current.operands[0].data_size(table)
            {
                self.status = Status::NotStarted;
            } else {
                match self.status {
                    Status::MovFirst => {
                        if let Stmt::Instruction(follower) = &mut unit.statements[index] {
                            follower.operands[1] = first.operands[1];
                        }
                        self.remove_candidate(unit);
                        self.status = Status::NotStarted;
                    }
                    Status::MovLast => {
                        if current.opcode == Opcode::Mov {
                            if let Stmt::Instruction(follower) = &mut unit.statements[index] {
                                follower.opcode = first.opcode;
                                follower.operands[1] = first.operands[1];
                            }
                            self.remove_candidate(unit);
                            self.status = Status::NotStarted;
                        }
                    }
                    Status::NotStarted => {}
                }
            }
        }

        if self.status == Status::NotStarted {
            return;
        }

        // The candidate stays armed only while the follower neither touches
        // the same location nor uses the candidate's destination register.
        let same_location = |position: usize, dest_flag: u16| {
            current_flags & dest_flag != 0
                && current.operands.get(position) == Some(&first.operands[0])
        };
        if same_location(0, OPERAND_0_DEST) || same_location(1, OPERAND_1_DEST) {
            self.status = Status::NotStarted;
        } else if current
            .operands
            .iter()
            .any(|operand| operand.uses_reg(first_dest))
        {
            self.status = Status::NotStarted;
        }
    }

    fn remove_candidate(&mut self, unit: &mut AsmUnit) {
        unit.splice(self.first_selected, self.first_selected + 1, Vec::new());
        if self.front_cursor > self.first_selected {
            self.front_cursor -= 1;
        }
    }
}

/// Collapses `add`/`sub` of an immediate 1 or -1 into `inc`/`dec`.
fn use_inc_decs(unit: &mut AsmUnit, table: &SymbolTable) {
    for statement in &mut unit.statements {
        let instruction = match statement {
            Stmt::Instruction(instruction) => instruction,
            _ => continue,
        };
        if !matches!(instruction.opcode, Opcode::Add | Opcode::Sub) {
            continue;
        }
        let value = match instruction.operands.get(1) {
            Some(Operand::Immediate(sym)) => match table.data(*sym) {
                SymData::IntLit(value) => *value,
                _ => continue,
            },
            _ => continue,
        };
        if value != 1 && value != -1 {
            continue;
        }

        let increments = (instruction.opcode == Opcode::Add) == (value == 1);
        instruction.opcode = if increments { Opcode::Inc } else { Opcode::Dec };
        instruction.operands.truncate(1);
    }
}
