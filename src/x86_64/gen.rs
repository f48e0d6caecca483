//! Lowering of TAC to x86-64 assembly for the System V ABI on Linux.
//!
//! The generator works with a fixed scratch roster instead of a register
//! allocator: RAX is the primary scratch, R8-R11 are secondary scratches
//! (never used to pass arguments), XMM12-XMM15 hold float scratch values.
//! Whenever a byte or word slice of a scratch register is about to be
//! written, the containing quadword is zeroed first so stores of the full
//! register stay well-defined.

use crate::tac::{self, Tac};
use crate::x86_64::{
    symbol_data_size, symbol_reg_size, AsmUnit, Directive, DirectiveName, Instruction, Opcode,
    Operand, Reg, RegSize, Stmt, R10, R11, R8, R9, RAX, RBP, RCX, RDI, RDX, RSI, RSP, XMM0, XMM12,
    XMM13, XMM14, XMM15,
};
use symtab::{DataType, Sym, SymData, SymbolTable, VarData};

const MAX_REGISTER_PARAMS: usize = 6;
const MAX_SSE_REGISTER_PARAMS: usize = 8;

/// Lowers a whole TAC translation unit into one assembly unit laid out as
/// `.data`, `.rodata`, `.text`.
pub fn generate(table: &mut SymbolTable, tac: &Tac) -> AsmUnit {
    let mut generator = Generator {
        table,
        data: AsmUnit::empty(),
        rodata: AsmUnit::empty(),
        text: AsmUnit::empty(),
    };
    generator.gen_data(tac);
    generator.gen_code(tac);

    let Generator {
        data, rodata, text, ..
    } = generator;
    AsmUnit::join(vec![data, rodata, text])
}

#[derive(Clone, Copy)]
enum Section {
    Data,
    Rodata,
}

/// State of the `arg`/`call` protocol for the call currently being staged.
struct CallState {
    arg_count: usize,
    sse_arg_count: usize,
    arg_index: usize,
    sse_arg_index: usize,
    stack_arg_count: usize,
    call_stack_size: Sym,
}

impl CallState {
    fn new(table: &mut SymbolTable) -> CallState {
        CallState {
            arg_count: 0,
            sse_arg_count: 0,
            arg_index: 0,
            sse_arg_index: 0,
            stack_arg_count: 0,
            call_stack_size: table.int_lit(0),
        }
    }
}

fn parameter_register(index: usize) -> Option<Reg> {
    match index {
        0 => Some(RDI),
        1 => Some(RSI),
        2 => Some(RDX),
        3 => Some(RCX),
        4 => Some(R8),
        5 => Some(R9),
        _ => None,
    }
}

fn sse_parameter_register(index: usize) -> Option<Reg> {
    if index < MAX_SSE_REGISTER_PARAMS {
        Some(Reg::Xmm(index as u8))
    } else {
        None
    }
}

pub fn datatype_align(datatype: DataType) -> i64 {
    match datatype {
        DataType::Inte | DataType::Real => 8,
        DataType::Cara => 1,
    }
}

fn reg_size_of_bytes(bytes: u32) -> RegSize {
    match bytes {
        1 => RegSize::Byte,
        2 => RegSize::Word,
        4 => RegSize::Dword,
        8 => RegSize::Qword,
        other => panic!("no register size of {} bytes", other),
    }
}

struct Generator<'t> {
    table: &'t mut SymbolTable,
    data: AsmUnit,
    rodata: AsmUnit,
    text: AsmUnit,
}

impl<'t> Generator<'t> {
    fn section(&mut self, section: Section) -> &mut AsmUnit {
        match section {
            Section::Data => &mut self.data,
            Section::Rodata => &mut self.rodata,
        }
    }

    fn var_datatype(&self, sym: Sym) -> DataType {
        match self.table.var_data(sym) {
            Some(var) => var.datatype,
            None => panic!(
                "symbol kind {} has no declared type",
                self.table.data(sym).kind_name()
            ),
        }
    }

    // ----- data section ---------------------------------------------------

    fn gen_data(&mut self, tac: &Tac) {
        self.data
            .push(Stmt::Directive(Directive::plain(DirectiveName::Data)));

        for index in 0..tac.len() {
            let instruction = tac.node(index).instruction;
            match instruction.opcode {
                tac::Opcode::DefS => {
                    let name = instruction.dest.expect("defs names its global");
                    self.gen_align(Section::Data, datatype_align(self.var_datatype(name)));
                    self.data.push(Stmt::Label(name));
                    let init = instruction.srcs[0].expect("defs carries its initializer");
                    self.gen_sym_def(Section::Data, init);
                }
                tac::Opcode::DefV => {
                    let element = instruction.srcs[0].expect("defv carries its element");
                    self.gen_sym_def(Section::Data, element);
                }
                tac::Opcode::BeginVec => {
                    let name = instruction.dest.expect("beginvec names its vector");
                    self.gen_align(Section::Data, datatype_align(self.var_datatype(name)));
                    self.data.push(Stmt::Label(name));
                }
                tac::Opcode::EndVec => {
                    let name = instruction.dest.expect("endvec names its vector");
                    let fill = instruction.srcs[0].expect("endvec carries its fill count");
                    let fill = self.table.parsed_int(fill);
                    self.gen_zeroes_def(name, fill);
                }
                _ => {}
            }
        }
    }

    fn gen_align(&mut self, section: Section, align: i64) {
        let align = self.table.int_lit(align);
        self.section(section)
            .push(Stmt::Directive(Directive::with_operand(
                DirectiveName::Align,
                align,
            )));
    }

    /// One type-directed definition directive for a literal symbol.
    fn gen_sym_def(&mut self, section: Section, sym: Sym) {
        let statement = match self.table.data(sym) {
            SymData::CharLit(value) => {
                let value = *value;
                let lit = self.table.char_to_str_lit(value);
                Stmt::Directive(Directive::with_operand(DirectiveName::Ascii, lit))
            }
            SymData::IntLit(_) => {
                Stmt::Directive(Directive::with_operand(DirectiveName::Quad, sym))
            }
            SymData::FloatLit { .. } => {
                Stmt::Directive(Directive::with_operand(DirectiveName::Double, sym))
            }
            SymData::StrLit { .. } => {
                Stmt::Directive(Directive::with_operand(DirectiveName::Ascii, sym))
            }
            data => panic!(
                "symbol kind {} cannot be emitted as a definition",
                data.kind_name()
            ),
        };
        self.section(section).push(statement);
    }

    fn gen_zeroes_def(&mut self, vector: Sym, length: i64) {
        let size = match self.var_datatype(vector) {
            DataType::Inte | DataType::Real => length * 8,
            DataType::Cara => length,
        };
        if size > 0 {
            let size = self.table.int_lit(size);
            self.data.push(Stmt::Directive(Directive::with_operand(
                DirectiveName::Zero,
                size,
            )));
        }
    }

    // ----- rodata materialization -----------------------------------------

    fn ensure_string_addr(&mut self, sym: Sym) -> Sym {
        if let SymData::StrLit { addr: Some(addr), .. } = self.table.data(sym) {
            return *addr;
        }
        let addr = self.table.str_addr();
        if let SymData::StrLit { addr: slot, .. } = self.table.data_mut(sym) {
            *slot = Some(addr);
        }
        self.rodata.push(Stmt::Label(addr));
        self.gen_sym_def(Section::Rodata, sym);
        addr
    }

    fn ensure_float_addr(&mut self, sym: Sym) -> Sym {
        if let SymData::FloatLit { addr: Some(addr), .. } = self.table.data(sym) {
            return *addr;
        }
        let addr = self.table.float_addr();
        if let SymData::FloatLit { addr: slot, .. } = self.table.data_mut(sym) {
            *slot = Some(addr);
        }
        self.gen_align(Section::Rodata, 8);
        self.rodata.push(Stmt::Label(addr));
        self.gen_sym_def(Section::Rodata, sym);
        addr
    }

    // ----- operand materialization ----------------------------------------

    /// Produces an operand holding the value of `sym`, emitting whatever
    /// scratch loads that takes (R11 for addresses and wide integers,
    /// XMM12 for float constants).
    fn value_operand(&mut self, sym: Sym) -> Operand {
        match self.table.data(sym) {
            SymData::TmpVar(var) => {
                let slot = var.frame_slot.expect("temporary was given a frame slot");
                let disp = self.table.int_lit(-8 * (slot as i64 + 1));
                Operand::Displaced { base: RBP, disp }
            }
            SymData::ScalarVar(_) | SymData::VectorVar(_) => Operand::Displaced {
                base: Reg::Rip,
                disp: sym,
            },
            SymData::CharLit(_) => Operand::Immediate(sym),
            SymData::IntLit(value) => {
                let value = *value;
                let opcode = if value >= i64::from(i32::MIN) && value <= i64::from(i32::MAX) {
                    Opcode::Mov
                } else {
                    Opcode::Movabs
                };
                self.text.push_instruction(Instruction::binary(
                    opcode,
                    Operand::Direct(R11),
                    Operand::Immediate(sym),
                ));
                Operand::Direct(R11)
            }
            SymData::StrLit { .. } => {
                let addr = self.ensure_string_addr(sym);
                self.load_address(addr)
            }
            SymData::StrAddr => self.load_address(sym),
            SymData::FloatLit { .. } => {
                let addr = self.ensure_float_addr(sym);
                self.load_float(addr)
            }
            SymData::FloatAddr => self.load_float(sym),
            data => panic!(
                "symbol kind {} has no value operand",
                data.kind_name()
            ),
        }
    }

    fn load_address(&mut self, addr: Sym) -> Operand {
        self.text.push_instruction(Instruction::binary(
            Opcode::Lea,
            Operand::Direct(R11),
            Operand::Displaced {
                base: Reg::Rip,
                disp: addr,
            },
        ));
        Operand::Direct(R11)
    }

    fn load_float(&mut self, addr: Sym) -> Operand {
        self.text.push_instruction(Instruction::binary(
            Opcode::Movsd,
            Operand::Direct(XMM12),
            Operand::Displaced {
                base: Reg::Rip,
                disp: addr,
            },
        ));
        Operand::Direct(XMM12)
    }

    /// Zeroes the containing quadword before a byte or word slice write.
    fn prepare_reg_slice(&mut self, reg: Reg) {
        match reg.size() {
            RegSize::Byte | RegSize::Word => {
                let zero = self.table.int_lit(0);
                self.text.push_instruction(Instruction::binary(
                    Opcode::Mov,
                    Operand::Direct(reg.with_size(RegSize::Qword)),
                    Operand::Immediate(zero),
                ));
            }
            _ => {}
        }
    }

    /// `opcode reg_slice, <value of sym>` with the register sliced to the
    /// symbol's width (`lea` keeps the register as passed).
    fn gen_read(&mut self, sym: Sym, opcode: Opcode, reg: Reg) {
        let operand = self.value_operand(sym);
        let dst = if opcode == Opcode::Lea {
            reg
        } else {
            reg.with_size(symbol_reg_size(self.table, sym))
        };
        self.prepare_reg_slice(dst);
        self.text
            .push_instruction(Instruction::binary(opcode, Operand::Direct(dst), operand));
    }

    /// `opcode <location of sym>, reg_slice`.
    fn gen_write(&mut self, sym: Sym, opcode: Opcode, reg: Reg) {
        let operand = self.value_operand(sym);
        let src = reg.with_size(symbol_reg_size(self.table, sym));
        self.text
            .push_instruction(Instruction::binary(opcode, operand, Operand::Direct(src)));
    }

    // ----- text section ---------------------------------------------------

    fn gen_code(&mut self, tac: &Tac) {
        self.gen_code_headers(tac);
        self.gen_code_bodies(tac);
    }

    fn gen_code_headers(&mut self, tac: &Tac) {
        self.text
            .push(Stmt::Directive(Directive::plain(DirectiveName::Text)));
        self.rodata
            .push(Stmt::Directive(Directive::plain(DirectiveName::Rodata)));

        for instruction in tac.instructions() {
            if instruction.opcode == tac::Opcode::BeginFun {
                let name = instruction.dest.expect("beginfun names its function");
                self.text.push(Stmt::Directive(Directive::with_operand(
                    DirectiveName::Globl,
                    name,
                )));
                let annotation = self.table.intern("@function");
                self.table.symbol_mut(annotation).data = SymData::Annotation;
                self.text.push(Stmt::Directive(Directive {
                    name: DirectiveName::Type,
                    operands: vec![name, annotation],
                }));
            }
        }
    }

    fn gen_code_bodies(&mut self, tac: &Tac) {
        let mut call_state = CallState::new(self.table);

        for index in 0..tac.len() {
            let instruction = tac.node(index).instruction;
            match instruction.opcode {
                tac::Opcode::BeginFun => self.gen_beginfun(tac, index),
                tac::Opcode::Move => self.gen_move(&instruction),
                tac::Opcode::Movi => self.gen_movi(&instruction),
                tac::Opcode::Movv => self.gen_movv(&instruction),
                tac::Opcode::Add | tac::Opcode::Sub => {
                    if self.is_float_operation(&instruction) {
                        self.gen_float_bin(&instruction);
                    } else {
                        self.gen_simple_int_bin(&instruction);
                    }
                }
                tac::Opcode::And | tac::Opcode::Or => self.gen_simple_int_bin(&instruction),
                tac::Opcode::Mul => {
                    if self.is_float_operation(&instruction) {
                        self.gen_float_bin(&instruction);
                    } else {
                        self.gen_int_mul(&instruction);
                    }
                }
                tac::Opcode::Div => {
                    if self.is_float_operation(&instruction) {
                        self.gen_float_bin(&instruction);
                    } else {
                        self.gen_int_div(&instruction);
                    }
                }
                tac::Opcode::Not => self.gen_not(&instruction),
                tac::Opcode::Eq
                | tac::Opcode::Ne
                | tac::Opcode::Lt
                | tac::Opcode::Le
                | tac::Opcode::Gt
                | tac::Opcode::Ge => {
                    if self.is_float_operation(&instruction) {
                        self.gen_float_comparison(&instruction);
                    } else {
                        self.gen_int_comparison(&instruction);
                    }
                }
                tac::Opcode::ShMul => self.gen_shmul(&instruction),
                tac::Opcode::ShDiv => self.gen_shdiv(&instruction),
                tac::Opcode::Ret => self.gen_return(&instruction),
                tac::Opcode::Arg => self.gen_arg(tac, index, &mut call_state),
                tac::Opcode::Call => self.gen_call(&instruction, &mut call_state),
                tac::Opcode::Label => {
                    let label = instruction.srcs[0].expect("label names its target");
                    self.text.push(Stmt::Label(label));
                }
                tac::Opcode::Jump => {
                    let target = instruction.dest.expect("jump carries its target");
                    self.text
                        .push_instruction(Instruction::unary(Opcode::Jmp, Operand::Address(target)));
                }
                tac::Opcode::Ifz => self.gen_ifz(&instruction),
                tac::Opcode::Print => self.gen_print(&instruction),
                tac::Opcode::Read => self.gen_read_input(&instruction),
                tac::Opcode::DefS
                | tac::Opcode::DefV
                | tac::Opcode::DefP
                | tac::Opcode::BeginVec
                | tac::Opcode::EndVec
                | tac::Opcode::EndFun => {}
            }
        }

        self.gen_read_function();
    }

    /// Operand class of an arithmetic or comparison instruction, decided by
    /// its first source operand.
    fn is_float_operation(&self, instruction: &tac::Instruction) -> bool {
        let src = instruction.srcs[0].expect("binary operation reads a first operand");
        symbol_reg_size(self.table, src) == RegSize::Sse
    }

    fn gen_enter(&mut self) {
        self.text
            .push_instruction(Instruction::unary(Opcode::Push, Operand::Direct(RBP)));
        self.text.push_instruction(Instruction::binary(
            Opcode::Mov,
            Operand::Direct(RBP),
            Operand::Direct(RSP),
        ));
    }

    fn gen_leave(&mut self) {
        self.text.push_instruction(Instruction::binary(
            Opcode::Mov,
            Operand::Direct(RSP),
            Operand::Direct(RBP),
        ));
        self.text
            .push_instruction(Instruction::unary(Opcode::Pop, Operand::Direct(RBP)));
        self.text.push_instruction(Instruction::nullary(Opcode::Ret));
    }

    /// Function prologue: label, frame setup, ABI parameter unpacking into
    /// per-parameter globals, and stack-frame reservation for temporaries.
    fn gen_beginfun(&mut self, tac: &Tac, index: usize) {
        let name = tac.node(index).instruction.dest.expect("beginfun names its function");
        self.text.push(Stmt::Label(name));
        self.gen_enter();

        let mut int_index = 0;
        let mut sse_index = 0;
        let mut stack_index = 0;

        let mut cursor = index + 1;
        while cursor < tac.len() && tac.node(cursor).instruction.opcode == tac::Opcode::DefP {
            let param = tac.node(cursor).instruction.dest.expect("defp names its parameter");

            // Each parameter is backed by a zeroed global of its own width.
            self.data.push(Stmt::Label(param));
            match self.var_datatype(param) {
                DataType::Cara => {
                    let zero = self.table.char_lit(0);
                    self.gen_sym_def(Section::Data, zero);
                }
                DataType::Inte | DataType::Real => {
                    let zero = self.table.int_lit(0);
                    self.gen_sym_def(Section::Data, zero);
                }
            }

            if symbol_reg_size(self.table, param) == RegSize::Sse {
                match sse_parameter_register(sse_index) {
                    Some(reg) => self.gen_write(param, Opcode::Movq, reg),
                    None => {
                        self.load_stack_param(stack_index);
                        self.gen_write(param, Opcode::Mov, RAX);
                        stack_index += 1;
                    }
                }
                sse_index += 1;
            } else {
                match parameter_register(int_index) {
                    Some(reg) => self.gen_write(param, Opcode::Mov, reg),
                    None => {
                        self.load_stack_param(stack_index);
                        self.gen_write(param, Opcode::Mov, RAX);
                        stack_index += 1;
                    }
                }
                int_index += 1;
            }

            cursor += 1;
        }

        // Assign every temporary of the body a stack slot, first use first.
        let mut slots = 0;
        let mut body = index;
        while body < tac.len() && tac.node(body).instruction.opcode != tac::Opcode::EndFun {
            let instruction = tac.node(body).instruction;
            let operands = [instruction.dest, instruction.srcs[0], instruction.srcs[1]];
            for sym in operands.iter().flatten() {
                if let SymData::TmpVar(var) = self.table.data_mut(*sym) {
                    if var.frame_slot.is_none() {
                        var.frame_slot = Some(slots);
                        slots += 1;
                    }
                }
            }
            body += 1;
        }

        let mut frame_bytes = slots * 8;
        if frame_bytes % 16 != 0 {
            frame_bytes += 8;
        }
        let frame_bytes = self.table.int_lit(frame_bytes as i64);
        self.text.push_instruction(Instruction::binary(
            Opcode::Sub,
            Operand::Direct(RSP),
            Operand::Immediate(frame_bytes),
        ));
    }

    /// Loads the i-th stack-passed parameter, at `16 + 8*i(%rbp)` after the
    /// prologue.
    fn load_stack_param(&mut self, stack_index: usize) {
        let disp = self.table.int_lit(16 + 8 * stack_index as i64);
        self.text.push_instruction(Instruction::binary(
            Opcode::Mov,
            Operand::Direct(RAX),
            Operand::Displaced { base: RBP, disp },
        ));
    }

    fn gen_move(&mut self, instruction: &tac::Instruction) {
        let src = instruction.srcs[0].expect("move reads its source");
        let dest = instruction.dest.expect("move writes its destination");
        self.gen_read(src, Opcode::Mov, RAX);
        self.gen_write(dest, Opcode::Mov, RAX);
    }

    fn gen_movi(&mut self, instruction: &tac::Instruction) {
        let base = instruction.srcs[0].expect("movi reads a vector");
        let index = instruction.srcs[1].expect("movi reads an index");
        let dest = instruction.dest.expect("movi writes its destination");

        let element_size = symbol_data_size(self.table, base);
        self.gen_read(base, Opcode::Lea, RAX);
        self.gen_read(index, Opcode::Mov, R9);

        let zero = self.table.int_lit(0);
        self.text.push_instruction(Instruction::binary(
            Opcode::Mov,
            Operand::Direct(R8.with_size(reg_size_of_bytes(element_size))),
            Operand::Indexed {
                base: RAX,
                index: R9,
                disp: zero,
                scale: element_size,
            },
        ));

        self.gen_write(dest, Opcode::Mov, R8);
    }

    fn gen_movv(&mut self, instruction: &tac::Instruction) {
        let dest = instruction.dest.expect("movv writes a vector");
        let index = instruction.srcs[0].expect("movv reads an index");
        let value = instruction.srcs[1].expect("movv reads a value");

        let element_size = symbol_data_size(self.table, dest);
        self.gen_read(index, Opcode::Mov, RAX);
        self.gen_read(value, Opcode::Mov, R9);
        self.gen_read(dest, Opcode::Lea, R8);

        let zero = self.table.int_lit(0);
        self.text.push_instruction(Instruction::binary(
            Opcode::Mov,
            Operand::Indexed {
                base: R8,
                index: RAX,
                disp: zero,
                scale: element_size,
            },
            Operand::Direct(R9.with_size(reg_size_of_bytes(element_size))),
        ));
    }

    fn gen_simple_int_bin(&mut self, instruction: &tac::Instruction) {
        let left = instruction.srcs[0].expect("binary operation reads a left operand");
        let right = instruction.srcs[1].expect("binary operation reads a right operand");
        let dest = instruction.dest.expect("binary operation writes a destination");

        self.gen_read(left, Opcode::Mov, RAX);
        let opcode = match instruction.opcode {
            tac::Opcode::Add => Opcode::Add,
            tac::Opcode::Sub => Opcode::Sub,
            tac::Opcode::And => Opcode::And,
            tac::Opcode::Or => Opcode::Or,
            other => panic!("{:?} is not a simple integer operation", other),
        };
        self.gen_read(right, opcode, RAX);
        self.gen_write(dest, Opcode::Mov, RAX);
    }

    fn gen_float_bin(&mut self, instruction: &tac::Instruction) {
        let left = instruction.srcs[0].expect("binary operation reads a left operand");
        let right = instruction.srcs[1].expect("binary operation reads a right operand");
        let dest = instruction.dest.expect("binary operation writes a destination");

        self.gen_read(left, Opcode::Movq, XMM15);
        let opcode = match instruction.opcode {
            tac::Opcode::Add => Opcode::Addsd,
            tac::Opcode::Sub => Opcode::Subsd,
            tac::Opcode::Mul => Opcode::Mulsd,
            tac::Opcode::Div => Opcode::Divsd,
            other => panic!("{:?} is not a float arithmetic operation", other),
        };
        self.gen_read(right, opcode, XMM15);
        self.gen_write(dest, Opcode::Movq, XMM15);
    }

    fn gen_int_mul(&mut self, instruction: &tac::Instruction) {
        let left = instruction.srcs[0].expect("mul reads a left operand");
        let right = instruction.srcs[1].expect("mul reads a right operand");
        let dest = instruction.dest.expect("mul writes a destination");

        self.gen_read(left, Opcode::Mov, RAX);
        let operand = self.value_operand(right);
        self.text
            .push_instruction(Instruction::unary(Opcode::Imul, operand));
        self.gen_write(dest, Opcode::Mov, RAX);
    }

    fn gen_int_div(&mut self, instruction: &tac::Instruction) {
        let left = instruction.srcs[0].expect("div reads a left operand");
        let right = instruction.srcs[1].expect("div reads a right operand");
        let dest = instruction.dest.expect("div writes a destination");

        self.gen_read(left, Opcode::Mov, RAX);
        self.text.push_instruction(Instruction::nullary(Opcode::Cqo));
        let operand = self.value_operand(right);
        self.text
            .push_instruction(Instruction::unary(Opcode::Idiv, operand));
        self.gen_write(dest, Opcode::Mov, RAX);
    }

    /// Logical not: bitwise complement masked down to the low bit.
    fn gen_not(&mut self, instruction: &tac::Instruction) {
        let operand = instruction.srcs[0].expect("not reads its operand");
        let dest = instruction.dest.expect("not writes a destination");

        self.gen_read(operand, Opcode::Mov, RAX);
        self.text
            .push_instruction(Instruction::unary(Opcode::Not, Operand::Direct(RAX)));
        let one = self.table.int_lit(1);
        self.text.push_instruction(Instruction::binary(
            Opcode::And,
            Operand::Direct(RAX),
            Operand::Immediate(one),
        ));
        self.gen_write(dest, Opcode::Mov, RAX);
    }

    fn gen_int_comparison(&mut self, instruction: &tac::Instruction) {
        let left = instruction.srcs[0].expect("comparison reads a left operand");
        let right = instruction.srcs[1].expect("comparison reads a right operand");
        let dest = instruction.dest.expect("comparison writes a destination");

        self.gen_read(left, Opcode::Mov, RAX);
        self.gen_read(right, Opcode::Mov, R10);
        self.text.push_instruction(Instruction::binary(
            Opcode::Cmp,
            Operand::Direct(RAX),
            Operand::Direct(R10),
        ));

        let set = match instruction.opcode {
            tac::Opcode::Eq => Opcode::Setz,
            tac::Opcode::Ne => Opcode::Setnz,
            tac::Opcode::Lt => Opcode::Setl,
            tac::Opcode::Le => Opcode::Setle,
            tac::Opcode::Gt => Opcode::Setg,
            tac::Opcode::Ge => Opcode::Setge,
            other => panic!("{:?} is not a comparison", other),
        };
        let r10b = R10.with_size(RegSize::Byte);
        self.prepare_reg_slice(r10b);
        self.text
            .push_instruction(Instruction::unary(set, Operand::Direct(r10b)));
        self.gen_write(dest, Opcode::Mov, R10);
    }

    fn set_flag(&mut self, set: Opcode, reg: Reg) {
        self.text
            .push_instruction(Instruction::unary(set, Operand::Direct(reg)));
    }

    /// Float comparisons must reject unordered results: `ucomisd` raises
    /// the parity flag on NaN, so every predicate that would otherwise
    /// accept NaN gets conjoined with `setnp`.
    fn gen_float_comparison(&mut self, instruction: &tac::Instruction) {
        let left = instruction.srcs[0].expect("comparison reads a left operand");
        let right = instruction.srcs[1].expect("comparison reads a right operand");
        let dest = instruction.dest.expect("comparison writes a destination");

        self.gen_read(left, Opcode::Movsd, XMM13);
        self.gen_read(right, Opcode::Movsd, XMM14);
        self.text.push_instruction(Instruction::binary(
            Opcode::Ucomisd,
            Operand::Direct(XMM13),
            Operand::Direct(XMM14),
        ));

        let r11b = R11.with_size(RegSize::Byte);
        let r10b = R10.with_size(RegSize::Byte);
        let and_r11_r10 =
            Instruction::binary(Opcode::And, Operand::Direct(R11), Operand::Direct(R10));
        let or_r11_r10 =
            Instruction::binary(Opcode::Or, Operand::Direct(R11), Operand::Direct(R10));

        match instruction.opcode {
            tac::Opcode::Eq => {
                self.prepare_reg_slice(r11b);
                self.prepare_reg_slice(r10b);
                self.set_flag(Opcode::Setz, r11b);
                self.set_flag(Opcode::Setnp, r10b);
                self.text.push_instruction(and_r11_r10);
            }
            tac::Opcode::Ne => {
                self.prepare_reg_slice(r11b);
                self.set_flag(Opcode::Setnz, r11b);
            }
            tac::Opcode::Lt => {
                self.prepare_reg_slice(r11b);
                self.prepare_reg_slice(r10b);
                self.set_flag(Opcode::Setc, r11b);
                self.set_flag(Opcode::Setnp, r10b);
                self.text.push_instruction(and_r11_r10);
            }
            tac::Opcode::Le => {
                self.prepare_reg_slice(r11b);
                self.prepare_reg_slice(r10b);
                self.set_flag(Opcode::Setc, r11b);
                self.set_flag(Opcode::Setz, r10b);
                self.text.push_instruction(or_r11_r10);
                self.set_flag(Opcode::Setnp, r10b);
                self.text.push_instruction(and_r11_r10);
            }
            tac::Opcode::Gt => {
                self.prepare_reg_slice(r11b);
                self.prepare_reg_slice(r10b);
                self.set_flag(Opcode::Setnc, r11b);
                self.set_flag(Opcode::Setnz, r10b);
                self.text.push_instruction(and_r11_r10);
            }
            tac::Opcode::Ge => {
                self.prepare_reg_slice(r11b);
                self.set_flag(Opcode::Setnc, r11b);
            }
            other => panic!("{:?} is not a comparison", other),
        }

        self.gen_write(dest, Opcode::Mov, R11);
    }

    fn gen_shmul(&mut self, instruction: &tac::Instruction) {
        let value = instruction.srcs[0].expect("shmul reads its operand");
        let amount = instruction.srcs[1].expect("shmul carries its shift amount");
        let dest = instruction.dest.expect("shmul writes a destination");
        let amount = self.table.parsed_int(amount);
        let magnitude = amount.unsigned_abs();

        self.gen_read(value, Opcode::Mov, RAX);
        if amount < 0 {
            self.text
                .push_instruction(Instruction::unary(Opcode::Neg, Operand::Direct(RAX)));
        }

        if magnitude <= 3 {
            // Scales up to 8 fit the addressing mode directly.
            let zero = self.table.int_lit(0);
            self.text.push_instruction(Instruction::binary(
                Opcode::Lea,
                Operand::Direct(RAX),
                Operand::Scaled {
                    index: RAX,
                    disp: zero,
                    scale: 1 << magnitude,
                },
            ));
        } else {
            let shift = self.table.int_lit(magnitude as i64);
            self.text.push_instruction(Instruction::binary(
                Opcode::Shl,
                Operand::Direct(RAX),
                Operand::Immediate(shift),
            ));
        }

        self.gen_write(dest, Opcode::Mov, RAX);
    }

    /// Arithmetic right shift with the negative-dividend correction: shift
    /// the biased value when the input is negative so the result rounds
    /// toward zero like `idiv` would.
    fn gen_shdiv(&mut self, instruction: &tac::Instruction) {
        let value = instruction.srcs[0].expect("shdiv reads its operand");
        let amount = instruction.srcs[1].expect("shdiv carries its shift amount");
        let dest = instruction.dest.expect("shdiv writes a destination");
        let amount = self.table.parsed_int(amount);
        let magnitude = amount.unsigned_abs() as u32;

        self.gen_read(value, Opcode::Mov, RAX);

        let bias = self.table.int_lit(1i64.wrapping_shl(magnitude).wrapping_sub(1));
        self.text.push_instruction(Instruction::binary(
            Opcode::Lea,
            Operand::Direct(R9),
            Operand::Displaced {
                base: RAX,
                disp: bias,
            },
        ));
        self.text.push_instruction(Instruction::binary(
            Opcode::Test,
            Operand::Direct(RAX),
            Operand::Direct(RAX),
        ));
        self.text.push_instruction(Instruction::binary(
            Opcode::Cmovns,
            Operand::Direct(R9),
            Operand::Direct(RAX),
        ));
        let shift = self.table.int_lit(i64::from(magnitude));
        self.text.push_instruction(Instruction::binary(
            Opcode::Sar,
            Operand::Direct(R9),
            Operand::Immediate(shift),
        ));

        if amount < 0 {
            self.text
                .push_instruction(Instruction::unary(Opcode::Neg, Operand::Direct(R9)));
        }

        self.gen_write(dest, Opcode::Mov, R9);
    }

    fn gen_return(&mut self, instruction: &tac::Instruction) {
        let value = instruction.srcs[0].expect("ret carries its value");
        if symbol_reg_size(self.table, value) == RegSize::Sse {
            self.gen_read(value, Opcode::Movq, XMM0);
        } else {
            self.gen_read(value, Opcode::Mov, RAX);
        }
        self.gen_leave();
    }

    /// Stages one call argument. The first `arg` of a sequence scans ahead
    /// to the `call`, counts integer and SSE arguments and reserves the
    /// 16-byte aligned stack region for the overflow ones.
    fn gen_arg(&mut self, tac: &Tac, index: usize, state: &mut CallState) {
        if state.arg_index == 0 && state.sse_arg_index == 0 {
            let mut cursor = index;
            while cursor < tac.len() && tac.node(cursor).instruction.opcode != tac::Opcode::Call {
                let scanned = tac.node(cursor).instruction;
                if scanned.opcode == tac::Opcode::Arg {
                    let sym = scanned.srcs[0].expect("arg stages a value");
                    if symbol_reg_size(self.table, sym) == RegSize::Sse {
                        state.sse_arg_count += 1;
                    } else {
                        state.arg_count += 1;
                    }
                }
                cursor += 1;
            }

            let mut stack_size = 0;
            if state.arg_count > MAX_REGISTER_PARAMS {
                stack_size += state.arg_count - MAX_REGISTER_PARAMS;
            }
            if state.sse_arg_count > MAX_SSE_REGISTER_PARAMS {
                stack_size += state.sse_arg_count - MAX_SSE_REGISTER_PARAMS;
            }
            let mut stack_size = stack_size * 8;
            if stack_size % 16 == 8 {
                stack_size += 8;
            }
            state.call_stack_size = self.table.int_lit(stack_size as i64);

            self.text.push_instruction(Instruction::binary(
                Opcode::Sub,
                Operand::Direct(RSP),
                Operand::Immediate(state.call_stack_size),
            ));
        }

        let sym = tac.node(index).instruction.srcs[0].expect("arg stages a value");
        let mut reg = RAX;
        let opcode;
        if symbol_reg_size(self.table, sym) == RegSize::Sse {
            match sse_parameter_register(state.sse_arg_index) {
                Some(parameter_reg) => {
                    reg = parameter_reg;
                    opcode = Opcode::Movq;
                }
                None => {
                    state.stack_arg_count += 1;
                    opcode = Opcode::Mov;
                }
            }
            state.sse_arg_index += 1;
        } else {
            if let Some(parameter_reg) = parameter_register(state.arg_index) {
                reg = parameter_reg;
            } else {
                state.stack_arg_count += 1;
            }
            opcode = Opcode::Mov;
            state.arg_index += 1;
        }

        self.gen_read(sym, opcode, reg);

        if reg == RAX {
            let disp = self.table.int_lit(((state.stack_arg_count - 1) * 8) as i64);
            self.text.push_instruction(Instruction::binary(
                Opcode::Mov,
                Operand::Displaced { base: RSP, disp },
                Operand::Direct(RAX),
            ));
        }
    }

    fn gen_call(&mut self, instruction: &tac::Instruction, state: &mut CallState) {
        let function = instruction.srcs[0].expect("call names its function");
        let dest = instruction.dest.expect("call writes its result");

        self.text
            .push_instruction(Instruction::unary(Opcode::Call, Operand::Address(function)));
        self.text.push_instruction(Instruction::binary(
            Opcode::Add,
            Operand::Direct(RSP),
            Operand::Immediate(state.call_stack_size),
        ));

        if symbol_reg_size(self.table, dest) == RegSize::Sse {
            self.gen_write(dest, Opcode::Movq, XMM0);
        } else {
            self.gen_write(dest, Opcode::Mov, RAX);
        }

        *state = CallState::new(self.table);
    }

    fn gen_ifz(&mut self, instruction: &tac::Instruction) {
        let condition = instruction.srcs[0].expect("ifz reads its condition");
        let target = instruction.dest.expect("ifz carries its target");

        self.gen_read(condition, Opcode::Mov, RAX);
        self.text.push_instruction(Instruction::binary(
            Opcode::Test,
            Operand::Direct(RAX),
            Operand::Direct(RAX),
        ));
        self.text
            .push_instruction(Instruction::unary(Opcode::Jz, Operand::Address(target)));
    }

    fn extern_sym(&mut self, name: &str) -> Sym {
        let sym = self.table.intern(name);
        self.table.symbol_mut(sym).data = SymData::External;
        sym
    }

    /// `stdin`/`stdout` are accessed like 8-byte scalar globals.
    fn stdio_sym(&mut self, name: &str) -> Sym {
        let sym = self.table.intern(name);
        let mut var = VarData::new(DataType::Inte);
        var.in_scope = true;
        self.table.symbol_mut(sym).data = SymData::ScalarVar(var);
        sym
    }

    fn gen_call_plt(&mut self, name: &str) {
        let sym = self.extern_sym(name);
        self.text
            .push_instruction(Instruction::unary(Opcode::Call, Operand::Plt(sym)));
    }

    fn gen_print(&mut self, instruction: &tac::Instruction) {
        let value = instruction.srcs[0].expect("print reads its value");

        let datatype = match self.table.data(value) {
            SymData::CharLit(_) => Some(DataType::Cara),
            SymData::IntLit(_) => Some(DataType::Inte),
            SymData::FloatLit { .. } => Some(DataType::Real),
            SymData::StrLit { .. } => None,
            SymData::ScalarVar(var) | SymData::TmpVar(var) => Some(var.datatype),
            data => panic!("symbol kind {} cannot be printed", data.kind_name()),
        };

        match datatype {
            None => self.gen_print_string(value),
            Some(datatype) => self.gen_print_scalar(value, datatype),
        }
    }

    /// Strings go out through `fwrite(buf, 1, len, stdout)`; they are not
    /// NUL-terminated in rodata.
    fn gen_print_string(&mut self, value: Sym) {
        let operand = self.value_operand(value);
        self.text.push_instruction(Instruction::binary(
            Opcode::Mov,
            Operand::Direct(RDI),
            operand,
        ));

        let one = self.table.int_lit(1);
        let operand = self.value_operand(one);
        self.text.push_instruction(Instruction::binary(
            Opcode::Mov,
            Operand::Direct(RSI),
            operand,
        ));

        let length = self.table.str_bytes(value).len() as i64;
        let length = self.table.int_lit(length);
        let operand = self.value_operand(length);
        self.text.push_instruction(Instruction::binary(
            Opcode::Mov,
            Operand::Direct(RDX),
            operand,
        ));

        let stdout = self.stdio_sym("stdout");
        self.text.push_instruction(Instruction::binary(
            Opcode::Mov,
            Operand::Direct(RCX),
            Operand::Displaced {
                base: Reg::Rip,
                disp: stdout,
            },
        ));

        self.gen_call_plt("fwrite");
    }

    /// Scalars go out through `printf` with a type-picked format string.
    /// The variadic convention wants the number of XMM arguments in RAX.
    fn gen_print_scalar(&mut self, value: Sym, datatype: DataType) {
        let (format, opcode, reg, sse_count) = match datatype {
            DataType::Cara => (&b"%c\0"[..], Opcode::Mov, RSI, 0i64),
            DataType::Inte => (&b"%li\0"[..], Opcode::Mov, RSI, 0),
            DataType::Real => (&b"%lf\0"[..], Opcode::Movq, XMM0, 1),
        };

        let format = self.table.str_lit(format);
        self.gen_read(format, Opcode::Mov, RDI);
        self.gen_read(value, opcode, reg);

        let sse_count = self.table.int_lit(sse_count);
        self.text.push_instruction(Instruction::binary(
            Opcode::Mov,
            Operand::Direct(RAX),
            Operand::Immediate(sse_count),
        ));

        self.gen_call_plt("printf");
    }

    fn gen_compare_jump(&mut self, value: i64, jump: Opcode, target: Sym) {
        let value = self.table.int_lit(value);
        self.text.push_instruction(Instruction::binary(
            Opcode::Cmp,
            Operand::Direct(RAX),
            Operand::Immediate(value),
        ));
        self.text
            .push_instruction(Instruction::unary(jump, Operand::Address(target)));
    }

    fn gen_read_input(&mut self, instruction: &tac::Instruction) {
        let dest = instruction.dest.expect("read writes its destination");

        let entrada = self.table.intern("@entrada");
        self.table.symbol_mut(entrada).data = SymData::Label;
        self.text
            .push_instruction(Instruction::unary(Opcode::Call, Operand::Address(entrada)));

        self.gen_write(dest, Opcode::Mov, RAX);
    }

    /// The `@entrada` runtime routine, emitted once per translation unit.
    ///
    /// Reads bytes with `getchar` until a sign or digit shows up, pushes
    /// that byte back with `ungetc` and lets `scanf("%li")` parse the
    /// number into the local frame slot; anything short of a full parse
    /// restarts the whole dance. The parsed value is returned in RAX.
    fn gen_read_function(&mut self) {
        let name = self.table.intern("@entrada");
        self.table.symbol_mut(name).data = SymData::Label;
        self.text.push(Stmt::Label(name));
        self.gen_enter();

        let frame = self.table.int_lit(16);
        self.text.push_instruction(Instruction::binary(
            Opcode::Sub,
            Operand::Direct(RSP),
            Operand::Immediate(frame),
        ));

        let retry = self.table.label();
        let retry_done = self.table.label();

        self.text.push(Stmt::Label(retry));
        self.gen_call_plt("getchar");

        self.gen_compare_jump(i64::from(b'+'), Opcode::Jz, retry_done);
        self.gen_compare_jump(i64::from(b'-'), Opcode::Jz, retry_done);
        self.gen_compare_jump(i64::from(b'0'), Opcode::Jl, retry);
        self.gen_compare_jump(i64::from(b'9'), Opcode::Jg, retry);

        self.text.push(Stmt::Label(retry_done));

        // ungetc(c, stdin)
        self.text.push_instruction(Instruction::binary(
            Opcode::Mov,
            Operand::Direct(RDI),
            Operand::Direct(RAX),
        ));
        let stdin = self.stdio_sym("stdin");
        self.text.push_instruction(Instruction::binary(
            Opcode::Mov,
            Operand::Direct(RSI),
            Operand::Displaced {
                base: Reg::Rip,
                disp: stdin,
            },
        ));
        self.gen_call_plt("ungetc");

        // scanf("%li", &slot)
        let format = self.table.str_lit(b"%li\0");
        self.gen_read(format, Opcode::Mov, RDI);
        let slot = self.table.int_lit(-8);
        self.text.push_instruction(Instruction::binary(
            Opcode::Lea,
            Operand::Direct(RSI),
            Operand::Displaced {
                base: RBP,
                disp: slot,
            },
        ));
        self.text.push_instruction(Instruction::binary(
            Opcode::Xor,
            Operand::Direct(RAX),
            Operand::Direct(RAX),
        ));
        self.gen_call_plt("scanf");

        self.gen_compare_jump(1, Opcode::Jnz, retry);

        let slot = self.table.int_lit(-8);
        self.text.push_instruction(Instruction::binary(
            Opcode::Mov,
            Operand::Direct(RAX),
            Operand::Displaced {
                base: RBP,
                disp: slot,
            },
        ));

        self.gen_leave();
    }
}
