//! Typed model of the x86-64 assembly emitted by the back end, plus its
//! textual rendering in GNU Assembler AT&T syntax.
//!
//! Instructions keep their operands in `[destination, source]` order; the
//! renderer reverses them into AT&T source-first order. Labels are always
//! emitted quoted (`"name":`) so that compiler-generated names like
//! `@label_3` survive the assembler.

pub mod gen;
pub mod opt;

use std::io::{self, Write};
use symtab::{DataType, Sym, SymData, SymbolTable};

/// Width of a register or memory operand in bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum RegSize {
    Byte,
    Word,
    Dword,
    Qword,
    /// 128-bit SSE register; never takes a size suffix.
    Sse,
}

impl RegSize {
    pub fn bytes(self) -> u32 {
        match self {
            RegSize::Byte => 1,
            RegSize::Word => 2,
            RegSize::Dword => 4,
            RegSize::Qword => 8,
            RegSize::Sse => 16,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            RegSize::Byte => "b",
            RegSize::Word => "w",
            RegSize::Dword => "l",
            RegSize::Qword => "q",
            RegSize::Sse => "",
        }
    }
}

/// General-purpose register family, independent of access width.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GprName {
    Ax,
    Bx,
    Cx,
    Dx,
    Si,
    Di,
    Sp,
    Bp,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
}

impl GprName {
    fn byte_name(self) -> &'static str {
        match self {
            GprName::Ax => "al",
            GprName::Bx => "bl",
            GprName::Cx => "cl",
            GprName::Dx => "dl",
            GprName::Si => "sil",
            GprName::Di => "dil",
            GprName::Sp => "spl",
            GprName::Bp => "bpl",
            GprName::R8 => "r8b",
            GprName::R9 => "r9b",
            GprName::R10 => "r10b",
            GprName::R11 => "r11b",
            GprName::R12 => "r12b",
            GprName::R13 => "r13b",
            GprName::R14 => "r14b",
            GprName::R15 => "r15b",
        }
    }

    fn word_name(self) -> &'static str {
        match self {
            GprName::Ax => "ax",
            GprName::Bx => "bx",
            GprName::Cx => "cx",
            GprName::Dx => "dx",
            GprName::Si => "si",
            GprName::Di => "di",
            GprName::Sp => "sp",
            GprName::Bp => "bp",
            GprName::R8 => "r8w",
            GprName::R9 => "r9w",
            GprName::R10 => "r10w",
            GprName::R11 => "r11w",
            GprName::R12 => "r12w",
            GprName::R13 => "r13w",
            GprName::R14 => "r14w",
            GprName::R15 => "r15w",
        }
    }

    fn dword_name(self) -> &'static str {
        match self {
            GprName::Ax => "eax",
            GprName::Bx => "ebx",
            GprName::Cx => "ecx",
            GprName::Dx => "edx",
            GprName::Si => "esi",
            GprName::Di => "edi",
            GprName::Sp => "esp",
            GprName::Bp => "ebp",
            GprName::R8 => "r8d",
            GprName::R9 => "r9d",
            GprName::R10 => "r10d",
            GprName::R11 => "r11d",
            GprName::R12 => "r12d",
            GprName::R13 => "r13d",
            GprName::R14 => "r14d",
            GprName::R15 => "r15d",
        }
    }

    fn qword_name(self) -> &'static str {
        match self {
            GprName::Ax => "rax",
            GprName::Bx => "rbx",
            GprName::Cx => "rcx",
            GprName::Dx => "rdx",
            GprName::Si => "rsi",
            GprName::Di => "rdi",
            GprName::Sp => "rsp",
            GprName::Bp => "rbp",
            GprName::R8 => "r8",
            GprName::R9 => "r9",
            GprName::R10 => "r10",
            GprName::R11 => "r11",
            GprName::R12 => "r12",
            GprName::R13 => "r13",
            GprName::R14 => "r14",
            GprName::R15 => "r15",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Reg {
    Gpr(GprName, RegSize),
    Rip,
    Xmm(u8),
}

pub const RAX: Reg = Reg::Gpr(GprName::Ax, RegSize::Qword);
pub const RCX: Reg = Reg::Gpr(GprName::Cx, RegSize::Qword);
pub const RDX: Reg = Reg::Gpr(GprName::Dx, RegSize::Qword);
pub const RSI: Reg = Reg::Gpr(GprName::Si, RegSize::Qword);
pub const RDI: Reg = Reg::Gpr(GprName::Di, RegSize::Qword);
pub const RSP: Reg = Reg::Gpr(GprName::Sp, RegSize::Qword);
pub const RBP: Reg = Reg::Gpr(GprName::Bp, RegSize::Qword);
pub const R8: Reg = Reg::Gpr(GprName::R8, RegSize::Qword);
pub const R9: Reg = Reg::Gpr(GprName::R9, RegSize::Qword);
pub const R10: Reg = Reg::Gpr(GprName::R10, RegSize::Qword);
pub const R11: Reg = Reg::Gpr(GprName::R11, RegSize::Qword);
pub const XMM0: Reg = Reg::Xmm(0);
pub const XMM12: Reg = Reg::Xmm(12);
pub const XMM13: Reg = Reg::Xmm(13);
pub const XMM14: Reg = Reg::Xmm(14);
pub const XMM15: Reg = Reg::Xmm(15);

impl Reg {
    pub fn size(self) -> RegSize {
        match self {
            Reg::Gpr(_, size) => size,
            Reg::Rip => RegSize::Qword,
            Reg::Xmm(_) => RegSize::Sse,
        }
    }

    /// The same register accessed at another width. Resizing to SSE is the
    /// identity: it only ever happens when a value already lives in an XMM
    /// register.
    pub fn with_size(self, size: RegSize) -> Reg {
        if size == RegSize::Sse {
            return self;
        }
        match self {
            Reg::Gpr(name, _) => Reg::Gpr(name, size),
            Reg::Rip => panic!("the instruction pointer is not resizable"),
            Reg::Xmm(_) => panic!("SSE registers are not resizable"),
        }
    }

    /// Whether the two registers alias the same storage, ignoring width.
    pub fn family_eq(self, other: Reg) -> bool {
        match (self, other) {
            (Reg::Gpr(left, _), Reg::Gpr(right, _)) => left == right,
            (Reg::Rip, Reg::Rip) => true,
            (Reg::Xmm(left), Reg::Xmm(right)) => left == right,
            _ => false,
        }
    }

    pub fn name(self) -> String {
        match self {
            Reg::Rip => "rip".to_owned(),
            Reg::Xmm(index) => format!("xmm{}", index),
            Reg::Gpr(name, size) => match size {
                RegSize::Byte => name.byte_name().to_owned(),
                RegSize::Word => name.word_name().to_owned(),
                RegSize::Dword => name.dword_name().to_owned(),
                RegSize::Qword => name.qword_name().to_owned(),
                RegSize::Sse => panic!("general purpose registers have no SSE width"),
            },
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Opcode {
    Mov,
    Movabs,
    Cmovns,
    Lea,
    Not,
    Shl,
    Sar,
    And,
    Or,
    Xor,
    Add,
    Inc,
    Neg,
    Sub,
    Dec,
    Imul,
    Idiv,
    Cqo,
    Test,
    Cmp,
    Jmp,
    Jz,
    Jnz,
    Jc,
    Jnc,
    Jp,
    Jnp,
    Jl,
    Jg,
    Jle,
    Jge,
    Setz,
    Setnz,
    Setp,
    Setnp,
    Setc,
    Setnc,
    Setg,
    Setge,
    Setl,
    Setle,
    Push,
    Pop,
    Call,
    Ret,
    Movq,
    Movsd,
    Addsd,
    Subsd,
    Mulsd,
    Divsd,
    Ucomisd,
}

/// Implicit and explicit operand roles, used by the peephole pass to reason
/// about reads and writes without decoding each instruction.
pub const OPERAND_0_SRC: u16 = 1 << 0;
pub const OPERAND_0_DEST: u16 = 1 << 1;
pub const OPERAND_1_SRC: u16 = 1 << 2;
pub const OPERAND_1_DEST: u16 = 1 << 3;
pub const OPERAND_RAX_SRC: u16 = 1 << 4;
pub const OPERAND_RAX_DEST: u16 = 1 << 5;
pub const OPERAND_RDX_SRC: u16 = 1 << 6;
pub const OPERAND_RDX_DEST: u16 = 1 << 7;
pub const OPERAND_RSP_SRC: u16 = 1 << 8;
pub const OPERAND_RSP_DEST: u16 = 1 << 9;
pub const OPERAND_RIP_SRC: u16 = 1 << 10;
pub const OPERAND_RIP_DEST: u16 = 1 << 11;
pub const OPERAND_EFLAGS_SRC: u16 = 1 << 12;
pub const OPERAND_EFLAGS_DEST: u16 = 1 << 13;

impl Opcode {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Mov => "mov",
            Opcode::Movabs => "movabs",
            Opcode::Cmovns => "cmovns",
            Opcode::Lea => "lea",
            Opcode::Not => "not",
            Opcode::Shl => "shl",
            Opcode::Sar => "sar",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::Add => "add",
            Opcode::Inc => "inc",
            Opcode::Neg => "neg",
            Opcode::Sub => "sub",
            Opcode::Dec => "dec",
            Opcode::Imul => "imul",
            Opcode::Idiv => "idiv",
            Opcode::Cqo => "cqo",
            Opcode::Test => "test",
            Opcode::Cmp => "cmp",
            Opcode::Jmp => "jmp",
            Opcode::Jz => "jz",
            Opcode::Jnz => "jnz",
            Opcode::Jc => "jc",
            Opcode::Jnc => "jnc",
            Opcode::Jp => "jp",
            Opcode::Jnp => "jnp",
            Opcode::Jl => "jl",
            Opcode::Jg => "jg",
            Opcode::Jle => "jle",
            Opcode::Jge => "jge",
            Opcode::Setz => "setz",
            Opcode::Setnz => "setnz",
            Opcode::Setp => "setp",
            Opcode::Setnp => "setnp",
            Opcode::Setc => "setc",
            Opcode::Setnc => "setnc",
            Opcode::Setg => "setg",
            Opcode::Setge => "setge",
            Opcode::Setl => "setl",
            Opcode::Setle => "setle",
            Opcode::Push => "push",
            Opcode::Pop => "pop",
            Opcode::Call => "call",
            Opcode::Ret => "ret",
            Opcode::Movq => "movq",
            Opcode::Movsd => "movsd",
            Opcode::Addsd => "addsd",
            Opcode::Subsd => "subsd",
            Opcode::Mulsd => "mulsd",
            Opcode::Divsd => "divsd",
            Opcode::Ucomisd => "ucomisd",
        }
    }

    fn needs_size_suffix(self) -> bool {
        match self {
            Opcode::Mov
            | Opcode::Movabs
            | Opcode::Xor
            | Opcode::Not
            | Opcode::And
            | Opcode::Or
            | Opcode::Lea
            | Opcode::Add
            | Opcode::Neg
            | Opcode::Sub
            | Opcode::Inc
            | Opcode::Dec
            | Opcode::Imul
            | Opcode::Idiv
            | Opcode::Test
            | Opcode::Cmp
            | Opcode::Push
            | Opcode::Pop
            | Opcode::Call
            | Opcode::Ret
            | Opcode::Shl
            | Opcode::Sar => true,
            Opcode::Cmovns
            | Opcode::Cqo
            | Opcode::Jmp
            | Opcode::Jz
            | Opcode::Jnz
            | Opcode::Jc
            | Opcode::Jnc
            | Opcode::Jp
            | Opcode::Jnp
            | Opcode::Jl
            | Opcode::Jg
            | Opcode::Jle
            | Opcode::Jge
            | Opcode::Setz
            | Opcode::Setnz
            | Opcode::Setp
            | Opcode::Setnp
            | Opcode::Setc
            | Opcode::Setnc
            | Opcode::Setg
            | Opcode::Setge
            | Opcode::Setl
            | Opcode::Setle
            | Opcode::Movq
            | Opcode::Movsd
            | Opcode::Addsd
            | Opcode::Subsd
            | Opcode::Mulsd
            | Opcode::Divsd
            | Opcode::Ucomisd => false,
        }
    }

    pub fn operand_flags(self) -> u16 {
        match self {
            Opcode::Mov | Opcode::Movabs | Opcode::Lea | Opcode::Movq | Opcode::Movsd => {
                OPERAND_0_DEST | OPERAND_1_SRC
            }
            Opcode::Cmovns => OPERAND_0_DEST | OPERAND_1_SRC | OPERAND_EFLAGS_SRC,
            Opcode::And
            | Opcode::Or
            | Opcode::Xor
            | Opcode::Add
            | Opcode::Sub
            | Opcode::Shl
            | Opcode::Sar => {
                OPERAND_0_DEST | OPERAND_0_SRC | OPERAND_1_SRC | OPERAND_EFLAGS_DEST
            }
            Opcode::Inc | Opcode::Dec => OPERAND_0_DEST | OPERAND_0_SRC | OPERAND_1_SRC,
            Opcode::Addsd | Opcode::Subsd | Opcode::Mulsd | Opcode::Divsd => {
                OPERAND_0_DEST | OPERAND_0_SRC | OPERAND_1_SRC
            }
            Opcode::Not => OPERAND_0_SRC | OPERAND_0_DEST,
            Opcode::Neg => OPERAND_0_SRC | OPERAND_0_DEST | OPERAND_EFLAGS_DEST,
            Opcode::Imul => {
                OPERAND_0_SRC | OPERAND_RAX_SRC | OPERAND_RAX_DEST | OPERAND_RDX_DEST
            }
            Opcode::Idiv => {
                OPERAND_0_SRC
                    | OPERAND_RAX_SRC
                    | OPERAND_RDX_SRC
                    | OPERAND_RAX_DEST
                    | OPERAND_RDX_DEST
            }
            Opcode::Cqo => OPERAND_RDX_DEST | OPERAND_RAX_SRC,
            Opcode::Test | Opcode::Cmp | Opcode::Ucomisd => {
                OPERAND_0_SRC | OPERAND_1_SRC | OPERAND_EFLAGS_DEST
            }
            Opcode::Jmp => OPERAND_0_SRC | OPERAND_RIP_SRC | OPERAND_RIP_DEST,
            Opcode::Jz
            | Opcode::Jnz
            | Opcode::Jc
            | Opcode::Jnc
            | Opcode::Jp
            | Opcode::Jnp
            | Opcode::Jl
            | Opcode::Jg
            | Opcode::Jle
            | Opcode::Jge => {
                OPERAND_0_SRC | OPERAND_EFLAGS_SRC | OPERAND_RIP_SRC | OPERAND_RIP_DEST
            }
            Opcode::Setz
            | Opcode::Setnz
            | Opcode::Setp
            | Opcode::Setnp
            | Opcode::Setc
            | Opcode::Setnc
            | Opcode::Setg
            | Opcode::Setge
            | Opcode::Setl
            | Opcode::Setle => OPERAND_0_DEST | OPERAND_EFLAGS_SRC,
            Opcode::Push => OPERAND_0_SRC | OPERAND_RSP_SRC | OPERAND_RSP_DEST,
            Opcode::Pop => OPERAND_0_DEST | OPERAND_RSP_SRC | OPERAND_RSP_DEST,
            Opcode::Call => {
                OPERAND_0_SRC | OPERAND_RIP_SRC | OPERAND_RIP_DEST | OPERAND_RSP_SRC
                    | OPERAND_RSP_DEST
            }
            Opcode::Ret => {
                OPERAND_RIP_SRC | OPERAND_RIP_DEST | OPERAND_RSP_SRC | OPERAND_RSP_DEST
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Operand {
    Direct(Reg),
    /// `disp(base, index, scale)`
    Indexed {
        base: Reg,
        index: Reg,
        disp: Sym,
        scale: u32,
    },
    /// `disp(, index, scale)`
    Scaled { index: Reg, disp: Sym, scale: u32 },
    /// `disp(base)`
    Displaced { base: Reg, disp: Sym },
    Immediate(Sym),
    Address(Sym),
    /// `"name"@PLT`
    Plt(Sym),
}

impl Operand {
    pub fn is_memory(self) -> bool {
        match self {
            Operand::Direct(_) | Operand::Immediate(_) => false,
            Operand::Indexed { .. }
            | Operand::Scaled { .. }
            | Operand::Displaced { .. }
            | Operand::Address(_)
            | Operand::Plt(_) => true,
        }
    }

    pub fn uses_reg(self, reg: Reg) -> bool {
        match self {
            Operand::Direct(direct) => direct == reg,
            Operand::Indexed { base, index, .. } => base == reg || index == reg,
            Operand::Scaled { index, .. } => index == reg,
            Operand::Displaced { base, .. } => base == reg,
            Operand::Immediate(_) | Operand::Address(_) | Operand::Plt(_) => false,
        }
    }

    /// Width of the value this operand touches, in bytes. Immediates report
    /// the narrowest encoding that fits their value.
    pub fn data_size(self, table: &SymbolTable) -> u32 {
        match self {
            Operand::Direct(reg) => reg.size().bytes(),
            Operand::Indexed { disp, .. }
            | Operand::Scaled { disp, .. }
            | Operand::Displaced { disp, .. } => symbol_data_size(table, disp),
            Operand::Immediate(sym) => {
                let value = table.parsed_int(sym);
                if value >= i64::from(i8::MIN) && value <= i64::from(i8::MAX) {
                    1
                } else if value >= i64::from(i16::MIN) && value <= i64::from(i16::MAX) {
                    2
                } else if value >= i64::from(i32::MIN) && value <= i64::from(i32::MAX) {
                    4
                } else {
                    8
                }
            }
            Operand::Address(sym) | Operand::Plt(sym) => symbol_data_size(table, sym),
        }
    }
}

/// Bytes occupied by a value named by this symbol in data or memory.
pub fn symbol_data_size(table: &SymbolTable, sym: Sym) -> u32 {
    match table.data(sym) {
        SymData::CharLit(_) => 1,
        SymData::IntLit(_)
        | SymData::FloatLit { .. }
        | SymData::StrLit { .. }
        | SymData::Label
        | SymData::Function { .. }
        | SymData::External
        | SymData::StrAddr
        | SymData::FloatAddr => 8,
        SymData::TmpVar(var) | SymData::ScalarVar(var) | SymData::VectorVar(var) => {
            match var.datatype {
                DataType::Cara => 1,
                DataType::Inte | DataType::Real => 8,
            }
        }
        data => panic!("symbol kind {} has no data size", data.kind_name()),
    }
}

/// Register width appropriate for a value named by this symbol.
pub fn symbol_reg_size(table: &SymbolTable, sym: Sym) -> RegSize {
    match table.data(sym) {
        SymData::CharLit(_) => RegSize::Byte,
        SymData::IntLit(_)
        | SymData::StrLit { .. }
        | SymData::Label
        | SymData::Function { .. }
        | SymData::External
        | SymData::StrAddr => RegSize::Qword,
        SymData::FloatLit { .. } | SymData::FloatAddr => RegSize::Sse,
        SymData::TmpVar(var) | SymData::ScalarVar(var) | SymData::VectorVar(var) => {
            match var.datatype {
                DataType::Cara => RegSize::Byte,
                DataType::Inte => RegSize::Qword,
                DataType::Real => RegSize::Sse,
            }
        }
        data => panic!("symbol kind {} has no register size", data.kind_name()),
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: Vec<Operand>,
}

impl Instruction {
    pub fn nullary(opcode: Opcode) -> Instruction {
        Instruction {
            opcode,
            operands: Vec::new(),
        }
    }

    pub fn unary(opcode: Opcode, operand: Operand) -> Instruction {
        Instruction {
            opcode,
            operands: vec![operand],
        }
    }

    pub fn binary(opcode: Opcode, dest: Operand, src: Operand) -> Instruction {
        Instruction {
            opcode,
            operands: vec![dest, src],
        }
    }

    /// Operand width driving the size suffix: the first direct register
    /// wins, otherwise the narrowest memory operand.
    pub fn data_size(&self, table: &SymbolTable) -> u32 {
        let mut size = 8;
        for operand in &self.operands {
            if let Operand::Direct(reg) = operand {
                return reg.size().bytes();
            }
            let alt = match operand {
                Operand::Immediate(_) => 8,
                other => other.data_size(table),
            };
            if alt < size {
                size = alt;
            }
        }
        size
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DirectiveName {
    Data,
    Rodata,
    Text,
    Globl,
    Extern,
    Type,
    Ascii,
    Double,
    Quad,
    Zero,
    Align,
}

impl DirectiveName {
    fn gas_name(self) -> &'static str {
        match self {
            DirectiveName::Data => ".section .data",
            DirectiveName::Rodata => ".section .rodata",
            DirectiveName::Text => ".section .text",
            DirectiveName::Globl => ".globl",
            DirectiveName::Extern => ".extern",
            DirectiveName::Type => ".type",
            DirectiveName::Ascii => ".ascii",
            DirectiveName::Double => ".double",
            DirectiveName::Quad => ".quad",
            DirectiveName::Zero => ".zero",
            DirectiveName::Align => ".align",
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct Directive {
    pub name: DirectiveName,
    pub operands: Vec<Sym>,
}

impl Directive {
    pub fn plain(name: DirectiveName) -> Directive {
        Directive {
            name,
            operands: Vec::new(),
        }
    }

    pub fn with_operand(name: DirectiveName, operand: Sym) -> Directive {
        Directive {
            name,
            operands: vec![operand],
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub enum Stmt {
    Instruction(Instruction),
    Label(Sym),
    Directive(Directive),
}

/// An ordered sequence of assembly statements.
#[derive(Default)]
pub struct AsmUnit {
    pub statements: Vec<Stmt>,
}

impl AsmUnit {
    pub fn empty() -> AsmUnit {
        AsmUnit {
            statements: Vec::new(),
        }
    }

    pub fn push(&mut self, statement: Stmt) {
        self.statements.push(statement);
    }

    pub fn push_instruction(&mut self, instruction: Instruction) {
        self.push(Stmt::Instruction(instruction));
    }

    pub fn splice(&mut self, start: usize, end: usize, replacement: Vec<Stmt>) {
        self.statements.splice(start..end, replacement);
    }

    pub fn join(units: Vec<AsmUnit>) -> AsmUnit {
        let mut result = AsmUnit::empty();
        for unit in units {
            result.statements.extend(unit.statements);
        }
        result
    }

    pub fn render<W: Write>(
        &self,
        table: &SymbolTable,
        params: RenderParams,
        out: &mut W,
    ) -> io::Result<()> {
        for statement in &self.statements {
            render_stmt(statement, table, params, out)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub enum Assembler {
    Gas,
}

#[derive(Clone, Copy, Debug)]
pub struct RenderParams {
    /// Indent width for instructions and directives; negative selects tabs.
    pub space_count: i32,
    pub assembler: Assembler,
}

fn write_indent<W: Write>(params: RenderParams, out: &mut W) -> io::Result<()> {
    if params.space_count < 0 {
        out.write_all(b"\t")
    } else {
        for _ in 0..params.space_count {
            out.write_all(b" ")?;
        }
        Ok(())
    }
}

pub fn render_stmt<W: Write>(
    statement: &Stmt,
    table: &SymbolTable,
    params: RenderParams,
    out: &mut W,
) -> io::Result<()> {
    match statement {
        Stmt::Instruction(instruction) => render_instruction(instruction, table, params, out),
        Stmt::Label(sym) => writeln!(out, "\"{}\":", table.content(*sym)),
        Stmt::Directive(directive) => render_directive(directive, table, params, out),
    }
}

fn render_instruction<W: Write>(
    instruction: &Instruction,
    table: &SymbolTable,
    params: RenderParams,
    out: &mut W,
) -> io::Result<()> {
    write_indent(params, out)?;
    write!(out, "{}", instruction.opcode.mnemonic())?;
    if instruction.opcode.needs_size_suffix() {
        let size = instruction.data_size(table);
        write!(out, "{}", size_suffix(size))?;
    }

    // AT&T orders sources first, the model stores the destination first.
    for (position, operand) in instruction.operands.iter().rev().enumerate() {
        if position == 0 {
            write!(out, " ")?;
        } else {
            write!(out, ", ")?;
        }
        render_operand(operand, table, out)?;
    }

    writeln!(out)
}

fn size_suffix(bytes: u32) -> &'static str {
    match bytes {
        1 => RegSize::Byte.suffix(),
        2 => RegSize::Word.suffix(),
        4 => RegSize::Dword.suffix(),
        8 => RegSize::Qword.suffix(),
        16 => RegSize::Sse.suffix(),
        other => panic!("no size suffix for {} byte operands", other),
    }
}

fn render_directive<W: Write>(
    directive: &Directive,
    table: &SymbolTable,
    params: RenderParams,
    out: &mut W,
) -> io::Result<()> {
    write_indent(params, out)?;
    write!(out, "{}", directive.name.gas_name())?;
    for (position, operand) in directive.operands.iter().enumerate() {
        if position == 0 {
            write!(out, " ")?;
        } else {
            write!(out, ", ")?;
        }
        write!(out, "{}", table.content(*operand))?;
    }
    writeln!(out)
}

fn render_operand<W: Write>(
    operand: &Operand,
    table: &SymbolTable,
    out: &mut W,
) -> io::Result<()> {
    match operand {
        Operand::Direct(reg) => write!(out, "%{}", reg.name()),
        Operand::Indexed {
            base,
            index,
            disp,
            scale,
        } => {
            render_symbol_operand(*disp, table, out)?;
            write!(out, "(%{}, %{}, {})", base.name(), index.name(), scale)
        }
        Operand::Scaled { index, disp, scale } => {
            render_symbol_operand(*disp, table, out)?;
            write!(out, "(, %{}, {})", index.name(), scale)
        }
        Operand::Displaced { base, disp } => {
            render_symbol_operand(*disp, table, out)?;
            write!(out, "(%{})", base.name())
        }
        Operand::Immediate(sym) => {
            write!(out, "$")?;
            render_symbol_operand(*sym, table, out)
        }
        Operand::Address(sym) => write!(out, "\"{}\"", table.content(*sym)),
        Operand::Plt(sym) => write!(out, "\"{}\"@PLT", table.content(*sym)),
    }
}

fn render_symbol_operand<W: Write>(sym: Sym, table: &SymbolTable, out: &mut W) -> io::Result<()> {
    match table.data(sym) {
        SymData::CharLit(value) => write!(out, "{}", value),
        SymData::IntLit(_) | SymData::FloatLit { .. } => {
            write!(out, "{}", table.content(sym))
        }
        SymData::TmpVar(_)
        | SymData::ScalarVar(_)
        | SymData::VectorVar(_)
        | SymData::StrAddr
        | SymData::FloatAddr
        | SymData::Label => write!(out, "\"{}\"", table.content(sym)),
        data => panic!(
            "symbol kind {} cannot appear as an assembly operand",
            data.kind_name()
        ),
    }
}
