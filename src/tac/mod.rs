//! Three-address code: the intermediate representation sitting between the
//! AST and the x86-64 back end.
//!
//! A [`Tac`](struct.Tac.html) owns its instructions as a flat arena of
//! nodes; program order is slice order. On top of the plain instruction
//! sequence the container carries a *locality* model: every node is tagged
//! with the function, basic block and straight-line position it belongs to,
//! and every temporary whose live range stays inside one block gets a
//! [`LocalValue`](struct.LocalValue.html) record attached to the nodes where
//! the range starts and ends. The temporary-reuse optimization is driven
//! entirely by those records.

pub mod gen;
pub mod opt;

use std::io::{self, Write};
use symtab::{Sym, SymbolTable};

/// TAC operations. `dest` and the two `srcs` slots of an instruction are
/// used as the per-opcode comments describe; unmentioned slots stay empty.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Opcode {
    /// `.beginfun f:` marks the start of function `f` (dest).
    BeginFun,
    /// `.defp x` declares the next parameter of the enclosing function.
    DefP,
    /// `.endfun` closes the current function.
    EndFun,
    /// `.defs x, lit` defines global scalar `x` initialized to `lit`.
    DefS,
    /// `.beginvec v, len:` opens the definition of global vector `v`.
    BeginVec,
    /// `.defv v, lit` appends one initialized element to the open vector.
    DefV,
    /// `.endvec v, fill` closes the vector, `fill` trailing zero elements.
    EndVec,
    /// `move x, y` copies scalar `y` into `x`.
    Move,
    /// `movi x, v, i` loads `v[i]` into `x`.
    Movi,
    /// `movv v, i, y` stores `y` into `v[i]`.
    Movv,
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    /// `shmul x, y, k` multiplies by `2^|k|`, negating the result for
    /// negative `k`.
    ShMul,
    /// `shdiv x, y, k` divides by `2^|k|`, negating for negative `k`.
    ShDiv,
    Not,
    /// ` l:` defines jump target `l` (src0).
    Label,
    /// `ifz l, c` jumps to `l` (dest) when `c` (src0) is zero.
    Ifz,
    /// `jump l` jumps to `l` (dest).
    Jump,
    /// `call x, f` calls `f` (src0), return value lands in `x`.
    Call,
    /// `arg , y` stages `y` as the next call argument.
    Arg,
    /// `ret , y` returns `y` from the enclosing function.
    Ret,
    /// `print , y` writes `y` to standard output.
    Print,
    /// `read x` reads one integer from standard input into `x`.
    Read,
}

impl Opcode {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Move => "move",
            Opcode::Movi => "movi",
            Opcode::Movv => "movv",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Lt => "lt",
            Opcode::Gt => "gt",
            Opcode::Le => "le",
            Opcode::Ge => "ge",
            Opcode::Eq => "eq",
            Opcode::Ne => "ne",
            Opcode::ShMul => "shmul",
            Opcode::ShDiv => "shdiv",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Not => "not",
            Opcode::Label => "",
            Opcode::DefS => ".defs",
            Opcode::DefV => ".defv",
            Opcode::DefP => ".defp",
            Opcode::BeginVec => ".beginvec",
            Opcode::EndVec => ".endvec",
            Opcode::BeginFun => ".beginfun",
            Opcode::EndFun => ".endfun",
            Opcode::Ifz => "ifz",
            Opcode::Jump => "jump",
            Opcode::Call => "call",
            Opcode::Arg => "arg",
            Opcode::Ret => "ret",
            Opcode::Print => "print",
            Opcode::Read => "read",
        }
    }

    /// Upper-case mnemonic used by the raw debug dump.
    pub fn raw_mnemonic(self) -> &'static str {
        match self {
            Opcode::Move => "TAC_MOVE",
            Opcode::Movi => "TAC_MOVI",
            Opcode::Movv => "TAC_MOVV",
            Opcode::Add => "TAC_ADD",
            Opcode::Sub => "TAC_SUB",
            Opcode::Mul => "TAC_MUL",
            Opcode::Div => "TAC_DIV",
            Opcode::Lt => "TAC_LT",
            Opcode::Gt => "TAC_GT",
            Opcode::Le => "TAC_LE",
            Opcode::Ge => "TAC_GE",
            Opcode::Eq => "TAC_EQ",
            Opcode::Ne => "TAC_NE",
            Opcode::ShMul => "TAC_SHMUL",
            Opcode::ShDiv => "TAC_SHDIV",
            Opcode::And => "TAC_AND",
            Opcode::Or => "TAC_OR",
            Opcode::Not => "TAC_NOT",
            Opcode::Label => "TAC_LABEL",
            Opcode::DefS => "TAC_DEFS",
            Opcode::DefV => "TAC_DEFV",
            Opcode::DefP => "TAC_DEFP",
            Opcode::BeginVec => "TAC_BEGINVEC",
            Opcode::EndVec => "TAC_ENDVEC",
            Opcode::BeginFun => "TAC_BEGINFUN",
            Opcode::EndFun => "TAC_ENDFUN",
            Opcode::Ifz => "TAC_IFZ",
            Opcode::Jump => "TAC_JUMP",
            Opcode::Call => "TAC_CALL",
            Opcode::Arg => "TAC_ARG",
            Opcode::Ret => "TAC_RET",
            Opcode::Print => "TAC_PRINT",
            Opcode::Read => "TAC_READ",
        }
    }

    /// Whether this opcode terminates a straight-line region.
    pub fn is_block_boundary(self) -> bool {
        match self {
            Opcode::Move
            | Opcode::Movi
            | Opcode::Movv
            | Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Lt
            | Opcode::Gt
            | Opcode::Le
            | Opcode::Ge
            | Opcode::Eq
            | Opcode::Ne
            | Opcode::ShMul
            | Opcode::ShDiv
            | Opcode::And
            | Opcode::Or
            | Opcode::Not
            | Opcode::Arg
            | Opcode::Print
            | Opcode::Read => false,
            Opcode::Label
            | Opcode::DefS
            | Opcode::DefV
            | Opcode::DefP
            | Opcode::BeginVec
            | Opcode::EndVec
            | Opcode::BeginFun
            | Opcode::EndFun
            | Opcode::Ifz
            | Opcode::Jump
            | Opcode::Call
            | Opcode::Ret => true,
        }
    }

    /// Whether this opcode is a definition marker rather than executable
    /// code.
    pub fn is_directive(self) -> bool {
        match self {
            Opcode::DefS
            | Opcode::DefV
            | Opcode::DefP
            | Opcode::BeginVec
            | Opcode::EndVec
            | Opcode::BeginFun
            | Opcode::EndFun => true,
            _ => false,
        }
    }

    fn needs_indent(self) -> bool {
        !matches!(
            self,
            Opcode::Label
                | Opcode::BeginFun
                | Opcode::EndFun
                | Opcode::BeginVec
                | Opcode::EndVec
        )
    }

    fn needs_colon(self) -> bool {
        matches!(self, Opcode::Label | Opcode::BeginFun | Opcode::BeginVec)
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Instruction {
    pub opcode: Opcode,
    pub dest: Option<Sym>,
    pub srcs: [Option<Sym>; 2],
}

impl Instruction {
    pub fn new(
        opcode: Opcode,
        dest: Option<Sym>,
        src0: Option<Sym>,
        src1: Option<Sym>,
    ) -> Instruction {
        Instruction {
            opcode,
            dest,
            srcs: [src0, src1],
        }
    }
}

/// Position tag assigned by the locality analysis.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TacId {
    /// Locality has not been computed.
    Unknown,
    /// The node is a block boundary and has no position of this kind.
    Boundary,
    /// The value escaped its defining block.
    NonLocal,
    Normal(usize),
}

impl TacId {
    /// Numeric key preserving the ordering convention: normal ids first,
    /// sentinels at the top of the range.
    fn as_key(self) -> usize {
        match self {
            TacId::Normal(id) => id,
            TacId::NonLocal => usize::MAX - 2,
            TacId::Boundary => usize::MAX - 1,
            TacId::Unknown => usize::MAX,
        }
    }

    pub fn is_normal(self) -> bool {
        matches!(self, TacId::Normal(_))
    }
}

/// Live range of a temporary confined to one basic block.
#[derive(Clone, Debug)]
pub struct LocalValue {
    pub function_id: TacId,
    pub block_id: TacId,
    pub start_id: TacId,
    pub end_id: TacId,
    /// Node index of the defining write.
    pub start: usize,
    /// Node index of the last in-block use.
    pub end: usize,
    pub old_symbol: Sym,
    pub symbol_in_use: Sym,
    pub symbol_offered: Option<Sym>,
}

impl LocalValue {
    fn sort_key(&self) -> (usize, usize) {
        (self.start_id.as_key(), self.block_id.as_key())
    }
}

pub struct Node {
    pub instruction: Instruction,
    pub function_id: TacId,
    pub block_id: TacId,
    pub local_id: TacId,
    /// Local value whose range starts at this node.
    pub starting_local_value: Option<usize>,
    /// Local values whose ranges end at this node, ordered by
    /// `(start_id, block_id)`.
    pub ending_local_values: Vec<usize>,
}

impl Node {
    fn new(instruction: Instruction) -> Node {
        Node {
            instruction,
            function_id: TacId::Unknown,
            block_id: TacId::Unknown,
            local_id: TacId::Unknown,
            starting_local_value: None,
            ending_local_values: Vec::new(),
        }
    }
}

/// Parameters for the pseudo-assembly dump. A negative space count selects
/// tab indentation.
#[derive(Clone, Copy, Debug)]
pub struct RenderParams {
    pub space_count: i32,
}

pub struct Tac {
    nodes: Vec<Node>,
    local_values: Vec<LocalValue>,
    locality_computed: bool,
}

impl Tac {
    pub fn empty() -> Tac {
        Tac {
            nodes: Vec::new(),
            local_values: Vec::new(),
            locality_computed: false,
        }
    }

    pub fn singleton(instruction: Instruction) -> Tac {
        let mut tac = Tac::empty();
        tac.append(instruction);
        tac
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.nodes.iter().map(|node| &node.instruction)
    }

    pub fn append(&mut self, instruction: Instruction) {
        self.nodes.push(Node::new(instruction));
    }

    pub fn prepend(&mut self, instruction: Instruction) {
        self.nodes.insert(0, Node::new(instruction));
    }

    /// Removes and returns the last instruction.
    pub fn pop(&mut self) -> Option<Instruction> {
        self.nodes.pop().map(|node| node.instruction)
    }

    pub fn last_instruction(&self) -> Option<&Instruction> {
        self.nodes.last().map(|node| &node.instruction)
    }

    pub fn last_instruction_mut(&mut self) -> Option<&mut Instruction> {
        self.nodes.last_mut().map(|node| &mut node.instruction)
    }

    /// Appends all of `other`, in order.
    pub fn join(&mut self, other: Tac) {
        self.nodes.extend(other.nodes);
    }

    /// Writes the pseudo-assembly form, one instruction per line.
    pub fn print<W: Write>(
        &self,
        table: &SymbolTable,
        params: RenderParams,
        out: &mut W,
    ) -> io::Result<()> {
        for node in &self.nodes {
            print_instruction(&node.instruction, table, params, out)?;
        }
        Ok(())
    }

    /// Writes the raw debug form, one `TAC(...)` record per line.
    pub fn raw_print<W: Write>(&self, table: &SymbolTable, out: &mut W) -> io::Result<()> {
        for node in &self.nodes {
            raw_print_instruction(&node.instruction, table, out)?;
        }
        Ok(())
    }

    /// Assigns function/block/local ids and discovers single-block live
    /// ranges of temporaries. Idempotent; later calls are no-ops.
    pub fn compute_locality(&mut self, table: &SymbolTable) {
        if self.locality_computed {
            return;
        }
        self.compute_ids();
        self.compute_local_values(table);
        self.locality_computed = true;
    }

    fn compute_ids(&mut self) {
        let mut current_function = None;
        let mut next_function = 0;
        let mut next_block = 0;
        let mut next_local = 0;
        let mut inside_block = false;
        let mut current_block = 0;

        for node in &mut self.nodes {
            if node.instruction.opcode.is_block_boundary() {
                node.function_id = match current_function {
                    Some(id) => TacId::Normal(id),
                    None => TacId::Boundary,
                };
                node.block_id = TacId::Boundary;
                node.local_id = TacId::Boundary;
                match node.instruction.opcode {
                    Opcode::BeginFun => {
                        current_function = Some(next_function);
                        next_function += 1;
                        next_block = 0;
                    }
                    Opcode::EndFun => current_function = None,
                    _ => {}
                }
                inside_block = false;
            } else {
                if !inside_block {
                    inside_block = true;
                    current_block = next_block;
                    next_block += 1;
                }
                node.function_id = match current_function {
                    Some(id) => TacId::Normal(id),
                    None => TacId::Boundary,
                };
                node.block_id = TacId::Normal(current_block);
                node.local_id = TacId::Normal(next_local);
                next_local += 1;
            }
        }
    }

    fn find_function_start(&self, from: usize) -> Option<usize> {
        (from..self.nodes.len())
            .find(|&index| self.nodes[index].instruction.opcode == Opcode::BeginFun)
    }

    fn uses_symbol(&self, index: usize, symbol: Sym) -> bool {
        let instruction = &self.nodes[index].instruction;
        instruction.dest == Some(symbol)
            || instruction.srcs[0] == Some(symbol)
            || instruction.srcs[1] == Some(symbol)
    }

    fn compute_local_values(&mut self, table: &SymbolTable) {
        let mut from = 0;
        while let Some(function_start) = self.find_function_start(from) {
            let mut target = function_start;
            while self.nodes[target].instruction.opcode != Opcode::EndFun {
                self.compute_local_value_at(table, function_start, target);
                target += 1;
            }
            from = target;
        }
    }

    /// Tries to record a single-block live range for the temporary defined
    /// at `target`.
    fn compute_local_value_at(&mut self, table: &SymbolTable, function_start: usize, target: usize) {
        let node = &self.nodes[target];
        if !node.local_id.is_normal() {
            return;
        }
        let symbol = match node.instruction.dest {
            Some(symbol) if table.is_tmp_var(symbol) => symbol,
            _ => return,
        };

        let mut value = LocalValue {
            function_id: node.function_id,
            block_id: node.block_id,
            start_id: node.local_id,
            end_id: node.local_id,
            start: target,
            end: target,
            old_symbol: symbol,
            symbol_in_use: symbol,
            symbol_offered: Some(symbol),
        };

        // Forward: extend the range over in-block uses; any use in another
        // block of this function makes the value non-local.
        let mut current = target + 1;
        while self.nodes[current].instruction.opcode != Opcode::EndFun {
            if self.uses_symbol(current, symbol) {
                if value.block_id == self.nodes[current].block_id {
                    value.end = current;
                    value.end_id = self.nodes[current].local_id;
                } else if self.nodes[current].block_id.is_normal() {
                    return;
                }
            }
            current += 1;
        }

        // Backward: any use earlier in the function outside the defining
        // block also disqualifies the value.
        for current in function_start..target {
            if self.uses_symbol(current, symbol)
                && self.nodes[current].block_id != value.block_id
            {
                return;
            }
        }

        let end = value.end;
        let id = self.local_values.len();
        self.local_values.push(value);
        self.nodes[target].starting_local_value = Some(id);
        self.insert_ending_local_value(end, id);
    }

    /// Sorted insert into a node's ending set; entries with an equal key are
    /// refused.
    fn insert_ending_local_value(&mut self, node: usize, value: usize) -> bool {
        let key = self.local_values[value].sort_key();
        let position = {
            let locals = &self.local_values;
            self.nodes[node]
                .ending_local_values
                .binary_search_by_key(&key, |&existing| locals[existing].sort_key())
        };
        match position {
            Ok(_) => false,
            Err(index) => {
                self.nodes[node].ending_local_values.insert(index, value);
                true
            }
        }
    }

    pub fn local_value(&self, id: usize) -> &LocalValue {
        &self.local_values[id]
    }
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

fn print_instruction<W: Write>(
    instruction: &Instruction,
    table: &SymbolTable,
    params: RenderParams,
    out: &mut W,
) -> io::Result<()> {
    if instruction.opcode.needs_indent() {
        write_indent(params, out)?;
    }
    write!(out, "{}", instruction.opcode.mnemonic())?;

    if let Some(dest) = instruction.dest {
        write!(out, " {}", table.content(dest))?;
    }
    if let Some(src) = instruction.srcs[0] {
        if instruction.dest.is_some() {
            write!(out, ",")?;
        }
        write!(out, " {}", table.content(src))?;
    }
    if let Some(src) = instruction.srcs[1] {
        if instruction.dest.is_some() || instruction.srcs[0].is_some() {
            write!(out, ",")?;
        }
        write!(out, " {}", table.content(src))?;
    }

    if instruction.opcode.needs_colon() {
        write!(out, ":")?;
    }
    writeln!(out)
}

fn raw_print_instruction<W: Write>(
    instruction: &Instruction,
    table: &SymbolTable,
    out: &mut W,
) -> io::Result<()> {
    let content = |sym: Option<Sym>| sym.map(|sym| table.content(sym)).unwrap_or("@0");
    writeln!(
        out,
        "TAC({}, {}, {}, {})",
        instruction.opcode.raw_mnemonic(),
        content(instruction.dest),
        content(instruction.srcs[0]),
        content(instruction.srcs[1]),
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use symtab::DataType;

    fn instruction(
        opcode: Opcode,
        dest: Option<Sym>,
        src0: Option<Sym>,
        src1: Option<Sym>,
    ) -> Instruction {
        Instruction::new(opcode, dest, src0, src1)
    }

    /// `.beginfun f:` / body / `.endfun` around straight-line instructions.
    fn function_tac(table: &mut SymbolTable, body: Vec<Instruction>) -> Tac {
        let name = table.intern("f");
        let mut tac = Tac::singleton(instruction(Opcode::BeginFun, Some(name), None, None));
        for body_instruction in body {
            tac.append(body_instruction);
        }
        tac.append(instruction(Opcode::EndFun, None, None, None));
        tac
    }

    #[test]
    fn straight_line_nodes_share_a_block() {
        let mut table = SymbolTable::new();
        let a = table.intern("a");
        let t = table.tmp_var(DataType::Inte);
        let mut tac = function_tac(
            &mut table,
            vec![
                instruction(Opcode::Move, Some(t), Some(a), None),
                instruction(Opcode::Add, Some(a), Some(t), Some(t)),
            ],
        );
        tac.compute_locality(&table);

        assert_eq!(tac.node(1).block_id, tac.node(2).block_id);
        assert_eq!(tac.node(1).local_id, TacId::Normal(0));
        assert_eq!(tac.node(2).local_id, TacId::Normal(1));
        assert_eq!(tac.node(0).block_id, TacId::Boundary);
    }

    #[test]
    fn single_block_temporary_gets_a_local_value() {
        let mut table = SymbolTable::new();
        let a = table.intern("a");
        let b = table.intern("b");
        let t = table.tmp_var(DataType::Inte);
        let mut tac = function_tac(
            &mut table,
            vec![
                instruction(Opcode::Add, Some(t), Some(a), Some(b)),
                instruction(Opcode::Move, Some(a), Some(t), None),
            ],
        );
        tac.compute_locality(&table);

        let id = tac.node(1).starting_local_value.expect("no local value");
        let value = tac.local_value(id);
        assert_eq!(value.start, 1);
        assert_eq!(value.end, 2);
        assert_eq!(value.symbol_in_use, t);
        assert_eq!(tac.node(2).ending_local_values, vec![id]);
        assert_eq!(
            tac.node(value.start).block_id,
            tac.node(value.end).block_id
        );
    }

    #[test]
    fn temporary_crossing_blocks_is_non_local() {
        let mut table = SymbolTable::new();
        let a = table.intern("a");
        let label = table.label();
        let t = table.tmp_var(DataType::Inte);
        let mut tac = function_tac(
            &mut table,
            vec![
                instruction(Opcode::Add, Some(t), Some(a), Some(a)),
                instruction(Opcode::Label, None, Some(label), None),
                instruction(Opcode::Move, Some(a), Some(t), None),
            ],
        );
        tac.compute_locality(&table);

        assert_eq!(tac.node(1).starting_local_value, None);
        assert!(tac.node(3).ending_local_values.is_empty());
    }

    #[test]
    fn locality_is_memoized() {
        let mut table = SymbolTable::new();
        let a = table.intern("a");
        let t = table.tmp_var(DataType::Inte);
        let mut tac = function_tac(
            &mut table,
            vec![instruction(Opcode::Move, Some(t), Some(a), None)],
        );
        tac.compute_locality(&table);
        let before = tac.local_values.len();
        tac.compute_locality(&table);
        assert_eq!(tac.local_values.len(), before);
    }

    #[test]
    fn rendering_is_deterministic() {
        let mut table = SymbolTable::new();
        let x = table.intern("x");
        let lit = table.int_lit(5);
        let tac = Tac::singleton(instruction(Opcode::DefS, Some(x), Some(lit), None));

        let params = RenderParams { space_count: 4 };
        let mut first = Vec::new();
        let mut second = Vec::new();
        tac.print(&table, params, &mut first).unwrap();
        tac.print(&table, params, &mut second).unwrap();
        assert_eq!(first, second);
        assert_eq!(String::from_utf8(first).unwrap(), "    .defs x, 5\n");
    }

    #[test]
    fn raw_print_uses_placeholder_for_missing_operands() {
        let mut table = SymbolTable::new();
        let x = table.intern("x");
        let tac = Tac::singleton(instruction(Opcode::Read, Some(x), None, None));
        let mut out = Vec::new();
        tac.raw_print(&table, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "TAC(TAC_READ, x, @0, @0)\n");
    }

    #[test]
    fn container_edits_keep_program_order() {
        let mut table = SymbolTable::new();
        let a = table.intern("a");
        let b = table.intern("b");
        let label = table.label();

        let mut tac = Tac::singleton(instruction(Opcode::Move, Some(a), Some(b), None));
        tac.prepend(instruction(Opcode::Label, None, Some(label), None));
        let mut tail = Tac::singleton(instruction(Opcode::Jump, Some(label), None, None));
        tail.append(instruction(Opcode::Move, Some(b), Some(a), None));
        tac.join(tail);

        let opcodes: Vec<Opcode> = tac.instructions().map(|i| i.opcode).collect();
        assert_eq!(
            opcodes,
            vec![Opcode::Label, Opcode::Move, Opcode::Jump, Opcode::Move]
        );

        let popped = tac.pop().unwrap();
        assert_eq!(popped.opcode, Opcode::Move);
        assert_eq!(popped.dest, Some(b));
        assert_eq!(tac.len(), 3);
    }

    #[test]
    fn ending_sets_are_ordered_by_start() {
        let mut table = SymbolTable::new();
        let a = table.intern("a");
        let b = table.intern("b");
        let t1 = table.tmp_var(DataType::Inte);
        let t2 = table.tmp_var(DataType::Inte);
        let mut tac = function_tac(
            &mut table,
            vec![
                instruction(Opcode::Add, Some(t1), Some(a), Some(b)),
                instruction(Opcode::Add, Some(t2), Some(b), Some(a)),
                instruction(Opcode::Add, Some(a), Some(t1), Some(t2)),
            ],
        );
        tac.compute_locality(&table);

        let endings = &tac.node(3).ending_local_values;
        assert_eq!(endings.len(), 2);
        let first = tac.local_value(endings[0]);
        let second = tac.local_value(endings[1]);
        assert!(first.start_id.as_key() < second.start_id.as_key());
        assert_eq!(first.symbol_in_use, t1);
        assert_eq!(second.symbol_in_use, t2);
    }

    #[test]
    fn directive_and_boundary_classification_split_the_opcodes() {
        // Directives are block boundaries, but not the other way around.
        for opcode in [
            Opcode::DefS,
            Opcode::DefV,
            Opcode::DefP,
            Opcode::BeginVec,
            Opcode::EndVec,
            Opcode::BeginFun,
            Opcode::EndFun,
        ]
        .iter()
        {
            assert!(opcode.is_directive());
            assert!(opcode.is_block_boundary());
        }
        for opcode in [Opcode::Label, Opcode::Ifz, Opcode::Jump, Opcode::Call, Opcode::Ret].iter()
        {
            assert!(!opcode.is_directive());
            assert!(opcode.is_block_boundary());
        }
        for opcode in [Opcode::Move, Opcode::Add, Opcode::Arg, Opcode::Print, Opcode::Read].iter()
        {
            assert!(!opcode.is_directive());
            assert!(!opcode.is_block_boundary());
        }
    }

    #[test]
    fn label_lines_are_unindented_with_colon() {
        let mut table = SymbolTable::new();
        let label = table.label();
        let x = table.intern("x");
        let mut tac = Tac::singleton(instruction(Opcode::Label, None, Some(label), None));
        tac.append(instruction(Opcode::Ifz, Some(label), Some(x), None));

        let mut out = Vec::new();
        tac.print(&table, RenderParams { space_count: 2 }, &mut out)
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            " @label_0:\n  ifz @label_0, x\n"
        );
    }
}
