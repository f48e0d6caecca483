//! Whole-pipeline scenarios: optimization interplay, rendering stability
//! and the shape of complete translation units.

use super::{compile, compile_with, Compiled};
use crate::tac;
use crate::x86_64;
use std::collections::HashSet;

fn compile_full(source: &str) -> Compiled {
    compile_with(source, tac::opt::OptFlags::FULL, x86_64::opt::OptFlags::FULL)
}

fn distinct_temporaries(tac_text: &str) -> HashSet<String> {
    tac_text
        .split(|c: char| !(c.is_alphanumeric() || c == '@' || c == '_'))
        .filter(|token| token.starts_with("@scalar_"))
        .map(str::to_owned)
        .collect()
}

const FIBO: &str = "\
inte cache[50];\n\
inte n = 0;\n\
\n\
inte fibo(inte k) {\n\
    se (k < 2) entaum retorne k;\n\
    se (cache[k] != 0) entaum retorne cache[k];\n\
    cache[k] = fibo(k - 1) + fibo(k - 2);\n\
    retorne cache[k];\n\
}\n\
\n\
inte main() {\n\
    n = entrada;\n\
    enquanto (n > 0) {\n\
        escreva \"fibo: \" fibo(n) \"\\n\";\n\
        n = n - 1;\n\
    }\n\
    retorne 0;\n\
}\n";

#[test]
fn whole_program_compiles_to_one_unit() {
    let compiled = compile(FIBO);

    assert!(compiled.tac_text.contains(".beginfun fibo:"));
    assert!(compiled.tac_text.contains(".beginvec cache, 50:"));

    let asm = &compiled.asm_text;
    let data = asm.find(".section .data").unwrap();
    let rodata = asm.find(".section .rodata").unwrap();
    let text = asm.find(".section .text").unwrap();
    assert!(data < rodata && rodata < text);

    assert!(asm.contains("\"fibo\":"));
    assert!(asm.contains("\"main\":"));
    assert!(asm.contains("callq \"fibo\""));
    assert!(asm.contains("callq \"@entrada\""));
    assert!(asm.contains("callq \"fwrite\"@PLT"));
    assert!(asm.contains("callq \"printf\"@PLT"));
    assert!(asm.contains("    .zero 400\n"));
}

#[test]
fn optimizations_preserve_the_overall_shape() {
    let plain = compile(FIBO);
    let optimized = compile_full(FIBO);

    for needle in &["\"fibo\":", "\"main\":", "callq \"@entrada\""] {
        assert!(plain.asm_text.contains(needle));
        assert!(optimized.asm_text.contains(needle));
    }

    // The optimizers only ever delete or contract instructions.
    assert!(optimized.asm_text.lines().count() <= plain.asm_text.lines().count());
}

#[test]
fn dedup_and_contraction_compose() {
    // `n - 1` lowers to an immediate load plus a subtraction; the dedup
    // pass fuses the load into the subtraction and the contraction pass
    // then turns `sub $1` into `dec`.
    let plain = compile(FIBO);
    let optimized = compile_full(FIBO);
    assert!(plain.asm_text.contains("    movq $1, %r11\n    subq %r11, %rax\n"));
    assert!(!plain.asm_text.contains("decq"));
    assert!(optimized.asm_text.contains("    decq %rax\n"));
}

#[test]
fn power_of_two_rewrites_mul_and_div() {
    let source = "inte f(inte n) { retorne n * 8 + n / 4; }\n";
    let compiled = compile_with(
        source,
        tac::opt::OptFlags {
            power_of_two: true,
            reuse_tmps: false,
        },
        x86_64::opt::OptFlags::OFF,
    );

    assert!(compiled.tac_text.contains("shmul"));
    assert!(compiled.tac_text.contains("shdiv"));
    assert!(!compiled.tac_text.contains("    mul "));
    assert!(!compiled.tac_text.contains("    div "));
    // n * 8 fits the scaled addressing mode.
    assert!(compiled.asm_text.contains("leaq 0(, %rax, 8), %rax"));
}

#[test]
fn power_of_two_leaves_other_factors_alone() {
    let source = "inte f(inte n) { retorne n * 6; }\n";
    let compiled = compile_with(
        source,
        tac::opt::OptFlags {
            power_of_two: true,
            reuse_tmps: false,
        },
        x86_64::opt::OptFlags::OFF,
    );
    assert!(compiled.tac_text.contains("    mul "));
    assert!(!compiled.tac_text.contains("shmul"));
}

#[test]
fn temporary_reuse_shrinks_the_name_set() {
    let source = "\
inte a = 1;\n\
inte b = 2;\n\
inte c = 3;\n\
inte d = 4;\n\
inte f() { retorne (a + b) + (c + d) + (a + c) + (b + d); }\n";

    let plain = compile(source);
    let reused = compile_with(
        source,
        tac::opt::OptFlags {
            power_of_two: false,
            reuse_tmps: true,
        },
        x86_64::opt::OptFlags::OFF,
    );

    let before = distinct_temporaries(&plain.tac_text);
    let after = distinct_temporaries(&reused.tac_text);
    assert!(
        after.len() < before.len(),
        "expected fewer temporaries, had {} and still {}",
        before.len(),
        after.len()
    );
}

#[test]
fn temporary_reuse_shares_stack_slots() {
    let source = "\
inte a = 1;\n\
inte b = 2;\n\
inte f() { retorne (a + b) + (a + b) + (a + b); }\n";

    let count_slots = |compiled: &Compiled| {
        compiled
            .asm_text
            .lines()
            .filter_map(|line| {
                let line = line.trim();
                line.strip_prefix("subq $")
                    .and_then(|rest| rest.strip_suffix(", %rsp"))
            })
            .filter_map(|amount| amount.parse::<i64>().ok())
            .max()
            .unwrap()
    };

    let plain = compile(source);
    let reused = compile_with(
        source,
        tac::opt::OptFlags {
            power_of_two: false,
            reuse_tmps: true,
        },
        x86_64::opt::OptFlags::OFF,
    );
    assert!(count_slots(&reused) < count_slots(&plain));
}

#[test]
fn nan_never_compares_equal_to_itself() {
    let source = "\
real x = 0.0 / 0.0;\n\
inte main() { se (x == x) entaum escreva 1; senaum escreva 0; retorne 0; }\n";
    let compiled = compile(source);

    // The folded initializer really is a NaN...
    assert!(compiled.asm_text.contains("    .double nan\n"));

    // ...and the equality test rejects unordered operands through the
    // parity flag.
    let asm = &compiled.asm_text;
    let ucomisd = asm.find("ucomisd %xmm14, %xmm13").expect("no ucomisd");
    let tail = &asm[ucomisd..];
    let setz = tail.find("setz %r11b").expect("no setz");
    let setnp = tail.find("setnp %r10b").expect("no setnp");
    let and = tail.find("andq %r10, %r11").expect("no and");
    assert!(setz < setnp && setnp < and);
}

#[test]
fn float_parameters_ride_in_xmm_registers() {
    let source = "\
real media(real a, real b) { retorne (a + b) / 2.0; }\n\
inte main() { escreva media(1.0, 3.0); retorne 0; }\n";
    let compiled = compile(source);
    let asm = &compiled.asm_text;

    // Callee stores the incoming XMM registers into the parameter globals.
    assert!(asm.contains("movq %xmm0, \"a\"(%rip)"));
    assert!(asm.contains("movq %xmm1, \"b\"(%rip)"));
    // Caller passes the second argument in XMM1 before the call.
    let xmm1 = asm.find("movq %xmm12, %xmm1").expect("no xmm1 load");
    let call = asm.find("callq \"media\"").expect("no call");
    assert!(xmm1 < call);
}

#[test]
fn string_data_is_shared_between_uses() {
    let source = "\
inte main() { escreva \"x\\n\"; escreva \"x\\n\"; retorne 0; }\n";
    let compiled = compile(source);
    assert_eq!(compiled.asm_text.matches("    .ascii \"x\\n\"\n").count(), 1);
}

#[test]
fn textual_tac_rendering_is_stable() {
    let first = compile(FIBO);
    let second = compile(FIBO);
    assert_eq!(first.tac_text, second.tac_text);
    assert_eq!(first.asm_text, second.asm_text);
}

#[test]
fn debug_and_pretty_tac_agree_on_instruction_count() {
    let mut table = symtab::SymbolTable::new();
    let mut program = crate::parser::parse_program(FIBO, &mut table).unwrap();
    let errors = crate::semantics::check_program(&mut table, &mut program);
    assert!(errors.is_empty());
    let tac = tac::gen::lower(&mut table, &program);

    let mut pretty = Vec::new();
    tac.print(&table, tac::RenderParams { space_count: 4 }, &mut pretty)
        .unwrap();
    let mut raw = Vec::new();
    tac.raw_print(&table, &mut raw).unwrap();

    let pretty = String::from_utf8(pretty).unwrap();
    let raw = String::from_utf8(raw).unwrap();
    assert_eq!(pretty.lines().count(), raw.lines().count());
    assert!(raw.lines().all(|line| line.starts_with("TAC(")));
}

#[test]
fn tab_indentation_is_selectable() {
    let mut table = symtab::SymbolTable::new();
    let mut program = crate::parser::parse_program("inte x = 1;\n", &mut table).unwrap();
    crate::semantics::check_program(&mut table, &mut program);
    let tac = tac::gen::lower(&mut table, &program);

    let mut out = Vec::new();
    tac.print(&table, tac::RenderParams { space_count: -1 }, &mut out)
        .unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "\t.defs x, 1\n");
}

#[test]
fn every_stack_adjustment_is_16_byte_aligned() {
    let compiled = compile_full(FIBO);
    for line in compiled.asm_text.lines() {
        let line = line.trim();
        if let Some(amount) = line
            .strip_prefix("subq $")
            .and_then(|rest| rest.strip_suffix(", %rsp"))
        {
            let amount: i64 = amount.parse().unwrap();
            assert_eq!(amount % 16, 0, "unaligned adjustment in {}", line);
        }
    }
}
