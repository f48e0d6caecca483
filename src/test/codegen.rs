//! Per-opcode checks of the generated assembly: each test compiles a tiny
//! program and asserts the exact instruction sequence the lowering of one
//! TAC opcode produces.

use super::{compile, compile_with};
use crate::tac;
use crate::x86_64;

fn power_of_two() -> tac::opt::OptFlags {
    tac::opt::OptFlags {
        power_of_two: true,
        reuse_tmps: false,
    }
}

#[test]
fn move_between_integer_globals() {
    let compiled = compile("inte x = 1;\ninte y = 2;\ninte main() { x = y; retorne 0; }\n");
    assert!(compiled
        .asm_text
        .contains("    movq \"y\"(%rip), %rax\n    movq %rax, \"x\"(%rip)\n"));
}

#[test]
fn move_between_character_globals_zeroes_the_scratch() {
    let compiled = compile("cara c = 'a';\ncara d = 'b';\ninte main() { c = d; retorne 0; }\n");
    assert!(compiled.asm_text.contains(
        "    movq $0, %rax\n    movb \"d\"(%rip), %al\n    movb %al, \"c\"(%rip)\n"
    ));
}

#[test]
fn integer_addition_accumulates_in_rax() {
    let compiled = compile("inte x = 1;\ninte y = 2;\ninte main() { retorne x + y; }\n");
    assert!(compiled.asm_text.contains(
        "    movq \"x\"(%rip), %rax\n    addq \"y\"(%rip), %rax\n    movq %rax, -8(%rbp)\n"
    ));
}

#[test]
fn integer_subtraction_orders_operands() {
    let compiled = compile("inte x = 1;\ninte y = 2;\ninte main() { retorne x - y; }\n");
    assert!(compiled
        .asm_text
        .contains("    movq \"x\"(%rip), %rax\n    subq \"y\"(%rip), %rax\n"));
}

#[test]
fn logical_and_works_on_stored_booleans() {
    let compiled = compile(
        "inte x = 1;\ninte y = 2;\n\
         inte main() { se ((x < y) & (y < x)) entaum retorne 1; retorne 0; }\n",
    );
    assert!(compiled
        .asm_text
        .contains("    movq -8(%rbp), %rax\n    andq -16(%rbp), %rax\n"));
}

#[test]
fn logical_or_works_on_stored_booleans() {
    let compiled = compile(
        "inte x = 1;\ninte y = 2;\n\
         inte main() { se ((x < y) | (y < x)) entaum retorne 1; retorne 0; }\n",
    );
    assert!(compiled.asm_text.contains("    orq -16(%rbp), %rax\n"));
}

#[test]
fn integer_multiplication_uses_one_operand_imul() {
    let compiled = compile("inte x = 3;\ninte y = 5;\ninte main() { retorne x * y; }\n");
    assert!(compiled
        .asm_text
        .contains("    movq \"x\"(%rip), %rax\n    imulq \"y\"(%rip)\n"));
}

#[test]
fn integer_division_sign_extends_first() {
    let compiled = compile("inte x = 7;\ninte y = 2;\ninte main() { retorne x / y; }\n");
    assert!(compiled
        .asm_text
        .contains("    movq \"x\"(%rip), %rax\n    cqo\n    idivq \"y\"(%rip)\n"));
}

#[test]
fn float_arithmetic_runs_through_xmm15() {
    let compiled = compile(
        "real a = 1.0;\nreal b = 2.0;\nreal f() { retorne a + b; }\ninte main() { retorne 0; }\n",
    );
    assert!(compiled.asm_text.contains(
        "    movq \"a\"(%rip), %xmm15\n    addsd \"b\"(%rip), %xmm15\n    movq %xmm15, -8(%rbp)\n"
    ));
}

#[test]
fn all_float_arithmetic_opcodes_are_sse() {
    for (operator, mnemonic) in [("+", "addsd"), ("-", "subsd"), ("*", "mulsd"), ("/", "divsd")]
        .iter()
    {
        let source = format!(
            "real a = 1.0;\nreal b = 2.0;\nreal f() {{ retorne a {} b; }}\n\
             inte main() {{ retorne 0; }}\n",
            operator
        );
        let compiled = compile(&source);
        assert!(
            compiled
                .asm_text
                .contains(&format!("    {} \"b\"(%rip), %xmm15\n", mnemonic)),
            "missing {} for operator {}",
            mnemonic,
            operator
        );
    }
}

#[test]
fn integer_comparisons_pick_the_right_setcc() {
    for (operator, set) in [
        ("<", "setl"),
        (">", "setg"),
        ("<=", "setle"),
        (">=", "setge"),
        ("==", "setz"),
        ("!=", "setnz"),
    ]
    .iter()
    {
        let source = format!(
            "inte x = 1;\ninte y = 2;\n\
             inte main() {{ se (x {} y) entaum retorne 1; retorne 0; }}\n",
            operator
        );
        let compiled = compile(&source);
        let expected = format!(
            "    cmpq %r10, %rax\n    movq $0, %r10\n    {} %r10b\n    movq %r10, -8(%rbp)\n",
            set
        );
        assert!(
            compiled.asm_text.contains(&expected),
            "operator {} missing sequence:\n{}",
            operator,
            compiled.asm_text
        );
    }
}

fn float_comparison(operator: &str) -> String {
    let source = format!(
        "real a = 1.0;\nreal b = 2.0;\n\
         inte main() {{ se (a {} b) entaum retorne 1; retorne 0; }}\n",
        operator
    );
    compile(&source).asm_text
}

#[test]
fn float_equality_conjoins_zero_and_ordered() {
    let asm = float_comparison("==");
    assert!(asm.contains(
        "    setz %r11b\n    setnp %r10b\n    andq %r10, %r11\n    movq %r11, -8(%rbp)\n"
    ));
}

#[test]
fn float_inequality_needs_no_parity_guard() {
    let asm = float_comparison("!=");
    assert!(asm.contains("    setnz %r11b\n    movq %r11, -8(%rbp)\n"));
}

#[test]
fn float_less_than_conjoins_carry_and_ordered() {
    let asm = float_comparison("<");
    assert!(asm.contains("    setc %r11b\n    setnp %r10b\n    andq %r10, %r11\n"));
}

#[test]
fn float_less_or_equal_merges_carry_and_zero() {
    let asm = float_comparison("<=");
    assert!(asm.contains(
        "    setc %r11b\n    setz %r10b\n    orq %r10, %r11\n    setnp %r10b\n    andq %r10, %r11\n"
    ));
}

#[test]
fn float_greater_than_conjoins_not_carry_and_not_zero() {
    let asm = float_comparison(">");
    assert!(asm.contains("    setnc %r11b\n    setnz %r10b\n    andq %r10, %r11\n"));
}

#[test]
fn float_greater_or_equal_is_a_single_flag() {
    let asm = float_comparison(">=");
    assert!(asm.contains("    setnc %r11b\n    movq %r11, -8(%rbp)\n"));
}

#[test]
fn logical_not_masks_the_low_bit() {
    let compiled = compile(
        "inte x = 1;\ninte y = 2;\n\
         inte main() { se (~(x < y)) entaum retorne 1; retorne 0; }\n",
    );
    assert!(compiled
        .asm_text
        .contains("    notq %rax\n    andq $1, %rax\n"));
}

#[test]
fn small_shift_multiplications_use_scaled_lea() {
    let compiled = compile_with(
        "inte x = 3;\ninte main() { retorne x * 4; }\n",
        power_of_two(),
        x86_64::opt::OptFlags::OFF,
    );
    assert!(compiled.tac_text.contains("shmul"));
    assert!(compiled
        .asm_text
        .contains("    leaq 0(, %rax, 4), %rax\n"));
}

#[test]
fn large_shift_multiplications_fall_back_to_shl() {
    let compiled = compile_with(
        "inte x = 3;\ninte main() { retorne x * 16; }\n",
        power_of_two(),
        x86_64::opt::OptFlags::OFF,
    );
    assert!(compiled.asm_text.contains("    shlq $4, %rax\n"));
}

#[test]
fn computed_factors_are_not_rewritten() {
    let compiled = compile_with(
        "inte x = 3;\ninte main() { retorne x * (0 - 2); }\n",
        power_of_two(),
        x86_64::opt::OptFlags::OFF,
    );
    // 0 - 2 is not constant-folded inside a function body, so no literal
    // operand exists for the rewrite and the plain imul stays.
    assert!(compiled.asm_text.contains("imulq"));
}

#[test]
fn shift_division_biases_negative_dividends() {
    let compiled = compile_with(
        "inte x = 9;\ninte main() { retorne x / 8; }\n",
        power_of_two(),
        x86_64::opt::OptFlags::OFF,
    );
    assert!(compiled.tac_text.contains("shdiv"));
    assert!(compiled.asm_text.contains(
        "    leaq 7(%rax), %r9\n    testq %rax, %rax\n    cmovns %rax, %r9\n    sarq $3, %r9\n"
    ));
}

#[test]
fn branch_lowering_tests_for_zero() {
    let compiled = compile(
        "inte n = 5;\ninte main() { enquanto (n > 0) n = n - 1; retorne n; }\n",
    );
    // Loop head label, exit branch and back edge, in that order.
    let asm = &compiled.asm_text;
    let head = asm.find("\"@label_0\":").expect("no loop head");
    let exit = asm.find("    testq %rax, %rax\n    jz \"@label_1\"\n").expect("no exit branch");
    let back = asm.find("    jmp \"@label_0\"\n").expect("no back edge");
    let target = asm.find("\"@label_1\":").expect("no exit label");
    assert!(head < exit && exit < back && back < target);
}

#[test]
fn calls_pop_their_outgoing_stack_region() {
    let compiled = compile(
        "inte f(inte a) { retorne a; }\n\
         inte main() { retorne f(1); }\n",
    );
    assert!(compiled
        .asm_text
        .contains("    callq \"f\"\n    addq $0, %rsp\n    movq %rax, -8(%rbp)\n"));
}

#[test]
fn float_call_results_come_back_in_xmm0() {
    let compiled = compile(
        "real f() { retorne 1.5; }\n\
         inte main() { escreva f(); retorne 0; }\n",
    );
    assert!(compiled
        .asm_text
        .contains("    callq \"f\"\n    addq $0, %rsp\n    movq %xmm0, -8(%rbp)\n"));
}

#[test]
fn character_output_formats_with_percent_c() {
    let compiled = compile("inte main() { escreva 'a'; retorne 0; }\n");
    assert!(compiled.asm_text.contains("    .ascii \"%c\\0\"\n"));
    assert!(compiled
        .asm_text
        .contains("    movq $0, %rsi\n    movb $97, %sil\n"));
    assert!(compiled
        .asm_text
        .contains("    movq $0, %rax\n    callq \"printf\"@PLT\n"));
}

#[test]
fn integer_output_formats_with_percent_li() {
    let compiled = compile("inte x = 42;\ninte main() { escreva x; retorne 0; }\n");
    assert!(compiled.asm_text.contains("    .ascii \"%li\\0\"\n"));
    assert!(compiled
        .asm_text
        .contains("    movq \"x\"(%rip), %rsi\n    movq $0, %rax\n    callq \"printf\"@PLT\n"));
}

#[test]
fn float_output_declares_one_xmm_argument() {
    let compiled = compile("real r = 2.5;\ninte main() { escreva r; retorne 0; }\n");
    assert!(compiled.asm_text.contains("    .ascii \"%lf\\0\"\n"));
    assert!(compiled
        .asm_text
        .contains("    movq \"r\"(%rip), %xmm0\n    movq $1, %rax\n    callq \"printf\"@PLT\n"));
}

#[test]
fn console_reads_call_the_runtime_routine() {
    let compiled = compile("inte main() { retorne entrada; }\n");
    assert!(compiled
        .asm_text
        .contains("    callq \"@entrada\"\n    movq %rax, -8(%rbp)\n"));
}

#[test]
fn vector_loads_scale_by_eight_for_integers() {
    let compiled = compile(
        "inte v[10];\ninte y = 0;\ninte main() { y = v[3]; retorne y; }\n",
    );
    assert!(compiled.asm_text.contains(
        "    leaq \"v\"(%rip), %rax\n    movq $3, %r11\n    movq %r11, %r9\n    \
         movq 0(%rax, %r9, 8), %r8\n    movq %r8, \"y\"(%rip)\n"
    ));
}

#[test]
fn vector_stores_scale_by_eight_for_integers() {
    let compiled = compile(
        "inte v[10];\ninte x = 7;\ninte main() { v[3] = x; retorne 0; }\n",
    );
    assert!(compiled.asm_text.contains(
        "    movq \"x\"(%rip), %r9\n    leaq \"v\"(%rip), %r8\n    movq %r9, 0(%r8, %rax, 8)\n"
    ));
}

#[test]
fn mixed_parameters_use_independent_register_pools() {
    let compiled = compile(
        "inte f(inte a, real b, inte c) { retorne a + c; }\n\
         inte main() { retorne f(1, 2.0, 3); }\n",
    );
    let asm = &compiled.asm_text;
    // Callee: the float parameter does not consume an integer slot.
    assert!(asm.contains("    movq %rdi, \"a\"(%rip)\n"));
    assert!(asm.contains("    movq %xmm0, \"b\"(%rip)\n"));
    assert!(asm.contains("    movq %rsi, \"c\"(%rip)\n"));
    // Caller mirrors the pools.
    let rdi = asm.find("movq %r11, %rdi").expect("no first argument");
    let xmm = asm.find("movq %xmm12, %xmm0").expect("no float argument");
    let rsi = asm.find("movq %r11, %rsi").expect("no third argument");
    let call = asm.find("callq \"f\"").expect("no call");
    assert!(rdi < xmm && xmm < rsi && rsi < call);
}

#[test]
fn synthetic_returns_use_the_typed_zero() {
    let compiled = compile("real f() { escreva 1; }\ninte main() { retorne 0; }\n");
    assert!(compiled.tac_text.contains("    ret 0.0\n"));

    let compiled = compile("cara f() { escreva 1; }\ninte main() { retorne 0; }\n");
    assert!(compiled.tac_text.contains("    ret '\\0'\n"));
}

#[test]
fn every_return_path_restores_the_frame() {
    let compiled = compile(
        "inte f(inte n) { se (n > 0) entaum retorne 1; retorne 0; }\n\
         inte main() { retorne f(3); }\n",
    );
    let leave = "    movq %rbp, %rsp\n    popq %rbp\n    retq\n";
    // Two explicit returns in f, one in main, one in the read routine.
    assert_eq!(compiled.asm_text.matches(leave).count(), 4);
}
