//! tern code generation: x86-64 assembly in Intel syntax, System V AMD64
//! ABI, linked against the host C library.
//!
//! Generation is two passes over the type-checked AST. The explore pass
//! allocates storage and jump labels; the emit pass is a straight structural
//! walk producing the assembly text.

mod emitter;
mod explorer;
mod object;

use tern_syntax::ast::{Meta, Program};
use tern_syntax::error::{Error, Result, Stage};

// Codegen diagnostics have no source position: they are either internal
// invariant failures or backend limits.
pub(crate) fn err<T>(msg: impl Into<String>) -> Result<T> {
    Err(Error::new(Stage::Codegen, msg))
}

/// Compiles an analyzed program to assembly text.
pub fn generate(prog: &Program, meta: &Meta) -> Result<String> {
    let layout = explorer::explore(prog, meta)?;
    emitter::emit(prog, meta, &layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_lexer::Scanner;
    use tern_parser::Parser;

    fn compile(input: &str) -> String {
        let tokens = Scanner::new(input).scan().expect("scan should succeed");
        let prog = Parser::new(tokens)
            .parse_program()
            .expect("parse should succeed");
        let meta = tern_sema::analyze(&prog).expect("analysis should succeed");
        generate(&prog, &meta).expect("generation should succeed")
    }

    // Asserts the lines appear in this order (not necessarily adjacent).
    fn assert_in_order(asm: &str, lines: &[&str]) {
        let mut at = 0;
        for line in lines {
            match asm[at..].find(line) {
                Some(i) => at += i + line.len(),
                None => panic!("missing `{}` (after byte {}) in:\n{}", line, at, asm),
            }
        }
    }

    #[test]
    fn hello_world() {
        let asm = compile("puts(\"Hello, world!\");");
        assert_in_order(
            &asm,
            &[
                ".intel_syntax noprefix",
                ".section .rodata",
                "str0:",
                ".string \"Hello, world!\"",
                ".text",
                ".globl main",
                "main:",
                "push rbp",
                "mov rbp, rsp",
                "mov rax, offset flat:str0",
                "push rax",
                "pop rdi",
                "mov al, 0",
                "call puts",
                "mov rax, 0",
                "leave",
                "ret",
            ],
        );
    }

    #[test]
    fn no_rodata_section_without_strings() {
        let asm = compile("var x := 1;");
        assert!(!asm.contains(".rodata"));
    }

    #[test]
    fn string_escapes_in_rodata() {
        let asm = compile("puts(\"a\\n\\\"b\\\"\");");
        assert!(asm.contains(".string \"a\\n\\\"b\\\"\""));
    }

    #[test]
    fn globals_allocated_in_bss() {
        let asm = compile("var x := 1; var flag := true;");
        assert_in_order(
            &asm,
            &[
                ".comm gvar0_x,8,8",
                ".comm gvar1_flag,1,1",
                "mov rax, 1",
                "mov qword ptr gvar0_x[rip], rax",
                "mov rax, 1",
                "mov byte ptr gvar1_flag[rip], al",
            ],
        );
    }

    #[test]
    fn bool_reads_zero_extend() {
        let asm = compile("var flag := true; var other := flag;");
        assert!(asm.contains("movzx rax, byte ptr gvar0_flag[rip]"));
    }

    #[test]
    fn function_declaration_and_direct_call() {
        let asm = compile(
            "func add(x: int, y: int) -> int { return x + y; }\nprintf(\"%d\\n\", add(1, 2));",
        );
        assert_in_order(
            &asm,
            &[
                "fn0_add:",
                "push rbp",
                "mov rbp, rsp",
                "sub rsp, 16",
                "mov qword ptr [rbp-8], rdi",
                "mov qword ptr [rbp-16], rsi",
                // return x + y: right operand first, pop into rcx.
                "mov rax, qword ptr [rbp-16]",
                "push rax",
                "mov rax, qword ptr [rbp-8]",
                "pop rcx",
                "add rax, rcx",
                "jmp .L0",
                ".L0:",
                "leave",
                "ret",
            ],
        );
        assert_in_order(&asm, &["call fn0_add", "call printf"]);
    }

    #[test]
    fn frame_sizes_are_16_byte_aligned() {
        let asm = compile("func f() -> { var b := true; var n := 5; }");
        assert_in_order(
            &asm,
            &[
                "fn0_f:",
                "sub rsp, 16",
                "mov byte ptr [rbp-1], al",
                "mov qword ptr [rbp-16], rax",
            ],
        );
    }

    #[test]
    fn bool_parameters_spill_byte_registers() {
        let asm = compile("func f(flag: bool, n: int) -> { }");
        assert_in_order(
            &asm,
            &["mov byte ptr [rbp-1], dil", "mov qword ptr [rbp-16], rsi"],
        );
    }

    #[test]
    fn comparison_uses_setcc() {
        let asm = compile("var x := 1 < 2;");
        assert_in_order(&asm, &["cmp rax, rcx", "setl al", "movzx rax, al"]);
        let asm = compile("var x := 1 == 2;");
        assert!(asm.contains("sete al"));
        let asm = compile("var x := 1 >= 2;");
        assert!(asm.contains("setge al"));
    }

    #[test]
    fn division_and_modulo() {
        let asm = compile("var q := 7 / 2; var r := 7 % 2;");
        assert_in_order(&asm, &["cqo", "idiv rcx", "cqo", "idiv rcx", "mov rax, rdx"]);
    }

    #[test]
    fn short_circuit_and_or() {
        let asm = compile("var t := true && false;");
        assert_in_order(&asm, &["cmp rax, 0", "je .L0", ".L0:"]);
        assert!(!asm.contains("and rax"));

        let asm = compile("var t := true || false;");
        assert_in_order(&asm, &["cmp rax, 0", "jne .L0", ".L0:"]);
        assert!(!asm.contains("or rax"));
    }

    #[test]
    fn if_else_branches() {
        let asm = compile("var x := 1; if x == 1 { puts(\"y\"); } else { puts(\"n\"); }");
        assert_in_order(
            &asm,
            &[
                "sete al",
                "movzx rax, al",
                "cmp rax, 0",
                "je .L0",
                "jmp .L1",
                ".L0:",
                ".L1:",
            ],
        );
    }

    #[test]
    fn while_with_break_and_continue() {
        let asm = compile(
            "var i := 0; while i < 3 { if i == 2 { break; } i += 1; continue; }",
        );
        // Loop begin .L0 and end .L2; the inner if owns .L1. break jumps to
        // the loop end, continue back to the condition.
        assert_in_order(
            &asm,
            &[
                ".L0:",
                "je .L2",
                "je .L1",
                "jmp .L2",
                ".L1:",
                "jmp .L0",
                "jmp .L0",
                ".L2:",
            ],
        );
    }

    #[test]
    fn range_literal_builds_a_record() {
        let asm = compile("var r := 1..5;");
        assert_in_order(
            &asm,
            &[
                ".comm grng0,16,8",
                // upper first, then lower; lower lands at [base], upper at +8.
                "mov rax, 5",
                "push rax",
                "mov rax, 1",
                "pop rcx",
                "mov qword ptr grng0[rip], rax",
                "mov qword ptr grng0[rip+8], rcx",
                "mov rax, offset flat:grng0",
            ],
        );
    }

    #[test]
    fn for_over_range_is_inclusive() {
        let asm = compile("var s := 0; for i in 0..10 { s += i; }");
        assert_in_order(
            &asm,
            &[
                "mov rcx, qword ptr [rax]",
                ".L0:",
                "mov rcx, qword ptr [rax+8]",
                "cmp rax, rcx",
                "jg .L2",
                ".L1:",
                "jmp .L0",
                ".L2:",
            ],
        );
        // Both the element and the implicit index advance each iteration.
        let increments = asm.matches(", 1\n").count();
        assert!(increments >= 2, "expected two counters in:\n{}", asm);
    }

    #[test]
    fn for_over_array_loads_elements() {
        let asm = compile("var a := [10, 20, 30]; for e in a { printf(\"%d\\n\", e); }");
        assert_in_order(
            &asm,
            &[
                ".comm garr0,24,8",
                "cmp rax, 3",
                "mov rax, qword ptr [rcx+rax*8]",
            ],
        );
    }

    #[test]
    fn array_literal_stores_elements() {
        let asm = compile("var a := [1, 2];");
        assert_in_order(
            &asm,
            &[
                ".comm garr0,16,8",
                "mov rax, 1",
                "mov qword ptr garr0[rip+0], rax",
                "mov rax, 2",
                "mov qword ptr garr0[rip+8], rax",
                "mov rax, offset flat:garr0",
            ],
        );
    }

    #[test]
    fn local_array_literal_uses_frame_slots() {
        let asm = compile("func f() -> { var a := [1, 2]; }");
        assert_in_order(
            &asm,
            &[
                "mov qword ptr [rbp-16], rax",
                "mov qword ptr [rbp-8], rax",
                "lea rax, [rbp-16]",
            ],
        );
    }

    #[test]
    fn short_form_array_fills_every_slot() {
        let asm = compile("var a := [3]int(7);");
        assert_in_order(
            &asm,
            &[
                ".comm garr0,24,8",
                "mov rax, 7",
                "mov qword ptr garr0[rip+0], rax",
                "mov qword ptr garr0[rip+8], rax",
                "mov qword ptr garr0[rip+16], rax",
            ],
        );
    }

    #[test]
    fn index_reads_and_writes() {
        let asm = compile("var a := [1, 2]; var x := a[0]; a[1] = 9;");
        assert_in_order(
            &asm,
            &["mov rax, qword ptr [rax+rcx*8]", "mov qword ptr [rax+rcx*8], rdx"],
        );
    }

    #[test]
    fn in_over_a_range_checks_both_bounds() {
        let asm = compile("var found := 3 in 0..9;");
        assert_in_order(
            &asm,
            &[
                "cmp rax, qword ptr [rcx]",
                "jl .L0",
                "cmp rax, qword ptr [rcx+8]",
                "jg .L0",
                "mov rax, 1",
                "jmp .L1",
                ".L0:",
                "mov rax, 0",
                ".L1:",
            ],
        );
    }

    #[test]
    fn in_over_an_array_scans_elements() {
        let asm = compile("var a := [1, 2, 3, 4]; var found := 3 in a;");
        assert_in_order(
            &asm,
            &[
                "mov rdx, 0",
                ".L0:",
                "cmp rdx, 4",
                "je .L1",
                "add rdx, 1",
                "cmp qword ptr [rcx+rdx*8-8], rax",
                "jne .L0",
                "mov rax, 1",
                "jmp .L2",
                ".L1:",
                "mov rax, 0",
                ".L2:",
            ],
        );
    }

    #[test]
    fn function_literal_is_a_first_class_value() {
        let asm = compile(
            "var sq := (x: int) -> int { return x * x; };\nprintf(\"%d\\n\", sq(7));",
        );
        assert_in_order(
            &asm,
            &[
                "fn0:",
                "imul rax, rcx",
                "mov rax, offset flat:fn0",
                "mov qword ptr gvar0_sq[rip], rax",
            ],
        );
        // Calling through the variable is indirect.
        assert_in_order(&asm, &["mov rax, qword ptr gvar0_sq[rip]", "call rax"]);
    }

    #[test]
    fn function_name_evaluates_to_its_address() {
        let asm = compile(
            "func inc(n: int) -> int { return n + 1; }\nvar f := inc;\nprintf(\"%d\\n\", f(1));",
        );
        assert_in_order(&asm, &["mov rax, offset flat:fn0_inc", "call rax"]);
    }

    #[test]
    fn compound_assignment_rewrites_to_a_store() {
        let asm = compile("var x := 1; x *= 3;");
        assert_in_order(
            &asm,
            &[
                "mov rax, 3",
                "push rax",
                "mov rax, qword ptr gvar0_x[rip]",
                "pop rcx",
                "imul rax, rcx",
                "mov qword ptr gvar0_x[rip], rax",
            ],
        );
    }

    #[test]
    fn arguments_pass_in_sysv_registers() {
        let asm = compile("func f(a: int, b: int, c: int) -> { }\nf(1, 2, 3);");
        assert_in_order(&asm, &["pop rdx", "pop rsi", "pop rdi", "call fn0_f"]);
    }

    #[test]
    fn too_many_arguments_are_rejected() {
        let input = "func f(a: int, b: int, c: int, d: int, e: int, g: int, h: int) -> { }";
        let tokens = Scanner::new(input).scan().unwrap();
        let prog = Parser::new(tokens).parse_program().unwrap();
        let meta = tern_sema::analyze(&prog).unwrap();
        let err = generate(&prog, &meta).unwrap_err();
        assert!(err.msg.contains("parameters"));
    }

    #[test]
    fn main_returns_zero() {
        let asm = compile("var x := 41; x += 1;");
        let tail: Vec<&str> = asm.lines().rev().take(3).collect();
        assert_eq!(tail, vec!["\tret", "\tleave", "\tmov rax, 0"]);
    }
}
