//! Code generation: turns a linked token arena into NASM assembly text.
//!
//! # Module structure
//!
//! - [`preamble`] — the fixed literal preamble (sections, reserved storage,
//!   the `peek` helper).
//! - [`procedure`] — the procedure prologue stack-shuffle and epilogue.
//! - [`emit`] — the exhaustive per-`Operator` match that produces NASM
//!   fragments, plus the `symbols`-table bookkeeping `where`/`retrieve`/
//!   `mutate` share with procedure parameter binding.
//!
//! [`generate`] threads all three: it walks the token arena once, tags each
//! fragment with the operator that produced it (handy when reading the
//! emitted `.asm` by eye), and appends one `db` entry per string literal
//! after the instruction stream.

pub mod emit;
pub mod preamble;
pub mod procedure;

use crate::context::Context;
use crate::error::CompileError;
use crate::token::{Token, TokenValue};

const TAG_COLUMN: usize = 29;

fn tag_instructions(instructions: &str, name: &str) -> String {
    let lines: Vec<&str> = instructions.split('\n').collect();
    let first = lines[0];
    let padding = " ".repeat(TAG_COLUMN.saturating_sub(first.len()));
    let mut out = format!("{first}{padding} ;; {name}");
    for line in &lines[1..] {
        out.push('\n');
        out.push_str(line);
    }
    out
}

/// Generate the full assembly text for a linked program.
pub fn generate(program: &[Token], ctx: &Context) -> Result<String, CompileError> {
    let mut state = emit::EmitState::default();
    let mut assembly = preamble::header();

    for (i, token) in program.iter().enumerate() {
        let lines = emit::emit_token(token, i, program, ctx, &mut state)?;
        let fragment = lines.join("\n");
        assembly.push('\n');
        assembly.push_str(&tag_instructions(&fragment, operator_name(token.operator)));
    }

    for idx in &state.add_symbols {
        let token = &program[*idx];
        let data = match &token.value {
            TokenValue::Bytes { data, .. } => data,
            _ => unreachable!("add_symbols only ever holds PushString tokens"),
        };
        assembly.push_str(&format!("\n\n{}:\n    db    {data}", token.label.as_deref().unwrap()));
    }

    Ok(assembly)
}

fn operator_name(operator: crate::operator::Operator) -> &'static str {
    use crate::operator::Operator::*;
    match operator {
        Add => "ADD",
        Sub => "SUB",
        Mul => "MUL",
        Div => "DIV",
        Mod => "MOD",
        Equal => "EQUAL",
        NotEqual => "NOT_EQUAL",
        LessThan => "LESS_THAN",
        GreaterThan => "GREATER_THAN",
        LessOrEqualThan => "LESS_OR_EQUAL_THAN",
        GreaterOrEqualThan => "GREATER_OR_EQUAL_THAN",
        And => "AND",
        Or => "OR",
        Not => "NOT",
        Bool => "BOOL",
        Drop => "DROP",
        Rot2 => "ROT2",
        Drot2 => "DROT2",
        Rot3 => "ROT3",
        Dup => "DUP",
        Dup2 => "DUP2",
        Dup3 => "DUP3",
        Load => "LOAD",
        Load1 => "LOAD1",
        Store => "STORE",
        Store1 => "STORE1",
        Memory => "MEMORY",
        Peek => "PEEK",
        Hardpeek => "HARDPEEK",
        Putchar => "PUTCHAR",
        If => "IF",
        Elif => "ELIF",
        Else => "ELSE",
        End => "END",
        While => "WHILE",
        Do => "DO",
        Where => "WHERE",
        Procedure => "PROCEDURE",
        ProcedureCall => "PROCEDURE_CALL",
        Import => "IMPORT",
        Define => "DEFINE",
        Macro => "MACRO",
        MacroExpansion => "MACRO_EXPANSION",
        Syscall => "SYSCALL",
        PushUint => "PUSH_UINT",
        PushChar => "PUSH_CHAR",
        PushString => "PUSH_STRING",
        Mutate => "MUTATE",
        Retrieve => "RETRIEVE",
        WriteTo => "WRITE_TO",
        Dereference => "DEREFERENCE",
        AutoIncrement => "AUTOINCREMENT",
        AutoDecrement => "AUTODECREMENT",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expander::expand_macros;
    use crate::linker::link;
    use crate::loader::load_macros;
    use crate::token::tokenize;
    use std::path::Path;

    fn compile(src: &str) -> String {
        let mut ctx = Context::new();
        let tokens = tokenize(src, Path::new("."), &mut ctx).unwrap();
        let loaded = load_macros(tokens, &mut ctx).unwrap();
        let expanded = expand_macros(loaded, &ctx).unwrap();
        let program = link(expanded, &mut ctx).unwrap();
        generate(&program, &ctx).unwrap()
    }

    #[test]
    fn arithmetic_print_scenario_emits_hardpeek_dump() {
        let asm = compile("procedure main in 34 35 + hardpeek end");
        assert!(asm.contains("_start:"));
        assert!(asm.contains("call    peek"));
        assert!(asm.contains("mov     rdi, 0   ;; EXIT"));
    }

    #[test]
    fn if_else_scenario_emits_both_arms() {
        let asm = compile("procedure main in 1 if 1 do 65 else 66 end putchar end");
        assert!(asm.contains("push    65"));
        assert!(asm.contains("push    66"));
        assert!(asm.contains("SYS_WRITE"));
    }

    #[test]
    fn counted_loop_scenario_emits_a_backward_jump() {
        let asm = compile("procedure main in 0 while dup 3 < do dup 48 + putchar 1 + end drop end");
        assert!(asm.matches("jmp     while").count() >= 1);
    }

    #[test]
    fn string_literal_scenario_appends_a_data_segment_entry() {
        let asm = compile(r#"procedure main in "hi\n" drop drop end"#);
        assert!(asm.contains("string_literal0:"));
        assert!(asm.contains("db    \"hi\",10,0"));
    }

    #[test]
    fn procedure_with_return_scenario_shuffles_and_calls() {
        let asm = compile("procedure add a b -- c in a b + !c end procedure main in 2 3 add hardpeek drop end");
        assert!(asm.contains("procedure_add:"));
        assert!(asm.contains("call    procedure_add"));
    }

    #[test]
    fn where_block_scenario_binds_and_releases_symbols() {
        let asm = compile("procedure main in 10 20 where a b in a b + hardpeek end drop end");
        assert!(asm.contains(";; Bind a"));
        assert!(asm.contains("Remove variables from the symbols table"));
    }
}
