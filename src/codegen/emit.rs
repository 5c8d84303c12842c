//! Per-token NASM emission: an exhaustive match over `Operator`, not a
//! runtime-resolved emitter bound to each token.

use crate::context::{procedure_label, Context};
use crate::error::CompileError;
use crate::operator::Operator;
use crate::token::{Token, TokenRef, TokenValue};

use super::procedure;

/// Runtime state the emitter threads across tokens: the compile-time mirror
/// of the `symbols` pointer table, and the string literals that still need
/// a data-segment entry appended after the instruction stream.
#[derive(Debug, Default)]
pub struct EmitState {
    pub symbols: Vec<String>,
    pub add_symbols: Vec<TokenRef>,
}

fn expect_name(token: &Token) -> &str {
    match &token.value {
        TokenValue::Name(n) => n,
        _ => unreachable!("non-Name payload on a token that requires one"),
    }
}

fn expect_names(token: &Token) -> &[String] {
    match &token.value {
        TokenValue::Names(n) => n,
        _ => unreachable!("non-Names payload on a `where` token"),
    }
}

fn symbol_location(symbols: &[String], name: &str) -> Result<usize, CompileError> {
    let i = symbols
        .iter()
        .rev()
        .position(|s| s == name)
        .ok_or_else(|| CompileError::UnknownReference { detail: format!("unexpected variable {name}") })?;
    Ok(i * 8 + 8)
}

/// Emit the NASM fragment for a single token. `index` is this token's
/// position in `program`; `program` is the whole linked arena, needed to
/// resolve `start_token`/`end_token` cross-references.
pub fn emit_token(
    token: &Token,
    index: TokenRef,
    program: &[Token],
    ctx: &Context,
    state: &mut EmitState,
) -> Result<Vec<String>, CompileError> {
    use Operator::*;

    let lines = match token.operator {
        Add => vec![
            "    pop     rax".to_string(),
            "    pop     rbx".to_string(),
            "    add     rax, rbx".to_string(),
            "    push    rax".to_string(),
        ],
        Sub => vec![
            "    pop     rax".to_string(),
            "    pop     rbx".to_string(),
            "    sub     rbx, rax".to_string(),
            "    push    rbx".to_string(),
        ],
        Mul => vec![
            "    pop     rax".to_string(),
            "    pop     rbx".to_string(),
            "    imul    rax, rbx".to_string(),
            "    push    rax".to_string(),
        ],
        Div => vec![
            "    xor     rdx, rdx".to_string(),
            "    pop     rbx".to_string(),
            "    pop     rax".to_string(),
            "    idiv    rbx".to_string(),
            "    push    rax".to_string(),
        ],
        Mod => vec![
            "    xor     rdx, rdx".to_string(),
            "    pop     rbx".to_string(),
            "    pop     rax".to_string(),
            "    idiv    rbx".to_string(),
            "    push    rdx".to_string(),
        ],
        Drop => vec!["    pop     rdi".to_string()],
        Rot2 => vec![
            "    pop     rax".to_string(),
            "    pop     rbx".to_string(),
            "    push    rax".to_string(),
            "    push    rbx".to_string(),
        ],
        Drot2 => vec![
            "    pop     rdx".to_string(),
            "    pop     rcx".to_string(),
            "    pop     rbx".to_string(),
            "    pop     rax".to_string(),
            "    push    rcx".to_string(),
            "    push    rdx".to_string(),
            "    push    rax".to_string(),
            "    push    rbx".to_string(),
        ],
        Rot3 => vec![
            "    pop     rax".to_string(),
            "    pop     rbx".to_string(),
            "    pop     rcx".to_string(),
            "    push    rbx".to_string(),
            "    push    rax".to_string(),
            "    push    rcx".to_string(),
        ],
        Dup => vec!["    pop     rax".to_string(), "    push    rax".to_string(), "    push    rax".to_string()],
        Dup2 => vec![
            "    pop     rbx".to_string(),
            "    pop     rax".to_string(),
            "    push    rax".to_string(),
            "    push    rbx".to_string(),
            "    push    rax".to_string(),
            "    push    rbx".to_string(),
        ],
        Dup3 => vec![
            "    pop     rcx".to_string(),
            "    pop     rbx".to_string(),
            "    pop     rax".to_string(),
            "    push    rax".to_string(),
            "    push    rbx".to_string(),
            "    push    rcx".to_string(),
            "    push    rax".to_string(),
            "    push    rbx".to_string(),
            "    push    rcx".to_string(),
        ],
        Load1 => vec![
            "    pop     rax".to_string(),
            "    mov     rbx, 0".to_string(),
            "    mov     bl, [rax]".to_string(),
            "    push    rbx".to_string(),
        ],
        Store1 => vec![
            "    pop     rax".to_string(),
            "    pop     rbx".to_string(),
            "    mov     [rax], bl".to_string(),
        ],
        Load => vec![
            "    pop     rax".to_string(),
            "    mov     rbx, 0".to_string(),
            "    mov     rbx, [rax]".to_string(),
            "    push    rbx".to_string(),
        ],
        Store => vec!["    pop     rax".to_string(), "    pop     rbx".to_string(), "    mov     [rax], rbx".to_string()],
        Memory => vec!["    push    memory".to_string()],
        Equal => compare("cmove"),
        NotEqual => compare("cmovne"),
        LessThan => compare_swapped("cmovl"),
        GreaterThan => compare_swapped("cmovg"),
        LessOrEqualThan => compare_swapped("cmovle"),
        GreaterOrEqualThan => compare_swapped("cmovge"),
        And => vec![
            "    pop     rax".to_string(),
            "    pop     rbx".to_string(),
            "    and     rax, rbx".to_string(),
            "    push    rax".to_string(),
        ],
        Or => vec![
            "    pop     rax".to_string(),
            "    pop     rbx".to_string(),
            "    or      rax, rbx".to_string(),
            "    push    rax".to_string(),
        ],
        Not => vec![
            "    mov     rbx, TRUE".to_string(),
            "    pop     rax".to_string(),
            "    not     rax".to_string(),
            "    and     rax, rbx".to_string(),
            "    push    rax".to_string(),
        ],
        Bool => vec![
            "    mov     rbx, FALSE".to_string(),
            "    mov     rcx, TRUE".to_string(),
            "    pop     rax".to_string(),
            "    cmp     rax, rbx".to_string(),
            "    cmove   rcx, rbx".to_string(),
            "    push    rcx".to_string(),
        ],
        Peek => vec!["    mov     rdi, [rsp]".to_string(), "    call    peek".to_string()],
        Hardpeek => vec![
            "    mov     rdi, [rsp]".to_string(),
            "    call    peek".to_string(),
            "    mov     rdi, [rsp + 8]".to_string(),
            "    call    peek".to_string(),
            "    mov     rdi, [rsp + 16]".to_string(),
            "    call    peek".to_string(),
            "    mov     rdi, [rsp + 24]".to_string(),
            "    call    peek".to_string(),
        ],
        Putchar => vec![
            "    pop     rax".to_string(),
            "    push    rax".to_string(),
            "    mov     rax, SYS_WRITE".to_string(),
            "    mov     rdi, STD_OUT".to_string(),
            "    mov     rsi, rsp".to_string(),
            "    mov     rdx, 1".to_string(),
            "    syscall".to_string(),
            "    add     rsp, 8".to_string(),
        ],
        If => vec![String::new()],
        Elif | Else => {
            let end = token.end_token.expect("linker always sets end_token on elif/else");
            vec![format!("    jmp     {}", program[end].label.as_deref().unwrap()), format!("{}:", token.label.as_deref().unwrap())]
        }
        While => vec![format!("{}:", token.label.as_deref().unwrap())],
        Do => {
            let end = token.end_token.expect("linker always sets end_token on do");
            vec![
                "    mov     rcx, TRUE".to_string(),
                "    pop     rax".to_string(),
                "    cmp     rax, TRUE".to_string(),
                format!("    jne     {}", program[end].label.as_deref().unwrap()),
            ]
        }
        End => emit_end(token, program, ctx, state)?,
        Where => {
            let names = expect_names(token);
            state.symbols.extend(names.iter().cloned());
            let mut inst = vec![format!("    ;; {:?}", state.symbols)];
            inst.extend(procedure::bind_variables(names));
            inst
        }
        Procedure => {
            let name = expect_name(token);
            let (inputs, returns) = ctx
                .procedure_signatures
                .get(name)
                .cloned()
                .ok_or_else(|| CompileError::Structural { detail: format!("procedure {name} has no recorded signature") })?;
            let (inst, bound) = procedure::emit_entry(name, &inputs, &returns);
            state.symbols.extend(bound);
            inst
        }
        ProcedureCall => {
            let name = expect_name(token);
            vec!["    xor     rax, rax".to_string(), format!("    call    {}", procedure_label(name))]
        }
        Syscall => {
            let n = match token.value {
                TokenValue::Count(n) => n,
                _ => unreachable!("Syscall always carries a Count"),
            };
            emit_syscall(n)
        }
        PushUint => {
            let v = match token.value {
                TokenValue::UInt(v) => v,
                _ => unreachable!("PushUint always carries a UInt"),
            };
            vec![format!("    push    {v}")]
        }
        PushChar => {
            let v = match token.value {
                TokenValue::Char(v) => v,
                _ => unreachable!("PushChar always carries a Char"),
            };
            vec![format!("    push    {v}")]
        }
        PushString => {
            let length = match &token.value {
                TokenValue::Bytes { length, .. } => *length,
                _ => unreachable!("PushString always carries Bytes"),
            };
            if !state.add_symbols.contains(&index) {
                state.add_symbols.push(index);
            }
            vec![format!("    push    {length}"), format!("    push    {}", token.label.as_deref().unwrap())]
        }
        Mutate => {
            let name = expect_name(token);
            let location = symbol_location(&state.symbols, name)?;
            vec![
                "    mov     rcx, [symbols]".to_string(),
                format!("    sub     rcx, {location}"),
                "    mov     rbx, [rcx]".to_string(),
                "    pop     rax".to_string(),
                "    mov     [rbx], rax".to_string(),
                "    xor     rax, rax".to_string(),
            ]
        }
        Retrieve => {
            let name = expect_name(token);
            let location = symbol_location(&state.symbols, name)?;
            vec![
                "    mov     rcx, [symbols]".to_string(),
                format!("    sub     rcx, {location}"),
                "    mov     rcx, [rcx]".to_string(),
                "    mov     rax, [rcx]".to_string(),
                format!("    push    rax  ;; Push {name} onto the stack"),
            ]
        }
        Macro | MacroExpansion | Import | Define | WriteTo | Dereference | AutoIncrement | AutoDecrement => {
            return Err(CompileError::Structural {
                detail: format!("{:?} reached code generation", token.operator),
            });
        }
    };

    Ok(lines)
}

fn compare(set_true: &str) -> Vec<String> {
    vec![
        "    mov     rcx, FALSE".to_string(),
        "    mov     rdx, TRUE".to_string(),
        "    pop     rax".to_string(),
        "    pop     rbx".to_string(),
        "    cmp     rax, rbx".to_string(),
        format!("    {set_true}   rcx, rdx"),
        "    push    rcx".to_string(),
    ]
}

/// Order-sensitive comparisons (`<`, `>`, `<=`, `>=`) compare `rbx` against
/// `rax` rather than `rax` against `rbx`, since the right-hand operand was
/// pushed last and therefore popped first.
fn compare_swapped(set_true: &str) -> Vec<String> {
    vec![
        "    mov     rcx, FALSE".to_string(),
        "    mov     rdx, TRUE".to_string(),
        "    pop     rax".to_string(),
        "    pop     rbx".to_string(),
        "    cmp     rbx, rax".to_string(),
        format!("    {set_true}  rcx, rdx"),
        "    push    rcx".to_string(),
    ]
}

fn emit_syscall(n: u8) -> Vec<String> {
    const ARGS: [&str; 6] = ["rdi", "rsi", "rdx", "r10", "r8", "r9"];
    let mut inst = vec![String::new(), "    pop     rax".to_string()];
    for arg in ARGS.iter().take(n as usize) {
        inst.push(format!("    pop     {arg}"));
    }
    inst.push("    syscall".to_string());
    inst.push("    push    rax".to_string());
    inst
}

fn emit_end(token: &Token, program: &[Token], ctx: &Context, state: &mut EmitState) -> Result<Vec<String>, CompileError> {
    let start = token.start_token.expect("linker always sets start_token on end");
    let opener = &program[start];
    let label = token.label.as_deref().unwrap();

    match opener.operator {
        Operator::If | Operator::Else => Ok(vec![format!("{label}:")]),
        Operator::Do => {
            let do_start = opener.start_token.expect("do always has a start_token");
            if program[do_start].operator == Operator::While {
                let while_label = program[do_start].label.as_deref().unwrap();
                Ok(vec![format!("    jmp     {while_label}"), format!("{label}:")])
            } else {
                Ok(vec![format!("{label}:")])
            }
        }
        Operator::Where => {
            let names = expect_names(opener);
            let to_remove = names.len() * 8;
            let new_len = state.symbols.len() - names.len();
            state.symbols.truncate(new_len);
            Ok(vec![
                "    ;; Remove variables from the symbols table".to_string(),
                "    mov     rcx, [symbols]".to_string(),
                format!("    sub     rcx, {to_remove}"),
                "    mov     [symbols], rcx".to_string(),
            ])
        }
        Operator::Procedure => {
            let name = expect_name(opener);
            let (inputs, returns) = ctx
                .procedure_signatures
                .get(name)
                .cloned()
                .ok_or_else(|| CompileError::Structural { detail: format!("procedure {name} has no recorded signature") })?;
            let total_bound = returns.len() + 1 + inputs.len();
            let new_len = state.symbols.len() - total_bound;
            state.symbols.truncate(new_len);
            Ok(procedure::emit_exit(name, &inputs, &returns))
        }
        _ => Err(CompileError::Structural { detail: "could not process end token".to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::expander::expand_macros;
    use crate::linker::link;
    use crate::loader::load_macros;
    use crate::token::tokenize;
    use std::path::Path;

    fn generate_lines(src: &str) -> Vec<String> {
        let mut ctx = Context::new();
        let tokens = tokenize(src, Path::new("."), &mut ctx).unwrap();
        let loaded = load_macros(tokens, &mut ctx).unwrap();
        let expanded = expand_macros(loaded, &ctx).unwrap();
        let program = link(expanded, &mut ctx).unwrap();
        let mut state = EmitState::default();
        let mut lines = Vec::new();
        for (i, token) in program.iter().enumerate() {
            lines.extend(emit_token(token, i, &program, &ctx, &mut state).unwrap());
        }
        lines
    }

    #[test]
    fn add_pops_two_and_pushes_their_sum() {
        let lines = generate_lines("34 35 +");
        assert!(lines.contains(&"    add     rax, rbx".to_string()));
    }

    #[test]
    fn syscall_arity_selects_the_right_registers() {
        let lines = generate_lines("1 2 3 syscall2");
        assert!(lines.iter().any(|l| l.contains("pop     rdi")));
        assert!(lines.iter().any(|l| l.contains("pop     rsi")));
        assert!(!lines.iter().any(|l| l.contains("pop     rdx")));
    }

    #[test]
    fn string_literal_is_recorded_exactly_once_in_add_symbols() {
        let mut ctx = Context::new();
        let tokens = tokenize("\"hi\" \"hi\"", Path::new("."), &mut ctx).unwrap();
        let loaded = load_macros(tokens, &mut ctx).unwrap();
        let expanded = expand_macros(loaded, &ctx).unwrap();
        let program = link(expanded, &mut ctx).unwrap();
        let mut state = EmitState::default();
        for (i, token) in program.iter().enumerate() {
            emit_token(token, i, &program, &ctx, &mut state).unwrap();
        }
        assert_eq!(state.add_symbols.len(), 2);
    }
}
