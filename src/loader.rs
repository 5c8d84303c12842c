//! Import and macro loader: a single pass that checks block-opener/closer
//! balance and pulls `macro` bodies out of the main token stream into the
//! macro table.

use crate::context::Context;
use crate::error::CompileError;
use crate::operator::Operator;
use crate::token::Token;

/// Strip macro definitions out of `program`, filing their bodies in
/// `ctx.macros`, and check that every block opener has a legal closer.
pub fn load_macros(program: Vec<Token>, ctx: &mut Context) -> Result<Vec<Token>, CompileError> {
    let mut resulting = Vec::new();
    let mut stack: Vec<Operator> = Vec::new();

    let mut current_macro: Option<String> = None;

    for token in program {
        let mut in_macro_end = false;

        match token.operator {
            Operator::Procedure | Operator::If | Operator::While | Operator::Where => {
                stack.push(token.operator);
            }
            Operator::Else => {
                expect_top(&mut stack, &[Operator::If, Operator::Elif, Operator::Do], &token)?;
                stack.push(token.operator);
            }
            Operator::Elif => {
                expect_top(&mut stack, &[Operator::Do], &token)?;
                stack.push(token.operator);
            }
            Operator::Do => {
                expect_top(&mut stack, &[Operator::While, Operator::If, Operator::Elif], &token)?;
                stack.push(token.operator);
            }
            Operator::End => {
                let opener = expect_top(
                    &mut stack,
                    &[Operator::If, Operator::Elif, Operator::Else, Operator::Do, Operator::Procedure, Operator::Macro, Operator::Where],
                    &token,
                )?;
                if opener == Operator::Macro {
                    in_macro_end = true;
                }
            }
            Operator::Macro => {
                if current_macro.is_some() {
                    let name = match &token.value {
                        crate::token::TokenValue::Name(n) => n.clone(),
                        _ => String::new(),
                    };
                    return Err(CompileError::Structural {
                        detail: format!(
                            "cannot nest macro `{name}` inside `{}`",
                            current_macro.clone().unwrap_or_default()
                        ),
                    });
                }
                let name = match &token.value {
                    crate::token::TokenValue::Name(n) => n.clone(),
                    _ => String::new(),
                };
                current_macro = Some(name);
                stack.push(token.operator);
            }
            _ => {}
        }

        if current_macro.is_none() {
            resulting.push(token);
        } else if in_macro_end {
            current_macro = None;
        } else if token.operator != Operator::Macro {
            let name = current_macro.clone().expect("checked above");
            ctx.macros.entry(name).or_default().push(token);
        }
    }

    if !stack.is_empty() {
        return Err(CompileError::Structural {
            detail: format!("{} block(s) never closed", stack.len()),
        });
    }

    Ok(resulting)
}

fn expect_top(stack: &mut Vec<Operator>, allowed: &[Operator], token: &Token) -> Result<Operator, CompileError> {
    let top = stack.pop().ok_or_else(|| CompileError::Structural {
        detail: format!("`{:?}` on line {} has no matching opener", token.operator, token.line),
    })?;
    if !allowed.contains(&top) {
        return Err(CompileError::Structural {
            detail: format!(
                "`{:?}` on line {} cannot close a `{:?}` block",
                token.operator, token.line, top
            ),
        });
    }
    Ok(top)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::tokenize;
    use std::path::Path;

    fn load(src: &str) -> (Vec<Token>, Context) {
        let mut ctx = Context::new();
        let tokens = tokenize(src, Path::new("."), &mut ctx).unwrap();
        let loaded = load_macros(tokens, &mut ctx).unwrap();
        (loaded, ctx)
    }

    #[test]
    fn macro_body_is_removed_from_the_main_stream_and_filed_in_the_table() {
        let (program, ctx) = load("macro twice dup + end 3 twice");
        let ops: Vec<_> = program.iter().map(|t| t.operator).collect();
        assert_eq!(ops, vec![Operator::PushUint, Operator::MacroExpansion]);
        assert_eq!(ctx.macros["twice"].len(), 2);
    }

    #[test]
    fn mismatched_closer_is_a_structural_error() {
        let mut ctx = Context::new();
        let tokens = tokenize("if 1 do end end", Path::new("."), &mut ctx).unwrap();
        let err = load_macros(tokens, &mut ctx).unwrap_err();
        assert!(matches!(err, CompileError::Structural { .. }));
    }

    #[test]
    fn unclosed_block_is_a_structural_error() {
        let mut ctx = Context::new();
        let tokens = tokenize("if 1 do", Path::new("."), &mut ctx).unwrap();
        let err = load_macros(tokens, &mut ctx).unwrap_err();
        assert!(matches!(err, CompileError::Structural { .. }));
    }

    #[test]
    fn nested_macros_are_rejected() {
        let mut ctx = Context::new();
        let tokens = tokenize("macro a macro b end end", Path::new("."), &mut ctx).unwrap();
        let err = load_macros(tokens, &mut ctx).unwrap_err();
        assert!(matches!(err, CompileError::Structural { .. }));
    }
}
