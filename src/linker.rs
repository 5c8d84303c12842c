//! Block linker: pairs structured control-flow tokens into a graph and
//! assigns block labels.
//!
//! Cross-references are indices into the token arena (`TokenRef = usize`),
//! not owned pointers — the `do`↔`end`↔`while` cycle and the if/elif/else
//! chain are both naturally expressed as positions into the same `Vec`.

use crate::context::{self, Context};
use crate::error::CompileError;
use crate::operator::Operator;
use crate::token::{Token, TokenRef, TokenValue};

fn expect_name(token: &Token) -> &str {
    match &token.value {
        TokenValue::Name(n) => n,
        // the token factory only ever gives these operators a Name payload
        _ => unreachable!("non-Name payload on a token that requires one"),
    }
}

fn expect_names(token: &Token) -> &[String] {
    match &token.value {
        TokenValue::Names(n) => n,
        _ => unreachable!("non-Names payload on a `where` token"),
    }
}

/// Link a flat, macro-expanded token stream into its block graph.
pub fn link(mut program: Vec<Token>, ctx: &mut Context) -> Result<Vec<Token>, CompileError> {
    let mut stack: Vec<TokenRef> = Vec::new();
    let mut variables: Vec<String> = Vec::new();

    for i in 0..program.len() {
        let operator = program[i].operator;

        if operator == Operator::Retrieve {
            let name = expect_name(&program[i]).to_string();
            if !variables.contains(&name) {
                return Err(CompileError::UnknownReference { detail: format!("unexpected variable {name}") });
            }
        }
        if matches!(operator, Operator::Macro | Operator::MacroExpansion) {
            return Err(CompileError::Structural {
                detail: "macro token survived into linking".to_string(),
            });
        }

        match operator {
            Operator::Procedure => {
                let name = expect_name(&program[i]).to_string();
                program[i].label = Some(context::procedure_label(&name));
                let (inputs, returns) = ctx
                    .procedure_signatures
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| CompileError::Structural {
                        detail: format!("procedure {name} has no recorded signature"),
                    })?;
                variables.extend(inputs);
                variables.extend(returns);
                stack.push(i);
            }
            Operator::If => {
                stack.push(i);
            }
            Operator::While => {
                program[i].label = Some(ctx.next_label("while"));
                stack.push(i);
            }
            Operator::Elif => {
                program[i].label = Some(ctx.next_label("elif"));
                let start = pop_expecting(&mut stack, &program, &[Operator::Do], &program[i])?;
                program[i].start_token = Some(start);
                program[start].end_token = Some(i);
                stack.push(i);
            }
            Operator::Else => {
                program[i].label = Some(ctx.next_label("else"));
                let start = pop_expecting(&mut stack, &program, &[Operator::Do], &program[i])?;
                program[i].start_token = Some(start);
                program[start].end_token = Some(i);
                stack.push(i);
            }
            Operator::Do => {
                let start =
                    pop_expecting(&mut stack, &program, &[Operator::While, Operator::If, Operator::Elif], &program[i])?;
                program[start].end_token = Some(i);
                program[i].start_token = Some(start);
                stack.push(i);
            }
            Operator::Where => {
                let names = expect_names(&program[i]).to_vec();
                variables.extend(names);
                stack.push(i);
            }
            Operator::End => {
                program[i].label = Some(ctx.next_label("end"));
                let start = pop_expecting(
                    &mut stack,
                    &program,
                    &[Operator::Else, Operator::Do, Operator::Procedure, Operator::Where],
                    &program[i],
                )?;

                let is_if_chain_do = program[start].operator == Operator::Do
                    && matches!(
                        program[program[start].start_token.expect("do always has a start_token")].operator,
                        Operator::If | Operator::Elif
                    );
                let is_if_chain = is_if_chain_do || program[start].operator == Operator::Else;

                if program[start].operator == Operator::Where {
                    let count = expect_names(&program[start]).len();
                    variables.truncate(variables.len() - count);
                } else if program[start].operator == Operator::Procedure {
                    let name = expect_name(&program[start]).to_string();
                    let (inputs, returns) = ctx
                        .procedure_signatures
                        .get(&name)
                        .cloned()
                        .expect("procedure token always has a recorded signature");
                    variables.truncate(variables.len() - inputs.len() - returns.len());
                } else if is_if_chain {
                    let mut st = start;
                    loop {
                        let stop_here = program[st].operator == Operator::If;
                        if matches!(program[st].operator, Operator::Elif | Operator::Else) {
                            program[st].end_token = Some(i);
                        }
                        if stop_here {
                            break;
                        }
                        st = program[st].start_token.expect("if-chain links back to an If");
                    }
                }

                program[i].start_token = Some(start);
                program[start].end_token = Some(i);
            }
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(CompileError::Structural {
            detail: format!("{} block(s) never closed", stack.len()),
        });
    }

    Ok(program)
}

fn pop_expecting(
    stack: &mut Vec<TokenRef>,
    program: &[Token],
    allowed: &[Operator],
    closing: &Token,
) -> Result<TokenRef, CompileError> {
    let top = stack.pop().ok_or_else(|| CompileError::Structural {
        detail: format!("`{:?}` on line {} has no matching opener", closing.operator, closing.line),
    })?;
    if !allowed.contains(&program[top].operator) {
        return Err(CompileError::Structural {
            detail: format!(
                "`{:?}` on line {} cannot close a `{:?}` block",
                closing.operator, closing.line, program[top].operator
            ),
        });
    }
    Ok(top)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expander::expand_macros;
    use crate::loader::load_macros;
    use crate::token::tokenize;
    use std::path::Path;

    fn link_source(src: &str) -> Vec<Token> {
        let mut ctx = Context::new();
        let tokens = tokenize(src, Path::new("."), &mut ctx).unwrap();
        let loaded = load_macros(tokens, &mut ctx).unwrap();
        let expanded = expand_macros(loaded, &ctx).unwrap();
        link(expanded, &mut ctx).unwrap()
    }

    #[test]
    fn every_opener_gets_a_matching_end_token_and_vice_versa() {
        let program = link_source("procedure main in 1 if 1 do 2 else 3 end end");
        for (i, token) in program.iter().enumerate() {
            match token.operator {
                Operator::If | Operator::Do | Operator::Else | Operator::Procedure => {
                    assert!(token.end_token.is_some(), "token {i} ({:?}) missing end_token", token.operator);
                }
                Operator::End => {
                    assert!(token.start_token.is_some(), "end token {i} missing start_token");
                }
                _ => {}
            }
        }
    }

    #[test]
    fn if_else_chain_backpatches_every_arm_to_the_same_end_label() {
        let program = link_source("procedure main in 1 if 1 do 2 elif 0 do 3 else 4 end end");
        let end_idx = program.iter().position(|t| t.operator == Operator::End).unwrap();
        let arms: Vec<_> = program
            .iter()
            .filter(|t| matches!(t.operator, Operator::Elif | Operator::Else))
            .collect();
        assert_eq!(arms.len(), 2);
        for arm in arms {
            assert_eq!(arm.end_token, Some(end_idx));
        }
    }

    #[test]
    fn while_loop_jumps_back_to_its_own_label() {
        let program = link_source("procedure main in while 1 do 2 end end");
        let while_idx = program.iter().position(|t| t.operator == Operator::While).unwrap();
        let do_idx = program.iter().position(|t| t.operator == Operator::Do).unwrap();
        assert_eq!(program[do_idx].start_token, Some(while_idx));
        assert_eq!(program[while_idx].end_token, Some(do_idx));
    }

    #[test]
    fn where_bound_names_are_in_scope_for_retrieve() {
        // Must not error: `a` and `b` are bound by the enclosing `where`.
        link_source("procedure main in 1 2 where a b in a b + end end");
    }

    #[test]
    fn retrieve_outside_any_scope_is_an_unknown_reference() {
        let mut ctx = Context::new();
        let tokens = tokenize("procedure main in stray end", Path::new("."), &mut ctx).unwrap();
        let loaded = load_macros(tokens, &mut ctx).unwrap();
        let expanded = expand_macros(loaded, &ctx).unwrap();
        let err = link(expanded, &mut ctx).unwrap_err();
        assert!(matches!(err, CompileError::UnknownReference { .. }));
    }

    #[test]
    fn block_labels_share_one_monotonic_counter() {
        let program = link_source("procedure main in while 1 do end end");
        let while_label = program.iter().find(|t| t.operator == Operator::While).unwrap().label.clone().unwrap();
        let end_labels: Vec<_> = program.iter().filter(|t| t.operator == Operator::End).filter_map(|t| t.label.clone()).collect();
        // while<N> and the two end<M> labels must all come from the same
        // increasing sequence, not restart per keyword.
        let while_n: usize = while_label.trim_start_matches("while").parse().unwrap();
        for end_label in end_labels {
            let end_n: usize = end_label.trim_start_matches("end").parse().unwrap();
            assert!(end_n > while_n);
        }
    }
}
