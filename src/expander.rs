//! Macro expander: replaces `MacroExpansion` tokens with clones of their
//! macro's body, recursively.
//!
//! Cloning never aliases block-graph state across expansions: at this point
//! tokens from the loader carry no `start_token`/`end_token` yet (those are
//! filled in by the linker, which runs after expansion), so a cloned body
//! has nothing live to alias in the first place. What the clone must still
//! get right is re-running expansion on its own contents, so a macro that
//! expands another macro nests correctly at every call site.

use crate::context::Context;
use crate::error::CompileError;
use crate::operator::Operator;
use crate::token::{Token, TokenValue};

pub fn expand_macros(program: Vec<Token>, ctx: &Context) -> Result<Vec<Token>, CompileError> {
    let mut expanded = Vec::new();
    for token in program {
        match token.operator {
            Operator::MacroExpansion => {
                let name = match &token.value {
                    TokenValue::Name(n) => n,
                    _ => unreachable!("MacroExpansion always carries a Name"),
                };
                let body = ctx.macros.get(name).ok_or_else(|| CompileError::UnknownReference {
                    detail: format!("unrecognized macro {name}"),
                })?;
                let cloned: Vec<Token> = body.clone();
                expanded.extend(expand_macros(cloned, ctx)?);
            }
            Operator::Macro => {
                return Err(CompileError::Structural {
                    detail: "macro definition survived into expansion".to_string(),
                });
            }
            _ => expanded.push(token),
        }
    }
    Ok(expanded)
}
