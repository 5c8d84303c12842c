//! Strip comments and split raw source text into lexemes.

use crate::error::CompileError;

/// A lexeme together with the source line it started on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexeme {
    pub text: String,
    pub line: usize,
}

/// Remove `#`-to-end-of-line comments, line by line.
pub fn remove_comments(stream: &str) -> String {
    stream
        .split('\n')
        .map(|line| line.split('#').next().unwrap_or(""))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split a stream of code into an ordered list of lexemes.
///
/// Quoted spans (`"..."`, `'...'`) and bracketed spans (`[...]`) are kept
/// intact rather than broken on whitespace; a bracketed span is appended to
/// whatever has already accumulated, so `addr:uint64[3]` stays one lexeme.
pub fn split_lexemes(stream: &str) -> Result<Vec<Lexeme>, CompileError> {
    // Force a trailing flush, same trick as the original splitter.
    let mut padded = stream.trim().to_string();
    padded.push(' ');

    let mut items = Vec::new();
    let mut acc = String::new();
    let mut acc_line = 1usize;
    let mut line = 1usize;

    let mut chars = padded.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' | '\'' => {
                if !acc.is_empty() {
                    return Err(CompileError::Lexical {
                        detail: format!(
                            "unexpected quote on line {line}; `{acc}` was not terminated by whitespace"
                        ),
                    });
                }
                acc_line = line;
                acc.push(c);
                loop {
                    match chars.next() {
                        Some(next) => {
                            if next == '\n' {
                                line += 1;
                            }
                            acc.push(next);
                            if next == c {
                                break;
                            }
                        }
                        None => {
                            return Err(CompileError::Lexical {
                                detail: format!("unterminated literal starting on line {acc_line}"),
                            });
                        }
                    }
                }
            }
            '[' => {
                if acc.is_empty() {
                    acc_line = line;
                }
                acc.push(c);
                loop {
                    match chars.next() {
                        Some(next) => {
                            if next == '\n' {
                                line += 1;
                            }
                            acc.push(next);
                            if next == ']' {
                                break;
                            }
                        }
                        None => {
                            return Err(CompileError::Lexical {
                                detail: format!("unterminated `[...]` starting on line {acc_line}"),
                            });
                        }
                    }
                }
            }
            c if c.is_whitespace() => {
                if c == '\n' {
                    line += 1;
                }
                if !acc.is_empty() {
                    items.push(Lexeme { text: std::mem::take(&mut acc), line: acc_line });
                }
            }
            c => {
                if acc.is_empty() {
                    acc_line = line;
                }
                acc.push(c);
            }
        }
    }

    Ok(items)
}
