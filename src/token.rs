//! The token factory: turns a cursor of lexemes into a flat token stream.
//!
//! `procedure`, `where`, `macro`, `import` and the sugar forms all need to
//! consume more lexemes than the one that triggered them. They pull those
//! extra lexemes from the *same* cursor that produced the triggering
//! lexeme, never a copy, so position in the surrounding stream is never
//! lost. Sugar (`import`, `define`, `++`/`--`, write-to, dereference) is
//! implemented by synthesising a fragment of source text and recursively
//! feeding it back through this same tokenizer.

use std::fs;
use std::iter::Peekable;
use std::path::{Path, PathBuf};
use std::vec::IntoIter;

use crate::context::Context;
use crate::error::CompileError;
use crate::operator::{self, Operator};
use crate::source::{self, Lexeme};

pub type TokenRef = usize;

/// Operator-specific payload. Kept as plain data — no bound emitter, no
/// reflection; code generation dispatches on `Operator` via an exhaustive
/// match instead.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    None,
    UInt(u64),
    Char(u8),
    /// A decoded string literal: the NASM `db`-ready comma-separated byte
    /// list (already quoted/escaped) and its total length including the
    /// trailing NUL.
    Bytes { data: String, length: usize },
    Name(String),
    Names(Vec<String>),
    Count(u8),
}

#[derive(Debug, Clone)]
pub struct Token {
    pub operator: Operator,
    pub value: TokenValue,
    pub line: usize,
    pub label: Option<String>,
    pub start_token: Option<TokenRef>,
    pub end_token: Option<TokenRef>,
}

impl Token {
    fn new(operator: Operator, value: TokenValue, line: usize) -> Self {
        Token { operator, value, line, label: None, start_token: None, end_token: None }
    }
}

struct Cursor {
    inner: Peekable<IntoIter<Lexeme>>,
}

impl Cursor {
    fn new(lexemes: Vec<Lexeme>) -> Self {
        Cursor { inner: lexemes.into_iter().peekable() }
    }

    fn next(&mut self) -> Option<Lexeme> {
        self.inner.next()
    }

    fn expect(&mut self, what: &str) -> Result<Lexeme, CompileError> {
        self.next().ok_or_else(|| CompileError::Lexical {
            detail: format!("expected {what} but reached end of input"),
        })
    }
}

/// Tokenize a whole program, folding in `import`s as they're encountered.
/// `base_dir` is where `import "name"` looks for `name.pyre`.
pub fn tokenize(source_text: &str, base_dir: &Path, ctx: &mut Context) -> Result<Vec<Token>, CompileError> {
    let cleaned = source::remove_comments(source_text);
    let lexemes = source::split_lexemes(&cleaned)?;
    let mut cursor = Cursor::new(lexemes);
    let mut tokens = Vec::new();

    while let Some(lexeme) = cursor.next() {
        tokenize_one(lexeme, &mut cursor, base_dir, ctx, &mut tokens)?;
    }

    Ok(tokens)
}

fn tokenize_fragment(fragment: &str, base_dir: &Path, ctx: &mut Context) -> Result<Vec<Token>, CompileError> {
    tokenize(fragment, base_dir, ctx)
}

fn strip_quotes(lexeme: &str) -> &str {
    &lexeme[1..lexeme.len() - 1]
}

fn tokenize_one(
    lexeme: Lexeme,
    cursor: &mut Cursor,
    base_dir: &Path,
    ctx: &mut Context,
    out: &mut Vec<Token>,
) -> Result<(), CompileError> {
    let Lexeme { text, line } = lexeme;
    let operator = operator::classify(&text, ctx).ok_or_else(|| CompileError::Lexical {
        detail: format!("unrecognised token `{text}` on line {line}"),
    })?;

    match operator {
        Operator::Import => {
            let filename_lexeme = cursor.expect("a quoted filename after `import`")?;
            if !(filename_lexeme.text.starts_with('"') && filename_lexeme.text.ends_with('"')) {
                return Err(CompileError::Lexical {
                    detail: format!("line {}: `import` expects a quoted filename", filename_lexeme.line),
                });
            }
            let name = strip_quotes(&filename_lexeme.text);
            let path = base_dir.join(format!("{name}.pyre"));
            let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
            if !ctx.imports.contains(&canonical) {
                let imported_text = fs::read_to_string(&path)
                    .map_err(|source| CompileError::Io { path: path.clone(), source })?;
                ctx.imports.insert(canonical);
                let import_dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| base_dir.to_path_buf());
                let imported_tokens = tokenize(&imported_text, &import_dir, ctx)?;
                out.extend(imported_tokens);
            }
        }
        Operator::Define => {
            let name = cursor.expect("a name after `define`")?.text;
            let value = cursor.expect("a value after `define <name>`")?.text;
            let fragment = format!("macro {name} {value} end");
            out.extend(tokenize_fragment(&fragment, base_dir, ctx)?);
        }
        Operator::AutoIncrement => {
            let name = text.trim_end_matches("++").to_string();
            let fragment = format!("{name} 1 + !{name}");
            out.extend(tokenize_fragment(&fragment, base_dir, ctx)?);
        }
        Operator::AutoDecrement => {
            let name = text.trim_end_matches("--").to_string();
            let fragment = format!("{name} 1 - !{name}");
            out.extend(tokenize_fragment(&fragment, base_dir, ctx)?);
        }
        Operator::WriteTo => {
            let (address, annotation, offset) = operator::write_to_captures(&text).ok_or_else(|| {
                CompileError::Lexical { detail: format!("line {line}: malformed write-to `{text}`") }
            })?;
            let annotation = annotation.unwrap_or_else(|| "1".to_string());
            let size = operator::type_size(&annotation)
                .ok_or_else(|| CompileError::Lexical { detail: format!("unknown type annotation `{annotation}`") })?;
            let offset: u64 = if offset.is_empty() { 0 } else {
                offset.parse().map_err(|_| CompileError::Lexical {
                    detail: format!("line {line}: non-numeric offset in `{text}`"),
                })?
            };
            let byte_offset = offset * size;
            let store = operator::store_instruction(&annotation);
            let fragment = format!("{address} {byte_offset} + {store}");
            out.extend(tokenize_fragment(&fragment, base_dir, ctx)?);
        }
        Operator::Dereference => {
            let (address, annotation, offset) = operator::dereference_captures(&text).ok_or_else(|| {
                CompileError::Lexical { detail: format!("line {line}: malformed dereference `{text}`") }
            })?;
            let annotation = annotation.unwrap_or_else(|| "1".to_string());
            let size = operator::type_size(&annotation)
                .ok_or_else(|| CompileError::Lexical { detail: format!("unknown type annotation `{annotation}`") })?;
            let offset: u64 = if offset.is_empty() { 0 } else {
                offset.parse().map_err(|_| CompileError::Lexical {
                    detail: format!("line {line}: non-numeric offset in `{text}`"),
                })?
            };
            let byte_offset = offset * size;
            let load = operator::load_instruction(&annotation);
            let fragment = format!("{address} {byte_offset} + {load}");
            out.extend(tokenize_fragment(&fragment, base_dir, ctx)?);
        }
        Operator::Macro => {
            let name = cursor.expect("a name after `macro`")?.text;
            ctx.macros.entry(name.clone()).or_default();
            out.push(Token::new(Operator::Macro, TokenValue::Name(name), line));
        }
        Operator::MacroExpansion => {
            out.push(Token::new(Operator::MacroExpansion, TokenValue::Name(text), line));
        }
        Operator::Procedure => {
            let name = cursor.expect("a name after `procedure`")?.text;
            if ctx.procedures.contains(&name) {
                return Err(CompileError::DuplicateDefinition { name });
            }
            ctx.procedures.insert(name.clone());

            let mut inputs = Vec::new();
            loop {
                let next = cursor.expect("`--` to close a procedure's parameter list")?;
                if next.text == "--" {
                    break;
                }
                inputs.push(next.text);
            }
            let mut returns = Vec::new();
            loop {
                let next = cursor.expect("`in` to close a procedure's return list")?;
                if next.text == "in" {
                    break;
                }
                returns.push(next.text);
            }
            ctx.procedure_signatures.insert(name.clone(), (inputs, returns));
            out.push(Token::new(Operator::Procedure, TokenValue::Name(name), line));
        }
        Operator::ProcedureCall => {
            out.push(Token::new(Operator::ProcedureCall, TokenValue::Name(text), line));
        }
        Operator::Where => {
            let mut variables = Vec::new();
            loop {
                let next = cursor.expect("`in` to close a `where` block's variable list")?;
                if next.text == "in" {
                    break;
                }
                variables.push(next.text);
            }
            out.push(Token::new(Operator::Where, TokenValue::Names(variables), line));
        }
        Operator::Syscall => {
            let n: u8 = text
                .trim_start_matches("syscall")
                .parse()
                .map_err(|_| CompileError::Lexical { detail: format!("malformed syscall arity `{text}`") })?;
            out.push(Token::new(Operator::Syscall, TokenValue::Count(n), line));
        }
        Operator::PushUint => {
            let value: u64 = text
                .parse()
                .map_err(|_| CompileError::Lexical { detail: format!("malformed integer literal `{text}`") })?;
            out.push(Token::new(Operator::PushUint, TokenValue::UInt(value), line));
        }
        Operator::PushChar => {
            let inner = strip_quotes(&text);
            let value = decode_char_literal(inner).ok_or_else(|| CompileError::Lexical {
                detail: format!("line {line}: malformed char literal `{text}`"),
            })?;
            out.push(Token::new(Operator::PushChar, TokenValue::Char(value), line));
        }
        Operator::PushString => {
            let inner = strip_quotes(&text);
            let (data, length) = string_to_db(inner);
            let label = ctx.next_string_literal_label();
            let mut token = Token::new(Operator::PushString, TokenValue::Bytes { data, length }, line);
            token.label = Some(label);
            out.push(token);
        }
        Operator::Mutate => {
            let name = text.trim_start_matches('!').to_string();
            out.push(Token::new(Operator::Mutate, TokenValue::Name(name), line));
        }
        Operator::Retrieve => {
            out.push(Token::new(Operator::Retrieve, TokenValue::Name(text), line));
        }
        other => {
            out.push(Token::new(other, TokenValue::None, line));
        }
    }

    Ok(())
}

/// Decode a single-character literal's contents (`a`, `\n`, `\t`) into its
/// ASCII code.
fn decode_char_literal(inner: &str) -> Option<u8> {
    match inner {
        r"\n" => Some(b'\n'),
        r"\t" => Some(b'\t'),
        r"\\" => Some(b'\\'),
        r"\'" => Some(b'\''),
        _ if inner.chars().count() == 1 => inner.bytes().next(),
        _ => None,
    }
}

/// Turn a string literal's contents into a NASM `db` byte list and the total
/// length including the trailing NUL, translating `\n`/`\t` escapes into
/// their own numeric entries the way the original data-segment encoder did.
fn string_to_db(contents: &str) -> (String, usize) {
    let mut pieces: Vec<String> = Vec::new();
    let mut literal = String::new();
    let mut length = 0usize;

    let mut chars = contents.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some('n') => {
                    chars.next();
                    if !literal.is_empty() {
                        length += literal.len();
                        pieces.push(format!("\"{literal}\""));
                        literal.clear();
                    }
                    pieces.push("10".to_string());
                    length += 1;
                    continue;
                }
                Some('t') => {
                    chars.next();
                    if !literal.is_empty() {
                        length += literal.len();
                        pieces.push(format!("\"{literal}\""));
                        literal.clear();
                    }
                    pieces.push("9".to_string());
                    length += 1;
                    continue;
                }
                _ => {}
            }
        }
        literal.push(c);
    }
    if !literal.is_empty() {
        length += literal.len();
        pieces.push(format!("\"{literal}\""));
    }
    pieces.push("0".to_string());
    length += 1;

    (pieces.join(","), length)
}

pub fn resolve_base_dir(source_path: &Path) -> PathBuf {
    source_path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(src: &str) -> (Vec<Token>, Context) {
        let mut ctx = Context::new();
        let tokens = tokenize(src, Path::new("."), &mut ctx).unwrap();
        (tokens, ctx)
    }

    #[test]
    fn tokenizes_arithmetic() {
        let (tokens, _) = tok("34 35 +");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].operator, Operator::PushUint);
        assert_eq!(tokens[0].value, TokenValue::UInt(34));
        assert_eq!(tokens[2].operator, Operator::Add);
    }

    #[test]
    fn procedure_header_consumes_its_own_parameter_list() {
        let (tokens, ctx) = tok("procedure add a b -- c in a b + !c in");
        assert_eq!(tokens[0].operator, Operator::Procedure);
        assert_eq!(tokens[0].value, TokenValue::Name("add".to_string()));
        let sig = ctx.procedure_signatures.get("add").unwrap();
        assert_eq!(sig.0, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(sig.1, vec!["c".to_string()]);
    }

    #[test]
    fn duplicate_procedure_is_an_error() {
        let mut ctx = Context::new();
        tokenize("procedure add a b -- c in end", Path::new("."), &mut ctx).unwrap();
        let err = tokenize("procedure add -- in end", Path::new("."), &mut ctx).unwrap_err();
        assert!(matches!(err, CompileError::DuplicateDefinition { .. }));
    }

    #[test]
    fn where_consumes_its_variable_list() {
        let (tokens, _) = tok("where a b in");
        assert_eq!(tokens[0].operator, Operator::Where);
        assert_eq!(tokens[0].value, TokenValue::Names(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn auto_increment_desugars_to_the_same_tokens_as_its_expansion() {
        let (sugared, _) = tok("x++");
        let (expanded, _) = tok("x 1 + !x");
        let sugared_ops: Vec<_> = sugared.iter().map(|t| t.operator).collect();
        let expanded_ops: Vec<_> = expanded.iter().map(|t| t.operator).collect();
        assert_eq!(sugared_ops, expanded_ops);
    }

    #[test]
    fn write_to_desugars_using_the_type_width() {
        let (sugared, _) = tok("!a:uint64[2]");
        let (expanded, _) = tok("a 16 + store");
        let sugared_ops: Vec<_> = sugared.iter().map(|t| t.operator).collect();
        let expanded_ops: Vec<_> = expanded.iter().map(|t| t.operator).collect();
        assert_eq!(sugared_ops, expanded_ops);
    }

    #[test]
    fn string_literal_gets_a_unique_label_and_nul_terminated_length() {
        let (tokens, _) = tok("\"hi\"");
        match &tokens[0].value {
            TokenValue::Bytes { data, length } => {
                assert_eq!(data, "\"hi\",0");
                assert_eq!(*length, 3);
            }
            other => panic!("expected Bytes, got {other:?}"),
        }
        assert_eq!(tokens[0].label.as_deref(), Some("string_literal0"));
    }

    #[test]
    fn string_literal_escapes_newline_as_its_own_decimal_entry() {
        let (data, length) = string_to_db("hi\\n");
        assert_eq!(data, "\"hi\",10,0");
        assert_eq!(length, 4);
    }

    #[test]
    fn macro_definition_registers_an_empty_body_up_front() {
        let mut ctx = Context::new();
        tokenize("macro inc 1 + end", Path::new("."), &mut ctx).unwrap();
        assert!(ctx.macros.contains_key("inc"));
    }

    #[test]
    fn retrieve_is_the_catch_all_for_unrecognised_identifiers() {
        let (tokens, _) = tok("counter");
        assert_eq!(tokens[0].operator, Operator::Retrieve);
    }
}
