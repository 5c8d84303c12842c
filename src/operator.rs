//! The `Operator` catalogue and the lexeme classifier.
//!
//! Matchers are tried in declaration order: exact keywords first, then
//! membership in the live procedures/macros tables, then the regular
//! expression catalogue. The first match wins.

use std::sync::LazyLock;

use regex::Regex;

use crate::context::Context;

/// Every lexical category a lexeme can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessOrEqualThan,
    GreaterOrEqualThan,
    And,
    Or,
    Not,
    Bool,
    Drop,
    Rot2,
    Drot2,
    Rot3,
    Dup,
    Dup2,
    Dup3,
    Load,
    Load1,
    Store,
    Store1,
    Memory,
    Peek,
    Hardpeek,
    Putchar,
    If,
    Elif,
    Else,
    End,
    While,
    Do,
    Where,
    Procedure,
    ProcedureCall,
    Import,
    Define,
    Macro,
    MacroExpansion,
    Syscall,
    PushUint,
    PushChar,
    PushString,
    Mutate,
    Retrieve,
    /// `!name:type[offset]`, desugared before it ever becomes a real token.
    WriteTo,
    /// `name:type[offset]`, desugared before it ever becomes a real token.
    Dereference,
    /// `name++`, desugared before it ever becomes a real token.
    AutoIncrement,
    /// `name--`, desugared before it ever becomes a real token.
    AutoDecrement,
}

static SYSCALL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^syscall([0-5])$").unwrap());
static WRITE_TO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^!([A-Za-z_][A-Za-z0-9_]*)(?::([A-Za-z0-9_]+))?\[([^\]]*)\]$").unwrap()
});
static DEREFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)(?::([A-Za-z0-9_]+))?\[([^\]]*)\]$").unwrap()
});
static MUTATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^!([A-Za-z_][A-Za-z0-9_]*)$").unwrap());
static AUTOINCREMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\+\+$").unwrap());
static AUTODECREMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)--$").unwrap());
static UINT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]+$").unwrap());
static CHAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^'(\\.|[^'\\])'$").unwrap());
static STRING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"^"(?:[^"\\]|\\.)*"$"#).unwrap());

/// Classify a lexeme against the ordered catalogue. `None` means the
/// lexeme is unrecognised and lexing should fail.
pub fn classify(lexeme: &str, ctx: &Context) -> Option<Operator> {
    let exact = match lexeme {
        "+" => Some(Operator::Add),
        "-" => Some(Operator::Sub),
        "*" => Some(Operator::Mul),
        "/" => Some(Operator::Div),
        "%" => Some(Operator::Mod),
        "=" => Some(Operator::Equal),
        "!=" => Some(Operator::NotEqual),
        "<" => Some(Operator::LessThan),
        ">" => Some(Operator::GreaterThan),
        "<=" => Some(Operator::LessOrEqualThan),
        ">=" => Some(Operator::GreaterOrEqualThan),
        "and" => Some(Operator::And),
        "or" => Some(Operator::Or),
        "not" => Some(Operator::Not),
        "bool" => Some(Operator::Bool),
        "drop" => Some(Operator::Drop),
        "rot2" | "swap" => Some(Operator::Rot2),
        "drot2" => Some(Operator::Drot2),
        "rot3" => Some(Operator::Rot3),
        "dup" => Some(Operator::Dup),
        "2dup" => Some(Operator::Dup2),
        "3dup" => Some(Operator::Dup3),
        "@" => Some(Operator::Load),
        "load" => Some(Operator::Load),
        "load1" => Some(Operator::Load1),
        "store" => Some(Operator::Store),
        "store1" => Some(Operator::Store1),
        "memory" => Some(Operator::Memory),
        "peek" => Some(Operator::Peek),
        "hardpeek" => Some(Operator::Hardpeek),
        "putchar" => Some(Operator::Putchar),
        "if" => Some(Operator::If),
        "elif" => Some(Operator::Elif),
        "else" => Some(Operator::Else),
        "end" => Some(Operator::End),
        "while" => Some(Operator::While),
        "do" => Some(Operator::Do),
        "where" => Some(Operator::Where),
        "procedure" => Some(Operator::Procedure),
        "import" => Some(Operator::Import),
        "define" => Some(Operator::Define),
        "macro" => Some(Operator::Macro),
        _ => None,
    };
    if let Some(op) = exact {
        return Some(op);
    }

    if ctx.procedures.contains(lexeme) {
        return Some(Operator::ProcedureCall);
    }
    if ctx.macros.contains_key(lexeme) {
        return Some(Operator::MacroExpansion);
    }

    if SYSCALL_RE.is_match(lexeme) {
        return Some(Operator::Syscall);
    }
    if WRITE_TO_RE.is_match(lexeme) {
        return Some(Operator::WriteTo);
    }
    if DEREFERENCE_RE.is_match(lexeme) {
        return Some(Operator::Dereference);
    }
    if MUTATE_RE.is_match(lexeme) {
        return Some(Operator::Mutate);
    }
    if AUTOINCREMENT_RE.is_match(lexeme) {
        return Some(Operator::AutoIncrement);
    }
    if AUTODECREMENT_RE.is_match(lexeme) {
        return Some(Operator::AutoDecrement);
    }
    if UINT_RE.is_match(lexeme) {
        return Some(Operator::PushUint);
    }
    if CHAR_RE.is_match(lexeme) {
        return Some(Operator::PushChar);
    }
    if STRING_RE.is_match(lexeme) {
        return Some(Operator::PushString);
    }

    // Catch-all: any other bare identifier is a local-variable retrieve.
    // Whether it is actually in scope is checked by the linker.
    Some(Operator::Retrieve)
}

pub fn write_to_captures(lexeme: &str) -> Option<(String, Option<String>, String)> {
    WRITE_TO_RE.captures(lexeme).map(|c| {
        (
            c[1].to_string(),
            c.get(2).map(|m| m.as_str().to_string()),
            c.get(3).map(|m| m.as_str().to_string()).unwrap_or_default(),
        )
    })
}

pub fn dereference_captures(lexeme: &str) -> Option<(String, Option<String>, String)> {
    DEREFERENCE_RE.captures(lexeme).map(|c| {
        (
            c[1].to_string(),
            c.get(2).map(|m| m.as_str().to_string()),
            c.get(3).map(|m| m.as_str().to_string()).unwrap_or_default(),
        )
    })
}

/// Byte width for a type annotation (`uint8`/`char`/`1` → 1, ... `uint64`/`8` → 8).
pub fn type_size(annotation: &str) -> Option<u64> {
    match annotation {
        "uint8" | "char" | "1" => Some(1),
        "uint16" | "2" => Some(2),
        "uint32" | "4" => Some(4),
        "uint64" | "8" => Some(8),
        _ => None,
    }
}

pub fn store_instruction(annotation: &str) -> &'static str {
    if type_size(annotation) == Some(1) { "store1" } else { "store" }
}

pub fn load_instruction(annotation: &str) -> &'static str {
    if type_size(annotation) == Some(1) { "load1" } else { "load" }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        Context::new()
    }

    #[test]
    fn classifies_exact_keywords() {
        assert_eq!(classify("if", &ctx()), Some(Operator::If));
        assert_eq!(classify("+", &ctx()), Some(Operator::Add));
        assert_eq!(classify("swap", &ctx()), Some(Operator::Rot2));
    }

    #[test]
    fn classifies_syscall_arity() {
        assert_eq!(classify("syscall3", &ctx()), Some(Operator::Syscall));
        assert_eq!(classify("syscall9", &ctx()), Some(Operator::Retrieve));
    }

    #[test]
    fn classifies_literals() {
        assert_eq!(classify("42", &ctx()), Some(Operator::PushUint));
        assert_eq!(classify("'a'", &ctx()), Some(Operator::PushChar));
        assert_eq!(classify("\"hi\"", &ctx()), Some(Operator::PushString));
    }

    #[test]
    fn classifies_sugar_forms_before_the_retrieve_catch_all() {
        assert_eq!(classify("x++", &ctx()), Some(Operator::AutoIncrement));
        assert_eq!(classify("x--", &ctx()), Some(Operator::AutoDecrement));
        assert_eq!(classify("!x", &ctx()), Some(Operator::Mutate));
        assert_eq!(classify("!x:uint64[3]", &ctx()), Some(Operator::WriteTo));
        assert_eq!(classify("x:uint64[3]", &ctx()), Some(Operator::Dereference));
    }

    #[test]
    fn membership_shadows_the_retrieve_catch_all() {
        let mut c = ctx();
        c.procedures.insert("add".to_string());
        assert_eq!(classify("add", &c), Some(Operator::ProcedureCall));
    }

    #[test]
    fn anything_else_is_a_retrieve() {
        assert_eq!(classify("counter", &ctx()), Some(Operator::Retrieve));
    }

    #[test]
    fn type_size_table_matches_the_documented_widths() {
        assert_eq!(type_size("char"), Some(1));
        assert_eq!(type_size("uint64"), Some(8));
        assert_eq!(type_size("uint128"), None);
        assert_eq!(store_instruction("char"), "store1");
        assert_eq!(load_instruction("uint64"), "load");
    }
}
