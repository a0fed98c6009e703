//! Lexer tests: tokens, numerals, strings, comments, errors

use ay_lang::lexer::tokens::TokenType;
use ay_lang::lexer::Lexer;
use pretty_assertions::assert_eq;

fn lex(source: &str) -> Vec<(TokenType, String)> {
    let tokens = Lexer::new(source, "test.lua").tokenize().unwrap();
    tokens
        .into_iter()
        .filter(|t| !matches!(t.token_type, TokenType::Eof))
        .map(|t| (t.token_type, t.value))
        .collect()
}

fn lex_types(source: &str) -> Vec<TokenType> {
    lex(source).into_iter().map(|(tt, _)| tt).collect()
}

fn string_bytes(source: &str) -> Vec<u8> {
    let tokens = Lexer::new(source, "test.lua").tokenize().unwrap();
    assert_eq!(tokens[0].token_type, TokenType::StringLit);
    tokens[0].bytes.clone().unwrap()
}

fn lex_err(source: &str) -> String {
    Lexer::new(source, "test.lua").tokenize().unwrap_err().message
}

// ── Names and keywords ──────────────────────────────────────

#[test]
fn identifier() {
    assert_eq!(lex("hello_1"), vec![(TokenType::Identifier, "hello_1".into())]);
}

#[test]
fn all_reserved_words() {
    let words = "and break do else elseif end false for function goto if in \
                 local nil not or repeat return then true until while";
    let types = lex_types(words);
    assert_eq!(types.len(), 22);
    assert!(!types.contains(&TokenType::Identifier));
}

#[test]
fn keywords_are_case_sensitive() {
    assert_eq!(lex_types("End AND Nil"), vec![TokenType::Identifier; 3]);
}

// ── Numerals ────────────────────────────────────────────────

#[test]
fn decimal_numerals() {
    assert_eq!(
        lex("3 345 0xff 0xBEBADA"),
        vec![
            (TokenType::Integer, "3".into()),
            (TokenType::Integer, "345".into()),
            (TokenType::Integer, "0xff".into()),
            (TokenType::Integer, "0xBEBADA".into()),
        ]
    );
}

#[test]
fn float_numerals() {
    assert_eq!(
        lex_types("3.0 3.1416 314.16e-2 0.31416E1 34e1 .5 0x0.1E 0xA23p-4 0X1.921FB54442D18P+1"),
        vec![TokenType::Float; 9]
    );
}

#[test]
fn malformed_number() {
    assert!(lex_err("3x").starts_with("malformed number near '3x'"));
    assert!(lex_err("0x1g").starts_with("malformed number"));
}

// ── Strings ─────────────────────────────────────────────────

#[test]
fn short_string_escapes() {
    assert_eq!(
        string_bytes(r#""a\tb\n\\\"\'""#),
        b"a\tb\n\\\"'".to_vec()
    );
}

#[test]
fn numeric_escapes() {
    assert_eq!(string_bytes(r#""\65\066\x43\u{48}""#), b"ABCH".to_vec());
    assert_eq!(string_bytes(r#""\xff\0""#), vec![0xff, 0]);
    assert_eq!(string_bytes(r#""\u{7FF}""#), "\u{7ff}".as_bytes().to_vec());
}

#[test]
fn z_escape_skips_whitespace() {
    assert_eq!(string_bytes("\"a\\z   \n   b\""), b"ab".to_vec());
}

#[test]
fn escaped_newline() {
    assert_eq!(string_bytes("'a\\\nb'"), b"a\nb".to_vec());
}

#[test]
fn long_strings() {
    assert_eq!(string_bytes("[[\nfirst\nsecond]]"), b"first\nsecond".to_vec());
    assert_eq!(string_bytes("[==[a]]b]=]c]==]"), b"a]]b]=]c".to_vec());
    assert_eq!(string_bytes(r"[[no \n escapes]]"), br"no \n escapes".to_vec());
}

#[test]
fn string_errors() {
    assert_eq!(lex_err("\"abc"), "unfinished string");
    assert_eq!(lex_err("'abc\ndef'"), "unfinished string");
    assert_eq!(lex_err("[[abc"), "unfinished long string");
    assert!(lex_err(r#""\q""#).starts_with("invalid escape sequence"));
    assert_eq!(lex_err(r#""\300""#), "decimal escape too large");
}

// ── Operators and punctuation ───────────────────────────────

#[test]
fn operators() {
    assert_eq!(
        lex_types("+ - * / // % ^ # & ~ | << >> == ~= <= >= < > = ( ) { } [ ] :: ; : , . .. ..."),
        vec![
            TokenType::Plus,
            TokenType::Minus,
            TokenType::Star,
            TokenType::Slash,
            TokenType::DoubleSlash,
            TokenType::Percent,
            TokenType::Caret,
            TokenType::Hash,
            TokenType::Ampersand,
            TokenType::Tilde,
            TokenType::Pipe,
            TokenType::ShiftLeft,
            TokenType::ShiftRight,
            TokenType::Equals,
            TokenType::NotEquals,
            TokenType::LessEqual,
            TokenType::GreaterEqual,
            TokenType::LessThan,
            TokenType::GreaterThan,
            TokenType::Assign,
            TokenType::LParen,
            TokenType::RParen,
            TokenType::LBrace,
            TokenType::RBrace,
            TokenType::LBracket,
            TokenType::RBracket,
            TokenType::DoubleColon,
            TokenType::Semicolon,
            TokenType::Colon,
            TokenType::Comma,
            TokenType::Dot,
            TokenType::Concat,
            TokenType::Ellipsis,
        ]
    );
}

// ── Comments and positions ──────────────────────────────────

#[test]
fn comments_are_skipped() {
    let source = "a -- line comment\n--[[ block\ncomment ]] b --[==[ x ]==] c";
    assert_eq!(
        lex_types(source),
        vec![TokenType::Identifier, TokenType::Identifier, TokenType::Identifier]
    );
}

#[test]
fn shebang_line_is_skipped() {
    assert_eq!(lex_types("#!/usr/bin/env ay\nx"), vec![TokenType::Identifier]);
}

#[test]
fn token_positions() {
    let tokens = Lexer::new("local x\n  = 1", "pos.lua").tokenize().unwrap();
    assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
    assert_eq!((tokens[1].line, tokens[1].column), (1, 7));
    assert_eq!((tokens[2].line, tokens[2].column), (2, 3));
    assert_eq!(tokens.last().unwrap().token_type, TokenType::Eof);
}

#[test]
fn error_display_has_position() {
    let err = Lexer::new("x = $", "pos.lua").tokenize().unwrap_err();
    assert_eq!(err.to_string(), "pos.lua:1:5: unexpected symbol near '$'");
}
