// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Scanner/tokenizer for assembly source lines.
//!
//! Lines are tokenized independently; `;` starts a comment. Sign characters
//! are always emitted as separate tokens so that address expressions such as
//! `[bx+si-2]` arrive at the resolver with every term carrying an explicit
//! operator.

use crate::core::error::{AsmError, AsmErrorKind};
use crate::x86::registers::is_register;

/// Source location of a token: 1-based line and columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: u32,
    pub col_start: usize,
    pub col_end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Register,
    SizeKeyword,
    BranchKeyword,
    PrefixKeyword,
    Number,
    Str,
    Comma,
    Colon,
    OpenBracket,
    CloseBracket,
    Plus,
    Minus,
    Star,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw token text, lowercased for identifiers and keywords. For `Str`
    /// tokens this is the unquoted content.
    pub text: String,
    /// Numeric payload: the parsed value for `Number`, the byte size for
    /// `SizeKeyword`, the prefix byte for `PrefixKeyword`, zero otherwise.
    pub value: i64,
    pub span: Span,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, value: i64, span: Span) -> Self {
        Self {
            kind,
            text: text.into(),
            value,
            span,
        }
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c == b'.'
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

fn size_keyword(text: &str) -> Option<i64> {
    match text {
        "byte" => Some(1),
        "word" => Some(2),
        "dword" => Some(4),
        _ => None,
    }
}

fn branch_keyword(text: &str) -> bool {
    matches!(text, "short" | "near" | "far")
}

fn prefix_keyword(text: &str) -> Option<i64> {
    match text {
        "lock" => Some(0xF0),
        "repne" | "repnz" => Some(0xF2),
        "rep" | "repe" | "repz" => Some(0xF3),
        _ => None,
    }
}

/// Tokenize one source line. The returned tokens stop at the first comment.
pub fn tokenize_line(line: &str, line_num: u32) -> Result<Vec<Token>, AsmError> {
    Scanner::new(line, line_num).run()
}

struct Scanner<'a> {
    bytes: &'a [u8],
    cursor: usize,
    line_num: u32,
    tokens: Vec<Token>,
}

impl<'a> Scanner<'a> {
    fn new(line: &'a str, line_num: u32) -> Self {
        Self {
            bytes: line.as_bytes(),
            cursor: 0,
            line_num,
            tokens: Vec::new(),
        }
    }

    fn span(&self, start: usize) -> Span {
        Span {
            line: self.line_num,
            col_start: start + 1,
            col_end: self.cursor + 1,
        }
    }

    fn peek(&self) -> u8 {
        self.bytes.get(self.cursor).copied().unwrap_or(0)
    }

    fn run(mut self) -> Result<Vec<Token>, AsmError> {
        while self.cursor < self.bytes.len() {
            let c = self.peek();
            if c.is_ascii_whitespace() {
                self.cursor += 1;
                continue;
            }
            if c == b';' {
                break;
            }
            let start = self.cursor;
            match c {
                b',' => self.punct(TokenKind::Comma, ","),
                b':' => self.punct(TokenKind::Colon, ":"),
                b'[' => self.punct(TokenKind::OpenBracket, "["),
                b']' => self.punct(TokenKind::CloseBracket, "]"),
                b'+' => self.punct(TokenKind::Plus, "+"),
                b'-' => self.punct(TokenKind::Minus, "-"),
                b'*' => self.punct(TokenKind::Star, "*"),
                b'\'' | b'"' => self.scan_string(c)?,
                c if c.is_ascii_digit() => self.scan_number()?,
                c if is_ident_start(c) => self.scan_identifier(),
                _ => {
                    self.cursor += 1;
                    return Err(AsmError::with_span(
                        AsmErrorKind::Syntax,
                        format!("Unexpected character '{}'", c as char),
                        self.span(start),
                    ));
                }
            }
        }
        Ok(self.tokens)
    }

    fn punct(&mut self, kind: TokenKind, text: &str) {
        let start = self.cursor;
        self.cursor += 1;
        let span = self.span(start);
        self.tokens.push(Token::new(kind, text, 0, span));
    }

    fn scan_string(&mut self, quote: u8) -> Result<(), AsmError> {
        let start = self.cursor;
        self.cursor += 1;
        let content_start = self.cursor;
        while self.cursor < self.bytes.len() && self.peek() != quote {
            self.cursor += 1;
        }
        if self.cursor >= self.bytes.len() {
            return Err(AsmError::with_span(
                AsmErrorKind::Syntax,
                "Unterminated string literal",
                self.span(start),
            ));
        }
        let content =
            String::from_utf8_lossy(&self.bytes[content_start..self.cursor]).into_owned();
        self.cursor += 1;
        let span = self.span(start);
        self.tokens.push(Token::new(TokenKind::Str, content, 0, span));
        Ok(())
    }

    fn scan_number(&mut self) -> Result<(), AsmError> {
        let start = self.cursor;
        while self.cursor < self.bytes.len()
            && (self.peek().is_ascii_alphanumeric() || self.peek() == b'_')
        {
            self.cursor += 1;
        }
        let raw = std::str::from_utf8(&self.bytes[start..self.cursor])
            .unwrap_or("")
            .to_ascii_lowercase();
        let digits = raw.replace('_', "");
        let span = self.span(start);

        let parsed = if let Some(hex) = digits.strip_prefix("0x") {
            i64::from_str_radix(hex, 16)
        } else if let Some(bin) = digits.strip_prefix("0b") {
            i64::from_str_radix(bin, 2)
        } else if let Some(hex) = digits.strip_suffix('h') {
            i64::from_str_radix(hex, 16)
        } else {
            digits.parse::<i64>()
        };

        match parsed {
            Ok(value) => {
                self.tokens
                    .push(Token::new(TokenKind::Number, raw, value, span));
                Ok(())
            }
            Err(_) => Err(AsmError::with_span(
                AsmErrorKind::Syntax,
                format!("Invalid number literal '{raw}'"),
                span,
            )),
        }
    }

    fn scan_identifier(&mut self) {
        let start = self.cursor;
        self.cursor += 1;
        while self.cursor < self.bytes.len() && is_ident_continue(self.peek()) {
            self.cursor += 1;
        }
        let text = std::str::from_utf8(&self.bytes[start..self.cursor])
            .unwrap_or("")
            .to_ascii_lowercase();
        let span = self.span(start);

        let token = if is_register(&text) {
            Token::new(TokenKind::Register, text, 0, span)
        } else if let Some(size) = size_keyword(&text) {
            Token::new(TokenKind::SizeKeyword, text, size, span)
        } else if branch_keyword(&text) {
            Token::new(TokenKind::BranchKeyword, text, 0, span)
        } else if let Some(byte) = prefix_keyword(&text) {
            Token::new(TokenKind::PrefixKeyword, text, byte, span)
        } else {
            Token::new(TokenKind::Identifier, text, 0, span)
        };
        self.tokens.push(token);
    }
}
