// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Line parser: token streams into AST nodes.
//!
//! Grammar per line: an optional label definition, then an instruction
//! (prefixes, mnemonic, operand tokens), a data definition (`db`/`dw`/`dd`),
//! or a directive (`org`, `bits`, `name equ value`). Local label definitions
//! (`.loop`) are qualified against the nearest preceding parent label here;
//! references are qualified later by the pass driver, which knows the parent
//! in effect at each node.

use crate::core::error::{AsmError, AsmErrorKind};
use crate::core::symbols::{is_local_label, qualify_label};
use crate::scanner::{tokenize_line, Span, Token, TokenKind};

#[derive(Debug, Clone)]
pub enum DataValue {
    Number(i64),
    Bytes(Vec<u8>),
    Symbol(String),
}

#[derive(Debug, Clone)]
pub struct InstructionNode {
    pub mnemonic: String,
    /// Prefix bytes (`rep`, `lock`, ...) in source order.
    pub prefixes: Vec<u8>,
    pub operand_tokens: Vec<Token>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum AstNode {
    Instruction(InstructionNode),
    Label { name: String, span: Span },
    Data { element_size: u8, values: Vec<DataValue>, span: Span },
    Origin { address: u32, span: Span },
    Bits { bits: u32, span: Span },
    Equ { name: String, value: i64, span: Span },
}

impl AstNode {
    pub fn span(&self) -> Span {
        match self {
            Self::Instruction(node) => node.span,
            Self::Label { span, .. }
            | Self::Data { span, .. }
            | Self::Origin { span, .. }
            | Self::Bits { span, .. }
            | Self::Equ { span, .. } => *span,
        }
    }
}

fn data_element_size(text: &str) -> Option<u8> {
    match text {
        "db" => Some(1),
        "dw" => Some(2),
        "dd" => Some(4),
        _ => None,
    }
}

/// Parse a whole source text into AST nodes.
pub fn parse_source(source: &str) -> Result<Vec<AstNode>, AsmError> {
    let mut nodes = Vec::new();
    let mut parent_label: Option<String> = None;
    for (index, line) in source.lines().enumerate() {
        let line_num = index as u32 + 1;
        let tokens = tokenize_line(line, line_num)?;
        parse_line(&tokens, &mut nodes, &mut parent_label)?;
    }
    Ok(nodes)
}

fn parse_line(
    tokens: &[Token],
    nodes: &mut Vec<AstNode>,
    parent_label: &mut Option<String>,
) -> Result<(), AsmError> {
    let mut rest = tokens;

    // label definition: `name:` or `name db ...`
    if let Some(first) = rest.first() {
        if first.kind == TokenKind::Identifier {
            let second = rest.get(1);
            let is_colon = second.map(|t| t.kind) == Some(TokenKind::Colon);
            let is_data_label = second
                .map(|t| t.kind == TokenKind::Identifier && data_element_size(&t.text).is_some())
                .unwrap_or(false);
            let is_equ =
                second.map(|t| t.kind == TokenKind::Identifier && t.text == "equ").unwrap_or(false);

            if is_equ {
                return parse_equ(first, &rest[2..], nodes);
            }
            if is_colon || is_data_label {
                let name = qualify_label(parent_label.as_deref(), &first.text).ok_or_else(|| {
                    AsmError::with_span(
                        AsmErrorKind::MissingParentLabel,
                        format!("Local label '{}' has no preceding parent label", first.text),
                        first.span,
                    )
                })?;
                if !is_local_label(&first.text) {
                    *parent_label = Some(first.text.clone());
                }
                nodes.push(AstNode::Label {
                    name,
                    span: first.span,
                });
                rest = if is_colon { &rest[2..] } else { &rest[1..] };
            }
        }
    }

    let Some(first) = rest.first() else {
        return Ok(());
    };

    // directives and data definitions
    if first.kind == TokenKind::Identifier {
        match first.text.as_str() {
            "org" => return parse_org(first, &rest[1..], nodes),
            "bits" => return parse_bits(first, &rest[1..], nodes),
            _ => {}
        }
        if let Some(element_size) = data_element_size(&first.text) {
            return parse_data(first, element_size, &rest[1..], nodes);
        }
    }

    // instruction: prefixes, mnemonic, operand tokens
    let mut prefixes = Vec::new();
    let mut cursor = 0;
    while rest.get(cursor).map(|t| t.kind) == Some(TokenKind::PrefixKeyword) {
        prefixes.push(rest[cursor].value as u8);
        cursor += 1;
    }
    let Some(mnemonic_tok) = rest.get(cursor) else {
        return Err(AsmError::with_span(
            AsmErrorKind::Syntax,
            "Expected an instruction after prefix",
            first.span,
        ));
    };
    if mnemonic_tok.kind != TokenKind::Identifier {
        return Err(AsmError::with_span(
            AsmErrorKind::Syntax,
            format!("Expected a mnemonic, got '{}'", mnemonic_tok.text),
            mnemonic_tok.span,
        ));
    }
    nodes.push(AstNode::Instruction(InstructionNode {
        mnemonic: mnemonic_tok.text.clone(),
        prefixes,
        operand_tokens: rest[cursor + 1..].to_vec(),
        span: mnemonic_tok.span,
    }));
    Ok(())
}

fn expect_number(tokens: &[Token], what: &str, span: Span) -> Result<i64, AsmError> {
    match tokens {
        [tok] if tok.kind == TokenKind::Number => Ok(tok.value),
        [minus, tok] if minus.kind == TokenKind::Minus && tok.kind == TokenKind::Number => {
            Ok(-tok.value)
        }
        _ => Err(AsmError::with_span(
            AsmErrorKind::Directive,
            format!("{what} expects a single numeric argument"),
            span,
        )),
    }
}

fn parse_org(first: &Token, args: &[Token], nodes: &mut Vec<AstNode>) -> Result<(), AsmError> {
    let value = expect_number(args, "org", first.span)?;
    let address = u32::try_from(value).map_err(|_| {
        AsmError::with_span(
            AsmErrorKind::Directive,
            format!("org address {value} is out of range"),
            first.span,
        )
    })?;
    nodes.push(AstNode::Origin {
        address,
        span: first.span,
    });
    Ok(())
}

fn parse_bits(first: &Token, args: &[Token], nodes: &mut Vec<AstNode>) -> Result<(), AsmError> {
    let value = expect_number(args, "bits", first.span)?;
    nodes.push(AstNode::Bits {
        bits: value as u32,
        span: first.span,
    });
    Ok(())
}

fn parse_equ(name_tok: &Token, args: &[Token], nodes: &mut Vec<AstNode>) -> Result<(), AsmError> {
    if is_local_label(&name_tok.text) {
        return Err(AsmError::with_span(
            AsmErrorKind::Directive,
            "equ names cannot be local labels",
            name_tok.span,
        ));
    }
    let value = expect_number(args, "equ", name_tok.span)?;
    nodes.push(AstNode::Equ {
        name: name_tok.text.clone(),
        value,
        span: name_tok.span,
    });
    Ok(())
}

fn parse_data(
    first: &Token,
    element_size: u8,
    args: &[Token],
    nodes: &mut Vec<AstNode>,
) -> Result<(), AsmError> {
    if args.is_empty() {
        return Err(AsmError::with_span(
            AsmErrorKind::Directive,
            format!("{} expects at least one value", first.text),
            first.span,
        ));
    }
    let mut values = Vec::new();
    for group in args.split(|t| t.kind == TokenKind::Comma) {
        match group {
            [tok] if tok.kind == TokenKind::Number => values.push(DataValue::Number(tok.value)),
            [minus, tok] if minus.kind == TokenKind::Minus && tok.kind == TokenKind::Number => {
                values.push(DataValue::Number(-tok.value));
            }
            [tok] if tok.kind == TokenKind::Str => {
                if element_size == 1 {
                    values.push(DataValue::Bytes(tok.text.clone().into_bytes()));
                } else if tok.text.len() <= usize::from(element_size) {
                    let mut packed: i64 = 0;
                    for (i, b) in tok.text.bytes().enumerate() {
                        packed |= i64::from(b) << (8 * i);
                    }
                    values.push(DataValue::Number(packed));
                } else {
                    return Err(AsmError::with_span(
                        AsmErrorKind::Directive,
                        format!("String does not fit in a {element_size}-byte element"),
                        tok.span,
                    ));
                }
            }
            [tok] if tok.kind == TokenKind::Identifier => {
                values.push(DataValue::Symbol(tok.text.clone()));
            }
            [] => {
                return Err(AsmError::with_span(
                    AsmErrorKind::Directive,
                    "Empty value in data definition",
                    first.span,
                ));
            }
            other => {
                return Err(AsmError::with_span(
                    AsmErrorKind::Directive,
                    "Invalid value in data definition",
                    other[0].span,
                ));
            }
        }
    }
    nodes.push(AstNode::Data {
        element_size,
        values,
        span: first.span,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_and_instruction_share_a_line() {
        let nodes = parse_source("start: mov ax, 1").expect("parse");
        assert_eq!(nodes.len(), 2);
        assert!(matches!(&nodes[0], AstNode::Label { name, .. } if name == "start"));
        let AstNode::Instruction(instr) = &nodes[1] else {
            panic!("expected instruction");
        };
        assert_eq!(instr.mnemonic, "mov");
        assert_eq!(instr.operand_tokens.len(), 3);
    }

    #[test]
    fn local_labels_qualify_against_parent() {
        let nodes = parse_source("start:\n.loop:\nother:\n.loop:").expect("parse");
        let names: Vec<&str> = nodes
            .iter()
            .filter_map(|n| match n {
                AstNode::Label { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["start", "start.loop", "other", "other.loop"]);
    }

    #[test]
    fn local_label_without_parent_fails() {
        let err = parse_source(".loop:").expect_err("should fail");
        assert_eq!(err.kind(), AsmErrorKind::MissingParentLabel);
    }

    #[test]
    fn prefixes_are_collected() {
        let nodes = parse_source("rep movsb").expect("parse");
        let AstNode::Instruction(instr) = &nodes[0] else {
            panic!("expected instruction");
        };
        assert_eq!(instr.prefixes, vec![0xF3]);
        assert_eq!(instr.mnemonic, "movsb");
    }

    #[test]
    fn data_label_without_colon() {
        let nodes = parse_source("msg db 'hi', 0").expect("parse");
        assert!(matches!(&nodes[0], AstNode::Label { name, .. } if name == "msg"));
        let AstNode::Data {
            element_size,
            values,
            ..
        } = &nodes[1]
        else {
            panic!("expected data");
        };
        assert_eq!(*element_size, 1);
        assert_eq!(values.len(), 2);
        assert!(matches!(&values[0], DataValue::Bytes(b) if b == b"hi"));
        assert!(matches!(values[1], DataValue::Number(0)));
    }

    #[test]
    fn equ_defines_a_constant() {
        let nodes = parse_source("width equ 320").expect("parse");
        assert!(matches!(
            &nodes[0],
            AstNode::Equ { name, value: 320, .. } if name == "width"
        ));
    }

    #[test]
    fn org_and_bits_directives() {
        let nodes = parse_source("org 0x7c00\nbits 16").expect("parse");
        assert!(matches!(nodes[0], AstNode::Origin { address: 0x7C00, .. }));
        assert!(matches!(nodes[1], AstNode::Bits { bits: 16, .. }));
    }

    #[test]
    fn dw_label_reference() {
        let nodes = parse_source("dw start").expect("parse");
        let AstNode::Data { values, .. } = &nodes[0] else {
            panic!("expected data");
        };
        assert!(matches!(&values[0], DataValue::Symbol(s) if s == "start"));
    }

    #[test]
    fn comment_only_lines_produce_nothing() {
        let nodes = parse_source("; boot sector\n\n   ; padding").expect("parse");
        assert!(nodes.is_empty());
    }
}
