// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Operand classification: a flat token run into typed [`Operand`] values.
//!
//! Classification runs once per pass with the current symbol resolver, so a
//! label reference becomes a plain immediate as soon as the label is placed.
//! Until then it stays a symbolic [`Operand::Label`] and the instruction is
//! sized pessimistically.

use crate::core::error::{AsmError, AsmErrorKind};
use crate::scanner::{Span, Token, TokenKind};
use crate::x86::addressing::{resolve_address, AddressDescriptor};
use crate::x86::registers::{lookup_register, RegisterSchema};
use crate::x86::{signed_byte_size, unsigned_byte_size, SymbolResolver};

/// Branch-distance hint: `short`, `near`, or `far` before a branch target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchHint {
    Short,
    Near,
    Far,
}

impl BranchHint {
    fn from_keyword(text: &str) -> Option<Self> {
        match text {
            "short" => Some(Self::Short),
            "near" => Some(Self::Near),
            "far" => Some(Self::Far),
            _ => None,
        }
    }
}

/// A classified instruction operand.
#[derive(Debug, Clone)]
pub enum Operand {
    Register(&'static RegisterSchema, Span),
    Immediate {
        value: i64,
        byte_size: u8,
        explicit_size: bool,
        span: Span,
    },
    Memory {
        desc: AddressDescriptor,
        byte_size: u8,
        explicit_size: bool,
        span: Span,
    },
    SegmentedMemory {
        segment: u16,
        offset: u16,
        /// Either half references a symbol not yet placed.
        unresolved: bool,
        span: Span,
    },
    /// A symbol reference that could not be resolved yet; a provisional
    /// immediate/relative-address candidate. Never reaches the emitter on
    /// the final pass.
    Label { name: String, span: Span },
}

impl Operand {
    pub fn span(&self) -> Span {
        match self {
            Self::Register(_, span)
            | Self::Immediate { span, .. }
            | Self::Memory { span, .. }
            | Self::SegmentedMemory { span, .. }
            | Self::Label { span, .. } => *span,
        }
    }

    pub fn byte_size(&self) -> Option<u8> {
        match self {
            Self::Register(reg, _) => Some(reg.byte_size),
            Self::Immediate { byte_size, .. } | Self::Memory { byte_size, .. } => Some(*byte_size),
            Self::SegmentedMemory { .. } | Self::Label { .. } => None,
        }
    }

    /// Whether the operand's encoded value is fully known.
    pub fn is_resolved(&self) -> bool {
        match self {
            Self::Label { .. } => false,
            Self::Memory { desc, .. } => !desc.unresolved,
            Self::SegmentedMemory { unresolved, .. } => !unresolved,
            _ => true,
        }
    }
}

/// Natural byte size of an immediate: unsigned for non-negative values,
/// signed for negative ones.
fn immediate_byte_size(value: i64) -> u8 {
    if value >= 0 {
        unsigned_byte_size(value)
    } else {
        signed_byte_size(value)
    }
}

/// Pack a 1–2 character quoted literal into a little-endian number, the way
/// `mov ax, 'ab'` expects.
fn quote_to_number(text: &str, span: Span) -> Result<i64, AsmError> {
    let bytes = text.as_bytes();
    if bytes.is_empty() || bytes.len() > 2 {
        return Err(AsmError::with_span(
            AsmErrorKind::InvalidOperand,
            format!("Character literal must be 1-2 bytes, got {}", bytes.len()),
            span,
        ));
    }
    let mut value: i64 = 0;
    for (i, b) in bytes.iter().enumerate() {
        value |= i64::from(*b) << (8 * i);
    }
    Ok(value)
}

/// Classify a comma-separated operand token run.
///
/// Returns the effective branch hint (a `seg:off` target upgrades it to
/// `Far`) and the operand list. `default_mem_size` supplies the memory
/// operand size for branch instructions where no sibling can.
pub fn classify(
    tokens: &[Token],
    hint: Option<BranchHint>,
    default_mem_size: Option<u8>,
    resolver: Option<SymbolResolver>,
) -> Result<(Option<BranchHint>, Vec<Operand>), AsmError> {
    let mut effective_hint = hint;
    let mut operands = Vec::new();

    for group in tokens.split(|t| t.kind == TokenKind::Comma) {
        if group.is_empty() {
            if tokens.is_empty() {
                break;
            }
            return Err(AsmError::new(
                AsmErrorKind::InvalidOperand,
                "Empty operand between commas",
            ));
        }
        let operand = parse_operand(group, &mut effective_hint, resolver)?;
        operands.push(operand);
    }

    size_memory_operands(&mut operands, default_mem_size)?;
    reconcile_sizes(&mut operands)?;
    Ok((effective_hint, operands))
}

fn parse_operand(
    group: &[Token],
    hint: &mut Option<BranchHint>,
    resolver: Option<SymbolResolver>,
) -> Result<Operand, AsmError> {
    let mut rest = group;
    let mut size_override: Option<u8> = None;

    loop {
        match rest.first().map(|t| t.kind) {
            Some(TokenKind::BranchKeyword) => {
                *hint = BranchHint::from_keyword(&rest[0].text);
                rest = &rest[1..];
            }
            Some(TokenKind::SizeKeyword) => {
                size_override = Some(rest[0].value as u8);
                rest = &rest[1..];
            }
            _ => break,
        }
    }

    let Some(first) = rest.first() else {
        return Err(AsmError::new(
            AsmErrorKind::InvalidOperand,
            "Missing operand after size keyword",
        ));
    };
    let span = first.span;

    // seg:off far pointer
    if rest.len() >= 3
        && rest[1].kind == TokenKind::Colon
        && matches!(first.kind, TokenKind::Number | TokenKind::Identifier)
    {
        if hint.is_none() {
            *hint = Some(BranchHint::Far);
        }
        let (segment, seg_unresolved) = segmented_half(&rest[0], resolver)?;
        let (offset, off_unresolved) = segmented_half(&rest[2], resolver)?;
        if rest.len() > 3 {
            return Err(AsmError::with_span(
                AsmErrorKind::InvalidOperand,
                "Trailing tokens after segmented address",
                rest[3].span,
            ));
        }
        return Ok(Operand::SegmentedMemory {
            segment,
            offset,
            unresolved: seg_unresolved || off_unresolved,
            span,
        });
    }

    match first.kind {
        TokenKind::Register => {
            if rest.len() > 1 {
                return Err(AsmError::with_span(
                    AsmErrorKind::InvalidOperand,
                    "Trailing tokens after register operand",
                    rest[1].span,
                ));
            }
            let reg = lookup_register(&first.text).expect("scanner classified register");
            if let Some(size) = size_override {
                if size != reg.byte_size {
                    return Err(AsmError::with_span(
                        AsmErrorKind::OperandSizeMismatch,
                        format!("Size override conflicts with register '{}'", reg.mnemonic),
                        span,
                    ));
                }
            }
            Ok(Operand::Register(reg, span))
        }
        TokenKind::OpenBracket => {
            let close = rest
                .iter()
                .position(|t| t.kind == TokenKind::CloseBracket)
                .ok_or_else(|| {
                    AsmError::with_span(
                        AsmErrorKind::InvalidOperand,
                        "Unclosed '[' in memory operand",
                        span,
                    )
                })?;
            if close != rest.len() - 1 {
                return Err(AsmError::with_span(
                    AsmErrorKind::InvalidOperand,
                    "Trailing tokens after ']'",
                    rest[close + 1].span,
                ));
            }
            let desc = resolve_address(&rest[1..close], resolver).map_err(|e| e.or_span(span))?;
            Ok(Operand::Memory {
                desc,
                byte_size: size_override.unwrap_or(0),
                explicit_size: size_override.is_some(),
                span,
            })
        }
        TokenKind::Number | TokenKind::Minus | TokenKind::Str => {
            let (value, value_span) = match first.kind {
                TokenKind::Minus => {
                    let Some(num) = rest.get(1).filter(|t| t.kind == TokenKind::Number) else {
                        return Err(AsmError::with_span(
                            AsmErrorKind::InvalidOperand,
                            "Expected number after '-'",
                            span,
                        ));
                    };
                    if rest.len() > 2 {
                        return Err(AsmError::with_span(
                            AsmErrorKind::InvalidOperand,
                            "Trailing tokens after immediate",
                            rest[2].span,
                        ));
                    }
                    (-num.value, num.span)
                }
                TokenKind::Str => {
                    if rest.len() > 1 {
                        return Err(AsmError::with_span(
                            AsmErrorKind::InvalidOperand,
                            "Trailing tokens after immediate",
                            rest[1].span,
                        ));
                    }
                    (quote_to_number(&first.text, span)?, span)
                }
                _ => {
                    if rest.len() > 1 {
                        return Err(AsmError::with_span(
                            AsmErrorKind::InvalidOperand,
                            "Trailing tokens after immediate",
                            rest[1].span,
                        ));
                    }
                    (first.value, span)
                }
            };
            make_immediate(value, size_override, value_span)
        }
        TokenKind::Identifier => {
            if rest.len() > 1 {
                return Err(AsmError::with_span(
                    AsmErrorKind::InvalidOperand,
                    "Trailing tokens after symbol operand",
                    rest[1].span,
                ));
            }
            match resolver.and_then(|r| r(&first.text)) {
                Some(value) => make_immediate(value, size_override, span),
                None => Ok(Operand::Label {
                    name: first.text.clone(),
                    span,
                }),
            }
        }
        _ => Err(AsmError::with_span(
            AsmErrorKind::InvalidOperand,
            format!("Invalid operand '{}'", first.text),
            span,
        )),
    }
}

fn make_immediate(value: i64, size_override: Option<u8>, span: Span) -> Result<Operand, AsmError> {
    let natural = immediate_byte_size(value);
    if let Some(size) = size_override {
        if natural > size {
            return Err(AsmError::with_span(
                AsmErrorKind::OperandSizeMismatch,
                format!("Value {value} does not fit in {size} byte(s)"),
                span,
            ));
        }
    }
    Ok(Operand::Immediate {
        value,
        byte_size: size_override.unwrap_or(natural),
        explicit_size: size_override.is_some(),
        span,
    })
}

fn segmented_half(
    token: &Token,
    resolver: Option<SymbolResolver>,
) -> Result<(u16, bool), AsmError> {
    match token.kind {
        TokenKind::Number => to_u16(token.value, token.span).map(|v| (v, false)),
        TokenKind::Identifier => match resolver.and_then(|r| r(&token.text)) {
            Some(value) => to_u16(value, token.span).map(|v| (v, false)),
            None => Ok((0, true)),
        },
        _ => Err(AsmError::with_span(
            AsmErrorKind::InvalidOperand,
            format!("Invalid segmented address component '{}'", token.text),
            token.span,
        )),
    }
}

fn to_u16(value: i64, span: Span) -> Result<u16, AsmError> {
    u16::try_from(value).map_err(|_| {
        AsmError::with_span(
            AsmErrorKind::OperandSizeMismatch,
            format!("Value {value} does not fit in a 16-bit half"),
            span,
        )
    })
}

/// Fill in the byte size of unsized memory operands: explicit override wins,
/// then the branch default, then any register sibling.
fn size_memory_operands(
    operands: &mut [Operand],
    default_mem_size: Option<u8>,
) -> Result<(), AsmError> {
    let sibling_size = operands.iter().find_map(|op| match op {
        Operand::Register(reg, _) => Some(reg.byte_size),
        _ => None,
    });
    for op in operands.iter_mut() {
        if let Operand::Memory {
            byte_size,
            explicit_size,
            span,
            ..
        } = op
        {
            if *explicit_size {
                continue;
            }
            match default_mem_size.or(sibling_size) {
                Some(size) => *byte_size = size,
                None => {
                    return Err(AsmError::with_span(
                        AsmErrorKind::MissingSizeOverride,
                        "Memory operand size is unknown; add a byte/word override",
                        *span,
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Enforce the operand-size agreement rules between adjacent operands:
/// immediates without an explicit size widen up to their sibling, everything
/// else must agree exactly. Register-register pairs are exempt; the schema
/// matchers decide those (`in al, dx` is legal, `mov ax, bl` simply has no
/// encoding).
fn reconcile_sizes(operands: &mut [Operand]) -> Result<(), AsmError> {
    for i in 1..operands.len() {
        let (head, tail) = operands.split_at_mut(i);
        let prev = &mut head[i - 1];
        let cur = &mut tail[0];
        if matches!(prev, Operand::Register(..)) && matches!(cur, Operand::Register(..)) {
            continue;
        }
        let (Some(prev_size), Some(cur_size)) = (prev.byte_size(), cur.byte_size()) else {
            continue;
        };
        if prev_size == cur_size {
            continue;
        }
        if widen_immediate(cur, prev_size) || widen_immediate(prev, cur_size) {
            continue;
        }
        return Err(AsmError::with_span(
            AsmErrorKind::OperandSizeMismatch,
            format!("Operand sizes disagree ({prev_size} vs {cur_size} bytes)"),
            cur.span(),
        ));
    }
    Ok(())
}

fn widen_immediate(op: &mut Operand, target: u8) -> bool {
    if let Operand::Immediate {
        byte_size,
        explicit_size: false,
        ..
    } = op
    {
        if *byte_size < target {
            *byte_size = target;
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::tokenize_line;

    fn classify_str(text: &str) -> Result<(Option<BranchHint>, Vec<Operand>), AsmError> {
        let tokens = tokenize_line(text, 1).expect("tokenize");
        classify(&tokens, None, None, None)
    }

    #[test]
    fn register_and_immediate() {
        let (_, ops) = classify_str("al, 0x0").expect("classify");
        assert!(matches!(ops[0], Operand::Register(reg, _) if reg.mnemonic == "al"));
        assert!(matches!(
            ops[1],
            Operand::Immediate {
                value: 0,
                byte_size: 1,
                ..
            }
        ));
    }

    #[test]
    fn immediate_widens_to_register_size() {
        let (_, ops) = classify_str("ax, 2").expect("classify");
        assert!(matches!(ops[1], Operand::Immediate { byte_size: 2, .. }));
    }

    #[test]
    fn immediate_too_large_for_register() {
        let err = classify_str("al, 0x100").expect_err("should fail");
        assert_eq!(err.kind(), AsmErrorKind::OperandSizeMismatch);
    }

    #[test]
    fn memory_size_inferred_from_register_sibling() {
        let (_, ops) = classify_str("[bx+si], dx").expect("classify");
        assert!(matches!(
            ops[0],
            Operand::Memory {
                byte_size: 2,
                explicit_size: false,
                ..
            }
        ));
    }

    #[test]
    fn memory_without_size_is_rejected() {
        let err = classify_str("[bx], 5").expect_err("should fail");
        assert_eq!(err.kind(), AsmErrorKind::MissingSizeOverride);
    }

    #[test]
    fn explicit_size_keyword_sizes_memory_and_immediate() {
        let (_, ops) = classify_str("word [bx], 5").expect("classify");
        assert!(matches!(
            ops[0],
            Operand::Memory {
                byte_size: 2,
                explicit_size: true,
                ..
            }
        ));
        assert!(matches!(ops[1], Operand::Immediate { byte_size: 2, .. }));
    }

    #[test]
    fn explicit_sizes_that_disagree_are_rejected() {
        let err = classify_str("word [bx], al").expect_err("should fail");
        assert_eq!(err.kind(), AsmErrorKind::OperandSizeMismatch);
    }

    #[test]
    fn segmented_address_forces_far_hint() {
        let (hint, ops) = classify_str("0x7c00:0x123").expect("classify");
        assert_eq!(hint, Some(BranchHint::Far));
        assert!(matches!(
            ops[0],
            Operand::SegmentedMemory {
                segment: 0x7C00,
                offset: 0x123,
                unresolved: false,
                ..
            }
        ));
    }

    #[test]
    fn short_keyword_sets_hint() {
        let tokens = tokenize_line("short target", 1).expect("tokenize");
        let (hint, ops) = classify(&tokens, None, None, None).expect("classify");
        assert_eq!(hint, Some(BranchHint::Short));
        assert!(matches!(&ops[0], Operand::Label { name, .. } if name == "target"));
    }

    #[test]
    fn resolver_turns_labels_into_immediates() {
        let tokens = tokenize_line("ax, start", 1).expect("tokenize");
        let resolver = |name: &str| (name == "start").then_some(0x7C05_i64);
        let (_, ops) = classify(&tokens, None, None, Some(&resolver)).expect("classify");
        assert!(matches!(
            ops[1],
            Operand::Immediate {
                value: 0x7C05,
                byte_size: 2,
                ..
            }
        ));
    }

    #[test]
    fn negative_immediate() {
        let (_, ops) = classify_str("-2").expect("classify");
        assert!(matches!(
            ops[0],
            Operand::Immediate {
                value: -2,
                byte_size: 1,
                ..
            }
        ));
    }

    #[test]
    fn two_byte_quote_packs_little_endian() {
        let (_, ops) = classify_str("ax, 'ab'").expect("classify");
        assert!(matches!(
            ops[1],
            Operand::Immediate {
                value: 0x6261,
                ..
            }
        ));
    }

    #[test]
    fn branch_default_sizes_memory() {
        let tokens = tokenize_line("[bx]", 1).expect("tokenize");
        let (_, ops) = classify(&tokens, None, Some(2), None).expect("classify");
        assert!(matches!(ops[0], Operand::Memory { byte_size: 2, .. }));
    }
}
