// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Memory address resolver: `[ds:bx+si*1-0x20]` into an [`AddressDescriptor`].
//!
//! The scanner already delivers signs as separate tokens, so every term in
//! the bracket interior carries an explicit operator; the first term gets an
//! implicit `+`. The resolver folds terms left to right into segment
//! override, base register, scaled index, and displacement.

use crate::core::error::{AsmError, AsmErrorKind};
use crate::scanner::{Token, TokenKind};
use crate::x86::registers::{lookup_register, RegisterSchema};
use crate::x86::{signed_byte_size, unsigned_byte_size, SymbolResolver};

/// An index register with its scale factor (1, 2, 4, or 8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleIndex {
    pub reg: &'static RegisterSchema,
    pub scale: u8,
}

/// Decomposed memory address expression.
#[derive(Debug, Clone, Default)]
pub struct AddressDescriptor {
    pub sreg: Option<&'static RegisterSchema>,
    pub base: Option<&'static RegisterSchema>,
    pub index: Option<ScaleIndex>,
    pub disp: Option<i64>,
    /// Minimal unsigned byte size of the displacement.
    pub disp_byte_size: u8,
    /// Minimal signed byte size of the displacement; drives ModRM mode
    /// selection.
    pub signed_disp_size: u8,
    /// A displacement term references a symbol not yet placed; sizes are
    /// pessimistic and the instruction must be re-resolved next pass.
    pub unresolved: bool,
}

impl AddressDescriptor {
    pub fn is_displacement_only(&self) -> bool {
        self.base.is_none() && self.index.is_none() && self.disp.is_some()
    }

    /// Number of displacement bytes the ModRM encoding of this descriptor
    /// carries: 2 for the pure-displacement form, 0 when register terms
    /// cover the address, else the minimal signed size.
    pub fn modrm_disp_size(&self) -> u8 {
        if self.base.is_none() && self.index.is_none() {
            2
        } else if self.disp.is_none() {
            0
        } else {
            self.signed_disp_size.clamp(1, 2)
        }
    }
}

fn is_valid_scale(value: i64) -> bool {
    matches!(value, 1 | 2 | 4 | 8)
}

/// Parse the bracket-interior token run into an [`AddressDescriptor`].
pub fn resolve_address(
    tokens: &[Token],
    resolver: Option<SymbolResolver>,
) -> Result<AddressDescriptor, AsmError> {
    let mut desc = AddressDescriptor::default();
    let mut disp_acc: i64 = 0;
    let mut has_disp = false;
    let mut i = 0;

    if tokens.is_empty() {
        return Err(AsmError::new(
            AsmErrorKind::IncorrectExpression,
            "Empty address expression",
        ));
    }

    // sreg:... prefix
    if tokens.len() >= 2
        && tokens[0].kind == TokenKind::Register
        && tokens[1].kind == TokenKind::Colon
    {
        let reg = lookup_register(&tokens[0].text).expect("scanner classified register");
        if !reg.segment {
            return Err(AsmError::with_span(
                AsmErrorKind::IncorrectExpression,
                format!("'{}' is not a segment register", reg.mnemonic),
                tokens[0].span,
            ));
        }
        desc.sreg = Some(reg);
        i = 2;
    }

    while i < tokens.len() {
        let mut sign: i64 = 1;
        match tokens[i].kind {
            TokenKind::Plus => i += 1,
            TokenKind::Minus => {
                sign = -1;
                i += 1;
            }
            // first term after an optional sreg prefix carries an implicit +
            _ if i == 0 || (i == 2 && desc.sreg.is_some()) => {}
            _ => {
                return Err(AsmError::with_span(
                    AsmErrorKind::IncorrectExpression,
                    format!("Expected '+' or '-' before '{}'", tokens[i].text),
                    tokens[i].span,
                ));
            }
        }
        let Some(term) = tokens.get(i) else {
            return Err(AsmError::new(
                AsmErrorKind::IncorrectExpression,
                "Dangling operator in address expression",
            ));
        };

        let star_next = tokens.get(i + 1).map(|t| t.kind) == Some(TokenKind::Star);

        match term.kind {
            TokenKind::Register => {
                let reg = lookup_register(&term.text).expect("scanner classified register");
                if star_next {
                    let Some(scale_tok) = tokens.get(i + 2) else {
                        return Err(AsmError::with_span(
                            AsmErrorKind::IncorrectExpression,
                            "Missing scale factor after '*'",
                            term.span,
                        ));
                    };
                    set_scale(&mut desc, reg, scale_tok, sign)?;
                    i += 3;
                } else {
                    if sign < 0 {
                        return Err(AsmError::with_span(
                            AsmErrorKind::IncorrectExpression,
                            format!("Cannot subtract register '{}'", reg.mnemonic),
                            term.span,
                        ));
                    }
                    if desc.base.is_none() {
                        desc.base = Some(reg);
                    } else if desc.index.is_none() {
                        desc.index = Some(ScaleIndex { reg, scale: 1 });
                    } else {
                        return Err(AsmError::with_span(
                            AsmErrorKind::IncorrectExpression,
                            "Too many registers in address expression",
                            term.span,
                        ));
                    }
                    i += 1;
                }
            }
            TokenKind::Number => {
                if star_next {
                    let Some(reg_tok) = tokens.get(i + 2) else {
                        return Err(AsmError::with_span(
                            AsmErrorKind::IncorrectExpression,
                            "Missing register after '*'",
                            term.span,
                        ));
                    };
                    if reg_tok.kind != TokenKind::Register {
                        return Err(AsmError::with_span(
                            AsmErrorKind::IncorrectExpression,
                            "Scale factor must multiply a register",
                            reg_tok.span,
                        ));
                    }
                    let reg = lookup_register(&reg_tok.text).expect("scanner classified register");
                    set_scale(&mut desc, reg, term, sign)?;
                    i += 3;
                } else {
                    disp_acc += sign * term.value;
                    has_disp = true;
                    i += 1;
                }
            }
            TokenKind::Identifier => {
                match resolver.and_then(|r| r(&term.text)) {
                    Some(value) => disp_acc += sign * value,
                    None => desc.unresolved = true,
                }
                has_disp = true;
                i += 1;
            }
            _ => {
                return Err(AsmError::with_span(
                    AsmErrorKind::UnknownMemToken,
                    format!("Unexpected token '{}' in address expression", term.text),
                    term.span,
                ));
            }
        }
    }

    if desc.unresolved {
        // pessimistic sizing until the symbol is placed
        desc.disp = Some(disp_acc);
        desc.disp_byte_size = 2;
        desc.signed_disp_size = 2;
    } else if has_disp {
        desc.disp = Some(disp_acc);
        desc.disp_byte_size = unsigned_byte_size(disp_acc);
        desc.signed_disp_size = signed_byte_size(disp_acc);
    } else if desc.index.is_none() && desc.base.map(|r| r.mnemonic) == Some("bp") {
        // [bp] has no mod=00 row in the 16-bit addressing table; it encodes
        // as mod=01 with a zero displacement byte
        desc.disp = Some(0);
        desc.disp_byte_size = 1;
        desc.signed_disp_size = 1;
    }

    if desc.base.is_none() && desc.index.is_none() && desc.disp.is_none() {
        return Err(AsmError::new(
            AsmErrorKind::IncorrectExpression,
            "Address expression has no base, index, or displacement",
        ));
    }

    Ok(desc)
}

fn set_scale(
    desc: &mut AddressDescriptor,
    reg: &'static RegisterSchema,
    scale_tok: &Token,
    sign: i64,
) -> Result<(), AsmError> {
    if scale_tok.kind != TokenKind::Number {
        return Err(AsmError::with_span(
            AsmErrorKind::InvalidScale,
            format!("Scale factor must be a number, got '{}'", scale_tok.text),
            scale_tok.span,
        ));
    }
    if sign < 0 {
        return Err(AsmError::with_span(
            AsmErrorKind::IncorrectExpression,
            "Cannot subtract a scaled index",
            scale_tok.span,
        ));
    }
    if desc.index.is_some() {
        return Err(AsmError::with_span(
            AsmErrorKind::ScaleAlreadyDefined,
            "Scaled index is already defined",
            scale_tok.span,
        ));
    }
    if !is_valid_scale(scale_tok.value) {
        return Err(AsmError::with_span(
            AsmErrorKind::InvalidScale,
            format!("Invalid scale: {} (must be 1, 2, 4, or 8)", scale_tok.value),
            scale_tok.span,
        ));
    }
    desc.index = Some(ScaleIndex {
        reg,
        scale: scale_tok.value as u8,
    });
    Ok(())
}
