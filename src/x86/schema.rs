// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Instruction schemas: operand matchers, binary templates, and the schema
//! resolver.
//!
//! A catalog [`Schema`] pairs an operand-matcher list with a compact binary
//! template. Matching a schema against classified operands produces a
//! [`ResolvedSchema`] whose template is concrete: displacement slots are
//! materialized from the matched address descriptor, so the template length
//! always equals the emitted byte count.

use crate::core::error::{AsmError, AsmErrorKind};
use crate::x86::operand::{BranchHint, Operand};
use crate::x86::signed_byte_size;
use crate::x86::table::opcode_schemas;

/// One token of a binary template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateTok {
    /// Literal opcode byte.
    Lit(u8),
    /// ModRM byte; `reg_override` pins the reg field (`/0`..`/7`).
    ModRm { reg_override: Option<u8> },
    /// Little-endian displacement byte `i`.
    Disp(u8),
    /// Little-endian immediate byte `i`.
    Imm(u8),
    /// Little-endian relative-displacement byte `i`.
    Rel(u8),
    /// Little-endian segment half byte `i` of a far pointer.
    Seg(u8),
    /// Little-endian offset half byte `i` of a far pointer.
    Off(u8),
}

/// Operand-matching predicate, one per schema operand position.
///
/// The set is closed; composition happens inside [`Self::matches`] (for
/// example `RegMem` delegates to the register and memory arms).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandMatcher {
    /// Exactly this register (`al`, `ax`, `dx`, ...).
    FixedReg(&'static str),
    /// The immediate constant 1 (shift/rotate short forms).
    One,
    /// General register of the given byte size.
    Reg(u8),
    /// Segment register.
    SReg,
    /// Memory operand; `Some(n)` bounds the operand's data size.
    Mem(Option<u8>),
    /// Register or memory of the given byte size.
    RegMem(u8),
    /// Immediate fitting in `n` bytes.
    Imm(u8),
    /// I/O port number: an immediate whose value fits in an unsigned byte,
    /// whatever size the sibling operand made it.
    PortImm,
    /// Word-sized context, immediate representable as a sign-extended byte.
    SignExtImm8,
    /// Relative branch target reachable with a signed `n`-byte displacement.
    RelLabel(u8),
    /// `seg:off` far pointer.
    FarPointer,
    /// Memory operand holding a far pointer (`jmp far [bx]`).
    IndirectFarPointer,
    /// Displacement-only memory operand (moffs accumulator forms).
    MemOffset,
}

/// Context a matcher may consult: branch hints and the instruction's own
/// address for relative-branch feasibility.
#[derive(Debug, Clone, Copy)]
pub struct MatchCtx {
    pub hint: Option<BranchHint>,
    pub address: u32,
    /// Prefix bytes emitted before the template (instruction prefixes and
    /// any segment-override prefix).
    pub prefix_len: u8,
}

impl OperandMatcher {
    /// Parse the catalog shorthand (`rb`, `rmw`, `ib`, `sl`, ...).
    /// Unknown shorthands are a catalog bug.
    pub fn parse(shorthand: &str) -> Option<Self> {
        Some(match shorthand {
            "1" => Self::One,
            "rb" => Self::Reg(1),
            "rw" => Self::Reg(2),
            "sr" => Self::SReg,
            "m" => Self::Mem(None),
            "mb" => Self::Mem(Some(1)),
            "mw" => Self::Mem(Some(2)),
            "md" => Self::Mem(Some(4)),
            "rmb" => Self::RegMem(1),
            "rmw" => Self::RegMem(2),
            "ib" => Self::Imm(1),
            "iw" => Self::Imm(2),
            "pb" => Self::PortImm,
            "ib_se" => Self::SignExtImm8,
            "sl" => Self::RelLabel(1),
            "ll" | "np" => Self::RelLabel(2),
            "fptr" => Self::FarPointer,
            "ifptr" => Self::IndirectFarPointer,
            "moffs" => Self::MemOffset,
            name => {
                let schema = crate::x86::registers::lookup_register(name)?;
                Self::FixedReg(schema.mnemonic)
            }
        })
    }

    /// Whether an operand in this position supplies the ModRM mod/rm fields.
    pub fn is_rm(&self) -> bool {
        matches!(
            self,
            Self::Mem(_) | Self::RegMem(_) | Self::IndirectFarPointer
        )
    }

    /// Whether an operand in this position supplies the ModRM reg field.
    pub fn is_reg_field(&self) -> bool {
        matches!(self, Self::Reg(_) | Self::SReg)
    }

    pub fn matches(&self, op: &Operand, ctx: &MatchCtx, schema_len: u8) -> bool {
        match self {
            Self::FixedReg(name) => {
                matches!(op, Operand::Register(reg, _) if reg.mnemonic == *name)
            }
            Self::One => matches!(op, Operand::Immediate { value: 1, .. }),
            Self::Reg(size) => {
                matches!(op, Operand::Register(reg, _) if !reg.segment && reg.byte_size == *size)
            }
            Self::SReg => matches!(op, Operand::Register(reg, _) if reg.segment),
            Self::Mem(max) => {
                if ctx.hint == Some(BranchHint::Far) {
                    return false;
                }
                match (op, max) {
                    (Operand::Memory { .. }, None) => true,
                    (
                        Operand::Memory {
                            byte_size,
                            explicit_size,
                            ..
                        },
                        Some(max),
                    ) => {
                        if *explicit_size {
                            byte_size == max
                        } else {
                            byte_size <= max
                        }
                    }
                    _ => false,
                }
            }
            Self::RegMem(size) => {
                Self::Reg(*size).matches(op, ctx, schema_len)
                    || Self::Mem(Some(*size)).matches(op, ctx, schema_len)
            }
            Self::Imm(max) => match op {
                Operand::Label { .. } => true,
                Operand::Immediate {
                    byte_size,
                    explicit_size,
                    ..
                } => {
                    if *explicit_size {
                        byte_size == max
                    } else {
                        byte_size <= max
                    }
                }
                _ => false,
            },
            Self::PortImm => {
                matches!(op, Operand::Immediate { value, .. } if (0..=0xFF).contains(value))
            }
            Self::SignExtImm8 => match op {
                Operand::Immediate {
                    value, byte_size, ..
                } => *byte_size <= 2 && signed_byte_size(*value) == 1,
                _ => false,
            },
            Self::RelLabel(size) => {
                let hint_ok = match ctx.hint {
                    None => true,
                    Some(BranchHint::Short) => *size == 1,
                    Some(BranchHint::Near) => *size == 2,
                    Some(BranchHint::Far) => false,
                };
                if !hint_ok {
                    return false;
                }
                match op {
                    Operand::Label { .. } => true,
                    Operand::Immediate { value, .. } => {
                        let end = i64::from(ctx.address)
                            + i64::from(ctx.prefix_len)
                            + i64::from(schema_len);
                        signed_byte_size(*value - end) <= *size
                    }
                    _ => false,
                }
            }
            Self::FarPointer => matches!(op, Operand::SegmentedMemory { .. }),
            Self::IndirectFarPointer => {
                ctx.hint == Some(BranchHint::Far) && matches!(op, Operand::Memory { .. })
            }
            Self::MemOffset => match op {
                Operand::Memory { desc, .. } => {
                    desc.is_displacement_only() && desc.disp_byte_size <= 2
                }
                _ => false,
            },
        }
    }
}

/// One candidate binary encoding from the catalog.
#[derive(Debug, Clone)]
pub struct Schema {
    pub mnemonic: &'static str,
    pub matchers: Vec<OperandMatcher>,
    pub template: Vec<TemplateTok>,
}

impl Schema {
    /// Parse a compact template string (`"b0 i0"`, `"88 mr"`, `"c7 /0 i0 i1"`).
    /// Invalid tokens are a catalog bug and abort at table construction.
    pub fn parse_template(template: &str) -> Vec<TemplateTok> {
        template
            .split_whitespace()
            .map(|tok| match tok {
                "mr" => TemplateTok::ModRm { reg_override: None },
                "d0" | "d1" | "d2" | "d3" => TemplateTok::Disp(tok[1..].parse().unwrap()),
                "i0" | "i1" | "i2" | "i3" => TemplateTok::Imm(tok[1..].parse().unwrap()),
                "r0" | "r1" => TemplateTok::Rel(tok[1..].parse().unwrap()),
                "s0" | "s1" => TemplateTok::Seg(tok[1..].parse().unwrap()),
                "o0" | "o1" => TemplateTok::Off(tok[1..].parse().unwrap()),
                _ => {
                    if let Some(field) = tok.strip_prefix('/') {
                        let reg: u8 = field
                            .parse()
                            .unwrap_or_else(|_| panic!("bad reg override '{tok}'"));
                        assert!(reg < 8, "reg override out of range: {tok}");
                        TemplateTok::ModRm {
                            reg_override: Some(reg),
                        }
                    } else {
                        let byte = u8::from_str_radix(tok, 16)
                            .unwrap_or_else(|_| panic!("bad template byte '{tok}'"));
                        TemplateTok::Lit(byte)
                    }
                }
            })
            .collect()
    }

    pub fn byte_size(&self) -> u8 {
        self.template.len() as u8
    }

    pub fn modrm_position(&self) -> Option<usize> {
        self.template
            .iter()
            .position(|t| matches!(t, TemplateTok::ModRm { .. }))
    }

    /// Positional acceptance: operand `i` must satisfy matcher `i`.
    pub fn accepts(&self, operands: &[Operand], ctx: &MatchCtx) -> bool {
        if self.matchers.len() != operands.len() {
            return false;
        }
        let len = self.byte_size();
        self.matchers
            .iter()
            .zip(operands)
            .all(|(matcher, op)| matcher.matches(op, ctx, len))
    }
}

/// A schema matched against concrete operands: displacement slots are
/// materialized, and the ModRM-feeding operand positions are recorded.
#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    pub mnemonic: &'static str,
    pub template: Vec<TemplateTok>,
    /// Operand position supplying the ModRM mod/rm fields.
    pub rm_operand: Option<usize>,
    /// Operand position supplying the ModRM reg field.
    pub reg_operand: Option<usize>,
}

impl ResolvedSchema {
    pub fn byte_size(&self) -> u8 {
        self.template.len() as u8
    }

    /// Declared relative-displacement size (number of `Rel` slots).
    pub fn rel_size(&self) -> u8 {
        self.template
            .iter()
            .filter(|t| matches!(t, TemplateTok::Rel(_)))
            .count() as u8
    }

    pub(crate) fn from_schema(schema: &Schema, operands: &[Operand]) -> Self {
        let rm_operand = schema.matchers.iter().position(|m| m.is_rm());
        let reg_operand = schema
            .matchers
            .iter()
            .enumerate()
            .position(|(i, m)| Some(i) != rm_operand && m.is_reg_field());

        let mut template = schema.template.clone();
        if let Some(modrm_at) = schema.modrm_position() {
            let disp_size = rm_operand
                .and_then(|i| operands.get(i))
                .and_then(|op| match op {
                    Operand::Memory { desc, .. } => Some(desc.modrm_disp_size()),
                    _ => None,
                })
                .unwrap_or(0);
            for i in 0..disp_size {
                template.insert(modrm_at + 1 + usize::from(i), TemplateTok::Disp(i));
            }
        }

        Self {
            mnemonic: schema.mnemonic,
            template,
            rm_operand,
            reg_operand,
        }
    }
}

/// Return every schema accepting the operand list, sorted ascending by
/// concrete byte size. Pure: operands are never mutated, so the resolver is
/// safe to invoke speculatively across passes.
pub fn find_matching_schemas(
    mnemonic: &str,
    operands: &[Operand],
    ctx: &MatchCtx,
) -> Result<Vec<ResolvedSchema>, AsmError> {
    let Some(schemas) = opcode_schemas(mnemonic) else {
        return Err(AsmError::new(
            AsmErrorKind::UnknownOperation,
            format!("Unknown operation '{mnemonic}'"),
        ));
    };

    let mut matched: Vec<ResolvedSchema> = schemas
        .iter()
        .filter(|schema| schema.accepts(operands, ctx))
        .map(|schema| ResolvedSchema::from_schema(schema, operands))
        .collect();
    matched.sort_by_key(ResolvedSchema::byte_size);
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::tokenize_line;
    use crate::x86::operand::classify;

    fn ops(text: &str) -> Vec<Operand> {
        let tokens = tokenize_line(text, 1).expect("tokenize");
        classify(&tokens, None, None, None).expect("classify").1
    }

    fn ctx() -> MatchCtx {
        MatchCtx {
            hint: None,
            address: 0,
            prefix_len: 0,
        }
    }

    #[test]
    fn template_parse_notation() {
        let toks = Schema::parse_template("c7 /0 i0 i1");
        assert_eq!(toks[0], TemplateTok::Lit(0xC7));
        assert_eq!(
            toks[1],
            TemplateTok::ModRm {
                reg_override: Some(0)
            }
        );
        assert_eq!(toks[2], TemplateTok::Imm(0));
        assert_eq!(toks[3], TemplateTok::Imm(1));
    }

    #[test]
    fn al_specific_form_beats_generic_rm_form() {
        let operands = ops("al, 0x3");
        let matched = find_matching_schemas("add", &operands, &ctx()).expect("schemas");
        assert!(!matched.is_empty());
        assert_eq!(matched[0].template[0], TemplateTok::Lit(0x04));
        assert_eq!(matched[0].byte_size(), 2);
    }

    #[test]
    fn unknown_mnemonic_is_an_error() {
        let err = find_matching_schemas("frob", &ops("al, 1"), &ctx()).expect_err("should fail");
        assert_eq!(err.kind(), AsmErrorKind::UnknownOperation);
    }

    #[test]
    fn memory_operand_materializes_displacement_slots() {
        let operands = ops("word [bx+4], ax");
        let matched = find_matching_schemas("mov", &operands, &ctx()).expect("schemas");
        let best = &matched[0];
        // 89 mr d0
        assert_eq!(best.byte_size(), 3);
        assert!(best
            .template
            .iter()
            .any(|t| matches!(t, TemplateTok::Disp(0))));
        assert_eq!(best.rm_operand, Some(0));
        assert_eq!(best.reg_operand, Some(1));
    }

    #[test]
    fn register_direct_has_no_displacement_slots() {
        let operands = ops("ax, bx");
        let matched = find_matching_schemas("mov", &operands, &ctx()).expect("schemas");
        let best = &matched[0];
        assert_eq!(best.byte_size(), 2);
        assert!(!best
            .template
            .iter()
            .any(|t| matches!(t, TemplateTok::Disp(_))));
    }

    #[test]
    fn sign_extended_imm8_matches_small_values_only() {
        let m = OperandMatcher::SignExtImm8;
        let small = &ops("ax, 2")[1];
        let large = &ops("ax, 0x200")[1];
        assert!(m.matches(small, &ctx(), 3));
        assert!(!m.matches(large, &ctx(), 3));
    }

    #[test]
    fn rel_matcher_checks_reachability() {
        let m = OperandMatcher::RelLabel(1);
        let target = Operand::Immediate {
            value: 0x40,
            byte_size: 1,
            explicit_size: false,
            span: Default::default(),
        };
        // schema len 2: disp = 0x40 - 2 = 0x3e -> fits
        assert!(m.matches(&target, &ctx(), 2));
        let far_ctx = MatchCtx {
            hint: None,
            address: 0x200,
            prefix_len: 0,
        };
        // disp = 0x40 - 0x202 = -0x1c2 -> does not fit in a byte
        assert!(!m.matches(&target, &far_ctx, 2));
    }

    #[test]
    fn labels_match_rel_and_imm_pessimistically() {
        let label = Operand::Label {
            name: "x".to_string(),
            span: Default::default(),
        };
        assert!(OperandMatcher::RelLabel(1).matches(&label, &ctx(), 2));
        assert!(OperandMatcher::Imm(2).matches(&label, &ctx(), 3));
        assert!(!OperandMatcher::SignExtImm8.matches(&label, &ctx(), 3));
    }

    #[test]
    fn hint_gates_branch_matchers() {
        let label = Operand::Label {
            name: "x".to_string(),
            span: Default::default(),
        };
        let short_ctx = MatchCtx {
            hint: Some(BranchHint::Short),
            address: 0,
            prefix_len: 0,
        };
        assert!(OperandMatcher::RelLabel(1).matches(&label, &short_ctx, 2));
        assert!(!OperandMatcher::RelLabel(2).matches(&label, &short_ctx, 3));
    }

    #[test]
    fn schemas_sort_ascending_by_size() {
        let operands = ops("ax, 2");
        let matched = find_matching_schemas("add", &operands, &ctx()).expect("schemas");
        let sizes: Vec<u8> = matched.iter().map(ResolvedSchema::byte_size).collect();
        let mut sorted = sizes.clone();
        sorted.sort_unstable();
        assert_eq!(sizes, sorted);
        assert!(sizes.len() >= 2);
    }
}
