// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Binary emitter: walks a resolved schema's template and produces the
//! literal byte sequence.
//!
//! Emission is a pure projection of the resolved instruction. Unresolved
//! operands emit zero placeholders, which only the non-final passes ever
//! see; after convergence every operand is concrete.

use crate::core::error::{AsmError, AsmErrorKind};
use crate::scanner::Span;
use crate::x86::addressing::AddressDescriptor;
use crate::x86::modrm::{find_addressing_mode, RmByte, REG_ADDRESSING};
use crate::x86::operand::Operand;
use crate::x86::registers::segment_override_prefix;
use crate::x86::schema::{ResolvedSchema, TemplateTok};
use crate::x86::signed_byte_size;

fn le_byte(value: i64, index: u8) -> u8 {
    (value as u64).to_le_bytes()[usize::from(index)]
}

fn memory_descriptor<'a>(operands: &'a [Operand]) -> Option<&'a AddressDescriptor> {
    operands.iter().find_map(|op| match op {
        Operand::Memory { desc, .. } => Some(desc),
        _ => None,
    })
}

fn immediate_value(operands: &[Operand]) -> Option<i64> {
    operands.iter().find_map(|op| match op {
        Operand::Immediate { value, .. } => Some(*value),
        // still-symbolic reference: pessimistic placeholder
        Operand::Label { .. } => Some(0),
        _ => None,
    })
}

fn compute_rm_byte(
    schema: &ResolvedSchema,
    operands: &[Operand],
    reg_field: u8,
    span: Span,
) -> Result<RmByte, AsmError> {
    let rm_op = schema
        .rm_operand
        .and_then(|i| operands.get(i))
        .ok_or_else(|| {
            AsmError::with_span(
                AsmErrorKind::MissingRmByteDefinition,
                "Encoding requires a ModRM operand but none was supplied",
                span,
            )
        })?;

    match rm_op {
        Operand::Register(reg, _) => Ok(RmByte::new(REG_ADDRESSING, reg_field, reg.index)),
        Operand::Memory { desc, span, .. } => {
            if let Some(index) = &desc.index {
                if index.scale != 1 {
                    return Err(AsmError::with_span(
                        AsmErrorKind::InvalidAddressingMode,
                        format!("Scale factor {} is not encodable in 16-bit mode", index.scale),
                        *span,
                    ));
                }
            }
            let disp_size = desc.disp.map(|_| desc.modrm_disp_size());
            let (mode, rm) =
                find_addressing_mode(desc.base, desc.index.map(|i| i.reg), disp_size).ok_or_else(
                    || {
                        AsmError::with_span(
                            AsmErrorKind::InvalidAddressingMode,
                            "Address expression has no 16-bit ModRM encoding",
                            *span,
                        )
                    },
                )?;
            Ok(RmByte::new(mode, reg_field, rm))
        }
        other => Err(AsmError::with_span(
            AsmErrorKind::MissingRmByteDefinition,
            "ModRM operand must be a register or memory reference",
            other.span(),
        )),
    }
}

/// Emit the byte sequence for one resolved instruction.
///
/// `prefixes` are the instruction prefixes (`rep`, `lock`, ...) in source
/// order; a segment-override prefix from the memory operand follows them.
/// `address` is the instruction's absolute address, used for relative
/// displacements.
pub fn emit(
    schema: &ResolvedSchema,
    operands: &[Operand],
    prefixes: &[u8],
    address: u32,
    span: Span,
) -> Result<Vec<u8>, AsmError> {
    let mem = memory_descriptor(operands);

    if let Some(desc) = mem {
        if let Some(disp) = desc.disp {
            if !desc.unresolved && signed_byte_size(disp) > 2 && desc.disp_byte_size > 2 {
                return Err(AsmError::with_span(
                    AsmErrorKind::DisplacementExceedingByteSize,
                    format!("Displacement {disp:#x} exceeds 16 bits"),
                    span,
                ));
            }
        }
    }

    let mut bytes: Vec<u8> = prefixes.to_vec();
    if let Some(sreg) = mem.and_then(|desc| desc.sreg) {
        let prefix = segment_override_prefix(sreg).ok_or_else(|| {
            AsmError::with_span(
                AsmErrorKind::InvalidAddressingMode,
                format!("'{}' cannot override a segment", sreg.mnemonic),
                span,
            )
        })?;
        bytes.push(prefix);
    }

    let total_size = bytes.len() as u32 + u32::from(schema.byte_size());

    let needs_modrm = schema
        .template
        .iter()
        .any(|t| matches!(t, TemplateTok::ModRm { .. }));
    let rm_byte = if needs_modrm {
        let pinned = schema.template.iter().find_map(|t| match t {
            TemplateTok::ModRm { reg_override } => *reg_override,
            _ => None,
        });
        let reg_field = pinned
            .or_else(|| {
                schema
                    .reg_operand
                    .and_then(|i| operands.get(i))
                    .and_then(|op| match op {
                        Operand::Register(reg, _) => Some(reg.index),
                        _ => None,
                    })
            })
            .unwrap_or(0);
        Some(compute_rm_byte(schema, operands, reg_field, span)?)
    } else {
        None
    };

    let imm = immediate_value(operands);
    let seg_mem = operands.iter().find_map(|op| match op {
        Operand::SegmentedMemory {
            segment, offset, ..
        } => Some((*segment, *offset)),
        _ => None,
    });

    // relative displacement, checked once against the declared size; an
    // unresolved target emits zero placeholders until the next pass
    let rel_size = schema.rel_size();
    let resolved_target = operands
        .iter()
        .any(|op| matches!(op, Operand::Immediate { .. }));
    let rel_disp = match imm {
        Some(target) if rel_size > 0 && resolved_target => {
            let disp = target - i64::from(address) - i64::from(total_size);
            if signed_byte_size(disp) > rel_size {
                return Err(AsmError::with_span(
                    AsmErrorKind::DisplacementExceedingByteSize,
                    format!(
                        "Branch target out of range for a {rel_size}-byte displacement ({disp})"
                    ),
                    span,
                ));
            }
            disp
        }
        _ => 0,
    };

    for tok in &schema.template {
        match tok {
            TemplateTok::Lit(byte) => bytes.push(*byte),
            TemplateTok::ModRm { .. } => match &rm_byte {
                Some(rm) => bytes.push(rm.byte()),
                None => {
                    return Err(AsmError::with_span(
                        AsmErrorKind::MissingRmByteDefinition,
                        "Encoding requires a ModRM operand but none was supplied",
                        span,
                    ));
                }
            },
            TemplateTok::Disp(i) => {
                let disp = mem.and_then(|desc| desc.disp).unwrap_or(0);
                bytes.push(le_byte(disp, *i));
            }
            TemplateTok::Imm(i) => bytes.push(le_byte(imm.unwrap_or(0), *i)),
            TemplateTok::Rel(i) => bytes.push(le_byte(rel_disp, *i)),
            TemplateTok::Seg(i) => {
                let (segment, _) = seg_mem.unwrap_or((0, 0));
                bytes.push(le_byte(i64::from(segment), *i));
            }
            TemplateTok::Off(i) => {
                let (_, offset) = seg_mem.unwrap_or((0, 0));
                bytes.push(le_byte(i64::from(offset), *i));
            }
        }
    }

    debug_assert_eq!(bytes.len() as u32, total_size, "template length mismatch");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::tokenize_line;
    use crate::x86::operand::{classify, BranchHint};
    use crate::x86::schema::{find_matching_schemas, MatchCtx, OperandMatcher, ResolvedSchema};
    use crate::x86::table::for_each_schema;

    fn encode(mnemonic: &str, args: &str) -> Vec<u8> {
        encode_at(mnemonic, args, 0)
    }

    fn encode_at(mnemonic: &str, args: &str, address: u32) -> Vec<u8> {
        let tokens = tokenize_line(args, 1).expect("tokenize");
        let default_size = crate::x86::table::is_branch_mnemonic(mnemonic).then_some(2);
        let (hint, operands) = classify(&tokens, None, default_size, None).expect("classify");
        let ctx = MatchCtx {
            hint,
            address,
            prefix_len: 0,
        };
        let matched = find_matching_schemas(mnemonic, &operands, &ctx).expect("schemas");
        let best = matched.first().expect("at least one schema");
        emit(best, &operands, &[], address, Span::default()).expect("emit")
    }

    #[test]
    fn accumulator_immediate_short_forms() {
        assert_eq!(encode("mov", "al, 0x0"), vec![0xB0, 0x00]);
        assert_eq!(encode("add", "al, 0x3"), vec![0x04, 0x03]);
        assert_eq!(encode("sub", "al, 0x1"), vec![0x2C, 0x01]);
    }

    #[test]
    fn base_index_memory_without_displacement() {
        // mod=00, reg=al(0), rm=000
        assert_eq!(encode("mov", "[bx+si], al"), vec![0x88, 0x00]);
    }

    #[test]
    fn register_direct_modrm() {
        // 89 /r: mod=11, reg=bx(3), rm=ax(0)
        assert_eq!(encode("mov", "ax, bx"), vec![0x89, 0xD8]);
    }

    #[test]
    fn bp_base_forces_one_byte_zero_displacement() {
        // mod=01, rm=110, disp8=0
        assert_eq!(encode("mov", "[bp], al"), vec![0x88, 0x46, 0x00]);
    }

    #[test]
    fn word_immediate_to_memory() {
        assert_eq!(
            encode("mov", "word [bp], 5"),
            vec![0xC7, 0x46, 0x00, 0x05, 0x00]
        );
    }

    #[test]
    fn moffs_accumulator_form() {
        assert_eq!(encode("mov", "al, [0x5]"), vec![0xA0, 0x05, 0x00]);
        assert_eq!(encode("mov", "[0x100], ax"), vec![0xA3, 0x00, 0x01]);
    }

    #[test]
    fn segment_override_prefix_is_emitted() {
        // 26 = es override; 8A /r with mod=00, reg=al, rm=101 (di)
        assert_eq!(encode("mov", "al, [es:di]"), vec![0x26, 0x8A, 0x05]);
    }

    #[test]
    fn short_jump_forward() {
        // jmp at 0, target 4, size 2 -> disp 2
        assert_eq!(encode_at("jmp", "0x4", 0), vec![0xEB, 0x02]);
    }

    #[test]
    fn backward_jump_wraps_negative() {
        // jmp at 0x10 to 0x10: disp = 0x10 - 0x12 = -2
        assert_eq!(encode_at("jmp", "0x10", 0x10), vec![0xEB, 0xFE]);
    }

    #[test]
    fn far_jump_emits_offset_then_segment() {
        assert_eq!(
            encode("jmp", "0x7c00:0x123"),
            vec![0xEA, 0x23, 0x01, 0x00, 0x7C]
        );
    }

    #[test]
    fn far_indirect_call_uses_group_five() {
        let tokens = tokenize_line("far [bx]", 1).expect("tokenize");
        let (hint, operands) = classify(&tokens, None, Some(2), None).expect("classify");
        assert_eq!(hint, Some(BranchHint::Far));
        let ctx = MatchCtx {
            hint,
            address: 0,
            prefix_len: 0,
        };
        let matched = find_matching_schemas("call", &operands, &ctx).expect("schemas");
        let bytes = emit(&matched[0], &operands, &[], 0, Span::default()).expect("emit");
        // FF /3, mod=00 rm=111 (bx)
        assert_eq!(bytes, vec![0xFF, 0x5F]);
    }

    #[test]
    fn relative_overflow_is_detected() {
        let operands = vec![Operand::Immediate {
            value: 0x200,
            byte_size: 2,
            explicit_size: false,
            span: Span::default(),
        }];
        let schemas = crate::x86::table::opcode_schemas("jmp").expect("jmp");
        let short = schemas
            .iter()
            .find(|s| s.byte_size() == 2)
            .expect("short form");
        let resolved = ResolvedSchema::from_schema(short, &operands);
        let err =
            emit(&resolved, &operands, &[], 0, Span::default()).expect_err("must overflow");
        assert_eq!(err.kind(), AsmErrorKind::DisplacementExceedingByteSize);
    }

    #[test]
    fn prefixes_precede_the_opcode() {
        let tokens = tokenize_line("", 1).expect("tokenize");
        let (_, operands) = classify(&tokens, None, None, None).expect("classify");
        let ctx = MatchCtx {
            hint: None,
            address: 0,
            prefix_len: 1,
        };
        let matched = find_matching_schemas("movsb", &operands, &ctx).expect("schemas");
        let bytes = emit(&matched[0], &operands, &[0xF3], 0, Span::default()).expect("emit");
        assert_eq!(bytes, vec![0xF3, 0xA4]);
    }

    fn synthesize_operand(matcher: &OperandMatcher, address: u32, schema_len: u8) -> Operand {
        let span = Span::default();
        match matcher {
            OperandMatcher::FixedReg(name) => Operand::Register(
                crate::x86::registers::lookup_register(name).expect("register"),
                span,
            ),
            OperandMatcher::One => Operand::Immediate {
                value: 1,
                byte_size: 1,
                explicit_size: false,
                span,
            },
            OperandMatcher::Reg(1) => {
                Operand::Register(crate::x86::registers::lookup_register("cl").unwrap(), span)
            }
            OperandMatcher::Reg(_) => {
                Operand::Register(crate::x86::registers::lookup_register("cx").unwrap(), span)
            }
            OperandMatcher::SReg => {
                Operand::Register(crate::x86::registers::lookup_register("es").unwrap(), span)
            }
            OperandMatcher::Imm(_) | OperandMatcher::SignExtImm8 | OperandMatcher::PortImm => {
                Operand::Immediate {
                    value: 1,
                    byte_size: 1,
                    explicit_size: false,
                    span,
                }
            }
            OperandMatcher::RelLabel(_) => Operand::Immediate {
                // lands exactly past the instruction: displacement 0
                value: i64::from(address) + i64::from(schema_len),
                byte_size: 2,
                explicit_size: false,
                span,
            },
            OperandMatcher::FarPointer => Operand::SegmentedMemory {
                segment: 0x10,
                offset: 0x20,
                unresolved: false,
                span,
            },
            _ => unreachable!("memory matchers are synthesized by the caller"),
        }
    }

    #[test]
    fn every_schema_round_trips_template_length() {
        let address = 0x100;
        for_each_schema(|schema| {
            let operands: Vec<Operand> = schema
                .matchers
                .iter()
                .map(|matcher| match matcher {
                    OperandMatcher::Mem(_)
                    | OperandMatcher::RegMem(_)
                    | OperandMatcher::IndirectFarPointer => {
                        // [bx+si]: no displacement slots
                        let tokens = tokenize_line("bx+si", 1).expect("tokenize");
                        Operand::Memory {
                            desc: crate::x86::addressing::resolve_address(&tokens, None)
                                .expect("resolve"),
                            byte_size: 2,
                            explicit_size: false,
                            span: Span::default(),
                        }
                    }
                    OperandMatcher::MemOffset => {
                        let tokens = tokenize_line("0x34", 1).expect("tokenize");
                        Operand::Memory {
                            desc: crate::x86::addressing::resolve_address(&tokens, None)
                                .expect("resolve"),
                            byte_size: 2,
                            explicit_size: false,
                            span: Span::default(),
                        }
                    }
                    other => synthesize_operand(other, address, schema.byte_size()),
                })
                .collect();
            let resolved = ResolvedSchema::from_schema(schema, &operands);
            let bytes = emit(&resolved, &operands, &[], address, Span::default())
                .unwrap_or_else(|e| panic!("emit failed for {}: {e}", schema.mnemonic));
            assert_eq!(
                bytes.len() as u8,
                resolved.byte_size(),
                "length mismatch for {}",
                schema.mnemonic
            );
        });
    }
}
