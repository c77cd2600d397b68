// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Fixed-point pass driver.
//!
//! The driver walks the AST in order, maintaining a running byte offset and
//! the label table, and re-resolves every instruction's schema each pass.
//! The first (seeding) pass sizes label-dependent instructions with the
//! largest matching encoding so addresses can only shrink afterwards;
//! refining passes pick the smallest. Compilation converges when a pass
//! changes no address, size, or label entry. A pass ceiling turns a
//! non-terminating fixed point into a fatal diagnostic instead of a hang.

use std::collections::HashMap;

use crate::core::error::{AsmError, AsmErrorKind};
use crate::core::symbols::{is_local_label, LabelTable};
use crate::parser::{AstNode, DataValue, InstructionNode};
use crate::scanner::Span;
use crate::x86::emitter::emit;
use crate::x86::operand::{classify, Operand};
use crate::x86::schema::{find_matching_schemas, MatchCtx, ResolvedSchema};
use crate::x86::table::is_branch_mnemonic;

/// Pass driver state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Seeding,
    Refining,
    Converged,
    Failed,
}

/// Explicit per-node resolution state; nothing is nullable-mutated in place.
#[derive(Debug, Clone)]
enum Resolution {
    Pending,
    /// Nodes that occupy bytes but carry no schema (data definitions).
    Inert,
    Instruction {
        schema: ResolvedSchema,
        operands: Vec<Operand>,
        prefixes: Vec<u8>,
    },
}

/// One AST node's compilation state, updated in place across passes and
/// frozen at convergence.
#[derive(Debug, Clone)]
struct ItemState {
    address: u32,
    size: u32,
    resolution: Resolution,
}

/// Final result of a converged compilation.
#[derive(Debug)]
pub struct CompiledUnit {
    /// Concatenated emission of every node in AST order.
    pub bytes: Vec<u8>,
    /// Final label table, sorted by address.
    pub labels: Vec<(String, u32)>,
    /// Total passes run (seeding pass included).
    pub passes: u32,
    pub origin: u32,
    /// Per-node emission for listings: (source line, address, bytes).
    pub listing: Vec<(u32, u32, Vec<u8>)>,
}

pub struct Engine<'a> {
    nodes: &'a [AstNode],
    labels: LabelTable,
    consts: HashMap<String, i64>,
    items: Vec<ItemState>,
    state: PassState,
    passes: u32,
    max_passes: u32,
    origin: u32,
    /// Line of the first node whose layout moved during the current pass,
    /// kept for the oscillation diagnostic.
    first_changed_line: Option<u32>,
}

impl<'a> Engine<'a> {
    pub fn new(nodes: &'a [AstNode], max_passes: Option<u32>) -> Self {
        let default_ceiling = (nodes.len() as u32).max(16);
        Self {
            nodes,
            labels: LabelTable::new(),
            consts: HashMap::new(),
            items: vec![
                ItemState {
                    address: 0,
                    size: 0,
                    resolution: Resolution::Pending,
                };
                nodes.len()
            ],
            state: PassState::Seeding,
            passes: 0,
            max_passes: max_passes.unwrap_or(default_ceiling),
            origin: 0,
            first_changed_line: None,
        }
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    pub fn passes(&self) -> u32 {
        self.passes
    }

    /// Run passes to the fixed point, then project the final bytes.
    pub fn run(mut self) -> Result<CompiledUnit, AsmError> {
        self.collect_constants()?;

        loop {
            let changed = self.run_pass()?;
            self.passes += 1;
            if !changed && self.state != PassState::Seeding {
                self.state = PassState::Converged;
                break;
            }
            if self.passes > self.max_passes {
                self.state = PassState::Failed;
                let line = self.first_changed_line.unwrap_or(0);
                return Err(AsmError::new(
                    AsmErrorKind::OscillatingFixedPoint,
                    format!(
                        "Layout did not stabilize after {} passes; line {} kept moving \
                         (non-monotonic encoding catalog)",
                        self.passes, line
                    ),
                ));
            }
            self.state = PassState::Refining;
        }

        self.project()
    }

    /// EQU constants are numeric and pass-independent; collect them up
    /// front so duplicate definitions surface once.
    fn collect_constants(&mut self) -> Result<(), AsmError> {
        for node in self.nodes {
            if let AstNode::Equ { name, value, span } = node {
                if self.consts.insert(name.clone(), *value).is_some() {
                    return Err(AsmError::with_span(
                        AsmErrorKind::LabelAlreadyDefined,
                        format!("'{name}' is already defined"),
                        *span,
                    ));
                }
            }
        }
        Ok(())
    }

    fn resolver<'r>(
        consts: &'r HashMap<String, i64>,
        labels: &'r LabelTable,
        parent: Option<&'r str>,
    ) -> impl Fn(&str) -> Option<i64> + 'r {
        let parent = parent.map(str::to_string);
        move |name: &str| {
            if let Some(value) = consts.get(name) {
                return Some(*value);
            }
            let qualified = if is_local_label(name) {
                format!("{}{}", parent.as_deref()?, name)
            } else {
                name.to_string()
            };
            labels.lookup(&qualified).map(i64::from)
        }
    }

    fn run_pass(&mut self) -> Result<bool, AsmError> {
        self.labels.begin_pass();
        self.first_changed_line = None;
        let mut parent: Option<String> = None;
        let mut offset: u32 = 0;
        let mut origin: u32 = 0;
        let mut origin_set = false;
        let mut changed = false;

        for (index, node) in self.nodes.iter().enumerate() {
            let address = origin.wrapping_add(offset);
            let (size, resolution) = match node {
                AstNode::Label { name, span } => {
                    if !self.labels.define(name, address) {
                        return Err(AsmError::with_span(
                            AsmErrorKind::LabelAlreadyDefined,
                            format!("Label '{name}' is already defined"),
                            *span,
                        ));
                    }
                    if self.consts.contains_key(name) {
                        return Err(AsmError::with_span(
                            AsmErrorKind::LabelAlreadyDefined,
                            format!("'{name}' is already defined as a constant"),
                            *span,
                        ));
                    }
                    if !name.contains('.') {
                        parent = Some(name.clone());
                    }
                    (0, Resolution::Inert)
                }
                AstNode::Origin { address: org, span } => {
                    if origin_set {
                        return Err(AsmError::with_span(
                            AsmErrorKind::Directive,
                            "org is already defined",
                            *span,
                        ));
                    }
                    origin = *org;
                    origin_set = true;
                    offset = 0;
                    (0, Resolution::Inert)
                }
                AstNode::Bits { bits, span } => {
                    if *bits != 16 {
                        return Err(AsmError::with_span(
                            AsmErrorKind::Directive,
                            format!("Unsupported mode: bits {bits} (only 16 is available)"),
                            *span,
                        ));
                    }
                    (0, Resolution::Inert)
                }
                AstNode::Equ { .. } => (0, Resolution::Inert),
                AstNode::Data {
                    element_size,
                    values,
                    ..
                } => (data_size(*element_size, values), Resolution::Inert),
                AstNode::Instruction(instr) => {
                    let (schema, operands) = self.resolve_instruction(
                        instr,
                        address,
                        parent.as_deref(),
                    )?;
                    let sreg_len = operands
                        .iter()
                        .any(|op| matches!(op, Operand::Memory { desc, .. } if desc.sreg.is_some()))
                        as u32;
                    let size = instr.prefixes.len() as u32 + sreg_len + u32::from(schema.byte_size());
                    (
                        size,
                        Resolution::Instruction {
                            schema,
                            operands,
                            prefixes: instr.prefixes.clone(),
                        },
                    )
                }
            };

            let item = &mut self.items[index];
            if item.address != address || item.size != size {
                changed = true;
                if self.first_changed_line.is_none() {
                    self.first_changed_line = Some(node.span().line);
                }
            }
            item.address = address;
            item.size = size;
            item.resolution = resolution;
            offset = offset.wrapping_add(size);
        }

        self.origin = origin;
        Ok(changed || self.labels.changed())
    }

    fn resolve_instruction(
        &self,
        instr: &InstructionNode,
        address: u32,
        parent: Option<&str>,
    ) -> Result<(ResolvedSchema, Vec<Operand>), AsmError> {
        let resolver = Self::resolver(&self.consts, &self.labels, parent);
        let default_mem_size = is_branch_mnemonic(&instr.mnemonic).then_some(2);
        let (hint, operands) = classify(
            &instr.operand_tokens,
            None,
            default_mem_size,
            Some(&resolver),
        )
        .map_err(|e| e.or_span(instr.span))?;

        let sreg_len = operands
            .iter()
            .any(|op| matches!(op, Operand::Memory { desc, .. } if desc.sreg.is_some()))
            as u8;
        let ctx = MatchCtx {
            hint,
            address,
            prefix_len: instr.prefixes.len() as u8 + sreg_len,
        };
        let matched = find_matching_schemas(&instr.mnemonic, &operands, &ctx)
            .map_err(|e| e.or_span(instr.span))?;
        if matched.is_empty() {
            return Err(AsmError::with_span(
                AsmErrorKind::NoMatchingEncoding,
                format!("No encoding of '{}' accepts these operands", instr.mnemonic),
                instr.span,
            ));
        }

        // pessimistic while any operand is symbolic, shortest once concrete
        let unresolved = operands.iter().any(|op| !op.is_resolved());
        let chosen = if unresolved {
            matched[matched.len() - 1].clone()
        } else {
            matched[0].clone()
        };
        Ok((chosen, operands))
    }

    /// Final projection: every node's bytes in AST order. Runs only after
    /// convergence; symbolic leftovers are reported here.
    fn project(&self) -> Result<CompiledUnit, AsmError> {
        debug_assert_eq!(self.state, PassState::Converged);
        let mut bytes = Vec::new();
        let mut listing = Vec::new();
        let mut parent: Option<String> = None;

        for (index, node) in self.nodes.iter().enumerate() {
            let item = &self.items[index];
            let emitted: Vec<u8> = match (&item.resolution, node) {
                (Resolution::Instruction { schema, operands, prefixes }, _) => {
                    check_resolved(operands, parent.as_deref())?;
                    let out = emit(schema, operands, prefixes, item.address, node.span())?;
                    debug_assert_eq!(out.len() as u32, item.size);
                    out
                }
                (Resolution::Inert, AstNode::Data { element_size, values, span }) => {
                    let resolver = Self::resolver(&self.consts, &self.labels, parent.as_deref());
                    emit_data(*element_size, values, &resolver, *span)?
                }
                (Resolution::Inert, AstNode::Label { name, .. }) => {
                    if !name.contains('.') {
                        parent = Some(name.clone());
                    }
                    Vec::new()
                }
                _ => Vec::new(),
            };
            if !emitted.is_empty() {
                listing.push((node.span().line, item.address, emitted.clone()));
                bytes.extend_from_slice(&emitted);
            }
        }

        Ok(CompiledUnit {
            bytes,
            labels: self.labels.sorted_entries(),
            passes: self.passes,
            origin: self.origin,
            listing,
        })
    }

    #[cfg(test)]
    fn item_sizes(&self) -> Vec<u32> {
        self.items.iter().map(|item| item.size).collect()
    }
}

fn data_size(element_size: u8, values: &[DataValue]) -> u32 {
    values
        .iter()
        .map(|v| match v {
            DataValue::Bytes(b) => b.len() as u32,
            _ => u32::from(element_size),
        })
        .sum()
}

fn emit_data(
    element_size: u8,
    values: &[DataValue],
    resolver: &impl Fn(&str) -> Option<i64>,
    span: Span,
) -> Result<Vec<u8>, AsmError> {
    let mut out = Vec::new();
    for value in values {
        match value {
            DataValue::Bytes(b) => out.extend_from_slice(b),
            DataValue::Number(n) => {
                let le = (*n as u64).to_le_bytes();
                out.extend_from_slice(&le[..usize::from(element_size)]);
            }
            DataValue::Symbol(name) => {
                let resolved = resolver(name).ok_or_else(|| {
                    AsmError::with_span(
                        AsmErrorKind::UnknownLabel,
                        format!("Unknown label '{name}'"),
                        span,
                    )
                })?;
                let le = (resolved as u64).to_le_bytes();
                out.extend_from_slice(&le[..usize::from(element_size)]);
            }
        }
    }
    Ok(out)
}

/// A symbolic operand surviving to the final projection is a user error:
/// the label never existed (or its local parent did not).
fn check_resolved(operands: &[Operand], parent: Option<&str>) -> Result<(), AsmError> {
    for op in operands {
        if op.is_resolved() {
            continue;
        }
        return Err(match op {
            Operand::Label { name, span } => {
                if is_local_label(name) && parent.is_none() {
                    AsmError::with_span(
                        AsmErrorKind::MissingParentLabel,
                        format!("Local label '{name}' has no preceding parent label"),
                        *span,
                    )
                } else {
                    AsmError::with_span(
                        AsmErrorKind::UnknownLabel,
                        format!("Unknown label '{name}'"),
                        *span,
                    )
                }
            }
            other => AsmError::with_span(
                AsmErrorKind::UnknownLabel,
                "Operand references an unknown symbol",
                other.span(),
            ),
        });
    }
    Ok(())
}
