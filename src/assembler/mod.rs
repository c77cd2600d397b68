// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Assembler pipeline: source text in, byte image and label table out.

pub mod cli;
pub mod engine;
pub mod output;

use crate::core::error::AsmError;
use crate::parser::parse_source;

pub use engine::{CompiledUnit, Engine, PassState};

pub const VERSION: &str = "1.0";

/// Options for one compilation unit.
#[derive(Debug, Clone, Default)]
pub struct AssembleOptions {
    /// Pass-count ceiling; defaults to `max(16, node count)`.
    pub max_passes: Option<u32>,
}

/// Assemble a full source text: parse, iterate to the fixed point, emit.
pub fn assemble_source(source: &str, options: &AssembleOptions) -> Result<CompiledUnit, AsmError> {
    let nodes = parse_source(source)?;
    Engine::new(&nodes, options.max_passes).run()
}
