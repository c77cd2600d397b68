// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Listing and symbol-table rendering for a compiled unit.

use std::fmt::Write as _;

use super::engine::CompiledUnit;
use super::VERSION;

const BYTES_PER_LISTING_ROW: usize = 6;

/// Render the listing: address, emitted bytes, and the source line that
/// produced them.
pub fn render_listing(unit: &CompiledUnit, source: &str) -> String {
    let source_lines: Vec<&str> = source.lines().collect();
    let mut out = String::new();
    let _ = writeln!(out, "forge86 assembler v{VERSION}");
    let _ = writeln!(out);

    for (line, address, bytes) in &unit.listing {
        let source_text = source_lines
            .get(*line as usize - 1)
            .copied()
            .unwrap_or("")
            .trim_end();
        for (row, chunk) in bytes.chunks(BYTES_PER_LISTING_ROW).enumerate() {
            let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02X}")).collect();
            let addr = *address as usize + row * BYTES_PER_LISTING_ROW;
            if row == 0 {
                let _ = writeln!(out, "{addr:04X}  {:<18}  {source_text}", hex.join(" "));
            } else {
                let _ = writeln!(out, "{addr:04X}  {:<18}", hex.join(" "));
            }
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{} bytes, {} labels, {} passes",
        unit.bytes.len(),
        unit.labels.len(),
        unit.passes
    );
    out
}

/// Render the label table sorted by address.
pub fn render_symbols(unit: &CompiledUnit) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Symbols:");
    for (name, address) in &unit.labels {
        let _ = writeln!(out, "  {address:04X}  {name}");
    }
    out
}
