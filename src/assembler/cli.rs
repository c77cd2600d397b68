// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Command-line surface and run orchestration.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;

use super::output::{render_listing, render_symbols};
use super::{assemble_source, AssembleOptions, VERSION};
use crate::core::error::{AsmError, AsmErrorKind, Diagnostic};

const LONG_ABOUT: &str = "8086 assembler producing flat binary images.

Encodings are selected by shortest form; forward references are resolved by
iterating passes to a fixed point. The output image is written next to the
input unless -o names it explicitly.";

#[derive(Parser, Debug)]
#[command(
    name = "forge86",
    version = VERSION,
    about = "8086 assembler with iterative label resolution",
    long_about = LONG_ABOUT
)]
pub struct Cli {
    /// Assembly source file.
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        long_help = "Output binary filename. Defaults to the input base with a .bin extension."
    )]
    pub output: Option<PathBuf>,

    #[arg(
        short = 'l',
        long = "list",
        value_name = "FILE",
        num_args = 0..=1,
        default_missing_value = "",
        long_help = "Emit a listing file. FILE is optional; when omitted, the output base is used and a .lst extension is added."
    )]
    pub list_name: Option<String>,

    /// Print the label table after assembly.
    #[arg(short = 's', long = "symbols")]
    pub symbols: bool,

    /// Report diagnostics as JSON on stdout.
    #[arg(long = "json")]
    pub json: bool,

    #[arg(
        long = "max-passes",
        value_name = "N",
        long_help = "Pass-count ceiling for the fixed point. Defaults to the node count (at least 16). Exceeding it is a fatal internal diagnostic."
    )]
    pub max_passes: Option<u32>,
}

/// Outcome of a successful run.
#[derive(Debug)]
pub struct RunReport {
    pub out_path: PathBuf,
    pub byte_count: usize,
    pub passes: u32,
    pub symbols: Option<String>,
}

fn with_extension(base: &Path, name: &str, ext: &str) -> PathBuf {
    if name.is_empty() {
        base.with_extension(ext)
    } else {
        PathBuf::from(name)
    }
}

fn io_error(message: String, file: &Path) -> Diagnostic {
    Diagnostic::error(AsmError::new(AsmErrorKind::Io, message))
        .with_file(file.display().to_string())
}

/// Read, assemble, and write outputs per the CLI configuration.
pub fn run_with_cli(cli: &Cli) -> Result<RunReport, Diagnostic> {
    let source = fs::read_to_string(&cli.input)
        .map_err(|e| io_error(format!("Cannot read input: {e}"), &cli.input))?;

    let options = AssembleOptions {
        max_passes: cli.max_passes,
    };
    let unit = assemble_source(&source, &options).map_err(|error| {
        let source_line = error
            .span()
            .and_then(|span| source.lines().nth(span.line as usize - 1))
            .map(str::to_string);
        let mut diag =
            Diagnostic::error(error).with_file(cli.input.display().to_string());
        if let Some(line) = source_line {
            diag = diag.with_source_line(line);
        }
        diag
    })?;

    let out_path = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.input.with_extension("bin"));
    fs::write(&out_path, &unit.bytes)
        .map_err(|e| io_error(format!("Cannot write output: {e}"), &out_path))?;

    if let Some(list_name) = &cli.list_name {
        let list_path = with_extension(&out_path, list_name, "lst");
        let listing = render_listing(&unit, &source);
        fs::write(&list_path, listing)
            .map_err(|e| io_error(format!("Cannot write listing: {e}"), &list_path))?;
    }

    Ok(RunReport {
        out_path,
        byte_count: unit.bytes.len(),
        passes: unit.passes,
        symbols: cli.symbols.then(|| render_symbols(&unit)),
    })
}
