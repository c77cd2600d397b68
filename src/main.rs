// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

use clap::Parser;

use forge86::assembler::cli::{run_with_cli, Cli};
use forge86::core::error::diagnostics_report_json;

fn main() {
    let cli = Cli::parse();
    match run_with_cli(&cli) {
        Ok(report) => {
            println!(
                "{}: {} bytes, {} passes",
                report.out_path.display(),
                report.byte_count,
                report.passes
            );
            if let Some(symbols) = report.symbols {
                print!("{symbols}");
            }
        }
        Err(diagnostic) => {
            if cli.json {
                print!("{}", diagnostics_report_json(&[diagnostic]));
            } else {
                eprintln!("{}", diagnostic.render());
            }
            std::process::exit(1);
        }
    }
}
