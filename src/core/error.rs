// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Error kinds, diagnostics, and reporting for the assembler.
//!
//! Every failure produced by the encoding core is a value of [`AsmError`]
//! carrying one of the canonical [`AsmErrorKind`]s and, where known, the
//! source span it originates from. Diagnostics are rendered by the CLI as
//! `file:row:col: severity: message` or serialized as JSON.

use std::fmt;

use crate::scanner::Span;

/// Categories of assembler errors.
///
/// The encoding kinds mirror the failure modes of the instruction-encoding
/// backend one-to-one; `Syntax`, `Directive`, `Cli`, and `Io` cover the
/// surrounding tool surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsmErrorKind {
    InvalidOperand,
    OperandSizeMismatch,
    MissingSizeOverride,
    UnknownMemToken,
    InvalidScale,
    ScaleAlreadyDefined,
    IncorrectExpression,
    UnknownOperation,
    NoMatchingEncoding,
    MissingParentLabel,
    UnknownLabel,
    LabelAlreadyDefined,
    DisplacementExceedingByteSize,
    InvalidAddressingMode,
    MissingRmByteDefinition,
    OscillatingFixedPoint,
    Syntax,
    Directive,
    Cli,
    Io,
}

impl AsmErrorKind {
    /// Stable identifier used in JSON reports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidOperand => "invalid-operand",
            Self::OperandSizeMismatch => "operand-size-mismatch",
            Self::MissingSizeOverride => "missing-size-override",
            Self::UnknownMemToken => "unknown-mem-token",
            Self::InvalidScale => "invalid-scale",
            Self::ScaleAlreadyDefined => "scale-already-defined",
            Self::IncorrectExpression => "incorrect-expression",
            Self::UnknownOperation => "unknown-operation",
            Self::NoMatchingEncoding => "no-matching-encoding",
            Self::MissingParentLabel => "missing-parent-label",
            Self::UnknownLabel => "unknown-label",
            Self::LabelAlreadyDefined => "label-already-defined",
            Self::DisplacementExceedingByteSize => "displacement-exceeding-byte-size",
            Self::InvalidAddressingMode => "invalid-addressing-mode",
            Self::MissingRmByteDefinition => "missing-rm-byte-definition",
            Self::OscillatingFixedPoint => "oscillating-fixed-point",
            Self::Syntax => "syntax",
            Self::Directive => "directive",
            Self::Cli => "cli",
            Self::Io => "io",
        }
    }

    /// Whether this kind reports an internal consistency failure rather
    /// than a problem with the user's source.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::OscillatingFixedPoint)
    }
}

/// An assembler error with a kind, message, and optional source span.
#[derive(Debug, Clone)]
pub struct AsmError {
    kind: AsmErrorKind,
    message: String,
    span: Option<Span>,
}

impl AsmError {
    pub fn new(kind: AsmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
        }
    }

    pub fn with_span(kind: AsmErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            span: Some(span),
        }
    }

    pub fn kind(&self) -> AsmErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn span(&self) -> Option<Span> {
        self.span
    }

    /// Attach a span if the error does not already carry one.
    pub fn or_span(mut self, span: Span) -> Self {
        if self.span.is_none() {
            self.span = Some(span);
        }
        self
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AsmError {}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// A renderable diagnostic: an error plus file/source context.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub error: AsmError,
    pub file: Option<String>,
    pub source_line: Option<String>,
}

impl Diagnostic {
    pub fn error(error: AsmError) -> Self {
        Self {
            severity: Severity::Error,
            error,
            file: None,
            source_line: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_source_line(mut self, line: impl Into<String>) -> Self {
        self.source_line = Some(line.into());
        self
    }

    /// Render as `file:row:col: severity: message`, followed by the source
    /// line and a caret marker when available.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let file = self.file.as_deref().unwrap_or("<input>");
        match self.error.span() {
            Some(span) => {
                out.push_str(&format!("{}:{}:{}: ", file, span.line, span.col_start));
            }
            None => {
                out.push_str(&format!("{file}: "));
            }
        }
        out.push_str(self.severity.as_str());
        out.push_str(": ");
        out.push_str(self.error.message());
        if self.error.kind().is_internal() {
            out.push_str(" (internal error; please report this)");
        }
        if let (Some(line), Some(span)) = (self.source_line.as_deref(), self.error.span()) {
            out.push('\n');
            out.push_str(line);
            out.push('\n');
            let pad = span.col_start.saturating_sub(1);
            out.push_str(&" ".repeat(pad));
            let width = span.col_end.saturating_sub(span.col_start).max(1);
            out.push_str(&"^".repeat(width));
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "file": self.file,
            "line": self.error.span().map(|s| s.line),
            "col_start": self.error.span().map(|s| s.col_start),
            "col_end": self.error.span().map(|s| s.col_end),
            "severity": self.severity.as_str(),
            "code": self.error.kind().code(),
            "message": self.error.message(),
        })
    }
}

/// Serialize diagnostics as the machine-readable report consumed by editor
/// integrations.
pub fn diagnostics_report_json(diagnostics: &[Diagnostic]) -> String {
    let payload = serde_json::json!({
        "schema": "forge86-diagnostics-v1",
        "diagnostics": diagnostics.iter().map(Diagnostic::to_json).collect::<Vec<_>>(),
    });
    let mut serialized =
        serde_json::to_string_pretty(&payload).unwrap_or_else(|_| "{}".to_string());
    serialized.push('\n');
    serialized
}
