//! Compile-time ownership, borrowing and perspective verifier for stack
//! containers.
//!
//! The verifier consumes a flat stream of [`op::OpNode`]s (from the text form
//! or JSON), checks it in one pass, and produces an annotated stream together
//! with every [`diagnostics::Diagnostic`] it found. Code generation through
//! [`codegen::CodeGenerator`] is refused while fatal diagnostics remain.

pub mod binding;
pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod ledger;
pub mod lexer;
mod lifetime;
pub mod op;
pub mod parser;
pub mod perspective;
pub mod registry;
pub mod repl;
pub mod scope;
pub mod shadow;
pub mod token;
mod transfer;
pub mod verifier;


use crate::codegen::{emit, format_stream, JsonEmitter, Sink};
use crate::config::{display_name, Config, OutputFormat};
use crate::diagnostics::{render_human, render_json};
use crate::error::{ParseErrors, StackResult};
use crate::op::OpNode;
use std::path::Path;

pub use crate::diagnostics::Diagnostic;
pub use crate::verifier::{VerifiedProgram, Verifier, VerifyOptions};

/// Encoding of an operation stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    Text,
    Json,
}

impl StreamFormat {
    pub fn of_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => StreamFormat::Json,
            _ => StreamFormat::Text,
        }
    }
}

/// A named stream and its text.
#[derive(Debug, Clone)]
pub struct Source {
    pub name: String,
    pub code: String,
    pub format: StreamFormat,
}

impl Source {
    pub fn new(name: impl Into<String>, code: impl Into<String>, format: StreamFormat) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            format,
        }
    }

    pub fn from_file(path: &Path) -> StackResult<Self> {
        let code = std::fs::read_to_string(path)?;
        Ok(Self::new(display_name(path), code, StreamFormat::of_path(path)))
    }

    pub fn parse(&self, error_limit: usize) -> StackResult<Vec<OpNode>> {
        match self.format {
            StreamFormat::Text => parser::parse(&self.code, error_limit)
                .map_err(|errors| ParseErrors::new(&self.name, &self.code, errors).into()),
            StreamFormat::Json => Ok(serde_json::from_str(&self.code)?),
        }
    }
}

/// Result of checking one source.
#[derive(Debug)]
pub struct CheckReport {
    pub name: String,
    pub code: String,
    pub program: VerifiedProgram,
}

impl CheckReport {
    pub fn has_fatal(&self) -> bool {
        self.program.has_fatal()
    }

    /// Renders the diagnostics in the configured format.
    pub fn render(&self, config: &Config) -> StackResult<String> {
        match config.format {
            OutputFormat::Human => Ok(render_human(
                &self.program.diagnostics,
                &self.name,
                &self.code,
                config.error_limit,
                config.color,
            )),
            OutputFormat::Json => Ok(render_json(&self.program.diagnostics, &self.name)?),
        }
    }
}

/// Parses and verifies a source.
pub fn check(source: &Source, config: &Config) -> StackResult<CheckReport> {
    let ops = source.parse(config.error_limit)?;
    log::debug!("{}: {} operation(s)", source.name, ops.len());
    let program = Verifier::verify(
        &ops,
        VerifyOptions {
            warnings_as_errors: config.warnings_as_errors,
        },
    );
    Ok(CheckReport {
        name: source.name.clone(),
        code: source.code.clone(),
        program,
    })
}

/// The annotated stream as JSON, refused while fatal diagnostics remain.
pub fn annotate(report: &CheckReport) -> StackResult<String> {
    let mut sink = Sink::new(report.name.as_str());
    emit(&mut JsonEmitter { pretty: true }, &report.program, &mut sink)?;
    sink.done()
}

/// Re-emits a source in canonical text form without verifying it.
pub fn format_source(source: &Source, config: &Config) -> StackResult<String> {
    Ok(format_stream(&source.parse(config.error_limit)?))
}
