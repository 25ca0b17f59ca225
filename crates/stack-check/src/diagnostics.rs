//! Diagnostic reporter.
//!
//! The verifier never stops at the first problem. Every finding becomes a
//! [`Diagnostic`] in the [`Reporter`], and analysis continues with the next
//! operation. Whether code generation may run is decided from the collected
//! list afterwards.

use crate::error::{pos_to_span, DiagnosticKind, VerifyError};
use crate::token::Pos;
use miette::{GraphicalReportHandler, GraphicalTheme, NamedSource};
use serde::{Deserialize, Serialize};
use stack_val::{ConversionKind, ElementType};
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A second location a diagnostic refers to, such as the borrow it conflicts
/// with.
#[derive(Debug, Clone, PartialEq)]
pub struct Related {
    pub pos: Pos,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub error: VerifyError,
    pub pos: Pos,
    pub related: Option<Related>,
}

impl Diagnostic {
    pub fn new(error: VerifyError, pos: Pos) -> Self {
        Self {
            error,
            pos,
            related: None,
        }
    }

    pub fn with_related(mut self, pos: Pos, note: impl Into<String>) -> Self {
        self.error.set_related(pos_to_span(pos));
        self.related = Some(Related {
            pos,
            note: note.into(),
        });
        self
    }

    /// Names the transfer step that rejected the operation.
    pub fn in_step(mut self, step: impl std::fmt::Display) -> Self {
        self.error
            .prefix_message(&format!("transfer rejected at {} check: ", step));
        self
    }

    pub fn kind(&self) -> DiagnosticKind {
        self.error.kind()
    }

    pub fn severity(&self) -> Severity {
        if self.kind().is_warning() {
            Severity::Warning
        } else {
            Severity::Error
        }
    }

    pub fn message(&self) -> String {
        self.error.to_string()
    }

    pub fn duplicate(name: &str, pos: Pos) -> Self {
        Self::new(
            VerifyError::DuplicateDeclaration {
                name: name.to_string(),
                span: pos_to_span(pos),
                related: None,
            },
            pos,
        )
    }

    pub fn unknown(name: &str, pos: Pos) -> Self {
        Self::new(
            VerifyError::UnknownContainer {
                step: String::new(),
                name: name.to_string(),
                span: pos_to_span(pos),
            },
            pos,
        )
    }

    pub fn type_mismatch(
        expected: impl ToString,
        found: impl ToString,
        message: impl Into<String>,
        pos: Pos,
    ) -> Self {
        Self::new(
            VerifyError::TypeMismatch {
                expected: expected.to_string(),
                found: found.to_string(),
                message: message.into(),
                span: pos_to_span(pos),
            },
            pos,
        )
    }

    pub fn unsupported(kind: ConversionKind, from: ElementType, to: ElementType, pos: Pos) -> Self {
        Self::new(
            VerifyError::UnsupportedConversion {
                step: String::new(),
                kind: kind.to_string(),
                from: from.to_string(),
                to: to.to_string(),
                reachable: match ConversionKind::targets_of(from).map(|t| t.to_string()).collect::<Vec<_>>() {
                    targets if targets.is_empty() => "nothing".to_string(),
                    targets => targets.join(", "),
                },
                span: pos_to_span(pos),
            },
            pos,
        )
    }

    pub fn ownership(message: impl Into<String>, pos: Pos) -> Self {
        Self::new(
            VerifyError::OwnershipViolation {
                message: message.into(),
                span: pos_to_span(pos),
                related: None,
            },
            pos,
        )
    }

    pub fn conflict(message: impl Into<String>, pos: Pos, prior: Pos) -> Self {
        Self::new(
            VerifyError::BorrowConflict {
                message: message.into(),
                span: pos_to_span(pos),
                related: None,
            },
            pos,
        )
        .with_related(prior, "conflicting borrow created here")
    }

    pub fn lifetime(message: impl Into<String>, pos: Pos) -> Self {
        Self::new(
            VerifyError::LifetimeViolation {
                message: message.into(),
                span: pos_to_span(pos),
                related: None,
            },
            pos,
        )
    }

    pub fn range(message: impl Into<String>, pos: Pos) -> Self {
        Self::new(
            VerifyError::Range {
                message: message.into(),
                span: pos_to_span(pos),
            },
            pos,
        )
    }

    pub fn perspective(message: impl Into<String>, pos: Pos) -> Self {
        Self::new(
            VerifyError::InvalidPerspectiveTransition {
                message: message.into(),
                span: pos_to_span(pos),
            },
            pos,
        )
    }

    pub fn malformed(message: impl Into<String>, pos: Pos) -> Self {
        Self::new(
            VerifyError::MalformedStream {
                message: message.into(),
                span: pos_to_span(pos),
            },
            pos,
        )
    }

    pub fn exhaustiveness(binding: &str, missing: impl Into<String>, pos: Pos) -> Self {
        Self::new(
            VerifyError::Exhaustiveness {
                binding: binding.to_string(),
                missing: missing.into(),
                span: pos_to_span(pos),
            },
            pos,
        )
    }

    /// Stable machine-readable form.
    pub fn to_record(&self, file: &str) -> DiagnosticRecord {
        use miette::Diagnostic as _;
        DiagnosticRecord {
            severity: self.severity(),
            kind: self.kind(),
            code: self.error.code().map(|c| c.to_string()).unwrap_or_default(),
            file: file.to_string(),
            line: self.pos.line,
            column: self.pos.column(),
            message: self.message(),
            related: self.related.as_ref().map(|r| RelatedRecord {
                line: r.pos.line,
                column: r.pos.column(),
                note: r.note.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedRecord {
    pub line: usize,
    pub column: usize,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub code: String,
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<RelatedRecord>,
}

/// Verification error with attached source code for displaying code snippets
#[derive(Debug)]
pub struct DiagnosticWithSource<'a> {
    pub source: NamedSource<String>,
    pub error: &'a VerifyError,
}

impl std::fmt::Display for DiagnosticWithSource<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for DiagnosticWithSource<'_> {}

impl miette::Diagnostic for DiagnosticWithSource<'_> {
    fn code<'b>(&'b self) -> Option<Box<dyn std::fmt::Display + 'b>> {
        self.error.code()
    }

    fn severity(&self) -> Option<miette::Severity> {
        self.error.severity()
    }

    fn help<'b>(&'b self) -> Option<Box<dyn std::fmt::Display + 'b>> {
        self.error.help()
    }

    fn labels<'b>(&'b self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + 'b>> {
        self.error.labels()
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.source)
    }
}

/// Collects diagnostics for one compilation unit.
#[derive(Debug, Default)]
pub struct Reporter {
    diagnostics: Vec<Diagnostic>,
    warnings_as_errors: bool,
}

impl Reporter {
    pub fn new(warnings_as_errors: bool) -> Self {
        Self {
            diagnostics: Vec::new(),
            warnings_as_errors,
        }
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        log::debug!(
            "{} at {}: {}",
            diagnostic.kind(),
            diagnostic.pos,
            diagnostic.message()
        );
        self.diagnostics.push(diagnostic);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    /// Fatal diagnostics block code generation. Warnings are fatal only when
    /// configured so; nothing is ever downgraded.
    pub fn is_fatal(&self, diagnostic: &Diagnostic) -> bool {
        is_fatal(diagnostic, self.warnings_as_errors)
    }

    pub fn fatal_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| self.is_fatal(d)).count()
    }

    pub fn has_fatal(&self) -> bool {
        self.fatal_count() > 0
    }
}

pub fn is_fatal(diagnostic: &Diagnostic, warnings_as_errors: bool) -> bool {
    diagnostic.severity() == Severity::Error || warnings_as_errors
}

/// Renders diagnostics with source snippets. At most `limit` are shown; a
/// limit of zero shows all of them.
pub fn render_human(
    diagnostics: &[Diagnostic],
    name: &str,
    code: &str,
    limit: usize,
    color: bool,
) -> String {
    let theme = if color {
        GraphicalTheme::unicode()
    } else {
        GraphicalTheme::unicode_nocolor()
    };
    let handler = GraphicalReportHandler::new_themed(theme);
    let shown = if limit == 0 {
        diagnostics.len()
    } else {
        limit.min(diagnostics.len())
    };
    let mut out = String::new();
    for diagnostic in &diagnostics[..shown] {
        let with_source = DiagnosticWithSource {
            source: NamedSource::new(name, code.to_string()),
            error: &diagnostic.error,
        };
        if handler.render_report(&mut out, &with_source).is_err() {
            out.push_str(&format!("{}: {}\n", diagnostic.pos, diagnostic.message()));
        }
    }
    if shown < diagnostics.len() {
        out.push_str(&format!(
            "... and {} more diagnostic(s) not shown\n",
            diagnostics.len() - shown
        ));
    }
    out
}

/// One JSON object per line.
pub fn render_json(diagnostics: &[Diagnostic], name: &str) -> Result<String, serde_json::Error> {
    let mut out = String::new();
    for diagnostic in diagnostics {
        out.push_str(&serde_json::to_string(&diagnostic.to_record(name))?);
        out.push('\n');
    }
    Ok(out)
}
