//! Error types and diagnostics for the stack verifier
//!
//! Two families live here. [`ParseError`] covers the textual operation stream;
//! [`VerifyError`] is the compile-time taxonomy reported by the verifier.
//! Both are `miette` diagnostics with stable codes, so they render with source
//! snippets in the terminal and serialize to stable kinds in JSON.

use crate::token::Pos;
use miette::{Diagnostic, NamedSource, SourceSpan};
use strum_macros::{Display, EnumIter, IntoStaticStr};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convert a `Pos` to a `SourceSpan` for use with miette diagnostics
///
/// # Example
///
/// ```rust
/// use stack_check::error::pos_to_span;
/// use stack_check::token::Pos;
///
/// let pos = Pos {
///     line: 5,
///     at: 10,
///     pos: 100,
///     len: 5,
/// };
/// let span = pos_to_span(pos);
/// assert_eq!(span.offset(), 100);
/// assert_eq!(span.len(), 5);
/// ```
pub fn pos_to_span(pos: Pos) -> SourceSpan {
    SourceSpan::new(pos.pos.into(), pos.len)
}

/// Alias for Result type with stack verifier errors
pub type StackResult<T> = std::result::Result<T, StackError>;

/// Errors that stop a command outright.
///
/// Verification findings are never reported through this type; they are
/// collected as [`crate::diagnostics::Diagnostic`]s instead.
#[derive(Error, Debug)]
pub enum StackError {
    /// The textual stream could not be parsed
    #[error(transparent)]
    Parse(#[from] ParseErrors),

    /// Code generation refused because fatal diagnostics exist
    #[error("code generation blocked by {count} fatal diagnostic(s)")]
    Blocked { count: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Msg(String),
}

// Manual implementation of Diagnostic for StackError to properly delegate
impl Diagnostic for StackError {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        match self {
            StackError::Parse(e) => e.code(),
            StackError::Blocked { .. } => Some(Box::new("stack_codegen_E0701")),
            _ => None,
        }
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        match self {
            StackError::Parse(e) => e.help(),
            StackError::Blocked { .. } => Some(Box::new("fix the reported errors and run again")),
            _ => None,
        }
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        match self {
            StackError::Parse(e) => e.source_code(),
            _ => None,
        }
    }

    fn related<'a>(&'a self) -> Option<Box<dyn Iterator<Item = &'a dyn Diagnostic> + 'a>> {
        match self {
            StackError::Parse(e) => e.related(),
            _ => None,
        }
    }
}

impl From<String> for StackError {
    fn from(msg: String) -> Self {
        StackError::Msg(msg)
    }
}

impl<'a> From<&'a str> for StackError {
    fn from(msg: &'a str) -> Self {
        StackError::Msg(msg.to_string())
    }
}

// ============================================================================
// Syntax Errors (E0001-E0099)
// ============================================================================

/// Errors in the textual operation stream
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("unexpected token")]
    #[diagnostic(
        code(stack_syntax_E0001),
        help("Expected {expected}, but found {found}")
    )]
    UnexpectedToken {
        expected: String,
        found: String,
        #[label("unexpected token")]
        span: SourceSpan,
    },

    #[error("unterminated string literal")]
    #[diagnostic(
        code(stack_syntax_E0002),
        help("Add a closing quote (\") to end the string")
    )]
    UnterminatedString {
        #[label("string starts here")]
        span: SourceSpan,
    },

    #[error("invalid escape sequence")]
    #[diagnostic(
        code(stack_syntax_E0003),
        help("Use \\n, \\t, \\\\, \\\" or \\0")
    )]
    InvalidEscapeSequence {
        sequence: String,
        #[label("invalid escape sequence")]
        span: SourceSpan,
    },

    #[error("invalid literal")]
    #[diagnostic(code(stack_syntax_E0004), help("{message}"))]
    InvalidLiteral {
        message: String,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("unknown keyword '{word}'")]
    #[diagnostic(code(stack_syntax_E0005), help("Expected one of: {expected}"))]
    UnknownKeyword {
        word: String,
        expected: String,
        #[label("not a known {context}")]
        span: SourceSpan,
        context: String,
    },

    #[error("unexpected character")]
    #[diagnostic(code(stack_syntax_E0006))]
    UnexpectedChar {
        ch: char,
        #[label("'{ch}' is not valid here")]
        span: SourceSpan,
    },
}

/// Every parse error of one source, rendered against that source.
#[derive(Error, Diagnostic, Debug)]
#[error("failed to parse {name}: {count} error(s)", count = .errors.len())]
#[diagnostic(code(stack_syntax_E0000))]
pub struct ParseErrors {
    pub name: String,
    #[source_code]
    pub source_code: NamedSource<String>,
    #[related]
    pub errors: Vec<ParseError>,
}

impl ParseErrors {
    pub fn new(name: impl Into<String>, code: impl Into<String>, errors: Vec<ParseError>) -> Self {
        let name = name.into();
        Self {
            source_code: NamedSource::new(name.clone(), code.into()),
            name,
            errors,
        }
    }
}

// ============================================================================
// Verification Errors (E0101-E0699)
// ============================================================================

/// Stable kind of a verifier finding.
///
/// The names are part of the diagnostic text contract.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr, Serialize, Deserialize,
)]
pub enum DiagnosticKind {
    DuplicateDeclarationError,
    UnknownContainerError,
    TypeMismatchError,
    UnsupportedConversionError,
    OwnershipViolationError,
    BorrowConflictError,
    LifetimeViolationError,
    RangeError,
    InvalidPerspectiveTransitionError,
    MalformedStreamError,
    ExhaustivenessWarning,
}

impl DiagnosticKind {
    pub fn is_warning(&self) -> bool {
        matches!(self, DiagnosticKind::ExhaustivenessWarning)
    }
}

/// Compile-time findings of the verifier
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum VerifyError {
    #[error("duplicate declaration of '{name}'")]
    #[diagnostic(
        code(stack_decl_E0101),
        help("'{name}' is already declared in this scope; use a nested scope to shadow it")
    )]
    DuplicateDeclaration {
        name: String,
        #[label("declared again here")]
        span: SourceSpan,
        #[label("first declared here")]
        related: Option<SourceSpan>,
    },

    #[error("{step}unknown container or binding '{name}'")]
    #[diagnostic(code(stack_decl_E0102), help("'{name}' is not declared in any enclosing scope"))]
    UnknownContainer {
        /// Transfer step prefix, empty outside transfers.
        step: String,
        name: String,
        #[label("'{name}' not found")]
        span: SourceSpan,
    },

    #[error("type mismatch: {message}")]
    #[diagnostic(
        code(stack_type_E0201),
        help("Expected type '{expected}', but found '{found}'")
    )]
    TypeMismatch {
        expected: String,
        found: String,
        message: String,
        #[label("this has type '{found}'")]
        span: SourceSpan,
    },

    #[error("{step}unsupported conversion '{kind}' from {from} to {to}")]
    #[diagnostic(
        code(stack_type_E0202),
        help("{from} converts only to: {reachable}")
    )]
    UnsupportedConversion {
        step: String,
        kind: String,
        from: String,
        to: String,
        reachable: String,
        #[label("cannot convert {from} to {to}")]
        span: SourceSpan,
    },

    #[error("ownership violation: {message}")]
    #[diagnostic(code(stack_own_E0301))]
    OwnershipViolation {
        message: String,
        #[label("{message}")]
        span: SourceSpan,
        #[label("ownership changed here")]
        related: Option<SourceSpan>,
    },

    #[error("borrow conflict: {message}")]
    #[diagnostic(
        code(stack_borrow_E0401),
        help("A mutable borrow must not overlap any other borrow of the same container")
    )]
    BorrowConflict {
        message: String,
        #[label("{message}")]
        span: SourceSpan,
        #[label("conflicting borrow created here")]
        related: Option<SourceSpan>,
    },

    #[error("lifetime violation: {message}")]
    #[diagnostic(
        code(stack_borrow_E0402),
        help("A reference must not outlive the scope of the container it points into")
    )]
    LifetimeViolation {
        message: String,
        #[label("{message}")]
        span: SourceSpan,
        #[label("borrowed here")]
        related: Option<SourceSpan>,
    },

    #[error("range error: {message}")]
    #[diagnostic(code(stack_borrow_E0403))]
    Range {
        message: String,
        #[label("{message}")]
        span: SourceSpan,
    },

    #[error("invalid perspective transition: {message}")]
    #[diagnostic(code(stack_persp_E0501))]
    InvalidPerspectiveTransition {
        message: String,
        #[label("{message}")]
        span: SourceSpan,
    },

    #[error("malformed operation stream: {message}")]
    #[diagnostic(code(stack_stream_E0601))]
    MalformedStream {
        message: String,
        #[label("{message}")]
        span: SourceSpan,
    },

    #[error("match on '{binding}' does not cover {missing}")]
    #[diagnostic(
        code(stack_persp_W0502),
        severity(Warning),
        help("add the missing perspectives or a default arm '_'")
    )]
    Exhaustiveness {
        binding: String,
        missing: String,
        #[label("non-exhaustive match")]
        span: SourceSpan,
    },
}

impl VerifyError {
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            VerifyError::DuplicateDeclaration { .. } => DiagnosticKind::DuplicateDeclarationError,
            VerifyError::UnknownContainer { .. } => DiagnosticKind::UnknownContainerError,
            VerifyError::TypeMismatch { .. } => DiagnosticKind::TypeMismatchError,
            VerifyError::UnsupportedConversion { .. } => DiagnosticKind::UnsupportedConversionError,
            VerifyError::OwnershipViolation { .. } => DiagnosticKind::OwnershipViolationError,
            VerifyError::BorrowConflict { .. } => DiagnosticKind::BorrowConflictError,
            VerifyError::LifetimeViolation { .. } => DiagnosticKind::LifetimeViolationError,
            VerifyError::Range { .. } => DiagnosticKind::RangeError,
            VerifyError::InvalidPerspectiveTransition { .. } => {
                DiagnosticKind::InvalidPerspectiveTransitionError
            }
            VerifyError::MalformedStream { .. } => DiagnosticKind::MalformedStreamError,
            VerifyError::Exhaustiveness { .. } => DiagnosticKind::ExhaustivenessWarning,
        }
    }

    /// Attaches the location of the prior operation this error is about.
    /// Variants without a related label ignore it.
    pub fn set_related(&mut self, span: SourceSpan) {
        match self {
            VerifyError::DuplicateDeclaration { related, .. }
            | VerifyError::OwnershipViolation { related, .. }
            | VerifyError::BorrowConflict { related, .. }
            | VerifyError::LifetimeViolation { related, .. } => *related = Some(span),
            _ => {}
        }
    }

    /// Prepends `prefix` to the free-form message of variants that carry one.
    pub fn prefix_message(&mut self, prefix: &str) {
        match self {
            VerifyError::TypeMismatch { message, .. }
            | VerifyError::OwnershipViolation { message, .. }
            | VerifyError::BorrowConflict { message, .. }
            | VerifyError::LifetimeViolation { message, .. }
            | VerifyError::Range { message, .. }
            | VerifyError::InvalidPerspectiveTransition { message, .. } => {
                message.insert_str(0, prefix)
            }
            VerifyError::UnknownContainer { step, .. } | VerifyError::UnsupportedConversion { step, .. } => {
                step.insert_str(0, prefix)
            }
            VerifyError::DuplicateDeclaration { .. }
            | VerifyError::MalformedStream { .. }
            | VerifyError::Exhaustiveness { .. } => {}
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> SourceSpan {
        pos_to_span(Pos {
            line: 1,
            at: 0,
            pos: 4,
            len: 2,
        })
    }

    #[test]
    fn test_kind_names_are_stable() {
        let err = VerifyError::Range {
            message: "hi 5 is out of bounds".into(),
            span: span(),
        };
        assert_eq!(err.kind().to_string(), "RangeError");
        assert_eq!(
            DiagnosticKind::InvalidPerspectiveTransitionError.to_string(),
            "InvalidPerspectiveTransitionError"
        );
    }

    #[test]
    fn test_error_codes() {
        let err = VerifyError::BorrowConflict {
            message: "x".into(),
            span: span(),
            related: None,
        };
        assert_eq!(err.code().unwrap().to_string(), "stack_borrow_E0401");
        let warn = VerifyError::Exhaustiveness {
            binding: "x".into(),
            missing: "hashed".into(),
            span: span(),
        };
        assert_eq!(warn.severity(), Some(miette::Severity::Warning));
        assert!(warn.kind().is_warning());
    }

    #[test]
    fn test_set_related_only_where_labelled() {
        let mut err = VerifyError::BorrowConflict {
            message: "x".into(),
            span: span(),
            related: None,
        };
        err.set_related(SourceSpan::new(0.into(), 1));
        assert!(matches!(err, VerifyError::BorrowConflict { related: Some(_), .. }));

        let mut err = VerifyError::Range {
            message: "x".into(),
            span: span(),
        };
        err.set_related(SourceSpan::new(0.into(), 1));
        assert!(matches!(err, VerifyError::Range { .. }));
    }
}
