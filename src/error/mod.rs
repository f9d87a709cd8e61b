//! Error types for the DOM facade and the parsing engine beneath it.
//!
//! [`DomError`] is what every facade operation returns. Parser failures keep
//! their own structured [`ParseError`] (with source location and collected
//! diagnostics) and are wrapped in [`DomError::Parse`] when they cross into
//! the facade.

use std::fmt;

use thiserror::Error;

use crate::serial::SerializeError;
use crate::tree::TreeError;
use crate::xpath::XPathError;

/// Result alias used throughout the facade.
pub type Result<T, E = DomError> = std::result::Result<T, E>;

/// Errors surfaced by DOM and XPath facade operations.
#[derive(Debug, Clone, Error)]
pub enum DomError {
    /// The engine reported a node type tag outside the known enumeration.
    #[error("unknown node type: {0}")]
    UnknownNodeType(i32),

    /// Malformed input to a mutation or accessor, or an accessor that does
    /// not match the value's type.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A lookup that requires a result found nothing.
    #[error("node not found")]
    NodeNotFound,

    /// A name was rejected by the XML naming rules.
    #[error("invalid node name: {0:?}")]
    InvalidNodeName(String),

    /// The XPath expression could not be compiled.
    #[error("xpath syntax error: {0}")]
    XPathSyntax(String),

    /// The XPath expression compiled but failed while evaluating.
    #[error("xpath evaluation error: {0}")]
    XPathEval(String),

    /// Serialization or canonicalization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The owning document (or the context/result object) was already released.
    #[error("use after free: the owning object has been released")]
    UseAfterFree,

    /// The parser rejected the input.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl DomError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

impl From<TreeError> for DomError {
    fn from(err: TreeError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<SerializeError> for DomError {
    fn from(err: SerializeError) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<XPathError> for DomError {
    fn from(err: XPathError) -> Self {
        if err.is_syntax() {
            Self::XPathSyntax(err.to_string())
        } else {
            Self::XPathEval(err.to_string())
        }
    }
}

/// Severity level for a parse diagnostic, matching libxml2's `xmlErrorLevel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorSeverity {
    /// A non-fatal issue that doesn't prevent parsing.
    Warning,
    /// A recoverable error; the document is malformed but a tree was built.
    Error,
    /// An unrecoverable error; parsing stopped.
    Fatal,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Fatal => write!(f, "fatal error"),
        }
    }
}

/// Source location within an XML document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number (in characters, not bytes).
    pub column: u32,
    /// 0-based byte offset from the start of the input.
    pub byte_offset: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A single diagnostic emitted during parsing.
#[derive(Debug, Clone)]
pub struct ParseDiagnostic {
    /// The severity of this diagnostic.
    pub severity: ErrorSeverity,
    /// Human-readable message.
    pub message: String,
    /// Where in the source this was reported.
    pub location: SourceLocation,
}

impl fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} at {}",
            self.severity, self.message, self.location
        )
    }
}

/// The error type returned when XML parsing fails.
#[derive(Debug, Clone)]
pub struct ParseError {
    /// The primary error message.
    pub message: String,
    /// Where in the source the fatal error occurred.
    pub location: SourceLocation,
    /// Diagnostics collected before the fatal error.
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl ParseError {
    /// Creates an error with no location information.
    pub(crate) fn bare(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: SourceLocation::default(),
            diagnostics: Vec::new(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error at {}: {}", self.location, self.message)
    }
}

impl std::error::Error for ParseError {}
