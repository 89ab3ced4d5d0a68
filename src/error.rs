//! Error types for protocol generation
//!
//! Every failure is terminal for a run. Errors derived from the schema
//! document carry the [`Mark`] of the offending event so the driver can
//! print `input.yaml:LINE:COLUMN: message`.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ImplKind;
use crate::schema::EventKind;

/// Result type for generator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Position of an event within the schema document.
///
/// Lines are 1-based, columns 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Mark {
    pub line: usize,
    pub column: usize,
}

impl Mark {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Coarse failure category, used to pick the process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad command line or configuration
    Usage,
    /// Malformed or invalid schema document
    Data,
    /// Reading or writing files failed
    Io,
}

impl ErrorClass {
    /// sysexits(3) status for this class
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Usage => 64,
            Self::Data => 65,
            Self::Io => 74,
        }
    }
}

/// Generator errors
#[derive(Error, Debug)]
pub enum Error {
    // === Structural ===
    #[error("{mark}: Expected {expected}, found {found}")]
    UnexpectedEvent {
        mark: Mark,
        expected: EventKind,
        found: EventKind,
    },

    #[error("{mark}: {message}")]
    Syntax { mark: Mark, message: String },

    // === Schema ===
    #[error("{mark}: Unknown section type: {name}")]
    UnknownSection { mark: Mark, name: String },

    #[error("{mark}: Section {name} already defined")]
    DuplicateSection { mark: Mark, name: String },

    #[error("{mark}: Missing required section: {name}")]
    MissingSection { mark: Mark, name: String },

    #[error("{mark}: Unknown config option: {name}")]
    UnknownConfigOption { mark: Mark, name: String },

    #[error("{mark}: protocol_name must be configured before {section}")]
    MissingProtocolName { mark: Mark, section: String },

    #[error("{mark}: Element {element} declared before protocol section")]
    ProtocolRequired { mark: Mark, element: String },

    #[error("{mark}: Method {name} already defined")]
    DuplicateMethod { mark: Mark, name: String },

    #[error("{mark}: Method {method} already has an argument named {name}")]
    DuplicateArgument {
        mark: Mark,
        method: String,
        name: String,
    },

    #[error("{mark}: Element {name} already defined")]
    DuplicateElement { mark: Mark, name: String },

    #[error("{mark}: Element name may not equal protocol name ({name})")]
    ElementNamedAfterProtocol { mark: Mark, name: String },

    #[error("{mark}: Element {name} may not extend itself")]
    SelfExtension { mark: Mark, name: String },

    #[error("{mark}: No such element: {name}")]
    NoSuchElement { mark: Mark, name: String },

    #[error("{mark}: `extends` subsection must precede `fields` and `methods`")]
    ExtendsOutOfOrder { mark: Mark },

    #[error("{mark}: Field {name} already defined in this element")]
    DuplicateField { mark: Mark, name: String },

    #[error("{mark}: Unknown implementation type: {name}")]
    UnknownImplementation { mark: Mark, name: String },

    #[error("{mark}: Implementation type {name} is not supported")]
    UnsupportedImplementation { mark: Mark, name: String },

    #[error("{mark}: Method {name} not defined for protocol")]
    UndeclaredMethod { mark: Mark, name: String },

    #[error("{mark}: Unknown element subsection type: {name}")]
    UnknownElementSubsection { mark: Mark, name: String },

    // === Resolution ===
    #[error("{element}.{method}: `{kind}` cannot implement a method returning void")]
    ConstantOnVoid {
        element: String,
        method: String,
        kind: ImplKind,
    },

    // === Synthesis ===
    #[error("Dispatch table for {table} does not match protocol {protocol}")]
    DispatchMismatch { protocol: String, table: String },

    #[error("C identifier {symbol} is used by both {first} and {second}")]
    SymbolCollision {
        symbol: String,
        first: String,
        second: String,
    },

    // === Environment ===
    #[error("{0}")]
    Usage(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wrap an I/O failure together with the path it concerns
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Failure category of this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Usage(_) | Self::Config(_) => ErrorClass::Usage,
            Self::Io { .. } | Self::Json(_) => ErrorClass::Io,
            _ => ErrorClass::Data,
        }
    }

    /// One-line diagnostic for a run over `input`. Positioned errors read
    /// `input:LINE:COLUMN: message`; errors naming their own path are left
    /// as they are.
    pub fn diagnostic(&self, input: &Path) -> String {
        match self {
            Self::Io { .. } => self.to_string(),
            _ if self.mark().is_some() => format!("{}:{}", input.display(), self),
            _ => format!("{}: {}", input.display(), self),
        }
    }

    /// Source position, for errors raised while reading the document
    pub fn mark(&self) -> Option<Mark> {
        match self {
            Self::UnexpectedEvent { mark, .. }
            | Self::Syntax { mark, .. }
            | Self::UnknownSection { mark, .. }
            | Self::DuplicateSection { mark, .. }
            | Self::MissingSection { mark, .. }
            | Self::UnknownConfigOption { mark, .. }
            | Self::MissingProtocolName { mark, .. }
            | Self::ProtocolRequired { mark, .. }
            | Self::DuplicateMethod { mark, .. }
            | Self::DuplicateArgument { mark, .. }
            | Self::DuplicateElement { mark, .. }
            | Self::ElementNamedAfterProtocol { mark, .. }
            | Self::SelfExtension { mark, .. }
            | Self::NoSuchElement { mark, .. }
            | Self::ExtendsOutOfOrder { mark }
            | Self::DuplicateField { mark, .. }
            | Self::UnknownImplementation { mark, .. }
            | Self::UnsupportedImplementation { mark, .. }
            | Self::UndeclaredMethod { mark, .. }
            | Self::UnknownElementSubsection { mark, .. } => Some(*mark),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        assert_eq!(ErrorClass::Usage.exit_code(), 64);
        assert_eq!(ErrorClass::Data.exit_code(), 65);
        assert_eq!(ErrorClass::Io.exit_code(), 74);
    }

    #[test]
    fn test_schema_error_display_carries_position() {
        let err = Error::NoSuchElement {
            mark: Mark::new(12, 4),
            name: "Base".to_string(),
        };
        assert_eq!(err.to_string(), "12:4: No such element: Base");
        assert_eq!(err.class(), ErrorClass::Data);
        assert_eq!(err.mark(), Some(Mark::new(12, 4)));
    }

    #[test]
    fn test_io_error_class() {
        let err = Error::io(
            "missing.yaml",
            std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        );
        assert_eq!(err.class(), ErrorClass::Io);
        assert!(err.mark().is_none());
        assert!(err.to_string().starts_with("missing.yaml: "));
    }

    #[test]
    fn test_diagnostic_prefixes_input_once() {
        let input = Path::new("expr.yaml");
        let positioned = Error::NoSuchElement {
            mark: Mark::new(3, 2),
            name: "Base".to_string(),
        };
        assert_eq!(positioned.diagnostic(input), "expr.yaml:3:2: No such element: Base");

        let missing = Error::io(
            "expr.yaml",
            std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
        );
        assert_eq!(missing.diagnostic(input), "expr.yaml: No such file or directory");

        let usage = Error::Usage("padding_type `double` is not an integer type".to_string());
        assert_eq!(
            usage.diagnostic(input),
            "expr.yaml: padding_type `double` is not an integer type"
        );
    }

    #[test]
    fn test_resolution_error_is_data() {
        let err = Error::ConstantOnVoid {
            element: "Lit".to_string(),
            method: "print".to_string(),
            kind: ImplKind::ReturnsOne,
        };
        assert_eq!(err.class(), ErrorClass::Data);
        assert_eq!(
            err.to_string(),
            "Lit.print: `returns 1` cannot implement a method returning void"
        );
    }
}
