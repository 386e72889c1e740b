//! Errors reported while compiling annotations and hydrating schemas.

use thiserror::Error;

use crate::coerce::CoerceError;
use crate::hydrate::Kind;

/// Boxed error returned by registered transforms and constructors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A failure attached to one field or element of a hydration run.
///
/// `scrape` returns these in traversal order. Only `InvalidTarget` and `Read`
/// abort a run, and they are always the single entry of the list.
#[derive(Debug, Error)]
pub enum Error {
    /// The top-level target is not a composite schema
    #[error("invalid target: {type_name} is not a composite schema")]
    InvalidTarget { type_name: &'static str },

    /// The document source could not be read
    #[error("failed to read document: {0}")]
    Read(#[from] std::io::Error),

    /// A field annotation failed to compile
    #[error("field {field:?}: {source}")]
    Compile {
        field: &'static str,
        #[source]
        source: CompileError,
    },

    #[error("{selector:?} did not match")]
    SelectorUnmatched { selector: String },

    #[error("{selector}: attribute not found: attribute({name})")]
    AttributeNotFound { selector: String, name: String },

    /// A transform in the pipeline failed
    #[error("{selector}: (pipeline fail) {function}: {message}")]
    Pipeline {
        selector: String,
        function: String,
        message: String,
    },

    /// A terminal or type-directed constructor failed
    #[error("{selector}: (constructor fail) {function}: {message}")]
    Constructor {
        selector: String,
        function: String,
        message: String,
    },

    #[error("{selector}: {source}")]
    TypeMismatch {
        selector: String,
        #[source]
        source: CoerceError,
    },

    #[error("unsupported kind {kind} for {type_name}")]
    UnsupportedKind { kind: Kind, type_name: &'static str },

    /// An annotated field that is not `pub`
    #[error("private field with annotation: {field:?}")]
    Visibility { field: &'static str },
}

/// Errors produced by the annotation compiler.
///
/// An empty annotation is not an error: `compile` returns `Ok(None)` for it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("malformed annotation {annotation:?}: {reason}")]
    Syntax { annotation: String, reason: String },

    #[error("unknown accessor: {segment:?}")]
    UnknownAccessor { segment: String },

    #[error("{name:?} is not a registered function")]
    UnresolvedFunction { name: String },

    #[error("invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// A step follows the terminal constructor
    #[error("{name:?} follows terminal {terminal:?}; a terminal must be the last step")]
    MisplacedTerminal { name: String, terminal: String },
}

impl Error {
    /// The selector the error is attached to, if any.
    pub fn selector(&self) -> Option<&str> {
        match self {
            Error::SelectorUnmatched { selector }
            | Error::AttributeNotFound { selector, .. }
            | Error::Pipeline { selector, .. }
            | Error::Constructor { selector, .. }
            | Error::TypeMismatch { selector, .. } => Some(selector),
            _ => None,
        }
    }
}
