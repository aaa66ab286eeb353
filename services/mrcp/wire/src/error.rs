//! Wire protocol error types.

use thiserror::Error;

/// A header value rejected by its registered value syntax.
///
/// Carries the header name and the offending text so the session layer can
/// answer with an "illegal value for header" response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("illegal value for header {name}: {value:?} ({reason})")]
pub struct IllegalValue {
    /// Header name as it appeared on the wire
    pub name: String,
    /// Raw header value text
    pub value: String,
    /// Why the value was rejected
    pub reason: String,
}

impl IllegalValue {
    /// Create a new illegal value error
    pub fn new(name: impl Into<String>, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Failure to parse a start-line vocabulary token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Token was empty or whitespace only
    #[error("blank token")]
    Blank,

    /// Token is not part of a closed vocabulary
    #[error("unknown token {0:?}")]
    Unknown(String),
}

/// Wire protocol errors
#[derive(Error, Debug)]
pub enum WireError {
    /// Malformed or length-inconsistent start line, headers, or body.
    /// Fatal to the connection.
    #[error("framing error: {0}")]
    Framing(String),

    /// Header value failed its type-specific syntax
    #[error(transparent)]
    IllegalValue(#[from] IllegalValue),

    /// Encoder was handed a message it cannot serialize faithfully
    #[error("internal error: {0}")]
    Internal(String),

    /// Size limit exceeded
    #[error("size limit exceeded: {0}")]
    Size(usize),
}

impl WireError {
    /// Shorthand for a framing error
    pub fn framing(msg: impl Into<String>) -> Self {
        WireError::Framing(msg.into())
    }

    /// Whether this error must tear down the connection
    pub fn is_fatal(&self) -> bool {
        !matches!(self, WireError::IllegalValue(_))
    }
}
