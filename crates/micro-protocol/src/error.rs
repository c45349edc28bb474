//! Call error kinds and their default envelope codes.

use serde::Serialize;
use serde_json::{Value, json};

/// What went wrong with a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// A path segment failed the identifier rule.
    InvalidRequest,
    /// No function registered under the requested triple.
    NotFound,
    /// Restricted function called without the restriction token.
    Unauthorized,
    /// A call middleware refused the call.
    Forbidden,
    /// Payload rejected by a schema check.
    ValidationFailed,
    /// Raised by the invoked function itself.
    Domain,
}

impl ErrorKind {
    /// Code reported in the failure envelope unless the error overrides it.
    pub fn default_code(&self) -> i32 {
        match self {
            Self::InvalidRequest => 400,
            Self::NotFound => 404,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::ValidationFailed => 400,
            Self::Domain => 500,
        }
    }
}

/// Error produced anywhere on the call path. Adapters are the only place
/// that turn it into a failure envelope.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct CallError {
    pub kind: ErrorKind,
    pub code: i32,
    pub message: String,
    pub details: Option<Value>,
}

impl CallError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: kind.default_code(),
            message: message.into(),
            details: None,
        }
    }

    pub fn invalid_request() -> Self {
        Self::new(ErrorKind::InvalidRequest, "Invalid request")
    }

    pub fn not_found(path: &str) -> Self {
        Self::new(ErrorKind::NotFound, format!("Function not found: {path}"))
    }

    pub fn unauthorized() -> Self {
        Self::new(ErrorKind::Unauthorized, "Invalid token")
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    /// Schema rejection with a list of structured details.
    pub fn validation(details: Vec<Value>) -> Self {
        Self::new(ErrorKind::ValidationFailed, "Bad request").with_details(Value::Array(details))
    }

    /// Error raised by a handler. Code defaults to 500.
    pub fn domain(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Domain, message)
    }

    pub fn with_code(mut self, code: i32) -> Self {
        self.code = code;
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Wrap a deserialization failure of the payload's `data`.
    pub fn from_schema(err: &serde_json::Error) -> Self {
        Self::validation(vec![json!({
            "message": err.to_string(),
            "line": err.line(),
            "column": err.column(),
        })])
    }
}

/// The transport side of a native context has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("transport context closed")]
pub struct ContextClosed;
