//! Error types for Columnar query operations.
//!
//! Every failure surfaced by this crate is a [`ColumnarError`]. Errors that
//! originate at the service boundary carry a [`ServiceError`] context with the
//! statement, endpoint, HTTP status code and any server error descriptors, and
//! render as a short classification followed by that context as JSON:
//!
//! ```text
//! timeout error | {"statement":"SELECT 1","message":"...","endpoint":"db:18095"}
//! ```
//!
//! Callers test the classification with [`ColumnarError::kind`] or one of the
//! `is_*` predicates rather than matching on the concrete variant:
//!
//! ```rust
//! use columnar_query::{ColumnarError, ErrorKind};
//!
//! let err = ColumnarError::invalid_argument("scan_consistency", "unknown enumerator");
//! assert_eq!(err.kind(), ErrorKind::InvalidArgument);
//! assert!(err.is_invalid_argument());
//! ```

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::context::ContextError;
use crate::transport::TransportError;

/// Result type for Columnar operations.
pub type ColumnarResult<T> = Result<T, ColumnarError>;

/// The canonical classification every [`ColumnarError`] resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Base kind for failures not captured by a more specific kind.
    Columnar,
    /// The service rejected the supplied credentials.
    InvalidCredential,
    /// A client-side or server-side timeout was reached.
    Timeout,
    /// The server reported an error while executing the statement.
    Query,
    /// Malformed caller input; never reaches the network.
    InvalidArgument,
    /// An entity was used after it was released.
    Closed,
    /// A row could not be decoded.
    Unmarshal,
    /// The caller cancelled the request.
    Cancelled,
    /// The caller's deadline passed.
    DeadlineExceeded,
}

impl ErrorKind {
    /// Short, stable text for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Columnar => "columnar error",
            Self::InvalidCredential => "invalid credential",
            Self::Timeout => "timeout error",
            Self::Query => "query error",
            Self::InvalidArgument => "invalid argument",
            Self::Closed => "closed",
            Self::Unmarshal => "unmarshalling error",
            Self::Cancelled => "request cancelled",
            Self::DeadlineExceeded => "deadline exceeded",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One error entry reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDescriptor {
    /// Numeric server error code.
    pub code: u32,
    /// Server error message.
    #[serde(rename = "msg")]
    pub message: String,
}

impl ErrorDescriptor {
    /// Create a new descriptor.
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Diagnostic context for an error that crossed the service boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    kind: ErrorKind,
    cause: Option<String>,
    message: String,
    errors: Vec<ErrorDescriptor>,
    statement: String,
    endpoint: String,
    status_code: u16,
}

#[derive(Serialize)]
struct ContextBlob<'a> {
    #[serde(skip_serializing_if = "is_blank")]
    statement: &'a str,
    #[serde(skip_serializing_if = "has_no_errors")]
    errors: &'a [ErrorDescriptor],
    #[serde(skip_serializing_if = "is_blank")]
    message: &'a str,
    #[serde(skip_serializing_if = "is_blank")]
    endpoint: &'a str,
    #[serde(skip_serializing_if = "is_zero")]
    status_code: u16,
}

fn is_blank(text: &&str) -> bool {
    text.is_empty()
}

fn has_no_errors(errors: &&[ErrorDescriptor]) -> bool {
    errors.is_empty()
}

fn is_zero(code: &u16) -> bool {
    *code == 0
}

impl ServiceError {
    /// Create a context of the given kind.
    pub fn new(
        kind: ErrorKind,
        statement: impl Into<String>,
        endpoint: impl Into<String>,
        status_code: u16,
    ) -> Self {
        Self {
            kind,
            cause: None,
            message: String::new(),
            errors: Vec::new(),
            statement: statement.into(),
            endpoint: endpoint.into(),
            status_code,
        }
    }

    /// Attach a human-readable message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Attach the server error descriptors.
    #[must_use]
    pub fn with_errors(mut self, errors: Vec<ErrorDescriptor>) -> Self {
        self.errors = errors;
        self
    }

    /// Replace the classification text with the raw text of the underlying cause.
    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// The classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The raw text of the underlying cause, if any.
    #[must_use]
    pub fn cause(&self) -> Option<&str> {
        self.cause.as_deref()
    }

    /// The human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The server error descriptors.
    #[must_use]
    pub fn errors(&self) -> &[ErrorDescriptor] {
        &self.errors
    }

    /// The statement that was executing.
    #[must_use]
    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// The endpoint the request was (or would have been) sent to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The HTTP status code, or 0 when no response was received.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    fn context_json(&self) -> String {
        let blob = ContextBlob {
            statement: &self.statement,
            errors: &self.errors,
            message: &self.message,
            endpoint: &self.endpoint,
            status_code: self.status_code,
        };
        serde_json::to_string(&blob).unwrap_or_default()
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cause = self.cause.as_deref().unwrap_or_else(|| self.kind.as_str());
        write!(f, "{cause} | {}", self.context_json())
    }
}

impl StdError for ServiceError {}

/// A statement error reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryError {
    code: u32,
    message: String,
    context: ServiceError,
}

impl QueryError {
    /// Create a query error from the first server descriptor.
    pub fn new(
        statement: impl Into<String>,
        endpoint: impl Into<String>,
        status_code: u16,
        code: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            context: ServiceError::new(ErrorKind::Query, statement, endpoint, status_code),
        }
    }

    /// Attach the full descriptor sequence.
    #[must_use]
    pub fn with_errors(mut self, errors: Vec<ErrorDescriptor>) -> Self {
        self.context = self.context.with_errors(errors);
        self
    }

    /// The server error code.
    #[must_use]
    pub fn code(&self) -> u32 {
        self.code
    }

    /// The server error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The diagnostic context.
    #[must_use]
    pub fn context(&self) -> &ServiceError {
        &self.context
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.context.fmt(f)
    }
}

impl StdError for QueryError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.context)
    }
}

/// Errors that can occur during Columnar operations.
#[derive(Error, Debug, Clone)]
pub enum ColumnarError {
    /// A failure classified at the service boundary.
    #[error("{0}")]
    Service(ServiceError),

    /// A statement error reported by the server.
    #[error("{0}")]
    Query(QueryError),

    /// Malformed caller input.
    #[error("invalid argument {argument} - {reason}")]
    InvalidArgument {
        /// The offending argument.
        argument: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The entity was used after it was released.
    #[error("closed")]
    Closed,

    /// A row could not be decoded.
    #[error("failed to unmarshal - {reason}")]
    Unmarshal {
        /// Decoder error text.
        reason: String,
        /// The decoder's own error.
        #[source]
        source: Arc<dyn StdError + Send + Sync>,
    },

    /// A failure the translator did not recognize, passed through unchanged.
    #[error(transparent)]
    Transport(TransportError),
}

impl ColumnarError {
    /// Create an invalid argument error.
    pub fn invalid_argument(argument: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument: argument.into(),
            reason: reason.into(),
        }
    }

    /// Create an unmarshal error wrapping the decoder's error.
    pub fn unmarshal(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        let source: Arc<dyn StdError + Send + Sync> = Arc::from(source.into());
        Self::Unmarshal {
            reason: source.to_string(),
            source,
        }
    }

    /// The canonical classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Service(ctx) => ctx.kind(),
            Self::Query(_) => ErrorKind::Query,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::Closed => ErrorKind::Closed,
            Self::Unmarshal { .. } => ErrorKind::Unmarshal,
            Self::Transport(TransportError::Closed) => ErrorKind::Closed,
            Self::Transport(_) => ErrorKind::Columnar,
        }
    }

    /// The diagnostic context, when the error crossed the service boundary.
    #[must_use]
    pub fn context(&self) -> Option<&ServiceError> {
        match self {
            Self::Service(ctx) => Some(ctx),
            Self::Query(err) => Some(err.context()),
            _ => None,
        }
    }

    /// The server statement error, if this is one.
    #[must_use]
    pub fn as_query_error(&self) -> Option<&QueryError> {
        match self {
            Self::Query(err) => Some(err),
            _ => None,
        }
    }

    /// Check if error is a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }

    /// Check if error is a rejected credential.
    #[must_use]
    pub fn is_invalid_credential(&self) -> bool {
        self.kind() == ErrorKind::InvalidCredential
    }

    /// Check if error is a server statement error.
    #[must_use]
    pub fn is_query_error(&self) -> bool {
        self.kind() == ErrorKind::Query
    }

    /// Check if error is an invalid argument.
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        self.kind() == ErrorKind::InvalidArgument
    }

    /// Check if error reports use after release.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.kind() == ErrorKind::Closed
    }

    /// Check if error is a decode failure.
    #[must_use]
    pub fn is_unmarshal(&self) -> bool {
        self.kind() == ErrorKind::Unmarshal
    }

    /// Check if the caller cancelled the request.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }

    /// Check if the caller's deadline passed.
    #[must_use]
    pub fn is_deadline_exceeded(&self) -> bool {
        self.kind() == ErrorKind::DeadlineExceeded
    }
}

impl From<ServiceError> for ColumnarError {
    fn from(err: ServiceError) -> Self {
        Self::Service(err)
    }
}

impl From<ContextError> for ColumnarError {
    fn from(err: ContextError) -> Self {
        let kind = match err {
            ContextError::Cancelled => ErrorKind::Cancelled,
            ContextError::DeadlineExceeded => ErrorKind::DeadlineExceeded,
        };
        Self::Service(ServiceError::new(kind, "", "", 0).with_message(err.to_string()))
    }
}

impl From<QueryError> for ColumnarError {
    fn from(err: QueryError) -> Self {
        Self::Query(err)
    }
}
