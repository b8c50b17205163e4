//! The boundary between the query client and the network.
//!
//! A [`Transport`] executes one translated [`QueryRequest`] and hands back a
//! [`RowStream`] that yields raw row bytes followed by the trailing
//! [`QueryMetadata`]. Failures are reported as [`TransportError`]s and
//! classified by the error translator before they reach the caller.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::context::RequestContext;
use crate::error::ErrorDescriptor;
use crate::metadata::QueryMetadata;
use crate::request::QueryRequest;

/// Executes translated query requests against the service.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Send the request and return a stream over its rows.
    ///
    /// The returned stream has already consumed everything before the first
    /// row, so request-level failures surface here rather than from the stream.
    async fn execute(
        &self,
        ctx: &RequestContext,
        request: QueryRequest,
    ) -> Result<Box<dyn RowStream>, TransportError>;

    /// Release pooled resources. Further calls to `execute` may fail.
    async fn close(&self) -> Result<(), TransportError>;
}

/// A pull-based source of raw rows for one in-flight query.
#[async_trait]
pub trait RowStream: Send {
    /// The next row, or `None` once the rows are exhausted.
    async fn next_row(&mut self) -> Result<Option<Bytes>, TransportError>;

    /// The trailing metadata. Only valid once `next_row` returned `None`.
    fn metadata(&self) -> Result<QueryMetadata, TransportError>;

    /// Abort the stream and release its connection. Idempotent.
    fn close(&mut self);
}

/// What went wrong underneath a [`RequestFailure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// The service rejected the credentials.
    Authentication,
    /// A client or server timeout fired.
    Timeout,
    /// The caller cancelled.
    Cancelled,
    /// The caller's deadline passed.
    DeadlineExceeded,
    /// Anything else, described by its text.
    Other(String),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => f.write_str("authentication failure"),
            Self::Timeout => f.write_str("timeout"),
            Self::Cancelled => f.write_str("context canceled"),
            Self::DeadlineExceeded => f.write_str("context deadline exceeded"),
            Self::Other(text) => f.write_str(text),
        }
    }
}

/// A failure observed while executing a request, with everything needed to classify it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFailure {
    /// The underlying cause.
    pub cause: FailureCause,
    /// The statement being executed.
    pub statement: String,
    /// The endpoint the request targeted.
    pub endpoint: String,
    /// HTTP status code, or 0 when no response arrived.
    pub status_code: u16,
    /// Error descriptors reported by the server.
    pub errors: Vec<ErrorDescriptor>,
    /// Whether the request was abandoned before being sent.
    pub was_not_dispatched: bool,
}

impl RequestFailure {
    /// Create a failure with the given cause.
    pub fn new(
        cause: FailureCause,
        statement: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            cause,
            statement: statement.into(),
            endpoint: endpoint.into(),
            status_code: 0,
            errors: Vec::new(),
            was_not_dispatched: false,
        }
    }

    /// Set the HTTP status code.
    #[must_use]
    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    /// Set the server error descriptors.
    #[must_use]
    pub fn with_errors(mut self, errors: Vec<ErrorDescriptor>) -> Self {
        self.errors = errors;
        self
    }

    /// Mark the request as never sent.
    #[must_use]
    pub fn not_dispatched(mut self) -> Self {
        self.was_not_dispatched = true;
        self
    }
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (endpoint {}", self.cause, self.endpoint)?;
        if self.status_code != 0 {
            write!(f, ", status {}", self.status_code)?;
        }
        f.write_str(")")
    }
}

impl StdError for RequestFailure {}

/// Errors reported by a [`Transport`] or [`RowStream`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// A failure carrying request diagnostics.
    #[error(transparent)]
    Request(RequestFailure),

    /// A failure the transport could not describe further.
    #[error(transparent)]
    Other(Arc<dyn StdError + Send + Sync>),

    /// The transport was closed and no longer sends requests.
    #[error("transport is closed")]
    Closed,
}

impl TransportError {
    /// Wrap an arbitrary error.
    pub fn other(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Other(Arc::from(err.into()))
    }
}

impl From<RequestFailure> for TransportError {
    fn from(failure: RequestFailure) -> Self {
        Self::Request(failure)
    }
}
