//! # columnar-query
//!
//! Query execution and result streaming for the Columnar analytics service.
//!
//! This crate owns everything between a statement and its rows: merging
//! option layers, translating them into a request payload, classifying
//! transport failures, and consuming the streamed rows either by pulling them
//! one at a time or by pushing them through a cancellable handler. The
//! network itself sits behind the [`Transport`] trait; `columnar-cluster`
//! provides the HTTPS implementation.
//!
//! ## Pulling rows
//!
//! ```rust,no_run
//! use columnar_query::{ColumnarResult, QueryClient, QueryOptions, RequestContext};
//!
//! async fn run(client: &QueryClient) -> ColumnarResult<()> {
//!     let ctx = RequestContext::new();
//!     let mut result = client
//!         .query(&ctx, "SELECT 1=1", &[QueryOptions::new().read_only(true)])
//!         .await?;
//!
//!     while let Some(row) = result.next_row().await {
//!         let value: serde_json::Value = row.content_as()?;
//!         println!("{value}");
//!     }
//!     result.err()?;
//!
//!     let meta = result.metadata()?;
//!     println!("request {}", meta.request_id);
//!     Ok(())
//! }
//! ```
//!
//! ## Pushing rows
//!
//! [`iterate_query_result`] runs a handler per row and stops early, without
//! leaving work behind, when the handler fails or the [`RequestContext`] is
//! cancelled. [`buffer_query_result`] and [`buffer_query_result_as`] collect
//! everything into memory instead.
//!
//! ## Errors
//!
//! Every failure is a [`ColumnarError`]; use [`ColumnarError::kind`] or the
//! `is_*` predicates to classify it.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

mod buffer;
mod client;
mod context;
mod decode;
pub mod duration;
mod error;
mod iterate;
pub mod logging;
mod metadata;
mod options;
mod reader;
mod request;
mod result;
mod translate;
mod transport;

#[cfg(any(test, feature = "mock"))]
#[cfg_attr(docsrs, doc(cfg(feature = "mock")))]
pub mod mock;

pub use buffer::{buffer_query_result, buffer_query_result_as};
pub use client::QueryClient;
pub use context::{ContextError, RequestContext};
pub use decode::{DecodeError, Decoder, JsonDecoder};
pub use error::{
    ColumnarError, ColumnarResult, ErrorDescriptor, ErrorKind, QueryError, ServiceError,
};
pub use iterate::iterate_query_result;
pub use logging::{LogLevel, Logger, NoopLogger, TracingLogger};
pub use metadata::{QueryMetadata, QueryMetrics, QueryWarning};
pub use options::{QueryOptions, ScanConsistency};
pub use reader::{CloseHandle, RowReader};
pub use request::{
    DEADLINE_SAFETY_MARGIN, HIGH_PRIORITY, Namespace, QueryRequest, translate_request,
};
pub use result::{QueryResult, QueryResultRow};
pub use translate::{
    CODE_INVALID_CREDENTIAL, CODE_TIMEOUT, NOT_SENT_CANCELLED, NOT_SENT_DEADLINE,
    NOT_SENT_TIMEOUT, translate_error,
};
pub use transport::{FailureCause, RequestFailure, RowStream, Transport, TransportError};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::buffer::{buffer_query_result, buffer_query_result_as};
    pub use crate::context::RequestContext;
    pub use crate::error::{ColumnarError, ColumnarResult, ErrorKind};
    pub use crate::iterate::iterate_query_result;
    pub use crate::options::{QueryOptions, ScanConsistency};
    pub use crate::result::{QueryResult, QueryResultRow};
}
