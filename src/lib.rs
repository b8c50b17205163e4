//! # Columnar
//!
//! An async client for the Columnar analytics query service.
//!
//! - Connect with a `couchbases://` connection string, a [`Credential`] and
//!   layered [`ClusterOptions`]
//! - Run statements at cluster level or inside a [`Scope`]
//! - Pull rows one at a time, push them through a cancellable handler, or
//!   buffer them all
//! - Classify every failure through a single [`ColumnarError`] taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use columnar::prelude::*;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct Airline {
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ColumnarError> {
//!     let cluster = Cluster::connect(
//!         "couchbases://cluster.example.com",
//!         Credential::new("user", "pass"),
//!         &[],
//!     )
//!     .await?;
//!
//!     let scope = cluster.database("travel").scope("inventory");
//!     let result = scope
//!         .execute_query(
//!             &RequestContext::new(),
//!             "SELECT a.name FROM airline a WHERE a.country = $country",
//!             &[QueryOptions::new().named_parameter("country", "France")],
//!         )
//!         .await?;
//!
//!     let (airlines, meta) = buffer_query_result_as::<Airline>(result).await?;
//!     println!("{} airlines, request {}", airlines.len(), meta.request_id);
//!
//!     cluster.close().await
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Query execution and result streaming.
pub mod query {
    pub use columnar_query::*;
}

/// Connection handling, TLS, discovery and HTTPS transport.
pub mod cluster {
    pub use columnar_cluster::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use columnar_cluster::prelude::*;
}

// Re-export key types at the crate root
pub use columnar_cluster::{
    Cluster, ClusterOptions, Credential, Database, Queryable, Scope, SecurityOptions,
    TimeoutOptions, TrustOnly,
};
pub use columnar_query::{
    ColumnarError, ColumnarResult, ErrorKind, QueryMetadata, QueryOptions, QueryResult,
    QueryResultRow, RequestContext, ScanConsistency,
};
