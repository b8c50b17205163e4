//! # columnar-cluster
//!
//! Connection handling for the Columnar analytics client.
//!
//! This crate turns a connection string and a set of [`ClusterOptions`] into a
//! [`Cluster`]: it resolves timeouts and TLS settings, discovers endpoints via
//! DNS SRV when possible, and runs queries over HTTPS with
//! [`HttpTransport`]. Query execution and result handling live in
//! `columnar-query`.
//!
//! ## Connection strings
//!
//! ```text
//! couchbases://host[:port][,host[:port]...][?key=value&...]
//! ```
//!
//! Only the `couchbases` scheme is accepted. Recognized parameters:
//!
//! | Parameter | Type |
//! |---|---|
//! | `srv` | bool |
//! | `timeout.connect_timeout` | duration |
//! | `timeout.dispatch_timeout` | duration |
//! | `timeout.server_query_timeout` | duration |
//! | `security.trust_only_pem_file` | path |
//! | `security.disable_server_certificate_verification` | bool |
//! | `security.cipher_suites` | comma-separated list |
//!
//! ## Example
//!
//! ```rust,no_run
//! use columnar_cluster::prelude::*;
//!
//! # async fn run() -> ColumnarResult<()> {
//! let cluster = Cluster::connect(
//!     "couchbases://cluster.example.com?timeout.connect_timeout=5s",
//!     Credential::new("user", "pass"),
//!     &[],
//! )
//! .await?;
//!
//! let mut result = cluster
//!     .execute_query(&RequestContext::new(), "SELECT 1=1", &[])
//!     .await?;
//! while let Some(row) = result.next_row().await {
//!     let value: serde_json::Value = row.content_as()?;
//!     println!("{value}");
//! }
//! result.err()?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

mod cluster;
mod config;
mod connstr;
mod credential;
mod discovery;
mod http;
mod response;
mod tls;

pub use cluster::{Cluster, Database, Queryable, Scope};
pub use config::{
    ClusterConfig, ClusterOptions, DEFAULT_CONNECT_TIMEOUT, DEFAULT_DISPATCH_TIMEOUT,
    DEFAULT_SERVER_QUERY_TIMEOUT, SecurityOptions, TimeoutOptions, TrustOnly,
};
pub use connstr::{ConnectionString, DEFAULT_PORT, HostAddress, SECURE_SCHEME};
pub use credential::{Credential, UserPassPair};
pub use discovery::{Endpoint, HickoryResolver, SrvResolver, SrvTarget, resolve_endpoints};
pub use http::{HttpRowStream, HttpTransport, PRIORITY_HEADER, QUERY_PATH};
pub use response::{MalformedResponse, ResponseScanner};
pub use tls::build_tls_config;

/// Re-exported for [`TrustOnly::Certificates`].
pub use rustls::pki_types::CertificateDer;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::cluster::{Cluster, Database, Queryable, Scope};
    pub use crate::config::{ClusterOptions, SecurityOptions, TimeoutOptions, TrustOnly};
    pub use crate::credential::Credential;
    pub use columnar_query::prelude::*;
}
