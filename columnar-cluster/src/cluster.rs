//! Cluster, database and scope handles.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use columnar_query::{
    ColumnarError, ColumnarResult, Namespace, QueryClient, QueryOptions, QueryResult,
    RequestContext, Transport, translate_error,
};
use tracing::instrument;

use crate::config::{ClusterConfig, ClusterOptions};
use crate::connstr::ConnectionString;
use crate::credential::Credential;
use crate::discovery::{HickoryResolver, resolve_endpoints};
use crate::http::HttpTransport;
use crate::tls::build_tls_config;

/// Anything that can run a statement.
///
/// Implemented by [`Cluster`] (no namespace) and [`Scope`] (statements run in
/// the scope's `database`.`scope`).
#[async_trait]
pub trait Queryable: Send + Sync {
    /// Execute `statement` with the given option layers, later layers winning.
    async fn execute_query(
        &self,
        ctx: &RequestContext,
        statement: &str,
        opts: &[QueryOptions],
    ) -> ColumnarResult<QueryResult>;
}

/// A connection to an analytics cluster.
///
/// ```rust,no_run
/// use columnar_cluster::{Cluster, ClusterOptions, Credential, Queryable};
/// use columnar_query::{RequestContext, buffer_query_result};
///
/// # async fn run() -> columnar_query::ColumnarResult<()> {
/// let cluster = Cluster::connect(
///     "couchbases://cluster.example.com",
///     Credential::new("user", "pass"),
///     &[ClusterOptions::new()],
/// )
/// .await?;
///
/// let scope = cluster.database("travel").scope("inventory");
/// let result = scope
///     .execute_query(&RequestContext::new(), "SELECT * FROM airline LIMIT 10", &[])
///     .await?;
/// let (rows, meta) = buffer_query_result(result).await?;
/// println!("{} rows in {:?}", rows.len(), meta.metrics.elapsed_time);
///
/// cluster.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Cluster {
    client: QueryClient,
    closed: Arc<AtomicBool>,
}

impl Cluster {
    /// Connect to the cluster named by `conn_str`.
    #[instrument(skip_all, fields(conn_str = %conn_str))]
    pub async fn connect(
        conn_str: &str,
        credential: Credential,
        opts: &[ClusterOptions],
    ) -> ColumnarResult<Self> {
        let conn = ConnectionString::parse(conn_str)?;
        let mut opts = ClusterOptions::merge(opts);
        let config = ClusterConfig::resolve(&conn, &opts)?;
        let tls = build_tls_config(&config)?;

        let resolver = opts
            .take_srv_resolver()
            .unwrap_or_else(|| Arc::new(HickoryResolver));
        let endpoints = resolve_endpoints(&conn, config.use_srv, resolver.as_ref()).await?;

        let transport = HttpTransport::new(&config, tls, endpoints, credential)?;
        config.logger.info(&format!(
            "connected to {} ({} endpoints)",
            conn.addresses()
                .iter()
                .map(|a| a.host.as_str())
                .collect::<Vec<_>>()
                .join(","),
            transport.endpoints().len()
        ));
        Ok(Self::with_config(Arc::new(transport), &config))
    }

    /// Build a cluster over an existing transport.
    pub fn from_transport(
        transport: Arc<dyn Transport>,
        opts: &[ClusterOptions],
    ) -> ColumnarResult<Self> {
        let config = ClusterConfig::from_options(&ClusterOptions::merge(opts))?;
        Ok(Self::with_config(transport, &config))
    }

    fn with_config(transport: Arc<dyn Transport>, config: &ClusterConfig) -> Self {
        Self {
            client: QueryClient::new(
                transport,
                config.server_query_timeout,
                Arc::clone(&config.decoder),
                Arc::clone(&config.logger),
            ),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open a database by name. No request is made.
    #[must_use]
    pub fn database(&self, name: impl Into<String>) -> Database {
        Database {
            name: name.into(),
            client: self.client.clone(),
            closed: Arc::clone(&self.closed),
        }
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Release the transport. Only the first call has an effect.
    pub async fn close(&self) -> ColumnarResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.client.logger().debug("closing cluster");
        self.client.transport().close().await.map_err(translate_error)
    }
}

#[async_trait]
impl Queryable for Cluster {
    async fn execute_query(
        &self,
        ctx: &RequestContext,
        statement: &str,
        opts: &[QueryOptions],
    ) -> ColumnarResult<QueryResult> {
        if self.is_closed() {
            return Err(ColumnarError::Closed);
        }
        self.client.query(ctx, statement, opts).await
    }
}

/// A database within a cluster.
#[derive(Debug, Clone)]
pub struct Database {
    name: String,
    client: QueryClient,
    closed: Arc<AtomicBool>,
}

impl Database {
    /// The database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open a scope by name. No request is made.
    #[must_use]
    pub fn scope(&self, name: impl Into<String>) -> Scope {
        let name = name.into();
        Scope {
            client: self
                .client
                .with_namespace(Namespace::new(self.name.clone(), name.clone())),
            name,
            database_name: self.name.clone(),
            closed: Arc::clone(&self.closed),
        }
    }
}

/// A scope within a database. Statements run here are qualified by it.
#[derive(Debug, Clone)]
pub struct Scope {
    name: String,
    database_name: String,
    client: QueryClient,
    closed: Arc<AtomicBool>,
}

impl Scope {
    /// The scope name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name of the database this scope belongs to.
    #[must_use]
    pub fn database_name(&self) -> &str {
        &self.database_name
    }
}

#[async_trait]
impl Queryable for Scope {
    async fn execute_query(
        &self,
        ctx: &RequestContext,
        statement: &str,
        opts: &[QueryOptions],
    ) -> ColumnarResult<QueryResult> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ColumnarError::Closed);
        }
        self.client.query(ctx, statement, opts).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::TimeoutOptions;
    use columnar_query::mock::{CapturingLogger, MockTransport};
    use columnar_query::{LogLevel, buffer_query_result};
    use serde_json::json;

    fn cluster(transport: &Arc<MockTransport>) -> Cluster {
        let transport: Arc<dyn Transport> = Arc::clone(transport) as Arc<dyn Transport>;
        Cluster::from_transport(transport, &[ClusterOptions::new()]).unwrap()
    }

    #[tokio::test]
    async fn test_cluster_query_has_no_query_context() {
        let transport = Arc::new(MockTransport::with_rows(3));
        let cluster = cluster(&transport);

        let result = cluster
            .execute_query(&RequestContext::new(), "SELECT 1", &[])
            .await
            .unwrap();
        let (rows, _) = buffer_query_result(result).await.unwrap();
        assert_eq!(rows.len(), 3);

        let request = transport.last_request().unwrap();
        assert!(!request.payload.contains_key("query_context"));
        assert_eq!(request.payload["timeout"], json!("10m0s"));
    }

    #[tokio::test]
    async fn test_scope_query_is_namespaced() {
        let transport = Arc::new(MockTransport::with_rows(1));
        let scope = cluster(&transport).database("travel").scope("inventory");
        assert_eq!(scope.name(), "inventory");
        assert_eq!(scope.database_name(), "travel");

        scope
            .execute_query(&RequestContext::new(), "SELECT 1", &[])
            .await
            .unwrap();
        assert_eq!(
            transport.last_request().unwrap().payload["query_context"],
            json!("default:`travel`.`inventory`")
        );
    }

    #[tokio::test]
    async fn test_server_query_timeout_from_options() {
        let transport = Arc::new(MockTransport::with_rows(0));
        let opts = ClusterOptions::new().timeout_options(
            TimeoutOptions::new().server_query_timeout(Duration::from_secs(90)),
        );
        let cluster = Cluster::from_transport(transport.clone(), &[opts]).unwrap();

        cluster
            .execute_query(&RequestContext::new(), "SELECT 1", &[])
            .await
            .unwrap();
        assert_eq!(transport.last_request().unwrap().payload["timeout"], json!("1m30s"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_blocks_queries() {
        let transport = Arc::new(MockTransport::with_rows(1));
        let logger = Arc::new(CapturingLogger::new());
        let cluster = Cluster::from_transport(
            transport.clone(),
            &[ClusterOptions::new().logger(logger.clone())],
        )
        .unwrap();
        let scope = cluster.database("db").scope("sc");

        cluster.close().await.unwrap();
        cluster.close().await.unwrap();
        assert!(transport.is_closed());
        assert!(cluster.is_closed());
        assert_eq!(
            logger
                .records()
                .iter()
                .filter(|(level, m)| *level == LogLevel::Debug && m == "closing cluster")
                .count(),
            1
        );

        let ctx = RequestContext::new();
        assert!(cluster.execute_query(&ctx, "SELECT 1", &[]).await.unwrap_err().is_closed());
        assert!(scope.execute_query(&ctx, "SELECT 1", &[]).await.unwrap_err().is_closed());
        assert_eq!(transport.dispatched(), 0);
    }

    #[tokio::test]
    async fn test_connect_rejects_plain_scheme() {
        let err = Cluster::connect("couchbase://localhost", Credential::new("u", "p"), &[])
            .await
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[tokio::test]
    async fn test_connect_rejects_unknown_cipher_before_lookup() {
        let err = Cluster::connect(
            "couchbases://localhost?security.cipher_suites=NOPE",
            Credential::new("u", "p"),
            &[],
        )
        .await
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid argument cipher_suites - unsupported cipher suite NOPE"
        );
    }
}
