//! Endpoint discovery: DNS SRV or the addresses in the connection string.

use std::error::Error as StdError;
use std::fmt;

use async_trait::async_trait;
use columnar_query::{ColumnarError, ColumnarResult, TransportError};
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use tracing::debug;

use crate::connstr::ConnectionString;

/// One target of an SRV record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvTarget {
    /// Target host, without the trailing dot.
    pub target: String,
    /// Target port.
    pub port: u16,
}

/// Looks up SRV records.
#[async_trait]
pub trait SrvResolver: Send + Sync + fmt::Debug {
    /// Look up `name`, e.g. `_couchbases._tcp.example.com`. Targets are
    /// returned in priority order.
    async fn lookup_srv(
        &self,
        name: &str,
    ) -> Result<Vec<SrvTarget>, Box<dyn StdError + Send + Sync>>;
}

/// [`SrvResolver`] backed by the system's DNS configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct HickoryResolver;

#[async_trait]
impl SrvResolver for HickoryResolver {
    async fn lookup_srv(
        &self,
        name: &str,
    ) -> Result<Vec<SrvTarget>, Box<dyn StdError + Send + Sync>> {
        let resolver = match TokioAsyncResolver::tokio_from_system_conf() {
            Ok(resolver) => resolver,
            Err(err) => {
                debug!(error = %err, "System resolver unavailable, using defaults");
                TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
            }
        };

        let lookup = resolver.srv_lookup(name).await?;
        let mut records: Vec<_> = lookup.iter().collect();
        records.sort_by_key(|srv| (srv.priority(), std::cmp::Reverse(srv.weight())));

        Ok(records
            .into_iter()
            .map(|srv| SrvTarget {
                target: srv.target().to_utf8().trim_end_matches('.').to_string(),
                port: srv.port(),
            })
            .collect())
    }
}

/// A `host:port` pair the transport connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or IP literal.
    pub host: String,
    /// Port.
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Work out which endpoints to use.
///
/// SRV is used only when enabled and the connection string is eligible. A
/// failed lookup is returned as-is.
pub async fn resolve_endpoints(
    conn: &ConnectionString,
    use_srv: bool,
    resolver: &dyn SrvResolver,
) -> ColumnarResult<Vec<Endpoint>> {
    if use_srv {
        if let Some(record) = conn.srv_record_name() {
            debug!(record = %record, "Looking up SRV record");
            let targets = resolver
                .lookup_srv(&record)
                .await
                .map_err(|e| ColumnarError::Transport(TransportError::other(e)))?;
            return Ok(targets
                .into_iter()
                .map(|t| Endpoint {
                    host: t.target,
                    port: t.port,
                })
                .collect());
        }
    }

    Ok(conn
        .addresses()
        .iter()
        .map(|addr| Endpoint {
            host: addr.host.clone(),
            port: addr.port_or_default(),
        })
        .collect())
}
