//! The query client: merge, translate, execute.

use std::sync::Arc;
use std::time::Duration;

use crate::context::RequestContext;
use crate::decode::Decoder;
use crate::duration::format_duration;
use crate::error::ColumnarResult;
use crate::logging::Logger;
use crate::options::QueryOptions;
use crate::reader::RowReader;
use crate::request::{Namespace, translate_request};
use crate::result::QueryResult;
use crate::translate::translate_error;
use crate::transport::Transport;

/// Runs statements over a shared [`Transport`].
///
/// A client optionally carries a [`Namespace`]; statements run through a
/// namespaced client get a `query_context` for it.
#[derive(Debug, Clone)]
pub struct QueryClient {
    transport: Arc<dyn Transport>,
    default_timeout: Duration,
    default_decoder: Arc<dyn Decoder>,
    namespace: Option<Namespace>,
    logger: Arc<dyn Logger>,
}

impl QueryClient {
    /// Create a client with no namespace.
    pub fn new(
        transport: Arc<dyn Transport>,
        default_timeout: Duration,
        default_decoder: Arc<dyn Decoder>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            transport,
            default_timeout,
            default_decoder,
            namespace: None,
            logger,
        }
    }

    /// A copy of this client bound to `namespace`.
    #[must_use]
    pub fn with_namespace(&self, namespace: Namespace) -> Self {
        Self {
            namespace: Some(namespace),
            ..self.clone()
        }
    }

    /// The bound namespace, if any.
    #[must_use]
    pub fn namespace(&self) -> Option<&Namespace> {
        self.namespace.as_ref()
    }

    /// The shared transport.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// The logger.
    #[must_use]
    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }

    /// Execute `statement` with the given option layers.
    pub async fn query(
        &self,
        ctx: &RequestContext,
        statement: &str,
        opts: &[QueryOptions],
    ) -> ColumnarResult<QueryResult> {
        let opts = QueryOptions::merge(opts);
        let request = translate_request(
            statement,
            &opts,
            ctx,
            self.default_timeout,
            self.namespace.as_ref(),
        )?;

        self.logger.debug(&format!(
            "dispatching query client_context_id={} timeout={}",
            request.client_context_id,
            format_duration(request.timeout)
        ));

        let stream = match self.transport.execute(ctx, request).await {
            Ok(stream) => stream,
            Err(err) => {
                let err = translate_error(err);
                if let Some(query_err) = err.as_query_error() {
                    self.logger.debug(&format!(
                        "server reported error {}: {}",
                        query_err.code(),
                        query_err.message()
                    ));
                }
                return Err(err);
            }
        };

        let decoder = opts
            .decoder
            .unwrap_or_else(|| Arc::clone(&self.default_decoder));
        Ok(QueryResult::new(RowReader::new(stream), decoder).with_logger(Arc::clone(&self.logger)))
    }
}
