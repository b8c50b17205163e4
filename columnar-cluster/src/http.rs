//! HTTPS transport for the analytics query service.
//!
//! Requests are spread round-robin over the resolved endpoints. Each response
//! body is read incrementally: everything before the first row is consumed
//! inside [`Transport::execute`], so request-level errors are reported there,
//! and rows are then pulled from the returned [`HttpRowStream`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use columnar_query::{
    ColumnarError, ColumnarResult, ContextError, ErrorDescriptor, FailureCause, Logger,
    QueryMetadata, QueryRequest, RequestContext, RequestFailure, RowStream, Transport, TransportError,
};
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use parking_lot::RwLock;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderValue};
use tracing::{debug, instrument};

use crate::config::ClusterConfig;
use crate::credential::Credential;
use crate::discovery::Endpoint;
use crate::response::{ResponseScanner, parse_errors};

/// Path of the query service.
pub const QUERY_PATH: &str = "/api/v1/request";

/// Header carrying the request priority.
pub const PRIORITY_HEADER: &str = "Analytics-Priority";

const IDLE_CONNECTION_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);

fn user_agent() -> String {
    format!("columnar-rust/{}", env!("CARGO_PKG_VERSION"))
}

fn context_cause(err: ContextError) -> FailureCause {
    match err {
        ContextError::Cancelled => FailureCause::Cancelled,
        ContextError::DeadlineExceeded => FailureCause::DeadlineExceeded,
    }
}

/// Yields `body` once, setting `written` when the connection first asks for it.
///
/// The connection only polls the body after the connection (TLS included) is
/// up and the request head has been written, so an unset flag means the
/// request never reached the server.
fn marked_body(
    body: Vec<u8>,
    written: Arc<AtomicBool>,
) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
    stream::once(async move {
        written.store(true, Ordering::SeqCst);
        Ok(Bytes::from(body))
    })
}

/// Text of an error and all of its sources.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}

/// Server errors and message text of a non-200 response body.
fn failure_body<E: std::error::Error>(body: Result<Bytes, E>) -> (Vec<ErrorDescriptor>, String) {
    match body {
        Ok(body) => (
            parse_errors(&body),
            String::from_utf8_lossy(&body).trim().to_string(),
        ),
        Err(err) => (
            Vec::new(),
            format!("failed to read response body: {}", error_chain(&err)),
        ),
    }
}

/// [`Transport`] over HTTPS using a pooled `reqwest` client.
///
/// Closing the transport drops the pooled client; later requests fail with
/// [`TransportError::Closed`].
#[derive(Debug)]
pub struct HttpTransport {
    client: RwLock<Option<reqwest::Client>>,
    endpoints: Vec<Endpoint>,
    next: AtomicUsize,
    credential: Credential,
    logger: Arc<dyn Logger>,
}

impl HttpTransport {
    /// Create a transport for `endpoints`.
    pub fn new(
        config: &ClusterConfig,
        tls: rustls::ClientConfig,
        endpoints: Vec<Endpoint>,
        credential: Credential,
    ) -> ColumnarResult<Self> {
        if endpoints.is_empty() {
            return Err(ColumnarError::invalid_argument(
                "connection_string",
                "no endpoints to connect to",
            ));
        }

        let client = reqwest::Client::builder()
            .use_preconfigured_tls(tls)
            .connect_timeout(config.connect_timeout.min(config.dispatch_timeout))
            .pool_idle_timeout(IDLE_CONNECTION_TIMEOUT)
            .user_agent(user_agent())
            .https_only(true)
            .build()
            .map_err(|e| ColumnarError::Transport(TransportError::other(e)))?;

        debug!(endpoints = endpoints.len(), "HttpTransport::new()");
        Ok(Self {
            client: RwLock::new(Some(client)),
            endpoints,
            next: AtomicUsize::new(0),
            credential,
            logger: Arc::clone(&config.logger),
        })
    }

    /// The endpoints requests are spread over.
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    fn pick_endpoint(&self) -> &Endpoint {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.endpoints.len();
        &self.endpoints[idx]
    }

    /// Whether [`close`](Transport::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.client.read().is_none()
    }

    fn map_send_error(
        err: &reqwest::Error,
        statement: &str,
        endpoint: &str,
        written: bool,
    ) -> RequestFailure {
        let cause = if err.is_timeout() {
            FailureCause::Timeout
        } else {
            FailureCause::Other(error_chain(err))
        };
        let failure = RequestFailure::new(cause, statement, endpoint);
        if written && !err.is_connect() {
            failure
        } else {
            failure.not_dispatched()
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip_all, fields(client_context_id = %request.client_context_id))]
    async fn execute(
        &self,
        ctx: &RequestContext,
        request: QueryRequest,
    ) -> Result<Box<dyn RowStream>, TransportError> {
        let Some(client) = self.client.read().clone() else {
            return Err(TransportError::Closed);
        };
        let endpoint = self.pick_endpoint().to_string();
        let statement = request.statement.clone();

        if let Err(err) = ctx.check() {
            return Err(RequestFailure::new(context_cause(err), statement, endpoint)
                .not_dispatched()
                .into());
        }

        let body = request.body().map_err(TransportError::other)?;
        let written = Arc::new(AtomicBool::new(false));
        let user = self.credential.user_pass();
        let mut builder = client
            .post(format!("https://{endpoint}{QUERY_PATH}"))
            .basic_auth(&user.username, Some(&user.password))
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(CONTENT_LENGTH, body.len())
            .body(reqwest::Body::wrap_stream(marked_body(body, Arc::clone(&written))));
        if let Some(priority) = request.priority {
            builder = builder.header(PRIORITY_HEADER, priority.to_string());
        }

        debug!(endpoint = %endpoint, "Dispatching query");
        let response = tokio::select! {
            biased;
            err = ctx.done() => {
                let failure = RequestFailure::new(context_cause(err), statement, endpoint);
                return Err(if written.load(Ordering::SeqCst) {
                    failure.into()
                } else {
                    failure.not_dispatched().into()
                });
            }
            sent = builder.send() => sent.map_err(|e| {
                Self::map_send_error(&e, &statement, &endpoint, written.load(Ordering::SeqCst))
            })?,
        };

        let status = response.status().as_u16();
        if status != 200 {
            let body = tokio::select! {
                biased;
                err = ctx.done() => {
                    return Err(RequestFailure::new(context_cause(err), statement, endpoint)
                        .with_status(status)
                        .into());
                }
                body = response.bytes() => body,
            };
            let (errors, text) = failure_body(body);
            self.logger.debug(&format!(
                "query request to {endpoint} failed with status {status} ({} errors)",
                errors.len()
            ));
            return Err(RequestFailure::new(FailureCause::Other(text), statement, endpoint)
                .with_status(status)
                .with_errors(errors)
                .into());
        }

        let mut stream = HttpRowStream {
            body: Some(response.bytes_stream().boxed()),
            scanner: ResponseScanner::new(),
            statement,
            endpoint,
            status,
        };

        let prelude = tokio::select! {
            biased;
            err = ctx.done() => Err(err),
            prelude = stream.read_prelude() => Ok(prelude),
        };
        match prelude {
            Ok(read) => {
                read?;
                Ok(Box::new(stream))
            }
            Err(err) => {
                stream.close();
                Err(RequestFailure::new(context_cause(err), stream.statement, stream.endpoint)
                    .with_status(status)
                    .into())
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.client.write().take().is_some() {
            debug!("HttpTransport::close()");
        }
        Ok(())
    }
}

/// Rows of one HTTP response.
pub struct HttpRowStream {
    body: Option<BoxStream<'static, reqwest::Result<Bytes>>>,
    scanner: ResponseScanner,
    statement: String,
    endpoint: String,
    status: u16,
}

impl std::fmt::Debug for HttpRowStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRowStream")
            .field("endpoint", &self.endpoint)
            .field("open", &self.body.is_some())
            .finish()
    }
}

impl HttpRowStream {
    /// Read until the rows begin or the body ends, failing on reported errors.
    async fn read_prelude(&mut self) -> Result<(), TransportError> {
        while !self.scanner.rows_started() && !self.scanner.is_done() {
            if !self.read_chunk().await? {
                break;
            }
        }
        self.check_errors()
    }

    /// Feed the next chunk to the scanner. Returns false at end of body.
    async fn read_chunk(&mut self) -> Result<bool, TransportError> {
        let Some(body) = self.body.as_mut() else {
            return Ok(false);
        };
        match body.next().await {
            Some(Ok(chunk)) => {
                self.scanner.feed(&chunk).map_err(TransportError::other)?;
                Ok(true)
            }
            Some(Err(err)) => {
                self.body = None;
                let cause = if err.is_timeout() {
                    FailureCause::Timeout
                } else {
                    FailureCause::Other(error_chain(&err))
                };
                Err(RequestFailure::new(cause, self.statement.clone(), self.endpoint.clone())
                    .with_status(self.status)
                    .into())
            }
            None => {
                self.body = None;
                self.scanner.finish().map_err(TransportError::other)?;
                Ok(false)
            }
        }
    }

    fn check_errors(&self) -> Result<(), TransportError> {
        let errors = self.scanner.errors();
        if errors.is_empty() {
            return Ok(());
        }
        let text = errors
            .first()
            .map(|e| e.message.clone())
            .unwrap_or_default();
        let failure = RequestFailure::new(
            FailureCause::Other(text),
            self.statement.clone(),
            self.endpoint.clone(),
        );
        Err(failure.with_status(self.status).with_errors(errors).into())
    }
}

#[async_trait]
impl RowStream for HttpRowStream {
    async fn next_row(&mut self) -> Result<Option<Bytes>, TransportError> {
        loop {
            if let Some(row) = self.scanner.pop_row() {
                return Ok(Some(row));
            }
            if self.scanner.is_done() {
                self.body = None;
                self.check_errors()?;
                return Ok(None);
            }
            if !self.read_chunk().await? {
                return Ok(None);
            }
        }
    }

    fn metadata(&self) -> Result<QueryMetadata, TransportError> {
        if !self.scanner.is_done() {
            return Err(TransportError::other(
                "metadata is not available before the rows are exhausted",
            ));
        }
        self.scanner.metadata().map_err(TransportError::other)
    }

    fn close(&mut self) {
        self.body = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterOptions;
    use std::time::Duration;

    fn transport(endpoints: Vec<Endpoint>) -> ColumnarResult<HttpTransport> {
        let config = ClusterConfig::from_options(&ClusterOptions::new()).unwrap();
        let tls = crate::tls::build_tls_config(&config).unwrap();
        HttpTransport::new(&config, tls, endpoints, Credential::new("u", "p"))
    }

    fn endpoint(host: &str) -> Endpoint {
        Endpoint {
            host: host.into(),
            port: 18095,
        }
    }

    fn request() -> QueryRequest {
        QueryRequest {
            payload: serde_json::Map::new(),
            priority: None,
            statement: "SELECT 1".into(),
            client_context_id: "id".into(),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_requires_endpoints() {
        assert!(transport(Vec::new()).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_round_robin() {
        let transport = transport(vec![endpoint("a"), endpoint("b")]).unwrap();
        let picked: Vec<_> = (0..4).map(|_| transport.pick_endpoint().host.clone()).collect();
        assert_eq!(picked, vec!["a", "b", "a", "b"]);
    }

    #[test]
    fn test_user_agent() {
        assert!(user_agent().starts_with("columnar-rust/"));
    }

    #[tokio::test]
    async fn test_cancelled_context_not_dispatched() {
        let transport = transport(vec![endpoint("127.0.0.1")]).unwrap();
        let ctx = RequestContext::new();
        ctx.cancel();

        match transport.execute(&ctx, request()).await {
            Err(TransportError::Request(failure)) => {
                assert!(failure.was_not_dispatched);
                assert_eq!(failure.cause, FailureCause::Cancelled);
                assert_eq!(failure.endpoint, "127.0.0.1:18095");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("request was dispatched"),
        }
    }

    #[tokio::test]
    async fn test_closed_transport_rejects_requests() {
        let transport = transport(vec![endpoint("127.0.0.1")]).unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(transport.is_closed());

        let err = transport
            .execute(&RequestContext::new(), request())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::Closed));
    }

    #[tokio::test]
    async fn test_marked_body_flags_first_poll() {
        let written = Arc::new(AtomicBool::new(false));
        let mut body = Box::pin(marked_body(b"{}".to_vec(), Arc::clone(&written)));
        assert!(!written.load(Ordering::SeqCst));

        let chunk = body.next().await.unwrap().unwrap();
        assert_eq!(chunk.as_ref(), b"{}");
        assert!(written.load(Ordering::SeqCst));
        assert!(body.next().await.is_none());
    }

    #[test]
    fn test_failure_body() {
        let (errors, text) = failure_body::<std::io::Error>(Ok(Bytes::from_static(
            br#" {"errors":[{"code":20000,"msg":"bad creds"}]} "#,
        )));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, 20000);
        assert_eq!(text, r#"{"errors":[{"code":20000,"msg":"bad creds"}]}"#);

        let read_error = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "connection reset");
        let (errors, text) = failure_body(Err(read_error));
        assert!(errors.is_empty());
        assert_eq!(text, "failed to read response body: connection reset");
    }

    #[tokio::test]
    async fn test_deadline_during_handshake_is_not_dispatched() {
        // Accepts connections but never answers the TLS handshake.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let transport = transport(vec![Endpoint {
            host: "127.0.0.1".into(),
            port,
        }])
        .unwrap();
        let ctx = RequestContext::with_timeout(Duration::from_millis(200));

        match transport.execute(&ctx, request()).await {
            Err(TransportError::Request(failure)) => {
                assert_eq!(failure.cause, FailureCause::DeadlineExceeded);
                assert!(failure.was_not_dispatched);
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("handshake never completes"),
        }
        server.abort();
    }
}
