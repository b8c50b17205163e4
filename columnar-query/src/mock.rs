//! Scripted transport and logger for tests.
//!
//! Rows produced by [`MockStream`] are `{"$1":<index>}` for index `0..n`,
//! matching what `SELECT RAW` style test statements return.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::context::{ContextError, RequestContext};
use crate::error::ErrorDescriptor;
use crate::logging::{LogLevel, Logger};
use crate::metadata::{QueryMetadata, QueryMetrics};
use crate::request::QueryRequest;
use crate::transport::{FailureCause, RequestFailure, RowStream, Transport, TransportError};

/// Endpoint reported by mock failures.
pub const MOCK_ENDPOINT: &str = "mock:18095";

/// Error code attached to scripted stream failures.
pub const MOCK_STREAM_ERROR_CODE: u32 = 25000;

fn context_cause(err: ContextError) -> FailureCause {
    match err {
        ContextError::Cancelled => FailureCause::Cancelled,
        ContextError::DeadlineExceeded => FailureCause::DeadlineExceeded,
    }
}

/// A scripted row stream.
#[derive(Debug)]
pub struct MockStream {
    rows: usize,
    delivered: usize,
    bytes: u64,
    fail_after: Option<usize>,
    block_after: Option<usize>,
    exhausted: bool,
    closed: bool,
    close_count: Arc<AtomicUsize>,
    alive: Arc<AtomicBool>,
    statement: String,
}

impl MockStream {
    /// A stream of `rows` rows.
    pub fn with_rows(rows: usize) -> Self {
        Self {
            rows,
            delivered: 0,
            bytes: 0,
            fail_after: None,
            block_after: None,
            exhausted: false,
            closed: false,
            close_count: Arc::new(AtomicUsize::new(0)),
            alive: Arc::new(AtomicBool::new(true)),
            statement: String::new(),
        }
    }

    /// Fail with a server error once `rows` rows were delivered.
    #[must_use]
    pub fn fail_after(mut self, rows: usize) -> Self {
        self.fail_after = Some(rows);
        self
    }

    /// Stall forever once `rows` rows were delivered.
    #[must_use]
    pub fn block_after(mut self, rows: usize) -> Self {
        self.block_after = Some(rows);
        self
    }

    /// Counts calls to `close`.
    #[must_use]
    pub fn close_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.close_count)
    }

    /// True until the stream is dropped.
    #[must_use]
    pub fn alive(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.alive)
    }

    fn with_statement(mut self, statement: &str) -> Self {
        self.statement = statement.to_string();
        self
    }
}

#[async_trait]
impl RowStream for MockStream {
    async fn next_row(&mut self) -> Result<Option<Bytes>, TransportError> {
        if self.closed || self.exhausted {
            return Ok(None);
        }
        if self.fail_after == Some(self.delivered) {
            return Err(RequestFailure::new(
                FailureCause::Other("stream failed".into()),
                self.statement.clone(),
                MOCK_ENDPOINT,
            )
            .with_status(200)
            .with_errors(vec![ErrorDescriptor::new(
                MOCK_STREAM_ERROR_CODE,
                "Internal error",
            )])
            .into());
        }
        if self.block_after == Some(self.delivered) {
            std::future::pending::<()>().await;
        }
        if self.delivered == self.rows {
            self.exhausted = true;
            return Ok(None);
        }

        let row = Bytes::from(format!("{{\"$1\":{}}}", self.delivered));
        self.delivered += 1;
        self.bytes += row.len() as u64;
        Ok(Some(row))
    }

    fn metadata(&self) -> Result<QueryMetadata, TransportError> {
        if !self.exhausted {
            return Err(TransportError::other(
                "metadata is not available before the rows are exhausted",
            ));
        }
        Ok(QueryMetadata {
            request_id: uuid::Uuid::new_v4().to_string(),
            metrics: QueryMetrics {
                elapsed_time: Duration::from_millis(2),
                execution_time: Duration::from_millis(1),
                result_count: self.delivered as u64,
                result_size: self.bytes,
                processed_objects: self.delivered as u64,
            },
            warnings: Vec::new(),
        })
    }

    fn close(&mut self) {
        self.closed = true;
        self.close_count.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

/// A transport that serves [`MockStream`]s and records every request.
#[derive(Debug)]
pub struct MockTransport {
    rows: usize,
    fail_rows_after: Option<usize>,
    block_rows_after: Option<usize>,
    dispatch_delay: Option<Duration>,
    failure: Option<TransportError>,
    requests: Mutex<Vec<QueryRequest>>,
    streams: Mutex<Vec<Arc<AtomicBool>>>,
    dispatched: AtomicUsize,
    closed: AtomicBool,
}

impl MockTransport {
    /// Serve `rows` rows per query.
    pub fn with_rows(rows: usize) -> Self {
        Self {
            rows,
            fail_rows_after: None,
            block_rows_after: None,
            dispatch_delay: None,
            failure: None,
            requests: Mutex::new(Vec::new()),
            streams: Mutex::new(Vec::new()),
            dispatched: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Fail each stream after `rows` rows.
    #[must_use]
    pub fn fail_rows_after(mut self, rows: usize) -> Self {
        self.fail_rows_after = Some(rows);
        self
    }

    /// Stall each stream after `rows` rows.
    #[must_use]
    pub fn block_rows_after(mut self, rows: usize) -> Self {
        self.block_rows_after = Some(rows);
        self
    }

    /// Wait this long after dispatch before answering.
    #[must_use]
    pub fn dispatch_delay(mut self, delay: Duration) -> Self {
        self.dispatch_delay = Some(delay);
        self
    }

    /// Answer every dispatched request with `failure`.
    #[must_use]
    pub fn fail_with(mut self, failure: impl Into<TransportError>) -> Self {
        self.failure = Some(failure.into());
        self
    }

    /// The most recent dispatched request.
    #[must_use]
    pub fn last_request(&self) -> Option<QueryRequest> {
        self.requests.lock().last().cloned()
    }

    /// Number of requests that left the client.
    #[must_use]
    pub fn dispatched(&self) -> usize {
        self.dispatched.load(Ordering::SeqCst)
    }

    /// Number of streams not yet dropped.
    #[must_use]
    pub fn live_streams(&self) -> usize {
        self.streams
            .lock()
            .iter()
            .filter(|alive| alive.load(Ordering::SeqCst))
            .count()
    }

    /// Whether `close` was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(
        &self,
        ctx: &RequestContext,
        request: QueryRequest,
    ) -> Result<Box<dyn RowStream>, TransportError> {
        if let Err(err) = ctx.check() {
            return Err(
                RequestFailure::new(context_cause(err), request.statement, MOCK_ENDPOINT)
                    .not_dispatched()
                    .into(),
            );
        }

        self.dispatched.fetch_add(1, Ordering::SeqCst);
        let statement = request.statement.clone();
        self.requests.lock().push(request);

        if let Some(delay) = self.dispatch_delay {
            tokio::select! {
                err = ctx.done() => {
                    let failure = RequestFailure::new(context_cause(err), statement, MOCK_ENDPOINT);
                    return Err(failure.into());
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }

        let mut stream = MockStream::with_rows(self.rows).with_statement(&statement);
        stream.fail_after = self.fail_rows_after;
        stream.block_after = self.block_rows_after;
        self.streams.lock().push(stream.alive());
        Ok(Box::new(stream))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A logger that keeps every record.
#[derive(Debug, Default)]
pub struct CapturingLogger {
    records: Mutex<Vec<(LogLevel, String)>>,
}

impl CapturingLogger {
    /// Create an empty logger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record so far.
    #[must_use]
    pub fn records(&self) -> Vec<(LogLevel, String)> {
        self.records.lock().clone()
    }

    /// Whether a record at `level` contains `needle`.
    #[must_use]
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.records
            .lock()
            .iter()
            .any(|(l, message)| *l == level && message.contains(needle))
    }
}

impl Logger for CapturingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        self.records.lock().push((level, message.to_string()));
    }
}
