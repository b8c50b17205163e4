//! Integration tests for the query pipeline.
//!
//! These tests drive Cluster → Database → Scope → query → consume against the
//! scripted in-memory transport, covering:
//! - Pull and push consumption
//! - Early termination and cancellation
//! - Error classification
//! - Trailing metadata

use std::sync::Arc;
use std::time::Duration;

use columnar::prelude::*;
use columnar::query::mock::{CapturingLogger, MOCK_STREAM_ERROR_CODE, MockTransport};
use columnar::query::{
    ErrorDescriptor, FailureCause, LogLevel, NOT_SENT_CANCELLED, NOT_SENT_DEADLINE, RequestFailure,
};
use pretty_assertions::assert_eq;
use serde::Deserialize;
use tokio::time::Instant;

const NOT_SENT: &str = "operation not sent to server";

#[derive(Debug, Deserialize, PartialEq)]
struct Row {
    #[serde(rename = "$1")]
    value: u64,
}

fn scope(transport: &Arc<MockTransport>) -> Scope {
    Cluster::from_transport(transport.clone(), &[])
        .unwrap()
        .database("db")
        .scope("sc")
}

fn scope_with_logger(transport: &Arc<MockTransport>, logger: &Arc<CapturingLogger>) -> Scope {
    Cluster::from_transport(
        transport.clone(),
        &[ClusterOptions::new().logger(logger.clone())],
    )
    .unwrap()
    .database("db")
    .scope("sc")
}

#[derive(Debug)]
enum HandlerError {
    Stop(u64),
    Columnar(ColumnarError),
}

impl From<ColumnarError> for HandlerError {
    fn from(err: ColumnarError) -> Self {
        Self::Columnar(err)
    }
}

// ============================================================================
// Consumption
// ============================================================================

#[tokio::test]
async fn test_pull_and_iterate_see_the_same_rows() {
    let transport = Arc::new(MockTransport::with_rows(100));
    let scope = scope(&transport);
    let ctx = RequestContext::new();

    let mut pulled = Vec::new();
    let mut result = scope.execute_query(&ctx, "SELECT RAW 1", &[]).await.unwrap();
    while let Some(row) = result.next_row().await {
        pulled.push(row.content_as::<Row>().unwrap().value);
    }
    result.err().unwrap();

    let mut pushed = Vec::new();
    let result = scope.execute_query(&ctx, "SELECT RAW 1", &[]).await.unwrap();
    iterate_query_result(&ctx, result, |row| {
        pushed.push(row.content_as::<Row>()?.value);
        Ok::<_, ColumnarError>(())
    })
    .await
    .unwrap();

    assert_eq!(pulled, (0..100).collect::<Vec<_>>());
    assert_eq!(pulled, pushed);
    assert_eq!(transport.live_streams(), 0);
}

#[tokio::test]
async fn test_buffer_decodes_rows() {
    let transport = Arc::new(MockTransport::with_rows(10));
    let result = scope(&transport)
        .execute_query(&RequestContext::new(), "SELECT RAW 1", &[])
        .await
        .unwrap();

    let (rows, meta) = buffer_query_result_as::<Row>(result).await.unwrap();
    assert_eq!(rows.len(), 10);
    assert_eq!(rows[9], Row { value: 9 });
    assert_eq!(meta.metrics.result_count, 10);
}

#[tokio::test]
async fn test_buffer_discards_rows_on_decode_failure() {
    let transport = Arc::new(MockTransport::with_rows(10));
    let result = scope(&transport)
        .execute_query(&RequestContext::new(), "SELECT RAW 1", &[])
        .await
        .unwrap();

    let err = buffer_query_result_as::<Vec<String>>(result).await.unwrap_err();
    assert!(err.is_unmarshal());
    assert_eq!(transport.live_streams(), 0);
}

#[tokio::test]
async fn test_metadata_after_exhaustion() {
    let transport = Arc::new(MockTransport::with_rows(7));
    let mut result = scope(&transport)
        .execute_query(&RequestContext::new(), "SELECT RAW 1", &[])
        .await
        .unwrap();

    let err = result.metadata().unwrap_err();
    assert!(err.is_invalid_argument());

    let mut delivered = 0;
    while result.next_row().await.is_some() {
        delivered += 1;
    }
    result.err().unwrap();

    let meta = result.metadata().unwrap();
    assert_eq!(meta.metrics.result_count, delivered);
    assert!(meta.metrics.elapsed_time > Duration::ZERO);
    assert!(meta.metrics.execution_time > Duration::ZERO);
    assert!(meta.metrics.result_size > 0);
    assert!(meta.warnings.is_empty());
    assert!(!meta.request_id.is_empty());
}

// ============================================================================
// Early termination
// ============================================================================

#[tokio::test]
async fn test_handler_failure_stops_iteration() {
    let transport = Arc::new(MockTransport::with_rows(100));
    let result = scope(&transport)
        .execute_query(&RequestContext::new(), "SELECT RAW 1", &[])
        .await
        .unwrap();

    let mut seen = Vec::new();
    let err = iterate_query_result(&RequestContext::new(), result, |row| {
        let value = row.content_as::<Row>()?.value;
        seen.push(value);
        if value == 5 {
            return Err(HandlerError::Stop(value));
        }
        Ok(())
    })
    .await
    .unwrap_err();

    assert!(matches!(err, HandlerError::Stop(5)));
    assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(transport.live_streams(), 0);
}

#[tokio::test]
async fn test_cancellation_unblocks_a_stalled_stream() {
    let transport = Arc::new(MockTransport::with_rows(100).block_rows_after(10));
    let logger = Arc::new(CapturingLogger::new());
    let result = scope_with_logger(&transport, &logger)
        .execute_query(&RequestContext::new(), "SELECT RAW 1", &[])
        .await
        .unwrap();

    let ctx = RequestContext::new();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let mut seen = 0;
    let err = iterate_query_result(&ctx, result, |_row| {
        seen += 1;
        Ok::<_, HandlerError>(())
    })
    .await
    .unwrap_err();

    match err {
        HandlerError::Columnar(err) => assert!(err.is_cancelled()),
        HandlerError::Stop(_) => panic!("handler never stops"),
    }
    assert_eq!(seen, 10);
    assert_eq!(transport.live_streams(), 0);
    assert!(logger.contains(LogLevel::Debug, "streaming iteration cancelled"));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_ends_iteration() {
    let transport = Arc::new(MockTransport::with_rows(100).block_rows_after(3));
    let result = scope(&transport)
        .execute_query(&RequestContext::new(), "SELECT RAW 1", &[])
        .await
        .unwrap();

    let ctx = RequestContext::with_timeout(Duration::from_secs(1));
    let err = iterate_query_result(&ctx, result, |_row| Ok::<_, ColumnarError>(()))
        .await
        .unwrap_err();

    assert!(err.is_deadline_exceeded());
    assert_eq!(transport.live_streams(), 0);
}

// ============================================================================
// Errors
// ============================================================================

#[tokio::test]
async fn test_cancelled_before_dispatch() {
    let transport = Arc::new(MockTransport::with_rows(1));
    let ctx = RequestContext::new();
    ctx.cancel();

    let err = scope(&transport)
        .execute_query(&ctx, "SELECT 1", &[])
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(err.to_string().contains(NOT_SENT_CANCELLED));
    assert_eq!(transport.dispatched(), 0);
}

#[tokio::test]
async fn test_expired_deadline_before_dispatch() {
    let transport = Arc::new(MockTransport::with_rows(1));
    let ctx = RequestContext::with_deadline(Instant::now());

    let err = scope(&transport)
        .execute_query(&ctx, "SELECT 1", &[])
        .await
        .unwrap_err();

    assert!(err.is_deadline_exceeded());
    assert!(err.to_string().contains(NOT_SENT_DEADLINE));
    assert_eq!(transport.dispatched(), 0);
}

#[tokio::test]
async fn test_cancel_after_dispatch_has_no_annotation() {
    let transport = Arc::new(MockTransport::with_rows(1).dispatch_delay(Duration::from_secs(5)));
    let ctx = RequestContext::new();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let err = scope(&transport)
        .execute_query(&ctx, "SELECT 1", &[])
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(!err.to_string().contains(NOT_SENT));
    assert_eq!(err.context().unwrap().statement(), "SELECT 1");
    assert_eq!(transport.dispatched(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_after_dispatch_has_no_annotation() {
    let transport = Arc::new(MockTransport::with_rows(1).dispatch_delay(Duration::from_secs(10)));
    let ctx = RequestContext::with_timeout(Duration::from_secs(1));

    let err = scope(&transport)
        .execute_query(&ctx, "SELECT 1", &[])
        .await
        .unwrap_err();

    assert!(err.is_deadline_exceeded());
    assert!(!err.to_string().contains(NOT_SENT));
    assert_eq!(transport.dispatched(), 1);
}

#[tokio::test]
async fn test_server_errors_are_classified() {
    let cases = [
        (24045, ErrorKind::Query),
        (20000, ErrorKind::InvalidCredential),
        (21002, ErrorKind::Timeout),
    ];
    for (code, kind) in cases {
        let failure = RequestFailure::new(
            FailureCause::Other("request failed".into()),
            "SELECT * FROM nope",
            "mock:18095",
        )
        .with_status(400)
        .with_errors(vec![ErrorDescriptor::new(code, "server said no")]);
        let transport = Arc::new(MockTransport::with_rows(0).fail_with(failure));

        let err = scope(&transport)
            .execute_query(&RequestContext::new(), "SELECT * FROM nope", &[])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), kind, "code {code}");
        let context = err.context().unwrap();
        assert_eq!(context.statement(), "SELECT * FROM nope");
        assert_eq!(context.status_code(), 400);
        assert_eq!(context.errors()[0].code, code);
    }
}

#[tokio::test]
async fn test_query_error_carries_code_and_message() {
    let failure = RequestFailure::new(FailureCause::Other("bad".into()), "SELEC 1", "mock:18095")
        .with_status(400)
        .with_errors(vec![ErrorDescriptor::new(24000, "Syntax error")]);
    let transport = Arc::new(MockTransport::with_rows(0).fail_with(failure));

    let err = scope(&transport)
        .execute_query(&RequestContext::new(), "SELEC 1", &[])
        .await
        .unwrap_err();

    assert!(err.is_query_error());
    let query_err = err.as_query_error().unwrap();
    assert_eq!(query_err.code(), 24000);
    assert_eq!(query_err.message(), "Syntax error");
}

#[tokio::test]
async fn test_unauthorized_status() {
    let failure = RequestFailure::new(FailureCause::Other("".into()), "SELECT 1", "mock:18095")
        .with_status(401);
    let transport = Arc::new(MockTransport::with_rows(0).fail_with(failure));

    let err = scope(&transport)
        .execute_query(&RequestContext::new(), "SELECT 1", &[])
        .await
        .unwrap_err();
    assert!(err.is_invalid_credential());
}

#[tokio::test]
async fn test_stream_failure_after_rows() {
    let transport = Arc::new(MockTransport::with_rows(100).fail_rows_after(5));
    let mut result = scope(&transport)
        .execute_query(&RequestContext::new(), "SELECT RAW 1", &[])
        .await
        .unwrap();

    let mut delivered = 0;
    while result.next_row().await.is_some() {
        delivered += 1;
    }
    assert_eq!(delivered, 5);

    let err = result.err().unwrap_err();
    assert!(err.is_query_error());
    assert_eq!(err.as_query_error().unwrap().code(), MOCK_STREAM_ERROR_CODE);
    assert!(result.metadata().unwrap_err().is_query_error());
}

#[tokio::test]
async fn test_closed_result_rejected() {
    let transport = Arc::new(MockTransport::with_rows(3));
    let scope = scope(&transport);
    let ctx = RequestContext::new();

    let mut result = scope.execute_query(&ctx, "SELECT RAW 1", &[]).await.unwrap();
    result.close();
    let err = iterate_query_result(&ctx, result, |_row| Ok::<_, ColumnarError>(()))
        .await
        .unwrap_err();
    assert!(err.is_invalid_argument());

    let mut result = scope.execute_query(&ctx, "SELECT RAW 1", &[]).await.unwrap();
    result.close();
    assert!(buffer_query_result(result).await.unwrap_err().is_invalid_argument());
}
