//! Push-style consumption of a query result.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::context::RequestContext;
use crate::error::ColumnarError;
use crate::metadata::QueryMetadata;
use crate::result::{QueryResult, QueryResultRow};

/// Call `handler` once per row, in order, and return the metadata.
///
/// Rows are pulled by one background task and handed over one at a time. If
/// `handler` fails, the result is closed and that failure is returned at
/// once. If `ctx` is cancelled or its deadline passes first, the result is
/// closed and the cancellation is returned. Either way the background task
/// has finished by the time this returns.
///
/// ```rust,no_run
/// # use columnar_query::{ColumnarError, QueryResult, RequestContext, iterate_query_result};
/// # async fn run(result: QueryResult) -> Result<(), ColumnarError> {
/// let ctx = RequestContext::new();
/// let meta = iterate_query_result(&ctx, result, |row| {
///     let value: serde_json::Value = row.content_as()?;
///     println!("{value}");
///     Ok::<_, ColumnarError>(())
/// })
/// .await?;
/// println!("{} rows", meta.metrics.result_count);
/// # Ok(())
/// # }
/// ```
pub async fn iterate_query_result<F, E>(
    ctx: &RequestContext,
    result: QueryResult,
    mut handler: F,
) -> Result<QueryMetadata, E>
where
    F: FnMut(QueryResultRow) -> Result<(), E>,
    E: From<ColumnarError>,
{
    if result.is_closed() {
        return Err(ColumnarError::invalid_argument("result", "result has been closed").into());
    }

    let (mut reader, decoder, logger) = result.into_parts();
    let close = reader.close_handle();
    // Closes the reader if this future is dropped before the producer is joined.
    let guard = close.close_on_drop();

    let (tx, mut rx) = mpsc::channel::<Bytes>(1);
    let producer = tokio::spawn(async move {
        while let Some(row) = reader.next_row().await {
            if tx.send(row).await.is_err() {
                break;
            }
        }
        reader
    });

    let outcome: Result<(), E> = loop {
        tokio::select! {
            biased;
            cause = ctx.done() => {
                logger.debug(&format!("streaming iteration cancelled: {cause}"));
                close.close();
                break Err(ColumnarError::from(cause).into());
            }
            row = rx.recv() => match row {
                Some(bytes) => {
                    if let Err(err) = handler(QueryResultRow::new(bytes, Arc::clone(&decoder))) {
                        close.close();
                        break Err(err);
                    }
                }
                None => break Ok(()),
            },
        }
    };
    drop(rx);

    let mut reader = match producer.await {
        Ok(reader) => reader,
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(_) => return Err(ColumnarError::Closed.into()),
    };
    let _ = guard.disarm();
    outcome?;

    reader.err()?;
    Ok(reader.metadata()?)
}
