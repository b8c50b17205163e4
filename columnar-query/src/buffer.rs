//! Draining a query result into memory.

use serde::de::DeserializeOwned;

use crate::error::{ColumnarError, ColumnarResult};
use crate::metadata::QueryMetadata;
use crate::result::{QueryResult, QueryResultRow};

/// Read every row of `result`, then return the rows with the metadata.
///
/// A stream error discards the rows read so far.
pub async fn buffer_query_result(
    mut result: QueryResult,
) -> ColumnarResult<(Vec<QueryResultRow>, QueryMetadata)> {
    ensure_open(&result)?;

    let mut rows = Vec::new();
    while let Some(row) = result.next_row().await {
        rows.push(row);
    }

    result.err()?;
    let meta = result.metadata()?;
    Ok((rows, meta))
}

/// Read and decode every row of `result` into `T`.
///
/// The first decode failure closes the result and is returned; nothing read
/// so far is kept.
pub async fn buffer_query_result_as<T: DeserializeOwned>(
    mut result: QueryResult,
) -> ColumnarResult<(Vec<T>, QueryMetadata)> {
    ensure_open(&result)?;

    let mut rows = Vec::new();
    while let Some(row) = result.next_row().await {
        match row.content_as() {
            Ok(value) => rows.push(value),
            Err(err) => {
                result.close();
                return Err(err);
            }
        }
    }

    result.err()?;
    let meta = result.metadata()?;
    Ok((rows, meta))
}

fn ensure_open(result: &QueryResult) -> ColumnarResult<()> {
    if result.is_closed() {
        return Err(ColumnarError::invalid_argument(
            "result",
            "result has been closed",
        ));
    }
    Ok(())
}
