//! Query results and their rows.

use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::decode::Decoder;
use crate::error::{ColumnarError, ColumnarResult};
use crate::logging::{Logger, NoopLogger};
use crate::metadata::QueryMetadata;
use crate::reader::{CloseHandle, RowReader};

/// The streamed result of a query.
///
/// Rows are pulled with [`next_row`](Self::next_row). Once it returns `None`,
/// check [`err`](Self::err) and then read [`metadata`](Self::metadata).
#[derive(Debug)]
pub struct QueryResult {
    reader: RowReader,
    decoder: Arc<dyn Decoder>,
    logger: Arc<dyn Logger>,
}

impl QueryResult {
    /// Wrap a reader. Rows are decoded with `decoder`.
    pub fn new(reader: RowReader, decoder: Arc<dyn Decoder>) -> Self {
        Self {
            reader,
            decoder,
            logger: Arc::new(NoopLogger),
        }
    }

    /// Report consumption events to `logger`.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// The next row, or `None` when the rows have ended.
    pub async fn next_row(&mut self) -> Option<QueryResultRow> {
        let bytes = self.reader.next_row().await?;
        Some(self.row(bytes))
    }

    /// The error that ended the rows, if any.
    pub fn err(&self) -> ColumnarResult<()> {
        self.reader.err()
    }

    /// The trailing metadata, available once the rows are exhausted.
    pub fn metadata(&mut self) -> ColumnarResult<QueryMetadata> {
        self.reader.metadata()
    }

    /// Stop reading and release the underlying stream.
    pub fn close(&mut self) {
        self.reader.close();
    }

    /// Whether the result was closed before its rows were exhausted.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.reader.is_closed()
    }

    /// A handle that closes this result from another task.
    #[must_use]
    pub fn close_handle(&self) -> CloseHandle {
        self.reader.close_handle()
    }

    fn row(&self, bytes: Bytes) -> QueryResultRow {
        QueryResultRow::new(bytes, Arc::clone(&self.decoder))
    }

    pub(crate) fn into_parts(self) -> (RowReader, Arc<dyn Decoder>, Arc<dyn Logger>) {
        (self.reader, self.decoder, self.logger)
    }
}

/// One row of a query result.
///
/// The row keeps its raw bytes; decoding happens when content is requested.
#[derive(Debug, Clone)]
pub struct QueryResultRow {
    bytes: Bytes,
    decoder: Arc<dyn Decoder>,
}

impl QueryResultRow {
    pub(crate) fn new(bytes: Bytes, decoder: Arc<dyn Decoder>) -> Self {
        Self { bytes, decoder }
    }

    /// Decode the row into `T`.
    pub fn content_as<T: DeserializeOwned>(&self) -> ColumnarResult<T> {
        let value = self
            .decoder
            .decode(&self.bytes)
            .map_err(ColumnarError::unmarshal)?;
        serde_json::from_value(value).map_err(ColumnarError::unmarshal)
    }

    /// The raw row bytes, undecoded.
    #[must_use]
    pub fn content_raw(&self) -> &Bytes {
        &self.bytes
    }
}
