//! Pull-based reader over a transport row stream.

use bytes::Bytes;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::{ColumnarError, ColumnarResult};
use crate::metadata::QueryMetadata;
use crate::translate::translate_error;
use crate::transport::RowStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    Open,
    Exhausted,
    Errored,
    Closed,
}

/// Closes a [`RowReader`] from another task.
///
/// Closing unblocks a pull that is waiting on the network; the reader reports
/// end of rows from then on.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    token: CancellationToken,
}

impl CloseHandle {
    /// Request the reader to close. Idempotent.
    pub fn close(&self) {
        self.token.cancel();
    }

    /// Whether close has been requested.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A guard that closes the reader when dropped, unless disarmed first.
    #[must_use]
    pub fn close_on_drop(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }
}

/// Reads raw rows from one in-flight query.
pub struct RowReader {
    stream: Box<dyn RowStream>,
    state: ReaderState,
    error: Option<ColumnarError>,
    closed: CancellationToken,
}

impl std::fmt::Debug for RowReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowReader")
            .field("state", &self.state)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl RowReader {
    /// Wrap a transport stream.
    pub fn new(stream: Box<dyn RowStream>) -> Self {
        Self {
            stream,
            state: ReaderState::Open,
            error: None,
            closed: CancellationToken::new(),
        }
    }

    /// A handle that can close this reader from elsewhere.
    #[must_use]
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            token: self.closed.clone(),
        }
    }

    /// The next raw row, or `None` once the rows end, fail, or the reader is closed.
    pub async fn next_row(&mut self) -> Option<Bytes> {
        self.observe_close();
        if self.state != ReaderState::Open {
            return None;
        }

        let closed = &self.closed;
        let stream = &mut self.stream;
        let pulled = tokio::select! {
            biased;
            _ = closed.cancelled() => None,
            pulled = stream.next_row() => Some(pulled),
        };

        match pulled {
            None => {
                self.shutdown(ReaderState::Closed);
                None
            }
            Some(Ok(Some(row))) => Some(row),
            Some(Ok(None)) => {
                self.state = ReaderState::Exhausted;
                None
            }
            Some(Err(err)) => {
                self.error = Some(translate_error(err));
                self.shutdown(ReaderState::Errored);
                None
            }
        }
    }

    /// The terminal stream error, if the rows ended in failure.
    pub fn err(&self) -> ColumnarResult<()> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// The trailing metadata. Valid once the rows have been read to the end.
    pub fn metadata(&mut self) -> ColumnarResult<QueryMetadata> {
        self.observe_close();
        match self.state {
            ReaderState::Open => Err(ColumnarError::invalid_argument(
                "metadata",
                "the result must be fully read before accessing metadata",
            )),
            ReaderState::Errored => Err(self.error.clone().unwrap_or(ColumnarError::Closed)),
            ReaderState::Closed => Err(ColumnarError::Closed),
            ReaderState::Exhausted => self.stream.metadata().map_err(translate_error),
        }
    }

    /// Close the reader and release the stream. Safe to call in any state.
    pub fn close(&mut self) {
        self.closed.cancel();
        self.observe_close();
    }

    /// Whether the reader was closed before its rows were exhausted.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == ReaderState::Closed
            || (self.state == ReaderState::Open && self.closed.is_cancelled())
    }

    fn observe_close(&mut self) {
        if self.state == ReaderState::Open && self.closed.is_cancelled() {
            self.shutdown(ReaderState::Closed);
        }
    }

    fn shutdown(&mut self, state: ReaderState) {
        self.stream.close();
        self.state = state;
    }
}

impl Drop for RowReader {
    fn drop(&mut self) {
        if self.state == ReaderState::Open {
            self.stream.close();
        }
    }
}
