//! Trailing metadata of a completed query.

use std::time::Duration;

/// Metrics gathered while the query ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryMetrics {
    /// Total time from receipt to completion.
    pub elapsed_time: Duration,
    /// Time spent executing.
    pub execution_time: Duration,
    /// Number of rows returned.
    pub result_count: u64,
    /// Size of the rows in bytes.
    pub result_size: u64,
    /// Number of objects the server scanned.
    pub processed_objects: u64,
}

/// A non-fatal warning reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryWarning {
    /// Warning code.
    pub code: u32,
    /// Warning text.
    pub message: String,
}

/// Everything the server reported once the rows finished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryMetadata {
    /// Server-assigned request identifier.
    pub request_id: String,
    /// Execution metrics.
    pub metrics: QueryMetrics,
    /// Warnings, in the order reported.
    pub warnings: Vec<QueryWarning>,
}
