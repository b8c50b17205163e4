//! Per-query options and their layered merge.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use serde_json::Value;

use crate::decode::Decoder;
use crate::error::ColumnarError;

/// The level of data consistency required for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanConsistency {
    /// No consistency constraint.
    NotBounded,
    /// All mutations made before the request must be visible.
    RequestPlus,
}

impl ScanConsistency {
    /// The wire spelling of this mode.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotBounded => "not_bounded",
            Self::RequestPlus => "request_plus",
        }
    }
}

impl fmt::Display for ScanConsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u32> for ScanConsistency {
    type Error = ColumnarError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::NotBounded),
            2 => Ok(Self::RequestPlus),
            _ => Err(ColumnarError::invalid_argument(
                "scan_consistency",
                "unknown enumerator",
            )),
        }
    }
}

impl FromStr for ScanConsistency {
    type Err = ColumnarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_bounded" => Ok(Self::NotBounded),
            "request_plus" => Ok(Self::RequestPlus),
            _ => Err(ColumnarError::invalid_argument(
                "scan_consistency",
                "unknown enumerator",
            )),
        }
    }
}

/// Options for a single query execution.
///
/// Every field is optional. Several option sets may be passed to one call;
/// they are merged in order and a later set overrides an earlier one field by
/// field. Empty parameter lists and maps count as unset.
///
/// ```rust
/// use columnar_query::{QueryOptions, ScanConsistency};
///
/// let opts = QueryOptions::new()
///     .positional_parameter("frank")
///     .read_only(true)
///     .scan_consistency(ScanConsistency::RequestPlus);
/// ```
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub(crate) priority: Option<bool>,
    pub(crate) positional_parameters: Vec<Value>,
    pub(crate) named_parameters: IndexMap<String, Value>,
    pub(crate) read_only: Option<bool>,
    pub(crate) scan_consistency: Option<ScanConsistency>,
    pub(crate) server_query_timeout: Option<Duration>,
    pub(crate) raw: IndexMap<String, Value>,
    pub(crate) decoder: Option<Arc<dyn Decoder>>,
}

impl QueryOptions {
    /// Create an empty option set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the service to run this query at high priority.
    #[must_use]
    pub fn priority(mut self, priority: bool) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Replace the positional parameters.
    #[must_use]
    pub fn positional_parameters(mut self, params: Vec<Value>) -> Self {
        self.positional_parameters = params;
        self
    }

    /// Append one positional parameter.
    #[must_use]
    pub fn positional_parameter(mut self, param: impl Into<Value>) -> Self {
        self.positional_parameters.push(param.into());
        self
    }

    /// Replace the named parameters.
    #[must_use]
    pub fn named_parameters(mut self, params: IndexMap<String, Value>) -> Self {
        self.named_parameters = params;
        self
    }

    /// Add one named parameter. A leading `$` is optional.
    #[must_use]
    pub fn named_parameter(mut self, name: impl Into<String>, param: impl Into<Value>) -> Self {
        self.named_parameters.insert(name.into(), param.into());
        self
    }

    /// Declare the statement read-only.
    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = Some(read_only);
        self
    }

    /// Set the scan consistency.
    #[must_use]
    pub fn scan_consistency(mut self, scan_consistency: ScanConsistency) -> Self {
        self.scan_consistency = Some(scan_consistency);
        self
    }

    /// Set the server-side timeout for this query.
    #[must_use]
    pub fn server_query_timeout(mut self, timeout: Duration) -> Self {
        self.server_query_timeout = Some(timeout);
        self
    }

    /// Replace the raw payload entries.
    ///
    /// Raw entries are written last and overwrite any field of the same name.
    #[must_use]
    pub fn raw_map(mut self, raw: IndexMap<String, Value>) -> Self {
        self.raw = raw;
        self
    }

    /// Add one raw payload entry.
    #[must_use]
    pub fn raw(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.raw.insert(key.into(), value.into());
        self
    }

    /// Decode this query's rows with `decoder`.
    #[must_use]
    pub fn decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// The high-priority flag, if set.
    #[must_use]
    pub fn get_priority(&self) -> Option<bool> {
        self.priority
    }

    /// The server query timeout, if set.
    #[must_use]
    pub fn get_server_query_timeout(&self) -> Option<Duration> {
        self.server_query_timeout
    }

    /// The scan consistency, if set.
    #[must_use]
    pub fn get_scan_consistency(&self) -> Option<ScanConsistency> {
        self.scan_consistency
    }

    /// Merge `layers` in order into one effective option set.
    ///
    /// A field set in a later layer replaces the accumulated value; an unset
    /// field leaves it alone. No layers yields the empty option set.
    #[must_use]
    pub fn merge<'a>(layers: impl IntoIterator<Item = &'a QueryOptions>) -> QueryOptions {
        layers
            .into_iter()
            .fold(QueryOptions::default(), |mut acc, layer| {
                if layer.scan_consistency.is_some() {
                    acc.scan_consistency = layer.scan_consistency;
                }
                if layer.read_only.is_some() {
                    acc.read_only = layer.read_only;
                }
                if layer.priority.is_some() {
                    acc.priority = layer.priority;
                }
                if !layer.positional_parameters.is_empty() {
                    acc.positional_parameters = layer.positional_parameters.clone();
                }
                if !layer.named_parameters.is_empty() {
                    acc.named_parameters = layer.named_parameters.clone();
                }
                if !layer.raw.is_empty() {
                    acc.raw = layer.raw.clone();
                }
                if layer.decoder.is_some() {
                    acc.decoder = layer.decoder.clone();
                }
                if layer.server_query_timeout.is_some() {
                    acc.server_query_timeout = layer.server_query_timeout;
                }
                acc
            })
    }
}
