//! Translation of an effective option set into a wire request.

use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::Instant;

use crate::context::RequestContext;
use crate::duration::format_duration;
use crate::error::{ColumnarError, ColumnarResult};
use crate::options::QueryOptions;

/// Added to a caller deadline so the local deadline fires before the server gives up.
pub const DEADLINE_SAFETY_MARGIN: Duration = Duration::from_secs(5);

/// Value of the priority marker for high-priority queries.
pub const HIGH_PRIORITY: i32 = -1;

/// The database and scope a query runs against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    /// Database name.
    pub database: String,
    /// Scope name.
    pub scope: String,
}

impl Namespace {
    /// Create a namespace.
    pub fn new(database: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            scope: scope.into(),
        }
    }

    /// The `query_context` value for this namespace.
    #[must_use]
    pub fn query_context(&self) -> String {
        format!("default:`{}`.`{}`", self.database, self.scope)
    }
}

/// A translated request, ready for a [`Transport`](crate::Transport).
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// The JSON body.
    pub payload: Map<String, Value>,
    /// Priority marker to send beside the body, if any.
    pub priority: Option<i32>,
    /// The statement, for diagnostics.
    pub statement: String,
    /// The client context id written into the payload.
    pub client_context_id: String,
    /// The server-side timeout written into the payload.
    pub timeout: Duration,
}

impl QueryRequest {
    /// Serialize the payload.
    pub fn body(&self) -> ColumnarResult<Vec<u8>> {
        serde_json::to_vec(&self.payload)
            .map_err(|e| ColumnarError::invalid_argument("payload", e.to_string()))
    }
}

/// Build a request from a statement, merged options and the caller's context.
///
/// The server timeout is the explicit per-call timeout when set, otherwise the
/// time left on the caller's deadline plus [`DEADLINE_SAFETY_MARGIN`],
/// otherwise `default_timeout`. Raw entries are written last and may replace
/// any other key.
pub fn translate_request(
    statement: &str,
    opts: &QueryOptions,
    ctx: &RequestContext,
    default_timeout: Duration,
    namespace: Option<&Namespace>,
) -> ColumnarResult<QueryRequest> {
    let client_context_id = uuid::Uuid::new_v4().to_string();
    let timeout = resolve_timeout(opts.server_query_timeout, ctx.deadline_at(), default_timeout);

    let mut payload = Map::new();
    payload.insert("statement".into(), Value::String(statement.to_string()));
    payload.insert(
        "client_context_id".into(),
        Value::String(client_context_id.clone()),
    );

    if !opts.positional_parameters.is_empty() {
        payload.insert(
            "args".into(),
            Value::Array(opts.positional_parameters.clone()),
        );
    }

    for (name, value) in &opts.named_parameters {
        if name.is_empty() || name == "$" {
            return Err(ColumnarError::invalid_argument(
                "named_parameters",
                "parameter name cannot be empty",
            ));
        }
        let key = if name.starts_with('$') {
            name.clone()
        } else {
            format!("${name}")
        };
        payload.insert(key, value.clone());
    }

    if let Some(read_only) = opts.read_only {
        payload.insert("readonly".into(), Value::Bool(read_only));
    }

    if let Some(consistency) = opts.scan_consistency {
        payload.insert(
            "scan_consistency".into(),
            Value::String(consistency.as_str().to_string()),
        );
    }

    payload.insert("timeout".into(), Value::String(format_duration(timeout)));

    if let Some(namespace) = namespace {
        payload.insert(
            "query_context".into(),
            Value::String(namespace.query_context()),
        );
    }

    for (key, value) in &opts.raw {
        payload.insert(key.clone(), value.clone());
    }

    let priority = match opts.priority {
        Some(true) => Some(HIGH_PRIORITY),
        _ => None,
    };

    Ok(QueryRequest {
        payload,
        priority,
        statement: statement.to_string(),
        client_context_id,
        timeout,
    })
}

fn resolve_timeout(
    explicit: Option<Duration>,
    deadline: Option<Instant>,
    default: Duration,
) -> Duration {
    if let Some(timeout) = explicit {
        return timeout;
    }
    if let Some(deadline) = deadline {
        return deadline.saturating_duration_since(Instant::now()) + DEADLINE_SAFETY_MARGIN;
    }
    default
}
