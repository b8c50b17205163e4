//! Logging for the Columnar client.
//!
//! The client reports through a [`Logger`], configured per cluster. The
//! default, [`TracingLogger`], forwards to the `tracing` macros under the
//! `columnar` target; [`NoopLogger`] discards everything.
//!
//! # Environment Variables
//!
//! Applications that do not set up `tracing` themselves can enable the
//! `tracing-subscriber` feature and call `logging::init()` once at startup.
//! It installs a global subscriber controlled by:
//!
//! - `COLUMNAR_DEBUG=true` - Enable debug logging
//! - `COLUMNAR_LOG_LEVEL=debug|info|warn|error|trace` - Set specific log level
//! - `COLUMNAR_LOG_FORMAT=json|pretty|compact` - Set output format (default: json)
//!
//! ```rust
//! use columnar_query::logging::SubscriberSettings;
//!
//! if let Some(settings) = SubscriberSettings::from_env() {
//!     println!("logging at {} as {:?}", settings.level, settings.format);
//! }
//! ```

use std::env;
use std::fmt;
use std::str::FromStr;

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// Failures.
    Error,
    /// Suspicious but non-fatal conditions.
    Warn,
    /// Lifecycle events.
    Info,
    /// Diagnostic detail.
    Debug,
    /// Very verbose detail.
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        })
    }
}

/// Receives the client's log records.
pub trait Logger: Send + Sync + fmt::Debug {
    /// Record one message.
    fn log(&self, level: LogLevel, message: &str);

    /// Record an error.
    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    /// Record a warning.
    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    /// Record a lifecycle event.
    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    /// Record diagnostic detail.
    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    /// Record verbose detail.
    fn trace(&self, message: &str) {
        self.log(LogLevel::Trace, message);
    }
}

/// Forwards records to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Error => tracing::error!(target: "columnar", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "columnar", "{message}"),
            LogLevel::Info => tracing::info!(target: "columnar", "{message}"),
            LogLevel::Debug => tracing::debug!(target: "columnar", "{message}"),
            LogLevel::Trace => tracing::trace!(target: "columnar", "{message}"),
        }
    }
}

/// Discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _level: LogLevel, _message: &str) {}
}

/// Output format of the subscriber installed by `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per record.
    #[default]
    Json,
    /// Multi-line, human readable.
    Pretty,
    /// Single-line, human readable.
    Compact,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            other => Err(format!("unknown log level {other:?}")),
        }
    }
}

/// Subscriber settings taken from the `COLUMNAR_*` environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberSettings {
    /// Most verbose level to emit.
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
}

impl SubscriberSettings {
    /// Read the process environment.
    ///
    /// Returns `None` unless `COLUMNAR_DEBUG` is truthy or `COLUMNAR_LOG_LEVEL`
    /// is set. An unrecognized level falls back to `debug` when
    /// `COLUMNAR_DEBUG` is on and `warn` otherwise.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let debug = lookup("COLUMNAR_DEBUG")
            .is_some_and(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"));
        let level = lookup("COLUMNAR_LOG_LEVEL");
        if !debug && level.is_none() {
            return None;
        }

        let fallback = if debug { LogLevel::Debug } else { LogLevel::Warn };
        let format = match lookup("COLUMNAR_LOG_FORMAT") {
            Some(format) => match format.to_lowercase().as_str() {
                "pretty" => LogFormat::Pretty,
                "compact" => LogFormat::Compact,
                _ => LogFormat::Json,
            },
            None => LogFormat::default(),
        };
        Some(Self {
            level: level.and_then(|l| l.parse().ok()).unwrap_or(fallback),
            format,
        })
    }
}

/// Install a process-wide `tracing` subscriber, for applications that want one.
///
/// The client never calls this: it reports only through the [`Logger`] it was
/// given, and [`TracingLogger`] records are dropped unless the application
/// installs a subscriber. Does nothing when [`SubscriberSettings::from_env`]
/// returns `None` or a global subscriber already exists. Later calls are no-ops.
#[cfg(feature = "tracing-subscriber")]
#[cfg_attr(docsrs, doc(cfg(feature = "tracing-subscriber")))]
pub fn init() {
    use std::sync::Once;
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let Some(settings) = SubscriberSettings::from_env() else {
            return;
        };

        let level = settings.level;
        let filter = EnvFilter::try_new(format!(
            "columnar={level},columnar_query={level},columnar_cluster={level}"
        ))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

        let registry = tracing_subscriber::registry().with(filter);
        let installed = match settings.format {
            LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
            LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
            LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        };

        if installed.is_ok() {
            tracing::info!(
                target: "columnar",
                %level,
                format = ?settings.format,
                "logging initialized"
            );
        }
    });
}
