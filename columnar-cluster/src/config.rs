//! Cluster configuration.
//!
//! Options come from two places: the [`ClusterOptions`] passed by the caller
//! and the query parameters of the connection string. Connection string
//! parameters win. The result is validated into a [`ClusterConfig`].

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use columnar_query::duration::parse_duration;
use columnar_query::{
    ColumnarError, ColumnarResult, Decoder, JsonDecoder, Logger, TracingLogger,
};
use rustls::pki_types::CertificateDer;

use crate::connstr::{ConnectionString, SECURE_SCHEME, parse_bool};
use crate::discovery::SrvResolver;

/// Default time allowed to establish a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time allowed to dispatch a request.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default server-side query timeout.
pub const DEFAULT_SERVER_QUERY_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Which certificates to trust when verifying the server.
#[derive(Clone, Default)]
pub enum TrustOnly {
    /// The bundled Mozilla root set.
    #[default]
    BundledCa,
    /// The operating system's trust store.
    System,
    /// PEM-encoded certificates read from a file.
    PemFile(PathBuf),
    /// PEM-encoded certificates given inline.
    PemString(String),
    /// Explicit DER certificates.
    Certificates(Vec<CertificateDer<'static>>),
}

impl fmt::Debug for TrustOnly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BundledCa => f.write_str("BundledCa"),
            Self::System => f.write_str("System"),
            Self::PemFile(path) => f.debug_tuple("PemFile").field(path).finish(),
            Self::PemString(_) => f.write_str("PemString(..)"),
            Self::Certificates(certs) => write!(f, "Certificates({} certs)", certs.len()),
        }
    }
}

/// Timeout settings.
#[derive(Debug, Clone, Default)]
pub struct TimeoutOptions {
    connect_timeout: Option<Duration>,
    dispatch_timeout: Option<Duration>,
    server_query_timeout: Option<Duration>,
}

impl TimeoutOptions {
    /// Create empty timeout options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Time allowed to establish a connection. Default 10 seconds.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Time allowed to dispatch a request. Default 30 seconds.
    #[must_use]
    pub fn dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = Some(timeout);
        self
    }

    /// How long the server may run a query. Default 10 minutes.
    #[must_use]
    pub fn server_query_timeout(mut self, timeout: Duration) -> Self {
        self.server_query_timeout = Some(timeout);
        self
    }

    fn merge_from(&mut self, other: &TimeoutOptions) {
        if other.connect_timeout.is_some() {
            self.connect_timeout = other.connect_timeout;
        }
        if other.dispatch_timeout.is_some() {
            self.dispatch_timeout = other.dispatch_timeout;
        }
        if other.server_query_timeout.is_some() {
            self.server_query_timeout = other.server_query_timeout;
        }
    }
}

/// TLS settings.
#[derive(Debug, Clone, Default)]
pub struct SecurityOptions {
    trust_only: Option<TrustOnly>,
    disable_server_certificate_verification: Option<bool>,
    cipher_suites: Vec<String>,
}

impl SecurityOptions {
    /// Create empty security options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Which certificates to trust. Default [`TrustOnly::BundledCa`].
    #[must_use]
    pub fn trust_only(mut self, trust_only: TrustOnly) -> Self {
        self.trust_only = Some(trust_only);
        self
    }

    /// Accept any server certificate. Insecure; for development only.
    #[must_use]
    pub fn disable_server_certificate_verification(mut self, disabled: bool) -> Self {
        self.disable_server_certificate_verification = Some(disabled);
        self
    }

    /// Restrict TLS to the named cipher suites. Empty means the runtime default.
    #[must_use]
    pub fn cipher_suites<I, S>(mut self, suites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cipher_suites = suites.into_iter().map(Into::into).collect();
        self
    }

    fn merge_from(&mut self, other: &SecurityOptions) {
        if other.trust_only.is_some() {
            self.trust_only.clone_from(&other.trust_only);
        }
        if other.disable_server_certificate_verification.is_some() {
            self.disable_server_certificate_verification =
                other.disable_server_certificate_verification;
        }
        if !other.cipher_suites.is_empty() {
            self.cipher_suites.clone_from(&other.cipher_suites);
        }
    }
}

/// Options for connecting to a cluster.
///
/// ```rust
/// use std::time::Duration;
/// use columnar_cluster::{ClusterOptions, SecurityOptions, TimeoutOptions, TrustOnly};
///
/// let opts = ClusterOptions::new()
///     .timeout_options(TimeoutOptions::new().connect_timeout(Duration::from_secs(5)))
///     .security_options(SecurityOptions::new().trust_only(TrustOnly::System));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ClusterOptions {
    timeout_options: TimeoutOptions,
    security_options: SecurityOptions,
    decoder: Option<Arc<dyn Decoder>>,
    logger: Option<Arc<dyn Logger>>,
    srv_resolver: Option<Arc<dyn SrvResolver>>,
}

impl ClusterOptions {
    /// Create empty cluster options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout options.
    #[must_use]
    pub fn timeout_options(mut self, opts: TimeoutOptions) -> Self {
        self.timeout_options = opts;
        self
    }

    /// Set the security options.
    #[must_use]
    pub fn security_options(mut self, opts: SecurityOptions) -> Self {
        self.security_options = opts;
        self
    }

    /// Default decoder for query rows. Default JSON.
    #[must_use]
    pub fn decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Where the client logs. Default [`TracingLogger`].
    #[must_use]
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// How SRV records are looked up. Default uses the system resolver.
    #[must_use]
    pub fn srv_resolver(mut self, resolver: Arc<dyn SrvResolver>) -> Self {
        self.srv_resolver = Some(resolver);
        self
    }

    /// Merge `layers` in order. Later layers override earlier ones field by field.
    #[must_use]
    pub fn merge<'a>(layers: impl IntoIterator<Item = &'a ClusterOptions>) -> ClusterOptions {
        layers
            .into_iter()
            .fold(ClusterOptions::default(), |mut acc, layer| {
                acc.timeout_options.merge_from(&layer.timeout_options);
                acc.security_options.merge_from(&layer.security_options);
                if layer.decoder.is_some() {
                    acc.decoder.clone_from(&layer.decoder);
                }
                if layer.logger.is_some() {
                    acc.logger.clone_from(&layer.logger);
                }
                if layer.srv_resolver.is_some() {
                    acc.srv_resolver.clone_from(&layer.srv_resolver);
                }
                acc
            })
    }

    pub(crate) fn take_srv_resolver(&mut self) -> Option<Arc<dyn SrvResolver>> {
        self.srv_resolver.take()
    }
}

/// Fully resolved and validated cluster settings.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Time allowed to establish a connection.
    pub connect_timeout: Duration,
    /// Time allowed to dispatch a request.
    pub dispatch_timeout: Duration,
    /// Default server-side query timeout.
    pub server_query_timeout: Duration,
    /// Trust policy.
    pub trust_only: TrustOnly,
    /// Whether certificate verification is disabled.
    pub disable_server_certificate_verification: bool,
    /// Cipher suite names, empty for the default set.
    pub cipher_suites: Vec<String>,
    /// Whether SRV discovery may be used.
    pub use_srv: bool,
    /// Default row decoder.
    pub decoder: Arc<dyn Decoder>,
    /// Logger.
    pub logger: Arc<dyn Logger>,
}

impl ClusterConfig {
    /// Resolve options without a connection string.
    pub fn from_options(opts: &ClusterOptions) -> ColumnarResult<Self> {
        let timeouts = &opts.timeout_options;
        let security = &opts.security_options;

        let config = Self {
            connect_timeout: timeouts.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            dispatch_timeout: timeouts.dispatch_timeout.unwrap_or(DEFAULT_DISPATCH_TIMEOUT),
            server_query_timeout: timeouts
                .server_query_timeout
                .unwrap_or(DEFAULT_SERVER_QUERY_TIMEOUT),
            trust_only: security.trust_only.clone().unwrap_or_default(),
            disable_server_certificate_verification: security
                .disable_server_certificate_verification
                .unwrap_or(false),
            cipher_suites: security.cipher_suites.clone(),
            use_srv: true,
            decoder: opts
                .decoder
                .clone()
                .unwrap_or_else(|| Arc::new(JsonDecoder)),
            logger: opts
                .logger
                .clone()
                .unwrap_or_else(|| Arc::new(TracingLogger)),
        };
        config.validate()?;
        Ok(config)
    }

    /// Resolve options, letting connection string parameters override them.
    pub fn resolve(conn: &ConnectionString, opts: &ClusterOptions) -> ColumnarResult<Self> {
        if conn.scheme() != SECURE_SCHEME {
            return Err(ColumnarError::invalid_argument(
                "scheme",
                "only couchbases scheme is supported",
            ));
        }

        let mut opts = opts.clone();
        let timeouts = &mut opts.timeout_options;
        if let Some(value) = conn.param("timeout.connect_timeout") {
            timeouts.connect_timeout = Some(duration_param("timeout.connect_timeout", value)?);
        }
        if let Some(value) = conn.param("timeout.dispatch_timeout") {
            timeouts.dispatch_timeout = Some(duration_param("timeout.dispatch_timeout", value)?);
        }
        if let Some(value) = conn.param("timeout.server_query_timeout") {
            timeouts.server_query_timeout =
                Some(duration_param("timeout.server_query_timeout", value)?);
        }

        let security = &mut opts.security_options;
        if let Some(path) = conn.param("security.trust_only_pem_file") {
            security.trust_only = Some(TrustOnly::PemFile(PathBuf::from(path)));
        }
        if let Some(value) = conn.param("security.disable_server_certificate_verification") {
            security.disable_server_certificate_verification = Some(parse_bool(
                "security.disable_server_certificate_verification",
                value,
            )?);
        }
        if let Some(value) = conn.param("security.cipher_suites") {
            security.cipher_suites = value
                .split(',')
                .map(str::trim)
                .filter(|suite| !suite.is_empty())
                .map(String::from)
                .collect();
        }

        let mut config = Self::from_options(&opts)?;
        if let Some(value) = conn.param("srv") {
            config.use_srv = parse_bool("srv", value)?;
        }
        Ok(config)
    }

    fn validate(&self) -> ColumnarResult<()> {
        for (argument, value) in [
            ("connect_timeout", self.connect_timeout),
            ("dispatch_timeout", self.dispatch_timeout),
            ("server_query_timeout", self.server_query_timeout),
        ] {
            if value.is_zero() {
                return Err(ColumnarError::invalid_argument(
                    argument,
                    "must be greater than 0",
                ));
            }
        }
        Ok(())
    }
}

fn duration_param(argument: &str, value: &str) -> ColumnarResult<Duration> {
    parse_duration(value).map_err(|reason| ColumnarError::invalid_argument(argument, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(conn_str: &str, opts: &ClusterOptions) -> ColumnarResult<ClusterConfig> {
        ClusterConfig::resolve(&ConnectionString::parse(conn_str).unwrap(), opts)
    }

    #[test]
    fn test_defaults() {
        let config = resolve("couchbases://db", &ClusterOptions::new()).unwrap();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.dispatch_timeout, Duration::from_secs(30));
        assert_eq!(config.server_query_timeout, Duration::from_secs(600));
        assert!(matches!(config.trust_only, TrustOnly::BundledCa));
        assert!(!config.disable_server_certificate_verification);
        assert!(config.cipher_suites.is_empty());
        assert!(config.use_srv);
    }

    #[test]
    fn test_rejects_insecure_scheme() {
        let err = resolve("couchbase://db", &ClusterOptions::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid argument scheme - only couchbases scheme is supported"
        );
    }

    #[test]
    fn test_connection_string_overrides_options() {
        let opts = ClusterOptions::new()
            .timeout_options(TimeoutOptions::new().connect_timeout(Duration::from_secs(1)))
            .security_options(SecurityOptions::new().cipher_suites(["TLS_AES_128_GCM_SHA256"]));

        let config = resolve(
            "couchbases://db?timeout.connect_timeout=2s&timeout.dispatch_timeout=1m\
             &timeout.server_query_timeout=1h&srv=0\
             &security.disable_server_certificate_verification=true\
             &security.cipher_suites=TLS_AES_256_GCM_SHA384,TLS_CHACHA20_POLY1305_SHA256\
             &security.trust_only_pem_file=/etc/ca.pem",
            &opts,
        )
        .unwrap();

        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.dispatch_timeout, Duration::from_secs(60));
        assert_eq!(config.server_query_timeout, Duration::from_secs(3600));
        assert!(!config.use_srv);
        assert!(config.disable_server_certificate_verification);
        assert_eq!(
            config.cipher_suites,
            vec!["TLS_AES_256_GCM_SHA384", "TLS_CHACHA20_POLY1305_SHA256"]
        );
        assert!(matches!(
            config.trust_only,
            TrustOnly::PemFile(ref p) if p == &PathBuf::from("/etc/ca.pem")
        ));
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        for param in [
            "timeout.connect_timeout",
            "timeout.dispatch_timeout",
            "timeout.server_query_timeout",
        ] {
            let err = resolve(&format!("couchbases://db?{param}=0s"), &ClusterOptions::new())
                .unwrap_err();
            assert!(err.is_invalid_argument(), "{param}");
            assert!(err.to_string().contains("must be greater than 0"));
        }

        let opts = ClusterOptions::new()
            .timeout_options(TimeoutOptions::new().dispatch_timeout(Duration::ZERO));
        assert!(ClusterConfig::from_options(&opts).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_malformed_params_name_the_parameter() {
        let err = resolve("couchbases://db?srv=maybe", &ClusterOptions::new()).unwrap_err();
        assert!(err.to_string().starts_with("invalid argument srv - "));

        let err = resolve(
            "couchbases://db?timeout.connect_timeout=fast",
            &ClusterOptions::new(),
        )
        .unwrap_err();
        assert!(err.to_string().starts_with("invalid argument timeout.connect_timeout - "));
    }

    #[test]
    fn test_merge_is_field_by_field() {
        let first = ClusterOptions::new()
            .timeout_options(
                TimeoutOptions::new()
                    .connect_timeout(Duration::from_secs(1))
                    .dispatch_timeout(Duration::from_secs(2)),
            )
            .security_options(SecurityOptions::new().cipher_suites(["A"]));
        let second = ClusterOptions::new()
            .timeout_options(TimeoutOptions::new().dispatch_timeout(Duration::from_secs(3)))
            .security_options(SecurityOptions::new().disable_server_certificate_verification(true));

        let merged = ClusterOptions::merge([&first, &second]);
        let config = ClusterConfig::from_options(&merged).unwrap();
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.dispatch_timeout, Duration::from_secs(3));
        assert_eq!(config.cipher_suites, vec!["A"]);
        assert!(config.disable_server_certificate_verification);
    }
}
