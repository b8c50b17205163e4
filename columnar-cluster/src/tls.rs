//! TLS client configuration.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::Arc;

use columnar_query::{ColumnarError, ColumnarResult};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::WebPkiSupportedAlgorithms;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{
    ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme, SupportedCipherSuite,
};

use crate::config::{ClusterConfig, TrustOnly};

/// Build the rustls client configuration for `config`.
pub fn build_tls_config(config: &ClusterConfig) -> ColumnarResult<ClientConfig> {
    let mut provider = rustls::crypto::ring::default_provider();
    if !config.cipher_suites.is_empty() {
        provider.cipher_suites = select_cipher_suites(config)?;
    }
    let provider = Arc::new(provider);

    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| ColumnarError::invalid_argument("cipher_suites", e.to_string()))?;

    if config.disable_server_certificate_verification {
        config.logger.warn(
            "server certificate verification is disabled; this is insecure and must not be used in production",
        );
        let verifier = InsecureVerifier {
            algorithms: provider.signature_verification_algorithms,
        };
        return Ok(builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_no_client_auth());
    }

    let roots = root_store(&config.trust_only)?;
    Ok(builder.with_root_certificates(roots).with_no_client_auth())
}

fn root_store(trust_only: &TrustOnly) -> ColumnarResult<RootCertStore> {
    let mut roots = RootCertStore::empty();
    match trust_only {
        TrustOnly::BundledCa => {
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
        TrustOnly::System => {
            let loaded = rustls_native_certs::load_native_certs();
            if loaded.certs.is_empty() {
                if let Some(err) = loaded.errors.first() {
                    return Err(trust_error(format!("failed to load system certificates: {err}")));
                }
            }
            roots.add_parsable_certificates(loaded.certs);
        }
        TrustOnly::PemFile(path) => {
            let file = File::open(path).map_err(|e| {
                trust_error(format!("failed to read {}: {e}", path.display()))
            })?;
            add_pem(&mut roots, &mut BufReader::new(file))?;
        }
        TrustOnly::PemString(pem) => {
            add_pem(&mut roots, &mut pem.as_bytes())?;
        }
        TrustOnly::Certificates(certs) => {
            for cert in certs {
                roots
                    .add(cert.clone())
                    .map_err(|e| trust_error(format!("invalid certificate: {e}")))?;
            }
        }
    }

    if roots.is_empty() {
        return Err(trust_error("no trusted certificates found"));
    }
    Ok(roots)
}

fn add_pem(roots: &mut RootCertStore, reader: &mut dyn BufRead) -> ColumnarResult<()> {
    for cert in rustls_pemfile::certs(reader) {
        let cert = cert.map_err(|e| trust_error(format!("invalid PEM: {e}")))?;
        roots
            .add(cert)
            .map_err(|e| trust_error(format!("invalid certificate: {e}")))?;
    }
    Ok(())
}

fn trust_error(reason: impl Into<String>) -> ColumnarError {
    ColumnarError::invalid_argument("trust_only", reason)
}

/// Resolve cipher suite names such as `TLS_AES_128_GCM_SHA256` or
/// `TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256` to the suites rustls implements.
fn select_cipher_suites(config: &ClusterConfig) -> ColumnarResult<Vec<SupportedCipherSuite>> {
    config
        .cipher_suites
        .iter()
        .map(|name| {
            let suite = find_cipher_suite(name).ok_or_else(|| {
                ColumnarError::invalid_argument(
                    "cipher_suites",
                    format!("unsupported cipher suite {name}"),
                )
            })?;
            if suite.tls13().is_none() {
                config
                    .logger
                    .debug(&format!("cipher suite {name} is a legacy TLS 1.2 suite"));
            }
            Ok(suite)
        })
        .collect()
}

fn find_cipher_suite(name: &str) -> Option<SupportedCipherSuite> {
    rustls::crypto::ring::ALL_CIPHER_SUITES
        .iter()
        .copied()
        .find(|suite| cipher_suite_name(suite) == name)
}

fn cipher_suite_name(suite: &SupportedCipherSuite) -> String {
    let name = format!("{:?}", suite.suite());
    match name.strip_prefix("TLS13_") {
        Some(rest) => format!("TLS_{rest}"),
        None => name,
    }
}

/// Accepts any certificate but still checks handshake signatures.
#[derive(Debug)]
struct InsecureVerifier {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for InsecureVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClusterOptions, SecurityOptions};
    use columnar_query::LogLevel;
    use columnar_query::mock::CapturingLogger;

    fn config(security: SecurityOptions, logger: Arc<CapturingLogger>) -> ClusterConfig {
        ClusterConfig::from_options(
            &ClusterOptions::new()
                .security_options(security)
                .logger(logger),
        )
        .unwrap()
    }

    #[test]
    fn test_bundled_roots() {
        let logger = Arc::new(CapturingLogger::new());
        assert!(build_tls_config(&config(SecurityOptions::new(), logger)).is_ok());
    }

    #[test]
    fn test_insecure_mode_warns() {
        let logger = Arc::new(CapturingLogger::new());
        let security = SecurityOptions::new().disable_server_certificate_verification(true);
        build_tls_config(&config(security, Arc::clone(&logger))).unwrap();
        assert!(logger.contains(LogLevel::Warn, "insecure"));
    }

    #[test]
    fn test_cipher_suite_names() {
        let logger = Arc::new(CapturingLogger::new());
        let security = SecurityOptions::new().cipher_suites([
            "TLS_AES_128_GCM_SHA256",
            "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
        ]);
        build_tls_config(&config(security, Arc::clone(&logger))).unwrap();
        assert!(logger.contains(LogLevel::Debug, "legacy"));

        let security = SecurityOptions::new().cipher_suites(["TLS_RSA_WITH_RC4_128_SHA"]);
        let logger = Arc::new(CapturingLogger::new());
        let err = build_tls_config(&config(security, logger)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid argument cipher_suites - unsupported cipher suite TLS_RSA_WITH_RC4_128_SHA"
        );
    }

    #[test]
    fn test_bad_pem_is_invalid_trust() {
        let logger = Arc::new(CapturingLogger::new());
        let security = SecurityOptions::new().trust_only(TrustOnly::PemString("not a pem".into()));
        let err = build_tls_config(&config(security, logger)).unwrap_err();
        assert!(err.to_string().starts_with("invalid argument trust_only - "));

        let security = SecurityOptions::new()
            .trust_only(TrustOnly::PemFile("/nonexistent/ca.pem".into()));
        let logger = Arc::new(CapturingLogger::new());
        let err = build_tls_config(&config(security, logger)).unwrap_err();
        assert!(err.is_invalid_argument());
    }
}
