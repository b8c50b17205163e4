//! Connection string parser.
//!
//! Format: `couchbases://host[:port][,host[:port]...][?key=value&...]`.

use std::net::IpAddr;

use columnar_query::{ColumnarError, ColumnarResult};
use tracing::debug;

/// The only scheme the client accepts.
pub const SECURE_SCHEME: &str = "couchbases";

/// Port used when an address does not name one.
pub const DEFAULT_PORT: u16 = 18095;

/// One address from the connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAddress {
    /// Host name or IP literal, without brackets.
    pub host: String,
    /// Explicit port, if given.
    pub port: Option<u16>,
}

impl HostAddress {
    /// The port, or [`DEFAULT_PORT`].
    #[must_use]
    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }
}

/// A parsed connection string.
#[derive(Debug, Clone)]
pub struct ConnectionString {
    scheme: String,
    addresses: Vec<HostAddress>,
    params: Vec<(String, String)>,
    original: String,
}

impl ConnectionString {
    /// Parse a connection string.
    ///
    /// ```rust
    /// use columnar_cluster::ConnectionString;
    ///
    /// let conn = ConnectionString::parse("couchbases://db1:18095,db2?srv=false").unwrap();
    /// assert_eq!(conn.addresses().len(), 2);
    /// assert_eq!(conn.param("srv"), Some("false"));
    /// ```
    pub fn parse(input: &str) -> ColumnarResult<Self> {
        debug!(len = input.len(), "ConnectionString::parse()");
        let original = input.to_string();
        let input = input.trim();

        let (scheme, rest) = input.split_once("://").ok_or_else(|| {
            ColumnarError::invalid_argument("connection_string", "missing scheme")
        })?;
        if scheme.is_empty() {
            return Err(ColumnarError::invalid_argument(
                "connection_string",
                "missing scheme",
            ));
        }

        let (main, params) = parse_query_params(rest);
        let hosts = match main.split_once('/') {
            Some((_, path)) if !path.is_empty() => {
                return Err(ColumnarError::invalid_argument(
                    "connection_string",
                    format!("unexpected path {path:?}"),
                ));
            }
            Some((hosts, _)) => hosts,
            None => main,
        };

        let addresses = hosts
            .split([',', ';'])
            .filter(|part| !part.is_empty())
            .map(parse_address)
            .collect::<ColumnarResult<Vec<_>>>()?;
        if addresses.is_empty() {
            return Err(ColumnarError::invalid_argument(
                "connection_string",
                "no hosts given",
            ));
        }

        debug!(scheme, hosts = addresses.len(), params = params.len(), "Connection string parsed");
        Ok(Self {
            scheme: scheme.to_lowercase(),
            addresses,
            params,
            original,
        })
    }

    /// The original string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.original
    }

    /// The scheme, lowercased.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The addresses, in order.
    #[must_use]
    pub fn addresses(&self) -> &[HostAddress] {
        &self.addresses
    }

    /// The last value given for `key`.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every parameter, in the order given.
    #[must_use]
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// The SRV record to look up, if this string is eligible for discovery.
    ///
    /// Only a single host name with no explicit port is eligible.
    #[must_use]
    pub fn srv_record_name(&self) -> Option<String> {
        if self.scheme != SECURE_SCHEME {
            return None;
        }
        match self.addresses.as_slice() {
            [only] if only.port.is_none() && only.host.parse::<IpAddr>().is_err() => {
                Some(format!("_{}._tcp.{}", SECURE_SCHEME, only.host))
            }
            _ => None,
        }
    }
}

fn parse_address(part: &str) -> ColumnarResult<HostAddress> {
    let invalid_port = |port: &str| {
        ColumnarError::invalid_argument("connection_string", format!("invalid port {port:?}"))
    };

    if let Some(rest) = part.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(|| {
            ColumnarError::invalid_argument("connection_string", "invalid IPv6 address")
        })?;
        let port = match tail {
            "" => None,
            _ => {
                let port = tail.strip_prefix(':').ok_or_else(|| invalid_port(tail))?;
                Some(port.parse().map_err(|_| invalid_port(port))?)
            }
        };
        return Ok(HostAddress {
            host: host.to_string(),
            port,
        });
    }

    match part.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => Ok(HostAddress {
            host: host.to_string(),
            port: Some(port.parse().map_err(|_| invalid_port(port))?),
        }),
        _ => Ok(HostAddress {
            host: part.to_string(),
            port: None,
        }),
    }
}

fn parse_query_params(input: &str) -> (&str, Vec<(String, String)>) {
    match input.split_once('?') {
        Some((main, query)) => {
            let params = url::form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            (main, params)
        }
        None => (input, Vec::new()),
    }
}

/// Parse a boolean option value: `true/false/1/0/t/f`, case-insensitive.
pub fn parse_bool(argument: &str, value: &str) -> ColumnarResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "t" | "1" => Ok(true),
        "false" | "f" | "0" => Ok(false),
        _ => Err(ColumnarError::invalid_argument(
            argument,
            format!("invalid syntax for boolean {value:?}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_host() {
        let conn = ConnectionString::parse("couchbases://example.com").unwrap();
        assert_eq!(conn.scheme(), "couchbases");
        assert_eq!(
            conn.addresses(),
            &[HostAddress {
                host: "example.com".into(),
                port: None
            }]
        );
        assert_eq!(conn.addresses()[0].port_or_default(), 18095);
        assert_eq!(
            conn.srv_record_name().as_deref(),
            Some("_couchbases._tcp.example.com")
        );
    }

    #[test]
    fn test_parse_multiple_hosts_with_ports() {
        let conn = ConnectionString::parse("couchbases://db1:1000,db2;db3:3000/").unwrap();
        let hosts: Vec<_> = conn
            .addresses()
            .iter()
            .map(|a| (a.host.as_str(), a.port))
            .collect();
        assert_eq!(
            hosts,
            vec![("db1", Some(1000)), ("db2", None), ("db3", Some(3000))]
        );
        assert_eq!(conn.srv_record_name(), None);
    }

    #[test]
    fn test_no_srv_with_port_or_ip() {
        let conn = ConnectionString::parse("couchbases://example.com:18095").unwrap();
        assert_eq!(conn.srv_record_name(), None);

        let conn = ConnectionString::parse("couchbases://10.0.0.1").unwrap();
        assert_eq!(conn.srv_record_name(), None);
    }

    #[test]
    fn test_parse_ipv6() {
        let conn = ConnectionString::parse("couchbases://[::1]:18095,[fe80::1]").unwrap();
        assert_eq!(conn.addresses()[0].host, "::1");
        assert_eq!(conn.addresses()[0].port, Some(18095));
        assert_eq!(conn.addresses()[1].host, "fe80::1");
        assert_eq!(conn.addresses()[1].port, None);
    }

    #[test]
    fn test_params_last_value_wins() {
        let conn = ConnectionString::parse(
            "couchbases://db?srv=true&timeout.connect_timeout=5s&srv=false&security.cipher_suites=A%2CB",
        )
        .unwrap();
        assert_eq!(conn.param("srv"), Some("false"));
        assert_eq!(conn.param("timeout.connect_timeout"), Some("5s"));
        assert_eq!(conn.param("security.cipher_suites"), Some("A,B"));
        assert_eq!(conn.param("missing"), None);
        assert_eq!(conn.params().len(), 4);
    }

    #[test]
    fn test_parse_errors() {
        assert!(ConnectionString::parse("example.com").unwrap_err().is_invalid_argument());
        assert!(ConnectionString::parse("couchbases://").unwrap_err().is_invalid_argument());
        for input in ["couchbases://db:port", "couchbases://db/bucket"] {
            assert!(ConnectionString::parse(input).unwrap_err().is_invalid_argument());
        }
        assert!(ConnectionString::parse("couchbases://[::1").unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_parse_bool() {
        for value in ["true", "T", "1", "TRUE"] {
            assert!(parse_bool("srv", value).unwrap());
        }
        for value in ["false", "f", "0", "False"] {
            assert!(!parse_bool("srv", value).unwrap());
        }
        let err = parse_bool("srv", "yes").unwrap_err();
        assert!(err.to_string().starts_with("invalid argument srv - "));
    }
}
