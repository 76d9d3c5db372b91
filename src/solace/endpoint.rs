//! Broker endpoint URLs.

use std::fmt;

use url::Url;

use crate::error::LoadgenError;

/// Default plain-text MQTT port on a PubSub+ broker.
pub const DEFAULT_PLAIN_PORT: u16 = 1883;
/// Default TLS MQTT port on a PubSub+ broker.
pub const DEFAULT_TLS_PORT: u16 = 8883;

/// A parsed broker address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Whether the connection uses TLS.
    pub tls: bool,
}

impl Endpoint {
    /// Parses `scheme://host[:port]` or a bare `host[:port]`.
    ///
    /// `tcp`, `mqtt` and bare hosts are plain text; `tcps`, `ssl` and
    /// `mqtts` use TLS.
    ///
    /// # Errors
    ///
    /// Returns [`LoadgenError::InvalidArgument`] for unknown schemes or
    /// unparseable addresses.
    pub fn parse(raw: &str) -> Result<Self, LoadgenError> {
        let raw = raw.trim();
        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("tcp://{raw}")
        };
        let url = Url::parse(&with_scheme)
            .map_err(|e| LoadgenError::InvalidArgument(format!("broker {raw:?}: {e}")))?;

        let tls = match url.scheme() {
            "tcp" | "mqtt" => false,
            "tcps" | "ssl" | "mqtts" => true,
            other => {
                return Err(LoadgenError::InvalidArgument(format!(
                    "broker {raw:?}: unsupported scheme {other:?}"
                )));
            }
        };
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| LoadgenError::InvalidArgument(format!("broker {raw:?}: missing host")))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = url
            .port()
            .unwrap_or(if tls { DEFAULT_TLS_PORT } else { DEFAULT_PLAIN_PORT });

        Ok(Self { host, port, tls })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.tls { "tcps" } else { "tcp" };
        write!(f, "{scheme}://{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Endpoint {
        let Ok(endpoint) = Endpoint::parse(raw) else {
            panic!("{raw} should parse");
        };
        endpoint
    }

    #[test]
    fn tcp_url_with_port() {
        let e = parse("tcp://localhost:55555");
        assert_eq!(e.host, "localhost");
        assert_eq!(e.port, 55555);
        assert!(!e.tls);
    }

    #[test]
    fn bare_host_port() {
        let e = parse("localhost:55554");
        assert_eq!(e.host, "localhost");
        assert_eq!(e.port, 55554);
        assert!(!e.tls);
    }

    #[test]
    fn bare_host_uses_default_port() {
        let e = parse("broker.internal");
        assert_eq!(e.port, DEFAULT_PLAIN_PORT);
    }

    #[test]
    fn tls_schemes_default_to_tls_port() {
        for raw in ["tcps://host", "ssl://host", "mqtts://host"] {
            let e = parse(raw);
            assert!(e.tls, "{raw}");
            assert_eq!(e.port, DEFAULT_TLS_PORT, "{raw}");
        }
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let result = Endpoint::parse("http://host:80");
        assert!(matches!(result, Err(LoadgenError::InvalidArgument(_))));
    }

    #[test]
    fn display_round_trips_shape() {
        assert_eq!(parse("10.0.0.5:1884").to_string(), "tcp://10.0.0.5:1884");
        assert_eq!(parse("ssl://h:9").to_string(), "tcps://h:9");
    }
}
