use std::{
    net::{SocketAddr, ToSocketAddrs},
    sync::Arc,
    time::Duration,
};

use crate::{DohTransport, DotTransport, QueryResolver, Resolver, ResolverWrapper, SystemResolver, TcpTransport, UdpTransport};

/// Per-transport timeout defaults (§5).
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub udp: Duration,
    pub tcp: Duration,
    pub dot: Duration,
    pub https: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            udp: Duration::from_secs(5),
            tcp: Duration::from_secs(10),
            dot: Duration::from_secs(10),
            https: Duration::from_secs(10),
        }
    }
}

/// A parsed `(network, address)` resolver configuration (§6 "DNS configuration scheme table").
///
/// Accepts either the bare `(network, address)` pair via [`ResolverConfig::parse`] or the
/// `scheme://host[:port][/path]` URL form via [`ResolverConfig::parse_url`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverConfig {
    System,
    Udp { address: String },
    Tcp { address: String },
    Dot { address: String },
    Https { url: String },
}

impl ResolverConfig {
    pub fn parse(network: &str, address: &str) -> Result<Self, ConfigError> {
        match network {
            "system" => Ok(Self::System),
            "udp" => Ok(Self::Udp {
                address: with_default_port(address, 53),
            }),
            "tcp" => Ok(Self::Tcp {
                address: with_default_port(address, 53),
            }),
            "dot" => Ok(Self::Dot {
                address: with_default_port(address, 853),
            }),
            "https" => Ok(Self::Https {
                url: address.to_owned(),
            }),
            other => Err(ConfigError::UnknownNetwork(other.to_owned())),
        }
    }

    /// Parses the `scheme://host[:port][/path]` URL form directly (§6).
    pub fn parse_url(raw: &str) -> Result<Self, ConfigError> {
        let url = url::Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;
        let network = url.scheme();

        if network == "https" {
            return Ok(Self::Https {
                url: raw.to_owned(),
            });
        }
        if network == "system" {
            return Ok(Self::System);
        }

        let host = url
            .host_str()
            .ok_or_else(|| ConfigError::InvalidUrl("missing host".to_owned()))?;
        let default_port = if network == "dot" { 853 } else { 53 };
        let port = url.port().unwrap_or(default_port);

        Self::parse(network, &format!("{host}:{port}"))
    }

    /// Builds the concrete, event-wrapped [`Resolver`] this configuration describes (§6, §10.4).
    ///
    /// Resolving a non-literal `host[:port]` transport address (e.g. `dns.quad9.net:853`) is a
    /// one-time bootstrap step done with the platform's blocking resolver, the same way a
    /// config file is read once at startup rather than on every lookup.
    pub fn build(
        &self,
        tls_config: Arc<rustls::ClientConfig>,
        timeouts: Timeouts,
    ) -> Result<Arc<dyn Resolver>, ConfigError> {
        let resolver: Arc<dyn Resolver> = match self {
            ResolverConfig::System => Arc::new(ResolverWrapper::new(SystemResolver)),
            ResolverConfig::Udp { address } => Arc::new(ResolverWrapper::new(QueryResolver::new(
                UdpTransport::new(resolve_transport_address(address)?).with_timeout(timeouts.udp),
            ))),
            ResolverConfig::Tcp { address } => Arc::new(ResolverWrapper::new(QueryResolver::new(
                TcpTransport::new(resolve_transport_address(address)?).with_timeout(timeouts.tcp),
            ))),
            ResolverConfig::Dot { address } => {
                let server_name = address.rsplit_once(':').map_or(address.as_str(), |(host, _)| host);

                Arc::new(ResolverWrapper::new(QueryResolver::new(
                    DotTransport::new(resolve_transport_address(address)?, server_name, tls_config)
                        .with_timeout(timeouts.dot),
                )))
            }
            ResolverConfig::Https { url } => Arc::new(ResolverWrapper::new(QueryResolver::new(
                DohTransport::new(url.clone(), tls_config),
            ))),
        };

        Ok(resolver)
    }
}

fn resolve_transport_address(address: &str) -> Result<SocketAddr, ConfigError> {
    address
        .to_socket_addrs()
        .map_err(|e| ConfigError::InvalidUrl(format!("failed to resolve '{address}': {e}")))?
        .next()
        .ok_or_else(|| ConfigError::InvalidUrl(format!("no addresses for '{address}'")))
}

/// Appends `default_port` to `address` unless it already looks like `host:port` or is a bare
/// hostname the transport will need to resolve itself.
fn with_default_port(address: &str, default_port: u16) -> String {
    if let Ok(addr) = address.parse::<std::net::SocketAddr>() {
        return addr.to_string();
    }
    if let Ok(ip) = address.parse::<std::net::IpAddr>() {
        return std::net::SocketAddr::new(ip, default_port).to_string();
    }
    if address.contains(':') {
        address.to_owned()
    } else {
        format!("{address}:{default_port}")
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown resolver network '{0}'")]
    UnknownNetwork(String),
    #[error("invalid resolver URL: {0}")]
    InvalidUrl(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_udp_address_with_default_port() {
        let config = ResolverConfig::parse("udp", "1.1.1.1").unwrap();

        assert_eq!(
            config,
            ResolverConfig::Udp {
                address: "1.1.1.1:53".to_owned()
            }
        );
    }

    #[test]
    fn keeps_explicit_port() {
        let config = ResolverConfig::parse("dot", "1.1.1.1:8853").unwrap();

        assert_eq!(
            config,
            ResolverConfig::Dot {
                address: "1.1.1.1:8853".to_owned()
            }
        );
    }

    #[test]
    fn parses_url_form() {
        let config = ResolverConfig::parse_url("https://dns.google/dns-query").unwrap();

        assert_eq!(
            config,
            ResolverConfig::Https {
                url: "https://dns.google/dns-query".to_owned()
            }
        );
    }

    #[test]
    fn parses_udp_url_form_with_default_port() {
        let config = ResolverConfig::parse_url("udp://9.9.9.9").unwrap();

        assert_eq!(
            config,
            ResolverConfig::Udp {
                address: "9.9.9.9:53".to_owned()
            }
        );
    }

    #[test]
    fn rejects_unknown_network() {
        let error = ResolverConfig::parse("quic", "1.1.1.1").unwrap_err();

        assert!(matches!(error, ConfigError::UnknownNetwork(n) if n == "quic"));
    }

    fn test_tls_config() -> Arc<rustls::ClientConfig> {
        rustls::crypto::ring::default_provider().install_default().ok();

        let mut root_cert_store = rustls::RootCertStore::empty();
        root_cert_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_cert_store)
                .with_no_client_auth(),
        )
    }

    #[test]
    fn builds_a_udp_resolver_from_an_ip_literal_config() {
        let config = ResolverConfig::parse("udp", "1.1.1.1").unwrap();

        let resolver = config.build(test_tls_config(), Timeouts::default()).unwrap();

        assert_eq!(resolver.network(), "udp");
        assert_eq!(resolver.address(), "1.1.1.1:53");
    }

    #[test]
    fn builds_a_system_resolver() {
        let resolver = ResolverConfig::System
            .build(test_tls_config(), Timeouts::default())
            .unwrap();

        assert_eq!(resolver.network(), "system");
    }
}
