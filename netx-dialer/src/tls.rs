use std::sync::Arc;

use netx_context::Context;
use netx_model::{classify, Common, ConnId, ErrorWrapper, Event, Failure, TlsHandshakeDone, TlsHandshakeStart};
use netx_resolver::Resolver;
use netx_socket::MeasuringSocket;
use rustls_pki_types::ServerName;

use crate::{DialerConfig, DnsDialer};

/// Performs a TLS handshake over a [`DnsDialer`]-established connection (C7; §4.7).
///
/// The handshake runs directly on the [`MeasuringSocket`] the dialer returned — it is never
/// unwrapped — so every byte the TLS layer (and anything built on top of it, including HTTP/2)
/// reads or writes still emits Read/Write/Close events (§3, §4.4). `libs/http-client`'s
/// `Connector` seam carries the negotiated ALPN protocol explicitly in `Connected<Io>`, so nothing
/// here needs to downcast the concrete stream type to discover it.
pub struct TlsDialer<R> {
    dns: DnsDialer<R>,
    tls_config: Arc<rustls::ClientConfig>,
    handshake_timeout: std::time::Duration,
}

impl<R> TlsDialer<R>
where
    R: Resolver,
{
    pub fn new(config: DialerConfig, resolver: R, tls_config: Arc<rustls::ClientConfig>) -> Self {
        Self {
            handshake_timeout: config.handshake_timeout,
            dns: DnsDialer::new(config, resolver),
            tls_config,
        }
    }

    /// Dials `target` (`host:port`) and performs a TLS handshake, defaulting SNI to the
    /// connection's hostname portion unless `server_name` overrides it.
    ///
    /// `next_protos` sets the ALPN protocol list offered during the handshake (e.g. `["h2",
    /// "http/1.1"]` for an HTTP client that wants to discover which protocol the peer picked).
    pub async fn dial(
        &self,
        ctx: Context,
        network: &'static str,
        target: &str,
        server_name: Option<&str>,
        next_protos: &[&str],
    ) -> Result<tokio_rustls::client::TlsStream<MeasuringSocket<socket_factory::TcpStream>>, ErrorWrapper> {
        let hostname = server_name
            .map(str::to_owned)
            .unwrap_or_else(|| default_server_name(target));

        let socket = self.dns.dial(ctx.clone(), network, target).await?;
        let conn_id = socket.conn_id();

        let next_proto_owned: Vec<String> = next_protos.iter().map(|p| (*p).to_owned()).collect();

        ctx.emit(Event::TlsHandshakeStart(TlsHandshakeStart {
            common: Common::new(ctx.elapsed()).with_conn_id(conn_id),
            server_name: hostname.clone(),
            next_protos: next_proto_owned.clone(),
        }));

        let start = std::time::Instant::now();
        let handshake_result = self.handshake(&hostname, next_protos, socket, conn_id).await;

        let (cipher_suite, protocol_version, negotiated_protocol, peer_certificates) = handshake_result
            .as_ref()
            .ok()
            .map(describe_connection)
            .unwrap_or_default();

        ctx.emit(Event::TlsHandshakeDone(TlsHandshakeDone {
            common: Common::new(ctx.elapsed()).with_conn_id(conn_id),
            blocked_duration: start.elapsed(),
            server_name: hostname,
            next_protos: next_proto_owned,
            cipher_suite,
            protocol_version,
            negotiated_protocol,
            peer_certificates,
            error: handshake_result.as_ref().err().cloned(),
        }));

        if let Err(e) = &handshake_result {
            tracing::debug!(server_name = %hostname, error = %e.failure, "TLS handshake failed");
        }

        handshake_result
    }

    async fn handshake(
        &self,
        hostname: &str,
        next_protos: &[&str],
        socket: MeasuringSocket<socket_factory::TcpStream>,
        conn_id: ConnId,
    ) -> Result<tokio_rustls::client::TlsStream<MeasuringSocket<socket_factory::TcpStream>>, ErrorWrapper> {
        let mut tls_config = (*self.tls_config).clone();
        tls_config.alpn_protocols = next_protos.iter().map(|p| p.as_bytes().to_vec()).collect();

        let server_name = ServerName::try_from(hostname.to_owned())
            .map_err(|_| ErrorWrapper::new(Failure::SslInvalidHostname).with_conn_id(conn_id))?;

        let connector = tokio_rustls::TlsConnector::from(Arc::new(tls_config));

        match tokio::time::timeout(self.handshake_timeout, connector.connect(server_name, socket)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(ErrorWrapper::new(classify(&anyhow::Error::new(e))).with_conn_id(conn_id)),
            Err(_) => Err(ErrorWrapper::new(Failure::GenericTimeoutError).with_conn_id(conn_id)),
        }
    }
}

type ConnectionDescription = (Option<String>, Option<String>, Option<String>, Vec<Vec<u8>>);

fn describe_connection(
    stream: &tokio_rustls::client::TlsStream<MeasuringSocket<socket_factory::TcpStream>>,
) -> ConnectionDescription {
    let (_, connection) = stream.get_ref();

    let cipher_suite = connection.negotiated_cipher_suite().map(|s| format!("{:?}", s.suite()));
    let protocol_version = connection.protocol_version().map(|v| format!("{v:?}"));
    let negotiated_protocol = connection
        .alpn_protocol()
        .map(|p| String::from_utf8_lossy(p).into_owned());
    let peer_certificates = connection
        .peer_certificates()
        .map(|certs| certs.iter().map(|c| c.as_ref().to_vec()).collect())
        .unwrap_or_default();

    (cipher_suite, protocol_version, negotiated_protocol, peer_certificates)
}

fn default_server_name(target: &str) -> String {
    if let Ok(addr) = target.parse::<std::net::SocketAddr>() {
        return addr.ip().to_string();
    }

    target
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or(target)
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_owned()
}
