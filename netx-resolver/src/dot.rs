use std::{net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use netx_context::Context;
use netx_model::{
    classify, Common, ConnId, DnsQuery, DnsReply, ErrorWrapper, Event, Failure, TlsHandshakeDone,
    TlsHandshakeStart,
};
use netx_socket::MeasuringSocket;
use rustls_pki_types::ServerName;
use tokio::{io::AsyncWriteExt as _, sync::Mutex};

use crate::{
    describe_query, describe_reply,
    tcp::{dial_tcp, read_framed, write_framed},
    DnsTransport,
};

type TlsStream = tokio_rustls::client::TlsStream<MeasuringSocket<socket_factory::TcpStream>>;

/// One kept-alive DoT socket plus when it was last used, for the idle-pruning check below.
struct Idle {
    stream: TlsStream,
    conn_id: ConnId,
    last_used: std::time::Instant,
}

/// How long an idle DoT socket is kept before a fresh one is dialed instead (§4.8, §9).
const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// The DNS-over-TLS transport (§4.8).
///
/// Keeps a single idle socket per transport instance to avoid a TLS handshake on every lookup
/// (§9 "DoT connection reuse"). `cache` doubles as the per-transport lock: a round trip holds it
/// for its entire duration, so there is never more than one in-flight query per transport and
/// caching cannot reorder events. The TLS handshake runs directly on the
/// [`netx_socket::MeasuringSocket`] the dial returned, so every framed read/write this transport
/// does against a cached or fresh connection keeps emitting Read/Write events automatically
/// (§4.8 "every transport's underlying socket is a measuring socket"); this transport only emits
/// DNSQuery/DNSReply itself, since those carry the parsed DNS message rather than raw bytes.
pub struct DotTransport {
    address: SocketAddr,
    server_name: String,
    tls_config: Arc<rustls::ClientConfig>,
    timeout: Duration,
    cache: Mutex<Option<Idle>>,
}

impl DotTransport {
    pub fn new(address: SocketAddr, server_name: impl Into<String>, tls_config: Arc<rustls::ClientConfig>) -> Self {
        Self {
            address,
            server_name: server_name.into(),
            tls_config,
            timeout: Duration::from_secs(10),
            cache: Mutex::new(None),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Dials a fresh connection and performs the TLS handshake, emitting Connect/TLSHandshake
    /// events for it.
    async fn handshake(&self, ctx: &Context) -> Result<(TlsStream, ConnId), ErrorWrapper> {
        let socket = dial_tcp(ctx, self.address).await?;
        let conn_id = socket.conn_id();

        ctx.emit(Event::TlsHandshakeStart(TlsHandshakeStart {
            common: Common::new(ctx.elapsed()).with_conn_id(conn_id),
            server_name: self.server_name.clone(),
            next_protos: Vec::new(),
        }));

        let start = std::time::Instant::now();
        let connector = tokio_rustls::TlsConnector::from(self.tls_config.clone());
        let server_name = ServerName::try_from(self.server_name.clone())
            .map_err(|_| ErrorWrapper::new(Failure::SslInvalidHostname).with_conn_id(conn_id));

        let handshake_result = match server_name {
            Ok(server_name) => connector
                .connect(server_name, socket)
                .await
                .map_err(|e| ErrorWrapper::new(classify(&anyhow::Error::new(e))).with_conn_id(conn_id)),
            Err(e) => Err(e),
        };

        if let Err(e) = &handshake_result {
            tracing::debug!(server_name = %self.server_name, error = %e.failure, "DoT TLS handshake failed");
        }

        ctx.emit(Event::TlsHandshakeDone(TlsHandshakeDone {
            common: Common::new(ctx.elapsed()).with_conn_id(conn_id),
            blocked_duration: start.elapsed(),
            server_name: self.server_name.clone(),
            next_protos: Vec::new(),
            cipher_suite: None,
            protocol_version: None,
            negotiated_protocol: None,
            peer_certificates: Vec::new(),
            error: handshake_result.as_ref().err().cloned(),
        }));

        Ok((handshake_result?, conn_id))
    }
}

#[async_trait]
impl DnsTransport for DotTransport {
    async fn round_trip(&self, ctx: Context, query: &[u8]) -> Result<Vec<u8>, ErrorWrapper> {
        let mut slot = self.cache.lock().await;

        let (mut stream, conn_id) = match slot.take() {
            Some(idle) if idle.last_used.elapsed() < IDLE_TIMEOUT => (idle.stream, idle.conn_id),
            Some(mut stale) => {
                // `shutdown` drives the wrapped `MeasuringSocket`'s own Close emission rather
                // than emitting one by hand, so pruning an idle socket here can never double up
                // with the `Drop`-based Close the socket would otherwise emit on its own.
                let _ = stale.stream.shutdown().await;
                self.handshake(&ctx).await?
            }
            None => self.handshake(&ctx).await?,
        };

        ctx.emit(Event::DnsQuery(DnsQuery {
            common: Common::new(ctx.elapsed()).with_conn_id(conn_id),
            raw_bytes: query.to_vec(),
            parsed_message: describe_query(query),
        }));

        let outcome = tokio::time::timeout(self.timeout, async {
            write_framed(&mut stream, query).await?;
            read_framed(&mut stream).await
        })
        .await;

        let result = match outcome {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => Err(ErrorWrapper::new(classify(&anyhow::Error::new(e))).with_conn_id(conn_id)),
            Err(_) => Err(ErrorWrapper::new(Failure::GenericTimeoutError).with_conn_id(conn_id)),
        };

        ctx.emit(Event::DnsReply(DnsReply {
            common: Common::new(ctx.elapsed()).with_conn_id(conn_id),
            raw_bytes: result.as_ref().ok().cloned().unwrap_or_default(),
            parsed_message: result.as_ref().ok().and_then(|r| describe_reply(r)),
            error: result.as_ref().err().cloned(),
        }));

        if result.is_ok() {
            *slot = Some(Idle {
                stream,
                conn_id,
                last_used: std::time::Instant::now(),
            });
        }
        // On failure `stream` is simply dropped here, which emits Close on its own (§3
        // "Lifecycles") — no manual emission needed.

        result
    }

    fn network(&self) -> &'static str {
        "dot"
    }

    fn address(&self) -> String {
        self.address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[tokio::test]
    async fn fails_fast_when_nothing_is_listening() {
        let transport = DotTransport::new(
            "127.0.0.1:1".parse().unwrap(),
            "example.com",
            test_tls_config(),
        )
        .with_timeout(Duration::from_millis(200));

        let result = transport.round_trip(Context::new(), &[0, 1, 2, 3]).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn leaves_the_cache_empty_after_a_failed_dial() {
        let transport = DotTransport::new(
            "127.0.0.1:1".parse().unwrap(),
            "example.com",
            test_tls_config(),
        )
        .with_timeout(Duration::from_millis(200));

        let _ = transport.round_trip(Context::new(), &[0, 1, 2, 3]).await;

        assert!(transport.cache.lock().await.is_none());
    }
}
