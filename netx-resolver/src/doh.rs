use std::{net::SocketAddr, sync::Arc, time::Instant};

use anyhow::Context as _;
use async_trait::async_trait;
use bytes::Bytes;
use http_client::{Connected, ConnectFuture, Protocol};
use netx_context::Context;
use netx_model::{
    classify, Common, DnsQuery, DnsReply, ErrorWrapper, Event, Failure, TlsHandshakeDone,
    TlsHandshakeStart,
};
use netx_socket::MeasuringSocket;
use rustls_pki_types::ServerName;

use crate::{describe_query, describe_reply, tcp::dial_tcp, DnsTransport};

/// The DNS-over-HTTPS transport (RFC 8484; §4.8).
///
/// Each query dials a fresh HTTP/2-or-1.1 connection rather than keeping one alive between
/// calls: unlike the plain TCP/TLS DNS transports, a DoH target is an ordinary web origin that
/// [`QueryResolver`](crate::QueryResolver) only talks to occasionally, so the extra handshake is
/// cheaper than tracking connection liveness across unrelated resolutions.
pub struct DohTransport {
    url: String,
    tls_config: Arc<rustls::ClientConfig>,
}

impl DohTransport {
    pub fn new(url: impl Into<String>, tls_config: Arc<rustls::ClientConfig>) -> Self {
        Self {
            url: url.into(),
            tls_config,
        }
    }
}

#[async_trait]
impl DnsTransport for DohTransport {
    async fn round_trip(&self, ctx: Context, query: &[u8]) -> Result<Vec<u8>, ErrorWrapper> {
        let connector = DohConnector {
            ctx: ctx.clone(),
            tls_config: self.tls_config.clone(),
        };
        let mut client = http_client::HttpClient::new(connector);

        ctx.emit(Event::DnsQuery(DnsQuery {
            common: Common::new(ctx.elapsed()),
            raw_bytes: query.to_vec(),
            parsed_message: describe_query(query),
        }));

        let request = http::Request::builder()
            .method("POST")
            .uri(self.url.clone())
            .header(http::header::CONTENT_TYPE, "application/dns-message")
            .header(http::header::ACCEPT, "application/dns-message")
            .body(Bytes::copy_from_slice(query))
            .map_err(|e| ErrorWrapper::new(classify(&anyhow::Error::new(e))))?;

        let outcome = client.send_request(request).await;
        let result = outcome
            .map_err(|e| ErrorWrapper::new(classify(&e)))
            .and_then(validate_doh_response);

        if let Err(e) = &result {
            tracing::debug!(url = %self.url, error = %e.failure, "DoH request failed");
        }

        ctx.emit(Event::DnsReply(DnsReply {
            common: Common::new(ctx.elapsed()),
            raw_bytes: result.as_ref().ok().cloned().unwrap_or_default(),
            parsed_message: result.as_ref().ok().and_then(|r| describe_reply(r)),
            error: result.as_ref().err().cloned(),
        }));

        result
    }

    fn network(&self) -> &'static str {
        "https"
    }

    fn address(&self) -> String {
        self.url.clone()
    }
}

/// Validates a DoH HTTP response per §4.8: status MUST be 200 and content-type MUST match
/// `application/dns-message`, else the round trip fails rather than handing a block page's body
/// to the DNS wire parser.
fn validate_doh_response(response: http::Response<Bytes>) -> Result<Vec<u8>, ErrorWrapper> {
    let status = response.status();
    if status != http::StatusCode::OK {
        return Err(ErrorWrapper::new(Failure::Unknown(format!(
            "unexpected DoH response status {status}"
        ))));
    }

    let content_type = response
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if !content_type.starts_with("application/dns-message") {
        return Err(ErrorWrapper::new(Failure::Unknown(format!(
            "unexpected DoH response content-type '{content_type}'"
        ))));
    }

    Ok(response.into_body().to_vec())
}

/// Bridges [`http_client::Connector`] to the measured TCP dial + TLS handshake, so a DoH round
/// trip emits exactly the same Connect/TLSHandshake events a plain HTTPS fetch would (§4.8). The
/// handshake runs on the [`MeasuringSocket`] directly — never unwrapped — so the DoH connection's
/// Read/Write/Close events keep being emitted like every other traced connection.
struct DohConnector {
    ctx: Context,
    tls_config: Arc<rustls::ClientConfig>,
}

impl http_client::Connector for DohConnector {
    type Io = tokio_rustls::client::TlsStream<MeasuringSocket<socket_factory::TcpStream>>;

    fn connect(&self, host: &str, port: u16, https: bool) -> ConnectFuture<Self::Io> {
        let ctx = self.ctx.clone();
        let tls_config = self.tls_config.clone();
        let host = host.to_owned();

        Box::pin(async move {
            anyhow::ensure!(https, "DNS-over-HTTPS transport only dials https origins");

            let ip = resolve_one(&host).await?;
            let socket_addr = SocketAddr::new(ip, port);

            let socket = dial_tcp(&ctx, socket_addr)
                .await
                .map_err(|e| anyhow::anyhow!("{}", e.failure))?;
            let conn_id = socket.conn_id();

            let next_protos = vec!["h2".to_owned(), "http/1.1".to_owned()];

            ctx.emit(Event::TlsHandshakeStart(TlsHandshakeStart {
                common: Common::new(ctx.elapsed()).with_conn_id(conn_id),
                server_name: host.clone(),
                next_protos: next_protos.clone(),
            }));

            let start = Instant::now();
            let connector = tokio_rustls::TlsConnector::from(tls_config);
            let server_name = ServerName::try_from(host.clone())
                .map_err(|_| anyhow::anyhow!("InvalidCertificate(NotValidForName)"))?;

            let stream_result = connector.connect(server_name, socket).await;
            let negotiated = stream_result
                .as_ref()
                .ok()
                .and_then(|s| s.get_ref().1.alpn_protocol().map(|p| p.to_vec()));

            ctx.emit(Event::TlsHandshakeDone(TlsHandshakeDone {
                common: Common::new(ctx.elapsed()).with_conn_id(conn_id),
                blocked_duration: start.elapsed(),
                server_name: host.clone(),
                next_protos,
                cipher_suite: None,
                protocol_version: None,
                negotiated_protocol: negotiated
                    .as_ref()
                    .map(|p| String::from_utf8_lossy(p).into_owned()),
                peer_certificates: Vec::new(),
                error: stream_result
                    .as_ref()
                    .err()
                    .map(|e| ErrorWrapper::new(classify(&anyhow::anyhow!("{e}"))).with_conn_id(conn_id)),
            }));

            let stream = stream_result.context("TLS handshake failed")?;

            let protocol = match negotiated.as_deref() {
                Some(b"h2") => Protocol::Http2,
                _ => Protocol::Http1,
            };

            Ok(Connected::new(stream, protocol))
        })
    }
}

async fn resolve_one(host: &str) -> anyhow::Result<std::net::IpAddr> {
    let target = format!("{host}:0");

    let mut addrs = tokio::net::lookup_host(&target)
        .await
        .with_context(|| format!("Failed to resolve DoH origin '{host}'"))?;

    addrs
        .next()
        .map(|addr| addr.ip())
        .with_context(|| format!("No addresses for DoH origin '{host}'"))
}
