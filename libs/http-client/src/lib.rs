#![cfg_attr(test, allow(clippy::unwrap_used))]

//! A small HTTP/1.1 + HTTP/2 transport, generalized over however the caller obtains a connected
//! stream for `(host, port)`.
//!
//! The dialing itself — DNS resolution, the TCP connect, and for `https` the TLS handshake — is
//! not this crate's job; a [`Connector`] supplies it. In this workspace that connector is backed
//! by the TLS/DNS dialer, so a DNS-over-HTTPS round trip emits exactly the same Connect/Read/
//! Write/Close/TLSHandshake events a plain HTTPS fetch would.

use std::{
    collections::{hash_map, HashMap},
    future::Future,
    pin::Pin,
    sync::Arc,
    time::Duration,
};

use anyhow::{bail, Context as _, Result};
use bytes::Bytes;
use http_body_util::BodyExt;
use http_body_util::Full;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    task::JoinSet,
};

/// Which protocol a [`Connector`] negotiated for a connection.
///
/// For `https` this is normally decided by ALPN during the TLS handshake; for plain `http` there
/// is nothing to negotiate, so the connector decides statically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http1,
    Http2,
}

/// What a [`Connector`] hands back for one connection attempt.
pub struct Connected<Io> {
    pub io: Io,
    pub negotiated_protocol: Protocol,
}

impl<Io> Connected<Io> {
    pub fn new(io: Io, negotiated_protocol: Protocol) -> Self {
        Self {
            io,
            negotiated_protocol,
        }
    }
}

pub type ConnectFuture<Io> = Pin<Box<dyn Future<Output = Result<Connected<Io>>> + Send>>;

/// Supplies [`HttpClient`] with a connected, protocol-negotiated stream.
///
/// This is the seam between HTTP framing and everything below it; swapping the connector is how
/// the same client serves both a DNS-over-HTTPS round trip (through the TLS dialer) and a plain
/// integration test against a loopback server (through a bare TCP connect).
pub trait Connector: Send + Sync + 'static {
    type Io: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    fn connect(&self, host: &str, port: u16, https: bool) -> ConnectFuture<Self::Io>;
}

enum Client {
    Http1(hyper::client::conn::http1::SendRequest<Full<Bytes>>),
    Http2(hyper::client::conn::http2::SendRequest<Full<Bytes>>),
}

impl Client {
    fn is_closed(&self) -> bool {
        match self {
            Client::Http1(c) => c.is_closed(),
            Client::Http2(c) => c.is_closed(),
        }
    }
}

/// Keeps one persistent connection per `host:port` authority, reusing it across requests the
/// same way the dialer's DoT transport reuses its connection (§4.9 design note).
pub struct HttpClient<C: Connector> {
    connector: Arc<C>,
    clients: HashMap<String, Client>,
    connections: JoinSet<()>,
}

impl<C: Connector> HttpClient<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
            clients: HashMap::new(),
            connections: JoinSet::new(),
        }
    }

    /// Drops every cached connection, forcing the next request for each authority to redial.
    pub fn close_idle_connections(&mut self) {
        self.clients.clear();
        self.connections.abort_all();
    }

    pub async fn send_request(
        &mut self,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<Bytes>> {
        let host = request
            .uri()
            .host()
            .context("Missing host in request URI")?
            .to_owned();
        let scheme = request
            .uri()
            .scheme_str()
            .context("Missing scheme in request URI")?;
        let https = match scheme {
            "http" => false,
            "https" => true,
            other => bail!("Unsupported scheme '{other}'"),
        };
        let port = request.uri().port_u16().unwrap_or(if https { 443 } else { 80 });
        let authority = format!("{host}:{port}");

        let mut client = match self.clients.entry(authority.clone()) {
            // We remove the client such that it is discarded on any error below.
            hash_map::Entry::Occupied(o) if !o.get().is_closed() => o.remove(),
            hash_map::Entry::Occupied(_) | hash_map::Entry::Vacant(_) => {
                self.connect(&host, port, https).await?
            }
        };

        let (parts, body) = request.into_parts();
        let request = http::Request::from_parts(parts, Full::new(body));

        let response = match &mut client {
            Client::Http1(sender) => {
                sender
                    .ready()
                    .await
                    .context("Failed to await readiness of HTTP/1.1 client")?;
                sender
                    .send_request(request)
                    .await
                    .context("Failed to send HTTP/1.1 request")?
            }
            Client::Http2(sender) => {
                sender
                    .ready()
                    .await
                    .context("Failed to await readiness of HTTP/2 client")?;
                sender
                    .send_request(request)
                    .await
                    .context("Failed to send HTTP/2 request")?
            }
        };

        let (parts, incoming) = response.into_parts();
        let body = incoming
            .collect()
            .await
            .context("Failed to receive HTTP response body")?;

        self.clients.insert(authority, client);

        Ok(http::Response::from_parts(parts, body.to_bytes()))
    }

    async fn connect(&mut self, host: &str, port: u16, https: bool) -> Result<Client> {
        tracing::debug!(%host, %port, %https, "Creating new HTTP connection");

        let connected = self
            .connector
            .connect(host, port, https)
            .await
            .with_context(|| format!("Failed to connect to '{host}:{port}'"))?;
        let io = hyper_util::rt::TokioIo::new(connected.io);

        let client = match connected.negotiated_protocol {
            Protocol::Http1 => {
                let (sender, conn) = hyper::client::conn::http1::handshake(io)
                    .await
                    .context("Failed to handshake HTTP/1.1 connection")?;

                self.connections.spawn(async move {
                    match conn.await.context("HTTP/1.1 connection failed") {
                        Ok(()) => tracing::debug!("HTTP/1.1 connection finished"),
                        Err(e) => tracing::debug!("{e:#}"),
                    }
                });

                Client::Http1(sender)
            }
            Protocol::Http2 => {
                let mut builder =
                    hyper::client::conn::http2::Builder::new(hyper_util::rt::TokioExecutor::new());
                builder.timer(hyper_util::rt::TokioTimer::default());
                builder.keep_alive_timeout(Duration::from_secs(1));
                builder.keep_alive_while_idle(true);
                builder.keep_alive_interval(Some(Duration::from_secs(5)));

                let (sender, conn) = builder
                    .handshake(io)
                    .await
                    .context("Failed to handshake HTTP/2 connection")?;

                self.connections.spawn(async move {
                    match conn.await.context("HTTP/2 connection failed") {
                        Ok(()) => tracing::debug!("HTTP/2 connection finished"),
                        Err(e) => tracing::debug!("{e:#}"),
                    }
                });

                Client::Http2(sender)
            }
        };

        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    struct PlainTcpConnector;

    impl Connector for PlainTcpConnector {
        type Io = TcpStream;

        fn connect(&self, host: &str, port: u16, _https: bool) -> ConnectFuture<Self::Io> {
            let host = host.to_owned();

            Box::pin(async move {
                let stream = TcpStream::connect((host.as_str(), port)).await?;

                Ok(Connected::new(stream, Protocol::Http1))
            })
        }
    }

    async fn spawn_plaintext_echo_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };

                tokio::spawn(async move {
                    let io = hyper_util::rt::TokioIo::new(stream);

                    let _ = hyper::server::conn::http1::Builder::new()
                        .serve_connection(
                            io,
                            hyper::service::service_fn(|_req| async move {
                                Ok::<_, std::convert::Infallible>(http::Response::new(
                                    http_body_util::Full::new(Bytes::from_static(b"ok")),
                                ))
                            }),
                        )
                        .await;
                });
            }
        });

        addr
    }

    #[tokio::test]
    async fn sends_a_plaintext_http1_request_and_reuses_the_connection() {
        let addr = spawn_plaintext_echo_server().await;
        let mut client = HttpClient::new(PlainTcpConnector);

        for _ in 0..2 {
            let request = http::Request::builder()
                .uri(format!("http://{}:{}/", addr.ip(), addr.port()))
                .body(Bytes::new())
                .unwrap();

            let response = client.send_request(request).await.unwrap();

            assert!(response.status().is_success());
            assert_eq!(response.body().as_ref(), b"ok");
        }

        assert_eq!(client.clients.len(), 1);
    }

    #[tokio::test]
    async fn rejects_an_unsupported_scheme() {
        let mut client = HttpClient::new(PlainTcpConnector);

        let request = http::Request::builder()
            .uri("ftp://example.com/")
            .body(Bytes::new())
            .unwrap();

        let error = client.send_request(request).await.unwrap_err();

        assert!(error.to_string().contains("Unsupported scheme"));
    }
}
