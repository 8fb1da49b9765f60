use std::{net::SocketAddr, time::Duration};

use async_trait::async_trait;
use netx_context::Context;
use netx_model::{Common, Connect, ConnId, DnsQuery, DnsReply, ErrorWrapper, Event};
use netx_socket::MeasuringSocket;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::{describe_query, describe_reply, to_error_wrapper, DnsTransport};

/// Dials a plain TCP connection to `address`, emitting the [`Connect`] event, and wraps it in a
/// [`MeasuringSocket`] so every subsequent read/write/close is instrumented automatically (§4.8:
/// "every transport's underlying socket is a measuring socket").
pub(crate) async fn dial_tcp(
    ctx: &Context,
    address: SocketAddr,
) -> Result<MeasuringSocket<socket_factory::TcpStream>, ErrorWrapper> {
    let conn_id = ConnId::next();
    let common = Common::new(ctx.elapsed()).with_conn_id(conn_id);

    let result = async {
        let socket = socket_factory::tcp(&address).map_err(|e| to_error_wrapper(&e, conn_id))?;

        socket
            .connect(address)
            .await
            .map_err(|e| to_error_wrapper(&e, conn_id))
    }
    .await;

    ctx.emit(Event::Connect(Connect {
        common,
        network: "tcp".to_owned(),
        remote_address: address.to_string(),
        error: result.as_ref().err().cloned(),
    }));

    result.map(|stream| MeasuringSocket::new(stream, ctx.clone(), conn_id, "tcp"))
}

/// Writes a 2-byte big-endian length-prefixed message, as `RFC 7766` mandates for DNS over a
/// byte stream (shared by [`TcpTransport`] and the DoT transport once past the handshake).
pub(crate) async fn write_framed<W: tokio::io::AsyncWrite + Unpin>(
    writer: &mut W,
    message: &[u8],
) -> std::io::Result<()> {
    let len = u16::try_from(message.len())
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "message too long"))?;

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(message).await?;
    writer.flush().await
}

pub(crate) async fn read_framed<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut R,
) -> std::io::Result<Vec<u8>> {
    let mut len_bytes = [0u8; 2];
    reader.read_exact(&mut len_bytes).await?;
    let len = u16::from_be_bytes(len_bytes) as usize;

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;

    Ok(buf)
}

/// The plain DNS-over-TCP transport (§4.8).
pub struct TcpTransport {
    address: SocketAddr,
    timeout: Duration,
}

impl TcpTransport {
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl DnsTransport for TcpTransport {
    async fn round_trip(&self, ctx: Context, query: &[u8]) -> Result<Vec<u8>, ErrorWrapper> {
        let mut socket = dial_tcp(&ctx, self.address).await?;
        let conn_id = socket.conn_id();

        ctx.emit(Event::DnsQuery(DnsQuery {
            common: Common::new(ctx.elapsed()).with_conn_id(conn_id),
            raw_bytes: query.to_vec(),
            parsed_message: describe_query(query),
        }));

        let outcome = tokio::time::timeout(self.timeout, async {
            write_framed(&mut socket, query).await?;
            read_framed(&mut socket).await
        })
        .await;

        let result = match outcome {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => Err(to_error_wrapper(&e, conn_id)),
            Err(_) => Err(ErrorWrapper::new(netx_model::Failure::GenericTimeoutError).with_conn_id(conn_id)),
        };

        if let Err(e) = &result {
            tracing::debug!(error = %e.failure, "TCP DNS query failed");
        }

        ctx.emit(Event::DnsReply(DnsReply {
            common: Common::new(ctx.elapsed()).with_conn_id(conn_id),
            raw_bytes: result.as_ref().ok().cloned().unwrap_or_default(),
            parsed_message: result.as_ref().ok().and_then(|r| describe_reply(r)),
            error: result.as_ref().err().cloned(),
        }));

        let _ = tokio::io::AsyncWriteExt::shutdown(&mut socket).await;

        result
    }

    fn network(&self) -> &'static str {
        "tcp"
    }

    fn address(&self) -> String {
        self.address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fails_fast_when_nothing_is_listening() {
        let transport = TcpTransport::new("127.0.0.1:1".parse().unwrap()).with_timeout(Duration::from_millis(200));

        let result = transport.round_trip(Context::new(), &[1, 2, 3]).await;

        assert!(result.is_err());
    }
}
