use std::{net::SocketAddr, time::Duration};

use async_trait::async_trait;
use netx_context::Context;
use netx_model::{Common, Connect, ConnId, DnsQuery, DnsReply, ErrorWrapper, Event, Failure};

use crate::{describe_query, describe_reply, to_error_wrapper, DnsTransport};

/// The plain DNS-over-UDP transport (§4.8).
///
/// A UDP socket is a datagram, not a byte stream, so it cannot be wrapped in a
/// [`netx_socket::MeasuringSocket`]; this transport emits the equivalent Connect/DNSQuery/
/// DNSReply events directly instead.
pub struct UdpTransport {
    address: SocketAddr,
    timeout: Duration,
}

impl UdpTransport {
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl DnsTransport for UdpTransport {
    async fn round_trip(&self, ctx: Context, query: &[u8]) -> Result<Vec<u8>, ErrorWrapper> {
        let conn_id = ConnId::next();

        let socket = socket_factory::udp(&self.address).map_err(|e| to_error_wrapper(&e, conn_id));

        ctx.emit(Event::Connect(Connect {
            common: Common::new(ctx.elapsed()).with_conn_id(conn_id),
            network: "udp".to_owned(),
            remote_address: self.address.to_string(),
            error: socket.as_ref().err().cloned(),
        }));

        let socket = socket?;

        ctx.emit(Event::DnsQuery(DnsQuery {
            common: Common::new(ctx.elapsed()).with_conn_id(conn_id),
            raw_bytes: query.to_vec(),
            parsed_message: describe_query(query),
        }));

        let mut buf = vec![0u8; 4096];
        let outcome = tokio::time::timeout(self.timeout, socket.query(self.address, query, &mut buf)).await;

        let result = match outcome {
            Ok(Ok(len)) => Ok(buf[..len].to_vec()),
            Ok(Err(e)) => Err(to_error_wrapper(&e, conn_id)),
            Err(_) => Err(ErrorWrapper::new(Failure::GenericTimeoutError).with_conn_id(conn_id)),
        };

        if let Err(e) = &result {
            tracing::debug!(address = %self.address, error = %e.failure, "UDP DNS query failed");
        }

        ctx.emit(Event::DnsReply(DnsReply {
            common: Common::new(ctx.elapsed()).with_conn_id(conn_id),
            raw_bytes: result.as_ref().ok().cloned().unwrap_or_default(),
            parsed_message: result.as_ref().ok().and_then(|r| describe_reply(r)),
            error: result.as_ref().err().cloned(),
        }));

        result
    }

    fn network(&self) -> &'static str {
        "udp"
    }

    fn address(&self) -> String {
        self.address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fails_when_nothing_is_listening_on_the_target_port() {
        // Nothing listens on loopback port 1; depending on the platform this surfaces either
        // as an immediate connection-refused or (if ICMP is filtered) a timeout, so the test
        // only asserts that the transport doesn't hang and does return an error.
        let transport =
            UdpTransport::new("127.0.0.1:1".parse().unwrap()).with_timeout(Duration::from_millis(200));

        let result = transport.round_trip(Context::new(), &[0, 1, 2, 3]).await;

        assert!(result.is_err());
    }
}
