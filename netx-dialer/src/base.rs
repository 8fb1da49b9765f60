use std::{net::SocketAddr, time::Duration};

use netx_context::Context;
use netx_model::{classify, Common, Connect, ConnId, Event, ErrorWrapper, Failure};
use netx_socket::MeasuringSocket;

use crate::DialerConfig;

/// Given an IP literal and port, opens a socket and returns a [`MeasuringSocket`] (C5; §4.5).
///
/// This is the bottom of the dialer stack: it never resolves a hostname and rejects being asked
/// to (the "defensive invariant" of §4.5) — that is [`crate::DnsDialer`]'s job, one layer up.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaseDialer {
    connect_timeout: Duration,
}

impl BaseDialer {
    pub fn new(config: DialerConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
        }
    }

    /// Connects to `target`, which MUST already be an `ip:port` literal (§4.5).
    ///
    /// A non-IP `target` is rejected before any socket is opened or any event emitted: this is
    /// a defensive invariant, not a recoverable condition a caller is expected to retry on —
    /// [`crate::DnsDialer`] is responsible for turning a hostname into addresses first.
    pub async fn dial(
        &self,
        ctx: Context,
        network: &'static str,
        target: &str,
    ) -> Result<MeasuringSocket<socket_factory::TcpStream>, ErrorWrapper> {
        let addr: SocketAddr = target.parse().map_err(|_| {
            ErrorWrapper::new(Failure::Unknown(format!(
                "domain name passed to base dialer: '{target}' is not an ip:port literal"
            )))
        })?;

        self.dial_addr(ctx, network, addr).await
    }

    pub async fn dial_addr(
        &self,
        ctx: Context,
        network: &'static str,
        addr: SocketAddr,
    ) -> Result<MeasuringSocket<socket_factory::TcpStream>, ErrorWrapper> {
        let conn_id = ConnId::next();
        let common = Common::new(ctx.elapsed())
            .with_dial_id(ctx.dial_id())
            .with_conn_id(conn_id);

        let result = self.connect(addr, conn_id).await;

        if let Err(e) = &result {
            tracing::debug!(%addr, %network, error = %e.failure, "Connect failed");
        }

        ctx.emit(Event::Connect(Connect {
            common,
            network: network.to_owned(),
            remote_address: addr.to_string(),
            error: result.as_ref().err().cloned(),
        }));

        result.map(|stream| MeasuringSocket::new(stream, ctx, conn_id, network))
    }

    async fn connect(
        &self,
        addr: SocketAddr,
        conn_id: ConnId,
    ) -> Result<socket_factory::TcpStream, ErrorWrapper> {
        let socket = socket_factory::tcp(&addr).map_err(|e| to_error_wrapper(&e, conn_id))?;

        match tokio::time::timeout(self.connect_timeout, socket.connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(to_error_wrapper(&e, conn_id)),
            Err(_) => Err(ErrorWrapper::new(Failure::GenericTimeoutError).with_conn_id(conn_id)),
        }
    }
}

fn to_error_wrapper(error: &std::io::Error, conn_id: ConnId) -> ErrorWrapper {
    let anyhow_error = anyhow::Error::new(std::io::Error::new(error.kind(), error.to_string()));

    ErrorWrapper::new(classify(&anyhow_error)).with_conn_id(conn_id)
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use netx_context::MeasurementRoot;
    use netx_model::Event;
    use tokio::net::TcpListener;

    use super::*;

    fn recording_ctx() -> (Context, Arc<Mutex<Vec<Event>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        let root = MeasurementRoot::new(move |event: Event| events_clone.lock().unwrap().push(event));

        (Context::new().with_root(root), events)
    }

    #[tokio::test]
    async fn connects_to_a_listening_loopback_socket_and_emits_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let (ctx, events) = recording_ctx();
        let dialer = BaseDialer::new(DialerConfig::default());

        let socket = dialer.dial(ctx, "tcp", &addr.to_string()).await.unwrap();
        assert!(socket.peer_addr().unwrap() == addr);

        let connects: Vec<_> = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, Event::Connect(_)))
            .count();
        assert_eq!(connects, 1);
    }

    #[tokio::test]
    async fn rejects_a_hostname_instead_of_an_ip_literal() {
        let (ctx, _events) = recording_ctx();
        let dialer = BaseDialer::new(DialerConfig::default());

        let error = dialer.dial(ctx, "tcp", "example.com:443").await.unwrap_err();

        assert!(matches!(error.failure, Failure::Unknown(ref m) if m.contains("domain name passed to base dialer")));
    }

    #[tokio::test]
    async fn emits_connect_with_error_on_refused_connection() {
        let (ctx, events) = recording_ctx();
        let dialer = BaseDialer::new(DialerConfig::default());

        // Nothing listens on port 1 on loopback.
        let result = dialer.dial(ctx, "tcp", "127.0.0.1:1").await;
        assert!(result.is_err());

        let connect_has_error = events.lock().unwrap().iter().any(|e| match e {
            Event::Connect(c) => c.error.is_some(),
            _ => false,
        });
        assert!(connect_has_error);
    }

    #[tokio::test]
    async fn connect_timeout_is_configurable() {
        let dialer = BaseDialer::new(DialerConfig::default().with_connect_timeout(Duration::from_nanos(1)));

        // TEST-NET-1, reserved for documentation: never answers, so the deadline will fire
        // first regardless of machine speed.
        let result = dialer.dial(Context::new(), "tcp", "192.0.2.1:9").await;

        assert!(result.is_err());
    }
}
