use std::sync::{Arc, Mutex};

use http_client::{Connected, ConnectFuture, Protocol};
use netx_context::Context;
use netx_dialer::{DialerConfig, DnsDialer, TlsDialer};
use netx_model::{ConnId, Common, Event, HttpConnectionReady};
use netx_resolver::Resolver;

use crate::io::TracedIo;

/// Bridges [`http_client::Connector`] to the measured dialer stack, and is where `GotConn` (§4.11
/// step 3) is realized: the connection's id is recovered from its local address rather than
/// threaded through, since by the time `http-client` asks for a connection it only knows
/// `(host, port, https)`.
///
/// `active_ctx` is the "install a trace object, save and restore the parent's" mechanism of
/// §4.11 step 4: [`crate::HttpTracer::request`] swaps in the context for its own call and
/// restores whatever was there before on return, so a DoH resolve nested inside a traced request
/// attributes its own events to its own transaction rather than the enclosing one.
pub(crate) struct TracingConnector {
    pub(crate) active_ctx: Arc<Mutex<Context>>,
    pub(crate) config: DialerConfig,
    pub(crate) resolver: Arc<dyn Resolver>,
    pub(crate) tls_config: Arc<rustls::ClientConfig>,
}

impl http_client::Connector for TracingConnector {
    type Io = TracedIo;

    fn connect(&self, host: &str, port: u16, https: bool) -> ConnectFuture<Self::Io> {
        let ctx = self.active_ctx.lock().unwrap().clone();
        let config = self.config;
        let resolver = self.resolver.clone();
        let tls_config = self.tls_config.clone();
        let target = format!("{host}:{port}");

        Box::pin(async move {
            let io = if https {
                let dialer = TlsDialer::new(config, resolver, tls_config);
                let stream = dialer
                    .dial(ctx.clone(), "tcp", &target, None, &["h2", "http/1.1"])
                    .await
                    .map_err(|e| anyhow::anyhow!("{}", e.failure))?;

                TracedIo::Tls(Box::new(stream))
            } else {
                let dialer = DnsDialer::new(config, resolver);
                let socket = dialer
                    .dial(ctx.clone(), "tcp", &target)
                    .await
                    .map_err(|e| anyhow::anyhow!("{}", e.failure))?;

                TracedIo::Plain(socket)
            };

            let conn_id = ConnId::from_local_addr_hash("tcp", io.local_addr()?);

            ctx.emit(Event::HttpConnectionReady(HttpConnectionReady {
                common: Common::new(ctx.elapsed())
                    .with_transaction_id(ctx.transaction_id())
                    .with_conn_id(conn_id),
            }));

            let protocol = match io.alpn_protocol().as_deref() {
                Some(b"h2") => Protocol::Http2,
                _ => Protocol::Http1,
            };

            Ok(Connected::new(io, protocol))
        })
    }
}
