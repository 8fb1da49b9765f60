//! The single public entry point applications depend on (§9, §10.1): re-exports every type a
//! caller needs and wraps the dialer/resolver/tracer constructors so each attaches a fresh
//! [`MeasurementRoot`] to its `ctx` when the caller hasn't already attached one of their own
//! (§4.1 "Top-level entry points ... create and attach a fresh root if none is present").

use std::sync::Arc;

use bytes::Bytes;

pub use netx_context::{Context, EventHandler, LookupHostOverride, MeasurementRoot};
pub use netx_dialer::{BaseDialer, DialerConfig, DnsDialer, TlsDialer};
pub use netx_handlers::{ChannelHandler, NoopHandler, StdoutJsonHandler};
pub use netx_http::{HttpTracer, HttpTracerConfig};
pub use netx_model::{
    bogon, classify, is_bogon, BogonSentinel, Close, Common, ConnId, Connect, DialId, DnsQuery,
    DnsReply, Event, ErrorWrapper, Extension, ExtensionSeverity, Failure, HttpConnectionReady,
    HttpRequestDone, HttpRequestHeader, HttpRequestHeadersDone, HttpResponseBodyPart,
    HttpResponseDone, HttpResponseStart, HttpRoundTripDone, HttpRoundTripStart, NxdomainSentinel,
    Read, ResolveDone, ResolveId, ResolveStart, TlsHandshakeDone, TlsHandshakeStart,
    TransactionId, Write,
};
pub use netx_resolver::{
    ConfigError, DohTransport, DotTransport, QueryResolver, Resolver, ResolverConfig,
    ResolverWrapper, SystemResolver, TcpTransport, Timeouts, UdpTransport,
};

/// Instrumented byte-stream dialing: IP-literal ([`BaseDialer`]), hostname-resolving
/// ([`DnsDialer`]), and TLS ([`TlsDialer`]) are all attempted through this, plus an
/// instrumented HTTP client ([`HttpTracer`]) — this `Client` simply pairs each one with a
/// default [`MeasurementRoot`] so applications that don't care about threading their own root
/// through every call get one for free.
///
/// Applications that already run their own `ctx`/root (e.g. to group several dials into one
/// experiment) should call [`netx_dialer`]/[`netx_http`] directly instead — `Client` is the
/// single-experiment convenience path, not a requirement.
pub struct Client {
    default_root: Arc<MeasurementRoot>,
    dns: DnsDialer<Arc<dyn Resolver>>,
    tls: TlsDialer<Arc<dyn Resolver>>,
    http: HttpTracer,
}

impl Client {
    pub fn new(
        dialer_config: DialerConfig,
        resolver: Arc<dyn Resolver>,
        tls_config: Arc<rustls::ClientConfig>,
        http_config: HttpTracerConfig,
        handler: impl EventHandler,
    ) -> Self {
        Self {
            default_root: MeasurementRoot::new(handler),
            dns: DnsDialer::new(dialer_config, resolver.clone()),
            tls: TlsDialer::new(dialer_config, resolver.clone(), tls_config.clone()),
            http: HttpTracer::new(dialer_config, resolver, tls_config, http_config),
        }
    }

    fn ensure_root(&self, ctx: Context) -> Context {
        ctx.with_root(self.default_root.clone())
    }

    /// Dials `target` (`host:port`), resolving it first if it isn't already an IP literal.
    pub async fn dial(
        &self,
        ctx: Context,
        network: &'static str,
        target: &str,
    ) -> Result<netx_socket::MeasuringSocket<socket_factory::TcpStream>, ErrorWrapper> {
        self.dns.dial(self.ensure_root(ctx), network, target).await
    }

    /// Dials `target` and performs a TLS handshake over it.
    pub async fn dial_tls(
        &self,
        ctx: Context,
        network: &'static str,
        target: &str,
        server_name: Option<&str>,
        next_protos: &[&str],
    ) -> Result<tokio_rustls::client::TlsStream<socket_factory::TcpStream>, ErrorWrapper> {
        self.tls
            .dial(self.ensure_root(ctx), network, target, server_name, next_protos)
            .await
    }

    /// Performs one traced HTTP round trip.
    pub async fn do_request(
        &self,
        ctx: Context,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<Bytes>, ErrorWrapper> {
        self.http.request(self.ensure_root(ctx), request).await
    }

    pub async fn close_idle_connections(&self) {
        self.http.close_idle_connections().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

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
    async fn dial_attaches_a_fresh_root_when_the_caller_has_none() {
        let _guard = logging::test("debug");

        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let resolver: Arc<dyn Resolver> = Arc::new(ResolverWrapper::new(SystemResolver));
        let client = Client::new(
            DialerConfig::default(),
            resolver,
            test_tls_config(),
            HttpTracerConfig::default(),
            move |event: Event| events_clone.lock().unwrap().push(event),
        );

        assert!(!Context::new().has_root());

        let socket = client.dial(Context::new(), "tcp", &addr.to_string()).await.unwrap();
        assert_eq!(socket.peer_addr().unwrap(), addr);

        assert!(events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, Event::Connect(_))));
    }
}
