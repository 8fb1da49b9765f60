//! The HTTP round-trip tracer (C11; §4.11, §4.12).
//!
//! Wraps [`http_client::HttpClient`] — itself built on the dialer stack — to emit the HTTP
//! lifecycle events with correct transaction ids. The underlying client buffers a response body
//! fully rather than streaming it (the "HTTP/1.1 and HTTP/2 request pipelines themselves" are
//! explicitly platform-provided, out of scope to reimplement), so `HTTPResponseBodyPart` is
//! emitted once per request with the complete body rather than once per chunk read off the wire.

mod config;
mod connector;
mod io;

pub use config::HttpTracerConfig;

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use netx_context::Context;
use netx_dialer::DialerConfig;
use netx_model::{
    classify, Common, ErrorWrapper, Event, HttpRequestDone, HttpRequestHeader,
    HttpRequestHeadersDone, HttpResponseBodyPart, HttpResponseDone, HttpResponseStart,
    HttpRoundTripDone, HttpRoundTripStart, TransactionId,
};
use netx_resolver::Resolver;
use tokio::sync::Mutex as AsyncMutex;

use connector::TracingConnector;

/// Traces one or more HTTP round trips against a fixed set of dialer settings, reusing
/// connections per-authority across calls the same way the underlying `http-client` does.
pub struct HttpTracer {
    client: AsyncMutex<http_client::HttpClient<TracingConnector>>,
    active_ctx: Arc<Mutex<Context>>,
    config: HttpTracerConfig,
}

impl HttpTracer {
    pub fn new(
        dialer_config: DialerConfig,
        resolver: Arc<dyn Resolver>,
        tls_config: Arc<rustls::ClientConfig>,
        config: HttpTracerConfig,
    ) -> Self {
        let active_ctx = Arc::new(Mutex::new(Context::new()));

        let connector = TracingConnector {
            active_ctx: active_ctx.clone(),
            config: dialer_config,
            resolver,
            tls_config,
        };

        Self {
            client: AsyncMutex::new(http_client::HttpClient::new(connector)),
            active_ctx,
            config,
        }
    }

    /// Performs one HTTP round trip, emitting the full event sequence of §4.11.
    ///
    /// Temporarily installs `ctx` as the context the connector's `GotConn` callback attributes
    /// its event to, restoring whatever was previously installed on return — this is what keeps
    /// a DoH resolve nested inside this call (via the resolver passed to [`HttpTracer::new`])
    /// correctly attributed to its own resolve, not to this round trip (§4.11 step 4).
    pub async fn request(
        &self,
        ctx: Context,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<Bytes>, ErrorWrapper> {
        let transaction_id = if ctx.transaction_id().is_none() {
            TransactionId::next()
        } else {
            ctx.transaction_id()
        };
        let ctx = ctx.with_transaction_id(transaction_id);

        let method = request.method().to_string();
        let url = request.uri().to_string();

        ctx.emit(Event::HttpRoundTripStart(HttpRoundTripStart {
            common: Common::new(ctx.elapsed())
                .with_transaction_id(transaction_id)
                .with_dial_id(ctx.dial_id()),
            method,
            url,
        }));

        for (name, value) in request.headers() {
            ctx.emit(Event::HttpRequestHeader(HttpRequestHeader {
                common: Common::new(ctx.elapsed()).with_transaction_id(transaction_id),
                key: name.to_string(),
                values: vec![String::from_utf8_lossy(value.as_bytes()).into_owned()],
            }));
        }
        ctx.emit(Event::HttpRequestHeadersDone(HttpRequestHeadersDone {
            common: Common::new(ctx.elapsed()).with_transaction_id(transaction_id),
        }));

        // Hold the client lock across the install/restore of `active_ctx` too: only one
        // `send_request` is ever in flight at a time (the client is behind this same mutex), so
        // this keeps a concurrent call from observing another call's context mid-request.
        let mut client = self.client.lock().await;

        let previous_ctx = { self.active_ctx.lock().unwrap().clone() };
        *self.active_ctx.lock().unwrap() = ctx.clone();
        let _restore = RestoreGuard {
            active_ctx: &self.active_ctx,
            previous: Some(previous_ctx),
        };

        let outcome = client.send_request(request).await;
        let result = outcome.map_err(|e| ErrorWrapper::new(classify(&e)).with_transaction_id(transaction_id));

        ctx.emit(Event::HttpRequestDone(HttpRequestDone {
            common: Common::new(ctx.elapsed()).with_transaction_id(transaction_id),
            error: result.as_ref().err().cloned(),
        }));

        let Ok(response) = result else {
            ctx.emit(Event::HttpRoundTripDone(HttpRoundTripDone {
                common: Common::new(ctx.elapsed()).with_transaction_id(transaction_id),
                status_code: 0,
                headers: Vec::new(),
                error: result.as_ref().err().cloned(),
            }));

            return Err(result.unwrap_err());
        };

        ctx.emit(Event::HttpResponseStart(HttpResponseStart {
            common: Common::new(ctx.elapsed()).with_transaction_id(transaction_id),
        }));

        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        ctx.emit(Event::HttpRoundTripDone(HttpRoundTripDone {
            common: Common::new(ctx.elapsed()).with_transaction_id(transaction_id),
            status_code: response.status().as_u16(),
            headers,
            error: None,
        }));

        let body = response.body();
        ctx.emit(Event::HttpResponseBodyPart(HttpResponseBodyPart {
            common: Common::new(ctx.elapsed()).with_transaction_id(transaction_id),
            data: self.config.capture_response_body.then(|| body.to_vec()),
            num_bytes: body.len(),
            error: None,
        }));

        ctx.emit(Event::HttpResponseDone(HttpResponseDone {
            common: Common::new(ctx.elapsed()).with_transaction_id(transaction_id),
            error: None,
        }));

        Ok(response)
    }

    /// Forwards to the underlying transport (§4.11 step 7).
    pub async fn close_idle_connections(&self) {
        self.client.lock().await.close_idle_connections();
    }
}

struct RestoreGuard<'a> {
    active_ctx: &'a Mutex<Context>,
    previous: Option<Context>,
}

impl Drop for RestoreGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            *self.active_ctx.lock().unwrap() = previous;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::SocketAddr,
        sync::{Arc as StdArc, Mutex as StdMutex},
    };

    use async_trait::async_trait;
    use netx_context::MeasurementRoot;
    use netx_model::ErrorWrapper as NetxErrorWrapper;

    use super::*;

    struct NoopResolver;

    #[async_trait]
    impl Resolver for NoopResolver {
        async fn lookup_host(
            &self,
            _ctx: Context,
            _host: &str,
        ) -> Result<Vec<std::net::IpAddr>, NetxErrorWrapper> {
            Ok(Vec::new())
        }
    }

    fn recording_ctx() -> (Context, StdArc<StdMutex<Vec<Event>>>) {
        let events = StdArc::new(StdMutex::new(Vec::new()));
        let events_clone = events.clone();
        let root = MeasurementRoot::new(move |event: Event| events_clone.lock().unwrap().push(event));

        (Context::new().with_root(root), events)
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

    async fn spawn_health_check() -> SocketAddr {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        let local_addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let _ = http_health_check::serve_listener(listener).await;
        });

        local_addr
    }

    #[tokio::test]
    async fn happy_path_emits_the_full_event_sequence_for_a_plaintext_request() {
        logging::test_global("debug");

        let addr = spawn_health_check().await;
        let (ctx, events) = recording_ctx();

        let tracer = HttpTracer::new(
            DialerConfig::default(),
            Arc::new(NoopResolver),
            test_tls_config(),
            HttpTracerConfig::default(),
        );

        let request = http::Request::builder()
            .uri(format!("http://{}:{}/healthz", addr.ip(), addr.port()))
            .body(Bytes::new())
            .unwrap();

        let response = tracer.request(ctx, request).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);

        let kinds: Vec<&'static str> = events.lock().unwrap().iter().map(Event::kind).collect();

        assert_eq!(
            kinds,
            vec![
                "HTTPRoundTripStart",
                "HTTPRequestHeadersDone",
                "Connect",
                "HTTPConnectionReady",
                "HTTPRequestDone",
                "HTTPResponseStart",
                "HTTPRoundTripDone",
                "HTTPResponseBodyPart",
                "HTTPResponseDone",
            ]
        );
    }

    #[tokio::test]
    async fn failure_to_connect_skips_response_events() {
        let (ctx, events) = recording_ctx();

        let tracer = HttpTracer::new(
            DialerConfig::default().with_connect_timeout(std::time::Duration::from_millis(200)),
            Arc::new(NoopResolver),
            test_tls_config(),
            HttpTracerConfig::default(),
        );

        let request = http::Request::builder()
            .uri("http://127.0.0.1:1/")
            .body(Bytes::new())
            .unwrap();

        let result = tracer.request(ctx, request).await;
        assert!(result.is_err());

        let kinds: Vec<&'static str> = events.lock().unwrap().iter().map(Event::kind).collect();
        assert!(!kinds.contains(&"HTTPResponseStart"));
        assert!(!kinds.contains(&"HTTPResponseBodyPart"));
        assert!(kinds.contains(&"HTTPRoundTripDone"));
    }
}
