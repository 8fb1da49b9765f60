//! The measuring socket wrapper (C4; §4.4).

use std::{
    io,
    net::SocketAddr,
    pin::Pin,
    task::{ready, Context as TaskContext, Poll},
    time::Instant,
};

use netx_context::Context;
use netx_model::{classify, Close, Common, ConnId, Read, Write};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Implemented by the concrete, unwrapped socket types a [`MeasuringSocket`] can wrap.
///
/// This is what lets [`MeasuringSocket`] forward `local_addr`/`peer_addr` transparently, so
/// higher layers (TLS, HTTP/2) cannot tell the socket apart from a plain one (§4.4).
pub trait SocketAddrs {
    fn local_addr(&self) -> io::Result<SocketAddr>;
    fn peer_addr(&self) -> io::Result<SocketAddr>;
}

impl SocketAddrs for socket_factory::TcpStream {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        socket_factory::TcpStream::local_addr(self)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        socket_factory::TcpStream::peer_addr(self)
    }
}

/// Wraps a connected byte-stream socket, emitting [`Read`]/[`Write`]/[`Close`] events for every
/// operation while being otherwise transparent to its caller (§4.4).
///
/// Implements `AsyncRead`/`AsyncWrite` generically over its inner socket, so a TLS layer (or
/// anything else) can be built directly on top of a [`MeasuringSocket`] without ever unwrapping
/// it — `TlsDialer` does exactly that, running the handshake on the `MeasuringSocket` itself so
/// Read/Write/Close events keep being emitted for the lifetime of the encrypted connection.
pub struct MeasuringSocket<S> {
    inner: S,
    ctx: Context,
    conn_id: ConnId,
    network: &'static str,
    closed: bool,
}

impl<S> MeasuringSocket<S> {
    pub fn new(inner: S, ctx: Context, conn_id: ConnId, network: &'static str) -> Self {
        Self {
            inner,
            ctx,
            conn_id,
            network,
            closed: false,
        }
    }

    pub fn conn_id(&self) -> ConnId {
        self.conn_id
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S> MeasuringSocket<S>
where
    S: SocketAddrs,
{
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.peer_addr()
    }
}

impl<S> AsyncRead for MeasuringSocket<S>
where
    S: AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let start = Instant::now();
        let filled_before = buf.filled().len();

        let result = ready!(Pin::new(&mut this.inner).poll_read(cx, buf));

        let num_bytes = buf.filled().len() - filled_before;
        this.emit_read(start, num_bytes, result.as_ref().err());

        Poll::Ready(result)
    }
}

impl<S> AsyncWrite for MeasuringSocket<S>
where
    S: AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let start = Instant::now();

        let result = ready!(Pin::new(&mut this.inner).poll_write(cx, data));

        let num_bytes = *result.as_ref().unwrap_or(&0);
        this.emit_write(start, num_bytes, result.as_ref().err());

        Poll::Ready(result)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let result = ready!(Pin::new(&mut this.inner).poll_shutdown(cx));

        this.emit_close(result.as_ref().err());

        Poll::Ready(result)
    }
}

impl<S> MeasuringSocket<S> {
    fn emit_read(&self, start: Instant, num_bytes: usize, error: Option<&io::Error>) {
        let blocked_duration = start.elapsed();
        let common = Common::new(self.ctx.elapsed()).with_conn_id(self.conn_id);

        self.ctx.emit(netx_model::Event::Read(Read {
            common,
            blocked_duration,
            num_bytes,
            error: error.map(|e| to_error_wrapper(e, self.conn_id)),
        }));
    }

    fn emit_write(&self, start: Instant, num_bytes: usize, error: Option<&io::Error>) {
        let blocked_duration = start.elapsed();
        let common = Common::new(self.ctx.elapsed()).with_conn_id(self.conn_id);

        self.ctx.emit(netx_model::Event::Write(Write {
            common,
            blocked_duration,
            num_bytes,
            error: error.map(|e| to_error_wrapper(e, self.conn_id)),
        }));
    }

    fn emit_close(&mut self, error: Option<&io::Error>) {
        if self.closed {
            return;
        }
        self.closed = true;

        let common = Common::new(self.ctx.elapsed()).with_conn_id(self.conn_id);

        self.ctx.emit(netx_model::Event::Close(Close {
            common,
            error: error.map(|e| to_error_wrapper(e, self.conn_id)),
        }));
    }
}

impl<S> Drop for MeasuringSocket<S> {
    fn drop(&mut self) {
        // Guarantee exactly one Close event even if the caller never called `poll_shutdown`
        // (e.g. it was simply dropped after an error) — §3 "Lifecycles".
        self.emit_close(None);
    }
}

fn to_error_wrapper(error: &io::Error, conn_id: ConnId) -> netx_model::ErrorWrapper {
    let anyhow_error = anyhow::Error::new(io::Error::new(error.kind(), error.to_string()));

    netx_model::ErrorWrapper::new(classify(&anyhow_error)).with_conn_id(conn_id)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use netx_context::MeasurementRoot;
    use netx_model::Event;
    use tokio::io::{duplex, AsyncReadExt as _, AsyncWriteExt as _};

    use super::*;

    #[tokio::test]
    async fn read_write_and_close_emit_exactly_once() {
        let events = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let events_clone = events.clone();

        let root = MeasurementRoot::new(move |event: Event| {
            events_clone.lock().unwrap().push(event);
        });
        let ctx = Context::new().with_root(root);

        let (client, mut server) = duplex(64);
        let mut measured = MeasuringSocket::new(client, ctx, ConnId::next(), "tcp");

        measured.write_all(b"hello").await.unwrap();
        server.write_all(b"world").await.unwrap();

        let mut buf = [0u8; 5];
        measured.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"world");

        tokio::io::AsyncWriteExt::shutdown(&mut measured).await.unwrap();
        drop(measured);

        let events = events.lock().unwrap();
        let close_events = events
            .iter()
            .filter(|e| matches!(e, Event::Close(_)))
            .count();
        let write_events = events
            .iter()
            .filter(|e| matches!(e, Event::Write(_)))
            .count();
        let read_events = events
            .iter()
            .filter(|e| matches!(e, Event::Read(_)))
            .count();

        assert_eq!(close_events, 1, "Close must be emitted exactly once");
        assert!(write_events >= 1);
        assert!(read_events >= 1);
    }

    #[tokio::test]
    async fn dropping_without_explicit_shutdown_still_emits_close() {
        let events = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let events_clone = events.clone();

        let root = MeasurementRoot::new(move |event: Event| {
            events_clone.lock().unwrap().push(event);
        });
        let ctx = Context::new().with_root(root);

        let (client, _server) = duplex(64);
        let measured = MeasuringSocket::new(client, ctx, ConnId::next(), "tcp");

        drop(measured);

        let events = events.lock().unwrap();
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, Event::Close(_)))
                .count(),
            1
        );
    }

    #[test]
    fn blocked_duration_is_never_negative() {
        let start = Instant::now();
        std::thread::sleep(Duration::from_millis(1));
        assert!(start.elapsed() >= Duration::from_millis(1));
    }
}
