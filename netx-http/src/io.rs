use std::{
    io,
    net::SocketAddr,
    pin::Pin,
    task::{Context as TaskContext, Poll},
};

use netx_socket::MeasuringSocket;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// The concrete I/O type a traced connection hands to `http-client`: either a plain measuring
/// socket (cleartext) or a TLS stream layered directly on top of one (HTTPS), unified behind one
/// type so [`http_client::Connector`]'s associated `Io` type doesn't need to be generic over both
/// (§4.11). Neither variant ever unwraps its [`MeasuringSocket`]: Read/Write/Close events keep
/// being emitted for the full lifetime of the connection, TLS included.
pub enum TracedIo {
    Plain(MeasuringSocket<socket_factory::TcpStream>),
    Tls(Box<tokio_rustls::client::TlsStream<MeasuringSocket<socket_factory::TcpStream>>>),
}

impl TracedIo {
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match self {
            TracedIo::Plain(s) => s.local_addr(),
            TracedIo::Tls(s) => s.get_ref().0.local_addr(),
        }
    }

    pub fn alpn_protocol(&self) -> Option<Vec<u8>> {
        match self {
            TracedIo::Plain(_) => None,
            TracedIo::Tls(s) => s.get_ref().1.alpn_protocol().map(<[u8]>::to_vec),
        }
    }
}

impl AsyncRead for TracedIo {
    fn poll_read(self: Pin<&mut Self>, cx: &mut TaskContext<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TracedIo::Plain(s) => Pin::new(s).poll_read(cx, buf),
            TracedIo::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for TracedIo {
    fn poll_write(self: Pin<&mut Self>, cx: &mut TaskContext<'_>, data: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            TracedIo::Plain(s) => Pin::new(s).poll_write(cx, data),
            TracedIo::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, data),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TracedIo::Plain(s) => Pin::new(s).poll_flush(cx),
            TracedIo::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TracedIo::Plain(s) => Pin::new(s).poll_shutdown(cx),
            TracedIo::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}
