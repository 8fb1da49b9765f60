//! A generic, swappable source of sockets.
//!
//! Every layer of the measurement stack that opens a socket (the base dialer,
//! the UDP/TCP DNS transports) does so through a [`SocketFactory`] instead of
//! calling `tokio::net::*` directly. Tests and alternative platforms can
//! therefore substitute a different factory (binding to a specific
//! interface, routing through a proxy, recording the creation itself)
//! without touching the dialer/transport code.

use std::{
    io,
    net::SocketAddr,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Constructs a socket bound for a connection towards `addr`.
///
/// `addr` is only used to pick the right address family (v4 vs v6); the
/// returned socket is not yet connected.
pub trait SocketFactory<S>: Fn(&SocketAddr) -> io::Result<S> + Send + Sync + 'static {}

impl<F, S> SocketFactory<S> for F where F: Fn(&SocketAddr) -> io::Result<S> + Send + Sync + 'static {}

/// The default [`SocketFactory`] for [`TcpSocket`]s.
pub fn tcp(addr: &SocketAddr) -> io::Result<TcpSocket> {
    let socket = match addr {
        SocketAddr::V4(_) => tokio::net::TcpSocket::new_v4()?,
        SocketAddr::V6(_) => tokio::net::TcpSocket::new_v6()?,
    };

    socket.set_nodelay(true)?;

    Ok(TcpSocket { inner: socket })
}

/// The default [`SocketFactory`] for [`UdpSocket`]s.
pub fn udp(addr: &SocketAddr) -> io::Result<UdpSocket> {
    let unspecified = match addr {
        SocketAddr::V4(_) => SocketAddr::from(([0, 0, 0, 0], 0)),
        SocketAddr::V6(_) => SocketAddr::from(([0u16; 8], 0)),
    };

    let domain = socket2::Domain::for_address(unspecified);
    let socket = socket2::Socket::new(domain, socket2::Type::DGRAM, None)?;
    socket.set_nonblocking(true)?;
    socket.bind(&unspecified.into())?;

    let socket = std::net::UdpSocket::from(socket);
    let socket = tokio::net::UdpSocket::from_std(socket)?;

    tracing::trace!(local = ?socket.local_addr(), "Created new UDP socket");

    Ok(UdpSocket { inner: socket })
}

/// An unconnected TCP socket, ready to [`connect`](TcpSocket::connect).
pub struct TcpSocket {
    inner: tokio::net::TcpSocket,
}

impl TcpSocket {
    pub async fn connect(self, addr: SocketAddr) -> io::Result<TcpStream> {
        let inner = self.inner.connect(addr).await?;

        Ok(TcpStream { inner })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

/// A connected, plain TCP stream.
///
/// This is the concrete type higher layers (the base dialer, in particular)
/// hand to [`netx_socket::MeasuringSocket`](../netx_socket/struct.MeasuringSocket.html).
pub struct TcpStream {
    inner: tokio::net::TcpStream,
}

impl TcpStream {
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.peer_addr()
    }

    pub fn set_nodelay(&self, nodelay: bool) -> io::Result<()> {
        self.inner.set_nodelay(nodelay)
    }
}

impl AsyncRead for TcpStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for TcpStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(unix)]
impl std::os::fd::AsRawFd for TcpStream {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        self.inner.as_raw_fd()
    }
}

/// A bound, unconnected UDP socket used for single request/reply DNS exchanges.
pub struct UdpSocket {
    inner: tokio::net::UdpSocket,
}

impl UdpSocket {
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Sends `query` to `dst` and waits for exactly one reply from that same address.
    ///
    /// This mirrors a classic stub-resolver request/response over UDP: one packet out,
    /// one packet in, no retries (retries are the caller's concern).
    pub async fn query(&self, dst: SocketAddr, query: &[u8], buf: &mut [u8]) -> io::Result<usize> {
        self.inner.connect(dst).await?;
        self.inner.send(query).await?;

        loop {
            let (len, from) = self.inner.recv_from(buf).await?;

            if from != dst {
                tracing::trace!(%from, expected = %dst, "Discarding reply from unexpected sender");
                continue;
            }

            return Ok(len);
        }
    }
}
