use std::net::{IpAddr, SocketAddr};

use netx_context::Context;
use netx_model::{DialId, ErrorWrapper, Failure};
use netx_resolver::Resolver;
use netx_socket::MeasuringSocket;

use crate::{BaseDialer, DialerConfig};

/// Resolves a `host:port` target before handing each candidate address to a [`BaseDialer`] in
/// turn (C6; §4.6).
///
/// An IP-literal target skips resolution entirely and falls straight through to the base dialer,
/// so `DnsDialer` is safe to put in front of every dial regardless of whether the caller already
/// has an address.
pub struct DnsDialer<R> {
    base: BaseDialer,
    resolver: R,
}

impl<R> DnsDialer<R>
where
    R: Resolver,
{
    pub fn new(config: DialerConfig, resolver: R) -> Self {
        Self {
            base: BaseDialer::new(config),
            resolver,
        }
    }

    /// Dials `target`, which may be an IP literal or a hostname, both in `host:port` form
    /// (bracketed for IPv6, e.g. `[::1]:443`).
    ///
    /// Mints a fresh [`DialId`] to correlate every connect attempt this call makes, unless `ctx`
    /// already carries one from an enclosing call (§4.2 "one dial id per attempt to reach one
    /// (host, port)").
    pub async fn dial(
        &self,
        ctx: Context,
        network: &'static str,
        target: &str,
    ) -> Result<MeasuringSocket<socket_factory::TcpStream>, ErrorWrapper> {
        let (host, port) = split_host_port(target)?;

        let dial_id = if ctx.dial_id().is_none() {
            DialId::next()
        } else {
            ctx.dial_id()
        };
        let ctx = ctx.with_dial_id(dial_id);

        if let Ok(ip) = host.parse::<IpAddr>() {
            return self.base.dial_addr(ctx, network, SocketAddr::new(ip, port)).await;
        }

        let addresses = self
            .resolver
            .lookup_host(ctx.clone(), &host)
            .await?
            .into_iter()
            .map(|ip| SocketAddr::new(ip, port));

        let mut last_error = None;
        let mut attempted = false;

        for addr in addresses {
            attempted = true;
            match self.base.dial_addr(ctx.clone(), network, addr).await {
                Ok(socket) => return Ok(socket),
                Err(e) => {
                    tracing::debug!(%addr, error = %e.failure, "Connect attempt failed, trying next address");
                    last_error = Some(e);
                }
            }
        }

        if !attempted {
            return Err(ErrorWrapper::new(Failure::Unknown(format!(
                "resolver returned no addresses for '{host}'"
            )))
            .with_dial_id(dial_id));
        }

        Err(last_error.expect("attempted is only true once at least one error was recorded"))
    }
}

fn split_host_port(target: &str) -> Result<(String, u16), ErrorWrapper> {
    if let Ok(addr) = target.parse::<SocketAddr>() {
        return Ok((addr.ip().to_string(), addr.port()));
    }

    let (host, port) = target
        .rsplit_once(':')
        .ok_or_else(|| ErrorWrapper::new(Failure::Unknown(format!("'{target}' is not a host:port pair"))))?;

    let port: u16 = port
        .parse()
        .map_err(|_| ErrorWrapper::new(Failure::Unknown(format!("'{target}' has an invalid port"))))?;

    let host = host.trim_start_matches('[').trim_end_matches(']');

    Ok((host.to_owned(), port))
}
