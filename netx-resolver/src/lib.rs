//! DNS resolution: the wire transports (C8; §4.8), the query resolver that drives them (C9;
//! §4.9), and the wrapper that adds events and bogon detection to any of the above (C10; §4.10).

mod config;
mod doh;
mod dot;
mod query;
mod system;
mod tcp;
mod udp;
mod wrapper;

pub use config::{ConfigError, ResolverConfig, Timeouts};
pub use doh::DohTransport;
pub use dot::DotTransport;
pub use query::QueryResolver;
pub use system::SystemResolver;
pub use tcp::TcpTransport;
pub use udp::UdpTransport;
pub use wrapper::ResolverWrapper;

use std::{io, net::IpAddr};

use async_trait::async_trait;
use netx_context::Context;
use netx_model::{classify, ConnId, ErrorWrapper};

/// Resolves a hostname to its addresses (§4.9, §4.10).
///
/// [`SystemResolver`] and [`QueryResolver`] implement this directly; [`ResolverWrapper`] wraps
/// either one to add the ResolveStart/ResolveDone events and bogon detection every resolver
/// needs, regardless of how it actually gets its answers.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn lookup_host(&self, ctx: Context, host: &str) -> Result<Vec<IpAddr>, ErrorWrapper>;

    /// The `(network, address)` this resolver ultimately asks, exposed on [`ResolverWrapper`]'s
    /// events for forensics (§4.10). Defaulted for resolvers that don't meaningfully have one.
    fn network(&self) -> &'static str {
        "unknown"
    }

    fn address(&self) -> String {
        String::new()
    }
}

#[async_trait]
impl<R: Resolver + ?Sized> Resolver for std::sync::Arc<R> {
    async fn lookup_host(&self, ctx: Context, host: &str) -> Result<Vec<IpAddr>, ErrorWrapper> {
        (**self).lookup_host(ctx, host).await
    }

    fn network(&self) -> &'static str {
        (**self).network()
    }

    fn address(&self) -> String {
        (**self).address()
    }
}

/// A concrete DNS wire transport (§4.8): turns a serialized query into a serialized reply.
///
/// Implementations are responsible for emitting their own Connect/TLSHandshake*/DNSQuery/
/// DNSReply events; [`QueryResolver`] only adds ResolveId correlation and the A/AAAA/retry
/// policy on top.
#[async_trait]
pub trait DnsTransport: Send + Sync {
    async fn round_trip(&self, ctx: Context, query: &[u8]) -> Result<Vec<u8>, ErrorWrapper>;

    /// The configured `(network, address)`, attached to [`netx_model::ResolveStart`] for
    /// forensics (§4.10).
    fn network(&self) -> &'static str;

    fn address(&self) -> String;
}

pub(crate) fn to_error_wrapper(error: &io::Error, conn_id: ConnId) -> ErrorWrapper {
    let anyhow_error = anyhow::Error::new(io::Error::new(error.kind(), error.to_string()));

    ErrorWrapper::new(classify(&anyhow_error)).with_conn_id(conn_id)
}

pub(crate) fn describe_query(bytes: &[u8]) -> Option<String> {
    dns_types::Query::parse(bytes).ok().map(|q| format!("{q:?}"))
}

pub(crate) fn describe_reply(bytes: &[u8]) -> Option<String> {
    dns_types::Response::parse(bytes).ok().map(|r| format!("{r:?}"))
}
