use std::net::IpAddr;

use async_trait::async_trait;
use netx_context::Context;
use netx_model::{classify, ErrorWrapper};

use crate::Resolver;

/// Delegates to the platform's resolver via [`tokio::net::lookup_host`]; emits no DNS-level
/// events of its own (§4.10: "System: ... emits no DNS-level events"). [`ResolverWrapper`]
/// wrapping this is what adds ResolveStart/ResolveDone.
///
/// [`ResolverWrapper`]: crate::ResolverWrapper
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn lookup_host(&self, _ctx: Context, host: &str) -> Result<Vec<IpAddr>, ErrorWrapper> {
        let target = format!("{host}:0");

        let addrs = tokio::net::lookup_host(&target)
            .await
            .map_err(|e| ErrorWrapper::new(classify(&anyhow::Error::new(e))))?;

        Ok(addrs.map(|addr| addr.ip()).collect())
    }

    fn network(&self) -> &'static str {
        "system"
    }

    fn address(&self) -> String {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "Requires Internet"]
    async fn resolves_a_well_known_host() {
        let resolver = SystemResolver;

        let addresses = resolver
            .lookup_host(Context::new(), "one.one.one.one")
            .await
            .unwrap();

        assert!(!addresses.is_empty());
    }

    #[tokio::test]
    async fn fails_fast_on_an_invalid_host() {
        let resolver = SystemResolver;

        let result = resolver.lookup_host(Context::new(), "").await;

        assert!(result.is_err());
    }
}
