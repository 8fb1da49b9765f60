use std::net::IpAddr;

use async_trait::async_trait;
use netx_context::Context;
use netx_model::{is_bogon, Common, ErrorWrapper, Event, Failure, ResolveDone, ResolveId, ResolveStart};

use crate::Resolver;

/// Interposed on every resolver (§4.10): adds the ResolveStart/ResolveDone events every
/// transport needs regardless of how it gets its answers, and bogon detection on top of
/// whatever the inner resolver returns.
///
/// [`crate::QueryResolver`] and [`crate::SystemResolver`] both implement [`Resolver`] directly
/// but emit no Resolve-level events themselves; wrapping either of them in this type is what
/// completes the contract.
pub struct ResolverWrapper<R> {
    inner: R,
}

impl<R: Resolver> ResolverWrapper<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<R: Resolver> Resolver for ResolverWrapper<R> {
    async fn lookup_host(&self, ctx: Context, host: &str) -> Result<Vec<IpAddr>, ErrorWrapper> {
        // A nested resolve (DoH-over-another-resolve) already carries a resolve_id; only mint a
        // fresh one when this is the outermost call (§4.1 "one root = one clock" applies
        // analogously to ids: never mint a second one for the same logical resolve).
        let resolve_id = if ctx.resolve_id().is_none() {
            ResolveId::next()
        } else {
            ctx.resolve_id()
        };
        let ctx = ctx.with_resolve_id(resolve_id);

        ctx.emit(Event::ResolveStart(ResolveStart {
            common: Common::new(ctx.elapsed())
                .with_dial_id(ctx.dial_id())
                .with_resolve_id(resolve_id),
            hostname: host.to_owned(),
            transport_network: self.inner.network().to_owned(),
            transport_address: self.inner.address(),
        }));

        let result = match ctx.root_or_default().lookup_host_override() {
            Some(lookup_host) => lookup_host(ctx.clone(), host.to_owned()).await,
            None => self.inner.lookup_host(ctx.clone(), host).await,
        };

        let (addresses_for_event, outcome) = classify_bogons(result, resolve_id, ctx.dial_id());

        ctx.emit(Event::ResolveDone(ResolveDone {
            common: Common::new(ctx.elapsed())
                .with_dial_id(ctx.dial_id())
                .with_resolve_id(resolve_id),
            hostname: host.to_owned(),
            addresses: addresses_for_event,
            error: outcome.as_ref().err().cloned(),
        }));

        outcome
    }

    fn network(&self) -> &'static str {
        self.inner.network()
    }

    fn address(&self) -> String {
        self.inner.address()
    }
}

/// Applies the §4.10 bogon rule: the event keeps the full address list for forensics, but a
/// naive caller of `lookup_host` receives an empty list and `dns_bogon_error` (§9 open question,
/// resolved: a mixed bogon/routable result fails outright rather than dialing the routable
/// subset).
fn classify_bogons(
    result: Result<Vec<IpAddr>, ErrorWrapper>,
    resolve_id: ResolveId,
    dial_id: netx_model::DialId,
) -> (Vec<IpAddr>, Result<Vec<IpAddr>, ErrorWrapper>) {
    match result {
        Ok(addresses) if addresses.iter().any(|addr| is_bogon(*addr)) => {
            tracing::warn!(?addresses, "Resolved addresses include a bogon, failing the lookup");

            let error = ErrorWrapper::new(Failure::DnsBogonError)
                .with_resolve_id(resolve_id)
                .with_dial_id(dial_id);

            (addresses, Err(error))
        }
        Ok(addresses) => (addresses.clone(), Ok(addresses)),
        Err(error) => (Vec::new(), Err(error)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use netx_context::MeasurementRoot;
    use netx_model::Event;

    use super::*;

    struct StubResolver(Result<Vec<IpAddr>, ErrorWrapper>);

    #[async_trait]
    impl Resolver for StubResolver {
        async fn lookup_host(&self, _ctx: Context, _host: &str) -> Result<Vec<IpAddr>, ErrorWrapper> {
            self.0.clone()
        }

        fn network(&self) -> &'static str {
            "stub"
        }

        fn address(&self) -> String {
            "stub-address".to_owned()
        }
    }

    fn recording_ctx() -> (Context, Arc<Mutex<Vec<Event>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        let root = MeasurementRoot::new(move |event: Event| events_clone.lock().unwrap().push(event));

        (Context::new().with_root(root), events)
    }

    #[tokio::test]
    async fn bogon_addresses_are_blanked_from_the_return_value_but_kept_on_the_event() {
        let (ctx, events) = recording_ctx();
        let bogon = IpAddr::from([10, 10, 11, 10]);
        let wrapper = ResolverWrapper::new(StubResolver(Ok(vec![bogon, IpAddr::from([8, 8, 8, 8])])));

        let result = wrapper.lookup_host(ctx, "example.com").await;

        assert_eq!(result.unwrap_err().failure, Failure::DnsBogonError);

        let done = events
            .lock()
            .unwrap()
            .iter()
            .find_map(|e| match e {
                Event::ResolveDone(d) => Some(d.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(done.addresses, vec![bogon, IpAddr::from([8, 8, 8, 8])]);
    }

    #[tokio::test]
    async fn clean_result_passes_through_unchanged() {
        let (ctx, _events) = recording_ctx();
        let addr = IpAddr::from([93, 184, 216, 34]);
        let wrapper = ResolverWrapper::new(StubResolver(Ok(vec![addr])));

        let result = wrapper.lookup_host(ctx, "example.com").await.unwrap();

        assert_eq!(result, vec![addr]);
    }

    #[tokio::test]
    async fn emits_resolve_start_before_resolve_done() {
        let (ctx, events) = recording_ctx();
        let wrapper = ResolverWrapper::new(StubResolver(Ok(vec![IpAddr::from([1, 1, 1, 1])])));

        wrapper.lookup_host(ctx, "example.com").await.unwrap();

        let kinds: Vec<_> = events.lock().unwrap().iter().map(Event::kind).collect();
        assert_eq!(kinds, vec!["ResolveStart", "ResolveDone"]);
    }

    #[tokio::test]
    async fn reuses_an_existing_resolve_id_instead_of_minting_a_new_one() {
        let (ctx, _events) = recording_ctx();
        let existing = ResolveId::next();
        let ctx = ctx.with_resolve_id(existing);
        let wrapper = ResolverWrapper::new(StubResolver(Ok(vec![IpAddr::from([1, 1, 1, 1])])));

        wrapper.lookup_host(ctx, "example.com").await.unwrap();
    }
}
