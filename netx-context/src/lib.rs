//! The ambient context that correlation ids and the active [`MeasurementRoot`] flow through
//! (C2; §4.1, §9).
//!
//! The design note in §9 explicitly allows realizing "ambient context" as an explicit extra
//! parameter rather than a task-local: that is the choice made here. [`Context`] is a cheap,
//! `Clone`-able, `Arc`-backed value that every dialer/resolver/tracer operation takes by value
//! (or reference) and threads down into its sub-calls, picking up new ids along the way with
//! [`Context::with_dial_id`] and friends.

use std::{
    future::Future,
    net::IpAddr,
    pin::Pin,
    sync::Arc,
    time::Instant,
};

use netx_model::{ConnId, DialId, ErrorWrapper, Event, ResolveId, TransactionId};
use tokio_util::sync::CancellationToken;

/// Receives every [`Event`] the measurement core emits.
///
/// Implementations MUST be thread-safe (§4.3) and MUST NOT block the calling thread; if they
/// might, they must hand the event off to an internal queue themselves (the built-in
/// `netx-handlers` channel handler does exactly that).
pub trait EventHandler: Send + Sync + 'static {
    fn handle(&self, event: Event);
}

impl<F> EventHandler for F
where
    F: Fn(Event) + Send + Sync + 'static,
{
    fn handle(&self, event: Event) {
        self(event)
    }
}

/// A resolver override installed on a [`MeasurementRoot`], used by tests and by callers that
/// already know the answer (e.g. the bogon-injection scenario of §8 seed 4).
pub type LookupHostOverride = dyn Fn(
        Context,
        String,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<IpAddr>, ErrorWrapper>> + Send>>
    + Send
    + Sync;

/// Per-operation container holding the monotonic zero-time and the event handler (§3, §4.1).
///
/// One [`MeasurementRoot`] == one experiment == one monotonic clock: sub-operations (a DoH
/// resolve nested inside a dial) must never attach a second root, which is exactly what
/// [`Context::with_root`]'s idempotence guarantees.
pub struct MeasurementRoot {
    beginning: Instant,
    handler: Arc<dyn EventHandler>,
    lookup_host_override: Option<Arc<LookupHostOverride>>,
}

impl std::fmt::Debug for MeasurementRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeasurementRoot")
            .field("beginning", &self.beginning)
            .field(
                "lookup_host_override",
                &self.lookup_host_override.is_some(),
            )
            .finish_non_exhaustive()
    }
}

impl MeasurementRoot {
    pub fn new(handler: impl EventHandler) -> Arc<Self> {
        Arc::new(Self {
            beginning: Instant::now(),
            handler: Arc::new(handler),
            lookup_host_override: None,
        })
    }

    /// A root backed by a handler that discards every event; returned by
    /// [`Context::root_or_default`] when no root was ever attached.
    pub fn noop() -> Arc<Self> {
        Self::new(|_event: Event| {})
    }

    pub fn with_lookup_host_override(
        handler: impl EventHandler,
        lookup_host: impl Fn(
                Context,
                String,
            ) -> Pin<Box<dyn Future<Output = Result<Vec<IpAddr>, ErrorWrapper>> + Send>>
            + Send
            + Sync
            + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            beginning: Instant::now(),
            handler: Arc::new(handler),
            lookup_host_override: Some(Arc::new(lookup_host)),
        })
    }

    /// Duration elapsed since this root was constructed; used to stamp every [`Event::common`]'s
    /// `elapsed` field (§3).
    pub fn elapsed(&self) -> std::time::Duration {
        self.beginning.elapsed()
    }

    pub fn emit(&self, event: Event) {
        self.handler.handle(event);
    }

    pub fn lookup_host_override(&self) -> Option<&Arc<LookupHostOverride>> {
        self.lookup_host_override.as_ref()
    }
}

/// The ambient carrier threaded through every measured operation (§4.1).
#[derive(Clone)]
pub struct Context {
    root: Option<Arc<MeasurementRoot>>,
    dial_id: DialId,
    conn_id: ConnId,
    transaction_id: TransactionId,
    resolve_id: ResolveId,
    cancellation: CancellationToken,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            root: None,
            dial_id: DialId::NONE,
            conn_id: ConnId::NONE,
            transaction_id: TransactionId::NONE,
            resolve_id: ResolveId::NONE,
            cancellation: CancellationToken::new(),
        }
    }
}

impl Context {
    /// A fresh, unrooted context; top-level entry points call [`Context::with_root`] on this
    /// (or on whatever context the caller already has) to attach a fresh root when none is
    /// present yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `root`, unless a root is already present — in which case the existing root is
    /// kept unchanged (§4.1: "never replaces silently ... idempotent for already-rooted
    /// contexts").
    ///
    /// Passing a null root fails fast: a [`MeasurementRoot`] is always an `Arc`, so there is no
    /// "null" to pass in Rust; this fails fast at compile time instead of at runtime.
    pub fn with_root(self, root: Arc<MeasurementRoot>) -> Self {
        if self.root.is_some() {
            return self;
        }

        Self {
            root: Some(root),
            ..self
        }
    }

    /// Returns the attached root, or a fresh no-op-backed one if none was ever attached,
    /// guaranteeing downstream code never needs a null check (§4.1).
    pub fn root_or_default(&self) -> Arc<MeasurementRoot> {
        self.root.clone().unwrap_or_else(MeasurementRoot::noop)
    }

    pub fn has_root(&self) -> bool {
        self.root.is_some()
    }

    pub fn dial_id(&self) -> DialId {
        self.dial_id
    }

    pub fn conn_id(&self) -> ConnId {
        self.conn_id
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    pub fn resolve_id(&self) -> ResolveId {
        self.resolve_id
    }

    pub fn with_dial_id(mut self, id: DialId) -> Self {
        self.dial_id = id;
        self
    }

    pub fn with_conn_id(mut self, id: ConnId) -> Self {
        self.conn_id = id;
        self
    }

    pub fn with_transaction_id(mut self, id: TransactionId) -> Self {
        self.transaction_id = id;
        self
    }

    pub fn with_resolve_id(mut self, id: ResolveId) -> Self {
        self.resolve_id = id;
        self
    }

    /// Attaches a cancellation token that every suspension point below this call participates
    /// in (§5 "Suspension points"). Passing a child of an existing token lets an outer timeout
    /// cancel everything nested inside it without the inner code needing to know about the
    /// outer scope.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Emits `event` through this context's root handler.
    pub fn emit(&self, event: Event) {
        self.root_or_default().emit(event);
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.root_or_default().elapsed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use netx_model::Close;

    use super::*;

    #[test]
    fn with_root_is_idempotent() {
        let ctx = Context::new();

        let root_a = MeasurementRoot::noop();
        let root_b = MeasurementRoot::noop();

        let ctx = ctx.with_root(root_a.clone());
        let ctx = ctx.with_root(root_b);

        assert!(Arc::ptr_eq(&ctx.root_or_default(), &root_a));
    }

    #[test]
    fn root_or_default_never_panics_without_a_root() {
        let ctx = Context::new();

        // Just needs to not panic; the handler is a no-op.
        ctx.emit(Event::Close(netx_model::Close {
            common: netx_model::Common::new(std::time::Duration::ZERO),
            error: None,
        }));
    }

    #[test]
    fn emit_reaches_the_attached_handler() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();

        let root = MeasurementRoot::new(move |_event: Event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        let ctx = Context::new().with_root(root);

        ctx.emit(Event::Close(Close {
            common: netx_model::Common::new(std::time::Duration::ZERO),
            error: None,
        }));

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancellation_defaults_to_not_cancelled_and_propagates_when_set() {
        let ctx = Context::new();
        assert!(!ctx.is_cancelled());

        let token = CancellationToken::new();
        let ctx = ctx.with_cancellation(token.clone());
        token.cancel();

        assert!(ctx.is_cancelled());
    }

    #[test]
    fn ids_propagate_through_with_methods() {
        let ctx = Context::new()
            .with_dial_id(DialId::next())
            .with_resolve_id(ResolveId::next());

        assert!(!ctx.dial_id().is_none());
        assert!(!ctx.resolve_id().is_none());
        assert!(ctx.conn_id().is_none());
    }
}
