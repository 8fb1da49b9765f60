//! Built-in [`EventHandler`](netx_context::EventHandler) implementations (§4.3).

mod channel;
mod stdout;

pub use channel::{ChannelHandler, RecvHandler};
pub use stdout::StdoutJsonHandler;

use netx_context::EventHandler;
use netx_model::Event;

/// Discards every event. The default handler for a [`Context`](netx_context::Context) that
/// never had a root attached (via
/// [`Context::root_or_default`](netx_context::Context::root_or_default)).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl EventHandler for NoopHandler {
    fn handle(&self, _event: Event) {}
}
