use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use netx_context::EventHandler;
use netx_model::Event;

/// The deadline a [`ChannelHandler`] waits before giving up on a send (§4.3, §5).
const SEND_DEADLINE: Duration = Duration::from_millis(100);

/// The receiving half of a [`ChannelHandler`], handed back by [`ChannelHandler::new`] so a
/// "porcelain" caller can drain events while (or after) the measured operation runs.
pub type RecvHandler = flume::Receiver<Event>;

/// An [`EventHandler`] that forwards events into a bounded channel using a non-blocking send
/// with a short deadline, so a caller that stops draining the channel (e.g. a "porcelain"
/// helper that returned already) can never deadlock an in-flight dial (§4.3):
///
/// > close events can arrive after the porcelain function has returned
///
/// Overflow — sends that time out because the channel is full and nobody is receiving — is
/// counted via [`ChannelHandler::overflow_count`] but never surfaces inline, per §5.
#[derive(Clone)]
pub struct ChannelHandler {
    sender: flume::Sender<Event>,
    overflow: std::sync::Arc<AtomicU64>,
}

impl ChannelHandler {
    /// Creates a handler/receiver pair backed by a channel of the given capacity.
    pub fn new(capacity: usize) -> (Self, RecvHandler) {
        let (sender, receiver) = flume::bounded(capacity);

        (
            Self {
                sender,
                overflow: std::sync::Arc::new(AtomicU64::new(0)),
            },
            receiver,
        )
    }

    /// Number of events dropped so far because the send deadline elapsed.
    pub fn overflow_count(&self) -> u64 {
        self.overflow.load(Ordering::Relaxed)
    }
}

impl EventHandler for ChannelHandler {
    fn handle(&self, event: Event) {
        match self.sender.send_timeout(event, SEND_DEADLINE) {
            Ok(()) => {}
            Err(flume::SendTimeoutError::Timeout(_) | flume::SendTimeoutError::Disconnected(_)) => {
                self.overflow.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use netx_model::{Close, Common};

    use super::*;

    #[test]
    fn delivers_events_to_the_receiver() {
        let (handler, rx) = ChannelHandler::new(4);

        handler.handle(Event::Close(Close {
            common: Common::new(Duration::ZERO),
            error: None,
        }));

        let received = rx.recv_timeout(Duration::from_millis(50)).unwrap();
        assert!(matches!(received, Event::Close(_)));
        assert_eq!(handler.overflow_count(), 0);
    }

    #[test]
    fn counts_overflow_instead_of_blocking_or_panicking() {
        let (handler, _rx) = ChannelHandler::new(1);

        // Fill the one slot, then force a send that cannot possibly be drained in time.
        handler.handle(Event::Close(Close {
            common: Common::new(Duration::ZERO),
            error: None,
        }));
        handler.handle(Event::Close(Close {
            common: Common::new(Duration::ZERO),
            error: None,
        }));

        assert_eq!(handler.overflow_count(), 1);
    }

    #[test]
    fn handle_never_blocks_after_the_receiver_is_dropped() {
        let (handler, rx) = ChannelHandler::new(1);
        drop(rx);

        let start = std::time::Instant::now();
        handler.handle(Event::Close(Close {
            common: Common::new(Duration::ZERO),
            error: None,
        }));
        let elapsed = start.elapsed();

        assert!(elapsed < Duration::from_secs(1));
        assert_eq!(handler.overflow_count(), 1);
    }
}
