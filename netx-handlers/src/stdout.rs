use netx_context::EventHandler;
use netx_model::Event;

/// Prints one JSON object per line to stdout (§6 "Event serialization").
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutJsonHandler;

impl EventHandler for StdoutJsonHandler {
    fn handle(&self, event: Event) {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(error) => tracing::warn!(%error, "Failed to serialize event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use netx_model::{Close, Common};

    use super::*;

    #[test]
    fn handle_does_not_panic_on_a_well_formed_event() {
        let handler = StdoutJsonHandler;

        handler.handle(Event::Close(Close {
            common: Common::new(Duration::ZERO),
            error: None,
        }));
    }
}
