/// Per-tracer knobs (§10.4).
#[derive(Debug, Clone, Copy)]
pub struct HttpTracerConfig {
    /// Whether `HTTPResponseBodyPart` events carry the actual response bytes.
    ///
    /// Response bodies can carry arbitrary third-party content; capturing them by default would
    /// make every consumer of this crate an unwitting bulk-logger of whatever a probed endpoint
    /// returns. `num_bytes` is always recorded regardless of this flag (§9 open question:
    /// bytes-vs-hash is left to the caller — we resolve it by defaulting to neither and letting
    /// the caller opt in).
    pub capture_response_body: bool,
}

impl Default for HttpTracerConfig {
    fn default() -> Self {
        Self {
            capture_response_body: false,
        }
    }
}

impl HttpTracerConfig {
    pub fn with_capture_response_body(mut self, capture: bool) -> Self {
        self.capture_response_body = capture;
        self
    }
}
