use std::time::Duration;

/// Per-dialer timeout defaults (§5): socket connect defaults to 30s, TLS handshake to 10s.
/// Overridable per-dialer via [`DialerConfig::with_connect_timeout`]/
/// [`DialerConfig::with_handshake_timeout`].
#[derive(Debug, Clone, Copy)]
pub struct DialerConfig {
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl DialerConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_spec_timeout_table() {
        let config = DialerConfig::default();

        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
    }
}
