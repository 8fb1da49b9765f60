use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};

/// Generates a process-wide monotonic correlation id type.
///
/// Every id type reserves `0` to mean "not applicable" (§4.2); the first id handed out by
/// [`next`](macro.id_type) is therefore `1`.
macro_rules! id_type {
    ($name:ident, $counter:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// The sentinel value meaning "not applicable" (§3, §4.2).
            pub const NONE: Self = Self(0);

            /// Allocates the next id from the process-wide counter.
            pub fn next() -> Self {
                static $counter: AtomicU64 = AtomicU64::new(1);

                Self($counter.fetch_add(1, Ordering::Relaxed))
            }

            /// Constructs an id from a raw value.
            ///
            /// Used by [`ConnId::from_local_addr_hash`] and in tests; application code should
            /// otherwise only ever see ids minted by [`next`](Self::next).
            pub const fn from_raw(value: u64) -> Self {
                Self(value)
            }

            pub const fn is_none(self) -> bool {
                self.0 == 0
            }

            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(DialId, DIAL_COUNTER, "Correlates every attempt to reach one (host, port) across redirects or retries.");
id_type!(TransactionId, TRANSACTION_COUNTER, "Correlates every event belonging to a single HTTP round trip.");
id_type!(ResolveId, RESOLVE_COUNTER, "Correlates every event belonging to a single hostname resolution.");

/// Correlates I/O events to a single, concrete connection.
///
/// Unlike the other id types, a [`ConnId`] can *also* be derived deterministically from a
/// `(network, local_address)` pair via [`ConnId::from_local_addr_hash`], so that code which only
/// has a platform-opaque socket handle (e.g. an HTTP/2 library's `GotConn` callback) can
/// rediscover the id that the dialer minted for that same socket (§4.2).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnId(u64);

impl ConnId {
    pub const NONE: Self = Self(0);

    pub fn next() -> Self {
        static CONN_COUNTER: AtomicU64 = AtomicU64::new(1);

        Self(CONN_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// Derives a [`ConnId`] from a `(network, local_address)` pair.
    ///
    /// This never collides with an id handed out by [`next`](Self::next): hashed ids always
    /// have their top bit set, `next`-minted ids never reach that range in practice (2^63
    /// connections), so the two id spaces cannot accidentally alias in a way that would
    /// misattribute events.
    pub fn from_local_addr_hash(network: &str, local_addr: std::net::SocketAddr) -> Self {
        use std::hash::{Hash, Hasher};

        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        network.hash(&mut hasher);
        local_addr.hash(&mut hasher);

        Self(hasher.finish() | (1 << 63))
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_zero() {
        assert!(DialId::NONE.is_none());
        assert_eq!(DialId::NONE.get(), 0);
    }

    #[test]
    fn next_is_monotonic() {
        let a = TransactionId::next();
        let b = TransactionId::next();

        assert!(b.get() > a.get());
    }

    #[test]
    fn local_addr_hash_is_deterministic() {
        let addr = "127.0.0.1:4433".parse().unwrap();

        let a = ConnId::from_local_addr_hash("tcp", addr);
        let b = ConnId::from_local_addr_hash("tcp", addr);

        assert_eq!(a, b);
        assert!(!a.is_none());
    }

    #[test]
    fn local_addr_hash_differs_per_network() {
        let addr = "127.0.0.1:4433".parse().unwrap();

        let a = ConnId::from_local_addr_hash("tcp", addr);
        let b = ConnId::from_local_addr_hash("udp", addr);

        assert_ne!(a, b);
    }
}
