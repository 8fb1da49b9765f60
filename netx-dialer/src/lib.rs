//! Dialing: plain TCP (C5; §4.5), hostname resolution in front of it (C6; §4.6), and TLS on top
//! of that (C7; §4.7).
//!
//! Each layer wraps the one below it and is independently usable — a caller that already has an
//! IP address only needs [`BaseDialer`]; a plain-TCP client needs [`DnsDialer`]; an HTTPS client
//! needs [`TlsDialer`].

mod base;
mod config;
mod dns;
mod tls;

pub use base::BaseDialer;
pub use config::DialerConfig;
pub use dns::DnsDialer;
pub use tls::TlsDialer;
