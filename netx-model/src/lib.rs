//! The data model shared by every layer of the measurement stack (C1; §3, §6, §7).
//!
//! This crate has no I/O and no async runtime dependency: it is pure data plus the (de)
//! serialization and classification logic that turns platform errors into the closed
//! [`Failure`] set.

pub mod bogon;
pub mod classify;
mod error;
mod event;
mod ids;

pub use bogon::is_bogon;
pub use classify::{classify, BogonSentinel, NxdomainSentinel};
pub use error::{ErrorWrapper, Failure};
pub use event::{
    Close, Common, Connect, DnsQuery, DnsReply, Event, Extension, ExtensionSeverity,
    HttpConnectionReady, HttpRequestDone, HttpRequestHeader, HttpRequestHeadersDone,
    HttpResponseBodyPart, HttpResponseDone, HttpResponseStart, HttpRoundTripDone,
    HttpRoundTripStart, Read, ResolveDone, ResolveStart, TlsHandshakeDone, TlsHandshakeStart,
    Write,
};
pub use ids::{ConnId, DialId, ResolveId, TransactionId};
