use std::io;

use anyhow::ErrorExt as _;

use crate::error::Failure;

/// A marker error, downcastable via [`anyhow::ErrorExt::any_is`], that the resolver wrapper
/// attaches to signal "the lookup succeeded but every returned address is a bogon" (§4.10).
#[derive(Debug, thiserror::Error)]
#[error("resolved addresses are all bogons")]
pub struct BogonSentinel;

/// A marker error for "no such host", distinguishing NXDOMAIN from other resolver failures
/// before the generic suffix-match classification below ever runs (§4.10).
#[derive(Debug, thiserror::Error)]
#[error("no such host")]
pub struct NxdomainSentinel;

/// Classifies an internal [`anyhow::Error`] into the closed [`Failure`] set, in the priority
/// order mandated by §7:
///
/// 1. already an [`ErrorWrapper`](crate::ErrorWrapper) — the caller is expected to check this
///    itself and pass the inner error through unchanged; `classify` is never called on one.
/// 2. [`BogonSentinel`] → [`Failure::DnsBogonError`]
/// 3. TLS hostname mismatch (by message) → [`Failure::SslInvalidHostname`]
/// 4. TLS unknown CA (by message) → [`Failure::SslUnknownAuthority`]
/// 5. TLS certificate otherwise invalid (by message) → [`Failure::SslInvalidCertificate`]
/// 6. suffix match on the remaining tokens (connection refused/reset, EOF, timeout, NXDOMAIN)
/// 7. fallback → [`Failure::Unknown`]
pub fn classify(error: &anyhow::Error) -> Failure {
    if error.any_is::<BogonSentinel>() {
        return Failure::DnsBogonError;
    }

    if error.any_is::<NxdomainSentinel>() {
        return Failure::DnsNxdomainError;
    }

    let message = format!("{error:#}").to_lowercase();

    if message.contains("not valid for name")
        || message.contains("certificatenotvalidforname")
        || message.contains("hostname mismatch")
        || message.contains("invalidserverequalityname")
    {
        return Failure::SslInvalidHostname;
    }

    if message.contains("unknownissuer")
        || message.contains("unknown issuer")
        || message.contains("self-signed")
        || message.contains("self signed")
        || message.contains("unknown_ca")
    {
        return Failure::SslUnknownAuthority;
    }

    if message.contains("invalidcertificate")
        || message.contains("certificate")
            && (message.contains("expired") || message.contains("invalid") || message.contains("bad"))
    {
        return Failure::SslInvalidCertificate;
    }

    if let Some(io_error) = error.any_downcast_ref::<io::Error>() {
        if let Some(failure) = classify_io_error_kind(io_error.kind()) {
            return failure;
        }
    }

    if message.contains("no such host")
        || message.contains("nxdomain")
        || message.contains("name does not resolve")
        || message.contains("notfound")
    {
        return Failure::DnsNxdomainError;
    }

    if message.contains("timed out") || message.contains("timeout") || message.contains("deadline") {
        return Failure::GenericTimeoutError;
    }

    if message.contains("connection refused") {
        return Failure::ConnectionRefused;
    }

    if message.contains("connection reset") || message.contains("reset by peer") {
        return Failure::ConnectionReset;
    }

    if message.contains("eof") || message.contains("unexpected end of file") {
        return Failure::EofError;
    }

    Failure::Unknown(format!("{error:#}"))
}

fn classify_io_error_kind(kind: io::ErrorKind) -> Option<Failure> {
    match kind {
        io::ErrorKind::ConnectionRefused => Some(Failure::ConnectionRefused),
        io::ErrorKind::ConnectionReset => Some(Failure::ConnectionReset),
        io::ErrorKind::TimedOut => Some(Failure::GenericTimeoutError),
        io::ErrorKind::UnexpectedEof => Some(Failure::EofError),
        _ => None,
    }
}
