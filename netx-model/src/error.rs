use serde::{Deserialize, Serialize};

use crate::ids::{ConnId, DialId, ResolveId, TransactionId};

/// The closed set of failure classifications from §7.
///
/// Every error surfaced across a library boundary is reduced to one of these variants so that
/// consumers can `match` on a stable string instead of an inner error type that may change
/// between platforms or library versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message")]
pub enum Failure {
    ConnectionRefused,
    ConnectionReset,
    DnsBogonError,
    DnsNxdomainError,
    EofError,
    GenericTimeoutError,
    SslInvalidHostname,
    SslUnknownAuthority,
    SslInvalidCertificate,
    /// Carries the original message for anything that didn't match a known classification.
    Unknown(String),
}

impl Failure {
    /// The stable wire name for this failure, as it appears in `failure_string` fields (§3, §7).
    pub fn as_str(&self) -> &str {
        match self {
            Failure::ConnectionRefused => "connection_refused",
            Failure::ConnectionReset => "connection_reset",
            Failure::DnsBogonError => "dns_bogon_error",
            Failure::DnsNxdomainError => "dns_nxdomain_error",
            Failure::EofError => "eof_error",
            Failure::GenericTimeoutError => "generic_timeout_error",
            Failure::SslInvalidHostname => "ssl_invalid_hostname",
            Failure::SslUnknownAuthority => "ssl_unknown_authority",
            Failure::SslInvalidCertificate => "ssl_invalid_certificate",
            Failure::Unknown(_) => "unknown_failure",
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Unknown(message) => write!(f, "unknown_failure: {message}"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// Wraps every error this library surfaces to a caller, pairing the closed [`Failure`]
/// classification with whichever correlation ids were in scope when the failure occurred (§3).
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{failure}")]
pub struct ErrorWrapper {
    pub conn_id: ConnId,
    pub dial_id: DialId,
    pub transaction_id: TransactionId,
    pub resolve_id: ResolveId,
    pub failure: Failure,
}

impl ErrorWrapper {
    pub fn new(failure: Failure) -> Self {
        Self {
            conn_id: ConnId::NONE,
            dial_id: DialId::NONE,
            transaction_id: TransactionId::NONE,
            resolve_id: ResolveId::NONE,
            failure,
        }
    }

    pub fn with_conn_id(mut self, id: ConnId) -> Self {
        self.conn_id = id;
        self
    }

    pub fn with_dial_id(mut self, id: DialId) -> Self {
        self.dial_id = id;
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_strings_match_closed_set() {
        let cases = [
            (Failure::ConnectionRefused, "connection_refused"),
            (Failure::ConnectionReset, "connection_reset"),
            (Failure::DnsBogonError, "dns_bogon_error"),
            (Failure::DnsNxdomainError, "dns_nxdomain_error"),
            (Failure::EofError, "eof_error"),
            (Failure::GenericTimeoutError, "generic_timeout_error"),
            (Failure::SslInvalidHostname, "ssl_invalid_hostname"),
            (Failure::SslUnknownAuthority, "ssl_unknown_authority"),
            (Failure::SslInvalidCertificate, "ssl_invalid_certificate"),
        ];

        for (failure, expected) in cases {
            assert_eq!(failure.as_str(), expected);
        }
    }

    #[test]
    fn unknown_failure_carries_message() {
        let failure = Failure::Unknown("weird platform error".to_owned());

        assert_eq!(failure.to_string(), "unknown_failure: weird platform error");
    }
}
