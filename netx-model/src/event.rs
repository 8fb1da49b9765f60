use std::{net::IpAddr, time::Duration};

use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as, DurationNanoSeconds};

use crate::{
    error::ErrorWrapper,
    ids::{ConnId, DialId, ResolveId, TransactionId},
};

/// Fields shared by every [`Event`] variant (§3): the monotonic timestamp since the
/// [`MeasurementRoot`](../netx_context/struct.MeasurementRoot.html)'s zero-time, and the four
/// correlation ids (zero/`NONE` where not applicable).
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Common {
    #[serde_as(as = "DurationNanoSeconds<u64>")]
    pub elapsed: Duration,
    pub dial_id: DialId,
    pub conn_id: ConnId,
    pub transaction_id: TransactionId,
    pub resolve_id: ResolveId,
}

impl Common {
    pub fn new(elapsed: Duration) -> Self {
        Self {
            elapsed,
            ..Default::default()
        }
    }

    pub fn with_dial_id(mut self, id: DialId) -> Self {
        self.dial_id = id;
        self
    }

    pub fn with_conn_id(mut self, id: ConnId) -> Self {
        self.conn_id = id;
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtensionSeverity {
    Info,
    Warning,
    Error,
}

macro_rules! event_struct {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $(pub $field:ident: $ty:ty,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Serialize, Deserialize)]
        pub struct $name {
            #[serde(flatten)]
            pub common: Common,
            $(pub $field: $ty,)*
        }
    };
}

event_struct! {
    /// Emitted immediately before a hostname lookup begins (§3, §4.10).
    pub struct ResolveStart {
        pub hostname: String,
        pub transport_network: String,
        pub transport_address: String,
    }
}

event_struct! {
    /// Emitted immediately after a hostname lookup completes, successfully or not (§3, §4.10).
    pub struct ResolveDone {
        pub hostname: String,
        pub addresses: Vec<IpAddr>,
        pub error: Option<ErrorWrapper>,
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsQuery {
    #[serde(flatten)]
    pub common: Common,
    #[serde_as(as = "Base64")]
    pub raw_bytes: Vec<u8>,
    pub parsed_message: Option<String>,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsReply {
    #[serde(flatten)]
    pub common: Common,
    #[serde_as(as = "Base64")]
    pub raw_bytes: Vec<u8>,
    pub parsed_message: Option<String>,
    pub error: Option<ErrorWrapper>,
}

event_struct! {
    /// Emitted once a TCP/UDP connect attempt towards a concrete IP:port has finished (§4.5).
    pub struct Connect {
        pub network: String,
        pub remote_address: String,
        pub error: Option<ErrorWrapper>,
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Read {
    #[serde(flatten)]
    pub common: Common,
    #[serde_as(as = "DurationNanoSeconds<u64>")]
    pub blocked_duration: Duration,
    pub num_bytes: usize,
    pub error: Option<ErrorWrapper>,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Write {
    #[serde(flatten)]
    pub common: Common,
    #[serde_as(as = "DurationNanoSeconds<u64>")]
    pub blocked_duration: Duration,
    pub num_bytes: usize,
    pub error: Option<ErrorWrapper>,
}

event_struct! {
    /// Emitted exactly once per [`MeasuringSocket`](../netx_socket/struct.MeasuringSocket.html)
    /// (§3 "Lifecycles").
    pub struct Close {
        pub error: Option<ErrorWrapper>,
    }
}

event_struct! {
    /// Emitted before a TLS handshake begins, carrying the requested SNI/ALPN (§4.7).
    pub struct TlsHandshakeStart {
        pub server_name: String,
        pub next_protos: Vec<String>,
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsHandshakeDone {
    #[serde(flatten)]
    pub common: Common,
    #[serde_as(as = "DurationNanoSeconds<u64>")]
    pub blocked_duration: Duration,
    pub server_name: String,
    pub next_protos: Vec<String>,
    pub cipher_suite: Option<String>,
    pub protocol_version: Option<String>,
    pub negotiated_protocol: Option<String>,
    #[serde_as(as = "Vec<Base64>")]
    pub peer_certificates: Vec<Vec<u8>>,
    pub error: Option<ErrorWrapper>,
}

event_struct! {
    /// Emitted when an HTTP round trip is started, i.e. after a [`TransactionId`] was minted
    /// (§4.11 step 2).
    pub struct HttpRoundTripStart {
        pub method: String,
        pub url: String,
    }
}

event_struct! {
    /// Emitted once the HTTP transport has a usable connection, tagging the connection's id
    /// as recovered via [`ConnId::from_local_addr_hash`] (§4.11 step 3, "GotConn").
    pub struct HttpConnectionReady {}
}

event_struct! {
    pub struct HttpRequestHeader {
        pub key: String,
        pub values: Vec<String>,
    }
}

event_struct! {
    pub struct HttpRequestHeadersDone {}
}

event_struct! {
    pub struct HttpRequestDone {
        pub error: Option<ErrorWrapper>,
    }
}

event_struct! {
    pub struct HttpResponseStart {}
}

event_struct! {
    pub struct HttpRoundTripDone {
        pub status_code: u16,
        pub headers: Vec<(String, String)>,
        pub error: Option<ErrorWrapper>,
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpResponseBodyPart {
    #[serde(flatten)]
    pub common: Common,
    /// Whether the raw bytes are included is a handler-level privacy decision (§9 open
    /// question); `None` when the emitting [`HttpTracerConfig`] opted out of it.
    #[serde_as(as = "Option<Base64>")]
    pub data: Option<Vec<u8>>,
    pub num_bytes: usize,
    pub error: Option<ErrorWrapper>,
}

event_struct! {
    pub struct HttpResponseDone {
        pub error: Option<ErrorWrapper>,
    }
}

event_struct! {
    /// A typed escape hatch for data that doesn't fit any other variant (§3).
    pub struct Extension {
        pub key: String,
        pub severity: ExtensionSeverity,
        pub value: serde_json::Value,
    }
}

/// The tagged union of every observable action the measurement core can emit (§3).
///
/// Serializes as a JSON object with exactly one non-null field naming the variant (§6), which
/// is simply `serde`'s default externally-tagged enum representation — no `#[serde(tag = ..)]`
/// needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    ResolveStart(ResolveStart),
    DnsQuery(DnsQuery),
    DnsReply(DnsReply),
    ResolveDone(ResolveDone),
    Connect(Connect),
    Read(Read),
    Write(Write),
    Close(Close),
    TlsHandshakeStart(TlsHandshakeStart),
    TlsHandshakeDone(TlsHandshakeDone),
    HttpRoundTripStart(HttpRoundTripStart),
    HttpConnectionReady(HttpConnectionReady),
    HttpRequestHeader(HttpRequestHeader),
    HttpRequestHeadersDone(HttpRequestHeadersDone),
    HttpRequestDone(HttpRequestDone),
    HttpResponseStart(HttpResponseStart),
    HttpRoundTripDone(HttpRoundTripDone),
    HttpResponseBodyPart(HttpResponseBodyPart),
    HttpResponseDone(HttpResponseDone),
    Extension(Extension),
}

impl Event {
    /// The [`Common`] fields shared by whichever variant this is.
    pub fn common(&self) -> &Common {
        match self {
            Event::ResolveStart(e) => &e.common,
            Event::DnsQuery(e) => &e.common,
            Event::DnsReply(e) => &e.common,
            Event::ResolveDone(e) => &e.common,
            Event::Connect(e) => &e.common,
            Event::Read(e) => &e.common,
            Event::Write(e) => &e.common,
            Event::Close(e) => &e.common,
            Event::TlsHandshakeStart(e) => &e.common,
            Event::TlsHandshakeDone(e) => &e.common,
            Event::HttpRoundTripStart(e) => &e.common,
            Event::HttpConnectionReady(e) => &e.common,
            Event::HttpRequestHeader(e) => &e.common,
            Event::HttpRequestHeadersDone(e) => &e.common,
            Event::HttpRequestDone(e) => &e.common,
            Event::HttpResponseStart(e) => &e.common,
            Event::HttpRoundTripDone(e) => &e.common,
            Event::HttpResponseBodyPart(e) => &e.common,
            Event::HttpResponseDone(e) => &e.common,
            Event::Extension(e) => &e.common,
        }
    }

    /// The variant name, as it appears as the sole JSON key (§6).
    pub fn kind(&self) -> &'static str {
        match self {
            Event::ResolveStart(_) => "ResolveStart",
            Event::DnsQuery(_) => "DNSQuery",
            Event::DnsReply(_) => "DNSReply",
            Event::ResolveDone(_) => "ResolveDone",
            Event::Connect(_) => "Connect",
            Event::Read(_) => "Read",
            Event::Write(_) => "Write",
            Event::Close(_) => "Close",
            Event::TlsHandshakeStart(_) => "TLSHandshakeStart",
            Event::TlsHandshakeDone(_) => "TLSHandshakeDone",
            Event::HttpRoundTripStart(_) => "HTTPRoundTripStart",
            Event::HttpConnectionReady(_) => "HTTPConnectionReady",
            Event::HttpRequestHeader(_) => "HTTPRequestHeader",
            Event::HttpRequestHeadersDone(_) => "HTTPRequestHeadersDone",
            Event::HttpRequestDone(_) => "HTTPRequestDone",
            Event::HttpResponseStart(_) => "HTTPResponseStart",
            Event::HttpRoundTripDone(_) => "HTTPRoundTripDone",
            Event::HttpResponseBodyPart(_) => "HTTPResponseBodyPart",
            Event::HttpResponseDone(_) => "HTTPResponseDone",
            Event::Extension(_) => "Extension",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_lines_round_trip_every_variant() {
        let events = vec![
            Event::ResolveStart(ResolveStart {
                common: Common::new(Duration::from_millis(1)).with_resolve_id(ResolveId::next()),
                hostname: "example.com".to_owned(),
                transport_network: "udp".to_owned(),
                transport_address: "1.1.1.1:53".to_owned(),
            }),
            Event::DnsQuery(DnsQuery {
                common: Common::new(Duration::from_millis(2)),
                raw_bytes: vec![1, 2, 3],
                parsed_message: Some("A? example.com".to_owned()),
            }),
            Event::Connect(Connect {
                common: Common::new(Duration::from_millis(3)).with_conn_id(ConnId::next()),
                network: "tcp".to_owned(),
                remote_address: "1.1.1.1:443".to_owned(),
                error: None,
            }),
            Event::TlsHandshakeDone(TlsHandshakeDone {
                common: Common::new(Duration::from_millis(4)),
                blocked_duration: Duration::from_millis(10),
                server_name: "example.com".to_owned(),
                next_protos: vec!["h2".to_owned()],
                cipher_suite: Some("TLS13_AES_128_GCM_SHA256".to_owned()),
                protocol_version: Some("TLSv1.3".to_owned()),
                negotiated_protocol: Some("h2".to_owned()),
                peer_certificates: vec![vec![0xde, 0xad, 0xbe, 0xef]],
                error: None,
            }),
            Event::HttpResponseBodyPart(HttpResponseBodyPart {
                common: Common::new(Duration::from_millis(5)),
                data: Some(vec![1, 2, 3]),
                num_bytes: 3,
                error: None,
            }),
            Event::Extension(Extension {
                common: Common::new(Duration::from_millis(6)),
                key: "scoreboard.bogon".to_owned(),
                severity: ExtensionSeverity::Warning,
                value: serde_json::json!({"addresses": ["10.10.11.10"]}),
            }),
        ];

        for event in events {
            let line = serde_json::to_string(&event).unwrap();
            let parsed: Event = serde_json::from_str(&line).unwrap();

            assert_eq!(
                serde_json::to_string(&parsed).unwrap(),
                line,
                "round-trip should be the identity for {}",
                event.kind()
            );
        }
    }

    #[test]
    fn wire_form_has_exactly_one_top_level_key() {
        let event = Event::Close(Close {
            common: Common::new(Duration::ZERO).with_conn_id(ConnId::next()),
            error: None,
        });

        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(object.len(), 1);
        assert!(object.contains_key("Close"));
    }

    #[test]
    fn byte_fields_are_base64_on_the_wire() {
        let event = Event::DnsQuery(DnsQuery {
            common: Common::new(Duration::ZERO),
            raw_bytes: vec![0, 1, 2, 255],
            parsed_message: None,
        });

        let value = serde_json::to_value(&event).unwrap();
        let encoded = value["DNSQuery"]["raw_bytes"].as_str().unwrap();

        assert_eq!(encoded, "AAEC/w==");
    }

    #[test]
    fn durations_are_nanoseconds_on_the_wire() {
        let event = Event::Close(Close {
            common: Common::new(Duration::from_millis(5)),
            error: None,
        });

        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["Close"]["elapsed"], 5_000_000);
    }
}
