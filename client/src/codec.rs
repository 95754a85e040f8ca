//! Engine.IO v4 / Socket.IO v5 text packet codec.
//!
//! Only the subset the rate channel uses is understood: the handshake, ping
//! and close at the Engine.IO layer, and connect, disconnect, event and
//! connect-error packets at the Socket.IO layer. Binary attachments are not
//! used by the rate service.

use std::time::Duration;

use ratedesk_rates::{RateSnapshot, RateTable, RawRates, RawTable};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ClientError, ClientResult};

/// Engine.IO pong, sent in reply to every ping.
pub const PONG: &str = "3";

/// Incremental update event name.
pub const RATES_UPDATED: &str = "rates-updated";
/// Full table event name.
pub const RATES_SNAPSHOT: &str = "rates-snapshot";

/// Engine.IO open packet payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong.
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

impl Handshake {
    /// How long the channel may stay silent before it counts as dead.
    pub fn liveness(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }
}

/// Engine.IO layer packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping,
    Pong,
    /// Socket.IO payload.
    Message(String),
    Upgrade,
    Noop,
}

/// Socket.IO layer packet.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect { namespace: String },
    Disconnect { namespace: String },
    Event {
        namespace: String,
        name: String,
        payload: Value,
    },
    ConnectError { namespace: String, message: String },
    /// Acks and binary packets, which the rate channel ignores.
    Other { namespace: String, kind: u8 },
}

impl SocketPacket {
    pub fn namespace(&self) -> &str {
        match self {
            SocketPacket::Connect { namespace }
            | SocketPacket::Disconnect { namespace }
            | SocketPacket::Event { namespace, .. }
            | SocketPacket::ConnectError { namespace, .. }
            | SocketPacket::Other { namespace, .. } => namespace,
        }
    }
}

/// Rate event carried on the push channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// Some sources of one pair changed.
    RatesUpdated { pair: String, rates: RateSnapshot },
    /// The whole table.
    RatesSnapshot(RateTable),
    /// Any other event name.
    Unknown(String),
}

#[derive(Deserialize)]
struct RatesUpdatedPayload {
    pair: String,
    #[serde(default)]
    rates: RawRates,
}

fn protocol(message: impl Into<String>) -> ClientError {
    ClientError::Protocol(message.into())
}

/// Decode one Engine.IO text frame.
pub fn decode_engine(frame: &str) -> ClientResult<EnginePacket> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or_else(|| protocol("empty frame"))?;
    let body = chars.as_str();

    match kind {
        '0' => Ok(EnginePacket::Open(serde_json::from_str(body)?)),
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping),
        '3' => Ok(EnginePacket::Pong),
        '4' => Ok(EnginePacket::Message(body.to_string())),
        '5' => Ok(EnginePacket::Upgrade),
        '6' => Ok(EnginePacket::Noop),
        other => Err(protocol(format!("unknown engine packet type {other:?}"))),
    }
}

/// Decode the Socket.IO payload of an Engine.IO message.
pub fn decode_socket(body: &str) -> ClientResult<SocketPacket> {
    let kind = body
        .bytes()
        .next()
        .filter(u8::is_ascii_digit)
        .ok_or_else(|| protocol(format!("bad socket packet {body:?}")))?
        - b'0';
    let mut rest = &body[1..];

    // Binary packets carry an attachment count before the namespace.
    if matches!(kind, 5 | 6) {
        if let Some(dash) = rest.find('-') {
            rest = &rest[dash + 1..];
        }
    }

    let namespace = if rest.starts_with('/') {
        let end = rest.find(',').unwrap_or(rest.len());
        let namespace = &rest[..end];
        rest = rest.get(end + 1..).unwrap_or("");
        namespace.to_string()
    } else {
        "/".to_string()
    };

    // Optional ack id.
    let data = rest.trim_start_matches(|c: char| c.is_ascii_digit());

    match kind {
        0 => Ok(SocketPacket::Connect { namespace }),
        1 => Ok(SocketPacket::Disconnect { namespace }),
        2 => {
            let args: Vec<Value> = serde_json::from_str(data)?;
            let mut args = args.into_iter();
            let name = match args.next() {
                Some(Value::String(name)) => name,
                other => return Err(protocol(format!("event without a name: {other:?}"))),
            };
            Ok(SocketPacket::Event {
                namespace,
                name,
                payload: args.next().unwrap_or(Value::Null),
            })
        }
        4 => {
            let message = serde_json::from_str::<Value>(data)
                .ok()
                .and_then(|value| match value {
                    Value::String(message) => Some(message),
                    Value::Object(map) => map
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    _ => None,
                })
                .unwrap_or_else(|| data.to_string());
            Ok(SocketPacket::ConnectError { namespace, message })
        }
        kind => Ok(SocketPacket::Other { namespace, kind }),
    }
}

/// Interpret a Socket.IO event as a rate event.
pub fn decode_event(name: &str, payload: Value) -> ClientResult<PushEvent> {
    match name {
        RATES_UPDATED => {
            let update: RatesUpdatedPayload = serde_json::from_value(payload)?;
            Ok(PushEvent::RatesUpdated {
                rates: RateSnapshot::from_raw(&update.rates),
                pair: update.pair,
            })
        }
        RATES_SNAPSHOT => {
            let table: RawTable = serde_json::from_value(payload)?;
            Ok(PushEvent::RatesSnapshot(RateTable::from_raw(&table)))
        }
        other => Ok(PushEvent::Unknown(other.to_string())),
    }
}

/// Namespace connect packet, wrapped as an Engine.IO message.
pub fn encode_connect(namespace: &str) -> String {
    if namespace == "/" {
        "40".to_string()
    } else {
        format!("40{namespace},")
    }
}

/// Namespace disconnect packet, wrapped as an Engine.IO message.
pub fn encode_disconnect(namespace: &str) -> String {
    if namespace == "/" {
        "41".to_string()
    } else {
        format!("41{namespace},")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decode_handshake() {
        let frame = r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;
        let EnginePacket::Open(handshake) = decode_engine(frame).unwrap() else {
            panic!("expected open packet");
        };
        assert_eq!(handshake.ping_interval, 25000);
        assert_eq!(handshake.ping_timeout, 20000);
        assert_eq!(handshake.liveness(), Duration::from_secs(45));
    }

    #[test]
    fn test_liveness_saturates_on_huge_intervals() {
        let frame = format!(
            r#"0{{"sid":"x","pingInterval":{},"pingTimeout":{}}}"#,
            u64::MAX,
            u64::MAX
        );
        let EnginePacket::Open(handshake) = decode_engine(&frame).unwrap() else {
            panic!("expected open packet");
        };
        assert_eq!(handshake.liveness(), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_decode_engine_control_packets() {
        assert_eq!(decode_engine("2").unwrap(), EnginePacket::Ping);
        assert_eq!(decode_engine("1").unwrap(), EnginePacket::Close);
        assert_eq!(
            decode_engine("40/exchange-rates,").unwrap(),
            EnginePacket::Message("0/exchange-rates,".into())
        );
        assert!(decode_engine("").is_err());
        assert!(decode_engine("9").is_err());
    }

    #[test]
    fn test_decode_namespaced_event() {
        let packet = decode_socket(
            r#"2/exchange-rates,["rates-updated",{"pair":"RUB/USD","rates":{"CBR":91.5}}]"#,
        )
        .unwrap();

        let SocketPacket::Event {
            namespace,
            name,
            payload,
        } = packet
        else {
            panic!("expected event");
        };
        assert_eq!(namespace, "/exchange-rates");
        assert_eq!(name, RATES_UPDATED);

        let PushEvent::RatesUpdated { pair, rates } = decode_event(&name, payload).unwrap() else {
            panic!("expected rates update");
        };
        assert_eq!(pair, "RUB/USD");
        assert_eq!(rates.get("CBR"), Some(dec!(91.5)));
    }

    #[test]
    fn test_decode_event_with_ack_id_and_default_namespace() {
        let packet = decode_socket(r#"212["rates-snapshot",{"RUB/USD":{"CBR":90}}]"#).unwrap();
        assert_eq!(packet.namespace(), "/");

        let SocketPacket::Event { name, payload, .. } = packet else {
            panic!("expected event");
        };
        let PushEvent::RatesSnapshot(table) = decode_event(&name, payload).unwrap() else {
            panic!("expected snapshot");
        };
        assert_eq!(table.get("RUB/USD").and_then(|s| s.get("CBR")), Some(dec!(90)));
    }

    #[test]
    fn test_decode_connect_and_errors() {
        assert_eq!(
            decode_socket(r#"0/exchange-rates,{"sid":"abc"}"#).unwrap(),
            SocketPacket::Connect {
                namespace: "/exchange-rates".into()
            }
        );
        assert_eq!(
            decode_socket(r#"4/exchange-rates,{"message":"Invalid namespace"}"#).unwrap(),
            SocketPacket::ConnectError {
                namespace: "/exchange-rates".into(),
                message: "Invalid namespace".into()
            }
        );
        assert!(decode_socket("x").is_err());
        assert!(decode_socket(r#"2/exchange-rates,[42]"#).is_err());
    }

    #[test]
    fn test_unknown_event_is_not_an_error() {
        assert_eq!(
            decode_event("heartbeat", Value::Null).unwrap(),
            PushEvent::Unknown("heartbeat".into())
        );
    }

    #[test]
    fn test_encode_namespace_packets() {
        assert_eq!(encode_connect("/exchange-rates"), "40/exchange-rates,");
        assert_eq!(encode_connect("/"), "40");
        assert_eq!(encode_disconnect("/exchange-rates"), "41/exchange-rates,");
    }
}
