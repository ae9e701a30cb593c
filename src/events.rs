//! Typed gateway events.
//!
//! The gateway deserialises dispatch payloads into [`GatewayEvent`] so the
//! bot loop can pattern-match on typed data instead of raw JSON.

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::types::*;

/// A parsed event coming off the Discord gateway.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// Identify succeeded; carries our user and application ids.
    Ready(ReadyEvent),

    /// Sent after a successful RESUME.
    Resumed,

    /// A slash command or button press.
    InteractionCreate(Interaction),

    /// Heartbeat ACK from the gateway (op 11).
    HeartbeatAck,

    /// The gateway is asking us to heartbeat immediately (op 1).
    HeartbeatRequest,

    /// Gateway told us to reconnect (op 7).
    Reconnect,

    /// Session has been invalidated (op 9). `true` if it can be resumed.
    InvalidSession(bool),

    /// Anything without a typed variant.
    Unknown {
        event_name: Option<String>,
        op: u8,
    },
}

impl GatewayEvent {
    /// Convert a raw [`GatewayPayload`]. Never fails; unrecognised or
    /// malformed events become [`GatewayEvent::Unknown`].
    pub fn from_payload(payload: GatewayPayload) -> Self {
        match payload.op {
            0 => Self::parse_dispatch(payload.t, payload.d),
            1 => GatewayEvent::HeartbeatRequest,
            7 => GatewayEvent::Reconnect,
            9 => GatewayEvent::InvalidSession(
                payload.d.as_ref().and_then(|v| v.as_bool()).unwrap_or(false),
            ),
            11 => GatewayEvent::HeartbeatAck,
            op => GatewayEvent::Unknown {
                event_name: payload.t,
                op,
            },
        }
    }

    fn parse_dispatch(event_name: Option<String>, data: Option<serde_json::Value>) -> Self {
        let unknown = |event_name: Option<String>| GatewayEvent::Unknown { event_name, op: 0 };
        let (Some(name), Some(d)) = (event_name.clone(), data) else {
            return unknown(event_name);
        };

        match name.as_str() {
            "READY" => typed(&name, d).map_or_else(|| unknown(Some(name.clone())), GatewayEvent::Ready),
            "RESUMED" => GatewayEvent::Resumed,
            "INTERACTION_CREATE" => typed(&name, d)
                .map_or_else(|| unknown(Some(name.clone())), GatewayEvent::InteractionCreate),
            _ => unknown(Some(name)),
        }
    }
}

fn typed<T: DeserializeOwned>(name: &str, data: serde_json::Value) -> Option<T> {
    serde_json::from_value(data)
        .map_err(|e| warn!(event = name, error = %e, "failed to parse dispatch payload"))
        .ok()
}
