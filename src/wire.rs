//! JSON control-plane wire messages and the closed destruction-reason set.
//!
//! Binary fields (sealed frames, rekey payloads) are carried as base64
//! strings so the whole control plane is transportable as UTF-8 text; the
//! relay only ever sees `type`-tagged JSON objects and never the keys or
//! plaintext behind them.

use base64::Engine;
use serde::{Deserialize, Serialize};

const ENGINE: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// Base64-encode a binary field for the wire.
pub fn encode_binary(bytes: &[u8]) -> String {
    ENGINE.encode(bytes)
}

/// Decode a base64 wire field.
pub fn decode_binary(s: &str) -> Result<Vec<u8>, crate::core::error::WireError> {
    ENGINE
        .decode(s)
        .map_err(|e| crate::core::error::WireError::InvalidBase64(e.to_string()))
}

/// Client -> host messages, carried inside the relay's opaque envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Initial invite-token presentation, if the deployment uses one.
    #[serde(rename = "AUTH")]
    Auth {
        /// Invite token, opaque to the core.
        token: String,
    },
    /// Request to join the room.
    #[serde(rename = "JOIN_REQUEST")]
    JoinRequest {
        /// The client's ephemeral X25519 public key, base64.
        client_public_key: String,
        /// Optional display name.
        #[serde(skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
    },
    /// Confirmation MAC completing the join handshake.
    #[serde(rename = "JOIN_CONFIRM")]
    JoinConfirm {
        /// HMAC-SHA256 tag, base64.
        mac: String,
    },
    /// An opaque sealed application frame.
    #[serde(rename = "MESSAGE")]
    Message {
        /// Base64 frame bytes.
        payload: String,
    },
    /// Acknowledgement of a per-client rekey round.
    #[serde(rename = "REKEY_CONFIRM")]
    RekeyConfirm {
        /// The epoch being confirmed.
        epoch: u32,
        /// This client's freshly rotated ephemeral public key, base64.
        new_client_eph_pub: String,
        /// The nonce echoed back from the `REKEY_DIRECT` payload.
        confirm_nonce: String,
        /// HMAC-SHA256 tag, base64.
        mac: String,
    },
}

/// Host -> clients messages, carried via the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HostMessage {
    /// The room has been created.
    #[serde(rename = "ROOM_CREATED")]
    RoomCreated {
        /// The room's rendered id.
        room_id: String,
    },
    /// The room is open for joins.
    #[serde(rename = "ROOM_OPEN")]
    RoomOpen {
        /// The host's static/ephemeral public key, base64.
        host_public_key: String,
    },
    /// A join has been approved.
    #[serde(rename = "JOIN_APPROVED")]
    JoinApproved {
        /// The relay client id this approval targets.
        client_id: String,
        /// The approval payload.
        approval: JoinApproval,
    },
    /// A join has been rejected.
    #[serde(rename = "JOIN_REJECTED")]
    JoinRejected {
        /// The relay client id this rejection targets.
        client_id: String,
        /// Human-readable reason.
        reason: String,
    },
    /// A broadcast application frame.
    #[serde(rename = "BROADCAST")]
    Broadcast {
        /// Base64 frame bytes.
        payload: String,
    },
    /// A unicast double-wrapped rekey payload.
    #[serde(rename = "REKEY_DIRECT")]
    RekeyDirect {
        /// The relay client id this rekey targets.
        client_id: String,
        /// Base64 outer-sealed payload bytes.
        encrypted_payload: String,
    },
    /// A participant is being removed.
    #[serde(rename = "KICK")]
    Kick {
        /// The relay client id being kicked.
        client_id: String,
    },
    /// The room is closing.
    #[serde(rename = "ROOM_CLOSE")]
    RoomClose,
}

/// The approval payload inside [`HostMessage::JoinApproved`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinApproval {
    /// The host's ephemeral public key, base64.
    pub host_public_key: String,
    /// The master key, wrapped under the pairwise session key, base64.
    pub wrapped_master: String,
    /// The epoch the wrapped master key belongs to.
    pub epoch: u32,
    /// The participant id minted for the new member.
    pub participant_id: String,
}

/// Relay -> endpoint control messages. The relay never originates anything
/// carrying key material or plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RelayMessage {
    /// A new relay client connected.
    #[serde(rename = "CONNECTED")]
    Connected {
        /// The opaque relay-assigned client id.
        client_id: String,
    },
    /// A relay client disconnected.
    #[serde(rename = "CLIENT_LEFT")]
    ClientLeft {
        /// The opaque relay-assigned client id.
        client_id: String,
    },
    /// The room was destroyed.
    #[serde(rename = "ROOM_DESTROYED")]
    RoomDestroyed {
        /// The destruction reason, as its wire string.
        reason: String,
    },
    /// This endpoint was kicked.
    #[serde(rename = "KICKED")]
    Kicked {
        /// Human-readable reason.
        reason: String,
    },
    /// Heartbeat acknowledgement.
    #[serde(rename = "HEARTBEAT_ACK")]
    HeartbeatAck,
    /// A relay-originated error.
    #[serde(rename = "ERROR")]
    Error {
        /// Error message text.
        message: String,
    },
}

/// The closed set of reasons a session may be destroyed for.
///
/// Each variant has a fixed wire string, a fixed user-facing message, and a
/// `recoverable` flag (the user may retry joining/connecting).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestructionReason {
    /// The host disconnected from the relay.
    HostDisconnected,
    /// The host closed the room deliberately.
    HostClosed,
    /// No heartbeat was received within the configured timeout.
    HeartbeatTimeout,
    /// The relay reported a server-side error.
    ServerError,
    /// The local user exited the room.
    UserExit,
    /// The app was backgrounded under a policy that closes rooms.
    Backgrounded,
    /// The device was locked under a policy that closes rooms.
    DeviceLocked,
    /// This endpoint was kicked by the host.
    Kicked,
    /// This endpoint's join request was rejected.
    JoinRejected,
    /// A transport-level error occurred (disconnect, bootstrap stall).
    NetworkError,
    /// A configured buffer or session-count bound was exceeded.
    CapacityExceeded,
    /// Too many consecutive AEAD decryption failures.
    CryptoFailure,
    /// Sustained critical host memory pressure.
    MemoryPressure,
}

impl DestructionReason {
    /// The string sent on the wire in `ROOM_DESTROYED`.
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            Self::HostDisconnected => "host_disconnected",
            Self::HostClosed => "host_closed",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::ServerError => "server_error",
            Self::UserExit => "user_exit",
            Self::Backgrounded => "backgrounded",
            Self::DeviceLocked => "device_locked",
            Self::Kicked => "kicked",
            Self::JoinRejected => "join_rejected",
            Self::NetworkError => "network_error",
            Self::CapacityExceeded => "capacity_exceeded",
            Self::CryptoFailure => "crypto_failure",
            Self::MemoryPressure => "memory_pressure",
        }
    }

    /// A fixed, user-facing message for this reason.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::HostDisconnected => "The host disconnected.",
            Self::HostClosed => "The host closed the room.",
            Self::HeartbeatTimeout => "Connection to the room timed out.",
            Self::ServerError => "The relay reported an error.",
            Self::UserExit => "You left the room.",
            Self::Backgrounded => "The room was closed because the app was backgrounded.",
            Self::DeviceLocked => "The room was closed because the device was locked.",
            Self::Kicked => "You were removed from the room.",
            Self::JoinRejected => "Your request to join was rejected.",
            Self::NetworkError => "A network error occurred.",
            Self::CapacityExceeded => "The room reached its capacity limit.",
            Self::CryptoFailure => "A cryptographic error closed the room.",
            Self::MemoryPressure => "The room was closed to free up memory.",
        }
    }

    /// Whether the user may reasonably retry after this destruction.
    pub fn recoverable(&self) -> bool {
        matches!(
            self,
            Self::HostDisconnected
                | Self::HeartbeatTimeout
                | Self::ServerError
                | Self::NetworkError
        )
    }

    /// Parse a wire string back into a reason, if recognized.
    pub fn from_wire_str(s: &str) -> Option<Self> {
        Some(match s {
            "host_disconnected" => Self::HostDisconnected,
            "host_closed" => Self::HostClosed,
            "heartbeat_timeout" => Self::HeartbeatTimeout,
            "server_error" => Self::ServerError,
            "user_exit" => Self::UserExit,
            "backgrounded" => Self::Backgrounded,
            "device_locked" => Self::DeviceLocked,
            "kicked" => Self::Kicked,
            "join_rejected" => Self::JoinRejected,
            "network_error" => Self::NetworkError,
            "capacity_exceeded" => Self::CapacityExceeded,
            "crypto_failure" => Self::CryptoFailure,
            "memory_pressure" => Self::MemoryPressure,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_round_trips_through_json() {
        let msg = ClientMessage::JoinRequest {
            client_public_key: encode_binary(&[1, 2, 3]),
            display_name: Some("alice".into()),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"JOIN_REQUEST\""));
        let parsed: ClientMessage = serde_json::from_str(&json).unwrap();
        match parsed {
            ClientMessage::JoinRequest { display_name, .. } => {
                assert_eq!(display_name.as_deref(), Some("alice"));
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn destruction_reason_wire_round_trip() {
        for reason in [
            DestructionReason::HostDisconnected,
            DestructionReason::CryptoFailure,
            DestructionReason::MemoryPressure,
        ] {
            let wire = reason.as_wire_str();
            assert_eq!(DestructionReason::from_wire_str(wire), Some(reason));
        }
    }

    #[test]
    fn recoverable_flags_match_spec() {
        assert!(DestructionReason::NetworkError.recoverable());
        assert!(!DestructionReason::Kicked.recoverable());
        assert!(!DestructionReason::CapacityExceeded.recoverable());
    }

    #[test]
    fn unknown_wire_string_is_none() {
        assert!(DestructionReason::from_wire_str("not_a_reason").is_none());
    }
}
