//! Room participants and the host's pending-confirmation bookkeeping.

use std::time::Instant;

use uuid::Uuid;

use crate::core::constants::X25519_KEY_SIZE;

/// A participant's identity, a 128-bit id minted by the host at approval
/// time and echoed as the `senderId` field of every frame the participant
/// originates.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ParticipantId(Uuid);

impl ParticipantId {
    /// Mint a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// The raw 16 bytes as embedded in a wire frame.
    pub fn as_bytes(&self) -> [u8; 16] {
        *self.0.as_bytes()
    }

    /// Reconstruct from the 16 bytes embedded in a wire frame.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A member of the room, as tracked by the host.
#[derive(Clone, Debug)]
pub struct Participant {
    /// The participant's identity.
    pub id: ParticipantId,
    /// The opaque relay-assigned id used to route unicast frames.
    pub relay_client_id: String,
    /// The participant's current ephemeral X25519 public key.
    pub public_key: [u8; X25519_KEY_SIZE],
    /// Optional display name supplied at join time.
    pub display_name: Option<String>,
    /// When the participant was approved.
    pub joined_at: Instant,
}

impl Participant {
    /// Construct a newly-approved participant record.
    pub fn new(
        id: ParticipantId,
        relay_client_id: String,
        public_key: [u8; X25519_KEY_SIZE],
        display_name: Option<String>,
    ) -> Self {
        Self {
            id,
            relay_client_id,
            public_key,
            display_name,
            joined_at: Instant::now(),
        }
    }
}

/// A join in progress: a `JOIN_REQUEST` the host has not yet approved or
/// rejected. Keyed by `relay_client_id`; a duplicate request for the same
/// relay client replaces any prior pending entry.
#[derive(Clone, Debug)]
pub struct PendingJoin {
    /// The client's ephemeral public key from `JOIN_REQUEST`.
    pub client_public_key: [u8; X25519_KEY_SIZE],
    /// Optional display name from `JOIN_REQUEST`.
    pub display_name: Option<String>,
    /// The participant id the host minted for this pending join.
    pub participant_id: ParticipantId,
}

/// A rekey confirmation the host is waiting on from one participant.
#[derive(Clone, Debug)]
pub struct PendingRekeyConfirm {
    /// The epoch this rekey is transitioning to.
    pub epoch: u32,
    /// The nonce that must be echoed back in the confirmation MAC.
    pub confirm_nonce: [u8; 16],
    /// The host's ephemeral public key used for this rekey round.
    pub host_eph_pub: [u8; X25519_KEY_SIZE],
    /// When this pending slot was created, for timeout purposes.
    pub created_at: Instant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_id_round_trips_through_bytes() {
        let id = ParticipantId::generate();
        let bytes = id.as_bytes();
        let reconstructed = ParticipantId::from_bytes(bytes);
        assert_eq!(id, reconstructed);
    }

    #[test]
    fn distinct_ids_are_generated() {
        assert_ne!(ParticipantId::generate(), ParticipantId::generate());
    }
}
