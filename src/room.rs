//! Room identifiers.

use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::core::constants::ROOM_ID_SIZE;
use crate::core::error::SessionError;

const ENGINE: base64::engine::GeneralPurpose = base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// A room's identifier: 32 random bytes, immutable for the room's lifetime.
///
/// Rendered as URL-safe base64 without padding; always recoverable from its
/// string form.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoomId([u8; ROOM_ID_SIZE]);

impl RoomId {
    /// Generate a fresh random room id.
    pub fn generate() -> Self {
        let mut bytes = [0u8; ROOM_ID_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Derive a room id deterministically from a user-supplied string, via
    /// `SHA-256(label)`.
    pub fn from_label(label: &str) -> Self {
        let digest = Sha256::digest(label.as_bytes());
        let mut bytes = [0u8; ROOM_ID_SIZE];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// The raw 32 bytes, used as HKDF salt in the handshake.
    pub fn as_bytes(&self) -> &[u8; ROOM_ID_SIZE] {
        &self.0
    }

    /// Render as a URL-safe, unpadded base64 string.
    pub fn to_url_safe(&self) -> String {
        ENGINE.encode(self.0)
    }

    /// Parse a previously-rendered room id string.
    pub fn parse(s: &str) -> Result<Self, SessionError> {
        let decoded = ENGINE.decode(s).map_err(|_| SessionError::InvalidRoomId)?;
        if decoded.len() != ROOM_ID_SIZE {
            return Err(SessionError::InvalidRoomId);
        }
        let mut bytes = [0u8; ROOM_ID_SIZE];
        bytes.copy_from_slice(&decoded);
        Ok(Self(bytes))
    }
}

impl std::fmt::Debug for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RoomId({})", self.to_url_safe())
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_url_safe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_inverse_of_render() {
        let id = RoomId::generate();
        let rendered = id.to_url_safe();
        let parsed = RoomId::parse(&rendered).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn from_label_is_deterministic() {
        let a = RoomId::from_label("my-room");
        let b = RoomId::from_label("my-room");
        assert_eq!(a, b);
        let c = RoomId::from_label("other-room");
        assert_ne!(a, c);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(RoomId::parse("not valid base64!!").is_err());
        assert!(RoomId::parse("AA").is_err());
    }
}
