//! X25519 ephemeral key pairs.
//!
//! Every participant and the host hold one [`EphemeralKeyPair`] at a time;
//! the host rotates hers on every rekey, and each client rotates its own
//! pair when it acknowledges a rekey. Private halves never leave the
//! process and are zeroized on drop.

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::core::constants::X25519_KEY_SIZE;

/// An X25519 key pair used for a single handshake or rekey round.
pub struct EphemeralKeyPair {
    private: StaticSecret,
    public: [u8; X25519_KEY_SIZE],
}

impl EphemeralKeyPair {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        let private = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&private);
        Self {
            private,
            public: *public.as_bytes(),
        }
    }

    /// Reconstruct a key pair from an existing private scalar.
    pub fn from_private_bytes(private: [u8; X25519_KEY_SIZE]) -> Self {
        let private = StaticSecret::from(private);
        let public = PublicKey::from(&private);
        Self {
            private,
            public: *public.as_bytes(),
        }
    }

    /// The public half, safe to send over the wire.
    pub fn public_key(&self) -> &[u8; X25519_KEY_SIZE] {
        &self.public
    }

    /// Compute `DH(self.private, remote_public)`.
    pub fn diffie_hellman(&self, remote_public: &[u8; X25519_KEY_SIZE]) -> [u8; 32] {
        let public = PublicKey::from(*remote_public);
        *self.private.diffie_hellman(&public).as_bytes()
    }
}

impl Drop for EphemeralKeyPair {
    fn drop(&mut self) {
        // `StaticSecret` zeroizes its own scalar on drop; we only need to
        // clear the copy of the public key, which is not secret but kept
        // tidy for consistency with the rest of the key-material types.
        self.public.zeroize();
    }
}

impl std::fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("public", &hex_prefix(&self.public))
            .finish()
    }
}

fn hex_prefix(bytes: &[u8]) -> String {
    bytes.iter().take(4).map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypair_generation_produces_distinct_keys() {
        let a = EphemeralKeyPair::generate();
        let b = EphemeralKeyPair::generate();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn diffie_hellman_agrees_both_ways() {
        let a = EphemeralKeyPair::generate();
        let b = EphemeralKeyPair::generate();
        let shared_a = a.diffie_hellman(b.public_key());
        let shared_b = b.diffie_hellman(a.public_key());
        assert_eq!(shared_a, shared_b);
    }

    #[test]
    fn from_private_bytes_reproduces_public_key() {
        let original = EphemeralKeyPair::generate();
        let private_bytes = original.private.to_bytes();
        let reconstructed = EphemeralKeyPair::from_private_bytes(private_bytes);
        assert_eq!(original.public_key(), reconstructed.public_key());
    }
}
