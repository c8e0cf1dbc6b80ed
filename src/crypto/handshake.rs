//! Join / approve / confirm and per-client rekey key agreement.
//!
//! Every derivation goes through HKDF-SHA256; confirmations are
//! authenticated with HMAC-SHA256. None of this is a Noise pattern — each
//! exchange is a single DH plus a derive-and-MAC step, which is all the
//! room's star topology (host <-> each client, never client <-> client)
//! needs.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::core::constants::{AEAD_TAG_SIZE, MAC_SIZE, MASTER_KEY_SIZE, X25519_KEY_SIZE};
use crate::core::error::{CryptoError, HandshakeError};
use crate::crypto::keys::EphemeralKeyPair;

type HmacSha256 = Hmac<Sha256>;

// Both wrap keys below (`derive`d fresh per join / per rekey round) are
// used to seal exactly one message, so a fixed nonce under a single-use
// key is as safe as a random one and saves a field on the wire.
const WRAP_NONCE: [u8; 12] = [0u8; 12];

fn hkdf_derive(ikm: &[u8], salt: &[u8], info: &[u8], out_len: usize) -> Result<Vec<u8>, CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut out = vec![0u8; out_len];
    hk.expand(info, &mut out)
        .map_err(|_| CryptoError::KeyDerivationFailed)?;
    Ok(out)
}

fn hmac_tag(key: &[u8], parts: &[&[u8]]) -> Result<[u8; MAC_SIZE], CryptoError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| CryptoError::KeyDerivationFailed)?;
    for part in parts {
        mac.update(part);
    }
    let tag = mac.finalize().into_bytes();
    let mut out = [0u8; MAC_SIZE];
    out.copy_from_slice(&tag);
    Ok(out)
}

/// The pairwise key derived during join approval, used only to authenticate
/// `JOIN_CONFIRM`. Discarded immediately after verification.
pub struct SessionKey(pub [u8; 32]);

/// Derive the pairwise `SessionKey` for a join exchange.
///
/// `salt` is the room id; `info` binds both ephemeral public keys so a
/// transcript substitution changes the derived key.
pub fn derive_session_key(
    shared_secret: &[u8; 32],
    room_id: &[u8],
    host_pub: &[u8; X25519_KEY_SIZE],
    client_pub: &[u8; X25519_KEY_SIZE],
) -> Result<SessionKey, CryptoError> {
    let mut info = Vec::with_capacity(b"session".len() + 2 * X25519_KEY_SIZE);
    info.extend_from_slice(b"session");
    info.extend_from_slice(host_pub);
    info.extend_from_slice(client_pub);
    let bytes = hkdf_derive(shared_secret, room_id, &info, 32)?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(SessionKey(key))
}

/// Seal the current master key and epoch under a just-derived `SessionKey`
/// for delivery inside `JOIN_APPROVED`. `epoch` is bound as AEAD associated
/// data so a relay cannot splice in a different epoch without detection.
pub fn wrap_master_for_join(
    session_key: &SessionKey,
    master_key: &[u8; MASTER_KEY_SIZE],
    epoch: u32,
) -> Result<Vec<u8>, CryptoError> {
    let wrap_key = hkdf_derive(&session_key.0, b"join-approval-wrap", b"wrap", 32)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&wrap_key));
    let nonce = Nonce::from_slice(&WRAP_NONCE);
    cipher
        .encrypt(
            nonce,
            Payload {
                msg: master_key.as_slice(),
                aad: &epoch.to_be_bytes(),
            },
        )
        .map_err(|_| CryptoError::EncryptionFailed)
}

/// Inverse of [`wrap_master_for_join`].
pub fn unwrap_master_for_join(
    session_key: &SessionKey,
    wrapped: &[u8],
    epoch: u32,
) -> Result<[u8; MASTER_KEY_SIZE], HandshakeError> {
    if wrapped.len() != MASTER_KEY_SIZE + AEAD_TAG_SIZE {
        return Err(HandshakeError::MalformedPublicKey);
    }
    let wrap_key =
        hkdf_derive(&session_key.0, b"join-approval-wrap", b"wrap", 32).map_err(HandshakeError::Crypto)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&wrap_key));
    let nonce = Nonce::from_slice(&WRAP_NONCE);
    let plaintext = cipher
        .decrypt(
            nonce,
            Payload {
                msg: wrapped,
                aad: &epoch.to_be_bytes(),
            },
        )
        .map_err(|_| HandshakeError::Crypto(CryptoError::DecryptionFailed))?;
    let mut out = [0u8; MASTER_KEY_SIZE];
    out.copy_from_slice(&plaintext);
    Ok(out)
}

/// Compute the `JOIN_CONFIRM` MAC a client sends back to the host.
pub fn join_confirm_mac(
    session_key: &SessionKey,
    client_pub: &[u8; X25519_KEY_SIZE],
    host_pub: &[u8; X25519_KEY_SIZE],
) -> Result<[u8; MAC_SIZE], CryptoError> {
    hmac_tag(&session_key.0, &[client_pub, host_pub])
}

/// Verify a `JOIN_CONFIRM` MAC in constant time.
pub fn verify_join_confirm(
    session_key: &SessionKey,
    client_pub: &[u8; X25519_KEY_SIZE],
    host_pub: &[u8; X25519_KEY_SIZE],
    mac: &[u8; MAC_SIZE],
) -> Result<(), HandshakeError> {
    use subtle::ConstantTimeEq;
    let expected = join_confirm_mac(session_key, client_pub, host_pub)?;
    if expected.ct_eq(mac).into() {
        Ok(())
    } else {
        Err(HandshakeError::MacMismatch)
    }
}

/// The double-wrapped rekey payload the host unicasts to one participant.
///
/// This struct is the *inner* wrap; the caller (the framer) seals the
/// serialized bytes of this struct again under the current epoch's
/// message key, so the relay never observes anything but opaque
/// application-message bytes.
pub struct PerClientRekeyPayload {
    /// The epoch the new master key belongs to.
    pub new_epoch: u32,
    /// The host's fresh ephemeral public key for this rekey round.
    pub host_eph_pub: [u8; X25519_KEY_SIZE],
    /// `new_master_key` sealed under `wrap_k`.
    pub ciphertext: Vec<u8>,
    /// Random nonce also used to bind the client's confirmation.
    pub confirm_nonce: [u8; 16],
}

impl PerClientRekeyPayload {
    /// Fixed wire size: epoch(4) + host_eph_pub(32) + confirm_nonce(16) + sealed master(32+16 tag).
    pub const WIRE_SIZE: usize = 4 + X25519_KEY_SIZE + 16 + MASTER_KEY_SIZE + AEAD_TAG_SIZE;

    /// Serialize to the fixed-size byte layout sealed as the outer
    /// application-message frame.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::WIRE_SIZE);
        out.extend_from_slice(&self.new_epoch.to_be_bytes());
        out.extend_from_slice(&self.host_eph_pub);
        out.extend_from_slice(&self.confirm_nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse the fixed-size byte layout back into a payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HandshakeError> {
        if bytes.len() != Self::WIRE_SIZE {
            return Err(HandshakeError::MalformedPublicKey);
        }
        let new_epoch = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
        let mut host_eph_pub = [0u8; X25519_KEY_SIZE];
        host_eph_pub.copy_from_slice(&bytes[4..4 + X25519_KEY_SIZE]);
        let mut confirm_nonce = [0u8; 16];
        confirm_nonce.copy_from_slice(&bytes[4 + X25519_KEY_SIZE..4 + X25519_KEY_SIZE + 16]);
        let ciphertext = bytes[4 + X25519_KEY_SIZE + 16..].to_vec();
        Ok(Self {
            new_epoch,
            host_eph_pub,
            ciphertext,
            confirm_nonce,
        })
    }
}

/// Derive `wrap_k` for one participant's rekey wrap, from an already
/// computed `DH(local_eph_priv, remote_eph_pub)` shared secret.
pub fn derive_rekey_wrap_key(
    shared_secret: &[u8; 32],
    room_id: &[u8],
    epoch: u32,
    confirm_nonce: &[u8; 16],
) -> Result<[u8; 32], CryptoError> {
    let mut info = Vec::with_capacity(b"rekey".len() + 4 + 16);
    info.extend_from_slice(b"rekey");
    info.extend_from_slice(&epoch.to_be_bytes());
    info.extend_from_slice(confirm_nonce);
    let bytes = hkdf_derive(shared_secret, room_id, &info, 32)?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}

/// Seal the new master key under `wrap_k` into a [`PerClientRekeyPayload`].
/// `new_epoch` and `confirm_nonce` are bound as AEAD associated data so
/// neither can be swapped in transit without the seal failing to open.
pub fn wrap_rekey_payload(
    wrap_k: &[u8; 32],
    new_epoch: u32,
    host_eph_pub: [u8; X25519_KEY_SIZE],
    new_master: &[u8; MASTER_KEY_SIZE],
    confirm_nonce: [u8; 16],
) -> Result<PerClientRekeyPayload, CryptoError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(wrap_k));
    let nonce = Nonce::from_slice(&WRAP_NONCE);
    let mut aad = Vec::with_capacity(4 + 16);
    aad.extend_from_slice(&new_epoch.to_be_bytes());
    aad.extend_from_slice(&confirm_nonce);
    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: new_master.as_slice(),
                aad: &aad,
            },
        )
        .map_err(|_| CryptoError::EncryptionFailed)?;
    Ok(PerClientRekeyPayload {
        new_epoch,
        host_eph_pub,
        ciphertext,
        confirm_nonce,
    })
}

/// Unwrap a [`PerClientRekeyPayload`] on the client side. `shared_secret`
/// is `DH(client_eph_priv, payload.host_eph_pub)`.
pub fn unwrap_rekey_payload(
    shared_secret: &[u8; 32],
    room_id: &[u8],
    payload: &PerClientRekeyPayload,
) -> Result<[u8; MASTER_KEY_SIZE], HandshakeError> {
    let wrap_k = derive_rekey_wrap_key(
        shared_secret,
        room_id,
        payload.new_epoch,
        &payload.confirm_nonce,
    )?;
    if payload.ciphertext.len() != MASTER_KEY_SIZE + AEAD_TAG_SIZE {
        return Err(HandshakeError::MalformedPublicKey);
    }
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&wrap_k));
    let nonce = Nonce::from_slice(&WRAP_NONCE);
    let mut aad = Vec::with_capacity(4 + 16);
    aad.extend_from_slice(&payload.new_epoch.to_be_bytes());
    aad.extend_from_slice(&payload.confirm_nonce);
    let plaintext = cipher
        .decrypt(
            nonce,
            Payload {
                msg: payload.ciphertext.as_slice(),
                aad: &aad,
            },
        )
        .map_err(|_| HandshakeError::Crypto(CryptoError::DecryptionFailed))?;
    let mut out = [0u8; MASTER_KEY_SIZE];
    out.copy_from_slice(&plaintext);
    Ok(out)
}

/// Derive the confirm-key used for `REKEY_CONFIRM` authentication, from the
/// *new* master key.
pub fn derive_confirm_key(
    new_master: &[u8; MASTER_KEY_SIZE],
    epoch: u32,
    confirm_nonce: &[u8; 16],
) -> Result<[u8; 32], CryptoError> {
    let mut info = Vec::with_capacity(b"confirm".len() + 4 + 16);
    info.extend_from_slice(b"confirm");
    info.extend_from_slice(&epoch.to_be_bytes());
    info.extend_from_slice(confirm_nonce);
    let bytes = hkdf_derive(new_master, b"", &info, 32)?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}

/// Compute the `REKEY_CONFIRM` MAC a client sends to the host.
#[allow(clippy::too_many_arguments)]
pub fn rekey_confirm_mac(
    confirm_key: &[u8; 32],
    epoch: u32,
    new_client_eph_pub: &[u8; X25519_KEY_SIZE],
    confirm_nonce: &[u8; 16],
    host_eph_pub: &[u8; X25519_KEY_SIZE],
    room_id: &[u8],
) -> Result<[u8; MAC_SIZE], CryptoError> {
    hmac_tag(
        confirm_key,
        &[
            &epoch.to_be_bytes(),
            new_client_eph_pub,
            confirm_nonce,
            host_eph_pub,
            room_id,
        ],
    )
}

/// Verify a `REKEY_CONFIRM` MAC in constant time.
#[allow(clippy::too_many_arguments)]
pub fn verify_rekey_confirm(
    confirm_key: &[u8; 32],
    epoch: u32,
    new_client_eph_pub: &[u8; X25519_KEY_SIZE],
    confirm_nonce: &[u8; 16],
    host_eph_pub: &[u8; X25519_KEY_SIZE],
    room_id: &[u8],
    mac: &[u8; MAC_SIZE],
) -> Result<(), HandshakeError> {
    use subtle::ConstantTimeEq;
    let expected = rekey_confirm_mac(
        confirm_key,
        epoch,
        new_client_eph_pub,
        confirm_nonce,
        host_eph_pub,
        room_id,
    )?;
    if expected.ct_eq(mac).into() {
        Ok(())
    } else {
        Err(HandshakeError::MacMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_round_trip_wraps_and_unwraps_master() {
        let host = EphemeralKeyPair::generate();
        let client = EphemeralKeyPair::generate();
        let shared = host.diffie_hellman(client.public_key());
        let room_id = b"room-id-bytes-000000000000000000";

        let host_key = derive_session_key(&shared, room_id, host.public_key(), client.public_key()).unwrap();
        let client_shared = client.diffie_hellman(host.public_key());
        let client_key =
            derive_session_key(&client_shared, room_id, host.public_key(), client.public_key()).unwrap();
        assert_eq!(host_key.0, client_key.0);

        let master = [0x42u8; MASTER_KEY_SIZE];
        let wrapped = wrap_master_for_join(&host_key, &master, 1).unwrap();
        let unwrapped = unwrap_master_for_join(&client_key, &wrapped, 1).unwrap();
        assert_eq!(master, unwrapped);
    }

    #[test]
    fn join_master_wrap_rejects_epoch_tamper() {
        let host = EphemeralKeyPair::generate();
        let client = EphemeralKeyPair::generate();
        let shared = host.diffie_hellman(client.public_key());
        let key = derive_session_key(&shared, b"room", host.public_key(), client.public_key()).unwrap();

        let master = [0x42u8; MASTER_KEY_SIZE];
        let wrapped = wrap_master_for_join(&key, &master, 1).unwrap();
        assert!(unwrap_master_for_join(&key, &wrapped, 2).is_err());
    }

    #[test]
    fn join_confirm_mac_round_trips() {
        let host = EphemeralKeyPair::generate();
        let client = EphemeralKeyPair::generate();
        let shared = host.diffie_hellman(client.public_key());
        let key = derive_session_key(&shared, b"room", host.public_key(), client.public_key()).unwrap();

        let mac = join_confirm_mac(&key, client.public_key(), host.public_key()).unwrap();
        assert!(verify_join_confirm(&key, client.public_key(), host.public_key(), &mac).is_ok());

        let mut bad_mac = mac;
        bad_mac[0] ^= 0xFF;
        assert!(verify_join_confirm(&key, client.public_key(), host.public_key(), &bad_mac).is_err());
    }

    #[test]
    fn per_client_rekey_round_trips() {
        let host_eph = EphemeralKeyPair::generate();
        let client_eph = EphemeralKeyPair::generate();
        let room_id = b"room";
        let confirm_nonce = [7u8; 16];
        let new_master = [0x99u8; MASTER_KEY_SIZE];

        let host_shared = host_eph.diffie_hellman(client_eph.public_key());
        let client_shared = client_eph.diffie_hellman(host_eph.public_key());

        let wrap_k = derive_rekey_wrap_key(&host_shared, room_id, 2, &confirm_nonce).unwrap();
        let payload = wrap_rekey_payload(&wrap_k, 2, *host_eph.public_key(), &new_master, confirm_nonce).unwrap();
        let recovered = unwrap_rekey_payload(&client_shared, room_id, &payload).unwrap();
        assert_eq!(recovered, new_master);

        let confirm_key = derive_confirm_key(&new_master, 2, &confirm_nonce).unwrap();
        let mac = rekey_confirm_mac(
            &confirm_key,
            2,
            client_eph.public_key(),
            &confirm_nonce,
            host_eph.public_key(),
            room_id,
        )
        .unwrap();
        assert!(verify_rekey_confirm(
            &confirm_key,
            2,
            client_eph.public_key(),
            &confirm_nonce,
            host_eph.public_key(),
            room_id,
            &mac,
        )
        .is_ok());
    }

    #[test]
    fn rekey_payload_bytes_round_trip() {
        let host_eph = EphemeralKeyPair::generate();
        let wrap_k = [3u8; 32];
        let payload = wrap_rekey_payload(&wrap_k, 4, *host_eph.public_key(), &[9u8; MASTER_KEY_SIZE], [1u8; 16]).unwrap();
        let bytes = payload.to_bytes();
        assert_eq!(bytes.len(), PerClientRekeyPayload::WIRE_SIZE);
        let parsed = PerClientRekeyPayload::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.new_epoch, 4);
        assert_eq!(parsed.host_eph_pub, *host_eph.public_key());
        assert_eq!(parsed.ciphertext, payload.ciphertext);
    }
}
