//! AEAD frame sealing and opening.
//!
//! Frame layout (big-endian multi-byte integers):
//!
//! ```text
//!  0       : version      (1 B)
//!  1..5    : epoch        (4 B, u32)
//!  5..13   : sequence     (8 B, u64)
//!  13..29  : sender id    (16 B, UUID)
//!  29..41  : nonce        (12 B)
//!  41..n-16: ciphertext   (padded plaintext)
//!  n-16..n : AEAD tag     (16 B)
//! ```

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;

use crate::core::constants::{
    content_type, AEAD_TAG_SIZE, FRAME_HEADER_SIZE, MAX_FRAME_SIZE, MAX_PLAINTEXT_SIZE,
    NONCE_SIZE, PADDING_BUCKETS, PADDING_JITTER_FRACTION, PROTOCOL_VERSION,
};
use crate::core::error::{CryptoError, FramerError};

/// A decoded, still-sealed frame header plus its ciphertext+tag body.
pub struct FrameHeader {
    /// Wire protocol version.
    pub version: u8,
    /// Epoch the frame was sealed under.
    pub epoch: u32,
    /// Per-sender monotonic sequence number.
    pub sequence: u64,
    /// Sender's participant id.
    pub sender_id: [u8; 16],
    /// The nonce embedded in the frame.
    pub nonce: [u8; NONCE_SIZE],
}

/// A decrypted application payload.
pub struct DecodedPlaintext {
    /// Content-type tag (see [`crate::core::constants::content_type`]).
    pub content_type: u8,
    /// The unpadded inner payload bytes.
    pub payload: Vec<u8>,
}

fn derive_message_key(master_key: &[u8], epoch: u32, sequence: u64) -> Result<[u8; 32], CryptoError> {
    let mut salt = [0u8; 12];
    salt[..4].copy_from_slice(&epoch.to_be_bytes());
    salt[4..].copy_from_slice(&sequence.to_be_bytes());
    let hk = Hkdf::<Sha256>::new(Some(&salt), master_key);
    let mut out = [0u8; 32];
    hk.expand(b"msg", &mut out)
        .map_err(|_| CryptoError::KeyDerivationFailed)?;
    Ok(out)
}

/// Deterministic per-frame nonce: `epoch || sender_id[..4] || sequence as u32`.
/// Shared with [`crate::crypto::replay`] so the replay guard can reject a
/// frame whose embedded nonce doesn't match what `(sender, epoch, sequence)`
/// must produce.
pub(crate) fn build_nonce(epoch: u32, sender_id: &[u8; 16], sequence: u64) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[0..4].copy_from_slice(&epoch.to_be_bytes());
    nonce[4..8].copy_from_slice(&sender_id[0..4]);
    nonce[8..12].copy_from_slice(&(sequence as u32).to_be_bytes());
    nonce
}

/// Pad `plaintext` up to the next bucket in [`PADDING_BUCKETS`], plus up to
/// `PADDING_JITTER_FRACTION` extra random bytes, prefixing a 4-byte
/// big-endian original length so [`unpad`] can recover it.
pub fn pad(plaintext: &[u8]) -> Result<Vec<u8>, FramerError> {
    let prefixed_len = plaintext.len() + 4;
    let bucket = *PADDING_BUCKETS
        .iter()
        .find(|&&b| b >= prefixed_len)
        .ok_or(FramerError::PlaintextTooLarge)?;

    let jitter_max = (bucket as f64 * PADDING_JITTER_FRACTION) as usize;
    let jitter = if jitter_max > 0 {
        (rand::rngs::OsRng.next_u32() as usize) % (jitter_max + 1)
    } else {
        0
    };
    let total = bucket + jitter;

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&(plaintext.len() as u32).to_be_bytes());
    out.extend_from_slice(plaintext);
    out.resize(total, 0u8);
    Ok(out)
}

/// Inverse of [`pad`].
pub fn unpad(padded: &[u8]) -> Result<Vec<u8>, FramerError> {
    if padded.len() < 4 {
        return Err(FramerError::InvalidPadding);
    }
    let len = u32::from_be_bytes(padded[0..4].try_into().unwrap()) as usize;
    if 4 + len > padded.len() {
        return Err(FramerError::InvalidPadding);
    }
    Ok(padded[4..4 + len].to_vec())
}

/// Seal an application message into a wire frame.
///
/// `plaintext` is the raw (unpadded) inner payload; this function prepends
/// the content-type byte, pads, derives the per-message key, and seals
/// with the frame header as associated data.
pub fn seal_frame(
    master_key: &[u8],
    epoch: u32,
    sequence: u64,
    sender_id: [u8; 16],
    content_type: u8,
    plaintext: &[u8],
) -> Result<Vec<u8>, FramerError> {
    if plaintext.len() > MAX_PLAINTEXT_SIZE {
        return Err(FramerError::PlaintextTooLarge);
    }

    let mut inner = Vec::with_capacity(1 + plaintext.len());
    inner.push(content_type);
    inner.extend_from_slice(plaintext);
    let padded = pad(&inner)?;

    let nonce_bytes = build_nonce(epoch, &sender_id, sequence);
    let msg_key = derive_message_key(master_key, epoch, sequence)?;

    let mut header = Vec::with_capacity(FRAME_HEADER_SIZE);
    header.push(PROTOCOL_VERSION);
    header.extend_from_slice(&epoch.to_be_bytes());
    header.extend_from_slice(&sequence.to_be_bytes());
    header.extend_from_slice(&sender_id);
    header.extend_from_slice(&nonce_bytes);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&msg_key));
    let nonce = Nonce::from_slice(&nonce_bytes);
    let sealed = cipher
        .encrypt(
            nonce,
            Payload {
                msg: &padded,
                aad: &header,
            },
        )
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut frame = header;
    frame.extend_from_slice(&sealed);

    if frame.len() > MAX_FRAME_SIZE {
        return Err(FramerError::FrameTooLarge);
    }
    Ok(frame)
}

/// Parse a frame's fixed header without opening the AEAD body.
pub fn parse_header(frame: &[u8]) -> Result<FrameHeader, FramerError> {
    if frame.len() < FRAME_HEADER_SIZE + AEAD_TAG_SIZE {
        return Err(FramerError::FrameTooShort);
    }
    if frame.len() > MAX_FRAME_SIZE {
        return Err(FramerError::FrameTooLarge);
    }
    let version = frame[0];
    if version != PROTOCOL_VERSION {
        return Err(FramerError::UnsupportedVersion(version));
    }
    let epoch = u32::from_be_bytes(frame[1..5].try_into().unwrap());
    let sequence = u64::from_be_bytes(frame[5..13].try_into().unwrap());
    let mut sender_id = [0u8; 16];
    sender_id.copy_from_slice(&frame[13..29]);
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&frame[29..29 + NONCE_SIZE]);

    Ok(FrameHeader {
        version,
        epoch,
        sequence,
        sender_id,
        nonce,
    })
}

/// Open a sealed frame, returning the decoded content type and payload.
pub fn open_frame(master_key: &[u8], frame: &[u8]) -> Result<DecodedPlaintext, FramerError> {
    let header = parse_header(frame)?;
    let header_bytes = &frame[..FRAME_HEADER_SIZE];
    let body = &frame[FRAME_HEADER_SIZE..];

    let msg_key = derive_message_key(master_key, header.epoch, header.sequence)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&msg_key));
    let nonce = Nonce::from_slice(&header.nonce);

    let padded = cipher
        .decrypt(
            nonce,
            Payload {
                msg: body,
                aad: header_bytes,
            },
        )
        .map_err(|_| CryptoError::DecryptionFailed)?;

    let inner = unpad(&padded)?;
    if inner.is_empty() {
        return Err(FramerError::InvalidPadding);
    }
    let ct = inner[0];
    if !matches!(
        ct,
        content_type::TEXT
            | content_type::IMAGE
            | content_type::VIDEO
            | content_type::SYSTEM
            | content_type::REKEY_CONFIRM
            | content_type::REKEY_PAYLOAD
    ) {
        return Err(FramerError::UnknownContentType(ct));
    }

    Ok(DecodedPlaintext {
        content_type: ct,
        payload: inner[1..].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: [u8; 32] = [0x11u8; 32];

    #[test]
    fn seal_and_open_round_trip() {
        let sender = [1u8; 16];
        let frame = seal_frame(&MASTER, 1, 1, sender, content_type::TEXT, b"hello").unwrap();
        let opened = open_frame(&MASTER, &frame).unwrap();
        assert_eq!(opened.content_type, content_type::TEXT);
        assert_eq!(opened.payload, b"hello");
    }

    #[test]
    fn bit_flip_fails_decryption() {
        let sender = [1u8; 16];
        let mut frame = seal_frame(&MASTER, 1, 1, sender, content_type::TEXT, b"hello").unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0x01;
        assert!(open_frame(&MASTER, &frame).is_err());
    }

    #[test]
    fn padding_round_trips_and_buckets_correctly() {
        let data = vec![0xABu8; 10];
        let padded = pad(&data).unwrap();
        let max_with_jitter = PADDING_BUCKETS[0] + (PADDING_BUCKETS[0] as f64 * PADDING_JITTER_FRACTION) as usize;
        assert!(padded.len() >= PADDING_BUCKETS[0] && padded.len() <= max_with_jitter);
        let recovered = unpad(&padded).unwrap();
        assert_eq!(recovered, data);
    }

    #[test]
    fn wrong_master_key_fails() {
        let sender = [1u8; 16];
        let frame = seal_frame(&MASTER, 1, 1, sender, content_type::TEXT, b"hello").unwrap();
        let other_master = [0x22u8; 32];
        assert!(open_frame(&other_master, &frame).is_err());
    }
}
