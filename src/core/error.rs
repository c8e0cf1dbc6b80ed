//! Error taxonomy for the ephemeral room session core.
//!
//! Each layer reports through its own `thiserror` enum; `RoomError` is the
//! crate-level aggregate a caller actually matches on. Validation and
//! authentication failures are recovered locally by callers (a dropped
//! frame, a rejected join) and rarely need to cross this boundary at all —
//! these enums exist mainly for the failures that propagate into
//! [`crate::session::SessionState::Destroyed`].

use thiserror::Error;

/// Errors in the key-material / handshake layer.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Handshake MAC or key agreement failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// AEAD encryption failed.
    #[error("AEAD encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (invalid tag or corrupted frame).
    #[error("AEAD decryption failed (invalid tag or corrupted)")]
    DecryptionFailed,

    /// Sequence counter exhausted for the current epoch.
    #[error("sequence counter exhausted - rekey required")]
    CounterExhaustion,

    /// Epoch counter exhausted - session must terminate.
    #[error("epoch exhausted - session must terminate")]
    EpochExhaustion,

    /// A frame was rejected as a replay by the replay guard.
    #[error("replay detected")]
    ReplayDetected,

    /// HKDF or HMAC key derivation failed.
    #[error("key derivation failed")]
    KeyDerivationFailed,
}

/// Errors specific to the join / approve / confirm and per-client rekey exchanges.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The peer's ephemeral public key was malformed.
    #[error("malformed public key")]
    MalformedPublicKey,

    /// `JOIN_CONFIRM` or `REKEY_CONFIRM` MAC verification failed.
    #[error("MAC verification failed")]
    MacMismatch,

    /// A `REKEY_CONFIRM` arrived with no matching pending entry.
    #[error("no pending confirmation for this client")]
    NoPendingConfirm,

    /// A `REKEY_CONFIRM` arrived whose epoch or nonce does not match the pending entry.
    #[error("confirmation epoch or nonce mismatch")]
    ConfirmMismatch,

    /// Crypto primitive failure underlying the handshake step.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Errors produced while encoding or decoding a wire frame.
#[derive(Debug, Error)]
pub enum FramerError {
    /// The frame is shorter than the fixed header.
    #[error("frame too short")]
    FrameTooShort,

    /// The frame exceeds the configured maximum size.
    #[error("frame exceeds maximum size")]
    FrameTooLarge,

    /// The frame declares an unsupported wire version.
    #[error("unsupported frame version: {0}")]
    UnsupportedVersion(u8),

    /// Plaintext exceeds the configured maximum before padding.
    #[error("plaintext exceeds maximum size")]
    PlaintextTooLarge,

    /// Plaintext declares an unknown content-type tag.
    #[error("unknown content type: {0}")]
    UnknownContentType(u8),

    /// The padded region's length prefix is inconsistent with its payload.
    #[error("invalid padding")]
    InvalidPadding,

    /// Underlying AEAD failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Errors decoding or validating a control-plane wire message.
#[derive(Debug, Error)]
pub enum WireError {
    /// JSON parsing failed.
    #[error("malformed wire message: {0}")]
    MalformedJson(String),

    /// The `type` tag did not match any known wire message.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// A base64-encoded field failed to decode.
    #[error("invalid base64 field: {0}")]
    InvalidBase64(String),
}

/// Errors surfaced by [`crate::session::Session`] operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The operation is not valid in the session's current state.
    #[error("operation not valid in state {state}")]
    WrongState {
        /// Name of the state the session was in.
        state: &'static str,
    },

    /// The room identifier could not be parsed.
    #[error("invalid room id")]
    InvalidRoomId,

    /// A configured capacity bound was exceeded.
    #[error("capacity exceeded")]
    CapacityExceeded,

    /// The referenced participant is not a member of the room.
    #[error("unknown participant")]
    UnknownParticipant,

    /// A security-sensitive configuration value failed validation (e.g. a
    /// non-`.onion` host under strict transport policy). This is always a
    /// programmer error, never a runtime recoverable condition.
    #[error("invalid security configuration: {0}")]
    InvalidSecurityConfig(String),

    /// Underlying crypto/handshake/framer/wire failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Underlying handshake failure.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// Underlying framer failure.
    #[error(transparent)]
    Framer(#[from] FramerError),

    /// Underlying wire-message failure.
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Top-level room errors.
#[derive(Debug, Error)]
pub enum RoomError {
    /// Session-level error.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error from the transport.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
