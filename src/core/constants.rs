//! Protocol constants for the ephemeral room session core.
//!
//! Protocol-fixed values (frame layout, content types) live here as `const`.
//! Policy defaults that a deployment may reasonably override (rekey
//! thresholds, buffer limits, heartbeat timing) also live here as the
//! `DEFAULT_*` values consumed by `SessionConfig::default()`.

use std::time::Duration;

// =============================================================================
// CRYPTOGRAPHIC CONSTANTS
// =============================================================================

/// Size in bytes of a room master key.
pub const MASTER_KEY_SIZE: usize = 32;

/// Size in bytes of a derived per-message key.
pub const MESSAGE_KEY_SIZE: usize = 32;

/// Size in bytes of an X25519 scalar or point.
pub const X25519_KEY_SIZE: usize = 32;

/// Size in bytes of the AEAD nonce.
pub const NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag size.
pub const AEAD_TAG_SIZE: usize = 16;

/// Size in bytes of an HMAC-SHA256 output.
pub const MAC_SIZE: usize = 32;

/// Size in bytes of a random room identifier.
pub const ROOM_ID_SIZE: usize = 32;

/// Protocol version (v1).
pub const PROTOCOL_VERSION: u8 = 0x01;

// =============================================================================
// FRAME LAYOUT
// =============================================================================

/// Frame header size: version(1) + epoch(4) + sequence(8) + sender id(16) + nonce(12).
pub const FRAME_HEADER_SIZE: usize = 1 + 4 + 8 + 16 + NONCE_SIZE;

/// Maximum total frame size accepted on decode.
pub const MAX_FRAME_SIZE: usize = 50 * 1024 * 1024;

/// Maximum raw plaintext size accepted for sealing (before padding).
pub const MAX_PLAINTEXT_SIZE: usize = 40 * 1024 * 1024;

/// Plaintext content-type tags.
pub mod content_type {
    /// UTF-8 chat text.
    pub const TEXT: u8 = 0x01;
    /// Image attachment.
    pub const IMAGE: u8 = 0x02;
    /// Video attachment.
    pub const VIDEO: u8 = 0x03;
    /// System-originated notice.
    pub const SYSTEM: u8 = 0x04;
    /// Rekey acknowledgement, framed as an ordinary application message.
    pub const REKEY_CONFIRM: u8 = 0x05;
    /// A double-wrapped per-client rekey payload, framed as an ordinary
    /// application message under the outgoing epoch's master key.
    pub const REKEY_PAYLOAD: u8 = 0x06;
}

// =============================================================================
// PADDING LADDER
// =============================================================================

/// Padding bucket sizes in ascending order.
pub const PADDING_BUCKETS: [usize; 7] = [256, 1024, 8192, 65536, 524288, 4194304, 52428800];

/// Additional jitter applied on top of a padding bucket, as a fraction of the bucket.
pub const PADDING_JITTER_FRACTION: f64 = 0.10;

// =============================================================================
// ANTI-REPLAY
// =============================================================================

/// Recommended per-sender replay guard sliding-window size in bits.
pub const REPLAY_WINDOW_SIZE: usize = 1024;

// =============================================================================
// SESSION / REKEY POLICY DEFAULTS
// =============================================================================

/// Default time-based rekey trigger.
pub const DEFAULT_REKEY_AFTER_TIME: Duration = Duration::from_secs(60 * 30);

/// Default message-count-based rekey trigger.
pub const DEFAULT_REKEY_AFTER_MESSAGES: u64 = 1000;

/// Number of consecutive AEAD decryption failures treated as fatal.
pub const DEFAULT_MAX_CONSECUTIVE_CRYPTO_FAILURES: u32 = 5;

/// Lifetime of a pending per-client rekey confirmation slot.
pub const DEFAULT_REKEY_CONFIRM_TIMEOUT: Duration = Duration::from_secs(30);

/// Highest epoch value; epochs never wrap.
pub const MAX_EPOCH: u32 = u32::MAX;

// =============================================================================
// MESSAGE BUFFER DEFAULTS
// =============================================================================

/// Default maximum number of buffered messages.
pub const DEFAULT_BUFFER_MAX_COUNT: usize = 50;

/// Default maximum total bytes buffered.
pub const DEFAULT_BUFFER_MAX_BYTES: usize = 20 * 1024 * 1024;

/// Default age after which a buffered message is purged.
pub const DEFAULT_BUFFER_EXPIRY: Duration = Duration::from_secs(5 * 60);

/// Interval between buffer-expiry sweeps.
pub const BUFFER_PURGE_INTERVAL: Duration = Duration::from_secs(30);

/// Interval between rekey-policy checks and pending-rekey-confirm expiry
/// sweeps on the host's session worker.
pub const REKEY_CHECK_INTERVAL: Duration = Duration::from_secs(10);

// =============================================================================
// HEARTBEAT / RECONNECT DEFAULTS
// =============================================================================

/// Default heartbeat interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Fractional jitter applied to the heartbeat interval (e.g. 0.30 = +/-30%).
pub const HEARTBEAT_JITTER_FRACTION: f64 = 0.30;

/// Base reconnect backoff delay.
pub const RECONNECT_BACKOFF_BASE: Duration = Duration::from_secs(3);

/// Maximum reconnect backoff delay.
pub const RECONNECT_BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Jitter applied to each backoff delay.
pub const RECONNECT_BACKOFF_JITTER: Duration = Duration::from_secs(2);

/// Maximum reconnect attempts before giving up.
pub const RECONNECT_MAX_ATTEMPTS: u32 = 5;

/// How long a transport bootstrap may make no progress before it is fatal.
pub const DEFAULT_BOOTSTRAP_STALL_TIMEOUT: Duration = Duration::from_secs(120);

// =============================================================================
// SEND-SIDE TIMING OBFUSCATION
// =============================================================================

/// Maximum jitter delay applied before handing a sealed frame to the transport.
pub const MAX_SEND_JITTER: Duration = Duration::from_millis(300);
