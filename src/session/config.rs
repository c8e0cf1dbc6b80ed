//! Session configuration.
//!
//! Every policy threshold the specification calls a "default" (as opposed
//! to a fixed protocol constant) is a field here, not a literal buried in
//! [`super::session::Session`] logic.

use std::time::Duration;

use crate::core::constants::{
    DEFAULT_BOOTSTRAP_STALL_TIMEOUT, DEFAULT_BUFFER_EXPIRY, DEFAULT_BUFFER_MAX_BYTES,
    DEFAULT_BUFFER_MAX_COUNT, DEFAULT_HEARTBEAT_INTERVAL,
    DEFAULT_MAX_CONSECUTIVE_CRYPTO_FAILURES, DEFAULT_REKEY_AFTER_MESSAGES,
    DEFAULT_REKEY_AFTER_TIME, DEFAULT_REKEY_CONFIRM_TIMEOUT, MAX_FRAME_SIZE, MAX_PLAINTEXT_SIZE,
};

/// Overall security posture. `HighSecurity` shifts the padding ladder's
/// floor upward and enables the strict `.onion`-only transport validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityLevel {
    /// Default padding ladder, non-strict transport validation.
    #[default]
    Standard,
    /// Larger minimum padding bucket, strict transport validation (a
    /// non-`.onion` relay host aborts the process).
    HighSecurity,
}

/// Limits on the volatile in-memory message buffer.
#[derive(Debug, Clone, Copy)]
pub struct BufferLimits {
    /// Maximum number of buffered messages.
    pub max_count: usize,
    /// Maximum total bytes buffered.
    pub max_bytes: usize,
    /// Age after which a buffered message is purged.
    pub expiry: Duration,
}

impl Default for BufferLimits {
    fn default() -> Self {
        Self {
            max_count: DEFAULT_BUFFER_MAX_COUNT,
            max_bytes: DEFAULT_BUFFER_MAX_BYTES,
            expiry: DEFAULT_BUFFER_EXPIRY,
        }
    }
}

/// Rekey triggers and the failure budget before a session is torn down.
#[derive(Debug, Clone, Copy)]
pub struct RekeyPolicy {
    /// Rekey after this much time since the last rekey.
    pub after_time: Duration,
    /// Rekey after this many messages since the last rekey.
    pub after_messages: u64,
    /// How long a pending rekey confirmation slot lives before being
    /// dropped.
    pub confirm_timeout: Duration,
    /// Consecutive AEAD decryption failures treated as fatal.
    pub max_consecutive_crypto_failures: u32,
}

impl Default for RekeyPolicy {
    fn default() -> Self {
        Self {
            after_time: DEFAULT_REKEY_AFTER_TIME,
            after_messages: DEFAULT_REKEY_AFTER_MESSAGES,
            confirm_timeout: DEFAULT_REKEY_CONFIRM_TIMEOUT,
            max_consecutive_crypto_failures: DEFAULT_MAX_CONSECUTIVE_CRYPTO_FAILURES,
        }
    }
}

/// Heartbeat and reconnect timing.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    /// Base heartbeat interval, jittered at send time.
    pub interval: Duration,
    /// How long a stalled anonymity-network bootstrap is tolerated.
    pub bootstrap_stall_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_HEARTBEAT_INTERVAL,
            bootstrap_stall_timeout: DEFAULT_BOOTSTRAP_STALL_TIMEOUT,
        }
    }
}

/// Frame size bounds, independent of the fixed padding ladder.
#[derive(Debug, Clone, Copy)]
pub struct FramerConfig {
    /// Maximum accepted total frame size.
    pub max_frame_size: usize,
    /// Maximum accepted raw plaintext size before padding.
    pub max_plaintext_size: usize,
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
            max_plaintext_size: MAX_PLAINTEXT_SIZE,
        }
    }
}

/// Top-level session configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionConfig {
    /// Overall security posture.
    pub security_level: SecurityLevel,
    /// Message buffer bounds.
    pub buffer: BufferLimits,
    /// Rekey triggers and crypto-failure budget.
    pub rekey: RekeyPolicy,
    /// Heartbeat/bootstrap timing.
    pub heartbeat: HeartbeatConfig,
    /// Frame size bounds.
    pub framer: FramerConfig,
}

/// Fluent builder for [`SessionConfig`].
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Start from defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the overall security posture.
    pub fn security_level(mut self, level: SecurityLevel) -> Self {
        self.config.security_level = level;
        self
    }

    /// Override message buffer bounds.
    pub fn buffer(mut self, buffer: BufferLimits) -> Self {
        self.config.buffer = buffer;
        self
    }

    /// Override rekey policy.
    pub fn rekey(mut self, rekey: RekeyPolicy) -> Self {
        self.config.rekey = rekey;
        self
    }

    /// Override heartbeat/bootstrap timing.
    pub fn heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.config.heartbeat = heartbeat;
        self
    }

    /// Override frame size bounds.
    pub fn framer(mut self, framer: FramerConfig) -> Self {
        self.config.framer = framer;
        self
    }

    /// Finish building.
    pub fn build(self) -> SessionConfig {
        self.config
    }
}
