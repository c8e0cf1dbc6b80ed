//! # hushroom-core
//!
//! The session core for an ephemeral, end-to-end-encrypted chat room: an
//! X25519 join handshake, per-client forward-secret rekeying, ChaCha20-Poly1305
//! framing with padding and replay protection, and the lifecycle state
//! machine shared by both a room's host and its clients.
//!
//! Nothing in this crate talks to a network directly — it consumes a
//! [`transport::Transport`] the caller supplies, and emits/accepts the JSON
//! control messages in [`wire`] and opaque sealed frames produced by
//! [`session::Session`].
//!
//! ## Feature Flags
//!
//! - `crypto` (default): key material, handshake, AEAD framing, replay guard
//! - `wire` (default): JSON control-plane messages
//! - `transport` (default): heartbeat/backoff timing, the `Transport` trait
//! - `host` (default): the host-side room wrapper
//! - `client` (default): the client-side room wrapper
//!
//! ## Modules
//!
//! - [`core`]: error types and protocol constants (always included)
//! - [`crypto`]: key material, handshake, framer, replay guard
//! - [`session`]: the shared state machine both roles drive
//! - [`host`]: the host-side room wrapper
//! - [`client`]: the client-side room wrapper
//! - [`wire`]: JSON control-plane messages
//! - [`transport`]: the `Transport` trait and timing helpers

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Crypto layer (feature-gated)
#[cfg(feature = "crypto")]
#[cfg_attr(docsrs, doc(cfg(feature = "crypto")))]
pub mod crypto;

// Transport glue (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

// Control-plane wire messages (feature-gated)
#[cfg(feature = "wire")]
#[cfg_attr(docsrs, doc(cfg(feature = "wire")))]
pub mod wire;

// Room/participant identifiers (require crypto + wire: RoomId hashes/randoms
// via crypto's deps, ParticipantId serializes via wire's uuid/serde deps)
#[cfg(all(feature = "crypto", feature = "wire"))]
#[cfg_attr(docsrs, doc(cfg(all(feature = "crypto", feature = "wire"))))]
pub mod room;
#[cfg(all(feature = "crypto", feature = "wire"))]
#[cfg_attr(docsrs, doc(cfg(all(feature = "crypto", feature = "wire"))))]
pub mod participant;

// The volatile message buffer (feature-gated on crypto: content-type tags)
#[cfg(feature = "crypto")]
#[cfg_attr(docsrs, doc(cfg(feature = "crypto")))]
pub mod message;

// The shared session core (feature-gated)
#[cfg(all(feature = "crypto", feature = "wire"))]
#[cfg_attr(docsrs, doc(cfg(all(feature = "crypto", feature = "wire"))))]
pub mod session;

// Host API (feature-gated)
#[cfg(feature = "host")]
#[cfg_attr(docsrs, doc(cfg(feature = "host")))]
pub mod host;

// Client API (feature-gated)
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub mod client;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core error types
    pub use crate::core::*;

    // Crypto types (when enabled)
    #[cfg(feature = "crypto")]
    pub use crate::crypto::*;

    // Wire messages (when enabled)
    #[cfg(feature = "wire")]
    pub use crate::wire::*;

    #[cfg(all(feature = "crypto", feature = "wire"))]
    pub use crate::participant::ParticipantId;
    #[cfg(all(feature = "crypto", feature = "wire"))]
    pub use crate::room::RoomId;
    #[cfg(all(feature = "crypto", feature = "wire"))]
    pub use crate::session::{Observer, Session, SessionConfig, SessionConfigBuilder, SessionState};

    #[cfg(feature = "host")]
    pub use crate::host::Host;
    #[cfg(feature = "client")]
    pub use crate::client::Client;

    #[cfg(feature = "transport")]
    pub use crate::transport::Transport;
}

// Re-export commonly used items at crate root
pub use core::{CryptoError, HandshakeError, RoomError, SessionError};

#[cfg(all(feature = "crypto", feature = "wire"))]
pub use participant::ParticipantId;
#[cfg(all(feature = "crypto", feature = "wire"))]
pub use room::RoomId;
#[cfg(all(feature = "crypto", feature = "wire"))]
pub use session::{Session, SessionConfig};

#[cfg(feature = "host")]
pub use host::Host;
#[cfg(feature = "client")]
pub use client::Client;
