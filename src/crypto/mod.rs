//! Cryptographic primitives for the room session core: key material,
//! the join/rekey handshake, AEAD framing, and replay protection.

pub(crate) mod framer;
pub(crate) mod handshake;
pub(crate) mod keymaterial;
pub(crate) mod keys;
pub(crate) mod replay;

pub use framer::*;
pub use handshake::*;
pub use keymaterial::*;
pub use keys::*;
pub use replay::*;
