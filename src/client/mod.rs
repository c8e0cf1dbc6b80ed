//! The client-side room wrapper: holds the host's public key and drives the
//! shared [`crate::session::Session`] through join and rekey-acknowledgement.

#[allow(clippy::module_inception)]
mod client;

pub use client::Client;
