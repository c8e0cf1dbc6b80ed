//! The host-side room wrapper: holds the participant table, the pending-join
//! and pending-rekey-confirm bookkeeping, and drives the shared [`Session`]
//! through the host's event handlers.

mod host;

pub use host::Host;
