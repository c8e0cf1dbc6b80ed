//! Constants and error types shared by every layer of the session core.

pub mod constants;
pub mod error;

pub use error::*;
