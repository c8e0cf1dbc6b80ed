//! The shared session core: configuration, lifecycle state, observer
//! contracts, and the `Session` type itself.

mod config;
mod observer;
mod session;
mod state;

pub use config::{
    BufferLimits, FramerConfig, HeartbeatConfig, RekeyPolicy, SecurityLevel, SessionConfig,
    SessionConfigBuilder,
};
pub use observer::{BufferStats, CapacityMonitor, NoopCapacityMonitor, Observer};
pub use session::{InboundMessage, Session};
pub use state::SessionState;
