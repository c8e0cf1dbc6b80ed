//! Event sink and capacity-monitor contracts.
//!
//! These are the concrete forms of the "narrow observer interface" and
//! "capacity monitor" the design notes call for without pinning down a
//! method set. Notifications are always dispatched outside the session
//! lock.

use crate::message::Message;
use crate::participant::ParticipantId;
use crate::session::state::SessionState;
use crate::wire::DestructionReason;

/// Receives session lifecycle events.
///
/// Implementations should not block; the session delivers these
/// synchronously from whatever thread observed the underlying event, after
/// releasing its internal lock.
pub trait Observer: Send + Sync {
    /// The session transitioned to a new state.
    fn on_state_change(&self, new_state: &SessionState) {
        let _ = new_state;
    }

    /// A message was accepted and buffered.
    fn on_message(&self, message: &Message) {
        let _ = message;
    }

    /// A participant was approved and added to the room.
    fn on_participant_joined(&self, id: ParticipantId) {
        let _ = id;
    }

    /// A participant was removed (left, kicked, or disconnected).
    fn on_participant_left(&self, id: ParticipantId) {
        let _ = id;
    }

    /// The session was destroyed.
    fn on_destroyed(&self, reason: DestructionReason) {
        let _ = reason;
    }
}

/// Statistics handed to a [`CapacityMonitor`] on each evaluation.
#[derive(Debug, Clone, Copy)]
pub struct BufferStats {
    /// Current number of buffered messages.
    pub message_count: usize,
    /// Current total buffered bytes.
    pub total_bytes: usize,
    /// Current number of room participants.
    pub participant_count: usize,
}

/// External capacity policy. The session only consumes the
/// close-gracefully trigger; everything else about capacity policy is out
/// of scope here.
pub trait CapacityMonitor: Send + Sync {
    /// Return `true` if the session should close with
    /// [`DestructionReason::CapacityExceeded`].
    fn should_close(&self, stats: &BufferStats) -> bool;
}

/// A [`CapacityMonitor`] that never triggers, for deployments with no
/// capacity policy.
#[derive(Debug, Default)]
pub struct NoopCapacityMonitor;

impl CapacityMonitor for NoopCapacityMonitor {
    fn should_close(&self, _stats: &BufferStats) -> bool {
        false
    }
}
