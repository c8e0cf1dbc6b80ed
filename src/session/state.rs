//! The session lifecycle state machine.

use crate::wire::DestructionReason;

/// The session's lifecycle state.
///
/// `None`, `Creating`, `Created`, and `Open` permit no application
/// messages. `Active` permits sending and receiving. `Rekeying` continues
/// to accept inbound messages for the old epoch that arrive before
/// confirmations complete, but forbids starting a second rekey.
/// `Destroyed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No room has been created or joined yet.
    None,
    /// A host is in the process of creating a room.
    Creating,
    /// The room exists but is not yet accepting joins.
    Created,
    /// The room is open for joins.
    Open,
    /// At least one join has been confirmed; application traffic flows.
    Active,
    /// A rekey is in progress.
    Rekeying,
    /// The session is torn down; all operations fail with
    /// [`crate::core::error::SessionError::WrongState`].
    Destroyed(DestructionReason),
}

impl SessionState {
    /// Name used in "wrong state" error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Creating => "Creating",
            Self::Created => "Created",
            Self::Open => "Open",
            Self::Active => "Active",
            Self::Rekeying => "Rekeying",
            Self::Destroyed(_) => "Destroyed",
        }
    }

    /// Whether application messages may be sent or received right now.
    pub fn allows_application_traffic(&self) -> bool {
        matches!(self, Self::Active | Self::Rekeying)
    }

    /// Whether the host may start a new rekey round right now.
    pub fn allows_rekey_start(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Whether the session is in its terminal state.
    pub fn is_destroyed(&self) -> bool {
        matches!(self, Self::Destroyed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_active_and_rekeying_allow_traffic() {
        assert!(!SessionState::None.allows_application_traffic());
        assert!(!SessionState::Open.allows_application_traffic());
        assert!(SessionState::Active.allows_application_traffic());
        assert!(SessionState::Rekeying.allows_application_traffic());
        assert!(!SessionState::Destroyed(DestructionReason::UserExit).allows_application_traffic());
    }

    #[test]
    fn only_active_allows_starting_a_rekey() {
        assert!(SessionState::Active.allows_rekey_start());
        assert!(!SessionState::Rekeying.allows_rekey_start());
    }
}
