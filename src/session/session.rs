//! The shared session core: state machine, master key lifecycle, message
//! buffer, and the send/receive path common to both host and client roles.
//!
//! Role-specific behavior (join approval, per-client rekey orchestration on
//! the host; join requests and rekey acknowledgement on the client) lives
//! in [`crate::host::Host`] and [`crate::client::Client`], both of which
//! hold a `Session` and drive it.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, error, warn};

use crate::core::constants::content_type;
use crate::core::error::{CryptoError, SessionError};
use crate::crypto::framer::{open_frame, seal_frame};
use crate::crypto::keymaterial::KeyMaterial;
use crate::crypto::keys::EphemeralKeyPair;
use crate::crypto::replay::ReplayGuard;
use crate::message::{Message, MessageBuffer};
use crate::participant::ParticipantId;
use crate::room::RoomId;
use crate::session::config::SessionConfig;
use crate::session::observer::{BufferStats, CapacityMonitor, NoopCapacityMonitor, Observer};
use crate::session::state::SessionState;
use crate::wire::DestructionReason;

struct SessionInner {
    state: SessionState,
    master_key: Option<KeyMaterial>,
    epoch: u32,
    /// The superseded (epoch, master) pair during `Rekeying`, kept so
    /// stragglers still sealing under the old epoch remain decryptable
    /// until the round settles.
    previous_master: Option<(u32, KeyMaterial)>,
    local_eph: EphemeralKeyPair,
    send_sequence: u64,
    replay_guard: ReplayGuard,
    /// Replay state for `previous_master`'s epoch, active only during
    /// `Rekeying`.
    previous_replay_guard: Option<ReplayGuard>,
    buffer: MessageBuffer,
    consecutive_crypto_failures: u32,
    last_rekey_at: Instant,
    messages_since_rekey: u64,
    participant_count: usize,
}

/// A decoded inbound application message, ready to be handed to the buffer
/// and observer.
pub struct InboundMessage {
    /// The sender's participant id.
    pub sender_id: ParticipantId,
    /// The sequence number it was sealed under.
    pub sequence: u64,
    /// The epoch it was sealed under.
    pub epoch: u32,
    /// The content-type tag.
    pub content_type: u8,
    /// The decrypted payload.
    pub payload: Vec<u8>,
}

/// The shared state machine and crypto plumbing for one endpoint of a room.
pub struct Session {
    room_id: RoomId,
    local_id: ParticipantId,
    config: SessionConfig,
    observer: Option<Arc<dyn Observer>>,
    capacity_monitor: Arc<dyn CapacityMonitor>,
    inner: Mutex<SessionInner>,
}

impl Session {
    /// Create a new session in state [`SessionState::None`] for `room_id`.
    pub fn new(room_id: RoomId, local_id: ParticipantId, config: SessionConfig) -> Self {
        Self {
            room_id,
            local_id,
            config,
            observer: None,
            capacity_monitor: Arc::new(NoopCapacityMonitor),
            inner: Mutex::new(SessionInner {
                state: SessionState::None,
                master_key: None,
                epoch: 0,
                previous_master: None,
                local_eph: EphemeralKeyPair::generate(),
                send_sequence: 0,
                replay_guard: ReplayGuard::new(),
                previous_replay_guard: None,
                buffer: MessageBuffer::new(
                    config.buffer.max_count,
                    config.buffer.max_bytes,
                    config.buffer.expiry,
                ),
                consecutive_crypto_failures: 0,
                last_rekey_at: Instant::now(),
                messages_since_rekey: 0,
                participant_count: 0,
            }),
        }
    }

    /// Attach an observer for lifecycle/message notifications.
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Attach a capacity monitor.
    pub fn with_capacity_monitor(mut self, monitor: Arc<dyn CapacityMonitor>) -> Self {
        self.capacity_monitor = monitor;
        self
    }

    /// The room this session belongs to.
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// This endpoint's own participant id (the `senderId` it seals frames
    /// under).
    pub fn local_id(&self) -> ParticipantId {
        self.local_id
    }

    /// The configuration this session was built with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The session's current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.inner.lock().unwrap().state
    }

    /// The current epoch.
    pub fn epoch(&self) -> u32 {
        self.inner.lock().unwrap().epoch
    }

    /// This endpoint's current ephemeral public key.
    pub fn local_public_key(&self) -> [u8; 32] {
        *self.inner.lock().unwrap().local_eph.public_key()
    }

    fn notify_state_change(&self, state: SessionState) {
        if let Some(observer) = &self.observer {
            observer.on_state_change(&state);
        }
    }

    fn transition(&self, new_state: SessionState) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.state = new_state;
        }
        debug!(state = new_state.name(), "session state transition");
        self.notify_state_change(new_state);
    }

    /// Host-side: begin creating a room.
    pub fn mark_creating(&self) {
        self.transition(SessionState::Creating);
    }

    /// Host-side: the room has been created (transport ready).
    pub fn mark_created(&self) {
        self.transition(SessionState::Created);
    }

    /// Host-side: the room is open for joins.
    pub fn mark_open(&self) {
        self.transition(SessionState::Open);
    }

    /// Client-side: a join request has been sent; mirrors the host's
    /// `Open` state while awaiting approval.
    pub fn mark_awaiting_approval(&self) {
        self.transition(SessionState::Open);
    }

    /// Install the initial master key and move to `Active`. Used by the
    /// host on its first confirmed join, and by the client once it has
    /// unwrapped the master key from `JOIN_APPROVED`.
    pub fn activate(&self, master_key: KeyMaterial, epoch: u32) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.master_key = Some(master_key);
            inner.epoch = epoch;
            inner.last_rekey_at = Instant::now();
            inner.messages_since_rekey = 0;
        }
        self.transition(SessionState::Active);
    }

    /// Begin a rekey round: move to `Rekeying`. No-op (returns `false`) if
    /// not currently `Active`, since a rekey in progress must not be
    /// restarted.
    pub fn begin_rekey(&self) -> bool {
        let allowed = {
            let inner = self.inner.lock().unwrap();
            inner.state.allows_rekey_start()
        };
        if allowed {
            self.transition(SessionState::Rekeying);
        }
        allowed
    }

    /// Rotate the local ephemeral key pair, returning its new public key.
    /// Used by the host starting a rekey round and by each client
    /// acknowledging one.
    pub fn rotate_local_ephemeral(&self) -> [u8; 32] {
        let mut inner = self.inner.lock().unwrap();
        inner.local_eph = EphemeralKeyPair::generate();
        *inner.local_eph.public_key()
    }

    /// Perform `DH(local_eph.private, remote_public)` against the current
    /// local ephemeral key pair, without exposing the key pair itself.
    pub fn local_dh(&self, remote_public: &[u8; 32]) -> [u8; 32] {
        self.inner.lock().unwrap().local_eph.diffie_hellman(remote_public)
    }

    /// Switch the session's current master key and epoch to a freshly
    /// minted one, keeping the superseded master/epoch and its replay state
    /// around as a fallback for stragglers still on the old epoch. Does
    /// *not* transition state; the session stays `Rekeying` until
    /// [`Self::finish_rekey`]. Outbound sends (and inbound decrypts) start
    /// using the new master immediately.
    pub fn advance_epoch(&self, new_master: KeyMaterial, new_epoch: u32) {
        let mut inner = self.inner.lock().unwrap();
        let old_epoch = inner.epoch;
        if let Some(old_master) = inner.master_key.take() {
            inner.previous_master = Some((old_epoch, old_master));
        }
        let stale_guard = std::mem::replace(&mut inner.replay_guard, ReplayGuard::new());
        inner.previous_replay_guard = Some(stale_guard);
        inner.master_key = Some(new_master);
        inner.epoch = new_epoch;
        inner.consecutive_crypto_failures = 0;
        inner.send_sequence = 0;
        inner.last_rekey_at = Instant::now();
        inner.messages_since_rekey = 0;
    }

    /// Finish a rekey round once every participant has confirmed (or its
    /// confirmation slot has timed out): drop the superseded epoch entirely
    /// and return to `Active`. No-op if not currently `Rekeying`.
    pub fn finish_rekey(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.state != SessionState::Rekeying {
                return;
            }
            inner.previous_master = None;
            inner.previous_replay_guard = None;
        }
        self.transition(SessionState::Active);
    }

    /// Evaluate whether a rekey should be triggered given the configured
    /// policy (time or message-count threshold).
    pub fn should_rekey(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        if !inner.state.allows_rekey_start() {
            return false;
        }
        inner.last_rekey_at.elapsed() >= self.config.rekey.after_time
            || inner.messages_since_rekey >= self.config.rekey.after_messages
    }

    /// Seal an outbound application message, advancing the local sequence
    /// counter and appending it to the local buffer.
    pub fn seal_application_message(
        &self,
        content_type: u8,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, SessionError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.state.allows_application_traffic() {
            return Err(SessionError::WrongState {
                state: inner.state.name(),
            });
        }
        let master = inner
            .master_key
            .as_ref()
            .ok_or(SessionError::WrongState { state: "Active" })?;
        let epoch = inner.epoch;
        let sequence = inner.send_sequence;
        inner.send_sequence += 1;

        let frame = seal_frame(
            master.as_bytes(),
            epoch,
            sequence,
            self.local_id.as_bytes(),
            content_type,
            plaintext,
        )?;

        inner.messages_since_rekey += 1;
        inner.buffer.insert(Message {
            sender_id: self.local_id,
            sequence,
            epoch,
            content_type,
            payload: plaintext.to_vec(),
            received_at: Instant::now(),
        });
        Ok(frame)
    }

    /// Open an inbound application frame: decrypt, replay-check, and
    /// buffer it. Returns `Ok(None)` for a frame dropped as a replay
    /// (not an error, per the specification's drop-without-propagating
    /// semantics).
    pub fn receive_application_frame(
        &self,
        raw: &[u8],
    ) -> Result<Option<InboundMessage>, SessionError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.state.allows_application_traffic() {
            return Err(SessionError::WrongState {
                state: inner.state.name(),
            });
        }
        let header = crate::crypto::framer::parse_header(raw)?;

        // Try the current epoch first; while rekeying, fall back to the
        // superseded master so stragglers still on the old epoch remain
        // readable until the round settles.
        let current_result = inner
            .master_key
            .as_ref()
            .ok_or(SessionError::WrongState { state: "Active" })
            .map(|m| open_frame(m.as_bytes(), raw));
        let (decoded, used_previous) = match current_result {
            Ok(Ok(decoded)) => (Some(decoded), false),
            _ => match &inner.previous_master {
                Some((_, prev)) if inner.state == SessionState::Rekeying => {
                    match open_frame(prev.as_bytes(), raw) {
                        Ok(decoded) => (Some(decoded), true),
                        Err(_) => (None, false),
                    }
                }
                _ => (None, false),
            },
        };

        let decoded = match decoded {
            Some(decoded) => {
                inner.consecutive_crypto_failures = 0;
                decoded
            }
            None => {
                inner.consecutive_crypto_failures += 1;
                warn!(
                    failures = inner.consecutive_crypto_failures,
                    "frame decryption failed"
                );
                if inner.consecutive_crypto_failures >= self.config.rekey.max_consecutive_crypto_failures {
                    drop(inner);
                    self.destroy(DestructionReason::CryptoFailure);
                    return Err(SessionError::Crypto(CryptoError::DecryptionFailed));
                }
                return Err(CryptoError::DecryptionFailed.into());
            }
        };

        let sender_id = header.sender_id;
        let guard = if used_previous {
            inner.previous_replay_guard.as_mut().expect("previous master implies previous replay guard")
        } else {
            &mut inner.replay_guard
        };
        if !guard.check_and_update(sender_id, header.sequence, header.epoch, &header.nonce) {
            debug!(sequence = header.sequence, "dropped replayed frame");
            return Ok(None);
        }

        let sender = ParticipantId::from_bytes(sender_id);
        inner.messages_since_rekey += 1;
        let message = Message {
            sender_id: sender,
            sequence: header.sequence,
            epoch: header.epoch,
            content_type: decoded.content_type,
            payload: decoded.payload.clone(),
            received_at: Instant::now(),
        };
        inner.buffer.insert(message);

        let stats = BufferStats {
            message_count: inner.buffer.len(),
            total_bytes: inner.buffer.total_bytes(),
            participant_count: inner.participant_count,
        };
        let should_close = self.capacity_monitor.should_close(&stats);
        drop(inner);

        if let Some(observer) = &self.observer {
            observer.on_message(&Message {
                sender_id: sender,
                sequence: header.sequence,
                epoch: header.epoch,
                content_type: decoded.content_type,
                payload: decoded.payload.clone(),
                received_at: Instant::now(),
            });
        }

        if should_close {
            self.destroy(DestructionReason::CapacityExceeded);
            return Ok(None);
        }

        Ok(Some(InboundMessage {
            sender_id: sender,
            sequence: header.sequence,
            epoch: header.epoch,
            content_type: decoded.content_type,
            payload: decoded.payload,
        }))
    }

    /// Record that `count` participants currently exist, for capacity
    /// evaluation.
    pub fn set_participant_count(&self, count: usize) {
        self.inner.lock().unwrap().participant_count = count;
    }

    /// Drop all replay-guard state for one sender, e.g. on participant
    /// removal.
    pub fn forget_sender(&self, sender_id: ParticipantId) {
        self.inner
            .lock()
            .unwrap()
            .replay_guard
            .remove_sender(&sender_id.as_bytes());
    }

    /// Purge expired buffered messages. Called on the periodic buffer
    /// timer.
    pub fn purge_expired_messages(&self) {
        self.inner.lock().unwrap().buffer.purge_expired(Instant::now());
    }

    /// Evict the older half of the buffer under host memory pressure.
    pub fn evict_older_half(&self) {
        self.inner.lock().unwrap().buffer.evict_older_half();
    }

    /// Idempotently tear the session down with `reason`.
    pub fn destroy(&self, reason: DestructionReason) {
        let already_destroyed = {
            let mut inner = self.inner.lock().unwrap();
            if inner.state.is_destroyed() {
                true
            } else {
                if let Some(master) = inner.master_key.as_mut() {
                    master.wipe();
                }
                if let Some((_, master)) = inner.previous_master.as_mut() {
                    master.wipe();
                }
                inner.replay_guard.wipe();
                if let Some(guard) = inner.previous_replay_guard.as_mut() {
                    guard.wipe();
                }
                false
            }
        };
        if already_destroyed {
            return;
        }
        error!(reason = reason.as_wire_str(), "session destroyed");
        self.transition(SessionState::Destroyed(reason));
        if let Some(observer) = &self.observer {
            observer.on_destroyed(reason);
        }
    }

    /// Number of messages currently buffered.
    pub fn buffered_message_count(&self) -> usize {
        self.inner.lock().unwrap().buffer.len()
    }

    /// Tell the observer a participant joined. Held separate from the
    /// `Mutex` so the host/client role wrappers can call it after dropping
    /// their own locks.
    pub fn notify_participant_joined(&self, id: ParticipantId) {
        if let Some(observer) = &self.observer {
            observer.on_participant_joined(id);
        }
    }

    /// Tell the observer a participant left.
    pub fn notify_participant_left(&self, id: ParticipantId) {
        if let Some(observer) = &self.observer {
            observer.on_participant_left(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::config::SessionConfig;

    fn fresh_session() -> Session {
        Session::new(RoomId::generate(), ParticipantId::generate(), SessionConfig::default())
    }

    #[test]
    fn activation_enables_application_traffic() {
        let session = fresh_session();
        assert_eq!(session.state(), SessionState::None);
        session.activate(KeyMaterial::zeroed(32), 1);
        assert_eq!(session.state(), SessionState::Active);
    }

    #[test]
    fn seal_fails_before_activation() {
        let session = fresh_session();
        assert!(session.seal_application_message(content_type::TEXT, b"hi").is_err());
    }

    #[test]
    fn two_party_round_trip() {
        let room = RoomId::generate();
        let master = [0x5Au8; 32];
        let host_id = ParticipantId::generate();
        let client_id = ParticipantId::generate();

        let host = Session::new(room, host_id, SessionConfig::default());
        host.activate(KeyMaterial::from_vec(master.to_vec()), 1);
        let client = Session::new(room, client_id, SessionConfig::default());
        client.activate(KeyMaterial::from_vec(master.to_vec()), 1);

        let frame = client
            .seal_application_message(content_type::TEXT, b"hello")
            .unwrap();
        let received = host.receive_application_frame(&frame).unwrap().unwrap();
        assert_eq!(received.payload, b"hello");
        assert_eq!(received.sender_id, client_id);
    }

    #[test]
    fn replay_is_dropped_without_error() {
        let room = RoomId::generate();
        let master = [0x5Au8; 32];
        let host = Session::new(room, ParticipantId::generate(), SessionConfig::default());
        host.activate(KeyMaterial::from_vec(master.to_vec()), 1);
        let client = Session::new(room, ParticipantId::generate(), SessionConfig::default());
        client.activate(KeyMaterial::from_vec(master.to_vec()), 1);

        let frame = client
            .seal_application_message(content_type::TEXT, b"hello")
            .unwrap();
        assert!(host.receive_application_frame(&frame).unwrap().is_some());
        assert!(host.receive_application_frame(&frame).unwrap().is_none());
    }

    #[test]
    fn straggler_old_epoch_frame_decrypts_during_rekeying() {
        let room = RoomId::generate();
        let old_master = [0x11u8; 32];
        let new_master = [0x22u8; 32];
        let host = Session::new(room, ParticipantId::generate(), SessionConfig::default());
        let client = Session::new(room, ParticipantId::generate(), SessionConfig::default());
        host.activate(KeyMaterial::from_vec(old_master.to_vec()), 1);
        client.activate(KeyMaterial::from_vec(old_master.to_vec()), 1);

        // Client seals under the old epoch before observing the rekey.
        let stale_frame = client
            .seal_application_message(content_type::TEXT, b"still epoch 1")
            .unwrap();

        assert!(host.begin_rekey());
        host.advance_epoch(KeyMaterial::from_vec(new_master.to_vec()), 2);

        // The host's own sends now use epoch 2...
        let fresh_frame = host
            .seal_application_message(content_type::TEXT, b"epoch 2")
            .unwrap();
        assert_eq!(crate::crypto::framer::parse_header(&fresh_frame).unwrap().epoch, 2);

        // ...but the straggler sealed under epoch 1 still opens.
        let received = host.receive_application_frame(&stale_frame).unwrap().unwrap();
        assert_eq!(received.payload, b"still epoch 1");
        assert_eq!(received.epoch, 1);

        host.finish_rekey();
        assert_eq!(host.state(), SessionState::Active);
    }

    #[test]
    fn destroy_is_idempotent_and_wipes_state() {
        let session = fresh_session();
        session.activate(KeyMaterial::zeroed(32), 1);
        session.destroy(DestructionReason::UserExit);
        session.destroy(DestructionReason::UserExit);
        assert!(matches!(session.state(), SessionState::Destroyed(DestructionReason::UserExit)));
        assert!(session.seal_application_message(content_type::TEXT, b"x").is_err());
    }

    #[test]
    fn consecutive_crypto_failures_destroy_session() {
        let room = RoomId::generate();
        let host = Session::new(room, ParticipantId::generate(), SessionConfig::default());
        host.activate(KeyMaterial::from_vec(vec![1u8; 32]), 1);
        let bad_frame = seal_frame(&[2u8; 32], 1, 0, [9u8; 16], content_type::TEXT, b"x").unwrap();

        for _ in 0..SessionConfig::default().rekey.max_consecutive_crypto_failures {
            let _ = host.receive_application_frame(&bad_frame);
        }
        assert!(matches!(
            host.state(),
            SessionState::Destroyed(DestructionReason::CryptoFailure)
        ));
    }
}
