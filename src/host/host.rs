use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rand::RngCore;
use tracing::{info, warn};

use crate::core::constants::content_type;
use crate::core::error::{HandshakeError, SessionError};
use crate::crypto::handshake::{
    derive_confirm_key, derive_rekey_wrap_key, derive_session_key, verify_join_confirm,
    verify_rekey_confirm, wrap_master_for_join, wrap_rekey_payload,
};
use crate::crypto::keymaterial::KeyMaterial;
use crate::participant::{Participant, ParticipantId, PendingJoin, PendingRekeyConfirm};
use crate::room::RoomId;
use crate::session::{CapacityMonitor, Observer, Session, SessionConfig, SessionState};
use crate::transport::RekeyDriver;
use crate::wire::{self, DestructionReason, HostMessage, JoinApproval};

struct HostState {
    master_key: KeyMaterial,
    epoch: u32,
    participants: HashMap<ParticipantId, Participant>,
    pending_joins: HashMap<String, PendingJoin>,
    pending_rekeys: HashMap<String, PendingRekeyConfirm>,
}

fn fixed_32(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(bytes);
    out
}

/// The host side of a room: owns the shared crypto/state-machine core and
/// adds the bookkeeping only a host needs (the participant table, pending
/// joins, and in-flight rekey confirmations).
pub struct Host {
    session: Session,
    state: Mutex<HostState>,
}

impl Host {
    /// Create a new room. Mints the room's first master key and epoch
    /// (epoch 1) immediately, so the first `JOIN_REQUEST` can be approved
    /// before any client has confirmed.
    pub fn new(room_id: RoomId, config: SessionConfig) -> Self {
        let local_id = ParticipantId::generate();
        let session = Session::new(room_id, local_id, config);
        session.mark_creating();
        session.mark_created();
        session.mark_open();

        let mut master_bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut master_bytes);

        Self {
            session,
            state: Mutex::new(HostState {
                master_key: KeyMaterial::from_vec(master_bytes.to_vec()),
                epoch: 1,
                participants: HashMap::new(),
                pending_joins: HashMap::new(),
                pending_rekeys: HashMap::new(),
            }),
        }
    }

    /// Attach an observer for lifecycle/message notifications.
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.session = self.session.with_observer(observer);
        self
    }

    /// Attach a capacity monitor.
    pub fn with_capacity_monitor(mut self, monitor: Arc<dyn CapacityMonitor>) -> Self {
        self.session = self.session.with_capacity_monitor(monitor);
        self
    }

    /// The shared session core, for sealing/opening application frames and
    /// reading lifecycle state.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The room id clients join.
    pub fn room_id(&self) -> RoomId {
        self.session.room_id()
    }

    /// The host's current public key, as advertised in `ROOM_OPEN` and used
    /// for join key agreement.
    pub fn public_key(&self) -> [u8; 32] {
        self.session.local_public_key()
    }

    /// Number of approved participants.
    pub fn participant_count(&self) -> usize {
        self.state.lock().unwrap().participants.len()
    }

    /// Handle an inbound `JOIN_REQUEST`. A duplicate request from the same
    /// `relay_client_id` replaces any prior pending entry.
    pub fn handle_join_request(
        &self,
        relay_client_id: String,
        client_public_key: [u8; 32],
        display_name: Option<String>,
    ) -> Result<JoinApproval, SessionError> {
        let host_pub = self.public_key();
        let shared = self.session.local_dh(&client_public_key);
        let session_key = derive_session_key(&shared, self.room_id().as_bytes(), &host_pub, &client_public_key)?;

        let participant_id = ParticipantId::generate();
        let (master, epoch) = {
            let state = self.state.lock().unwrap();
            (fixed_32(state.master_key.as_bytes()), state.epoch)
        };
        let wrapped = wrap_master_for_join(&session_key, &master, epoch)?;

        self.state.lock().unwrap().pending_joins.insert(
            relay_client_id,
            PendingJoin {
                client_public_key,
                display_name,
                participant_id,
            },
        );

        Ok(JoinApproval {
            host_public_key: wire::encode_binary(&host_pub),
            wrapped_master: wire::encode_binary(&wrapped),
            epoch,
            participant_id: participant_id.to_string(),
        })
    }

    /// Handle an inbound `JOIN_CONFIRM`. On success the participant is
    /// inserted into the live table and, if this is the first confirmed
    /// join, the session becomes `Active`.
    pub fn handle_join_confirm(
        &self,
        relay_client_id: &str,
        mac: &[u8; 32],
    ) -> Result<ParticipantId, HandshakeError> {
        let pending = self
            .state
            .lock()
            .unwrap()
            .pending_joins
            .remove(relay_client_id)
            .ok_or(HandshakeError::NoPendingConfirm)?;

        let host_pub = self.public_key();
        let shared = self.session.local_dh(&pending.client_public_key);
        let session_key =
            derive_session_key(&shared, self.room_id().as_bytes(), &host_pub, &pending.client_public_key)?;

        if let Err(err) = verify_join_confirm(&session_key, &pending.client_public_key, &host_pub, mac) {
            warn!(client = relay_client_id, "join confirm MAC mismatch, dropping");
            return Err(err);
        }

        let participant = Participant::new(
            pending.participant_id,
            relay_client_id.to_string(),
            pending.client_public_key,
            pending.display_name,
        );

        let (was_first, count) = {
            let mut state = self.state.lock().unwrap();
            state.participants.insert(pending.participant_id, participant);
            (self.session.state() == SessionState::Open, state.participants.len())
        };
        self.session.set_participant_count(count);

        if was_first {
            let (master_bytes, epoch) = {
                let state = self.state.lock().unwrap();
                (state.master_key.as_bytes().to_vec(), state.epoch)
            };
            self.session.activate(KeyMaterial::from_vec(master_bytes), epoch);
        }

        info!(client = relay_client_id, "participant joined");
        self.session.notify_participant_joined(pending.participant_id);
        Ok(pending.participant_id)
    }

    /// Reject a pending join without touching any other state.
    pub fn reject_join(&self, relay_client_id: &str) {
        self.state.lock().unwrap().pending_joins.remove(relay_client_id);
    }

    /// Remove a participant (departure or kick). Triggers a rekey if the
    /// session is active and other participants remain.
    pub fn remove_participant(&self, participant_id: ParticipantId) -> Option<Vec<(String, HostMessage)>> {
        let had_others = {
            let mut state = self.state.lock().unwrap();
            let Some(participant) = state.participants.remove(&participant_id) else {
                return None;
            };
            state.pending_rekeys.remove(&participant.relay_client_id);
            !state.participants.is_empty()
        };
        self.session.forget_sender(participant_id);
        self.session.set_participant_count(self.participant_count());
        self.session.notify_participant_left(participant_id);

        if had_others && self.session.state() == SessionState::Active {
            self.initiate_rekey()
        } else {
            None
        }
    }

    /// Kick a participant: same as [`Self::remove_participant`], for
    /// callers that need to distinguish "kicked" from "left" only to decide
    /// whether to emit a `KICK` frame first (the caller's responsibility).
    pub fn kick(&self, participant_id: ParticipantId) -> Option<Vec<(String, HostMessage)>> {
        self.remove_participant(participant_id)
    }

    /// Begin a rekey round. Returns one `REKEY_DIRECT` message per current
    /// participant, or `None` if a rekey is already in progress, the
    /// session is not `Active`, or there are no participants to rekey.
    pub fn initiate_rekey(&self) -> Option<Vec<(String, HostMessage)>> {
        let targets: Vec<(String, ParticipantId, [u8; 32])> = {
            let state = self.state.lock().unwrap();
            state
                .participants
                .values()
                .map(|p| (p.relay_client_id.clone(), p.id, p.public_key))
                .collect()
        };
        if targets.is_empty() {
            return None;
        }
        if !self.session.begin_rekey() {
            return None;
        }

        let mut new_master = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut new_master);
        let new_epoch = {
            let state = self.state.lock().unwrap();
            state.epoch.wrapping_add(1)
        };
        let host_eph_pub = self.session.rotate_local_ephemeral();
        let room_id = *self.room_id().as_bytes();

        let mut out = Vec::with_capacity(targets.len());
        {
            let mut state = self.state.lock().unwrap();
            state.pending_rekeys.clear();
            for (relay_client_id, _id, client_pub) in &targets {
                let mut confirm_nonce = [0u8; 16];
                rand::rngs::OsRng.fill_bytes(&mut confirm_nonce);
                let shared = self.session.local_dh(client_pub);
                let wrap_k = match derive_rekey_wrap_key(&shared, &room_id, new_epoch, &confirm_nonce) {
                    Ok(k) => k,
                    Err(_) => continue,
                };
                let payload = match wrap_rekey_payload(&wrap_k, new_epoch, host_eph_pub, &new_master, confirm_nonce) {
                    Ok(p) => p,
                    Err(_) => continue,
                };

                // Sealed under the *current* (pre-rekey) epoch: the outer
                // wrap must still be decryptable by a client that has not
                // yet seen this rekey round.
                let frame = match self.session.seal_application_message(content_type::REKEY_PAYLOAD, &payload.to_bytes()) {
                    Ok(frame) => frame,
                    Err(_) => continue,
                };

                state.pending_rekeys.insert(
                    relay_client_id.clone(),
                    PendingRekeyConfirm {
                        epoch: new_epoch,
                        confirm_nonce,
                        host_eph_pub,
                        created_at: std::time::Instant::now(),
                    },
                );
                out.push((
                    relay_client_id.clone(),
                    HostMessage::RekeyDirect {
                        client_id: relay_client_id.clone(),
                        encrypted_payload: wire::encode_binary(&frame),
                    },
                ));
            }
            state.master_key = KeyMaterial::from_vec(new_master.to_vec());
            state.epoch = new_epoch;
        }

        // Switch to the new epoch for the host's own outbound sends only
        // after every per-client payload has been sealed under the old one.
        self.session.advance_epoch(KeyMaterial::from_vec(new_master.to_vec()), new_epoch);

        info!(participants = out.len(), epoch = new_epoch, "rekey initiated");
        Some(out)
    }

    /// Handle an inbound `REKEY_CONFIRM`. On any mismatch the confirmation
    /// is dropped without mutating state; the participant is not ejected.
    pub fn handle_rekey_confirm(
        &self,
        relay_client_id: &str,
        epoch: u32,
        new_client_eph_pub: [u8; 32],
        confirm_nonce: [u8; 16],
        mac: [u8; 32],
    ) -> Result<(), HandshakeError> {
        let pending = {
            let state = self.state.lock().unwrap();
            state.pending_rekeys.get(relay_client_id).cloned()
        }
        .ok_or(HandshakeError::NoPendingConfirm)?;

        if pending.epoch != epoch || pending.confirm_nonce != confirm_nonce {
            warn!(client = relay_client_id, "rekey confirm epoch/nonce mismatch, dropping");
            return Err(HandshakeError::ConfirmMismatch);
        }

        let new_master = fixed_32(self.state.lock().unwrap().master_key.as_bytes());
        let confirm_key = derive_confirm_key(&new_master, epoch, &confirm_nonce)?;

        let room_id = *self.room_id().as_bytes();
        if verify_rekey_confirm(
            &confirm_key,
            epoch,
            &new_client_eph_pub,
            &confirm_nonce,
            &pending.host_eph_pub,
            &room_id,
            &mac,
        )
        .is_err()
        {
            warn!(client = relay_client_id, "rekey confirm MAC mismatch, dropping");
            return Err(HandshakeError::MacMismatch);
        }

        let remaining = {
            let mut state = self.state.lock().unwrap();
            state.pending_rekeys.remove(relay_client_id);
            if let Some(participant) = state
                .participants
                .values_mut()
                .find(|p| p.relay_client_id == relay_client_id)
            {
                participant.public_key = new_client_eph_pub;
            }
            state.pending_rekeys.len()
        };
        if remaining == 0 {
            self.session.finish_rekey();
        }
        Ok(())
    }

    /// Drop any pending rekey confirmations that have outlived the
    /// configured timeout. The confirmation, if it arrives later, is simply
    /// unmatched and dropped by [`Self::handle_rekey_confirm`]. If this
    /// empties the pending set, the rekey round is considered settled.
    pub fn expire_pending_rekeys(&self, timeout: std::time::Duration) {
        let remaining = {
            let mut state = self.state.lock().unwrap();
            state
                .pending_rekeys
                .retain(|_, pending| pending.created_at.elapsed() < timeout);
            state.pending_rekeys.len()
        };
        if remaining == 0 && self.session.state() == SessionState::Rekeying {
            self.session.finish_rekey();
        }
    }

    /// Close the room.
    pub fn close(&self, reason: DestructionReason) {
        self.session.destroy(reason);
    }
}

impl RekeyDriver for Host {
    fn poll_rekey(&self, transport: &dyn crate::transport::Transport) {
        if !self.session.should_rekey() {
            return;
        }
        let Some(messages) = self.initiate_rekey() else {
            return;
        };
        for (relay_client_id, message) in messages {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(err) => {
                    warn!(client = relay_client_id, error = %err, "failed to encode rekey direct message");
                    continue;
                }
            };
            if let Err(err) = transport.send_text(&text) {
                warn!(client = relay_client_id, error = %err, "failed to send rekey direct message");
            }
        }
    }

    fn sweep_pending_rekeys(&self) {
        self.expire_pending_rekeys(self.session.config().rekey.confirm_timeout);
    }
}
