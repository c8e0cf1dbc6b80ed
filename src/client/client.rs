use std::sync::Arc;
use std::sync::Mutex;

use tracing::{info, warn};

use crate::core::constants::content_type;
use crate::core::error::{HandshakeError, SessionError};
use crate::crypto::handshake::{
    derive_confirm_key, derive_session_key, join_confirm_mac, rekey_confirm_mac,
    unwrap_master_for_join, unwrap_rekey_payload, PerClientRekeyPayload, SessionKey,
};
use crate::crypto::keymaterial::KeyMaterial;
use crate::room::RoomId;
use crate::session::{CapacityMonitor, Observer, Session, SessionConfig};
use crate::wire::{self, ClientMessage, DestructionReason, JoinApproval};

struct ClientState {
    host_public_key: Option<[u8; 32]>,
}

/// The client side of a room: owns the shared crypto/state-machine core and
/// drives the join and per-client rekey exchanges from the client's end.
pub struct Client {
    session: Session,
    state: Mutex<ClientState>,
}

impl Client {
    /// Create a new client session in [`crate::session::SessionState::None`]
    /// for `room_id`, not yet connected to a host.
    pub fn new(room_id: RoomId, config: SessionConfig) -> Self {
        Self {
            session: Session::new(room_id, crate::participant::ParticipantId::generate(), config),
            state: Mutex::new(ClientState { host_public_key: None }),
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

    /// The room this client is joining.
    pub fn room_id(&self) -> RoomId {
        self.session.room_id()
    }

    /// Build the `JOIN_REQUEST` to send to the host, and mark this session
    /// as awaiting approval.
    pub fn join_request(&self, display_name: Option<String>) -> ClientMessage {
        self.session.mark_awaiting_approval();
        ClientMessage::JoinRequest {
            client_public_key: wire::encode_binary(&self.session.local_public_key()),
            display_name,
        }
    }

    /// Handle an inbound `JOIN_APPROVED`: unwrap the master key, activate
    /// the session, and return the `JOIN_CONFIRM` to send back.
    pub fn handle_join_approved(
        &self,
        approval: &JoinApproval,
    ) -> Result<ClientMessage, HandshakeError> {
        let host_public_key = crate::wire::decode_binary(&approval.host_public_key)
            .map_err(|_| HandshakeError::MalformedPublicKey)?;
        let host_pub = fixed_32(&host_public_key)?;
        let client_pub = self.session.local_public_key();

        let shared = self.session.local_dh(&host_pub);
        let session_key =
            derive_session_key(&shared, self.room_id().as_bytes(), &host_pub, &client_pub)?;

        let wrapped = crate::wire::decode_binary(&approval.wrapped_master)
            .map_err(|_| HandshakeError::MalformedPublicKey)?;
        let master = unwrap_master_for_join(&session_key, &wrapped, approval.epoch)?;

        let mac = join_confirm_mac(&session_key, &client_pub, &host_pub)?;

        self.state.lock().unwrap().host_public_key = Some(host_pub);
        self.session
            .activate(KeyMaterial::from_vec(master.to_vec()), approval.epoch);

        info!("join approved, session active");
        Ok(ClientMessage::JoinConfirm {
            mac: wire::encode_binary(&mac),
        })
    }

    /// The host rejected this client's join request.
    pub fn handle_join_rejected(&self) {
        self.session.destroy(DestructionReason::JoinRejected);
    }

    /// Handle an inbound `REKEY_DIRECT`: open the outer application frame
    /// (still sealed under the epoch the client is currently on), unwrap the
    /// inner per-client payload, switch to the new master, and return the
    /// `REKEY_CONFIRM` to send back.
    pub fn handle_rekey_direct(&self, encrypted_payload: &[u8]) -> Result<ClientMessage, SessionError> {
        let inbound = self
            .session
            .receive_application_frame(encrypted_payload)?
            .ok_or(SessionError::Crypto(crate::core::error::CryptoError::ReplayDetected))?;
        if inbound.content_type != content_type::REKEY_PAYLOAD {
            return Err(SessionError::Handshake(HandshakeError::MalformedPublicKey));
        }
        let payload = PerClientRekeyPayload::from_bytes(&inbound.payload)
            .map_err(SessionError::Handshake)?;

        let shared = self.session.local_dh(&payload.host_eph_pub);
        let room_id = *self.room_id().as_bytes();
        let new_master =
            unwrap_rekey_payload(&shared, &room_id, &payload).map_err(SessionError::Handshake)?;

        let new_client_eph_pub = self.session.rotate_local_ephemeral();
        let confirm_key = derive_confirm_key(&new_master, payload.new_epoch, &payload.confirm_nonce)?;
        let mac = rekey_confirm_mac(
            &confirm_key,
            payload.new_epoch,
            &new_client_eph_pub,
            &payload.confirm_nonce,
            &payload.host_eph_pub,
            &room_id,
        )?;

        self.session
            .advance_epoch(KeyMaterial::from_vec(new_master.to_vec()), payload.new_epoch);
        // Unlike the host, a client tracks only its own single round trip,
        // not a table of pending participants, so the round settles for
        // this endpoint as soon as its confirmation is ready to send.
        self.session.finish_rekey();

        info!(epoch = payload.new_epoch, "rekey applied");
        Ok(ClientMessage::RekeyConfirm {
            epoch: payload.new_epoch,
            new_client_eph_pub: wire::encode_binary(&new_client_eph_pub),
            confirm_nonce: wire::encode_binary(&payload.confirm_nonce),
            mac: wire::encode_binary(&mac),
        })
    }

    /// This client was kicked or the room closed.
    pub fn handle_destroyed(&self, reason: DestructionReason) {
        warn!(reason = reason.as_wire_str(), "session ended by host/relay");
        self.session.destroy(reason);
    }
}

fn fixed_32(bytes: &[u8]) -> Result<[u8; 32], HandshakeError> {
    if bytes.len() != 32 {
        return Err(HandshakeError::MalformedPublicKey);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Host;

    fn decode_fixed_32(s: &str) -> [u8; 32] {
        fixed_32(&wire::decode_binary(s).unwrap()).unwrap()
    }

    #[test]
    fn join_round_trip_activates_both_sides() {
        let room = RoomId::generate();
        let host = Host::new(room, SessionConfig::default());
        let client = Client::new(room, SessionConfig::default());

        let request = client.join_request(Some("alice".into()));
        let (client_pub, display_name) = match request {
            ClientMessage::JoinRequest { client_public_key, display_name } => {
                (decode_fixed_32(&client_public_key), display_name)
            }
            _ => panic!("wrong variant"),
        };

        let approval = host
            .handle_join_request("relay-1".into(), client_pub, display_name)
            .unwrap();
        let confirm = client.handle_join_approved(&approval).unwrap();
        let mac = match confirm {
            ClientMessage::JoinConfirm { mac } => decode_fixed_32(&mac),
            _ => panic!("wrong variant"),
        };

        host.handle_join_confirm("relay-1", &mac).unwrap();

        assert_eq!(host.session().state(), client.session().state());
        assert_eq!(client.session().epoch(), host.session().epoch());
    }

    #[test]
    fn rekey_round_trip_lands_both_sides_on_new_epoch() {
        let room = RoomId::generate();
        let host = Host::new(room, SessionConfig::default());
        let client = Client::new(room, SessionConfig::default());

        let request = client.join_request(None);
        let client_pub = match &request {
            ClientMessage::JoinRequest { client_public_key, .. } => decode_fixed_32(client_public_key),
            _ => panic!("wrong variant"),
        };
        let approval = host.handle_join_request("relay-1".into(), client_pub, None).unwrap();
        let confirm = client.handle_join_approved(&approval).unwrap();
        let mac = match confirm {
            ClientMessage::JoinConfirm { mac } => decode_fixed_32(&mac),
            _ => panic!("wrong variant"),
        };
        host.handle_join_confirm("relay-1", &mac).unwrap();

        let rekey_messages = host.initiate_rekey().unwrap();
        assert_eq!(rekey_messages.len(), 1);
        let (_, message) = &rekey_messages[0];
        let encrypted_payload = match message {
            crate::wire::HostMessage::RekeyDirect { encrypted_payload, .. } => {
                wire::decode_binary(encrypted_payload).unwrap()
            }
            _ => panic!("wrong variant"),
        };

        let client_confirm = client.handle_rekey_direct(&encrypted_payload).unwrap();
        let (epoch, new_client_eph_pub, confirm_nonce, mac) = match client_confirm {
            ClientMessage::RekeyConfirm { epoch, new_client_eph_pub, confirm_nonce, mac } => (
                epoch,
                decode_fixed_32(&new_client_eph_pub),
                {
                    let bytes = wire::decode_binary(&confirm_nonce).unwrap();
                    let mut out = [0u8; 16];
                    out.copy_from_slice(&bytes);
                    out
                },
                decode_fixed_32(&mac),
            ),
            _ => panic!("wrong variant"),
        };

        host.handle_rekey_confirm("relay-1", epoch, new_client_eph_pub, confirm_nonce, mac)
            .unwrap();

        assert_eq!(client.session().epoch(), 2);
        assert_eq!(host.session().epoch(), 2);
        assert_eq!(host.session().state(), crate::session::SessionState::Active);
        assert_eq!(client.session().state(), crate::session::SessionState::Active);
    }
}
