//! Request dispatch shared by live sessions and the HTTP endpoint.

use serde_json::json;
use squadlink_protocol::{field, Envelope, ProtocolError, Request, ServerMessage};
use squadlink_storage::PeerRecord;

use crate::error::{HubError, Result};
use crate::squads::NewSquad;
use crate::Hub;

/// Who a request acts for.
#[derive(Debug, Clone, Copy)]
pub struct Caller<'a> {
    pub peer_id: &'a str,
    pub token: &'a str,
    /// True when the request arrived on a registered session.
    pub bound: bool,
}

impl<'a> Caller<'a> {
    /// Message on a live session. The registered id is the acting id.
    pub fn session(peer_id: &'a str, token: &'a str) -> Self {
        Self {
            peer_id,
            token,
            bound: true,
        }
    }

    /// One-shot request with no session behind it.
    pub fn detached(env: &'a Envelope) -> Self {
        Self {
            peer_id: &env.from,
            token: &env.token,
            bound: false,
        }
    }
}

/// Requests that act as `from` and so need one.
fn acts_as_peer(request: &Request) -> bool {
    matches!(
        request,
        Request::CreateSquad { .. }
            | Request::ModifySquad { .. }
            | Request::DeleteSquad { .. }
            | Request::JoinSquad { .. }
            | Request::LeaveSquad { .. }
            | Request::UpdateSquadName { .. }
            | Request::UpdateSquadPassword { .. }
            | Request::AuthorizeMember { .. }
    )
}

impl Hub {
    /// Decode and handle one envelope. `Ok(None)` means no reply is owed
    /// (relayed traffic).
    pub async fn handle_envelope(&self, caller: &Caller<'_>, env: &Envelope) -> Result<Option<ServerMessage>> {
        let request = Request::decode(env)?;
        self.handle(caller, &env.kind, request).await
    }

    pub async fn handle(&self, caller: &Caller<'_>, kind: &str, request: Request) -> Result<Option<ServerMessage>> {
        if !caller.bound {
            if matches!(request, Request::Init | Request::Forward { .. }) {
                return Err(HubError::SessionRequired(kind.to_string()));
            }
            if request.is_owner_gated() && !self.auth.check_ownership(caller.token, caller.peer_id).await {
                return Err(HubError::InvalidToken);
            }
        }
        if caller.peer_id.is_empty() && acts_as_peer(&request) {
            return Err(ProtocolError::MissingField("from").into());
        }

        let acting = caller.peer_id;
        let reply = match request {
            Request::Init => ServerMessage::ok(kind).with(field::ID, acting),

            Request::Forward { kind, to, payload } => {
                if let Err(e) = self.relay.forward(acting, &to, &kind, payload).await {
                    tracing::debug!(from = %acting, to = %to, error = %e, "relay: forward failed");
                }
                return Ok(None);
            }

            Request::ListOnlinePeers { limit } => {
                let ids = self
                    .directory
                    .list(limit.unwrap_or(self.settings.page_size))
                    .await;
                ServerMessage::ok(kind).with_data(json!(ids))
            }

            Request::ListPeers { filter, last_index } => {
                let peers = self.peers.list(filter, last_index).await?;
                ServerMessage::ok(kind).with_data(json!(peers))
            }

            Request::CreatePeer {
                peer_id,
                public_key,
                name,
            } => {
                self.peers
                    .create(PeerRecord {
                        id: peer_id.clone(),
                        name,
                        pub_key: public_key,
                    })
                    .await?;
                ServerMessage::ok(kind).with(field::PEER_ID, peer_id)
            }

            Request::AuthInit { peer_id } => {
                let record = self.peers.get(&peer_id).await?;
                let sealed = self.auth.begin_challenge(&peer_id, &record.pub_key).await?;
                ServerMessage::ok(kind)
                    .with(field::PEER_ID, peer_id)
                    .with(field::TOKEN, sealed)
            }

            Request::AuthVerify { peer_id, proof } => {
                self.auth.verify_challenge(&peer_id, &proof).await?;
                ServerMessage::ok(kind)
                    .with(field::PEER_ID, peer_id)
                    .with(field::TOKEN, proof)
            }

            Request::CreateSquad {
                squad_id,
                name,
                network_type,
                visibility,
                password,
                host,
            } => {
                let record = self
                    .squads
                    .create(
                        acting,
                        NewSquad {
                            id: squad_id.clone(),
                            name,
                            network_type,
                            visibility,
                            password,
                            host,
                        },
                    )
                    .await?;
                ServerMessage::ok(kind)
                    .with(field::SQUAD_ID, squad_id)
                    .with_data(json!(record))
            }

            Request::ModifySquad {
                squad_id,
                name,
                visibility,
                password,
            } => {
                self.squads
                    .modify(&squad_id, acting, name, visibility, password)
                    .await?;
                ServerMessage::ok(kind).with(field::SQUAD_ID, squad_id)
            }

            Request::DeleteSquad { squad_id } => {
                self.squads.delete(&squad_id, acting).await?;
                ServerMessage::ok(kind).with(field::SQUAD_ID, squad_id)
            }

            Request::JoinSquad {
                squad_id,
                password,
                network_type,
            } => {
                self.squads
                    .connect(&squad_id, acting, password, caller.token, network_type)
                    .await?;
                ServerMessage::ok(kind).with(field::SQUAD_ID, squad_id)
            }

            Request::LeaveSquad {
                squad_id,
                network_type,
            } => {
                self.squads.leave(&squad_id, acting, network_type).await?;
                ServerMessage::ok(kind).with(field::SQUAD_ID, squad_id)
            }

            Request::ListSquads {
                network_type,
                filter,
                last_index,
            } => {
                let squads = self.squads.list(network_type, filter, last_index).await?;
                ServerMessage::ok(kind).with_data(json!(squads))
            }

            Request::SquadsByOwner { owner, last_index } => {
                let squads = self.squads.by_owner(caller.token, &owner, last_index).await?;
                ServerMessage::ok(kind).with_data(json!(squads))
            }

            Request::UpdateSquadName { squad_id, name } => {
                self.squads.update_name(&squad_id, acting, name).await?;
                ServerMessage::ok(kind).with(field::SQUAD_ID, squad_id)
            }

            Request::UpdateSquadPassword { squad_id, password } => {
                self.squads.update_password(&squad_id, acting, password).await?;
                ServerMessage::ok(kind).with(field::SQUAD_ID, squad_id)
            }

            Request::AuthorizeMember { squad_id, peer_id } => {
                self.squads
                    .authorize_member(&squad_id, acting, &peer_id)
                    .await?;
                ServerMessage::ok(kind)
                    .with(field::SQUAD_ID, squad_id)
                    .with(field::AUTHORIZED_MEMBER, peer_id)
            }
        };
        Ok(Some(reply))
    }
}
