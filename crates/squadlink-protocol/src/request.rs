//! Closed set of requests, decoded once from an `Envelope`.
//!
//! Every structural kind validates its payload here; handlers downstream
//! never look at raw payload keys. Unrecognised kinds are relay traffic.

use crate::messages::{field, kind, Envelope, NetworkType, Payload, Visibility};
use crate::{PeerId, ProtocolError, SquadId};

/// Selection applied to a store listing. Patterns are regular expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListFilter {
    All,
    ById(String),
    ByName(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Session handshake; carries nothing beyond `from`.
    Init,
    /// Opaque message for another peer.
    Forward {
        kind: String,
        to: PeerId,
        payload: Payload,
    },
    /// Peers that currently hold a live session.
    ListOnlinePeers { limit: Option<usize> },
    /// Registered peer records.
    ListPeers { filter: ListFilter, last_index: usize },
    CreatePeer {
        peer_id: PeerId,
        public_key: String,
        name: String,
    },
    AuthInit { peer_id: PeerId },
    AuthVerify { peer_id: PeerId, proof: String },
    CreateSquad {
        squad_id: SquadId,
        name: String,
        network_type: NetworkType,
        visibility: Visibility,
        password: String,
        host: Option<PeerId>,
    },
    ModifySquad {
        squad_id: SquadId,
        name: String,
        visibility: Visibility,
        password: String,
    },
    DeleteSquad { squad_id: SquadId },
    JoinSquad {
        squad_id: SquadId,
        password: String,
        network_type: Option<NetworkType>,
    },
    LeaveSquad {
        squad_id: SquadId,
        network_type: Option<NetworkType>,
    },
    ListSquads {
        network_type: NetworkType,
        filter: ListFilter,
        last_index: usize,
    },
    SquadsByOwner { owner: PeerId, last_index: usize },
    UpdateSquadName { squad_id: SquadId, name: String },
    UpdateSquadPassword { squad_id: SquadId, password: String },
    AuthorizeMember { squad_id: SquadId, peer_id: PeerId },
}

impl Request {
    pub fn decode(env: &Envelope) -> Result<Request, ProtocolError> {
        let p = &env.payload;
        let request = match env.kind.as_str() {
            kind::INIT => Request::Init,
            kind::LIST_PEER => Request::ListOnlinePeers {
                limit: optional_index(p, field::LIMIT)?,
            },
            kind::LIST_PEERS => Request::ListPeers {
                filter: ListFilter::All,
                last_index: last_index(p)?,
            },
            kind::LIST_PEERS_BY_ID => Request::ListPeers {
                filter: ListFilter::ById(required(p, field::PEER_ID)?),
                last_index: last_index(p)?,
            },
            kind::LIST_PEERS_BY_NAME => Request::ListPeers {
                filter: ListFilter::ByName(required(p, field::PEER_NAME)?),
                last_index: last_index(p)?,
            },
            kind::CREATE_PEER => Request::CreatePeer {
                peer_id: required(p, field::PEER_ID)?,
                public_key: required(p, field::PEER_KEY)?,
                name: required(p, field::PEER_NAME)?,
            },
            kind::PEER_AUTH_INIT => Request::AuthInit {
                peer_id: required(p, field::PEER_ID)?,
            },
            kind::PEER_AUTH_VERIFY => Request::AuthVerify {
                peer_id: required(p, field::PEER_ID)?,
                proof: required(p, field::TOKEN)?,
            },
            kind::CREATE_SQUAD => {
                let network_type = network(p, field::SQUAD_NETWORK_TYPE)?;
                let host = match network_type {
                    NetworkType::Hosted => Some(required(p, field::SQUAD_HOST)?),
                    NetworkType::Mesh => None,
                };
                Request::CreateSquad {
                    squad_id: required(p, field::SQUAD_ID)?,
                    name: required(p, field::SQUAD_NAME)?,
                    network_type,
                    visibility: required(p, field::SQUAD_TYPE)?.parse()?,
                    password: optional(p, field::PASSWORD).unwrap_or_default(),
                    host,
                }
            }
            kind::MODIFY_SQUAD => Request::ModifySquad {
                squad_id: required(p, field::SQUAD_ID)?,
                name: required(p, field::SQUAD_NAME)?,
                visibility: required(p, field::SQUAD_TYPE)?.parse()?,
                password: optional(p, field::PASSWORD).unwrap_or_default(),
            },
            kind::DELETE_SQUAD => Request::DeleteSquad {
                squad_id: required(p, field::SQUAD_ID)?,
            },
            kind::JOIN_SQUAD => Request::JoinSquad {
                squad_id: required(p, field::SQUAD_ID)?,
                password: optional(p, field::PASSWORD).unwrap_or_default(),
                network_type: optional_network(p, field::NETWORK_TYPE)?,
            },
            kind::LEAVE_SQUAD => Request::LeaveSquad {
                squad_id: required(p, field::SQUAD_ID)?,
                network_type: optional_network(p, field::SQUAD_NETWORK_TYPE)?,
            },
            kind::LIST_SQUADS => Request::ListSquads {
                network_type: network(p, field::NETWORK_TYPE)?,
                filter: ListFilter::All,
                last_index: last_index(p)?,
            },
            kind::LIST_SQUADS_BY_ID => Request::ListSquads {
                network_type: network(p, field::NETWORK_TYPE)?,
                filter: ListFilter::ById(required(p, field::SQUAD_ID)?),
                last_index: last_index(p)?,
            },
            kind::LIST_SQUADS_BY_NAME => Request::ListSquads {
                network_type: network(p, field::NETWORK_TYPE)?,
                filter: ListFilter::ByName(required(p, field::SQUAD_NAME)?),
                last_index: last_index(p)?,
            },
            kind::GET_SQUADS_BY_OWNER => Request::SquadsByOwner {
                owner: required(p, field::OWNER)?,
                last_index: last_index(p)?,
            },
            kind::UPDATE_SQUAD_NAME => Request::UpdateSquadName {
                squad_id: required(p, field::SQUAD_ID)?,
                name: required(p, field::SQUAD_NAME)?,
            },
            kind::UPDATE_SQUAD_PASSWORD => Request::UpdateSquadPassword {
                squad_id: required(p, field::SQUAD_ID)?,
                password: required(p, field::PASSWORD)?,
            },
            kind::UPDATE_SQUAD_AUTHORIZED_MEMBERS => Request::AuthorizeMember {
                squad_id: required(p, field::SQUAD_ID)?,
                peer_id: required(p, field::AUTHORIZED_MEMBER)?,
            },
            other => {
                let to = env.target().ok_or(ProtocolError::MissingField(field::TO))?;
                Request::Forward {
                    kind: other.to_string(),
                    to: to.to_string(),
                    payload: env.payload.clone(),
                }
            }
        };
        Ok(request)
    }

    /// True for the variants that need an owner check.
    pub fn is_owner_gated(&self) -> bool {
        matches!(
            self,
            Request::ModifySquad { .. }
                | Request::DeleteSquad { .. }
                | Request::UpdateSquadName { .. }
                | Request::UpdateSquadPassword { .. }
                | Request::AuthorizeMember { .. }
        )
    }
}

fn required(p: &Payload, key: &'static str) -> Result<String, ProtocolError> {
    p.get(key).cloned().ok_or(ProtocolError::MissingField(key))
}

fn optional(p: &Payload, key: &str) -> Option<String> {
    p.get(key).cloned()
}

/// Network type under `key`; a bad value is reported against `key`.
fn network(p: &Payload, key: &'static str) -> Result<NetworkType, ProtocolError> {
    let value = required(p, key)?;
    value
        .parse()
        .map_err(|_| ProtocolError::InvalidField { field: key, value })
}

fn optional_network(p: &Payload, key: &'static str) -> Result<Option<NetworkType>, ProtocolError> {
    match p.get(key) {
        Some(v) if !v.is_empty() => network(p, key).map(Some),
        _ => Ok(None),
    }
}

fn optional_index(p: &Payload, key: &'static str) -> Result<Option<usize>, ProtocolError> {
    match p.get(key) {
        Some(v) => v.parse().map(Some).map_err(|_| ProtocolError::InvalidField {
            field: key,
            value: v.clone(),
        }),
        None => Ok(None),
    }
}

/// Listing offset. Absent means the first page.
fn last_index(p: &Payload) -> Result<usize, ProtocolError> {
    Ok(optional_index(p, field::LAST_INDEX)?.unwrap_or(0))
}
