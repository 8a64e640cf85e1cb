//! Message types for the relay hub.
//!
//! Inbound traffic on every transport is an `Envelope`; everything the hub
//! writes back (replies, relayed messages, membership events) is a
//! `ServerMessage`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::ProtocolError;

/// String-to-string payload carried by every message.
pub type Payload = BTreeMap<String, String>;

/// Message kinds understood by the hub. Anything else is relayed.
pub mod kind {
    pub const INIT: &str = "init";
    pub const LIST_PEER: &str = "list_peer";
    pub const LIST_PEERS: &str = "list_peers";
    pub const LIST_PEERS_BY_ID: &str = "list_peers_by_id";
    pub const LIST_PEERS_BY_NAME: &str = "list_peers_by_name";
    pub const CREATE_PEER: &str = "create_peer";
    pub const PEER_AUTH_INIT: &str = "peer_auth_init";
    pub const PEER_AUTH_VERIFY: &str = "peer_auth_verify";
    pub const CREATE_SQUAD: &str = "create_squad";
    pub const MODIFY_SQUAD: &str = "modify_squad";
    pub const DELETE_SQUAD: &str = "delete_squad";
    pub const JOIN_SQUAD: &str = "join_squad";
    pub const LEAVE_SQUAD: &str = "leave_squad";
    pub const LIST_SQUADS: &str = "list_squads";
    pub const LIST_SQUADS_BY_ID: &str = "list_squads_by_id";
    pub const LIST_SQUADS_BY_NAME: &str = "list_squads_by_name";
    pub const GET_SQUADS_BY_OWNER: &str = "get_squads_by_owner";
    pub const UPDATE_SQUAD_NAME: &str = "update_squad_name";
    pub const UPDATE_SQUAD_PASSWORD: &str = "update_squad_password";
    pub const UPDATE_SQUAD_AUTHORIZED_MEMBERS: &str = "update_squad_authorized_members";
}

/// Membership events pushed to squad members.
pub mod event {
    pub const INCOMING_MEMBER: &str = "incoming_member";
    pub const HOSTED_INCOMING_MEMBER: &str = "hosted_incoming_member";
    pub const LEAVING_MEMBER: &str = "leaving_member";
    pub const HOSTED_LEAVING_MEMBER: &str = "hosted_leaving_member";
}

/// Payload keys.
pub mod field {
    pub const TO: &str = "to";
    pub const ID: &str = "id";
    pub const LAST_INDEX: &str = "lastIndex";
    pub const LIMIT: &str = "limit";
    pub const PEER_ID: &str = "peerId";
    pub const PEER_NAME: &str = "peerName";
    pub const PEER_KEY: &str = "peerKey";
    pub const OWNER: &str = "owner";
    pub const SQUAD_ID: &str = "squadId";
    pub const SQUAD_NAME: &str = "squadName";
    pub const SQUAD_TYPE: &str = "squadType";
    pub const SQUAD_HOST: &str = "squadHost";
    pub const SQUAD_NETWORK_TYPE: &str = "squadNetworkType";
    pub const NETWORK_TYPE: &str = "networkType";
    pub const PASSWORD: &str = "password";
    pub const TOKEN: &str = "token";
    pub const AUTHORIZED_MEMBER: &str = "authorizedMember";
}

/// Client-to-hub message, identical on both transports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub payload: Payload,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            from: from.into(),
            ..Default::default()
        }
    }

    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to = to.into();
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    /// Relay target: `to`, or `payload.to` for clients that put it there.
    pub fn target(&self) -> Option<&str> {
        if !self.to.is_empty() {
            return Some(&self.to);
        }
        self.payload
            .get(field::TO)
            .map(String::as_str)
            .filter(|t| !t.is_empty())
    }
}

/// Hub-to-client message: replies, relayed traffic and membership events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub from: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub to: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ServerMessage {
    pub fn ok(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            success: true,
            ..Default::default()
        }
    }

    pub fn error(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            success: false,
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    /// Message forwarded from `from` to `to`.
    pub fn relayed(kind: &str, from: &str, to: &str, payload: Payload) -> Self {
        Self {
            kind: kind.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            success: true,
            payload,
            ..Default::default()
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Squad topology. Hosted squads route through a host peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    Mesh,
    Hosted,
}

impl NetworkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkType::Mesh => "mesh",
            NetworkType::Hosted => "hosted",
        }
    }

    pub fn incoming_event(&self) -> &'static str {
        match self {
            NetworkType::Mesh => event::INCOMING_MEMBER,
            NetworkType::Hosted => event::HOSTED_INCOMING_MEMBER,
        }
    }

    pub fn leaving_event(&self) -> &'static str {
        match self {
            NetworkType::Mesh => event::LEAVING_MEMBER,
            NetworkType::Hosted => event::HOSTED_LEAVING_MEMBER,
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mesh" => Ok(NetworkType::Mesh),
            "hosted" => Ok(NetworkType::Hosted),
            other => Err(ProtocolError::InvalidField {
                field: field::NETWORK_TYPE,
                value: other.to_string(),
            }),
        }
    }
}

/// Squad admission policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(ProtocolError::InvalidField {
                field: field::SQUAD_TYPE,
                value: other.to_string(),
            }),
        }
    }
}
