//! Squad manager -- group membership, admission policy, membership fan-out.
//!
//! Squads live in an in-memory map backed by the store. A squad not yet in
//! memory is loaded on first access. Each squad's mutable fields sit behind
//! their own lock; the map has a separate one. Every change to a squad is
//! decided and written to the store while its state lock is held, so the
//! stored record never trails a later in-memory change.
//!
//! Lock order is squad state, then map. Loads from the store happen under
//! the map's write lock, so a delete in flight cannot be undone by a
//! concurrent load.
//!
//! Admission (first match wins):
//! 1. public squad
//! 2. bearer token verified for the joining peer, and the peer is on the
//!    squad's authorized list
//! 3. password matches the stored hash

use serde_json::{json, Map, Value};
use squadlink_crypto::{verify_password, PasswordHasherConfig};
use squadlink_protocol::{ListFilter, NetworkType, PeerId, SquadId, Visibility};
use squadlink_storage::{exact, fields, Collection, SquadRecord, MATCH_ALL};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::auth::AuthTokenManager;
use crate::error::{HubError, Result};
use crate::relay::RelayEngine;
use crate::store::StoreHandle;

#[derive(Debug, Clone)]
struct SquadState {
    name: String,
    visibility: Visibility,
    password_hash: String,
    members: Vec<PeerId>,
    authorized: Vec<PeerId>,
    deleted: bool,
}

impl SquadState {
    fn ensure_live(&self, id: &str) -> Result<()> {
        if self.deleted {
            return Err(HubError::SquadNotFound(id.to_string()));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct Squad {
    pub id: SquadId,
    pub owner: PeerId,
    pub network_type: NetworkType,
    pub host_id: Option<PeerId>,
    state: RwLock<SquadState>,
}

impl Squad {
    fn from_record(record: SquadRecord) -> Self {
        Self {
            id: record.id,
            owner: record.owner,
            network_type: record.network_type,
            host_id: record.host_id,
            state: RwLock::new(SquadState {
                name: record.name,
                visibility: record.visibility,
                password_hash: record.password,
                members: record.members,
                authorized: record.authorized_members,
                deleted: false,
            }),
        }
    }

    fn collection(&self) -> Collection {
        Collection::squads(self.network_type)
    }

    fn ensure_owner(&self, acting: &str) -> Result<()> {
        if self.owner != acting {
            return Err(HubError::NotOwner {
                squad: self.id.clone(),
                peer: acting.to_string(),
            });
        }
        Ok(())
    }

    pub async fn members(&self) -> Vec<PeerId> {
        self.state.read().await.members.clone()
    }
}

/// Parameters for a new squad.
#[derive(Debug, Clone)]
pub struct NewSquad {
    pub id: SquadId,
    pub name: String,
    pub network_type: NetworkType,
    pub visibility: Visibility,
    pub password: String,
    pub host: Option<PeerId>,
}

pub struct SquadManager {
    squads: RwLock<HashMap<SquadId, Arc<Squad>>>,
    store: StoreHandle,
    relay: RelayEngine,
    auth: Arc<AuthTokenManager>,
    hasher: PasswordHasherConfig,
    page_size: usize,
}

impl SquadManager {
    pub fn new(
        store: StoreHandle,
        relay: RelayEngine,
        auth: Arc<AuthTokenManager>,
        hasher: PasswordHasherConfig,
        page_size: usize,
    ) -> Self {
        Self {
            squads: RwLock::new(HashMap::new()),
            store,
            relay,
            auth,
            hasher,
            page_size,
        }
    }

    /// Squad by id, loading it from the store if needed. `hint` narrows the
    /// store lookup to one network type.
    pub async fn squad(&self, id: &str, hint: Option<NetworkType>) -> Result<Arc<Squad>> {
        if let Some(squad) = self.squads.read().await.get(id) {
            return Ok(squad.clone());
        }

        let mut map = self.squads.write().await;
        if let Some(squad) = map.get(id) {
            return Ok(squad.clone());
        }
        let candidates = match hint {
            Some(nt) => vec![nt],
            None => vec![NetworkType::Mesh, NetworkType::Hosted],
        };
        for nt in candidates {
            if let Some(record) = self
                .store
                .get::<SquadRecord>(Collection::squads(nt), id)
                .await?
            {
                let squad = Arc::new(Squad::from_record(record));
                map.insert(id.to_string(), squad.clone());
                tracing::debug!(squad_id = %id, network = %nt, "squad: loaded from store");
                return Ok(squad);
            }
        }
        Err(HubError::SquadNotFound(id.to_string()))
    }

    /// Number of squads currently held in memory.
    pub async fn loaded(&self) -> usize {
        self.squads.read().await.len()
    }

    async fn hash_password(&self, password: String) -> Result<String> {
        let hasher = self.hasher;
        Ok(tokio::task::spawn_blocking(move || hasher.hash(&password)).await??)
    }

    async fn password_matches(&self, password: String, hash: String) -> Result<bool> {
        if hash.is_empty() {
            return Ok(false);
        }
        match tokio::task::spawn_blocking(move || verify_password(&password, &hash)).await? {
            Ok(matched) => Ok(matched),
            Err(e) => {
                tracing::warn!(error = %e, "squad: stored hash unreadable");
                Ok(false)
            }
        }
    }

    async fn persist(&self, squad: &Squad, update: Map<String, Value>) -> Result<()> {
        if !self.store.update(squad.collection(), &squad.id, update).await? {
            tracing::warn!(squad_id = %squad.id, "squad: record missing from store");
        }
        Ok(())
    }

    async fn persist_members(&self, squad: &Squad, members: &[PeerId]) -> Result<()> {
        self.persist(squad, fields_map([(fields::MEMBERS, json!(members))]))
            .await
    }

    pub async fn create(&self, owner: &str, new: NewSquad) -> Result<SquadRecord> {
        match self.squad(&new.id, None).await {
            Ok(_) => return Err(HubError::IdCollision(new.id)),
            Err(HubError::SquadNotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let password = match new.visibility {
            Visibility::Private => self.hash_password(new.password).await?,
            Visibility::Public => String::new(),
        };
        let record = SquadRecord {
            id: new.id,
            name: new.name,
            owner: owner.to_string(),
            network_type: new.network_type,
            visibility: new.visibility,
            password,
            members: Vec::new(),
            authorized_members: Vec::new(),
            host_id: new.host,
        };

        let collection = Collection::squads(record.network_type);
        if !self.store.insert(collection, &record.id, &record).await? {
            return Err(HubError::IdCollision(record.id));
        }
        self.squads
            .write()
            .await
            .entry(record.id.clone())
            .or_insert_with(|| Arc::new(Squad::from_record(record.clone())));

        tracing::info!(
            squad_id = %record.id,
            owner = %owner,
            network = %record.network_type,
            visibility = %record.visibility,
            "squad: created"
        );
        Ok(record.redacted())
    }

    pub async fn modify(
        &self,
        squad_id: &str,
        acting: &str,
        name: String,
        visibility: Visibility,
        password: String,
    ) -> Result<()> {
        let squad = self.squad(squad_id, None).await?;
        squad.ensure_owner(acting)?;

        let hash = match visibility {
            Visibility::Private => self.hash_password(password).await?,
            Visibility::Public => String::new(),
        };
        let mut st = squad.state.write().await;
        st.ensure_live(squad_id)?;
        st.name = name;
        st.visibility = visibility;
        st.password_hash = hash;
        let update = fields_map([
            (fields::NAME, json!(st.name)),
            (fields::SQUAD_TYPE, json!(st.visibility)),
            (fields::PASSWORD, json!(st.password_hash)),
        ]);
        self.persist(&squad, update).await?;
        drop(st);

        tracing::info!(squad_id, %visibility, "squad: modified");
        Ok(())
    }

    /// Admit `acting` to the squad and announce it to the other members.
    pub async fn connect(
        &self,
        squad_id: &str,
        acting: &str,
        password: String,
        token: &str,
        hint: Option<NetworkType>,
    ) -> Result<()> {
        let squad = self.squad(squad_id, hint).await?;

        let others: Vec<PeerId> = {
            let mut st = squad.state.write().await;
            st.ensure_live(squad_id)?;
            let admitted = match st.visibility {
                Visibility::Public => true,
                Visibility::Private => {
                    let listed = st.authorized.iter().any(|p| p == acting);
                    (listed && self.auth.check_ownership(token, acting).await)
                        || self
                            .password_matches(password, st.password_hash.clone())
                            .await?
                }
            };
            if !admitted {
                tracing::info!(squad_id, peer = %acting, "squad: access denied");
                return Err(HubError::AccessDenied);
            }

            st.members.push(acting.to_string());
            self.persist_members(&squad, &st.members).await?;
            st.members.iter().filter(|m| *m != acting).cloned().collect()
        };
        let notified = self
            .relay
            .notify(acting, &others, squad.network_type.incoming_event())
            .await;

        tracing::info!(squad_id, peer = %acting, notified, "squad: member joined");
        Ok(())
    }

    /// Remove the first occurrence of `acting`. Returns false (and does
    /// nothing else) if it was not a member.
    pub async fn leave(&self, squad_id: &str, acting: &str, hint: Option<NetworkType>) -> Result<bool> {
        let squad = self.squad(squad_id, hint).await?;

        let remaining: Vec<PeerId> = {
            let mut st = squad.state.write().await;
            st.ensure_live(squad_id)?;
            let Some(pos) = st.members.iter().position(|m| m == acting) else {
                return Ok(false);
            };
            st.members.swap_remove(pos);
            self.persist_members(&squad, &st.members).await?;
            st.members.iter().filter(|m| *m != acting).cloned().collect()
        };
        let notified = self
            .relay
            .notify(acting, &remaining, squad.network_type.leaving_event())
            .await;

        tracing::info!(squad_id, peer = %acting, notified, "squad: member left");
        Ok(true)
    }

    /// Owner-only. Members are not notified.
    pub async fn delete(&self, squad_id: &str, acting: &str) -> Result<()> {
        let squad = self.squad(squad_id, None).await?;
        squad.ensure_owner(acting)?;

        let mut st = squad.state.write().await;
        st.ensure_live(squad_id)?;
        let mut map = self.squads.write().await;
        self.store.delete(squad.collection(), squad_id).await?;
        map.remove(squad_id);
        st.deleted = true;
        drop(map);
        drop(st);

        tracing::info!(squad_id, "squad: deleted");
        Ok(())
    }

    pub async fn update_name(&self, squad_id: &str, acting: &str, name: String) -> Result<()> {
        let squad = self.squad(squad_id, None).await?;
        squad.ensure_owner(acting)?;

        let mut st = squad.state.write().await;
        st.ensure_live(squad_id)?;
        st.name = name.clone();
        self.persist(&squad, fields_map([(fields::NAME, json!(name))]))
            .await
    }

    /// Replace the password hash. Visibility is unchanged.
    pub async fn update_password(&self, squad_id: &str, acting: &str, password: String) -> Result<()> {
        let squad = self.squad(squad_id, None).await?;
        squad.ensure_owner(acting)?;

        let hash = self.hash_password(password).await?;
        let mut st = squad.state.write().await;
        st.ensure_live(squad_id)?;
        st.password_hash = hash.clone();
        self.persist(&squad, fields_map([(fields::PASSWORD, json!(hash))]))
            .await
    }

    /// Add `peer_id` to the squad's authorized list.
    pub async fn authorize_member(&self, squad_id: &str, acting: &str, peer_id: &str) -> Result<()> {
        let squad = self.squad(squad_id, None).await?;
        squad.ensure_owner(acting)?;

        let mut st = squad.state.write().await;
        st.ensure_live(squad_id)?;
        if st.authorized.iter().any(|p| p == peer_id) {
            return Err(HubError::AlreadyExists(format!(
                "authorization for {peer_id} in squad {squad_id}"
            )));
        }
        st.authorized.push(peer_id.to_string());
        self.persist(
            &squad,
            fields_map([(fields::AUTHORIZED_MEMBERS, json!(st.authorized))]),
        )
        .await?;
        drop(st);

        tracing::info!(squad_id, peer = %peer_id, "squad: member authorized");
        Ok(())
    }

    /// One page of stored squads of a network type.
    pub async fn list(
        &self,
        network_type: NetworkType,
        filter: ListFilter,
        last_index: usize,
    ) -> Result<Vec<SquadRecord>> {
        let (field, pattern) = match filter {
            ListFilter::All => (fields::ID, MATCH_ALL.to_string()),
            ListFilter::ById(p) => (fields::ID, p),
            ListFilter::ByName(p) => (fields::NAME, p),
        };
        let squads: Vec<SquadRecord> = self
            .store
            .find(Collection::squads(network_type), field, pattern, self.page_size, last_index)
            .await?;
        Ok(squads.into_iter().map(SquadRecord::redacted).collect())
    }

    /// Squads owned by `owner`, across both network types. `token` must be
    /// verified for `owner`.
    pub async fn by_owner(&self, token: &str, owner: &str, last_index: usize) -> Result<Vec<SquadRecord>> {
        if !self.auth.check_ownership(token, owner).await {
            return Err(HubError::InvalidToken);
        }

        let window = last_index + self.page_size;
        let mut squads: Vec<SquadRecord> = Vec::new();
        for nt in [NetworkType::Mesh, NetworkType::Hosted] {
            let page: Vec<SquadRecord> = self
                .store
                .find(Collection::squads(nt), fields::OWNER, exact(owner), window, 0)
                .await?;
            squads.extend(page);
        }
        Ok(squads
            .into_iter()
            .skip(last_index)
            .take(self.page_size)
            .map(SquadRecord::redacted)
            .collect())
    }
}

fn fields_map<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}
