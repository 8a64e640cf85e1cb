//! Squadlink Storage -- document store over rusqlite.
//!
//! Three collections (peers, squads, hosted_squads) of JSON documents keyed
//! by id. Listing is by regular-expression match on one string field, in
//! insertion order, with limit/offset paging.
//! WAL mode + busy_timeout for concurrent access.

use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use squadlink_protocol::{NetworkType, PeerId, SquadId, Visibility};
use std::fmt;
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("document {id} in {collection} is not an object")]
    NotAnObject { collection: Collection, id: String },
    #[error("lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Pattern that matches every document.
pub const MATCH_ALL: &str = "";

/// Document field names shared by the hub and the store.
pub mod fields {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const OWNER: &str = "owner";
    pub const MEMBERS: &str = "members";
    pub const AUTHORIZED_MEMBERS: &str = "authorizedMembers";
    pub const PASSWORD: &str = "password";
    pub const SQUAD_TYPE: &str = "squadType";
}

/// Anchored pattern matching `value` literally.
pub fn exact(value: &str) -> String {
    format!("^{}$", regex::escape(value))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Peers,
    Squads,
    HostedSquads,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Peers => "peers",
            Collection::Squads => "squads",
            Collection::HostedSquads => "hosted_squads",
        }
    }

    /// Squad collection for a network type.
    pub fn squads(network_type: NetworkType) -> Self {
        match network_type {
            NetworkType::Mesh => Collection::Squads,
            NetworkType::Hosted => Collection::HostedSquads,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registered peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub id: PeerId,
    pub name: String,
    /// PEM public key, used only to seal auth challenges.
    #[serde(rename = "pubKey")]
    pub pub_key: String,
}

/// Persisted squad.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SquadRecord {
    pub id: SquadId,
    pub name: String,
    pub owner: PeerId,
    pub network_type: NetworkType,
    #[serde(rename = "squadType")]
    pub visibility: Visibility,
    /// PHC hash string; empty for public squads.
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub members: Vec<PeerId>,
    #[serde(default)]
    pub authorized_members: Vec<PeerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<PeerId>,
}

impl SquadRecord {
    /// Copy safe to hand to clients.
    pub fn redacted(mut self) -> Self {
        self.password.clear();
        self
    }
}

/// Document store for peers and squads.
pub trait Store: Send + Sync {
    /// Insert `doc` under `id`. Returns false if the id is already taken.
    fn insert_if_absent(&self, collection: Collection, id: &str, doc: &Value) -> Result<bool>;

    fn find_by_id(&self, collection: Collection, id: &str) -> Result<Option<Value>>;

    /// Documents whose string `field` matches `pattern`, in insertion order.
    fn find_by_pattern(
        &self,
        collection: Collection,
        field: &str,
        pattern: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Value>>;

    /// Overwrite the given top-level fields. Returns false if `id` is absent.
    fn update_fields(&self, collection: Collection, id: &str, fields: &Map<String, Value>)
        -> Result<bool>;

    fn delete(&self, collection: Collection, id: &str) -> Result<bool>;
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    fn db(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Open (or create) the database at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(include_str!("schema.sql"))?;

        tracing::debug!(db = %db_path.display(), "store: schema ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn parse_doc(raw: &str) -> Result<Value> {
    Ok(serde_json::from_str(raw)?)
}

impl Store for SqliteStore {
    fn insert_if_absent(&self, collection: Collection, id: &str, doc: &Value) -> Result<bool> {
        let conn = self.db()?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO documents (collection, id, doc) VALUES (?1, ?2, ?3)",
            params![collection.as_str(), id, doc.to_string()],
        )?;
        Ok(changed > 0)
    }

    fn find_by_id(&self, collection: Collection, id: &str) -> Result<Option<Value>> {
        let conn = self.db()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT doc FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection.as_str(), id],
                |row| row.get(0),
            )
            .optional()?;
        raw.as_deref().map(parse_doc).transpose()
    }

    fn find_by_pattern(
        &self,
        collection: Collection,
        field: &str,
        pattern: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Value>> {
        let re = Regex::new(pattern)?;
        let conn = self.db()?;
        let mut stmt =
            conn.prepare("SELECT doc FROM documents WHERE collection = ?1 ORDER BY rowid")?;
        let rows = stmt.query_map(params![collection.as_str()], |row| row.get::<_, String>(0))?;

        let mut matched = Vec::new();
        let mut skipped = 0;
        for raw in rows {
            if matched.len() >= limit {
                break;
            }
            let doc = parse_doc(&raw?)?;
            let hit = doc
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|v| re.is_match(v));
            if !hit {
                continue;
            }
            if skipped < offset {
                skipped += 1;
                continue;
            }
            matched.push(doc);
        }
        Ok(matched)
    }

    fn update_fields(
        &self,
        collection: Collection,
        id: &str,
        fields: &Map<String, Value>,
    ) -> Result<bool> {
        let mut conn = self.db()?;
        let tx = conn.transaction()?;
        let raw: Option<String> = tx
            .query_row(
                "SELECT doc FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection.as_str(), id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(raw) = raw else {
            return Ok(false);
        };

        let mut doc = parse_doc(&raw)?;
        let obj = doc.as_object_mut().ok_or_else(|| StoreError::NotAnObject {
            collection,
            id: id.to_string(),
        })?;
        for (k, v) in fields {
            obj.insert(k.clone(), v.clone());
        }

        tx.execute(
            "UPDATE documents SET doc = ?3, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE collection = ?1 AND id = ?2",
            params![collection.as_str(), id, doc.to_string()],
        )?;
        tx.commit()?;
        Ok(true)
    }

    fn delete(&self, collection: Collection, id: &str) -> Result<bool> {
        let conn = self.db()?;
        let changed = conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection.as_str(), id],
        )?;
        Ok(changed > 0)
    }
}
