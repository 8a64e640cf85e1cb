//! In-memory transports and fixtures for unit tests.

use futures::channel::mpsc;
use futures::SinkExt;
use squadlink_crypto::{ChallengeSealer, CryptoError, PasswordHasherConfig};
use serde_json::{Map, Value};
use squadlink_protocol::{Envelope, ServerMessage};
use squadlink_storage::{Collection, SqliteStore, Store};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{HubError, Result};
use crate::session::{self, FrameSink, FrameStream, Session, SessionReader, TransportKind};
use crate::{Hub, HubSettings};

pub type Outbox = mpsc::UnboundedReceiver<ServerMessage>;
pub type Inbox = mpsc::UnboundedSender<Result<Envelope>>;

/// Sink/stream pair backed by channels. The returned receiver sees every
/// frame the hub writes; the sender injects frames the hub reads.
pub fn channel_transport() -> (FrameSink, FrameStream, Outbox, Inbox) {
    let (out_tx, out_rx) = mpsc::unbounded::<ServerMessage>();
    let (in_tx, in_rx) = mpsc::unbounded::<Result<Envelope>>();
    let sink: FrameSink = Box::pin(out_tx.sink_map_err(|e| HubError::Transport(e.to_string())));
    let stream: FrameStream = Box::pin(in_rx);
    (sink, stream, out_rx, in_tx)
}

pub fn channel_session(kind: TransportKind) -> (Arc<Session>, SessionReader, Outbox, Inbox) {
    let (sink, stream, out, input) = channel_transport();
    let (session, reader) = session::open(kind, sink, stream, CancellationToken::new());
    (session, reader, out, input)
}

/// Sealer that returns the nonce unchanged, so tests can answer challenges.
pub struct PlainSealer;

impl ChallengeSealer for PlainSealer {
    fn seal(&self, public_key_pem: &str, nonce: &str) -> std::result::Result<String, CryptoError> {
        if public_key_pem == "bad-key" {
            return Err(CryptoError::InvalidKey("bad-key".into()));
        }
        Ok(nonce.to_string())
    }
}

pub fn test_settings() -> HubSettings {
    HubSettings {
        store_timeout: Duration::from_secs(5),
        page_size: 100,
        password: PasswordHasherConfig { log_n: 4 },
    }
}

pub fn test_hub() -> Arc<Hub> {
    hub_with_store(Arc::new(SqliteStore::open_in_memory().unwrap()))
}

pub fn hub_with_store(store: Arc<dyn Store>) -> Arc<Hub> {
    Arc::new(Hub::new(store, Arc::new(PlainSealer), test_settings()))
}

/// In-memory store whose next update or delete can be made to stall once.
pub struct SlowStore {
    inner: SqliteStore,
    delay: Duration,
    stall_update: AtomicBool,
    stall_delete: AtomicBool,
}

impl SlowStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: SqliteStore::open_in_memory().unwrap(),
            delay,
            stall_update: AtomicBool::new(false),
            stall_delete: AtomicBool::new(false),
        }
    }

    pub fn stall_next_update(&self) {
        self.stall_update.store(true, Ordering::SeqCst);
    }

    pub fn stall_next_delete(&self) {
        self.stall_delete.store(true, Ordering::SeqCst);
    }

    fn pause(&self, flag: &AtomicBool) {
        if flag.swap(false, Ordering::SeqCst) {
            std::thread::sleep(self.delay);
        }
    }
}

impl Store for SlowStore {
    fn insert_if_absent(
        &self,
        collection: Collection,
        id: &str,
        doc: &Value,
    ) -> squadlink_storage::Result<bool> {
        self.inner.insert_if_absent(collection, id, doc)
    }

    fn find_by_id(&self, collection: Collection, id: &str) -> squadlink_storage::Result<Option<Value>> {
        self.inner.find_by_id(collection, id)
    }

    fn find_by_pattern(
        &self,
        collection: Collection,
        field: &str,
        pattern: &str,
        limit: usize,
        offset: usize,
    ) -> squadlink_storage::Result<Vec<Value>> {
        self.inner
            .find_by_pattern(collection, field, pattern, limit, offset)
    }

    fn update_fields(
        &self,
        collection: Collection,
        id: &str,
        fields: &Map<String, Value>,
    ) -> squadlink_storage::Result<bool> {
        self.pause(&self.stall_update);
        self.inner.update_fields(collection, id, fields)
    }

    fn delete(&self, collection: Collection, id: &str) -> squadlink_storage::Result<bool> {
        self.pause(&self.stall_delete);
        self.inner.delete(collection, id)
    }
}

/// Drain whatever is already queued on an outbox.
pub fn drain(out: &mut Outbox) -> Vec<ServerMessage> {
    let mut msgs = Vec::new();
    while let Ok(Some(msg)) = out.try_next() {
        msgs.push(msg);
    }
    msgs
}
