//! Async, typed access to the synchronous document store.
//!
//! Every call runs on the blocking pool and is bounded by the configured
//! timeout. An expired call yields `HubError::Cancelled`; the blocking
//! work itself is not interrupted.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use squadlink_storage::{Collection, Store, StoreError};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{HubError, Result};

#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<dyn Store>,
    timeout: Duration,
}

impl StoreHandle {
    pub fn new(inner: Arc<dyn Store>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn run<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Store) -> std::result::Result<T, StoreError> + Send + 'static,
    {
        let store = self.inner.clone();
        let task = tokio::task::spawn_blocking(move || f(store.as_ref()));
        match tokio::time::timeout(self.timeout, task).await {
            Ok(joined) => Ok(joined??),
            Err(_) => {
                tracing::warn!(op, timeout_ms = self.timeout.as_millis() as u64, "store: timed out");
                Err(HubError::Cancelled)
            }
        }
    }

    pub async fn insert<T: Serialize>(&self, collection: Collection, id: &str, record: &T) -> Result<bool> {
        let doc = serde_json::to_value(record).map_err(StoreError::from)?;
        let id = id.to_string();
        self.run("insert", move |s| s.insert_if_absent(collection, &id, &doc))
            .await
    }

    pub async fn get<T>(&self, collection: Collection, id: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let id = id.to_string();
        self.run("get", move |s| {
            s.find_by_id(collection, &id)?
                .map(|doc| serde_json::from_value(doc).map_err(StoreError::from))
                .transpose()
        })
        .await
    }

    pub async fn find<T>(
        &self,
        collection: Collection,
        field: &'static str,
        pattern: String,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.run("find", move |s| {
            s.find_by_pattern(collection, field, &pattern, limit, offset)?
                .into_iter()
                .map(|doc| serde_json::from_value(doc).map_err(StoreError::from))
                .collect()
        })
        .await
    }

    pub async fn update(&self, collection: Collection, id: &str, fields: Map<String, Value>) -> Result<bool> {
        let id = id.to_string();
        self.run("update", move |s| s.update_fields(collection, &id, &fields))
            .await
    }

    pub async fn delete(&self, collection: Collection, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.run("delete", move |s| s.delete(collection, &id)).await
    }
}
