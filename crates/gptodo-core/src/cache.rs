//! Typed checklist cache over a [`Store`].
//!
//! Every write and read here is best-effort: failures are logged and
//! swallowed, and the session carries on without persistence. Reads that
//! fail, or that find undecodable JSON, report the field as absent.

use std::sync::Arc;

use tracing::warn;

use crate::data_uri::ensure_data_uri;
use crate::models::{CacheRecord, ChecklistItem};
use crate::store::Store;

/// Name of the cache container all keys live in.
pub const CACHE_NAME: &str = "gptodo-cache";
pub const IMAGE_KEY: &str = "current-image";
pub const TODO_LIST_KEY: &str = "todo-list";
pub const SORT_STATE_KEY: &str = "sort-state";

#[derive(Clone)]
pub struct ChecklistCache {
    store: Arc<dyn Store>,
}

impl ChecklistCache {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Record a freshly selected image.
    ///
    /// The previous image and list are removed first, so until
    /// [`cache_todo_list`](Self::cache_todo_list) runs the record is in the
    /// mismatched state that marks an unfinished extraction.
    pub async fn cache_image(&self, image: &str) {
        self.delete_key(IMAGE_KEY).await;
        self.delete_key(TODO_LIST_KEY).await;
        if let Err(e) = self.store.put(IMAGE_KEY, &ensure_data_uri(image)).await {
            warn!(error = %e, "failed to cache image");
        }
    }

    pub async fn cache_todo_list(&self, items: &[ChecklistItem]) {
        let json = match serde_json::to_string(items) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to encode checklist");
                return;
            }
        };
        if let Err(e) = self.store.put(TODO_LIST_KEY, &json).await {
            warn!(error = %e, "failed to cache checklist");
        }
    }

    pub async fn cache_sort_state(&self, sorted: bool) {
        let value = if sorted { "true" } else { "false" };
        if let Err(e) = self.store.put(SORT_STATE_KEY, value).await {
            warn!(error = %e, "failed to cache sort state");
        }
    }

    pub async fn cached_image(&self) -> Option<String> {
        self.read(IMAGE_KEY).await
    }

    pub async fn cached_todo_list(&self) -> Option<Vec<ChecklistItem>> {
        let raw = self.read(TODO_LIST_KEY).await?;
        match serde_json::from_str(&raw) {
            Ok(items) => Some(items),
            Err(e) => {
                warn!(error = %e, "ignoring undecodable cached checklist");
                None
            }
        }
    }

    pub async fn cached_sort_state(&self) -> Option<bool> {
        let raw = self.read(SORT_STATE_KEY).await?;
        match serde_json::from_str(&raw) {
            Ok(sorted) => Some(sorted),
            Err(e) => {
                warn!(error = %e, "ignoring undecodable cached sort state");
                None
            }
        }
    }

    /// Read the whole cache record.
    pub async fn load_record(&self) -> CacheRecord {
        CacheRecord {
            image: self.cached_image().await,
            todo_list: self.cached_todo_list().await,
            sort_preference: self.cached_sort_state().await,
        }
    }

    pub async fn clear_cached_image(&self) {
        self.delete_key(IMAGE_KEY).await;
    }

    /// Delete the entire cache record.
    pub async fn clear(&self) {
        if let Err(e) = self.store.delete_all().await {
            warn!(error = %e, "failed to clear cache");
        }
    }

    async fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "failed to read cache");
                None
            }
        }
    }

    async fn delete_key(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            warn!(key, error = %e, "failed to delete cache entry");
        }
    }
}
