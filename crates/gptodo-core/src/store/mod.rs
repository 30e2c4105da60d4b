//! Storage abstraction for the local checklist cache.
//!
//! The [`Store`] trait is a plain asynchronous key/value port, enabling
//! pluggable backends (SQLite on native targets, in-memory for tests and
//! embedding). Values are strings; typed encoding lives in
//! [`crate::cache::ChecklistCache`].
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

/// Abstract key/value store scoped to one cache container.
///
/// Every operation may fail (storage unavailable, quota). Callers treat
/// failures as non-fatal.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`put`](Store::put) | Insert or overwrite a value |
/// | [`get`](Store::get) | Read a value; `Ok(None)` when the key is missing |
/// | [`delete`](Store::delete) | Remove one key; missing keys are not an error |
/// | [`delete_all`](Store::delete_all) | Remove every key in the container |
#[async_trait]
pub trait Store: Send + Sync {
    async fn put(&self, key: &str, value: &str) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn delete_all(&self) -> Result<()>;
}
