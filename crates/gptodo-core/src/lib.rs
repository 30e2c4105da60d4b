//! # gptodo Core
//!
//! Shared, WASM-safe logic for gptodo: checklist models, the error
//! taxonomy, the event-stream codec, answer parsing, display ordering,
//! the key/value store abstraction, and the checklist state reconciler.
//!
//! This crate contains no tokio, sqlx, HTTP client, or filesystem I/O.
//! The native crate supplies the transport and the durable store.

pub mod answer;
pub mod cache;
pub mod data_uri;
pub mod error;
pub mod models;
pub mod order;
pub mod reconciler;
pub mod sse;
pub mod store;
