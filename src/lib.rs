//! # gptodo
//!
//! Turns a photo of a handwritten or printed list into an interactive
//! checklist.
//!
//! An image is sent to the extraction backend, which asks a vision model
//! for the list and streams back its reasoning and answer. The client
//! decodes the stream, the reconciler applies the result, and the checklist
//! is cached in SQLite so it survives restarts.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  image   ┌──────────────┐  parts  ┌──────────────┐
//! │   CLI    │─────────▶│   backend    │◀────────│ vision model │
//! │ (gptodo) │◀─────────│   (server)   │         │   (Gemini)   │
//! └────┬─────┘   SSE    └──────────────┘         └──────────────┘
//!      │
//!      ▼
//! ┌──────────┐  write-through  ┌──────────┐
//! │ session  │────────────────▶│  SQLite  │
//! │reconciler│                 │  cache   │
//! └──────────┘                 └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! gptodo serve                    # start the backend
//! gptodo scan ./shopping.jpg      # extract a checklist
//! gptodo toggle 2                 # mark an item done
//! gptodo sort on                  # completed last, A-Z
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`client`] | Extraction client (stream and JSON modes) |
//! | [`session`] | Reconciler wired to the client |
//! | [`server`] | Extraction backend HTTP server |
//! | [`vision`] | Vision model port and Gemini implementation |
//! | [`sqlite_store`] | SQLite-backed cache store |
//! | [`checklist_cmd`] | CLI commands |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema setup |

pub mod checklist_cmd;
pub mod client;
pub mod config;
pub mod db;
pub mod image;
pub mod logging;
pub mod migrate;
pub mod server;
pub mod session;
pub mod sqlite_store;
pub mod vision;
