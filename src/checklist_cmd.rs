//! Checklist commands for the `gptodo` CLI.
//!
//! Each command opens the configured cache, hydrates a
//! [`ChecklistSession`] from it, applies one operation, and prints the
//! resulting checklist.

use anyhow::{bail, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use gptodo_core::reconciler::{Applied, Phase};

use crate::client::ExtractionClient;
use crate::config::Config;
use crate::image;
use crate::session::{ChecklistSession, ChecklistSnapshot, SessionEvent};
use crate::sqlite_store::SqliteStore;

async fn open_session(config: &Config) -> Result<(ChecklistSession, Arc<SqliteStore>)> {
    let store = Arc::new(SqliteStore::open(&config.cache).await?);
    let client = ExtractionClient::new(&config.client)?;
    let session = ChecklistSession::new(store.clone(), client);
    session.load().await;
    Ok((session, store))
}

/// Render the checklist the way the CLI prints it.
pub fn render(snapshot: &ChecklistSnapshot) -> String {
    if snapshot.phase == Phase::Empty && snapshot.items.is_empty() {
        return "No checklist. Run `gptodo scan <image>` to create one.\n".to_string();
    }
    if snapshot.items.is_empty() {
        return "No list found in the image.\n".to_string();
    }

    let done = snapshot.items.iter().filter(|i| i.completed).count();
    let mut out = format!(
        "Checklist: {} items, {} done (order: {})\n",
        snapshot.items.len(),
        done,
        if snapshot.sorted { "A-Z" } else { "as written" }
    );
    for item in &snapshot.items {
        out.push_str(&format!(
            "  [{}] {:>3}  {}\n",
            if item.completed { "x" } else { " " },
            item.index,
            item.text
        ));
    }
    out
}

pub async fn run_scan(config: &Config, path: &Path) -> Result<()> {
    let image = image::read_data_uri(path).await?;
    let (session, store) = open_session(config).await?;

    let mut events = session.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Thought { thought, .. }) => eprintln!("  {}...", thought.heading),
                Ok(SessionEvent::Populated { .. }) | Ok(SessionEvent::Failed { .. }) => break,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    eprintln!("Reading {}...", path.display());
    let outcome = session.upload(&image).await.await?;
    if outcome.applied == Applied::Applied {
        let _ = printer.await;
    } else {
        printer.abort();
    }

    let snapshot = session.snapshot().await;
    store.close().await;

    match outcome.result {
        Ok(_) => {
            print!("{}", render(&snapshot));
            Ok(())
        }
        Err(e) => bail!("{}", e),
    }
}

pub async fn run_show(config: &Config) -> Result<()> {
    let (session, store) = open_session(config).await?;
    print!("{}", render(&session.snapshot().await));
    store.close().await;
    Ok(())
}

pub async fn run_toggle(config: &Config, index: usize) -> Result<()> {
    let (session, store) = open_session(config).await?;
    let found = session.toggle(index).await;
    let snapshot = session.snapshot().await;
    store.close().await;

    if !found {
        bail!("No item with index {}", index);
    }
    print!("{}", render(&snapshot));
    Ok(())
}

pub async fn run_remove(config: &Config, index: usize) -> Result<()> {
    let (session, store) = open_session(config).await?;
    let found = session.remove(index).await;
    let snapshot = session.snapshot().await;
    store.close().await;

    if !found {
        bail!("No item with index {}", index);
    }
    if snapshot.items.is_empty() {
        println!("Removed the last item. Checklist cleared.");
    } else {
        print!("{}", render(&snapshot));
    }
    Ok(())
}

/// Set the sort preference, or flip it when `sorted` is `None`.
pub async fn run_sort(config: &Config, sorted: Option<bool>) -> Result<()> {
    let (session, store) = open_session(config).await?;
    let sorted = match sorted {
        Some(value) => {
            session.set_sort(value).await;
            value
        }
        None => session.toggle_sort().await,
    };
    let snapshot = session.snapshot().await;
    store.close().await;

    println!("Sort A-Z: {}", if sorted { "on" } else { "off" });
    if !snapshot.items.is_empty() {
        print!("{}", render(&snapshot));
    }
    Ok(())
}

pub async fn run_clear(config: &Config) -> Result<()> {
    let (session, store) = open_session(config).await?;
    session.clear().await;
    store.close().await;
    println!("Checklist cleared.");
    Ok(())
}
