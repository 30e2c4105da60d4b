//! Checklist state reconciler.
//!
//! [`Reconciler`] owns the canonical checklist and is the only writer to the
//! cache. Every operation that changes the list or the sort preference
//! writes through to the [`ChecklistCache`]; write failures are logged by
//! the cache and never roll back in-memory state.
//!
//! # States
//!
//! ```text
//!            begin_extraction            complete_extraction
//!   Empty ───────────────────▶ Loading ─────────────────────▶ Populated
//!     ▲                           │                              │  toggle / sort
//!     │      fail_extraction      │                              ◀──┘
//!     └───────────────────────────┘
//!     ▲                                                          │
//!     └────────────────────────── clear ◀────────────────────────┘
//! ```
//!
//! Each extraction gets a [`Generation`]. Results and thoughts carrying an
//! older generation are dropped, so a slow earlier request can never
//! overwrite the outcome of a newer one or of a clear.

use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::ChecklistCache;
use crate::data_uri::ensure_data_uri;
use crate::models::{ChecklistItem, ThoughtEvent};
use crate::order::display_order;
use crate::store::Store;

/// Token identifying one extraction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(u64);

impl Generation {
    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Empty,
    Loading,
    Populated,
}

/// Outcome of delivering an asynchronous result to the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Applied,
    /// The result belonged to a superseded generation and was discarded.
    Stale,
}

pub struct Reconciler {
    cache: ChecklistCache,
    generation: u64,
    phase: Phase,
    items: Vec<ChecklistItem>,
    image: Option<String>,
    pending_image: Option<String>,
    sorted: bool,
    thoughts: Vec<ThoughtEvent>,
    error: Option<String>,
    had_items: bool,
}

impl Reconciler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            cache: ChecklistCache::new(store),
            generation: 0,
            phase: Phase::Empty,
            items: Vec::new(),
            image: None,
            pending_image: None,
            sorted: false,
            thoughts: Vec::new(),
            error: None,
            had_items: false,
        }
    }

    /// Startup reconciliation.
    ///
    /// A cached image without a cached list means the last extraction never
    /// finished: the image is discarded and nothing else is touched.
    /// Otherwise the record is hydrated as stored.
    pub async fn load(&mut self) {
        let record = self.cache.load_record().await;

        if record.is_mismatched() {
            info!("discarding cached image from an interrupted extraction");
            self.cache.clear_cached_image().await;
            self.image = None;
        } else {
            self.image = record.image;
        }

        self.items = record.todo_list.unwrap_or_default();
        self.sorted = record.sort_preference.unwrap_or(false);
        self.had_items = !self.items.is_empty();
        self.phase = if self.image.is_some() || !self.items.is_empty() {
            Phase::Populated
        } else {
            Phase::Empty
        };
        debug!(
            items = self.items.len(),
            image = self.image.is_some(),
            sorted = self.sorted,
            "checklist state loaded"
        );
    }

    /// Start a new extraction for `image` (a data URI or bare base64).
    ///
    /// Resets the displayed list, image, thoughts, and error, supersedes any
    /// in-flight generation, and caches the image. The sort preference is
    /// kept.
    pub async fn begin_extraction(&mut self, image: &str) -> Generation {
        self.generation += 1;
        self.phase = Phase::Loading;
        self.items.clear();
        self.thoughts.clear();
        self.error = None;
        self.image = None;
        self.had_items = false;

        let image = ensure_data_uri(image);
        self.cache.cache_image(&image).await;
        self.pending_image = Some(image);

        Generation(self.generation)
    }

    /// Whether results for `generation` may still change state.
    pub fn is_active(&self, generation: Generation) -> bool {
        self.phase == Phase::Loading && generation.0 == self.generation
    }

    /// Record an intermediate thought for the running extraction.
    ///
    /// Returns the parsed thought when it was accepted. Thoughts without a
    /// bold heading, or from a stale generation, are dropped.
    pub fn apply_thought(&mut self, generation: Generation, raw: &str) -> Option<ThoughtEvent> {
        if !self.is_active(generation) {
            debug!(generation = generation.0, "dropping stale thought");
            return None;
        }
        let thought = ThoughtEvent::parse(raw)?;
        self.thoughts.push(thought.clone());
        Some(thought)
    }

    /// Deliver a successful extraction.
    ///
    /// The list is written to the cache before the image is exposed, so the
    /// image is never shown without its list on record. An empty list is a
    /// valid outcome and is persisted as such.
    pub async fn complete_extraction(
        &mut self,
        generation: Generation,
        items: Vec<ChecklistItem>,
    ) -> Applied {
        if !self.is_active(generation) {
            debug!(generation = generation.0, "dropping stale extraction result");
            return Applied::Stale;
        }

        self.cache.cache_todo_list(&items).await;
        self.had_items = !items.is_empty();
        self.items = items;
        self.image = self.pending_image.take();
        self.thoughts.clear();
        self.phase = Phase::Populated;
        info!(
            generation = generation.0,
            items = self.items.len(),
            "checklist populated"
        );
        Applied::Applied
    }

    /// Deliver a failed extraction.
    ///
    /// Everything shown for this generation is rolled back and the cached
    /// image, which has no list to go with it, is discarded.
    pub async fn fail_extraction(
        &mut self,
        generation: Generation,
        message: impl Into<String>,
    ) -> Applied {
        if !self.is_active(generation) {
            debug!(generation = generation.0, "dropping stale extraction failure");
            return Applied::Stale;
        }

        self.phase = Phase::Empty;
        self.items.clear();
        self.thoughts.clear();
        self.image = None;
        self.pending_image = None;
        self.had_items = false;
        self.error = Some(message.into());
        self.cache.clear_cached_image().await;
        Applied::Applied
    }

    /// Flip the completion flag of the item with stable index `index`.
    ///
    /// Returns `false` when no such item exists.
    pub async fn toggle(&mut self, index: usize) -> bool {
        if self.phase != Phase::Populated {
            return false;
        }
        let Some(item) = self.items.iter_mut().find(|i| i.index == index) else {
            return false;
        };
        item.completed = !item.completed;
        self.persist_items().await;
        true
    }

    pub async fn set_sort(&mut self, sorted: bool) {
        self.sorted = sorted;
        self.cache.cache_sort_state(sorted).await;
    }

    /// Flip the sort preference, returning the new value.
    pub async fn toggle_sort(&mut self) -> bool {
        let sorted = !self.sorted;
        self.set_sort(sorted).await;
        sorted
    }

    /// Replace the list through a user edit.
    ///
    /// If this empties a list that had items, the whole cache record is
    /// deleted instead of storing `[]`, which would otherwise be read back
    /// as the outcome of an extraction.
    pub async fn replace_items(&mut self, items: Vec<ChecklistItem>) {
        self.items = items;
        self.persist_items().await;
    }

    /// Delete the item with stable index `index`. The other items keep
    /// their indices.
    ///
    /// Returns `false` when no such item exists. Removing the last item
    /// empties the list and so deletes the cache record.
    pub async fn remove_item(&mut self, index: usize) -> bool {
        if self.phase != Phase::Populated {
            return false;
        }
        let Some(pos) = self.items.iter().position(|i| i.index == index) else {
            return false;
        };
        let mut items = self.items.clone();
        items.remove(pos);
        self.replace_items(items).await;
        true
    }

    /// Drop everything: memory, cache, and any in-flight generation.
    pub async fn clear(&mut self) {
        self.generation += 1;
        self.phase = Phase::Empty;
        self.items.clear();
        self.thoughts.clear();
        self.image = None;
        self.pending_image = None;
        self.error = None;
        self.sorted = false;
        self.had_items = false;
        self.cache.clear().await;
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn current_generation(&self) -> Generation {
        Generation(self.generation)
    }

    /// The image shown next to the checklist, if any.
    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    /// Items in storage order (by creation).
    pub fn items(&self) -> &[ChecklistItem] {
        &self.items
    }

    /// Items in display order.
    pub fn view(&self) -> Vec<ChecklistItem> {
        display_order(&self.items, self.sorted)
    }

    pub fn thoughts(&self) -> &[ThoughtEvent] {
        &self.thoughts
    }

    pub fn latest_thought(&self) -> Option<&ThoughtEvent> {
        self.thoughts.last()
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// Message of the last failed extraction, until cleared.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    async fn persist_items(&mut self) {
        if self.items.is_empty() && self.had_items {
            self.cache.clear().await;
        } else {
            self.cache.cache_todo_list(&self.items).await;
        }
        self.had_items = !self.items.is_empty();
    }
}
