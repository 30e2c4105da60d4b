//! Checklist session: the reconciler wired to the extraction client.
//!
//! A [`ChecklistSession`] holds the shared [`Reconciler`] behind an async
//! mutex. [`ChecklistSession::upload`] starts an extraction on a spawned
//! task and returns immediately; thoughts are applied while the response
//! streams in and the final result is delivered under the generation check,
//! so a superseded upload (or a clear) simply has no effect when it lands.
//!
//! Observers subscribe to [`SessionEvent`]s over a broadcast channel.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use gptodo_core::data_uri;
use gptodo_core::error::ExtractError;
use gptodo_core::models::{ChecklistItem, ThoughtEvent};
use gptodo_core::reconciler::{Applied, Generation, Phase, Reconciler};
use gptodo_core::store::Store;

use crate::client::{ExtractEvent, ExtractionClient};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Started { generation: u64 },
    Thought { generation: u64, thought: ThoughtEvent },
    Populated { generation: u64, items: usize },
    Failed { generation: u64, message: String },
    Cleared,
}

/// Result of one upload, as seen by whoever awaits its handle.
#[derive(Debug)]
pub struct ExtractionOutcome {
    pub generation: Generation,
    /// `Stale` when a newer upload or a clear superseded this one.
    pub applied: Applied,
    pub result: Result<Vec<ChecklistItem>, ExtractError>,
}

/// Point-in-time copy of the displayed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecklistSnapshot {
    pub phase: Phase,
    pub image: Option<String>,
    /// Items in display order.
    pub items: Vec<ChecklistItem>,
    pub sorted: bool,
    pub error: Option<String>,
    pub latest_thought: Option<ThoughtEvent>,
}

#[derive(Clone)]
pub struct ChecklistSession {
    reconciler: Arc<Mutex<Reconciler>>,
    client: Arc<ExtractionClient>,
    events: broadcast::Sender<SessionEvent>,
}

impl ChecklistSession {
    pub fn new(store: Arc<dyn Store>, client: ExtractionClient) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            reconciler: Arc::new(Mutex::new(Reconciler::new(store))),
            client: Arc::new(client),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Hydrate from the cache. Call once before anything else.
    pub async fn load(&self) -> ChecklistSnapshot {
        let mut reconciler = self.reconciler.lock().await;
        reconciler.load().await;
        snapshot_of(&reconciler)
    }

    pub async fn snapshot(&self) -> ChecklistSnapshot {
        snapshot_of(&*self.reconciler.lock().await)
    }

    /// Start extracting `image` (a data URI or bare base64).
    ///
    /// The state switches to loading before this returns. The returned
    /// handle resolves once the result has been delivered to the reconciler.
    pub async fn upload(&self, image: &str) -> JoinHandle<ExtractionOutcome> {
        let image = data_uri::ensure_data_uri(image);
        let generation = self.reconciler.lock().await.begin_extraction(&image).await;
        let _ = self.events.send(SessionEvent::Started {
            generation: generation.value(),
        });
        info!(generation = generation.value(), "extraction started");

        // A data URI with no payload goes to the client as an empty image,
        // which rejects it without touching the network.
        let base64 = data_uri::payload(&image).unwrap_or_default().to_string();

        tokio::spawn(run_extraction(
            self.reconciler.clone(),
            self.client.clone(),
            self.events.clone(),
            generation,
            base64,
        ))
    }

    /// Flip the item with stable index `index`. `false` if there is none.
    pub async fn toggle(&self, index: usize) -> bool {
        self.reconciler.lock().await.toggle(index).await
    }

    /// Delete the item with stable index `index`. `false` if there is none.
    ///
    /// Removing the last item deletes the cached record.
    pub async fn remove(&self, index: usize) -> bool {
        self.reconciler.lock().await.remove_item(index).await
    }

    pub async fn set_sort(&self, sorted: bool) {
        self.reconciler.lock().await.set_sort(sorted).await;
    }

    pub async fn toggle_sort(&self) -> bool {
        self.reconciler.lock().await.toggle_sort().await
    }

    pub async fn clear(&self) {
        self.reconciler.lock().await.clear().await;
        let _ = self.events.send(SessionEvent::Cleared);
    }
}

fn snapshot_of(reconciler: &Reconciler) -> ChecklistSnapshot {
    ChecklistSnapshot {
        phase: reconciler.phase(),
        image: reconciler.image().map(str::to_string),
        items: reconciler.view(),
        sorted: reconciler.is_sorted(),
        error: reconciler.error().map(str::to_string),
        latest_thought: reconciler.latest_thought().cloned(),
    }
}

async fn run_extraction(
    reconciler: Arc<Mutex<Reconciler>>,
    client: Arc<ExtractionClient>,
    events: broadcast::Sender<SessionEvent>,
    generation: Generation,
    base64: String,
) -> ExtractionOutcome {
    let (tx, rx) = mpsc::unbounded_channel();
    let forwarder = tokio::spawn(forward_thoughts(
        reconciler.clone(),
        events.clone(),
        generation,
        rx,
    ));

    let result = client.extract(&base64, Some(&tx)).await;
    drop(tx);
    let _ = forwarder.await;

    let applied = {
        let mut reconciler = reconciler.lock().await;
        match &result {
            Ok(items) => reconciler.complete_extraction(generation, items.clone()).await,
            Err(e) => reconciler.fail_extraction(generation, e.to_string()).await,
        }
    };

    if applied == Applied::Applied {
        let event = match &result {
            Ok(items) => SessionEvent::Populated {
                generation: generation.value(),
                items: items.len(),
            },
            Err(e) => SessionEvent::Failed {
                generation: generation.value(),
                message: e.to_string(),
            },
        };
        let _ = events.send(event);
    } else {
        debug!(generation = generation.value(), "extraction superseded");
    }

    ExtractionOutcome {
        generation,
        applied,
        result,
    }
}

async fn forward_thoughts(
    reconciler: Arc<Mutex<Reconciler>>,
    events: broadcast::Sender<SessionEvent>,
    generation: Generation,
    mut rx: mpsc::UnboundedReceiver<ExtractEvent>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            ExtractEvent::Thought(raw) => {
                let accepted = reconciler.lock().await.apply_thought(generation, &raw);
                if let Some(thought) = accepted {
                    let _ = events.send(SessionEvent::Thought {
                        generation: generation.value(),
                        thought,
                    });
                }
            }
            ExtractEvent::Answer(fragment) => {
                debug!(len = fragment.len(), "answer fragment");
            }
            ExtractEvent::Completed { .. } | ExtractEvent::Failed(_) => break,
        }
    }
}
