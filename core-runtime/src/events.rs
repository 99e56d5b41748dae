//! # Event Bus System
//!
//! Typed result stream for the download core, built on
//! `tokio::sync::broadcast`.
//!
//! The orchestrator and the session manager emit one event per state
//! transition (item started / skipped / succeeded / failed, progress ticks,
//! credential refreshes) plus a single terminal summary event per batch. The
//! presentation layer subscribes and maintains its own view state; the core
//! never holds UI state of its own.
//!
//! ```text
//! ┌──────────────┐    emit     ┌───────────┐
//! │ Session Mgr  ├────────────>│           │
//! └──────────────┘             │ EventBus  │   subscribe   ┌────────────┐
//! ┌──────────────┐    emit     │(broadcast)├──────────────>│ Subscriber │
//! │ Orchestrator ├────────────>│           │               └────────────┘
//! └──────────────┘             └───────────┘
//! ```
//!
//! Slow subscribers receive `RecvError::Lagged` and keep going; `Closed`
//! signals shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Session credential lifecycle events
    Session(SessionEvent),
    /// Batch download events
    Download(DownloadEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Session(e) => e.description(),
            CoreEvent::Download(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Session(SessionEvent::RefreshFailed { .. }) => EventSeverity::Error,
            CoreEvent::Download(DownloadEvent::TrackFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Download(DownloadEvent::ManifestFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Download(DownloadEvent::BatchCompleted { failed, .. }) if *failed > 0 => {
                EventSeverity::Warning
            }
            CoreEvent::Download(DownloadEvent::BatchCompleted { .. }) => EventSeverity::Info,
            CoreEvent::Download(DownloadEvent::BatchCancelled { .. }) => EventSeverity::Info,
            CoreEvent::Download(DownloadEvent::TrackSucceeded { .. }) => EventSeverity::Info,
            CoreEvent::Session(SessionEvent::Refreshed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and surfacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Session Events
// ============================================================================

/// Events related to the session credential lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SessionEvent {
    /// A credential refresh has started.
    Refreshing,
    /// A refreshed credential is now cached.
    Refreshed {
        /// Unix timestamp (seconds) when the new credential expires.
        expires_at: i64,
    },
    /// Credential refresh failed.
    RefreshFailed {
        /// Human-readable error message.
        message: String,
        /// Whether retrying later can succeed without user action.
        recoverable: bool,
    },
}

impl SessionEvent {
    fn description(&self) -> &str {
        match self {
            SessionEvent::Refreshing => "Refreshing session credential",
            SessionEvent::Refreshed { .. } => "Session credential refreshed",
            SessionEvent::RefreshFailed { .. } => "Session credential refresh failed",
        }
    }
}

// ============================================================================
// Download Events
// ============================================================================

/// Events emitted by the batch orchestrator, one per item transition plus a
/// terminal summary per run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum DownloadEvent {
    /// A batch run has started.
    BatchStarted {
        /// Number of items submitted.
        total: u64,
        /// Collection name when the batch targets one.
        collection: Option<String>,
    },
    /// An item is now being processed.
    TrackStarted {
        catalog_id: String,
        title: String,
        artist: String,
    },
    /// An item finished downloading.
    TrackSucceeded {
        catalog_id: String,
        file_path: String,
    },
    /// An item was already present and no work was done.
    TrackSkipped {
        catalog_id: String,
        file_path: Option<String>,
    },
    /// An item reached a terminal failure.
    TrackFailed {
        /// Absent when the item had no catalog identifier.
        catalog_id: Option<String>,
        message: String,
    },
    /// Aggregate progress after an item reached a terminal state.
    Progress {
        completed: u64,
        total: u64,
        /// 0-100, monotonically non-decreasing within a run.
        percent: u8,
    },
    /// The batch ran to completion.
    BatchCompleted {
        succeeded: u64,
        skipped: u64,
        failed: u64,
        /// Human-readable outcome classification.
        message: String,
    },
    /// The batch stopped early on a cancellation request.
    BatchCancelled {
        completed: u64,
        remaining: u64,
    },
    /// A playlist manifest was written for the collection.
    ManifestWritten {
        collection: String,
        entries: u64,
    },
    /// Manifest emission failed; item outcomes are unaffected.
    ManifestFailed {
        collection: String,
        message: String,
    },
}

impl DownloadEvent {
    fn description(&self) -> &str {
        match self {
            DownloadEvent::BatchStarted { .. } => "Batch download started",
            DownloadEvent::TrackStarted { .. } => "Track download started",
            DownloadEvent::TrackSucceeded { .. } => "Track downloaded",
            DownloadEvent::TrackSkipped { .. } => "Track already present",
            DownloadEvent::TrackFailed { .. } => "Track download failed",
            DownloadEvent::Progress { .. } => "Batch progress",
            DownloadEvent::BatchCompleted { .. } => "Batch completed",
            DownloadEvent::BatchCancelled { .. } => "Batch cancelled",
            DownloadEvent::ManifestWritten { .. } => "Playlist manifest written",
            DownloadEvent::ManifestFailed { .. } => "Playlist manifest failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally: multiple producers (clone the
/// bus), multiple independent consumers (each `subscribe()`), non-blocking
/// sends, lagging detection for slow subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// when there are none. Emitters that do not care use `.ok()`.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber receiving all future events.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` wrapper with optional filtering.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter; only matching events are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
