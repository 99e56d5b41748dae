//! # Download Queue Ledger
//!
//! Per-item queue records with validated lifecycle transitions.
//!
//! ## State Machine
//!
//! ```text
//! Queued → Downloading → Succeeded
//!    ↓          ↓      ↘
//!    ↓          ↓        Skipped
//!    └──────→ Failed ←──────┘ (from Downloading)
//! ```
//!
//! Entries are created when an item enters the pipeline — including items the
//! existence probe resolves immediately — and reach exactly one terminal
//! state. They are never deleted during a session, forming an audit trail
//! independent of the orchestrator's in-memory run state.

use crate::error::{DownloadError, Result};
use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::ledger::{LedgerEntryId, QueueLedger};
use bridge_traits::time::Clock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Lifecycle state of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    /// Entry recorded, no work started.
    Queued,
    /// The fetch service is working on this item.
    Downloading,
    /// File fetched successfully.
    Succeeded,
    /// File already existed; no work was done.
    Skipped,
    /// Item could not be fetched.
    Failed,
}

impl EntryState {
    /// Check if this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EntryState::Succeeded | EntryState::Skipped | EntryState::Failed
        )
    }

    /// String representation for storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryState::Queued => "queued",
            EntryState::Downloading => "downloading",
            EntryState::Succeeded => "succeeded",
            EntryState::Skipped => "skipped",
            EntryState::Failed => "failed",
        }
    }
}

impl FromStr for EntryState {
    type Err = DownloadError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(EntryState::Queued),
            "downloading" => Ok(EntryState::Downloading),
            "succeeded" => Ok(EntryState::Succeeded),
            "skipped" => Ok(EntryState::Skipped),
            "failed" => Ok(EntryState::Failed),
            _ => Err(DownloadError::InvalidEntryState(s.to_string())),
        }
    }
}

impl std::fmt::Display for EntryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One recorded queue item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: LedgerEntryId,
    pub catalog_id: String,
    pub title: String,
    pub artist: String,
    pub collection: Option<String>,
    pub state: EntryState,
    /// Resolved file location for succeeded/skipped entries.
    pub file_path: Option<PathBuf>,
    /// Failure reason for failed entries.
    pub failure_reason: Option<String>,
    pub enqueued_at: i64,
    pub finished_at: Option<i64>,
}

impl QueueEntry {
    pub fn new(
        catalog_id: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
        collection: Option<String>,
        now: i64,
    ) -> Self {
        Self {
            id: LedgerEntryId::new(),
            catalog_id: catalog_id.into(),
            title: title.into(),
            artist: artist.into(),
            collection,
            state: EntryState::Queued,
            file_path: None,
            failure_reason: None,
            enqueued_at: now,
            finished_at: None,
        }
    }

    /// Transition to `Downloading`.
    pub fn begin_download(&mut self) -> Result<()> {
        self.validate_transition(EntryState::Downloading)?;
        self.state = EntryState::Downloading;
        Ok(())
    }

    /// Terminal transition to `Succeeded`.
    pub fn succeed(&mut self, file_path: PathBuf, now: i64) -> Result<()> {
        self.validate_transition(EntryState::Succeeded)?;
        self.state = EntryState::Succeeded;
        self.file_path = Some(file_path);
        self.finished_at = Some(now);
        Ok(())
    }

    /// Terminal transition to `Skipped`.
    pub fn skip(&mut self, file_path: PathBuf, now: i64) -> Result<()> {
        self.validate_transition(EntryState::Skipped)?;
        self.state = EntryState::Skipped;
        self.file_path = Some(file_path);
        self.finished_at = Some(now);
        Ok(())
    }

    /// Terminal transition to `Failed`.
    pub fn fail(&mut self, reason: impl Into<String>, now: i64) -> Result<()> {
        self.validate_transition(EntryState::Failed)?;
        self.state = EntryState::Failed;
        self.failure_reason = Some(reason.into());
        self.finished_at = Some(now);
        Ok(())
    }

    fn validate_transition(&self, to: EntryState) -> Result<()> {
        let valid = match (self.state, to) {
            (EntryState::Queued, EntryState::Downloading) => true,
            (EntryState::Queued, EntryState::Skipped) => true,
            (EntryState::Queued, EntryState::Failed) => true,
            (EntryState::Downloading, EntryState::Succeeded) => true,
            // The fetch service can discover the file mid-flight.
            (EntryState::Downloading, EntryState::Skipped) => true,
            (EntryState::Downloading, EntryState::Failed) => true,
            _ => false,
        };

        if !valid {
            return Err(DownloadError::InvalidEntryTransition {
                from: self.state.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }

        Ok(())
    }
}

/// In-memory `QueueLedger` for the lifetime of a session.
///
/// Entries accumulate across runs and are observable via [`entries`]
/// snapshots; nothing is removed until the ledger itself is dropped.
///
/// [`entries`]: SessionLedger::entries
pub struct SessionLedger {
    clock: Arc<dyn Clock>,
    entries: Mutex<Vec<QueueEntry>>,
}

impl SessionLedger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of every entry recorded so far, in enqueue order.
    pub async fn entries(&self) -> Vec<QueueEntry> {
        self.entries.lock().await.clone()
    }

    /// Look up a single entry by ID.
    pub async fn find(&self, entry_id: LedgerEntryId) -> Option<QueueEntry> {
        self.entries
            .lock()
            .await
            .iter()
            .find(|e| e.id == entry_id)
            .cloned()
    }

    async fn update<F>(&self, entry_id: LedgerEntryId, apply: F) -> BridgeResult<()>
    where
        F: FnOnce(&mut QueueEntry, i64) -> Result<()>,
    {
        let now = self.clock.unix_timestamp();
        let mut entries = self.entries.lock().await;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == entry_id)
            .ok_or_else(|| {
                BridgeError::OperationFailed(
                    DownloadError::EntryNotFound(entry_id.to_string()).to_string(),
                )
            })?;
        apply(entry, now).map_err(|e| BridgeError::OperationFailed(e.to_string()))
    }
}

#[async_trait]
impl QueueLedger for SessionLedger {
    async fn enqueue(
        &self,
        catalog_id: &str,
        title: &str,
        artist: &str,
        collection: Option<&str>,
    ) -> BridgeResult<LedgerEntryId> {
        let entry = QueueEntry::new(
            catalog_id,
            title,
            artist,
            collection.map(str::to_string),
            self.clock.unix_timestamp(),
        );
        let id = entry.id;
        debug!(catalog_id, %id, "queue entry recorded");
        self.entries.lock().await.push(entry);
        Ok(id)
    }

    async fn mark_downloading(&self, entry_id: LedgerEntryId) -> BridgeResult<()> {
        self.update(entry_id, |entry, _| entry.begin_download()).await
    }

    async fn mark_succeeded(&self, entry_id: LedgerEntryId, file_path: &Path) -> BridgeResult<()> {
        self.update(entry_id, |entry, now| {
            entry.succeed(file_path.to_path_buf(), now)
        })
        .await
    }

    async fn mark_skipped(&self, entry_id: LedgerEntryId, file_path: &Path) -> BridgeResult<()> {
        self.update(entry_id, |entry, now| {
            entry.skip(file_path.to_path_buf(), now)
        })
        .await
    }

    async fn mark_failed(&self, entry_id: LedgerEntryId, reason: &str) -> BridgeResult<()> {
        self.update(entry_id, |entry, now| entry.fail(reason, now)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::time::SystemClock;

    fn entry() -> QueueEntry {
        QueueEntry::new("cat-1", "Title", "Artist", None, 1_700_000_000)
    }

    #[test]
    fn test_entry_state_parsing() {
        assert_eq!(EntryState::from_str("queued").unwrap(), EntryState::Queued);
        assert_eq!(
            EntryState::from_str("DOWNLOADING").unwrap(),
            EntryState::Downloading
        );
        assert!(EntryState::from_str("nope").is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!EntryState::Queued.is_terminal());
        assert!(!EntryState::Downloading.is_terminal());
        assert!(EntryState::Succeeded.is_terminal());
        assert!(EntryState::Skipped.is_terminal());
        assert!(EntryState::Failed.is_terminal());
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut e = entry();
        e.begin_download().unwrap();
        assert_eq!(e.state, EntryState::Downloading);
        e.succeed(PathBuf::from("/music/a.mp3"), 1_700_000_100).unwrap();
        assert_eq!(e.state, EntryState::Succeeded);
        assert_eq!(e.finished_at, Some(1_700_000_100));
    }

    #[test]
    fn test_skip_straight_from_queued() {
        let mut e = entry();
        e.skip(PathBuf::from("/music/a.mp3"), 1).unwrap();
        assert_eq!(e.state, EntryState::Skipped);
    }

    #[test]
    fn test_skip_from_downloading() {
        let mut e = entry();
        e.begin_download().unwrap();
        e.skip(PathBuf::from("/music/a.mp3"), 1).unwrap();
        assert_eq!(e.state, EntryState::Skipped);
    }

    #[test]
    fn test_terminal_entries_cannot_transition() {
        let mut e = entry();
        e.fail("boom", 1).unwrap();

        assert!(e.begin_download().is_err());
        assert!(e.succeed(PathBuf::from("/x"), 2).is_err());
        assert!(e.skip(PathBuf::from("/x"), 2).is_err());
        assert!(e.fail("again", 2).is_err());
        // The first failure is untouched.
        assert_eq!(e.failure_reason.as_deref(), Some("boom"));
    }

    #[test]
    fn test_succeed_requires_downloading() {
        let mut e = entry();
        assert!(e.succeed(PathBuf::from("/x"), 1).is_err());
    }

    #[tokio::test]
    async fn test_session_ledger_audit_trail() {
        let ledger = SessionLedger::new(Arc::new(SystemClock));

        let a = ledger.enqueue("cat-a", "A", "Artist", None).await.unwrap();
        let b = ledger
            .enqueue("cat-b", "B", "Artist", Some("Mix"))
            .await
            .unwrap();

        ledger.mark_downloading(a).await.unwrap();
        ledger
            .mark_succeeded(a, Path::new("/music/a.mp3"))
            .await
            .unwrap();
        ledger.mark_failed(b, "fetch failed: 500").await.unwrap();

        let entries = ledger.entries().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].state, EntryState::Succeeded);
        assert_eq!(entries[0].file_path, Some(PathBuf::from("/music/a.mp3")));
        assert_eq!(entries[1].state, EntryState::Failed);
        assert_eq!(entries[1].collection.as_deref(), Some("Mix"));
        assert_eq!(
            entries[1].failure_reason.as_deref(),
            Some("fetch failed: 500")
        );
    }

    #[tokio::test]
    async fn test_session_ledger_unknown_entry() {
        let ledger = SessionLedger::new(Arc::new(SystemClock));
        let missing = ledger
            .mark_failed(LedgerEntryId::new(), "whatever")
            .await;
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn test_session_ledger_rejects_double_terminal() {
        let ledger = SessionLedger::new(Arc::new(SystemClock));
        let id = ledger.enqueue("cat-a", "A", "Artist", None).await.unwrap();

        ledger.mark_skipped(id, Path::new("/music/a.mp3")).await.unwrap();
        assert!(ledger.mark_failed(id, "late failure").await.is_err());
    }
}
