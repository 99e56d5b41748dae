//! Queue Ledger Abstraction
//!
//! Every item entering the download pipeline is recorded as a queue entry
//! that outlives the orchestrator's in-memory run state, giving external
//! observers (persisted history, UI queues) a durable audit trail.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::error::Result;

/// Unique identifier for a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerEntryId(Uuid);

impl LedgerEntryId {
    /// Create a new random entry ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an entry ID from its string representation.
    pub fn from_string(s: &str) -> std::result::Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for LedgerEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LedgerEntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for LedgerEntryId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Durable per-item queue record keeper.
///
/// Entries are created when an item enters the pipeline (including items
/// resolved as already existing) and move to exactly one terminal state.
/// Implementations must never drop entries mid-session.
#[async_trait]
pub trait QueueLedger: Send + Sync {
    /// Record a new queued item and return its entry ID.
    async fn enqueue(
        &self,
        catalog_id: &str,
        title: &str,
        artist: &str,
        collection: Option<&str>,
    ) -> Result<LedgerEntryId>;

    /// Mark an entry as actively downloading.
    async fn mark_downloading(&self, entry_id: LedgerEntryId) -> Result<()>;

    /// Terminal: the file was fetched successfully.
    async fn mark_succeeded(&self, entry_id: LedgerEntryId, file_path: &Path) -> Result<()>;

    /// Terminal: the file already existed and no work was done.
    async fn mark_skipped(&self, entry_id: LedgerEntryId, file_path: &Path) -> Result<()>;

    /// Terminal: the item could not be fetched.
    async fn mark_failed(&self, entry_id: LedgerEntryId, reason: &str) -> Result<()>;
}
