//! # Batch Run State & Summary
//!
//! In-memory bookkeeping for one orchestrator run: which items ended where,
//! how far along the run is, and what the caller should be told at the end.
//!
//! Outcome sets are keyed by catalog identifier and mutually exclusive: a
//! later outcome for the same identifier supersedes its earlier membership.
//! Progress is clamped to 0-100 and never decreases within a run.

use core_runtime::events::EventSeverity;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Descriptor of the item currently being processed, for observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentDownload {
    pub catalog_id: String,
    pub title: String,
    pub artist: String,
}

/// Mutable per-run state, owned by the orchestrator loop.
#[derive(Debug, Clone, Default)]
pub struct BatchRunState {
    downloaded: HashSet<String>,
    skipped: HashSet<String>,
    failed: HashSet<String>,
    progress_percent: u8,
    current: Option<CurrentDownload>,
}

impl BatchRunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard all outcome marks and progress, ready for a new run.
    pub fn reset(&mut self) {
        self.downloaded.clear();
        self.skipped.clear();
        self.failed.clear();
        self.progress_percent = 0;
        self.current = None;
    }

    pub fn mark_downloaded(&mut self, catalog_id: &str) {
        self.skipped.remove(catalog_id);
        self.failed.remove(catalog_id);
        self.downloaded.insert(catalog_id.to_string());
    }

    pub fn mark_skipped(&mut self, catalog_id: &str) {
        self.downloaded.remove(catalog_id);
        self.failed.remove(catalog_id);
        self.skipped.insert(catalog_id.to_string());
    }

    pub fn mark_failed(&mut self, catalog_id: &str) {
        self.downloaded.remove(catalog_id);
        self.skipped.remove(catalog_id);
        self.failed.insert(catalog_id.to_string());
    }

    /// Record progress after an item reached a terminal state.
    ///
    /// Returns the updated percentage: `round(100 × completed / total)`,
    /// clamped to 0-100 and monotonically non-decreasing.
    pub fn record_progress(&mut self, completed: usize, total: usize) -> u8 {
        let percent = if total == 0 {
            100
        } else {
            (((completed as f64 / total as f64) * 100.0).round() as u8).min(100)
        };
        self.progress_percent = self.progress_percent.max(percent);
        self.progress_percent
    }

    pub fn set_current(&mut self, current: CurrentDownload) {
        self.current = Some(current);
    }

    pub fn clear_current(&mut self) {
        self.current = None;
    }

    pub fn current(&self) -> Option<&CurrentDownload> {
        self.current.as_ref()
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    pub fn downloaded(&self) -> &HashSet<String> {
        &self.downloaded
    }

    pub fn skipped(&self) -> &HashSet<String> {
        &self.skipped
    }

    pub fn failed(&self) -> &HashSet<String> {
        &self.failed
    }
}

/// Terminal outcome for one item.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackOutcome {
    Succeeded { file_path: PathBuf },
    Skipped { file_path: Option<PathBuf> },
    Failed { reason: String },
}

impl TrackOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, TrackOutcome::Failed { .. })
    }
}

/// How a completed run is classified for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SummaryKind {
    /// Every item downloaded.
    AllSucceeded,
    /// Every item was already present; nothing new.
    NothingNew,
    /// Some downloaded, some already present, no failures.
    PartlySkipped,
    /// At least one item failed.
    CompletedWithFailures,
}

/// Aggregate result of one batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Items submitted.
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Items that reached a terminal state before the run ended.
    pub completed: usize,
    /// Items abandoned by cancellation (never fetched).
    pub remaining: usize,
    pub cancelled: bool,
}

impl BatchSummary {
    pub fn kind(&self) -> SummaryKind {
        if self.failed > 0 {
            SummaryKind::CompletedWithFailures
        } else if self.succeeded == 0 && self.skipped > 0 {
            SummaryKind::NothingNew
        } else if self.skipped > 0 {
            SummaryKind::PartlySkipped
        } else {
            SummaryKind::AllSucceeded
        }
    }

    /// Human-readable outcome line, the batch-level toast equivalent.
    pub fn message(&self) -> String {
        if self.cancelled {
            return format!(
                "Download stopped. {} of {} items processed, {} remaining.",
                self.completed, self.total, self.remaining
            );
        }
        match self.kind() {
            SummaryKind::AllSucceeded => {
                format!("Downloaded {} tracks successfully", self.succeeded)
            }
            SummaryKind::NothingNew => {
                format!("All {} tracks already present, nothing new", self.skipped)
            }
            SummaryKind::PartlySkipped => format!(
                "Downloaded {} tracks, {} already present",
                self.succeeded, self.skipped
            ),
            SummaryKind::CompletedWithFailures => format!(
                "Downloaded {} tracks, {} skipped, {} failed",
                self.succeeded, self.skipped, self.failed
            ),
        }
    }

    /// Severity the caller should surface the summary with.
    pub fn severity(&self) -> EventSeverity {
        match self.kind() {
            SummaryKind::CompletedWithFailures => EventSeverity::Warning,
            _ => EventSeverity::Info,
        }
    }
}
