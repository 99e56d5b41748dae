//! # Core Download
//!
//! The batch download orchestrator and its direct collaborators: the pure
//! path template resolver, the existence-probe integration, the queue
//! ledger, and the per-run batch state.
//!
//! The entry point is [`DownloadOrchestrator`]; everything external (fetch
//! service, probe, ledger persistence, credential issuance, manifests) is
//! injected through the `bridge-traits` contracts.

pub mod batch;
pub mod config;
pub mod error;
pub mod item;
pub mod ledger;
pub mod orchestrator;
pub mod paths;

pub use batch::{BatchRunState, BatchSummary, CurrentDownload, SummaryKind, TrackOutcome};
pub use config::{DownloadOptions, FilenamePreset, FolderPreset, TargetOs, TemplateConfig};
pub use error::{DownloadError, Result};
pub use item::{CatalogItem, CollectionContext, CollectionKind};
pub use ledger::{EntryState, QueueEntry, SessionLedger};
pub use orchestrator::DownloadOrchestrator;
pub use paths::{resolve_item_path, sanitize_component, ResolveContext, ResolvedPath};
