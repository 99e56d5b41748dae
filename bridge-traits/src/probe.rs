//! Local Existence Probe Abstraction
//!
//! One batched filesystem query per run decides which items are already
//! satisfied on disk, so the core never pays for a fetch it does not need.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::fetch::AudioFormat;

/// Per-item descriptor for an existence check.
///
/// `relative_path` is the candidate location resolved from the active
/// templates, relative to the probe's root directory. The display fields and
/// ordinals ride along so implementations can tolerate files written under a
/// different template than the one currently configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeQuery {
    pub catalog_id: String,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub track_number: Option<u32>,
    pub position: Option<u32>,
    pub use_album_track_number: bool,
    pub relative_path: PathBuf,
}

/// Probe verdict for one query, positionally matched to the query slice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeHit {
    pub exists: bool,
    pub file_path: Option<PathBuf>,
}

/// Batched local-filesystem oracle.
///
/// Invoked once per batch with every eligible item. `directory` is the
/// batch's collection-level directory (implementations keeping per-collection
/// indexes can use it); `root` is the configured download root that all
/// `relative_path` values are resolved against. An exact path match is the
/// primary check.
#[async_trait]
pub trait ExistenceProbe: Send + Sync {
    async fn probe_batch(
        &self,
        directory: &Path,
        root: &Path,
        format: AudioFormat,
        queries: &[ProbeQuery],
    ) -> Result<Vec<ProbeHit>>;
}
