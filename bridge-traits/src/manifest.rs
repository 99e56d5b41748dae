//! Playlist Manifest Abstraction

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Writes a playlist manifest referencing every resolved file of a completed
/// collection download, in collection order.
#[async_trait]
pub trait ManifestWriter: Send + Sync {
    async fn write(
        &self,
        collection_name: &str,
        directory: &Path,
        file_paths: &[PathBuf],
    ) -> Result<()>;
}
