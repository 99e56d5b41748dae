//! Canonical Metadata Source Abstraction

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Canonical values for fields that are often stale in locally cached
/// catalog data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CanonicalDetails {
    pub release_date: Option<String>,
    pub track_number: Option<u32>,
}

/// Catalog metadata collaborator used to correct locally cached release
/// dates and track ordinals before path resolution.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn canonical_details(&self, catalog_id: &str) -> Result<CanonicalDetails>;
}
