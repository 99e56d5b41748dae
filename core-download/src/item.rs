//! Catalog item and collection context types.
//!
//! Items arrive read-only from the metadata layer; the orchestrator never
//! mutates the caller's copies (canonical-metadata correction works on
//! clones).

use serde::{Deserialize, Serialize};

/// One downloadable unit of catalog metadata (a track).
///
/// `catalog_id` is the stable identifier the fetch service addresses; an item
/// without one is ineligible for download. Everything else is display or
/// tagging metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub catalog_id: Option<String>,
    pub title: String,
    /// Display string for the performing artist(s), comma-separated.
    pub artists: String,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    /// `YYYY-MM-DD` or `YYYY`, as delivered by the metadata source.
    pub release_date: Option<String>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub total_tracks: Option<u32>,
    pub total_discs: Option<u32>,
    pub duration_ms: Option<u64>,
    pub artwork_url: Option<String>,
    pub popularity: Option<u8>,
    pub copyright: Option<String>,
    pub publisher: Option<String>,
}

impl CatalogItem {
    /// First artist of a comma-separated display string.
    pub fn first_artist(&self) -> &str {
        self.artists
            .split(',')
            .next()
            .map(str::trim)
            .unwrap_or(&self.artists)
    }

    /// Album artist, falling back to the performing artist(s).
    pub fn album_artist_or_artists(&self) -> &str {
        self.album_artist
            .as_deref()
            .filter(|a| !a.is_empty())
            .unwrap_or(&self.artists)
    }

    /// Four-digit year prefix of the release date, when present.
    pub fn release_year(&self) -> Option<&str> {
        self.release_date.as_deref().and_then(|d| d.get(..4))
    }
}

/// What kind of grouping a batch was selected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Album,
    Playlist,
    /// An artist's full discography.
    Discography,
}

/// The collection a batch belongs to, when it has one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionContext {
    pub name: String,
    pub kind: CollectionKind,
    /// Playlist owner / curator, when known.
    pub owner: Option<String>,
}

impl CollectionContext {
    pub fn new(name: impl Into<String>, kind: CollectionKind) -> Self {
        Self {
            name: name.into(),
            kind,
            owner: None,
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}
