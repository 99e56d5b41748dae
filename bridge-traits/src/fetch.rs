//! External Fetch Service Abstraction
//!
//! The byte-level acquisition of a track (download, transcode, tag embedding)
//! is a black box behind [`FetchService`]. The core hands it everything it
//! needs to place a finished file on disk and interprets the receipt; it never
//! touches the wire itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;

/// Target audio container for fetched tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Flac,
}

impl AudioFormat {
    /// File extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Flac => "flac",
        }
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        AudioFormat::Mp3
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Everything the fetch service needs to acquire one track.
///
/// Display metadata rides along so the service can embed tags and build the
/// final file name from `filename_template` on its own; `position` is the
/// item's fixed 1-based index within the batch (absent for one-off downloads).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub catalog_id: String,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub release_date: Option<String>,
    pub artwork_url: Option<String>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    /// Directory the finished file must land in.
    pub output_dir: PathBuf,
    pub format: AudioFormat,
    pub filename_template: String,
    pub position: Option<u32>,
    /// Prefer the album ordinal over `position` when naming.
    pub use_album_track_number: bool,
    /// Session credential token authorizing the request.
    pub credential: String,
}

/// Outcome of a successful fetch call.
///
/// `already_exists` means the service found the target file on disk and did
/// no paid work; callers treat it as a skip. The receipt's `file_path` is
/// ground truth for where the track lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchReceipt {
    pub already_exists: bool,
    pub file_path: PathBuf,
    /// Identifier of the queue record the service created, when it keeps one.
    pub queue_entry_id: Option<String>,
}

/// External acquisition service invoked once per item.
///
/// Transient network retries and per-attempt timeouts are the implementation's
/// concern. Authorization failures must be distinguishable from the error
/// text (callers look for "unauthorized" / "403").
#[async_trait]
pub trait FetchService: Send + Sync {
    async fn fetch_track(&self, request: FetchRequest) -> Result<FetchReceipt>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_format_extension() {
        assert_eq!(AudioFormat::Mp3.extension(), "mp3");
        assert_eq!(AudioFormat::Flac.extension(), "flac");
        assert_eq!(AudioFormat::default(), AudioFormat::Mp3);
    }

    #[test]
    fn test_fetch_request_round_trip() {
        let request = FetchRequest {
            catalog_id: "cat-1".to_string(),
            title: "Title".to_string(),
            artist: "Artist".to_string(),
            album: Some("Album".to_string()),
            album_artist: None,
            release_date: Some("2021-03-05".to_string()),
            artwork_url: None,
            track_number: Some(4),
            disc_number: Some(1),
            output_dir: PathBuf::from("/music/Artist/Album"),
            format: AudioFormat::Flac,
            filename_template: "{track}. {title}".to_string(),
            position: Some(4),
            use_album_track_number: true,
            credential: "token".to_string(),
        };

        let json = serde_json::to_string(&request).unwrap();
        let back: FetchRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.catalog_id, "cat-1");
        assert_eq!(back.format, AudioFormat::Flac);
    }
}
