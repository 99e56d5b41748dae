//! Download configuration: target platform, templates, presets.

use bridge_traits::fetch::AudioFormat;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Operating system whose filesystem rules apply to resolved paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetOs {
    Windows,
    MacOs,
    Linux,
}

impl TargetOs {
    /// The OS this binary was built for.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            TargetOs::Windows
        } else if cfg!(target_os = "macos") {
            TargetOs::MacOs
        } else {
            TargetOs::Linux
        }
    }
}

/// Canonical folder layouts. `Custom` carries an arbitrary user template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FolderPreset {
    /// `{playlist}/{artist}/{album}` — collection folder, then artist/album.
    /// The playlist segment collapses away for one-off downloads.
    CollectionArtistAlbum,
    /// `{artist}/{album}`
    ArtistAlbum,
    /// `{album_artist}/{album}`
    AlbumArtistAlbum,
    /// `{playlist}` — everything flat inside the collection folder.
    Collection,
    /// Everything directly in the download root.
    Flat,
    Custom(String),
}

impl FolderPreset {
    pub fn template(&self) -> &str {
        match self {
            FolderPreset::CollectionArtistAlbum => "{playlist}/{artist}/{album}",
            FolderPreset::ArtistAlbum => "{artist}/{album}",
            FolderPreset::AlbumArtistAlbum => "{album_artist}/{album}",
            FolderPreset::Collection => "{playlist}",
            FolderPreset::Flat => "",
            FolderPreset::Custom(template) => template,
        }
    }
}

/// Canonical file name shapes. `Custom` carries an arbitrary user template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilenamePreset {
    /// `{title} - {artist}`
    TitleArtist,
    /// `{artist} - {title}`
    ArtistTitle,
    /// `{title}`
    Title,
    /// `{track}. {title}`
    TrackTitle,
    Custom(String),
}

impl FilenamePreset {
    pub fn template(&self) -> &str {
        match self {
            FilenamePreset::TitleArtist => "{title} - {artist}",
            FilenamePreset::ArtistTitle => "{artist} - {title}",
            FilenamePreset::Title => "{title}",
            FilenamePreset::TrackTitle => "{track}. {title}",
            FilenamePreset::Custom(template) => template,
        }
    }
}

/// The ordered folder template and filename template driving path
/// resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateConfig {
    pub folder_template: String,
    pub filename_template: String,
}

impl TemplateConfig {
    pub fn from_presets(folder: &FolderPreset, filename: &FilenamePreset) -> Self {
        Self {
            folder_template: folder.template().to_string(),
            filename_template: filename.template().to_string(),
        }
    }

    /// Whether the folder layout is album-oriented, which makes the item's
    /// own album ordinal the preferred position value.
    pub fn is_album_layout(&self) -> bool {
        self.folder_template.contains("{album}")
    }
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self::from_presets(
            &FolderPreset::CollectionArtistAlbum,
            &FilenamePreset::TitleArtist,
        )
    }
}

/// Orchestrator settings for one configured download target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadOptions {
    /// Root directory all resolved paths hang off.
    pub base_dir: PathBuf,
    pub format: AudioFormat,
    pub target_os: TargetOs,
    pub templates: TemplateConfig,
    /// Use only the first of several comma-separated artists when resolving
    /// names.
    pub use_first_artist_only: bool,
    /// Emit a playlist manifest after a collection batch completes.
    pub write_manifest: bool,
    /// Consult the metadata source for canonical release dates and track
    /// ordinals before resolving paths.
    pub correct_metadata: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            format: AudioFormat::default(),
            target_os: TargetOs::current(),
            templates: TemplateConfig::default(),
            use_first_artist_only: false,
            write_manifest: false,
            correct_metadata: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_templates() {
        assert_eq!(
            FolderPreset::CollectionArtistAlbum.template(),
            "{playlist}/{artist}/{album}"
        );
        assert_eq!(FolderPreset::Flat.template(), "");
        assert_eq!(
            FolderPreset::Custom("{year}/{album}".to_string()).template(),
            "{year}/{album}"
        );
        assert_eq!(FilenamePreset::TrackTitle.template(), "{track}. {title}");
    }

    #[test]
    fn test_album_layout_detection() {
        assert!(TemplateConfig::default().is_album_layout());
        let flat = TemplateConfig::from_presets(&FolderPreset::Flat, &FilenamePreset::Title);
        assert!(!flat.is_album_layout());
    }
}
