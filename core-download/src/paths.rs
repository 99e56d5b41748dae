//! # Path Template Resolver
//!
//! Pure mapping from item metadata plus template strings to sanitized,
//! OS-appropriate relative paths.
//!
//! Recognized placeholders: `{artist}`, `{album}`, `{album_artist}`,
//! `{title}`, `{track}`, `{disc}`, `{year}`, `{date}`, `{playlist}`,
//! `{catalog_id}`.
//!
//! Separator invariant: a path separator inside a metadata value must never
//! create an extra segment. Values are tokenized before substitution and the
//! token is restored as a single space inside each finished segment, so
//! `"AC/DC"` under `{artist}/{album}` yields the segment `"AC DC"`.

use crate::config::{TargetOs, TemplateConfig};
use crate::item::{CatalogItem, CollectionContext};
use bridge_traits::fetch::AudioFormat;
use std::path::PathBuf;

/// Stand-in for path separators found inside metadata values, restored as a
/// space after segmentation. U+0001 never survives sanitization on its own.
const SEPARATOR_TOKEN: char = '\u{1}';

/// Windows device names that cannot be used as path components.
const WINDOWS_RESERVED: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Inputs that vary per call site rather than per item.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveContext<'a> {
    /// Collection the batch belongs to, if any (`{playlist}` source).
    pub collection: Option<&'a CollectionContext>,
    /// Item's fixed 1-based index within the submitted batch. Absent for
    /// one-off downloads.
    pub position: Option<u32>,
    /// Resolve artist placeholders to the first listed artist only.
    pub first_artist_only: bool,
}

/// A fully resolved on-disk location, relative to the download root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Ordered sanitized folder segments.
    pub folder_segments: Vec<String>,
    /// Sanitized file name, without extension. Never empty.
    pub file_name: String,
}

impl ResolvedPath {
    /// Joins the segments and file name into a relative path with the
    /// format's extension.
    pub fn relative_path(&self, format: AudioFormat) -> PathBuf {
        let mut path: PathBuf = self.folder_segments.iter().collect();
        path.push(format!("{}.{}", self.file_name, format.extension()));
        path
    }
}

/// Resolve the complete relative location for one item.
///
/// Pure function of its inputs; resolving twice yields identical output.
pub fn resolve_item_path(
    item: &CatalogItem,
    templates: &TemplateConfig,
    ctx: &ResolveContext<'_>,
    os: TargetOs,
) -> ResolvedPath {
    let values = placeholder_values(item, templates, ctx);
    ResolvedPath {
        folder_segments: resolve_folder_segments(&templates.folder_template, &values, os),
        file_name: resolve_file_name(&templates.filename_template, &values, os),
    }
}

/// Split a folder template into sanitized segments.
///
/// Only the template's own `/` characters delimit segments; tokenized
/// separators from values do not. Segments that sanitize to nothing are
/// dropped.
pub fn resolve_folder_segments(
    template: &str,
    values: &PlaceholderValues,
    os: TargetOs,
) -> Vec<String> {
    let substituted = substitute(template, values);
    substituted
        .split('/')
        .filter_map(|segment| {
            let restored = segment.replace(SEPARATOR_TOKEN, " ");
            let clean = sanitize_component(&restored, os);
            (!clean.is_empty()).then_some(clean)
        })
        .collect()
}

/// Resolve a filename template into a sanitized file name (no extension).
///
/// Unlike folder segments an empty result is not allowed; it falls back to
/// `"Unknown"`.
pub fn resolve_file_name(template: &str, values: &PlaceholderValues, os: TargetOs) -> String {
    let substituted = substitute(template, values);
    let restored = substituted.replace(SEPARATOR_TOKEN, " ");
    let clean = sanitize_component(&restored, os);
    if clean.is_empty() {
        "Unknown".to_string()
    } else {
        clean
    }
}

/// Strip characters the target OS cannot store in a path component.
///
/// Control characters are removed (tab/newline become spaces and collapse),
/// illegal characters become spaces, whitespace and underscore runs collapse,
/// and trailing dots/spaces/underscores are trimmed. On Windows, reserved
/// device names get an underscore suffix.
pub fn sanitize_component(name: &str, os: TargetOs) -> String {
    let mut replaced = String::with_capacity(name.len());
    for c in name.chars() {
        if c == '\t' || c == '\n' || c == '\r' {
            replaced.push(' ');
        } else if c.is_control() {
            continue;
        } else if is_illegal(c, os) {
            replaced.push(' ');
        } else {
            replaced.push(c);
        }
    }

    let collapsed_ws = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let collapsed = collapse_underscores(&collapsed_ws);
    let trimmed = collapsed.trim_matches(['_', ' ', '.']).to_string();

    avoid_reserved_name(trimmed, os)
}

fn is_illegal(c: char, os: TargetOs) -> bool {
    match os {
        TargetOs::Windows => matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\\' | '/'),
        TargetOs::MacOs => matches!(c, ':' | '/'),
        TargetOs::Linux => c == '/',
    }
}

fn collapse_underscores(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut previous_underscore = false;
    for c in name.chars() {
        if c == '_' {
            if !previous_underscore {
                out.push(c);
            }
            previous_underscore = true;
        } else {
            out.push(c);
            previous_underscore = false;
        }
    }
    out
}

fn avoid_reserved_name(name: String, os: TargetOs) -> String {
    if os != TargetOs::Windows || name.is_empty() {
        return name;
    }
    let stem = name.split('.').next().unwrap_or("");
    if WINDOWS_RESERVED
        .iter()
        .any(|reserved| stem.eq_ignore_ascii_case(reserved))
    {
        format!("{}_", name)
    } else {
        name
    }
}

/// Escaped substitution values for one item in one context.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderValues {
    pub artist: String,
    pub album: String,
    pub album_artist: String,
    pub title: String,
    /// Position value after album-layout precedence was applied.
    pub track: Option<u32>,
    pub disc: Option<u32>,
    pub year: String,
    pub date: String,
    pub playlist: String,
    pub catalog_id: String,
}

/// Build substitution values, applying the first-artist option, the
/// album-artist fallback, and track-position precedence.
pub fn placeholder_values(
    item: &CatalogItem,
    templates: &TemplateConfig,
    ctx: &ResolveContext<'_>,
) -> PlaceholderValues {
    let artist = if ctx.first_artist_only {
        item.first_artist()
    } else {
        &item.artists
    };
    let album_artist = if ctx.first_artist_only {
        item.album_artist_or_artists()
            .split(',')
            .next()
            .map(str::trim)
            .unwrap_or_default()
    } else {
        item.album_artist_or_artists()
    };

    // Album-oriented layouts keep canonical album ordering; ad-hoc lists
    // number items by their submission index.
    let track = if templates.is_album_layout() {
        item.track_number.or(ctx.position)
    } else {
        ctx.position
    };

    PlaceholderValues {
        artist: escape_separators(artist),
        album: escape_separators(item.album.as_deref().unwrap_or_default()),
        album_artist: escape_separators(album_artist),
        title: escape_separators(&item.title),
        track,
        disc: item.disc_number,
        year: item.release_year().unwrap_or_default().to_string(),
        date: escape_separators(item.release_date.as_deref().unwrap_or_default()),
        playlist: escape_separators(ctx.collection.map(|c| c.name.as_str()).unwrap_or_default()),
        catalog_id: escape_separators(item.catalog_id.as_deref().unwrap_or_default()),
    }
}

fn escape_separators(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' {
                SEPARATOR_TOKEN
            } else {
                c
            }
        })
        .collect()
}

fn substitute(template: &str, values: &PlaceholderValues) -> String {
    let mut out = template.to_string();
    out = out.replace("{artist}", &values.artist);
    out = out.replace("{album}", &values.album);
    out = out.replace("{album_artist}", &values.album_artist);
    out = out.replace("{title}", &values.title);
    out = out.replace("{year}", &values.year);
    out = out.replace("{date}", &values.date);
    out = out.replace("{playlist}", &values.playlist);
    out = out.replace("{catalog_id}", &values.catalog_id);

    out = match values.disc {
        Some(disc) => out.replace("{disc}", &disc.to_string()),
        None => out.replace("{disc}", ""),
    };

    match values.track {
        Some(track) => out.replace("{track}", &format!("{:02}", track)),
        // No position available: drop the placeholder and its decoration.
        None => out
            .replace("{track}. ", "")
            .replace("{track} - ", "")
            .replace("{track} ", "")
            .replace("{track}", ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::CollectionKind;

    fn item() -> CatalogItem {
        CatalogItem {
            catalog_id: Some("cat-42".to_string()),
            title: "One More Time".to_string(),
            artists: "Daft Punk".to_string(),
            album: Some("Discovery".to_string()),
            release_date: Some("2001-03-12".to_string()),
            track_number: Some(1),
            disc_number: Some(1),
            ..Default::default()
        }
    }

    fn templates(folder: &str, filename: &str) -> TemplateConfig {
        TemplateConfig {
            folder_template: folder.to_string(),
            filename_template: filename.to_string(),
        }
    }

    #[test]
    fn test_basic_resolution() {
        let resolved = resolve_item_path(
            &item(),
            &templates("{artist}/{album}", "{title} - {artist}"),
            &ResolveContext::default(),
            TargetOs::Linux,
        );

        assert_eq!(resolved.folder_segments, vec!["Daft Punk", "Discovery"]);
        assert_eq!(resolved.file_name, "One More Time - Daft Punk");
        assert_eq!(
            resolved.relative_path(AudioFormat::Mp3),
            PathBuf::from("Daft Punk/Discovery/One More Time - Daft Punk.mp3")
        );
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let config = templates("{artist}/{album}", "{track}. {title}");
        let ctx = ResolveContext {
            position: Some(3),
            ..Default::default()
        };
        let first = resolve_item_path(&item(), &config, &ctx, TargetOs::Windows);
        let second = resolve_item_path(&item(), &config, &ctx, TargetOs::Windows);
        assert_eq!(first, second);
    }

    #[test]
    fn test_separator_in_value_never_splits_segments() {
        let mut ac_dc = item();
        ac_dc.artists = "AC/DC".to_string();
        ac_dc.album = Some("Back in Black".to_string());

        let resolved = resolve_item_path(
            &ac_dc,
            &templates("{artist}/{album}", "{title}"),
            &ResolveContext::default(),
            TargetOs::Linux,
        );

        assert_eq!(resolved.folder_segments, vec!["AC DC", "Back in Black"]);
    }

    #[test]
    fn test_backslash_in_value_is_escaped() {
        let mut weird = item();
        weird.title = r"Slash\Title".to_string();

        let resolved = resolve_item_path(
            &weird,
            &templates("", "{title}"),
            &ResolveContext::default(),
            TargetOs::Linux,
        );
        assert_eq!(resolved.file_name, "Slash Title");
    }

    #[test]
    fn test_album_layout_prefers_album_ordinal() {
        let mut third = item();
        third.track_number = Some(7);

        let values = placeholder_values(
            &third,
            &templates("{artist}/{album}", "{track}. {title}"),
            &ResolveContext {
                position: Some(3),
                ..Default::default()
            },
        );
        assert_eq!(values.track, Some(7));
    }

    #[test]
    fn test_flat_layout_uses_sequential_position() {
        let mut third = item();
        third.track_number = Some(7);

        let values = placeholder_values(
            &third,
            &templates("", "{track}. {title}"),
            &ResolveContext {
                position: Some(3),
                ..Default::default()
            },
        );
        assert_eq!(values.track, Some(3));
    }

    #[test]
    fn test_track_number_is_zero_padded() {
        let resolved = resolve_item_path(
            &item(),
            &templates("{artist}/{album}", "{track}. {title}"),
            &ResolveContext::default(),
            TargetOs::Linux,
        );
        assert_eq!(resolved.file_name, "01. One More Time");
    }

    #[test]
    fn test_track_decoration_removed_without_position() {
        let mut no_ordinal = item();
        no_ordinal.track_number = None;

        let config = templates("", "{track}. {title}");
        let resolved = resolve_item_path(
            &no_ordinal,
            &config,
            &ResolveContext::default(),
            TargetOs::Linux,
        );
        assert_eq!(resolved.file_name, "One More Time");

        let dashed = templates("", "{track} - {title}");
        let resolved = resolve_item_path(
            &no_ordinal,
            &dashed,
            &ResolveContext::default(),
            TargetOs::Linux,
        );
        assert_eq!(resolved.file_name, "One More Time");
    }

    #[test]
    fn test_missing_values_collapse_folder_segments() {
        let mut bare = item();
        bare.album = None;

        let resolved = resolve_item_path(
            &bare,
            &templates("{playlist}/{artist}/{album}", "{title}"),
            &ResolveContext::default(),
            TargetOs::Linux,
        );

        // No playlist and no album: only the artist segment survives.
        assert_eq!(resolved.folder_segments, vec!["Daft Punk"]);
    }

    #[test]
    fn test_playlist_segment_from_collection() {
        let collection = CollectionContext::new("Summer Mix", CollectionKind::Playlist);
        let resolved = resolve_item_path(
            &item(),
            &templates("{playlist}/{artist}", "{title}"),
            &ResolveContext {
                collection: Some(&collection),
                ..Default::default()
            },
            TargetOs::Linux,
        );
        assert_eq!(resolved.folder_segments, vec!["Summer Mix", "Daft Punk"]);
    }

    #[test]
    fn test_empty_filename_falls_back_to_unknown() {
        let mut empty = item();
        empty.title = "???".to_string();

        let resolved = resolve_item_path(
            &empty,
            &templates("", "{title}"),
            &ResolveContext::default(),
            TargetOs::Windows,
        );
        assert_eq!(resolved.file_name, "Unknown");
    }

    #[test]
    fn test_windows_illegal_characters_stripped() {
        assert_eq!(
            sanitize_component("What <is> \"this\": a|test?*", TargetOs::Windows),
            "What is this a test"
        );
    }

    #[test]
    fn test_linux_keeps_windows_specials() {
        assert_eq!(
            sanitize_component("a: b? c", TargetOs::Linux),
            "a: b? c"
        );
    }

    #[test]
    fn test_windows_reserved_names_suffixed() {
        assert_eq!(sanitize_component("CON", TargetOs::Windows), "CON_");
        assert_eq!(sanitize_component("com1", TargetOs::Windows), "com1_");
        assert_eq!(sanitize_component("CON", TargetOs::Linux), "CON");
        assert_eq!(sanitize_component("Concert", TargetOs::Windows), "Concert");
    }

    #[test]
    fn test_whitespace_and_underscores_collapse() {
        assert_eq!(
            sanitize_component("  a   b\t\tc  ", TargetOs::Linux),
            "a b c"
        );
        assert_eq!(sanitize_component("__a___b__", TargetOs::Linux), "a_b");
    }

    #[test]
    fn test_trailing_dots_trimmed() {
        assert_eq!(sanitize_component("album...", TargetOs::Windows), "album");
    }

    #[test]
    fn test_first_artist_only_resolution() {
        let mut multi = item();
        multi.artists = "Daft Punk, Pharrell Williams".to_string();

        let values = placeholder_values(
            &multi,
            &templates("{artist}", "{title}"),
            &ResolveContext {
                first_artist_only: true,
                ..Default::default()
            },
        );
        assert_eq!(values.artist, "Daft Punk");
    }

    #[test]
    fn test_year_and_date_placeholders() {
        let resolved = resolve_item_path(
            &item(),
            &templates("{year}", "{date} {title}"),
            &ResolveContext::default(),
            TargetOs::Linux,
        );
        assert_eq!(resolved.folder_segments, vec!["2001"]);
        assert_eq!(resolved.file_name, "2001-03-12 One More Time");
    }
}
