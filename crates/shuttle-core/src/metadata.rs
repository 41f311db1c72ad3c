//! Parsing of the per-station status document.
//!
//! The status endpoint returns something like:
//!
//! ```json
//! { "current_track": { "title": "Rush - Tom Sawyer",
//!                      "artwork_url_large": "https://..." } }
//! ```
//!
//! Only `current_track` is required. A missing `title` yields empty
//! artist/title; a missing or unparseable artwork URL yields `None`.

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::{Result, ShuttleError};

#[derive(Debug, Deserialize)]
struct StatusDocument {
    #[serde(default)]
    current_track: Option<CurrentTrack>,
}

#[derive(Debug, Deserialize)]
struct CurrentTrack {
    #[serde(default)]
    title: Option<serde_json::Value>,
    #[serde(default)]
    artwork_url_large: Option<serde_json::Value>,
}

/// What one successful poll tells us.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackMetadata {
    pub artist: String,
    pub title: String,
    pub artwork_url: Option<Url>,
}

pub fn parse_status(body: &[u8]) -> Result<TrackMetadata> {
    let doc: StatusDocument = serde_json::from_slice(body)?;
    let track = doc.current_track.ok_or(ShuttleError::MissingTrack)?;

    let full_title = track
        .title
        .as_ref()
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    let (artist, title) = split_track_title(full_title);

    let artwork_url = track
        .artwork_url_large
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(|raw| match Url::parse(raw) {
            Ok(url) => Some(url),
            Err(e) => {
                debug!("ignoring artwork url {:?}: {}", raw, e);
                None
            }
        });

    Ok(TrackMetadata {
        artist,
        title,
        artwork_url,
    })
}

/// Split `"Artist - Title"` on the first `-`.
///
/// Empty pieces are dropped before splitting, so leading dashes are skipped
/// and a trailing dash yields an empty title. Without a separator the whole
/// string becomes the artist.
pub fn split_track_title(full: &str) -> (String, String) {
    let rest = full.trim_start_matches('-');
    match rest.split_once('-') {
        Some((artist, title)) => (artist.trim().to_string(), title.trim().to_string()),
        None => (rest.trim().to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_artist_and_title() {
        assert_eq!(
            split_track_title("Rush - Tom Sawyer"),
            ("Rush".to_string(), "Tom Sawyer".to_string())
        );
    }

    #[test]
    fn no_separator_puts_everything_in_artist() {
        assert_eq!(
            split_track_title("Ambient Drift"),
            ("Ambient Drift".to_string(), String::new())
        );
    }

    #[test]
    fn splits_only_once() {
        assert_eq!(
            split_track_title("Emerson, Lake & Palmer - Karn Evil 9 - 1st Impression"),
            (
                "Emerson, Lake & Palmer".to_string(),
                "Karn Evil 9 - 1st Impression".to_string()
            )
        );
        assert_eq!(
            split_track_title("A--B"),
            ("A".to_string(), "-B".to_string())
        );
    }

    #[test]
    fn dash_edge_cases() {
        assert_eq!(split_track_title("-Solo"), ("Solo".to_string(), String::new()));
        assert_eq!(split_track_title("Yes -"), ("Yes".to_string(), String::new()));
        assert_eq!(split_track_title(""), (String::new(), String::new()));
        assert_eq!(split_track_title("  Genesis-Firth of Fifth "),
            ("Genesis".to_string(), "Firth of Fifth".to_string()));
    }

    #[test]
    fn parses_full_document() {
        let body = br#"{
            "status": "online",
            "current_track": {
                "title": "King Crimson - Starless",
                "start_time": "2025-05-04T10:00:00+00:00",
                "artwork_url_large": "https://images.radio.co/covers/large.jpg"
            }
        }"#;
        let meta = parse_status(body).unwrap();
        assert_eq!(meta.artist, "King Crimson");
        assert_eq!(meta.title, "Starless");
        assert_eq!(
            meta.artwork_url.unwrap().as_str(),
            "https://images.radio.co/covers/large.jpg"
        );
    }

    #[test]
    fn missing_title_gives_empty_pair() {
        let meta = parse_status(br#"{"current_track": {}}"#).unwrap();
        assert_eq!(meta, TrackMetadata::default());
    }

    #[test]
    fn bad_artwork_is_ignored() {
        let meta = parse_status(
            br#"{"current_track": {"title": "Camel - Lady Fantasy", "artwork_url_large": "::nope"}}"#,
        )
        .unwrap();
        assert_eq!(meta.artist, "Camel");
        assert!(meta.artwork_url.is_none());

        let meta = parse_status(
            br#"{"current_track": {"title": "Camel - Lady Fantasy", "artwork_url_large": null}}"#,
        )
        .unwrap();
        assert!(meta.artwork_url.is_none());
    }

    #[test]
    fn rejects_documents_without_track() {
        assert!(matches!(
            parse_status(br#"{"status": "offline"}"#),
            Err(ShuttleError::MissingTrack)
        ));
        assert!(matches!(
            parse_status(br#"{"current_track": "nope"}"#),
            Err(ShuttleError::Json(_))
        ));
        assert!(matches!(parse_status(b"<html>"), Err(ShuttleError::Json(_))));
    }
}
