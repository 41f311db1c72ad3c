//! Error type for the shuttle core.
//!
//! Nothing here is fatal at runtime: the controller logs these and carries
//! on. They exist so the pieces below it can be tested in isolation.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShuttleError {
    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("{}", friendly_network_error(.0))]
    Http(#[from] reqwest::Error),

    #[error("Status endpoint returned HTTP {0}")]
    Status(u16),

    #[error("Malformed status JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Status document has no current_track")]
    MissingTrack,

    #[error("Artwork error: {0}")]
    Artwork(String),

    #[error("Media engine error: {0}")]
    Engine(String),

    #[error("Station catalog is empty")]
    EmptyCatalog,

    #[error("Duplicate station name: {0}")]
    DuplicateStation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ShuttleError>;

/// Parse `raw` as an absolute URL, keeping the offending string in the error.
pub fn parse_url(raw: &str) -> Result<url::Url> {
    url::Url::parse(raw.trim()).map_err(|source| ShuttleError::InvalidUrl {
        url: raw.to_string(),
        source,
    })
}

fn friendly_network_error(e: &reqwest::Error) -> String {
    if e.is_connect() {
        if let Some(url) = e.url() {
            return format!(
                "Could not connect to {}",
                url.host_str().unwrap_or("server")
            );
        }
        return "Could not connect to server".to_string();
    }
    if e.is_timeout() {
        return "Connection timed out".to_string();
    }
    if e.is_decode() {
        return "Invalid response from server".to_string();
    }
    format!("Network error: {e}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_url_keeps_raw_text() {
        let err = parse_url("not a url").unwrap_err();
        match err {
            ShuttleError::InvalidUrl { url, .. } => assert_eq!(url, "not a url"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parse_url_trims_whitespace() {
        let url = parse_url("  https://public.radio.co/stations/x/status ").unwrap();
        assert_eq!(url.host_str(), Some("public.radio.co"));
    }
}
