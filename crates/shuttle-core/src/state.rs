use url::Url;

use crate::catalog::Station;

/// Where the playback axis currently is.
///
/// `Starting` covers the window between issuing play and the engine
/// reporting audio; `is_loading` mirrors it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackPhase {
    #[default]
    Stopped,
    Starting,
    Playing,
    Paused,
}

impl PlaybackPhase {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "connecting",
            Self::Playing => "playing",
            Self::Paused => "paused",
        }
    }
}

/// Snapshot of everything the view renders. Owned by the controller and
/// published whole after every change.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    /// Incremented on every published change.
    pub rev: u64,
    pub current_station: Station,
    pub title: String,
    pub artist: String,
    pub artwork_url: Option<Url>,
    pub is_playing: bool,
    pub is_loading: bool,
    pub phase: PlaybackPhase,
}

impl PlayerState {
    pub fn new(station: Station) -> Self {
        Self {
            rev: 0,
            current_station: station,
            title: String::new(),
            artist: String::new(),
            artwork_url: None,
            is_playing: false,
            is_loading: false,
            phase: PlaybackPhase::Stopped,
        }
    }

    pub fn has_metadata(&self) -> bool {
        !self.title.is_empty() || !self.artist.is_empty()
    }
}
