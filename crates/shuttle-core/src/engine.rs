//! The seam between the controller and whatever actually plays audio.

use async_trait::async_trait;
use url::Url;

use crate::error::Result;

/// Status changes reported by an engine. The controller only acts on
/// `Playing`; the rest are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// Audio is flowing.
    Playing,
    /// Unpaused but no audio yet (connecting, buffering).
    Buffering,
    Paused,
    /// The stream went away (network drop, end of file, error).
    Ended,
}

/// A media player that holds one stream at a time.
///
/// Implementations report status asynchronously through an `EngineEvent`
/// channel they are constructed with.
#[async_trait]
pub trait MediaEngine: Send {
    /// Prepare audio output for playback. Failure is not fatal; callers log it
    /// and try to play anyway.
    async fn activate_output(&mut self) -> Result<()>;

    /// Replace the current source. Does not start playback.
    async fn load(&mut self, stream_url: &Url) -> Result<()>;

    async fn play(&mut self) -> Result<()>;

    async fn pause(&mut self) -> Result<()>;

    /// True once a source has been loaded.
    fn has_source(&self) -> bool;

    /// Release the underlying player. Called once when the controller exits.
    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}
