//! Playback and metadata core for the Prog Radio Shuttle player.
//!
//! Everything here is UI-agnostic: the `Controller` owns the player state
//! and talks to the outside world through the `MediaEngine`,
//! `MetadataSource` and `NowPlayingSurface` traits.

pub mod catalog;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod now_playing;
pub mod platform;
pub mod state;
pub mod status;

pub use catalog::{Catalog, Station};
pub use config::Config;
pub use controller::{Controller, ControllerEvent, Intent, RemoteCommand};
pub use engine::{EngineEvent, MediaEngine};
pub use error::{Result, ShuttleError};
pub use metadata::TrackMetadata;
pub use now_playing::{Artwork, ArtworkStore, NowPlayingInfo, NowPlayingSurface, TracingSurface};
pub use state::{PlaybackPhase, PlayerState};
pub use status::{MetadataSource, StatusClient};
