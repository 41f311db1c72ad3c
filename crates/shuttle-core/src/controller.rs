//! Controller: single-owner event loop for playback and metadata state.
//!
//! All inputs arrive as `ControllerEvent`s on one mpsc channel: user intents
//! from the view, transport commands from the OS media surface, status from
//! the media engine, poll ticks, and the results of spawned network tasks.
//! The controller owns `PlayerState`, the engine and the now-playing surface
//! exclusively; spawned tasks never touch them and only post results back.
//!
//! After each change the full `PlayerState` is published on a `watch`
//! channel for the view.
//!
//! Metadata polling runs whenever a station is loaded, independent of
//! play/pause. Every fetch carries a sequence number and the station it was
//! issued for, so a slow response can never overwrite a newer one.
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::catalog::{Catalog, Station};
use crate::engine::{EngineEvent, MediaEngine};
use crate::error::{parse_url, Result, ShuttleError};
use crate::metadata::TrackMetadata;
use crate::now_playing::{Artwork, ArtworkStore, NowPlayingInfo, NowPlayingSurface};
use crate::state::{PlaybackPhase, PlayerState};
use crate::status::MetadataSource;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

// ── events ────────────────────────────────────────────────────────────────────

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    SelectStation(String),
    /// Reload the current station.
    Refresh,
    PlayPause,
    Stop,
}

/// Transport commands from the OS media-control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCommand {
    Play,
    Pause,
}

/// All inputs into the controller loop.
#[derive(Debug)]
pub enum ControllerEvent {
    Intent(Intent),
    Remote(RemoteCommand),
    Engine(EngineEvent),
    /// From the poll timer. `generation` identifies which timer sent it.
    PollTick { generation: u64 },
    MetadataFetched {
        seq: u64,
        station: String,
        result: Result<TrackMetadata>,
    },
    ArtworkFetched {
        seq: u64,
        info: NowPlayingInfo,
        result: Result<Artwork>,
    },
    Shutdown,
}

// ── controller ────────────────────────────────────────────────────────────────

pub struct Controller<E, N> {
    catalog: Catalog,
    engine: E,
    surface: N,
    source: Arc<dyn MetadataSource>,
    artwork_store: ArtworkStore,
    /// Clone handed to spawned tasks so their results come back here.
    events: mpsc::Sender<ControllerEvent>,
    state: PlayerState,
    state_tx: watch::Sender<PlayerState>,
    poll_interval: Duration,
    poll_task: Option<JoinHandle<()>>,
    /// Bumped whenever the timer is cancelled; ticks from older timers are dropped.
    poll_generation: u64,
    /// Whether engine status changes are currently acted on.
    observing: bool,
    next_fetch_seq: u64,
    applied_fetch_seq: u64,
    /// Only the newest artwork request may republish.
    artwork_seq: u64,
}

impl<E, N> Controller<E, N>
where
    E: MediaEngine,
    N: NowPlayingSurface,
{
    pub fn new(
        catalog: Catalog,
        engine: E,
        surface: N,
        source: Arc<dyn MetadataSource>,
        events: mpsc::Sender<ControllerEvent>,
    ) -> Self {
        let state = PlayerState::new(catalog.first().clone());
        let (state_tx, _) = watch::channel(state.clone());
        Self {
            catalog,
            engine,
            surface,
            source,
            artwork_store: ArtworkStore::default_location(),
            events,
            state,
            state_tx,
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_task: None,
            poll_generation: 0,
            observing: false,
            next_fetch_seq: 0,
            applied_fetch_seq: 0,
            artwork_seq: 0,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_artwork_store(mut self, store: ArtworkStore) -> Self {
        self.artwork_store = store;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    /// Receiver that always holds the latest published state.
    pub fn subscribe(&self) -> watch::Receiver<PlayerState> {
        self.state_tx.subscribe()
    }

    pub fn is_polling(&self) -> bool {
        self.poll_task.is_some()
    }

    /// Run until `Shutdown` arrives, then stop playback and release the engine.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<ControllerEvent>) {
        info!("controller: starting event loop");
        while let Some(event) = event_rx.recv().await {
            if !self.handle_event(event).await {
                info!("controller: shutdown requested");
                break;
            }
        }
        self.halt().await;
        if let Err(e) = self.engine.shutdown().await {
            warn!("controller: engine shutdown failed: {}", e);
        }
    }

    /// Apply one event. Returns `false` when the loop should exit.
    pub async fn handle_event(&mut self, event: ControllerEvent) -> bool {
        match event {
            ControllerEvent::Shutdown => return false,
            ControllerEvent::Intent(intent) => self.handle_intent(intent).await,
            ControllerEvent::Remote(cmd) => self.handle_remote(cmd).await,
            ControllerEvent::Engine(evt) => self.handle_engine_event(evt),
            ControllerEvent::PollTick { generation } => {
                if generation == self.poll_generation && self.poll_task.is_some() {
                    self.fetch_metadata();
                } else {
                    debug!("controller: dropping tick from cancelled timer {}", generation);
                }
            }
            ControllerEvent::MetadataFetched {
                seq,
                station,
                result,
            } => self.apply_metadata(seq, &station, result),
            ControllerEvent::ArtworkFetched { seq, info, result } => {
                self.apply_artwork(seq, info, result)
            }
        }
        true
    }

    async fn handle_intent(&mut self, intent: Intent) {
        debug!("controller: intent {:?}", intent);
        match intent {
            Intent::SelectStation(name) => match self.catalog.get(&name).cloned() {
                Some(station) => self.load_station(station).await,
                None => warn!("controller: unknown station {:?}", name),
            },
            Intent::Refresh => {
                let station = self.state.current_station.clone();
                self.load_station(station).await;
            }
            Intent::PlayPause => self.play_pause().await,
            Intent::Stop => self.stop().await,
        }
    }

    // ── playback ──────────────────────────────────────────────────────────────

    /// Switch to `station` and start playing it.
    ///
    /// Title and artist are republished as they are (stale until the next
    /// poll). A stream URL that does not parse leaves the controller stopped
    /// with the station selected.
    pub async fn load_station(&mut self, station: Station) {
        if !self.catalog.contains(&station) {
            warn!("controller: {:?} is not in the catalog", station.name);
            return;
        }

        self.halt().await;
        info!("controller: loading station {}", station.name);
        self.state.current_station = station.clone();
        self.state.is_loading = false;

        let stream_url = match parse_url(&station.stream_url) {
            Ok(url) => url,
            Err(e) => {
                warn!("controller: cannot play {}: {}", station.name, e);
                self.publish_state();
                return;
            }
        };

        if let Err(e) = self.engine.activate_output().await {
            warn!("controller: failed to activate audio output: {}", e);
        }
        if let Err(e) = self.engine.load(&stream_url).await {
            warn!("controller: failed to load {}: {}", stream_url, e);
        }

        self.observing = true;
        self.state.is_loading = true;
        self.state.phase = PlaybackPhase::Starting;
        if let Err(e) = self.engine.play().await {
            warn!("controller: play failed: {}", e);
        }
        self.state.is_playing = true;
        self.publish_state();

        self.republish_now_playing();
        self.fetch_metadata();
        self.start_poll_timer();
    }

    /// Pause if playing, otherwise resume. Does nothing before the first load.
    pub async fn play_pause(&mut self) {
        if !self.engine.has_source() {
            debug!("controller: play/pause with nothing loaded");
            return;
        }

        if self.state.is_playing {
            if let Err(e) = self.engine.pause().await {
                warn!("controller: pause failed: {}", e);
            }
            self.state.is_playing = false;
            // no spinner while explicitly paused
            self.state.is_loading = false;
            self.state.phase = PlaybackPhase::Paused;
            self.publish_state();
        } else {
            self.state.is_loading = true;
            self.state.phase = PlaybackPhase::Starting;
            self.observing = true;
            if let Err(e) = self.engine.play().await {
                warn!("controller: resume failed: {}", e);
            }
            self.state.is_playing = true;
            self.publish_state();
            self.republish_now_playing();
        }
    }

    /// Pause output, clear flags, cancel polling and stop observing the engine.
    pub async fn stop(&mut self) {
        self.halt().await;
        self.publish_state();
    }

    async fn halt(&mut self) {
        if self.engine.has_source() {
            if let Err(e) = self.engine.pause().await {
                warn!("controller: pause on stop failed: {}", e);
            }
        }
        self.state.is_playing = false;
        self.state.is_loading = false;
        self.state.phase = PlaybackPhase::Stopped;
        self.cancel_poll_timer();
        self.observing = false;
    }

    async fn handle_remote(&mut self, cmd: RemoteCommand) {
        info!("controller: remote {:?}", cmd);
        // No loading-state handling here, unlike play_pause.
        match cmd {
            RemoteCommand::Play => {
                if let Err(e) = self.engine.play().await {
                    warn!("controller: remote play failed: {}", e);
                }
                self.state.is_playing = true;
                self.state.phase = if self.state.is_loading {
                    PlaybackPhase::Starting
                } else {
                    PlaybackPhase::Playing
                };
                self.publish_state();
                self.republish_now_playing();
            }
            RemoteCommand::Pause => {
                if let Err(e) = self.engine.pause().await {
                    warn!("controller: remote pause failed: {}", e);
                }
                self.state.is_playing = false;
                self.state.phase = PlaybackPhase::Paused;
                self.publish_state();
            }
        }
    }

    fn handle_engine_event(&mut self, evt: EngineEvent) {
        if !self.observing {
            debug!("controller: not observing, ignoring engine {:?}", evt);
            return;
        }
        match evt {
            EngineEvent::Playing => {
                let phase = if self.state.is_playing {
                    PlaybackPhase::Playing
                } else {
                    self.state.phase
                };
                if self.state.is_loading || self.state.phase != phase {
                    info!("controller: audio is flowing");
                    self.state.is_loading = false;
                    self.state.phase = phase;
                    self.publish_state();
                }
            }
            other => debug!("controller: engine {:?}", other),
        }
    }

    // ── metadata ──────────────────────────────────────────────────────────────

    /// Fetch the current station's status document in the background.
    pub fn fetch_metadata(&mut self) {
        let station = self.state.current_station.clone();
        let status_url = match parse_url(&station.status_url) {
            Ok(url) => url,
            Err(e) => {
                warn!("controller: bad status url for {}: {}", station.name, e);
                return;
            }
        };

        self.next_fetch_seq += 1;
        let seq = self.next_fetch_seq;
        debug!("controller: metadata fetch #{} for {}", seq, station.name);

        let source = Arc::clone(&self.source);
        let tx = self.events.clone();
        tokio::spawn(async move {
            let result = source.fetch_status(&status_url).await;
            let _ = tx
                .send(ControllerEvent::MetadataFetched {
                    seq,
                    station: station.name,
                    result,
                })
                .await;
        });
    }

    fn apply_metadata(&mut self, seq: u64, station: &str, result: Result<TrackMetadata>) {
        let meta = match result {
            Ok(meta) => meta,
            Err(e) => {
                warn!("controller: metadata fetch #{} for {} failed: {}", seq, station, e);
                return;
            }
        };
        if station != self.state.current_station.name {
            debug!("controller: dropping metadata #{} for previous station {}", seq, station);
            return;
        }
        if seq <= self.applied_fetch_seq {
            debug!(
                "controller: dropping stale metadata #{} (have #{})",
                seq, self.applied_fetch_seq
            );
            return;
        }
        self.applied_fetch_seq = seq;

        let artwork_url = meta.artwork_url.or_else(|| self.state.artwork_url.clone());
        if meta.artist == self.state.artist
            && meta.title == self.state.title
            && artwork_url == self.state.artwork_url
        {
            return;
        }

        info!("controller: now playing {:?} - {:?}", meta.artist, meta.title);
        self.state.artist = meta.artist;
        self.state.title = meta.title;
        self.state.artwork_url = artwork_url;
        self.publish_state();
        self.republish_now_playing();
    }

    // ── now playing ───────────────────────────────────────────────────────────

    fn republish_now_playing(&mut self) {
        let title = self.state.title.clone();
        let artist = self.state.artist.clone();
        let artwork_url = self.state.artwork_url.clone();
        self.update_now_playing_info(title, artist, artwork_url);
    }

    /// Publish title/artist now; fetch and decode artwork in the background
    /// and publish again with it.
    pub fn update_now_playing_info(
        &mut self,
        title: String,
        artist: String,
        artwork_url: Option<Url>,
    ) {
        let info = NowPlayingInfo::new(title, artist);
        self.surface.publish(&info);

        self.artwork_seq += 1;
        let Some(url) = artwork_url else {
            return;
        };

        let seq = self.artwork_seq;
        let source = Arc::clone(&self.source);
        let store = self.artwork_store.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let result = load_artwork(source, store, url).await;
            let _ = tx
                .send(ControllerEvent::ArtworkFetched { seq, info, result })
                .await;
        });
    }

    fn apply_artwork(&mut self, seq: u64, info: NowPlayingInfo, result: Result<Artwork>) {
        if seq != self.artwork_seq {
            debug!("controller: dropping artwork #{} (latest #{})", seq, self.artwork_seq);
            return;
        }
        match result {
            Ok(artwork) => self.surface.publish(&info.with_artwork(artwork)),
            Err(e) => warn!("controller: artwork unavailable: {}", e),
        }
    }

    // ── polling ───────────────────────────────────────────────────────────────

    fn start_poll_timer(&mut self) {
        self.cancel_poll_timer();
        let generation = self.poll_generation;
        let period = self.poll_interval;
        let tx = self.events.clone();
        self.poll_task = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                if tx.send(ControllerEvent::PollTick { generation }).await.is_err() {
                    break;
                }
            }
        }));
    }

    fn cancel_poll_timer(&mut self) {
        self.poll_generation += 1;
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
    }

    fn publish_state(&mut self) {
        self.state.rev += 1;
        self.state_tx.send_replace(self.state.clone());
    }
}

/// Cached artwork for `url`, or download, decode and cache it.
async fn load_artwork(
    source: Arc<dyn MetadataSource>,
    store: ArtworkStore,
    url: Url,
) -> Result<Artwork> {
    let (lookup_store, lookup_url) = (store.clone(), url.clone());
    let cached = tokio::task::spawn_blocking(move || lookup_store.cached(&lookup_url))
        .await
        .ok()
        .flatten();
    if let Some(artwork) = cached {
        return Ok(artwork);
    }

    let bytes = source.fetch_artwork(&url).await?;
    tokio::task::spawn_blocking(move || store.store(&url, &bytes))
        .await
        .unwrap_or_else(|e| Err(ShuttleError::Artwork(format!("decode task failed: {e}"))))
}

impl<E, N> Drop for Controller<E, N> {
    fn drop(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
    }
}
