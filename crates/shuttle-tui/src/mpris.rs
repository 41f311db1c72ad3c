//! MPRIS now-playing surface (`org.mpris.MediaPlayer2.shuttle`).
//!
//! The controller publishes into `MprisSurface`, which only stores the info
//! in a watch channel. `serve` owns the D-Bus server, pushes property
//! changes from that channel and from the player state, and forwards
//! transport calls back to the controller as `RemoteCommand`s.

use mpris_server::{
    zbus::{self, fdo},
    LoopStatus, Metadata, PlaybackRate, PlaybackStatus, PlayerInterface, Property, RootInterface,
    Server, Time, TrackId, Volume,
};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use shuttle_core::{
    ControllerEvent, Intent, NowPlayingInfo, NowPlayingSurface, PlaybackPhase, PlayerState,
    RemoteCommand,
};

const BUS_NAME: &str = "shuttle";

pub struct MprisSurface {
    info_tx: watch::Sender<NowPlayingInfo>,
}

impl MprisSurface {
    pub fn new() -> (Self, watch::Receiver<NowPlayingInfo>) {
        let (info_tx, info_rx) = watch::channel(NowPlayingInfo::default());
        (Self { info_tx }, info_rx)
    }
}

impl NowPlayingSurface for MprisSurface {
    fn publish(&mut self, info: &NowPlayingInfo) {
        self.info_tx.send_replace(info.clone());
    }
}

struct MprisPlayer {
    events: mpsc::Sender<ControllerEvent>,
    info_rx: watch::Receiver<NowPlayingInfo>,
    state_rx: watch::Receiver<PlayerState>,
}

impl MprisPlayer {
    async fn forward(&self, event: ControllerEvent) -> fdo::Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| fdo::Error::Failed("player is shutting down".into()))
    }
}

impl RootInterface for MprisPlayer {
    async fn identity(&self) -> fdo::Result<String> {
        Ok("Prog Radio Shuttle".into())
    }
    async fn raise(&self) -> fdo::Result<()> {
        Err(fdo::Error::NotSupported("Not supported".into()))
    }
    async fn quit(&self) -> fdo::Result<()> {
        Err(fdo::Error::NotSupported("Not supported".into()))
    }
    async fn can_quit(&self) -> fdo::Result<bool> {
        Ok(false)
    }
    async fn fullscreen(&self) -> fdo::Result<bool> {
        Ok(false)
    }
    async fn set_fullscreen(&self, _fullscreen: bool) -> zbus::Result<()> {
        Err(zbus::Error::Unsupported)
    }
    async fn can_set_fullscreen(&self) -> fdo::Result<bool> {
        Ok(false)
    }
    async fn can_raise(&self) -> fdo::Result<bool> {
        Ok(false)
    }
    async fn has_track_list(&self) -> fdo::Result<bool> {
        Ok(false)
    }
    async fn desktop_entry(&self) -> fdo::Result<String> {
        Ok("shuttle".into())
    }
    async fn supported_uri_schemes(&self) -> fdo::Result<Vec<String>> {
        Ok(vec![])
    }
    async fn supported_mime_types(&self) -> fdo::Result<Vec<String>> {
        Ok(vec![])
    }
}

impl PlayerInterface for MprisPlayer {
    async fn next(&self) -> fdo::Result<()> {
        Err(fdo::Error::NotSupported("Not supported".into()))
    }

    async fn previous(&self) -> fdo::Result<()> {
        Err(fdo::Error::NotSupported("Not supported".into()))
    }

    async fn pause(&self) -> fdo::Result<()> {
        self.forward(ControllerEvent::Remote(RemoteCommand::Pause)).await
    }

    async fn play_pause(&self) -> fdo::Result<()> {
        let cmd = if self.state_rx.borrow().is_playing {
            RemoteCommand::Pause
        } else {
            RemoteCommand::Play
        };
        self.forward(ControllerEvent::Remote(cmd)).await
    }

    async fn stop(&self) -> fdo::Result<()> {
        self.forward(ControllerEvent::Intent(Intent::Stop)).await
    }

    async fn play(&self) -> fdo::Result<()> {
        self.forward(ControllerEvent::Remote(RemoteCommand::Play)).await
    }

    async fn seek(&self, _offset: Time) -> fdo::Result<()> {
        Err(fdo::Error::NotSupported("Live streams cannot seek".into()))
    }

    async fn set_position(&self, _track_id: TrackId, _position: Time) -> fdo::Result<()> {
        Err(fdo::Error::NotSupported("Live streams cannot seek".into()))
    }

    async fn open_uri(&self, _uri: String) -> fdo::Result<()> {
        Err(fdo::Error::NotSupported("Not supported".into()))
    }

    async fn playback_status(&self) -> fdo::Result<PlaybackStatus> {
        Ok(playback_status(&self.state_rx.borrow()))
    }

    async fn loop_status(&self) -> fdo::Result<LoopStatus> {
        Ok(LoopStatus::None)
    }

    async fn set_loop_status(&self, _loop_status: LoopStatus) -> zbus::Result<()> {
        Err(zbus::Error::Unsupported)
    }

    async fn rate(&self) -> fdo::Result<PlaybackRate> {
        Ok(1.0)
    }

    async fn set_rate(&self, _rate: PlaybackRate) -> zbus::Result<()> {
        Err(zbus::Error::Unsupported)
    }

    async fn shuffle(&self) -> fdo::Result<bool> {
        Ok(false)
    }

    async fn set_shuffle(&self, _shuffle: bool) -> zbus::Result<()> {
        Err(zbus::Error::Unsupported)
    }

    async fn metadata(&self) -> fdo::Result<Metadata> {
        Ok(to_metadata(&self.info_rx.borrow()))
    }

    async fn volume(&self) -> fdo::Result<Volume> {
        Ok(1.0)
    }

    async fn set_volume(&self, _volume: Volume) -> zbus::Result<()> {
        Err(zbus::Error::Unsupported)
    }

    async fn position(&self) -> fdo::Result<Time> {
        Ok(Time::from_millis(0))
    }

    async fn minimum_rate(&self) -> fdo::Result<PlaybackRate> {
        Ok(1.0)
    }

    async fn maximum_rate(&self) -> fdo::Result<PlaybackRate> {
        Ok(1.0)
    }

    async fn can_go_next(&self) -> fdo::Result<bool> {
        Ok(false)
    }

    async fn can_go_previous(&self) -> fdo::Result<bool> {
        Ok(false)
    }

    async fn can_play(&self) -> fdo::Result<bool> {
        Ok(true)
    }

    async fn can_pause(&self) -> fdo::Result<bool> {
        Ok(true)
    }

    async fn can_seek(&self) -> fdo::Result<bool> {
        Ok(false)
    }

    async fn can_control(&self) -> fdo::Result<bool> {
        Ok(true)
    }
}

/// Run the D-Bus server until both watch channels close.
pub async fn serve(
    mut info_rx: watch::Receiver<NowPlayingInfo>,
    mut state_rx: watch::Receiver<PlayerState>,
    events: mpsc::Sender<ControllerEvent>,
) -> anyhow::Result<()> {
    let server = Server::new(
        BUS_NAME,
        MprisPlayer {
            events,
            info_rx: info_rx.clone(),
            state_rx: state_rx.clone(),
        },
    )
    .await?;
    info!("mpris: registered org.mpris.MediaPlayer2.{}", BUS_NAME);

    let mut last_status = playback_status(&state_rx.borrow());
    loop {
        tokio::select! {
            Ok(()) = info_rx.changed() => {
                let metadata = to_metadata(&info_rx.borrow_and_update());
                if let Err(e) = server.properties_changed([Property::Metadata(metadata)]).await {
                    warn!("mpris: metadata update failed: {}", e);
                }
            }
            Ok(()) = state_rx.changed() => {
                let status = playback_status(&state_rx.borrow_and_update());
                if status != last_status {
                    last_status = status;
                    if let Err(e) = server
                        .properties_changed([Property::PlaybackStatus(status)])
                        .await
                    {
                        warn!("mpris: status update failed: {}", e);
                    }
                }
            }
            else => break,
        }
    }
    Ok(())
}

fn playback_status(state: &PlayerState) -> PlaybackStatus {
    if state.is_playing {
        PlaybackStatus::Playing
    } else if state.phase == PlaybackPhase::Paused {
        PlaybackStatus::Paused
    } else {
        PlaybackStatus::Stopped
    }
}

fn to_metadata(info: &NowPlayingInfo) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.set_title(Some(info.title.clone()));
    metadata.set_artist(Some(vec![info.artist.clone()]));
    let art_url = info
        .artwork
        .as_ref()
        .map(|art| art.file_url().unwrap_or_else(|| art.source_url.clone()).to_string());
    metadata.set_art_url(art_url);
    metadata
}
