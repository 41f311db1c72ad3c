mod action;
mod app;
#[cfg(all(feature = "mpris", target_os = "linux"))]
mod mpris;
mod mpv;
mod theme;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use shuttle_core::{
    platform, Catalog, Config, Controller, ControllerEvent, EngineEvent, Intent, NowPlayingSurface,
    PlayerState, StatusClient,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("shuttle.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("cannot open log file {}", log_path.display()))?;

    // RUST_LOG overrides; keep HTTP client internals quiet by default.
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        "info,shuttle=debug,shuttle_core=debug,hyper_util=warn,reqwest=warn".to_string()
    });
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    // The TUI owns the terminal; tell the operator where logs go.
    eprintln!("shuttle log: {}", log_path.display());
    info!("shuttle starting…");

    // ── Config ───────────────────────────────────────────────────────────────
    let config_path = Config::config_path();
    let config = Config::load_from(&config_path)
        .with_context(|| format!("invalid config {}", config_path.display()))?;

    let catalog = Catalog::builtin()?;

    // ── Controller event channel (TUI / engine / MPRIS → Controller) ─────────
    let (event_tx, event_rx) = mpsc::channel::<ControllerEvent>(256);

    let (engine_tx, mut engine_rx) = mpsc::channel::<EngineEvent>(64);
    let forward_tx = event_tx.clone();
    tokio::spawn(async move {
        while let Some(evt) = engine_rx.recv().await {
            if forward_tx.send(ControllerEvent::Engine(evt)).await.is_err() {
                break;
            }
        }
    });
    let engine = mpv::MpvEngine::new(&config.mpv, engine_tx);

    let source = Arc::new(StatusClient::new(&config.http)?);
    let (surface, attach_surface) = now_playing_surface();

    let controller = Controller::new(catalog.clone(), engine, surface, source, event_tx.clone())
        .with_poll_interval(config.polling.interval());
    let state_rx = controller.subscribe();
    attach_surface(state_rx.clone(), event_tx.clone());

    // ── Autoplay ─────────────────────────────────────────────────────────────
    if config.playback.autoplay {
        let initial = match config.playback.initial_station.as_deref() {
            Some(name) => catalog.get(name).unwrap_or_else(|| {
                warn!("initial_station {:?} is not a known station", name);
                catalog.first()
            }),
            None => catalog.first(),
        };
        event_tx
            .send(ControllerEvent::Intent(Intent::SelectStation(
                initial.name.clone(),
            )))
            .await?;
    }

    let controller_task = tokio::spawn(controller.run(event_rx));

    // ── Run TUI ──────────────────────────────────────────────────────────────
    let initial_state = state_rx.borrow().clone();
    let result = app::App::new(catalog, initial_state, event_tx.clone())
        .run(state_rx)
        .await;

    info!("shuttle exiting");
    let _ = event_tx.send(ControllerEvent::Shutdown).await;
    if tokio::time::timeout(Duration::from_secs(3), controller_task)
        .await
        .is_err()
    {
        warn!("controller did not stop in time");
    }

    result
}

type AttachSurface = Box<dyn FnOnce(watch::Receiver<PlayerState>, mpsc::Sender<ControllerEvent>)>;

/// The OS surface, plus a hook that starts its server once the controller's
/// state channel exists.
#[cfg(all(feature = "mpris", target_os = "linux"))]
fn now_playing_surface() -> (Box<dyn NowPlayingSurface>, AttachSurface) {
    let (surface, info_rx) = mpris::MprisSurface::new();
    let attach: AttachSurface = Box::new(move |state_rx, events| {
        tokio::spawn(async move {
            if let Err(e) = mpris::serve(info_rx, state_rx, events).await {
                warn!("mpris unavailable: {}", e);
            }
        });
    });
    (Box::new(surface), attach)
}

#[cfg(not(all(feature = "mpris", target_os = "linux")))]
fn now_playing_surface() -> (Box<dyn NowPlayingSurface>, AttachSurface) {
    (Box::new(shuttle_core::TracingSurface), Box::new(|_, _| {}))
}
