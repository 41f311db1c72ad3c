/// mpv IPC driver and the `MediaEngine` built on it.
///
/// Architecture:
///
/// ```text
///   MpvEngine
///     ├── MpvDriver          ← owns the mpv child process
///     │     ├── writer_task  ← receives PendingRequest via mpsc, serialises → socket
///     │     └── reader_task  ← reads JSON lines from socket
///     │                          ├── response (has request_id) → matched oneshot::Sender
///     │                          └── event / property-change   → MpvEvent channel
///     └── status_task        ← folds MpvEvents into EngineEvents for the controller
/// ```
///
/// Platform notes:
/// - Unix:   Unix domain sockets
/// - Windows: Named pipes  \\.\pipe\<name>
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};
use url::Url;

use shuttle_core::config::MpvConfig;
use shuttle_core::platform;
use shuttle_core::{EngineEvent, MediaEngine, ShuttleError};

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Fixed observe_property IDs.  We match on these in property-change events.
pub const OBS_CORE_IDLE: u64 = 1;
pub const OBS_PAUSE: u64 = 2;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line (already has '\n')
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// An mpv event / property-change that arrived unsolicited (no request_id).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    /// Returns `Some((obs_id, data))` if this is a property-change event.
    pub fn as_property_change(&self) -> Option<(u64, &Value)> {
        if self.raw.get("event")?.as_str()? == "property-change" {
            let id = self.raw.get("id")?.as_u64()?;
            let data = self.raw.get("data").unwrap_or(&Value::Null);
            Some((id, data))
        } else {
            None
        }
    }

    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }
}

// ── handle ────────────────────────────────────────────────────────────────────

/// Cloneable handle to the mpv writer task.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(REPLY_TIMEOUT, reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    pub async fn set_pause(&self, paused: bool) -> anyhow::Result<()> {
        self.send(json!(["set_property", "pause", paused])).await?;
        Ok(())
    }

    pub async fn set_volume(&self, vol: f32) -> anyhow::Result<()> {
        let vol_pct = (vol * 100.0).clamp(0.0, 100.0);
        self.send(json!(["set_property", "volume", vol_pct])).await?;
        Ok(())
    }

    /// Replace the current file without starting it.
    pub async fn load_paused(&self, url: &str) -> anyhow::Result<()> {
        self.set_pause(true).await?;
        debug!("mpv: loadfile {}", url);
        self.send(json!(["loadfile", url, "replace"])).await?;
        Ok(())
    }

    /// Must be called after every fresh connection.
    pub async fn observe_properties(&self) {
        for (id, name) in [(OBS_CORE_IDLE, "core-idle"), (OBS_PAUSE, "pause")] {
            match self.send(json!(["observe_property", id, name])).await {
                Ok(_) => debug!("mpv: observe_property id={} name={}", id, name),
                Err(e) => warn!("mpv: observe_property {} failed: {}", name, e),
            }
        }
    }

    pub async fn quit(&self) {
        let _ = self.send(json!(["quit"])).await;
    }
}

// ── driver ────────────────────────────────────────────────────────────────────

/// Owns the mpv child process.
pub struct MpvDriver {
    socket_name: String,
    binary: Option<PathBuf>,
    volume: f32,
    process: Option<tokio::process::Child>,
}

impl MpvDriver {
    pub fn new(config: &MpvConfig) -> Self {
        Self {
            socket_name: platform::mpv_socket_name(),
            binary: config.binary.clone(),
            volume: config.volume,
            process: None,
        }
    }

    pub fn process_alive(&mut self) -> bool {
        let Some(child) = self.process.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                match status.code() {
                    Some(code) => warn!("mpv process exited with code: {}", code),
                    None => warn!("mpv process terminated by signal"),
                }
                false
            }
            Err(e) => {
                warn!("mpv process_alive check failed: {}", e);
                false
            }
        }
    }

    pub async fn kill(&mut self) {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }
    }

    fn command(&self) -> anyhow::Result<tokio::process::Command> {
        let binary = platform::find_mpv_binary(self.binary.as_ref())
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;
        let vol_arg = format!(
            "--volume={}",
            (self.volume * 100.0).clamp(0.0, 100.0).round() as i64
        );

        let stderr_path = platform::data_dir().join("mpv-stderr.log");
        let stderr_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&stderr_path)?;
        info!("mpv: logging stderr to {:?}", stderr_path);

        let mut cmd = tokio::process::Command::new(binary);
        cmd.arg("--no-video")
            .arg("--idle=yes")
            .arg(platform::mpv_socket_arg())
            .arg("--quiet")
            .arg(vol_arg)
            .stdout(std::process::Stdio::null())
            .stderr(stderr_file)
            .kill_on_drop(true);
        Ok(cmd)
    }

    #[cfg(unix)]
    pub async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;

        let socket_path = PathBuf::from(&self.socket_name);
        let _ = tokio::fs::remove_file(&socket_path).await;

        info!("mpv: spawning new process");
        let child = self.command()?.spawn()?;
        info!("mpv: spawned process with pid {:?}", child.id());
        self.process = Some(child);

        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            anyhow::bail!("mpv IPC socket did not appear");
        }

        let stream = UnixStream::connect(&socket_path).await?;
        info!("mpv: connected to IPC socket");
        let (read_half, write_half) = stream.into_split();
        Ok(start_io_tasks(read_half, write_half, event_tx))
    }

    #[cfg(windows)]
    pub async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;

        info!("mpv: spawning new process");
        let child = self.command()?.spawn()?;
        self.process = Some(child);

        let pipe_path = format!(r"\\.\pipe\{}", self.socket_name);
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if let Ok(client) = ClientOptions::new().open(&pipe_path) {
                info!("mpv: connected to named pipe");
                let (read_half, write_half) = tokio::io::split(client);
                return Ok(start_io_tasks(read_half, write_half, event_tx));
            }
        }
        anyhow::bail!("mpv named pipe did not appear")
    }
}

fn start_io_tasks<R, W>(read_half: R, write_half: W, event_tx: mpsc::Sender<MpvEvent>) -> MpvHandle
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    tokio::spawn(writer_task(write_half, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(BufReader::new(read_half), pending, event_tx));

    MpvHandle { tx: cmd_tx }
}

async fn fail_pending(pending: &PendingMap, reason: &str) {
    let mut map = pending.lock().await;
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(anyhow::anyhow!("{}", reason)));
    }
}

async fn reader_task<R>(mut reader: BufReader<R>, pending: PendingMap, event_tx: mpsc::Sender<MpvEvent>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                fail_pending(&pending, "mpv IPC connection closed").await;
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(|v| v.as_u64()) {
                    let mut map = pending.lock().await;
                    if let Some(tx) = map.remove(&req_id) {
                        let result = if val["error"].as_str() == Some("success") {
                            Ok(val)
                        } else {
                            let err = val["error"].as_str().unwrap_or("unknown error").to_string();
                            debug!("mpv reader: response req={} err={}", req_id, err);
                            Err(anyhow::anyhow!("mpv error: {}", err))
                        };
                        let _ = tx.send(result);
                    } else {
                        debug!("mpv reader: response for unknown req={}", req_id);
                    }
                } else {
                    debug!("mpv reader: event {}", trimmed);
                    let _ = event_tx.send(MpvEvent { raw: val }).await;
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                fail_pending(&pending, "mpv IPC read error").await;
                break;
            }
        }
    }
}

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register before writing so the reader can match the reply
        pending.lock().await.insert(req.req_id, req.reply);
        debug!("mpv writer: send req={} payload={}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            if let Some(tx) = pending.lock().await.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

// ── status tracking ───────────────────────────────────────────────────────────

/// Folds observed `core-idle` / `pause` values and file events into
/// `EngineEvent`s, emitting only on change.
#[derive(Debug, Default)]
pub struct StatusTracker {
    core_idle: Option<bool>,
    paused: bool,
    last: Option<EngineEvent>,
}

impl StatusTracker {
    pub fn apply(&mut self, evt: &MpvEvent) -> Option<EngineEvent> {
        if let Some((obs_id, data)) = evt.as_property_change() {
            match obs_id {
                OBS_CORE_IDLE => self.core_idle = data.as_bool(),
                OBS_PAUSE => self.paused = data.as_bool().unwrap_or(false),
                _ => return None,
            }
            return self.derive();
        }

        match evt.event_name() {
            Some("start-file") => {
                // flips to false once audio flows
                self.core_idle = Some(true);
                self.derive()
            }
            Some("end-file") => {
                let reason = evt
                    .raw
                    .get("reason")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown");
                self.core_idle = Some(true);
                if reason == "stop" || reason == "redirect" {
                    // replaced by the next loadfile
                    return None;
                }
                info!("mpv: end-file reason={}", reason);
                self.emit(EngineEvent::Ended)
            }
            _ => None,
        }
    }

    fn derive(&mut self) -> Option<EngineEvent> {
        let status = if self.paused {
            EngineEvent::Paused
        } else if self.core_idle == Some(false) {
            EngineEvent::Playing
        } else {
            EngineEvent::Buffering
        };
        self.emit(status)
    }

    fn emit(&mut self, status: EngineEvent) -> Option<EngineEvent> {
        if self.last == Some(status) {
            return None;
        }
        debug!("mpv: status {:?} → {:?}", self.last, status);
        self.last = Some(status);
        Some(status)
    }
}

async fn status_task(mut events: mpsc::Receiver<MpvEvent>, status_tx: mpsc::Sender<EngineEvent>) {
    let mut tracker = StatusTracker::default();
    while let Some(evt) = events.recv().await {
        if let Some(status) = tracker.apply(&evt) {
            if status_tx.send(status).await.is_err() {
                break;
            }
        }
    }
    debug!("mpv: status task exiting");
}

// ── engine ────────────────────────────────────────────────────────────────────

/// `MediaEngine` backed by an mpv child process. The process is started on
/// first use and respawned if it has died.
pub struct MpvEngine {
    driver: MpvDriver,
    handle: Option<MpvHandle>,
    event_tx: mpsc::Sender<MpvEvent>,
    volume: f32,
    loaded: bool,
}

impl MpvEngine {
    /// Status changes are delivered on `status_tx`.
    pub fn new(config: &MpvConfig, status_tx: mpsc::Sender<EngineEvent>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        tokio::spawn(status_task(event_rx, status_tx));
        Self {
            driver: MpvDriver::new(config),
            handle: None,
            event_tx,
            volume: config.volume,
            loaded: false,
        }
    }

    async fn ensure_running(&mut self) -> anyhow::Result<MpvHandle> {
        if let Some(handle) = &self.handle {
            if self.driver.process_alive() {
                return Ok(handle.clone());
            }
            warn!("mpv: process gone, respawning");
            self.loaded = false;
        }
        let handle = self.driver.spawn_and_connect(self.event_tx.clone()).await?;
        handle.observe_properties().await;
        self.handle = Some(handle.clone());
        Ok(handle)
    }

    fn handle(&self) -> shuttle_core::Result<&MpvHandle> {
        self.handle
            .as_ref()
            .ok_or_else(|| ShuttleError::Engine("mpv is not running".into()))
    }
}

fn engine_err(e: anyhow::Error) -> ShuttleError {
    ShuttleError::Engine(e.to_string())
}

#[async_trait]
impl MediaEngine for MpvEngine {
    async fn activate_output(&mut self) -> shuttle_core::Result<()> {
        self.ensure_running().await.map(|_| ()).map_err(engine_err)
    }

    async fn load(&mut self, stream_url: &Url) -> shuttle_core::Result<()> {
        let handle = self.ensure_running().await.map_err(engine_err)?;
        handle.load_paused(stream_url.as_str()).await.map_err(engine_err)?;
        if let Err(e) = handle.set_volume(self.volume).await {
            warn!("mpv: set volume failed: {}", e);
        }
        self.loaded = true;
        Ok(())
    }

    async fn play(&mut self) -> shuttle_core::Result<()> {
        self.handle()?.set_pause(false).await.map_err(engine_err)
    }

    async fn pause(&mut self) -> shuttle_core::Result<()> {
        self.handle()?.set_pause(true).await.map_err(engine_err)
    }

    fn has_source(&self) -> bool {
        self.loaded
    }

    async fn shutdown(&mut self) -> shuttle_core::Result<()> {
        if let Some(handle) = self.handle.take() {
            handle.quit().await;
        }
        self.driver.kill().await;
        self.loaded = false;
        Ok(())
    }
}
