#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use shuttle_core::metadata::parse_status;
use shuttle_core::{
    MediaEngine, MetadataSource, NowPlayingInfo, NowPlayingSurface, Result, ShuttleError,
    TrackMetadata,
};
use tokio::sync::mpsc;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Activate,
    Load(String),
    Play,
    Pause,
    Shutdown,
}

/// Records every call; never fails unless told to.
#[derive(Clone, Default)]
pub struct FakeEngine {
    pub calls: Arc<Mutex<Vec<Call>>>,
    pub fail_activate: bool,
    pub loaded: bool,
}

impl FakeEngine {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn activate_output(&mut self) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Activate);
        if self.fail_activate {
            return Err(ShuttleError::Engine("no audio device".into()));
        }
        Ok(())
    }

    async fn load(&mut self, stream_url: &Url) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Load(stream_url.to_string()));
        self.loaded = true;
        Ok(())
    }

    async fn play(&mut self) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Play);
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Pause);
        Ok(())
    }

    fn has_source(&self) -> bool {
        self.loaded
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Shutdown);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingSurface {
    pub published: Arc<Mutex<Vec<NowPlayingInfo>>>,
}

impl RecordingSurface {
    pub fn published(&self) -> Vec<NowPlayingInfo> {
        self.published.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<NowPlayingInfo> {
        self.published.lock().unwrap().last().cloned()
    }
}

impl NowPlayingSurface for RecordingSurface {
    fn publish(&mut self, info: &NowPlayingInfo) {
        self.published.lock().unwrap().push(info.clone());
    }
}

/// One scripted answer to a status request.
pub enum Reply {
    Body(&'static str),
    Down,
}

/// Hands out scripted status replies in order; once empty, every request
/// fails as if the server were down.
#[derive(Default)]
pub struct ScriptedSource {
    replies: Mutex<VecDeque<Reply>>,
    artwork: Mutex<Option<Vec<u8>>>,
    status_calls: AtomicUsize,
    artwork_calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            ..Default::default()
        })
    }

    pub fn with_artwork(replies: Vec<Reply>, artwork: Vec<u8>) -> Arc<Self> {
        let source = Self::new(replies);
        *source.artwork.lock().unwrap() = Some(artwork);
        source
    }

    pub fn push(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn artwork_calls(&self) -> usize {
        self.artwork_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataSource for ScriptedSource {
    async fn fetch_status(&self, _status_url: &Url) -> Result<TrackMetadata> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Body(body)) => parse_status(body.as_bytes()),
            Some(Reply::Down) | None => Err(ShuttleError::Status(503)),
        }
    }

    async fn fetch_artwork(&self, _artwork_url: &Url) -> Result<Vec<u8>> {
        self.artwork_calls.fetch_add(1, Ordering::SeqCst);
        self.artwork
            .lock()
            .unwrap()
            .clone()
            .ok_or(ShuttleError::Status(404))
    }
}

pub fn tiny_png() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(4, 4, image::Rgb([120, 0, 200]));
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

pub async fn next_event<T>(rx: &mut mpsc::Receiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for controller event")
        .expect("event channel closed")
}
