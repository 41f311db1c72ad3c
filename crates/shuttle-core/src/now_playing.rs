//! Now-playing publication and artwork storage.
//!
//! A `NowPlayingSurface` is the OS-level "what's playing" registry (MPRIS
//! on Linux). Artwork arrives as raw bytes; `ArtworkStore` decodes it and
//! keeps a copy on disk so surfaces that want an art URL can point at a
//! local file. The cache is checked before downloading and holds at most
//! `limit` files; the least recently written ones are evicted first.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Result, ShuttleError};

/// A decoded image saved to the artwork cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artwork {
    pub source_url: Url,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

impl Artwork {
    /// `file://` URL for the cached copy, if the path is absolute.
    pub fn file_url(&self) -> Option<Url> {
        Url::from_file_path(&self.path).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NowPlayingInfo {
    pub title: String,
    pub artist: String,
    pub artwork: Option<Artwork>,
}

impl NowPlayingInfo {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            artwork: None,
        }
    }

    pub fn with_artwork(mut self, artwork: Artwork) -> Self {
        self.artwork = Some(artwork);
        self
    }
}

/// The OS "now playing" registry.
pub trait NowPlayingSurface: Send {
    fn publish(&mut self, info: &NowPlayingInfo);
}

/// Surface used when no OS integration is available: logs what would have
/// been shown.
#[derive(Debug, Default)]
pub struct TracingSurface;

impl NowPlayingSurface for TracingSurface {
    fn publish(&mut self, info: &NowPlayingInfo) {
        match &info.artwork {
            Some(art) => info!(
                "now playing: {:?} by {:?} (artwork {}x{} at {})",
                info.title,
                info.artist,
                art.width,
                art.height,
                art.path.display()
            ),
            None => info!("now playing: {:?} by {:?}", info.title, info.artist),
        }
    }
}

impl<S: NowPlayingSurface + ?Sized> NowPlayingSurface for Box<S> {
    fn publish(&mut self, info: &NowPlayingInfo) {
        (**self).publish(info)
    }
}

pub const DEFAULT_ARTWORK_LIMIT: usize = 64;

/// On-disk cache of decoded artwork, keyed by source URL.
#[derive(Debug, Clone)]
pub struct ArtworkStore {
    dir: PathBuf,
    limit: usize,
}

impl ArtworkStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            limit: DEFAULT_ARTWORK_LIMIT,
        }
    }

    /// `<cache_dir>/artwork`
    pub fn default_location() -> Self {
        Self::new(crate::platform::cache_dir().join("artwork"))
    }

    /// Keep at most `limit` files (minimum one).
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Previously stored artwork for `source_url`, if it is still on disk
    /// and readable as an image.
    pub fn cached(&self, source_url: &Url) -> Option<Artwork> {
        let stem = file_stem(source_url);
        let path = std::fs::read_dir(&self.dir)
            .ok()?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .find(|path| path.file_stem().and_then(|s| s.to_str()) == Some(stem.as_str()))?;
        let (width, height) = image::image_dimensions(&path).ok()?;
        debug!("artwork cache hit: {} -> {}", source_url, path.display());
        Some(Artwork {
            source_url: source_url.clone(),
            path,
            width,
            height,
        })
    }

    /// Decode `bytes` and write them under a name derived from `source_url`.
    /// Undecodable data is rejected before anything touches the disk.
    pub fn store(&self, source_url: &Url, bytes: &[u8]) -> Result<Artwork> {
        let format = image::guess_format(bytes)
            .map_err(|e| ShuttleError::Artwork(format!("unknown image format: {e}")))?;
        let decoded = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| ShuttleError::Artwork(format!("decode failed: {e}")))?;

        let ext = format.extensions_str().first().copied().unwrap_or("img");
        let path = self.dir.join(format!("{}.{}", file_stem(source_url), ext));

        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(&path, bytes)?;
        self.prune(&path);
        debug!(
            "artwork cached: {} -> {} ({}x{})",
            source_url,
            path.display(),
            decoded.width(),
            decoded.height()
        );

        Ok(Artwork {
            source_url: source_url.clone(),
            path,
            width: decoded.width(),
            height: decoded.height(),
        })
    }

    /// Drop the oldest files until at most `limit` remain. `keep` is never removed.
    fn prune(&self, keep: &Path) {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return;
        };
        let mut files: Vec<(SystemTime, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| {
                let modified = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (modified, entry.path())
            })
            .collect();
        if files.len() <= self.limit {
            return;
        }
        files.sort();
        let excess = files.len() - self.limit;
        for (_, path) in files.into_iter().filter(|(_, p)| p != keep).take(excess) {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("artwork evicted: {}", path.display()),
                Err(e) => warn!("artwork eviction failed for {}: {}", path.display(), e),
            }
        }
    }
}

fn file_stem(url: &Url) -> String {
    let mut hasher = DefaultHasher::new();
    url.as_str().hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_png() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(3, 2, image::Rgb([200, 20, 20]));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn stores_decodable_artwork() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtworkStore::new(dir.path().join("artwork"));
        let url = Url::parse("https://images.radio.co/cover.png").unwrap();

        let art = store.store(&url, &tiny_png()).unwrap();
        assert_eq!((art.width, art.height), (3, 2));
        assert_eq!(art.source_url, url);
        assert!(art.path.exists());
        assert_eq!(art.path.extension().and_then(|e| e.to_str()), Some("png"));
        assert!(art.file_url().unwrap().as_str().starts_with("file://"));

        // Same URL maps to the same file.
        let again = store.store(&url, &tiny_png()).unwrap();
        assert_eq!(again.path, art.path);
    }

    #[test]
    fn rejects_garbage_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtworkStore::new(dir.path().join("artwork"));
        let url = Url::parse("https://images.radio.co/cover.jpg").unwrap();

        let err = store.store(&url, b"<html>not an image</html>").unwrap_err();
        assert!(matches!(err, ShuttleError::Artwork(_)));
        assert!(!dir.path().join("artwork").exists());
        assert!(store.cached(&url).is_none());
    }

    #[test]
    fn cached_finds_stored_artwork() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtworkStore::new(dir.path().join("artwork"));
        let url = Url::parse("https://images.radio.co/cover.png").unwrap();
        let other = Url::parse("https://images.radio.co/other.png").unwrap();

        assert!(store.cached(&url).is_none());
        let stored = store.store(&url, &tiny_png()).unwrap();
        assert_eq!(store.cached(&url), Some(stored));
        assert!(store.cached(&other).is_none());
    }

    #[test]
    fn store_evicts_beyond_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtworkStore::new(dir.path().join("artwork")).with_limit(2);

        let mut last = None;
        for name in ["a", "b", "c", "d"] {
            let url = Url::parse(&format!("https://images.radio.co/{name}.png")).unwrap();
            last = Some(store.store(&url, &tiny_png()).unwrap());
        }

        let files = std::fs::read_dir(dir.path().join("artwork")).unwrap().count();
        assert_eq!(files, 2);
        assert!(last.unwrap().path.exists());
    }

    #[test]
    fn info_builder() {
        let info = NowPlayingInfo::new("Starless", "King Crimson");
        assert_eq!(info.title, "Starless");
        assert!(info.artwork.is_none());
    }
}
