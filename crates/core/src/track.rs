// Track metadata handle shared between the player core and the UI layer

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// One playable audio item.
///
/// The player mutates the status flags and position; everything else is
/// immutable after construction. All mutable fields are atomics so the UI
/// layer can read them from its own thread without locking.
#[derive(Debug)]
pub struct Track {
    /// Uploader/owner identifier (first half of the cache key)
    pub owner_id: u64,
    /// Track identifier (second half of the cache key)
    pub track_id: u64,
    /// Display title
    pub title: String,
    /// Duration in seconds, zero if unknown
    pub duration_secs: u64,
    /// Resolved audio locator (URL)
    pub locator: String,

    playing: AtomicBool,
    paused: AtomicBool,
    cached: AtomicBool,
    downloading: AtomicBool,
    position_ms: AtomicU64,
}

impl Track {
    pub fn new(
        owner_id: u64,
        track_id: u64,
        title: impl Into<String>,
        duration_secs: u64,
        locator: impl Into<String>,
    ) -> Self {
        Self {
            owner_id,
            track_id,
            title: title.into(),
            duration_secs,
            locator: locator.into(),
            playing: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            cached: AtomicBool::new(false),
            downloading: AtomicBool::new(false),
            position_ms: AtomicU64::new(0),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn set_playing(&self, value: bool) {
        self.playing.store(value, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn set_paused(&self, value: bool) {
        self.paused.store(value, Ordering::Release);
    }

    pub fn is_cached(&self) -> bool {
        self.cached.load(Ordering::Acquire)
    }

    pub fn set_cached(&self, value: bool) {
        self.cached.store(value, Ordering::Release);
    }

    pub fn is_downloading(&self) -> bool {
        self.downloading.load(Ordering::Acquire)
    }

    pub fn set_downloading(&self, value: bool) {
        self.downloading.store(value, Ordering::Release);
    }

    /// Current playback position in milliseconds
    pub fn position_ms(&self) -> u64 {
        self.position_ms.load(Ordering::Acquire)
    }

    /// Current playback position in whole seconds
    pub fn position_secs(&self) -> u64 {
        self.position_ms() / 1000
    }

    pub fn set_position_ms(&self, value: u64) {
        self.position_ms.store(value, Ordering::Release);
    }
}
