// On-disk cache of fully-downloaded audio streams
// One file per track, written whole and renamed into place

use cappella_core::{PlayerError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Stable composite key for one cached stream.
///
/// The file name is formatted purely from the two integers, so a key can
/// never name a path outside the cache directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub owner_id: u64,
    pub track_id: u64,
}

impl CacheKey {
    pub fn new(owner_id: u64, track_id: u64) -> Self {
        Self { owner_id, track_id }
    }

    fn file_name(&self) -> String {
        format!("{}_{}.audio", self.owner_id, self.track_id)
    }

    fn temp_name(&self) -> String {
        format!(".{}_{}.audio.part", self.owner_id, self.track_id)
    }
}

/// Byte-stream cache rooted at one directory
pub struct TrackCache {
    dir: PathBuf,
}

impl TrackCache {
    /// Open the cache, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| PlayerError::Io(format!("create cache dir: {}", e)))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entry_path(key).is_file()
    }

    /// Read a full cached stream. `NotFound` on a miss; read failures on an
    /// existing entry degrade to a miss as well.
    pub fn read(&self, key: &CacheKey) -> Result<Vec<u8>> {
        let path = self.entry_path(key);
        if !path.is_file() {
            return Err(PlayerError::NotFound);
        }
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                log::warn!("cache read failed for {:?}, treating as miss: {}", path, e);
                Err(PlayerError::NotFound)
            }
        }
    }

    /// Write a complete stream. The bytes land under a temp name first and
    /// are renamed into place, so a crash mid-write never leaves a readable
    /// partial entry.
    pub fn write(&self, key: &CacheKey, bytes: &[u8]) -> Result<()> {
        let temp = self.dir.join(key.temp_name());
        let path = self.entry_path(key);

        fs::write(&temp, bytes).map_err(|e| {
            let _ = fs::remove_file(&temp);
            PlayerError::Io(format!("cache write: {}", e))
        })?;

        fs::rename(&temp, &path).map_err(|e| {
            let _ = fs::remove_file(&temp);
            PlayerError::Io(format!("cache rename: {}", e))
        })?;

        log::debug!("cached {} bytes at {:?}", bytes.len(), path);
        Ok(())
    }
}
