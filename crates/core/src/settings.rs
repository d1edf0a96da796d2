// Runtime configuration for the streaming pipeline

use std::path::PathBuf;
use std::time::Duration;

/// Chunk size for network reads (4KB)
const CHUNK_BYTES: usize = 4 * 1024;

/// Ceiling for a single stream/download (256MB)
const MAX_STREAM_BYTES: usize = 256 * 1024 * 1024;

/// Player settings
///
/// Construct with `Settings::default()` and override fields as needed; the
/// caller owns loading these from whatever configuration source it uses.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory holding cached audio files
    pub cache_dir: PathBuf,
    /// Upper bound on a single stream's size, enforced against the announced
    /// content length and against the growing buffer when the length is unknown
    pub max_stream_bytes: usize,
    /// Network read chunk size
    pub chunk_bytes: usize,
    /// Number of bulk download workers
    pub download_workers: usize,
    /// HTTP connect timeout
    pub connect_timeout: Duration,
    /// HTTP read timeout
    pub read_timeout: Duration,
    /// User agent sent with every request
    pub user_agent: String,
    /// Depth of the bounded player event queue
    pub event_queue_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("cappella-cache"),
            max_stream_bytes: MAX_STREAM_BYTES,
            chunk_bytes: CHUNK_BYTES,
            download_workers: 4,
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            user_agent: "Mozilla/5.0 (compatible; Cappella/0.2)".to_string(),
            event_queue_depth: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = Settings::default();
        assert!(settings.chunk_bytes > 0);
        assert!(settings.max_stream_bytes > settings.chunk_bytes);
        assert!(settings.download_workers > 0);
    }
}
