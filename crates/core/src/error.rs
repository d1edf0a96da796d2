// Error handling for the streaming player

use std::fmt;

/// Player error types
#[derive(Debug, Clone)]
pub enum PlayerError {
    /// Entry is not in the cache (fallback trigger, not a hard failure)
    NotFound,

    /// Network error (connect, read, TLS verification)
    Transport(String),

    /// Announced content length exceeds the configured ceiling
    Oversized { announced: u64, limit: u64 },

    /// Local file read/write failure
    Io(String),

    /// Malformed or unexpected data from the decoder or transport
    Protocol(String),

    /// Output device error
    Device(String),
}

impl fmt::Display for PlayerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PlayerError::NotFound => write!(f, "not found in cache"),
            PlayerError::Transport(msg) => write!(f, "transport error: {}", msg),
            PlayerError::Oversized { announced, limit } => {
                write!(f, "content too large: {} bytes (limit {})", announced, limit)
            }
            PlayerError::Io(msg) => write!(f, "IO error: {}", msg),
            PlayerError::Protocol(msg) => write!(f, "protocol error: {}", msg),
            PlayerError::Device(msg) => write!(f, "device error: {}", msg),
        }
    }
}

impl std::error::Error for PlayerError {}

/// Result type alias for player operations
pub type Result<T> = std::result::Result<T, PlayerError>;

impl From<std::io::Error> for PlayerError {
    fn from(err: std::io::Error) -> Self {
        PlayerError::Io(err.to_string())
    }
}
