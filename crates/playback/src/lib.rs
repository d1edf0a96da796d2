// Playback engine: controller, fetch and decode/play workers, bulk downloads

pub mod controller;
pub mod downloader;
mod fetch;
mod render;
pub mod session;

pub use controller::PlayerCore;
pub use downloader::{ChunkCallback, DownloadPool, DownloadRequest, DownloadTarget};
pub use session::PlaybackSession;
