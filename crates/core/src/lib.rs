// Core types and traits for the Cappella streaming player

pub mod error;
pub mod events;
pub mod pipeline;
pub mod progress;
pub mod settings;
pub mod track;

// Re-export commonly used types
pub use error::{PlayerError, Result};
pub use events::{event_channel, EventSink, PlayerEvent};
pub use pipeline::{
    ByteSource, DecodeStep, DecoderFactory, FrameDecoder, OutputSink, PcmFrame, SinkFactory,
    StopFlag, StreamFormat, Volume,
};
pub use progress::DownloadProgress;
pub use settings::Settings;
pub use track::Track;
