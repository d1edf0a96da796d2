// Capabilities consumed by the playback pipeline
// Decode and device output are traits here; implementations live in their own
// crate so the engine can be driven by test doubles

use crate::error::Result;
use std::io::{Read, Seek};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared across one session's threads.
///
/// Raised once by the controller; every blocking wait in the pipeline checks
/// it and unwinds cleanly when it is set.
#[derive(Clone, Default)]
pub struct StopFlag {
    flag: Arc<AtomicBool>,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Output volume, shared between the controller and the output sink.
///
/// Stored as a percentage and clamped to 0..=100 on every adjustment.
#[derive(Clone)]
pub struct Volume {
    percent: Arc<AtomicU32>,
}

pub const MAX_VOLUME: u32 = 100;

impl Volume {
    pub fn new(percent: u32) -> Self {
        Self {
            percent: Arc::new(AtomicU32::new(percent.min(MAX_VOLUME))),
        }
    }

    pub fn percent(&self) -> u32 {
        self.percent.load(Ordering::Acquire)
    }

    /// Relative adjustment, clamped to the valid range. Returns the new value.
    pub fn adjust(&self, delta: i32) -> u32 {
        let current = self.percent() as i64;
        let next = (current + delta as i64).clamp(0, MAX_VOLUME as i64) as u32;
        self.percent.store(next, Ordering::Release);
        next
    }

    /// Linear gain factor applied to samples
    pub fn gain(&self) -> f32 {
        self.percent() as f32 / MAX_VOLUME as f32
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self::new(MAX_VOLUME)
    }
}

/// Stream format discovered by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

/// One decoded block of interleaved f32 samples
#[derive(Debug, Clone)]
pub struct PcmFrame {
    pub samples: Vec<f32>,
    pub channels: u16,
}

impl PcmFrame {
    /// Number of sample-frames (samples per channel)
    pub fn frames(&self) -> u64 {
        if self.channels == 0 {
            return 0;
        }
        (self.samples.len() / self.channels as usize) as u64
    }
}

/// Outcome of asking the decoder for the next frame
pub enum DecodeStep {
    /// A decoded frame ready to render
    Frame(PcmFrame),
    /// Stream format discovered or changed; reconfigure the output first
    Format(StreamFormat),
    /// The source is starved; wait for more bytes and ask again
    NeedData,
    /// All bytes consumed and decoded
    EndOfStream,
    /// A stop was observed inside a blocking source read
    Interrupted,
}

/// Forward byte stream handed to a decoder.
///
/// `Seek` is only required to the extent the container probe needs it;
/// sources report a byte length once the stream is complete.
pub trait ByteSource: Read + Seek + Send + Sync {
    /// Total stream length, once known
    fn byte_len(&self) -> Option<u64>;
}

/// Incremental audio decoder over a byte source
pub trait FrameDecoder: Send {
    fn next_step(&mut self) -> Result<DecodeStep>;
}

/// Opens a decoder for one stream.
///
/// The open itself may block reading the source until the container probe
/// has enough bytes; a raised stop flag interrupts it like any other read.
pub trait DecoderFactory: Send + Sync {
    fn open_stream(&self, source: Box<dyn ByteSource>) -> Result<Box<dyn FrameDecoder>>;
}

/// Audio output device capability.
///
/// Sinks are created on the thread that renders with them (device stream
/// handles are not generally movable across threads), so the trait itself
/// carries no `Send` bound; [`SinkFactory`] is what crosses threads.
pub trait OutputSink {
    /// Prepare the device for a stream format; called on format discovery
    fn configure(&mut self, format: &StreamFormat) -> Result<()>;

    /// Render one frame. Blocks while the device queue is full, but returns
    /// early (Ok) when the stop flag is raised.
    fn render(&mut self, frame: &PcmFrame, stop: &StopFlag) -> Result<()>;

    /// End one session's output: drain pending audio unless the stop flag is
    /// raised, then release per-session device state. Must not leak.
    fn finish(&mut self, stop: &StopFlag);
}

/// Creates the output sink on the render thread
pub trait SinkFactory: Send {
    fn create(&self, volume: Volume) -> Result<Box<dyn OutputSink>>;
}
