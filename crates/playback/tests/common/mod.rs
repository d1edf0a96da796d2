// Shared test doubles for the playback pipeline tests
#![allow(dead_code)]

use cappella_core::{
    ByteSource, DecodeStep, DecoderFactory, FrameDecoder, OutputSink, PcmFrame, PlayerError,
    PlayerEvent, Result, Settings, SinkFactory, StopFlag, StreamFormat, Volume,
};
use cappella_transport::{Connection, Transport};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sample rate the test decoder reports; one stream byte = one sample-frame,
/// so position math is easy to predict in tests
pub const SAMPLE_RATE: u32 = 44_100;

pub fn test_settings(dir: &Path) -> Settings {
    Settings {
        cache_dir: dir.join("cache"),
        max_stream_bytes: 8 * 1024 * 1024,
        chunk_bytes: 4096,
        download_workers: 2,
        event_queue_depth: 512,
        ..Settings::default()
    }
}

/// Deterministic payload bytes for a given size
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

// ---------------------------------------------------------------------------
// Transport double

/// Scripted behavior for one locator
pub struct TrackScript {
    pub bytes: Vec<u8>,
    /// Sleep before each chunk, to let stops land mid-transfer
    pub chunk_delay: Duration,
    /// Whether the connection announces a content length
    pub announce_length: bool,
    /// Announce this length instead of the real one
    pub announce_override: Option<u64>,
    /// Deliver this many bytes, then report a transport error
    pub fail_after: Option<usize>,
    /// Deliver this many bytes, then a clean EOF
    pub truncate_after: Option<usize>,
}

impl TrackScript {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            chunk_delay: Duration::ZERO,
            announce_length: true,
            announce_override: None,
            fail_after: None,
            truncate_after: None,
        }
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }
}

/// In-memory transport serving scripted byte streams
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, Arc<TrackScript>>>,
    opens: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(HashMap::new()),
            opens: AtomicUsize::new(0),
        })
    }

    pub fn script(&self, locator: impl Into<String>, script: TrackScript) {
        self.scripts.lock().insert(locator.into(), Arc::new(script));
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl Transport for ScriptedTransport {
    fn open(&self, locator: &str) -> Result<Box<dyn Connection>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .get(locator)
            .cloned()
            .ok_or_else(|| PlayerError::Transport(format!("no route to {}", locator)))?;
        Ok(Box::new(ScriptedConnection { script, pos: 0 }))
    }
}

struct ScriptedConnection {
    script: Arc<TrackScript>,
    pos: usize,
}

impl Connection for ScriptedConnection {
    fn content_length(&self) -> Option<u64> {
        if let Some(length) = self.script.announce_override {
            return Some(length);
        }
        self.script
            .announce_length
            .then(|| self.script.bytes.len() as u64)
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.script.chunk_delay.is_zero() {
            std::thread::sleep(self.script.chunk_delay);
        }
        if let Some(limit) = self.script.fail_after {
            if self.pos >= limit {
                return Err(PlayerError::Transport("connection reset".to_string()));
            }
        }
        let end = self
            .script
            .truncate_after
            .unwrap_or(self.script.bytes.len())
            .min(self.script.bytes.len());
        let remaining = end.saturating_sub(self.pos);
        let n = remaining.min(buf.len());
        buf[..n].copy_from_slice(&self.script.bytes[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

// ---------------------------------------------------------------------------
// Decoder doubles

/// Decoder treating every stream byte as one mono sample-frame
pub struct ByteFrameDecoder {
    source: Box<dyn ByteSource>,
    format_announced: bool,
}

pub struct ByteFrameFactory;

impl DecoderFactory for ByteFrameFactory {
    fn open_stream(&self, source: Box<dyn ByteSource>) -> Result<Box<dyn FrameDecoder>> {
        Ok(Box::new(ByteFrameDecoder {
            source,
            format_announced: false,
        }))
    }
}

impl FrameDecoder for ByteFrameDecoder {
    fn next_step(&mut self) -> Result<DecodeStep> {
        if !self.format_announced {
            self.format_announced = true;
            return Ok(DecodeStep::Format(StreamFormat {
                sample_rate: SAMPLE_RATE,
                channels: 1,
                bits_per_sample: 16,
            }));
        }

        let mut buf = vec![0u8; 4096];
        match self.source.read(&mut buf) {
            Ok(0) => Ok(DecodeStep::EndOfStream),
            Ok(n) => Ok(DecodeStep::Frame(PcmFrame {
                samples: vec![0.0; n],
                channels: 1,
            })),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(DecodeStep::Interrupted),
            Err(e) => Err(PlayerError::Protocol(e.to_string())),
        }
    }
}

/// Factory that rejects every stream once the first byte arrives, the way a
/// real probe rejects a malformed container
pub struct RejectingFactory;

impl DecoderFactory for RejectingFactory {
    fn open_stream(&self, mut source: Box<dyn ByteSource>) -> Result<Box<dyn FrameDecoder>> {
        let mut first = [0u8; 1];
        match source.read(&mut first) {
            Ok(_) => Err(PlayerError::Protocol("unsupported container".to_string())),
            Err(e) => Err(PlayerError::Protocol(e.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Output doubles

/// Sink that accepts everything instantly
pub struct NullSink;

pub struct NullSinkFactory;

impl SinkFactory for NullSinkFactory {
    fn create(&self, _volume: Volume) -> Result<Box<dyn OutputSink>> {
        Ok(Box::new(NullSink))
    }
}

impl OutputSink for NullSink {
    fn configure(&mut self, _format: &StreamFormat) -> Result<()> {
        Ok(())
    }

    fn render(&mut self, _frame: &PcmFrame, _stop: &StopFlag) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self, _stop: &StopFlag) {}
}

// ---------------------------------------------------------------------------
// Event helpers

/// Receive events until one matches, within the timeout
pub fn recv_matching(
    rx: &Receiver<PlayerEvent>,
    timeout: Duration,
    mut pred: impl FnMut(&PlayerEvent) -> bool,
) -> Option<PlayerEvent> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.checked_duration_since(Instant::now())?;
        match rx.recv_timeout(remaining) {
            Ok(event) if pred(&event) => return Some(event),
            Ok(_) => {}
            Err(_) => return None,
        }
    }
}

/// Collect events until a terminal one (finished/failed) arrives.
/// Returns the collected non-terminal events and the terminal event.
pub fn collect_until_terminal(
    rx: &Receiver<PlayerEvent>,
    timeout: Duration,
) -> (Vec<PlayerEvent>, Option<PlayerEvent>) {
    let deadline = Instant::now() + timeout;
    let mut seen = Vec::new();
    loop {
        let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
            return (seen, None);
        };
        match rx.recv_timeout(remaining) {
            Ok(event @ (PlayerEvent::TrackFinished | PlayerEvent::TrackFailed { .. })) => {
                return (seen, Some(event));
            }
            Ok(event) => seen.push(event),
            Err(_) => return (seen, None),
        }
    }
}

/// Poll a condition until it holds or the timeout elapses
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}
