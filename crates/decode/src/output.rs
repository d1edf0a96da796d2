// cpal-based audio output sink
// A PCM ring sits between the render thread and the device callback; the
// render side parks on a condvar when the ring is full instead of spinning

use cappella_core::{
    OutputSink, PcmFrame, PlayerError, Result, SinkFactory, StopFlag, StreamFormat, Volume,
};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Ring capacity in seconds of audio
const RING_SECONDS: usize = 2;

/// Upper bound on draining the ring tail at end of track
const DRAIN_DEADLINE: Duration = Duration::from_secs(5);

struct RingInner {
    queue: Mutex<VecDeque<f32>>,
    space: Condvar,
    capacity: usize,
}

/// Bounded sample queue between the render thread and the device callback
#[derive(Clone)]
struct PcmRing {
    inner: Arc<RingInner>,
}

impl PcmRing {
    fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RingInner {
                queue: Mutex::new(VecDeque::with_capacity(capacity)),
                space: Condvar::new(),
                capacity,
            }),
        }
    }

    /// Push all samples, parking while the ring is full. Returns early when
    /// the stop flag is raised.
    fn push_blocking(&self, samples: &[f32], stop: &StopFlag) {
        let mut offset = 0;
        let mut queue = self.inner.queue.lock();
        while offset < samples.len() {
            if stop.is_raised() {
                return;
            }
            let free = self.inner.capacity.saturating_sub(queue.len());
            if free == 0 {
                // Re-check the stop flag at least every wait interval
                self.inner
                    .space
                    .wait_for(&mut queue, Duration::from_millis(100));
                continue;
            }
            let n = free.min(samples.len() - offset);
            queue.extend(samples[offset..offset + n].iter().copied());
            offset += n;
        }
    }

    /// Pop into the device buffer; returns the number of samples written
    fn pop_into(&self, out: &mut [f32]) -> usize {
        let mut queue = self.inner.queue.lock();
        let n = out.len().min(queue.len());
        for slot in out.iter_mut().take(n) {
            *slot = queue.pop_front().unwrap_or(0.0);
        }
        drop(queue);
        if n > 0 {
            self.inner.space.notify_all();
        }
        n
    }

    /// Wait until the device has drained the queue, bounded by a deadline
    fn wait_drained(&self, stop: &StopFlag) {
        let deadline = Instant::now() + DRAIN_DEADLINE;
        let mut queue = self.inner.queue.lock();
        while !queue.is_empty() && !stop.is_raised() && Instant::now() < deadline {
            self.inner
                .space
                .wait_for(&mut queue, Duration::from_millis(50));
        }
    }
}

struct ActiveOutput {
    // Held for its Drop; stopping the stream releases the device
    _stream: cpal::Stream,
    ring: PcmRing,
    format: StreamFormat,
}

/// cpal output sink with volume scaling
pub struct CpalSink {
    volume: Volume,
    active: Option<ActiveOutput>,
}

impl CpalSink {
    pub fn new(volume: Volume) -> Self {
        Self {
            volume,
            active: None,
        }
    }

    fn open_stream(&self, format: &StreamFormat) -> Result<ActiveOutput> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlayerError::Device("no output device available".to_string()))?;

        let config = StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let ring = PcmRing::new(
            format.sample_rate as usize * format.channels as usize * RING_SECONDS,
        );
        let ring_for_callback = ring.clone();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let written = ring_for_callback.pop_into(data);
                    // Zero-fill on underrun so stale samples never play
                    if written < data.len() {
                        data[written..].fill(0.0);
                    }
                },
                |err| {
                    log::error!("audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| PlayerError::Device(format!("failed to build output stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| PlayerError::Device(format!("failed to start stream: {}", e)))?;

        log::debug!(
            "output configured: {}Hz, {} channels",
            format.sample_rate,
            format.channels
        );

        Ok(ActiveOutput {
            _stream: stream,
            ring,
            format: *format,
        })
    }
}

impl OutputSink for CpalSink {
    fn configure(&mut self, format: &StreamFormat) -> Result<()> {
        if let Some(active) = &self.active {
            if active.format == *format {
                return Ok(());
            }
        }
        self.active = Some(self.open_stream(format)?);
        Ok(())
    }

    fn render(&mut self, frame: &PcmFrame, stop: &StopFlag) -> Result<()> {
        let active = self
            .active
            .as_ref()
            .ok_or_else(|| PlayerError::Device("output not configured".to_string()))?;

        let gain = self.volume.gain();
        if (gain - 1.0).abs() < f32::EPSILON {
            active.ring.push_blocking(&frame.samples, stop);
        } else {
            let scaled: Vec<f32> = frame.samples.iter().map(|s| s * gain).collect();
            active.ring.push_blocking(&scaled, stop);
        }
        Ok(())
    }

    fn finish(&mut self, stop: &StopFlag) {
        if let Some(active) = self.active.take() {
            if !stop.is_raised() {
                active.ring.wait_drained(stop);
            }
            // Dropping the stream releases the device
        }
    }
}

/// Creates [`CpalSink`]s on the render thread
pub struct CpalSinkFactory;

impl SinkFactory for CpalSinkFactory {
    fn create(&self, volume: Volume) -> Result<Box<dyn OutputSink>> {
        Ok(Box::new(CpalSink::new(volume)))
    }
}
