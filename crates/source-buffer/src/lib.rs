// Shared byte buffer between the fetch worker and the decode worker
// Single writer appends, single reader drains; a condvar carries the
// data-available signal and the stop flag interrupts every wait

use cappella_core::{ByteSource, PlayerError, Result, StopFlag};
use parking_lot::{Condvar, Mutex};
use std::io::{Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct BufferState {
    data: Vec<u8>,
    finished: bool,
    failure: Option<String>,
}

struct Inner {
    state: Mutex<BufferState>,
    data_available: Condvar,
    consumed: AtomicUsize,
    capacity: usize,
}

/// Outcome of waiting for the buffer to grow past an offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Bytes beyond the offset are now readable
    DataAvailable,
    /// The writer is done (successfully or not); no more bytes will come
    Finished,
    /// The stop flag was raised while waiting
    Stopped,
}

/// Append-only audio byte buffer for one playback session.
///
/// Clones share the same storage. The writer appends and marks completion;
/// the reader observes `written()` grow and blocks on the data-available
/// condition when it catches up. `consumed() <= written() <= capacity()`
/// holds at every observation point.
#[derive(Clone)]
pub struct SourceBuffer {
    inner: Arc<Inner>,
}

impl SourceBuffer {
    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(BufferState {
                    data: Vec::new(),
                    finished: false,
                    failure: None,
                }),
                data_available: Condvar::new(),
                consumed: AtomicUsize::new(0),
                capacity,
            }),
        }
    }

    /// Reserve room up front when the total is announced
    pub fn reserve(&self, bytes: usize) {
        let mut state = self.inner.state.lock();
        let target = bytes.min(self.inner.capacity);
        if target > state.data.capacity() {
            let additional = target.saturating_sub(state.data.len());
            state.data.reserve(additional);
        }
    }

    /// Append a chunk and post one data-available notification.
    ///
    /// Fails without appending when the chunk would push the buffer past its
    /// capacity ceiling.
    pub fn append(&self, chunk: &[u8]) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            let next = state.data.len() + chunk.len();
            if next > self.inner.capacity {
                return Err(PlayerError::Oversized {
                    announced: next as u64,
                    limit: self.inner.capacity as u64,
                });
            }
            state.data.extend_from_slice(chunk);
        }
        self.inner.data_available.notify_all();
        Ok(())
    }

    /// Bytes appended so far
    pub fn written(&self) -> usize {
        self.inner.state.lock().data.len()
    }

    /// Highest offset the reader has drained to
    pub fn consumed(&self) -> usize {
        self.inner.consumed.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn is_finished(&self) -> bool {
        self.inner.state.lock().finished
    }

    pub fn failure(&self) -> Option<String> {
        self.inner.state.lock().failure.clone()
    }

    /// Mark the stream complete and wake the reader
    pub fn mark_finished(&self) {
        {
            let mut state = self.inner.state.lock();
            state.finished = true;
        }
        self.inner.data_available.notify_all();
    }

    /// Record a failure, mark the stream complete, and wake the reader
    pub fn mark_failed(&self, message: impl Into<String>) {
        {
            let mut state = self.inner.state.lock();
            if state.failure.is_none() {
                let message = message.into();
                log::debug!("stream buffer failed at {} bytes: {}", state.data.len(), message);
                state.failure = Some(message);
            }
            state.finished = true;
        }
        self.inner.data_available.notify_all();
    }

    /// Wake every waiter without changing state; the stop path uses this so
    /// a blocked reader re-checks the flag immediately
    pub fn wake_all(&self) {
        self.inner.data_available.notify_all();
    }

    /// Copy bytes at `offset` into `out`, returning how many were available
    pub fn read_at(&self, offset: usize, out: &mut [u8]) -> usize {
        let state = self.inner.state.lock();
        let available = state.data.len().saturating_sub(offset);
        if available == 0 {
            return 0;
        }
        let n = available.min(out.len());
        out[..n].copy_from_slice(&state.data[offset..offset + n]);
        n
    }

    /// Clone of the full contents, for cache promotion after completion
    pub fn snapshot(&self) -> Vec<u8> {
        self.inner.state.lock().data.clone()
    }

    /// Block until bytes beyond `offset` exist, the writer finishes, or the
    /// stop flag is raised
    pub fn wait_for_data(&self, offset: usize, stop: &StopFlag) -> WaitOutcome {
        let mut state = self.inner.state.lock();
        loop {
            if stop.is_raised() {
                return WaitOutcome::Stopped;
            }
            if state.data.len() > offset {
                return WaitOutcome::DataAvailable;
            }
            if state.finished {
                return WaitOutcome::Finished;
            }
            self.inner.data_available.wait(&mut state);
        }
    }

    fn note_consumed(&self, offset: usize) {
        self.inner.consumed.fetch_max(offset, Ordering::AcqRel);
    }
}

/// Blocking reader view of a [`SourceBuffer`].
///
/// `read` waits on the data-available condition when it catches up to the
/// writer and returns `ErrorKind::Interrupted` when the stop flag is raised
/// mid-wait. A recorded writer failure surfaces as an IO error once the
/// buffered bytes are drained.
pub struct BufferReader {
    buffer: SourceBuffer,
    stop: StopFlag,
    pos: u64,
}

impl BufferReader {
    pub fn new(buffer: SourceBuffer, stop: StopFlag) -> Self {
        Self {
            buffer,
            stop,
            pos: 0,
        }
    }

    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl Read for BufferReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            let n = self.buffer.read_at(self.pos as usize, buf);
            if n > 0 {
                self.pos += n as u64;
                self.buffer.note_consumed(self.pos as usize);
                return Ok(n);
            }

            match self.buffer.wait_for_data(self.pos as usize, &self.stop) {
                WaitOutcome::DataAvailable => continue,
                WaitOutcome::Stopped => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::Interrupted,
                        "playback stopped",
                    ));
                }
                WaitOutcome::Finished => {
                    return match self.buffer.failure() {
                        Some(message) => {
                            Err(std::io::Error::new(std::io::ErrorKind::Other, message))
                        }
                        None => Ok(0), // EOF
                    };
                }
            }
        }
    }
}

impl Seek for BufferReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(offset) => self.pos as i64 + offset,
            SeekFrom::End(offset) => {
                if self.buffer.is_finished() {
                    self.buffer.written() as i64 + offset
                } else {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::Unsupported,
                        "cannot seek from end of an in-flight stream",
                    ));
                }
            }
        };

        if new_pos < 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "cannot seek to negative position",
            ));
        }

        self.pos = new_pos as u64;
        Ok(self.pos)
    }
}

impl ByteSource for BufferReader {
    fn byte_len(&self) -> Option<u64> {
        if self.buffer.is_finished() && self.buffer.failure().is_none() {
            Some(self.buffer.written() as u64)
        } else {
            None
        }
    }
}
