// Per-play session state and the worker handoff/stop machinery

use cappella_core::{DownloadProgress, StopFlag, Track};
use cappella_source_buffer::SourceBuffer;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Both long-lived workers (fetch and decode/play) run every session
const WORKER_COUNT: usize = 2;

/// State owned by one `play()` call.
///
/// The controller allocates a fresh session per play and hands clones of the
/// `Arc` to both workers; nothing here is ever reused across plays. The
/// session is released only after [`PlaybackSession::wait_workers_done`]
/// confirms both workers have left it.
pub struct PlaybackSession {
    pub track: Arc<Track>,
    pub buffer: SourceBuffer,
    pub progress: DownloadProgress,
    pub stop: StopFlag,
    malformed: AtomicBool,
    latch: SessionLatch,
}

impl PlaybackSession {
    pub fn new(track: Arc<Track>, buffer_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            track,
            buffer: SourceBuffer::with_capacity_limit(buffer_capacity),
            progress: DownloadProgress::new(),
            stop: StopFlag::new(),
            malformed: AtomicBool::new(false),
            latch: SessionLatch::new(),
        })
    }

    /// Raise the stop flag and wake anything blocked on the buffer
    pub fn request_stop(&self) {
        self.stop.raise();
        self.buffer.wake_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_raised()
    }

    /// Decode side marks the stream malformed so the fetch side will not
    /// promote it to the cache
    pub fn flag_malformed(&self) {
        self.malformed.store(true, Ordering::Release);
    }

    pub fn is_malformed(&self) -> bool {
        self.malformed.load(Ordering::Acquire)
    }

    /// A worker reports it has left this session; called exactly once per
    /// worker, on every exit path
    pub(crate) fn worker_done(&self) {
        self.latch.arrive();
    }

    /// Block until both workers have reported done
    pub fn wait_workers_done(&self) {
        self.latch.wait(WORKER_COUNT);
    }
}

/// Two-party completion latch.
///
/// Each worker arrives exactly once per session; the controller waits for
/// both arrivals before it releases or replaces session state.
struct SessionLatch {
    arrived: Mutex<usize>,
    all_done: Condvar,
}

impl SessionLatch {
    fn new() -> Self {
        Self {
            arrived: Mutex::new(0),
            all_done: Condvar::new(),
        }
    }

    fn arrive(&self) {
        let mut arrived = self.arrived.lock();
        *arrived += 1;
        debug_assert!(*arrived <= WORKER_COUNT);
        if *arrived >= WORKER_COUNT {
            self.all_done.notify_all();
        }
    }

    fn wait(&self, count: usize) {
        let mut arrived = self.arrived.lock();
        while *arrived < count {
            self.all_done.wait(&mut arrived);
        }
    }
}

/// Depth-1 mailbox delivering sessions to one worker.
///
/// The controller only delivers after the previous session's latch has
/// completed, so a pending session is never silently replaced.
pub(crate) struct SessionSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

struct SlotState {
    pending: Option<Arc<PlaybackSession>>,
    closed: bool,
}

impl SessionSlot {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                pending: None,
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    pub(crate) fn deliver(&self, session: Arc<PlaybackSession>) {
        {
            let mut state = self.state.lock();
            debug_assert!(state.pending.is_none(), "slot must be quiescent on deliver");
            state.pending = Some(session);
        }
        self.ready.notify_all();
    }

    /// Close the slot; the worker drains any pending session and then exits
    pub(crate) fn close(&self) {
        {
            let mut state = self.state.lock();
            state.closed = true;
        }
        self.ready.notify_all();
    }

    /// Block until a session arrives; `None` once the slot is closed
    pub(crate) fn wait_take(&self) -> Option<Arc<PlaybackSession>> {
        let mut state = self.state.lock();
        loop {
            if let Some(session) = state.pending.take() {
                return Some(session);
            }
            if state.closed {
                return None;
            }
            self.ready.wait(&mut state);
        }
    }
}
