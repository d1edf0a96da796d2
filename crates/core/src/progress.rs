// Shared download progress state
// Used by both the playback fetch worker and the bulk download pool

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Sentinel for "content length not announced"
const TOTAL_UNKNOWN: u64 = u64::MAX;

struct ProgressInner {
    received: AtomicU64,
    total: AtomicU64,
    finished: AtomicBool,
    failure: Mutex<Option<String>>,
}

/// Progress of one in-flight download, cheap to clone and share.
///
/// `received` only grows; `total` is the server-announced content length and
/// an authoritative upper bound once set.
#[derive(Clone)]
pub struct DownloadProgress {
    inner: Arc<ProgressInner>,
}

impl DownloadProgress {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ProgressInner {
                received: AtomicU64::new(0),
                total: AtomicU64::new(TOTAL_UNKNOWN),
                finished: AtomicBool::new(false),
                failure: Mutex::new(None),
            }),
        }
    }

    pub fn received(&self) -> u64 {
        self.inner.received.load(Ordering::Acquire)
    }

    pub fn add_received(&self, bytes: u64) {
        self.inner.received.fetch_add(bytes, Ordering::AcqRel);
    }

    /// Announced content length, if known
    pub fn total(&self) -> Option<u64> {
        match self.inner.total.load(Ordering::Acquire) {
            TOTAL_UNKNOWN => None,
            n => Some(n),
        }
    }

    pub fn set_total(&self, bytes: u64) {
        self.inner.total.store(bytes, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::Acquire)
    }

    pub fn mark_finished(&self) {
        self.inner.finished.store(true, Ordering::Release);
    }

    pub fn failure(&self) -> Option<String> {
        self.inner.failure.lock().clone()
    }

    pub fn is_failed(&self) -> bool {
        self.inner.failure.lock().is_some()
    }

    pub fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        let mut failure = self.inner.failure.lock();
        if failure.is_none() {
            *failure = Some(message);
        }
    }

    /// True when every announced byte has arrived
    pub fn is_complete(&self) -> bool {
        match self.total() {
            Some(total) => self.received() == total,
            None => false,
        }
    }
}

impl Default for DownloadProgress {
    fn default() -> Self {
        Self::new()
    }
}
