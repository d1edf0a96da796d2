// Bulk download pool tests over the scripted transport

mod common;

use cappella_cache::{CacheKey, TrackCache};
use cappella_core::Track;
use cappella_playback::{DownloadPool, DownloadRequest, DownloadTarget};
use cappella_source_buffer::SourceBuffer;
use common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10);

fn track(track_id: u64, locator: &str) -> Arc<Track> {
    Arc::new(Track::new(3, track_id, format!("track-{}", track_id), 0, locator))
}

#[test]
fn file_download_completes_with_chunk_callbacks() {
    let dir = tempdir().unwrap();
    let settings = test_settings(dir.path());
    let transport = ScriptedTransport::new();

    let bytes = payload(100_000);
    transport.script("https://stream.example/1", TrackScript::new(bytes.clone()));

    let cache = Arc::new(TrackCache::open(&settings.cache_dir).unwrap());
    let pool = DownloadPool::new(&settings, transport.clone(), cache).unwrap();

    let dest = dir.path().join("one.audio");
    let chunks = Arc::new(AtomicUsize::new(0));
    let chunks_seen = chunks.clone();
    let track = track(1, "https://stream.example/1");

    let progress = pool.enqueue(DownloadRequest {
        track: track.clone(),
        target: DownloadTarget::File(dest.clone()),
        on_chunk: Some(Box::new(move |state| {
            assert!(state.received() <= state.total().unwrap_or(u64::MAX));
            chunks_seen.fetch_add(1, Ordering::SeqCst);
        })),
    });

    assert!(wait_until(DOWNLOAD_TIMEOUT, || progress.is_finished()));
    assert!(progress.is_complete());
    assert!(!track.is_downloading());

    let written = std::fs::read(&dest).unwrap();
    assert_eq!(written, bytes);

    // One callback per 4KB chunk
    assert_eq!(chunks.load(Ordering::SeqCst), 100_000_usize.div_ceil(4096));
}

#[test]
fn memory_download_lands_in_supplied_buffer() {
    let dir = tempdir().unwrap();
    let settings = test_settings(dir.path());
    let transport = ScriptedTransport::new();

    let bytes = payload(30_000);
    transport.script("https://stream.example/2", TrackScript::new(bytes.clone()));

    let cache = Arc::new(TrackCache::open(&settings.cache_dir).unwrap());
    let pool = DownloadPool::new(&settings, transport, cache).unwrap();

    let buffer = SourceBuffer::with_capacity_limit(settings.max_stream_bytes);
    let progress = pool.enqueue(DownloadRequest {
        track: track(2, "https://stream.example/2"),
        target: DownloadTarget::Memory(buffer.clone()),
        on_chunk: None,
    });

    assert!(wait_until(DOWNLOAD_TIMEOUT, || progress.is_finished()));
    assert!(buffer.is_finished());
    assert_eq!(buffer.snapshot(), bytes);
}

#[test]
fn one_failing_download_does_not_affect_others() {
    let dir = tempdir().unwrap();
    let settings = test_settings(dir.path());
    let transport = ScriptedTransport::new();

    let bytes = payload(50_000);
    transport.script("https://stream.example/3", TrackScript::new(bytes.clone()));
    // No script for /4: its open fails

    let cache = Arc::new(TrackCache::open(&settings.cache_dir).unwrap());
    let pool = DownloadPool::new(&settings, transport, cache).unwrap();

    let good_track = track(3, "https://stream.example/3");
    let bad_track = track(4, "https://stream.example/4");
    let good_dest = dir.path().join("good.audio");

    let bad = pool.enqueue(DownloadRequest {
        track: bad_track.clone(),
        target: DownloadTarget::File(dir.path().join("bad.audio")),
        on_chunk: None,
    });
    let good = pool.enqueue(DownloadRequest {
        track: good_track.clone(),
        target: DownloadTarget::File(good_dest.clone()),
        on_chunk: None,
    });

    assert!(wait_until(DOWNLOAD_TIMEOUT, || good.is_finished()));
    assert!(wait_until(DOWNLOAD_TIMEOUT, || bad.is_failed()));
    assert!(!bad.is_finished());

    assert_eq!(std::fs::read(&good_dest).unwrap(), bytes);
    assert!(!good_track.is_downloading());
    assert!(!bad_track.is_downloading());
}

#[test]
fn mid_transfer_error_marks_job_failed() {
    let dir = tempdir().unwrap();
    let settings = test_settings(dir.path());
    let transport = ScriptedTransport::new();

    let mut script = TrackScript::new(payload(80_000));
    script.fail_after = Some(20_000);
    transport.script("https://stream.example/5", script);

    let cache = Arc::new(TrackCache::open(&settings.cache_dir).unwrap());
    let pool = DownloadPool::new(&settings, transport, cache).unwrap();

    let buffer = SourceBuffer::with_capacity_limit(settings.max_stream_bytes);
    let progress = pool.enqueue(DownloadRequest {
        track: track(5, "https://stream.example/5"),
        target: DownloadTarget::Memory(buffer.clone()),
        on_chunk: None,
    });

    assert!(wait_until(DOWNLOAD_TIMEOUT, || progress.is_failed()));
    // The buffer's readers are released too
    assert!(buffer.is_finished());
    assert!(buffer.failure().is_some());
}

#[test]
fn cached_track_downloads_without_network() {
    let dir = tempdir().unwrap();
    let settings = test_settings(dir.path());
    let transport = ScriptedTransport::new();

    let bytes = payload(60_000);
    let cache = Arc::new(TrackCache::open(&settings.cache_dir).unwrap());
    cache.write(&CacheKey::new(3, 7), &bytes).unwrap();

    // No transport script: any network attempt would fail the job
    let pool = DownloadPool::new(&settings, transport.clone(), cache).unwrap();

    let dest = dir.path().join("seven.audio");
    let progress = pool.enqueue(DownloadRequest {
        track: track(7, "https://stream.example/7"),
        target: DownloadTarget::File(dest.clone()),
        on_chunk: None,
    });

    assert!(wait_until(DOWNLOAD_TIMEOUT, || progress.is_finished()));
    assert_eq!(transport.open_count(), 0);
    assert_eq!(std::fs::read(&dest).unwrap(), bytes);
}

#[test]
fn dropping_the_pool_finishes_queued_jobs() {
    let dir = tempdir().unwrap();
    let settings = test_settings(dir.path());
    let transport = ScriptedTransport::new();

    let bytes = payload(10_000);
    transport.script("https://stream.example/6", TrackScript::new(bytes.clone()));

    let cache = Arc::new(TrackCache::open(&settings.cache_dir).unwrap());
    let pool = DownloadPool::new(&settings, transport, cache).unwrap();
    let dest = dir.path().join("six.audio");
    let progress = pool.enqueue(DownloadRequest {
        track: track(6, "https://stream.example/6"),
        target: DownloadTarget::File(dest.clone()),
        on_chunk: None,
    });

    // Drop joins the workers after they drain the queue
    drop(pool);

    assert!(progress.is_finished());
    assert_eq!(std::fs::read(&dest).unwrap(), bytes);
}
