// Bulk download pool: explicit save-to-file requests, decoupled from playback

use cappella_cache::{CacheKey, TrackCache};
use cappella_core::{DownloadProgress, PlayerError, Result, Settings, Track};
use cappella_source_buffer::SourceBuffer;
use cappella_transport::{Connection, Transport};
use crossbeam_channel::{unbounded, Sender};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Where a bulk download lands
pub enum DownloadTarget {
    /// Stream into a file at this path
    File(PathBuf),
    /// Stream into a caller-supplied buffer
    Memory(SourceBuffer),
}

/// Invoked after each received chunk, from the worker's thread
pub type ChunkCallback = Box<dyn Fn(&DownloadProgress) + Send>;

/// One bulk download request
pub struct DownloadRequest {
    pub track: Arc<Track>,
    pub target: DownloadTarget,
    pub on_chunk: Option<ChunkCallback>,
}

struct Job {
    request: DownloadRequest,
    progress: DownloadProgress,
}

/// Fixed-size worker pool draining a FIFO queue of download jobs.
///
/// Independent from the playback fetch worker; the two share only the
/// transport abstraction and the cache layer (already-cached tracks are
/// served without a network call). One failing job never affects the others.
/// The pool finishes in-flight jobs and joins its workers on drop.
pub struct DownloadPool {
    queue: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl DownloadPool {
    pub fn new(
        settings: &Settings,
        transport: Arc<dyn Transport>,
        cache: Arc<TrackCache>,
    ) -> Result<Self> {
        let (tx, rx) = unbounded::<Job>();

        let mut workers = Vec::with_capacity(settings.download_workers);
        for index in 0..settings.download_workers {
            let rx = rx.clone();
            let transport = transport.clone();
            let cache = cache.clone();
            let settings = settings.clone();
            let handle = thread::Builder::new()
                .name(format!("cappella-download-{}", index))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        run_job(job, transport.as_ref(), &cache, &settings);
                    }
                })
                .map_err(|e| PlayerError::Io(format!("spawn download worker: {}", e)))?;
            workers.push(handle);
        }

        Ok(Self {
            queue: Some(tx),
            workers,
        })
    }

    /// Queue a download. The returned progress handle is live immediately;
    /// poll it or watch the per-chunk callback.
    pub fn enqueue(&self, request: DownloadRequest) -> DownloadProgress {
        let progress = DownloadProgress::new();
        request.track.set_downloading(true);

        let job = Job {
            request,
            progress: progress.clone(),
        };

        if let Some(queue) = &self.queue {
            if let Err(err) = queue.send(job) {
                err.0.request.track.set_downloading(false);
                progress.fail("download pool is shut down");
            }
        }

        progress
    }
}

impl Drop for DownloadPool {
    fn drop(&mut self) {
        // Closing the channel lets each worker drain and exit
        self.queue.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn run_job(job: Job, transport: &dyn Transport, cache: &TrackCache, settings: &Settings) {
    let Job { request, progress } = job;
    let DownloadRequest {
        track,
        target,
        on_chunk,
    } = request;

    log::info!("downloading track {} ({})", track.track_id, track.title);

    let key = CacheKey::new(track.owner_id, track.track_id);
    let cached = cache.read(&key).ok();

    let result = match &target {
        DownloadTarget::File(path) => download_to_file(
            &track,
            path,
            cached,
            on_chunk.as_deref(),
            &progress,
            transport,
            settings,
        ),
        DownloadTarget::Memory(buffer) => download_to_buffer(
            &track,
            buffer,
            cached,
            on_chunk.as_deref(),
            &progress,
            transport,
            settings,
        ),
    };

    match result {
        Ok(()) => {
            progress.mark_finished();
            log::info!(
                "download finished: track {} ({} bytes)",
                track.track_id,
                progress.received()
            );
        }
        Err(err) => {
            let message = err.to_string();
            log::warn!("download failed for track {}: {}", track.track_id, message);
            if let DownloadTarget::Memory(buffer) = &target {
                buffer.mark_failed(&message);
            }
            progress.fail(message);
        }
    }

    track.set_downloading(false);
}

fn download_to_file(
    track: &Track,
    path: &Path,
    cached: Option<Vec<u8>>,
    on_chunk: Option<&(dyn Fn(&DownloadProgress) + Send)>,
    progress: &DownloadProgress,
    transport: &dyn Transport,
    settings: &Settings,
) -> Result<()> {
    let file = File::create(path).map_err(|e| PlayerError::Io(format!("create {:?}: {}", path, e)))?;
    let mut writer = BufWriter::new(file);

    let write = |writer: &mut BufWriter<File>, bytes: &[u8]| {
        writer
            .write_all(bytes)
            .map_err(|e| PlayerError::Io(format!("write {:?}: {}", path, e)))
    };

    match cached {
        Some(blob) => copy_cached(blob, progress, on_chunk, |bytes| write(&mut writer, bytes))?,
        None => stream_chunks(track, progress, transport, settings, on_chunk, |bytes| {
            write(&mut writer, bytes)
        })?,
    }

    writer
        .flush()
        .map_err(|e| PlayerError::Io(format!("flush {:?}: {}", path, e)))
}

fn download_to_buffer(
    track: &Track,
    buffer: &SourceBuffer,
    cached: Option<Vec<u8>>,
    on_chunk: Option<&(dyn Fn(&DownloadProgress) + Send)>,
    progress: &DownloadProgress,
    transport: &dyn Transport,
    settings: &Settings,
) -> Result<()> {
    match cached {
        Some(blob) => copy_cached(blob, progress, on_chunk, |bytes| buffer.append(bytes))?,
        None => stream_chunks(track, progress, transport, settings, on_chunk, |bytes| {
            buffer.append(bytes)
        })?,
    }
    buffer.mark_finished();
    Ok(())
}

/// Cache hit: the whole blob lands in one pass with one progress callback
fn copy_cached(
    blob: Vec<u8>,
    progress: &DownloadProgress,
    on_chunk: Option<&(dyn Fn(&DownloadProgress) + Send)>,
    mut write: impl FnMut(&[u8]) -> Result<()>,
) -> Result<()> {
    let size = blob.len() as u64;
    progress.set_total(size);
    write(&blob)?;
    progress.add_received(size);
    if let Some(callback) = on_chunk {
        callback(progress);
    }
    Ok(())
}

fn stream_chunks(
    track: &Track,
    progress: &DownloadProgress,
    transport: &dyn Transport,
    settings: &Settings,
    on_chunk: Option<&(dyn Fn(&DownloadProgress) + Send)>,
    mut write: impl FnMut(&[u8]) -> Result<()>,
) -> Result<()> {
    let mut conn: Box<dyn Connection> = transport.open(&track.locator)?;

    let announced = conn.content_length();
    if let Some(total) = announced {
        if total > settings.max_stream_bytes as u64 {
            return Err(PlayerError::Oversized {
                announced: total,
                limit: settings.max_stream_bytes as u64,
            });
        }
        progress.set_total(total);
    }

    let mut chunk = vec![0u8; settings.chunk_bytes];
    loop {
        let n = conn.read_chunk(&mut chunk)?;
        if n == 0 {
            break;
        }
        write(&chunk[..n])?;
        progress.add_received(n as u64);
        if let Some(callback) = on_chunk {
            callback(progress);
        }
    }

    let received = progress.received();
    match announced {
        Some(total) if received < total => Err(PlayerError::Transport(format!(
            "download ended early: {} of {} bytes",
            received, total
        ))),
        Some(_) => Ok(()),
        None => {
            progress.set_total(received);
            Ok(())
        }
    }
}
