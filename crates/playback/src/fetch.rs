// Fetch worker: resolves each session to cache or network and feeds the
// session buffer, promoting complete streams to the cache

use crate::session::{PlaybackSession, SessionSlot};
use cappella_cache::{CacheKey, TrackCache};
use cappella_core::{EventSink, PlayerError, PlayerEvent, Result, Settings};
use cappella_transport::Transport;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub(crate) fn spawn(
    slot: Arc<SessionSlot>,
    transport: Arc<dyn Transport>,
    cache: Arc<TrackCache>,
    settings: Settings,
    events: EventSink,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("cappella-fetch".to_string())
        .spawn(move || {
            log::debug!("fetch worker started");
            while let Some(session) = slot.wait_take() {
                run(&session, transport.as_ref(), &cache, &settings, &events);
                session.worker_done();
            }
            log::debug!("fetch worker exiting");
        })
}

fn run(
    session: &PlaybackSession,
    transport: &dyn Transport,
    cache: &TrackCache,
    settings: &Settings,
    events: &EventSink,
) {
    if session.is_stopped() {
        return;
    }

    let key = CacheKey::new(session.track.owner_id, session.track.track_id);

    let outcome = match cache.read(&key) {
        Ok(blob) => serve_cached(session, blob),
        // A miss (or a read error degraded to one) falls through to the network
        Err(_) => stream_from_network(session, transport, cache, settings, &key),
    };

    if let Err(err) = outcome {
        let message = err.to_string();
        log::warn!("fetch failed for track {}: {}", session.track.track_id, message);
        session.progress.fail(&message);
        session.buffer.mark_failed(&message);
        session.track.set_playing(false);
        events.publish(PlayerEvent::TrackFailed { message });
    }
}

/// Cache hit: the whole stream lands in the buffer in one pass with a single
/// data-available notification
fn serve_cached(session: &PlaybackSession, blob: Vec<u8>) -> Result<()> {
    let size = blob.len() as u64;
    session.progress.set_total(size);
    session.buffer.append(&blob)?;
    session.progress.add_received(size);
    session.progress.mark_finished();
    session.buffer.mark_finished();
    log::info!("serving track {} from cache ({} bytes)", session.track.track_id, size);
    Ok(())
}

fn stream_from_network(
    session: &PlaybackSession,
    transport: &dyn Transport,
    cache: &TrackCache,
    settings: &Settings,
    key: &CacheKey,
) -> Result<()> {
    let mut conn = transport.open(&session.track.locator)?;

    let announced = conn.content_length();
    if let Some(total) = announced {
        if total > settings.max_stream_bytes as u64 {
            return Err(PlayerError::Oversized {
                announced: total,
                limit: settings.max_stream_bytes as u64,
            });
        }
        session.progress.set_total(total);
        session.buffer.reserve(total as usize);
        if total == 0 {
            // Nothing will arrive; finish with an empty buffer and skip the
            // pointless cache entry
            session.progress.mark_finished();
            session.buffer.mark_finished();
            return Ok(());
        }
    }

    let mut chunk = vec![0u8; settings.chunk_bytes];
    loop {
        // Cooperative stop: checked once per chunk; the partial buffer is
        // abandoned and never cached
        if session.is_stopped() {
            log::debug!(
                "fetch stopped after {} bytes, discarding partial stream",
                session.progress.received()
            );
            return Ok(());
        }

        let n = conn.read_chunk(&mut chunk)?;
        if n == 0 {
            break; // EOF
        }

        session.buffer.append(&chunk[..n])?;
        session.progress.add_received(n as u64);
    }

    let received = session.progress.received();
    match announced {
        Some(total) if received < total => {
            return Err(PlayerError::Transport(format!(
                "stream ended early: {} of {} bytes",
                received, total
            )));
        }
        Some(_) => {}
        None => session.progress.set_total(received),
    }

    session.progress.mark_finished();
    session.buffer.mark_finished();
    log::info!("download complete: {} bytes", received);

    if session.is_malformed() {
        log::debug!("skipping cache promotion: decoder rejected the stream");
        return Ok(());
    }

    // Promotion only happens here, after every announced byte arrived
    match cache.write(key, &session.buffer.snapshot()) {
        Ok(()) => session.track.set_cached(true),
        Err(e) => log::warn!("cache promotion failed, continuing uncached: {}", e),
    }

    Ok(())
}
