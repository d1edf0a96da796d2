// Playback controller: owns the worker threads and the play/stop handshake

use crate::session::{PlaybackSession, SessionSlot};
use crate::{fetch, render};
use cappella_cache::TrackCache;
use cappella_core::{
    event_channel, DecoderFactory, EventSink, PlayerError, PlayerEvent, Result, Settings,
    SinkFactory, Track, Volume,
};
use cappella_transport::Transport;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;

/// The playback pipeline: one fetch worker, one decode/play worker, and the
/// session state that glues them together.
///
/// Only one track occupies the pipeline at a time; `play` while another track
/// is active performs a full internal stop first.
pub struct PlayerCore {
    settings: Settings,
    volume: Volume,
    events: EventSink,
    events_rx: Receiver<PlayerEvent>,
    fetch_slot: Arc<SessionSlot>,
    render_slot: Arc<SessionSlot>,
    current: Mutex<Option<Arc<PlaybackSession>>>,
    fetch_handle: Option<JoinHandle<()>>,
    render_handle: Option<JoinHandle<()>>,
}

impl PlayerCore {
    pub fn new(
        settings: Settings,
        transport: Arc<dyn Transport>,
        decoders: Arc<dyn DecoderFactory>,
        sinks: Box<dyn SinkFactory>,
    ) -> Result<Self> {
        let cache = Arc::new(TrackCache::open(&settings.cache_dir)?);
        let (events, events_rx) = event_channel(settings.event_queue_depth);
        let volume = Volume::default();

        let fetch_slot = Arc::new(SessionSlot::new());
        let render_slot = Arc::new(SessionSlot::new());

        let fetch_handle = fetch::spawn(
            fetch_slot.clone(),
            transport,
            cache,
            settings.clone(),
            events.clone(),
        )
        .map_err(|e| PlayerError::Io(format!("spawn fetch worker: {}", e)))?;

        let render_handle = render::spawn(
            render_slot.clone(),
            decoders,
            sinks,
            volume.clone(),
            events.clone(),
        )
        .map_err(|e| PlayerError::Io(format!("spawn render worker: {}", e)))?;

        Ok(Self {
            settings,
            volume,
            events,
            events_rx,
            fetch_slot,
            render_slot,
            current: Mutex::new(None),
            fetch_handle: Some(fetch_handle),
            render_handle: Some(render_handle),
        })
    }

    /// Start playing a track. Any active track is stopped first (and marked
    /// paused if it had progressed). Returns as soon as the workers have the
    /// new session; data arrival is reported through events.
    ///
    /// The session lock is held across the whole handoff, so concurrent
    /// `play`/`stop` callers serialize instead of interleaving the handshake.
    pub fn play(&self, track: &Arc<Track>) {
        let mut current = self.current.lock();
        if let Some(old) = current.take() {
            Self::stop_session(&old, false);
        }

        track.set_position_ms(0);
        track.set_playing(true);
        track.set_paused(false);
        log::info!("playing track {} ({})", track.track_id, track.title);

        let session = PlaybackSession::new(track.clone(), self.settings.max_stream_bytes);
        *current = Some(session.clone());

        // Both slots are quiescent here: the previous session's latch has
        // completed, so each worker has already taken it out of its slot
        self.fetch_slot.deliver(session.clone());
        self.render_slot.deliver(session);
    }

    /// Stop the active track, if any. Returns only after both workers have
    /// acknowledged by leaving the session.
    pub fn stop(&self, reset_position: bool) {
        let mut current = self.current.lock();
        if let Some(session) = current.take() {
            Self::stop_session(&session, reset_position);
        }
    }

    fn stop_session(session: &PlaybackSession, reset_position: bool) {
        session.request_stop();
        session.wait_workers_done();

        // Both workers are out; session state is safe to release
        let track = &session.track;
        track.set_playing(false);
        if reset_position {
            track.set_position_ms(0);
            track.set_paused(false);
        } else if track.position_ms() > 0 {
            track.set_paused(true);
        }
        log::debug!("stopped track {}", track.track_id);
    }

    /// Last position reported by the decode/play worker, in whole seconds
    pub fn position_secs(&self) -> u64 {
        self.current
            .lock()
            .as_ref()
            .map(|session| session.track.position_secs())
            .unwrap_or(0)
    }

    /// Relative volume adjustment, clamped to 0..=100. Returns the new value.
    pub fn change_volume(&self, delta: i32) -> u32 {
        let volume = self.volume.adjust(delta);
        self.events.publish(PlayerEvent::VolumeChanged { volume });
        volume
    }

    pub fn volume(&self) -> u32 {
        self.volume.percent()
    }

    /// Receiver for player events; clone it onto whichever thread renders the UI
    pub fn events(&self) -> Receiver<PlayerEvent> {
        self.events_rx.clone()
    }
}

impl Drop for PlayerCore {
    fn drop(&mut self) {
        self.stop(false);
        self.fetch_slot.close();
        self.render_slot.close();
        if let Some(handle) = self.fetch_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.render_handle.take() {
            let _ = handle.join();
        }
    }
}
