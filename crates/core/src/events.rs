// Player events delivered to the UI layer over a bounded queue
// Worker threads never call into the UI directly; they post here and move on

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// Player event types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    /// Playback position advanced to a new whole second
    PositionChanged { seconds: u64 },

    /// The active track played to its end
    TrackFinished,

    /// The active track failed (network, decode, or device)
    TrackFailed { message: String },

    /// Volume changed
    VolumeChanged { volume: u32 },
}

/// Sending side of the event queue, cheap to clone into worker threads.
///
/// Position updates are lossy when the queue is full; terminal events are
/// also dropped rather than blocking an audio thread, but the drop is logged.
#[derive(Clone)]
pub struct EventSink {
    tx: Sender<PlayerEvent>,
}

impl EventSink {
    pub fn publish(&self, event: PlayerEvent) {
        let lossy = matches!(event, PlayerEvent::PositionChanged { .. });
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                if !lossy {
                    log::warn!("event queue full, dropping {:?}", event);
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                // UI went away; workers keep running until told to stop
            }
        }
    }
}

/// Create the bounded player event queue
pub fn event_channel(depth: usize) -> (EventSink, Receiver<PlayerEvent>) {
    let (tx, rx) = bounded(depth.max(1));
    (EventSink { tx }, rx)
}
