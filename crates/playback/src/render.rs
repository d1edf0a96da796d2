// Decode/play worker: drains the session buffer through the decoder and
// renders frames, reporting position and end-of-track

use crate::session::{PlaybackSession, SessionSlot};
use cappella_core::{
    DecodeStep, DecoderFactory, EventSink, OutputSink, PlayerEvent, SinkFactory, StreamFormat,
    Volume,
};
use cappella_source_buffer::{BufferReader, WaitOutcome};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// How one session's decode loop ended
enum Exit {
    /// All audio played to the end
    Finished,
    /// Stop flag observed
    Stopped,
    /// Failed here; carries the message to publish
    Failed(String),
    /// Failed upstream; the fetch side already published the event
    AlreadyReported,
}

pub(crate) fn spawn(
    slot: Arc<SessionSlot>,
    decoders: Arc<dyn DecoderFactory>,
    sinks: Box<dyn SinkFactory>,
    volume: Volume,
    events: EventSink,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("cappella-render".to_string())
        .spawn(move || {
            log::debug!("render worker started");
            // The sink is created here because device stream handles live and
            // die on the thread that renders with them
            let mut sink: Option<Box<dyn OutputSink>> = None;
            while let Some(session) = slot.wait_take() {
                if sink.is_none() {
                    match sinks.create(volume.clone()) {
                        Ok(created) => sink = Some(created),
                        Err(e) => {
                            log::error!("output sink unavailable: {}", e);
                            events.publish(PlayerEvent::TrackFailed {
                                message: e.to_string(),
                            });
                        }
                    }
                }
                match sink.as_mut() {
                    Some(active) => run(&session, decoders.as_ref(), active.as_mut(), &events),
                    None => session.track.set_playing(false),
                }
                session.worker_done();
            }
            log::debug!("render worker exiting");
        })
}

fn run(
    session: &PlaybackSession,
    decoders: &dyn DecoderFactory,
    sink: &mut dyn OutputSink,
    events: &EventSink,
) {
    if session.is_stopped() {
        return;
    }

    let track = &session.track;
    track.set_position_ms(0);

    // Opening blocks until the container probe has enough bytes; a stop or an
    // upstream failure interrupts the blocked read
    let reader = BufferReader::new(session.buffer.clone(), session.stop.clone());
    let mut decoder = match decoders.open_stream(Box::new(reader)) {
        Ok(decoder) => decoder,
        Err(e) => {
            if !session.is_stopped() && session.buffer.failure().is_none() {
                session.flag_malformed();
                track.set_playing(false);
                events.publish(PlayerEvent::TrackFailed {
                    message: e.to_string(),
                });
            }
            return;
        }
    };

    let mut format: Option<StreamFormat> = None;
    let mut frames_rendered: u64 = 0;
    let mut last_reported_secs: Option<u64> = None;

    let exit = loop {
        if session.is_stopped() {
            break Exit::Stopped;
        }

        match decoder.next_step() {
            Ok(DecodeStep::Format(new_format)) => {
                if let Err(e) = sink.configure(&new_format) {
                    break Exit::Failed(e.to_string());
                }
                format = Some(new_format);
            }

            Ok(DecodeStep::Frame(frame)) => {
                if let Err(e) = sink.render(&frame, &session.stop) {
                    break Exit::Failed(e.to_string());
                }
                if let Some(fmt) = format {
                    frames_rendered += frame.frames();
                    let position_ms = frames_rendered * 1000 / fmt.sample_rate.max(1) as u64;
                    track.set_position_ms(position_ms);

                    // Position callbacks are potentially expensive redraws;
                    // only report when the whole-second value changes
                    let seconds = position_ms / 1000;
                    if last_reported_secs != Some(seconds) {
                        last_reported_secs = Some(seconds);
                        events.publish(PlayerEvent::PositionChanged { seconds });
                    }
                }
            }

            Ok(DecodeStep::NeedData) => {
                match session
                    .buffer
                    .wait_for_data(session.buffer.consumed(), &session.stop)
                {
                    WaitOutcome::DataAvailable => {}
                    WaitOutcome::Stopped => break Exit::Stopped,
                    WaitOutcome::Finished => {
                        // Every written byte is decoded and the writer is
                        // done: end of track, unless the writer failed
                        if session.buffer.failure().is_some() {
                            break Exit::AlreadyReported;
                        }
                        break Exit::Finished;
                    }
                }
            }

            Ok(DecodeStep::EndOfStream) => {
                if session.buffer.failure().is_some() {
                    break Exit::AlreadyReported;
                }
                break Exit::Finished;
            }

            Ok(DecodeStep::Interrupted) => break Exit::Stopped,

            Err(e) => {
                if session.is_stopped() {
                    break Exit::Stopped;
                }
                if session.buffer.failure().is_some() {
                    break Exit::AlreadyReported;
                }
                // Malformed mid-stream: finished-with-error, no promotion
                session.flag_malformed();
                break Exit::Failed(e.to_string());
            }
        }
    };

    // Drains pending audio on a natural finish; immediate on stop
    sink.finish(&session.stop);

    match exit {
        Exit::Finished => {
            track.set_playing(false);
            events.publish(PlayerEvent::TrackFinished);
        }
        Exit::Failed(message) => {
            log::warn!("playback failed for track {}: {}", track.track_id, message);
            track.set_playing(false);
            events.publish(PlayerEvent::TrackFailed { message });
        }
        Exit::Stopped | Exit::AlreadyReported => {
            // Stop: the controller owns the flag updates.
            // Upstream failure: the fetch worker already published it.
        }
    }
}
