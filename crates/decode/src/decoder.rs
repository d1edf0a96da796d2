// Audio decoding using Symphonia
// Wraps probe + format reader + codec decoder behind the FrameDecoder trait

use cappella_core::{
    ByteSource, DecodeStep, DecoderFactory, FrameDecoder, PcmFrame, PlayerError, Result,
    StreamFormat,
};
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use std::io::{Read, Seek, SeekFrom};

/// Adapter giving Symphonia its `MediaSource` view of a [`ByteSource`]
struct SourceAdapter {
    inner: Box<dyn ByteSource>,
}

impl Read for SourceAdapter {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for SourceAdapter {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl MediaSource for SourceAdapter {
    fn is_seekable(&self) -> bool {
        self.inner.byte_len().is_some()
    }

    fn byte_len(&self) -> Option<u64> {
        self.inner.byte_len()
    }
}

/// Opens [`SymphoniaDecoder`]s over byte sources
pub struct SymphoniaFactory;

impl DecoderFactory for SymphoniaFactory {
    fn open_stream(&self, source: Box<dyn ByteSource>) -> Result<Box<dyn FrameDecoder>> {
        let decoder = SymphoniaDecoder::open(Box::new(SourceAdapter { inner: source }))?;
        Ok(Box::new(decoder))
    }
}

/// Incremental Symphonia decoder for one stream
pub struct SymphoniaDecoder {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    format: StreamFormat,
    format_announced: bool,
}

impl SymphoniaDecoder {
    /// Probe the container and open a decoder for its default track.
    ///
    /// The probe reads (and may block on) the source; a stop observed inside
    /// a blocking read surfaces here as a `Protocol` error whose cause the
    /// caller disambiguates via its own stop flag.
    pub fn open(media_source: Box<dyn MediaSource>) -> Result<Self> {
        let stream = MediaSourceStream::new(media_source, Default::default());

        let probed = symphonia::default::get_probe()
            .format(
                &Hint::new(),
                stream,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| PlayerError::Protocol(format!("probe failed: {}", e)))?;

        let format_reader = probed.format;

        let track = format_reader
            .default_track()
            .ok_or_else(|| PlayerError::Protocol("no default audio track".to_string()))?;
        let track_id = track.id;

        let codec_params = &track.codec_params;
        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| PlayerError::Protocol("sample rate not specified".to_string()))?;
        let channels = codec_params
            .channels
            .ok_or_else(|| PlayerError::Protocol("channel layout not specified".to_string()))?
            .count() as u16;
        let bits_per_sample = codec_params.bits_per_sample.unwrap_or(16) as u16;

        let decoder = symphonia::default::get_codecs()
            .make(codec_params, &DecoderOptions::default())
            .map_err(|e| PlayerError::Protocol(format!("unsupported codec: {}", e)))?;

        let format = StreamFormat {
            sample_rate,
            channels,
            bits_per_sample,
        };

        log::info!(
            "decoder opened: {}Hz, {} channels, {} bits",
            format.sample_rate,
            format.channels,
            format.bits_per_sample
        );

        Ok(Self {
            format_reader,
            decoder,
            track_id,
            format,
            format_announced: false,
        })
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }
}

impl FrameDecoder for SymphoniaDecoder {
    fn next_step(&mut self) -> Result<DecodeStep> {
        if !self.format_announced {
            self.format_announced = true;
            return Ok(DecodeStep::Format(self.format));
        }

        loop {
            let packet = match self.format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) => {
                    return Ok(match e.kind() {
                        std::io::ErrorKind::UnexpectedEof => DecodeStep::EndOfStream,
                        std::io::ErrorKind::Interrupted => DecodeStep::Interrupted,
                        std::io::ErrorKind::WouldBlock => DecodeStep::NeedData,
                        _ => {
                            return Err(PlayerError::Protocol(format!(
                                "failed to read packet: {}",
                                e
                            )))
                        }
                    });
                }
                Err(e) => {
                    return Err(PlayerError::Protocol(format!("failed to read packet: {}", e)));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let samples = interleave_f32(&decoded);
                    return Ok(DecodeStep::Frame(PcmFrame {
                        samples,
                        channels: self.format.channels,
                    }));
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    // Recoverable; skip the bad packet
                    log::debug!("decode error, skipping packet: {}", e);
                    continue;
                }
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::Interrupted =>
                {
                    return Ok(DecodeStep::Interrupted);
                }
                Err(e) => {
                    return Err(PlayerError::Protocol(format!("failed to decode: {}", e)));
                }
            }
        }
    }
}

/// Convert any Symphonia buffer to interleaved f32 samples
fn interleave_f32(buffer: &AudioBufferRef) -> Vec<f32> {
    use symphonia::core::conv::IntoSample;

    macro_rules! interleave {
        ($buf:expr) => {{
            let channels = $buf.spec().channels.count();
            let frames = $buf.frames();
            let mut samples = Vec::with_capacity(frames * channels);
            for frame_idx in 0..frames {
                for ch in 0..channels {
                    samples.push($buf.chan(ch)[frame_idx].into_sample());
                }
            }
            samples
        }};
    }

    match buffer {
        AudioBufferRef::U8(buf) => interleave!(buf),
        AudioBufferRef::U16(buf) => interleave!(buf),
        AudioBufferRef::U24(buf) => interleave!(buf),
        AudioBufferRef::U32(buf) => interleave!(buf),
        AudioBufferRef::S8(buf) => interleave!(buf),
        AudioBufferRef::S16(buf) => interleave!(buf),
        AudioBufferRef::S24(buf) => interleave!(buf),
        AudioBufferRef::S32(buf) => interleave!(buf),
        AudioBufferRef::F32(buf) => interleave!(buf),
        AudioBufferRef::F64(buf) => interleave!(buf),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Minimal in-memory WAV: PCM s16le, mono
    fn wav_bytes(sample_rate: u32, samples: &[i16]) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let byte_rate = sample_rate * 2;
        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&1u16.to_le_bytes()); // mono
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&byte_rate.to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes()); // block align
        out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }

    struct CursorSource(Cursor<Vec<u8>>);

    impl Read for CursorSource {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.0.read(buf)
        }
    }

    impl Seek for CursorSource {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.0.seek(pos)
        }
    }

    impl MediaSource for CursorSource {
        fn is_seekable(&self) -> bool {
            true
        }

        fn byte_len(&self) -> Option<u64> {
            Some(self.0.get_ref().len() as u64)
        }
    }

    #[test]
    fn decodes_pcm_wav() {
        let samples: Vec<i16> = (0..4800).map(|n| (n % 128) as i16 * 64).collect();
        let bytes = wav_bytes(48_000, &samples);
        let mut decoder =
            SymphoniaDecoder::open(Box::new(CursorSource(Cursor::new(bytes)))).unwrap();

        // Format comes first
        let format = match decoder.next_step().unwrap() {
            DecodeStep::Format(f) => f,
            _ => panic!("expected format discovery first"),
        };
        assert_eq!(format.sample_rate, 48_000);
        assert_eq!(format.channels, 1);

        // Then frames until end of stream
        let mut total_frames = 0u64;
        loop {
            match decoder.next_step().unwrap() {
                DecodeStep::Frame(frame) => total_frames += frame.frames(),
                DecodeStep::EndOfStream => break,
                DecodeStep::Format(_) => {}
                DecodeStep::NeedData | DecodeStep::Interrupted => {
                    panic!("unexpected step on a complete in-memory stream")
                }
            }
        }
        assert_eq!(total_frames, 4800);
    }

    #[test]
    fn garbage_is_a_protocol_error() {
        let bytes = vec![0xEEu8; 512];
        let result = SymphoniaDecoder::open(Box::new(CursorSource(Cursor::new(bytes))));
        assert!(matches!(result, Err(PlayerError::Protocol(_))));
    }
}
