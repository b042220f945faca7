//! MP3 response decoding into the playback ring
//!
//! Uses symphonia for MP3 decoding and the rubato-backed
//! [`AudioConverter`] when the encoded rate or channel count differs from
//! the 16 kHz mono pipeline format. Decoded PCM is block-poll written to
//! the playback ring (playback is never dropped) and mirrored into the
//! optional response WAV file.

use std::io::Cursor;

use parking_lot::Mutex;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::format::{f32_to_i16, AudioConverter};
use super::ring_buffer::FrameRing;
use super::wav::{ResponseWav, WavError};
use super::{enqueue_playback, SAMPLE_RATE};

/// Chunk size for the rubato resampler (frames per call)
const RESAMPLE_CHUNK_SIZE: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unsupported audio format: {0}")]
    Probe(String),

    #[error("unsupported audio codec: {0}")]
    Codec(String),

    #[error("cannot determine sample rate from audio stream")]
    UnknownRate,

    #[error("error reading audio stream: {0}")]
    Stream(String),

    #[error("resampling error: {0}")]
    Resample(#[from] rubato::ResampleError),

    #[error("failed to create resampler: {0}")]
    ResamplerInit(#[from] rubato::ResamplerConstructionError),

    #[error(transparent)]
    Wav(#[from] WavError),
}

/// Decode one MP3 response part into the playback ring.
///
/// Returns the number of 16 kHz frames produced. The optional `wav` sink
/// receives the same frames for the `-o` output file.
pub fn play_mp3_part(
    data: &[u8],
    playback: &FrameRing,
    playback_lock: &Mutex<()>,
    mut wav: Option<&mut ResponseWav>,
) -> Result<usize, DecodeError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data.to_vec())), Default::default());

    let mut hint = Hint::new();
    hint.with_extension("mp3");

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::Probe(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::Probe("no audio track in response part".to_string()))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let source_rate = codec_params.sample_rate.ok_or(DecodeError::UnknownRate)?;
    let source_channels = codec_params.channels.map(|c| c.count()).unwrap_or(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Codec(e.to_string()))?;

    // Straight-through when the service already encoded at pipeline format
    let mut converter = if source_rate != SAMPLE_RATE || source_channels != 1 {
        tracing::debug!(
            "Response audio at {} Hz / {} ch, resampling to {} Hz mono",
            source_rate,
            source_channels,
            SAMPLE_RATE
        );
        Some(AudioConverter::new(
            source_rate,
            SAMPLE_RATE,
            source_channels,
            RESAMPLE_CHUNK_SIZE,
        )?)
    } else {
        None
    };

    let frames_per_chunk = RESAMPLE_CHUNK_SIZE * source_channels;
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut resample_buffer: Vec<f32> = Vec::new();
    let mut frames_out = 0usize;

    let emit = |frames: &[i16], wav: &mut Option<&mut ResponseWav>| -> Result<(), DecodeError> {
        if frames.is_empty() {
            return Ok(());
        }
        enqueue_playback(playback, playback_lock, frames);
        if let Some(w) = wav.as_deref_mut() {
            w.append(frames)?;
        }
        Ok(())
    };

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break; // End of stream
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(DecodeError::Stream(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::IoError(_)) | Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(DecodeError::Stream(e.to_string())),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.capacity();

        let sbuf =
            sample_buf.get_or_insert_with(|| SampleBuffer::<f32>::new(num_frames as u64, spec));
        if sbuf.capacity() < num_frames {
            *sbuf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        }
        sbuf.copy_interleaved_ref(decoded);
        let samples = sbuf.samples();

        match converter.as_mut() {
            None => {
                let frames = f32_to_i16(samples);
                frames_out += frames.len();
                emit(&frames, &mut wav)?;
            }
            Some(conv) => {
                resample_buffer.extend_from_slice(samples);
                while resample_buffer.len() >= frames_per_chunk {
                    let chunk: Vec<f32> = resample_buffer.drain(..frames_per_chunk).collect();
                    let frames = conv.process_to_i16(&chunk)?;
                    frames_out += frames.len();
                    emit(&frames, &mut wav)?;
                }
            }
        }
    }

    // Flush the partial resampler chunk, zero-padded to size.
    if let Some(conv) = converter.as_mut() {
        if !resample_buffer.is_empty() {
            resample_buffer.resize(frames_per_chunk, 0.0);
            let frames = conv.process_to_i16(&resample_buffer)?;
            frames_out += frames.len();
            emit(&frames, &mut wav)?;
        }
    }

    Ok(frames_out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_bytes_fail_probe() {
        let playback = FrameRing::with_capacity(1024);
        let lock = Mutex::new(());

        let garbage = vec![0xDEu8, 0xAD, 0xBE, 0xEF, 0x00, 0x01, 0x02, 0x03];
        let err = play_mp3_part(&garbage, &playback, &lock, None).unwrap_err();
        assert!(matches!(err, DecodeError::Probe(_)));
        assert_eq!(playback.read_available(), 0, "nothing reaches playback");
    }

    #[test]
    fn test_empty_part_fails_probe() {
        let playback = FrameRing::with_capacity(1024);
        let lock = Mutex::new(());

        assert!(play_mp3_part(&[], &playback, &lock, None).is_err());
    }
}
