//! Duplex audio via cpal
//!
//! Opens one input and one output stream on the default devices, both at
//! 16 kHz mono i16. cpal has no single duplex callback, so the two
//! callbacks share nothing but the rings and the capture gate; each is
//! wait-free on its own side.
//!
//! Output path: drain the playback ring, zero-fill whatever is missing so
//! an underrun plays silence instead of clicking. Input path: gated by
//! [`CaptureGate`]; blocks are written whole or dropped whole, and drops
//! are tolerated while idle.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::gate::CaptureGate;
use super::ring_buffer::FrameRing;
use super::SAMPLE_RATE;

/// Errors raised while bringing the audio streams up. All are fatal at
/// startup.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("no default input device available")]
    NoInputDevice,

    #[error("no default output device available")]
    NoOutputDevice,

    #[error("failed to build audio stream: {0}")]
    Build(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    Play(#[from] cpal::PlayStreamError),
}

/// The running duplex streams. Dropping this stops both callbacks.
pub struct DuplexAudio {
    _input: cpal::Stream,
    _output: cpal::Stream,
}

/// Open and start the duplex streams.
#[allow(deprecated)] // cpal 0.17 deprecates name() but description() is not yet stable
pub fn start(
    capture: Arc<FrameRing>,
    playback: Arc<FrameRing>,
    gate: Arc<CaptureGate>,
) -> Result<DuplexAudio, AudioError> {
    let host = cpal::default_host();
    let input_device = host.default_input_device().ok_or(AudioError::NoInputDevice)?;
    let output_device = host
        .default_output_device()
        .ok_or(AudioError::NoOutputDevice)?;

    tracing::info!(
        "Audio devices: in='{}', out='{}', {} Hz mono i16",
        input_device.name().unwrap_or_else(|_| "Unknown".to_string()),
        output_device.name().unwrap_or_else(|_| "Unknown".to_string()),
        SAMPLE_RATE
    );

    let config = cpal::StreamConfig {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        buffer_size: cpal::BufferSize::Default,
    };

    let input = input_device.build_input_stream(
        &config,
        move |data: &[i16], _: &cpal::InputCallbackInfo| {
            // Wait-free: no allocation, no locks, no logging.
            let quota = gate.quota(data.len());
            if quota == 0 || capture.write_available() < data.len() {
                // Drop the whole block. In LIVE this is the tolerated
                // overflow policy; in RECORDING the budget is untouched so
                // the recording still reaches its exact length.
                return;
            }
            let written = capture.write(&data[..quota]);
            gate.commit(written);
        },
        |err| {
            tracing::error!("Audio input stream error: {}", err);
        },
        None,
    )?;

    let output = output_device.build_output_stream(
        &config,
        move |out: &mut [i16], _: &cpal::OutputCallbackInfo| {
            let read = playback.read(out);
            out[read..].fill(0);
        },
        |err| {
            tracing::error!("Audio output stream error: {}", err);
        },
        None,
    )?;

    input.play()?;
    output.play()?;

    Ok(DuplexAudio {
        _input: input,
        _output: output,
    })
}
