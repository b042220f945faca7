//! Dialog orchestrator
//!
//! The top-level turn loop: pull microphone chunks, run wake detection,
//! keep the access token live, stage and post a turn, demultiplex the
//! answer, and feed its audio to the speaker. Every non-fatal failure
//! flushes the capture ring before the gate returns to LIVE so the next
//! turn's detector input starts clean.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::audio::decode;
use crate::audio::gate::CaptureGate;
use crate::audio::ring_buffer::FrameRing;
use crate::audio::wav::ResponseWav;
use crate::audio::{enqueue_playback, DETECT_CHUNK_FRAMES, POLL_INTERVAL};
use crate::avs::response::{self, PartKind};
use crate::avs::upload::{self, CaptureBody};
use crate::avs::{auth, SpeechClient};
use crate::config::{self, Credentials};
use crate::detector::WakeDetector;

/// Feedback sounds, preloaded and validated at startup.
#[derive(Default)]
pub struct Sounds {
    /// Played when the assistant starts listening.
    pub listen: Option<Vec<i16>>,
    /// Played when the connection is lost.
    pub lost: Option<Vec<i16>>,
}

/// How long shutdown waits for queued playback to finish.
const DRAIN_DEADLINE: Duration = Duration::from_secs(5);

pub struct Orchestrator {
    pub capture: Arc<FrameRing>,
    pub capture_lock: Arc<Mutex<()>>,
    pub playback: Arc<FrameRing>,
    pub playback_lock: Arc<Mutex<()>>,
    pub gate: Arc<CaptureGate>,
    pub detector: Box<dyn WakeDetector>,
    pub speech: SpeechClient,
    pub auth_http: reqwest::blocking::Client,
    pub creds: Credentials,
    pub config_path: PathBuf,
    pub sounds: Sounds,
    pub output_path: Option<PathBuf>,
    /// The server asked a follow-up question: the next turn bypasses the
    /// wake-word gate exactly once.
    pub reask: bool,
}

impl Orchestrator {
    /// The main loop. Runs until `running` clears, then drains playback
    /// so queued audio finishes before the streams go down.
    pub fn run(&mut self, running: &AtomicBool) {
        tracing::info!("Listening... press Ctrl+C to exit");

        while running.load(Ordering::SeqCst) {
            let chunk = match self.wait_for_chunk(running) {
                Some(chunk) => chunk,
                None => break,
            };

            let hit = self.detector.run_detection(&chunk);
            if hit <= 0 && !self.reask {
                continue;
            }
            if hit > 0 {
                tracing::info!("Hot word {} detected", hit);
            } else {
                // The follow-up prompt bypasses the gate exactly once;
                // the next response decides whether to ask again.
                self.reask = false;
                tracing::info!("Follow-up turn, skipping the wake-word gate");
            }

            self.run_turn();
        }

        self.drain_playback();
    }

    /// Poll until at least 100 ms of samples are buffered, then take
    /// everything. Returns None when shutdown is requested mid-wait.
    fn wait_for_chunk(&self, running: &AtomicBool) -> Option<Vec<i16>> {
        loop {
            if !running.load(Ordering::SeqCst) {
                return None;
            }
            if self.capture.read_available() >= DETECT_CHUNK_FRAMES {
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }
        let _guard = self.capture_lock.lock();
        Some(self.capture.read_all())
    }

    /// One wake → record → upload → respond → play cycle.
    fn run_turn(&mut self) {
        if let Some(listen) = &self.sounds.listen {
            enqueue_playback(&self.playback, &self.playback_lock, listen);
        }

        if let Err(e) = self.ensure_token() {
            tracing::warn!("Cannot get access token, skipping turn: {}", e);
            let _guard = self.capture_lock.lock();
            self.capture.flush();
            return;
        }

        let staged = match upload::stage_turn(
            self.capture.clone(),
            self.capture_lock.clone(),
            self.gate.clone(),
        ) {
            Ok(staged) => staged,
            Err(e) => {
                tracing::error!("Failed to stage upload: {}", e);
                self.finish_turn();
                return;
            }
        };
        tracing::debug!("Upload staged, {} bytes total", staged.total_bytes);
        tracing::info!("Please ask something!");

        let body = CaptureBody::new(
            self.capture.clone(),
            self.capture_lock.clone(),
            staged.total_bytes,
        );
        let result = self.speech.recognize(&self.creds.access_token, body);
        staged.join();

        match result {
            Ok(response) => {
                self.handle_response(&response);
            }
            Err(e) => {
                tracing::warn!("Speech request failed: {}", e);
                if let Some(lost) = &self.sounds.lost {
                    enqueue_playback(&self.playback, &self.playback_lock, lost);
                }
                self.reask = false;
            }
        }
        self.finish_turn();
    }

    /// Return the gate to LIVE, flushing the capture ring first so
    /// nothing from this turn leaks into the next turn's detector input.
    /// On a clean upload the ring is already empty and the flush is a
    /// no-op.
    fn finish_turn(&mut self) {
        {
            let _guard = self.capture_lock.lock();
            self.capture.flush();
        }
        self.gate.resume_live();
    }

    /// Refresh the access token if the liveness window has closed, and
    /// persist the new state.
    fn ensure_token(&mut self) -> Result<(), auth::AuthError> {
        let now = config::now_epoch();
        if self.creds.token_is_live(now) {
            return Ok(());
        }

        tracing::info!("Access token stale, refreshing");
        let grant = auth::refresh_access_token(
            &self.auth_http,
            &self.creds.client_id,
            &self.creds.client_secret,
            &self.creds.refresh_token,
        )?;
        self.creds.apply_grant(&grant, now);

        if let Err(e) = config::save(&self.config_path, &self.creds) {
            tracing::warn!("Failed to persist refreshed credentials: {}", e);
        }
        Ok(())
    }

    /// Route a 200 response: the JSON part decides the re-ask, each MP3
    /// part goes to the speaker (and the output file when configured).
    fn handle_response(&mut self, body: &[u8]) {
        let parts = match response::split_parts(body) {
            Ok(parts) => parts,
            Err(e) => {
                tracing::warn!("Dropping malformed response: {}", e);
                return;
            }
        };

        let mut wav: Option<ResponseWav> = None;
        // A decode failure drops the remaining audio of this turn, but
        // parts arrive in any order and a later JSON part must still
        // decide the re-ask.
        let mut audio_failed = false;

        for part in &parts {
            match part.kind {
                PartKind::Json => {
                    tracing::debug!("Directive: {}", String::from_utf8_lossy(&part.data));
                    self.reask = response::wants_reask(&part.data);
                }
                PartKind::Mpeg => {
                    if audio_failed {
                        continue;
                    }
                    if wav.is_none() {
                        if let Some(path) = &self.output_path {
                            match ResponseWav::create(path) {
                                Ok(writer) => wav = Some(writer),
                                Err(e) => {
                                    tracing::warn!("Cannot write response audio file: {}", e)
                                }
                            }
                        }
                    }
                    match decode::play_mp3_part(
                        &part.data,
                        &self.playback,
                        &self.playback_lock,
                        wav.as_mut(),
                    ) {
                        Ok(frames) => {
                            tracing::debug!("Queued {} frames of response audio", frames)
                        }
                        Err(e) => {
                            tracing::warn!(
                                "Response audio decode failed, dropping this turn's remaining audio: {}",
                                e
                            );
                            audio_failed = true;
                        }
                    }
                }
            }
        }

        if let Some(writer) = wav.take() {
            if let Err(e) = writer.finalize() {
                tracing::warn!("Failed to finalise response audio file: {}", e);
            }
        }
    }

    /// Bounded wait for queued playback to reach the speaker.
    fn drain_playback(&self) {
        let deadline = Instant::now() + DRAIN_DEADLINE;
        while self.playback.read_available() > 0 && Instant::now() < deadline {
            thread::sleep(POLL_INTERVAL);
        }
    }
}
