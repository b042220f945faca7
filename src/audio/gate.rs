//! Capture mode controller
//!
//! A small state machine shared between the orchestrator and the
//! microphone callback. It decides what the callback writes into the
//! capture ring:
//!
//! ```text
//! LIVE ──(wake triggered, preamble staged)──► RECORDING
//! RECORDING ──(remaining == 0)──► STOPPED
//! STOPPED ──(turn complete)──► LIVE
//! ```
//!
//! The orchestrator publishes LIVE → RECORDING and STOPPED → LIVE; the
//! callback alone performs RECORDING → STOPPED when the frame budget is
//! spent. Publication is release/acquire so the preamble staged into the
//! ring is visible before the mode change is observable.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

/// What the microphone callback does with its input block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CaptureMode {
    /// Every microphone frame goes into the capture ring (detector mode).
    Live = 0,
    /// At most `remaining` frames go in; the callback counts down.
    Recording = 1,
    /// No capture writes; drain-only.
    Stopped = 2,
}

/// Shared capture gate: the mode flag plus the remaining-frame budget.
pub struct CaptureGate {
    mode: AtomicU8,
    remaining: AtomicUsize,
    /// Set while the upload builder flushes the ring and stages the
    /// preamble. The callback drops its block when this is up, which is
    /// indistinguishable from the overflow drop LIVE already tolerates,
    /// and keeps the ring single-producer during staging.
    staging: AtomicBool,
}

impl Default for CaptureGate {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureGate {
    /// Create a gate in the initial LIVE state.
    pub fn new() -> Self {
        Self {
            mode: AtomicU8::new(CaptureMode::Live as u8),
            remaining: AtomicUsize::new(0),
            staging: AtomicBool::new(false),
        }
    }

    /// Current mode.
    pub fn mode(&self) -> CaptureMode {
        match self.mode.load(Ordering::Acquire) {
            0 => CaptureMode::Live,
            1 => CaptureMode::Recording,
            _ => CaptureMode::Stopped,
        }
    }

    /// Remaining frame budget for the current recording.
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Begin staging: the callback stops writing until
    /// [`publish_recording`](Self::publish_recording) runs.
    pub fn begin_staging(&self) {
        self.staging.store(true, Ordering::Release);
    }

    /// Publish LIVE → RECORDING with a fresh frame budget.
    ///
    /// Called after the preamble has been written into the capture ring;
    /// the release stores order the staged bytes before the mode change.
    pub fn publish_recording(&self, frames: usize) {
        self.remaining.store(frames, Ordering::Release);
        self.mode
            .store(CaptureMode::Recording as u8, Ordering::Release);
        self.staging.store(false, Ordering::Release);
    }

    /// Publish STOPPED → LIVE once the turn is complete.
    pub fn resume_live(&self) {
        self.mode.store(CaptureMode::Live as u8, Ordering::Release);
    }

    /// How many of `frames` input frames the callback may write now.
    ///
    /// Wait-free; called from the real-time callback.
    pub fn quota(&self, frames: usize) -> usize {
        if self.staging.load(Ordering::Acquire) {
            return 0;
        }
        match self.mode() {
            CaptureMode::Live => frames,
            CaptureMode::Recording => frames.min(self.remaining.load(Ordering::Acquire)),
            CaptureMode::Stopped => 0,
        }
    }

    /// Account for frames the callback actually wrote.
    ///
    /// In RECORDING this decrements the budget and performs the
    /// RECORDING → STOPPED edge when it hits zero. The callback is the
    /// only caller, so the read-modify-write needs no CAS.
    pub fn commit(&self, written: usize) {
        if self.mode() != CaptureMode::Recording {
            return;
        }
        let left = self.remaining.load(Ordering::Acquire);
        let new = left.saturating_sub(written);
        self.remaining.store(new, Ordering::Release);
        if new == 0 {
            self.mode
                .store(CaptureMode::Stopped as u8, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_live() {
        let gate = CaptureGate::new();
        assert_eq!(gate.mode(), CaptureMode::Live);
        assert_eq!(gate.quota(512), 512);
    }

    #[test]
    fn test_staging_drops_blocks() {
        let gate = CaptureGate::new();
        gate.begin_staging();
        assert_eq!(gate.quota(512), 0);
        assert_eq!(gate.mode(), CaptureMode::Live, "staging is not a mode");

        gate.publish_recording(100);
        assert_eq!(gate.quota(512), 100);
    }

    #[test]
    fn test_recording_counts_down_to_stopped() {
        let gate = CaptureGate::new();
        gate.begin_staging();
        gate.publish_recording(1000);

        // Simulate callback invocations of 256 frames each.
        let mut total = 0usize;
        while gate.mode() == CaptureMode::Recording {
            let quota = gate.quota(256);
            gate.commit(quota);
            total += quota;
        }

        assert_eq!(total, 1000, "exactly the budget is written");
        assert_eq!(gate.mode(), CaptureMode::Stopped);
        assert_eq!(gate.quota(256), 0);
        assert_eq!(gate.remaining(), 0);
    }

    #[test]
    fn test_mode_edges() {
        // LIVE → RECORDING → STOPPED → LIVE and nothing else.
        let gate = CaptureGate::new();
        assert_eq!(gate.mode(), CaptureMode::Live);

        gate.begin_staging();
        gate.publish_recording(10);
        assert_eq!(gate.mode(), CaptureMode::Recording);

        gate.commit(10);
        assert_eq!(gate.mode(), CaptureMode::Stopped);

        gate.resume_live();
        assert_eq!(gate.mode(), CaptureMode::Live);
    }

    #[test]
    fn test_commit_outside_recording_is_inert() {
        let gate = CaptureGate::new();
        gate.commit(100);
        assert_eq!(gate.mode(), CaptureMode::Live);
        assert_eq!(gate.remaining(), 0);
    }
}
