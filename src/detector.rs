//! Wake-word detection seam
//!
//! The orchestrator only needs PCM in, classification out, so the
//! detector sits behind a trait: a positive return names the hot word
//! that fired, zero means nothing. A model-based detector plugs in here;
//! the built-in implementation is a short-term energy gate, which is
//! enough to drive the pipeline on hosts without a model.

/// PCM in, classification out.
pub trait WakeDetector: Send {
    /// Analyse a chunk of 16 kHz mono frames. Returns which hot word
    /// fired (> 0), or 0 for nothing.
    fn run_detection(&mut self, frames: &[i16]) -> i32;
}

/// Configuration for the energy detector
#[derive(Debug, Clone)]
pub struct EnergyDetectorConfig {
    /// Mean absolute amplitude (0.0 - 1.0 of full scale) a chunk must
    /// reach to count as loud
    pub threshold: f32,
    /// Consecutive loud chunks required to trigger
    pub hold_chunks: u32,
}

impl Default for EnergyDetectorConfig {
    fn default() -> Self {
        Self {
            threshold: 0.25,
            hold_chunks: 3,
        }
    }
}

/// Energy-gate detector: triggers after a run of loud chunks.
pub struct EnergyDetector {
    config: EnergyDetectorConfig,
    loud_run: u32,
}

impl EnergyDetector {
    pub fn new(config: EnergyDetectorConfig) -> Self {
        Self {
            config,
            loud_run: 0,
        }
    }
}

impl Default for EnergyDetector {
    fn default() -> Self {
        Self::new(EnergyDetectorConfig::default())
    }
}

impl WakeDetector for EnergyDetector {
    fn run_detection(&mut self, frames: &[i16]) -> i32 {
        if frames.is_empty() {
            return 0;
        }

        let mean_abs = frames
            .iter()
            .map(|&s| (s as f32 / 32768.0).abs())
            .sum::<f32>()
            / frames.len() as f32;

        if mean_abs >= self.config.threshold {
            self.loud_run += 1;
            if self.loud_run >= self.config.hold_chunks {
                self.loud_run = 0;
                return 1;
            }
        } else {
            self.loud_run = 0;
        }
        0
    }
}
