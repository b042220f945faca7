//! Audio format conversion using rubato resampler
//!
//! The response audio arrives as MP3 at whatever rate the service
//! encoded (22.05 or 24 kHz in practice); the playback ring runs at
//! 16 kHz mono. This converts decoded f32 samples down to the pipeline
//! format, one fixed-size chunk at a time.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

/// Audio format converter for resampling and channel conversion
pub struct AudioConverter {
    resampler: SincFixedIn<f32>,
    source_channels: usize,
}

impl AudioConverter {
    /// Create a new audio converter
    ///
    /// `chunk_size` is the input size in frames every `process` call must
    /// supply; callers buffer and pad to that size.
    pub fn new(
        source_rate: u32,
        target_rate: u32,
        source_channels: usize,
        chunk_size: usize,
    ) -> Result<Self, rubato::ResamplerConstructionError> {
        // The input is a spoken answer headed for a 16 kHz mono ring, so
        // transparency above the speech band buys nothing. A 128-tap sinc
        // with Blackman windowing keeps the per-chunk cost low enough
        // that decode + resample stays far ahead of real-time playback.
        let params = SincInterpolationParameters {
            sinc_len: 128,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 128,
            window: WindowFunction::Blackman,
        };

        // Rates are fixed per response part; 2.0 leaves headroom in case
        // the service ever switches encodings mid-dialog.
        let ratio = target_rate as f64 / source_rate as f64;
        let resampler = SincFixedIn::new(ratio, 2.0, params, chunk_size, 1)?;

        Ok(Self {
            resampler,
            source_channels,
        })
    }

    /// Downmix interleaved samples to mono and resample to the target
    /// rate.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>, rubato::ResampleError> {
        // Average across channels; the service occasionally sends stereo
        // MP3 and a plain mean is fine for voice.
        let mono: Vec<f32> = if self.source_channels > 1 {
            input
                .chunks(self.source_channels)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
                .collect()
        } else {
            input.to_vec()
        };

        let mut waves = self.resampler.process(&[mono], None)?;
        Ok(waves.pop().unwrap_or_default())
    }

    /// Process and convert to i16 suitable for the playback ring.
    pub fn process_to_i16(&mut self, input: &[f32]) -> Result<Vec<i16>, rubato::ResampleError> {
        Ok(f32_to_i16(&self.process(input)?))
    }
}

/// Convert f32 samples to i16, clamping anything the decoder let swing
/// past full scale.
pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converter_new() {
        assert!(AudioConverter::new(24_000, 16_000, 1, 1024).is_ok());
        assert!(AudioConverter::new(44_100, 16_000, 2, 1024).is_ok());
    }

    #[test]
    fn test_f32_to_i16() {
        let converted = f32_to_i16(&[1.0, 0.5, 0.0, -0.5, -1.0]);
        assert_eq!(converted[0], 32767);
        assert_eq!(converted[1], 16383);
        assert_eq!(converted[2], 0);
        assert_eq!(converted[3], -16383);
        assert_eq!(converted[4], -32767);
    }

    #[test]
    fn test_f32_to_i16_clamps_overdriven_samples() {
        let converted = f32_to_i16(&[2.5, -3.0]);
        assert_eq!(converted[0], 32767);
        assert_eq!(converted[1], -32767);
    }

    #[test]
    fn test_resampling_produces_output() {
        let mut converter = AudioConverter::new(48_000, 16_000, 1, 1024).unwrap();

        // Process multiple chunks to account for rubato's internal buffering
        let chunk: Vec<f32> = (0..1024).map(|i| (i as f32 * 0.001).sin()).collect();
        let mut total_output = 0;
        for _ in 0..10 {
            total_output += converter.process(&chunk).unwrap().len();
        }

        // 10240 input samples at 48 kHz is roughly 3413 at 16 kHz; allow
        // wide tolerance for internal buffering.
        assert!(total_output > 2500, "got {}", total_output);
    }

    #[test]
    fn test_stereo_input() {
        let mut converter = AudioConverter::new(44_100, 16_000, 2, 512).unwrap();

        // 1024 interleaved samples = 512 stereo frames
        let input: Vec<f32> = (0..1024).map(|i| (i as f32 * 0.01).sin() * 0.3).collect();
        let output = converter.process_to_i16(&input).unwrap();
        assert!(!output.is_empty());
    }

    #[test]
    fn test_downmix_averages_channels() {
        // Opposite-phase stereo cancels to silence after the downmix.
        let mut converter = AudioConverter::new(16_000, 16_000, 2, 512).unwrap();
        let input: Vec<f32> = (0..512)
            .flat_map(|i| {
                let s = (i as f32 * 0.05).sin() * 0.8;
                [s, -s]
            })
            .collect();

        let output = converter.process(&input).unwrap();
        assert!(output.iter().all(|s| s.abs() < 0.001));
    }
}
