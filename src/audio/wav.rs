//! WAV files at the edges of the pipeline
//!
//! Three concerns: loading the feedback sounds (strictly 16 kHz mono
//! 16-bit PCM, anything else is a hard error), producing the 44-byte
//! streaming header that precedes each upload's live audio, and writing
//! each turn's decoded response audio to disk when `-o` is given.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use super::{BYTES_PER_FRAME, SAMPLE_RATE};

#[derive(Debug, thiserror::Error)]
pub enum WavError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        source: hound::Error,
    },

    #[error("{path}: expected 16 kHz mono 16-bit PCM, got {got}")]
    Format { path: String, got: String },

    #[error("WAV I/O error: {0}")]
    Io(#[from] hound::Error),
}

/// The WavSpec every PCM file in this crate uses.
fn pcm_spec() -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Load a feedback sound, validating the format strictly.
pub fn read_mono16(path: &Path) -> Result<Vec<i16>, WavError> {
    let mut reader = hound::WavReader::open(path).map_err(|e| WavError::Open {
        path: path.display().to_string(),
        source: e,
    })?;

    let spec = reader.spec();
    let is_pcm16 = spec.sample_rate == SAMPLE_RATE
        && spec.channels == 1
        && spec.bits_per_sample == 16
        && spec.sample_format == hound::SampleFormat::Int;
    if !is_pcm16 {
        return Err(WavError::Format {
            path: path.display().to_string(),
            got: format!(
                "{} Hz, {} ch, {} bit {:?}",
                spec.sample_rate, spec.channels, spec.bits_per_sample, spec.sample_format
            ),
        });
    }

    let samples: Result<Vec<i16>, _> = reader.samples::<i16>().collect();
    Ok(samples?)
}

/// Build the RIFF/WAVE header that precedes the live audio in an upload.
///
/// The data chunk length is declared up front (the recording has a fixed
/// length), so the server sees a self-describing WAV stream and the
/// upload's total size is known before any audio exists.
pub fn stream_header(data_len: u32) -> [u8; 44] {
    let mut header = [0u8; 44];
    let byte_rate = SAMPLE_RATE * BYTES_PER_FRAME as u32;

    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(36 + data_len).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes()); // format chunk length
    header[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM
    header[22..24].copy_from_slice(&1u16.to_le_bytes()); // channels
    header[24..28].copy_from_slice(&SAMPLE_RATE.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&(BYTES_PER_FRAME as u16).to_le_bytes()); // block align
    header[34..36].copy_from_slice(&16u16.to_le_bytes()); // bits per sample
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_len.to_le_bytes());

    header
}

/// Writer for a turn's decoded response audio.
///
/// hound back-patches the RIFF and data chunk sizes when the writer is
/// finalized, so the file is valid however much audio the turn produced.
pub struct ResponseWav {
    writer: hound::WavWriter<BufWriter<File>>,
}

impl ResponseWav {
    pub fn create(path: &Path) -> Result<Self, WavError> {
        let writer = hound::WavWriter::create(path, pcm_spec())?;
        Ok(Self { writer })
    }

    pub fn append(&mut self, frames: &[i16]) -> Result<(), WavError> {
        for &frame in frames {
            self.writer.write_sample(frame)?;
        }
        Ok(())
    }

    pub fn finalize(self) -> Result<(), WavError> {
        self.writer.finalize()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_header_layout() {
        let header = stream_header(112_000);

        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(
            u32::from_le_bytes(header[4..8].try_into().unwrap()),
            36 + 112_000
        );
        assert_eq!(&header[8..12], b"WAVE");
        assert_eq!(&header[12..16], b"fmt ");
        assert_eq!(u16::from_le_bytes(header[20..22].try_into().unwrap()), 1);
        assert_eq!(u16::from_le_bytes(header[22..24].try_into().unwrap()), 1);
        assert_eq!(
            u32::from_le_bytes(header[24..28].try_into().unwrap()),
            16_000
        );
        assert_eq!(
            u32::from_le_bytes(header[28..32].try_into().unwrap()),
            32_000
        );
        assert_eq!(u16::from_le_bytes(header[32..34].try_into().unwrap()), 2);
        assert_eq!(u16::from_le_bytes(header[34..36].try_into().unwrap()), 16);
        assert_eq!(&header[36..40], b"data");
        assert_eq!(
            u32::from_le_bytes(header[40..44].try_into().unwrap()),
            112_000
        );
    }

    #[test]
    fn test_read_mono16_roundtrip() {
        let file = tempfile::NamedTempFile::with_suffix(".wav").unwrap();
        let frames: Vec<i16> = (0..1600).map(|i| (i % 128) as i16).collect();
        {
            let mut writer = hound::WavWriter::create(file.path(), pcm_spec()).unwrap();
            for &f in &frames {
                writer.write_sample(f).unwrap();
            }
            writer.finalize().unwrap();
        }

        let loaded = read_mono16(file.path()).unwrap();
        assert_eq!(loaded, frames);
    }

    #[test]
    fn test_read_mono16_rejects_wrong_rate() {
        let file = tempfile::NamedTempFile::with_suffix(".wav").unwrap();
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        {
            let mut writer = hound::WavWriter::create(file.path(), spec).unwrap();
            writer.write_sample(0i16).unwrap();
            writer.finalize().unwrap();
        }

        let err = read_mono16(file.path()).unwrap_err();
        assert!(matches!(err, WavError::Format { .. }));
    }

    #[test]
    fn test_read_mono16_rejects_stereo() {
        let file = tempfile::NamedTempFile::with_suffix(".wav").unwrap();
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        {
            let mut writer = hound::WavWriter::create(file.path(), spec).unwrap();
            writer.write_sample(0i16).unwrap();
            writer.write_sample(0i16).unwrap();
            writer.finalize().unwrap();
        }

        assert!(read_mono16(file.path()).is_err());
    }

    #[test]
    fn test_read_mono16_missing_file() {
        let err = read_mono16(Path::new("/nonexistent/listen.wav")).unwrap_err();
        assert!(matches!(err, WavError::Open { .. }));
    }

    #[test]
    fn test_response_wav_sizes_patched_on_close() {
        let file = tempfile::NamedTempFile::with_suffix(".wav").unwrap();
        {
            let mut wav = ResponseWav::create(file.path()).unwrap();
            wav.append(&[1i16, 2, 3, 4]).unwrap();
            wav.append(&[5i16, 6]).unwrap();
            wav.finalize().unwrap();
        }

        let mut reader = hound::WavReader::open(file.path()).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().bits_per_sample, 16);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![1, 2, 3, 4, 5, 6]);
    }
}
