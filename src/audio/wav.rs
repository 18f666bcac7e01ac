//! WAV reading for daemon output, writing for fixtures and debugging.

use std::io::Read;
use std::path::Path;

use crate::{Error, Result};

/// Decoded WAV contents. Samples are interleaved f32 in [-1, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedWav {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedWav {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

pub fn read_wav(path: impl AsRef<Path>) -> Result<DecodedWav> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .map_err(|e| Error::Audio(format!("failed to open {}: {e}", path.display())))?;
    read_wav_from(std::io::BufReader::new(file))
}

/// Read a WAV stream, converting integer PCM to f32.
pub fn read_wav_from<R: Read>(source: R) -> Result<DecodedWav> {
    let reader = hound::WavReader::new(source)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let max_val = (1u32 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    if spec.channels == 0 || samples.len() % spec.channels as usize != 0 {
        return Err(Error::Audio(format!(
            "{} samples do not split evenly into {} channels",
            samples.len(),
            spec.channels
        )));
    }

    Ok(DecodedWav {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

/// Write interleaved f32 samples as a 32-bit float WAV file.
pub fn write_wav(
    path: impl AsRef<Path>,
    samples: &[f32],
    sample_rate: u32,
    num_channels: u16,
) -> Result<()> {
    let spec = hound::WavSpec {
        channels: num_channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}
