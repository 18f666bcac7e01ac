//! MP3 encoding via libmp3lame.

use std::io::Write;

use mp3lame_encoder::{Builder, FlushNoGap, InterleavedPcm, Quality};

use crate::{Error, Result};

/// Scratch LAME wants for the final flush.
const FLUSH_HEADROOM: usize = 7200;

/// Encode interleaved f32 samples as MP3 at 192 kbps.
///
/// Mono input is duplicated onto both channels; LAME is driven in stereo only.
pub fn encode_mp3(samples: &[f32], sample_rate: u32, num_channels: u16) -> Result<Vec<u8>> {
    let upmixed;
    let stereo = match num_channels {
        2 => samples,
        1 => {
            upmixed = samples.iter().flat_map(|&s| [s, s]).collect::<Vec<f32>>();
            upmixed.as_slice()
        }
        n => {
            return Err(Error::Audio(format!(
                "MP3 encoder supports mono or stereo input, got {n} channels"
            )));
        }
    };

    let mut encoder = Builder::new()
        .ok_or_else(|| Error::Audio("failed to create LAME encoder".into()))?
        .with_num_channels(2)
        .map_err(|e| Error::Audio(format!("LAME set_num_channels failed: {e:?}")))?
        .with_sample_rate(sample_rate)
        .map_err(|e| Error::Audio(format!("LAME set_sample_rate failed: {e:?}")))?
        .with_brate(mp3lame_encoder::Bitrate::Kbps192)
        .map_err(|e| Error::Audio(format!("LAME set_brate failed: {e:?}")))?
        .with_quality(Quality::Best)
        .map_err(|e| Error::Audio(format!("LAME set_quality failed: {e:?}")))?
        .build()
        .map_err(|e| Error::Audio(format!("LAME build failed: {e:?}")))?;

    let frames = stereo.len() / 2;
    let mut buf = Vec::with_capacity(mp3lame_encoder::max_required_buffer_size(frames));

    let encoded_size = encoder
        .encode(InterleavedPcm(stereo), buf.spare_capacity_mut())
        .map_err(|e| Error::Audio(format!("LAME encode failed: {e:?}")))?;
    // SAFETY: encode filled exactly `encoded_size` bytes into spare capacity.
    unsafe { buf.set_len(encoded_size) };

    buf.reserve(FLUSH_HEADROOM);
    let flush_size = encoder
        .flush::<FlushNoGap>(buf.spare_capacity_mut())
        .map_err(|e| Error::Audio(format!("LAME flush failed: {e:?}")))?;
    // SAFETY: flush filled exactly `flush_size` bytes into spare capacity.
    unsafe { buf.set_len(buf.len() + flush_size) };

    Ok(buf)
}

/// Encode and write to `writer`, returning the number of bytes written.
pub fn write_mp3_to<W: Write>(
    mut writer: W,
    samples: &[f32],
    sample_rate: u32,
    num_channels: u16,
) -> Result<usize> {
    let bytes = encode_mp3(samples, sample_rate, num_channels)?;
    writer
        .write_all(&bytes)
        .map_err(|e| Error::Audio(format!("failed to write MP3 data: {e}")))?;
    writer.flush()?;
    Ok(bytes.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn looks_like_mp3(bytes: &[u8]) -> bool {
        // LAME without an ID3 tag starts on a frame sync; tagged output starts with "ID3".
        !bytes.is_empty() && (bytes[0] == 0xFF || bytes.starts_with(b"ID3"))
    }

    #[test]
    fn test_encode_stereo_silence() {
        let samples = vec![0f32; 48000 * 2];
        let out = encode_mp3(&samples, 48000, 2).expect("MP3 encode should succeed");
        assert!(looks_like_mp3(&out), "unexpected header 0x{:02X}", out[0]);
    }

    #[test]
    fn test_encode_mono_is_upmixed() {
        let samples: Vec<f32> = (0..48000).map(|i| (i as f32 * 0.01).sin() * 0.5).collect();
        let out = encode_mp3(&samples, 48000, 1).unwrap();
        assert!(looks_like_mp3(&out));
    }

    #[test]
    fn test_rejects_surround() {
        let samples = vec![0f32; 6 * 1000];
        assert!(matches!(encode_mp3(&samples, 48000, 6), Err(Error::Audio(_))));
    }

    #[test]
    fn test_write_reports_length() {
        let samples = vec![0f32; 4800 * 2];
        let mut buf = std::io::Cursor::new(Vec::new());
        let written = write_mp3_to(&mut buf, &samples, 48000, 2).unwrap();
        assert_eq!(written, buf.into_inner().len());
    }
}
