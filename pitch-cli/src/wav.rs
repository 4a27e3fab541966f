//! WAV input for offline analysis.

use std::path::Path;

use anyhow::{Context, Result};

/// Mono 16-bit audio read from a file.
#[derive(Debug, Clone)]
pub struct WavAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

/// Reads any integer or float WAV and converts it to mono i16.
pub fn read_wav(path: &Path) -> Result<WavAudio> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let spec = reader.spec();

    let interleaved: Vec<i16> = match spec.sample_format {
        hound::SampleFormat::Int => reader
            .samples::<i32>()
            .map(|s| s.map(|v| scale_to_i16(v, spec.bits_per_sample)))
            .collect::<Result<_, _>>(),
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16))
            .collect::<Result<_, _>>(),
    }
    .with_context(|| format!("failed to decode {}", path.display()))?;

    Ok(WavAudio {
        samples: downmix(&interleaved, usize::from(spec.channels)),
        sample_rate: spec.sample_rate,
    })
}

/// Rescales an integer sample of `bits` width to 16 bits.
fn scale_to_i16(value: i32, bits: u16) -> i16 {
    if bits > 16 {
        (value >> (bits - 16)) as i16
    } else {
        (value << (16 - bits)) as i16
    }
}

/// Averages interleaved channels into one.
fn downmix(interleaved: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_depths_scale_to_16() {
        assert_eq!(scale_to_i16(127, 8), 127 << 8);
        assert_eq!(scale_to_i16(-1000, 16), -1000);
        assert_eq!(scale_to_i16(8_388_607, 24), i16::MAX);
        assert_eq!(scale_to_i16(i32::MIN, 32), i16::MIN);
    }

    #[test]
    fn stereo_file_is_downmixed() {
        let path = std::env::temp_dir().join(format!("pitch-cli-wav-{}.wav", std::process::id()));
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for (left, right) in [(100i16, 300i16), (-400, 0), (10, 20)] {
            writer.write_sample(left).unwrap();
            writer.write_sample(right).unwrap();
        }
        writer.finalize().unwrap();

        let audio = read_wav(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(audio.sample_rate, 22050);
        assert_eq!(audio.samples, vec![200, -200, 15]);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(read_wav(Path::new("/nonexistent/pitch.wav")).is_err());
    }
}
