//! WAV decoding into planar f32
//!
//! Integer PCM of any bit depth is normalized to [-1.0, 1.0).

use std::path::Path;

use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader};
use vibe_core::{Sample, SourceAudio};

/// Decode a WAV file into per-channel sample vectors
pub fn decode_wav(path: &Path) -> Result<SourceAudio> {
    let reader = WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file {:?}", path))?;
    let spec = reader.spec();
    if spec.channels == 0 {
        bail!("WAV file {:?} has no channels", path);
    }
    log::info!(
        "Decoding {:?}: {} channels @ {}Hz, {}-bit {:?}",
        path,
        spec.channels,
        spec.sample_rate,
        spec.bits_per_sample,
        spec.sample_format
    );

    let interleaved: Vec<Sample> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .context("Failed to read float samples")?,
        SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .context("Failed to read integer samples")?
        }
    };

    let channels = deinterleave(&interleaved, spec.channels as usize);
    Ok(SourceAudio::new(spec.sample_rate, channels))
}

/// Split interleaved samples into channels; a trailing partial frame is dropped
fn deinterleave(interleaved: &[Sample], channel_count: usize) -> Vec<Vec<Sample>> {
    let frames = interleaved.len() / channel_count;
    let mut channels = vec![Vec::with_capacity(frames); channel_count];
    for frame in interleaved.chunks_exact(channel_count) {
        for (channel, sample) in channels.iter_mut().zip(frame) {
            channel.push(*sample);
        }
    }
    channels
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    #[test]
    fn test_deinterleave() {
        let channels = deinterleave(&[1.0, -1.0, 2.0, -2.0, 3.0], 2);
        assert_eq!(channels, vec![vec![1.0, 2.0], vec![-1.0, -2.0]]);
    }

    #[test]
    fn test_decode_16_bit_stereo() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("tone.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..100 {
            writer.write_sample(16384i16).unwrap();
            writer.write_sample(-32768i16).unwrap();
        }
        writer.finalize().unwrap();

        let source = decode_wav(&path).unwrap();
        assert_eq!(source.sample_rate, 22050);
        assert_eq!(source.channel_count(), 2);
        assert_eq!(source.total_frames(), 100);
        assert_eq!(source.channels[0][0], 0.5);
        assert_eq!(source.channels[1][99], -1.0);
    }

    #[test]
    fn test_decode_float_mono() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("float.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for i in 0..480 {
            writer.write_sample(i as f32 / 480.0).unwrap();
        }
        writer.finalize().unwrap();

        let source = decode_wav(&path).unwrap();
        assert_eq!(source.total_frames(), 480);
        assert!((source.duration_seconds() - 0.01).abs() < 1e-9);
        assert_eq!(source.channels[0][240], 0.5);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let err = decode_wav(&temp.path().join("missing.wav")).unwrap_err();
        assert!(err.to_string().contains("Failed to open WAV file"));
    }
}
