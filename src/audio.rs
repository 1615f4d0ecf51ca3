use std::fs::File;
use std::path::Path;

use log::{debug, info};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::config::Config;
use crate::error::{Error, Result};

/// Decodes audio files into the analysis representation: mono f32 PCM at
/// the configured sample rate.
///
/// WAV files decode through hound; everything else goes through symphonia
/// (mp3, flac, ogg/vorbis, m4a). Multi-channel audio collapses to mono by
/// straight per-frame average, then anything not already at the analysis
/// rate is resampled. The result is deterministic for identical input
/// bytes and configuration.
pub struct AudioLoader;

impl AudioLoader {
    pub fn load(path: &Path, config: &Config) -> Result<Vec<f32>> {
        let is_wav = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("wav"));

        let (samples, source_rate) = if is_wav {
            Self::load_wav(path)?
        } else {
            Self::load_compressed(path)?
        };

        info!(
            "decoded {}: {} mono samples at {} Hz",
            path.display(),
            samples.len(),
            source_rate
        );

        if source_rate == config.sample_rate || samples.is_empty() {
            Ok(samples)
        } else {
            Self::resample(samples, source_rate, config.sample_rate)
        }
    }

    /// Decode a WAV clip already in memory (a recorded query, typically)
    /// into the analysis representation.
    pub fn load_wav_bytes(bytes: &[u8], config: &Config) -> Result<Vec<f32>> {
        let reader = hound::WavReader::new(std::io::Cursor::new(bytes))?;
        let (samples, source_rate) = Self::decode_wav(reader)?;
        if source_rate == config.sample_rate || samples.is_empty() {
            Ok(samples)
        } else {
            Self::resample(samples, source_rate, config.sample_rate)
        }
    }

    fn load_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
        Self::decode_wav(hound::WavReader::open(path)?)
    }

    fn decode_wav<R: std::io::Read>(mut reader: hound::WavReader<R>) -> Result<(Vec<f32>, u32)> {
        let spec = reader.spec();
        debug!(
            "wav spec: {} Hz, {} channels, {} bits",
            spec.sample_rate, spec.channels, spec.bits_per_sample
        );

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => {
                reader.samples::<f32>().collect::<hound::Result<_>>()?
            }
            hound::SampleFormat::Int => match spec.bits_per_sample {
                16 => reader
                    .samples::<i16>()
                    .map(|s| s.map(|s| s as f32 / i16::MAX as f32))
                    .collect::<hound::Result<_>>()?,
                24 => reader
                    .samples::<i32>()
                    .map(|s| s.map(|s| s as f32 / (1 << 23) as f32))
                    .collect::<hound::Result<_>>()?,
                32 => reader
                    .samples::<i32>()
                    .map(|s| s.map(|s| s as f32 / i32::MAX as f32))
                    .collect::<hound::Result<_>>()?,
                other => {
                    return Err(Error::AudioDecode(format!(
                        "unsupported wav bit depth: {other}"
                    )))
                }
            },
        };

        Ok((
            Self::mix_to_mono(samples, spec.channels as usize),
            spec.sample_rate,
        ))
    }

    fn load_compressed(path: &Path) -> Result<(Vec<f32>, u32)> {
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::AudioDecode("no decodable audio track".into()))?;
        let track_id = track.id;
        let mut decoder =
            symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

        let mut samples: Vec<f32> = Vec::new();
        let mut sample_buf: Option<SampleBuffer<f32>> = None;
        let mut channels = 1usize;
        let mut rate = track.codec_params.sample_rate.unwrap_or(0);

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(err))
                    if err.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(err) => return Err(err.into()),
            };
            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    if sample_buf.is_none() {
                        let spec = *decoded.spec();
                        channels = spec.channels.count();
                        rate = spec.rate;
                        sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
                    }
                    if let Some(buf) = &mut sample_buf {
                        buf.copy_interleaved_ref(decoded);
                        samples.extend_from_slice(buf.samples());
                    }
                }
                // Recoverable per-packet corruption: skip the packet.
                Err(SymphoniaError::DecodeError(_)) | Err(SymphoniaError::IoError(_)) => continue,
                Err(err) => return Err(err.into()),
            }
        }

        if rate == 0 {
            return Err(Error::AudioDecode("source sample rate unknown".into()));
        }

        Ok((Self::mix_to_mono(samples, channels), rate))
    }

    fn mix_to_mono(samples: Vec<f32>, channels: usize) -> Vec<f32> {
        if channels <= 1 {
            return samples;
        }
        samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    }

    fn resample(samples: Vec<f32>, from: u32, to: u32) -> Result<Vec<f32>> {
        debug!("resampling {} Hz -> {} Hz", from, to);
        let mut resampler = FastFixedIn::<f32>::new(
            f64::from(to) / f64::from(from),
            1.0,
            PolynomialDegree::Cubic,
            samples.len(),
            1,
        )
        .map_err(|e| Error::AudioDecode(e.to_string()))?;

        let mut output = resampler
            .process(&[&samples], None)
            .map_err(|e| Error::AudioDecode(e.to_string()))?;
        Ok(output.swap_remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, spec: hound::WavSpec, samples: &[f32]) {
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn float_spec(sample_rate: u32, channels: u16) -> hound::WavSpec {
        hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        }
    }

    #[test]
    fn loads_mono_wav_at_analysis_rate() {
        let config = Config::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<f32> = (0..4096).map(|i| (i as f32 * 0.01).sin()).collect();
        write_wav(&path, float_spec(config.sample_rate, 1), &samples);

        let loaded = AudioLoader::load(&path, &config).unwrap();
        assert_eq!(loaded.len(), samples.len());
        assert!(loaded
            .iter()
            .zip(&samples)
            .all(|(a, b)| (a - b).abs() < 1e-6));
    }

    #[test]
    fn stereo_collapses_to_channel_average() {
        let config = Config::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        // Interleaved L/R frames: (0.2, 0.4), (-1.0, 1.0), (0.5, 0.1).
        write_wav(
            &path,
            float_spec(config.sample_rate, 2),
            &[0.2, 0.4, -1.0, 1.0, 0.5, 0.1],
        );

        let loaded = AudioLoader::load(&path, &config).unwrap();
        let expected = [0.3f32, 0.0, 0.3];
        assert_eq!(loaded.len(), 3);
        assert!(loaded
            .iter()
            .zip(&expected)
            .all(|(a, b)| (a - b).abs() < 1e-6));
    }

    #[test]
    fn i16_wav_normalises_to_unit_range() {
        let config = Config::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("int.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: config.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for s in [i16::MAX, 0, i16::MIN + 1] {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();

        let loaded = AudioLoader::load(&path, &config).unwrap();
        assert!((loaded[0] - 1.0).abs() < 1e-4);
        assert_eq!(loaded[1], 0.0);
        assert!((loaded[2] + 1.0).abs() < 1e-4);
    }

    #[test]
    fn higher_rate_input_is_resampled() {
        let config = Config::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hi.wav");
        let source_rate = config.sample_rate * 2;
        let samples: Vec<f32> = (0..16384)
            .map(|i| {
                (2.0 * std::f32::consts::PI * 440.0 * i as f32 / source_rate as f32).sin()
            })
            .collect();
        write_wav(&path, float_spec(source_rate, 1), &samples);

        let loaded = AudioLoader::load(&path, &config).unwrap();
        let expected = samples.len() / 2;
        let tolerance = expected / 100 + 16;
        assert!(
            loaded.len().abs_diff(expected) <= tolerance,
            "resampled length {} not near {}",
            loaded.len(),
            expected
        );
    }

    #[test]
    fn wav_bytes_load_like_files() {
        let config = Config::default();
        let samples: Vec<f32> = (0..2048).map(|i| (i as f32 * 0.02).sin()).collect();

        let mut bytes = std::io::Cursor::new(Vec::new());
        let mut writer =
            hound::WavWriter::new(&mut bytes, float_spec(config.sample_rate, 1)).unwrap();
        for &s in &samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();

        let loaded = AudioLoader::load_wav_bytes(bytes.get_ref(), &config).unwrap();
        assert_eq!(loaded.len(), samples.len());
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        let config = Config::default();
        let err = AudioLoader::load_wav_bytes(b"definitely not riff", &config).unwrap_err();
        assert!(matches!(err, Error::AudioDecode(_)));
    }

    #[test]
    fn missing_file_is_a_decode_error() {
        let config = Config::default();
        let err = AudioLoader::load(Path::new("/definitely/not/here.wav"), &config).unwrap_err();
        assert!(matches!(err, Error::AudioDecode(_)));
    }
}
