use rustfft::{num_complex::Complex, FftPlanner};

use crate::config::Config;

/// Magnitude STFT of a mono signal.
///
/// Frames are left-aligned: frame `t` covers samples
/// `[t * hop, t * hop + n_fft)`, so `frames = (len - n_fft) / hop + 1`
/// (zero when the signal is shorter than one window). Storage is
/// frame-contiguous so a whole spectral column can be handed out as a
/// slice.
pub struct Spectrogram {
    bins: usize,
    frames: usize,
    data: Vec<f32>,
}

impl Spectrogram {
    /// Compute the magnitude spectrogram with a Hann window.
    pub fn compute(samples: &[f32], config: &Config) -> Spectrogram {
        let n_fft = config.n_fft;
        let hop = config.hop;
        let bins = config.freq_bins();

        let frames = if samples.len() >= n_fft {
            (samples.len() - n_fft) / hop + 1
        } else {
            0
        };

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(n_fft);
        let window = hann_window(n_fft);

        let mut data = vec![0.0f32; frames * bins];
        let mut buffer: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); n_fft];

        for t in 0..frames {
            let start = t * hop;
            let frame = &samples[start..start + n_fft];

            for ((slot, &s), &w) in buffer.iter_mut().zip(frame).zip(&window) {
                *slot = Complex::new(s * w, 0.0);
            }
            fft.process(&mut buffer);

            let column = &mut data[t * bins..(t + 1) * bins];
            for (out, c) in column.iter_mut().zip(&buffer[..bins]) {
                *out = c.norm();
            }
        }

        Spectrogram { bins, frames, data }
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Magnitudes of all bins in frame `t`.
    pub fn column(&self, t: usize) -> &[f32] {
        &self.data[t * self.bins..(t + 1) * self.bins]
    }

    pub fn magnitude(&self, f: usize, t: usize) -> f32 {
        self.data[t * self.bins + f]
    }

    /// Build a spectrogram from raw frame-contiguous magnitudes.
    #[cfg(test)]
    pub(crate) fn from_raw(bins: usize, frames: usize, data: Vec<f32>) -> Spectrogram {
        assert_eq!(data.len(), bins * frames);
        Spectrogram { bins, frames, data }
    }
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos()))
        .collect()
}
