use std::path::Path;

use log::debug;

use crate::audio::AudioLoader;
use crate::config::Config;
use crate::error::Result;
use crate::models::{PairRecord, Peak};
use crate::pairs;
use crate::peaks;
use crate::spectrogram::Spectrogram;

/// The fingerprinting front end: waveform in, hashable pair records out.
///
/// Runs the deterministic DSP pipeline (spectrogram, constellation
/// extraction, target-zone pairing). Both the index builder and the
/// matcher run this exact pipeline, so a query fingerprints the same way
/// the catalog did.
pub struct Fingerprinter {
    config: Config,
}

impl Fingerprinter {
    pub fn new(config: Config) -> Self {
        Fingerprinter { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Constellation of spectral peaks for a mono signal at the analysis
    /// sample rate.
    pub fn peaks(&self, samples: &[f32]) -> Vec<Peak> {
        let spec = Spectrogram::compute(samples, &self.config);
        let duration = samples.len() as f64 / f64::from(self.config.sample_rate);
        let peaks = peaks::extract_peaks(&spec, &self.config, duration);
        debug!(
            "{} frames -> {} peaks",
            spec.frames(),
            peaks.len()
        );
        peaks
    }

    /// Full fingerprint: anchor/target pair records ready for hashing.
    pub fn fingerprint(&self, samples: &[f32]) -> Vec<PairRecord> {
        let peaks = self.peaks(samples);
        let pairs = pairs::combine(&peaks, &self.config);
        debug!("{} peaks -> {} pairs", peaks.len(), pairs.len());
        pairs
    }

    /// Decode an audio file and fingerprint it.
    pub fn fingerprint_file(&self, path: &Path) -> Result<Vec<PairRecord>> {
        let samples = AudioLoader::load(path, &self.config)?;
        Ok(self.fingerprint(&samples))
    }
}
