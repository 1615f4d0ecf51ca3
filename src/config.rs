use serde::{Deserialize, Serialize};

/// Analysis parameters shared by the ingestion and query paths.
///
/// Every value here changes the fingerprints, so an index is only usable by
/// queries running the exact same configuration. The full record is stamped
/// into the persisted snapshot header and checked on load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Analysis sample rate in Hz; all audio is resampled to this.
    pub sample_rate: u32,
    /// FFT window length in samples.
    pub n_fft: usize,
    /// Hop between successive frames in samples.
    pub hop: usize,
    /// Number of logarithmic frequency bands for per-frame maxima.
    pub num_bands: usize,
    /// Side length of the square maximum filter used for peak picking.
    pub neighbourhood_k: usize,
    /// Forward window (in frames) within which anchor/target pairs form.
    pub target_zone_frames: u32,
    /// Quantisation step for the two frequency fields of a hash key.
    pub freq_bin: u32,
    /// Quantisation step for the time-delta field of a hash key.
    pub time_bin: u32,
    /// Bin width applied to query-minus-reference offsets in the matcher.
    pub align_bin: i64,
    /// Which peak extraction algorithm produced (or will query) the index.
    pub peak_picker: PeakPicker,
}

/// Peak extraction strategy. Mixing strategies between an index and its
/// queries degrades recall, so the choice is part of [`Config`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum PeakPicker {
    /// Fixed maximum-filter size (`neighbourhood_k`).
    Fixed,
    /// Binary search on the filter size until the peak count lands within
    /// ±20% of `target_peaks_per_second` times the track duration.
    Adaptive { target_peaks_per_second: u32 },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sample_rate: 8192,
            n_fft: 1024,
            hop: 32,
            num_bands: 6,
            neighbourhood_k: 30,
            target_zone_frames: 50,
            freq_bin: 2,
            time_bin: 2,
            align_bin: 3,
            peak_picker: PeakPicker::Fixed,
        }
    }
}

impl Config {
    /// Number of frequency bins in the magnitude spectrogram.
    pub fn freq_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }
}
