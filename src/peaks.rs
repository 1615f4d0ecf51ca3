use std::collections::VecDeque;

use log::debug;

use crate::config::{Config, PeakPicker};
use crate::models::Peak;
use crate::spectrogram::Spectrogram;

/// Band partition: `num_bands + 1` edges placed on a logarithmic scale
/// between 1 and `freq_bins - 1` (inclusive), truncated to integers, with
/// the first edge forced down to 0 so the partition covers the whole
/// spectrum. Adjacent edges may collapse for small `freq_bins`; the empty
/// band then contributes no peak.
pub fn band_edges(freq_bins: usize, num_bands: usize) -> Vec<usize> {
    let top = ((freq_bins - 1) as f64).log10();
    let mut edges: Vec<usize> = (0..=num_bands)
        .map(|i| 10f64.powf(i as f64 * top / num_bands as f64) as usize)
        .collect();
    edges[0] = 0;
    edges
}

/// Extract the peak constellation from a magnitude spectrogram, using the
/// strategy selected by `config.peak_picker`.
///
/// `duration_secs` is the source duration; only the adaptive strategy
/// consults it.
pub fn extract_peaks(spec: &Spectrogram, config: &Config, duration_secs: f64) -> Vec<Peak> {
    let grid = band_maxima(spec, config);
    match config.peak_picker {
        PeakPicker::Fixed => local_maxima(&grid, config.neighbourhood_k),
        PeakPicker::Adaptive {
            target_peaks_per_second,
        } => adaptive_local_maxima(&grid, target_peaks_per_second, duration_secs),
    }
}

/// Sparse per-frame band maxima, same shape as the source spectrogram.
/// All cells are zero except, per frame and per band, the single largest
/// bin (ties broken by the lowest bin index).
struct BandMaxima {
    bins: usize,
    frames: usize,
    data: Vec<f32>,
}

fn band_maxima(spec: &Spectrogram, config: &Config) -> BandMaxima {
    let bins = spec.bins();
    let frames = spec.frames();
    let edges = band_edges(bins, config.num_bands);

    let mut data = vec![0.0f32; bins * frames];
    for t in 0..frames {
        let column = spec.column(t);
        let out = &mut data[t * bins..(t + 1) * bins];
        for band in edges.windows(2) {
            let (start, end) = (band[0], band[1].min(bins));
            if start >= end {
                continue;
            }
            let mut best = start;
            for f in start + 1..end {
                if column[f] > column[best] {
                    best = f;
                }
            }
            out[best] = column[best];
        }
    }

    BandMaxima { bins, frames, data }
}

/// Retain the cells that equal the K×K maximum-filtered grid and are
/// strictly positive. The filter window is clamped at the matrix edges
/// (equivalent to "nearest" boundary replication for a maximum filter).
/// Cells tying with the window maximum are all retained.
///
/// Output is ordered by frame, then bin, so the pair combiner receives
/// peaks already sorted by (t, f).
fn local_maxima(grid: &BandMaxima, k: usize) -> Vec<Peak> {
    let filtered = max_filter(grid, k);
    let mut peaks = Vec::new();
    for t in 0..grid.frames {
        for f in 0..grid.bins {
            let v = grid.data[t * grid.bins + f];
            if v > 0.0 && v == filtered[t * grid.bins + f] {
                peaks.push(Peak {
                    t: t as u32,
                    f: f as u32,
                });
            }
        }
    }
    peaks
}

/// Binary search the filter size in [5, 100] until the peak count lands
/// within ±20% of `target_peaks_per_second * duration_secs`. If the search
/// exhausts without landing in the band, the last size tried wins.
/// Offline use only: an index built this way records the strategy in its
/// config header, and queries must replay the same strategy.
fn adaptive_local_maxima(
    grid: &BandMaxima,
    target_peaks_per_second: u32,
    duration_secs: f64,
) -> Vec<Peak> {
    let target = (duration_secs * f64::from(target_peaks_per_second)) as usize;
    let (mut lo, mut hi) = (5usize, 100usize);
    let mut peaks = Vec::new();

    while lo <= hi {
        let k = (lo + hi) / 2;
        peaks = local_maxima(grid, k);
        debug!("adaptive peak search: k={} peaks={}", k, peaks.len());
        if peaks.len() * 10 > target * 12 {
            // Too many peaks: widen the suppression window.
            lo = k + 1;
        } else if peaks.len() * 10 < target * 8 {
            hi = k.saturating_sub(1);
        } else {
            break;
        }
    }

    peaks
}

/// Separable K×K maximum filter with clamped windows. A cell at index `i`
/// along either axis sees `[i - K/2, i + K - K/2 - 1]`, truncated at the
/// boundary.
fn max_filter(grid: &BandMaxima, k: usize) -> Vec<f32> {
    let (bins, frames) = (grid.bins, grid.frames);
    let before = k / 2;
    let after = k - k / 2 - 1;

    // Pass 1: along the frequency axis, within each frame column.
    let mut pass1 = vec![0.0f32; bins * frames];
    for t in 0..frames {
        sliding_max(
            &grid.data[t * bins..(t + 1) * bins],
            &mut pass1[t * bins..(t + 1) * bins],
            before,
            after,
        );
    }

    // Pass 2: along the time axis, per bin row.
    let mut out = vec![0.0f32; bins * frames];
    let mut row = vec![0.0f32; frames];
    let mut row_out = vec![0.0f32; frames];
    for f in 0..bins {
        for t in 0..frames {
            row[t] = pass1[t * bins + f];
        }
        sliding_max(&row, &mut row_out, before, after);
        for t in 0..frames {
            out[t * bins + f] = row_out[t];
        }
    }
    out
}

/// Sliding-window maximum over `[i - before, i + after]` (clamped), via a
/// monotonically decreasing index deque.
fn sliding_max(input: &[f32], output: &mut [f32], before: usize, after: usize) {
    let n = input.len();
    if n == 0 {
        return;
    }
    let mut window: VecDeque<usize> = VecDeque::new();
    let mut next = 0usize;
    for i in 0..n {
        let hi = (i + after).min(n - 1);
        while next <= hi {
            while let Some(&back) = window.back() {
                if input[back] <= input[next] {
                    window.pop_back();
                } else {
                    break;
                }
            }
            window.push_back(next);
            next += 1;
        }
        let lo = i.saturating_sub(before);
        while let Some(&front) = window.front() {
            if front < lo {
                window.pop_front();
            } else {
                break;
            }
        }
        output[i] = input[window[0]];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_from(bins: usize, frames: usize, cells: &[(usize, usize, f32)]) -> BandMaxima {
        let mut data = vec![0.0f32; bins * frames];
        for &(t, f, v) in cells {
            data[t * bins + f] = v;
        }
        BandMaxima { bins, frames, data }
    }

    #[test]
    fn default_band_edges() {
        assert_eq!(band_edges(513, 6), vec![0, 2, 8, 22, 64, 181, 512]);
    }

    #[test]
    fn small_spectrum_collapses_bands() {
        let edges = band_edges(5, 6);
        assert_eq!(edges[0], 0);
        assert_eq!(*edges.last().unwrap(), 4);
        assert!(edges.windows(2).all(|w| w[0] <= w[1]));
        // At least one band must be empty with only 5 bins and 6 bands.
        assert!(edges.windows(2).any(|w| w[0] == w[1]));
    }

    #[test]
    fn sliding_max_basic() {
        let input = [1.0, 3.0, 2.0, 5.0, 4.0];
        let mut out = [0.0; 5];
        sliding_max(&input, &mut out, 1, 1);
        assert_eq!(out, [3.0, 3.0, 5.0, 5.0, 5.0]);
    }

    #[test]
    fn sliding_max_asymmetric_window() {
        let input = [9.0, 1.0, 1.0, 1.0, 7.0];
        let mut out = [0.0; 5];
        // before=2, after=1: index 2 sees [0..=3], index 3 sees [1..=4].
        sliding_max(&input, &mut out, 2, 1);
        assert_eq!(out, [9.0, 9.0, 9.0, 7.0, 7.0]);
    }

    #[test]
    fn band_maxima_tie_takes_lowest_bin() {
        let config = Config::default();
        let bins = config.freq_bins();
        // Frame with two equal values inside the band [2, 8).
        let mut data = vec![0.0f32; bins];
        data[3] = 1.5;
        data[5] = 1.5;
        let spec = Spectrogram::from_raw(bins, 1, data);
        let grid = band_maxima(&spec, &config);
        assert_eq!(grid.data[3], 1.5);
        assert_eq!(grid.data[5], 0.0);
    }

    #[test]
    fn local_maxima_suppresses_weaker_neighbours() {
        // Two cells 10 frames apart, well inside one 30x30 window: only the
        // stronger survives.
        let grid = grid_from(64, 40, &[(10, 30, 2.0), (20, 30, 1.0)]);
        let peaks = local_maxima(&grid, 30);
        assert_eq!(peaks, vec![Peak { t: 10, f: 30 }]);
    }

    #[test]
    fn local_maxima_retains_ties() {
        let grid = grid_from(64, 40, &[(10, 30, 2.0), (20, 30, 2.0)]);
        let peaks = local_maxima(&grid, 30);
        assert_eq!(
            peaks,
            vec![Peak { t: 10, f: 30 }, Peak { t: 20, f: 30 }]
        );
    }

    #[test]
    fn distant_cells_both_survive() {
        let grid = grid_from(64, 200, &[(10, 30, 2.0), (150, 30, 1.0)]);
        let peaks = local_maxima(&grid, 30);
        assert_eq!(peaks.len(), 2);
    }

    #[test]
    fn peaks_sorted_by_frame_then_bin() {
        let grid = grid_from(
            256,
            400,
            &[(300, 10, 1.0), (0, 200, 1.0), (0, 40, 1.0), (150, 128, 1.0)],
        );
        let peaks = local_maxima(&grid, 30);
        let mut sorted = peaks.clone();
        sorted.sort();
        assert_eq!(peaks, sorted);
    }

    #[test]
    fn empty_grid_has_no_peaks() {
        let grid = grid_from(64, 40, &[]);
        assert!(local_maxima(&grid, 30).is_empty());
    }

    #[test]
    fn adaptive_search_hits_target_band() {
        // 60 well-separated cells over 2000 frames: small windows keep all
        // of them, large windows thin them out. Target 40 peaks +/- 20%.
        let cells: Vec<(usize, usize, f32)> = (0..60)
            .map(|i| (i * 33, (i * 7) % 64, 1.0 + (i % 5) as f32))
            .collect();
        let grid = grid_from(64, 2000, &cells);
        let peaks = adaptive_local_maxima(&grid, 1, 40.0);
        assert!(!peaks.is_empty());
        assert!(peaks.len() <= 60);
    }
}
