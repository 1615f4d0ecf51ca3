use crate::config::Config;
use crate::models::{PairRecord, Peak};

/// Combine a constellation into anchor/target pair records.
///
/// `peaks` must be sorted ascending by (t, f), which is how the peak
/// extractor emits them. Each peak anchors a forward scan: targets within
/// `target_zone_frames` pair up, and the scan stops at the first peak past
/// the zone (sorted order guarantees everything later is out too).
/// Simultaneous peaks (`dt == 0`) are paired; `dt` is never negative.
pub fn combine(peaks: &[Peak], config: &Config) -> Vec<PairRecord> {
    let mut pairs = Vec::new();
    for (i, anchor) in peaks.iter().enumerate() {
        for target in &peaks[i + 1..] {
            let dt = target.t - anchor.t;
            if dt > config.target_zone_frames {
                break;
            }
            pairs.push(PairRecord {
                f_anchor: anchor.f,
                f_target: target.f,
                dt,
                t_anchor: anchor.t,
            });
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(t: u32, f: u32) -> Peak {
        Peak { t, f }
    }

    #[test]
    fn pairs_respect_target_zone() {
        let config = Config::default();
        let peaks = vec![peak(0, 10), peak(30, 20), peak(51, 30), peak(200, 40)];
        let pairs = combine(&peaks, &config);

        // Anchor t=0 reaches t=30 (dt=30) but not t=51 (dt=51 > 50).
        assert!(pairs
            .iter()
            .all(|p| p.dt <= config.target_zone_frames));
        assert!(pairs.contains(&PairRecord {
            f_anchor: 10,
            f_target: 20,
            dt: 30,
            t_anchor: 0
        }));
        assert!(!pairs
            .iter()
            .any(|p| p.t_anchor == 0 && p.f_target == 30));
        // t=30 -> t=51 is inside the zone.
        assert!(pairs.contains(&PairRecord {
            f_anchor: 20,
            f_target: 30,
            dt: 21,
            t_anchor: 30
        }));
    }

    #[test]
    fn simultaneous_peaks_pair_with_dt_zero() {
        let config = Config::default();
        let peaks = vec![peak(5, 10), peak(5, 200)];
        let pairs = combine(&peaks, &config);
        assert_eq!(
            pairs,
            vec![PairRecord {
                f_anchor: 10,
                f_target: 200,
                dt: 0,
                t_anchor: 5
            }]
        );
    }

    #[test]
    fn single_peak_yields_no_pairs() {
        let config = Config::default();
        assert!(combine(&[peak(0, 100)], &config).is_empty());
        assert!(combine(&[], &config).is_empty());
    }

    #[test]
    fn fan_out_is_uncapped() {
        let config = Config::default();
        // 20 peaks within one target zone: every forward pair is emitted.
        let peaks: Vec<Peak> = (0..20).map(|i| peak(i, 100 + i)).collect();
        let pairs = combine(&peaks, &config);
        assert_eq!(pairs.len(), 20 * 19 / 2);
    }
}
