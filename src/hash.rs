use crate::config::Config;
use crate::models::PairRecord;

/// Upper bound (exclusive) of every 10-bit hash field.
const FIELD_LIMIT: u32 = 1024;

/// Floor-quantise `x` to a multiple of `bin`.
pub fn quantize(x: u32, bin: u32) -> u32 {
    (x / bin) * bin
}

/// Pack quantised (f_anchor, f_target, dt) into a 30-bit key.
///
/// Each field occupies 10 bits. The spectrogram has at most 513 bins and
/// the target zone is at most 50 frames, so the fields fit naturally; a
/// value at or above 1024 here is a programming error upstream.
pub fn pack(f_anchor: u32, f_target: u32, dt: u32, config: &Config) -> u32 {
    let q1 = quantize(f_anchor, config.freq_bin);
    let q2 = quantize(f_target, config.freq_bin);
    let qdt = quantize(dt, config.time_bin);
    debug_assert!(q1 < FIELD_LIMIT && q2 < FIELD_LIMIT && qdt < FIELD_LIMIT);
    (q1 << 20) | (q2 << 10) | qdt
}

/// Primary key for a pair record. Build-time writes use only this.
pub fn key(pair: &PairRecord, config: &Config) -> u32 {
    pack(pair.f_anchor, pair.f_target, pair.dt, config)
}

/// Fuzzy lookup set for query time: the primary key plus up to six
/// variants, each perturbing exactly one quantised field by one bin step.
/// Variants whose perturbed field leaves `[0, 1024)` are dropped, so the
/// result holds between 1 and 7 distinct keys.
pub fn neighbourhood(f_anchor: u32, f_target: u32, dt: u32, config: &Config) -> Vec<u32> {
    let q1 = quantize(f_anchor, config.freq_bin) as i64;
    let q2 = quantize(f_target, config.freq_bin) as i64;
    let qdt = quantize(dt, config.time_bin) as i64;
    let fb = config.freq_bin as i64;
    let tb = config.time_bin as i64;

    let mut keys = vec![pack_raw(q1 as u32, q2 as u32, qdt as u32)];
    let variants = [
        (q1 + fb, q2, qdt),
        (q1 - fb, q2, qdt),
        (q1, q2 + fb, qdt),
        (q1, q2 - fb, qdt),
        (q1, q2, qdt + tb),
        (q1, q2, qdt - tb),
    ];
    for (a, b, d) in variants {
        if in_field(a) && in_field(b) && in_field(d) {
            keys.push(pack_raw(a as u32, b as u32, d as u32));
        }
    }
    keys
}

fn pack_raw(q1: u32, q2: u32, qdt: u32) -> u32 {
    (q1 << 20) | (q2 << 10) | qdt
}

fn in_field(v: i64) -> bool {
    (0..i64::from(FIELD_LIMIT)).contains(&v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn quantize_is_idempotent() {
        for x in 0..520 {
            let q = quantize(x, 2);
            assert_eq!(quantize(q, 2), q);
        }
        assert_eq!(quantize(7, 2), 6);
        assert_eq!(quantize(6, 2), 6);
    }

    #[test]
    fn known_key_value() {
        let config = Config::default();
        // (6 << 20) | (8 << 10) | 4
        assert_eq!(pack(6, 8, 4, &config), 6_299_652);
    }

    #[test]
    fn keys_fit_in_thirty_bits_with_binned_fields() {
        let config = Config::default();
        for f1 in (0..513).step_by(37) {
            for f2 in (0..513).step_by(41) {
                for dt in 0..=50 {
                    let k = pack(f1, f2, dt, &config);
                    assert!(k < 1 << 30);
                    assert_eq!((k >> 20) % config.freq_bin, 0);
                    assert_eq!(((k >> 10) & 0x3ff) % config.freq_bin, 0);
                    assert_eq!((k & 0x3ff) % config.time_bin, 0);
                }
            }
        }
    }

    #[test]
    fn neighbourhood_contains_primary_and_known_variant() {
        let config = Config::default();
        let keys = neighbourhood(6, 8, 4, &config);
        assert_eq!(keys[0], pack(6, 8, 4, &config));
        // f_anchor lowered one step: (4 << 20) | (8 << 10) | 4
        assert!(keys.contains(&4_202_500));
        assert_eq!(keys.len(), 7);
    }

    #[test]
    fn neighbourhood_keys_distinct_and_bounded() {
        let config = Config::default();
        for &(f1, f2, dt) in &[(0u32, 0u32, 0u32), (512, 512, 50), (6, 8, 4), (1, 511, 49)] {
            let keys = neighbourhood(f1, f2, dt, &config);
            assert!(!keys.is_empty() && keys.len() <= 7);
            let distinct: HashSet<u32> = keys.iter().copied().collect();
            assert_eq!(distinct.len(), keys.len());
            assert!(keys.iter().all(|&k| k < 1 << 30));
        }
    }

    #[test]
    fn neighbourhood_drops_out_of_range_variants() {
        let config = Config::default();
        // All three fields at 0: the three minus-variants fall below 0.
        assert_eq!(neighbourhood(0, 0, 0, &config).len(), 4);
        // Quantised 1022 plus a step reaches 1024 and is dropped, and the
        // two other minus-variants fall below 0.
        assert_eq!(neighbourhood(1023, 0, 0, &config).len(), 4);
    }
}
