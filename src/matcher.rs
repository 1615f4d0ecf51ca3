use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};

use crate::audio::AudioLoader;
use crate::error::{Error, Result};
use crate::fingerprint::Fingerprinter;
use crate::hash;
use crate::index::FingerprintIndex;
use crate::models::{MatchResult, PairRecord};

/// How often the cancellation flag is polled, in pairs.
const CANCEL_POLL_INTERVAL: usize = 100;

/// Matches query fingerprints against a loaded index.
///
/// The matcher is read-only: it borrows the index and never mutates it, so
/// one index serves any number of concurrent matchers. Hot-swapping an
/// index is the caller's business (drop the matcher, load a new snapshot,
/// build a new matcher).
///
/// Evidence for a candidate track only counts when it is time-coherent:
/// every matched posting votes for the binned offset `t_query - t_db`, and
/// the winner is the track with the tallest single histogram bin. That is
/// what separates a real match from accidental hash collisions, which
/// scatter across offsets. Confidence is the fraction of query pairs that
/// matched the winner at least once, so it stays in [0, 1] and is not
/// inflated by popular keys.
pub struct Matcher<'a> {
    index: &'a FingerprintIndex,
    fingerprinter: Fingerprinter,
}

impl<'a> Matcher<'a> {
    /// Fails with [`Error::IndexLoad`] on an empty index: matching against
    /// nothing is a deployment mistake, not a query that found no match.
    pub fn new(index: &'a FingerprintIndex) -> Result<Self> {
        if index.is_empty() {
            return Err(Error::IndexLoad("index contains no tracks".into()));
        }
        Ok(Matcher {
            fingerprinter: Fingerprinter::new(index.config().clone()),
            index,
        })
    }

    /// Identify mono samples at the analysis sample rate.
    pub fn identify(&self, samples: &[f32]) -> MatchResult {
        self.match_pairs(&self.fingerprinter.fingerprint(samples))
    }

    /// Decode an audio file and identify it.
    pub fn identify_file(&self, path: &Path) -> Result<MatchResult> {
        let pairs = self.fingerprinter.fingerprint_file(path)?;
        Ok(self.match_pairs(&pairs))
    }

    /// Identify a WAV clip held in memory, e.g. a just-recorded query.
    pub fn identify_wav_bytes(&self, bytes: &[u8]) -> Result<MatchResult> {
        let samples = AudioLoader::load_wav_bytes(bytes, self.index.config())?;
        Ok(self.identify(&samples))
    }

    /// Match pre-computed query pairs. An empty fingerprint yields the
    /// no-match result rather than an error.
    pub fn match_pairs(&self, pairs: &[PairRecord]) -> MatchResult {
        let mut state = ScanState::default();
        self.accumulate(&mut state, pairs, 0);
        self.finish(state, pairs.len())
    }

    /// Like [`match_pairs`](Self::match_pairs), but polls `cancel` between
    /// batches of pairs and bails out with [`Error::Cancelled`] once it is
    /// set.
    pub fn match_pairs_cancellable(
        &self,
        pairs: &[PairRecord],
        cancel: &AtomicBool,
    ) -> Result<MatchResult> {
        let mut state = ScanState::default();
        for (chunk_idx, chunk) in pairs.chunks(CANCEL_POLL_INTERVAL).enumerate() {
            if cancel.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }
            self.accumulate(&mut state, chunk, chunk_idx * CANCEL_POLL_INTERVAL);
        }
        Ok(self.finish(state, pairs.len()))
    }

    /// Vote the postings reached from `pairs` into the histogram state.
    /// `base` is the index of the first pair within the whole query, so
    /// hit tracking stays in query-wide pair indices across chunks.
    fn accumulate(&self, state: &mut ScanState, pairs: &[PairRecord], base: usize) {
        let config = self.index.config();
        for (i, pair) in pairs.iter().enumerate() {
            for key in hash::neighbourhood(pair.f_anchor, pair.f_target, pair.dt, config) {
                let Some(postings) = self.index.postings(key) else {
                    continue;
                };
                for posting in postings {
                    let diff = i64::from(pair.t_anchor) - i64::from(posting.anchor_time);
                    let dbin = diff.div_euclid(config.align_bin) * config.align_bin;
                    *state
                        .counts
                        .entry((posting.track_id, dbin))
                        .or_insert(0) += 1;
                    state.hits.entry(posting.track_id).or_default().insert(base + i);
                }
            }
        }
    }

    /// Pick the winner out of the accumulated histogram.
    fn finish(&self, state: ScanState, total_pairs: usize) -> MatchResult {
        if total_pairs == 0 {
            debug!("empty query fingerprint");
            return MatchResult::no_match();
        }

        // Peak of the alignment histogram; ties go to the smaller track
        // id, then the smaller offset bin.
        let mut best: Option<(u32, i64, u32)> = None;
        for (&(track_id, dbin), &count) in &state.counts {
            let better = match best {
                None => true,
                Some((btid, bdbin, bcount)) => {
                    count > bcount
                        || (count == bcount
                            && (track_id < btid || (track_id == btid && dbin < bdbin)))
                }
            };
            if better {
                best = Some((track_id, dbin, count));
            }
        }

        let Some((track_id, dbin, count)) = best else {
            debug!("no postings matched {} query pairs", total_pairs);
            return MatchResult::no_match();
        };

        let matched = state.hits.get(&track_id).map_or(0, HashSet::len);
        let confidence = matched as f32 / total_pairs as f32;
        debug!(
            "track {} leads: {} aligned at offset {}, {}/{} pairs matched",
            track_id, count, dbin, matched, total_pairs
        );

        let Some(metadata) = self.index.track(track_id) else {
            warn!("posting references unknown track {}", track_id);
            return MatchResult::no_match();
        };

        MatchResult {
            track: Some(metadata.clone()),
            confidence,
            time_offset: Some(dbin),
        }
    }
}

/// Flat (track, offset-bin) histogram plus, per track, the set of query
/// pair indices that produced at least one posting.
#[derive(Default)]
struct ScanState {
    counts: HashMap<(u32, i64), u32>,
    hits: HashMap<u32, HashSet<usize>>,
}
