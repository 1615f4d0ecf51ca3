use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fingerprint::Fingerprinter;
use crate::hash;
use crate::models::{PairRecord, Posting, TrackMetadata};

/// Bumped whenever the snapshot layout changes.
const SNAPSHOT_VERSION: u32 = 1;

/// Canonical binary snapshot.
const INDEX_BIN: &str = "index.bin";
/// JSON mirrors, written for interoperability and never read back.
const INDEX_JSON: &str = "index.json";
const TRACKS_JSON: &str = "tracks.json";

/// The inverted fingerprint index and its track metadata store.
///
/// Built offline by ingesting catalog tracks, persisted as a whole-index
/// snapshot, then loaded read-only for matching. Every posting's
/// `track_id` is guaranteed to exist in the metadata store. Postings under
/// a key keep their append order through save/load.
#[derive(Debug)]
pub struct FingerprintIndex {
    config: Config,
    entries: HashMap<u32, Vec<Posting>>,
    tracks: HashMap<u32, TrackMetadata>,
}

/// Summary counters for an index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexStats {
    pub tracks: usize,
    pub keys: usize,
    pub postings: usize,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    config: Config,
    entries: Vec<(u32, Vec<Posting>)>,
    tracks: Vec<(u32, TrackMetadata)>,
}

impl FingerprintIndex {
    pub fn new(config: Config) -> Self {
        FingerprintIndex {
            config,
            entries: HashMap::new(),
            tracks: HashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fingerprint already-loaded samples and add them under
    /// `metadata.id`. The id must be new: re-ingestion is rejected rather
    /// than silently duplicating postings.
    pub fn ingest(&mut self, samples: &[f32], metadata: TrackMetadata) -> Result<()> {
        if self.tracks.contains_key(&metadata.id) {
            return Err(Error::DuplicateTrack(metadata.id));
        }
        let fingerprinter = Fingerprinter::new(self.config.clone());
        let pairs = fingerprinter.fingerprint(samples);
        self.insert_fingerprint(metadata, &pairs)
    }

    /// Decode an audio file and ingest it.
    pub fn ingest_file(&mut self, path: &Path, metadata: TrackMetadata) -> Result<()> {
        if self.tracks.contains_key(&metadata.id) {
            return Err(Error::DuplicateTrack(metadata.id));
        }
        let fingerprinter = Fingerprinter::new(self.config.clone());
        let pairs = fingerprinter.fingerprint_file(path)?;
        self.insert_fingerprint(metadata, &pairs)
    }

    /// Ingest a batch of files, fingerprinting in parallel.
    ///
    /// Each worker produces a private pair list; postings merge into the
    /// shared map sequentially in input order, so the result is identical
    /// to ingesting the files one by one. Per-track failures do not abort
    /// the batch: they are logged and returned alongside their paths.
    pub fn ingest_batch(
        &mut self,
        items: Vec<(PathBuf, TrackMetadata)>,
    ) -> Vec<(PathBuf, Error)> {
        let fingerprinter = Fingerprinter::new(self.config.clone());
        let fingerprints: Vec<(PathBuf, TrackMetadata, Result<Vec<PairRecord>>)> = items
            .into_par_iter()
            .map(|(path, metadata)| {
                let pairs = fingerprinter.fingerprint_file(&path);
                (path, metadata, pairs)
            })
            .collect();

        let mut failures = Vec::new();
        for (path, metadata, pairs) in fingerprints {
            let outcome = pairs.and_then(|pairs| {
                if self.tracks.contains_key(&metadata.id) {
                    return Err(Error::DuplicateTrack(metadata.id));
                }
                self.insert_fingerprint(metadata, &pairs)
            });
            if let Err(err) = outcome {
                warn!("skipping {}: {}", path.display(), err);
                failures.push((path, err));
            }
        }
        failures
    }

    pub(crate) fn insert_fingerprint(
        &mut self,
        metadata: TrackMetadata,
        pairs: &[PairRecord],
    ) -> Result<()> {
        let track_id = metadata.id;
        info!(
            "ingesting track {} ({} - {}): {} pairs",
            track_id, metadata.artist, metadata.title,
            pairs.len()
        );
        for pair in pairs {
            let key = hash::key(pair, &self.config);
            self.entries.entry(key).or_default().push(Posting {
                track_id,
                anchor_time: pair.t_anchor,
            });
        }
        self.tracks.insert(track_id, metadata);
        Ok(())
    }

    pub fn postings(&self, key: u32) -> Option<&[Posting]> {
        self.entries.get(&key).map(Vec::as_slice)
    }

    pub fn track(&self, track_id: u32) -> Option<&TrackMetadata> {
        self.tracks.get(&track_id)
    }

    pub fn contains_track(&self, track_id: u32) -> bool {
        self.tracks.contains_key(&track_id)
    }

    pub fn tracks(&self) -> impl Iterator<Item = &TrackMetadata> {
        self.tracks.values()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            tracks: self.tracks.len(),
            keys: self.entries.len(),
            postings: self.entries.values().map(Vec::len).sum(),
        }
    }

    /// Persist a whole-index snapshot into `dir`: the canonical binary
    /// file plus JSON mirrors with stringified integer keys. Entries are
    /// written sorted by key so identical indexes serialize identically.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;

        let mut entries: Vec<(u32, Vec<Posting>)> = self
            .entries
            .iter()
            .map(|(&k, v)| (k, v.clone()))
            .collect();
        entries.sort_by_key(|(k, _)| *k);
        let mut tracks: Vec<(u32, TrackMetadata)> = self
            .tracks
            .iter()
            .map(|(&id, m)| (id, m.clone()))
            .collect();
        tracks.sort_by_key(|(id, _)| *id);

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            config: self.config.clone(),
            entries,
            tracks,
        };

        let mut bin = BufWriter::new(File::create(dir.join(INDEX_BIN))?);
        bincode::serialize_into(&mut bin, &snapshot)?;
        bin.into_inner().map_err(|e| e.into_error())?.sync_all()?;

        let json_entries: serde_json::Map<String, serde_json::Value> = snapshot
            .entries
            .iter()
            .map(|(k, postings)| {
                let list: Vec<(u32, u32)> = postings
                    .iter()
                    .map(|p| (p.track_id, p.anchor_time))
                    .collect();
                (k.to_string(), serde_json::json!(list))
            })
            .collect();
        serde_json::to_writer(
            BufWriter::new(File::create(dir.join(INDEX_JSON))?),
            &json_entries,
        )?;

        let json_tracks: serde_json::Map<String, serde_json::Value> = snapshot
            .tracks
            .iter()
            .map(|(id, m)| Ok((id.to_string(), serde_json::to_value(m)?)))
            .collect::<Result<_>>()?;
        serde_json::to_writer(
            BufWriter::new(File::create(dir.join(TRACKS_JSON))?),
            &json_tracks,
        )?;

        let stats = self.stats();
        info!(
            "saved index to {}: {} tracks, {} keys, {} postings",
            dir.display(),
            stats.tracks,
            stats.keys,
            stats.postings
        );
        Ok(())
    }

    /// Load a snapshot, adopting the configuration recorded in its header.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(INDEX_BIN);
        let file = File::open(&path)
            .map_err(|e| Error::IndexLoad(format!("{}: {}", path.display(), e)))?;
        let snapshot: Snapshot = bincode::deserialize_from(BufReader::new(file))
            .map_err(|e| Error::IndexLoad(format!("{}: {}", path.display(), e)))?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::IndexLoad(format!(
                "snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }

        let tracks: HashMap<u32, TrackMetadata> = snapshot.tracks.into_iter().collect();
        for postings in snapshot.entries.iter().map(|(_, p)| p) {
            for posting in postings {
                if !tracks.contains_key(&posting.track_id) {
                    return Err(Error::IndexLoad(format!(
                        "posting references unknown track {}",
                        posting.track_id
                    )));
                }
            }
        }

        Ok(FingerprintIndex {
            config: snapshot.config,
            entries: snapshot.entries.into_iter().collect(),
            tracks,
        })
    }

    /// Load a snapshot and refuse it unless its recorded configuration is
    /// identical to `expected`. Fingerprints from mismatched parameters
    /// never align, so this fails loudly instead of matching nothing.
    pub fn load_checked(dir: &Path, expected: &Config) -> Result<Self> {
        let index = Self::load(dir)?;
        if index.config != *expected {
            return Err(Error::IndexLoad(
                "snapshot was built with a different configuration".into(),
            ));
        }
        Ok(index)
    }
}
