use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata for a catalog track.
///
/// The well-known fields cover what the ingestion CLI fills in; anything
/// else found in an external metadata record passes through `extra`
/// untouched.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TrackMetadata {
    pub id: u32,
    pub title: String,
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl TrackMetadata {
    pub fn new(id: u32, title: impl Into<String>, artist: impl Into<String>) -> Self {
        TrackMetadata {
            id,
            title: title.into(),
            artist: artist.into(),
            album: None,
            year: None,
            cover_url: None,
            extra: BTreeMap::new(),
        }
    }
}

/// A constellation point: spectrogram frame index and frequency bin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Peak {
    pub t: u32,
    pub f: u32,
}

/// An anchor/target pair within the target zone.
///
/// `f_anchor`, `f_target` and `dt` are the key material; `t_anchor` is the
/// payload carried through the index for time alignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PairRecord {
    pub f_anchor: u32,
    pub f_target: u32,
    pub dt: u32,
    pub t_anchor: u32,
}

/// An index entry under a hash key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub track_id: u32,
    pub anchor_time: u32,
}

/// Outcome of a query.
///
/// `track` is `None` when nothing in the index matched (or the query
/// produced no fingerprint at all), in which case `confidence` is 0 and
/// `time_offset` is `None`. `time_offset` is the binned value of
/// `t_query - t_reference` at the peak of the alignment histogram, in
/// spectrogram frames.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub track: Option<TrackMetadata>,
    pub confidence: f32,
    pub time_offset: Option<i64>,
}

impl MatchResult {
    pub fn no_match() -> Self {
        MatchResult {
            track: None,
            confidence: 0.0,
            time_offset: None,
        }
    }

    pub fn is_match(&self) -> bool {
        self.track.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_round_trips_unknown_fields() {
        let json = r#"{
            "id": 7,
            "title": "Night Drive",
            "artist": "The Meters",
            "album": "Blue",
            "bpm": 122,
            "source": "import"
        }"#;
        let meta: TrackMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.id, 7);
        assert_eq!(meta.album.as_deref(), Some("Blue"));
        assert_eq!(meta.extra["bpm"], 122);

        let back = serde_json::to_string(&meta).unwrap();
        let reparsed: TrackMetadata = serde_json::from_str(&back).unwrap();
        assert_eq!(reparsed, meta);
    }

    #[test]
    fn no_match_has_zero_confidence() {
        let r = MatchResult::no_match();
        assert!(!r.is_match());
        assert_eq!(r.confidence, 0.0);
        assert_eq!(r.time_offset, None);
    }
}
