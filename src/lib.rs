pub mod audio;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod hash;
pub mod index;
pub mod matcher;
pub mod models;
pub mod pairs;
pub mod peaks;
pub mod spectrogram;

pub use audio::AudioLoader;
pub use config::{Config, PeakPicker};
pub use error::{Error, Result};
pub use fingerprint::Fingerprinter;
pub use index::{FingerprintIndex, IndexStats};
pub use matcher::Matcher;
pub use models::{MatchResult, PairRecord, Peak, Posting, TrackMetadata};
