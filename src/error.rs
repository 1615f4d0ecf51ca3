/// Error types for the audioprint library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or unreadable audio. Fatal to the call that supplied it.
    #[error("audio decode error: {0}")]
    AudioDecode(String),

    /// File-system failure while reading audio or index files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing or corrupt index snapshot, or a snapshot written with a
    /// different configuration or format version.
    #[error("index load error: {0}")]
    IndexLoad(String),

    /// A track with this id is already in the index.
    #[error("track {0} already ingested")]
    DuplicateTrack(u32),

    /// Snapshot encode/decode failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Cooperative cancellation was requested during matching.
    #[error("matching cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<hound::Error> for Error {
    fn from(err: hound::Error) -> Self {
        Error::AudioDecode(err.to_string())
    }
}

impl From<symphonia::core::errors::Error> for Error {
    fn from(err: symphonia::core::errors::Error) -> Self {
        Error::AudioDecode(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
