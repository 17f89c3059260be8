//! Error types for geolookup.

use std::path::PathBuf;

use thiserror::Error;

/// Process-level error: startup failures and configuration problems.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Dataset acquisition failed
    #[error("dataset download failed: {0}")]
    Fetch(#[from] FetchError),

    /// Dataset could not be opened
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Result type alias for geolookup operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for dataset downloads.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Source URL is not http(s)
    #[error("download url scheme not supported: {url}")]
    UnsupportedScheme { url: String },

    /// Server answered with a non-2xx status
    #[error("unexpected status code {0}")]
    BadStatus(u16),

    /// Written byte count differs from the declared content length
    #[error("incomplete transfer: expected {expected:?} bytes, wrote {written}")]
    IncompleteTransfer { expected: Option<u64>, written: u64 },

    /// Storage directory is missing
    #[error("storage directory {0:?} does not exist")]
    MissingDirectory(PathBuf),

    /// Request could not be sent or the client could not be built
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Local filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error raised by a dataset reader while opening or querying a file.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct ReaderError(Box<dyn std::error::Error + Send + Sync>);

impl ReaderError {
    /// Wrap any error (or message) produced by a reader implementation.
    pub fn new(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(err.into())
    }
}

impl From<maxminddb::MaxMindDBError> for ReaderError {
    fn from(err: maxminddb::MaxMindDBError) -> Self {
        Self::new(err)
    }
}

/// Error type for opening a dataset pair.
#[derive(Error, Debug)]
#[error("failed to open dataset {path:?}: {source}")]
pub struct LoadError {
    pub path: PathBuf,
    #[source]
    pub source: ReaderError,
}

/// Error type for a single address lookup.
#[derive(Error, Debug)]
pub enum LookupError {
    /// A reader failed while answering the query
    #[error("dataset error: {0}")]
    Dataset(#[from] ReaderError),

    /// No dataset pair has been installed yet
    #[error("datasets not loaded")]
    NotReady,
}

/// Fatal outcome of the background refresh loop.
#[derive(Error, Debug)]
pub enum RefreshError {
    /// Re-downloading the datasets failed
    #[error("failed to download datasets: {0}")]
    Fetch(#[from] FetchError),

    /// Re-opening the downloaded datasets failed
    #[error("failed to reload datasets: {0}")]
    Load(#[from] LoadError),

    /// The refresh thread panicked
    #[error("refresh thread panicked")]
    Panicked,

    /// The refresh loop ended without reporting an error
    #[error("refresh loop exited unexpectedly")]
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_error_from_message() {
        let err = ReaderError::new("corrupt search tree");
        assert_eq!(err.to_string(), "corrupt search tree");
    }

    #[test]
    fn test_load_error_keeps_source() {
        use std::error::Error as _;

        let err = LoadError {
            path: PathBuf::from("/data/asn.mmdb"),
            source: ReaderError::new("truncated"),
        };
        assert!(err.to_string().contains("asn.mmdb"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_incomplete_transfer_message() {
        let err = FetchError::IncompleteTransfer {
            expected: Some(100),
            written: 5,
        };
        assert_eq!(
            err.to_string(),
            "incomplete transfer: expected Some(100) bytes, wrote 5"
        );
    }
}
