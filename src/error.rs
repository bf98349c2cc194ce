//! Error types for the paperclock core.

use thiserror::Error;

/// Convenience result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while ingesting, sequencing or rendering wallpapers.
///
/// None of these are fatal to a running server: each one aborts a single
/// operation (an upload, a queue mutation, one device's tick) and leaves
/// everything else untouched.
#[derive(Debug, Error)]
pub enum Error {
    /// Source image could not be decoded, or has zero area
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// Frame does not match the panel geometry in either orientation
    #[error("frame is {actual_width}x{actual_height}, panel expects {width}x{height}")]
    DimensionMismatch {
        /// Panel native width
        width: u32,
        /// Panel native height
        height: u32,
        /// Width of the rejected frame
        actual_width: u32,
        /// Height of the rejected frame
        actual_height: u32,
    },

    /// Referenced wallpaper asset is missing or unreadable
    #[error("asset unavailable: {0}")]
    AssetUnavailable(String),

    /// Queue already holds this wallpaper
    #[error("wallpaper {0} is already queued")]
    DuplicateEntry(u64),

    /// Entity is not present where the operation expected it
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller supplied an out-of-range or malformed value
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Hashing, copying or persisting an asset failed
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// Settings could not be loaded or parsed
    #[error("configuration error: {0}")]
    Config(String),

    /// Publishing to a device channel failed
    #[error("transport error: {0}")]
    Transport(String),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(String),

    /// A background task panicked or was cancelled
    #[error("background task failed: {0}")]
    Task(String),
}

impl Error {
    /// Build an [`Error::InvalidInput`] value.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Build an [`Error::NotFound`] value.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::StorageFailure(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::InvalidImage(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Task(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::DuplicateEntry(7);
        assert!(err.to_string().contains("7"));

        let err = Error::DimensionMismatch {
            width: 800,
            height: 480,
            actual_width: 640,
            actual_height: 480,
        };
        assert!(err.to_string().contains("640x480"));
        assert!(err.to_string().contains("800x480"));
    }

    #[test]
    fn test_io_error_is_storage_failure() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(Error::from(io), Error::StorageFailure(_)));
    }
}
