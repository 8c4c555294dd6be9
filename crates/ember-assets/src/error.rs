//! Error types for the asset system.

use crate::id::{AssetId, AssetType};

/// Errors that can occur during asset operations.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    /// The catalog has no stream for the asset.
    #[error("asset {id} not found in catalog")]
    NotFound {
        /// The id that was looked up.
        id: AssetId,
    },

    /// Failed to open, read or write the asset stream.
    #[error("IO error on stream '{stream}': {source}")]
    Io {
        /// The stream name the catalog resolved.
        stream: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// No handler registered for this asset type.
    #[error("no handler registered for asset type {asset_type}")]
    NoHandler {
        /// The type that had no handler.
        asset_type: AssetType,
    },

    /// No catalog registered for this asset type.
    #[error("no catalog registered for asset type {asset_type}")]
    NoCatalog {
        /// The type that had no catalog.
        asset_type: AssetType,
    },

    /// The handler refused or failed to process the payload.
    #[error("handler failed on asset {id}: {message}")]
    HandlerFailed {
        /// The asset being processed.
        id: AssetId,
        /// Description of the failure.
        message: String,
    },

    /// A handler was unregistered while instances it created were still alive.
    #[error("handler for {asset_types:?} unregistered with {active} live asset(s)")]
    HandlerInUse {
        /// Types the handler was registered for.
        asset_types: Vec<AssetType>,
        /// Number of instances still alive.
        active: usize,
    },

    /// A payload or handle did not have the expected asset type.
    #[error("asset type mismatch: expected {expected}, found {actual}")]
    TypeMismatch {
        /// The type the caller asked for.
        expected: AssetType,
        /// The type actually stored.
        actual: AssetType,
    },

    /// The id is nil or could not be parsed.
    #[error("invalid asset id: {0}")]
    InvalidId(String),

    /// Payload bytes could not be encoded or decoded.
    #[error("serialization error on asset {id}: {message}")]
    Serialization {
        /// The asset being (de)serialized.
        id: AssetId,
        /// Description of the error.
        message: String,
    },

    /// The manager is shutting down and no longer accepts work.
    #[error("asset manager is shut down")]
    Shutdown,

    /// Generic error with a message.
    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for AssetError {
    fn from(source: std::io::Error) -> Self {
        AssetError::Io {
            stream: String::new(),
            source,
        }
    }
}

impl AssetError {
    /// Attach the stream name to a bare IO error.
    pub fn with_stream(self, name: &str) -> Self {
        match self {
            AssetError::Io { stream, source } if stream.is_empty() => AssetError::Io {
                stream: name.to_string(),
                source,
            },
            other => other,
        }
    }
}

/// Result type for asset operations.
pub type AssetResult<T> = Result<T, AssetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_gets_stream_name() {
        let err: AssetError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        let err = err.with_stream("textures/stone.tex");
        assert!(err.to_string().contains("textures/stone.tex"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_named_stream_is_kept() {
        let err = AssetError::Io {
            stream: "a.bin".into(),
            source: std::io::Error::other("boom"),
        }
        .with_stream("b.bin");
        assert!(err.to_string().contains("a.bin"));
    }
}
