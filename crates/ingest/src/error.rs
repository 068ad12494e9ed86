//! Error types produced by the ingest crate.
//!
//! Per-item problems during a bulk import (missing files, undecodable images,
//! malformed manifest lines) are logged and counted in the
//! [`ImportReport`](crate::ImportReport) rather than returned. The variants
//! below surface when a single operation fails or when the output side
//! (writer, shard directory) breaks.
//!
//! ```rust
//! use ingest::IngestError;
//!
//! fn exit_code(error: &IngestError) -> i32 {
//!     match error {
//!         IngestError::Config(_) => 2,
//!         IngestError::Io(_) => 74,
//!         _ => 1,
//!     }
//! }
//! ```
use index::IndexError;
use signature::SignatureError;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum IngestError {
    #[error("invalid ingest config: {0}")]
    Config(#[from] ConfigError),

    /// The bytes are not an image the decoder understands.
    #[error("image decode failed: {0}")]
    Decode(String),

    #[error("image of {size} bytes exceeds limit of {limit}")]
    ImageTooLarge { size: usize, limit: usize },

    /// A manifest, whitelist or import line could not be parsed.
    #[error("line {line}: {reason}")]
    InvalidLine { line: usize, reason: String },

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for IngestError {
    fn from(err: image::ImageError) -> Self {
        IngestError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_lower_case_and_specific() {
        let err = IngestError::ImageTooLarge {
            size: 10,
            limit: 4,
        };
        assert_eq!(err.to_string(), "image of 10 bytes exceeds limit of 4");

        let err = IngestError::InvalidLine {
            line: 3,
            reason: "empty path".into(),
        };
        assert_eq!(err.to_string(), "line 3: empty path");
    }

    #[test]
    fn wraps_lower_layers() {
        let err: IngestError = SignatureError::InvalidHashLength { len: 3 }.into();
        assert!(matches!(err, IngestError::Signature(_)));

        let err: IngestError = ConfigError::ZeroShardSize.into();
        assert!(err.to_string().contains("shard_size"));
    }
}
