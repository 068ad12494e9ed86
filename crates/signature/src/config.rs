//! Signature kinds and error types for the CBIR signature layer.
//!
//! Nothing in here performs I/O; the kinds are plain descriptors used by the
//! codec, the index builder and the ingestion tools to agree on which
//! signature family a stream or shard holds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Signature family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureKind {
    /// Haar wavelet signature over a 128x128 YIQ image.
    #[default]
    Haar,
    /// Arbitrary integer feature set, uniformly weighted.
    Integer,
    /// YIQ colour histogram (top 50 buckets of a 32x32 thumbnail).
    Color,
    /// RGB colour histogram (top 50 buckets of a 16x16 thumbnail).
    Rgb,
}

impl SignatureKind {
    pub const ALL: [SignatureKind; 4] = [
        SignatureKind::Haar,
        SignatureKind::Integer,
        SignatureKind::Color,
        SignatureKind::Rgb,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SignatureKind::Haar => "haar",
            SignatureKind::Integer => "integer",
            SignatureKind::Color => "color",
            SignatureKind::Rgb => "rgb",
        }
    }

    /// Extension used for signature record streams of this kind.
    pub fn stream_extension(self) -> &'static str {
        match self {
            SignatureKind::Haar => "hsigs",
            SignatureKind::Integer => "isigs",
            SignatureKind::Color => "csigs",
            SignatureKind::Rgb => "rsigs",
        }
    }

    /// Extension used for index shards built from this kind.
    ///
    /// Haar signatures go into the wavelet sparse matrix (`.hsm`); every other
    /// kind is indexed by the generic integer matrix (`.qsm`).
    pub fn index_extension(self) -> &'static str {
        match self {
            SignatureKind::Haar => "hsm",
            _ => "qsm",
        }
    }

    /// Square side length images are resampled to before extraction.
    pub fn working_side(self) -> Option<u32> {
        match self {
            SignatureKind::Haar => Some(crate::haar::SIDE_LENGTH as u32),
            SignatureKind::Color => Some(crate::histogram::HistogramSpace::Yiq.side()),
            SignatureKind::Rgb => Some(crate::histogram::HistogramSpace::Rgb.side()),
            SignatureKind::Integer => None,
        }
    }
}

impl fmt::Display for SignatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureKind {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "haar" | "hsigs" => Ok(SignatureKind::Haar),
            "integer" | "int" | "isigs" => Ok(SignatureKind::Integer),
            "color" | "colour" | "yiq" | "csigs" => Ok(SignatureKind::Color),
            "rgb" | "rsigs" => Ok(SignatureKind::Rgb),
            other => Err(SignatureError::UnknownKind(other.to_string())),
        }
    }
}

/// Errors returned while building, parsing or decoding signatures.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("hash length invalid: expected 32 hex characters (got {len})")]
    InvalidHashLength { len: usize },

    #[error("hash is not valid hex: {value}")]
    InvalidHash { value: String },

    #[error("invalid feature id '{token}'")]
    InvalidFeature { token: String },

    #[error("feature {feature} lies outside coefficient space {space}")]
    FeatureOutOfRange { feature: u32, space: u32 },

    #[error("pixel buffer must be {expected}x{expected} (got {side}x{side})")]
    ResolutionMismatch { expected: u32, side: u32 },

    #[error("pixel buffer of {len} bytes does not describe a {side}x{side} RGB image")]
    InvalidPixelBuffer { side: u32, len: usize },

    #[error("unsupported channel count {count}; expected 1 or 3")]
    UnsupportedChannelCount { count: u8 },

    #[error("weight and feature length mismatch ({weights} weights, {features} features)")]
    WeightLengthMismatch { weights: usize, features: usize },

    #[error("record holds {len} features; at most 65535 fit in one record")]
    TooManyFeatures { len: usize },

    #[error("expected a {expected} signature, found {found}")]
    KindMismatch {
        expected: SignatureKind,
        found: SignatureKind,
    },

    #[error("{kind} signatures cannot be extracted from pixels")]
    NotExtractable { kind: SignatureKind },

    #[error("truncated signature record")]
    Truncated,

    #[error("unknown signature kind '{0}'")]
    UnknownKind(String),

    #[error("unknown weight profile '{0}'")]
    UnknownProfile(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl SignatureError {
    /// True for errors that mean the byte stream itself is corrupt.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            SignatureError::UnsupportedChannelCount { .. }
                | SignatureError::WeightLengthMismatch { .. }
                | SignatureError::FeatureOutOfRange { .. }
                | SignatureError::Truncated
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_names_and_extensions() {
        assert_eq!("haar".parse::<SignatureKind>().unwrap(), SignatureKind::Haar);
        assert_eq!("HSIGS".parse::<SignatureKind>().unwrap(), SignatureKind::Haar);
        assert_eq!("colour".parse::<SignatureKind>().unwrap(), SignatureKind::Color);
        assert_eq!("rsigs".parse::<SignatureKind>().unwrap(), SignatureKind::Rgb);
        assert!(matches!(
            "jpeg".parse::<SignatureKind>(),
            Err(SignatureError::UnknownKind(_))
        ));
    }

    #[test]
    fn index_extension_splits_haar_from_the_rest() {
        assert_eq!(SignatureKind::Haar.index_extension(), "hsm");
        for kind in [SignatureKind::Integer, SignatureKind::Color, SignatureKind::Rgb] {
            assert_eq!(kind.index_extension(), "qsm");
        }
    }

    #[test]
    fn working_sides() {
        assert_eq!(SignatureKind::Haar.working_side(), Some(128));
        assert_eq!(SignatureKind::Color.working_side(), Some(32));
        assert_eq!(SignatureKind::Rgb.working_side(), Some(16));
        assert_eq!(SignatureKind::Integer.working_side(), None);
    }

    #[test]
    fn kind_serde_is_lowercase() {
        let json = serde_json::to_string(&SignatureKind::Rgb).unwrap();
        assert_eq!(json, "\"rgb\"");
        let back: SignatureKind = serde_json::from_str("\"color\"").unwrap();
        assert_eq!(back, SignatureKind::Color);
    }

    #[test]
    fn format_errors_are_classified() {
        assert!(SignatureError::Truncated.is_format_error());
        assert!(SignatureError::UnsupportedChannelCount { count: 2 }.is_format_error());
        assert!(!SignatureError::UnknownKind("x".into()).is_format_error());
    }
}
