//! Data types shared by the ingest operations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use signature::ContentHash;

/// One manifest line: an image path, optionally with its content hash.
///
/// Without a hash the signature is keyed by the xxh3-128 hash of the file
/// bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub hash: Option<ContentHash>,
    pub path: PathBuf,
}

/// Outcome counters for a bulk import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub imported: u64,
    /// Source files that did not exist.
    pub missing: u64,
    /// Unparseable lines, unreadable or undecodable files.
    pub failed: u64,
    /// Records dropped because their hash was already imported.
    pub duplicates: u64,
}

impl ImportReport {
    /// Lines that produced an outcome of any kind.
    pub fn processed(&self) -> u64 {
        self.imported + self.missing + self.failed + self.duplicates
    }
}

/// Outcome counters for [`crate::filter_signatures`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterReport {
    pub read: u64,
    pub kept: u64,
    /// Records whose hash is not whitelisted.
    pub rejected: u64,
    pub duplicates: u64,
}
