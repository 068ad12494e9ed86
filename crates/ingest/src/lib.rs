//! CBIR Ingest Layer
//!
//! This is where images and feature lists enter the system. We decode and
//! resample images, extract signatures, append them to record streams, and
//! turn those streams into index shards.
//!
//! ## What we do here
//!
//! - **Decode images** - [`decode_pixels`] loads PNG/JPEG/GIF/BMP/WebP bytes,
//!   converts to RGB and resamples to the working side of a signature kind.
//! - **Import in bulk** - [`import_images`] walks a `hash | path` manifest,
//!   [`import_integer_lines`] reads `hash | c, c, ...` lines. Missing or
//!   broken inputs are logged, counted and skipped; duplicate hashes are
//!   dropped.
//! - **Build shards** - [`build_shards`] splits deduplicated streams into
//!   `out-{n}.hsm` / `out-{n}.qsm` files.
//! - **Filter and dump** - [`filter_signatures`] keeps whitelisted hashes,
//!   [`dump_index`] and [`dump_signatures`] print text listings.
//!
//! ## Example
//!
//! ```
//! use ingest::{import_integer_lines, IngestConfig};
//! use signature::{SignatureKind, SignatureWriter};
//! use std::io::Cursor;
//!
//! let lines = "00000000000000000000000000000001|3, 1, 2\n";
//! let mut writer = SignatureWriter::new(Vec::new(), SignatureKind::Integer);
//! let report = import_integer_lines(Cursor::new(lines), &mut writer, &IngestConfig::default()).unwrap();
//!
//! assert_eq!(report.imported, 1);
//! assert!(!writer.into_inner().is_empty());
//! ```

mod config;
mod decode;
mod dump;
mod error;
mod filter;
mod import;
mod manifest;
mod shards;
mod types;

pub use crate::config::{ConfigError, IngestConfig};
pub use crate::decode::{decode_pixels, signature_from_image};
pub use crate::dump::{dump_index, dump_signatures};
pub use crate::error::IngestError;
pub use crate::filter::filter_signatures;
pub use crate::import::{import_images, import_integer_lines};
pub use crate::manifest::{parse_integer_line, parse_manifest_line, read_whitelist};
pub use crate::shards::build_shards;
pub use crate::types::{FilterReport, ImportReport, ManifestEntry};
