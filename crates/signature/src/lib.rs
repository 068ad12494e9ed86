//! # CBIR Signatures
//!
//! Perceptual signatures for content-based image retrieval. A signature is a
//! compact, sorted set of feature ids plus a weight function over them; the
//! index crate turns many signatures into posting lists and scores queries by
//! weighted feature overlap.
//!
//! ## Contract
//!
//! - Extraction is a pure function of `(pixels, kind)`. Decoding and
//!   resampling happen upstream; this crate only sees square RGB buffers at
//!   the working resolution of each kind.
//! - Feature ids are ascending and bounded by the kind's coefficient space.
//! - Weights come from an immutable [`WeightTable`] passed in by the caller.
//!
//! ## Signature Families
//!
//! 1.  **Haar**: a 128x128 image is converted to YIQ and decomposed with a 2D
//!     Haar pyramid. The 30 largest non-DC coefficients of each channel are
//!     kept as packed `(channel, position, sign)` ids, weighted by the
//!     table's radial band for that channel. The DC terms become the channel
//!     averages.
//!
//! 2.  **Integer**: arbitrary feature ids parsed from text, each weighing 1.
//!
//! 3.  **Color / RGB histograms**: the 50 most populated colour buckets of a
//!     32x32 (YIQ) or 16x16 (RGB) thumbnail, weighted by their pixel counts.
//!
//! Signatures travel between tools as little-endian record streams, see
//! [`codec`].
//!
//! ## Example Usage
//!
//! ```
//! use signature::{PixelBuffer, Signature, SignatureId, SignatureKind, SignatureModel, WeightTable};
//!
//! let pixels = PixelBuffer::from_fn(128, |x, y| [x as u8, y as u8, 64]);
//! let sig = Signature::from_pixels(SignatureKind::Haar, SignatureId::Ephemeral(1), &pixels).unwrap();
//!
//! assert_eq!(sig.features().len(), 90);
//! assert!(sig.total_weight(WeightTable::shared(Default::default())) > 0.0);
//! ```
pub mod codec;
pub mod config;
pub mod haar;
pub mod hash;
pub mod histogram;
pub mod integer;
pub mod pixels;
mod similarity;
pub mod weights;

pub use crate::codec::{SignatureReader, SignatureWriter};
pub use crate::config::{SignatureError, SignatureKind};
pub use crate::haar::HaarSignature;
pub use crate::hash::{ContentHash, SignatureId, HASH_LEN};
pub use crate::histogram::{HistogramSignature, HistogramSpace, HISTOGRAM_BUCKETS};
pub use crate::integer::IntegerSignature;
pub use crate::pixels::PixelBuffer;
pub use crate::similarity::compare;
pub use crate::weights::{WeightProfile, WeightTable};

/// Current signature extraction version.
pub const SIGNATURE_VERSION: u16 = 1;

/// Capabilities shared by every signature family.
pub trait SignatureModel {
    fn id(&self) -> SignatureId;

    fn kind(&self) -> SignatureKind;

    /// Ascending feature ids.
    fn features(&self) -> &[u32];

    /// Weight of the feature at `position` in [`SignatureModel::features`].
    fn weight_at(&self, position: usize, weights: &WeightTable) -> f32;

    fn total_weight(&self, weights: &WeightTable) -> f32 {
        (0..self.features().len())
            .map(|position| self.weight_at(position, weights))
            .sum()
    }

    /// Exclusive upper bound on feature ids.
    fn coefficient_space(&self) -> u32;

    /// Y/I/Q averages, only present on Haar signatures.
    fn channel_averages(&self) -> Option<&[f32; haar::CHANNEL_COUNT]> {
        None
    }
}

impl SignatureModel for HaarSignature {
    fn id(&self) -> SignatureId {
        HaarSignature::id(self)
    }

    fn kind(&self) -> SignatureKind {
        SignatureKind::Haar
    }

    fn features(&self) -> &[u32] {
        HaarSignature::features(self)
    }

    fn weight_at(&self, position: usize, weights: &WeightTable) -> f32 {
        weights.coefficient(HaarSignature::features(self)[position])
    }

    fn total_weight(&self, weights: &WeightTable) -> f32 {
        HaarSignature::total_weight(self, weights)
    }

    fn coefficient_space(&self) -> u32 {
        haar::COEFFICIENT_SPACE
    }

    fn channel_averages(&self) -> Option<&[f32; haar::CHANNEL_COUNT]> {
        Some(self.averages())
    }
}

impl SignatureModel for IntegerSignature {
    fn id(&self) -> SignatureId {
        IntegerSignature::id(self)
    }

    fn kind(&self) -> SignatureKind {
        SignatureKind::Integer
    }

    fn features(&self) -> &[u32] {
        IntegerSignature::features(self)
    }

    fn weight_at(&self, _position: usize, _weights: &WeightTable) -> f32 {
        1.0
    }

    fn total_weight(&self, _weights: &WeightTable) -> f32 {
        IntegerSignature::total_weight(self)
    }

    fn coefficient_space(&self) -> u32 {
        IntegerSignature::features(self)
            .last()
            .map_or(0, |&max| max.saturating_add(1))
    }
}

impl SignatureModel for HistogramSignature {
    fn id(&self) -> SignatureId {
        HistogramSignature::id(self)
    }

    fn kind(&self) -> SignatureKind {
        match self.space() {
            HistogramSpace::Yiq => SignatureKind::Color,
            HistogramSpace::Rgb => SignatureKind::Rgb,
        }
    }

    fn features(&self) -> &[u32] {
        HistogramSignature::features(self)
    }

    fn weight_at(&self, position: usize, _weights: &WeightTable) -> f32 {
        self.frequency_at(position)
    }

    fn total_weight(&self, _weights: &WeightTable) -> f32 {
        HistogramSignature::total_weight(self)
    }

    fn coefficient_space(&self) -> u32 {
        self.space().color_count()
    }
}

/// Any signature family.
#[derive(Debug, Clone, PartialEq)]
pub enum Signature {
    Integer(IntegerSignature),
    Haar(HaarSignature),
    Color(HistogramSignature),
    Rgb(HistogramSignature),
}

impl Signature {
    /// Extract a signature of `kind` from a buffer at that kind's working side.
    pub fn from_pixels(
        kind: SignatureKind,
        id: SignatureId,
        pixels: &PixelBuffer,
    ) -> Result<Self, SignatureError> {
        match kind {
            SignatureKind::Haar => HaarSignature::from_pixels(id, pixels).map(Signature::Haar),
            SignatureKind::Color => {
                HistogramSignature::from_pixels(id, HistogramSpace::Yiq, pixels)
                    .map(Signature::Color)
            }
            SignatureKind::Rgb => {
                HistogramSignature::from_pixels(id, HistogramSpace::Rgb, pixels).map(Signature::Rgb)
            }
            SignatureKind::Integer => Err(SignatureError::NotExtractable { kind }),
        }
    }

    /// Content hash, when the identity carries one.
    pub fn hash(&self) -> Option<ContentHash> {
        self.id().hash()
    }

    pub fn as_haar(&self) -> Option<&HaarSignature> {
        match self {
            Signature::Haar(sig) => Some(sig),
            _ => None,
        }
    }

    /// Replace the identity, keeping features and weights.
    pub fn with_id(self, id: SignatureId) -> Self {
        match self {
            Signature::Integer(sig) => Signature::Integer(sig.with_id(id)),
            Signature::Haar(sig) => Signature::Haar(sig.with_id(id)),
            Signature::Color(sig) => Signature::Color(sig.with_id(id)),
            Signature::Rgb(sig) => Signature::Rgb(sig.with_id(id)),
        }
    }

    fn model(&self) -> &dyn SignatureModel {
        match self {
            Signature::Integer(sig) => sig as &dyn SignatureModel,
            Signature::Haar(sig) => sig as &dyn SignatureModel,
            Signature::Color(sig) | Signature::Rgb(sig) => sig as &dyn SignatureModel,
        }
    }
}

impl SignatureModel for Signature {
    fn id(&self) -> SignatureId {
        self.model().id()
    }

    fn kind(&self) -> SignatureKind {
        match self {
            Signature::Integer(_) => SignatureKind::Integer,
            Signature::Haar(_) => SignatureKind::Haar,
            Signature::Color(_) => SignatureKind::Color,
            Signature::Rgb(_) => SignatureKind::Rgb,
        }
    }

    fn features(&self) -> &[u32] {
        self.model().features()
    }

    fn weight_at(&self, position: usize, weights: &WeightTable) -> f32 {
        self.model().weight_at(position, weights)
    }

    fn total_weight(&self, weights: &WeightTable) -> f32 {
        self.model().total_weight(weights)
    }

    fn coefficient_space(&self) -> u32 {
        self.model().coefficient_space()
    }

    fn channel_averages(&self) -> Option<&[f32; haar::CHANNEL_COUNT]> {
        self.model().channel_averages()
    }
}

impl From<HaarSignature> for Signature {
    fn from(sig: HaarSignature) -> Self {
        Signature::Haar(sig)
    }
}

impl From<IntegerSignature> for Signature {
    fn from(sig: IntegerSignature) -> Self {
        Signature::Integer(sig)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> &'static WeightTable {
        WeightTable::shared(WeightProfile::Photo)
    }

    #[test]
    fn integer_signature_weighs_one_per_feature() {
        let sig = Signature::from(IntegerSignature::new(SignatureId::Ephemeral(1), vec![4, 1, 9]));
        assert_eq!(sig.kind(), SignatureKind::Integer);
        assert_eq!(sig.total_weight(table()), 3.0);
        assert_eq!(sig.coefficient_space(), 10);
        assert!(sig.channel_averages().is_none());
    }

    #[test]
    fn empty_integer_signature_has_empty_space() {
        let sig = IntegerSignature::new(SignatureId::Ephemeral(1), vec![]);
        assert_eq!(SignatureModel::coefficient_space(&sig), 0);
    }

    #[test]
    fn histogram_kinds_follow_space() {
        let color = Signature::from_pixels(
            SignatureKind::Color,
            SignatureId::Ephemeral(1),
            &PixelBuffer::filled(32, [10, 20, 30]),
        )
        .unwrap();
        assert_eq!(color.kind(), SignatureKind::Color);
        assert_eq!(color.total_weight(table()), 1024.0);
        assert_eq!(color.coefficient_space(), 1 << 16);

        let rgb = Signature::from_pixels(
            SignatureKind::Rgb,
            SignatureId::Ephemeral(1),
            &PixelBuffer::filled(16, [10, 20, 30]),
        )
        .unwrap();
        assert_eq!(rgb.kind(), SignatureKind::Rgb);
        assert_eq!(rgb.weight_at(0, table()), 256.0);
    }

    #[test]
    fn haar_weights_come_from_the_table() {
        let pixels = PixelBuffer::from_fn(128, |x, y| [(x ^ y) as u8, x as u8, y as u8]);
        let sig = Signature::from_pixels(SignatureKind::Haar, SignatureId::Ephemeral(2), &pixels)
            .unwrap();
        let by_position: f32 = (0..sig.features().len())
            .map(|i| sig.weight_at(i, table()))
            .sum();
        assert!((by_position - sig.total_weight(table())).abs() < 1e-4);
        assert!(sig.channel_averages().is_some());
        assert!(sig.as_haar().is_some());
    }

    #[test]
    fn integer_kind_cannot_be_extracted() {
        let err = Signature::from_pixels(
            SignatureKind::Integer,
            SignatureId::Ephemeral(1),
            &PixelBuffer::filled(8, [0, 0, 0]),
        )
        .unwrap_err();
        assert!(matches!(err, SignatureError::NotExtractable { .. }));
    }

    #[test]
    fn with_id_keeps_features() {
        let hash = ContentHash::of_bytes(b"a");
        let sig = Signature::from(IntegerSignature::new(SignatureId::Ephemeral(1), vec![2, 3]))
            .with_id(hash.into());
        assert_eq!(sig.hash(), Some(hash));
        assert_eq!(sig.features(), &[2, 3]);
    }
}
