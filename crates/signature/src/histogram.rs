//! Quantised colour histogram signatures.
//!
//! Each pixel of a small thumbnail is mapped to a colour bucket; the most
//! populated buckets become the feature ids and their pixel counts the
//! per-feature weights.

use crate::config::SignatureError;
use crate::haar::yiq;
use crate::hash::SignatureId;
use crate::pixels::PixelBuffer;

/// Buckets kept per histogram signature.
pub const HISTOGRAM_BUCKETS: usize = 50;

/// Colour space and quantisation of a histogram signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistogramSpace {
    /// 6/5/5 bits of Y/I/Q over a 32x32 thumbnail.
    Yiq,
    /// 5/5/5 bits of R/G/B over a 16x16 thumbnail.
    Rgb,
}

impl HistogramSpace {
    pub const fn side(self) -> u32 {
        match self {
            HistogramSpace::Yiq => 32,
            HistogramSpace::Rgb => 16,
        }
    }

    /// Number of distinct bucket ids.
    pub const fn color_count(self) -> u32 {
        match self {
            HistogramSpace::Yiq => 1 << 16,
            HistogramSpace::Rgb => 1 << 15,
        }
    }

    /// Bucket id of one pixel.
    pub fn bucket(self, pixel: [u8; 3]) -> u32 {
        match self {
            HistogramSpace::Yiq => {
                let [y, i, q] = yiq(pixel);
                let yi = quantise(y) >> 2;
                let ui = quantise(i * 0.838 + 128.0) >> 3;
                let vi = quantise(q * 0.956 + 128.0) >> 3;
                yi << 10 | ui << 5 | vi
            }
            HistogramSpace::Rgb => {
                let [r, g, b] = pixel.map(|c| (c >> 3) as u32);
                r << 10 | g << 5 | b
            }
        }
    }
}

fn quantise(value: f64) -> u32 {
    value.floor().clamp(0.0, 255.0) as u32
}

/// Histogram signature: bucket ids ascending with parallel pixel counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistogramSignature {
    id: SignatureId,
    space: HistogramSpace,
    features: Vec<u32>,
    frequencies: Vec<u16>,
}

impl HistogramSignature {
    /// Assemble a signature from stored buckets and counts.
    ///
    /// Pairs are reordered by bucket id; repeated ids have their counts summed.
    pub fn new(
        id: SignatureId,
        space: HistogramSpace,
        features: Vec<u32>,
        frequencies: Vec<u16>,
    ) -> Result<Self, SignatureError> {
        if features.len() != frequencies.len() {
            return Err(SignatureError::WeightLengthMismatch {
                weights: frequencies.len(),
                features: features.len(),
            });
        }
        let space_size = space.color_count();
        if let Some(&feature) = features.iter().find(|&&f| f >= space_size) {
            return Err(SignatureError::FeatureOutOfRange {
                feature,
                space: space_size,
            });
        }

        let mut pairs: Vec<(u32, u16)> = features.into_iter().zip(frequencies).collect();
        pairs.sort_unstable_by_key(|&(feature, _)| feature);

        let mut features = Vec::with_capacity(pairs.len());
        let mut frequencies: Vec<u16> = Vec::with_capacity(pairs.len());
        for (feature, count) in pairs {
            if features.last() == Some(&feature) {
                if let Some(last) = frequencies.last_mut() {
                    *last = last.saturating_add(count);
                }
                continue;
            }
            features.push(feature);
            frequencies.push(count);
        }

        Ok(Self {
            id,
            space,
            features,
            frequencies,
        })
    }

    /// Count buckets over the thumbnail and keep the most populated ones.
    pub fn from_pixels(
        id: SignatureId,
        space: HistogramSpace,
        pixels: &PixelBuffer,
    ) -> Result<Self, SignatureError> {
        pixels.require_side(space.side())?;

        let mut counts = vec![0u32; space.color_count() as usize];
        for pixel in pixels.pixels() {
            counts[space.bucket(pixel) as usize] += 1;
        }

        let mut populated: Vec<(u32, u32)> = counts
            .iter()
            .enumerate()
            .filter(|(_, &count)| count > 0)
            .map(|(bucket, &count)| (bucket as u32, count))
            .collect();
        // most populated first, lower ids win ties
        populated.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        populated.truncate(HISTOGRAM_BUCKETS);
        populated.sort_unstable_by_key(|&(bucket, _)| bucket);

        let (features, frequencies) = populated
            .into_iter()
            .map(|(bucket, count)| (bucket, count.min(u16::MAX as u32) as u16))
            .unzip();

        Ok(Self {
            id,
            space,
            features,
            frequencies,
        })
    }

    pub fn id(&self) -> SignatureId {
        self.id
    }

    pub fn with_id(mut self, id: SignatureId) -> Self {
        self.id = id;
        self
    }

    pub fn space(&self) -> HistogramSpace {
        self.space
    }

    pub fn features(&self) -> &[u32] {
        &self.features
    }

    pub fn frequencies(&self) -> &[u16] {
        &self.frequencies
    }

    /// Pixel count of the feature at `position`.
    pub fn frequency_at(&self, position: usize) -> f32 {
        self.frequencies.get(position).copied().unwrap_or(0) as f32
    }

    /// Pixel count recorded for `bucket`, zero when the bucket was not kept.
    pub fn frequency_of(&self, bucket: u32) -> u16 {
        self.features
            .binary_search(&bucket)
            .map(|pos| self.frequencies[pos])
            .unwrap_or(0)
    }

    pub fn total_weight(&self) -> f32 {
        self.frequencies.iter().map(|&f| f as f32).sum()
    }
}
