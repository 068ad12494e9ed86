//! Haar wavelet signatures.
//!
//! A 128x128 RGB thumbnail is converted to YIQ, each channel is decomposed
//! with a 2D Haar pyramid, and the 30 largest non-DC coefficients per channel
//! are kept as packed ids `((channel << 14 | position) << 1) | sign`.

use crate::config::SignatureError;
use crate::hash::SignatureId;
use crate::pixels::PixelBuffer;
use crate::weights::WeightTable;

pub const SIDE_BITS: usize = 7;
pub const SIDE_LENGTH: usize = 1 << SIDE_BITS;
pub const PIXEL_BITS: usize = SIDE_BITS << 1;
pub const PIXEL_COUNT: usize = 1 << PIXEL_BITS;
/// Packed ids per channel, sign bit included.
pub const CHANNEL_SIZE: usize = PIXEL_COUNT << 1;
pub const CHANNEL_COUNT: usize = 3;
/// Size of the packed coefficient id space.
pub const COEFFICIENT_SPACE: u32 = (CHANNEL_COUNT * CHANNEL_SIZE) as u32;
/// Significant coefficients kept per channel.
pub const COEFFICIENT_COUNT: usize = 30;

/// Chroma averages below this sum mark an image as grayscale
/// (6/1000 of full pixel scale in channel-average units).
const GRAYSCALE_CHROMA_LIMIT: f32 = 0.006 * 255.0 / SIDE_LENGTH as f32;

/// Pack `(channel, position, sign)` into a Haar feature id.
#[inline]
pub fn pack_coefficient(channel: u32, position: u32, positive: bool) -> u32 {
    ((channel << PIXEL_BITS | position) << 1) | positive as u32
}

/// Inverse of [`pack_coefficient`].
#[inline]
pub fn unpack_coefficient(id: u32) -> (u32, u32, bool) {
    let positive = id & 1 == 1;
    let cid = id >> 1;
    (cid >> PIXEL_BITS, cid & (PIXEL_COUNT as u32 - 1), positive)
}

/// Haar wavelet signature: 3 channel averages plus up to 90 packed ids.
#[derive(Debug, Clone, PartialEq)]
pub struct HaarSignature {
    id: SignatureId,
    averages: [f32; CHANNEL_COUNT],
    features: Vec<u32>,
}

impl HaarSignature {
    /// Assemble a signature from stored parts.
    ///
    /// Features are sorted and deduplicated; ids outside the coefficient
    /// space are rejected.
    pub fn new(
        id: SignatureId,
        averages: [f32; CHANNEL_COUNT],
        mut features: Vec<u32>,
    ) -> Result<Self, SignatureError> {
        if let Some(&feature) = features.iter().find(|&&f| f >= COEFFICIENT_SPACE) {
            return Err(SignatureError::FeatureOutOfRange {
                feature,
                space: COEFFICIENT_SPACE,
            });
        }
        features.sort_unstable();
        features.dedup();
        Ok(Self {
            id,
            averages,
            features,
        })
    }

    /// Extract a signature from a 128x128 pixel buffer.
    pub fn from_pixels(id: SignatureId, pixels: &PixelBuffer) -> Result<Self, SignatureError> {
        pixels.require_side(SIDE_LENGTH as u32)?;

        let mut channels = rgb_to_yiq(pixels);
        let mut averages = [0.0f32; CHANNEL_COUNT];
        let mut features = Vec::with_capacity(CHANNEL_COUNT * COEFFICIENT_COUNT);

        for (channel, data) in channels.iter_mut().enumerate() {
            haar_2d(data);
            averages[channel] = (data[0] / PIXEL_COUNT as f64) as f32;

            let mut positions = significant_positions(data, COEFFICIENT_COUNT);
            positions.sort_unstable();
            features.extend(positions.into_iter().map(|pos| {
                pack_coefficient(channel as u32, pos, data[pos as usize] > 0.0)
            }));
        }

        Ok(Self {
            id,
            averages,
            features,
        })
    }

    pub fn id(&self) -> SignatureId {
        self.id
    }

    pub fn with_id(mut self, id: SignatureId) -> Self {
        self.id = id;
        self
    }

    pub fn averages(&self) -> &[f32; CHANNEL_COUNT] {
        &self.averages
    }

    pub fn features(&self) -> &[u32] {
        &self.features
    }

    pub fn total_weight(&self, weights: &WeightTable) -> f32 {
        self.features.iter().map(|&f| weights.coefficient(f)).sum()
    }

    /// True when both chroma averages are close to zero.
    pub fn is_grayscale(&self) -> bool {
        self.averages[1].abs() + self.averages[2].abs() < GRAYSCALE_CHROMA_LIMIT
    }
}

/// Split an RGB buffer into Y, I and Q planes.
pub(crate) fn rgb_to_yiq(pixels: &PixelBuffer) -> [Vec<f64>; CHANNEL_COUNT] {
    let n = pixels.pixel_count();
    let mut y_plane = Vec::with_capacity(n);
    let mut i_plane = Vec::with_capacity(n);
    let mut q_plane = Vec::with_capacity(n);
    for pixel in pixels.pixels() {
        let [y, i, q] = yiq(pixel);
        y_plane.push(y);
        i_plane.push(i);
        q_plane.push(q);
    }
    [y_plane, i_plane, q_plane]
}

#[inline]
pub(crate) fn yiq([r, g, b]: [u8; 3]) -> [f64; 3] {
    let (r, g, b) = (r as f64, g as f64, b as f64);
    [
        0.299 * r + 0.587 * g + 0.114 * b,
        0.596 * r - 0.275 * g - 0.321 * b,
        0.212 * r - 0.523 * g + 0.311 * b,
    ]
}

/// In-place 2D Haar decomposition of one 128x128 channel (rows, then columns).
pub fn haar_2d(data: &mut [f64]) {
    debug_assert_eq!(data.len(), PIXEL_COUNT);
    let mut line = [0.0f64; SIDE_LENGTH];
    let mut scratch = [0.0f64; SIDE_LENGTH];

    for row in data.chunks_exact_mut(SIDE_LENGTH) {
        haar_1d(row, &mut scratch);
    }

    for col in 0..SIDE_LENGTH {
        for (y, slot) in line.iter_mut().enumerate() {
            *slot = data[y * SIDE_LENGTH + col];
        }
        haar_1d(&mut line, &mut scratch);
        for (y, value) in line.iter().enumerate() {
            data[y * SIDE_LENGTH + col] = *value;
        }
    }
}

/// One pyramid pass: sums move to the front, scaled differences behind them.
fn haar_1d(line: &mut [f64], scratch: &mut [f64]) {
    let mut c = 1.0f64;
    let mut h = line.len();
    while h > 1 {
        let half = h >> 1;
        c *= std::f64::consts::FRAC_1_SQRT_2;
        for k in 0..half {
            let a = line[2 * k];
            let b = line[2 * k + 1];
            scratch[k] = a + b;
            scratch[half + k] = (a - b) * c;
        }
        line[..h].copy_from_slice(&scratch[..h]);
        h = half;
    }
    line[0] *= c;
}

/// Positions of the `k` largest-magnitude values, DC (position 0) excluded.
///
/// Bounded min-heap keyed by `|value|`: seeded with positions `1..=k`, then
/// every later position replaces the root when its magnitude is larger.
/// Output order is heap order.
pub fn significant_positions(values: &[f64], k: usize) -> Vec<u32> {
    let available = values.len().saturating_sub(1);
    let k = k.min(available);
    if k == 0 {
        return Vec::new();
    }

    let mag = |pos: u32| values[pos as usize].abs();
    let mut heap: Vec<u32> = Vec::with_capacity(k);

    for pos in 1..=k as u32 {
        heap.push(pos);
        let mut child = heap.len() - 1;
        while child > 0 {
            let parent = (child - 1) / 2;
            if mag(heap[child]) < mag(heap[parent]) {
                heap.swap(child, parent);
                child = parent;
            } else {
                break;
            }
        }
    }

    for pos in (k + 1) as u32..values.len() as u32 {
        let candidate = mag(pos);
        if candidate <= mag(heap[0]) {
            continue;
        }
        heap[0] = pos;
        let mut current = 0;
        loop {
            let left = 2 * current + 1;
            if left >= k {
                break;
            }
            let mut smallest = left;
            if left + 1 < k && mag(heap[left + 1]) < mag(heap[left]) {
                smallest = left + 1;
            }
            if mag(heap[smallest]) < candidate {
                heap.swap(current, smallest);
                current = smallest;
            } else {
                break;
            }
        }
    }

    heap
}
