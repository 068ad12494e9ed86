//! Calibrated coefficient weights for Haar signatures.
//!
//! Weights depend on the colour channel and on the coefficient's band,
//! `min(5, max(x, y))`, i.e. its quantised distance from the DC term. Band 0
//! is the DC weight, used only by the channel-average distance.
//!
//! Two calibration profiles exist. A process picks one at startup and shares
//! the resulting [`WeightTable`] read-only with every index and query.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::config::SignatureError;
use crate::haar::{CHANNEL_COUNT, PIXEL_BITS, PIXEL_COUNT, SIDE_BITS, SIDE_LENGTH};

/// Number of distinct radial bands, DC included.
pub const BAND_COUNT: usize = 6;

type Bands = [[f32; CHANNEL_COUNT]; BAND_COUNT];

//   Y      I      Q
const PHOTO_BANDS: Bands = [
    [5.00, 19.21, 34.37],
    [0.83, 1.26, 0.36],
    [1.01, 0.44, 0.45],
    [0.52, 0.53, 0.14],
    [0.47, 0.28, 0.18],
    [0.30, 0.14, 0.27],
];

const SKETCH_BANDS: Bands = [
    [4.04, 15.14, 22.62],
    [0.78, 0.92, 0.40],
    [0.46, 0.53, 0.63],
    [0.42, 0.26, 0.25],
    [0.41, 0.14, 0.15],
    [0.32, 0.07, 0.38],
];

/// Calibration profile for the weight table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightProfile {
    /// Scanned or photographic imagery.
    Photo,
    /// Hand-drawn or painted sketches.
    #[default]
    Sketch,
}

impl WeightProfile {
    fn bands(self) -> &'static Bands {
        match self {
            WeightProfile::Photo => &PHOTO_BANDS,
            WeightProfile::Sketch => &SKETCH_BANDS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WeightProfile::Photo => "photo",
            WeightProfile::Sketch => "sketch",
        }
    }
}

impl fmt::Display for WeightProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WeightProfile {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "photo" | "scan" | "0" => Ok(WeightProfile::Photo),
            "sketch" | "drawing" | "1" => Ok(WeightProfile::Sketch),
            other => Err(SignatureError::UnknownProfile(other.to_string())),
        }
    }
}

/// Immutable per-coefficient weight lookup.
///
/// Indexed by the packed coefficient id without its sign bit,
/// `channel << 14 | y << 7 | x`.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTable {
    profile: WeightProfile,
    dc: [f32; CHANNEL_COUNT],
    lookup: Box<[f32]>,
}

impl WeightTable {
    pub fn new(profile: WeightProfile) -> Self {
        let bands = profile.bands();
        let mut lookup = vec![0.0f32; CHANNEL_COUNT * PIXEL_COUNT];
        for channel in 0..CHANNEL_COUNT {
            for y in 0..SIDE_LENGTH {
                for x in 0..SIDE_LENGTH {
                    let cid = channel << PIXEL_BITS | y << SIDE_BITS | x;
                    let band = x.max(y).min(BAND_COUNT - 1);
                    lookup[cid] = bands[band][channel];
                }
            }
        }
        Self {
            profile,
            dc: bands[0],
            lookup: lookup.into_boxed_slice(),
        }
    }

    /// Process-wide table for `profile`, built on first use.
    pub fn shared(profile: WeightProfile) -> &'static WeightTable {
        static PHOTO: OnceLock<WeightTable> = OnceLock::new();
        static SKETCH: OnceLock<WeightTable> = OnceLock::new();
        match profile {
            WeightProfile::Photo => PHOTO.get_or_init(|| WeightTable::new(WeightProfile::Photo)),
            WeightProfile::Sketch => SKETCH.get_or_init(|| WeightTable::new(WeightProfile::Sketch)),
        }
    }

    pub fn profile(&self) -> WeightProfile {
        self.profile
    }

    /// Weight of a packed Haar feature id (sign bit included).
    ///
    /// Ids outside the Haar coefficient space weigh nothing.
    #[inline]
    pub fn coefficient(&self, packed: u32) -> f32 {
        self.lookup
            .get((packed >> 1) as usize)
            .copied()
            .unwrap_or(0.0)
    }

    /// DC weight of `channel`, used by the channel-average distance.
    #[inline]
    pub fn dc(&self, channel: usize) -> f32 {
        self.dc[channel]
    }

    pub fn dc_weights(&self) -> &[f32; CHANNEL_COUNT] {
        &self.dc
    }
}

impl Default for WeightTable {
    fn default() -> Self {
        WeightTable::new(WeightProfile::default())
    }
}
