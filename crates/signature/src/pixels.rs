use crate::config::SignatureError;

/// Square RGB pixel buffer at a signature's working resolution.
///
/// Decoding and resampling happen upstream; this type only guarantees that
/// the byte length matches `side * side * 3`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    side: u32,
    rgb: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(side: u32, rgb: Vec<u8>) -> Result<Self, SignatureError> {
        let expected = (side as usize) * (side as usize) * 3;
        if side == 0 || rgb.len() != expected {
            return Err(SignatureError::InvalidPixelBuffer {
                side,
                len: rgb.len(),
            });
        }
        Ok(Self { side, rgb })
    }

    /// Uniformly coloured buffer.
    pub fn filled(side: u32, color: [u8; 3]) -> Self {
        Self::from_fn(side, |_, _| color)
    }

    /// Build a buffer by evaluating `f(x, y)` for every pixel in row order.
    pub fn from_fn<F>(side: u32, mut f: F) -> Self
    where
        F: FnMut(u32, u32) -> [u8; 3],
    {
        let mut rgb = Vec::with_capacity((side as usize) * (side as usize) * 3);
        for y in 0..side {
            for x in 0..side {
                rgb.extend_from_slice(&f(x, y));
            }
        }
        Self { side, rgb }
    }

    pub fn side(&self) -> u32 {
        self.side
    }

    pub fn pixel_count(&self) -> usize {
        (self.side as usize) * (self.side as usize)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.rgb
    }

    /// Pixels in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        self.rgb.chunks_exact(3).map(|p| [p[0], p[1], p[2]])
    }

    pub(crate) fn require_side(&self, expected: u32) -> Result<(), SignatureError> {
        if self.side != expected {
            return Err(SignatureError::ResolutionMismatch {
                expected,
                side: self.side,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_length() {
        let err = PixelBuffer::new(4, vec![0; 10]).unwrap_err();
        assert!(matches!(
            err,
            SignatureError::InvalidPixelBuffer { side: 4, len: 10 }
        ));
    }

    #[test]
    fn from_fn_is_row_major() {
        let buf = PixelBuffer::from_fn(2, |x, y| [x as u8, y as u8, 9]);
        let pixels: Vec<_> = buf.pixels().collect();
        assert_eq!(pixels, vec![[0, 0, 9], [1, 0, 9], [0, 1, 9], [1, 1, 9]]);
        assert_eq!(buf.pixel_count(), 4);
    }

    #[test]
    fn side_check() {
        let buf = PixelBuffer::filled(8, [1, 2, 3]);
        assert!(buf.require_side(8).is_ok());
        assert!(matches!(
            buf.require_side(16),
            Err(SignatureError::ResolutionMismatch { expected: 16, side: 8 })
        ));
    }
}
