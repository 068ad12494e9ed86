//! Image decoding and resampling into pixel buffers.

use image::imageops::FilterType;
use signature::{ContentHash, PixelBuffer, Signature, SignatureError, SignatureId, SignatureKind};

use crate::IngestError;

/// Decode `bytes` (PNG, JPEG, GIF, BMP or WebP), convert to RGB and resample
/// to a `side`x`side` buffer with a triangle filter.
///
/// The aspect ratio is not preserved.
pub fn decode_pixels(bytes: &[u8], side: u32) -> Result<PixelBuffer, IngestError> {
    let img = image::load_from_memory(bytes)?;
    let rgb = img
        .resize_exact(side, side, FilterType::Triangle)
        .to_rgb8();
    Ok(PixelBuffer::new(side, rgb.into_raw())?)
}

/// Extract a signature of `kind` from encoded image bytes.
///
/// When `id` is `None` the signature is keyed by the hash of `bytes`.
pub fn signature_from_image(
    kind: SignatureKind,
    id: Option<SignatureId>,
    bytes: &[u8],
) -> Result<Signature, IngestError> {
    let side = kind
        .working_side()
        .ok_or(SignatureError::NotExtractable { kind })?;
    let pixels = decode_pixels(bytes, side)?;
    let id = id.unwrap_or_else(|| ContentHash::of_bytes(bytes).into());
    Ok(Signature::from_pixels(kind, id, &pixels)?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use signature::{SignatureModel, HISTOGRAM_BUCKETS};
    use std::io::Cursor;

    /// PNG bytes for a `w`x`h` gradient shifted by `seed`.
    pub(crate) fn png(w: u32, h: u32, seed: u8) -> Vec<u8> {
        let img = RgbImage::from_fn(w, h, |x, y| {
            Rgb([
                (x as u8).wrapping_mul(3).wrapping_add(seed),
                (y as u8).wrapping_mul(5),
                ((x + y) as u8) ^ seed,
            ])
        });
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn decodes_to_requested_side() {
        let pixels = decode_pixels(&png(40, 25, 1), 16).unwrap();
        assert_eq!(pixels.side(), 16);
        assert_eq!(pixels.as_bytes().len(), 16 * 16 * 3);
    }

    #[test]
    fn solid_colour_survives_resampling() {
        let img = RgbImage::from_pixel(9, 9, Rgb([200, 10, 60]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();

        let pixels = decode_pixels(out.get_ref(), 32).unwrap();
        for p in pixels.pixels() {
            for (got, want) in p.iter().zip([200u8, 10, 60]) {
                assert!(got.abs_diff(want) <= 1, "{p:?}");
            }
        }
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = decode_pixels(b"definitely not an image", 128).unwrap_err();
        assert!(matches!(err, IngestError::Decode(_)));
    }

    #[test]
    fn extracts_each_image_kind() {
        let bytes = png(64, 48, 7);
        let haar = signature_from_image(SignatureKind::Haar, None, &bytes).unwrap();
        assert_eq!(haar.kind(), SignatureKind::Haar);
        assert_eq!(haar.hash(), Some(ContentHash::of_bytes(&bytes)));
        assert!(haar.features().len() <= 90);

        for kind in [SignatureKind::Color, SignatureKind::Rgb] {
            let sig = signature_from_image(kind, Some(SignatureId::Ephemeral(9)), &bytes).unwrap();
            assert_eq!(sig.kind(), kind);
            assert_eq!(sig.id(), SignatureId::Ephemeral(9));
            assert!(sig.features().len() <= HISTOGRAM_BUCKETS);
        }
    }

    #[test]
    fn integer_kind_is_not_extractable() {
        let err = signature_from_image(SignatureKind::Integer, None, &png(8, 8, 0)).unwrap_err();
        assert!(matches!(
            err,
            IngestError::Signature(SignatureError::NotExtractable { .. })
        ));
    }
}
