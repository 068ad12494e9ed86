use crate::weights::WeightTable;
use crate::SignatureModel;

/// Weighted overlap of two signatures, in `0.0..=1.0`.
///
/// Shared features contribute the smaller of the two weights; the result is
/// `match / (total_a + total_b - match)` and does not depend on argument
/// order. Signatures with no weight at all compare as 0.
pub fn compare<A, B>(a: &A, b: &B, weights: &WeightTable) -> f32
where
    A: SignatureModel + ?Sized,
    B: SignatureModel + ?Sized,
{
    let (fa, fb) = (a.features(), b.features());
    let (mut i, mut j) = (0, 0);
    let mut matched = 0.0f32;
    while i < fa.len() && j < fb.len() {
        match fa[i].cmp(&fb[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                matched += a.weight_at(i, weights).min(b.weight_at(j, weights));
                i += 1;
                j += 1;
            }
        }
    }

    let union = a.total_weight(weights) + b.total_weight(weights) - matched;
    if union <= 0.0 {
        return 0.0;
    }
    matched / union
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::SignatureId;
    use crate::histogram::{HistogramSignature, HistogramSpace};
    use crate::integer::IntegerSignature;
    use crate::pixels::PixelBuffer;
    use crate::{Signature, SignatureKind};

    fn ints(features: &[u32]) -> IntegerSignature {
        IntegerSignature::new(SignatureId::Ephemeral(1), features.to_vec())
    }

    #[test]
    fn overlap_of_integer_sets() {
        let table = WeightTable::default();
        // match 2, union 3 + 3 - 2
        let score = compare(&ints(&[1, 2, 3]), &ints(&[2, 3, 4]), &table);
        assert!((score - 0.5).abs() < 1e-6);
        assert_eq!(compare(&ints(&[1]), &ints(&[2]), &table), 0.0);
        assert_eq!(compare(&ints(&[]), &ints(&[]), &table), 0.0);
    }

    #[test]
    fn histograms_with_unequal_counts_stay_in_range() {
        let table = WeightTable::default();
        let rgb = |features: Vec<u32>, counts: Vec<u16>| {
            HistogramSignature::new(SignatureId::Ephemeral(1), HistogramSpace::Rgb, features, counts)
                .unwrap()
        };
        let a = rgb(vec![5], vec![1000]);
        let b = rgb(vec![5, 6], vec![1, 9]);
        let ab = compare(&a, &b, &table);
        // bucket 5 shares min(1000, 1); union 1000 + 10 - 1
        assert!((ab - 1.0 / 1009.0).abs() < 1e-7);
        assert_eq!(ab, compare(&b, &a, &table));

        let c = rgb(vec![1, 2], vec![3, 7]);
        let d = rgb(vec![1, 2], vec![7, 3]);
        let cd = compare(&c, &d, &table);
        assert!((0.0..=1.0).contains(&cd));
        assert!((cd - 6.0 / 14.0).abs() < 1e-6);
    }

    #[test]
    fn identical_signatures_score_one() {
        let table = WeightTable::default();
        let pixels = PixelBuffer::from_fn(128, |x, y| [x as u8, (x + y) as u8, y as u8]);
        let sig =
            Signature::from_pixels(SignatureKind::Haar, SignatureId::Ephemeral(1), &pixels).unwrap();
        assert!((compare(&sig, &sig, &table) - 1.0).abs() < 1e-5);
    }
}
