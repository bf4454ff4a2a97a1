//! Point-spread function: the sampled response of one point source.

use crate::error::PickError;
use nus_core::{IndexIter, Lineshape, RealMatrix};

/// Half extent of the PSF in widths.
const PSF_EXTENT: f64 = 3.0;

/// Points the PSF spans along a dimension of `width`.
pub fn footprint_len(width: f64) -> usize {
    ((PSF_EXTENT * width).ceil() as usize)
        .saturating_mul(2)
        .saturating_add(1)
}

/// N-D PSF built from a lineshape and a width per dimension, normalized
/// to unit sum. The centre sits at index `half_extent()`.
#[derive(Debug, Clone)]
pub struct Psf {
    matrix: RealMatrix,
    widths: Vec<f64>,
    lineshape: Lineshape,
    half: Vec<usize>,
    peak: f64,
}

impl Psf {
    pub fn new(widths: &[f64], lineshape: Lineshape) -> Result<Self, PickError> {
        if widths.is_empty() || widths.iter().any(|w| !(w.is_finite() && *w > 0.0)) {
            return Err(PickError::Config(format!("invalid PSF widths {:?}", widths)));
        }
        let half: Vec<usize> = widths
            .iter()
            .map(|w| (PSF_EXTENT * w).ceil() as usize)
            .collect();
        let sizes: Vec<usize> = half.iter().map(|h| 2 * h + 1).collect();
        let values: Vec<f64> = IndexIter::new(sizes.clone())
            .map(|index| {
                index
                    .iter()
                    .zip(&half)
                    .zip(widths)
                    .map(|((&i, &h), &w)| lineshape.value(i as f64 - h as f64, w))
                    .product::<f64>()
            })
            .collect();
        let mut matrix = RealMatrix::from_vec(&sizes, values)?;
        let total = matrix.sum();
        matrix.scale(1.0 / total);
        let peak = matrix.get(&half)?;
        Ok(Self {
            matrix,
            widths: widths.to_vec(),
            lineshape,
            half,
            peak,
        })
    }

    pub fn matrix(&self) -> &RealMatrix {
        &self.matrix
    }

    pub fn widths(&self) -> &[f64] {
        &self.widths
    }

    pub fn lineshape(&self) -> Lineshape {
        self.lineshape
    }

    pub fn ndim(&self) -> usize {
        self.widths.len()
    }

    /// Points from the centre to the edge, per dimension.
    pub fn half_extent(&self) -> &[usize] {
        &self.half
    }

    /// Full extent per dimension.
    pub fn footprint(&self) -> &[usize] {
        self.matrix.sizes()
    }

    /// Value at the centre.
    pub fn peak_value(&self) -> f64 {
        self.peak
    }

    /// Value at a signed offset from the centre, 0 outside the footprint.
    pub fn value_at(&self, offset: &[isize]) -> f64 {
        let mut index = Vec::with_capacity(offset.len());
        for (&o, &h) in offset.iter().zip(&self.half) {
            let i = o + h as isize;
            if i < 0 || i as usize > 2 * h {
                return 0.0;
            }
            index.push(i as usize);
        }
        self.matrix.get(&index).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_psf_sums_to_one() {
        let psf = Psf::new(&[4.0], Lineshape::lorentzian()).unwrap();
        assert!((psf.matrix().sum() - 1.0).abs() < 1e-12);
        assert_eq!(psf.footprint(), &[25]);
        assert_eq!(psf.half_extent(), &[12]);
    }

    #[test]
    fn test_psf_2d_is_separable_and_centred() {
        let psf = Psf::new(&[3.0, 2.0], Lineshape::blend(0.5)).unwrap();
        assert!((psf.matrix().sum() - 1.0).abs() < 1e-12);
        let (offset, max) = psf.matrix().max_value();
        assert_eq!(psf.matrix().shape().indices_of(offset), vec![9, 6]);
        assert!((max - psf.peak_value()).abs() < 1e-15);
        // Half height one half-width out along each axis.
        assert!((psf.value_at(&[0, 1]) / psf.peak_value() - 0.5).abs() < 1e-12);
        assert!((psf.value_at(&[0, -1]) / psf.peak_value() - 0.5).abs() < 1e-12);
        assert_eq!(psf.value_at(&[10, 0]), 0.0);
    }

    #[test]
    fn test_rejects_bad_widths() {
        assert!(Psf::new(&[], Lineshape::lorentzian()).is_err());
        assert!(Psf::new(&[0.0], Lineshape::lorentzian()).is_err());
    }
}
