//! Multiplicative (Gold ratio) deconvolution of one region.
//!
//! Starting from the observed data, each iteration convolves the estimate
//! with the PSF and rescales every retained point by `observed / model`.
//! The update keeps the estimate non-negative and sharpens lines toward
//! point sources; points at or below the threshold are never updated.

use crate::error::PickError;
use crate::psf::Psf;
use nus_core::{Convolver, Mask, RealMatrix};

/// Floor for the model value in the ratio update.
pub const EPSILON: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct Deconvolution {
    pub estimate: RealMatrix,
    /// Points excluded from the update (observed value at or below threshold).
    pub skipped: Mask,
    /// Σ|observed − estimate ⊛ psf| / Σ|observed| over retained points.
    pub ratio: f64,
}

pub fn deconvolve(
    observed: &RealMatrix,
    psf: &Psf,
    threshold: f64,
    iterations: usize,
) -> Result<Deconvolution, PickError> {
    let mut convolver = Convolver::new(observed.sizes(), psf.matrix())?;
    let mut skipped = observed.mask();
    let mut estimate = RealMatrix::new(observed.sizes())?;
    for o in 0..observed.len() {
        if observed[o] > threshold {
            estimate[o] = observed[o];
        } else {
            skipped[o] = true;
        }
    }

    for _ in 0..iterations {
        let model = convolver.convolve(&estimate)?;
        for o in 0..estimate.len() {
            if !skipped[o] {
                estimate[o] *= observed[o] / model[o].max(EPSILON);
            }
        }
    }

    let model = convolver.convolve(&estimate)?;
    let (residual, total) = (0..observed.len())
        .filter(|&o| !skipped[o])
        .fold((0.0, 0.0), |(r, t), o| {
            (r + (observed[o] - model[o]).abs(), t + observed[o].abs())
        });
    let ratio = if total > 0.0 { residual / total } else { 0.0 };

    Ok(Deconvolution {
        estimate,
        skipped,
        ratio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nus_core::{convolve, Lineshape};

    #[test]
    fn test_impulse_is_sharpened() {
        let psf = Psf::new(&[4.0], Lineshape::lorentzian()).unwrap();
        let mut impulse = RealMatrix::new(&[64]).unwrap();
        impulse[32] = 100.0;
        let observed = convolve(&impulse, psf.matrix()).unwrap();

        let result = deconvolve(&observed, &psf, 0.5, 200).unwrap();
        let (pos, top) = result.estimate.max_value();
        assert_eq!(pos, 32);
        // The peak concentrates well beyond the blurred maximum.
        assert!(top > 3.0 * observed[32], "{} vs {}", top, observed[32]);
        assert!(result.ratio < 0.1, "ratio {}", result.ratio);
        assert!(result.skipped[0]);
        assert!(!result.skipped[32]);
    }

    #[test]
    fn test_sub_threshold_points_stay_zero() {
        let psf = Psf::new(&[2.0], Lineshape::lorentzian()).unwrap();
        let observed = RealMatrix::from_vec(&[5], vec![0.1, 1.0, 5.0, 1.0, 0.1]).unwrap();
        let result = deconvolve(&observed, &psf, 0.5, 10).unwrap();
        assert_eq!(result.estimate[0], 0.0);
        assert_eq!(result.estimate[4], 0.0);
        assert_eq!(result.skipped.count_set(), 2);
    }
}
