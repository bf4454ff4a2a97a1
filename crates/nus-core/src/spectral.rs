//! 1-D spectral primitives: FFT / inverse FFT, phase correction and
//! magnitude thresholding on complex sequences.
//!
//! The transforms follow the FFTPACK conventions used throughout NMR
//! processing:
//!
//! ```text
//!   forward:  X[k] = Σ x[n]·exp(−j·2π·k·n/N)     (unnormalized)
//!   inverse:  x[n] = (1/N)·Σ X[k]·exp(+j·2π·k·n/N)
//! ```
//!
//! No shift is applied in either direction; callers that need the zero
//! frequency in the middle do it themselves.

use num_complex::Complex64;
use rustfft::{num_traits::Zero, Fft, FftPlanner};
use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::Arc;

/// Next power of two ≥ `n`.
pub fn next_power_of_two(n: usize) -> usize {
    if n <= 1 {
        return 1;
    }
    1 << (usize::BITS - (n - 1).leading_zeros())
}

/// Smallest FFT-efficient size ≥ `n` (of the form 2^a · 3^b · 5^c).
pub fn good_fft_size(n: usize) -> usize {
    let mut m = n.max(1);
    loop {
        let mut r = m;
        for f in [2, 3, 5] {
            while r % f == 0 {
                r /= f;
            }
        }
        if r == 1 {
            return m;
        }
        m += 1;
    }
}

/// Re-usable FFT engine.
///
/// Holds planned forward/inverse transforms per length so repeated
/// transforms of the same size (reconstruction loops, per-line N-D
/// transforms) never re-plan.
pub struct Transformer {
    planner: FftPlanner<f64>,
    forward: HashMap<usize, Arc<dyn Fft<f64>>>,
    inverse: HashMap<usize, Arc<dyn Fft<f64>>>,
    scratch: Vec<Complex64>,
}

impl Default for Transformer {
    fn default() -> Self {
        Self::new()
    }
}

impl Transformer {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            forward: HashMap::new(),
            inverse: HashMap::new(),
            scratch: Vec::new(),
        }
    }

    fn plan(&mut self, n: usize, inverse: bool) -> Arc<dyn Fft<f64>> {
        let planner = &mut self.planner;
        let cache = if inverse {
            &mut self.inverse
        } else {
            &mut self.forward
        };
        cache
            .entry(n)
            .or_insert_with(|| {
                if inverse {
                    planner.plan_fft_inverse(n)
                } else {
                    planner.plan_fft_forward(n)
                }
            })
            .clone()
    }

    /// Unnormalized forward FFT in place.
    pub fn fft(&mut self, buf: &mut [Complex64]) {
        if buf.is_empty() {
            return;
        }
        let plan = self.plan(buf.len(), false);
        self.scratch
            .resize(plan.get_inplace_scratch_len(), Complex64::zero());
        plan.process_with_scratch(buf, &mut self.scratch);
    }

    /// Inverse FFT in place, normalized by 1/N.
    pub fn ifft(&mut self, buf: &mut [Complex64]) {
        if buf.is_empty() {
            return;
        }
        let plan = self.plan(buf.len(), true);
        self.scratch
            .resize(plan.get_inplace_scratch_len(), Complex64::zero());
        plan.process_with_scratch(buf, &mut self.scratch);
        let inv_n = 1.0 / buf.len() as f64;
        for z in buf.iter_mut() {
            *z *= inv_n;
        }
    }
}

/// Apply zero- and first-order phase correction (degrees) in place.
///
/// Point `i` of `n` is rotated by `ph0 + ph1·i/n`.
pub fn phase(buf: &mut [Complex64], ph0_degrees: f64, ph1_degrees: f64) {
    let n = buf.len();
    if n == 0 {
        return;
    }
    let ph0 = ph0_degrees * PI / 180.0;
    let ph1 = ph1_degrees * PI / 180.0;
    for (i, z) in buf.iter_mut().enumerate() {
        let angle = ph0 + ph1 * i as f64 / n as f64;
        *z *= Complex64::from_polar(1.0, angle);
    }
}

/// Clamp every coefficient whose magnitude exceeds `cutoff` to `cutoff`
/// (keeping its phase) and return the removed excess per point.
pub fn threshold_magnitude(buf: &mut [Complex64], cutoff: f64) -> Vec<Complex64> {
    buf.iter_mut()
        .map(|z| {
            let mag = z.norm();
            if mag > cutoff && mag > 0.0 {
                let kept = *z * (cutoff / mag);
                let excess = *z - kept;
                *z = kept;
                excess
            } else {
                Complex64::zero()
            }
        })
        .collect()
}

/// Index and value of the largest magnitude, or `None` for an empty slice.
pub fn max_magnitude(buf: &[Complex64]) -> Option<(usize, f64)> {
    buf.iter()
        .map(|z| z.norm())
        .enumerate()
        .fold(None, |best, (i, m)| match best {
            Some((_, bm)) if bm >= m => best,
            _ => Some((i, m)),
        })
}
