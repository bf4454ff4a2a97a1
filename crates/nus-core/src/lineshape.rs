//! Analytic lineshapes: Lorentzian, Gaussian and their linear blend.
//!
//! All shapes are parameterised by full width at half height (`width`, in
//! points) and peak at 1.0 for `x = 0`.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::{LN_2, PI};

/// Lorentzian/Gaussian blend. `gaussian_fraction = 0` is a pure
/// Lorentzian, `1` a pure Gaussian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lineshape {
    pub gaussian_fraction: f64,
}

impl Default for Lineshape {
    fn default() -> Self {
        Self::lorentzian()
    }
}

impl Lineshape {
    pub fn lorentzian() -> Self {
        Self {
            gaussian_fraction: 0.0,
        }
    }

    pub fn gaussian() -> Self {
        Self {
            gaussian_fraction: 1.0,
        }
    }

    /// Blend clamped into `[0, 1]`.
    pub fn blend(gaussian_fraction: f64) -> Self {
        Self {
            gaussian_fraction: gaussian_fraction.clamp(0.0, 1.0),
        }
    }

    /// Absorption value at offset `x` from the centre.
    pub fn value(&self, x: f64, width: f64) -> f64 {
        let g = self.gaussian_fraction;
        (1.0 - g) * lorentzian(x, width) + g * gaussian(x, width)
    }

    /// Complex value: absorption plus the dispersion part of the
    /// Lorentzian component, matching the spectrum of a decaying complex
    /// exponential under the forward FFT sign convention. The Gaussian
    /// component is treated as pure absorption.
    pub fn complex_value(&self, x: f64, width: f64) -> Complex64 {
        let g = self.gaussian_fraction;
        let lor = if width > 0.0 {
            Complex64::new(1.0, 0.0) / Complex64::new(1.0, 2.0 * x / width)
        } else if x == 0.0 {
            Complex64::new(1.0, 0.0)
        } else {
            Complex64::new(0.0, 0.0)
        };
        lor * (1.0 - g) + Complex64::new(g * gaussian(x, width), 0.0)
    }

    /// Integral of the unit-height shape divided by its width.
    pub fn area_factor(&self) -> f64 {
        let g = self.gaussian_fraction;
        (1.0 - g) * PI / 2.0 + g * (PI / (4.0 * LN_2)).sqrt()
    }
}

pub fn lorentzian(x: f64, width: f64) -> f64 {
    if width <= 0.0 {
        return if x == 0.0 { 1.0 } else { 0.0 };
    }
    let u = 2.0 * x / width;
    1.0 / (1.0 + u * u)
}

pub fn gaussian(x: f64, width: f64) -> f64 {
    if width <= 0.0 {
        return if x == 0.0 { 1.0 } else { 0.0 };
    }
    (-4.0 * LN_2 * x * x / (width * width)).exp()
}
