//! Peak-picker options.

use crate::error::PickError;
use crate::psf::footprint_len;
use nus_core::convolve::MAX_CONVOLVE_RANK;
use nus_core::Lineshape;
use serde::{Deserialize, Serialize};

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_MAX_WINDOW: usize = 256;

/// Options for [`crate::ConvolutionPicker`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickConfig {
    /// Intensity threshold in data units.
    pub threshold: f64,
    /// Deconvolution iterations per region.
    pub iterations: usize,
    /// PSF full width at half height per dimension, in points.
    pub widths: Vec<f64>,
    pub lineshape: Lineshape,
    /// Merge distance in widths; also scales the suppression box.
    pub squash: f64,
    pub workers: usize,
    /// Largest tile extent per dimension.
    pub max_window: usize,
}

impl Default for PickConfig {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            iterations: 50,
            widths: Vec::new(),
            lineshape: Lineshape::default(),
            squash: 1.0,
            workers: DEFAULT_WORKERS,
            max_window: DEFAULT_MAX_WINDOW,
        }
    }
}

impl PickConfig {
    pub fn validate(&self) -> Result<(), PickError> {
        if self.iterations == 0 {
            return Err(PickError::Config("iterations must be at least 1".into()));
        }
        if self.widths.is_empty() || self.widths.len() > MAX_CONVOLVE_RANK {
            return Err(PickError::Config(format!(
                "need 1 to {} widths, got {}",
                MAX_CONVOLVE_RANK,
                self.widths.len()
            )));
        }
        if let Some(w) = self.widths.iter().find(|w| !(w.is_finite() && **w > 0.0)) {
            return Err(PickError::Config(format!("width {} must be positive", w)));
        }
        if let Some(f) = self
            .widths
            .iter()
            .map(|&w| footprint_len(w))
            .find(|&f| f >= self.max_window)
        {
            return Err(PickError::Config(format!(
                "window {} cannot hold a PSF footprint of {}",
                self.max_window, f
            )));
        }
        if !(self.squash.is_finite() && self.squash > 0.0) {
            return Err(PickError::Config(format!(
                "squash {} must be positive",
                self.squash
            )));
        }
        if !(self.threshold.is_finite() && self.threshold >= 0.0) {
            return Err(PickError::Config(format!(
                "threshold {} must be finite and non-negative",
                self.threshold
            )));
        }
        if self.workers == 0 {
            return Err(PickError::Config("workers must be at least 1".into()));
        }
        Ok(())
    }
}
