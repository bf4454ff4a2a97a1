//! Iterative soft thresholding (IST) reconstruction.
//!
//! Each pass transforms the zero-filled acquisition to the frequency
//! domain, moves everything above a fraction of the strongest coefficient
//! into an accumulator, clamps those coefficients to the cutoff, and goes
//! back to the time domain where the unsampled points are zeroed again.
//! The accumulator converges on a sparse spectrum consistent with the
//! measured points.

use crate::error::ReconError;
use log::{debug, info, warn};
use nus_core::{ComplexMatrix, SampleSchedule, Transformer};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_THRESHOLD: f64 = 0.9;
/// Floor reached by the adaptive fraction at the last iteration.
pub const ADAPTIVE_FLOOR: f64 = 0.5;
/// Iterations run at the full fraction before adaptive decay starts.
pub const ADAPTIVE_START: usize = 50;

/// How the per-iteration cutoff is derived and compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CutoffMode {
    /// Complex magnitude.
    #[default]
    Abs,
    /// Real part, only on the side of the dominant real extreme.
    Phased,
    /// Positive real excursions only.
    PhasedPositive,
}

impl CutoffMode {
    /// Reference value and the sign on which clamping operates.
    fn reference(self, buf: &[Complex64]) -> (f64, f64) {
        match self {
            CutoffMode::Abs => (
                buf.iter().fold(0.0f64, |m, z| m.max(z.norm())),
                1.0,
            ),
            CutoffMode::Phased => {
                let (lo, hi) = buf
                    .iter()
                    .fold((0.0f64, 0.0f64), |(lo, hi), z| (lo.min(z.re), hi.max(z.re)));
                if -lo > hi {
                    (-lo, -1.0)
                } else {
                    (hi, 1.0)
                }
            }
            CutoffMode::PhasedPositive => (buf.iter().fold(0.0f64, |m, z| m.max(z.re)), 1.0),
        }
    }

    /// Clamp coefficients above `cutoff` and add their excess to `acc`.
    /// Returns the number of clamped coefficients.
    fn clamp(self, buf: &mut [Complex64], acc: &mut [Complex64], cutoff: f64, sign: f64) -> usize {
        let mut clamped = 0;
        match self {
            CutoffMode::Abs => {
                for (z, a) in buf.iter_mut().zip(acc.iter_mut()) {
                    let mag = z.norm();
                    if mag > cutoff && mag > 0.0 {
                        let kept = *z * (cutoff / mag);
                        *a += *z - kept;
                        *z = kept;
                        clamped += 1;
                    }
                }
            }
            CutoffMode::Phased | CutoffMode::PhasedPositive => {
                for (z, a) in buf.iter_mut().zip(acc.iter_mut()) {
                    let signed = z.re * sign;
                    if signed > cutoff {
                        let excess = (signed - cutoff) * sign;
                        a.re += excess;
                        z.re -= excess;
                        clamped += 1;
                    }
                }
            }
        }
        clamped
    }
}

/// IST parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IstConfig {
    /// Fraction of the reference coefficient kept per pass, in (0, 1).
    pub threshold: f64,
    pub loops: usize,
    pub mode: CutoffMode,
    /// Decay the fraction linearly toward 0.5 after iteration 50.
    pub adaptive: bool,
    /// Return a time-domain result with the measured points restored.
    pub time_domain: bool,
    /// Caller already zeroed the unsampled points; skip that on the first pass.
    pub zeroed_upstream: bool,
    /// `(ph0, ph1)` in degrees per dimension, applied after each forward transform.
    pub phase: Option<Vec<(f64, f64)>>,
}

impl Default for IstConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            loops: 100,
            mode: CutoffMode::Abs,
            adaptive: false,
            time_domain: false,
            zeroed_upstream: false,
            phase: None,
        }
    }
}

impl IstConfig {
    /// Replace out-of-range tuning values with safe ones.
    pub fn sanitized(mut self) -> Self {
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            warn!(
                "IST threshold {} outside (0, 1), using {}",
                self.threshold, DEFAULT_THRESHOLD
            );
            self.threshold = DEFAULT_THRESHOLD;
        }
        if self.loops == 0 {
            warn!("IST loop count 0, using 1");
            self.loops = 1;
        }
        self
    }
}

/// Per-run record of the cutoffs applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IstReport {
    pub cutoffs: Vec<f64>,
    pub fractions: Vec<f64>,
    /// Coefficients clamped per iteration.
    pub clamped: Vec<usize>,
}

impl IstReport {
    pub fn iterations(&self) -> usize {
        self.cutoffs.len()
    }
}

pub struct Ist {
    config: IstConfig,
    schedule: Option<Arc<SampleSchedule>>,
}

impl Ist {
    pub fn new(config: IstConfig) -> Self {
        Self {
            config: config.sanitized(),
            schedule: None,
        }
    }

    pub fn with_schedule(mut self, schedule: Arc<SampleSchedule>) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn config(&self) -> &IstConfig {
        &self.config
    }

    /// Fraction used at iteration `i` (0-based).
    pub fn fraction_at(&self, i: usize) -> f64 {
        let c = &self.config;
        let last = c.loops.saturating_sub(1);
        if c.adaptive && last > ADAPTIVE_START && i > ADAPTIVE_START {
            let t = (i - ADAPTIVE_START) as f64 / (last - ADAPTIVE_START) as f64;
            c.threshold + (ADAPTIVE_FLOOR - c.threshold) * t
        } else {
            c.threshold
        }
    }

    fn apply_phase(&self, data: &mut ComplexMatrix, direction: f64) {
        if let Some(phase) = &self.config.phase {
            for (d, &(ph0, ph1)) in phase.iter().enumerate() {
                data.phase_dim(d, direction * ph0, direction * ph1);
            }
        }
    }

    fn check(&self, data: &ComplexMatrix) -> Result<&SampleSchedule, ReconError> {
        let schedule = self.schedule.as_deref().ok_or(ReconError::MissingSchedule)?;
        if schedule.grid_len() != data.len() {
            return Err(ReconError::Config(format!(
                "schedule grid {:?} does not cover data {:?}",
                schedule.sizes(),
                data.sizes()
            )));
        }
        if let Some(phase) = &self.config.phase {
            if phase.len() != data.ndim() {
                return Err(ReconError::Config(format!(
                    "{} phase pairs for {} dimensions",
                    phase.len(),
                    data.ndim()
                )));
            }
        }
        Ok(schedule)
    }

    /// Reconstruct `data` in place.
    ///
    /// `data` holds the acquisition on the full grid (N-D, or a 1-D
    /// row-major weave of it). On return it holds the frequency-domain
    /// accumulator, or with `time_domain` its inverse transform with every
    /// measured point restored from the input.
    pub fn reconstruct(&self, data: &mut ComplexMatrix) -> Result<IstReport, ReconError> {
        let schedule = self.check(data)?;
        let complement = schedule.complement();
        let loops = self.config.loops;
        let mode = self.config.mode;
        info!(
            "IST: {} points, {} sampled, {} loops, threshold {}",
            data.len(),
            schedule.len(),
            loops,
            self.config.threshold
        );

        let original = data.clone();
        let mut acc = ComplexMatrix::new(data.sizes())?;
        let mut transformer = Transformer::new();
        let mut report = IstReport::default();

        for i in 0..loops {
            if i > 0 || !self.config.zeroed_upstream {
                data.zero_offsets(complement);
            }
            data.fft(&mut transformer);
            self.apply_phase(data, 1.0);

            let fraction = self.fraction_at(i);
            let (reference, sign) = mode.reference(data.as_slice());
            let cutoff = reference * fraction;
            let clamped = mode.clamp(data.as_mut_slice(), acc.as_mut_slice(), cutoff, sign);
            debug!(
                "IST iteration {}: fraction {:.4} cutoff {:.6e} clamped {}",
                i, fraction, cutoff, clamped
            );
            report.cutoffs.push(cutoff);
            report.fractions.push(fraction);
            report.clamped.push(clamped);
            if reference <= 0.0 {
                debug!("IST: residual exhausted after {} iterations", i + 1);
                break;
            }

            if i + 1 < loops {
                self.apply_phase(data, -1.0);
                data.ifft(&mut transformer);
                data.zero_offsets(complement);
            }
        }

        if self.config.time_domain {
            self.apply_phase(&mut acc, -1.0);
            acc.ifft(&mut transformer);
            for &o in schedule.sampled_offsets() {
                acc[o] = original[o];
            }
        }
        *data = acc;
        Ok(report)
    }

    /// Reconstruct a 1-D (or weave-ordered) vector in place.
    pub fn reconstruct_vector(&self, data: &mut [Complex64]) -> Result<IstReport, ReconError> {
        let mut m = ComplexMatrix::from_vec(&[data.len()], data.to_vec())?;
        let report = self.reconstruct(&mut m)?;
        data.copy_from_slice(m.as_slice());
        Ok(report)
    }
}
