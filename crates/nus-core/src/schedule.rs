//! Non-uniform sampling schedules.
//!
//! A schedule is the ordered, immutable list of grid points that were
//! actually acquired. Points are index tuples over the indirect grid and
//! are mapped to row-major offsets, so an N-D acquisition flattened in
//! row-major ("weave") order can be treated as a 1-D vector.
//!
//! The complement (grid points never acquired) is what every
//! reconstruction zeroes between iterations. It is derived lazily on
//! first use and cached for the life of the schedule.

use crate::matrix::{Mask, MatrixError};
use log::{debug, warn};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f64::consts::PI;
use std::fmt::Write as _;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScheduleError {
    #[error("schedule is empty")]
    Empty,
    #[error("sample {index:?} lies outside grid {sizes:?}")]
    OutOfGrid { index: Vec<usize>, sizes: Vec<usize> },
    #[error("sample {0:?} is listed twice")]
    Duplicate(Vec<usize>),
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("cannot draw {samples} samples from a grid of {size}")]
    Generation { samples: usize, size: usize },
    #[error(transparent)]
    Matrix(#[from] MatrixError),
}

/// Acquired grid points of a non-uniformly sampled experiment.
#[derive(Debug)]
pub struct SampleSchedule {
    sizes: Vec<usize>,
    samples: Vec<Vec<usize>>,
    offsets: Vec<usize>,
    complement: OnceLock<Vec<usize>>,
}

impl Clone for SampleSchedule {
    fn clone(&self) -> Self {
        // A clone is a new schedule object and derives its own complement.
        Self {
            sizes: self.sizes.clone(),
            samples: self.samples.clone(),
            offsets: self.offsets.clone(),
            complement: OnceLock::new(),
        }
    }
}

impl SampleSchedule {
    /// Build a schedule over a grid of `sizes` from acquired index tuples.
    pub fn new(sizes: &[usize], samples: Vec<Vec<usize>>) -> Result<Self, ScheduleError> {
        if samples.is_empty() {
            return Err(ScheduleError::Empty);
        }
        if sizes.is_empty() || sizes.iter().any(|&n| n == 0) {
            return Err(MatrixError::InvalidShape(sizes.to_vec()).into());
        }
        let total: usize = sizes.iter().product();
        let mut seen = vec![false; total];
        let mut offsets = Vec::with_capacity(samples.len());
        for index in &samples {
            if index.len() != sizes.len() || index.iter().zip(sizes).any(|(i, n)| i >= n) {
                return Err(ScheduleError::OutOfGrid {
                    index: index.clone(),
                    sizes: sizes.to_vec(),
                });
            }
            let offset = row_major_offset(sizes, index);
            if seen[offset] {
                return Err(ScheduleError::Duplicate(index.clone()));
            }
            seen[offset] = true;
            offsets.push(offset);
        }
        Ok(Self {
            sizes: sizes.to_vec(),
            samples,
            offsets,
            complement: OnceLock::new(),
        })
    }

    /// 1-D schedule from acquired point indices.
    pub fn one_d(size: usize, indices: &[usize]) -> Result<Self, ScheduleError> {
        Self::new(&[size], indices.iter().map(|&i| vec![i]).collect())
    }

    /// Parse a nuslist: one acquired point per line, one whitespace
    /// separated index per indirect dimension. Blank lines and `#`
    /// comments are skipped.
    pub fn parse(text: &str, sizes: &[usize]) -> Result<Self, ScheduleError> {
        let mut samples = Vec::new();
        for (n, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let index: Vec<usize> = line
                .split_whitespace()
                .map(|tok| {
                    tok.parse::<usize>().map_err(|e| ScheduleError::Parse {
                        line: n + 1,
                        message: format!("'{}': {}", tok, e),
                    })
                })
                .collect::<Result<_, _>>()?;
            if index.len() != sizes.len() {
                return Err(ScheduleError::Parse {
                    line: n + 1,
                    message: format!("expected {} indices, found {}", sizes.len(), index.len()),
                });
            }
            samples.push(index);
        }
        Self::new(sizes, samples)
    }

    /// Grid size needed to hold every sample of a nuslist, one more than
    /// the largest index per dimension.
    pub fn grid_from_text(text: &str) -> Result<Vec<usize>, ScheduleError> {
        let mut sizes: Vec<usize> = Vec::new();
        for (n, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            for (d, tok) in line.split_whitespace().enumerate() {
                let i: usize = tok.parse().map_err(|e| ScheduleError::Parse {
                    line: n + 1,
                    message: format!("'{}': {}", tok, e),
                })?;
                if d >= sizes.len() {
                    sizes.push(0);
                }
                sizes[d] = sizes[d].max(i + 1);
            }
        }
        if sizes.is_empty() {
            return Err(ScheduleError::Empty);
        }
        Ok(sizes)
    }

    /// Poisson-gap schedule of `samples` points over `size` (Hyberts et al.):
    /// gaps are drawn from a Poisson distribution whose mean follows a
    /// sine ramp, so early points (strong signal) are sampled densely.
    pub fn poisson_gap(size: usize, samples: usize, seed: u64) -> Result<Self, ScheduleError> {
        if samples == 0 || samples > size {
            return Err(ScheduleError::Generation { samples, size });
        }
        if samples == size {
            let all: Vec<usize> = (0..size).collect();
            return Self::one_d(size, &all);
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut adj = 2.0 * (size as f64 / samples as f64 - 1.0);
        for attempt in 0..MAX_POISSON_ATTEMPTS {
            let mut points = Vec::with_capacity(samples);
            let mut i = 0usize;
            while i < size {
                points.push(i);
                i += 1;
                let ramp = ((i as f64 + 0.5) / (size as f64 + 1.0) * PI / 2.0).sin();
                i += poisson(&mut rng, adj * ramp);
            }
            match points.len().cmp(&samples) {
                std::cmp::Ordering::Greater => adj *= 1.02,
                std::cmp::Ordering::Less => adj /= 1.02,
                std::cmp::Ordering::Equal => {
                    debug!(
                        "Poisson-gap schedule: {} of {} points after {} attempts",
                        samples,
                        size,
                        attempt + 1
                    );
                    return Self::one_d(size, &points);
                }
            }
        }
        warn!(
            "Poisson-gap schedule: no {} of {} split after {} attempts",
            samples, size, MAX_POISSON_ATTEMPTS
        );
        Err(ScheduleError::Generation { samples, size })
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Total number of grid points.
    pub fn grid_len(&self) -> usize {
        self.sizes.iter().product()
    }

    /// Number of acquired points.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Fraction of the grid that was acquired.
    pub fn fraction(&self) -> f64 {
        self.len() as f64 / self.grid_len() as f64
    }

    pub fn samples(&self) -> &[Vec<usize>] {
        &self.samples
    }

    /// Row-major offsets of the acquired points, in schedule order.
    pub fn sampled_offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Offsets never acquired, ascending. Computed once per schedule.
    pub fn complement(&self) -> &[usize] {
        self.complement.get_or_init(|| {
            let mut sampled = vec![false; self.grid_len()];
            for &o in &self.offsets {
                sampled[o] = true;
            }
            sampled
                .iter()
                .enumerate()
                .filter(|(_, &s)| !s)
                .map(|(o, _)| o)
                .collect()
        })
    }

    /// Mask with every acquired point set.
    pub fn mask(&self) -> Result<Mask, ScheduleError> {
        let mut mask = Mask::new(&self.sizes)?;
        for &o in &self.offsets {
            mask[o] = true;
        }
        Ok(mask)
    }

    /// Render as a nuslist.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for index in &self.samples {
            let line: Vec<String> = index.iter().map(|i| i.to_string()).collect();
            let _ = writeln!(out, "{}", line.join(" "));
        }
        out
    }
}

const MAX_POISSON_ATTEMPTS: usize = 100_000;

fn row_major_offset(sizes: &[usize], index: &[usize]) -> usize {
    index
        .iter()
        .zip(sizes)
        .fold(0, |acc, (&i, &n)| acc * n + i)
}

/// Knuth's Poisson sampler; adequate for the small means used here.
fn poisson(rng: &mut StdRng, lambda: f64) -> usize {
    if lambda <= 0.0 {
        return 0;
    }
    let limit = (-lambda).exp();
    let mut k = 0usize;
    let mut p = 1.0;
    loop {
        p *= rng.random::<f64>();
        if p < limit {
            return k;
        }
        k += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complement_is_cached_and_sorted() {
        let s = SampleSchedule::one_d(8, &[0, 5, 2, 7]).unwrap();
        assert_eq!(s.complement(), &[1, 3, 4, 6]);
        let first = s.complement().as_ptr();
        assert_eq!(s.complement().as_ptr(), first);
        assert_eq!(s.sampled_offsets(), &[0, 5, 2, 7]);
        assert!((s.fraction() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_2d_offsets_are_row_major() {
        let s = SampleSchedule::new(&[3, 4], vec![vec![0, 0], vec![1, 2], vec![2, 3]]).unwrap();
        assert_eq!(s.sampled_offsets(), &[0, 6, 11]);
        assert_eq!(s.complement().len(), 9);
        let mask = s.mask().unwrap();
        assert!(mask.get(&[1, 2]).unwrap());
        assert!(!mask.get(&[1, 1]).unwrap());
    }

    #[test]
    fn test_rejects_bad_samples() {
        assert_eq!(
            SampleSchedule::one_d(4, &[]).unwrap_err(),
            ScheduleError::Empty
        );
        assert!(matches!(
            SampleSchedule::one_d(4, &[4]),
            Err(ScheduleError::OutOfGrid { .. })
        ));
        assert!(matches!(
            SampleSchedule::one_d(4, &[1, 1]),
            Err(ScheduleError::Duplicate(_))
        ));
    }

    #[test]
    fn test_parse_nuslist() {
        let text = "# t1 t2\n0 0\n1 3\n\n2 1  # late\n";
        let sizes = SampleSchedule::grid_from_text(text).unwrap();
        assert_eq!(sizes, vec![3, 4]);
        let s = SampleSchedule::parse(text, &sizes).unwrap();
        assert_eq!(s.len(), 3);
        assert_eq!(s.samples()[1], vec![1, 3]);
        assert_eq!(SampleSchedule::parse(&s.to_text(), &sizes).unwrap().samples(), s.samples());
    }

    #[test]
    fn test_parse_reports_line() {
        let err = SampleSchedule::parse("0\nx\n", &[4]).unwrap_err();
        assert!(matches!(err, ScheduleError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_poisson_gap_is_deterministic() {
        let a = SampleSchedule::poisson_gap(128, 40, 7).unwrap();
        let b = SampleSchedule::poisson_gap(128, 40, 7).unwrap();
        assert_eq!(a.len(), 40);
        assert_eq!(a.samples(), b.samples());
        assert_eq!(a.samples()[0], vec![0]);
        // Sine-weighted gaps: the first half holds more points than the second.
        let early = a.sampled_offsets().iter().filter(|&&o| o < 64).count();
        assert!(early > 20, "early = {}", early);
    }

    #[test]
    fn test_clone_is_a_new_schedule() {
        let s = SampleSchedule::one_d(4, &[0, 2]).unwrap();
        let _ = s.complement();
        let c = s.clone();
        assert_eq!(c.complement(), s.complement());
    }
}
