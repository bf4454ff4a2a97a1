//! Analysis regions: half-open index boxes with an owned core.
//!
//! A region is processed as `[start, end)`; only results whose position
//! falls in the core `[core_start, core_end)` belong to it. Tiles built
//! by the peak picker overlap their neighbours by a margin so peaks near
//! a boundary are never truncated, and the core split keeps the overlap
//! from reporting a peak twice.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub start: Vec<usize>,
    pub end: Vec<usize>,
    pub core_start: Vec<usize>,
    pub core_end: Vec<usize>,
}

impl Region {
    /// Region whose core is the whole box.
    pub fn new(start: Vec<usize>, end: Vec<usize>) -> Self {
        Self {
            core_start: start.clone(),
            core_end: end.clone(),
            start,
            end,
        }
    }

    /// Core `[core_start, core_end)` widened by `margin` per dimension and
    /// clipped to `[0, sizes)`.
    pub fn with_margin(
        core_start: Vec<usize>,
        core_end: Vec<usize>,
        margin: &[usize],
        sizes: &[usize],
    ) -> Self {
        let start = core_start
            .iter()
            .zip(margin)
            .map(|(&s, &m)| s.saturating_sub(m))
            .collect();
        let end = core_end
            .iter()
            .zip(margin)
            .zip(sizes)
            .map(|((&e, &m), &n)| (e + m).min(n))
            .collect();
        Self {
            start,
            end,
            core_start,
            core_end,
        }
    }

    pub fn ndim(&self) -> usize {
        self.start.len()
    }

    /// Extent per dimension.
    pub fn sizes(&self) -> Vec<usize> {
        self.start
            .iter()
            .zip(&self.end)
            .map(|(&s, &e)| e.saturating_sub(s))
            .collect()
    }

    /// Number of points in the region.
    pub fn len(&self) -> usize {
        self.sizes().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `position` (absolute, fractional points) rounds into the core.
    pub fn core_contains(&self, position: &[f64]) -> bool {
        position
            .iter()
            .zip(self.core_start.iter().zip(&self.core_end))
            .all(|(&p, (&s, &e))| {
                let r = p.round();
                r >= s as f64 && r < e as f64
            })
    }

    /// Whether every bound lies inside a grid of `sizes`.
    pub fn fits(&self, sizes: &[usize]) -> bool {
        self.ndim() == sizes.len()
            && self.end.iter().zip(sizes).all(|(&e, &n)| e <= n)
            && self.start.iter().zip(&self.end).all(|(&s, &e)| s < e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_margin_is_clipped() {
        let r = Region::with_margin(vec![0, 10], vec![8, 20], &[2, 3], &[9, 21]);
        assert_eq!(r.start, vec![0, 7]);
        assert_eq!(r.end, vec![9, 21]);
        assert_eq!(r.sizes(), vec![9, 14]);
        assert_eq!(r.len(), 126);
    }

    #[test]
    fn test_core_contains_rounds() {
        let r = Region::with_margin(vec![10], vec![20], &[2], &[100]);
        assert!(r.core_contains(&[10.0]));
        assert!(r.core_contains(&[19.4]));
        assert!(!r.core_contains(&[19.6]));
        assert!(!r.core_contains(&[9.4]));
    }

    #[test]
    fn test_fits() {
        let r = Region::new(vec![0, 0], vec![4, 4]);
        assert!(r.fits(&[4, 4]));
        assert!(!r.fits(&[3, 4]));
        assert!(!r.fits(&[4]));
    }
}
