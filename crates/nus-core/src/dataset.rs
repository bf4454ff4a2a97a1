//! Dataset collaborator: multidimensional sample storage with point ↔
//! chemical-shift conversion.
//!
//! The engines only need to read real-valued boxes of data and map
//! positions to ppm; storage formats implement [`Dataset`] on top of
//! whatever they hold.

use crate::matrix::{MatrixError, RealMatrix};
use crate::region::Region;
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Matrix error: {0}")]
    Matrix(#[from] MatrixError),
    #[error("region {region:?} does not fit dataset {sizes:?}")]
    Region { region: Region, sizes: Vec<usize> },
    #[error("Invalid dataset: {0}")]
    Invalid(String),
}

/// Axis parameters for a spectral dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub label: String,
    pub size: usize,
    pub spectral_width_hz: f64,
    pub observe_freq_mhz: f64,
    /// Chemical shift of point 0.
    pub reference_ppm: f64,
}

impl Default for Axis {
    fn default() -> Self {
        Self {
            label: String::new(),
            size: 0,
            spectral_width_hz: 0.0,
            observe_freq_mhz: 400.0,
            reference_ppm: 0.0,
        }
    }
}

impl Axis {
    pub fn new(
        label: &str,
        size: usize,
        spectral_width_hz: f64,
        observe_freq_mhz: f64,
        reference_ppm: f64,
    ) -> Self {
        Self {
            label: label.to_string(),
            size,
            spectral_width_hz,
            observe_freq_mhz,
            reference_ppm,
        }
    }

    /// Spectral width in ppm.
    pub fn sw_ppm(&self) -> f64 {
        if self.observe_freq_mhz == 0.0 {
            return 0.0;
        }
        self.spectral_width_hz / self.observe_freq_mhz
    }

    /// ppm per point.
    fn ppm_per_point(&self) -> f64 {
        if self.size == 0 {
            return 0.0;
        }
        self.sw_ppm() / self.size as f64
    }

    /// Convert a (fractional) point position to ppm.
    ///
    /// Point 0 sits at `reference_ppm`; the scale runs downfield to upfield
    /// as the index grows.
    pub fn point_to_ppm(&self, point: f64) -> f64 {
        self.reference_ppm - point * self.ppm_per_point()
    }

    /// Convert ppm to a fractional point position.
    pub fn ppm_to_point(&self, ppm: f64) -> f64 {
        let step = self.ppm_per_point();
        if step == 0.0 {
            return 0.0;
        }
        (self.reference_ppm - ppm) / step
    }

    /// Width in points expressed in ppm.
    pub fn width_to_ppm(&self, points: f64) -> f64 {
        points * self.ppm_per_point()
    }

    /// Width in points expressed in Hz.
    pub fn width_to_hz(&self, points: f64) -> f64 {
        self.width_to_ppm(points) * self.observe_freq_mhz
    }

    /// ppm of every point.
    pub fn ppm_scale(&self) -> Vec<f64> {
        (0..self.size).map(|i| self.point_to_ppm(i as f64)).collect()
    }
}

/// Region from ppm bounds, one `(ppm_a, ppm_b)` pair per axis in either order.
pub fn region_from_ppm(axes: &[Axis], bounds: &[(f64, f64)]) -> Region {
    let mut start = Vec::with_capacity(axes.len());
    let mut end = Vec::with_capacity(axes.len());
    for (axis, &(a, b)) in axes.iter().zip(bounds) {
        let pa = axis.ppm_to_point(a);
        let pb = axis.ppm_to_point(b);
        let lo = pa.min(pb).floor().max(0.0) as usize;
        let hi = (pa.max(pb).ceil() as usize + 1).min(axis.size);
        start.push(lo.min(hi));
        end.push(hi);
    }
    Region::new(start, end)
}

/// Read access to stored spectral data.
pub trait Dataset: Sync {
    fn axes(&self) -> &[Axis];

    fn sizes(&self) -> Vec<usize> {
        self.axes().iter().map(|a| a.size).collect()
    }

    fn ndim(&self) -> usize {
        self.axes().len()
    }

    /// Read the box `[region.start, region.end)` as a real matrix.
    fn read_region(&self, region: &Region) -> Result<RealMatrix, DatasetError>;

    /// Externally defined analysis windows; empty when none are set.
    fn regions(&self) -> &[Region] {
        &[]
    }
}

/// Dataset held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemoryDataset {
    matrix: RealMatrix,
    axes: Vec<Axis>,
    regions: Vec<Region>,
}

impl MemoryDataset {
    /// Wrap a matrix; each axis size is set from the matrix.
    pub fn new(matrix: RealMatrix, mut axes: Vec<Axis>) -> Result<Self, DatasetError> {
        if axes.len() != matrix.ndim() {
            return Err(DatasetError::Invalid(format!(
                "{} axes for a {}-D matrix",
                axes.len(),
                matrix.ndim()
            )));
        }
        for (axis, &n) in axes.iter_mut().zip(matrix.sizes()) {
            axis.size = n;
        }
        Ok(Self {
            matrix,
            axes,
            regions: Vec::new(),
        })
    }

    pub fn matrix(&self) -> &RealMatrix {
        &self.matrix
    }

    pub fn set_regions(&mut self, regions: Vec<Region>) {
        self.regions = regions;
    }
}

impl Dataset for MemoryDataset {
    fn axes(&self) -> &[Axis] {
        &self.axes
    }

    fn read_region(&self, region: &Region) -> Result<RealMatrix, DatasetError> {
        if !region.fits(self.matrix.sizes()) {
            return Err(DatasetError::Region {
                region: region.clone(),
                sizes: self.matrix.sizes().to_vec(),
            });
        }
        Ok(self.matrix.sub_matrix(&region.start, &region.sizes())?)
    }

    fn regions(&self) -> &[Region] {
        &self.regions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proton_axis() -> Axis {
        // 12 ppm over 1200 points at 500 MHz, point 0 at 11 ppm.
        Axis::new("1H", 1200, 6000.0, 500.0, 11.0)
    }

    #[test]
    fn test_point_ppm_roundtrip() {
        let ax = proton_axis();
        assert!((ax.point_to_ppm(0.0) - 11.0).abs() < 1e-12);
        assert!((ax.point_to_ppm(100.0) - 10.0).abs() < 1e-12);
        assert!((ax.ppm_to_point(10.0) - 100.0).abs() < 1e-9);
        assert!((ax.ppm_to_point(ax.point_to_ppm(517.25)) - 517.25).abs() < 1e-9);
    }

    #[test]
    fn test_width_conversion() {
        let ax = proton_axis();
        assert!((ax.width_to_ppm(4.0) - 0.04).abs() < 1e-12);
        assert!((ax.width_to_hz(4.0) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_region_from_ppm() {
        let ax = proton_axis();
        let r = region_from_ppm(&[ax], &[(9.0, 10.0)]);
        assert_eq!(r.start, vec![100]);
        assert_eq!(r.end, vec![201]);
    }

    #[test]
    fn test_memory_dataset_reads_region() {
        let data: Vec<f64> = (0..20).map(|v| v as f64).collect();
        let m = RealMatrix::from_vec(&[4, 5], data).unwrap();
        let ds = MemoryDataset::new(m, vec![Axis::default(), Axis::default()]).unwrap();
        assert_eq!(ds.sizes(), vec![4, 5]);
        let sub = ds.read_region(&Region::new(vec![1, 2], vec![3, 4])).unwrap();
        assert_eq!(sub.as_slice(), &[7.0, 8.0, 12.0, 13.0]);
        assert!(matches!(
            ds.read_region(&Region::new(vec![0, 0], vec![5, 5])),
            Err(DatasetError::Region { .. })
        ));
    }

    #[test]
    fn test_memory_dataset_axis_count() {
        let m = RealMatrix::new(&[4, 5]).unwrap();
        assert!(MemoryDataset::new(m, vec![Axis::default()]).is_err());
    }
}
