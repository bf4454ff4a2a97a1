//! Region-parallel convolution peak picking.
//!
//! Regions (from the dataset, or automatic tiles) are read, deconvolved,
//! searched for local maxima and squashed on a scoped worker pool. Once
//! every region has finished, the refined peaks are merged across region
//! boundaries, filtered in data units and appended to a [`PeakList`].

use crate::config::PickConfig;
use crate::deconvolve::deconvolve;
use crate::error::PickError;
use crate::peaks::{PeakDim, PeakList, RefinedPeak};
use crate::psf::Psf;
use crate::squash::{
    local_maxima, merge_peaks, reconcile_strays, squash_region, suppression_half_width, StrayPeak,
};
use crate::tiling::tile_regions;
use log::{debug, info, warn};
use nus_core::{Dataset, DatasetError, Region};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Result of one region: its core peaks and how well the deconvolution
/// explains the data there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionFit {
    pub region: Region,
    /// Absolute positions, only peaks owned by the region's core.
    pub peaks: Vec<RefinedPeak>,
    pub ratio: f64,
}

/// A region's fit plus the peaks it found outside its core.
struct RegionOutcome {
    fit: RegionFit,
    strays: Vec<RefinedPeak>,
}

pub struct ConvolutionPicker {
    config: PickConfig,
    psf: Psf,
}

impl ConvolutionPicker {
    pub fn new(config: PickConfig) -> Result<Self, PickError> {
        config.validate()?;
        let psf = Psf::new(&config.widths, config.lineshape)?;
        Ok(Self { config, psf })
    }

    pub fn config(&self) -> &PickConfig {
        &self.config
    }

    pub fn psf(&self) -> &Psf {
        &self.psf
    }

    /// Dataset regions when defined, automatic tiles otherwise.
    pub fn regions(&self, dataset: &dyn Dataset) -> Vec<Region> {
        let defined = dataset.regions();
        if defined.is_empty() {
            tile_regions(&dataset.sizes(), &self.psf, self.config.max_window)
        } else {
            defined.to_vec()
        }
    }

    /// Rank check, and every dataset region must lie inside the data.
    fn check_dataset(&self, dataset: &dyn Dataset) -> Result<(), PickError> {
        if dataset.ndim() != self.psf.ndim() {
            return Err(PickError::Config(format!(
                "{} widths for a {}-D dataset",
                self.psf.ndim(),
                dataset.ndim()
            )));
        }
        let sizes = dataset.sizes();
        if let Some(region) = dataset.regions().iter().find(|r| !r.fits(&sizes)) {
            return Err(PickError::Dataset(DatasetError::Region {
                region: region.clone(),
                sizes,
            }));
        }
        Ok(())
    }

    /// Deconvolve and squash one region. `None` when nothing in it rises
    /// above the threshold.
    fn process_region(
        &self,
        dataset: &dyn Dataset,
        region: &Region,
    ) -> Result<Option<RegionOutcome>, PickError> {
        let observed = dataset.read_region(region)?;
        let (_, max) = observed.max_value();
        if max <= self.config.threshold {
            return Ok(None);
        }
        let threshold = self.config.threshold;
        let mut result = deconvolve(&observed, &self.psf, threshold, self.config.iterations)?;
        let half = suppression_half_width(self.psf.widths(), self.config.squash);
        let candidates = local_maxima(&result.estimate, &mut result.skipped, threshold, &half);
        let refined = squash_region(
            &result.estimate,
            &mut result.skipped,
            candidates,
            &self.psf,
            &half,
        );
        let (peaks, strays): (Vec<RefinedPeak>, Vec<RefinedPeak>) = refined
            .into_iter()
            .map(|mut p| {
                for (x, &s) in p.position.iter_mut().zip(&region.start) {
                    *x += s as f64;
                }
                p
            })
            .partition(|p| region.core_contains(&p.position));
        debug!(
            "region {:?}..{:?}: {} peaks, {} in margin, ratio {:.4}",
            region.start,
            region.end,
            peaks.len(),
            strays.len(),
            result.ratio
        );
        Ok(Some(RegionOutcome {
            fit: RegionFit {
                region: region.clone(),
                peaks,
                ratio: result.ratio,
            },
            strays,
        }))
    }

    /// Run every region on a pool of `workers` threads. Results come back
    /// in region order; the pool is gone when this returns.
    fn run_regions(
        &self,
        dataset: &dyn Dataset,
        regions: &[Region],
    ) -> Result<Vec<Result<Option<RegionOutcome>, PickError>>, PickError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build()?;
        Ok(pool.install(|| {
            regions
                .par_iter()
                .map(|r| self.process_region(dataset, r))
                .collect()
        }))
    }

    /// Pick peaks from `dataset` and append them to `list`.
    ///
    /// A region whose data cannot be read contributes nothing; any other
    /// failure aborts. Returns the number of peaks appended.
    pub fn pick(&self, dataset: &dyn Dataset, list: &mut PeakList) -> Result<usize, PickError> {
        self.check_dataset(dataset)?;
        let regions = self.regions(dataset);
        info!(
            "picking {} regions, threshold {}, widths {:?}",
            regions.len(),
            self.config.threshold,
            self.config.widths
        );
        let mut refined = Vec::new();
        let mut strays = Vec::new();
        let outcomes = self.run_regions(dataset, &regions)?;
        for (index, (region, outcome)) in regions.iter().zip(outcomes).enumerate() {
            match outcome {
                Ok(Some(done)) => {
                    refined.extend(done.fit.peaks);
                    strays.extend(done.strays.into_iter().map(|peak| StrayPeak {
                        owner: regions.iter().position(|r| r.core_contains(&peak.position)),
                        region: index,
                        peak,
                    }));
                }
                Ok(None) => {}
                Err(PickError::Dataset(DatasetError::Io(e))) => {
                    warn!("skipping region {:?}..{:?}: {}", region.start, region.end, e);
                }
                Err(e) => return Err(e),
            }
        }
        refined.extend(reconcile_strays(strays, self.psf.widths(), self.config.squash));
        let merged = merge_peaks(refined, self.psf.widths(), self.config.squash);
        Ok(self.write_peaks(merged, dataset, list))
    }

    /// Per-region fits. The first failure, in region order, aborts the run.
    pub fn fit_ratios(&self, dataset: &dyn Dataset) -> Result<Vec<RegionFit>, PickError> {
        self.check_dataset(dataset)?;
        let regions = self.regions(dataset);
        let results = self.run_regions(dataset, &regions)?;
        let outcomes: Vec<Option<RegionOutcome>> = results.into_iter().collect::<Result<_, _>>()?;
        Ok(outcomes.into_iter().flatten().map(|o| o.fit).collect())
    }

    /// Filter merged peaks in data units and append them to `list`.
    fn write_peaks(&self, peaks: Vec<RefinedPeak>, dataset: &dyn Dataset, list: &mut PeakList) -> usize {
        let psf_peak = self.psf.peak_value();
        let widths = self.psf.widths();
        let area = self.psf.lineshape().area_factor();
        let axes = dataset.axes();
        let mut added = 0;
        for p in peaks {
            let intensity = p.height * psf_peak;
            if intensity <= self.config.threshold {
                continue;
            }
            let dims: Vec<PeakDim> = p
                .position
                .iter()
                .zip(widths)
                .zip(axes)
                .map(|((&point, &w), axis)| PeakDim {
                    ppm: axis.point_to_ppm(point),
                    point,
                    linewidth_ppm: axis.width_to_ppm(w),
                    linewidth_points: w,
                })
                .collect();
            let volume = widths.iter().fold(intensity, |v, w| v * w * area);
            list.push(dims, intensity, volume);
            added += 1;
        }
        info!("appended {} peaks to {}", added, list.name);
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nus_core::{convolve, Axis, DatasetError, Lineshape, MemoryDataset, RealMatrix};

    fn lcg(seed: &mut u64) -> f64 {
        *seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (*seed >> 11) as f64 / (1u64 << 53) as f64
    }

    fn axes(n: usize) -> Vec<Axis> {
        (0..n)
            .map(|d| Axis::new(&format!("d{}", d), 0, 5000.0, 500.0, 10.0))
            .collect()
    }

    fn two_peak_plane() -> RealMatrix {
        let shape = Lineshape::lorentzian();
        let mut seed = 17u64;
        let mut m = RealMatrix::new(&[64, 64]).unwrap();
        for i in 0..64 {
            for j in 0..64 {
                let mut v = 0.0;
                for (ci, cj) in [(20.0, 18.0), (44.0, 45.0)] {
                    v += 100.0 * shape.value(i as f64 - ci, 3.0) * shape.value(j as f64 - cj, 3.0);
                }
                v += lcg(&mut seed) - 0.5;
                m.set(&[i, j], v).unwrap();
            }
        }
        m
    }

    #[test]
    fn test_two_lorentzians_give_two_peaks() {
        let ds = MemoryDataset::new(two_peak_plane(), axes(2)).unwrap();
        let picker = ConvolutionPicker::new(PickConfig {
            threshold: 5.0,
            iterations: 50,
            widths: vec![3.0, 3.0],
            ..PickConfig::default()
        })
        .unwrap();
        let mut list = PeakList::new("test", vec!["d0".into(), "d1".into()]);
        let added = picker.pick(&ds, &mut list).unwrap();
        assert_eq!(added, 2, "{:?}", list.peaks());

        let mut found: Vec<(f64, f64)> = list
            .peaks()
            .iter()
            .map(|p| (p.dims[0].point, p.dims[1].point))
            .collect();
        found.sort_by(|a, b| a.0.total_cmp(&b.0));
        for ((x, y), (cx, cy)) in found.iter().zip([(20.0, 18.0), (44.0, 45.0)]) {
            assert!((x - cx).abs() <= 1.0 && (y - cy).abs() <= 1.0, "({}, {})", x, y);
        }
        for p in list.peaks() {
            assert!(p.intensity > 5.0);
            assert!(p.volume > p.intensity);
            let axis = &ds.axes()[0];
            assert!((p.dims[0].ppm - axis.point_to_ppm(p.dims[0].point)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_impulse_round_trip() {
        let psf = Psf::new(&[4.0], Lineshape::lorentzian()).unwrap();
        let mut impulse = RealMatrix::new(&[64]).unwrap();
        impulse[30] = 100.0;
        let observed = convolve(&impulse, psf.matrix()).unwrap();
        let ds = MemoryDataset::new(observed, axes(1)).unwrap();

        let picker = ConvolutionPicker::new(PickConfig {
            threshold: 0.5,
            iterations: 200,
            widths: vec![4.0],
            ..PickConfig::default()
        })
        .unwrap();
        let fits = picker.fit_ratios(&ds).unwrap();
        let best = fits
            .iter()
            .flat_map(|f| f.peaks.iter())
            .max_by(|a, b| a.height.total_cmp(&b.height))
            .unwrap();
        assert!((best.position[0] - 30.0).abs() <= 1.0, "{:?}", best);
        assert!((best.height - 100.0).abs() / 100.0 < 0.2, "{:?}", best);
    }

    #[test]
    fn test_tile_boundary_peak_is_reported_once() {
        // Tiles of core 19 put a boundary at 38.
        let shape = Lineshape::lorentzian();
        let data: Vec<f64> = (0..64).map(|i| 100.0 * shape.value(i as f64 - 38.0, 2.0)).collect();
        let ds = MemoryDataset::new(RealMatrix::from_vec(&[64], data).unwrap(), axes(1)).unwrap();
        let picker = ConvolutionPicker::new(PickConfig {
            threshold: 5.0,
            iterations: 100,
            widths: vec![2.0],
            max_window: 32,
            ..PickConfig::default()
        })
        .unwrap();
        assert_eq!(picker.regions(&ds).len(), 4);
        let mut list = PeakList::default();
        picker.pick(&ds, &mut list).unwrap();
        assert_eq!(list.len(), 1, "{:?}", list.peaks());
        assert!((list.peaks()[0].dims[0].point - 38.0).abs() <= 1.0);
    }

    #[test]
    fn test_line_between_points_on_a_tile_boundary() {
        // Boundaries at 19 and 38; half-point centres leave the line in
        // both tiles' margins.
        let shape = Lineshape::lorentzian();
        let picker = ConvolutionPicker::new(PickConfig {
            threshold: 5.0,
            iterations: 100,
            widths: vec![2.0],
            max_window: 32,
            ..PickConfig::default()
        })
        .unwrap();
        let centres = (0..=32)
            .map(|k| 16.0 + 0.125 * k as f64)
            .chain((0..=32).map(|k| 36.0 + 0.125 * k as f64));
        for centre in centres {
            let data: Vec<f64> = (0..64)
                .map(|i| 100.0 * shape.value(i as f64 - centre, 2.0))
                .collect();
            let ds = MemoryDataset::new(RealMatrix::from_vec(&[64], data).unwrap(), axes(1)).unwrap();
            let mut list = PeakList::default();
            picker.pick(&ds, &mut list).unwrap();
            assert_eq!(list.len(), 1, "centre {}: {:?}", centre, list.peaks());
            let found = list.peaks()[0].dims[0].point;
            assert!((found - centre).abs() <= 1.0, "centre {}: found {}", centre, found);
        }
    }

    #[test]
    fn test_dataset_regions_are_used() {
        let ds_matrix = two_peak_plane();
        let mut ds = MemoryDataset::new(ds_matrix, axes(2)).unwrap();
        ds.set_regions(vec![Region::new(vec![0, 0], vec![32, 32])]);
        let picker = ConvolutionPicker::new(PickConfig {
            threshold: 5.0,
            widths: vec![3.0, 3.0],
            ..PickConfig::default()
        })
        .unwrap();
        let mut list = PeakList::default();
        assert_eq!(picker.pick(&ds, &mut list).unwrap(), 1);
    }

    /// Dataset whose second half cannot be read.
    struct FlakyDataset {
        inner: MemoryDataset,
    }

    impl Dataset for FlakyDataset {
        fn axes(&self) -> &[Axis] {
            self.inner.axes()
        }

        fn read_region(&self, region: &Region) -> Result<RealMatrix, DatasetError> {
            if region.start[0] >= 32 {
                return Err(DatasetError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "truncated file",
                )));
            }
            self.inner.read_region(region)
        }

        fn regions(&self) -> &[Region] {
            self.inner.regions()
        }
    }

    fn flaky() -> FlakyDataset {
        let mut inner = MemoryDataset::new(two_peak_plane(), axes(2)).unwrap();
        inner.set_regions(vec![
            Region::new(vec![0, 0], vec![32, 64]),
            Region::new(vec![32, 0], vec![64, 64]),
        ]);
        FlakyDataset { inner }
    }

    #[test]
    fn test_pick_tolerates_unreadable_regions() {
        let picker = ConvolutionPicker::new(PickConfig {
            threshold: 5.0,
            widths: vec![3.0, 3.0],
            ..PickConfig::default()
        })
        .unwrap();
        let mut list = PeakList::default();
        assert_eq!(picker.pick(&flaky(), &mut list).unwrap(), 1);
    }

    #[test]
    fn test_fit_ratios_propagates_region_failure() {
        let picker = ConvolutionPicker::new(PickConfig {
            threshold: 5.0,
            widths: vec![3.0, 3.0],
            ..PickConfig::default()
        })
        .unwrap();
        assert!(matches!(
            picker.fit_ratios(&flaky()),
            Err(PickError::Dataset(DatasetError::Io(_)))
        ));
    }

    /// Dataset whose reads fail for a reason other than I/O.
    struct CorruptDataset {
        inner: MemoryDataset,
    }

    impl Dataset for CorruptDataset {
        fn axes(&self) -> &[Axis] {
            self.inner.axes()
        }

        fn read_region(&self, _region: &Region) -> Result<RealMatrix, DatasetError> {
            Err(DatasetError::Invalid("bad block".into()))
        }
    }

    #[test]
    fn test_only_io_failures_are_skipped() {
        let picker = ConvolutionPicker::new(PickConfig {
            threshold: 5.0,
            widths: vec![3.0, 3.0],
            ..PickConfig::default()
        })
        .unwrap();
        let corrupt = CorruptDataset {
            inner: MemoryDataset::new(two_peak_plane(), axes(2)).unwrap(),
        };
        let mut list = PeakList::default();
        assert!(matches!(
            picker.pick(&corrupt, &mut list),
            Err(PickError::Dataset(DatasetError::Invalid(_)))
        ));

        let mut outside = MemoryDataset::new(two_peak_plane(), axes(2)).unwrap();
        outside.set_regions(vec![
            Region::new(vec![0, 0], vec![32, 64]),
            Region::new(vec![32, 0], vec![80, 64]),
        ]);
        assert!(matches!(
            picker.pick(&outside, &mut list),
            Err(PickError::Dataset(DatasetError::Region { .. }))
        ));
        assert!(list.is_empty());
    }

    #[test]
    fn test_rank_mismatch_fails_before_work() {
        let ds = MemoryDataset::new(RealMatrix::new(&[16]).unwrap(), axes(1)).unwrap();
        let picker = ConvolutionPicker::new(PickConfig {
            widths: vec![2.0, 2.0],
            ..PickConfig::default()
        })
        .unwrap();
        let mut list = PeakList::default();
        assert!(matches!(
            picker.pick(&ds, &mut list),
            Err(PickError::Config(_))
        ));
        assert!(list.is_empty());
    }

    #[test]
    fn test_window_must_hold_psf() {
        assert!(matches!(
            ConvolutionPicker::new(PickConfig {
                widths: vec![8.0],
                max_window: 32,
                ..PickConfig::default()
            }),
            Err(PickError::Config(_))
        ));
    }
}
