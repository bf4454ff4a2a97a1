//! Automatic tiling of a dataset into FFT-friendly overlapping regions.

use crate::psf::Psf;
use nus_core::spectral::next_power_of_two;
use nus_core::{IndexIter, Region};

/// Core extent per dimension for a dataset of `sizes`.
///
/// The window is the next power of two holding the data plus one PSF
/// footprint, capped at `max_window`; the core is what is left after
/// reserving the footprint, never less than one point.
pub fn core_sizes(sizes: &[usize], psf: &Psf, max_window: usize) -> Vec<usize> {
    sizes
        .iter()
        .zip(psf.footprint())
        .map(|(&n, &f)| {
            let window = max_window.min(next_power_of_two(n + f));
            window.saturating_sub(f).max(1)
        })
        .collect()
}

/// Margin added on each side of a core: half the PSF width, rounded up.
pub fn margins(psf: &Psf) -> Vec<usize> {
    psf.widths()
        .iter()
        .map(|w| ((w / 2.0).ceil() as usize).max(1))
        .collect()
}

/// Tile `sizes` into regions whose cores partition the grid.
pub fn tile_regions(sizes: &[usize], psf: &Psf, max_window: usize) -> Vec<Region> {
    let cores = core_sizes(sizes, psf, max_window);
    let margin = margins(psf);
    let counts: Vec<usize> = sizes
        .iter()
        .zip(&cores)
        .map(|(&n, &c)| n.div_ceil(c))
        .collect();
    IndexIter::new(counts)
        .map(|tile| {
            let start: Vec<usize> = tile.iter().zip(&cores).map(|(&t, &c)| t * c).collect();
            let end: Vec<usize> = start
                .iter()
                .zip(&cores)
                .zip(sizes)
                .map(|((&s, &c), &n)| (s + c).min(n))
                .collect();
            Region::with_margin(start, end, &margin, sizes)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nus_core::Lineshape;

    #[test]
    fn test_small_dataset_is_one_tile() {
        let psf = Psf::new(&[3.0, 3.0], Lineshape::lorentzian()).unwrap();
        let regions = tile_regions(&[64, 64], &psf, 256);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].start, vec![0, 0]);
        assert_eq!(regions[0].end, vec![64, 64]);
    }

    #[test]
    fn test_cores_partition_the_grid() {
        let psf = Psf::new(&[2.0], Lineshape::lorentzian()).unwrap();
        // footprint 13, window 32, core 19
        assert_eq!(core_sizes(&[64], &psf, 32), vec![19]);
        let regions = tile_regions(&[64], &psf, 32);
        assert_eq!(regions.len(), 4);
        let mut covered = vec![0usize; 64];
        for r in &regions {
            for i in r.core_start[0]..r.core_end[0] {
                covered[i] += 1;
            }
            assert!(r.end[0] - r.start[0] <= 32);
        }
        assert!(covered.iter().all(|&c| c == 1));
        assert_eq!(regions[1].start, vec![18]);
        assert_eq!(regions[1].end, vec![39]);
    }

    #[test]
    fn test_degenerate_window_keeps_one_point_cores() {
        let psf = Psf::new(&[4.0], Lineshape::lorentzian()).unwrap();
        assert_eq!(core_sizes(&[100], &psf, 8), vec![1]);
    }
}
