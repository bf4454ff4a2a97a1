//! Local maxima, in-region squashing and the cross-region merge.

use crate::peaks::{CandidatePeak, RefinedPeak};
use crate::psf::Psf;
use nus_core::{BoxIter, Mask, RealMatrix};
use std::cmp::Ordering;

/// Merge passes over the joined peak list.
const MERGE_PASSES: usize = 2;

/// Neighbourhood half width per dimension: `ceil(width · squash) / 2`
/// in integer arithmetic, at least one point.
pub fn suppression_half_width(widths: &[f64], squash: f64) -> Vec<usize> {
    widths
        .iter()
        .map(|w| (((w * squash).ceil() as usize) / 2).max(1))
        .collect()
}

fn neighbourhood(index: &[usize], half: &[usize], sizes: &[usize]) -> BoxIter {
    let start: Vec<usize> = index
        .iter()
        .zip(half)
        .map(|(&i, &h)| i.saturating_sub(h))
        .collect();
    let end: Vec<usize> = index
        .iter()
        .zip(half)
        .zip(sizes)
        .map(|((&i, &h), &n)| (i + h + 1).min(n))
        .collect();
    BoxIter::new(&start, &end)
}

/// Points of `estimate` above `threshold` with no larger value inside
/// their `half` box. Points at or below the threshold are marked in
/// `skipped`; already skipped points are never candidates.
pub fn local_maxima(
    estimate: &RealMatrix,
    skipped: &mut Mask,
    threshold: f64,
    half: &[usize],
) -> Vec<CandidatePeak> {
    let sizes = estimate.sizes().to_vec();
    let shape = estimate.shape().clone();
    let mut found = Vec::new();
    for (offset, index) in shape.iter().enumerate() {
        let value = estimate[offset];
        if skipped[offset] || value <= threshold {
            skipped[offset] = true;
            continue;
        }
        let dominated = neighbourhood(&index, half, &sizes).any(|nb| {
            let o = shape.offset_unchecked(&nb);
            // Plateaus resolve to their first point.
            estimate[o] > value || (estimate[o] == value && o < offset)
        });
        if !dominated {
            found.push(CandidatePeak {
                position: index,
                height: value,
            });
        }
    }
    found
}

fn by_height(a: f64, b: f64, pa: &[f64], pb: &[f64]) -> Ordering {
    b.total_cmp(&a).then_with(|| {
        pa.iter()
            .zip(pb)
            .map(|(x, y)| x.total_cmp(y))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    })
}

/// Collapse each candidate and its neighbourhood into one refined peak.
///
/// Candidates are taken strongest first. Each collects the PSF-weighted
/// centroid of the unclaimed points in its `half` box; every point it
/// claims is marked skipped so it cannot seed or join another peak.
/// Positions are relative to `estimate`.
pub fn squash_region(
    estimate: &RealMatrix,
    skipped: &mut Mask,
    mut candidates: Vec<CandidatePeak>,
    psf: &Psf,
    half: &[usize],
) -> Vec<RefinedPeak> {
    let sizes = estimate.sizes().to_vec();
    let shape = estimate.shape().clone();
    let peak = psf.peak_value();
    candidates.sort_by(|a, b| {
        let pa: Vec<f64> = a.position.iter().map(|&i| i as f64).collect();
        let pb: Vec<f64> = b.position.iter().map(|&i| i as f64).collect();
        by_height(a.height, b.height, &pa, &pb)
    });

    let mut refined = Vec::with_capacity(candidates.len());
    let mut offset_buf: Vec<isize> = vec![0; sizes.len()];
    for c in candidates {
        let centre = shape.offset_unchecked(&c.position);
        let mut weight_sum = 0.0;
        let mut moment = vec![0.0; sizes.len()];
        for nb in neighbourhood(&c.position, half, &sizes) {
            let o = shape.offset_unchecked(&nb);
            if o != centre && skipped[o] {
                continue;
            }
            for (d, slot) in offset_buf.iter_mut().enumerate() {
                *slot = nb[d] as isize - c.position[d] as isize;
            }
            let w = estimate[o] * psf.value_at(&offset_buf) / peak;
            weight_sum += w;
            for (m, &i) in moment.iter_mut().zip(&nb) {
                *m += w * i as f64;
            }
            skipped[o] = true;
        }
        if weight_sum > 0.0 {
            refined.push(RefinedPeak {
                position: moment.iter().map(|m| m / weight_sum).collect(),
                height: weight_sum,
            });
        }
    }
    refined
}

/// Width-normalized Euclidean distance.
pub fn normalized_distance(a: &[f64], b: &[f64], widths: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .zip(widths)
        .map(|((p, q), w)| ((p - q) / w).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Merge peaks closer than `squash` widths.
///
/// Peaks are ordered by height (ties by position), so the result does not
/// depend on the order regions finished in. A stronger peak absorbs every
/// later one within range: the position becomes the height-weighted
/// centroid and the heights add.
pub fn merge_peaks(mut peaks: Vec<RefinedPeak>, widths: &[f64], squash: f64) -> Vec<RefinedPeak> {
    for _ in 0..MERGE_PASSES {
        peaks.sort_by(|a, b| by_height(a.height, b.height, &a.position, &b.position));
        let mut absorbed = vec![false; peaks.len()];
        for i in 0..peaks.len() {
            if absorbed[i] {
                continue;
            }
            for j in (i + 1)..peaks.len() {
                if absorbed[j]
                    || normalized_distance(&peaks[i].position, &peaks[j].position, widths) >= squash
                {
                    continue;
                }
                let (hi, hj) = (peaks[i].height, peaks[j].height);
                let total = hi + hj;
                if total > 0.0 {
                    let merged: Vec<f64> = peaks[i]
                        .position
                        .iter()
                        .zip(&peaks[j].position)
                        .map(|(p, q)| (p * hi + q * hj) / total)
                        .collect();
                    peaks[i].position = merged;
                }
                peaks[i].height = total;
                absorbed[j] = true;
            }
        }
        peaks = peaks
            .into_iter()
            .zip(absorbed)
            .filter(|(_, gone)| !gone)
            .map(|(p, _)| p)
            .collect();
    }
    peaks
}

/// A peak a region found in its margin, outside its own core.
#[derive(Debug, Clone, PartialEq)]
pub struct StrayPeak {
    /// Absolute position.
    pub peak: RefinedPeak,
    /// Index of the region that found it.
    pub region: usize,
    /// Region whose core holds the rounded position.
    pub owner: Option<usize>,
}

/// Peaks that no region kept in its core.
///
/// A line centred between two grid points on a boundary can be pushed
/// into the margin by both regions. Such a stray is kept when the region
/// owning its position also reported a stray within `squash` widths; the
/// strongest of each group is returned once. Any other stray is an edge
/// artefact and is dropped.
pub fn reconcile_strays(mut strays: Vec<StrayPeak>, widths: &[f64], squash: f64) -> Vec<RefinedPeak> {
    strays.sort_by(|a, b| {
        by_height(a.peak.height, b.peak.height, &a.peak.position, &b.peak.position)
    });
    let mut used = vec![false; strays.len()];
    let mut kept = Vec::new();
    for i in 0..strays.len() {
        if used[i] {
            continue;
        }
        let Some(owner) = strays[i].owner else {
            continue;
        };
        let near = |j: usize| {
            normalized_distance(&strays[i].peak.position, &strays[j].peak.position, widths) < squash
        };
        let confirmed = (0..strays.len())
            .any(|j| j != i && !used[j] && strays[j].region == owner && near(j));
        if !confirmed {
            continue;
        }
        for j in 0..strays.len() {
            if !used[j] && near(j) {
                used[j] = true;
            }
        }
        kept.push(strays[i].peak.clone());
    }
    kept
}
