//! Peak picking over a dataset, plus peak list output.

use super::PipelineError;
use nus_core::Dataset;
use nus_pick::{ConvolutionPicker, PeakList, PickConfig, RegionFit};
use std::fmt::Write as _;
use std::path::Path;

/// One width per dimension; a single width is used for every dimension.
pub fn resolve_widths(widths: &[f64], ndim: usize) -> Result<Vec<f64>, PipelineError> {
    match widths.len() {
        1 => Ok(vec![widths[0]; ndim]),
        n if n == ndim => Ok(widths.to_vec()),
        n => Err(PipelineError::Invalid(format!(
            "{} widths given for {} dimensions",
            n, ndim
        ))),
    }
}

fn picker_for(dataset: &dyn Dataset, mut config: PickConfig) -> Result<ConvolutionPicker, PipelineError> {
    config.widths = resolve_widths(&config.widths, dataset.ndim())?;
    Ok(ConvolutionPicker::new(config)?)
}

/// Pick `dataset` into a fresh list called `name`.
pub fn pick_dataset(
    dataset: &dyn Dataset,
    name: &str,
    config: PickConfig,
) -> Result<PeakList, PipelineError> {
    let picker = picker_for(dataset, config)?;
    let labels = dataset.axes().iter().map(|a| a.label.clone()).collect();
    let mut list = PeakList::new(name, labels);
    picker.pick(dataset, &mut list)?;
    Ok(list)
}

/// Per-region fit quality.
pub fn fit_regions(dataset: &dyn Dataset, config: PickConfig) -> Result<Vec<RegionFit>, PipelineError> {
    Ok(picker_for(dataset, config)?.fit_ratios(dataset)?)
}

/// Whitespace-aligned peak table.
pub fn peak_table(list: &PeakList) -> String {
    let mut out = String::new();
    let _ = write!(out, "{:>5}", "id");
    for label in &list.labels {
        let _ = write!(out, " {:>10} {:>10}", format!("{}_ppm", label), format!("{}_lw", label));
    }
    let _ = writeln!(out, " {:>12} {:>12}", "intensity", "volume");
    for p in list.peaks() {
        let _ = write!(out, "{:>5}", p.id);
        for d in &p.dims {
            let _ = write!(out, " {:>10.4} {:>10.4}", d.ppm, d.linewidth_ppm);
        }
        let _ = writeln!(out, " {:>12.4e} {:>12.4e}", p.intensity, p.volume);
    }
    out
}

pub fn region_table(fits: &[RegionFit]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<24} {:>6} {:>10}", "region", "peaks", "ratio");
    for fit in fits {
        let span = format!("{:?}..{:?}", fit.region.start, fit.region.end);
        let _ = writeln!(out, "{:<24} {:>6} {:>10.5}", span, fit.peaks.len(), fit.ratio);
    }
    out
}

pub fn save_peak_list(list: &PeakList, path: &Path) -> Result<(), PipelineError> {
    std::fs::write(path, serde_json::to_string_pretty(list)?)?;
    log::info!("Wrote {} peaks to {}", list.len(), path.display());
    Ok(())
}
