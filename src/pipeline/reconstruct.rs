//! NUS reconstruction of NMRPipe time-domain data.
//!
//! A schedule covering the whole data grid reconstructs the matrix in one
//! go. A 1D schedule over the rows of a 2D file (direct dimension fully
//! acquired, indirect one sampled) reconstructs every column on its own.

use super::PipelineError;
use log::info;
use nus_core::{Complex64, ComplexMatrix, SampleSchedule};
use nus_recon::{Grins, GrinsConfig, GrinsReport, Ist, IstConfig, IstReport};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// How a schedule maps onto the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Schedule grid equals the data shape.
    Full,
    /// 1D schedule over the rows; each column is reconstructed separately.
    Columns,
}

/// Read a nuslist and size its grid to `data_sizes`.
pub fn load_schedule(path: &Path, data_sizes: &[usize]) -> Result<SampleSchedule, PipelineError> {
    let text = std::fs::read_to_string(path)?;
    let schedule = parse_schedule(&text, data_sizes)?;
    info!(
        "Schedule {}: {} of {} points ({:.1}%)",
        path.display(),
        schedule.len(),
        schedule.grid_len(),
        100.0 * schedule.fraction()
    );
    Ok(schedule)
}

fn parse_schedule(text: &str, data_sizes: &[usize]) -> Result<SampleSchedule, PipelineError> {
    let needed = SampleSchedule::grid_from_text(text)?;
    let sizes = if needed.len() == data_sizes.len() {
        data_sizes.to_vec()
    } else if needed.len() == 1 && data_sizes.len() == 2 {
        vec![data_sizes[0]]
    } else {
        return Err(PipelineError::Invalid(format!(
            "{}-D schedule for {}-D data",
            needed.len(),
            data_sizes.len()
        )));
    };
    Ok(SampleSchedule::parse(text, &sizes)?)
}

pub fn layout(schedule: &SampleSchedule, data: &ComplexMatrix) -> Result<Layout, PipelineError> {
    if schedule.sizes() == data.sizes() {
        Ok(Layout::Full)
    } else if data.ndim() == 2 && schedule.sizes() == [data.sizes()[0]] {
        Ok(Layout::Columns)
    } else {
        Err(PipelineError::Invalid(format!(
            "schedule grid {:?} does not fit data {:?}",
            schedule.sizes(),
            data.sizes()
        )))
    }
}

/// IST over `data` in place; one report per reconstructed vector.
pub fn run_ist(
    data: &mut ComplexMatrix,
    schedule: Arc<SampleSchedule>,
    config: IstConfig,
) -> Result<Vec<IstReport>, PipelineError> {
    let layout = layout(&schedule, data)?;
    let ist = Ist::new(config).with_schedule(schedule);
    match layout {
        Layout::Full => Ok(vec![ist.reconstruct(data)?]),
        Layout::Columns => {
            let (rows, cols) = (data.sizes()[0], data.sizes()[1]);
            let mut reports = Vec::with_capacity(cols);
            let mut column = vec![Complex64::new(0.0, 0.0); rows];
            for c in 0..cols {
                for (r, z) in column.iter_mut().enumerate() {
                    *z = data[r * cols + c];
                }
                reports.push(ist.reconstruct_vector(&mut column)?);
                for (r, z) in column.iter().enumerate() {
                    data[r * cols + c] = *z;
                }
            }
            info!("IST: reconstructed {} columns of {} points", cols, rows);
            Ok(reports)
        }
    }
}

/// GRINS over the full grid of `data`.
pub fn run_grins(
    data: &mut ComplexMatrix,
    schedule: Arc<SampleSchedule>,
    config: GrinsConfig,
    diag: Option<&mut dyn Write>,
) -> Result<GrinsReport, PipelineError> {
    if layout(&schedule, data)? != Layout::Full {
        return Err(PipelineError::Invalid(
            "GRINS needs a schedule over the whole data grid".into(),
        ));
    }
    let grins = Grins::new(config)?.with_schedule(schedule);
    Ok(grins.reconstruct(data, diag)?)
}
