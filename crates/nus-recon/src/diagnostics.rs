//! Line-oriented GRINS diagnostic log.
//!
//! One summary line per iteration
//! (`iteration peakCount threshold noiseThreshold maxBefore maxAfter`)
//! followed by one `peak` line per subtracted lineshape. Meant for reading,
//! not parsing.

use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// Summary of one GRINS iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationStats {
    /// 1-based.
    pub iteration: usize,
    pub peak_count: usize,
    pub threshold: f64,
    pub noise_threshold: f64,
    pub max_before: f64,
    pub max_after: f64,
    /// Offset of the largest absolute change made by the subtraction.
    pub max_change_offset: usize,
    pub max_change: f64,
}

/// A lineshape removed from the spectrum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtractedPeak {
    pub position: Vec<usize>,
    pub amplitude: (f64, f64),
    pub fwhm: Vec<f64>,
}

pub struct DiagnosticLog<'a> {
    sink: Option<&'a mut dyn Write>,
}

impl<'a> DiagnosticLog<'a> {
    pub fn new(sink: Option<&'a mut dyn Write>) -> Self {
        Self { sink }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub fn iteration(&mut self, stats: &IterationStats, peaks: &[SubtractedPeak]) -> io::Result<()> {
        let Some(out) = self.sink.as_mut() else {
            return Ok(());
        };
        writeln!(
            out,
            "{} {} {:.6e} {:.6e} {:.6e} {:.6e}",
            stats.iteration,
            stats.peak_count,
            stats.threshold,
            stats.noise_threshold,
            stats.max_before,
            stats.max_after
        )?;
        for p in peaks {
            let pos: Vec<String> = p.position.iter().map(|i| i.to_string()).collect();
            let fwhm: Vec<String> = p.fwhm.iter().map(|w| format!("{:.2}", w)).collect();
            writeln!(
                out,
                "peak {} amp {:.6e} {:.6e} fwhm {}",
                pos.join(","),
                p.amplitude.0,
                p.amplitude.1,
                fwhm.join(",")
            )?;
        }
        Ok(())
    }

    pub fn note(&mut self, message: &str) -> io::Result<()> {
        match self.sink.as_mut() {
            Some(out) => writeln!(out, "# {}", message),
            None => Ok(()),
        }
    }
}
