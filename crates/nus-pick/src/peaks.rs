//! Peak records, from raw candidates to the written peak list.

use serde::{Deserialize, Serialize};

/// Grid local maximum of the deconvolved estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePeak {
    pub position: Vec<usize>,
    pub height: f64,
}

/// Sub-point position after squashing; height in deconvolved units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinedPeak {
    pub position: Vec<f64>,
    pub height: f64,
}

/// Per-dimension part of a written peak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakDim {
    pub ppm: f64,
    /// Position in points.
    pub point: f64,
    pub linewidth_ppm: f64,
    pub linewidth_points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub id: usize,
    pub dims: Vec<PeakDim>,
    pub intensity: f64,
    pub volume: f64,
}

/// Append-only list of picked peaks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeakList {
    pub name: String,
    /// Axis label per dimension.
    pub labels: Vec<String>,
    peaks: Vec<Peak>,
}

impl PeakList {
    pub fn new(name: &str, labels: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            labels,
            peaks: Vec::new(),
        }
    }

    /// Append a peak, assigning the next id.
    pub fn push(&mut self, dims: Vec<PeakDim>, intensity: f64, volume: f64) -> usize {
        let id = self.peaks.len();
        self.peaks.push(Peak {
            id,
            dims,
            intensity,
            volume,
        });
        id
    }

    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_follow_insertion() {
        let mut list = PeakList::new("picked", vec!["1H".into()]);
        let dim = PeakDim {
            ppm: 4.7,
            point: 10.0,
            linewidth_ppm: 0.01,
            linewidth_points: 2.0,
        };
        assert_eq!(list.push(vec![dim.clone()], 10.0, 31.4), 0);
        assert_eq!(list.push(vec![dim], 5.0, 15.7), 1);
        assert_eq!(list.len(), 2);
        assert_eq!(list.peaks()[1].id, 1);
    }
}
