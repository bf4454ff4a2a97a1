//! Glue between files on disk and the reconstruction and picking engines.

pub mod picking;
pub mod reconstruct;

use nus_core::{DatasetError, ScheduleError};
use nus_pick::PickError;
use nus_recon::ReconError;
use serde::de::DeserializeOwned;
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parameter file error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),
    #[error("Reconstruction error: {0}")]
    Recon(#[from] ReconError),
    #[error("Peak picking error: {0}")]
    Pick(#[from] PickError),
    #[error("{0}")]
    Invalid(String),
}

/// Options from a JSON file, or defaults when no file is given. Keys
/// missing from the file keep their default values.
pub fn load_params<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T, PipelineError> {
    match path {
        Some(p) => {
            let text = std::fs::read_to_string(p)?;
            let params = serde_json::from_str(&text)?;
            log::info!("Loaded parameters from {}", p.display());
            Ok(params)
        }
        None => Ok(T::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nus_pick::PickConfig;
    use nus_recon::{CutoffMode, IstConfig};

    #[test]
    fn test_missing_path_gives_defaults() {
        let config: PickConfig = load_params(None).unwrap();
        assert_eq!(config, PickConfig::default());
    }

    #[test]
    fn test_partial_params_file() {
        let path = std::env::temp_dir().join(format!("nmr-nus-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{ "loops": 20, "mode": "phased-positive" }"#).unwrap();
        let config: IstConfig = load_params(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(config.loops, 20);
        assert_eq!(config.mode, CutoffMode::PhasedPositive);
        assert_eq!(config.threshold, IstConfig::default().threshold);
    }

    #[test]
    fn test_malformed_params_file() {
        let path = std::env::temp_dir().join(format!("nmr-nus-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, "{ loops: ").unwrap();
        let result: Result<IstConfig, _> = load_params(Some(&path));
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(PipelineError::Json(_))));
    }
}
