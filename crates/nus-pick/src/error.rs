use nus_core::{DatasetError, MatrixError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PickError {
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),
    #[error("Matrix error: {0}")]
    Matrix(#[from] MatrixError),
    #[error("Worker pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}
