use nus_core::{MatrixError, ScheduleError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("no sample schedule supplied")]
    MissingSchedule,
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),
    #[error("Matrix error: {0}")]
    Matrix(#[from] MatrixError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
