//! Reconstruction of non-uniformly sampled acquisitions.
//!
//! Two algorithms share the matrix and schedule model of `nus-core`:
//! iterative soft thresholding ([`Ist`]) for 1-D or weave-ordered data and
//! the N-D peak-subtraction variant ([`Grins`]).

pub mod diagnostics;
pub mod error;
pub mod grins;
pub mod ist;
pub mod noise;

pub use diagnostics::{DiagnosticLog, IterationStats, SubtractedPeak};
pub use error::ReconError;
pub use grins::{Grins, GrinsConfig, GrinsReport};
pub use ist::{CutoffMode, Ist, IstConfig, IstReport};
pub use noise::estimate_noise;
