//! Core data model for non-uniform sampling reconstruction and peak
//! picking: N-D matrices and masks, sample schedules, regions, the
//! dataset abstraction, lineshapes, and the 1-D spectral primitives
//! (FFT, phase, thresholding, convolution) the algorithms are built on.

pub mod convolve;
pub mod dataset;
pub mod lineshape;
pub mod matrix;
pub mod region;
pub mod schedule;
pub mod shape;
pub mod spectral;

pub use convolve::{convolve, Convolver};
pub use dataset::{Axis, Dataset, DatasetError, MemoryDataset};
pub use lineshape::Lineshape;
pub use matrix::{ComplexMatrix, Mask, Matrix, MatrixError, RealMatrix};
pub use region::Region;
pub use schedule::{SampleSchedule, ScheduleError};
pub use shape::{BoxIter, IndexIter, Shape};
pub use spectral::Transformer;

pub use num_complex::Complex64;
