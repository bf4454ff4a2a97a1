//! Convolution-based peak picking: PSF construction, region-parallel
//! multiplicative deconvolution, local maxima, squashing and the
//! cross-region merge into a peak list.

pub mod config;
pub mod deconvolve;
pub mod error;
pub mod peaks;
pub mod picker;
pub mod psf;
pub mod squash;
pub mod tiling;

pub use config::PickConfig;
pub use error::PickError;
pub use peaks::{CandidatePeak, Peak, PeakDim, PeakList, RefinedPeak};
pub use picker::{ConvolutionPicker, RegionFit};
pub use psf::Psf;
pub use squash::StrayPeak;
