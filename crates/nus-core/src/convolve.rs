//! FFT convolution of 1-, 2- and 3-D real matrices.
//!
//! Both operands are zero-padded to a common FFT-efficient size large
//! enough to hold the full linear convolution, multiplied in the
//! frequency domain and transformed back. The result is cropped at
//! `(k - 1) / 2` per dimension so it lines up with the unpadded input:
//! a kernel centred at index `(k - 1) / 2` leaves an impulse in place.

use crate::matrix::{copy_region, ComplexMatrix, MatrixError, RealMatrix};
use crate::spectral::{good_fft_size, Transformer};

/// Highest rank the convolution routines accept.
pub const MAX_CONVOLVE_RANK: usize = 3;

/// Convolution with a fixed kernel against data of a fixed shape.
///
/// The kernel transform is computed once, so the deconvolution loop can
/// convolve its running estimate many times at the cost of one forward
/// and one inverse transform each.
pub struct Convolver {
    data_sizes: Vec<usize>,
    fft_sizes: Vec<usize>,
    crop: Vec<usize>,
    kernel_ft: ComplexMatrix,
    transformer: Transformer,
}

impl Convolver {
    pub fn new(data_sizes: &[usize], kernel: &RealMatrix) -> Result<Self, MatrixError> {
        let rank = data_sizes.len();
        if rank == 0 || rank > MAX_CONVOLVE_RANK {
            return Err(MatrixError::UnsupportedRank(rank));
        }
        if kernel.ndim() != rank {
            return Err(MatrixError::ShapeMismatch {
                left: data_sizes.to_vec(),
                right: kernel.sizes().to_vec(),
            });
        }
        let fft_sizes: Vec<usize> = data_sizes
            .iter()
            .zip(kernel.sizes())
            .map(|(&n, &k)| good_fft_size(n + k - 1))
            .collect();
        let crop: Vec<usize> = kernel.sizes().iter().map(|&k| (k - 1) / 2).collect();

        let mut transformer = Transformer::new();
        let mut kernel_ft = kernel.to_complex().padded(&fft_sizes)?;
        kernel_ft.fft(&mut transformer);

        Ok(Self {
            data_sizes: data_sizes.to_vec(),
            fft_sizes,
            crop,
            kernel_ft,
            transformer,
        })
    }

    pub fn data_sizes(&self) -> &[usize] {
        &self.data_sizes
    }

    /// Convolve `data` with the kernel; the result has the shape of `data`.
    pub fn convolve(&mut self, data: &RealMatrix) -> Result<RealMatrix, MatrixError> {
        if data.sizes() != self.data_sizes.as_slice() {
            return Err(MatrixError::ShapeMismatch {
                left: self.data_sizes.clone(),
                right: data.sizes().to_vec(),
            });
        }
        let mut work = data.to_complex().padded(&self.fft_sizes)?;
        work.fft(&mut self.transformer);
        work.multiply(&self.kernel_ft)?;
        work.ifft(&mut self.transformer);

        let full = work.real();
        let mut out = RealMatrix::new(&self.data_sizes)?;
        let origin = vec![0; self.data_sizes.len()];
        copy_region(&full, &self.crop, &mut out, &origin, &self.data_sizes)?;
        Ok(out)
    }
}

/// One-shot convolution of `data` with `kernel`.
pub fn convolve(data: &RealMatrix, kernel: &RealMatrix) -> Result<RealMatrix, MatrixError> {
    Convolver::new(data.sizes(), kernel)?.convolve(data)
}

pub fn convolve_1d(data: &[f64], kernel: &[f64]) -> Result<Vec<f64>, MatrixError> {
    let d = RealMatrix::from_vec(&[data.len()], data.to_vec())?;
    let k = RealMatrix::from_vec(&[kernel.len()], kernel.to_vec())?;
    Ok(convolve(&d, &k)?.into_vec())
}

pub fn convolve_2d(data: &RealMatrix, kernel: &RealMatrix) -> Result<RealMatrix, MatrixError> {
    if data.ndim() != 2 {
        return Err(MatrixError::UnsupportedRank(data.ndim()));
    }
    convolve(data, kernel)
}

pub fn convolve_3d(data: &RealMatrix, kernel: &RealMatrix) -> Result<RealMatrix, MatrixError> {
    if data.ndim() != 3 {
        return Err(MatrixError::UnsupportedRank(data.ndim()));
    }
    convolve(data, kernel)
}
