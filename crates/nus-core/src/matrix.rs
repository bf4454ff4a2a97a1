//! Dense N-dimensional matrices and boolean masks.
//!
//! A [`Matrix`] owns one contiguous row-major buffer. The complex
//! specialisation carries the transform and reduction operations every
//! reconstruction and peak-picking algorithm is built on; the `bool`
//! specialisation is the companion mask marking points that are already
//! explained or must stay zero.

use crate::shape::{BoxIter, IndexIter, Shape};
use crate::spectral::{self, Transformer};
use num_complex::Complex64;
use rustfft::num_traits::Zero;
use std::fmt;
use std::ops::{Index, IndexMut};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatrixError {
    #[error("invalid matrix shape {0:?}: every dimension needs at least one point")]
    InvalidShape(Vec<usize>),
    #[error("index out of bounds at offset {offset}: {}", format_bounds(.bounds))]
    OutOfBounds {
        offset: usize,
        /// `(index, size)` for every dimension.
        bounds: Vec<(usize, usize)>,
    },
    #[error("shape mismatch: {left:?} vs {right:?}")]
    ShapeMismatch { left: Vec<usize>, right: Vec<usize> },
    #[error("data length {got} does not match shape {sizes:?}")]
    LengthMismatch { sizes: Vec<usize>, got: usize },
    #[error("convolution supports 1 to 3 dimensions, got {0}")]
    UnsupportedRank(usize),
}

fn format_bounds(bounds: &[(usize, usize)]) -> String {
    bounds
        .iter()
        .enumerate()
        .map(|(d, (i, n))| format!("dim {}: {} of {}", d, i, n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Dense N-D array.
#[derive(Clone, PartialEq)]
pub struct Matrix<T> {
    shape: Shape,
    data: Vec<T>,
}

pub type ComplexMatrix = Matrix<Complex64>;
pub type RealMatrix = Matrix<f64>;
/// Companion mask of a matrix: same shape, one flag per point.
pub type Mask = Matrix<bool>;

impl<T: fmt::Debug> fmt::Debug for Matrix<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matrix")
            .field("sizes", &self.shape.sizes())
            .field("len", &self.data.len())
            .finish()
    }
}

fn check_sizes(sizes: &[usize]) -> Result<(), MatrixError> {
    if sizes.is_empty() || sizes.iter().any(|&n| n == 0) {
        return Err(MatrixError::InvalidShape(sizes.to_vec()));
    }
    Ok(())
}

impl<T: Copy + Default> Matrix<T> {
    /// Matrix of default values (zero / false).
    pub fn new(sizes: &[usize]) -> Result<Self, MatrixError> {
        Self::filled(sizes, T::default())
    }

    pub fn filled(sizes: &[usize], value: T) -> Result<Self, MatrixError> {
        check_sizes(sizes)?;
        let shape = Shape::new(sizes);
        let data = vec![value; shape.len()];
        Ok(Self { shape, data })
    }

    /// Wrap an existing row-major buffer.
    pub fn from_vec(sizes: &[usize], data: Vec<T>) -> Result<Self, MatrixError> {
        check_sizes(sizes)?;
        let shape = Shape::new(sizes);
        if data.len() != shape.len() {
            return Err(MatrixError::LengthMismatch {
                sizes: sizes.to_vec(),
                got: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn sizes(&self) -> &[usize] {
        self.shape.sizes()
    }

    pub fn strides(&self) -> &[usize] {
        self.shape.strides()
    }

    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Checked offset of an index tuple.
    pub fn offset(&self, indices: &[usize]) -> Result<usize, MatrixError> {
        self.shape.offset(indices).ok_or_else(|| MatrixError::OutOfBounds {
            offset: self.shape.offset_unchecked(indices),
            bounds: indices
                .iter()
                .copied()
                .zip(self.sizes().iter().copied().chain(std::iter::repeat(0)))
                .collect(),
        })
    }

    pub fn get(&self, indices: &[usize]) -> Result<T, MatrixError> {
        let o = self.offset(indices)?;
        Ok(self.data[o])
    }

    pub fn set(&mut self, indices: &[usize], value: T) -> Result<(), MatrixError> {
        let o = self.offset(indices)?;
        self.data[o] = value;
        Ok(())
    }

    /// Set every element to `value`.
    pub fn fill(&mut self, value: T) {
        self.data.iter_mut().for_each(|v| *v = value);
    }

    pub fn same_shape<U>(&self, other: &Matrix<U>) -> bool {
        self.shape.sizes() == other.shape.sizes()
    }

    pub(crate) fn check_same_shape<U>(&self, other: &Matrix<U>) -> Result<(), MatrixError> {
        if self.same_shape(other) {
            Ok(())
        } else {
            Err(MatrixError::ShapeMismatch {
                left: self.sizes().to_vec(),
                right: other.shape.sizes().to_vec(),
            })
        }
    }

    /// All index tuples in row-major order.
    pub fn indices(&self) -> IndexIter {
        self.shape.iter()
    }

    /// Fresh all-false mask of the same shape.
    pub fn mask(&self) -> Mask {
        Matrix {
            shape: self.shape.clone(),
            data: vec![false; self.data.len()],
        }
    }

    pub fn map<U, F: Fn(T) -> U>(&self, f: F) -> Matrix<U> {
        Matrix {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Copy of the box starting at `start` with extent `sizes`.
    pub fn sub_matrix(&self, start: &[usize], sizes: &[usize]) -> Result<Self, MatrixError> {
        let mut out = Self::new(sizes)?;
        copy_region(self, start, &mut out, &vec![0; sizes.len()], sizes)?;
        Ok(out)
    }

    /// Zero-filled copy enlarged to `sizes`, data kept at the origin.
    pub fn padded(&self, sizes: &[usize]) -> Result<Self, MatrixError> {
        if sizes.len() != self.ndim() || sizes.iter().zip(self.sizes()).any(|(n, m)| n < m) {
            return Err(MatrixError::ShapeMismatch {
                left: self.sizes().to_vec(),
                right: sizes.to_vec(),
            });
        }
        let mut out = Self::new(sizes)?;
        let origin = vec![0; sizes.len()];
        copy_region(self, &origin, &mut out, &origin, self.sizes())?;
        Ok(out)
    }
}

/// Copy the box `[src_start, src_start + sizes)` of `src` into `dst` at
/// `dst_start`. Both boxes must lie inside their matrices.
pub fn copy_region<T: Copy + Default>(
    src: &Matrix<T>,
    src_start: &[usize],
    dst: &mut Matrix<T>,
    dst_start: &[usize],
    sizes: &[usize],
) -> Result<(), MatrixError> {
    let ndim = src.ndim();
    if dst.ndim() != ndim || src_start.len() != ndim || dst_start.len() != ndim || sizes.len() != ndim
    {
        return Err(MatrixError::ShapeMismatch {
            left: src.sizes().to_vec(),
            right: dst.sizes().to_vec(),
        });
    }
    if sizes.iter().any(|&n| n == 0) {
        return Ok(());
    }
    // Validate both far corners once; every point in between is then valid.
    let src_last: Vec<usize> = src_start.iter().zip(sizes).map(|(s, n)| s + n - 1).collect();
    let dst_last: Vec<usize> = dst_start.iter().zip(sizes).map(|(s, n)| s + n - 1).collect();
    src.offset(&src_last)?;
    dst.offset(&dst_last)?;

    let zero = vec![0; ndim];
    let mut s_idx = vec![0; ndim];
    let mut d_idx = vec![0; ndim];
    for rel in BoxIter::new(&zero, sizes) {
        for d in 0..ndim {
            s_idx[d] = src_start[d] + rel[d];
            d_idx[d] = dst_start[d] + rel[d];
        }
        let so = src.shape.offset_unchecked(&s_idx);
        let dof = dst.shape.offset_unchecked(&d_idx);
        dst.data[dof] = src.data[so];
    }
    Ok(())
}

impl<T> Index<usize> for Matrix<T> {
    type Output = T;

    fn index(&self, offset: usize) -> &T {
        &self.data[offset]
    }
}

impl<T> IndexMut<usize> for Matrix<T> {
    fn index_mut(&mut self, offset: usize) -> &mut T {
        &mut self.data[offset]
    }
}

impl Mask {
    /// Number of set flags.
    pub fn count_set(&self) -> usize {
        self.data.iter().filter(|&&b| b).count()
    }
}

// ─── Real matrices ──────────────────────────────────────────────────────────

impl RealMatrix {
    /// Offset and value of the maximum element.
    pub fn max_value(&self) -> (usize, f64) {
        self.data
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, v)| {
                if v > best.1 {
                    (i, v)
                } else {
                    best
                }
            })
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    pub fn scale(&mut self, factor: f64) {
        self.data.iter_mut().for_each(|v| *v *= factor);
    }

    pub fn to_complex(&self) -> ComplexMatrix {
        self.map(|v| Complex64::new(v, 0.0))
    }
}

// ─── Complex matrices ───────────────────────────────────────────────────────

impl ComplexMatrix {
    /// Real parts as a real matrix.
    pub fn real(&self) -> RealMatrix {
        self.map(|z| z.re)
    }

    /// Forward FFT along one dimension (unnormalized, no shift).
    pub fn fft_dim(&mut self, dim: usize, transformer: &mut Transformer) {
        self.transform_dim(dim, |line| transformer.fft(line));
    }

    /// Inverse FFT along one dimension (normalized, no shift).
    pub fn ifft_dim(&mut self, dim: usize, transformer: &mut Transformer) {
        self.transform_dim(dim, |line| transformer.ifft(line));
    }

    /// Forward FFT along every dimension.
    pub fn fft(&mut self, transformer: &mut Transformer) {
        for d in 0..self.ndim() {
            self.fft_dim(d, transformer);
        }
    }

    /// Inverse FFT along every dimension.
    pub fn ifft(&mut self, transformer: &mut Transformer) {
        for d in (0..self.ndim()).rev() {
            self.ifft_dim(d, transformer);
        }
    }

    /// Zero- and first-order phase correction (degrees) along `dim`.
    pub fn phase_dim(&mut self, dim: usize, ph0: f64, ph1: f64) {
        if ph0 == 0.0 && ph1 == 0.0 {
            return;
        }
        self.transform_dim(dim, |line| spectral::phase(line, ph0, ph1));
    }

    /// Apply `f` to every line along `dim`, gathering and scattering
    /// through a contiguous buffer.
    pub fn transform_dim<F: FnMut(&mut [Complex64])>(&mut self, dim: usize, mut f: F) {
        let n = self.sizes()[dim];
        let stride = self.strides()[dim];
        let starts: Vec<usize> = self.shape.line_starts(dim).collect();
        let mut line = vec![Complex64::zero(); n];
        for start in starts {
            for (i, z) in line.iter_mut().enumerate() {
                *z = self.data[start + i * stride];
            }
            f(&mut line);
            for (i, z) in line.iter().enumerate() {
                self.data[start + i * stride] = *z;
            }
        }
    }

    /// Multiply every point whose index along `dim` is 0 by `factor`.
    pub fn scale_first_point(&mut self, dim: usize, factor: f64) {
        let starts: Vec<usize> = self.shape.line_starts(dim).collect();
        for start in starts {
            self.data[start] *= factor;
        }
    }

    pub fn scale(&mut self, factor: f64) {
        self.data.iter_mut().for_each(|z| *z *= factor);
    }

    /// Element-wise complex product, in place.
    pub fn multiply(&mut self, other: &ComplexMatrix) -> Result<(), MatrixError> {
        self.check_same_shape(other)?;
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a *= *b;
        }
        Ok(())
    }

    /// Element-wise sum, in place.
    pub fn add(&mut self, other: &ComplexMatrix) -> Result<(), MatrixError> {
        self.check_same_shape(other)?;
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += *b;
        }
        Ok(())
    }

    /// Set the listed offsets to zero.
    pub fn zero_offsets(&mut self, offsets: &[usize]) {
        for &o in offsets {
            self.data[o] = Complex64::zero();
        }
    }

    pub fn sum_magnitude(&self) -> f64 {
        self.data.iter().map(|z| z.norm()).sum()
    }

    /// Σ |z|², the total signal energy.
    pub fn energy(&self) -> f64 {
        self.data.iter().map(|z| z.norm_sqr()).sum()
    }

    /// Offset and value of the largest magnitude.
    pub fn max_magnitude(&self) -> (usize, f64) {
        spectral::max_magnitude(&self.data).unwrap_or((0, 0.0))
    }

    /// `(min, max)` of the real parts.
    pub fn real_extremes(&self) -> (f64, f64) {
        self.data
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), z| {
                (lo.min(z.re), hi.max(z.re))
            })
    }

    /// Root-mean-square difference against `other` over the listed offsets.
    pub fn difference(&self, other: &ComplexMatrix, offsets: &[usize]) -> Result<f64, MatrixError> {
        self.check_same_shape(other)?;
        if offsets.is_empty() {
            return Ok(0.0);
        }
        let sum: f64 = offsets
            .iter()
            .map(|&o| (self.data[o] - other.data[o]).norm_sqr())
            .sum();
        Ok((sum / offsets.len() as f64).sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_empty_dimension() {
        assert!(matches!(
            RealMatrix::new(&[4, 0]),
            Err(MatrixError::InvalidShape(_))
        ));
        assert!(RealMatrix::new(&[]).is_err());
    }

    #[test]
    fn test_get_set_by_index() {
        let mut m = RealMatrix::new(&[3, 4]).unwrap();
        m.set(&[2, 1], 7.5).unwrap();
        assert_eq!(m.get(&[2, 1]).unwrap(), 7.5);
        assert_eq!(m[2 * 4 + 1], 7.5);
    }

    #[test]
    fn test_out_of_bounds_reports_every_dimension() {
        let m = RealMatrix::new(&[3, 4]).unwrap();
        let err = m.get(&[1, 9]).unwrap_err();
        match &err {
            MatrixError::OutOfBounds { offset, bounds } => {
                assert_eq!(*offset, 4 + 9);
                assert_eq!(bounds, &vec![(1, 3), (9, 4)]);
            }
            other => panic!("unexpected error {:?}", other),
        }
        let msg = err.to_string();
        assert!(msg.contains("dim 1: 9 of 4"), "{}", msg);
    }

    #[test]
    fn test_clone_is_deep() {
        let mut a = RealMatrix::filled(&[2, 2], 1.0).unwrap();
        let b = a.clone();
        a.fill(3.0);
        assert_eq!(b.get(&[1, 1]).unwrap(), 1.0);
        assert_eq!(a.get(&[1, 1]).unwrap(), 3.0);
    }

    #[test]
    fn test_sub_matrix_and_padding() {
        let data: Vec<f64> = (0..12).map(|v| v as f64).collect();
        let m = RealMatrix::from_vec(&[3, 4], data).unwrap();
        let sub = m.sub_matrix(&[1, 1], &[2, 2]).unwrap();
        assert_eq!(sub.as_slice(), &[5.0, 6.0, 9.0, 10.0]);

        let padded = sub.padded(&[3, 3]).unwrap();
        assert_eq!(padded.as_slice(), &[5.0, 6.0, 0.0, 9.0, 10.0, 0.0, 0.0, 0.0, 0.0]);

        assert!(m.sub_matrix(&[2, 3], &[2, 2]).is_err());
    }

    #[test]
    fn test_mask_matches_shape() {
        let m = ComplexMatrix::new(&[5, 6]).unwrap();
        let mut mask = m.mask();
        assert!(mask.same_shape(&m));
        assert_eq!(mask.count_set(), 0);
        mask.set(&[4, 5], true).unwrap();
        assert_eq!(mask.count_set(), 1);
    }

    #[test]
    fn test_fft_2d_of_impulse() {
        let mut t = Transformer::new();
        let mut m = ComplexMatrix::new(&[4, 8]).unwrap();
        m.set(&[0, 0], Complex64::new(2.0, 0.0)).unwrap();
        m.fft(&mut t);
        for z in m.as_slice() {
            assert!((z.re - 2.0).abs() < 1e-12 && z.im.abs() < 1e-12);
        }
        m.ifft(&mut t);
        assert!((m.get(&[0, 0]).unwrap().re - 2.0).abs() < 1e-12);
        assert!(m.get(&[1, 3]).unwrap().norm() < 1e-12);
    }

    #[test]
    fn test_fft_dim_only_touches_one_axis() {
        let mut t = Transformer::new();
        let mut m = ComplexMatrix::new(&[2, 4]).unwrap();
        // Row 1 holds an impulse; transforming along dim 1 flattens only that row.
        m.set(&[1, 0], Complex64::new(1.0, 0.0)).unwrap();
        m.fft_dim(1, &mut t);
        for j in 0..4 {
            assert!(m.get(&[0, j]).unwrap().norm() < 1e-12);
            assert!((m.get(&[1, j]).unwrap().re - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_reductions() {
        let m = ComplexMatrix::from_vec(
            &[3],
            vec![
                Complex64::new(3.0, 4.0),
                Complex64::new(-1.0, 0.0),
                Complex64::new(2.0, 0.0),
            ],
        )
        .unwrap();
        assert!((m.sum_magnitude() - 8.0).abs() < 1e-12);
        assert!((m.energy() - 30.0).abs() < 1e-12);
        assert_eq!(m.max_magnitude(), (0, 5.0));
        assert_eq!(m.real_extremes(), (-1.0, 3.0));

        let mut n = m.clone();
        n[2] = Complex64::new(0.0, 0.0);
        assert!((m.difference(&n, &[2]).unwrap() - 2.0).abs() < 1e-12);
        assert_eq!(m.difference(&n, &[0, 1]).unwrap(), 0.0);
    }

    #[test]
    fn test_multiply_shape_mismatch() {
        let mut a = ComplexMatrix::new(&[4]).unwrap();
        let b = ComplexMatrix::new(&[5]).unwrap();
        assert!(matches!(
            a.multiply(&b),
            Err(MatrixError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_shape_check_across_element_types() {
        let values = RealMatrix::new(&[4, 3]).unwrap();
        assert!(values.check_same_shape(&values.mask()).is_ok());
        let other: Mask = RealMatrix::new(&[3, 4]).unwrap().mask();
        match values.check_same_shape(&other) {
            Err(MatrixError::ShapeMismatch { left, right }) => {
                assert_eq!(left, vec![4, 3]);
                assert_eq!(right, vec![3, 4]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
