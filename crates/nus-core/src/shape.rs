//! Row-major shape bookkeeping: sizes, strides and index-tuple iteration.
//!
//! `strides[i]` is the product of all sizes after `i`, so the last
//! dimension is the fast one. The offset of an index tuple is
//! `Σ index[i] · strides[i]`.

/// Sizes and derived strides of an N-D array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    sizes: Vec<usize>,
    strides: Vec<usize>,
    len: usize,
}

impl Shape {
    /// Build a shape. Callers validate that every size is > 0.
    pub(crate) fn new(sizes: &[usize]) -> Self {
        let mut strides = vec![1usize; sizes.len()];
        for i in (0..sizes.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * sizes[i + 1];
        }
        let len = sizes.iter().product();
        Self {
            sizes: sizes.to_vec(),
            strides,
            len,
        }
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn ndim(&self) -> usize {
        self.sizes.len()
    }

    /// Total element count.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset of an index tuple, or `None` if any index is out of range
    /// or the tuple has the wrong rank.
    pub fn offset(&self, indices: &[usize]) -> Option<usize> {
        if indices.len() != self.sizes.len() {
            return None;
        }
        let mut offset = 0;
        for ((&i, &n), &s) in indices.iter().zip(&self.sizes).zip(&self.strides) {
            if i >= n {
                return None;
            }
            offset += i * s;
        }
        Some(offset)
    }

    /// Offset of an index tuple without bounds checks.
    #[inline]
    pub fn offset_unchecked(&self, indices: &[usize]) -> usize {
        indices
            .iter()
            .zip(&self.strides)
            .map(|(&i, &s)| i * s)
            .sum()
    }

    /// Write the index tuple of `offset` into `out`.
    pub fn indices_into(&self, mut offset: usize, out: &mut [usize]) {
        for (d, &s) in self.strides.iter().enumerate() {
            out[d] = offset / s;
            offset %= s;
        }
    }

    /// Index tuple of a linear offset.
    pub fn indices_of(&self, offset: usize) -> Vec<usize> {
        let mut out = vec![0; self.sizes.len()];
        self.indices_into(offset, &mut out);
        out
    }

    /// Iterate every index tuple in row-major order.
    pub fn iter(&self) -> IndexIter {
        IndexIter::new(self.sizes.clone())
    }

    /// Starting offsets of every 1-D line running along `dim`.
    pub fn line_starts(&self, dim: usize) -> impl Iterator<Item = usize> + '_ {
        let stride = self.strides[dim];
        let size = self.sizes[dim];
        (0..self.len).filter(move |o| (o / stride) % size == 0)
    }
}

/// Streaming iterator over all index tuples of a shape (row-major).
#[derive(Debug, Clone)]
pub struct IndexIter {
    sizes: Vec<usize>,
    current: Vec<usize>,
    done: bool,
}

impl IndexIter {
    pub fn new(sizes: Vec<usize>) -> Self {
        let done = sizes.is_empty() || sizes.iter().any(|&n| n == 0);
        let current = vec![0; sizes.len()];
        Self {
            sizes,
            current,
            done,
        }
    }
}

impl Iterator for IndexIter {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.done {
            return None;
        }
        let out = self.current.clone();
        let mut d = self.current.len();
        loop {
            if d == 0 {
                self.done = true;
                break;
            }
            d -= 1;
            self.current[d] += 1;
            if self.current[d] < self.sizes[d] {
                break;
            }
            self.current[d] = 0;
        }
        Some(out)
    }
}

/// Iterator over every index tuple of a half-open box.
#[derive(Debug, Clone)]
pub struct BoxIter {
    start: Vec<usize>,
    end: Vec<usize>,
    current: Vec<usize>,
    done: bool,
}

impl BoxIter {
    pub fn new(start: &[usize], end: &[usize]) -> Self {
        let done = start.is_empty() || start.iter().zip(end).any(|(s, e)| s >= e);
        Self {
            start: start.to_vec(),
            end: end.to_vec(),
            current: start.to_vec(),
            done,
        }
    }
}

impl Iterator for BoxIter {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.done {
            return None;
        }
        let out = self.current.clone();
        let mut d = self.current.len();
        loop {
            if d == 0 {
                self.done = true;
                break;
            }
            d -= 1;
            self.current[d] += 1;
            if self.current[d] < self.end[d] {
                break;
            }
            self.current[d] = self.start[d];
        }
        Some(out)
    }
}
