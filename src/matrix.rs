//! Matrix and vector post-processing of engine outputs
//!
//! Engine outputs arrive as 2-D float32 tensors: one embedding per row for the
//! dual encoder, one `[negative, positive]` pair per row for the cross encoder.
//!
//! ## Norms
//!
//! [`Matrix::norm`] divides every element by the L2 norm of the *whole*
//! flattened buffer. With a single row that is ordinary unit normalization;
//! with several stacked embeddings every row is divided by the same scalar.
//! Use [`Matrix::normalize_rows`] to scale each row by its own magnitude.

use std::ops::Deref;

use crate::error::{Result, RocketQaError};
use crate::tensor::Tensor;

/// Dense row-major `rows x cols` float32 matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    data: Vec<f32>,
    rows: usize,
    cols: usize,
}

impl Matrix {
    /// Creates a matrix over a row-major buffer of exactly `rows * cols` elements.
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        let expected = rows.checked_mul(cols).ok_or_else(|| RocketQaError::ShapeMismatch {
            expected: "an addressable element count".to_string(),
            actual: vec![rows, cols],
        })?;
        if expected != data.len() {
            return Err(RocketQaError::ShapeMismatch {
                expected: format!("{expected} elements for {rows}x{cols}"),
                actual: vec![data.len()],
            });
        }
        Ok(Self { data, rows, cols })
    }

    /// Reinterpret a two-dimensional float32 tensor as a matrix.
    ///
    /// # Errors
    ///
    /// [`RocketQaError::ShapeMismatch`] unless the shape has exactly two
    /// dimensions, [`RocketQaError::DataType`] unless the payload is `f32`.
    pub fn from_tensor(tensor: &Tensor) -> Result<Self> {
        let [rows, cols] = tensor.shape[..] else {
            return Err(RocketQaError::ShapeMismatch {
                expected: "2 dimensions".to_string(),
                actual: tensor.shape.clone(),
            });
        };
        Self::new(rows, cols, tensor.as_f32()?.to_vec())
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn num_cols(&self) -> usize {
        self.cols
    }

    /// The i-th row, or `None` if out of range.
    #[inline]
    pub fn row(&self, i: usize) -> Option<&[f32]> {
        if i >= self.rows {
            return None;
        }
        let start = i * self.cols;
        Some(&self.data[start..start + self.cols])
    }

    /// The j-th column, or `None` if out of range.
    pub fn col(&self, j: usize) -> Option<Vec<f32>> {
        if j >= self.cols {
            return None;
        }
        Some(self.data.iter().skip(j).step_by(self.cols).copied().collect())
    }

    /// Iterate over rows.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        (0..self.rows).map(move |i| {
            let start = i * self.cols;
            &self.data[start..start + self.cols]
        })
    }

    /// All rows, copied out as vectors.
    pub fn rows(&self) -> Vec<Vector> {
        self.iter_rows().map(|r| Vector(r.to_vec())).collect()
    }

    /// All columns, copied out.
    pub fn cols(&self) -> Vec<Vec<f32>> {
        (0..self.cols).filter_map(|j| self.col(j)).collect()
    }

    /// Divide every element by the L2 norm of the entire buffer.
    ///
    /// An all-zero matrix is left unchanged.
    pub fn norm(&mut self) -> &mut Self {
        let magnitude = l2(&self.data);
        if magnitude > 0.0 {
            for x in &mut self.data {
                *x = (f64::from(*x) / magnitude) as f32;
            }
        }
        self
    }

    /// Divide each row by its own L2 norm. All-zero rows are left unchanged.
    pub fn normalize_rows(&mut self) -> &mut Self {
        if self.cols == 0 {
            return self;
        }
        for row in self.data.chunks_exact_mut(self.cols) {
            normalize_in_place(row);
        }
        self
    }

    /// The flat row-major buffer.
    #[inline]
    pub fn raw_data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_raw_data(self) -> Vec<f32> {
        self.data
    }
}

/// One embedding (a single matrix row).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vector(pub Vec<f32>);

impl Vector {
    /// Unit-normalized copy: every component divided by this vector's L2 norm.
    pub fn norm(&self) -> Vector {
        let mut out = self.0.clone();
        normalize_in_place(&mut out);
        Vector(out)
    }

    /// Widen to `f64` for consumers such as vector indexes.
    pub fn to_f64(&self) -> Vec<f64> {
        f32_to_f64(&self.0)
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl Deref for Vector {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.0
    }
}

impl From<Vec<f32>> for Vector {
    fn from(v: Vec<f32>) -> Self {
        Self(v)
    }
}

pub fn f32_to_f64(v: &[f32]) -> Vec<f64> {
    v.iter().copied().map(f64::from).collect()
}

pub fn f64_to_f32(v: &[f64]) -> Vec<f32> {
    v.iter().map(|&x| x as f32).collect()
}

fn l2(v: &[f32]) -> f64 {
    v.iter()
        .map(|&x| f64::from(x) * f64::from(x))
        .sum::<f64>()
        .sqrt()
}

fn normalize_in_place(v: &mut [f32]) {
    let magnitude = l2(v);
    if magnitude > 0.0 {
        for x in v.iter_mut() {
            *x = (f64::from(*x) / magnitude) as f32;
        }
    }
}
