//! Tensors exchanged with the inference engine
//!
//! A tensor is a shape plus a flat row-major buffer. The element type is a
//! closed tagged union over the types the engine produces, so consumers match
//! on it instead of downcasting.

use crate::error::{Result, RocketQaError};
use crate::token::TokenId;

/// Flat tensor payload, one variant per supported element type.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    I8(Vec<i8>),
    U8(Vec<u8>),
}

impl TensorData {
    /// Name of the element type, as used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::F32(_) => "f32",
            Self::I32(_) => "i32",
            Self::I64(_) => "i64",
            Self::I8(_) => "i8",
            Self::U8(_) => "u8",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::I64(v) => v.len(),
            Self::I8(v) => v.len(),
            Self::U8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A named-by-position engine input or output.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: TensorData,
}

impl Tensor {
    /// Creates a tensor, checking that the buffer fills the shape exactly.
    pub fn new(shape: Vec<usize>, data: TensorData) -> Result<Self> {
        let expected = shape
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| RocketQaError::ShapeMismatch {
                expected: "an addressable element count".to_string(),
                actual: shape.clone(),
            })?;
        if expected != data.len() {
            return Err(RocketQaError::ShapeMismatch {
                expected: format!("{expected} elements for shape {shape:?}"),
                actual: vec![data.len()],
            });
        }
        Ok(Self { shape, data })
    }

    /// Build a `[batch, seq_len, 1]` int64 tensor from equally long rows.
    pub fn from_batch_i64(rows: &[Vec<TokenId>]) -> Result<Self> {
        let (shape, flat) = flatten_batch(rows)?;
        Self::new(shape, TensorData::I64(flat))
    }

    /// Build a `[batch, seq_len, 1]` float32 tensor from equally long rows.
    pub fn from_batch_f32(rows: &[Vec<f32>]) -> Result<Self> {
        let (shape, flat) = flatten_batch(rows)?;
        Self::new(shape, TensorData::F32(flat))
    }

    pub fn num_elements(&self) -> usize {
        self.data.len()
    }

    /// Borrow the payload as `f32`, or fail with a data type error.
    pub fn as_f32(&self) -> Result<&[f32]> {
        match &self.data {
            TensorData::F32(v) => Ok(v),
            other => Err(RocketQaError::DataType {
                expected: "f32",
                actual: other.type_name(),
            }),
        }
    }

    /// Borrow the payload as `i64`, or fail with a data type error.
    pub fn as_i64(&self) -> Result<&[i64]> {
        match &self.data {
            TensorData::I64(v) => Ok(v),
            other => Err(RocketQaError::DataType {
                expected: "i64",
                actual: other.type_name(),
            }),
        }
    }
}

fn flatten_batch<T: Copy>(rows: &[Vec<T>]) -> Result<(Vec<usize>, Vec<T>)> {
    let seq_len = rows.first().map_or(0, Vec::len);
    if let Some(bad) = rows.iter().find(|r| r.len() != seq_len) {
        return Err(RocketQaError::ShapeMismatch {
            expected: format!("rows of length {seq_len}"),
            actual: vec![bad.len()],
        });
    }

    let mut flat = Vec::with_capacity(rows.len() * seq_len);
    for row in rows {
        flat.extend_from_slice(row);
    }
    Ok((vec![rows.len(), seq_len, 1], flat))
}
