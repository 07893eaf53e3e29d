//! Host-side tensor descriptor consumed by the kernels.
//!
//! Kernels only ever read `dims()` and `dtype()`. The row-major host data is
//! carried so the CPU handler can upload it into unpacked textures.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};

use crate::{error::KernelError, shape};

/// Element type tag. Texture storage is always `f32`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Float32,
    Int32,
}

/// Stable identity used to key texture caches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorId(u64);

impl TensorId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Clone, Debug)]
pub struct Tensor {
    id: TensorId,
    dims: Vec<usize>,
    dtype: DataType,
    data: Arc<[f32]>,
}

impl Tensor {
    pub fn new(dims: Vec<usize>, data: Vec<f32>) -> Result<Self, KernelError> {
        Self::with_dtype(dims, DataType::Float32, data)
    }

    pub fn with_dtype(
        dims: Vec<usize>,
        dtype: DataType,
        data: Vec<f32>,
    ) -> Result<Self, KernelError> {
        let expected = shape::size(&dims);
        if data.len() != expected {
            return Err(KernelError::DataLengthMismatch {
                shape: dims,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            id: TensorId::next(),
            dims,
            dtype,
            data: data.into(),
        })
    }

    /// `1, 2, 3, ...` in row-major order. Handy for layout tests.
    pub fn iota(dims: Vec<usize>) -> Self {
        let n = shape::size(&dims);
        Self {
            id: TensorId::next(),
            dims,
            dtype: DataType::Float32,
            data: (1..=n).map(|v| v as f32).collect(),
        }
    }

    pub fn id(&self) -> TensorId {
        self.id
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Element at a logical index, row-major.
    pub fn get(&self, index: &[usize]) -> Option<f32> {
        if index.len() != self.dims.len() || index.iter().zip(&self.dims).any(|(i, d)| i >= d) {
            return None;
        }
        let offset: usize = index
            .iter()
            .zip(shape::strides(&self.dims))
            .map(|(i, s)| i * s)
            .sum();
        self.data.get(offset).copied()
    }
}
