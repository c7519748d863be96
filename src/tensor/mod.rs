//! # Tensor Module
//!
//! Shared, interior-mutable tensor storage used for model parameters.
//! A `Tensor` is a cheap handle: cloning it shares the underlying data, so the
//! host model and the optimizer observe the same values after an in-place update.

use ndarray::{ArrayD, IxDyn};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

// --- Error Handling ---
#[derive(thiserror::Error, Debug)]
pub enum TensorError {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("Index out of bounds: index {index:?} for shape {shape:?}")]
    IndexOutOfBounds {
        index: Vec<usize>,
        shape: Vec<usize>,
    },
    #[error("ndarray error: {0}")]
    NdarrayError(#[from] ndarray::ShapeError),
    #[error("Generic error: {0}")]
    Generic(String),
}

/// Element type of every tensor in the crate.
pub type TensorData = f64;

/// # Tensor
///
/// Wraps an `ndarray::ArrayD` behind `Arc<RwLock<...>>` so that parameters can be
/// shared between the model that owns them and the optimizer that mutates them.
#[derive(Clone, Debug)]
pub struct Tensor {
    data: Arc<RwLock<ArrayD<TensorData>>>,
    shape: Vec<usize>,
}

impl Tensor {
    /// Creates a new Tensor from an ndarray::ArrayD.
    pub fn new(data: ArrayD<TensorData>) -> Self {
        let shape = data.shape().to_vec();
        Tensor {
            data: Arc::new(RwLock::new(data)),
            shape,
        }
    }

    /// Creates a Tensor from a flat vector laid out in row-major order.
    pub fn from_shape_vec(shape: &[usize], values: Vec<TensorData>) -> Result<Self, TensorError> {
        let data = ArrayD::from_shape_vec(IxDyn(shape), values)?;
        Ok(Self::new(data))
    }

    /// Creates a rank-0 tensor holding a single value.
    pub fn scalar(value: TensorData) -> Self {
        Self::new(ArrayD::from_elem(IxDyn(&[]), value))
    }

    /// Returns the shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Returns the total number of elements.
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    /// Provides read-only access to the underlying data.
    /// Note: This locks the RwLock for reading.
    pub fn data(&self) -> RwLockReadGuard<'_, ArrayD<TensorData>> {
        self.data.read().expect("Tensor data RwLock poisoned")
    }

    /// Provides mutable access to the underlying data.
    /// Note: This locks the RwLock for writing.
    pub fn data_mut(&self) -> RwLockWriteGuard<'_, ArrayD<TensorData>> {
        self.data.write().expect("Tensor data RwLock poisoned")
    }

    /// Clones the underlying data into a new ArrayD.
    pub fn data_clone(&self) -> ArrayD<TensorData> {
        self.data().clone()
    }

    /// Copies the values out in row-major order.
    pub fn to_vec(&self) -> Vec<TensorData> {
        self.data().iter().copied().collect()
    }

    /// True when both handles share the same storage.
    pub fn shares_storage(&self, other: &Tensor) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

// --- Helper functions ---

/// Helper to create a tensor filled with zeros.
pub fn zeros(shape: &[usize]) -> Tensor {
    Tensor::new(ArrayD::zeros(IxDyn(shape)))
}

/// Helper to create a tensor filled with ones.
pub fn ones(shape: &[usize]) -> Tensor {
    Tensor::new(ArrayD::ones(IxDyn(shape)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_storage() {
        let a = zeros(&[2, 3]);
        let b = a.clone();
        b.data_mut()[[1, 2]] = 4.0;
        assert_eq!(a.data()[[1, 2]], 4.0);
        assert!(a.shares_storage(&b));
        assert!(!a.shares_storage(&zeros(&[2, 3])));
    }

    #[test]
    fn from_shape_vec_rejects_bad_length() {
        let err = Tensor::from_shape_vec(&[2, 2], vec![1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, TensorError::NdarrayError(_)));
    }

    #[test]
    fn scalar_has_rank_zero() {
        let t = Tensor::scalar(1.5);
        assert_eq!(t.ndim(), 0);
        assert_eq!(t.size(), 1);
        assert_eq!(t.to_vec(), vec![1.5]);
        assert_eq!(ones(&[3]).to_vec(), vec![1.0; 3]);
    }
}
