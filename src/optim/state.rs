//! # Optimizer State Snapshots
//!
//! Plain serializable copies of the per-parameter slots, keyed by parameter id,
//! so a host checkpointing system can enumerate and restore them.

use super::ParamId;
use crate::tensor::{TensorData, TensorError};
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Shape plus flat row-major data; `ArrayD` itself is stored this way.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerializableTensor {
    pub shape: Vec<usize>,
    pub data: Vec<TensorData>,
}

impl SerializableTensor {
    pub fn from_array(array: &ArrayD<TensorData>) -> Self {
        SerializableTensor {
            shape: array.shape().to_vec(),
            data: array.iter().copied().collect(),
        }
    }

    pub fn to_array(&self) -> Result<ArrayD<TensorData>, TensorError> {
        Ok(ArrayD::from_shape_vec(IxDyn(&self.shape), self.data.clone())?)
    }
}

/// State of one parameter slot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlotSnapshot {
    pub name: String,
    pub momentum: SerializableTensor,
    pub velocity: SerializableTensor,
    pub prev_gradient: SerializableTensor,
    pub velocity_hat: Option<SerializableTensor>,
}

/// Full optimizer state: the step counter and every slot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    pub iterations: u64,
    pub slots: BTreeMap<ParamId, SlotSnapshot>,
}
