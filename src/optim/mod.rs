//! # Optimization Algorithms (`optim`)
//!
//! Provides the DiffGrad update rule together with the host-facing pieces it
//! needs: parameter handles, gradient representations and the `Optimizer` trait
//! a training loop drives.

use crate::tensor::{Tensor, TensorData, TensorError};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// --- Submodules ---
pub mod diffgrad;
pub mod schedule;
pub mod state;

// Re-export the engine and its configuration
pub use diffgrad::{friction_coefficient, BaseOptions, DiffGrad, DiffGradConfig, SlotState};
pub use schedule::{ExponentialDecay, LearningRate, LearningRateSchedule};
pub use state::{OptimizerState, SerializableTensor, SlotSnapshot};

/// Order-independent snapshot of an optimizer's constructor arguments.
pub type ConfigMap = BTreeMap<String, serde_json::Value>;

// --- Errors ---

#[derive(thiserror::Error, Debug)]
pub enum OptimError {
    #[error("Missing value of `weight_decay` which is required and must be a float value")]
    MissingWeightDecay,
    #[error("Invalid hyperparameter `{name}`: {reason}")]
    InvalidHyperparameter { name: &'static str, reason: String },
    #[error("`exclude_from_weight_decay()` can only be configured before the optimizer is built")]
    AlreadyBuilt,
    #[error("Optimizer has not been built yet")]
    NotBuilt,
    #[error("Parameter {id} ('{name}') is not tracked by this optimizer")]
    UnknownParameter { id: ParamId, name: String },
    #[error("Parameter {id} ('{name}') appears more than once in the same step")]
    DuplicateParameter { id: ParamId, name: String },
    #[error("Invalid weight decay exclusion pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error("Unknown learning rate schedule class '{0}'")]
    UnknownSchedule(String),
    #[error("Invalid config entry `{key}`: {reason}")]
    InvalidConfig { key: String, reason: String },
    #[error("Optimizer state mismatch: {0}")]
    StateMismatch(String),
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

// --- Parameters ---

static NEXT_PARAM_ID: AtomicU64 = AtomicU64::new(1);

/// Stable handle identifying a parameter across steps.
///
/// Handles drawn by [`Parameter::new`] are unique within a process. Hosts that
/// restore optimizer state across processes should assign their own ids with
/// [`Parameter::with_id`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParamId(pub u64);

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A named, trainable tensor owned by the host model.
///
/// Cloning a `Parameter` keeps the same id and shares the tensor storage.
#[derive(Clone, Debug)]
pub struct Parameter {
    id: ParamId,
    name: String,
    tensor: Tensor,
}

impl Parameter {
    /// Wraps a tensor under a freshly allocated id.
    pub fn new(name: impl Into<String>, tensor: Tensor) -> Self {
        let id = ParamId(NEXT_PARAM_ID.fetch_add(1, Ordering::Relaxed));
        Self::with_id(id, name, tensor)
    }

    /// Wraps a tensor under a host-assigned id.
    pub fn with_id(id: ParamId, name: impl Into<String>, tensor: Tensor) -> Self {
        Parameter {
            id,
            name: name.into(),
            tensor,
        }
    }

    pub fn id(&self) -> ParamId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    pub fn shape(&self) -> &[usize] {
        self.tensor.shape()
    }
}

// --- Gradients ---

/// Gradient rows for a subset of a parameter's leading-dimension indices.
///
/// `values` has shape `[indices.len(), param_shape[1..]...]`. Rows that are not
/// listed received no gradient this step.
#[derive(Clone, Debug)]
pub struct IndexedRows {
    pub indices: Vec<usize>,
    pub values: ArrayD<TensorData>,
}

/// Gradient for one parameter at one step.
#[derive(Clone, Debug)]
pub enum Gradient {
    /// Every element received a gradient; shape equals the parameter's.
    Dense(ArrayD<TensorData>),
    /// Only the listed rows received a gradient.
    Sparse(IndexedRows),
}

impl Gradient {
    pub fn sparse(indices: Vec<usize>, values: ArrayD<TensorData>) -> Self {
        Gradient::Sparse(IndexedRows { indices, values })
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, Gradient::Sparse(_))
    }
}

impl From<ArrayD<TensorData>> for Gradient {
    fn from(values: ArrayD<TensorData>) -> Self {
        Gradient::Dense(values)
    }
}

// --- Optimizer Trait ---

/// Hooks a host training loop invokes on an update rule.
pub trait Optimizer {
    /// Registers the parameters and allocates per-parameter state.
    /// Only the first call has an effect.
    fn build(&mut self, params: &[&Parameter]);

    /// Applies one gradient to one parameter using the current step counter.
    fn update_step(&mut self, gradient: &Gradient, param: &Parameter) -> Result<(), OptimError>;

    /// Builds if needed, updates every pair with the same step index, then
    /// advances the step counter by one. An empty batch does nothing.
    fn apply_gradients(&mut self, grads_and_params: &[(&Gradient, &Parameter)]) -> Result<(), OptimError>;

    /// Snapshot of the constructor arguments.
    fn get_config(&self) -> ConfigMap;

    /// Number of completed `apply_gradients` calls.
    fn iterations(&self) -> u64;
}
