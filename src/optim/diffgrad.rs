//! # DiffGrad Optimizer
//!
//! Reference: diffGrad: An Optimization Method for Convolutional Neural Networks
//! - https://arxiv.org/abs/1909.11015
//!
//! Adam-style moment estimates, damped per element by a friction coefficient
//! built from the change between the previous and the current gradient:
//!
//! ```text
//! m    += (g - m) * (1 - beta_1)
//! v    += (g^2 - v) * (1 - beta_2) + epsilon
//! dfc   = 1 + exp(-|p - g|)          (p = previous gradient)
//! p     = g
//! alpha = lr * sqrt(1 - beta_2^t) / (1 - beta_1^t)
//! x    -= m * alpha / (dfc * sqrt(v))
//! ```
//!
//! Epsilon is folded into the velocity average on every step rather than added
//! to the denominator. Weight decay is decoupled and applied before the update.

use super::schedule::LearningRate;
use super::state::{OptimizerState, SerializableTensor, SlotSnapshot};
use super::{ConfigMap, Gradient, IndexedRows, OptimError, Optimizer, ParamId, Parameter};
use crate::tensor::{TensorData, TensorError};
use log::{debug, warn};
use ndarray::{ArrayD, Axis, IxDyn, Zip};
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

/// `1 + exp(-|prev - grad|)`: 2 when the gradient did not change, tending to 1
/// as the change grows.
#[inline]
pub fn friction_coefficient(prev: TensorData, grad: TensorData) -> TensorData {
    1.0 + (-(prev - grad).abs()).exp()
}

// --- Configuration ---

/// Generic optimizer options owned by the host training loop.
///
/// They are stored and exported unchanged; the update rule never reads them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseOptions {
    pub name: String,
    pub clipnorm: Option<TensorData>,
    pub clipvalue: Option<TensorData>,
    pub global_clipnorm: Option<TensorData>,
    pub use_ema: bool,
    pub ema_momentum: TensorData,
    pub ema_overwrite_frequency: Option<u64>,
    pub jit_compile: bool,
}

impl Default for BaseOptions {
    fn default() -> Self {
        BaseOptions {
            name: "DiffGrad".to_string(),
            clipnorm: None,
            clipvalue: None,
            global_clipnorm: None,
            use_ema: false,
            ema_momentum: 0.99,
            ema_overwrite_frequency: None,
            jit_compile: true,
        }
    }
}

/// Constructor arguments of [`DiffGrad`].
///
/// `weight_decay` has no "off" sentinel: `None` is rejected, use `Some(0.0)`
/// to disable decay.
#[derive(Debug)]
pub struct DiffGradConfig {
    pub learning_rate: LearningRate,
    pub weight_decay: Option<TensorData>,
    pub beta_1: TensorData,
    pub beta_2: TensorData,
    pub epsilon: TensorData,
    pub amsgrad: bool,
    pub base: BaseOptions,
}

impl Default for DiffGradConfig {
    fn default() -> Self {
        DiffGradConfig {
            learning_rate: LearningRate::default(),
            weight_decay: Some(0.004),
            beta_1: 0.9,
            beta_2: 0.999,
            epsilon: 1e-16,
            amsgrad: false,
            base: BaseOptions::default(),
        }
    }
}

// --- Per-parameter state ---

/// Optimizer state of one parameter. Shapes always match the parameter.
#[derive(Clone, Debug)]
pub struct SlotState {
    id: ParamId,
    name: String,
    momentum: ArrayD<TensorData>,
    velocity: ArrayD<TensorData>,
    prev_gradient: ArrayD<TensorData>,
    velocity_hat: Option<ArrayD<TensorData>>,
    use_weight_decay: bool,
}

impl SlotState {
    fn zeros(param: &Parameter, amsgrad: bool, use_weight_decay: bool) -> Self {
        let shape = IxDyn(param.shape());
        SlotState {
            id: param.id(),
            name: param.name().to_string(),
            momentum: ArrayD::zeros(shape.clone()),
            velocity: ArrayD::zeros(shape.clone()),
            prev_gradient: ArrayD::zeros(shape.clone()),
            velocity_hat: amsgrad.then(|| ArrayD::zeros(shape)),
            use_weight_decay,
        }
    }

    pub fn id(&self) -> ParamId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// EMA of gradients.
    pub fn momentum(&self) -> &ArrayD<TensorData> {
        &self.momentum
    }

    /// EMA of squared gradients (epsilon included).
    pub fn velocity(&self) -> &ArrayD<TensorData> {
        &self.velocity
    }

    /// Last gradient seen for each element.
    pub fn prev_gradient(&self) -> &ArrayD<TensorData> {
        &self.prev_gradient
    }

    /// Running maximum of `velocity`; present only with AMSGrad.
    pub fn velocity_hat(&self) -> Option<&ArrayD<TensorData>> {
        self.velocity_hat.as_ref()
    }

    pub fn uses_weight_decay(&self) -> bool {
        self.use_weight_decay
    }

    fn snapshot(&self) -> SlotSnapshot {
        SlotSnapshot {
            name: self.name.clone(),
            momentum: SerializableTensor::from_array(&self.momentum),
            velocity: SerializableTensor::from_array(&self.velocity),
            prev_gradient: SerializableTensor::from_array(&self.prev_gradient),
            velocity_hat: self.velocity_hat.as_ref().map(SerializableTensor::from_array),
        }
    }

    fn restored(&self, snapshot: &SlotSnapshot) -> Result<SlotState, OptimError> {
        let expected = self.momentum.shape();
        let load = |tensor: &SerializableTensor| -> Result<ArrayD<TensorData>, OptimError> {
            let array = tensor.to_array()?;
            if array.shape() != expected {
                return Err(TensorError::ShapeMismatch {
                    expected: expected.to_vec(),
                    got: array.shape().to_vec(),
                }
                .into());
            }
            Ok(array)
        };

        let velocity_hat = match (&self.velocity_hat, &snapshot.velocity_hat) {
            (Some(_), Some(tensor)) => Some(load(tensor)?),
            (None, None) => None,
            (Some(_), None) => {
                return Err(OptimError::StateMismatch(format!(
                    "missing velocity_hat for parameter {} ('{}')",
                    self.id, self.name
                )))
            }
            (None, Some(_)) => {
                return Err(OptimError::StateMismatch(format!(
                    "unexpected velocity_hat for parameter {} ('{}'), amsgrad is disabled",
                    self.id, self.name
                )))
            }
        };

        Ok(SlotState {
            id: self.id,
            name: self.name.clone(),
            momentum: load(&snapshot.momentum)?,
            velocity: load(&snapshot.velocity)?,
            prev_gradient: load(&snapshot.prev_gradient)?,
            velocity_hat,
            use_weight_decay: self.use_weight_decay,
        })
    }

    fn dense_update(&mut self, var: &mut ArrayD<TensorData>, grad: &ArrayD<TensorData>, s: &StepScalars) {
        let (c1, c2, eps) = (1.0 - s.beta_1, 1.0 - s.beta_2, s.epsilon);

        Zip::from(&mut self.momentum)
            .and(grad)
            .for_each(|m, &g| *m += (g - *m) * c1);
        Zip::from(&mut self.velocity)
            .and(grad)
            .for_each(|v, &g| *v += (g * g - *v) * c2 + eps);

        // Each element reads its previous gradient before overwriting it.
        let mut dfc = ArrayD::<TensorData>::zeros(grad.raw_dim());
        Zip::from(&mut dfc)
            .and(&mut self.prev_gradient)
            .and(grad)
            .for_each(|d, p, &g| {
                *d = friction_coefficient(*p, g);
                *p = g;
            });

        let velocity = amsgrad_velocity(&self.velocity, &mut self.velocity_hat);
        let alpha = s.alpha;
        Zip::from(var)
            .and(&self.momentum)
            .and(&dfc)
            .and(velocity)
            .for_each(|x, &m, &d, &v| *x -= (m * alpha) / (d * v.sqrt()));
    }

    fn sparse_update(&mut self, var: &mut ArrayD<TensorData>, rows: &IndexedRows, s: &StepScalars) {
        let (c1, c2, eps) = (1.0 - s.beta_1, 1.0 - s.beta_2, s.epsilon);
        let (indices, values) = coalesce_rows(rows);

        // Untouched rows saw a zero gradient: decay everything, then add the
        // new contribution at the touched rows.
        self.momentum.mapv_inplace(|m| m + -m * c1);
        self.velocity.mapv_inplace(|v| v + -v * c2);

        let mut dfc = ArrayD::<TensorData>::zeros(values.raw_dim());
        for (j, &row) in indices.iter().enumerate() {
            let row_grad = values.index_axis(Axis(0), j);
            Zip::from(self.momentum.index_axis_mut(Axis(0), row))
                .and(&row_grad)
                .for_each(|m, &g| *m += g * c1);
            Zip::from(self.velocity.index_axis_mut(Axis(0), row))
                .and(&row_grad)
                .for_each(|v, &g| *v += g * g * c2 + eps);
            Zip::from(dfc.index_axis_mut(Axis(0), j))
                .and(self.prev_gradient.index_axis_mut(Axis(0), row))
                .and(&row_grad)
                .for_each(|d, p, &g| {
                    *d = friction_coefficient(*p, g);
                    *p = g;
                });
        }

        let velocity = amsgrad_velocity(&self.velocity, &mut self.velocity_hat);
        let alpha = s.alpha;
        for (j, &row) in indices.iter().enumerate() {
            Zip::from(var.index_axis_mut(Axis(0), row))
                .and(self.momentum.index_axis(Axis(0), row))
                .and(dfc.index_axis(Axis(0), j))
                .and(velocity.index_axis(Axis(0), row))
                .for_each(|x, &m, &d, &v| *x -= (m * alpha) / (d * v.sqrt()));
        }
    }
}

/// With AMSGrad, folds `velocity` into its running maximum and returns the
/// maximum; otherwise returns `velocity` itself.
fn amsgrad_velocity<'a>(
    velocity: &'a ArrayD<TensorData>,
    velocity_hat: &'a mut Option<ArrayD<TensorData>>,
) -> &'a ArrayD<TensorData> {
    match velocity_hat {
        Some(vhat) => {
            Zip::from(&mut *vhat)
                .and(velocity)
                .for_each(|h, &v| *h = (*h).max(v));
            &*vhat
        }
        None => velocity,
    }
}

/// Sums the value rows of repeated indices so each row is updated once.
fn coalesce_rows(rows: &IndexedRows) -> (Vec<usize>, Cow<'_, ArrayD<TensorData>>) {
    let mut position = HashMap::with_capacity(rows.indices.len());
    let mut unique = Vec::with_capacity(rows.indices.len());
    for &row in &rows.indices {
        position.entry(row).or_insert_with(|| {
            unique.push(row);
            unique.len() - 1
        });
    }
    if unique.len() == rows.indices.len() {
        return (unique, Cow::Borrowed(&rows.values));
    }

    let mut shape = rows.values.shape().to_vec();
    shape[0] = unique.len();
    let mut values = ArrayD::<TensorData>::zeros(IxDyn(&shape));
    for (j, row) in rows.indices.iter().enumerate() {
        let mut dst = values.index_axis_mut(Axis(0), position[row]);
        dst += &rows.values.index_axis(Axis(0), j);
    }
    (unique, Cow::Owned(values))
}

/// Checks a gradient against the shape of the parameter it updates.
fn validate_gradient(gradient: &Gradient, shape: &[usize]) -> Result<(), TensorError> {
    match gradient {
        Gradient::Dense(grad) => {
            if grad.shape() != shape {
                return Err(TensorError::ShapeMismatch {
                    expected: shape.to_vec(),
                    got: grad.shape().to_vec(),
                });
            }
        }
        Gradient::Sparse(rows) => {
            let Some(&num_rows) = shape.first() else {
                return Err(TensorError::Generic(
                    "Indexed gradients need a parameter with at least one dimension".into(),
                ));
            };
            let mut expected = Vec::with_capacity(shape.len());
            expected.push(rows.indices.len());
            expected.extend_from_slice(&shape[1..]);
            if rows.values.shape() != expected.as_slice() {
                return Err(TensorError::ShapeMismatch {
                    expected,
                    got: rows.values.shape().to_vec(),
                });
            }
            if let Some(&row) = rows.indices.iter().find(|&&row| row >= num_rows) {
                return Err(TensorError::IndexOutOfBounds {
                    index: vec![row],
                    shape: shape.to_vec(),
                });
            }
        }
    }
    Ok(())
}

/// Scalars shared by every parameter updated at the same step.
#[derive(Clone, Copy, Debug)]
struct StepScalars {
    lr: TensorData,
    alpha: TensorData,
    weight_decay: TensorData,
    beta_1: TensorData,
    beta_2: TensorData,
    epsilon: TensorData,
}

fn apply_update(
    slot: &mut SlotState,
    s: &StepScalars,
    gradient: &Gradient,
    param: &Parameter,
) -> Result<(), OptimError> {
    let mut var = param.tensor().data_mut();
    validate_gradient(gradient, var.shape())?;
    if slot.momentum.shape() != var.shape() {
        return Err(TensorError::ShapeMismatch {
            expected: slot.momentum.shape().to_vec(),
            got: var.shape().to_vec(),
        }
        .into());
    }

    if slot.use_weight_decay {
        let (wd, lr) = (s.weight_decay, s.lr);
        var.mapv_inplace(|x| x - x * wd * lr);
    }

    match gradient {
        Gradient::Dense(grad) => slot.dense_update(&mut var, grad, s),
        Gradient::Sparse(rows) => slot.sparse_update(&mut var, rows, s),
    }
    Ok(())
}

// --- Engine ---

/// Implements the DiffGrad algorithm.
#[derive(Debug)]
pub struct DiffGrad {
    learning_rate: LearningRate,
    weight_decay: TensorData,
    beta_1: TensorData,
    beta_2: TensorData,
    epsilon: TensorData,
    amsgrad: bool,
    base: BaseOptions,

    // Number of completed steps, shared by all parameters.
    iterations: u64,
    built: bool,
    index: HashMap<ParamId, usize>,
    slots: Vec<SlotState>,

    exclude_ids: HashSet<ParamId>,
    exclude_names: Vec<Regex>,
}

fn invalid(name: &'static str, reason: impl Into<String>) -> OptimError {
    OptimError::InvalidHyperparameter {
        name,
        reason: reason.into(),
    }
}

impl DiffGrad {
    /// Creates a new DiffGrad optimizer.
    ///
    /// Fails with [`OptimError::MissingWeightDecay`] when `weight_decay` is
    /// `None`, and with [`OptimError::InvalidHyperparameter`] for a negative
    /// constant learning rate, negative epsilon or weight decay, or a beta
    /// outside `[0, 1)`.
    pub fn new(config: DiffGradConfig) -> Result<Self, OptimError> {
        let DiffGradConfig {
            learning_rate,
            weight_decay,
            beta_1,
            beta_2,
            epsilon,
            amsgrad,
            base,
        } = config;

        let weight_decay = weight_decay.ok_or(OptimError::MissingWeightDecay)?;

        // --- Input Validation ---
        if let LearningRate::Constant(lr) = &learning_rate {
            if !(0.0 <= *lr) {
                return Err(invalid("learning_rate", "must be >= 0"));
            }
        }
        if !(0.0 <= weight_decay) {
            return Err(invalid("weight_decay", "must be >= 0"));
        }
        if !(0.0 <= beta_1 && beta_1 < 1.0) {
            return Err(invalid("beta_1", "must be in [0, 1)"));
        }
        if !(0.0 <= beta_2 && beta_2 < 1.0) {
            return Err(invalid("beta_2", "must be in [0, 1)"));
        }
        if !(0.0 <= epsilon) {
            return Err(invalid("epsilon", "must be >= 0"));
        }

        Ok(DiffGrad {
            learning_rate,
            weight_decay,
            beta_1,
            beta_2,
            epsilon,
            amsgrad,
            base,
            iterations: 0,
            built: false,
            index: HashMap::new(),
            slots: Vec::new(),
            exclude_ids: HashSet::new(),
            exclude_names: Vec::new(),
        })
    }

    /// Rebuilds an optimizer from the output of [`Optimizer::get_config`].
    ///
    /// Missing keys take their defaults; an explicit `null` weight decay is
    /// rejected like a missing constructor argument.
    pub fn from_config(config: &ConfigMap) -> Result<Self, OptimError> {
        let defaults = DiffGradConfig::default();

        let base: BaseOptions = serde_json::from_value(Value::Object(
            config.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        ))
        .map_err(|e| OptimError::InvalidConfig {
            key: "base options".into(),
            reason: e.to_string(),
        })?;

        let learning_rate = match config.get("learning_rate") {
            Some(value) => LearningRate::from_value(value)?,
            None => defaults.learning_rate,
        };
        let weight_decay = match config.get("weight_decay") {
            None => defaults.weight_decay,
            Some(Value::Null) => None,
            Some(_) => config_number(config, "weight_decay")?,
        };
        let amsgrad = match config.get("amsgrad") {
            None => defaults.amsgrad,
            Some(value) => value.as_bool().ok_or_else(|| OptimError::InvalidConfig {
                key: "amsgrad".into(),
                reason: format!("expected a bool, got {value}"),
            })?,
        };

        Self::new(DiffGradConfig {
            learning_rate,
            weight_decay,
            beta_1: config_number(config, "beta_1")?.unwrap_or(defaults.beta_1),
            beta_2: config_number(config, "beta_2")?.unwrap_or(defaults.beta_2),
            epsilon: config_number(config, "epsilon")?.unwrap_or(defaults.epsilon),
            amsgrad,
            base,
        })
    }

    /// Exempts parameters from weight decay, by id or by name pattern.
    ///
    /// A parameter is exempt if it is listed in `params`, or if any of
    /// `name_patterns` matches anywhere in its name (`"bias"` exempts
    /// `"dense/bias:0"`). Replaces any earlier exclusion lists. Must be called
    /// before the optimizer is built.
    pub fn exclude_from_weight_decay(
        &mut self,
        params: &[&Parameter],
        name_patterns: &[&str],
    ) -> Result<(), OptimError> {
        if self.built {
            return Err(OptimError::AlreadyBuilt);
        }
        let patterns = name_patterns
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<Vec<_>, _>>()?;

        self.exclude_ids = params.iter().map(|p| p.id()).collect();
        self.exclude_names = patterns;
        Ok(())
    }

    /// Whether decoupled weight decay applies to `param`.
    pub fn use_weight_decay(&self, param: &Parameter) -> bool {
        if self.exclude_ids.contains(&param.id()) {
            return false;
        }
        !self.exclude_names.iter().any(|re| re.is_match(param.name()))
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Advances the step counter, e.g. when a host drives `update_step`
    /// directly. The counter never moves backwards; restoring an older
    /// checkpoint goes through [`DiffGrad::load_state_dict`].
    pub fn set_iterations(&mut self, iterations: u64) -> Result<(), OptimError> {
        if iterations < self.iterations {
            return Err(invalid(
                "iterations",
                format!("cannot move the step counter back from {} to {}", self.iterations, iterations),
            ));
        }
        self.iterations = iterations;
        Ok(())
    }

    /// Learning rate the next step will use.
    pub fn current_learning_rate(&self) -> TensorData {
        self.learning_rate.value(self.iterations)
    }

    pub fn weight_decay(&self) -> TensorData {
        self.weight_decay
    }

    pub fn amsgrad(&self) -> bool {
        self.amsgrad
    }

    pub fn base_options(&self) -> &BaseOptions {
        &self.base
    }

    /// State of a tracked parameter.
    pub fn slot(&self, id: ParamId) -> Option<&SlotState> {
        self.index.get(&id).map(|&i| &self.slots[i])
    }

    /// All slots, in registration order.
    pub fn slots(&self) -> &[SlotState] {
        &self.slots
    }

    /// Copies the step counter and every slot out for checkpointing.
    pub fn state_dict(&self) -> OptimizerState {
        OptimizerState {
            iterations: self.iterations,
            slots: self.slots.iter().map(|slot| (slot.id, slot.snapshot())).collect(),
        }
    }

    /// Restores a snapshot taken by [`DiffGrad::state_dict`].
    ///
    /// The optimizer must already be built over the same parameters; every
    /// slot is validated before any is replaced.
    pub fn load_state_dict(&mut self, state: &OptimizerState) -> Result<(), OptimError> {
        if !self.built {
            return Err(OptimError::NotBuilt);
        }
        if let Some(id) = state.slots.keys().find(|&id| !self.index.contains_key(id)) {
            return Err(OptimError::StateMismatch(format!(
                "unexpected state for parameter {id}"
            )));
        }

        let mut restored = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let snapshot = state.slots.get(&slot.id).ok_or_else(|| {
                OptimError::StateMismatch(format!(
                    "missing state for parameter {} ('{}')",
                    slot.id, slot.name
                ))
            })?;
            restored.push(slot.restored(snapshot)?);
        }

        self.slots = restored;
        self.iterations = state.iterations;
        debug!(
            "DiffGrad: restored {} slot(s) at iteration {}",
            self.slots.len(),
            self.iterations
        );
        Ok(())
    }

    fn slot_index(&self, param: &Parameter) -> Result<usize, OptimError> {
        self.index
            .get(&param.id())
            .copied()
            .ok_or_else(|| OptimError::UnknownParameter {
                id: param.id(),
                name: param.name().to_string(),
            })
    }

    fn step_scalars(&self) -> StepScalars {
        let lr = self.learning_rate.value(self.iterations);
        let local_step = (self.iterations + 1) as TensorData;
        let beta_1_power = self.beta_1.powf(local_step);
        let beta_2_power = self.beta_2.powf(local_step);
        StepScalars {
            lr,
            alpha: lr * (1.0 - beta_2_power).sqrt() / (1.0 - beta_1_power),
            weight_decay: self.weight_decay,
            beta_1: self.beta_1,
            beta_2: self.beta_2,
            epsilon: self.epsilon,
        }
    }
}

fn config_number(config: &ConfigMap, key: &str) -> Result<Option<TensorData>, OptimError> {
    match config.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| OptimError::InvalidConfig {
                key: key.to_string(),
                reason: format!("expected a number, got {value}"),
            }),
    }
}

impl Optimizer for DiffGrad {
    fn build(&mut self, params: &[&Parameter]) {
        if self.built {
            let ignored = params
                .iter()
                .filter(|p| !self.index.contains_key(&p.id()))
                .count();
            if ignored > 0 {
                warn!(
                    "DiffGrad is already built; ignoring {} parameter(s) it has no state for",
                    ignored
                );
            }
            return;
        }
        self.built = true;

        for param in params {
            if self.index.contains_key(&param.id()) {
                continue;
            }
            let slot = SlotState::zeros(param, self.amsgrad, self.use_weight_decay(param));
            self.index.insert(param.id(), self.slots.len());
            self.slots.push(slot);
        }
        debug!(
            "DiffGrad: built {} slot(s) ({} exempt from weight decay, amsgrad = {})",
            self.slots.len(),
            self.slots.iter().filter(|s| !s.use_weight_decay).count(),
            self.amsgrad
        );
    }

    fn update_step(&mut self, gradient: &Gradient, param: &Parameter) -> Result<(), OptimError> {
        let slot = self.slot_index(param)?;
        let scalars = self.step_scalars();
        apply_update(&mut self.slots[slot], &scalars, gradient, param)
    }

    fn apply_gradients(&mut self, grads_and_params: &[(&Gradient, &Parameter)]) -> Result<(), OptimError> {
        // Nothing to build or count.
        if grads_and_params.is_empty() {
            return Ok(());
        }
        if !self.built {
            let params: Vec<&Parameter> = grads_and_params.iter().map(|&(_, p)| p).collect();
            self.build(&params);
        }

        // Resolve and validate everything before touching any state.
        let mut jobs: Vec<Option<(&Gradient, &Parameter)>> = vec![None; self.slots.len()];
        for &(gradient, param) in grads_and_params {
            let slot = self.slot_index(param)?;
            if jobs[slot].is_some() {
                return Err(OptimError::DuplicateParameter {
                    id: param.id(),
                    name: param.name().to_string(),
                });
            }
            validate_gradient(gradient, param.shape())?;
            jobs[slot] = Some((gradient, param));
        }

        let scalars = self.step_scalars();
        debug!(
            "DiffGrad step {}: {} parameter(s), lr = {}",
            self.iterations + 1,
            grads_and_params.len(),
            scalars.lr
        );

        self.slots
            .par_iter_mut()
            .zip(jobs.par_iter())
            .try_for_each(|(slot, job)| match job {
                Some((gradient, param)) => apply_update(slot, &scalars, gradient, param),
                None => Ok(()),
            })?;

        self.iterations += 1;
        Ok(())
    }

    fn get_config(&self) -> ConfigMap {
        let mut config = ConfigMap::new();
        if let Ok(Value::Object(base)) = serde_json::to_value(&self.base) {
            config.extend(base);
        }
        config.insert("learning_rate".into(), self.learning_rate.to_value());
        config.insert("weight_decay".into(), json!(self.weight_decay));
        config.insert("beta_1".into(), json!(self.beta_1));
        config.insert("beta_2".into(), json!(self.beta_2));
        config.insert("epsilon".into(), json!(self.epsilon));
        config.insert("amsgrad".into(), json!(self.amsgrad));
        config
    }

    fn iterations(&self) -> u64 {
        self.iterations
    }
}
