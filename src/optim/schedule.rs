//! # Learning Rates
//!
//! A learning rate is either a constant or a schedule mapping the optimizer's
//! step counter to a scalar. Schedules serialize as
//! `{"class_name": ..., "config": {...}}` so they survive a config round trip.

use super::OptimError;
use crate::tensor::TensorData;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

/// A step index -> learning rate function.
pub trait LearningRateSchedule: fmt::Debug + Send + Sync {
    /// Learning rate to use at `step` (the optimizer's iteration count).
    fn learning_rate(&self, step: u64) -> TensorData;

    /// Name under which the schedule is serialized.
    fn class_name(&self) -> &'static str;

    /// Constructor arguments of the schedule.
    fn config(&self) -> Map<String, Value>;
}

/// Learning rate argument of an optimizer.
#[derive(Debug)]
pub enum LearningRate {
    Constant(TensorData),
    Schedule(Box<dyn LearningRateSchedule>),
}

impl LearningRate {
    /// Evaluates the learning rate at `step`.
    pub fn value(&self, step: u64) -> TensorData {
        match self {
            LearningRate::Constant(lr) => *lr,
            LearningRate::Schedule(schedule) => schedule.learning_rate(step),
        }
    }

    /// Serialized form used in an exported config.
    pub fn to_value(&self) -> Value {
        match self {
            LearningRate::Constant(lr) => json!(lr),
            LearningRate::Schedule(schedule) => json!({
                "class_name": schedule.class_name(),
                "config": Value::Object(schedule.config()),
            }),
        }
    }

    /// Rebuilds a learning rate from its serialized form.
    pub fn from_value(value: &Value) -> Result<Self, OptimError> {
        if let Some(lr) = value.as_f64() {
            return Ok(LearningRate::Constant(lr));
        }
        let invalid = |reason: &str| OptimError::InvalidConfig {
            key: "learning_rate".into(),
            reason: reason.into(),
        };
        let class_name = value
            .get("class_name")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("expected a number or a serialized schedule"))?;
        let config = value.get("config").cloned().unwrap_or_else(|| json!({}));

        match class_name {
            ExponentialDecay::CLASS_NAME => {
                let raw: ExponentialDecay =
                    serde_json::from_value(config).map_err(|e| invalid(&e.to_string()))?;
                let schedule = ExponentialDecay::new(
                    raw.initial_learning_rate,
                    raw.decay_steps,
                    raw.decay_rate,
                )?
                .staircase(raw.staircase);
                Ok(LearningRate::Schedule(Box::new(schedule)))
            }
            other => Err(OptimError::UnknownSchedule(other.to_string())),
        }
    }
}

impl From<TensorData> for LearningRate {
    fn from(lr: TensorData) -> Self {
        LearningRate::Constant(lr)
    }
}

impl Default for LearningRate {
    fn default() -> Self {
        LearningRate::Constant(0.001)
    }
}

/// `initial_learning_rate * decay_rate ^ (step / decay_steps)`.
///
/// With `staircase`, the exponent is floored so the rate drops in discrete
/// intervals.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExponentialDecay {
    initial_learning_rate: TensorData,
    decay_steps: u64,
    decay_rate: TensorData,
    #[serde(default)]
    staircase: bool,
}

impl ExponentialDecay {
    pub const CLASS_NAME: &'static str = "ExponentialDecay";

    pub fn new(
        initial_learning_rate: TensorData,
        decay_steps: u64,
        decay_rate: TensorData,
    ) -> Result<Self, OptimError> {
        if decay_steps == 0 {
            return Err(OptimError::InvalidHyperparameter {
                name: "decay_steps",
                reason: "must be positive".into(),
            });
        }
        Ok(ExponentialDecay {
            initial_learning_rate,
            decay_steps,
            decay_rate,
            staircase: false,
        })
    }

    /// Floors the decay exponent.
    pub fn staircase(mut self, staircase: bool) -> Self {
        self.staircase = staircase;
        self
    }
}

impl LearningRateSchedule for ExponentialDecay {
    fn learning_rate(&self, step: u64) -> TensorData {
        let mut exponent = step as TensorData / self.decay_steps as TensorData;
        if self.staircase {
            exponent = exponent.floor();
        }
        self.initial_learning_rate * self.decay_rate.powf(exponent)
    }

    fn class_name(&self) -> &'static str {
        Self::CLASS_NAME
    }

    fn config(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_decay_follows_closed_form() {
        let schedule = ExponentialDecay::new(0.1, 10, 0.5).unwrap();
        assert!((schedule.learning_rate(0) - 0.1).abs() < 1e-12);
        assert!((schedule.learning_rate(10) - 0.05).abs() < 1e-12);
        assert!((schedule.learning_rate(5) - 0.1 * 0.5f64.sqrt()).abs() < 1e-12);

        let stairs = schedule.clone().staircase(true);
        assert!((stairs.learning_rate(9) - 0.1).abs() < 1e-12);
        assert!((stairs.learning_rate(20) - 0.025).abs() < 1e-12);
    }

    #[test]
    fn zero_decay_steps_is_rejected() {
        let err = ExponentialDecay::new(0.1, 0, 0.5).unwrap_err();
        assert!(matches!(err, OptimError::InvalidHyperparameter { name: "decay_steps", .. }));
    }

    #[test]
    fn schedule_survives_serialization() {
        let lr = LearningRate::Schedule(Box::new(
            ExponentialDecay::new(0.01, 100, 0.9).unwrap().staircase(true),
        ));
        let value = lr.to_value();
        assert_eq!(value["class_name"], "ExponentialDecay");
        assert_eq!(value["config"]["decay_steps"], 100);

        let restored = LearningRate::from_value(&value).unwrap();
        for step in [0, 99, 100, 250, 1000] {
            assert_eq!(restored.value(step), lr.value(step));
        }
    }

    #[test]
    fn constants_and_unknown_classes() {
        let restored = LearningRate::from_value(&json!(0.25)).unwrap();
        assert_eq!(restored.value(42), 0.25);

        let err = LearningRate::from_value(&json!({"class_name": "CosineDecay", "config": {}}))
            .unwrap_err();
        assert!(matches!(err, OptimError::UnknownSchedule(name) if name == "CosineDecay"));

        let err = LearningRate::from_value(&json!("fast")).unwrap_err();
        assert!(matches!(err, OptimError::InvalidConfig { .. }));
    }
}
