//! # DiffGrad
//!
//! The DiffGrad update rule over shared `ndarray` tensors: Adam-style moment
//! estimates damped by a per-element friction coefficient, with decoupled
//! weight decay, optional AMSGrad, sparse (row-indexed) gradients and
//! per-parameter exclusion from weight decay.
//!
//! ```no_run
//! use diffgrad::optim::{DiffGrad, DiffGradConfig, Gradient, Optimizer, Parameter};
//! use diffgrad::tensor::zeros;
//! use ndarray::{ArrayD, IxDyn};
//!
//! let w = Parameter::new("dense/kernel", zeros(&[4, 2]));
//! let b = Parameter::new("dense/bias", zeros(&[2]));
//! let mut opt = DiffGrad::new(DiffGradConfig::default())?;
//! opt.exclude_from_weight_decay(&[], &["bias"])?;
//!
//! let gw = Gradient::Dense(ArrayD::from_elem(IxDyn(&[4, 2]), 0.1));
//! let gb = Gradient::Dense(ArrayD::from_elem(IxDyn(&[2]), -0.1));
//! opt.apply_gradients(&[(&gw, &w), (&gb, &b)])?;
//! # Ok::<(), diffgrad::optim::OptimError>(())
//! ```

pub mod optim;
pub mod tensor;
pub mod utils;

pub use optim::{DiffGrad, DiffGradConfig, Gradient, OptimError, Optimizer, Parameter};
pub use tensor::{Tensor, TensorData, TensorError};
