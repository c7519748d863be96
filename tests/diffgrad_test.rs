//! DiffGrad integration tests
//!
//! Drives the optimizer the way a training loop would: batches of gradients,
//! config export/import and checkpoint save/load.

use diffgrad::optim::{
    DiffGrad, DiffGradConfig, ExponentialDecay, Gradient, LearningRate, Optimizer, ParamId,
    Parameter,
};
use diffgrad::tensor::{Tensor, TensorData};
use diffgrad::utils::{load_state, save_state};
use ndarray::{ArrayD, Dimension, IxDyn};
use std::fs;

/// Gradient of `sum((x - target)^2)`.
fn quadratic_grad(param: &Parameter, target: &[TensorData]) -> Gradient {
    let x = param.tensor().to_vec();
    let g: Vec<TensorData> = x.iter().zip(target).map(|(x, t)| 2.0 * (x - t)).collect();
    Gradient::Dense(ArrayD::from_shape_vec(IxDyn(param.shape()), g).unwrap())
}

fn loss(param: &Parameter, target: &[TensorData]) -> TensorData {
    param
        .tensor()
        .to_vec()
        .iter()
        .zip(target)
        .map(|(x, t)| (x - t) * (x - t))
        .sum()
}

#[test]
fn test_minimizes_a_quadratic() {
    let target = [3.0, -1.0, 0.5, 2.0];
    let x = Parameter::new("x", Tensor::from_shape_vec(&[2, 2], vec![0.0; 4]).unwrap());
    let mut opt = DiffGrad::new(DiffGradConfig {
        learning_rate: LearningRate::Constant(0.05),
        weight_decay: Some(0.0),
        ..Default::default()
    })
    .unwrap();

    let initial = loss(&x, &target);
    for _ in 0..500 {
        let g = quadratic_grad(&x, &target);
        opt.apply_gradients(&[(&g, &x)]).unwrap();
    }
    assert_eq!(opt.iterations(), 500);
    let last = loss(&x, &target);
    assert!(last < initial * 1e-2, "loss {last} did not drop from {initial}");
}

#[test]
fn test_weight_decay_pulls_towards_zero() {
    let target = [1.0, 1.0];
    let make = || Parameter::new("w", Tensor::from_shape_vec(&[2], vec![0.0, 0.0]).unwrap());
    let (plain, decayed) = (make(), make());

    let mut plain_opt = DiffGrad::new(DiffGradConfig {
        learning_rate: LearningRate::Constant(0.05),
        weight_decay: Some(0.0),
        ..Default::default()
    })
    .unwrap();
    let mut decayed_opt = DiffGrad::new(DiffGradConfig {
        learning_rate: LearningRate::Constant(0.05),
        weight_decay: Some(1.0),
        ..Default::default()
    })
    .unwrap();

    for _ in 0..300 {
        let g = quadratic_grad(&plain, &target);
        plain_opt.apply_gradients(&[(&g, &plain)]).unwrap();
        let g = quadratic_grad(&decayed, &target);
        decayed_opt.apply_gradients(&[(&g, &decayed)]).unwrap();
    }
    let p = plain.tensor().to_vec();
    let d = decayed.tensor().to_vec();
    assert!(d[0] < p[0] && d[0] > 0.0);
}

#[test]
fn test_rebuilt_optimizer_produces_identical_updates() {
    let schedule = ExponentialDecay::new(0.01, 5, 0.8).unwrap().staircase(true);
    let original = DiffGrad::new(DiffGradConfig {
        learning_rate: LearningRate::Schedule(Box::new(schedule)),
        weight_decay: Some(0.01),
        amsgrad: true,
        ..Default::default()
    })
    .unwrap();
    let mut rebuilt = DiffGrad::from_config(&original.get_config()).unwrap();
    let mut original = original;

    let target = [0.5, -0.5, 1.5];
    let a = Parameter::new("a", Tensor::from_shape_vec(&[3], vec![1.0, 1.0, 1.0]).unwrap());
    let b = Parameter::new("b", Tensor::from_shape_vec(&[3], vec![1.0, 1.0, 1.0]).unwrap());
    for _ in 0..20 {
        let ga = quadratic_grad(&a, &target);
        original.apply_gradients(&[(&ga, &a)]).unwrap();
        let gb = quadratic_grad(&b, &target);
        rebuilt.apply_gradients(&[(&gb, &b)]).unwrap();
    }
    assert_eq!(a.tensor().to_vec(), b.tensor().to_vec());
}

#[test]
fn test_checkpoint_resumes_training_exactly() {
    let path = std::env::temp_dir().join(format!("diffgrad_state_{}.bin", std::process::id()));
    let target = [2.0, -2.0];
    let config = || DiffGradConfig {
        learning_rate: LearningRate::Constant(0.02),
        amsgrad: true,
        ..Default::default()
    };

    let x = Parameter::with_id(ParamId(1), "x", Tensor::from_shape_vec(&[2], vec![0.0, 0.0]).unwrap());
    let mut opt = DiffGrad::new(config()).unwrap();
    for _ in 0..10 {
        let g = quadratic_grad(&x, &target);
        opt.apply_gradients(&[(&g, &x)]).unwrap();
    }
    save_state(&opt, &path).unwrap();

    // A fresh process: same id, values restored from the model checkpoint.
    let resumed_x = Parameter::with_id(ParamId(1), "x", Tensor::new(x.tensor().data_clone()));
    let mut resumed = DiffGrad::new(config()).unwrap();
    resumed.build(&[&resumed_x]);
    load_state(&mut resumed, &path).unwrap();
    assert_eq!(resumed.iterations(), 10);

    for _ in 0..10 {
        let g = quadratic_grad(&x, &target);
        opt.apply_gradients(&[(&g, &x)]).unwrap();
        let g = quadratic_grad(&resumed_x, &target);
        resumed.apply_gradients(&[(&g, &resumed_x)]).unwrap();
    }
    assert_eq!(x.tensor().to_vec(), resumed_x.tensor().to_vec());

    fs::remove_file(&path).ok();
}

#[test]
fn test_embedding_rows_train_independently() {
    let table = Parameter::new(
        "embedding/table",
        Tensor::from_shape_vec(&[6, 3], vec![1.0; 18]).unwrap(),
    );
    let mut opt = DiffGrad::new(DiffGradConfig {
        weight_decay: Some(0.0),
        ..Default::default()
    })
    .unwrap();

    for step in 0..4 {
        let rows = vec![step % 3, (step + 1) % 3];
        let values = ArrayD::from_elem(IxDyn(&[2, 3]), 0.5);
        let g = Gradient::sparse(rows, values);
        opt.apply_gradients(&[(&g, &table)]).unwrap();
    }

    let data = table.tensor().data_clone();
    for row in 0..3 {
        assert!(data[[row, 0]] < 1.0);
    }
    for row in 3..6 {
        assert_eq!(data[[row, 0]], 1.0);
    }
}

#[test]
fn test_parallel_batch_matches_sequential_updates() {
    let shapes: Vec<Vec<usize>> = vec![vec![8, 4], vec![4], vec![16], vec![2, 2, 2]];
    let build_params = || -> Vec<Parameter> {
        shapes
            .iter()
            .enumerate()
            .map(|(i, shape)| {
                let n: usize = shape.iter().product();
                let values = (0..n).map(|j| (i * 31 + j) as TensorData * 0.01).collect();
                Parameter::new(format!("p{i}"), Tensor::from_shape_vec(shape, values).unwrap())
            })
            .collect()
    };
    let batched = build_params();
    let sequential = build_params();

    let mut batch_opt = DiffGrad::new(DiffGradConfig::default()).unwrap();
    let mut seq_opt = DiffGrad::new(DiffGradConfig::default()).unwrap();
    let refs: Vec<&Parameter> = sequential.iter().collect();
    seq_opt.build(&refs);

    for step in 0..5 {
        let grads: Vec<Gradient> = batched
            .iter()
            .map(|p| {
                Gradient::Dense(ArrayD::from_shape_fn(IxDyn(p.shape()), |idx| {
                    ((idx.as_array_view().sum() + step) as TensorData).sin()
                }))
            })
            .collect();

        let pairs: Vec<(&Gradient, &Parameter)> = grads.iter().zip(batched.iter()).collect();
        batch_opt.apply_gradients(&pairs).unwrap();

        for (g, p) in grads.iter().zip(sequential.iter()) {
            seq_opt.update_step(g, p).unwrap();
        }
        seq_opt.set_iterations(seq_opt.iterations() + 1).unwrap();
    }

    for (a, b) in batched.iter().zip(sequential.iter()) {
        assert_eq!(a.tensor().to_vec(), b.tensor().to_vec());
    }
}
