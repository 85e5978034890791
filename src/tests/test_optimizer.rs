use ndarray::{arr2, ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::activations::Activation;
use crate::network::{FunctionApproximator, NeuralNetwork, ParameterMut};
use crate::optimizer::{Adam, Optimizer, OptimizerWrapper, SGD};

fn filled(shape: &[usize], value: f32) -> ArrayD<f32> {
    ArrayD::from_elem(IxDyn(shape), value)
}

#[test]
fn test_sgd_step() {
    let mut sgd = SGD::new();
    let mut weights = filled(&[2, 2], 1.0);
    let grads = filled(&[2, 2], 0.5);

    sgd.step(
        vec![ParameterMut {
            value: weights.view_mut(),
            grad: grads.view(),
        }],
        0.1,
    );

    assert!(weights.iter().all(|&w| (w - 0.95).abs() < 1e-6));
}

#[test]
fn test_adam_first_step_moves_by_learning_rate() {
    let mut adam = Adam::default();
    let mut weights = filled(&[3], 1.0);
    let grads = filled(&[3], 0.2);

    adam.step(
        vec![ParameterMut {
            value: weights.view_mut(),
            grad: grads.view(),
        }],
        0.1,
    );

    // Bias correction makes the first update lr · g / |g|.
    assert_eq!(adam.t, 1);
    assert!(weights.iter().all(|&w| (w - 0.9).abs() < 1e-5));
}

#[test]
fn test_adam_resets_moments_on_shape_change() {
    let mut adam = Adam::new(0.9, 0.999, 1e-8);
    let mut small = filled(&[2], 1.0);
    let small_grads = filled(&[2], 1.0);
    for _ in 0..3 {
        adam.step(
            vec![ParameterMut {
                value: small.view_mut(),
                grad: small_grads.view(),
            }],
            0.01,
        );
    }
    assert_eq!(adam.t, 3);

    let mut large = filled(&[4], 1.0);
    let large_grads = filled(&[4], -1.0);
    adam.step(
        vec![ParameterMut {
            value: large.view_mut(),
            grad: large_grads.view(),
        }],
        0.01,
    );
    assert_eq!(adam.t, 1);
    assert!(large.iter().all(|&w| (w - 1.01).abs() < 1e-5));
}

#[test]
fn test_wrapper_dispatch() {
    let mut wrapper = OptimizerWrapper::SGD(SGD::new());
    let mut weights = filled(&[1], 2.0);
    let grads = filled(&[1], 1.0);

    wrapper.step(
        vec![ParameterMut {
            value: weights.view_mut(),
            grad: grads.view(),
        }],
        0.5,
    );
    assert!((weights[[0]] - 1.5).abs() < 1e-6);

    let mut wrapper = OptimizerWrapper::Adam(Adam::default());
    wrapper.step(
        vec![ParameterMut {
            value: weights.view_mut(),
            grad: grads.view(),
        }],
        0.5,
    );
    assert!((weights[[0]] - 1.0).abs() < 1e-5);
    match wrapper {
        OptimizerWrapper::Adam(adam) => assert_eq!(adam.t, 1),
        OptimizerWrapper::SGD(_) => panic!("wrapper changed variant"),
    }
}

fn regression_loss(network: &NeuralNetwork) -> f32 {
    let inputs = arr2(&[[-1.0], [-0.5], [0.0], [0.5], [1.0]]);
    let targets = &inputs * 2.0;
    let outputs = network.predict(inputs.view()).unwrap();
    (&outputs - &targets).mapv(|d| d * d).mean().unwrap()
}

fn fit(optimizer: &mut OptimizerWrapper, learning_rate: f32, steps: usize) -> (f32, f32) {
    let mut rng = StdRng::seed_from_u64(3);
    let mut network = NeuralNetwork::new_using(&[1, 8, 1], &[Activation::Tanh, Activation::Linear], &mut rng).unwrap();
    let inputs = arr2(&[[-1.0], [-0.5], [0.0], [0.5], [1.0]]);
    let targets = &inputs * 2.0;
    let initial = regression_loss(&network);

    for _ in 0..steps {
        network.zero_grad();
        let outputs = network.forward(inputs.view()).unwrap();
        let grad = (&outputs - &targets) * (2.0 / inputs.nrows() as f32);
        network.backward(grad.view()).unwrap();
        optimizer.step(network.parameters_with_grads(), learning_rate);
    }
    (initial, regression_loss(&network))
}

#[test]
fn test_sgd_reduces_regression_loss() {
    let (initial, last) = fit(&mut OptimizerWrapper::SGD(SGD::new()), 0.05, 500);
    assert!(last < initial * 0.5, "loss went from {} to {}", initial, last);
}

#[test]
fn test_adam_reduces_regression_loss() {
    let (initial, last) = fit(&mut OptimizerWrapper::Adam(Adam::default()), 0.01, 500);
    assert!(last < initial * 0.1, "loss went from {} to {}", initial, last);
}

#[test]
fn test_adam_step_counter_drives_bias_correction() {
    let mut adam = Adam::default();
    let mut weights = filled(&[2], 1.0);
    let grads = filled(&[2], 0.3);

    for step in 1..=3usize {
        adam.step(
            vec![ParameterMut {
                value: weights.view_mut(),
                grad: grads.view(),
            }],
            0.1,
        );
        assert_eq!(adam.t, step);
    }

    // A constant gradient keeps the corrected ratio m̂ / √v̂ at 1.
    assert!(weights.iter().all(|&w| (w - 0.7).abs() < 1e-4));

    let restored: Adam = serde_json::from_str(&serde_json::to_string(&adam).unwrap()).unwrap();
    assert_eq!(restored.t, 3);
}
