use ndarray::{arr2, array, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::activations::Activation;
use crate::error::DqnError;
use crate::network::{FunctionApproximator, Layer, NeuralNetwork};

fn seeded_network(sizes: &[usize], activations: &[Activation]) -> NeuralNetwork {
    let mut rng = StdRng::seed_from_u64(17);
    NeuralNetwork::new_using(sizes, activations, &mut rng).unwrap()
}

#[test]
fn test_neural_network_creation() {
    let network = NeuralNetwork::new(&[3, 4, 2], &[Activation::Relu, Activation::Linear]).unwrap();

    assert_eq!(network.layers.len(), 2);
    assert_eq!(network.layers[0].weights.shape(), [3, 4]);
    assert_eq!(network.layers[0].biases.shape(), [4]);
    assert_eq!(network.layers[1].weights.shape(), [4, 2]);
    assert_eq!(network.layers[1].biases.shape(), [2]);
    assert_eq!(network.input_size(), 3);
    assert_eq!(network.output_size(), 2);
}

#[test]
fn test_invalid_layer_sizes() {
    assert!(NeuralNetwork::new(&[3], &[]).is_err());
    assert!(NeuralNetwork::new(&[3, 0, 2], &[Activation::Relu, Activation::Linear]).is_err());
    assert!(NeuralNetwork::new(&[3, 4, 2], &[Activation::Relu]).is_err());
    assert!(NeuralNetwork::from_layers(vec![]).is_err());

    let first = Layer::new(3, 4, Activation::Relu);
    let second = Layer::new(5, 2, Activation::Linear);
    assert!(matches!(
        NeuralNetwork::from_layers(vec![first, second]),
        Err(DqnError::DimensionMismatch { .. })
    ));
    assert!(Layer::from_parts(Array2::zeros((2, 3)), array![0.0, 0.0], Activation::Linear).is_err());
}

#[test]
fn test_forward_batch_shape() {
    let mut network = seeded_network(&[3, 4, 2], &[Activation::Relu, Activation::Linear]);
    let inputs = arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);

    let outputs = network.forward(inputs.view()).unwrap();
    assert_eq!(outputs.shape(), [2, 2]);
}

#[test]
fn test_predict_matches_forward() {
    let mut network = seeded_network(&[3, 6, 2], &[Activation::Tanh, Activation::Linear]);
    let inputs = arr2(&[[0.5, -1.0, 2.0], [0.0, 0.3, -0.7]]);

    let predicted = network.predict(inputs.view()).unwrap();
    let forwarded = network.forward(inputs.view()).unwrap();
    assert_eq!(predicted, forwarded);
}

#[test]
fn test_linear_layer_values() {
    let layer = Layer::from_parts(arr2(&[[1.0, 2.0], [3.0, 4.0]]), array![0.5, -0.5], Activation::Linear).unwrap();
    let network = NeuralNetwork::from_layers(vec![layer]).unwrap();

    let outputs = network.predict(arr2(&[[1.0, 1.0]]).view()).unwrap();
    assert_eq!(outputs, arr2(&[[4.5, 5.5]]));
}

#[test]
fn test_input_size_mismatch() {
    let mut network = seeded_network(&[3, 4, 2], &[Activation::Relu, Activation::Linear]);
    let inputs = arr2(&[[1.0, 2.0]]);

    assert!(matches!(
        network.predict(inputs.view()),
        Err(DqnError::DimensionMismatch { .. })
    ));
    assert!(network.forward(inputs.view()).is_err());
}

#[test]
fn test_backward_requires_forward() {
    let mut network = seeded_network(&[3, 4, 2], &[Activation::Relu, Activation::Linear]);
    let grad = Array2::ones((1, 2));

    assert!(matches!(
        network.backward(grad.view()),
        Err(DqnError::TrainingError(_))
    ));
}

#[test]
fn test_backward_gradient_shape_mismatch() {
    let mut network = seeded_network(&[3, 4, 2], &[Activation::Relu, Activation::Linear]);
    network.forward(arr2(&[[1.0, 2.0, 3.0]]).view()).unwrap();

    let grad = Array2::ones((2, 2));
    assert!(network.backward(grad.view()).is_err());
}

#[test]
fn test_gradients_match_finite_differences() {
    let mut network = seeded_network(&[3, 4, 2], &[Activation::Tanh, Activation::Linear]);
    let inputs = arr2(&[[0.4, -0.8, 1.2], [-0.3, 0.9, 0.1]]);
    let upstream = arr2(&[[1.0, -0.5], [0.25, 2.0]]);

    network.zero_grad();
    network.forward(inputs.view()).unwrap();
    network.backward(upstream.view()).unwrap();

    // loss = Σ output ⊙ upstream, so dLoss/dOutput = upstream
    let loss = |net: &NeuralNetwork| (net.predict(inputs.view()).unwrap() * &upstream).sum();
    let h = 1e-2;

    for layer_index in 0..2 {
        let (rows, cols) = network.layers[layer_index].weights.dim();
        for i in 0..rows {
            for j in 0..cols {
                let mut plus = network.clone();
                plus.layers[layer_index].weights[[i, j]] += h;
                let mut minus = network.clone();
                minus.layers[layer_index].weights[[i, j]] -= h;
                let numeric = (loss(&plus) - loss(&minus)) / (2.0 * h);
                let analytic = network.layers[layer_index].weight_grad()[[i, j]];
                assert!(
                    (numeric - analytic).abs() < 1e-3,
                    "layer {} weight ({}, {}): numeric {} vs analytic {}",
                    layer_index,
                    i,
                    j,
                    numeric,
                    analytic
                );
            }
        }
        for j in 0..cols {
            let mut plus = network.clone();
            plus.layers[layer_index].biases[j] += h;
            let mut minus = network.clone();
            minus.layers[layer_index].biases[j] -= h;
            let numeric = (loss(&plus) - loss(&minus)) / (2.0 * h);
            let analytic = network.layers[layer_index].bias_grad()[j];
            assert!((numeric - analytic).abs() < 1e-3);
        }
    }
}

#[test]
fn test_gradients_accumulate_until_zeroed() {
    let mut network = seeded_network(&[2, 3, 1], &[Activation::Sigmoid, Activation::Linear]);
    let inputs = arr2(&[[0.5, -0.5]]);
    let upstream = arr2(&[[1.0]]);

    network.zero_grad();
    network.forward(inputs.view()).unwrap();
    network.backward(upstream.view()).unwrap();
    let once = network.layers[0].weight_grad().clone();

    network.forward(inputs.view()).unwrap();
    network.backward(upstream.view()).unwrap();
    let twice = network.layers[0].weight_grad().clone();
    for (a, b) in once.iter().zip(twice.iter()) {
        assert!((2.0 * a - b).abs() < 1e-6);
    }

    network.zero_grad();
    assert!(network.layers.iter().all(|layer| {
        layer.weight_grad().iter().all(|&g| g == 0.0) && layer.bias_grad().iter().all(|&g| g == 0.0)
    }));
}

#[test]
fn test_parameter_order_is_weights_then_biases() {
    let mut network = seeded_network(&[3, 4, 2], &[Activation::Relu, Activation::Linear]);

    let shapes: Vec<Vec<usize>> = network.parameters().iter().map(|p| p.shape().to_vec()).collect();
    assert_eq!(shapes, vec![vec![3, 4], vec![4], vec![4, 2], vec![2]]);

    let mutable_shapes: Vec<Vec<usize>> = network.parameters_mut().iter().map(|p| p.shape().to_vec()).collect();
    assert_eq!(shapes, mutable_shapes);

    let paired: Vec<(Vec<usize>, Vec<usize>)> = network
        .parameters_with_grads()
        .iter()
        .map(|p| (p.value.shape().to_vec(), p.grad.shape().to_vec()))
        .collect();
    for ((value, grad), shape) in paired.iter().zip(&shapes) {
        assert_eq!(value, shape);
        assert_eq!(grad, shape);
    }
}

#[test]
fn test_save_and_load() {
    let network = seeded_network(&[3, 5, 2], &[Activation::LeakyRelu { alpha: 0.01 }, Activation::Linear]);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("network.bin");

    network.save(&path).unwrap();
    let mut loaded = NeuralNetwork::load(&path).unwrap();
    assert_eq!(loaded.parameters(), network.parameters());
    assert_eq!(loaded.layers[0].activation, network.layers[0].activation);

    // Gradient buffers are rebuilt after loading.
    let inputs = arr2(&[[1.0, 0.0, -1.0]]);
    loaded.forward(inputs.view()).unwrap();
    loaded.backward(arr2(&[[1.0, 1.0]]).view()).unwrap();
    assert_eq!(loaded.layers[0].weight_grad().dim(), (3, 5));
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = NeuralNetwork::load(dir.path().join("missing.bin"));
    assert!(matches!(result, Err(DqnError::IoError(_))));
}
