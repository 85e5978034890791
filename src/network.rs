use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use bincode::{deserialize, serialize};
use log::info;
use ndarray::{Array1, Array2, ArrayView2, ArrayViewD, ArrayViewMutD, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activations::Activation;
use crate::error::{DqnError, Result};

/// A mutable parameter tensor together with its accumulated gradient.
pub struct ParameterMut<'a> {
    pub value: ArrayViewMutD<'a, f32>,
    pub grad: ArrayViewD<'a, f32>,
}

/// A differentiable function mapping a batch of states to a batch of action values.
///
/// The agent only talks to its networks through this trait. `predict` is the
/// gradient-free path used for acting and for computing targets; `forward`
/// records whatever `backward` needs. Gradients accumulate across `backward`
/// calls until `zero_grad`.
///
/// Parameter collections are ordered and stable: two approximators of the same
/// architecture return tensors of matching shapes at matching positions.
pub trait FunctionApproximator {
    /// Dimension of a single state.
    fn input_size(&self) -> usize;

    /// Number of actions (width of every output row).
    fn output_size(&self) -> usize;

    /// Evaluate without recording anything for a backward pass.
    fn predict(&self, inputs: ArrayView2<f32>) -> Result<Array2<f32>>;

    /// Evaluate and record the activations needed by [`backward`](Self::backward).
    fn forward(&mut self, inputs: ArrayView2<f32>) -> Result<Array2<f32>>;

    /// Reset accumulated gradients to zero.
    fn zero_grad(&mut self);

    /// Back-propagate `output_grad` (dLoss/dOutput of the last `forward`) and
    /// accumulate parameter gradients.
    fn backward(&mut self, output_grad: ArrayView2<f32>) -> Result<()>;

    fn parameters(&self) -> Vec<ArrayViewD<'_, f32>>;

    fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>>;

    /// Parameters paired with their gradients, in the order of [`parameters`](Self::parameters).
    fn parameters_with_grads(&mut self) -> Vec<ParameterMut<'_>>;
}

/// A fully connected layer: `activation(inputs · weights + biases)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Layer {
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
    pub activation: Activation,
    #[serde(skip)]
    weight_grad: Array2<f32>,
    #[serde(skip)]
    bias_grad: Array1<f32>,
    #[serde(skip)]
    inputs: Option<Array2<f32>>,
    #[serde(skip)]
    pre_activation_output: Option<Array2<f32>>,
}

impl Layer {
    /// Create a new layer with the given input size, output size, and activation function.
    /// The weights are initialized with random values from a uniform distribution
    /// between -0.1 and 0.1. The biases are initialized with zeros.
    pub fn new(input_size: usize, output_size: usize, activation: Activation) -> Self {
        let weights = Array2::random((input_size, output_size), Uniform::new(-0.1, 0.1));
        Self::with_weights(weights, Array1::zeros(output_size), activation)
    }

    /// Same as [`Layer::new`] but draws the initial weights from `rng`.
    pub fn new_using<R: Rng + ?Sized>(
        input_size: usize,
        output_size: usize,
        activation: Activation,
        rng: &mut R,
    ) -> Self {
        let weights = Array2::random_using((input_size, output_size), Uniform::new(-0.1, 0.1), rng);
        Self::with_weights(weights, Array1::zeros(output_size), activation)
    }

    /// Build a layer from explicit parameters.
    pub fn from_parts(weights: Array2<f32>, biases: Array1<f32>, activation: Activation) -> Result<Self> {
        if weights.ncols() != biases.len() {
            return Err(DqnError::dimension_mismatch(
                format!("{} biases", weights.ncols()),
                format!("{} biases", biases.len()),
            ));
        }
        Ok(Self::with_weights(weights, biases, activation))
    }

    fn with_weights(weights: Array2<f32>, biases: Array1<f32>, activation: Activation) -> Self {
        let weight_grad = Array2::zeros(weights.dim());
        let bias_grad = Array1::zeros(biases.len());
        Layer {
            weights,
            biases,
            activation,
            weight_grad,
            bias_grad,
            inputs: None,
            pre_activation_output: None,
        }
    }

    pub fn input_size(&self) -> usize {
        self.weights.nrows()
    }

    pub fn output_size(&self) -> usize {
        self.weights.ncols()
    }

    pub fn weight_grad(&self) -> &Array2<f32> {
        &self.weight_grad
    }

    pub fn bias_grad(&self) -> &Array1<f32> {
        &self.bias_grad
    }

    fn affine(&self, inputs: ArrayView2<f32>) -> Array2<f32> {
        inputs.dot(&self.weights) + &self.biases.view().insert_axis(Axis(0))
    }

    fn predict(&self, inputs: ArrayView2<f32>) -> Array2<f32> {
        let mut outputs = self.affine(inputs);
        self.activation.apply_batch(&mut outputs);
        outputs
    }

    fn forward(&mut self, inputs: ArrayView2<f32>) -> Array2<f32> {
        let pre_activation = self.affine(inputs);
        let mut outputs = pre_activation.clone();
        self.activation.apply_batch(&mut outputs);
        self.inputs = Some(inputs.to_owned());
        self.pre_activation_output = Some(pre_activation);
        outputs
    }

    /// Accumulates gradients for this layer and returns the error with respect to its inputs.
    fn backward(&mut self, output_errors: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.ensure_grads();
        let (inputs, pre_activation) = match (&self.inputs, &self.pre_activation_output) {
            (Some(inputs), Some(pre_activation)) => (inputs, pre_activation),
            _ => {
                return Err(DqnError::TrainingError(
                    "backward() called before forward()".to_string(),
                ))
            }
        };
        if output_errors.dim() != pre_activation.dim() {
            return Err(DqnError::dimension_mismatch(
                format!("{:?}", pre_activation.dim()),
                format!("{:?}", output_errors.dim()),
            ));
        }

        let adjusted_error = &output_errors * &self.activation.derivative_batch(pre_activation.view());
        self.weight_grad += &inputs.t().dot(&adjusted_error);
        self.bias_grad += &adjusted_error.sum_axis(Axis(0));
        Ok(adjusted_error.dot(&self.weights.t()))
    }

    // Gradients are not serialized, so a loaded layer starts with empty buffers.
    fn ensure_grads(&mut self) {
        if self.weight_grad.dim() != self.weights.dim() {
            self.weight_grad = Array2::zeros(self.weights.dim());
        }
        if self.bias_grad.len() != self.biases.len() {
            self.bias_grad = Array1::zeros(self.biases.len());
        }
    }
}

/// A multi-layer perceptron trained by plain backpropagation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NeuralNetwork {
    pub layers: Vec<Layer>,
}

impl NeuralNetwork {
    /// Create a new neural network with the given layer sizes and activations.
    ///
    /// `layer_sizes` includes the input and output sizes, so `activations` must
    /// have exactly one entry fewer.
    pub fn new(layer_sizes: &[usize], activations: &[Activation]) -> Result<Self> {
        Self::validate_sizes(layer_sizes, activations)?;
        let layers = layer_sizes
            .windows(2)
            .zip(activations.iter())
            .map(|(window, &activation)| Layer::new(window[0], window[1], activation))
            .collect();
        Ok(NeuralNetwork { layers })
    }

    /// Same as [`NeuralNetwork::new`] with weights drawn from `rng`.
    pub fn new_using<R: Rng + ?Sized>(
        layer_sizes: &[usize],
        activations: &[Activation],
        rng: &mut R,
    ) -> Result<Self> {
        Self::validate_sizes(layer_sizes, activations)?;
        let layers = layer_sizes
            .windows(2)
            .zip(activations.iter())
            .map(|(window, &activation)| Layer::new_using(window[0], window[1], activation, rng))
            .collect();
        Ok(NeuralNetwork { layers })
    }

    /// Assemble a network from prepared layers; consecutive layers must chain.
    pub fn from_layers(layers: Vec<Layer>) -> Result<Self> {
        if layers.is_empty() {
            return Err(DqnError::invalid_parameter("layers", "at least one layer is required"));
        }
        for pair in layers.windows(2) {
            if pair[0].output_size() != pair[1].input_size() {
                return Err(DqnError::dimension_mismatch(
                    format!("layer input of {}", pair[0].output_size()),
                    format!("layer input of {}", pair[1].input_size()),
                ));
            }
        }
        Ok(NeuralNetwork { layers })
    }

    fn validate_sizes(layer_sizes: &[usize], activations: &[Activation]) -> Result<()> {
        if layer_sizes.len() < 2 {
            return Err(DqnError::invalid_parameter(
                "layer_sizes",
                "must contain at least input and output sizes",
            ));
        }
        if layer_sizes.iter().any(|&size| size == 0) {
            return Err(DqnError::invalid_parameter("layer_sizes", "every size must be at least 1"));
        }
        if activations.len() != layer_sizes.len() - 1 {
            return Err(DqnError::invalid_parameter(
                "activations",
                "number of activations must match number of layers - 1",
            ));
        }
        Ok(())
    }

    fn check_inputs(&self, inputs: &ArrayView2<f32>) -> Result<()> {
        if inputs.ncols() != self.input_size() {
            return Err(DqnError::dimension_mismatch(
                format!("{} input features", self.input_size()),
                format!("{} input features", inputs.ncols()),
            ));
        }
        Ok(())
    }

    /// Save the network's parameters to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let serialized = serialize(self)?;
        let mut file = fs::File::create(path)?;
        file.write_all(&serialized)?;
        info!("Save network to {:?}", path);
        Ok(())
    }

    /// Load a network previously written by [`NeuralNetwork::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = fs::File::open(path)?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        let network: Self = deserialize(&buffer)?;
        info!("Load network from {:?}", path);
        Ok(network)
    }
}

impl FunctionApproximator for NeuralNetwork {
    fn input_size(&self) -> usize {
        self.layers.first().map_or(0, Layer::input_size)
    }

    fn output_size(&self) -> usize {
        self.layers.last().map_or(0, Layer::output_size)
    }

    fn predict(&self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_inputs(&inputs)?;
        let mut current = inputs.to_owned();
        for layer in &self.layers {
            current = layer.predict(current.view());
        }
        Ok(current)
    }

    fn forward(&mut self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_inputs(&inputs)?;
        let mut current = inputs.to_owned();
        for layer in &mut self.layers {
            current = layer.forward(current.view());
        }
        Ok(current)
    }

    fn zero_grad(&mut self) {
        for layer in &mut self.layers {
            layer.ensure_grads();
            layer.weight_grad.fill(0.0);
            layer.bias_grad.fill(0.0);
        }
    }

    fn backward(&mut self, output_grad: ArrayView2<f32>) -> Result<()> {
        let mut current_error = output_grad.to_owned();
        for layer in self.layers.iter_mut().rev() {
            current_error = layer.backward(current_error.view())?;
        }
        Ok(())
    }

    fn parameters(&self) -> Vec<ArrayViewD<'_, f32>> {
        self.layers
            .iter()
            .flat_map(|layer| [layer.weights.view().into_dyn(), layer.biases.view().into_dyn()])
            .collect()
    }

    fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        self.layers
            .iter_mut()
            .flat_map(|layer| {
                [
                    layer.weights.view_mut().into_dyn(),
                    layer.biases.view_mut().into_dyn(),
                ]
            })
            .collect()
    }

    fn parameters_with_grads(&mut self) -> Vec<ParameterMut<'_>> {
        for layer in &mut self.layers {
            layer.ensure_grads();
        }
        self.layers
            .iter_mut()
            .flat_map(|layer| {
                let Layer { weights, biases, weight_grad, bias_grad, .. } = layer;
                [
                    ParameterMut {
                        value: weights.view_mut().into_dyn(),
                        grad: weight_grad.view().into_dyn(),
                    },
                    ParameterMut {
                        value: biases.view_mut().into_dyn(),
                        grad: bias_grad.view().into_dyn(),
                    },
                ]
            })
            .collect()
    }
}
