//! Element-wise activation functions for [`NeuralNetwork`](crate::network::NeuralNetwork) layers.
//!
//! Hidden layers of a Q-network usually use [`Activation::Relu`]; the output
//! layer must be [`Activation::Linear`] because action values are unbounded.

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// An enumeration of the activation functions a layer can apply.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
pub enum Activation {
    #[default]
    Relu,
    Linear,
    Sigmoid,
    Tanh,
    LeakyRelu { alpha: f32 },
}

impl Activation {
    fn value(&self, v: f32) -> f32 {
        match *self {
            Activation::Relu => v.max(0.0),
            Activation::Linear => v,
            Activation::Sigmoid => 1.0 / (1.0 + (-v).exp()),
            Activation::Tanh => v.tanh(),
            Activation::LeakyRelu { alpha } => {
                if v > 0.0 {
                    v
                } else {
                    alpha * v
                }
            }
        }
    }

    fn slope(&self, v: f32) -> f32 {
        match *self {
            Activation::Relu => {
                if v > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Linear => 1.0,
            Activation::Sigmoid => {
                let s = 1.0 / (1.0 + (-v).exp());
                s * (1.0 - s)
            }
            Activation::Tanh => {
                let t = v.tanh();
                1.0 - t * t
            }
            Activation::LeakyRelu { alpha } => {
                if v > 0.0 {
                    1.0
                } else {
                    alpha
                }
            }
        }
    }

    /// Apply the activation function to a batch of pre-activations in-place.
    pub fn apply_batch(&self, inputs: &mut Array2<f32>) {
        if let Activation::Linear = self {
            return;
        }
        inputs.mapv_inplace(|v| self.value(v));
    }

    /// Derivative of the activation with respect to its pre-activation input.
    pub fn derivative_batch(&self, inputs: ArrayView2<f32>) -> Array2<f32> {
        inputs.mapv(|v| self.slope(v))
    }
}
