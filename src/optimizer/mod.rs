use ndarray::{ArrayD, Zip};
use serde::{Deserialize, Serialize};

use crate::network::ParameterMut;

/// A gradient-descent-family update rule.
///
/// `step` receives the parameters of one network, in the stable order the
/// network reports them, each paired with its accumulated gradient.
pub trait Optimizer {
    fn step(&mut self, parameters: Vec<ParameterMut<'_>>, learning_rate: f32);
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum OptimizerWrapper {
    SGD(SGD),
    Adam(Adam),
}

impl Optimizer for OptimizerWrapper {
    fn step(&mut self, parameters: Vec<ParameterMut<'_>>, learning_rate: f32) {
        match self {
            OptimizerWrapper::SGD(optimizer) => optimizer.step(parameters, learning_rate),
            OptimizerWrapper::Adam(optimizer) => optimizer.step(parameters, learning_rate),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SGD;

impl SGD {
    pub fn new() -> SGD {
        SGD
    }
}

impl Default for SGD {
    fn default() -> Self {
        Self::new()
    }
}

impl Optimizer for SGD {
    fn step(&mut self, parameters: Vec<ParameterMut<'_>>, learning_rate: f32) {
        for ParameterMut { mut value, grad } in parameters {
            Zip::from(&mut value)
                .and(&grad)
                .for_each(|w, &g| *w -= learning_rate * g);
        }
    }
}

/// Adam with bias-corrected first and second moments.
///
/// Moment buffers are created on the first step from the shapes of the
/// parameters it receives, one pair per parameter tensor.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Adam {
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    m: Vec<ArrayD<f32>>,
    v: Vec<ArrayD<f32>>,
    pub t: usize,
}

impl Adam {
    pub fn new(beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Adam {
            beta1,
            beta2,
            epsilon,
            m: Vec::new(),
            v: Vec::new(),
            t: 0,
        }
    }

    fn reset_moments(&mut self, parameters: &[ParameterMut<'_>]) {
        self.m = parameters.iter().map(|p| ArrayD::zeros(p.value.raw_dim())).collect();
        self.v = parameters.iter().map(|p| ArrayD::zeros(p.value.raw_dim())).collect();
        self.t = 0;
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(0.9, 0.999, 1e-8)
    }
}

impl Optimizer for Adam {
    fn step(&mut self, parameters: Vec<ParameterMut<'_>>, learning_rate: f32) {
        let shapes_match = self.m.len() == parameters.len()
            && self.m.iter().zip(&parameters).all(|(m, p)| m.shape() == p.value.shape());
        if !shapes_match {
            self.reset_moments(&parameters);
        }

        self.t += 1;
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);
        let bias_correction1 = 1.0 - beta1.powi(self.t as i32);
        let bias_correction2 = 1.0 - beta2.powi(self.t as i32);

        for ((ParameterMut { mut value, grad }, m), v) in
            parameters.into_iter().zip(self.m.iter_mut()).zip(self.v.iter_mut())
        {
            Zip::from(&mut value)
                .and(&grad)
                .and(m)
                .and(v)
                .for_each(|w, &g, m, v| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    let m_hat = *m / bias_correction1;
                    let v_hat = *v / bias_correction2;
                    *w -= learning_rate * m_hat / (v_hat.sqrt() + epsilon);
                });
        }
    }
}
