//! Hyperparameters for the agent and its prioritized replay buffer.
//!
//! Every agent is built from one immutable [`AgentConfig`]; nothing is read from
//! module-level constants, so several agents with different settings can live in
//! the same process.
//!
//! ```rust
//! use perdqn::config::{AgentConfig, PerConfig};
//!
//! let config = AgentConfig::default()
//!     .buffer_size(10_000)
//!     .batch_size(32)
//!     .double_q(true)
//!     .per(PerConfig::default().alpha(0.7).beta_increment(1e-4));
//!
//! assert!(config.validate().is_ok());
//! ```

use crate::error::{DqnError, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of prioritized experience replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerConfig {
    /// Exponent applied to priorities when sampling (`per_a`). A value of 0 gives
    /// uniform sampling.
    pub alpha: f64,

    /// Floor added to every absolute TD error (`per_e`). New transitions are
    /// stored with exactly this priority.
    pub epsilon: f64,

    /// Initial importance-sampling exponent (`per_b`).
    pub beta: f64,

    /// Amount added to `beta` on every sample call (`per_b_inc`), clamped at 1.
    pub beta_increment: f64,
}

impl Default for PerConfig {
    fn default() -> Self {
        Self {
            alpha: 0.6,
            epsilon: 0.01,
            beta: 0.4,
            beta_increment: 0.001,
        }
    }
}

impl PerConfig {
    /// Sets the prioritization exponent.
    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Sets the priority floor.
    pub fn epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Sets the initial importance-sampling exponent.
    pub fn beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    /// Sets the per-sample increment of the importance-sampling exponent.
    pub fn beta_increment(mut self, beta_increment: f64) -> Self {
        self.beta_increment = beta_increment;
        self
    }

    /// Checks that every field is inside its admissible range.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(DqnError::invalid_parameter("per.alpha", "must be in [0, 1]"));
        }
        if !(self.epsilon > 0.0 && self.epsilon.is_finite()) {
            return Err(DqnError::invalid_parameter("per.epsilon", "must be positive and finite"));
        }
        if !(0.0..=1.0).contains(&self.beta) {
            return Err(DqnError::invalid_parameter("per.beta", "must be in [0, 1]"));
        }
        if !(self.beta_increment >= 0.0 && self.beta_increment.is_finite()) {
            return Err(DqnError::invalid_parameter(
                "per.beta_increment",
                "must be non-negative and finite",
            ));
        }
        Ok(())
    }
}

/// Hyperparameters of [`DqnAgent`](crate::agent::DqnAgent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Capacity of the replay buffer.
    pub buffer_size: usize,

    /// Number of transitions per learning step.
    pub batch_size: usize,

    /// Discount factor.
    pub gamma: f32,

    /// Interpolation factor of the soft target update.
    pub tau: f32,

    /// Learning rate handed to the optimizer.
    pub learning_rate: f32,

    /// A learning step is attempted every `update_every` environment steps.
    pub update_every: usize,

    /// Select next actions with the local network and evaluate them with the target network.
    pub double_q: bool,

    /// Prioritized replay settings.
    pub per: PerConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            buffer_size: 100_000,
            batch_size: 64,
            gamma: 0.99,
            tau: 1e-3,
            learning_rate: 1e-3,
            update_every: 2,
            double_q: false,
            per: PerConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn tau(mut self, tau: f32) -> Self {
        self.tau = tau;
        self
    }

    pub fn learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn update_every(mut self, update_every: usize) -> Self {
        self.update_every = update_every;
        self
    }

    pub fn double_q(mut self, double_q: bool) -> Self {
        self.double_q = double_q;
        self
    }

    pub fn per(mut self, per: PerConfig) -> Self {
        self.per = per;
        self
    }

    /// Checks every hyperparameter, including the nested [`PerConfig`].
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(DqnError::invalid_parameter("buffer_size", "must be greater than 0"));
        }
        if self.batch_size == 0 {
            return Err(DqnError::invalid_parameter("batch_size", "must be greater than 0"));
        }
        if self.batch_size >= self.buffer_size {
            return Err(DqnError::invalid_parameter(
                "batch_size",
                "must be smaller than buffer_size",
            ));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(DqnError::invalid_parameter("gamma", "must be in [0, 1]"));
        }
        if !(self.tau > 0.0 && self.tau <= 1.0) {
            return Err(DqnError::invalid_parameter("tau", "must be in (0, 1]"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(DqnError::invalid_parameter(
                "learning_rate",
                "must be positive and finite",
            ));
        }
        if self.update_every == 0 {
            return Err(DqnError::invalid_parameter("update_every", "must be greater than 0"));
        }
        self.per.validate()
    }

    /// Loads a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        info!("Load agent config from {:?}", path);
        Ok(config)
    }

    /// Saves the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut file = File::create(path)?;
        file.write_all(serde_json::to_string_pretty(self)?.as_bytes())?;
        info!("Save agent config to {:?}", path);
        Ok(())
    }
}
