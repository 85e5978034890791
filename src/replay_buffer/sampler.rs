use log::trace;
use ndarray::{Array1, Array2};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use super::PrioritizedReplayBuffer;
use crate::config::PerConfig;
use crate::error::{DqnError, Result};

/// A batch drawn from a [`PrioritizedReplayBuffer`].
///
/// Row `i` of every array belongs to `indices[i]`. `terminals` holds 1.0 for
/// terminal transitions and 0.0 otherwise.
#[derive(Clone, Debug)]
pub struct SampleBatch {
    pub indices: Vec<usize>,
    pub weights: Array1<f32>,
    pub states: Array2<f32>,
    pub actions: Vec<usize>,
    pub rewards: Array1<f32>,
    pub next_states: Array2<f32>,
    pub terminals: Array1<f32>,
    /// Buffer generation at sampling time
    pub generation: u64,
}

impl SampleBatch {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Proportional prioritized sampling with an annealed importance-sampling exponent.
#[derive(Clone, Debug)]
pub struct PrioritizedSampler {
    beta: f64,
    beta_increment: f64,
}

impl PrioritizedSampler {
    pub fn new(per: &PerConfig) -> Self {
        PrioritizedSampler {
            beta: per.beta.min(1.0),
            beta_increment: per.beta_increment,
        }
    }

    /// Current importance-sampling exponent.
    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Draw `batch_size` transitions with replacement, each with probability
    /// `priorityᵅ / Σ priorityᵅ`.
    ///
    /// Every call first moves `beta` one increment toward 1. The returned weights
    /// are `(N · p)^(-beta)` divided by their batch maximum.
    pub fn sample<R: Rng + ?Sized>(
        &mut self,
        buffer: &PrioritizedReplayBuffer,
        batch_size: usize,
        rng: &mut R,
    ) -> Result<SampleBatch> {
        if batch_size == 0 {
            return Err(DqnError::invalid_parameter("batch_size", "must be greater than 0"));
        }
        let n = buffer.len();
        if n < batch_size {
            return Err(DqnError::InsufficientData {
                requested: batch_size,
                available: n,
            });
        }

        let sum_priorities = buffer.sum_priorities();
        if !(sum_priorities > 0.0 && sum_priorities.is_finite()) {
            return Err(DqnError::NumericalError(format!(
                "priority sum must be positive and finite, got {}",
                sum_priorities
            )));
        }

        let probabilities: Vec<f64> = buffer
            .iter()
            .map(|t| buffer.scaled_priority(t.priority()) / sum_priorities)
            .collect();
        let distribution = WeightedIndex::new(&probabilities)
            .map_err(|e| DqnError::NumericalError(format!("invalid sampling weights: {}", e)))?;
        let indices: Vec<usize> = (0..batch_size).map(|_| distribution.sample(rng)).collect();

        self.beta = (self.beta + self.beta_increment).min(1.0);
        let raw_weights: Vec<f64> = indices
            .iter()
            .map(|&i| (n as f64 * probabilities[i]).powf(-self.beta))
            .collect();
        let max_weight = raw_weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !(max_weight > 0.0 && max_weight.is_finite()) {
            return Err(DqnError::NumericalError(format!(
                "importance weights cannot be normalised by {}",
                max_weight
            )));
        }
        let weights = raw_weights.iter().map(|&w| (w / max_weight) as f32).collect();

        let state_size = buffer.get(indices[0]).map_or(0, |t| t.state.len());
        let mut states = Array2::zeros((batch_size, state_size));
        let mut next_states = Array2::zeros((batch_size, state_size));
        let mut actions = Vec::with_capacity(batch_size);
        let mut rewards = Array1::zeros(batch_size);
        let mut terminals = Array1::zeros(batch_size);

        for (row, &index) in indices.iter().enumerate() {
            let transition = buffer.get(index).ok_or_else(|| {
                DqnError::TrainingError(format!("sampled index {} is not stored", index))
            })?;
            if transition.state.len() != state_size || transition.next_state.len() != state_size {
                return Err(DqnError::dimension_mismatch(
                    format!("state size {}", state_size),
                    format!("state size {}", transition.state.len()),
                ));
            }
            states.row_mut(row).assign(&transition.state);
            next_states.row_mut(row).assign(&transition.next_state);
            actions.push(transition.action);
            rewards[row] = transition.reward;
            terminals[row] = if transition.terminal { 1.0 } else { 0.0 };
        }

        trace!(
            "Sampled {} of {} transitions (beta = {:.4}, sum = {:.6})",
            batch_size,
            n,
            self.beta,
            sum_priorities
        );

        Ok(SampleBatch {
            indices,
            weights,
            states,
            actions,
            rewards,
            next_states,
            terminals,
            generation: buffer.generation(),
        })
    }
}
