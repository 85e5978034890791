//! # Prioritized Experience Replay
//!
//! [`PrioritizedReplayBuffer`] stores transitions in a fixed-capacity FIFO ring
//! and keeps the running aggregate `Σ priorityᵅ` up to date on every insertion,
//! eviction and priority update, so sampling never has to rescan priorities to
//! normalise them. [`PrioritizedSampler`] draws weighted batches from it and
//! computes importance-sampling corrections.
//!
//! ```rust
//! use perdqn::config::PerConfig;
//! use perdqn::replay_buffer::{Experience, PrioritizedReplayBuffer, PrioritizedSampler};
//! use ndarray::array;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let per = PerConfig::default();
//! let mut buffer = PrioritizedReplayBuffer::new(100, &per);
//! let mut sampler = PrioritizedSampler::new(&per);
//! let mut rng = StdRng::seed_from_u64(7);
//!
//! for i in 0..10 {
//!     buffer.add(Experience {
//!         state: array![i as f32],
//!         action: 0,
//!         reward: 1.0,
//!         next_state: array![(i + 1) as f32],
//!         done: false,
//!     });
//! }
//!
//! let batch = sampler.sample(&buffer, 4, &mut rng).unwrap();
//! buffer.update_batch_priorities(&batch, &[0.5, 0.1, 2.0, 0.0]).unwrap();
//! ```

mod ring;
mod sampler;

pub use ring::{Push, RingBuffer};
pub use sampler::{PrioritizedSampler, SampleBatch};

use crate::config::PerConfig;
use crate::error::{DqnError, Result};
use log::trace;
use ndarray::Array1;

/// One environment step as reported by the caller.
#[derive(Clone, Debug, PartialEq)]
pub struct Experience {
    pub state: Array1<f32>,
    pub action: usize,
    pub reward: f32,
    pub next_state: Array1<f32>,
    pub done: bool,
}

/// A stored experience with its replay priority.
///
/// Only the owning buffer can change the priority; everything else is fixed
/// at insertion.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub state: Array1<f32>,
    pub action: usize,
    pub reward: f32,
    pub next_state: Array1<f32>,
    pub terminal: bool,
    priority: f64,
}

impl Transition {
    fn new(experience: Experience, priority: f64) -> Self {
        Transition {
            state: experience.state,
            action: experience.action,
            reward: experience.reward,
            next_state: experience.next_state,
            terminal: experience.done,
            priority,
        }
    }

    pub fn priority(&self) -> f64 {
        self.priority
    }
}

pub struct PrioritizedReplayBuffer {
    memory: RingBuffer<Transition>,
    /// Exponent applied to priorities (`per_a`)
    alpha: f64,
    /// Priority floor (`per_e`)
    epsilon: f64,
    /// Σ priorityᵅ over `memory`
    sum_priorities: f64,
    /// Number of `add` calls so far
    generation: u64,
}

impl PrioritizedReplayBuffer {
    /// # Panics
    ///
    /// If `capacity` is zero. Use [`try_new`](Self::try_new) to get an error instead.
    pub fn new(capacity: usize, per: &PerConfig) -> Self {
        PrioritizedReplayBuffer {
            memory: RingBuffer::new(capacity),
            alpha: per.alpha,
            epsilon: per.epsilon,
            sum_priorities: 0.0,
            generation: 0,
        }
    }

    pub fn try_new(capacity: usize, per: &PerConfig) -> Result<Self> {
        if capacity == 0 {
            return Err(DqnError::invalid_parameter("capacity", "must be greater than 0"));
        }
        per.validate()?;
        Ok(Self::new(capacity, per))
    }

    /// `priorityᵅ`, the quantity the sampling distribution is proportional to.
    pub fn scaled_priority(&self, priority: f64) -> f64 {
        priority.powf(self.alpha)
    }

    /// Store an experience with the floor priority, evicting the oldest
    /// transition if the buffer is full. The evicted transition is returned.
    pub fn add(&mut self, experience: Experience) -> Option<Transition> {
        let transition = Transition::new(experience, self.epsilon);
        let added = self.scaled_priority(transition.priority);
        self.generation += 1;

        match self.memory.push(transition) {
            Push::Appended => {
                self.sum_priorities += added;
                None
            }
            Push::Evicted(old) => {
                trace!("Evicted transition with priority {}", old.priority);
                self.sum_priorities += added - self.scaled_priority(old.priority);
                Some(old)
            }
        }
    }

    /// Replace the priorities at `indices` with `|delta| + epsilon`.
    ///
    /// # Panics
    ///
    /// If the slices differ in length or an index is not a currently valid slot.
    pub fn update_priorities(&mut self, indices: &[usize], deltas: &[f32]) {
        assert_eq!(
            indices.len(),
            deltas.len(),
            "update_priorities: {} indices but {} deltas",
            indices.len(),
            deltas.len()
        );
        let len = self.memory.len();
        for (&index, &delta) in indices.iter().zip(deltas) {
            let new_priority = f64::from(delta.abs()) + self.epsilon;
            let new_scaled = self.scaled_priority(new_priority);
            let alpha = self.alpha;
            let transition = self.memory.get_mut(index).unwrap_or_else(|| {
                panic!("update_priorities: index {} out of bounds for {} transitions", index, len)
            });
            let old_scaled = transition.priority.powf(alpha);
            transition.priority = new_priority;
            self.sum_priorities += new_scaled - old_scaled;
        }
    }

    /// Checked form of [`update_priorities`](Self::update_priorities) for indices
    /// taken from `batch`.
    ///
    /// Fails with [`DqnError::StaleBatch`] if anything was added since the batch was
    /// sampled, because the positions may then refer to different transitions.
    pub fn update_batch_priorities(&mut self, batch: &SampleBatch, deltas: &[f32]) -> Result<()> {
        if batch.generation != self.generation {
            return Err(DqnError::StaleBatch {
                sampled_at: batch.generation,
                current: self.generation,
            });
        }
        if batch.indices.len() != deltas.len() {
            return Err(DqnError::dimension_mismatch(
                format!("{} deltas", batch.indices.len()),
                format!("{} deltas", deltas.len()),
            ));
        }
        self.update_priorities(&batch.indices, deltas);
        Ok(())
    }

    /// Recompute `Σ priorityᵅ` from scratch.
    pub fn rescan_sum_priorities(&self) -> f64 {
        self.memory
            .iter()
            .map(|t| self.scaled_priority(t.priority))
            .sum()
    }

    /// Running `Σ priorityᵅ` over the stored transitions.
    pub fn sum_priorities(&self) -> f64 {
        self.sum_priorities
    }

    /// Number of `add` calls so far. Sampled batches are stamped with it.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Transition at `index`, where 0 is the oldest.
    pub fn get(&self, index: usize) -> Option<&Transition> {
        self.memory.get(index)
    }

    /// Transitions from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Transition> + '_ {
        self.memory.iter()
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    /// Fixed capacity; the oldest transition is evicted beyond it.
    pub fn capacity(&self) -> usize {
        self.memory.capacity()
    }
}
