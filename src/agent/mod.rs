//! # Deep Q-Learning Agent Module
//!
//! [`DqnAgent`] ties the pieces of the crate together:
//!
//! - **Acting**: epsilon-greedy selection over the local network's Q-values.
//!   Epsilon is chosen by the caller on every call.
//! - **Remembering**: every [`DqnAgent::step`] stores the transition in a
//!   [`PrioritizedReplayBuffer`](crate::replay_buffer::PrioritizedReplayBuffer)
//!   with the floor priority.
//! - **Learning**: every `update_every` steps, once the buffer holds more than
//!   `batch_size` transitions, the agent samples a prioritized batch, regresses
//!   the local network toward TD targets with importance-weighted squared error,
//!   writes the absolute TD errors back as new priorities, and soft-updates the
//!   target network.
//!
//! Setting [`AgentConfig::double_q`](crate::config::AgentConfig::double_q) switches
//! the targets to Double DQN: the local network selects the next action and the
//! target network evaluates it.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use perdqn::agent::DqnAgentBuilder;
//! use perdqn::config::AgentConfig;
//! use perdqn::optimizer::{Adam, OptimizerWrapper};
//! use ndarray::array;
//!
//! let mut agent = DqnAgentBuilder::new()
//!     .layer_sizes(&[4, 64, 64, 2])
//!     .optimizer(OptimizerWrapper::Adam(Adam::default()))
//!     .config(AgentConfig::default().double_q(true))
//!     .build()
//!     .unwrap();
//!
//! let mut epsilon = 1.0;
//! let state = array![0.0, 0.1, 0.0, -0.1];
//! let action = agent.act(state.view(), epsilon).unwrap();
//! epsilon = (epsilon * 0.995f32).max(0.01);
//! ```

mod dqn;
pub use dqn::{DqnAgent, DqnAgentBuilder, LearnStats};
