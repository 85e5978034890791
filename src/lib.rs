//! # perdqn - Deep Q-Learning with Prioritized Experience Replay
//!
//! perdqn implements a DQN agent for discrete-action environments whose replay
//! memory samples transitions in proportion to their past TD error.
//!
//! ## Key Features
//!
//! - **Prioritized replay**: fixed-capacity FIFO buffer with an incrementally
//!   maintained priority aggregate and annealed importance-sampling weights
//! - **Vanilla and Double DQN targets** from the same learning step
//! - **Soft target updates** after every learning step
//! - **Pluggable function approximators** through the [`network::FunctionApproximator`]
//!   trait, with an ndarray multi-layer perceptron included
//! - **Explicit configuration**: every hyperparameter lives in [`config::AgentConfig`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use perdqn::agent::DqnAgentBuilder;
//! use perdqn::config::AgentConfig;
//! use ndarray::array;
//!
//! let mut agent = DqnAgentBuilder::new()
//!     .layer_sizes(&[4, 64, 64, 2])
//!     .config(AgentConfig::default())
//!     .build()
//!     .unwrap();
//!
//! let state = array![0.0, 0.1, 0.0, -0.1];
//! let action = agent.act(state.view(), 0.1).unwrap();
//! let next_state = array![0.01, 0.12, -0.01, -0.12];
//! agent.step(state.view(), action, 1.0, next_state.view(), false).unwrap();
//! ```
//!
//! ## Module Organization
//!
//! - [`activations`] - Activation functions for network layers
//! - [`agent`] - The DQN agent and its builder
//! - [`config`] - Agent and prioritized-replay hyperparameters
//! - [`error`] - Error types and result handling
//! - [`learning`] - TD targets, weighted loss, and soft target updates
//! - [`network`] - Function approximator trait and the bundled neural network
//! - [`optimizer`] - Optimization algorithms
//! - [`replay_buffer`] - Prioritized experience replay and sampling

pub mod activations;
pub mod agent;
pub mod config;
pub mod error;
pub mod learning;
pub mod network;
pub mod optimizer;
pub mod replay_buffer;

#[cfg(test)]
mod tests;
