use crate::activations::Activation;
use crate::config::AgentConfig;
use crate::error::{DqnError, Result};
use crate::learning::{argmax, compute_loss, compute_targets, gather, soft_update};
use crate::network::{FunctionApproximator, NeuralNetwork};
use crate::optimizer::{Adam, Optimizer, OptimizerWrapper};
use crate::replay_buffer::{Experience, PrioritizedReplayBuffer, PrioritizedSampler};
use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Summary of one learning cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct LearnStats {
    /// Importance-weighted mean squared TD error
    pub loss: f32,
    pub mean_td_error: f32,
    pub max_td_error: f32,
    /// Importance-sampling exponent used for this batch
    pub beta: f64,
}

/// Deep Q-Network agent with prioritized experience replay
///
/// The agent owns a local network (trained every learning step), a target
/// network (moved toward the local one by soft update after every learning
/// step), the optimizer, and the replay buffer.
///
/// # Example
///
/// ```rust
/// use perdqn::agent::DqnAgentBuilder;
/// use perdqn::config::AgentConfig;
/// use ndarray::array;
///
/// let mut agent = DqnAgentBuilder::new()
///     .layer_sizes(&[2, 16, 2])
///     .config(AgentConfig::default().buffer_size(1_000).batch_size(8))
///     .seed(42)
///     .build()
///     .unwrap();
///
/// let state = array![0.1, -0.2];
/// let action = agent.act(state.view(), 0.1).unwrap();
///
/// // After the environment step...
/// let next_state = array![0.15, -0.25];
/// let stats = agent.step(state.view(), action, 1.0, next_state.view(), false).unwrap();
/// assert!(stats.is_none()); // not enough transitions to learn yet
/// ```
pub struct DqnAgent<N: FunctionApproximator = NeuralNetwork> {
    local: N,
    target: N,
    optimizer: OptimizerWrapper,
    memory: PrioritizedReplayBuffer,
    sampler: PrioritizedSampler,
    config: AgentConfig,
    /// Environment steps modulo `update_every`
    t_step: usize,
    learn_steps: usize,
    rng: StdRng,
}

impl<N: FunctionApproximator> DqnAgent<N> {
    /// Build an agent around an existing pair of approximators.
    ///
    /// Both networks must have the same input size, output size and parameter
    /// shapes. The target is used as given; pass a copy of `local` to start
    /// both networks from the same parameters.
    pub fn from_networks(local: N, target: N, optimizer: OptimizerWrapper, config: AgentConfig) -> Result<Self> {
        config.validate()?;
        if local.input_size() == 0 || local.output_size() == 0 {
            return Err(DqnError::invalid_parameter(
                "local",
                "network must have non-zero input and output sizes",
            ));
        }
        if local.input_size() != target.input_size() || local.output_size() != target.output_size() {
            return Err(DqnError::dimension_mismatch(
                format!("{} -> {}", local.input_size(), local.output_size()),
                format!("{} -> {}", target.input_size(), target.output_size()),
            ));
        }
        let local_shapes: Vec<Vec<usize>> = local.parameters().iter().map(|p| p.shape().to_vec()).collect();
        let target_shapes: Vec<Vec<usize>> = target.parameters().iter().map(|p| p.shape().to_vec()).collect();
        if local_shapes != target_shapes {
            return Err(DqnError::dimension_mismatch(
                format!("{:?}", local_shapes),
                format!("{:?}", target_shapes),
            ));
        }

        Ok(DqnAgent {
            local,
            target,
            optimizer,
            memory: PrioritizedReplayBuffer::new(config.buffer_size, &config.per),
            sampler: PrioritizedSampler::new(&config.per),
            config,
            t_step: 0,
            learn_steps: 0,
            rng: StdRng::from_entropy(),
        })
    }

    /// Replace the agent's random source with a seeded one.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn state_size(&self) -> usize {
        self.local.input_size()
    }

    pub fn action_size(&self) -> usize {
        self.local.output_size()
    }

    fn check_state(&self, state: &ArrayView1<f32>, name: &str) -> Result<()> {
        if state.len() != self.state_size() {
            return Err(DqnError::dimension_mismatch(
                format!("{} of size {}", name, self.state_size()),
                format!("{} of size {}", name, state.len()),
            ));
        }
        Ok(())
    }

    /// Local network action values for a single state, computed without recording gradients.
    pub fn q_values(&self, state: ArrayView1<f32>) -> Result<Array1<f32>> {
        self.check_state(&state, "state")?;
        let q_values = self.local.predict(state.insert_axis(Axis(0)))?;
        Ok(q_values.row(0).to_owned())
    }

    /// Epsilon-greedy action selection.
    ///
    /// With probability `1 - epsilon` the action with the highest local Q-value
    /// is returned, otherwise an action drawn uniformly from `[0, action_size)`.
    pub fn act(&mut self, state: ArrayView1<f32>, epsilon: f32) -> Result<usize> {
        if !(0.0..=1.0).contains(&epsilon) {
            return Err(DqnError::invalid_parameter("epsilon", "must be in [0, 1]"));
        }
        self.check_state(&state, "state")?;

        let action_size = self.action_size();
        if self.rng.gen::<f32>() >= epsilon {
            let q_values = self.q_values(state)?;
            Ok(argmax(q_values.view()))
        } else {
            Ok(self.rng.gen_range(0..action_size))
        }
    }

    /// Record one environment step and, every `update_every` steps, learn from
    /// a sampled batch once the buffer holds more than `batch_size` transitions.
    ///
    /// Returns the learning statistics when a learning cycle ran.
    pub fn step(
        &mut self,
        state: ArrayView1<f32>,
        action: usize,
        reward: f32,
        next_state: ArrayView1<f32>,
        done: bool,
    ) -> Result<Option<LearnStats>> {
        self.check_state(&state, "state")?;
        self.check_state(&next_state, "next_state")?;
        if action >= self.action_size() {
            return Err(DqnError::InvalidAction {
                action,
                max_actions: self.action_size(),
            });
        }

        self.memory.add(Experience {
            state: state.to_owned(),
            action,
            reward,
            next_state: next_state.to_owned(),
            done,
        });

        self.t_step = (self.t_step + 1) % self.config.update_every;
        if self.t_step == 0 && self.memory.len() > self.config.batch_size {
            return self.learn().map(Some);
        }
        Ok(None)
    }

    /// One learning cycle: sample, compute targets and loss, take an optimizer
    /// step on the local network, refresh the sampled priorities, and soft-update
    /// the target network.
    pub fn learn(&mut self) -> Result<LearnStats> {
        let batch = self
            .sampler
            .sample(&self.memory, self.config.batch_size, &mut self.rng)?;
        let targets = compute_targets(
            &self.local,
            &self.target,
            &batch,
            self.config.gamma,
            self.config.double_q,
        )?;

        self.local.zero_grad();
        let q_values = self.local.forward(batch.states.view())?;
        let expected = gather(&q_values, &batch.actions)?;
        let td = compute_loss(expected.view(), targets.view(), batch.weights.view())?;
        if !td.loss.is_finite() {
            warn!("Non-finite loss {} at learning step {}", td.loss, self.learn_steps);
            return Err(DqnError::NumericalError(format!("loss is {}", td.loss)));
        }

        // Only the taken action of each row contributes to the loss.
        let mut output_grad = Array2::zeros(q_values.dim());
        for (row, (&action, &grad)) in batch.actions.iter().zip(td.output_grad.iter()).enumerate() {
            output_grad[[row, action]] = grad;
        }
        self.local.backward(output_grad.view())?;
        self.optimizer
            .step(self.local.parameters_with_grads(), self.config.learning_rate);

        self.memory.update_batch_priorities(&batch, &td.td_errors.to_vec())?;
        soft_update(&mut self.target, &self.local, self.config.tau)?;
        self.learn_steps += 1;

        let stats = LearnStats {
            loss: td.loss,
            mean_td_error: td.td_errors.mean().unwrap_or(0.0),
            max_td_error: td.td_errors.iter().copied().fold(0.0, f32::max),
            beta: self.sampler.beta(),
        };
        debug!(
            "Learning step {}: loss = {:.6}, mean |td| = {:.6}, beta = {:.4}",
            self.learn_steps, stats.loss, stats.mean_td_error, stats.beta
        );
        Ok(stats)
    }

    pub fn local_network(&self) -> &N {
        &self.local
    }

    pub fn target_network(&self) -> &N {
        &self.target
    }

    pub fn memory(&self) -> &PrioritizedReplayBuffer {
        &self.memory
    }

    pub fn sampler(&self) -> &PrioritizedSampler {
        &self.sampler
    }

    pub fn optimizer(&self) -> &OptimizerWrapper {
        &self.optimizer
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Number of completed learning cycles.
    pub fn learn_steps(&self) -> usize {
        self.learn_steps
    }
}

/// Builder pattern for a [`DqnAgent`] backed by [`NeuralNetwork`]
///
/// The target network starts as an exact copy of the local network. Without an
/// explicit optimizer the agent uses Adam with its default moments.
pub struct DqnAgentBuilder {
    layer_sizes: Vec<usize>,
    activations: Option<Vec<Activation>>,
    optimizer: Option<OptimizerWrapper>,
    config: AgentConfig,
    seed: Option<u64>,
}

impl DqnAgentBuilder {
    pub fn new() -> Self {
        DqnAgentBuilder {
            layer_sizes: vec![],
            activations: None,
            optimizer: None,
            config: AgentConfig::default(),
            seed: None,
        }
    }

    /// Sizes of all layers, including the state size first and the action count last.
    pub fn layer_sizes(mut self, sizes: &[usize]) -> Self {
        self.layer_sizes = sizes.to_vec();
        self
    }

    /// One activation per layer. Defaults to ReLU for hidden layers and a linear output.
    pub fn activations(mut self, activations: &[Activation]) -> Self {
        self.activations = Some(activations.to_vec());
        self
    }

    pub fn optimizer(mut self, optimizer: OptimizerWrapper) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Seed for weight initialisation, sampling, and exploration.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<DqnAgent<NeuralNetwork>> {
        if self.layer_sizes.len() < 2 {
            return Err(DqnError::InvalidParameter {
                name: "layer_sizes".to_string(),
                reason: "Must have at least 2 layers".to_string(),
            });
        }

        let activations = match self.activations {
            Some(activations) => activations,
            None => {
                let mut activations = vec![Activation::Relu; self.layer_sizes.len() - 2];
                activations.push(Activation::Linear);
                activations
            }
        };

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let local = NeuralNetwork::new_using(&self.layer_sizes, &activations, &mut rng)?;
        let target = local.clone();
        let optimizer = self
            .optimizer
            .unwrap_or_else(|| OptimizerWrapper::Adam(Adam::default()));

        let mut agent = DqnAgent::from_networks(local, target, optimizer, self.config)?;
        agent.rng = rng;
        Ok(agent)
    }
}

impl Default for DqnAgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}
