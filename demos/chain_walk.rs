//! Train a prioritized-replay DQN agent on a short chain walk.
//!
//! The agent starts at the left end of a chain of cells and is paid 1 for
//! reaching the right end. Run with an optional JSON agent config:
//!
//! ```text
//! RUST_LOG=debug cargo run --example chain_walk -- agent.json
//! ```
use log::info;
use ndarray::Array1;
use perdqn::{
    agent::DqnAgentBuilder,
    config::{AgentConfig, PerConfig},
    error::Result,
};

const CHAIN_LENGTH: usize = 8;
const EPISODES: usize = 300;
const MAX_STEPS: usize = 4 * CHAIN_LENGTH;

struct ChainWalk {
    position: usize,
}

impl ChainWalk {
    fn reset(&mut self) -> Array1<f32> {
        self.position = 0;
        self.observe()
    }

    fn observe(&self) -> Array1<f32> {
        let mut state = Array1::zeros(CHAIN_LENGTH);
        state[self.position] = 1.0;
        state
    }

    fn step(&mut self, action: usize) -> (Array1<f32>, f32, bool) {
        if action == 1 {
            self.position = (self.position + 1).min(CHAIN_LENGTH - 1);
        } else {
            self.position = self.position.saturating_sub(1);
        }
        let done = self.position == CHAIN_LENGTH - 1;
        let reward = if done { 1.0 } else { -0.01 };
        (self.observe(), reward, done)
    }
}

fn load_config() -> Result<AgentConfig> {
    match std::env::args().nth(1) {
        Some(path) => AgentConfig::load(path),
        None => Ok(AgentConfig::default()
            .buffer_size(10_000)
            .batch_size(32)
            .update_every(1)
            .learning_rate(5e-3)
            .tau(1e-2)
            .double_q(true)
            .per(PerConfig::default().beta_increment(1e-4))),
    }
}

fn run() -> Result<()> {
    let config = load_config()?;
    let mut agent = DqnAgentBuilder::new()
        .layer_sizes(&[CHAIN_LENGTH, 32, 32, 2])
        .config(config)
        .seed(42)
        .build()?;
    let mut env = ChainWalk { position: 0 };
    let mut epsilon = 1.0f32;

    for episode in 0..EPISODES {
        let mut state = env.reset();
        let mut episode_return = 0.0;
        let mut steps = 0;
        let mut last_loss = None;

        while steps < MAX_STEPS {
            let action = agent.act(state.view(), epsilon)?;
            let (next_state, reward, done) = env.step(action);
            if let Some(stats) = agent.step(state.view(), action, reward, next_state.view(), done)? {
                last_loss = Some(stats.loss);
            }
            episode_return += reward;
            steps += 1;
            state = next_state;
            if done {
                break;
            }
        }
        epsilon = (epsilon * 0.98).max(0.01);

        if (episode + 1) % 25 == 0 {
            info!(
                "Episode {}: return = {:.3}, steps = {}, epsilon = {:.3}, loss = {:?}, beta = {:.4}",
                episode + 1,
                episode_return,
                steps,
                epsilon,
                last_loss,
                agent.sampler().beta()
            );
        }
    }

    let start = env.reset();
    info!("Greedy action at start: {}", agent.act(start.view(), 0.0)?);
    info!("Q-values at start: {}", agent.q_values(start.view())?);
    Ok(())
}

fn main() -> perdqn::error::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    run()
}
