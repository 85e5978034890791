//! The temporal-difference update: targets, importance-weighted loss, and the
//! soft synchronisation of the target network.

use log::trace;
use ndarray::{Array1, Array2, ArrayView1, Axis, Zip};

use crate::error::{DqnError, Result};
use crate::network::FunctionApproximator;
use crate::replay_buffer::SampleBatch;

/// Output of [`compute_loss`].
#[derive(Clone, Debug)]
pub struct TdLoss {
    /// `mean(w · (target - expected)²)`
    pub loss: f32,
    /// `|target - expected|` per sample, unweighted. These drive the priority update.
    pub td_errors: Array1<f32>,
    /// `∂loss/∂expected` per sample
    pub output_grad: Array1<f32>,
}

/// Index of the largest value; ties go to the lowest index.
pub fn argmax(values: ArrayView1<f32>) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Pick `q_values[i, actions[i]]` for every row.
pub fn gather(q_values: &Array2<f32>, actions: &[usize]) -> Result<Array1<f32>> {
    if q_values.nrows() != actions.len() {
        return Err(DqnError::dimension_mismatch(
            format!("{} actions", q_values.nrows()),
            format!("{} actions", actions.len()),
        ));
    }
    let num_actions = q_values.ncols();
    actions
        .iter()
        .enumerate()
        .map(|(row, &action)| {
            if action >= num_actions {
                Err(DqnError::InvalidAction {
                    action,
                    max_actions: num_actions,
                })
            } else {
                Ok(q_values[[row, action]])
            }
        })
        .collect()
}

/// TD targets for `batch`.
///
/// Vanilla: `r + γ · max_a' Q_target(s', a') · (1 - terminal)`.
/// Double-Q: the local network picks `a*` for each next state and the target
/// network evaluates it, `r + γ · Q_target(s', a*) · (1 - terminal)`.
pub fn compute_targets<N: FunctionApproximator + ?Sized>(
    local: &N,
    target: &N,
    batch: &SampleBatch,
    gamma: f32,
    double_q: bool,
) -> Result<Array1<f32>> {
    let next_q_target = target.predict(batch.next_states.view())?;
    if next_q_target.nrows() != batch.len() || next_q_target.ncols() == 0 {
        return Err(DqnError::dimension_mismatch(
            format!("({}, >0)", batch.len()),
            format!("{:?}", next_q_target.dim()),
        ));
    }

    let bootstrap: Array1<f32> = if double_q {
        let next_q_local = local.predict(batch.next_states.view())?;
        if next_q_local.dim() != next_q_target.dim() {
            return Err(DqnError::dimension_mismatch(
                format!("{:?}", next_q_target.dim()),
                format!("{:?}", next_q_local.dim()),
            ));
        }
        next_q_local
            .axis_iter(Axis(0))
            .zip(next_q_target.axis_iter(Axis(0)))
            .map(|(local_row, target_row)| target_row[argmax(local_row)])
            .collect()
    } else {
        next_q_target
            .axis_iter(Axis(0))
            .map(|row| row[argmax(row)])
            .collect()
    };

    let mut targets = Array1::zeros(batch.len());
    Zip::from(&mut targets)
        .and(&batch.rewards)
        .and(&bootstrap)
        .and(&batch.terminals)
        .for_each(|t, &r, &next, &done| *t = r + gamma * next * (1.0 - done));
    Ok(targets)
}

/// Importance-weighted squared TD error, averaged over the batch.
pub fn compute_loss(
    expected: ArrayView1<f32>,
    targets: ArrayView1<f32>,
    weights: ArrayView1<f32>,
) -> Result<TdLoss> {
    let batch_size = expected.len();
    if batch_size == 0 {
        return Err(DqnError::EmptyBuffer("no samples to compute a loss for".to_string()));
    }
    if targets.len() != batch_size || weights.len() != batch_size {
        return Err(DqnError::dimension_mismatch(
            format!("{} targets and weights", batch_size),
            format!("{} targets and {} weights", targets.len(), weights.len()),
        ));
    }

    let td = &targets - &expected;
    let loss = Zip::from(&td)
        .and(&weights)
        .fold(0.0, |acc, &d, &w| acc + w * d * d)
        / batch_size as f32;
    let scale = -2.0 / batch_size as f32;
    let output_grad = Zip::from(&td)
        .and(&weights)
        .map_collect(|&d, &w| scale * w * d);
    let td_errors = td.mapv(f32::abs);

    Ok(TdLoss {
        loss,
        td_errors,
        output_grad,
    })
}

/// Move every target parameter toward its local counterpart:
/// `θ_target ← τ · θ_local + (1 - τ) · θ_target`.
pub fn soft_update<N: FunctionApproximator + ?Sized>(target: &mut N, local: &N, tau: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&tau) {
        return Err(DqnError::invalid_parameter("tau", "must be in [0, 1]"));
    }

    let local_params = local.parameters();
    let mut target_params = target.parameters_mut();
    if local_params.len() != target_params.len() {
        return Err(DqnError::dimension_mismatch(
            format!("{} parameter tensors", target_params.len()),
            format!("{} parameter tensors", local_params.len()),
        ));
    }
    if let Some((t, l)) = target_params
        .iter()
        .zip(&local_params)
        .find(|(t, l)| t.shape() != l.shape())
    {
        return Err(DqnError::dimension_mismatch(
            format!("{:?}", t.shape()),
            format!("{:?}", l.shape()),
        ));
    }

    for (t, l) in target_params.iter_mut().zip(&local_params) {
        Zip::from(t)
            .and(l)
            .for_each(|t, &l| *t = tau * l + (1.0 - tau) * *t);
    }
    trace!("Soft-updated {} parameter tensors (tau = {})", local_params.len(), tau);
    Ok(())
}
