//! Double-Q bootstrapped targets and TD-errors.
//!
//! The next action is selected with the main parameters and evaluated with
//! the target parameters:
//!
//! ```text
//! a*     = argmax_a Q_main(s', a)
//! target = clip(r) + gamma * (1 - done) * Q_target(s', a*)
//! td     = |target - Q_main(s, a)|
//! loss   = mean_i w_i * (target_i - Q_main(s_i, a_i))^2
//! ```
use crate::ApexError;
use anyhow::anyhow;
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Reward transform applied before computing targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewardClipping {
    /// Clip rewards to `[-1, 1]`.
    #[serde(rename = "abs_one")]
    AbsOne,

    /// Use rewards as they are.
    #[serde(rename = "none")]
    NoClip,
}

impl Default for RewardClipping {
    fn default() -> Self {
        Self::AbsOne
    }
}

impl RewardClipping {
    /// Applies the transform.
    pub fn apply(&self, reward: f32) -> f32 {
        match self {
            Self::AbsOne => reward.clamp(-1.0, 1.0),
            Self::NoClip => reward,
        }
    }
}

/// Index of the largest value; ties go to the lowest index.
pub fn argmax(values: ArrayView1<f32>) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// Picks `q[i, actions[i]]` for each row.
pub fn take_state_action_value(q: ArrayView2<f32>, actions: &[usize]) -> Result<Vec<f32>, ApexError> {
    if q.nrows() != actions.len() {
        return Err(anyhow!("{} rows of Q-values for {} actions", q.nrows(), actions.len()).into());
    }
    actions
        .iter()
        .enumerate()
        .map(|(i, &a)| {
            q.get((i, a))
                .copied()
                .ok_or_else(|| anyhow!("action {} out of range for {} actions", a, q.ncols()).into())
        })
        .collect()
}

/// Inputs of [`TargetComputer::compute`].
#[derive(Debug, Clone, Copy)]
pub struct TargetInput<'a> {
    /// Raw rewards.
    pub rewards: &'a [f32],

    /// Terminal flags.
    pub dones: &'a [bool],

    /// Q-values of the next states under the main parameters.
    pub next_main_q: ArrayView2<'a, f32>,

    /// Q-values of the next states under the target parameters.
    pub next_target_q: ArrayView2<'a, f32>,

    /// `Q_main(s, a)` of the taken actions.
    pub state_action_values: &'a [f32],

    /// Importance-sampling weights.
    pub weights: &'a [f32],
}

/// Outputs of [`TargetComputer::compute`].
#[derive(Debug, Clone, PartialEq)]
pub struct TargetOutput {
    /// Actions selected by the main parameters at the next states.
    pub next_actions: Vec<usize>,

    /// Bootstrapped targets.
    pub targets: Vec<f32>,

    /// Absolute TD-errors, used as new priorities.
    pub td_errors: Vec<f32>,

    /// Importance-weighted mean squared TD-error.
    pub loss: f32,
}

/// Stateless double-Q target computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetComputer {
    discount_factor: f32,
    reward_clipping: RewardClipping,
}

impl TargetComputer {
    /// Creates the computer.
    pub fn new(discount_factor: f32, reward_clipping: RewardClipping) -> Self {
        Self {
            discount_factor,
            reward_clipping,
        }
    }

    /// Discount factor.
    pub fn discount_factor(&self) -> f32 {
        self.discount_factor
    }

    /// Reward transform.
    pub fn reward_clipping(&self) -> RewardClipping {
        self.reward_clipping
    }

    /// Computes targets, TD-errors and the weighted loss.
    ///
    /// Fails with [`ApexError::NumericInstability`] if a target or the loss is
    /// not finite.
    pub fn compute(&self, input: &TargetInput) -> Result<TargetOutput, ApexError> {
        let n = input.rewards.len();
        let shape = input.next_main_q.shape();
        if input.dones.len() != n
            || input.state_action_values.len() != n
            || input.weights.len() != n
            || shape[0] != n
            || input.next_target_q.shape() != shape
        {
            return Err(anyhow!(
                "inconsistent batch: {} rewards, {} dones, {} values, {} weights, Q-values {:?} and {:?}",
                n,
                input.dones.len(),
                input.state_action_values.len(),
                input.weights.len(),
                shape,
                input.next_target_q.shape()
            )
            .into());
        }

        let mut next_actions = Vec::with_capacity(n);
        let mut targets = Vec::with_capacity(n);
        let mut td_errors = Vec::with_capacity(n);
        let mut loss = 0f32;

        for i in 0..n {
            let next_action = argmax(input.next_main_q.row(i));
            let next_value = input.next_target_q[(i, next_action)];
            let discount = if input.dones[i] {
                0.0
            } else {
                self.discount_factor
            };
            let target = self.reward_clipping.apply(input.rewards[i]) + discount * next_value;
            if !target.is_finite() {
                return Err(ApexError::NumericInstability(format!(
                    "target value {} for item {}",
                    target, i
                )));
            }
            let diff = target - input.state_action_values[i];

            next_actions.push(next_action);
            targets.push(target);
            td_errors.push(diff.abs());
            loss += input.weights[i] * diff * diff;
        }

        if n > 0 {
            loss /= n as f32;
        }
        if !loss.is_finite() {
            return Err(ApexError::NumericInstability(format!("loss {}", loss)));
        }

        Ok(TargetOutput {
            next_actions,
            targets,
            td_errors,
            loss,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::{arr2, Array2};

    fn compute(
        tc: &TargetComputer,
        rewards: &[f32],
        dones: &[bool],
        next_main_q: &Array2<f32>,
        next_target_q: &Array2<f32>,
        values: &[f32],
        weights: &[f32],
    ) -> Result<TargetOutput, ApexError> {
        tc.compute(&TargetInput {
            rewards,
            dones,
            next_main_q: next_main_q.view(),
            next_target_q: next_target_q.view(),
            state_action_values: values,
            weights,
        })
    }

    #[test]
    fn test_double_q_target() {
        let tc = TargetComputer::new(0.99, RewardClipping::AbsOne);
        let out = compute(
            &tc,
            &[1.0],
            &[false],
            &arr2(&[[3.0, 4.0]]),
            &arr2(&[[2.0, 5.0]]),
            &[4.0],
            &[1.0],
        )
        .unwrap();
        assert_eq!(out.next_actions, vec![1]);
        assert!((out.targets[0] - 5.95).abs() < 1e-5);
        assert!((out.td_errors[0] - 1.95).abs() < 1e-5);
        assert!((out.loss - 1.95 * 1.95).abs() < 1e-4);
    }

    #[test]
    fn test_selection_uses_main_and_evaluation_uses_target() {
        let tc = TargetComputer::new(1.0, RewardClipping::NoClip);
        // Main prefers action 0, the target would prefer action 1.
        let out = compute(
            &tc,
            &[0.0],
            &[false],
            &arr2(&[[9.0, 1.0]]),
            &arr2(&[[2.0, 7.0]]),
            &[0.0],
            &[1.0],
        )
        .unwrap();
        assert_eq!(out.next_actions, vec![0]);
        assert_eq!(out.targets, vec![2.0]);
    }

    #[test]
    fn test_done_and_clipping() {
        let tc = TargetComputer::new(0.9, RewardClipping::AbsOne);
        let q = arr2(&[[1.0, 2.0], [1.0, 2.0]]);
        let out = compute(
            &tc,
            &[5.0, -3.0],
            &[true, false],
            &q,
            &q,
            &[0.0, 0.0],
            &[1.0, 0.5],
        )
        .unwrap();
        assert_eq!(out.targets[0], 1.0);
        assert!((out.targets[1] - (-1.0 + 0.9 * 2.0)).abs() < 1e-6);
        let expected = (1.0 * 1.0 + 0.5 * 0.8 * 0.8) / 2.0;
        assert!((out.loss - expected).abs() < 1e-5);

        let tc = TargetComputer::new(0.9, RewardClipping::NoClip);
        let out = compute(&tc, &[5.0], &[true], &arr2(&[[0.0]]), &arr2(&[[0.0]]), &[1.0], &[1.0])
            .unwrap();
        assert_eq!(out.targets, vec![5.0]);
        assert_eq!(out.td_errors, vec![4.0]);
    }

    #[test]
    fn test_numeric_instability() {
        let tc = TargetComputer::new(0.99, RewardClipping::AbsOne);
        let res = compute(
            &tc,
            &[1.0],
            &[false],
            &arr2(&[[0.0, 1.0]]),
            &arr2(&[[0.0, f32::INFINITY]]),
            &[0.0],
            &[1.0],
        );
        assert!(matches!(res, Err(ApexError::NumericInstability(_))));
    }

    #[test]
    fn test_inconsistent_batch() {
        let tc = TargetComputer::new(0.99, RewardClipping::AbsOne);
        let q = arr2(&[[0.0, 1.0]]);
        assert!(compute(&tc, &[1.0, 2.0], &[false], &q, &q, &[0.0], &[1.0]).is_err());
    }

    #[test]
    fn test_argmax_ties() {
        let q = arr2(&[[1.0, 3.0, 3.0], [0.0, 0.0, 0.0]]);
        assert_eq!(argmax(q.row(0)), 1);
        assert_eq!(argmax(q.row(1)), 0);
        assert_eq!(take_state_action_value(q.view(), &[2, 0]).unwrap(), vec![3.0, 0.0]);
        assert!(take_state_action_value(q.view(), &[3, 0]).is_err());
    }

    #[test]
    fn test_reward_clipping_serde() {
        let s = serde_yaml::to_string(&RewardClipping::AbsOne).unwrap();
        assert!(s.contains("abs_one"));
        let c: RewardClipping = serde_yaml::from_str("none").unwrap();
        assert_eq!(c, RewardClipping::NoClip);
    }
}
