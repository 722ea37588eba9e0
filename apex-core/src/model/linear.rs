//! Linear Q-function trained with clipped SGD.
use crate::{ExecContext, ParameterSet, QModel, Role, WeightedLoss};
use anyhow::{anyhow, bail, Result};
use ndarray::{Array1, Array2, ArrayViewD, Ix1, Ix2};
use rand::{rngs::StdRng, Rng, SeedableRng};

#[derive(Debug, Clone, PartialEq)]
struct LinearParams {
    w: Array2<f32>,
    b: Array1<f32>,
}

impl LinearParams {
    fn to_parameter_set(&self) -> ParameterSet {
        let mut p = ParameterSet::new();
        p.insert("w", self.w.clone().into_dyn());
        p.insert("b", self.b.clone().into_dyn());
        p
    }
}

/// Linear Q-function `Q(s, a_prev) = W [flatten(s); onehot(a_prev)] + b`.
///
/// Holds `Main` and `Target` parameter sets, both initialized to the same
/// random values. Gradients of the weighted squared TD loss are computed
/// analytically, clipped to the global norm given by the context and applied
/// with plain SGD.
#[derive(Debug, Clone)]
pub struct LinearQModel {
    state_dim: usize,
    num_actions: usize,
    main: LinearParams,
    target: LinearParams,
}

impl LinearQModel {
    /// Creates a model for flattened states of length `state_dim`.
    pub fn new(state_dim: usize, num_actions: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let in_dim = state_dim + num_actions;
        let w = Array2::from_shape_fn((num_actions, in_dim), |_| rng.gen_range(-0.1..0.1));
        let b = Array1::zeros(num_actions);
        let main = LinearParams { w, b };

        Self {
            state_dim,
            num_actions,
            target: main.clone(),
            main,
        }
    }

    fn params(&self, role: Role) -> Result<&LinearParams> {
        match role {
            Role::Main => Ok(&self.main),
            Role::Target => Ok(&self.target),
            Role::Global => bail!("global parameters are not held by the model"),
        }
    }

    fn features(&self, state: &ArrayViewD<f32>, previous_action: usize) -> Result<Array1<f32>> {
        if state.len() != self.state_dim {
            bail!(
                "state of {} elements, expected {}",
                state.len(),
                self.state_dim
            );
        }
        if previous_action >= self.num_actions {
            bail!("previous action {} out of range", previous_action);
        }
        let mut x = Array1::zeros(self.state_dim + self.num_actions);
        for (xi, si) in x.iter_mut().zip(state.iter()) {
            *xi = *si;
        }
        x[self.state_dim + previous_action] = 1.0;
        Ok(x)
    }
}

impl QModel for LinearQModel {
    fn num_actions(&self) -> usize {
        self.num_actions
    }

    fn forward(
        &self,
        ctx: &mut ExecContext,
        role: Role,
        states: &[ArrayViewD<f32>],
        previous_actions: &[usize],
    ) -> Result<Array2<f32>> {
        if states.len() != previous_actions.len() {
            bail!(
                "{} states and {} previous actions",
                states.len(),
                previous_actions.len()
            );
        }
        let params = self.params(role)?;
        let mut q = Array2::zeros((states.len(), self.num_actions));
        for (i, (s, &a)) in states.iter().zip(previous_actions.iter()).enumerate() {
            let x = self.features(s, a)?;
            let row = params.w.dot(&x) + &params.b;
            q.row_mut(i).assign(&row);
        }
        ctx.n_forward += 1;
        Ok(q)
    }

    fn apply_gradient(&mut self, ctx: &mut ExecContext, loss: &WeightedLoss) -> Result<f32> {
        let n = loss.len();
        if n == 0 {
            bail!("empty loss");
        }
        if loss.states.len() != n
            || loss.previous_actions.len() != n
            || loss.actions.len() != n
            || loss.weights.len() != n
        {
            bail!("inconsistent loss inputs");
        }

        let mut grad_w = Array2::<f32>::zeros(self.main.w.raw_dim());
        let mut grad_b = Array1::<f32>::zeros(self.num_actions);
        let mut value = 0f32;

        for i in 0..n {
            let a = loss.actions[i];
            if a >= self.num_actions {
                bail!("action {} out of range", a);
            }
            let x = self.features(&loss.states[i], loss.previous_actions[i])?;
            let q = self.main.w.row(a).dot(&x) + self.main.b[a];
            let diff = loss.targets[i] - q;
            value += loss.weights[i] * diff * diff;

            // d/dq of w * (t - q)^2 / n
            let g = -2.0 * loss.weights[i] * diff / n as f32;
            grad_w.row_mut(a).scaled_add(g, &x);
            grad_b[a] += g;
        }
        value /= n as f32;

        let norm = (grad_w.iter().map(|g| g * g).sum::<f32>()
            + grad_b.iter().map(|g| g * g).sum::<f32>())
        .sqrt();
        let scale = match ctx.gradient_clip_norm {
            Some(clip) if norm > clip && norm > 0.0 => clip / norm,
            _ => 1.0,
        };

        let lr = ctx.learning_rate;
        self.main.w.scaled_add(-lr * scale, &grad_w);
        self.main.b.scaled_add(-lr * scale, &grad_b);

        ctx.n_gradient_steps += 1;
        ctx.last_grad_norm = Some(norm);
        Ok(value)
    }

    fn parameters(&self, role: Role) -> Result<ParameterSet> {
        Ok(self.params(role)?.to_parameter_set())
    }

    fn load_parameters(&mut self, role: Role, params: &ParameterSet) -> Result<()> {
        let get = |name: &str| {
            params
                .get(name)
                .ok_or_else(|| anyhow!("missing tensor {}", name))
        };
        let w = get("w")?.clone().into_dimensionality::<Ix2>()?;
        let b = get("b")?.clone().into_dimensionality::<Ix1>()?;
        if w.raw_dim() != self.main.w.raw_dim() || b.len() != self.num_actions {
            bail!(
                "shapes {:?} and {:?} do not match the model",
                w.shape(),
                b.shape()
            );
        }

        let dst = match role {
            Role::Main => &mut self.main,
            Role::Target => &mut self.target,
            Role::Global => bail!("global parameters are not held by the model"),
        };
        dst.w = w;
        dst.b = b;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::ArrayD;

    fn state(v: &[f32]) -> ArrayD<f32> {
        ArrayD::from_shape_vec(vec![v.len()], v.to_vec()).unwrap()
    }

    #[test]
    fn test_forward_shape() {
        let model = LinearQModel::new(2, 3, 0);
        let mut ctx = ExecContext::inference();
        let s = state(&[0.5, -0.5]);
        let q = model
            .forward(&mut ctx, Role::Main, &[s.view(), s.view()], &[0, 2])
            .unwrap();
        assert_eq!(q.shape(), &[2, 3]);
        assert_eq!(ctx.n_forward, 1);
        assert!(model.forward(&mut ctx, Role::Global, &[s.view()], &[0]).is_err());
        assert!(model.forward(&mut ctx, Role::Main, &[s.view()], &[3]).is_err());
    }

    #[test]
    fn test_gradient_reduces_loss() {
        let mut model = LinearQModel::new(2, 2, 0);
        let mut ctx = ExecContext::training(0.1, None);
        let s = state(&[1.0, 0.0]);
        let states = [s.view()];
        let loss = WeightedLoss {
            states: &states,
            previous_actions: &[0],
            actions: &[1],
            targets: &[2.0],
            weights: &[1.0],
        };
        let first = model.apply_gradient(&mut ctx, &loss).unwrap();
        let mut last = first;
        for _ in 0..50 {
            last = model.apply_gradient(&mut ctx, &loss).unwrap();
        }
        assert!(last < first * 0.01);
        assert_eq!(ctx.n_gradient_steps, 51);

        // Target parameters are untouched by gradient steps.
        assert_ne!(
            model.parameters(Role::Main).unwrap(),
            model.parameters(Role::Target).unwrap()
        );
    }

    #[test]
    fn test_gradient_clipping() {
        let mut clipped = LinearQModel::new(2, 2, 0);
        let mut free = clipped.clone();
        let s = state(&[10.0, 10.0]);
        let states = [s.view()];
        let loss = WeightedLoss {
            states: &states,
            previous_actions: &[0],
            actions: &[0],
            targets: &[100.0],
            weights: &[1.0],
        };
        let before = clipped.parameters(Role::Main).unwrap();

        let mut ctx = ExecContext::training(1.0, Some(0.5));
        clipped.apply_gradient(&mut ctx, &loss).unwrap();
        assert!(ctx.last_grad_norm.unwrap() > 0.5);
        let mut ctx = ExecContext::training(1.0, None);
        free.apply_gradient(&mut ctx, &loss).unwrap();

        let step = |m: &LinearQModel| {
            let after = m.parameters(Role::Main).unwrap();
            after
                .iter()
                .map(|(k, v)| {
                    let d = v - before.get(k).unwrap();
                    d.iter().map(|x| x * x).sum::<f32>()
                })
                .sum::<f32>()
                .sqrt()
        };
        assert!((step(&clipped) - 0.5).abs() < 1e-3);
        assert!(step(&free) > 0.5);
    }

    #[test]
    fn test_load_parameters_checks_shapes() {
        let mut model = LinearQModel::new(2, 2, 0);
        let other = LinearQModel::new(3, 2, 0);
        let p = other.parameters(Role::Main).unwrap();
        assert!(model.load_parameters(Role::Main, &p).is_err());
        assert!(model
            .load_parameters(Role::Global, &model.parameters(Role::Main).unwrap())
            .is_err());
    }
}
