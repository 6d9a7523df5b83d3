use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::math::matrix::Matrix;
use crate::network::module::Module;

const EPSILON: f64 = 1e-8;

/// First/second moment estimates of one parameter plus the number of
/// updates that parameter has received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Moments {
    pub step: u64,
    pub m: Matrix,
    pub v: Matrix,
}

/// Serializable optimizer state; one moment slot per parameter of the
/// owning network, in `Module::params` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdamState {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub weight_decay: f64,
    pub moments: Vec<Option<Moments>>,
}

/// Adam with L2 weight decay folded into the gradient.
///
/// θ ← θ − lr · m̂ / (√v̂ + ε),  g = ∇θ + λθ
///
/// Frozen parameters are skipped entirely; their moments and step counts do
/// not advance.
#[derive(Debug, Clone)]
pub struct Adam {
    state: AdamState,
}

impl Adam {
    pub fn new(lr: f64, beta1: f64, beta2: f64, weight_decay: f64) -> Adam {
        Adam {
            state: AdamState { lr, beta1, beta2, weight_decay, moments: Vec::new() },
        }
    }

    pub fn lr(&self) -> f64 {
        self.state.lr
    }

    pub fn set_lr(&mut self, lr: f64) {
        self.state.lr = lr;
    }

    /// Applies one update to every trainable parameter of `module` using the
    /// gradients accumulated since the last `zero_grad`.
    pub fn step<M: Module + ?Sized>(&mut self, module: &mut M) {
        let AdamState { lr, beta1, beta2, weight_decay, moments } = &mut self.state;
        let mut params = module.params_mut();
        if moments.len() < params.len() {
            moments.resize(params.len(), None);
        }

        for (param, slot) in params.iter_mut().zip(moments.iter_mut()) {
            if !param.trainable {
                continue;
            }
            let (rows, cols) = param.value.shape();
            let mom = slot.get_or_insert_with(|| Moments {
                step: 0,
                m: Matrix::zeros(rows, cols),
                v: Matrix::zeros(rows, cols),
            });
            mom.step += 1;
            let bias1 = 1.0 - beta1.powi(mom.step as i32);
            let bias2 = 1.0 - beta2.powi(mom.step as i32);

            for i in 0..rows {
                for j in 0..cols {
                    let g = param.grad.data[i][j] + *weight_decay * param.value.data[i][j];
                    let m = *beta1 * mom.m.data[i][j] + (1.0 - *beta1) * g;
                    let v = *beta2 * mom.v.data[i][j] + (1.0 - *beta2) * g * g;
                    mom.m.data[i][j] = m;
                    mom.v.data[i][j] = v;
                    let m_hat = m / bias1;
                    let v_hat = v / bias2;
                    param.value.data[i][j] -= *lr * m_hat / (v_hat.sqrt() + EPSILON);
                }
            }
        }
    }

    pub fn state(&self) -> &AdamState {
        &self.state
    }

    /// Verifies that `state` could have been produced for `module`.
    pub fn check_state<M: Module + ?Sized>(state: &AdamState, module: &M) -> Result<()> {
        let params = module.params();
        if state.moments.len() > params.len() {
            return Err(Error::StateMismatch(format!(
                "optimizer state has {} slots for {} parameters",
                state.moments.len(),
                params.len()
            )));
        }
        for (param, slot) in params.iter().zip(state.moments.iter()) {
            if let Some(mom) = slot {
                if mom.m.shape() != param.value.shape() || mom.v.shape() != param.value.shape() {
                    return Err(Error::shape(
                        format!("optimizer moments of '{}'", param.name),
                        param.value.shape(),
                        mom.m.shape(),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn load_state<M: Module + ?Sized>(&mut self, state: AdamState, module: &M) -> Result<()> {
        Adam::check_state(&state, module)?;
        self.state = state;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::param::{Param, ParamKind};
    use approx::assert_abs_diff_eq;

    struct Single(Param);

    impl Module for Single {
        fn params(&self) -> Vec<&Param> { vec![&self.0] }
        fn params_mut(&mut self) -> Vec<&mut Param> { vec![&mut self.0] }
    }

    fn single(value: f64, grad: f64) -> Single {
        let mut p = Param::new("w", ParamKind::Weight, Matrix::filled(1, 1, value));
        p.grad = Matrix::filled(1, 1, grad);
        Single(p)
    }

    #[test]
    fn first_step_moves_by_learning_rate() {
        let mut module = single(1.0, 0.5);
        let mut adam = Adam::new(0.1, 0.9, 0.999, 0.0);
        adam.step(&mut module);
        // m̂ / √v̂ = sign(g) on the first step.
        assert_abs_diff_eq!(module.0.value.data[0][0], 0.9, epsilon = 1e-6);
        assert_eq!(adam.state().moments[0].as_ref().map(|m| m.step), Some(1));
    }

    #[test]
    fn frozen_parameters_are_not_updated() {
        let mut module = single(1.0, 0.5);
        module.0.trainable = false;
        let mut adam = Adam::new(0.1, 0.9, 0.999, 0.0);
        adam.step(&mut module);
        assert_eq!(module.0.value.data[0][0], 1.0);
        assert!(adam.state().moments[0].is_none());
    }

    #[test]
    fn mismatched_state_is_rejected() {
        let module = single(1.0, 0.0);
        let mut state = Adam::new(0.1, 0.9, 0.999, 0.0).state().clone();
        state.moments = vec![Some(Moments { step: 1, m: Matrix::zeros(2, 2), v: Matrix::zeros(2, 2) })];
        assert!(matches!(Adam::check_state(&state, &module), Err(Error::ShapeMismatch { .. })));
    }
}
