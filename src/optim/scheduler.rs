use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::optim::adam::Adam;

/// Learning-rate policy, stepped once per epoch.
///
/// Step decay: lr_t = lr_0 · gamma^(floor(epoch / step_size))
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LrPolicy {
    Constant,
    Step { step_size: usize, gamma: f64 },
}

impl LrPolicy {
    pub fn from_name(name: &str, step_size: usize, gamma: f64) -> Result<LrPolicy> {
        match name {
            "constant" => Ok(LrPolicy::Constant),
            "step" if step_size > 0 => Ok(LrPolicy::Step { step_size, gamma }),
            "step" => Err(Error::Config("lr_policy 'step' needs step_size > 0".into())),
            other => Err(Error::NotImplemented(format!("learning rate policy '{other}'"))),
        }
    }
}

/// Position of a scheduler, persisted next to the optimizer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchedulerState {
    pub epoch: usize,
}

#[derive(Debug, Clone)]
pub struct LrScheduler {
    policy: LrPolicy,
    base_lr: f64,
    state: SchedulerState,
}

impl LrScheduler {
    pub fn new(policy: LrPolicy, base_lr: f64) -> LrScheduler {
        LrScheduler { policy, base_lr, state: SchedulerState::default() }
    }

    pub fn lr(&self) -> f64 {
        match self.policy {
            LrPolicy::Constant => self.base_lr,
            LrPolicy::Step { step_size, gamma } => {
                self.base_lr * gamma.powi((self.state.epoch / step_size) as i32)
            }
        }
    }

    /// Advances one epoch and pushes the new rate into `optimizer`.
    pub fn step(&mut self, optimizer: &mut Adam) {
        self.state.epoch += 1;
        optimizer.set_lr(self.lr());
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn load_state(&mut self, state: SchedulerState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_policy_decays_every_step_size_epochs() {
        let mut adam = Adam::new(0.1, 0.5, 0.999, 0.0);
        let mut sched = LrScheduler::new(LrPolicy::from_name("step", 2, 0.5).unwrap(), 0.1);
        sched.step(&mut adam);
        assert_eq!(adam.lr(), 0.1);
        sched.step(&mut adam);
        assert_eq!(adam.lr(), 0.05);
    }

    #[test]
    fn constant_policy_never_changes() {
        let mut adam = Adam::new(0.2, 0.5, 0.999, 0.0);
        let mut sched = LrScheduler::new(LrPolicy::Constant, 0.2);
        for _ in 0..5 {
            sched.step(&mut adam);
        }
        assert_eq!(adam.lr(), 0.2);
    }

    #[test]
    fn unknown_policy_is_not_implemented() {
        assert!(matches!(LrPolicy::from_name("plateau", 1, 0.5), Err(Error::NotImplemented(_))));
    }
}
