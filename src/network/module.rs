use crate::layers::param::Param;

/// Anything that owns trainable parameters.
///
/// Parameters are visited in a fixed order; optimizer state and checkpoints
/// rely on that order staying stable for a given architecture.
pub trait Module {
    fn params(&self) -> Vec<&Param>;

    fn params_mut(&mut self) -> Vec<&mut Param>;

    /// Switches stochastic regularization (dropout) on or off.
    fn set_training(&mut self, _training: bool) {}

    fn zero_grad(&mut self) {
        for p in self.params_mut() {
            p.zero_grad();
        }
    }

    /// Sets the trainable flag on every parameter. Frozen parameters collect
    /// no gradient and are skipped by the optimizer.
    fn set_requires_grad(&mut self, requires_grad: bool) {
        for p in self.params_mut() {
            p.trainable = requires_grad;
        }
    }

    /// (trainable, total) scalar parameter counts.
    fn param_counts(&self) -> (usize, usize) {
        self.params().iter().fold((0, 0), |(trainable, total), p| {
            let n = p.numel();
            (trainable + if p.trainable { n } else { 0 }, total + n)
        })
    }
}
