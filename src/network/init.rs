use rand::Rng;

use crate::error::{Error, Result};
use crate::layers::param::ParamKind;
use crate::math::matrix::Matrix;
use crate::network::module::Module;

/// Weight-initialization policy applied to every network after construction.
///
/// Weights are redrawn according to the policy and biases are zeroed;
/// `Default` keeps whatever the layers were built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitPolicy {
    /// N(0, 0.02), the usual choice for adversarial nets.
    Gaussian,
    Xavier,
    Kaiming,
    Default,
}

impl InitPolicy {
    pub fn from_name(name: &str) -> Result<InitPolicy> {
        match name {
            "gaussian" => Ok(InitPolicy::Gaussian),
            "xavier" => Ok(InitPolicy::Xavier),
            "kaiming" => Ok(InitPolicy::Kaiming),
            "default" => Ok(InitPolicy::Default),
            other => Err(Error::NotImplemented(format!("initialization '{other}'"))),
        }
    }

    pub fn apply<M: Module + ?Sized, R: Rng + ?Sized>(&self, module: &mut M, rng: &mut R) {
        if *self == InitPolicy::Default {
            return;
        }
        for p in module.params_mut() {
            let (rows, cols) = p.value.shape();
            p.value = match (p.kind, self) {
                (ParamKind::Bias, _) => Matrix::zeros(rows, cols),
                (ParamKind::Weight, InitPolicy::Gaussian) => Matrix::gaussian(rows, cols, 0.02, rng),
                (ParamKind::Weight, InitPolicy::Xavier) => Matrix::xavier(rows, cols, rng),
                (ParamKind::Weight, InitPolicy::Kaiming) => Matrix::he(rows, cols, rng),
                (ParamKind::Weight, InitPolicy::Default) => continue,
            };
        }
    }
}
