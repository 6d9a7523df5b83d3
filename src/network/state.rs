use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::math::matrix::Matrix;
use crate::network::module::Module;

/// Parameter values of one network, keyed by parameter name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkState {
    pub tensors: BTreeMap<String, Matrix>,
}

impl NetworkState {
    pub fn capture<M: Module + ?Sized>(module: &M) -> NetworkState {
        NetworkState {
            tensors: module.params().into_iter()
                .map(|p| (p.name.clone(), p.value.clone()))
                .collect(),
        }
    }

    /// Checks that every parameter of `module` has an entry of the same shape
    /// and that no entry is left over.
    pub fn check<M: Module + ?Sized>(&self, module: &M) -> Result<()> {
        let params = module.params();
        if params.len() != self.tensors.len() {
            return Err(Error::StateMismatch(format!(
                "network has {} parameters, state holds {}",
                params.len(),
                self.tensors.len()
            )));
        }
        for p in params {
            let stored = self.tensors.get(&p.name).ok_or_else(|| {
                Error::StateMismatch(format!("missing parameter '{}'", p.name))
            })?;
            if stored.shape() != p.value.shape() {
                return Err(Error::shape(p.name.clone(), p.value.shape(), stored.shape()));
            }
        }
        Ok(())
    }

    /// Copies the stored values into `module`. Nothing is written unless the
    /// whole state matches.
    pub fn restore<M: Module + ?Sized>(&self, module: &mut M) -> Result<()> {
        self.check(module)?;
        for p in module.params_mut() {
            p.value = self.tensors[&p.name].clone();
        }
        Ok(())
    }
}
