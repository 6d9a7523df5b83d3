use rand::Rng;

use crate::activation::activation::ActivationFunction;
use crate::layers::{dense::Dense, param::Param};
use crate::math::matrix::Matrix;
use crate::network::module::Module;

/// Raw realness logits for a batch of `(input, image, cond)` triples.
#[derive(Debug, Clone)]
pub struct DisOutput {
    /// One logit per sample, shape (batch, 1).
    pub global: Matrix,
    /// One logit per output voxel, shape (batch, image width). Absent for
    /// discriminators without a local head.
    pub local: Option<Matrix>,
}

/// Scores how real an image looks given the input it was synthesized from
/// and the conditioning vector.
pub trait Discriminator: Module {
    fn forward(&mut self, input: &Matrix, image: &Matrix, cond: &Matrix) -> DisOutput;

    /// Back-propagates logit gradients of the last `forward` and returns
    /// ∂L/∂image. Parameter gradients accumulate only while trainable.
    fn backward(&mut self, grad_global: &Matrix, grad_local: Option<&Matrix>) -> Matrix;
}

/// Dense discriminator over the concatenated triple with a global head and,
/// for `d_type: unet`, a per-voxel local head.
#[derive(Debug, Clone)]
pub struct PatchDiscriminator {
    trunk: Vec<Dense>,
    global_head: Dense,
    local_head: Option<Dense>,
    widths: [usize; 3],
}

impl PatchDiscriminator {
    /// `widths` are the column counts of input, image and cond.
    pub fn new<R: Rng + ?Sized>(
        widths: [usize; 3],
        dim: usize,
        n_layer: usize,
        local: bool,
        rng: &mut R,
    ) -> PatchDiscriminator {
        let in_width: usize = widths.iter().sum();
        let trunk = (0..n_layer.max(1))
            .map(|i| {
                let fan_in = if i == 0 { in_width } else { dim };
                Dense::new(&format!("trunk{i}"), fan_in, dim, ActivationFunction::LEAKY, rng)
            })
            .collect();
        PatchDiscriminator {
            trunk,
            global_head: Dense::new("global", dim, 1, ActivationFunction::Identity, rng),
            local_head: local.then(|| Dense::new("local", dim, widths[1], ActivationFunction::Identity, rng)),
            widths,
        }
    }
}

impl Module for PatchDiscriminator {
    fn params(&self) -> Vec<&Param> {
        let mut params: Vec<&Param> = self.trunk.iter().flat_map(|l| l.params()).collect();
        params.extend(self.global_head.params());
        if let Some(head) = &self.local_head {
            params.extend(head.params());
        }
        params
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        let mut params: Vec<&mut Param> = self.trunk.iter_mut().flat_map(|l| l.params_mut()).collect();
        params.extend(self.global_head.params_mut());
        if let Some(head) = &mut self.local_head {
            params.extend(head.params_mut());
        }
        params
    }
}

impl Discriminator for PatchDiscriminator {
    fn forward(&mut self, input: &Matrix, image: &Matrix, cond: &Matrix) -> DisOutput {
        let mut h = Matrix::hconcat(&[input, image, cond]);
        for layer in &mut self.trunk {
            h = layer.forward(&h);
        }
        DisOutput {
            global: self.global_head.forward(&h),
            local: self.local_head.as_mut().map(|head| head.forward(&h)),
        }
    }

    fn backward(&mut self, grad_global: &Matrix, grad_local: Option<&Matrix>) -> Matrix {
        let mut grad = self.global_head.backward(grad_global);
        if let (Some(head), Some(g)) = (self.local_head.as_mut(), grad_local) {
            grad += &head.backward(g);
        }
        for layer in self.trunk.iter_mut().rev() {
            grad = layer.backward(&grad);
        }
        grad.split_columns(&self.widths).swap_remove(1)
    }
}
