use rand::Rng;

use crate::activation::activation::ActivationFunction;
use crate::layers::{dense::Dense, dropout::Dropout, param::Param};
use crate::math::matrix::Matrix;
use crate::network::module::Module;
use crate::train::config::GenConfig;

/// Maps the assembled input modalities plus a conditioning vector to a
/// synthetic target image.
pub trait Generator: Module {
    /// `input` is (batch, input_dim · voxels), `cond` is (batch, cond_dim).
    fn forward(&mut self, input: &Matrix, cond: &Matrix) -> Matrix;

    /// Back-propagates ∂L/∂output of the last `forward`, accumulating
    /// parameter gradients.
    fn backward(&mut self, grad_output: &Matrix);
}

/// One residual block whose activations are modulated by the style code:
/// `h + drop(σ(lin(h) ⊙ (1 + γ(s)) + β(s)))`.
#[derive(Debug, Clone)]
struct ResBlock {
    linear: Dense,
    modulation: Dense,
    dropout: Dropout,
    linear_out: Matrix,
    gamma: Matrix,
    modulated: Matrix,
}

impl ResBlock {
    fn new<R: Rng + ?Sized>(index: usize, dim: usize, style_dim: usize, dropout: f64, rng: &mut R) -> ResBlock {
        ResBlock {
            linear: Dense::new(&format!("res{index}.linear"), dim, dim, ActivationFunction::Identity, rng),
            modulation: Dense::new(&format!("res{index}.style"), style_dim, 2 * dim, ActivationFunction::Identity, rng),
            dropout: Dropout::new(dropout, rng.gen()),
            linear_out: Matrix::default(),
            gamma: Matrix::default(),
            modulated: Matrix::default(),
        }
    }

    fn forward(&mut self, h: &Matrix, style: &Matrix) -> Matrix {
        let dim = self.linear.size();
        let u = self.linear.forward(h);
        let gb = self.modulation.forward(style).split_columns(&[dim, dim]);
        let gamma = &gb[0];
        let beta = &gb[1];

        let v = &u.zip_map(gamma, |x, g| x * (1.0 + g)) + beta;
        let a = v.map(|x| ActivationFunction::LEAKY.function(x));
        let out = h + &self.dropout.forward(&a);

        self.linear_out = u;
        self.gamma = gamma.clone();
        self.modulated = v;
        out
    }

    /// Returns (∂L/∂h, ∂L/∂style).
    fn backward(&mut self, grad_output: &Matrix) -> (Matrix, Matrix) {
        let grad_a = self.dropout.backward(grad_output);
        let grad_v = grad_a.zip_map(&self.modulated, |g, v| g * ActivationFunction::LEAKY.derivative(v));

        let grad_u = grad_v.zip_map(&self.gamma, |g, gamma| g * (1.0 + gamma));
        let grad_gamma = grad_v.hadamard(&self.linear_out);
        let grad_style = self.modulation.backward(&Matrix::hconcat(&[&grad_gamma, &grad_v]));

        let grad_h = grad_output + &self.linear.backward(&grad_u);
        (grad_h, grad_style)
    }
}

/// Residual generator with adaptive, style-conditioned blocks (`g_type: resnet`).
///
/// encoder → n residual blocks modulated by a style code computed from the
/// conditioning vector → linear decoder to the output voxels.
#[derive(Debug, Clone)]
pub struct ResAdaInGenerator {
    encoder: Dense,
    style: Dense,
    blocks: Vec<ResBlock>,
    decoder: Dense,
}

impl ResAdaInGenerator {
    pub fn new<R: Rng + ?Sized>(
        input_width: usize,
        cond_dim: usize,
        output_width: usize,
        config: &GenConfig,
        rng: &mut R,
    ) -> ResAdaInGenerator {
        ResAdaInGenerator {
            encoder: Dense::new("enc", input_width, config.dim, ActivationFunction::LEAKY, rng),
            style: Dense::new("style", cond_dim, config.style_dim, ActivationFunction::ReLU, rng),
            blocks: (0..config.n_res)
                .map(|i| ResBlock::new(i, config.dim, config.style_dim, config.dropout, rng))
                .collect(),
            decoder: Dense::new("dec", config.dim, output_width, ActivationFunction::Identity, rng),
        }
    }
}

impl Module for ResAdaInGenerator {
    fn params(&self) -> Vec<&Param> {
        let mut params = self.encoder.params();
        params.extend(self.style.params());
        for block in &self.blocks {
            params.extend(block.linear.params());
            params.extend(block.modulation.params());
        }
        params.extend(self.decoder.params());
        params
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        let mut params = self.encoder.params_mut();
        params.extend(self.style.params_mut());
        for block in &mut self.blocks {
            params.extend(block.linear.params_mut());
            params.extend(block.modulation.params_mut());
        }
        params.extend(self.decoder.params_mut());
        params
    }

    fn set_training(&mut self, training: bool) {
        for block in &mut self.blocks {
            block.dropout.set_training(training);
        }
    }
}

impl Generator for ResAdaInGenerator {
    fn forward(&mut self, input: &Matrix, cond: &Matrix) -> Matrix {
        let style = self.style.forward(cond);
        let mut h = self.encoder.forward(input);
        for block in &mut self.blocks {
            h = block.forward(&h, &style);
        }
        self.decoder.forward(&h)
    }

    fn backward(&mut self, grad_output: &Matrix) {
        let mut grad = self.decoder.backward(grad_output);
        let mut grad_style = Matrix::zeros(grad.rows, self.style.size());
        for block in self.blocks.iter_mut().rev() {
            let (grad_h, grad_s) = block.backward(&grad);
            grad = grad_h;
            grad_style += &grad_s;
        }
        self.encoder.backward(&grad);
        self.style.backward(&grad_style);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn tiny() -> ResAdaInGenerator {
        let config = GenConfig { dim: 6, style_dim: 3, n_res: 2, dropout: 0.0, ..GenConfig::default() };
        ResAdaInGenerator::new(4, 2, 4, &config, &mut StdRng::seed_from_u64(3))
    }

    fn loss(gen: &mut ResAdaInGenerator, x: &Matrix, c: &Matrix) -> f64 {
        gen.forward(x, c).map(|v| v * v).sum() * 0.5
    }

    #[test]
    fn backward_matches_finite_differences() {
        let mut gen = tiny();
        let x = Matrix::from_data(vec![vec![0.1, -0.4, 0.3, 0.9], vec![0.5, 0.2, -0.7, 0.0]]);
        let c = Matrix::from_data(vec![vec![1.0, 0.3], vec![-0.2, 0.8]]);

        let out = gen.forward(&x, &c);
        gen.zero_grad();
        gen.backward(&out);
        let analytic: Vec<f64> = gen.params().iter().map(|p| p.grad.data[0][0]).collect();

        let h = 1e-6;
        let n = gen.params().len();
        for i in 0..n {
            gen.params_mut()[i].value.data[0][0] += h;
            let up = loss(&mut gen, &x, &c);
            gen.params_mut()[i].value.data[0][0] -= 2.0 * h;
            let down = loss(&mut gen, &x, &c);
            gen.params_mut()[i].value.data[0][0] += h;
            let numeric = (up - down) / (2.0 * h);
            approx::assert_abs_diff_eq!(analytic[i], numeric, epsilon = 1e-5);
        }
    }

    #[test]
    fn output_has_one_row_per_sample() {
        let mut gen = tiny();
        let out = gen.forward(&Matrix::zeros(3, 4), &Matrix::zeros(3, 2));
        assert_eq!(out.shape(), (3, 4));
    }
}
