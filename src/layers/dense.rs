use rand::Rng;

use crate::{
    activation::activation::ActivationFunction,
    layers::param::{Param, ParamKind},
    math::matrix::Matrix,
};

/// Fully connected layer applied to a whole batch: `a = σ(x·W + b)`.
///
/// Weights are stored as (input_size, size) so a batch of shape
/// (batch, input_size) maps to (batch, size).
#[derive(Debug, Clone)]
pub struct Dense {
    pub weights: Param,
    pub biases: Param,
    pub activator: ActivationFunction,
    inputs: Matrix,
    pre_neurons: Matrix,  // pre-activation values (z = xW + b) needed for correct derivative
}

impl Dense {
    pub fn new<R: Rng + ?Sized>(
        name: &str,
        input_size: usize,
        size: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Dense {
        Dense {
            weights: Param::new(format!("{name}.weight"), ParamKind::Weight, Matrix::xavier(input_size, size, rng)),
            biases: Param::new(format!("{name}.bias"), ParamKind::Bias, Matrix::zeros(1, size)),
            activator: activation,
            inputs: Matrix::default(),
            pre_neurons: Matrix::default(),
        }
    }

    pub fn input_size(&self) -> usize {
        self.weights.value.rows
    }

    pub fn size(&self) -> usize {
        self.weights.value.cols
    }

    /// Forward pass; caches the input and pre-activation for `backward`.
    pub fn forward(&mut self, input: &Matrix) -> Matrix {
        let z = (input * &self.weights.value).add_row(&self.biases.value);
        let a = z.map(|x| self.activator.function(x));
        self.inputs = input.clone();
        self.pre_neurons = z;
        a
    }

    /// Back-propagates `grad_output` (∂L/∂a for the last forward batch).
    ///
    /// Parameter gradients are accumulated only while the layer is trainable;
    /// the gradient with respect to the input is always returned so upstream
    /// layers (or another network) can keep propagating.
    pub fn backward(&mut self, grad_output: &Matrix) -> Matrix {
        // δ = error ⊙ σ'(z)
        let act_derivative = self.pre_neurons.map(|x| self.activator.derivative(x));
        let delta = grad_output.hadamard(&act_derivative);

        if self.weights.trainable {
            self.weights.accumulate(&(&self.inputs.transpose() * &delta));
        }
        if self.biases.trainable {
            self.biases.accumulate(&delta.sum_rows());
        }

        &delta * &self.weights.value.transpose()
    }

    pub fn params(&self) -> Vec<&Param> {
        vec![&self.weights, &self.biases]
    }

    pub fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.weights, &mut self.biases]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn identity_layer() -> Dense {
        let mut rng = StdRng::seed_from_u64(7);
        let mut layer = Dense::new("fc", 2, 1, ActivationFunction::Identity, &mut rng);
        layer.weights.value = Matrix::from_data(vec![vec![2.0], vec![-1.0]]);
        layer.biases.value = Matrix::from_data(vec![vec![0.5]]);
        layer
    }

    #[test]
    fn forward_applies_weights_and_bias_per_row() {
        let mut layer = identity_layer();
        let out = layer.forward(&Matrix::from_data(vec![vec![1.0, 1.0], vec![0.0, 2.0]]));
        assert_eq!(out.data, vec![vec![1.5], vec![-1.5]]);
    }

    #[test]
    fn backward_accumulates_over_the_batch() {
        let mut layer = identity_layer();
        layer.forward(&Matrix::from_data(vec![vec![1.0, 1.0], vec![0.0, 2.0]]));
        let grad_in = layer.backward(&Matrix::from_data(vec![vec![1.0], vec![1.0]]));

        assert_eq!(layer.weights.grad.data, vec![vec![1.0], vec![3.0]]);
        assert_eq!(layer.biases.grad.data, vec![vec![2.0]]);
        assert_eq!(grad_in.data, vec![vec![2.0, -1.0], vec![2.0, -1.0]]);
    }

    #[test]
    fn frozen_layer_still_propagates_input_gradient() {
        let mut layer = identity_layer();
        layer.weights.trainable = false;
        layer.biases.trainable = false;
        layer.forward(&Matrix::from_data(vec![vec![1.0, 1.0]]));
        let grad_in = layer.backward(&Matrix::from_data(vec![vec![1.0]]));

        assert_eq!(layer.weights.grad.sum(), 0.0);
        assert_eq!(layer.biases.grad.sum(), 0.0);
        assert_eq!(grad_in.data, vec![vec![2.0, -1.0]]);
    }
}
