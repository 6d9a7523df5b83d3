use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::math::matrix::Matrix;

/// Inverted dropout. Active only in training mode; in eval mode it is the
/// identity, which is what makes `sample` deterministic.
#[derive(Debug, Clone)]
pub struct Dropout {
    pub rate: f64,
    training: bool,
    mask: Option<Matrix>,
    rng: StdRng,
}

impl Dropout {
    pub fn new(rate: f64, seed: u64) -> Dropout {
        assert!((0.0..1.0).contains(&rate), "dropout rate must lie in [0, 1)");
        Dropout {
            rate,
            training: true,
            mask: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    pub fn forward(&mut self, input: &Matrix) -> Matrix {
        if !self.training || self.rate == 0.0 {
            self.mask = None;
            return input.clone();
        }
        let keep = 1.0 - self.rate;
        let mut mask = Matrix::zeros(input.rows, input.cols);
        for row in mask.data.iter_mut() {
            for m in row.iter_mut() {
                *m = if self.rng.gen::<f64>() < keep { 1.0 / keep } else { 0.0 };
            }
        }
        let out = input.hadamard(&mask);
        self.mask = Some(mask);
        out
    }

    pub fn backward(&self, grad_output: &Matrix) -> Matrix {
        match &self.mask {
            Some(mask) => grad_output.hadamard(mask),
            None => grad_output.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_mode_is_identity() {
        let mut dropout = Dropout::new(0.5, 1);
        dropout.set_training(false);
        let x = Matrix::filled(3, 4, 2.0);
        assert_eq!(dropout.forward(&x), x);
        assert_eq!(dropout.backward(&x), x);
    }

    #[test]
    fn training_mode_zeroes_or_rescales() {
        let mut dropout = Dropout::new(0.5, 1);
        let out = dropout.forward(&Matrix::filled(8, 8, 1.0));
        assert!(out.iter().all(|&x| x == 0.0 || x == 2.0));
        assert!(out.iter().any(|&x| x == 0.0));
    }
}
