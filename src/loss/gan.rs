use crate::activation::activation::ActivationFunction;
use crate::error::{Error, Result};
use crate::math::matrix::Matrix;

/// Selects the adversarial objective applied to discriminator logits.
///
/// - `Lsgan`   — least squares: mean((x − y)²)
/// - `Vanilla` — binary cross-entropy on the sigmoid of the logits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GanLoss {
    Lsgan,
    Vanilla,
}

impl GanLoss {
    pub fn from_name(name: &str) -> Result<GanLoss> {
        match name {
            "lsgan" => Ok(GanLoss::Lsgan),
            "vanilla" => Ok(GanLoss::Vanilla),
            other => Err(Error::NotImplemented(format!("gan_type '{other}'"))),
        }
    }

    fn label(target_is_real: bool) -> f64 {
        if target_is_real { 1.0 } else { 0.0 }
    }

    /// Mean loss of `logits` against an all-real or all-fake target.
    pub fn loss(&self, logits: &Matrix, target_is_real: bool) -> f64 {
        let y = GanLoss::label(target_is_real);
        let n = logits.len().max(1) as f64;
        let total: f64 = match self {
            GanLoss::Lsgan => logits.iter().map(|x| (x - y).powi(2)).sum(),
            // Stable form of -[y·ln σ(x) + (1-y)·ln(1-σ(x))].
            GanLoss::Vanilla => logits.iter()
                .map(|&x| x.max(0.0) - x * y + (-x.abs()).exp().ln_1p())
                .sum(),
        };
        total / n
    }

    /// ∂loss/∂logits.
    pub fn derivative(&self, logits: &Matrix, target_is_real: bool) -> Matrix {
        let y = GanLoss::label(target_is_real);
        let n = logits.len().max(1) as f64;
        match self {
            GanLoss::Lsgan => logits.map(|x| 2.0 * (x - y) / n),
            GanLoss::Vanilla => logits.map(|x| (ActivationFunction::Sigmoid.function(x) - y) / n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn lsgan_is_zero_at_target() {
        let ones = Matrix::filled(2, 3, 1.0);
        assert_eq!(GanLoss::Lsgan.loss(&ones, true), 0.0);
        assert_eq!(GanLoss::Lsgan.loss(&ones, false), 1.0);
    }

    #[test]
    fn vanilla_matches_log_sigmoid() {
        let logits = Matrix::from_data(vec![vec![0.0, 2.0]]);
        let expected = (2f64.ln() + (1.0 + (-2f64).exp()).ln()) / 2.0;
        assert_abs_diff_eq!(GanLoss::Vanilla.loss(&logits, true), expected, epsilon = 1e-12);
    }

    #[test]
    fn derivatives_match_finite_differences() {
        let logits = Matrix::from_data(vec![vec![-1.3, 0.4, 2.2]]);
        let h = 1e-6;
        for mode in [GanLoss::Lsgan, GanLoss::Vanilla] {
            for real in [true, false] {
                let g = mode.derivative(&logits, real);
                for j in 0..3 {
                    let mut up = logits.clone();
                    up.data[0][j] += h;
                    let mut down = logits.clone();
                    down.data[0][j] -= h;
                    let numeric = (mode.loss(&up, real) - mode.loss(&down, real)) / (2.0 * h);
                    assert_abs_diff_eq!(g.data[0][j], numeric, epsilon = 1e-6);
                }
            }
        }
    }

    #[test]
    fn unknown_mode_is_not_implemented() {
        assert!(matches!(GanLoss::from_name("wgan"), Err(Error::NotImplemented(_))));
    }
}
