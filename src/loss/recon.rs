use crate::math::matrix::Matrix;

/// Added to the mask cardinality so an all-background target divides by a
/// tiny number instead of zero.
pub const MASK_EPS: f64 = 1e-10;

/// Masked L1 reconstruction loss.
///
/// Background voxels (target exactly zero) are excluded, and the sum is
/// normalized by the number of foreground voxels rather than by the total
/// element count, so sparse brain masks do not dilute the loss.
///
/// With `exp = true` both tensors are moved out of the log domain first and
/// the mask is taken on the transformed target.
///
/// Both functions panic when the prediction and target differ in shape.
pub struct MaskedL1Loss;

impl MaskedL1Loss {
    /// Scalar loss: Σ_mask |p - t| / (|mask| + ε)
    pub fn loss(predicted: &Matrix, target: &Matrix, exp: bool) -> f64 {
        let (p, t) = transform(predicted, target, exp);
        let mut sum = 0.0;
        let mut count = 0usize;
        for (&p, &t) in p.iter().zip(t.iter()) {
            if t != 0.0 {
                sum += (p - t).abs();
                count += 1;
            }
        }
        sum / (count as f64 + MASK_EPS)
    }

    /// Per-voxel subgradient w.r.t. `predicted`:
    /// sign(p - t) / (|mask| + ε) on the mask, times e^p in the exp domain.
    pub fn derivative(predicted: &Matrix, target: &Matrix, exp: bool) -> Matrix {
        let (p, t) = transform(predicted, target, exp);
        let denom = t.iter().filter(|&&x| x != 0.0).count() as f64 + MASK_EPS;
        let grad = p.zip_map(&t, |p, t| {
            if t == 0.0 || p == t { 0.0 } else { (p - t).signum() / denom }
        });
        if exp {
            // d/dx e^x = e^x, and p already holds e^x.
            grad.hadamard(&p)
        } else {
            grad
        }
    }
}

fn transform(predicted: &Matrix, target: &Matrix, exp: bool) -> (Matrix, Matrix) {
    assert_eq!(predicted.shape(), target.shape(), "prediction and target differ in shape");
    if exp {
        (predicted.map(f64::exp), target.map(f64::exp))
    } else {
        (predicted.clone(), target.clone())
    }
}
