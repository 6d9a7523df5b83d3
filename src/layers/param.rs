use crate::math::matrix::Matrix;

/// Role of a parameter inside its layer; initialization policies treat
/// weights and biases differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Weight,
    Bias,
}

/// A trainable tensor: its value, the gradient accumulated since the last
/// `zero_grad`, and whether gradients flow into it at all.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    pub value: Matrix,
    pub grad: Matrix,
    pub trainable: bool,
}

impl Param {
    pub fn new(name: impl Into<String>, kind: ParamKind, value: Matrix) -> Param {
        let grad = Matrix::zeros(value.rows, value.cols);
        Param {
            name: name.into(),
            kind,
            value,
            grad,
            trainable: true,
        }
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }

    /// Adds `delta` to the stored gradient. Frozen parameters ignore it.
    pub fn accumulate(&mut self, delta: &Matrix) {
        if self.trainable {
            self.grad += delta;
        }
    }

    pub fn numel(&self) -> usize {
        self.value.len()
    }
}
