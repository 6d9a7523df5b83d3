use crate::math::matrix::Matrix;

/// One mini-batch as handed over by the data layer: aligned modality images,
/// conditioning vectors and target DWIs, one sample per row.
#[derive(Debug, Clone)]
pub struct Batch {
    pub t1: Option<Matrix>,
    pub b0: Option<Matrix>,
    pub cond: Matrix,
    pub dwi: Matrix,
}

impl Batch {
    pub fn new(t1: Matrix, cond: Matrix, dwi: Matrix) -> Batch {
        Batch { t1: Some(t1), b0: None, cond, dwi }
    }

    pub fn with_b0(mut self, b0: Matrix) -> Batch {
        self.b0 = Some(b0);
        self
    }

    pub fn len(&self) -> usize {
        self.dwi.rows
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
