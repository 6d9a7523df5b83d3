use crate::math::matrix::Matrix;

/// First sample of a batch, reduced to what is worth looking at: the first
/// input channel, the first target channel, the matching prediction and the
/// conditioning vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Visuals {
    pub side: usize,
    pub input: Vec<f64>,
    pub target: Vec<f64>,
    pub prediction: Vec<f64>,
    pub cond: Vec<f64>,
}

impl Visuals {
    pub(crate) fn capture(input: &Matrix, target: &Matrix, prediction: &Matrix, cond: &Matrix, side: usize) -> Visuals {
        let voxels = side * side;
        let first = |m: &Matrix| m.row(0)[..voxels.min(m.cols)].to_vec();
        Visuals {
            side,
            input: first(input),
            target: first(target),
            prediction: first(prediction),
            cond: cond.row(0).to_vec(),
        }
    }
}

/// Discriminator losses of one update, each already averaged over the real
/// and fake passes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisLosses {
    pub global: f64,
    pub local: Option<f64>,
    /// Weighted loss that was back-propagated.
    pub total: f64,
}

/// Losses of one `update` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepLosses {
    /// `l1_w` · masked L1.
    pub recon: f64,
    /// Weighted adversarial term of the generator objective.
    pub gen_adv: Option<f64>,
    /// Present only on iterations that updated the discriminator.
    pub dis: Option<DisLosses>,
}

impl StepLosses {
    /// Generator objective that was back-propagated.
    pub fn total(&self) -> f64 {
        self.recon + self.gen_adv.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone)]
pub struct StepReport {
    pub visuals: Visuals,
    pub losses: StepLosses,
}

#[derive(Debug, Clone)]
pub struct SampleReport {
    pub visuals: Visuals,
    /// Unweighted reconstruction loss.
    pub loss: f64,
}
