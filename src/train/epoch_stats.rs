use serde::{Serialize, Deserialize};

/// Per-epoch training statistics returned by `train_loop`.
///
/// The driver writes one row per epoch to `history.csv`; optional columns
/// stay empty when the run has no discriminator or no validation split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Total epochs requested for this run.
    pub total_epochs: usize,
    /// Global iteration count at the end of the epoch.
    pub iterations: usize,
    /// Mean weighted reconstruction loss over the epoch's batches.
    pub train_recon: f64,
    /// Mean weighted adversarial generator loss.
    pub train_gen_adv: Option<f64>,
    /// Mean discriminator loss over the iterations that updated it.
    pub train_dis: Option<f64>,
    /// Mean unweighted reconstruction loss on the validation split.
    pub val_recon: Option<f64>,
    /// Wall-clock duration of this single epoch in milliseconds.
    pub elapsed_ms: u64,
}
