pub mod gan;
pub mod recon;

pub use gan::GanLoss;
pub use recon::MaskedL1Loss;
