pub mod error;
pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod loss;
pub mod optim;
pub mod train;
pub mod data;

// Convenience re-exports
pub use error::{Error, Result};
pub use math::matrix::Matrix;
pub use activation::activation::ActivationFunction;
pub use layers::dense::Dense;
pub use network::{Discriminator, Generator, Module, NetworkState};
pub use loss::{GanLoss, MaskedL1Loss};
pub use optim::{Adam, LrScheduler};
pub use train::{Batch, CheckpointId, DwiTrainer, ExperimentConfig, Hyperparameters, TrainConfig};
pub use data::Dataset;
