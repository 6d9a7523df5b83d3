pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod device;
pub mod epoch_stats;
pub mod loop_fn;
pub mod step;
pub mod train_config;
pub mod trainer;

pub use batch::Batch;
pub use checkpoint::{CheckpointId, CheckpointKind};
pub use config::{DisConfig, ExperimentConfig, GenConfig, Hyperparameters, UnpairedSampling};
pub use device::Device;
pub use epoch_stats::EpochStats;
pub use loop_fn::{evaluate, train_loop};
pub use step::{DisLosses, SampleReport, StepLosses, StepReport, Visuals};
pub use train_config::TrainConfig;
pub use trainer::{DwiTrainer, Net};
