use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for a `train_loop` run.
///
/// # Fields
/// - `n_epochs`           — total number of full passes over the training data
/// - `batch_size`         — samples per mini-batch
/// - `log_iter`           — log step losses every this many iterations (0 = never)
/// - `snapshot_save_iter` — overwrite the `latest` checkpoint every this many
///                          iterations (0 = never)
/// - `image_save_iter`    — dump the diagnostic slices every this many
///                          iterations (0 = never); needs `image_dir`
/// - `snapshot_dir`       — where checkpoints are written
/// - `image_dir`          — where diagnostic PNGs are written
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub n_epochs: usize,
    pub batch_size: usize,
    pub log_iter: usize,
    pub snapshot_save_iter: usize,
    pub image_save_iter: usize,
    pub snapshot_dir: PathBuf,
    pub image_dir: Option<PathBuf>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            n_epochs: 100,
            batch_size: 32,
            log_iter: 10,
            snapshot_save_iter: 1000,
            image_save_iter: 0,
            snapshot_dir: PathBuf::from("checkpoints"),
            image_dir: None,
        }
    }
}

impl TrainConfig {
    /// Creates a minimal `TrainConfig` that never logs, snapshots mid-epoch
    /// or writes images.
    pub fn new(n_epochs: usize, batch_size: usize, snapshot_dir: impl Into<PathBuf>) -> Self {
        TrainConfig {
            n_epochs,
            batch_size,
            log_iter: 0,
            snapshot_save_iter: 0,
            image_save_iter: 0,
            snapshot_dir: snapshot_dir.into(),
            image_dir: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".into()));
        }
        Ok(())
    }
}
