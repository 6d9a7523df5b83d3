use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::train::train_config::TrainConfig;

fn default_beta1() -> f64 { 0.5 }
fn default_beta2() -> f64 { 0.999 }
fn default_weight_decay() -> f64 { 1e-4 }
fn default_init() -> String { "kaiming".into() }
fn default_l1_w() -> f64 { 1.0 }
fn default_n_dwi() -> usize { 2 }
fn default_lr_policy() -> String { "constant".into() }
fn default_gamma() -> f64 { 0.5 }

/// How the discriminator picks its real comparison example.
///
/// - `ExcludeFirst` — draw an offset `j` from `1..min(n_dwi, batch)` and pair
///   batch row `r` with real row `(r + j) mod batch`, so the real triple never
///   belongs to the sample being faked (unless the batch has a single row).
/// - `Paired`       — compare against the sample's own ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnpairedSampling {
    #[default]
    ExcludeFirst,
    Paired,
}

impl UnpairedSampling {
    /// Row offset of the real comparison batch for a batch of `rows` rows,
    /// always below `rows`. Returns 0 when no index other than 0 is available.
    pub fn offset<R: Rng + ?Sized>(&self, n_dwi: usize, rows: usize, rng: &mut R) -> usize {
        let bound = n_dwi.min(rows);
        match self {
            UnpairedSampling::ExcludeFirst if bound > 1 => rng.gen_range(1..bound),
            UnpairedSampling::ExcludeFirst => {
                debug!(n_dwi, rows, "no unpaired example to draw, comparing against the paired one");
                0
            }
            UnpairedSampling::Paired => 0,
        }
    }
}

/// Generator section of the hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenConfig {
    pub g_type: String,
    /// Hidden width of the encoder and residual blocks.
    pub dim: usize,
    pub style_dim: usize,
    pub n_res: usize,
    pub dropout: f64,
}

impl Default for GenConfig {
    fn default() -> Self {
        GenConfig {
            g_type: "resnet".into(),
            dim: 64,
            style_dim: 8,
            n_res: 2,
            dropout: 0.0,
        }
    }
}

/// Discriminator section; only read when `gan_w > 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisConfig {
    pub d_type: String,
    pub dim: usize,
    pub n_layer: usize,
    pub lr_d: f64,
    pub gan_type: String,
    /// The discriminator is updated on calls where `iteration % update_every == 0`.
    pub update_every: usize,
}

impl Default for DisConfig {
    fn default() -> Self {
        DisConfig {
            d_type: "unet".into(),
            dim: 64,
            n_layer: 2,
            lr_d: 1e-4,
            gan_type: "lsgan".into(),
            update_every: 2,
        }
    }
}

/// Trainer hyperparameters. Immutable once handed to the trainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub lr: f64,
    #[serde(default = "default_beta1")]
    pub beta1: f64,
    #[serde(default = "default_beta2")]
    pub beta2: f64,
    #[serde(default = "default_weight_decay")]
    pub weight_decay: f64,
    /// Empty or "cpu" for the host, otherwise an accelerator index.
    #[serde(default)]
    pub gpu_ids: String,
    #[serde(default = "default_init")]
    pub init: String,

    pub input_dim: usize,
    pub output_dim: usize,
    #[serde(default)]
    pub multimodal_t1: usize,
    #[serde(default)]
    pub multimodal_b0: usize,
    /// Width of the conditioning vector (b-value and gradient direction).
    pub cond_dim: usize,
    /// Side length of the square slices.
    pub image_size: usize,

    #[serde(default = "default_l1_w")]
    pub l1_w: f64,
    #[serde(default)]
    pub gan_w: f64,
    /// Compute the reconstruction loss in the exponential domain.
    #[serde(default)]
    pub recon_exp: bool,

    #[serde(default = "default_n_dwi")]
    pub n_dwi: usize,
    #[serde(default)]
    pub unpaired: UnpairedSampling,

    #[serde(default = "default_lr_policy")]
    pub lr_policy: String,
    #[serde(default)]
    pub step_size: usize,
    #[serde(default = "default_gamma")]
    pub gamma: f64,

    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    pub gen: GenConfig,
    #[serde(default)]
    pub dis: DisConfig,
}

impl Hyperparameters {
    pub fn voxels(&self) -> usize {
        self.image_size * self.image_size
    }

    /// Column width of the assembled generator input.
    pub fn input_width(&self) -> usize {
        self.input_dim * self.voxels()
    }

    pub fn output_width(&self) -> usize {
        self.output_dim * self.voxels()
    }

    pub fn uses_discriminator(&self) -> bool {
        self.gan_w > 0.0
    }

    /// Consistency checks that must pass before any network is built.
    pub fn validate(&self) -> Result<()> {
        if self.multimodal_t1 + self.multimodal_b0 != self.input_dim {
            return Err(Error::ChannelMismatch {
                t1: self.multimodal_t1,
                b0: self.multimodal_b0,
                input_dim: self.input_dim,
            });
        }
        if self.input_dim == 0 {
            return Err(Error::NoInputModality);
        }
        if self.output_dim == 0 || self.image_size == 0 || self.cond_dim == 0 {
            return Err(Error::Config("output_dim, image_size and cond_dim must be positive".into()));
        }
        if self.lr.is_nan() || self.lr <= 0.0 {
            return Err(Error::Config(format!("lr must be positive, got {}", self.lr)));
        }
        if self.l1_w < 0.0 || self.gan_w < 0.0 {
            return Err(Error::Config("loss weights must not be negative".into()));
        }
        if !(0.0..1.0).contains(&self.gen.dropout) {
            return Err(Error::Config(format!("gen.dropout must lie in [0, 1), got {}", self.gen.dropout)));
        }
        if self.uses_discriminator() && self.dis.update_every == 0 {
            return Err(Error::Config("dis.update_every must be at least 1".into()));
        }
        Ok(())
    }
}

/// Contents of an experiment YAML file: trainer hyperparameters plus the
/// settings of the epoch loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub model: Hyperparameters,
    #[serde(default)]
    pub train: TrainConfig,
}

impl ExperimentConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<ExperimentConfig> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config: ExperimentConfig = serde_yaml::from_str(&text)?;
        config.model.validate()?;
        config.train.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    const YAML: &str = "
model:
  lr: 0.0001
  input_dim: 1
  output_dim: 1
  multimodal_t1: 1
  cond_dim: 4
  image_size: 8
  gan_w: 0.1
  gen:
    n_res: 3
train:
  n_epochs: 5
  batch_size: 4
";

    #[test]
    fn yaml_fills_defaults() {
        let config: ExperimentConfig = serde_yaml::from_str(YAML).unwrap();
        let hp = &config.model;
        assert_eq!(hp.beta1, 0.5);
        assert_eq!(hp.init, "kaiming");
        assert_eq!(hp.gen.n_res, 3);
        assert_eq!(hp.gen.g_type, "resnet");
        assert_eq!(hp.dis.update_every, 2);
        assert_eq!(hp.unpaired, UnpairedSampling::ExcludeFirst);
        assert_eq!(config.train.n_epochs, 5);
        hp.validate().unwrap();
    }

    #[test]
    fn channel_sum_must_match_input_dim() {
        let mut config: ExperimentConfig = serde_yaml::from_str(YAML).unwrap();
        config.model.multimodal_b0 = 1;
        assert!(matches!(
            config.model.validate(),
            Err(Error::ChannelMismatch { t1: 1, b0: 1, input_dim: 1 })
        ));
    }

    #[test]
    fn exclude_first_never_draws_zero() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let j = UnpairedSampling::ExcludeFirst.offset(4, 8, &mut rng);
            assert!((1..4).contains(&j));
        }
        assert_eq!(UnpairedSampling::ExcludeFirst.offset(1, 8, &mut rng), 0);
        assert_eq!(UnpairedSampling::Paired.offset(4, 8, &mut rng), 0);
    }

    #[test]
    fn exclude_first_stays_inside_a_short_batch() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            assert_eq!(UnpairedSampling::ExcludeFirst.offset(3, 2, &mut rng), 1);
            let j = UnpairedSampling::ExcludeFirst.offset(8, 3, &mut rng);
            assert!((1..3).contains(&j));
        }
        assert_eq!(UnpairedSampling::ExcludeFirst.offset(4, 1, &mut rng), 0);
    }
}
