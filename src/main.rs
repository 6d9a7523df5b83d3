//! Command-line driver: reads an experiment YAML and the three split
//! manifests, trains the DWI synthesis model and scores the test split.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rand::{rngs::StdRng, SeedableRng};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use dwi_synth::{
    data::Dataset,
    train::{evaluate, train_loop, EpochStats},
    DwiTrainer, ExperimentConfig, Result,
};

/// Conditional adversarial sMRI → DWI synthesis
#[derive(Parser)]
#[command(name = "dwi-synth")]
#[command(version)]
#[command(about = "Train a conditional GAN that synthesizes diffusion-weighted slices")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model and evaluate it on the test split
    Train {
        /// Experiment YAML (`model` and `train` sections)
        #[arg(short, long)]
        config: PathBuf,

        /// Training manifest CSV
        #[arg(long)]
        train: PathBuf,

        /// Validation manifest CSV
        #[arg(long)]
        val: PathBuf,

        /// Test manifest CSV
        #[arg(long)]
        test: PathBuf,

        /// Directory that manifest image paths are relative to
        #[arg(long, default_value = ".")]
        data_dir: PathBuf,

        /// Run directory for checkpoints, images and history.csv
        #[arg(short, long, default_value = "runs")]
        output: PathBuf,

        /// Any file of a snapshot to resume from, e.g. runs/checkpoints/gen_epoch3.json
        #[arg(long)]
        resume: Option<PathBuf>,
    },

    /// Validate an experiment YAML without loading data
    CheckConfig {
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Train { config, train, val, test, data_dir, output, resume } => {
            run_training(&config, [train.as_path(), val.as_path(), test.as_path()], &data_dir, &output, resume.as_deref())
        }
        Commands::CheckConfig { config } => check_config(&config),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn check_config(path: &Path) -> Result<()> {
    let config = ExperimentConfig::load(path)?;
    DwiTrainer::new(config.model)?;
    info!("{} is valid", path.display());
    Ok(())
}

fn run_training(
    config_path: &Path,
    [train_csv, val_csv, test_csv]: [&Path; 3],
    data_dir: &Path,
    output: &Path,
    resume: Option<&Path>,
) -> Result<()> {
    let ExperimentConfig { model: hp, train: mut loop_config } = ExperimentConfig::load(config_path)?;
    loop_config.snapshot_dir = output.join(&loop_config.snapshot_dir);
    if loop_config.image_save_iter > 0 && loop_config.image_dir.is_none() {
        loop_config.image_dir = Some(output.join("images"));
    }

    let load = |csv: &Path| Dataset::load(csv, data_dir, &hp);
    let train = load(train_csv)?;
    let val = load(val_csv)?;
    let test = load(test_csv)?;
    info!(train = train.len(), val = val.len(), test = test.len(), "loaded splits");

    let mut rng = hp.seed.map_or_else(StdRng::from_entropy, |s| StdRng::seed_from_u64(s.wrapping_add(1)));
    let mut trainer = DwiTrainer::new(hp)?;

    let completed_epochs = match resume {
        Some(path) => {
            let id = trainer.resume_from_file(path)?;
            let completed = trainer.completed_epochs();
            info!(snapshot = %id, completed_epochs = completed, "resuming");
            completed
        }
        None => 0,
    };

    let history = train_loop(&mut trainer, &train, Some(&val), &loop_config, completed_epochs, &mut rng)?;
    write_history(&output.join("history.csv"), &history)?;

    let test_recon = evaluate(&mut trainer, &test, loop_config.batch_size)?;
    info!(test_recon, "test evaluation finished");
    Ok(())
}

fn write_history(path: &Path, history: &[EpochStats]) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| dwi_synth::Error::Io { path: dir.to_path_buf(), source: e })?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for stats in history {
        writer.serialize(stats)?;
    }
    writer.flush().map_err(|e| dwi_synth::Error::Io { path: path.to_path_buf(), source: e })?;
    Ok(())
}
