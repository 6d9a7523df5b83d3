use std::time::Instant;

use rand::Rng;
use tracing::info;

use crate::data::{loader::Dataset, visual::save_visuals};
use crate::error::{Error, Result};
use crate::train::checkpoint::CheckpointId;
use crate::train::epoch_stats::EpochStats;
use crate::train::step::StepLosses;
use crate::train::train_config::TrainConfig;
use crate::train::trainer::DwiTrainer;

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Trains `trainer` from epoch `completed_epochs + 1` up to `config.n_epochs`
/// and returns the statistics of every epoch it ran.
///
/// # Arguments
/// - `trainer`          — built and, when resuming, already restored
/// - `train`            — training split; shuffled every epoch with `rng`
/// - `val`              — optional validation split, scored with `sample`
/// - `config`           — loop settings (batch size and logging/snapshot intervals)
/// - `completed_epochs` — epochs finished before this call (0 for a fresh run)
///
/// The iteration counter is global across epochs and starts at 0, so with
/// `dis.update_every = 2` the discriminator sees iterations 0, 2, 4, ...
///
/// After each epoch the schedulers step and both an `epoch{n}` and the
/// `latest` snapshot are written to `config.snapshot_dir`, so `latest`
/// always holds the newest state.
pub fn train_loop<R: Rng + ?Sized>(
    trainer: &mut DwiTrainer,
    train: &Dataset,
    val: Option<&Dataset>,
    config: &TrainConfig,
    completed_epochs: usize,
    rng: &mut R,
) -> Result<Vec<EpochStats>> {
    config.validate()?;
    if train.is_empty() {
        return Err(Error::Config("training split is empty".into()));
    }

    let n_dwi = trainer.hyperparameters().n_dwi;
    let batches_per_epoch = train.len().div_ceil(config.batch_size);
    let mut iteration = completed_epochs * batches_per_epoch;
    let mut history = Vec::new();

    for epoch in completed_epochs + 1..=config.n_epochs {
        let t_start = Instant::now();
        let mut totals = EpochTotals::default();

        // ── One full pass over the training data ───────────────────────────
        for batch in train.shuffled_batches(config.batch_size, rng) {
            let report = trainer.update(&batch, n_dwi, iteration)?;
            totals.add(&report.losses);
            iteration += 1;

            if every(config.log_iter, iteration) {
                info!(
                    epoch,
                    iteration,
                    recon = report.losses.recon,
                    gen_adv = ?report.losses.gen_adv,
                    dis = ?report.losses.dis.map(|d| d.total),
                    "train step"
                );
            }
            if every(config.snapshot_save_iter, iteration) {
                trainer.save(&config.snapshot_dir, CheckpointId::Latest)?;
            }
            if let Some(dir) = config.image_dir.as_ref().filter(|_| every(config.image_save_iter, iteration)) {
                save_visuals(dir, &format!("epoch{epoch}step{iteration}"), &report.visuals)?;
            }
        }

        // ── Validation ────────────────────────────────────────────────────
        let val_recon = match val {
            Some(data) if !data.is_empty() => Some(evaluate(trainer, data, config.batch_size)?),
            _ => None,
        };

        trainer.update_learning_rate();
        trainer.save(&config.snapshot_dir, CheckpointId::Epoch(epoch))?;
        trainer.save(&config.snapshot_dir, CheckpointId::Latest)?;

        let stats = totals.finish(epoch, config.n_epochs, iteration, val_recon, t_start);
        info!(
            epoch,
            total_epochs = config.n_epochs,
            train_recon = stats.train_recon,
            val_recon = ?stats.val_recon,
            elapsed_ms = stats.elapsed_ms,
            "epoch finished"
        );
        history.push(stats);
    }

    Ok(history)
}

/// Mean unweighted reconstruction loss over `data`, sample-weighted across
/// batches. Parameters and optimizer state are left untouched.
pub fn evaluate(trainer: &mut DwiTrainer, data: &Dataset, batch_size: usize) -> Result<f64> {
    if data.is_empty() {
        return Ok(0.0);
    }
    let mut total = 0.0;
    for batch in data.batches(batch_size) {
        total += trainer.sample(&batch)?.loss * batch.len() as f64;
    }
    Ok(total / data.len() as f64)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn every(interval: usize, iteration: usize) -> bool {
    interval > 0 && iteration % interval == 0
}

#[derive(Default)]
struct EpochTotals {
    steps: usize,
    recon: f64,
    gen_adv: Option<f64>,
    dis: f64,
    dis_updates: usize,
}

impl EpochTotals {
    fn add(&mut self, losses: &StepLosses) {
        self.steps += 1;
        self.recon += losses.recon;
        if let Some(adv) = losses.gen_adv {
            *self.gen_adv.get_or_insert(0.0) += adv;
        }
        if let Some(dis) = losses.dis {
            self.dis += dis.total;
            self.dis_updates += 1;
        }
    }

    fn finish(
        self,
        epoch: usize,
        total_epochs: usize,
        iterations: usize,
        val_recon: Option<f64>,
        t_start: Instant,
    ) -> EpochStats {
        let steps = self.steps.max(1) as f64;
        EpochStats {
            epoch,
            total_epochs,
            iterations,
            train_recon: self.recon / steps,
            train_gen_adv: self.gen_adv.map(|adv| adv / steps),
            train_dis: (self.dis_updates > 0).then(|| self.dis / self.dis_updates as f64),
            val_recon,
            elapsed_ms: t_start.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intervals_fire_on_multiples_only() {
        assert!(!every(0, 10));
        assert!(every(5, 10));
        assert!(!every(5, 7));
    }
}
