use dwi_synth::train::CheckpointKind;
use dwi_synth::{Batch, CheckpointId, DwiTrainer, Error, Hyperparameters, Matrix, NetworkState};

fn hyperparameters(gan_w: f64, seed: u64) -> Hyperparameters {
    let mut hp: Hyperparameters = serde_yaml::from_str(
        "
lr: 0.001
input_dim: 1
output_dim: 1
multimodal_t1: 1
cond_dim: 2
image_size: 2
gen:
  dim: 6
  style_dim: 3
  n_res: 1
dis:
  dim: 6
  n_layer: 1
",
    )
    .unwrap();
    hp.gan_w = gan_w;
    hp.seed = Some(seed);
    hp
}

fn batch() -> Batch {
    Batch::new(
        Matrix::from_data(vec![vec![0.1, 0.5, 0.9, 0.3], vec![0.7, 0.2, 0.0, 0.4]]),
        Matrix::from_data(vec![vec![1.0, 0.0], vec![0.5, 0.5]]),
        Matrix::from_data(vec![vec![0.0, 0.4, 0.8, 0.2], vec![0.6, 0.0, 0.1, 0.3]]),
    )
}

fn trained(gan_w: f64) -> DwiTrainer {
    let mut trainer = DwiTrainer::new(hyperparameters(gan_w, 7)).unwrap();
    let batch = batch();
    for iteration in 0..3 {
        trainer.update(&batch, 2, iteration).unwrap();
    }
    trainer
}

#[test]
fn save_then_resume_restores_everything() {
    let dir = tempfile::tempdir().unwrap();
    let mut saved = trained(0.1);
    saved.save(dir.path(), CheckpointId::Epoch(1)).unwrap();

    let mut restored = DwiTrainer::new(hyperparameters(0.1, 99)).unwrap();
    assert_ne!(
        NetworkState::capture(restored.generator()),
        NetworkState::capture(saved.generator())
    );
    restored.resume(dir.path(), CheckpointId::Epoch(1)).unwrap();

    assert_eq!(
        NetworkState::capture(restored.generator()),
        NetworkState::capture(saved.generator())
    );
    assert_eq!(
        NetworkState::capture(restored.discriminator().unwrap()),
        NetworkState::capture(saved.discriminator().unwrap())
    );
    assert_eq!(restored.gen_optimizer().state(), saved.gen_optimizer().state());
    assert_eq!(restored.dis_optimizer().unwrap().state(), saved.dis_optimizer().unwrap().state());

    // Both continue identically: with n_dwi = 2 the real pairing offset is fixed.
    let batch = batch();
    for iteration in 3..5 {
        let a = saved.update(&batch, 2, iteration).unwrap().losses;
        let b = restored.update(&batch, 2, iteration).unwrap().losses;
        assert_eq!(a, b);
    }
}

#[test]
fn generator_only_snapshot_has_no_discriminator_file() {
    let dir = tempfile::tempdir().unwrap();
    let trainer = trained(0.0);
    let id = CheckpointId::EpochStep { epoch: 2, step: 30 };
    trainer.save(dir.path(), id).unwrap();

    assert!(id.path(dir.path(), CheckpointKind::Gen).exists());
    assert!(id.path(dir.path(), CheckpointKind::Opt).exists());
    assert!(!id.path(dir.path(), CheckpointKind::Dis).exists());

    let mut restored = DwiTrainer::new(hyperparameters(0.0, 3)).unwrap();
    restored.resume(dir.path(), id).unwrap();
    assert_eq!(
        NetworkState::capture(restored.generator()),
        NetworkState::capture(trainer.generator())
    );
}

#[test]
fn resume_from_file_finds_the_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let trainer = trained(0.1);
    trainer.save(dir.path(), CheckpointId::Latest).unwrap();

    let mut restored = DwiTrainer::new(hyperparameters(0.1, 5)).unwrap();
    let path = dir.path().join("opt_latest.json");
    assert_eq!(restored.resume_from_file(&path).unwrap(), CheckpointId::Latest);
    assert_eq!(
        NetworkState::capture(restored.generator()),
        NetworkState::capture(trainer.generator())
    );
}

#[test]
fn missing_discriminator_file_leaves_trainer_untouched() {
    let dir = tempfile::tempdir().unwrap();
    trained(0.1).save(dir.path(), CheckpointId::Latest).unwrap();
    std::fs::remove_file(CheckpointId::Latest.path(dir.path(), CheckpointKind::Dis)).unwrap();

    let mut restored = DwiTrainer::new(hyperparameters(0.1, 5)).unwrap();
    let before = NetworkState::capture(restored.generator());
    assert!(matches!(
        restored.resume(dir.path(), CheckpointId::Latest),
        Err(Error::Io { .. })
    ));
    assert_eq!(NetworkState::capture(restored.generator()), before);
}

#[test]
fn architecture_mismatch_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    trained(0.0).save(dir.path(), CheckpointId::Epoch(1)).unwrap();

    let mut wider = hyperparameters(0.0, 1);
    wider.gen.dim = 12;
    let mut restored = DwiTrainer::new(wider).unwrap();
    assert!(matches!(
        restored.resume(dir.path(), CheckpointId::Epoch(1)),
        Err(Error::ShapeMismatch { .. })
    ));

    let mut deeper = hyperparameters(0.0, 1);
    deeper.gen.n_res = 2;
    let mut restored = DwiTrainer::new(deeper).unwrap();
    assert!(matches!(
        restored.resume(dir.path(), CheckpointId::Epoch(1)),
        Err(Error::StateMismatch(_))
    ));
}

#[test]
fn corrupt_json_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let trainer = trained(0.0);
    trainer.save(dir.path(), CheckpointId::Latest).unwrap();
    std::fs::write(CheckpointId::Latest.path(dir.path(), CheckpointKind::Gen), "{\"a\":").unwrap();

    let mut restored = DwiTrainer::new(hyperparameters(0.0, 1)).unwrap();
    assert!(matches!(
        restored.resume(dir.path(), CheckpointId::Latest),
        Err(Error::Json { .. })
    ));
}
