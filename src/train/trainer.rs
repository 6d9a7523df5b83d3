use std::path::Path;

use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::loss::{gan::GanLoss, recon::MaskedL1Loss};
use crate::math::matrix::Matrix;
use crate::network::{
    discriminator::{Discriminator, PatchDiscriminator},
    generator::{Generator, ResAdaInGenerator},
    init::InitPolicy,
    module::Module,
    state::NetworkState,
};
use crate::optim::{adam::Adam, scheduler::{LrPolicy, LrScheduler}};
use crate::train::{
    batch::Batch,
    checkpoint::{read_json, write_json, CheckpointId, CheckpointKind, DisFile, GenFile, OptFile},
    config::Hyperparameters,
    device::Device,
    step::{DisLosses, SampleReport, StepLosses, StepReport, Visuals},
};

/// Selects a network for `DwiTrainer::set_requires_grad`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Net {
    Gen,
    Dis,
}

/// Everything parsed out of the hyperparameters before a network is built.
struct Plan {
    device: Device,
    init: InitPolicy,
    lr_policy: LrPolicy,
    criterion: Option<GanLoss>,
}

impl Plan {
    fn new(hp: &Hyperparameters) -> Result<Plan> {
        hp.validate()?;
        let device = hp.gpu_ids.parse::<Device>()?;
        let init = InitPolicy::from_name(&hp.init)?;
        let lr_policy = LrPolicy::from_name(&hp.lr_policy, hp.step_size, hp.gamma)?;
        let criterion = if hp.uses_discriminator() {
            Some(GanLoss::from_name(&hp.dis.gan_type)?)
        } else {
            None
        };
        Ok(Plan { device, init, lr_policy, criterion })
    }
}

/// Discriminator side of the trainer; exists iff `gan_w > 0`.
struct DisState {
    net: Box<dyn Discriminator>,
    opt: Adam,
    scheduler: LrScheduler,
    criterion: GanLoss,
    update_every: usize,
}

impl DisState {
    /// Weight of each head's loss in the adversarial term: the global and
    /// local heads are averaged when both exist.
    fn head_weight(has_local: bool, gan_w: f64) -> f64 {
        if has_local { 0.5 * gan_w } else { gan_w }
    }

    /// Adversarial generator loss for `pred` and its gradient w.r.t. `pred`.
    /// The discriminator must be frozen by the caller.
    fn generator_loss(&mut self, input: &Matrix, pred: &Matrix, cond: &Matrix, gan_w: f64) -> (f64, Matrix) {
        let out = self.net.forward(input, pred, cond);
        let w = DisState::head_weight(out.local.is_some(), gan_w);

        let global = self.criterion.loss(&out.global, true);
        let grad_global = self.criterion.derivative(&out.global, true).scale(w);
        let local = out.local.as_ref().map(|l| {
            (self.criterion.loss(l, true), self.criterion.derivative(l, true).scale(w))
        });

        let grad_pred = self.net.backward(&grad_global, local.as_ref().map(|(_, g)| g));
        let local_loss = local.map_or(0.0, |(l, _)| l);
        (w * (global + local_loss), grad_pred)
    }

    /// Scores one batch of triples against a real/fake label and accumulates
    /// the discriminator gradients. Returns the unweighted (global, local)
    /// losses of this pass.
    fn score_pass(&mut self, [input, image, cond]: [&Matrix; 3], real: bool, gan_w: f64) -> (f64, Option<f64>) {
        let out = self.net.forward(input, image, cond);
        // Each pass contributes half of each head's loss.
        let w = 0.5 * DisState::head_weight(out.local.is_some(), gan_w);

        let global = self.criterion.loss(&out.global, real);
        let grad_global = self.criterion.derivative(&out.global, real).scale(w);
        let local = out.local.as_ref().map(|l| {
            (self.criterion.loss(l, real), self.criterion.derivative(l, real).scale(w))
        });

        // The image gradient is dropped: generated images are treated as constants here.
        self.net.backward(&grad_global, local.as_ref().map(|(_, g)| g));
        (global, local.map(|(l, _)| l))
    }

    fn update(&mut self, real: [&Matrix; 3], fake: [&Matrix; 3], gan_w: f64) -> DisLosses {
        self.net.zero_grad();
        let (real_global, real_local) = self.score_pass(real, true, gan_w);
        let (fake_global, fake_local) = self.score_pass(fake, false, gan_w);

        let global = 0.5 * (real_global + fake_global);
        let local = real_local.zip(fake_local).map(|(r, f)| 0.5 * (r + f));
        let total = DisState::head_weight(local.is_some(), gan_w) * (global + local.unwrap_or(0.0));

        self.opt.step(self.net.as_mut());
        DisLosses { global, local, total }
    }
}

/// Orchestrates adversarial training of the sMRI → DWI generator.
///
/// Owns the generator, the optional discriminator, one Adam optimizer and
/// one scheduler per network, and the RNG used for unpaired sampling. Loss
/// values are returned from each call; nothing is carried between steps
/// except parameters and optimizer state.
pub struct DwiTrainer {
    hp: Hyperparameters,
    device: Device,
    gen: Box<dyn Generator>,
    gen_opt: Adam,
    gen_scheduler: LrScheduler,
    dis: Option<DisState>,
    rng: StdRng,
}

impl DwiTrainer {
    /// Builds the networks named by the hyperparameters.
    ///
    /// Every configuration check runs before the first network is allocated.
    pub fn new(hp: Hyperparameters) -> Result<DwiTrainer> {
        let plan = Plan::new(&hp)?;
        if hp.gen.g_type != "resnet" {
            return Err(Error::NotImplemented(format!("generator type '{}'", hp.gen.g_type)));
        }
        let local_head = match (hp.uses_discriminator(), hp.dis.d_type.as_str()) {
            (false, _) => None,
            (true, "unet") => Some(true),
            (true, "basic") => Some(false),
            (true, other) => {
                return Err(Error::NotImplemented(format!("discriminator type '{other}'")));
            }
        };

        let mut rng = seeded_rng(hp.seed);
        info!(g_type = %hp.gen.g_type, "building generator");
        let gen: Box<dyn Generator> = Box::new(ResAdaInGenerator::new(
            hp.input_width(),
            hp.cond_dim,
            hp.output_width(),
            &hp.gen,
            &mut rng,
        ));
        let dis = local_head.map(|local| {
            info!(d_type = %hp.dis.d_type, "building discriminator");
            Box::new(PatchDiscriminator::new(
                [hp.input_width(), hp.output_width(), hp.cond_dim],
                hp.dis.dim,
                hp.dis.n_layer,
                local,
                &mut rng,
            )) as Box<dyn Discriminator>
        });

        DwiTrainer::assemble(hp, plan, gen, dis, rng)
    }

    /// Wraps caller-supplied networks. A discriminator must be given exactly
    /// when `gan_w > 0`.
    pub fn with_networks(
        hp: Hyperparameters,
        gen: Box<dyn Generator>,
        dis: Option<Box<dyn Discriminator>>,
    ) -> Result<DwiTrainer> {
        let plan = Plan::new(&hp)?;
        if dis.is_some() != hp.uses_discriminator() {
            return Err(Error::Config(format!(
                "gan_w = {} requires {} discriminator",
                hp.gan_w,
                if hp.uses_discriminator() { "a" } else { "no" }
            )));
        }
        let rng = seeded_rng(hp.seed);
        DwiTrainer::assemble(hp, plan, gen, dis, rng)
    }

    fn assemble(
        hp: Hyperparameters,
        plan: Plan,
        mut gen: Box<dyn Generator>,
        dis: Option<Box<dyn Discriminator>>,
        mut rng: StdRng,
    ) -> Result<DwiTrainer> {
        if plan.device != Device::Cpu {
            warn!(device = %plan.device, "dense backend has no accelerator support; networks stay on the host");
        }
        info!("Deploy to {}", plan.device);

        plan.init.apply(gen.as_mut(), &mut rng);
        let (trainable, total) = gen.param_counts();
        info!(init = %hp.init, "G trainable: {}/{}", trainable, total);

        let gen_opt = Adam::new(hp.lr, hp.beta1, hp.beta2, hp.weight_decay);
        let gen_scheduler = LrScheduler::new(plan.lr_policy, hp.lr);

        let dis = match (dis, plan.criterion) {
            (Some(mut net), Some(criterion)) => {
                plan.init.apply(net.as_mut(), &mut rng);
                let (trainable, total) = net.param_counts();
                info!(gan_type = %hp.dis.gan_type, "D trainable: {}/{}", trainable, total);
                Some(DisState {
                    net,
                    opt: Adam::new(hp.dis.lr_d, hp.beta1, hp.beta2, hp.weight_decay),
                    scheduler: LrScheduler::new(plan.lr_policy, hp.dis.lr_d),
                    criterion,
                    update_every: hp.dis.update_every,
                })
            }
            _ => None,
        };

        Ok(DwiTrainer {
            hp,
            device: plan.device,
            gen,
            gen_opt,
            gen_scheduler,
            dis,
            rng,
        })
    }

    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hp
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn generator(&self) -> &dyn Generator {
        self.gen.as_ref()
    }

    pub fn discriminator(&self) -> Option<&dyn Discriminator> {
        self.dis.as_ref().map(|d| d.net.as_ref())
    }

    pub fn gen_optimizer(&self) -> &Adam {
        &self.gen_opt
    }

    pub fn dis_optimizer(&self) -> Option<&Adam> {
        self.dis.as_ref().map(|d| &d.opt)
    }

    /// Sets the trainable flag on every parameter of the selected networks.
    /// Selecting an absent discriminator is a no-op.
    pub fn set_requires_grad(&mut self, nets: &[Net], requires_grad: bool) {
        for net in nets {
            match net {
                Net::Gen => self.gen.set_requires_grad(requires_grad),
                Net::Dis => {
                    if let Some(dis) = self.dis.as_mut() {
                        dis.net.set_requires_grad(requires_grad);
                    }
                }
            }
        }
    }

    /// Reconstruction criterion: masked L1, optionally in the exp domain.
    /// Fails with `ShapeMismatch` when `pred` and `target` differ in shape.
    pub fn recon_criterion(&self, pred: &Matrix, target: &Matrix, exp: bool) -> Result<f64> {
        expect_shape("prediction", pred, target.shape())?;
        Ok(MaskedL1Loss::loss(pred, target, exp))
    }

    /// Concatenates the enabled modalities (t1 first, then b0) column-wise.
    fn prepare_input(&self, batch: &Batch) -> Result<Matrix> {
        let voxels = self.hp.voxels();
        let rows = batch.len();
        let mut parts = Vec::new();
        if self.hp.multimodal_t1 > 0 {
            let t1 = batch.t1.as_ref().ok_or(Error::MissingModality("t1"))?;
            expect_shape("t1", t1, (rows, self.hp.multimodal_t1 * voxels))?;
            parts.push(t1);
        }
        if self.hp.multimodal_b0 > 0 {
            let b0 = batch.b0.as_ref().ok_or(Error::MissingModality("b0"))?;
            expect_shape("b0", b0, (rows, self.hp.multimodal_b0 * voxels))?;
            parts.push(b0);
        }
        if parts.is_empty() {
            return Err(Error::NoInputModality);
        }
        Ok(Matrix::hconcat(&parts))
    }

    fn check_targets(&self, batch: &Batch) -> Result<()> {
        if batch.is_empty() {
            return Err(Error::Config("empty batch".into()));
        }
        expect_shape("cond", &batch.cond, (batch.len(), self.hp.cond_dim))?;
        expect_shape("dwi", &batch.dwi, (batch.len(), self.hp.output_width()))
    }

    /// One training step: generator update, then every `dis.update_every`
    /// iterations a discriminator update.
    ///
    /// `n_dwi` bounds the offsets the unpaired sampling policy may draw.
    pub fn update(&mut self, batch: &Batch, n_dwi: usize, iteration: usize) -> Result<StepReport> {
        self.check_targets(batch)?;
        let input = self.prepare_input(batch)?;
        let (l1_w, gan_w, exp) = (self.hp.l1_w, self.hp.gan_w, self.hp.recon_exp);

        self.gen.zero_grad();
        let pred = self.gen.forward(&input, &batch.cond);
        let recon = l1_w * MaskedL1Loss::loss(&pred, &batch.dwi, exp);
        let mut grad_pred = MaskedL1Loss::derivative(&pred, &batch.dwi, exp).scale(l1_w);

        let mut gen_adv = None;
        if self.dis.is_some() {
            self.set_requires_grad(&[Net::Dis], false);
            self.set_requires_grad(&[Net::Gen], true);
        }
        if let Some(dis) = self.dis.as_mut() {
            let (loss, grad) = dis.generator_loss(&input, &pred, &batch.cond, gan_w);
            grad_pred += &grad;
            gen_adv = Some(loss);
        }
        self.gen.backward(&grad_pred);
        self.gen_opt.step(self.gen.as_mut());

        let visuals = Visuals::capture(&input, &batch.dwi, &pred, &batch.cond, self.hp.image_size);

        let mut dis_losses = None;
        if self.dis.as_ref().is_some_and(|d| iteration % d.update_every == 0) {
            self.set_requires_grad(&[Net::Dis], true);
            self.set_requires_grad(&[Net::Gen], false);

            let offset = self.hp.unpaired.offset(n_dwi, batch.len(), &mut self.rng);
            let real_input = input.roll_rows(offset);
            let real_dwi = batch.dwi.roll_rows(offset);
            let real_cond = batch.cond.roll_rows(offset);

            if let Some(dis) = self.dis.as_mut() {
                let losses = dis.update(
                    [&real_input, &real_dwi, &real_cond],
                    [&input, &pred, &batch.cond],
                    gan_w,
                );
                debug!(iteration, offset, global = losses.global, local = ?losses.local, "discriminator update");
                dis_losses = Some(losses);
            }
        }

        Ok(StepReport {
            visuals,
            losses: StepLosses { recon, gen_adv, dis: dis_losses },
        })
    }

    /// Runs the generator in eval mode on `input` and `cond`.
    pub fn forward(&mut self, input: &Matrix, cond: &Matrix) -> Result<Matrix> {
        expect_shape("input", input, (input.rows, self.hp.input_width()))?;
        expect_shape("cond", cond, (input.rows, self.hp.cond_dim))?;
        self.gen.set_training(false);
        let pred = self.gen.forward(input, cond);
        self.gen.set_training(true);
        Ok(pred)
    }

    /// Evaluates a batch without touching gradients or optimizer state and
    /// reports the unweighted reconstruction loss.
    pub fn sample(&mut self, batch: &Batch) -> Result<SampleReport> {
        self.check_targets(batch)?;
        let input = self.prepare_input(batch)?;
        self.gen.set_training(false);
        let pred = self.gen.forward(&input, &batch.cond);
        self.gen.set_training(true);

        let loss = self.recon_criterion(&pred, &batch.dwi, self.hp.recon_exp)?;
        Ok(SampleReport {
            visuals: Visuals::capture(&input, &batch.dwi, &pred, &batch.cond, self.hp.image_size),
            loss,
        })
    }

    /// Epochs the generator scheduler has stepped through, restored by
    /// `resume`. A resumed run continues after this epoch.
    pub fn completed_epochs(&self) -> usize {
        self.gen_scheduler.state().epoch
    }

    /// Advances both schedulers by one epoch.
    ///
    /// The discriminator scheduler steps together with the generator's so
    /// `lr_d` follows the same policy.
    pub fn update_learning_rate(&mut self) {
        self.gen_scheduler.step(&mut self.gen_opt);
        if let Some(dis) = self.dis.as_mut() {
            dis.scheduler.step(&mut dis.opt);
        }
        debug!(lr = self.gen_opt.lr(), "learning rate updated");
    }

    /// Writes the generator, discriminator (if any) and optimizer files of
    /// snapshot `id` into `dir`.
    pub fn save(&self, dir: &Path, id: CheckpointId) -> Result<()> {
        std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

        let opt = OptFile {
            gen: self.gen_opt.state().clone(),
            gen_scheduler: self.gen_scheduler.state(),
            dis: self.dis.as_ref().map(|d| d.opt.state().clone()),
            dis_scheduler: self.dis.as_ref().map(|d| d.scheduler.state()),
        };
        write_json(&id.path(dir, CheckpointKind::Opt), &opt)?;
        if let Some(dis) = &self.dis {
            let file = DisFile { dis: NetworkState::capture(dis.net.as_ref()) };
            write_json(&id.path(dir, CheckpointKind::Dis), &file)?;
        }
        let file = GenFile { a: NetworkState::capture(self.gen.as_ref()) };
        write_json(&id.path(dir, CheckpointKind::Gen), &file)?;

        info!(dir = %dir.display(), snapshot = %id, "saved checkpoint");
        Ok(())
    }

    /// Restores snapshot `id` from `dir`. The discriminator and its optimizer
    /// are only read when this trainer has a discriminator.
    ///
    /// Every file is read and checked against the live networks before any
    /// state is replaced.
    pub fn resume(&mut self, dir: &Path, id: CheckpointId) -> Result<()> {
        let gen_path = id.path(dir, CheckpointKind::Gen);
        info!("Load model G from {}", gen_path.display());
        let gen_file: GenFile = read_json(&gen_path)?;
        gen_file.a.check(self.gen.as_ref())?;

        let opt_path = id.path(dir, CheckpointKind::Opt);
        info!("Load G optimizer: {}", opt_path.display());
        let OptFile { gen, gen_scheduler, dis, dis_scheduler } = read_json(&opt_path)?;
        Adam::check_state(&gen, self.gen.as_ref())?;

        let dis_parts = match self.dis.as_ref() {
            Some(state) => {
                let dis_path = id.path(dir, CheckpointKind::Dis);
                info!("Load D model: {}", dis_path.display());
                let dis_file: DisFile = read_json(&dis_path)?;
                dis_file.dis.check(state.net.as_ref())?;
                let opt = dis.ok_or_else(|| {
                    Error::StateMismatch(format!("{} has no discriminator optimizer state", opt_path.display()))
                })?;
                Adam::check_state(&opt, state.net.as_ref())?;
                Some((dis_file.dis, opt, dis_scheduler.unwrap_or_default()))
            }
            None => None,
        };

        gen_file.a.restore(self.gen.as_mut())?;
        self.gen_opt.load_state(gen, self.gen.as_ref())?;
        self.gen_scheduler.load_state(gen_scheduler);
        if let (Some(state), Some((net, opt, scheduler))) = (self.dis.as_mut(), dis_parts) {
            net.restore(state.net.as_mut())?;
            state.opt.load_state(opt, state.net.as_ref())?;
            state.scheduler.load_state(scheduler);
        }
        Ok(())
    }

    /// Resumes from the path of any file of a snapshot, e.g.
    /// `snapshots/gen_epoch3.json`.
    pub fn resume_from_file(&mut self, path: &Path) -> Result<CheckpointId> {
        let (dir, id) = CheckpointId::locate(path)?;
        self.resume(&dir, id)?;
        Ok(id)
    }
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64)
}

fn expect_shape(context: &str, m: &Matrix, expected: (usize, usize)) -> Result<()> {
    if m.shape() != expected {
        return Err(Error::shape(context, expected, m.shape()));
    }
    Ok(())
}
