// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Manual fine-tuning loop with Burn's DataLoader and AdamW.
//
//   - Training runs on B (an AutodiffBackend) for gradients
//   - model.valid() returns the model on B::InnerBackend, used
//     for the per-epoch validation pass
//   - Gradients of `grad_accum_steps` batches are summed before
//     one optimiser step; each batch loss is divided by the
//     accumulation count so the sum is an average
//   - The learning rate decays linearly from `learning_rate` to
//     0 over the total number of optimiser steps
//   - Each step clips the global gradient norm to `max_grad_norm`
//   - Parameters and AdamW state live in the backend's float type;
//     under half precision the AdamW epsilon is raised to the
//     smallest value that does not round to zero
//
// Reference: Burn Book §5, Loshchilov & Hutter (2019) AdamW

use anyhow::Result;
use burn::{
    data::{dataloader::DataLoaderBuilder, dataset::Dataset},
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{AdamWConfig, GradientsAccumulator, GradientsParams, Optimizer},
    prelude::*,
    tensor::{backend::AutodiffBackend, Element},
};

use crate::data::{batcher::ClassificationBatcher, dataset::NodeTextDataset};
use crate::infra::metrics::{EpochMetrics, MetricsLogger};
use crate::ml::classifier::TextClassifier;
use crate::ml::evaluator::{eval_loader, evaluate};

#[derive(Config, Debug)]
pub struct TrainingConfig {
    #[config(default = 5e-5)]
    pub learning_rate: f64,
    #[config(default = 8)]
    pub batch_size: usize,
    #[config(default = 4)]
    pub num_epochs: usize,
    #[config(default = 2)]
    pub grad_accum_steps: usize,
    /// Global L2 gradient norm limit per optimiser step; 0 disables
    #[config(default = 1.0)]
    pub max_grad_norm: f32,
    #[config(default = 1e-8)]
    pub adam_epsilon: f32,
    /// Log the running loss every this many optimiser steps
    #[config(default = 10)]
    pub logging_steps: usize,
    /// Shuffle seed; also tags the metrics rows
    #[config(default = 0)]
    pub seed: u64,
    #[config(default = 1)]
    pub num_workers: usize,
}

impl TrainingConfig {
    /// Optimiser steps in one epoch over `num_examples` examples.
    pub fn steps_per_epoch(&self, num_examples: usize) -> usize {
        let batches = num_examples.div_ceil(self.batch_size.max(1));
        batches.div_ceil(self.grad_accum_steps.max(1))
    }

    /// AdamW (β = 0.9 / 0.999, no weight decay) with norm clipping,
    /// its epsilon adjusted to the float element of `B`.
    pub fn optimizer<B: Backend>(&self) -> AdamWConfig {
        let epsilon = representable_epsilon::<B::FloatElem>(self.adam_epsilon);
        if epsilon != self.adam_epsilon {
            tracing::warn!(
                "AdamW epsilon {:e} rounds to zero in this float type; using {:e}",
                self.adam_epsilon, epsilon,
            );
        }
        let clipping = (self.max_grad_norm > 0.0)
            .then_some(GradientClippingConfig::Norm(self.max_grad_norm));

        AdamWConfig::new()
            .with_beta_1(0.9)
            .with_beta_2(0.999)
            .with_epsilon(epsilon)
            .with_weight_decay(0.0)
            .with_grad_clipping(clipping)
    }
}

/// `eps` if it stays non-zero in the float element `E`, otherwise the
/// smallest larger candidate that does (1e-8 is 0 in f16).
pub fn representable_epsilon<E: Element>(eps: f32) -> f32 {
    [eps, 1e-7, 1e-6, 1e-5, 1e-4]
        .into_iter()
        .find(|&e| e.elem::<E>().elem::<f32>() > 0.0)
        .unwrap_or(1e-4)
}

/// lr(step) = base · (1 - step / total), floored at 0.
#[derive(Debug, Clone, Copy)]
pub struct LinearDecay {
    base_lr:     f64,
    total_steps: usize,
}

impl LinearDecay {
    pub fn new(base_lr: f64, total_steps: usize) -> Self {
        Self { base_lr, total_steps }
    }

    pub fn lr_at(&self, step: usize) -> f64 {
        if self.total_steps == 0 {
            return self.base_lr;
        }
        let remaining = self.total_steps.saturating_sub(step) as f64;
        self.base_lr * remaining / self.total_steps as f64
    }
}

pub struct TrainOutcome<B: AutodiffBackend> {
    pub model:  TextClassifier<B>,
    pub epochs: Vec<EpochMetrics>,
}

pub fn train<B: AutodiffBackend>(
    cfg:           &TrainingConfig,
    mut model:     TextClassifier<B>,
    train_dataset: NodeTextDataset,
    val_dataset:   NodeTextDataset,
    metrics:       Option<&MetricsLogger>,
    device:        &B::Device,
) -> Result<TrainOutcome<B>> {
    let accum = cfg.grad_accum_steps.max(1);
    let total_steps = cfg.steps_per_epoch(train_dataset.len()) * cfg.num_epochs;
    let schedule = LinearDecay::new(cfg.learning_rate, total_steps);
    tracing::info!(
        "Training on {} examples ({} val) for {} epochs: {} optimiser steps",
        train_dataset.len(), val_dataset.len(), cfg.num_epochs, total_steps,
    );

    // ── AdamW optimiser ───────────────────────────────────────────────────────
    let mut optim = cfg.optimizer::<B>().init();

    // ── Training data loader (AutodiffBackend) ────────────────────────────────
    let train_loader = DataLoaderBuilder::new(ClassificationBatcher::<B>::new(device.clone()))
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed)
        .num_workers(cfg.num_workers)
        .build(train_dataset);

    // ── Validation data loader (InnerBackend) ─────────────────────────────────
    let val_loader = eval_loader::<B::InnerBackend>(val_dataset, cfg.batch_size, device);

    let mut step          = 0usize;
    let mut running_loss  = 0.0f64;
    let mut running_count = 0usize;
    let mut best_val_loss = f64::INFINITY;
    let mut history       = Vec::with_capacity(cfg.num_epochs);

    for epoch in 1..=cfg.num_epochs {
        let mut accumulator = GradientsAccumulator::new();
        let mut pending     = 0usize;
        let mut loss_sum    = 0.0f64;
        let mut batches     = 0usize;

        for batch in train_loader.iter() {
            let (loss, _) = model.forward_loss(batch.input_ids, batch.attention_mask, batch.labels);

            let loss_val: f64 = loss.clone().into_scalar().elem();
            loss_sum      += loss_val;
            running_loss  += loss_val;
            batches       += 1;
            running_count += 1;

            let grads = (loss / accum as f64).backward();
            let grads = GradientsParams::from_grads(grads, &model);
            accumulator.accumulate(&model, grads);
            pending += 1;

            if pending == accum {
                model = optim.step(schedule.lr_at(step), model, accumulator.grads());
                pending = 0;
                step += 1;

                if cfg.logging_steps > 0 && step % cfg.logging_steps == 0 {
                    tracing::info!(
                        "step {}/{} | loss={:.4} | lr={:.3e}",
                        step, total_steps, running_loss / running_count as f64, schedule.lr_at(step),
                    );
                    running_loss  = 0.0;
                    running_count = 0;
                }
            }
        }

        // Remainder batches still form one step
        if pending > 0 {
            model = optim.step(schedule.lr_at(step), model, accumulator.grads());
            step += 1;
        }

        let train_loss = if batches > 0 { loss_sum / batches as f64 } else { f64::NAN };

        // dropout disabled for validation
        let val = evaluate(&model.valid(), val_loader.as_ref());
        let m = EpochMetrics::new(cfg.seed, epoch, train_loss, val.loss, val.accuracy);

        tracing::info!(
            "Epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | val_acc={:.1}%{}",
            epoch, cfg.num_epochs, m.train_loss, m.val_loss, m.val_acc * 100.0,
            if m.is_improvement(best_val_loss) { " *" } else { "" },
        );
        if m.is_improvement(best_val_loss) {
            best_val_loss = m.val_loss;
        }

        if let Some(logger) = metrics {
            logger.log(&m)?;
        }
        history.push(m);
    }

    Ok(TrainOutcome { model, epochs: history })
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use crate::data::dataset::NodeTextItem;
    use crate::domain::lm_type::Architecture;
    use crate::ml::classifier::TextClassifierConfig;
    use crate::ml::test_utils::tiny_config;

    type TestBackend = Autodiff<NdArray<f32>>;

    #[test]
    fn test_steps_per_epoch_rounds_up_twice() {
        let cfg = TrainingConfig::new().with_batch_size(8).with_grad_accum_steps(2);
        // 1625 train nodes → 204 batches → 102 steps
        assert_eq!(cfg.steps_per_epoch(1625), 102);
        // 17 → 3 batches → 2 steps
        assert_eq!(cfg.steps_per_epoch(17), 2);
        assert_eq!(cfg.steps_per_epoch(0), 0);
    }

    #[test]
    fn test_optimizer_clips_gradient_norm() {
        let optim = serde_json::to_value(TrainingConfig::new().optimizer::<TestBackend>()).unwrap();
        assert_eq!(optim["grad_clipping"]["Norm"].as_f64(), Some(1.0));
        assert!((optim["epsilon"].as_f64().unwrap() - 1e-8).abs() < 1e-12);
        assert_eq!(optim["weight_decay"].as_f64(), Some(0.0));

        let unclipped = TrainingConfig::new().with_max_grad_norm(0.0).optimizer::<TestBackend>();
        assert!(serde_json::to_value(unclipped).unwrap()["grad_clipping"].is_null());
    }

    #[test]
    fn test_epsilon_stays_non_zero_in_half_precision() {
        use burn::tensor::f16;

        assert_eq!(representable_epsilon::<f32>(1e-8), 1e-8);

        // 1e-8 underflows f16; 0 / (sqrt(0) + 0) would turn untouched rows NaN
        assert_eq!(1e-8f32.elem::<f16>().elem::<f32>(), 0.0);
        let eps = representable_epsilon::<f16>(1e-8);
        assert_eq!(eps, 1e-7);
        assert!(eps.elem::<f16>().elem::<f32>() > 0.0);
    }

    #[test]
    fn test_linear_decay() {
        let s = LinearDecay::new(1.0, 4);
        assert_eq!(s.lr_at(0), 1.0);
        assert_eq!(s.lr_at(2), 0.5);
        assert_eq!(s.lr_at(4), 0.0);
        assert_eq!(s.lr_at(9), 0.0);
    }

    #[test]
    fn test_train_records_every_epoch() {
        let device = Default::default();
        let encoder = tiny_config().init::<TestBackend>(Architecture::Bert, &device);
        let model = TextClassifierConfig::new(2).init(encoder, &device);

        let items = |n: u32| -> Vec<NodeTextItem> {
            (0..n)
                .map(|i| NodeTextItem {
                    input_ids:      vec![101, 20 + i, 30 + i, 102],
                    attention_mask: vec![1, 1, 1, 1],
                    label:          (i % 2) as usize,
                })
                .collect()
        };

        let cfg = TrainingConfig::new()
            .with_batch_size(2)
            .with_num_epochs(2)
            .with_learning_rate(1e-3);
        let outcome = train(
            &cfg,
            model,
            NodeTextDataset::new(items(5)),
            NodeTextDataset::new(items(2)),
            None,
            &device,
        ).unwrap();

        assert_eq!(outcome.epochs.len(), 2);
        assert_eq!(outcome.epochs[1].epoch, 2);
        assert!(outcome.epochs.iter().all(|m| m.train_loss.is_finite()));
        assert!(outcome.epochs.iter().all(|m| (0.0..=1.0).contains(&m.val_acc)));
    }
}
