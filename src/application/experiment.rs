// ============================================================
// Layer 2 — Experiment (multi-seed fine-tuning)
// ============================================================
// Orchestrates one trial per seed, strictly in order:
//
//   Step 1: Load dataset + node text for the seed   (Layer 4 - data)
//   Step 2: Slice train / val / test by mask        (Layer 4 - data)
//   Step 3: Tokenize each split                     (Layer 4 - data)
//   Step 4: Wrap as Burn datasets                   (Layer 4 - data)
//   Step 5: Fresh classifier over a fresh encoder   (Layer 5 - ml)
//   Step 6: Fine-tune                               (Layer 5 - ml)
//   Step 7: Score the test split                    (Layer 5 - ml)
//
// Test accuracies are aggregated as mean ± population std.
// The first failing step aborts the whole experiment.
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use anyhow::{bail, Context, Result};
use burn::{
    backend::{Autodiff, NdArray},
    module::AutodiffModule,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use std::{fmt, fs, ops::Range, path::Path, str::FromStr};

use crate::data::{
    dataset::NodeTextDataset,
    encoding::TextEncoder,
    splitter::collect_split,
};
use crate::domain::{
    accuracy::AccuracyAccumulator,
    lm_type::LmType,
    node_dataset::Split,
    traits::NodeSource,
};
use crate::infra::{
    hub::EncoderProvider,
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::{
    classifier::TextClassifierConfig,
    evaluator::{eval_loader, evaluate},
    trainer::{train, TrainingConfig},
};

// Half precision end to end: parameters, activations and AdamW state
#[cfg(feature = "f16")]
type GpuElem = burn::tensor::f16;
#[cfg(not(feature = "f16"))]
type GpuElem = f32;

// ─── Device selection ─────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    #[default]
    Wgpu,
    Cpu,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceKind::Wgpu => "wgpu",
            DeviceKind::Cpu  => "cpu",
        })
    }
}

impl FromStr for DeviceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wgpu" | "gpu" => Ok(DeviceKind::Wgpu),
            "cpu"          => Ok(DeviceKind::Cpu),
            other          => Err(format!("unknown device '{other}', expected wgpu or cpu")),
        }
    }
}

// ─── Experiment Configuration ────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub data_dir:      String,
    pub lm_type:       LmType,
    pub lr:            f64,
    pub batch_size:    usize,
    pub epochs:        usize,
    pub num_seeds:     u64,
    pub seed_start:    u64,
    pub max_seq_len:   usize,
    pub grad_accum:    usize,
    pub max_grad_norm: f32,
    pub dropout:       f64,
    pub feat_shrink:   Option<usize>,
    pub cla_bias:      bool,
    pub logging_steps: usize,
    pub device:        DeviceKind,
    pub cache_dir:     Option<String>,
    pub metrics_dir:   Option<String>,
    pub summary_json:  Option<String>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            data_dir:      "data/cora".to_string(),
            lm_type:       LmType::Bert,
            lr:            5e-5,
            batch_size:    8,
            epochs:        4,
            num_seeds:     5,
            seed_start:    0,
            max_seq_len:   256,
            grad_accum:    2,
            max_grad_norm: 1.0,
            dropout:       0.0,
            feat_shrink:   None,
            cla_bias:      true,
            logging_steps: 10,
            device:        DeviceKind::Wgpu,
            cache_dir:     None,
            metrics_dir:   None,
            summary_json:  None,
        }
    }
}

impl ExperimentConfig {
    pub fn seeds(&self) -> Range<u64> {
        self.seed_start..self.seed_start + self.num_seeds
    }

    pub fn training(&self, seed: u64) -> TrainingConfig {
        TrainingConfig::new()
            .with_learning_rate(self.lr)
            .with_batch_size(self.batch_size)
            .with_num_epochs(self.epochs)
            .with_grad_accum_steps(self.grad_accum)
            .with_max_grad_norm(self.max_grad_norm)
            .with_logging_steps(self.logging_steps)
            .with_seed(seed)
    }

    pub fn classifier(&self, num_classes: usize) -> TextClassifierConfig {
        TextClassifierConfig::new(num_classes)
            .with_dropout(self.dropout)
            .with_feat_shrink(self.feat_shrink)
            .with_cla_bias(self.cla_bias)
    }
}

// ─── Results ──────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialOutcome {
    pub seed:      u64,
    /// Fraction of test nodes classified correctly
    pub accuracy:  f64,
    pub test_size: usize,
    pub epochs:    Vec<EpochMetrics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub config:   ExperimentConfig,
    pub outcomes: Vec<TrialOutcome>,
    pub mean:     f64,
    pub std:      f64,
}

impl ExperimentSummary {
    pub fn new(config: ExperimentConfig, outcomes: Vec<TrialOutcome>) -> Self {
        let acc = Self::accumulate(&outcomes);
        Self { config, mean: acc.mean(), std: acc.std(), outcomes }
    }

    fn accumulate(outcomes: &[TrialOutcome]) -> AccuracyAccumulator {
        let mut acc = AccuracyAccumulator::new();
        for o in outcomes {
            acc.push(o.accuracy);
        }
        acc
    }

    /// `"72.31±1.85"`
    pub fn final_acc(&self) -> String {
        Self::accumulate(&self.outcomes).summary()
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create '{}'", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .with_context(|| format!("Cannot write summary to '{}'", path.display()))?;
        tracing::info!("Summary written to '{}'", path.display());
        Ok(())
    }
}

// ─── Experiment ───────────────────────────────────────────────────────────────
pub struct Experiment<S, P> {
    config:   ExperimentConfig,
    source:   S,
    provider: P,
    metrics:  Option<MetricsLogger>,
}

impl<S: NodeSource, P: EncoderProvider> Experiment<S, P> {
    pub fn new(config: ExperimentConfig, source: S, provider: P) -> Result<Self> {
        let metrics = config
            .metrics_dir
            .as_deref()
            .map(MetricsLogger::new)
            .transpose()?;
        Ok(Self { config, source, provider, metrics })
    }

    /// Run every seed on the configured device. `on_trial` sees each
    /// outcome as soon as its trial finishes.
    pub fn run(&self, on_trial: impl FnMut(&TrialOutcome)) -> Result<ExperimentSummary> {
        match self.config.device {
            DeviceKind::Wgpu => {
                type B = Autodiff<burn::backend::Wgpu<GpuElem, i32>>;
                let device = burn::backend::wgpu::WgpuDevice::default();
                tracing::info!("Using WGPU device: {:?}", device);
                self.run_on::<B>(&device, on_trial)
            }
            DeviceKind::Cpu => {
                if cfg!(feature = "f16") {
                    tracing::warn!("The CPU backend has no half precision; using f32");
                }
                type B = Autodiff<NdArray<f32>>;
                self.run_on::<B>(&Default::default(), on_trial)
            }
        }
    }

    pub fn run_on<B: AutodiffBackend>(
        &self,
        device:       &B::Device,
        mut on_trial: impl FnMut(&TrialOutcome),
    ) -> Result<ExperimentSummary> {
        let seeds = self.config.seeds();
        if seeds.is_empty() {
            bail!("No seeds to run (num_seeds = 0)");
        }

        let mut outcomes = Vec::with_capacity(seeds.clone().count());
        for seed in seeds {
            let outcome = self
                .run_trial::<B>(seed, device)
                .with_context(|| format!("Trial for seed {seed} failed"))?;
            on_trial(&outcome);
            outcomes.push(outcome);
        }

        let summary = ExperimentSummary::new(self.config.clone(), outcomes);
        tracing::info!("{} over {} seeds: {}", self.config.lm_type, summary.outcomes.len(), summary.final_acc());

        if let Some(path) = &self.config.summary_json {
            summary.write_json(Path::new(path))?;
        }
        Ok(summary)
    }

    /// Train a fresh classifier for `seed` and score it on the test split.
    pub fn run_trial<B: AutodiffBackend>(&self, seed: u64, device: &B::Device) -> Result<TrialOutcome> {
        let cfg = &self.config;
        tracing::info!("── Seed {} ──", seed);
        B::seed(seed);

        // ── Step 1: Dataset ───────────────────────────────────────────────────
        let dataset = self.source.load(seed)?;
        let overlap = dataset.overlapping_nodes();
        if overlap > 0 {
            tracing::warn!("{} nodes belong to more than one split", overlap);
        }

        // ── Steps 2-4: Split, tokenize, wrap ──────────────────────────────────
        let encoder = TextEncoder::new(self.provider.tokenizer()?, cfg.max_seq_len)?;
        let [train_ds, val_ds, test_ds] = Split::ALL.map(|split| {
            let data = collect_split(&dataset, split);
            encoder
                .encode(&data.texts, &data.labels)
                .with_context(|| format!("Cannot encode the {} split", split.name()))
                .map(NodeTextDataset::from)
        });
        let (train_ds, val_ds, test_ds) = (train_ds?, val_ds?, test_ds?);
        let test_size = burn::data::dataset::Dataset::len(&test_ds);

        // ── Step 5: Model ─────────────────────────────────────────────────────
        let model = cfg
            .classifier(dataset.num_classes())
            .init(self.provider.encoder::<B>(device)?, device);

        // ── Step 6: Fine-tune ─────────────────────────────────────────────────
        let trained = train(
            &cfg.training(seed),
            model,
            train_ds,
            val_ds,
            self.metrics.as_ref(),
            device,
        )?;

        // ── Step 7: Test accuracy ─────────────────────────────────────────────
        let test_loader = eval_loader::<B::InnerBackend>(test_ds, cfg.batch_size, device);
        let eval = evaluate(&trained.model.valid(), test_loader.as_ref());
        tracing::info!("Seed {} test accuracy: {:.4} ({}/{})", seed, eval.accuracy, eval.correct, eval.total);

        let mut per_class = vec![0usize; dataset.num_classes()];
        for &p in &eval.predictions {
            if let Some(count) = per_class.get_mut(p) {
                *count += 1;
            }
        }
        tracing::debug!("Seed {} predicted class counts: {:?}", seed, per_class);

        Ok(TrialOutcome {
            seed,
            accuracy: eval.accuracy,
            test_size,
            epochs: trained.epochs,
        })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::prelude::Backend;
    use tokenizers::Tokenizer;

    use crate::data::loader::InMemorySource;
    use crate::domain::{lm_type::Architecture, node_dataset::NodeDataset};
    use crate::infra::tokenizer_store::word_level_tokenizer;
    use crate::ml::{encoder::Encoder, test_utils::tiny_config};

    type TestBackend = Autodiff<NdArray<f32>>;

    struct TinyProvider {
        corpus: Vec<String>,
    }

    impl EncoderProvider for TinyProvider {
        fn tokenizer(&self) -> Result<Tokenizer> {
            word_level_tokenizer(&self.corpus, 90)
        }

        fn encoder<B: Backend>(&self, device: &B::Device) -> Result<Encoder<B>> {
            Ok(tiny_config().init(Architecture::Bert, device))
        }
    }

    fn toy_dataset() -> NodeDataset {
        let texts: Vec<String> = (0..10)
            .map(|i| format!("Title: paper {i}\nAbstract: topic{} words about graphs", i % 3))
            .collect();
        let labels: Vec<usize> = (0..10).map(|i| i % 3).collect();
        let train = (0..10).map(|i| i < 6).collect();
        let val   = (0..10).map(|i| (6..8).contains(&i)).collect();
        let test  = (0..10).map(|i| i >= 8).collect();
        NodeDataset::new(texts, labels, train, val, test, 3).unwrap()
    }

    fn toy_config() -> ExperimentConfig {
        ExperimentConfig {
            batch_size:  4,
            epochs:      1,
            num_seeds:   2,
            max_seq_len: 16,
            device:      DeviceKind::Cpu,
            ..ExperimentConfig::default()
        }
    }

    #[test]
    fn test_end_to_end_trials() {
        let dataset = toy_dataset();
        let provider = TinyProvider { corpus: dataset.texts().to_vec() };
        let experiment = Experiment::new(toy_config(), InMemorySource::new(dataset), provider).unwrap();

        let mut seen = Vec::new();
        let summary = experiment
            .run_on::<TestBackend>(&Default::default(), |o| seen.push(o.seed))
            .unwrap();

        assert_eq!(seen, vec![0, 1]);
        assert_eq!(summary.outcomes.len(), 2);
        for o in &summary.outcomes {
            assert!((0.0..=1.0).contains(&o.accuracy));
            assert_eq!(o.test_size, 2);
            assert_eq!(o.epochs.len(), 1);
        }
        assert!((0.0..=1.0).contains(&summary.mean));
    }

    #[test]
    fn test_summary_aggregates_population_std() {
        let outcomes = [0.70, 0.72, 0.75, 0.71, 0.73]
            .iter()
            .enumerate()
            .map(|(seed, &accuracy)| TrialOutcome {
                seed: seed as u64,
                accuracy,
                test_size: 100,
                epochs: Vec::new(),
            })
            .collect();
        let summary = ExperimentSummary::new(ExperimentConfig::default(), outcomes);
        assert!((summary.mean - 0.722).abs() < 1e-12);
        assert!((summary.std - 0.017204650534085).abs() < 1e-9);
        assert_eq!(summary.final_acc(), "72.20±1.72");
    }

    #[test]
    fn test_summary_json_written() {
        let path = std::env::temp_dir()
            .join(format!("experiment_{}", std::process::id()))
            .join("summary.json");
        let outcome = TrialOutcome {
            seed:      0,
            accuracy:  0.5,
            test_size: 4,
            epochs:    vec![EpochMetrics::new(0, 1, 1.2, 1.1, 0.5)],
        };
        let summary = ExperimentSummary::new(ExperimentConfig::default(), vec![outcome]);
        summary.write_json(&path).unwrap();

        let back: ExperimentSummary = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.config.lm_type, LmType::Bert);
        assert_eq!(back.outcomes[0].epochs[0].val_acc, 0.5);
        assert_eq!(back.std, 0.0);
        fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_seed_range_and_device_parsing() {
        let cfg = ExperimentConfig { seed_start: 3, num_seeds: 2, ..ExperimentConfig::default() };
        assert_eq!(cfg.seeds().collect::<Vec<_>>(), vec![3, 4]);
        let training = cfg.training(3);
        assert_eq!(training.seed, 3);
        assert_eq!(training.max_grad_norm, 1.0);
        assert_eq!("CPU".parse::<DeviceKind>().unwrap(), DeviceKind::Cpu);
        assert!("tpu".parse::<DeviceKind>().is_err());
    }
}
