// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `finetune` and `splits`, and
// all their configurable flags.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};

use crate::application::experiment::{DeviceKind, ExperimentConfig};
use crate::domain::lm_type::LmType;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fine-tune a pretrained encoder on Cora node text over several seeds
    Finetune(FinetuneArgs),

    /// Print the train / val / test split sizes for each seed
    Splits(SplitsArgs),
}

/// All arguments for the `finetune` command.
#[derive(Args, Debug)]
pub struct FinetuneArgs {
    /// Peak learning rate; decays linearly to 0
    #[arg(long, default_value_t = 5e-5)]
    pub lr: f64,

    /// Examples per forward pass
    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 4)]
    pub epochs: usize,

    /// Pretrained encoder: sentencebert, deberta or bert
    #[arg(long, default_value = "bert")]
    pub lm_type: LmType,

    /// Directory holding cora.content and texts.tsv
    #[arg(long, default_value = "data/cora")]
    pub data_dir: String,

    /// Number of seeds (trials) to run
    #[arg(long, default_value_t = 5)]
    pub seeds: u64,

    #[arg(long, default_value_t = 0)]
    pub seed_start: u64,

    /// Token limit per node text, [CLS] and [SEP] included
    #[arg(long, default_value_t = 256)]
    pub max_seq_len: usize,

    /// Batches whose gradients are summed per optimiser step
    #[arg(long, default_value_t = 2)]
    pub grad_accum: usize,

    /// Clip the global gradient norm per optimiser step (0 = off)
    #[arg(long, default_value_t = 1.0)]
    pub max_grad_norm: f32,

    /// Dropout on the final hidden states
    #[arg(long, default_value_t = 0.0)]
    pub dropout: f64,

    /// Width of an extra projection before the classifier (empty = none)
    #[arg(long, default_value = "", value_parser = validate_feat_shrink)]
    pub feat_shrink: String,

    /// Drop the bias of the classifier (and projection) layers
    #[arg(long)]
    pub no_cla_bias: bool,

    /// Compute backend: wgpu or cpu
    #[arg(long, default_value = "wgpu")]
    pub device: DeviceKind,

    /// Hugging Face cache directory (defaults to the hub's own)
    #[arg(long)]
    pub cache_dir: Option<String>,

    /// Write per-epoch metrics.csv into this directory
    #[arg(long)]
    pub metrics_dir: Option<String>,

    /// Write the experiment summary as JSON to this file
    #[arg(long)]
    pub summary_json: Option<String>,

    /// Log the running loss every N optimiser steps
    #[arg(long, default_value_t = 10)]
    pub logging_steps: usize,
}

fn validate_feat_shrink(s: &str) -> Result<String, String> {
    match s.trim() {
        "" => Ok(String::new()),
        w  => match w.parse::<usize>() {
            Ok(n) if n > 0 => Ok(w.to_string()),
            _ => Err(format!("expected a positive width or an empty string, got '{w}'")),
        },
    }
}

/// Convert CLI FinetuneArgs into the application-layer ExperimentConfig.
/// The application layer never sees clap types.
impl From<FinetuneArgs> for ExperimentConfig {
    fn from(a: FinetuneArgs) -> Self {
        ExperimentConfig {
            data_dir:      a.data_dir,
            lm_type:       a.lm_type,
            lr:            a.lr,
            batch_size:    a.batch_size,
            epochs:        a.epochs,
            num_seeds:     a.seeds,
            seed_start:    a.seed_start,
            max_seq_len:   a.max_seq_len,
            grad_accum:    a.grad_accum,
            max_grad_norm: a.max_grad_norm,
            dropout:       a.dropout,
            feat_shrink:   a.feat_shrink.trim().parse().ok(),
            cla_bias:      !a.no_cla_bias,
            logging_steps: a.logging_steps,
            device:        a.device,
            cache_dir:     a.cache_dir,
            metrics_dir:   a.metrics_dir,
            summary_json:  a.summary_json,
        }
    }
}

/// All arguments for the `splits` command
#[derive(Args, Debug)]
pub struct SplitsArgs {
    #[arg(long, default_value = "data/cora")]
    pub data_dir: String,

    #[arg(long, default_value_t = 5)]
    pub seeds: u64,

    #[arg(long, default_value_t = 0)]
    pub seed_start: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    fn finetune(args: &[&str]) -> ExperimentConfig {
        const PREFIX: [&str; 2] = ["cora-lm-finetune", "finetune"];
        let argv: Vec<&str> = PREFIX.iter().chain(args).copied().collect();
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Finetune(a) => a.into(),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_defaults_match_config_defaults() {
        let cfg = finetune(&[]);
        let def = ExperimentConfig::default();
        assert_eq!(cfg.lr, def.lr);
        assert_eq!(cfg.batch_size, 8);
        assert_eq!(cfg.epochs, 4);
        assert_eq!(cfg.lm_type, LmType::Bert);
        assert_eq!(cfg.seeds().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
        assert_eq!(cfg.grad_accum, 2);
        assert_eq!(cfg.max_grad_norm, 1.0);
        assert_eq!(cfg.feat_shrink, None);
        assert!(cfg.cla_bias);
        assert_eq!(cfg.device, DeviceKind::Wgpu);
    }

    #[test]
    fn test_flags_override() {
        let cfg = finetune(&[
            "--lm-type", "deberta", "--feat-shrink", "128", "--no-cla-bias",
            "--device", "cpu", "--seeds", "3", "--lr", "2e-5", "--max-grad-norm", "0",
        ]);
        assert_eq!(cfg.max_grad_norm, 0.0);
        assert_eq!(cfg.lm_type, LmType::Deberta);
        assert_eq!(cfg.feat_shrink, Some(128));
        assert!(!cfg.cla_bias);
        assert_eq!(cfg.device, DeviceKind::Cpu);
        assert_eq!(cfg.num_seeds, 3);
        assert_eq!(cfg.lr, 2e-5);
    }

    #[test]
    fn test_rejects_bad_values() {
        for bad in [["--feat-shrink", "wide"], ["--lm-type", "gpt2"], ["--device", "tpu"]] {
            let mut argv = vec!["cora-lm-finetune", "finetune"];
            argv.extend(bad);
            assert!(Cli::try_parse_from(argv).is_err());
        }
    }
}
