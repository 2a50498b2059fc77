// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses arguments with clap and routes to Layer 2. This is the
// only layer that prints results to stdout:
//
//   finetune  → "<seed> <accuracy>" per trial, then
//               "# final_acc: <mean>±<std>"
//   splits    → one line of split sizes per seed
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::{bail, Result};
use clap::Parser;
use commands::{Commands, FinetuneArgs, SplitsArgs};
use std::path::Path;

use crate::application::{
    experiment::{Experiment, ExperimentConfig},
    splits_use_case::split_reports,
};
use crate::data::loader::{is_cora_dir, CoraLoader};
use crate::infra::hub::HubProvider;

#[derive(Parser, Debug)]
#[command(
    name = "cora-lm-finetune",
    version = "0.1.0",
    about = "Fine-tune BERT / DeBERTa / SentenceBERT on Cora node text and report accuracy over seeds."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Finetune(args) => run_finetune(args),
            Commands::Splits(args)   => run_splits(args),
        }
    }
}

fn check_data_dir(dir: &str) -> Result<()> {
    if !is_cora_dir(Path::new(dir)) {
        bail!("'{}' must contain cora.content and texts.tsv", dir);
    }
    Ok(())
}

fn run_finetune(args: FinetuneArgs) -> Result<()> {
    let config: ExperimentConfig = args.into();
    check_data_dir(&config.data_dir)?;
    tracing::info!(
        "Fine-tuning {} on '{}' for seeds {:?}",
        config.lm_type, config.data_dir, config.seeds(),
    );

    let source   = CoraLoader::new(&config.data_dir);
    let provider = HubProvider::fetch(config.lm_type, config.cache_dir.as_deref().map(Path::new))?;
    let experiment = Experiment::new(config, source, provider)?;

    let summary = experiment.run(|trial| println!("{} {}", trial.seed, trial.accuracy))?;
    println!("# final_acc: {}", summary.final_acc());
    Ok(())
}

fn run_splits(args: SplitsArgs) -> Result<()> {
    check_data_dir(&args.data_dir)?;
    let source = CoraLoader::new(&args.data_dir);

    for r in split_reports(&source, args.seed_start..args.seed_start + args.seeds)? {
        println!(
            "seed {:>3} | nodes={} classes={} | train={} val={} test={} | overlap={}",
            r.seed, r.nodes, r.classes, r.train, r.val, r.test, r.overlap,
        );
    }
    Ok(())
}
