// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends one CSV row per (seed, epoch) while the experiment
// runs, so learning curves of every trial end up in one file.
//
// Output file: <metrics_dir>/metrics.csv
//
//   seed,epoch,train_loss,val_loss,val_acc
//   0,1,1.712300,1.604100,0.612546
//   0,2,1.402200,1.388800,0.785978
//   ...
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};
use serde::{Deserialize, Serialize};

/// Training curve point for one epoch of one trial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub seed: u64,

    /// Starts at 1
    pub epoch: usize,

    /// Mean label-smoothed loss over the epoch's training batches
    pub train_loss: f64,

    /// NaN when the validation split is empty
    pub val_loss: f64,

    /// Fraction of validation nodes classified correctly, in [0, 1]
    pub val_acc: f64,
}

impl EpochMetrics {
    pub fn new(seed: u64, epoch: usize, train_loss: f64, val_loss: f64, val_acc: f64) -> Self {
        Self { seed, epoch, train_loss, val_loss, val_acc }
    }

    /// Returns true if this epoch improved over the previous best val_loss
    pub fn is_improvement(&self, best_val_loss: f64) -> bool {
        self.val_loss < best_val_loss
    }
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Create the directory and write the CSV header if the file is new.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create metrics dir '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "seed,epoch,train_loss,val_loss,val_acc")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)?;

        writeln!(
            f,
            "{},{},{:.6},{:.6},{:.6}",
            m.seed, m.epoch, m.train_loss, m.val_loss, m.val_acc,
        )?;

        tracing::debug!(
            "Logged seed {} epoch {}: train_loss={:.4}, val_loss={:.4}",
            m.seed, m.epoch, m.train_loss, m.val_loss,
        );
        Ok(())
    }
}
