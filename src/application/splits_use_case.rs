// ============================================================
// Layer 2 — Split Report
// ============================================================
// Loads the dataset for each seed and reports the sizes of the
// train / val / test splits. No tokenizer or model involved.

use anyhow::Result;
use serde::Serialize;
use std::ops::Range;

use crate::data::splitter::SplitIndices;
use crate::domain::{node_dataset::Split, traits::NodeSource};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplitReport {
    pub seed:    u64,
    pub nodes:   usize,
    pub classes: usize,
    pub train:   usize,
    pub val:     usize,
    pub test:    usize,
    /// Nodes that sit in more than one split
    pub overlap: usize,
}

pub fn split_reports<S: NodeSource>(source: &S, seeds: Range<u64>) -> Result<Vec<SplitReport>> {
    seeds
        .map(|seed| {
            let ds = source.load(seed)?;
            let idx = SplitIndices::from_dataset(&ds);
            Ok(SplitReport {
                seed,
                nodes:   ds.len(),
                classes: ds.num_classes(),
                train:   idx.get(Split::Train).len(),
                val:     idx.get(Split::Val).len(),
                test:    idx.get(Split::Test).len(),
                overlap: ds.overlapping_nodes(),
            })
        })
        .collect()
}
