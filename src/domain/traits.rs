// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The experiment driver only needs "give me the dataset for
// seed N". Implementations:
//   - CoraLoader     → Cora content + text files on disk
//   - InMemorySource → fixed records supplied by the caller
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;
use crate::domain::node_dataset::NodeDataset;

// ─── NodeSource ───────────────────────────────────────────────────────────────
/// Anything that can produce a node dataset for a given seed.
///
/// The seed controls the train / val / test sampling; the node
/// texts and labels are the same for every seed.
pub trait NodeSource {
    fn load(&self, seed: u64) -> Result<NodeDataset>;
}
