// ============================================================
// Layer 4 — Split Builder
// ============================================================
// Turns the boolean split masks of a NodeDataset into index
// lists and gathers the matching texts and labels.
//
//   mask:    [F, T, F, T, T]
//   indices: [1, 3, 4]          ← ascending node ids
//   texts:   [t1, t3, t4]       ← same order as indices
//
// No deduplication and no reordering: the i-th gathered item
// always belongs to the i-th index.
//
// Reference: Rust Book §13 (Iterators)

use crate::domain::node_dataset::{NodeDataset, Split};

/// Ascending positions of every `true` entry in `mask`.
pub fn mask_to_indices(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(i, &m)| m.then_some(i))
        .collect()
}

/// Clone the items at `indices`, preserving their order.
///
/// # Panics
/// Panics if an index is out of bounds for `items`.
pub fn gather<T: Clone>(indices: &[usize], items: &[T]) -> Vec<T> {
    indices.iter().map(|&i| items[i].clone()).collect()
}

/// Index lists for the three splits of one dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub val:   Vec<usize>,
    pub test:  Vec<usize>,
}

impl SplitIndices {
    pub fn from_dataset(ds: &NodeDataset) -> Self {
        Self {
            train: mask_to_indices(ds.mask(Split::Train)),
            val:   mask_to_indices(ds.mask(Split::Val)),
            test:  mask_to_indices(ds.mask(Split::Test)),
        }
    }

    pub fn get(&self, split: Split) -> &[usize] {
        match split {
            Split::Train => &self.train,
            Split::Val   => &self.val,
            Split::Test  => &self.test,
        }
    }
}

/// Texts and labels of one split, in ascending node order.
#[derive(Debug, Clone)]
pub struct SplitData {
    pub texts:  Vec<String>,
    pub labels: Vec<usize>,
}

/// Gather texts and labels for `split`.
pub fn collect_split(ds: &NodeDataset, split: Split) -> SplitData {
    let indices = mask_to_indices(ds.mask(split));
    let texts   = gather(&indices, ds.texts());
    let labels  = gather(&indices, ds.labels());

    tracing::debug!("{} split: {} nodes", split.name(), indices.len());
    SplitData { texts, labels }
}
