// ============================================================
// Layer 3 — NodeDataset Domain Type
// ============================================================
// One citation graph as the classifier sees it:
//   - a text per node (title + abstract)
//   - an integer class per node
//   - three boolean masks selecting train / val / test nodes
//
// Everything is indexed by node id, so all five vectors must have
// the same length. That invariant is checked once, in `new`, and
// every later stage relies on it.
//
// Reference: Rust Book §5 (Structs), §9 (Error Handling)

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// The three disjoint node partitions of an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    pub fn name(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val   => "val",
            Split::Test  => "test",
        }
    }
}

/// Node texts, labels and split masks for a single seed.
///
/// Invariants (checked by [`NodeDataset::new`]):
///   - `labels.len() == texts.len()`
///   - every mask has length `texts.len()`
///   - every label is `< num_classes`
///
/// Mask exclusivity (a node in at most one split) is expected but
/// not enforced; see [`NodeDataset::overlapping_nodes`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDataset {
    texts:       Vec<String>,
    labels:      Vec<usize>,
    train_mask:  Vec<bool>,
    val_mask:    Vec<bool>,
    test_mask:   Vec<bool>,
    num_classes: usize,
}

impl NodeDataset {
    pub fn new(
        texts:       Vec<String>,
        labels:      Vec<usize>,
        train_mask:  Vec<bool>,
        val_mask:    Vec<bool>,
        test_mask:   Vec<bool>,
        num_classes: usize,
    ) -> Result<Self> {
        let n = texts.len();
        if labels.len() != n {
            bail!("label count {} does not match node count {}", labels.len(), n);
        }
        for (split, mask) in [
            (Split::Train, &train_mask),
            (Split::Val,   &val_mask),
            (Split::Test,  &test_mask),
        ] {
            if mask.len() != n {
                bail!(
                    "{} mask length {} does not match node count {}",
                    split.name(), mask.len(), n
                );
            }
        }
        if let Some((node, &label)) = labels
            .iter()
            .enumerate()
            .find(|(_, &l)| l >= num_classes)
        {
            bail!("node {node} has label {label}, but only {num_classes} classes exist");
        }

        Ok(Self { texts, labels, train_mask, val_mask, test_mask, num_classes })
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn mask(&self, split: Split) -> &[bool] {
        match split {
            Split::Train => &self.train_mask,
            Split::Val   => &self.val_mask,
            Split::Test  => &self.test_mask,
        }
    }

    /// Number of nodes that belong to more than one split.
    pub fn overlapping_nodes(&self) -> usize {
        (0..self.len())
            .filter(|&i| {
                let hits = [self.train_mask[i], self.val_mask[i], self.test_mask[i]]
                    .iter()
                    .filter(|&&m| m)
                    .count();
                hits > 1
            })
            .count()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("paper {i}")).collect()
    }

    #[test]
    fn test_valid_dataset() {
        let ds = NodeDataset::new(
            texts(3),
            vec![0, 1, 2],
            vec![true, false, false],
            vec![false, true, false],
            vec![false, false, true],
            3,
        ).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.num_classes(), 3);
        assert_eq!(ds.overlapping_nodes(), 0);
        assert_eq!(ds.mask(Split::Val), &[false, true, false]);
    }

    #[test]
    fn test_rejects_label_length_mismatch() {
        let res = NodeDataset::new(
            texts(3), vec![0, 1], vec![false; 3], vec![false; 3], vec![false; 3], 2,
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_rejects_short_mask() {
        let res = NodeDataset::new(
            texts(3), vec![0, 1, 0], vec![false; 3], vec![false; 2], vec![false; 3], 2,
        );
        let msg = res.unwrap_err().to_string();
        assert!(msg.contains("val mask"));
    }

    #[test]
    fn test_rejects_out_of_range_label() {
        let res = NodeDataset::new(
            texts(2), vec![0, 7], vec![true, false], vec![false; 2], vec![false, true], 7,
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_counts_overlapping_nodes() {
        let ds = NodeDataset::new(
            texts(3),
            vec![0, 0, 1],
            vec![true, true, false],
            vec![true, false, false],
            vec![false, false, true],
            2,
        ).unwrap();
        // node 0 sits in both train and val
        assert_eq!(ds.overlapping_nodes(), 1);
    }
}
