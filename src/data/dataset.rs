use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::data::encoding::EncodedSplit;

/// One tokenized node: every encoded field plus its class label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTextItem {
    pub input_ids:      Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub label:          usize,
}

pub struct NodeTextDataset {
    items: Vec<NodeTextItem>,
}

impl NodeTextDataset {
    pub fn new(items: Vec<NodeTextItem>) -> Self { Self { items } }
}

impl From<EncodedSplit> for NodeTextDataset {
    fn from(split: EncodedSplit) -> Self {
        let items = split.input_ids
            .into_iter()
            .zip(split.attention_mask)
            .zip(split.labels)
            .map(|((input_ids, attention_mask), label)| NodeTextItem {
                input_ids,
                attention_mask,
                label,
            })
            .collect();
        Self { items }
    }
}

impl Dataset<NodeTextItem> for NodeTextDataset {
    fn get(&self, index: usize) -> Option<NodeTextItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_encoded_split() {
        let split = EncodedSplit {
            input_ids:      vec![vec![101, 7, 102], vec![101, 102, 0]],
            attention_mask: vec![vec![1, 1, 1], vec![1, 1, 0]],
            labels:         vec![2, 0],
        };
        let ds = NodeTextDataset::from(split);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.iter().map(|item| item.label).collect::<Vec<_>>(), vec![2, 0]);

        let second = ds.get(1).unwrap();
        assert_eq!(second.input_ids, vec![101, 102, 0]);
        assert_eq!(second.attention_mask, vec![1, 1, 0]);
        assert!(ds.get(2).is_none());
    }

    #[test]
    fn test_empty_split_gives_empty_dataset() {
        let ds = NodeTextDataset::from(EncodedSplit::default());
        assert!(ds.is_empty());
    }
}
