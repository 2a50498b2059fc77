// ============================================================
// Layer 4 — Classification Batcher
// ============================================================
// Implements Burn's Batcher trait to stack NodeTextItems into
// tensors for the classifier:
//
//   Input:  Vec of N items, each with sequences of length ≤ S
//   Output: ClassificationBatch with
//             input_ids      [N, S]  Int
//             attention_mask [N, S]  Int
//             labels         [N]     Int
//
// Items of one split already share a padded length. Shorter
// rows are still right-padded with zeros (mask 0) so any mix of
// items batches correctly.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::NodeTextItem;

#[derive(Debug, Clone)]
pub struct ClassificationBatch<B: Backend> {
    pub input_ids:      Tensor<B, 2, Int>,
    pub attention_mask: Tensor<B, 2, Int>,
    pub labels:         Tensor<B, 1, Int>,
}

#[derive(Clone, Debug)]
pub struct ClassificationBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> ClassificationBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<NodeTextItem, ClassificationBatch<B>> for ClassificationBatcher<B> {
    fn batch(&self, items: Vec<NodeTextItem>) -> ClassificationBatch<B> {
        let batch_size = items.len();
        let seq_len = items
            .iter()
            .map(|item| item.input_ids.len())
            .max()
            .unwrap_or(0);

        let mut input_flat: Vec<i32> = Vec::with_capacity(batch_size * seq_len);
        let mut mask_flat:  Vec<i32> = Vec::with_capacity(batch_size * seq_len);
        for item in &items {
            let pad = seq_len - item.input_ids.len();
            input_flat.extend(item.input_ids.iter().map(|&x| x as i32));
            input_flat.extend(std::iter::repeat(0).take(pad));
            mask_flat.extend(item.attention_mask.iter().map(|&x| x as i32));
            mask_flat.extend(std::iter::repeat(0).take(pad));
        }

        let labels: Vec<i32> = items.iter().map(|item| item.label as i32).collect();

        let input_ids = Tensor::<B, 1, Int>::from_ints(
            input_flat.as_slice(), &self.device
        ).reshape([batch_size, seq_len]);

        let attention_mask = Tensor::<B, 1, Int>::from_ints(
            mask_flat.as_slice(), &self.device
        ).reshape([batch_size, seq_len]);

        let labels = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), &self.device);

        ClassificationBatch { input_ids, attention_mask, labels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_batches_ragged_items() {
        let batcher = ClassificationBatcher::<TestBackend>::new(Default::default());
        let batch = batcher.batch(vec![
            NodeTextItem { input_ids: vec![101, 5, 6, 102], attention_mask: vec![1, 1, 1, 1], label: 1 },
            NodeTextItem { input_ids: vec![101, 102],       attention_mask: vec![1, 1],       label: 0 },
        ]);

        assert_eq!(batch.input_ids.dims(), [2, 4]);
        assert_eq!(batch.attention_mask.dims(), [2, 4]);
        assert_eq!(batch.labels.dims(), [2]);

        let mask: Vec<i64> = batch.attention_mask.into_data().iter::<i64>().collect();
        assert_eq!(mask, vec![1, 1, 1, 1, 1, 1, 0, 0]);
        let labels: Vec<i64> = batch.labels.into_data().iter::<i64>().collect();
        assert_eq!(labels, vec![1, 0]);
    }
}
