// ============================================================
// Layer 5 — Evaluation
// ============================================================
// Runs a trained head over a split without gradients and
// scores it:
//
//   prediction_i = argmax_c logits[i, c]
//   accuracy     = #(prediction_i == label_i) / N
//
// The loss is the label-smoothed cross-entropy, averaged over
// examples (each batch weighted by its size).

use std::sync::Arc;

use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    prelude::*,
};

use crate::data::{
    batcher::{ClassificationBatch, ClassificationBatcher},
    dataset::NodeTextDataset,
};
use crate::ml::classifier::TextClassifier;

#[derive(Debug, Clone)]
pub struct Evaluation {
    /// NaN when the split is empty
    pub loss:        f64,
    /// 0.0 when the split is empty
    pub accuracy:    f64,
    pub predictions: Vec<usize>,
    pub correct:     usize,
    pub total:       usize,
}

/// Sequential loader for scoring; example order is preserved so
/// `Evaluation::predictions` lines up with the dataset.
pub fn eval_loader<B: Backend>(
    dataset:    NodeTextDataset,
    batch_size: usize,
    device:     &B::Device,
) -> Arc<dyn DataLoader<ClassificationBatch<B>>> {
    DataLoaderBuilder::new(ClassificationBatcher::<B>::new(device.clone()))
        .batch_size(batch_size)
        .build(dataset)
}

pub fn evaluate<B: Backend>(
    model:  &TextClassifier<B>,
    loader: &dyn DataLoader<ClassificationBatch<B>>,
) -> Evaluation {
    let mut loss_sum    = 0.0f64;
    let mut correct     = 0usize;
    let mut predictions = Vec::new();

    for batch in loader.iter() {
        let [batch_size] = batch.labels.dims();
        let (loss, logits) = model.forward_loss(
            batch.input_ids,
            batch.attention_mask,
            batch.labels.clone(),
        );
        loss_sum += loss.into_scalar().elem::<f64>() * batch_size as f64;

        // argmax(1) returns [batch, 1]
        let predicted = logits.argmax(1).flatten::<1>(0, 1);
        let hits: i64 = predicted
            .clone()
            .equal(batch.labels)
            .int()
            .sum()
            .into_scalar()
            .elem();
        correct += hits as usize;

        predictions.extend(
            predicted.into_data().iter::<i64>().map(|p| p as usize),
        );
    }

    let total = predictions.len();
    if total == 0 {
        tracing::warn!("Evaluating on an empty split; accuracy reported as 0");
        return Evaluation { loss: f64::NAN, accuracy: 0.0, predictions, correct: 0, total: 0 };
    }

    Evaluation {
        loss: loss_sum / total as f64,
        accuracy: correct as f64 / total as f64,
        predictions,
        correct,
        total,
    }
}
