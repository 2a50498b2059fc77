// ============================================================
// Layer 5 — Text Classifier Head
// ============================================================
// A thin head over a pretrained encoder:
//
//   hidden  = encoder(ids, mask).last()       [batch, seq, hidden]
//   pooled  = Dropout(hidden)[:, 0, :]        [CLS] position
//   pooled  = FeatShrink(pooled)              optional projection
//   logits  = Classifier(pooled)              [batch, classes]
//   loss    = CE(logits, labels, ε = 0.3)     only when labels given
//
// Label smoothing replaces the one-hot target with
//   (1 - ε)·onehot + ε / C
// which keeps the head from becoming over-confident on a small
// training split.

use burn::{
    nn::{
        loss::{CrossEntropyLoss, CrossEntropyLossConfig},
        Dropout, DropoutConfig,
        Linear, LinearConfig,
    },
    prelude::*,
};

use crate::ml::encoder::Encoder;

#[derive(Config, Debug)]
pub struct TextClassifierConfig {
    pub num_classes: usize,
    #[config(default = 0.0)]
    pub dropout: f64,
    /// Width of an extra projection between the pooled vector and the
    /// classifier; absent means no projection.
    pub feat_shrink: Option<usize>,
    #[config(default = true)]
    pub cla_bias: bool,
    #[config(default = 0.3)]
    pub label_smoothing: f32,
}

impl TextClassifierConfig {
    pub fn init<B: Backend>(&self, encoder: Encoder<B>, device: &B::Device) -> TextClassifier<B> {
        let hidden = encoder.hidden_size();
        let feat_shrink = self.feat_shrink.map(|width| {
            LinearConfig::new(hidden, width)
                .with_bias(self.cla_bias)
                .init(device)
        });
        let classifier_in = self.feat_shrink.unwrap_or(hidden);

        TextClassifier {
            encoder,
            dropout: DropoutConfig::new(self.dropout).init(),
            feat_shrink,
            classifier: LinearConfig::new(classifier_in, self.num_classes)
                .with_bias(self.cla_bias)
                .init(device),
            loss: CrossEntropyLossConfig::new()
                .with_smoothing(Some(self.label_smoothing))
                .init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct TextClassifier<B: Backend> {
    pub encoder:     Encoder<B>,
    pub dropout:     Dropout,
    pub feat_shrink: Option<Linear<B>>,
    pub classifier:  Linear<B>,
    pub loss:        CrossEntropyLoss<B>,
}

/// Head output. `loss` is present only when labels were supplied.
#[derive(Debug, Clone)]
pub struct ClassifierOutput<B: Backend> {
    pub loss:   Option<Tensor<B, 1>>,
    pub logits: Tensor<B, 2>,
}

impl<B: Backend> TextClassifier<B> {
    /// input_ids, attention_mask: [batch, seq]; labels: [batch]
    pub fn forward(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
        labels:         Option<Tensor<B, 1, Int>>,
    ) -> ClassifierOutput<B> {
        let logits = self.logits(input_ids, attention_mask);
        let loss = labels.map(|labels| self.loss.forward(logits.clone(), labels));
        ClassifierOutput { loss, logits }
    }

    /// Training-step form of `forward`: labels are required.
    pub fn forward_loss(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
        labels:         Tensor<B, 1, Int>,
    ) -> (Tensor<B, 1>, Tensor<B, 2>) {
        let logits = self.logits(input_ids, attention_mask);
        (self.loss.forward(logits.clone(), labels), logits)
    }

    fn logits(&self, input_ids: Tensor<B, 2, Int>, attention_mask: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        let [batch_size, seq_len] = input_ids.dims();
        assert!(seq_len > 0, "classifier input must contain at least the [CLS] token");

        let hidden = self.encoder.forward(input_ids, attention_mask).last();
        let hidden = self.dropout.forward(hidden);

        let [_, _, width] = hidden.dims();
        let pooled = hidden
            .slice([0..batch_size, 0..1, 0..width])
            .reshape([batch_size, width]);

        let pooled = match &self.feat_shrink {
            Some(layer) => layer.forward(pooled),
            None        => pooled,
        };
        self.classifier.forward(pooled)
    }
}

/// Average of the token vectors that the mask marks as real.
/// Rows with no real tokens come out as zeros.
#[allow(dead_code)] // the classification head pools [CLS]
pub fn mean_pooling<B: Backend>(
    hidden:         Tensor<B, 3>,
    attention_mask: Tensor<B, 2, Int>,
) -> Tensor<B, 2> {
    let [batch_size, seq_len, width] = hidden.dims();
    let mask = attention_mask
        .float()
        .reshape([batch_size, seq_len, 1])
        .expand([batch_size, seq_len, width]);

    let summed = (hidden * mask.clone()).sum_dim(1).reshape([batch_size, width]);
    let counts = mask.sum_dim(1).reshape([batch_size, width]).clamp_min(1e-9);
    summed / counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use crate::domain::lm_type::Architecture;
    use crate::ml::test_utils::tiny_config;

    type TestBackend = NdArray<f32>;

    fn tiny_classifier(cfg: &TextClassifierConfig) -> TextClassifier<TestBackend> {
        let device = Default::default();
        let encoder = tiny_config().init::<TestBackend>(Architecture::Bert, &device);
        cfg.init(encoder, &device)
    }

    fn batch(seq_len: usize) -> (Tensor<TestBackend, 2, Int>, Tensor<TestBackend, 2, Int>) {
        let device = Default::default();
        let ids: Vec<i32> = (0..3 * seq_len)
            .map(|i| if i % seq_len == 0 { 101 } else { (i % 50) as i32 + 1 })
            .collect();
        let ids = Tensor::<TestBackend, 1, Int>::from_ints(ids.as_slice(), &device)
            .reshape([3, seq_len]);
        let mask = Tensor::<TestBackend, 2, Int>::ones([3, seq_len], &device);
        (ids, mask)
    }

    #[test]
    fn test_logits_shape_independent_of_seq_len() {
        let model = tiny_classifier(&TextClassifierConfig::new(7));
        for seq_len in [1, 5, 17] {
            let (ids, mask) = batch(seq_len);
            let out = model.forward(ids, mask, None);
            assert_eq!(out.logits.dims(), [3, 7]);
        }
    }

    #[test]
    fn test_no_labels_means_no_loss() {
        let model = tiny_classifier(&TextClassifierConfig::new(3));
        let (ids, mask) = batch(4);
        assert!(model.forward(ids, mask, None).loss.is_none());
    }

    #[test]
    fn test_loss_is_finite_and_non_negative() {
        let model = tiny_classifier(&TextClassifierConfig::new(3));
        let (ids, mask) = batch(6);
        let labels = Tensor::<TestBackend, 1, Int>::from_ints([0, 2, 1], &Default::default());

        let out = model.forward(ids, mask, Some(labels));
        let loss: f32 = out.loss.unwrap().into_scalar().elem();
        assert!(loss.is_finite());
        assert!(loss >= 0.0);
    }

    #[test]
    fn test_feat_shrink_without_bias() {
        let cfg = TextClassifierConfig::new(4)
            .with_feat_shrink(Some(5))
            .with_cla_bias(false);
        let model = tiny_classifier(&cfg);
        assert!(model.classifier.bias.is_none());
        let shrink = model.feat_shrink.as_ref().unwrap();
        assert!(shrink.bias.is_none());

        let (ids, mask) = batch(3);
        assert_eq!(model.forward(ids, mask, None).logits.dims(), [3, 4]);
    }

    #[test]
    fn test_mean_pooling_masks_padding() {
        let device = Default::default();
        let hidden = Tensor::<TestBackend, 3>::from_floats(
            [[[1.0, 2.0], [3.0, 4.0], [100.0, 100.0]]],
            &device,
        );
        let mask = Tensor::<TestBackend, 2, Int>::from_ints([[1, 1, 0]], &device);
        let pooled: Vec<f32> = mean_pooling(hidden, mask).into_data().iter::<f32>().collect();
        assert_eq!(pooled, vec![2.0, 3.0]);
    }

    #[test]
    fn test_mean_pooling_all_zero_mask_is_finite() {
        let device = Default::default();
        let hidden = Tensor::<TestBackend, 3>::ones([2, 3, 4], &device);
        let mask = Tensor::<TestBackend, 2, Int>::from_ints([[0, 0, 0], [1, 0, 0]], &device);
        let pooled: Vec<f32> = mean_pooling(hidden, mask).into_data().iter::<f32>().collect();
        assert!(pooled.iter().all(|v| v.is_finite()));
        assert_eq!(&pooled[..4], &[0.0; 4]);
    }
}
