// ============================================================
// Layer 5 — BERT Encoder (Burn)
// ============================================================
// Post-norm transformer encoder with the BERT layout, so that
// pretrained bert-base weights map onto it one tensor at a time:
//
//   embeddings = LayerNorm(word + position + token_type)
//   for each layer:
//     x = LayerNorm(x + Dropout(SelfAttention(x, pad_mask)))
//     x = LayerNorm(x + Dropout(W2 · GELU(W1 · x)))
//
// Padding positions are excluded from attention through the
// attention mask (0 = pad).
//
// Reference: Devlin et al. (2019) BERT
//            Burn Book §3 (Building Blocks)

use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::gelu,
};

use crate::ml::encoder::{EncoderConfig, HiddenStates};

#[derive(Module, Debug)]
pub struct BertEmbeddings<B: Backend> {
    pub word_embeddings:       Embedding<B>,
    pub position_embeddings:   Embedding<B>,
    pub token_type_embeddings: Embedding<B>,
    pub layer_norm:            LayerNorm<B>,
    pub dropout:               Dropout,
}

impl<B: Backend> BertEmbeddings<B> {
    pub fn new(cfg: &EncoderConfig, device: &B::Device) -> Self {
        Self {
            word_embeddings: EmbeddingConfig::new(cfg.vocab_size, cfg.hidden_size)
                .init(device),
            position_embeddings: EmbeddingConfig::new(cfg.max_position_embeddings, cfg.hidden_size)
                .init(device),
            token_type_embeddings: EmbeddingConfig::new(cfg.type_vocab_size.max(1), cfg.hidden_size)
                .init(device),
            layer_norm: LayerNormConfig::new(cfg.hidden_size)
                .with_epsilon(cfg.layer_norm_eps)
                .init(device),
            dropout: DropoutConfig::new(cfg.hidden_dropout_prob).init(),
        }
    }

    pub fn forward(&self, input_ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let [batch_size, seq_len] = input_ids.dims();
        let device = input_ids.device();

        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &device)
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);
        // Single-segment input: every token has type 0
        let token_types = Tensor::<B, 2, Int>::zeros([batch_size, seq_len], &device);

        let x = self.word_embeddings.forward(input_ids)
            + self.position_embeddings.forward(positions)
            + self.token_type_embeddings.forward(token_types);
        self.dropout.forward(self.layer_norm.forward(x))
    }
}

#[derive(Module, Debug)]
pub struct BertLayer<B: Backend> {
    pub attention:      MultiHeadAttention<B>,
    pub attention_norm: LayerNorm<B>,
    pub intermediate:   Linear<B>,
    pub output:         Linear<B>,
    pub output_norm:    LayerNorm<B>,
    pub dropout:        Dropout,
}

impl<B: Backend> BertLayer<B> {
    pub fn new(cfg: &EncoderConfig, device: &B::Device) -> Self {
        Self {
            attention: MultiHeadAttentionConfig::new(cfg.hidden_size, cfg.num_attention_heads)
                .with_dropout(cfg.attention_probs_dropout_prob)
                .init(device),
            attention_norm: LayerNormConfig::new(cfg.hidden_size)
                .with_epsilon(cfg.layer_norm_eps)
                .init(device),
            intermediate: LinearConfig::new(cfg.hidden_size, cfg.intermediate_size).init(device),
            output:       LinearConfig::new(cfg.intermediate_size, cfg.hidden_size).init(device),
            output_norm: LayerNormConfig::new(cfg.hidden_size)
                .with_epsilon(cfg.layer_norm_eps)
                .init(device),
            dropout: DropoutConfig::new(cfg.hidden_dropout_prob).init(),
        }
    }

    /// mask_pad: [batch, seq], true where the token is padding
    pub fn forward(&self, x: Tensor<B, 3>, mask_pad: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let attn = self.attention
            .forward(MhaInput::self_attn(x.clone()).mask_pad(mask_pad))
            .context;
        let x = self.attention_norm.forward(x + self.dropout.forward(attn));

        let ffn = self.output.forward(gelu(self.intermediate.forward(x.clone())));
        self.output_norm.forward(x + self.dropout.forward(ffn))
    }
}

#[derive(Module, Debug)]
pub struct BertEncoder<B: Backend> {
    pub embeddings:  BertEmbeddings<B>,
    pub layers:      Vec<BertLayer<B>>,
    pub hidden_size: usize,
}

impl<B: Backend> BertEncoder<B> {
    pub fn new(cfg: &EncoderConfig, device: &B::Device) -> Self {
        Self {
            embeddings: BertEmbeddings::new(cfg, device),
            layers: (0..cfg.num_hidden_layers)
                .map(|_| BertLayer::new(cfg, device))
                .collect(),
            hidden_size: cfg.hidden_size,
        }
    }

    pub fn forward(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
    ) -> HiddenStates<B> {
        let mask_pad = attention_mask.equal_elem(0);

        let embeddings = self.embeddings.forward(input_ids);
        let mut layers = Vec::with_capacity(self.layers.len());
        let mut x = embeddings.clone();
        for layer in &self.layers {
            x = layer.forward(x, mask_pad.clone());
            layers.push(x.clone());
        }

        HiddenStates { embeddings, layers }
    }
}

/// Hugging Face BERT parameter names → BertEncoder field paths,
/// applied in order to every key of a PyTorch checkpoint.
pub fn hf_key_remaps() -> Vec<(&'static str, &'static str)> {
    vec![
        (r"^(bert|model)\.", ""),
        // Old checkpoints store LayerNorm parameters as gamma/beta
        (r"LayerNorm\.gamma$", "LayerNorm.weight"),
        (r"LayerNorm\.beta$", "LayerNorm.bias"),
        (r"^embeddings\.LayerNorm\.", "embeddings.layer_norm."),
        (r"^encoder\.layer\.([0-9]+)\.attention\.self\.(query|key|value)\.", "layers.$1.attention.$2."),
        (r"^encoder\.layer\.([0-9]+)\.attention\.output\.dense\.", "layers.$1.attention.output."),
        (r"^encoder\.layer\.([0-9]+)\.attention\.output\.LayerNorm\.", "layers.$1.attention_norm."),
        (r"^encoder\.layer\.([0-9]+)\.intermediate\.dense\.", "layers.$1.intermediate."),
        (r"^encoder\.layer\.([0-9]+)\.output\.dense\.", "layers.$1.output."),
        (r"^encoder\.layer\.([0-9]+)\.output\.LayerNorm\.", "layers.$1.output_norm."),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use regex::Regex;
    use crate::ml::test_utils::tiny_config;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_returns_every_hidden_state() {
        let device = Default::default();
        let encoder = BertEncoder::<TestBackend>::new(&tiny_config(), &device);

        let ids  = Tensor::<TestBackend, 2, Int>::from_ints([[101, 5, 6, 102], [101, 7, 102, 0]], &device);
        let mask = Tensor::<TestBackend, 2, Int>::from_ints([[1, 1, 1, 1], [1, 1, 1, 0]], &device);
        let states = encoder.forward(ids, mask);

        assert_eq!(states.layers.len(), 2);
        assert_eq!(states.embeddings.dims(), [2, 4, 16]);
        assert_eq!(states.last().dims(), [2, 4, 16]);
    }

    fn remap(key: &str) -> String {
        hf_key_remaps().iter().fold(key.to_string(), |k, (from, to)| {
            Regex::new(from).unwrap().replace_all(&k, *to).to_string()
        })
    }

    #[test]
    fn test_hf_keys_map_onto_fields() {
        assert_eq!(
            remap("bert.encoder.layer.3.attention.self.query.weight"),
            "layers.3.attention.query.weight"
        );
        assert_eq!(
            remap("bert.encoder.layer.11.attention.output.LayerNorm.gamma"),
            "layers.11.attention_norm.weight"
        );
        assert_eq!(remap("embeddings.LayerNorm.beta"), "embeddings.layer_norm.bias");
        assert_eq!(
            remap("encoder.layer.0.output.dense.bias"),
            "layers.0.output.bias"
        );
        assert_eq!(
            remap("bert.embeddings.word_embeddings.weight"),
            "embeddings.word_embeddings.weight"
        );
    }
}
