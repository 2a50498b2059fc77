// ============================================================
// Layer 5 — DeBERTa Encoder (Burn)
// ============================================================
// DeBERTa v1 (He et al., 2021): BERT-like post-norm layers whose
// self-attention adds disentangled relative-position terms.
//
//   scores = Q·Kᵀ                       content → content
//          + Q·Pkᵀ  gathered at δ(i,j)   content → position (c2p)
//          + K·Pqᵀ  gathered at δ(j,i)   position → content (p2c)
//
// where δ(i,j) = clamp(i - j + span, 0, 2·span - 1) indexes the
// relative embedding table and the whole sum is scaled by
// 1/sqrt(head_dim · (1 + #terms)).
//
// Q, K and V come from a single bias-free projection laid out
// per head as [q | k | v], with separate learned q/v biases.
//
// Reference: He, Liu, Gao, Chen (2021) DeBERTa
//            Burn Book §3 (Building Blocks)

use burn::{
    module::Param,
    nn::{
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::{activation::{gelu, softmax}, Distribution},
};

use crate::ml::encoder::{EncoderConfig, HiddenStates};

/// Added to masked attention scores before the softmax.
const MASK_FILL: f32 = -1.0e4;

/// Relative bucket indices for self-attention over `len` tokens:
/// `out[i * len + j] = clamp(i - j + span, 0, 2 * span - 1)`.
///
/// The position → content term uses the transpose, which is the
/// same as calling this with `-(i - j)`; pass `negate = true`.
pub fn relative_position_buckets(len: usize, span: usize, negate: bool) -> Vec<i32> {
    let span = span as i64;
    let upper = (2 * span - 1).max(0);
    let mut out = Vec::with_capacity(len * len);
    for i in 0..len as i64 {
        for j in 0..len as i64 {
            let rel = if negate { j - i } else { i - j };
            out.push((rel + span).clamp(0, upper) as i32);
        }
    }
    out
}

#[derive(Module, Debug)]
pub struct DebertaEmbeddings<B: Backend> {
    pub word_embeddings:     Embedding<B>,
    pub position_embeddings: Option<Embedding<B>>,
    pub layer_norm:          LayerNorm<B>,
    pub dropout:             Dropout,
}

impl<B: Backend> DebertaEmbeddings<B> {
    pub fn new(cfg: &EncoderConfig, device: &B::Device) -> Self {
        let position_embeddings = cfg.position_biased_input.then(|| {
            EmbeddingConfig::new(cfg.max_position_embeddings, cfg.hidden_size).init(device)
        });
        Self {
            word_embeddings: EmbeddingConfig::new(cfg.vocab_size, cfg.hidden_size).init(device),
            position_embeddings,
            layer_norm: LayerNormConfig::new(cfg.hidden_size)
                .with_epsilon(cfg.layer_norm_eps)
                .init(device),
            dropout: DropoutConfig::new(cfg.hidden_dropout_prob).init(),
        }
    }

    pub fn forward(&self, input_ids: Tensor<B, 2, Int>, mask: Tensor<B, 2>) -> Tensor<B, 3> {
        let [batch_size, seq_len] = input_ids.dims();
        let device = input_ids.device();

        let mut x = self.word_embeddings.forward(input_ids);
        if let Some(pos) = &self.position_embeddings {
            let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &device)
                .unsqueeze::<2>()
                .expand([batch_size, seq_len]);
            x = x + pos.forward(positions);
        }
        let x = self.layer_norm.forward(x);
        // Zero the padding rows
        let x = x * mask.reshape([batch_size, seq_len, 1]);
        self.dropout.forward(x)
    }
}

#[derive(Module, Debug)]
pub struct DisentangledSelfAttention<B: Backend> {
    pub in_proj:    Linear<B>,
    pub q_bias:     Param<Tensor<B, 1>>,
    pub v_bias:     Param<Tensor<B, 1>>,
    pub pos_proj:   Option<Linear<B>>,
    pub pos_q_proj: Option<Linear<B>>,
    pub dropout:    Dropout,
    pub pos_dropout: Dropout,
    pub n_heads:    usize,
    pub head_dim:   usize,
}

impl<B: Backend> DisentangledSelfAttention<B> {
    pub fn new(cfg: &EncoderConfig, device: &B::Device) -> Self {
        let all_heads = cfg.num_attention_heads * cfg.head_dim();
        let relative = cfg.relative_attention;
        Self {
            in_proj: LinearConfig::new(cfg.hidden_size, all_heads * 3)
                .with_bias(false)
                .init(device),
            q_bias: Param::from_tensor(Tensor::zeros([all_heads], device)),
            v_bias: Param::from_tensor(Tensor::zeros([all_heads], device)),
            pos_proj: (relative && cfg.has_pos_att("c2p")).then(|| {
                LinearConfig::new(cfg.hidden_size, all_heads).with_bias(false).init(device)
            }),
            pos_q_proj: (relative && cfg.has_pos_att("p2c")).then(|| {
                LinearConfig::new(cfg.hidden_size, all_heads).init(device)
            }),
            dropout:     DropoutConfig::new(cfg.attention_probs_dropout_prob).init(),
            pos_dropout: DropoutConfig::new(cfg.hidden_dropout_prob).init(),
            n_heads:     cfg.num_attention_heads,
            head_dim:    cfg.head_dim(),
        }
    }

    /// Number of score terms besides content → content.
    fn num_position_terms(&self) -> usize {
        self.pos_proj.is_some() as usize + self.pos_q_proj.is_some() as usize
    }

    /// [batch, seq, heads * dim] → [batch, heads, seq, dim]
    fn split_heads(&self, x: Tensor<B, 3>) -> Tensor<B, 4> {
        let [batch_size, seq_len, width] = x.dims();
        let per_head = width / self.n_heads;
        x.reshape([batch_size, seq_len, self.n_heads, per_head]).swap_dims(1, 2)
    }

    /// x: [batch, seq, hidden]
    /// pair_mask: [batch, heads, seq, seq], true where attention is disallowed
    /// rel_embeddings: [2 * span, hidden] relative table, already sliced
    pub fn forward(
        &self,
        x:              Tensor<B, 3>,
        pair_mask:      Tensor<B, 4, Bool>,
        rel_embeddings: Option<Tensor<B, 2>>,
    ) -> Tensor<B, 3> {
        let [batch_size, seq_len, _] = x.dims();
        let d = self.head_dim;

        let qkv = self.split_heads(self.in_proj.forward(x)); // [b, h, n, 3d]
        let bias = |p: &Param<Tensor<B, 1>>| {
            p.val().reshape([1, self.n_heads, 1, d])
        };
        let query = qkv.clone().narrow(3, 0, d) + bias(&self.q_bias);
        let key   = qkv.clone().narrow(3, d, d);
        let value = qkv.narrow(3, 2 * d, d) + bias(&self.v_bias);

        let scale_factor = 1 + self.num_position_terms();
        let query = query / ((d * scale_factor) as f64).sqrt();
        let mut scores = query.clone().matmul(key.clone().swap_dims(2, 3));

        if let Some(rel) = rel_embeddings {
            let rel = self.pos_dropout.forward(rel);
            scores = scores + self.position_scores(query, key, rel, scale_factor, batch_size, seq_len);
        }

        let scores = scores.mask_fill(pair_mask.clone(), MASK_FILL);
        let probs = softmax(scores, 3).mask_fill(pair_mask, 0.0);
        let probs = self.dropout.forward(probs);

        probs
            .matmul(value)                                   // [b, h, n, d]
            .swap_dims(1, 2)
            .reshape([batch_size, seq_len, self.n_heads * d])
    }

    fn position_scores(
        &self,
        query:        Tensor<B, 4>,
        key:          Tensor<B, 4>,
        rel:          Tensor<B, 2>,
        scale_factor: usize,
        batch_size:   usize,
        seq_len:      usize,
    ) -> Tensor<B, 4> {
        let device = query.device();
        let [span2, _] = rel.dims();
        let span = span2 / 2;
        let rel = rel.unsqueeze::<3>(); // [1, 2span, hidden]
        let shape = [batch_size, self.n_heads, seq_len, seq_len];

        let buckets = |negate: bool| {
            let idx = relative_position_buckets(seq_len, span, negate);
            Tensor::<B, 1, Int>::from_ints(idx.as_slice(), &device)
                .reshape([1, 1, seq_len, seq_len])
                .expand(shape)
        };

        let mut scores = Tensor::<B, 4>::zeros(shape, &device);

        if let Some(pos_proj) = &self.pos_proj {
            let pos_key = self.split_heads(pos_proj.forward(rel.clone())) // [1, h, 2span, d]
                .expand([batch_size, self.n_heads, span2, self.head_dim]);
            let c2p = query.matmul(pos_key.swap_dims(2, 3));              // [b, h, n, 2span]
            scores = scores + c2p.gather(3, buckets(false));
        }

        if let Some(pos_q_proj) = &self.pos_q_proj {
            let pos_query = self.split_heads(pos_q_proj.forward(rel))
                .expand([batch_size, self.n_heads, span2, self.head_dim]);
            let pos_query = pos_query / ((self.head_dim * scale_factor) as f64).sqrt();
            let p2c = key.matmul(pos_query.swap_dims(2, 3));             // [b, h, n, 2span]
            scores = scores + p2c.gather(3, buckets(true)).swap_dims(2, 3);
        }

        scores
    }
}

#[derive(Module, Debug)]
pub struct DebertaLayer<B: Backend> {
    pub attention:        DisentangledSelfAttention<B>,
    pub attention_output: Linear<B>,
    pub attention_norm:   LayerNorm<B>,
    pub intermediate:     Linear<B>,
    pub output:           Linear<B>,
    pub output_norm:      LayerNorm<B>,
    pub dropout:          Dropout,
}

impl<B: Backend> DebertaLayer<B> {
    pub fn new(cfg: &EncoderConfig, device: &B::Device) -> Self {
        let norm = || {
            LayerNormConfig::new(cfg.hidden_size)
                .with_epsilon(cfg.layer_norm_eps)
                .init(device)
        };
        Self {
            attention:        DisentangledSelfAttention::new(cfg, device),
            attention_output: LinearConfig::new(cfg.hidden_size, cfg.hidden_size).init(device),
            attention_norm:   norm(),
            intermediate:     LinearConfig::new(cfg.hidden_size, cfg.intermediate_size).init(device),
            output:           LinearConfig::new(cfg.intermediate_size, cfg.hidden_size).init(device),
            output_norm:      norm(),
            dropout:          DropoutConfig::new(cfg.hidden_dropout_prob).init(),
        }
    }

    pub fn forward(
        &self,
        x:              Tensor<B, 3>,
        pair_mask:      Tensor<B, 4, Bool>,
        rel_embeddings: Option<Tensor<B, 2>>,
    ) -> Tensor<B, 3> {
        let attn = self.attention.forward(x.clone(), pair_mask, rel_embeddings);
        let attn = self.dropout.forward(self.attention_output.forward(attn));
        let x = self.attention_norm.forward(x + attn);

        let ffn = self.output.forward(gelu(self.intermediate.forward(x.clone())));
        self.output_norm.forward(x + self.dropout.forward(ffn))
    }
}

#[derive(Module, Debug)]
pub struct DebertaEncoder<B: Backend> {
    pub embeddings:     DebertaEmbeddings<B>,
    pub layers:         Vec<DebertaLayer<B>>,
    /// [2 * max_relative_positions, hidden]; absent without relative attention
    pub rel_embeddings: Option<Param<Tensor<B, 2>>>,
    pub hidden_size:    usize,
    pub n_heads:        usize,
    pub max_relative_positions: usize,
}

impl<B: Backend> DebertaEncoder<B> {
    pub fn new(cfg: &EncoderConfig, device: &B::Device) -> Self {
        let max_rel = cfg.max_relative_positions();
        let rel_embeddings = cfg.relative_attention.then(|| {
            Param::from_tensor(Tensor::random(
                [2 * max_rel, cfg.hidden_size],
                Distribution::Normal(0.0, 0.02),
                device,
            ))
        });
        Self {
            embeddings: DebertaEmbeddings::new(cfg, device),
            layers: (0..cfg.num_hidden_layers)
                .map(|_| DebertaLayer::new(cfg, device))
                .collect(),
            rel_embeddings,
            hidden_size: cfg.hidden_size,
            n_heads: cfg.num_attention_heads,
            max_relative_positions: max_rel,
        }
    }

    pub fn forward(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
    ) -> HiddenStates<B> {
        let [batch_size, seq_len] = input_ids.dims();
        let mask = attention_mask.float();

        // Token pair (i, j) may attend only if both are real tokens
        let pair = mask.clone().reshape([batch_size, 1, seq_len, 1])
            * mask.clone().reshape([batch_size, 1, 1, seq_len]);
        let pair_mask = pair
            .equal_elem(0.0)
            .expand([batch_size, self.n_heads, seq_len, seq_len]);

        // Only the central 2·span rows of the table are reachable
        let rel = self.rel_embeddings.as_ref().map(|table| {
            let span = seq_len.min(self.max_relative_positions);
            let mid = self.max_relative_positions;
            table.val().slice([mid - span..mid + span, 0..self.hidden_size])
        });

        let embeddings = self.embeddings.forward(input_ids, mask);
        let mut layers = Vec::with_capacity(self.layers.len());
        let mut x = embeddings.clone();
        for layer in &self.layers {
            x = layer.forward(x, pair_mask.clone(), rel.clone());
            layers.push(x.clone());
        }

        HiddenStates { embeddings, layers }
    }
}

/// Hugging Face DeBERTa parameter names → DebertaEncoder field paths.
pub fn hf_key_remaps() -> Vec<(&'static str, &'static str)> {
    vec![
        (r"^deberta\.", ""),
        (r"^embeddings\.LayerNorm\.", "embeddings.layer_norm."),
        (r"^encoder\.rel_embeddings\.weight$", "rel_embeddings"),
        (r"^encoder\.layer\.([0-9]+)\.attention\.self\.(in_proj|pos_proj|pos_q_proj)\.", "layers.$1.attention.$2."),
        (r"^encoder\.layer\.([0-9]+)\.attention\.self\.(q_bias|v_bias)$", "layers.$1.attention.$2"),
        (r"^encoder\.layer\.([0-9]+)\.attention\.output\.dense\.", "layers.$1.attention_output."),
        (r"^encoder\.layer\.([0-9]+)\.attention\.output\.LayerNorm\.", "layers.$1.attention_norm."),
        (r"^encoder\.layer\.([0-9]+)\.intermediate\.dense\.", "layers.$1.intermediate."),
        (r"^encoder\.layer\.([0-9]+)\.output\.dense\.", "layers.$1.output."),
        (r"^encoder\.layer\.([0-9]+)\.output\.LayerNorm\.", "layers.$1.output_norm."),
    ]
}
