// ============================================================
// Layer 5 — Pretrained Encoder
// ============================================================
// The language-model encoder the classifier head wraps.
//
//   EncoderConfig  ← parsed from the hub's config.json
//   Encoder<B>     ← Bert | Deberta, both returning every layer's
//                    hidden states for a batch of token ids
//
// Field names of EncoderConfig follow the Hugging Face JSON keys
// so the hub file deserialises straight into it.

use burn::prelude::*;
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::lm_type::Architecture;
use crate::ml::bert::BertEncoder;
use crate::ml::deberta::DebertaEncoder;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub vocab_size:                   usize,
    pub hidden_size:                  usize,
    pub num_hidden_layers:            usize,
    pub num_attention_heads:          usize,
    pub intermediate_size:            usize,
    pub hidden_dropout_prob:          f64,
    pub attention_probs_dropout_prob: f64,
    pub max_position_embeddings:      usize,
    pub type_vocab_size:              usize,
    pub layer_norm_eps:               f64,
    pub pad_token_id:                 usize,

    // DeBERTa only
    pub relative_attention:     bool,
    pub max_relative_positions: i64,
    pub position_biased_input:  bool,
    #[serde(deserialize_with = "deserialize_pos_att_type")]
    pub pos_att_type:           Vec<String>,
}

impl Default for EncoderConfig {
    /// bert-base-uncased
    fn default() -> Self {
        Self {
            vocab_size:                   30522,
            hidden_size:                  768,
            num_hidden_layers:            12,
            num_attention_heads:          12,
            intermediate_size:            3072,
            hidden_dropout_prob:          0.1,
            attention_probs_dropout_prob: 0.1,
            max_position_embeddings:      512,
            type_vocab_size:              2,
            layer_norm_eps:               1e-12,
            pad_token_id:                 0,
            relative_attention:           false,
            max_relative_positions:       -1,
            position_biased_input:        true,
            pos_att_type:                 Vec::new(),
        }
    }
}

/// DeBERTa v1 configs spell `pos_att_type` as `"c2p|p2c"`, v2
/// configs as `["p2c", "c2p"]`; accept both (and null).
fn deserialize_pos_att_type<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Joined(String),
        List(Vec<String>),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Joined(s)) => s
            .split('|')
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect(),
        Some(Raw::List(v)) => v.into_iter().map(|t| t.to_lowercase()).collect(),
        None => Vec::new(),
    })
}

impl EncoderConfig {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }

    /// Relative distance bucket count for DeBERTa (`max_position_embeddings`
    /// when the config leaves it unset).
    pub fn max_relative_positions(&self) -> usize {
        if self.max_relative_positions < 1 {
            self.max_position_embeddings
        } else {
            self.max_relative_positions as usize
        }
    }

    pub fn has_pos_att(&self, kind: &str) -> bool {
        self.pos_att_type.iter().any(|t| t == kind)
    }

    /// Randomly initialised encoder of the given architecture.
    pub fn init<B: Backend>(&self, arch: Architecture, device: &B::Device) -> Encoder<B> {
        match arch {
            Architecture::Bert    => Encoder::Bert(BertEncoder::new(self, device)),
            Architecture::Deberta => Encoder::Deberta(DebertaEncoder::new(self, device)),
        }
    }
}

/// Hidden states of every layer: the embedding output followed by
/// one tensor per transformer layer, each `[batch, seq, hidden]`.
#[derive(Debug, Clone)]
pub struct HiddenStates<B: Backend> {
    pub embeddings: Tensor<B, 3>,
    pub layers:     Vec<Tensor<B, 3>>,
}

impl<B: Backend> HiddenStates<B> {
    /// Output of the last layer (the embeddings for a 0-layer encoder).
    pub fn last(self) -> Tensor<B, 3> {
        let HiddenStates { embeddings, mut layers } = self;
        layers.pop().unwrap_or(embeddings)
    }
}

#[derive(Module, Debug)]
pub enum Encoder<B: Backend> {
    Bert(BertEncoder<B>),
    Deberta(DebertaEncoder<B>),
}

impl<B: Backend> Encoder<B> {
    pub fn hidden_size(&self) -> usize {
        match self {
            Encoder::Bert(e)    => e.hidden_size,
            Encoder::Deberta(e) => e.hidden_size,
        }
    }

    /// input_ids, attention_mask: [batch, seq] (mask 1 = token, 0 = pad)
    pub fn forward(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
    ) -> HiddenStates<B> {
        match self {
            Encoder::Bert(e)    => e.forward(input_ids, attention_mask),
            Encoder::Deberta(e) => e.forward(input_ids, attention_mask),
        }
    }
}
