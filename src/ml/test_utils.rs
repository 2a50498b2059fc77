//! Tiny encoder shapes shared by the model tests.

use crate::ml::encoder::EncoderConfig;

pub fn tiny_config() -> EncoderConfig {
    EncoderConfig {
        vocab_size:              200,
        hidden_size:             16,
        num_hidden_layers:       2,
        num_attention_heads:     2,
        intermediate_size:       32,
        max_position_embeddings: 64,
        ..EncoderConfig::default()
    }
}

/// `tiny_config` with DeBERTa v1 relative attention (c2p + p2c).
pub fn tiny_deberta() -> EncoderConfig {
    EncoderConfig {
        relative_attention:     true,
        max_relative_positions: 8,
        position_biased_input:  false,
        pos_att_type:           vec!["c2p".into(), "p2c".into()],
        type_vocab_size:        0,
        ..tiny_config()
    }
}
