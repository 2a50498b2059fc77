// ============================================================
// Layer 4 — Split Encoding
// ============================================================
// Tokenizes the texts of one split into fixed-shape rows:
//
//   texts  ──tokenizer──▶  input_ids      [n, L]
//                          attention_mask [n, L]   (1 = token, 0 = pad)
//                          labels         [n]
//
// L is the longest tokenized text of the split, capped at
// `max_seq_len` by truncation. Every row starts with the
// tokenizer's classification token; the classifier pools that
// position, so encoding fails if any row does not.
//
// Reference: tokenizers crate (TruncationParams, PaddingParams)

use anyhow::{anyhow, bail, Result};
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

pub const CLS_TOKEN: &str = "[CLS]";
pub const PAD_TOKEN: &str = "[PAD]";

/// Token ids, masks and labels for every example of one split.
#[derive(Debug, Clone, Default)]
pub struct EncodedSplit {
    pub input_ids:      Vec<Vec<u32>>,
    pub attention_mask: Vec<Vec<u32>>,
    pub labels:         Vec<usize>,
}

impl EncodedSplit {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Padded sequence length shared by every row (0 when empty).
    pub fn seq_len(&self) -> usize {
        self.input_ids.first().map_or(0, Vec::len)
    }
}

/// A tokenizer configured for truncation + pad-to-longest.
pub struct TextEncoder {
    tokenizer: Tokenizer,
    cls_id:    u32,
}

impl TextEncoder {
    pub fn new(mut tokenizer: Tokenizer, max_seq_len: usize) -> Result<Self> {
        let cls_id = tokenizer
            .token_to_id(CLS_TOKEN)
            .ok_or_else(|| anyhow!("tokenizer has no {CLS_TOKEN} token"))?;
        let pad_id = tokenizer.token_to_id(PAD_TOKEN).unwrap_or(0);

        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_seq_len,
                ..Default::default()
            }))
            .map_err(|e| anyhow!("Cannot configure truncation: {e}"))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy:  PaddingStrategy::BatchLongest,
            pad_id,
            pad_token: PAD_TOKEN.to_string(),
            ..Default::default()
        }));

        Ok(Self { tokenizer, cls_id })
    }

    /// Tokenize `texts` and pair each row with its label.
    pub fn encode(&self, texts: &[String], labels: &[usize]) -> Result<EncodedSplit> {
        if texts.len() != labels.len() {
            bail!("{} texts but {} labels", texts.len(), labels.len());
        }
        if texts.is_empty() {
            return Ok(EncodedSplit::default());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow!("Tokenisation error: {e}"))?;

        let mut input_ids      = Vec::with_capacity(encodings.len());
        let mut attention_mask = Vec::with_capacity(encodings.len());
        for (row, enc) in encodings.iter().enumerate() {
            let ids = enc.get_ids();
            if ids.first() != Some(&self.cls_id) {
                bail!(
                    "row {row} does not start with {CLS_TOKEN} (id {}); \
                     pooling at position 0 would be meaningless",
                    self.cls_id
                );
            }
            input_ids.push(ids.to_vec());
            attention_mask.push(enc.get_attention_mask().to_vec());
        }

        let split = EncodedSplit { input_ids, attention_mask, labels: labels.to_vec() };
        tracing::debug!("Encoded {} texts to length {}", split.len(), split.seq_len());
        Ok(split)
    }
}
