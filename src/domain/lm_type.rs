// ============================================================
// Layer 3 — Language Model Selection
// ============================================================
// The experiment supports exactly three pretrained encoders.
// Each logical name maps to a Hugging Face repository id and
// to the encoder architecture that can hold its weights.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Encoder architectures implemented in `ml::encoder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Architecture {
    Bert,
    Deberta,
}

/// The supported pretrained language models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LmType {
    SentenceBert,
    Deberta,
    Bert,
}

impl LmType {
    pub const ALL: [LmType; 3] = [LmType::SentenceBert, LmType::Deberta, LmType::Bert];

    /// Hugging Face Hub repository holding config, tokenizer and weights.
    pub fn hub_id(self) -> &'static str {
        match self {
            LmType::SentenceBert => "sentence-transformers/bert-base-nli-mean-tokens",
            LmType::Deberta      => "microsoft/deberta-base",
            LmType::Bert         => "bert-base-uncased",
        }
    }

    pub fn architecture(self) -> Architecture {
        match self {
            LmType::SentenceBert | LmType::Bert => Architecture::Bert,
            LmType::Deberta                     => Architecture::Deberta,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LmType::SentenceBert => "sentencebert",
            LmType::Deberta      => "deberta",
            LmType::Bert         => "bert",
        }
    }
}

impl fmt::Display for LmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LmType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LmType::ALL
            .into_iter()
            .find(|lm| lm.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!(
                "unknown lm type '{s}', expected one of: sentencebert, deberta, bert"
            ))
    }
}
