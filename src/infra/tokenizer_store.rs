// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Builds `tokenizers::Tokenizer` instances from the files a
// Hugging Face repository ships:
//
//   tokenizer.json          → loaded as-is
//   vocab.json + merges.txt → byte-level BPE (GPT-2 style, as
//                             used by DeBERTa v1) assembled into
//                             tokenizer JSON with a
//                             "[CLS] $A [SEP]" template
//   vocab.txt               → BERT WordPiece, same template
//
// Tests can also build a word-level tokenizer straight from a
// corpus, with BERT-style special token ids. Both paths write
// the HuggingFace tokenizer JSON format and load it back, which
// keeps us clear of the builder API differences between
// tokenizers releases.
//
// Reference: Sennrich et al. (2016) BPE paper

use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use std::{collections::HashMap, fs, path::Path};
use tokenizers::Tokenizer;

use crate::data::encoding::{CLS_TOKEN, PAD_TOKEN};

const SEP_TOKEN:  &str = "[SEP]";
const UNK_TOKEN:  &str = "[UNK]";
const MASK_TOKEN: &str = "[MASK]";

/// Load a complete `tokenizer.json`.
pub fn load_tokenizer_json(path: &Path) -> Result<Tokenizer> {
    Tokenizer::from_file(path)
        .map_err(|e| anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e))
}

/// Assemble a byte-level BPE tokenizer from `vocab.json` + `merges.txt`.
pub fn load_bpe_files(vocab_path: &Path, merges_path: &Path) -> Result<Tokenizer> {
    let vocab_raw = fs::read_to_string(vocab_path)
        .with_context(|| format!("Cannot read '{}'", vocab_path.display()))?;
    let vocab: HashMap<String, u32> = serde_json::from_str(&vocab_raw)
        .with_context(|| format!("Malformed vocabulary '{}'", vocab_path.display()))?;

    let merges_raw = fs::read_to_string(merges_path)
        .with_context(|| format!("Cannot read '{}'", merges_path.display()))?;
    let merges: Vec<&str> = merges_raw
        .lines()
        .filter(|l| !l.starts_with("#version") && !l.trim().is_empty())
        .collect();

    let special_id = |token: &str| {
        vocab
            .get(token)
            .copied()
            .ok_or_else(|| anyhow!("vocabulary has no {token} token"))
    };
    let cls = special_id(CLS_TOKEN)?;
    let sep = special_id(SEP_TOKEN)?;
    let added: Vec<(u32, &str)> = [PAD_TOKEN, CLS_TOKEN, SEP_TOKEN, UNK_TOKEN, MASK_TOKEN]
        .into_iter()
        .filter_map(|t| vocab.get(t).map(|&id| (id, t)))
        .collect();

    let byte_level = json!({
        "type": "ByteLevel",
        "add_prefix_space": false,
        "trim_offsets": true,
        "use_regex": true
    });
    let tokenizer_json = json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": added_tokens_json(&added),
        "normalizer": null,
        "pre_tokenizer": byte_level,
        "post_processor": cls_sep_template(cls, sep),
        "decoder": byte_level,
        "model": {
            "type": "BPE",
            "dropout": null,
            "unk_token": UNK_TOKEN,
            "continuing_subword_prefix": null,
            "end_of_word_suffix": null,
            "fuse_unk": false,
            "byte_fallback": false,
            "vocab": vocab,
            "merges": merges
        }
    });

    tracing::debug!("Assembled BPE tokenizer with {} merges", merges.len());
    from_json(&tokenizer_json)
}

/// Assemble a BERT WordPiece tokenizer from `vocab.txt`
/// (one token per line, id = line number).
pub fn load_wordpiece_vocab(vocab_path: &Path, lowercase: bool) -> Result<Tokenizer> {
    let raw = fs::read_to_string(vocab_path)
        .with_context(|| format!("Cannot read '{}'", vocab_path.display()))?;
    let vocab: HashMap<&str, u32> = raw
        .lines()
        .enumerate()
        .map(|(id, token)| (token.trim_end(), id as u32))
        .filter(|(token, _)| !token.is_empty())
        .collect();

    let special_id = |token: &str| {
        vocab
            .get(token)
            .copied()
            .ok_or_else(|| anyhow!("vocabulary has no {token} token"))
    };
    let cls = special_id(CLS_TOKEN)?;
    let sep = special_id(SEP_TOKEN)?;
    let added: Vec<(u32, &str)> = [PAD_TOKEN, UNK_TOKEN, CLS_TOKEN, SEP_TOKEN, MASK_TOKEN]
        .into_iter()
        .filter_map(|t| vocab.get(t).map(|&id| (id, t)))
        .collect();

    let tokenizer_json = json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": added_tokens_json(&added),
        "normalizer": {
            "type": "BertNormalizer",
            "clean_text": true,
            "handle_chinese_chars": true,
            "strip_accents": null,
            "lowercase": lowercase
        },
        "pre_tokenizer": { "type": "BertPreTokenizer" },
        "post_processor": cls_sep_template(cls, sep),
        "decoder": { "type": "WordPiece", "prefix": "##", "cleanup": true },
        "model": {
            "type": "WordPiece",
            "unk_token": UNK_TOKEN,
            "continuing_subword_prefix": "##",
            "max_input_chars_per_word": 100,
            "vocab": vocab
        }
    });

    tracing::debug!("Assembled WordPiece tokenizer with {} entries", vocab_len(&tokenizer_json));
    from_json(&tokenizer_json)
}

/// Build a word-level tokenizer over `texts`, keeping the
/// `vocab_size - 5` most frequent lowercase words.
///
/// Special tokens use the BERT ids: [PAD]=0, [UNK]=1, [CLS]=101,
/// [SEP]=102, [MASK]=103. Encodings are wrapped as
/// `[CLS] words.. [SEP]`.
#[cfg(test)]
pub fn word_level_tokenizer(texts: &[String], vocab_size: usize) -> Result<Tokenizer> {
    let mut freq: HashMap<String, usize> = HashMap::new();
    for text in texts {
        for word in text.split_whitespace() {
            let w = word.to_lowercase();
            let w = w.trim_matches(|c: char| !c.is_alphanumeric());
            if !w.is_empty() {
                *freq.entry(w.to_string()).or_insert(0) += 1;
            }
        }
    }

    // Frequency descending, ties alphabetical so ids are stable
    let mut words: Vec<(String, usize)> = freq.into_iter().collect();
    words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    words.truncate(vocab_size.saturating_sub(5));

    let specials: [(u32, &str); 5] = [
        (0, PAD_TOKEN), (1, UNK_TOKEN), (101, CLS_TOKEN), (102, SEP_TOKEN), (103, MASK_TOKEN),
    ];
    let mut vocab: serde_json::Map<String, Value> = specials
        .iter()
        .map(|&(id, t)| (t.to_string(), json!(id)))
        .collect();

    // Ids 2..=100 stay free as in the BERT vocabulary
    let mut next_id = 104u32;
    for (word, _) in &words {
        if !vocab.contains_key(word) {
            vocab.insert(word.clone(), json!(next_id));
            next_id += 1;
        }
    }

    let tokenizer_json = json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": added_tokens_json(&specials),
        "normalizer": {
            "type": "BertNormalizer",
            "clean_text": true,
            "handle_chinese_chars": true,
            "strip_accents": null,
            "lowercase": true
        },
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": cls_sep_template(101, 102),
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": vocab,
            "unk_token": UNK_TOKEN
        }
    });

    tracing::debug!("Word-level tokenizer with {} entries", vocab_len(&tokenizer_json));
    from_json(&tokenizer_json)
}

fn added_tokens_json(tokens: &[(u32, &str)]) -> Value {
    Value::Array(
        tokens
            .iter()
            .map(|&(id, content)| json!({
                "id": id,
                "content": content,
                "single_word": false,
                "lstrip": false,
                "rstrip": false,
                "normalized": false,
                "special": true
            }))
            .collect(),
    )
}

/// `[CLS] $A [SEP]` for single sequences, `[CLS] $A [SEP] $B [SEP]` for pairs.
fn cls_sep_template(cls: u32, sep: u32) -> Value {
    json!({
        "type": "TemplateProcessing",
        "single": [
            { "SpecialToken": { "id": CLS_TOKEN, "type_id": 0 } },
            { "Sequence":     { "id": "A",       "type_id": 0 } },
            { "SpecialToken": { "id": SEP_TOKEN, "type_id": 0 } }
        ],
        "pair": [
            { "SpecialToken": { "id": CLS_TOKEN, "type_id": 0 } },
            { "Sequence":     { "id": "A",       "type_id": 0 } },
            { "SpecialToken": { "id": SEP_TOKEN, "type_id": 0 } },
            { "Sequence":     { "id": "B",       "type_id": 1 } },
            { "SpecialToken": { "id": SEP_TOKEN, "type_id": 1 } }
        ],
        "special_tokens": {
            CLS_TOKEN: { "id": CLS_TOKEN, "ids": [cls], "tokens": [CLS_TOKEN] },
            SEP_TOKEN: { "id": SEP_TOKEN, "ids": [sep], "tokens": [SEP_TOKEN] }
        }
    })
}

fn vocab_len(tokenizer_json: &Value) -> usize {
    tokenizer_json["model"]["vocab"].as_object().map_or(0, |m| m.len())
}

fn from_json(tokenizer_json: &Value) -> Result<Tokenizer> {
    let bytes = serde_json::to_vec(tokenizer_json)?;
    Tokenizer::from_bytes(bytes).map_err(|e| anyhow!("Cannot build tokenizer: {e}"))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_level_wraps_with_cls_and_sep() {
        let texts = vec!["Neural networks learn".to_string(), "networks".to_string()];
        let tok = word_level_tokenizer(&texts, 50).unwrap();
        let enc = tok.encode("networks learn", true).unwrap();
        let ids = enc.get_ids();
        assert_eq!(ids.first(), Some(&101));
        assert_eq!(ids.last(), Some(&102));
        // "networks" is the most frequent word → first free id
        assert_eq!(ids[1], 104);
    }

    #[test]
    fn test_unknown_word_maps_to_unk() {
        let tok = word_level_tokenizer(&["alpha beta".to_string()], 50).unwrap();
        let enc = tok.encode("gamma", true).unwrap();
        assert_eq!(enc.get_ids(), &[101, 1, 102]);
    }

    #[test]
    fn test_vocab_size_caps_words() {
        let texts = vec!["a b c d e f g h".to_string()];
        let tok = word_level_tokenizer(&texts, 8).unwrap();
        // 5 specials + 3 words
        assert_eq!(tok.get_vocab_size(false), 8);
    }

    #[test]
    fn test_bpe_files_round_trip() {
        let dir = std::env::temp_dir().join(format!("bpe_store_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let vocab = json!({
            "[PAD]": 0, "[CLS]": 1, "[SEP]": 2, "[UNK]": 3,
            "h": 4, "i": 5, "hi": 6
        });
        fs::write(dir.join("vocab.json"), vocab.to_string()).unwrap();
        fs::write(dir.join("merges.txt"), "#version: 0.2\nh i\n").unwrap();

        let tok = load_bpe_files(&dir.join("vocab.json"), &dir.join("merges.txt")).unwrap();
        let enc = tok.encode("hi", true).unwrap();
        assert_eq!(enc.get_ids(), &[1, 6, 2]);
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_wordpiece_vocab_splits_subwords() {
        let dir = std::env::temp_dir().join(format!("wordpiece_store_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("vocab.txt"), "[PAD]\n[UNK]\n[CLS]\n[SEP]\nhello\n##s\n").unwrap();

        let tok = load_wordpiece_vocab(&dir.join("vocab.txt"), true).unwrap();
        let enc = tok.encode("Hellos", true).unwrap();
        assert_eq!(enc.get_ids(), &[2, 4, 5, 3]);
        fs::remove_dir_all(dir).ok();
    }
}
