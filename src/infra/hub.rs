// ============================================================
// Layer 6 — Model Hub Loader
// ============================================================
// Fetches a pretrained encoder from the Hugging Face hub and
// turns it into Burn modules:
//
//   config.json        → EncoderConfig
//   tokenizer files    → tokenizers::Tokenizer
//   pytorch_model.bin  → Encoder<B> via burn-import, with the
//                        checkpoint keys remapped onto our
//                        field names
//
// Files land in the hf-hub cache, so only the first trial of an
// experiment touches the network.
//
// Reference: Burn Book §7 (Importing PyTorch Models)

use anyhow::{anyhow, Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, Recorder},
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use hf_hub::api::sync::{Api, ApiBuilder};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tokenizers::Tokenizer;

use crate::domain::lm_type::{Architecture, LmType};
use crate::infra::tokenizer_store::{load_bpe_files, load_tokenizer_json, load_wordpiece_vocab};
use crate::ml::{
    bert::{self, BertEncoder},
    deberta::{self, DebertaEncoder},
    encoder::{Encoder, EncoderConfig},
};

const CONFIG_FILE:  &str = "config.json";
const WEIGHTS_FILE: &str = "pytorch_model.bin";

/// Supplies the tokenizer and a freshly built pretrained encoder
/// for each trial.
pub trait EncoderProvider {
    fn tokenizer(&self) -> Result<Tokenizer>;
    fn encoder<B: Backend>(&self, device: &B::Device) -> Result<Encoder<B>>;
}

pub struct HubProvider {
    lm_type:   LmType,
    config:    EncoderConfig,
    tokenizer: Tokenizer,
    weights:   PathBuf,
}

impl HubProvider {
    /// Download (or find in the cache) everything `lm_type` needs.
    pub fn fetch(lm_type: LmType, cache_dir: Option<&Path>) -> Result<Self> {
        let api = match cache_dir {
            Some(dir) => ApiBuilder::new().with_cache_dir(dir.to_path_buf()).build(),
            None      => Api::new(),
        }
        .context("Cannot initialise the Hugging Face hub client")?;

        let repo = api.model(lm_type.hub_id().to_string());
        tracing::info!("Fetching {} from the hub", lm_type.hub_id());

        let get = |file: &str| {
            repo.get(file)
                .with_context(|| format!("Cannot fetch '{}' from {}", file, lm_type.hub_id()))
        };

        let config_path = get(CONFIG_FILE)?;
        let raw = fs::read_to_string(&config_path)
            .with_context(|| format!("Cannot read '{}'", config_path.display()))?;
        let config = EncoderConfig::from_json(&raw)
            .with_context(|| format!("Malformed encoder config for {}", lm_type))?;
        tracing::debug!(
            "{}: hidden={} layers={} heads={}",
            lm_type, config.hidden_size, config.num_hidden_layers, config.num_attention_heads,
        );

        let tokenizer = tokenizer_from_files(&get)?;
        let weights = get(WEIGHTS_FILE)?;

        Ok(Self { lm_type, config, tokenizer, weights })
    }
}

impl EncoderProvider for HubProvider {
    fn tokenizer(&self) -> Result<Tokenizer> {
        Ok(self.tokenizer.clone())
    }

    fn encoder<B: Backend>(&self, device: &B::Device) -> Result<Encoder<B>> {
        tracing::debug!("Loading {} weights from '{}'", self.lm_type, self.weights.display());
        load_encoder(self.lm_type.architecture(), &self.config, &self.weights, device)
    }
}

/// Pick the richest tokenizer description a repository ships:
/// tokenizer.json, then vocab.json + merges.txt, then vocab.txt.
pub fn tokenizer_from_files<F>(get: F) -> Result<Tokenizer>
where
    F: Fn(&str) -> Result<PathBuf>,
{
    if let Ok(path) = get("tokenizer.json") {
        return load_tokenizer_json(&path);
    }
    if let (Ok(vocab), Ok(merges)) = (get("vocab.json"), get("merges.txt")) {
        tracing::debug!("No tokenizer.json; assembling BPE from vocab.json + merges.txt");
        return load_bpe_files(&vocab, &merges);
    }

    let vocab = get("vocab.txt")
        .context("Repository ships no tokenizer.json, vocab.json + merges.txt or vocab.txt")?;
    let lowercase = get("tokenizer_config.json")
        .ok()
        .and_then(|p| fs::read_to_string(p).ok())
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
        .and_then(|v| v["do_lower_case"].as_bool())
        .unwrap_or(true);
    tracing::debug!("No tokenizer.json; assembling WordPiece from vocab.txt (lowercase={})", lowercase);
    load_wordpiece_vocab(&vocab, lowercase)
}

/// Build an encoder of `arch` and fill it from a PyTorch checkpoint.
pub fn load_encoder<B: Backend>(
    arch:    Architecture,
    config:  &EncoderConfig,
    weights: &Path,
    device:  &B::Device,
) -> Result<Encoder<B>> {
    Ok(match arch {
        Architecture::Bert => {
            let record = load_record::<B, <BertEncoder<B> as Module<B>>::Record>(
                weights, bert::hf_key_remaps(), device,
            )?;
            Encoder::Bert(BertEncoder::new(config, device).load_record(record))
        }
        Architecture::Deberta => {
            let record = load_record::<B, <DebertaEncoder<B> as Module<B>>::Record>(
                weights, deberta::hf_key_remaps(), device,
            )?;
            Encoder::Deberta(DebertaEncoder::new(config, device).load_record(record))
        }
    })
}

fn load_record<B, R>(
    weights: &Path,
    remaps:  Vec<(&'static str, &'static str)>,
    device:  &B::Device,
) -> Result<R>
where
    B: Backend,
    R: burn::record::Record<B>,
{
    let args = remaps
        .into_iter()
        .fold(LoadArgs::new(weights.to_path_buf()), |args, (from, to)| {
            args.with_key_remap(from, to)
        });

    PyTorchFileRecorder::<FullPrecisionSettings>::default()
        .load(args, device)
        .map_err(|e| anyhow!("Cannot load weights from '{}': {:?}", weights.display(), e))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use crate::ml::test_utils::{tiny_config, tiny_deberta};

    type TestBackend = NdArray<f32>;

    /// Checkpoints written by `fixtures/make_checkpoints.py`.
    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures").join(name)
    }

    fn values<const D: usize>(tensor: Tensor<TestBackend, D>) -> Vec<f32> {
        tensor.into_data().iter::<f32>().collect()
    }

    fn assert_close(actual: f32, expected: f32) {
        assert!((actual - expected).abs() < 1e-6, "{actual} != {expected}");
    }

    fn local_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("hub_{}_{}", name, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn getter(dir: &Path) -> impl Fn(&str) -> Result<PathBuf> + '_ {
        move |file| {
            let path = dir.join(file);
            if path.exists() { Ok(path) } else { Err(anyhow!("404 {file}")) }
        }
    }

    #[test]
    fn test_falls_back_to_vocab_txt() {
        let dir = local_dir("wordpiece");
        fs::write(dir.join("vocab.txt"), "[PAD]\n[UNK]\n[CLS]\n[SEP]\ngraph\n").unwrap();
        fs::write(dir.join("tokenizer_config.json"), r#"{"do_lower_case": true}"#).unwrap();

        let tok = tokenizer_from_files(getter(&dir)).unwrap();
        assert_eq!(tok.encode("Graph", true).unwrap().get_ids(), &[2, 4, 3]);
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_prefers_bpe_over_vocab_txt() {
        let dir = local_dir("bpe");
        let vocab = serde_json::json!({ "[PAD]": 0, "[CLS]": 1, "[SEP]": 2, "[UNK]": 3, "a": 4 });
        fs::write(dir.join("vocab.json"), vocab.to_string()).unwrap();
        fs::write(dir.join("merges.txt"), "#version: 0.2\n").unwrap();
        fs::write(dir.join("vocab.txt"), "unused\n").unwrap();

        let tok = tokenizer_from_files(getter(&dir)).unwrap();
        assert_eq!(tok.encode("a", true).unwrap().get_ids(), &[1, 4, 2]);
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_loads_bert_checkpoint() {
        let device = Default::default();
        let encoder = load_encoder::<TestBackend>(
            Architecture::Bert, &tiny_config(), &fixture("tiny_bert.pt"), &device,
        ).unwrap();
        let Encoder::Bert(bert) = &encoder else { panic!("expected a BERT encoder") };

        // Checkpoint stores [out, in] with w[o][i] = (16·o + i) / 1000
        let query = bert.layers[0].attention.query.weight.val();
        assert_eq!(query.dims(), [16, 16]);
        let query = values(query);
        assert_close(query[2 * 16 + 1], 0.018);
        assert_close(query[16 + 2], 0.033);

        // Old-style gamma/beta names
        assert!(values(bert.embeddings.layer_norm.gamma.val()).iter().all(|&v| v == 1.5));
        assert!(values(bert.layers[1].output_norm.beta.val()).iter().all(|&v| v == 0.25));

        let ids  = Tensor::<TestBackend, 2, Int>::from_ints([[101, 5, 6, 102]], &device);
        let mask = Tensor::<TestBackend, 2, Int>::ones([1, 4], &device);
        let last = encoder.forward(ids, mask).last();
        assert_eq!(last.dims(), [1, 4, 16]);
        assert!(values(last).iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_loads_deberta_checkpoint() {
        let device = Default::default();
        let encoder = load_encoder::<TestBackend>(
            Architecture::Deberta, &tiny_deberta(), &fixture("tiny_deberta.pt"), &device,
        ).unwrap();
        let Encoder::Deberta(deberta) = &encoder else { panic!("expected a DeBERTa encoder") };
        assert!(deberta.embeddings.position_embeddings.is_none());

        let attention = &deberta.layers[0].attention;
        let in_proj = attention.in_proj.weight.val();
        assert_eq!(in_proj.dims(), [16, 48]);
        assert_close(values(in_proj)[3 * 48 + 40], 0.643);
        assert!(attention.in_proj.bias.is_none());

        let pos_q_bias = attention.pos_q_proj.as_ref().and_then(|l| l.bias.as_ref()).unwrap();
        assert!(values(pos_q_bias.val()).iter().all(|&v| v == 0.5));

        assert_close(values(deberta.layers[1].attention.q_bias.val())[3], 0.3);

        let rel = deberta.rel_embeddings.as_ref().unwrap().val();
        assert_eq!(rel.dims(), [16, 16]);
        assert_close(values(rel)[5 * 16], 0.08);

        let ids  = Tensor::<TestBackend, 2, Int>::from_ints([[1, 9, 8, 2, 0]], &device);
        let mask = Tensor::<TestBackend, 2, Int>::from_ints([[1, 1, 1, 1, 0]], &device);
        assert!(values(encoder.forward(ids, mask).last()).iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_missing_checkpoint_is_an_error() {
        let device = Default::default();
        let dir = local_dir("no_weights");
        let result = load_encoder::<TestBackend>(
            Architecture::Bert, &tiny_config(), &dir.join(WEIGHTS_FILE), &device,
        );
        assert!(result.is_err());
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_no_tokenizer_files_is_an_error() {
        let dir = local_dir("empty");
        assert!(tokenizer_from_files(getter(&dir)).is_err());
        fs::remove_dir_all(dir).ok();
    }
}
