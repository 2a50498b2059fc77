// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Everything that builds or runs a Burn module lives here:
//
//   encoder.rs    — EncoderConfig (hub config.json) and the
//                   Encoder enum over the two architectures
//   bert.rs       — BERT encoder + checkpoint key mapping
//   deberta.rs    — DeBERTa encoder (disentangled attention)
//                   + checkpoint key mapping
//   classifier.rs — [CLS]-pooled classification head with
//                   label-smoothed cross-entropy
//   trainer.rs    — AdamW fine-tuning loop with gradient
//                   accumulation and linear LR decay
//   evaluator.rs  — Loss / accuracy / predictions on a split
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Devlin et al. (2019) BERT
//            He et al. (2021) DeBERTa

pub mod encoder;

pub mod bert;

pub mod deberta;

/// Classification head over a pretrained encoder
pub mod classifier;

/// Fine-tuning loop with per-epoch validation
pub mod trainer;

pub mod evaluator;

#[cfg(test)]
pub mod test_utils;
