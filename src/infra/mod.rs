// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns that talk to the outside world:
//
//   hub.rs             — Hugging Face hub download and PyTorch
//                        weight import into Burn encoders
//
//   tokenizer_store.rs — Tokenizers from hub files
//                        (tokenizer.json / BPE / WordPiece) and
//                        a corpus word-level tokenizer for tests
//
//   metrics.rs         — Per-epoch training curves as CSV
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)

/// Pretrained encoder download and weight import
pub mod hub;

/// Tokenizer construction from hub files
pub mod tokenizer_store;

/// Training metrics CSV logger
pub mod metrics;
