// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs, enums and traits describing the experiment:
// the node dataset, the closed set of language models, and the
// accuracy bookkeeping across seeds.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O or network calls
//   - Only plain Rust structs, enums, and traits
//
// Reference: Rust Book §5 (Structs), §6 (Enums), §10 (Traits)

/// Node texts, labels and split masks for one seed
pub mod node_dataset;

/// The three supported pretrained language models
pub mod lm_type;

/// Per-seed accuracy accumulation and mean/std reporting
pub mod accuracy;

// Core abstractions (traits) that other layers implement
pub mod traits;
