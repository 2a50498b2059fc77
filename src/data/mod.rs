// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from the raw Cora files to tensor batches:
//
//   cora.content + texts.tsv
//       │
//       ▼
//   CoraLoader          → NodeDataset (texts, labels, masks) per seed
//       │
//       ▼
//   splitter            → train / val / test indices, texts, labels
//       │
//       ▼
//   TextEncoder         → token ids + attention masks per split
//       │
//       ▼
//   NodeTextDataset     → implements Burn's Dataset trait
//       │
//       ▼
//   ClassificationBatcher → stacks items into tensor batches
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Loads Cora node texts and builds seeded split masks
pub mod loader;

/// Mask → index conversion and text/label gathering
pub mod splitter;

/// Tokenization with truncation and padding
pub mod encoding;

/// Implements Burn's Dataset trait for tokenized nodes
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;
