// ============================================================
// Layer 4 — Cora Loader
// ============================================================
// Loads the Cora citation graph as raw node text.
//
// Expected directory layout:
//
//   data/cora/
//     cora.content   ← <paper_id> \t <1433 binary features> \t <class_label>
//     texts.tsv      ← <paper_id> \t <title> \t <abstract>
//
// Node order follows cora.content. Class label strings are
// mapped to ids by their sorted order, so the 7 Cora classes
// always get the same ids. Each node's text is
//
//   "Title: <title>\nAbstract: <abstract>"
//
// Per seed, node ids are shuffled with a seeded RNG and cut
// 60% / 20% / 20% into train / val / test masks.
//
// Reference: rand crate documentation (SeedableRng, SliceRandom)
//            Rust Book §9 (Error Handling)

use anyhow::{bail, Context, Result};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use std::{
    collections::{BTreeSet, HashMap},
    fs,
    path::{Path, PathBuf},
};

use crate::domain::node_dataset::NodeDataset;
use crate::domain::traits::NodeSource;

pub const TRAIN_FRACTION: f64 = 0.6;
pub const VAL_FRACTION:   f64 = 0.2;

/// Loads Cora from `cora.content` + `texts.tsv` in a directory.
pub struct CoraLoader {
    dir: PathBuf,
}

/// Parsed, seed-independent part of the corpus.
struct CoraCorpus {
    texts:       Vec<String>,
    labels:      Vec<usize>,
    num_classes: usize,
}

impl CoraLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn read_corpus(&self) -> Result<CoraCorpus> {
        let content_path = self.dir.join("cora.content");
        let content = fs::read_to_string(&content_path)
            .with_context(|| format!("Cannot read '{}'", content_path.display()))?;
        let nodes = parse_content(&content)?;

        let texts_path = self.dir.join("texts.tsv");
        let texts_raw = fs::read_to_string(&texts_path)
            .with_context(|| format!("Cannot read '{}'", texts_path.display()))?;
        let mut texts_by_id = parse_texts(&texts_raw);

        // BTreeSet gives the sorted label vocabulary
        let classes: BTreeSet<&str> = nodes.iter().map(|(_, c)| c.as_str()).collect();
        let class_id: HashMap<&str, usize> = classes
            .iter()
            .enumerate()
            .map(|(i, &c)| (c, i))
            .collect();

        let mut missing = 0usize;
        let texts: Vec<String> = nodes
            .iter()
            .map(|(paper_id, _)| {
                texts_by_id.remove(paper_id).unwrap_or_else(|| {
                    missing += 1;
                    String::new()
                })
            })
            .collect();
        if missing > 0 {
            tracing::warn!("{missing} papers have no entry in texts.tsv; using empty text");
        }

        let labels = nodes.iter().map(|(_, c)| class_id[c.as_str()]).collect();

        Ok(CoraCorpus { texts, labels, num_classes: classes.len() })
    }
}

impl NodeSource for CoraLoader {
    fn load(&self, seed: u64) -> Result<NodeDataset> {
        let corpus = self.read_corpus()?;
        let n = corpus.texts.len();
        let (train_mask, val_mask, test_mask) = random_split_masks(n, seed);

        tracing::info!(
            "Loaded Cora from '{}': {} nodes, {} classes (seed {})",
            self.dir.display(), n, corpus.num_classes, seed
        );

        NodeDataset::new(
            corpus.texts,
            corpus.labels,
            train_mask,
            val_mask,
            test_mask,
            corpus.num_classes,
        )
    }
}

/// Parse `cora.content` into `(paper_id, class_label)` pairs.
fn parse_content(content: &str) -> Result<Vec<(String, String)>> {
    let mut nodes = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 2 {
            bail!("cora.content line {}: expected at least 2 columns", line_no + 1);
        }
        let paper_id = fields[0].trim().to_string();
        let label    = fields[fields.len() - 1].trim().to_string();
        nodes.push((paper_id, label));
    }
    if nodes.is_empty() {
        bail!("cora.content contains no nodes");
    }
    Ok(nodes)
}

/// Parse `texts.tsv` into `paper_id → "Title: ..\nAbstract: .."`.
fn parse_texts(raw: &str) -> HashMap<String, String> {
    raw.lines()
        .filter_map(|line| {
            let mut cols = line.splitn(3, '\t');
            let paper_id = cols.next()?.trim();
            if paper_id.is_empty() {
                return None;
            }
            let title    = normalize_ws(cols.next().unwrap_or(""));
            let abstract_ = normalize_ws(cols.next().unwrap_or(""));
            Some((paper_id.to_string(), format!("Title: {title}\nAbstract: {abstract_}")))
        })
        .collect()
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Seeded 60/20/20 node split, returned as (train, val, test) masks.
pub fn random_split_masks(n: usize, seed: u64) -> (Vec<bool>, Vec<bool>, Vec<bool>) {
    let mut node_ids: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    node_ids.shuffle(&mut rng);

    let train_end = (n as f64 * TRAIN_FRACTION) as usize;
    let val_end   = (n as f64 * (TRAIN_FRACTION + VAL_FRACTION)) as usize;

    let to_mask = |ids: &[usize]| {
        let mut mask = vec![false; n];
        for &i in ids {
            mask[i] = true;
        }
        mask
    };

    (
        to_mask(&node_ids[..train_end]),
        to_mask(&node_ids[train_end..val_end]),
        to_mask(&node_ids[val_end..]),
    )
}

// ─── InMemorySource ───────────────────────────────────────────────────────────
/// A fixed dataset handed out unchanged for every seed.
#[cfg(test)]
pub struct InMemorySource {
    dataset: NodeDataset,
}

#[cfg(test)]
impl InMemorySource {
    pub fn new(dataset: NodeDataset) -> Self {
        Self { dataset }
    }
}

#[cfg(test)]
impl NodeSource for InMemorySource {
    fn load(&self, _seed: u64) -> Result<NodeDataset> {
        Ok(self.dataset.clone())
    }
}

/// Returns true when `dir` looks like a Cora directory.
pub fn is_cora_dir(dir: &Path) -> bool {
    dir.join("cora.content").is_file() && dir.join("texts.tsv").is_file()
}
