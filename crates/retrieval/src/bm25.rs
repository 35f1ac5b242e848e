//! In-memory BM25 index over all records (`k1 = 1.5`, `b = 0.75`).
//!
//! The tokenizer is mixed-script: runs of alphanumeric characters become
//! one lowercase token each, while CJK ideographs tokenize per character
//! so lexical match works without word segmentation.

use std::collections::HashMap;

const K1: f32 = 1.5;
const B: f32 = 0.75;

/// Split text into lowercase word-run tokens plus individual CJK chars.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut run = String::new();

    for ch in text.chars() {
        if is_cjk(ch) {
            if !run.is_empty() {
                tokens.push(std::mem::take(&mut run));
            }
            tokens.push(ch.to_string());
        } else if ch.is_alphanumeric() {
            for lower in ch.to_lowercase() {
                run.push(lower);
            }
        } else if !run.is_empty() {
            tokens.push(std::mem::take(&mut run));
        }
    }
    if !run.is_empty() {
        tokens.push(run);
    }
    tokens
}

fn is_cjk(ch: char) -> bool {
    matches!(ch as u32,
        0x4E00..=0x9FFF      // CJK Unified Ideographs
        | 0x3400..=0x4DBF    // Extension A
        | 0xF900..=0xFAFF    // Compatibility Ideographs
    )
}

struct Doc {
    id: String,
    term_freq: HashMap<String, u32>,
    len: f32,
}

/// BM25 scoring over the full record set. Rebuilt after any add/delete.
pub struct Bm25Index {
    docs: Vec<Doc>,
    doc_freq: HashMap<String, u32>,
    avg_len: f32,
}

impl Bm25Index {
    pub fn build<'a>(entries: impl Iterator<Item = (&'a str, &'a str)>) -> Self {
        let mut docs = Vec::new();
        let mut doc_freq: HashMap<String, u32> = HashMap::new();
        let mut total_len = 0.0f32;

        for (id, text) in entries {
            let tokens = tokenize(text);
            let mut term_freq: HashMap<String, u32> = HashMap::new();
            for token in &tokens {
                *term_freq.entry(token.clone()).or_default() += 1;
            }
            for term in term_freq.keys() {
                *doc_freq.entry(term.clone()).or_default() += 1;
            }
            total_len += tokens.len() as f32;
            docs.push(Doc {
                id: id.to_owned(),
                term_freq,
                len: tokens.len() as f32,
            });
        }

        let avg_len = if docs.is_empty() {
            0.0
        } else {
            total_len / docs.len() as f32
        };

        Self {
            docs,
            doc_freq,
            avg_len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Score every document against `query`; only documents with a
    /// positive score are returned, best first.
    pub fn scores(&self, query: &str) -> Vec<(String, f32)> {
        if self.docs.is_empty() {
            return Vec::new();
        }
        let query_terms = tokenize(query);
        let n = self.docs.len() as f32;

        let mut results = Vec::new();
        for doc in &self.docs {
            let mut score = 0.0f32;
            for term in &query_terms {
                let Some(&tf) = doc.term_freq.get(term) else {
                    continue;
                };
                let df = *self.doc_freq.get(term).unwrap_or(&0) as f32;
                let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                let tf = tf as f32;
                let denom = tf + K1 * (1.0 - B + B * doc.len / self.avg_len.max(1e-6));
                score += idf * tf * (K1 + 1.0) / denom;
            }
            if score > 0.0 {
                results.push((doc.id.clone(), score));
            }
        }

        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results
    }
}
