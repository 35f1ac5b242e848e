//! The retrieval store: ingest, hybrid search, stats, dedup scoring.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use rh_domain::error::Result;
use rh_domain::SearchStrategy;

use crate::bm25::{tokenize, Bm25Index};
use crate::embed::Embedder;
use crate::index::VectorIndex;
use crate::record::{MemoryRecord, RecordMetadata};

/// Fusion weights shared by both hybrid strategies.
const SEMANTIC_WEIGHT: f32 = 0.7;
const SECONDARY_WEIGHT: f32 = 0.3;

/// Row shape for the memory-inspection API.
#[derive(Debug, Clone, Serialize)]
pub struct ExportRow {
    pub id: String,
    pub kind: String,
    pub content: String,
    pub access_count: u64,
    pub timestamp: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

/// Long-term memory store with pluggable embedding and persistence.
pub struct RetrievalStore {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    bm25: RwLock<Bm25Index>,
}

impl RetrievalStore {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        let store = Self {
            embedder,
            index,
            bm25: RwLock::new(Bm25Index::build(std::iter::empty())),
        };
        store.rebuild_lexical();
        store
    }

    /// Insert a bootstrap record into an empty store so downstream code
    /// can rely on the store being non-empty and the embedder exercised.
    pub async fn seed_if_empty(&self) -> Result<()> {
        if self.index.count() > 0 {
            return Ok(());
        }
        self.add(
            "Resonance long-term memory initialized.",
            RecordMetadata::new("general"),
        )
        .await?;
        Ok(())
    }

    /// Embed and persist a new record. Returns its id.
    pub async fn add(&self, text: &str, metadata: RecordMetadata) -> Result<String> {
        let embeddings = self.embedder.embed(&[text.to_owned()]).await?;
        let embedding = embeddings.into_iter().next().unwrap_or_default();

        let record = MemoryRecord {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.to_owned(),
            embedding,
            metadata,
        };
        let id = record.id.clone();
        self.index.insert(record)?;
        self.rebuild_lexical();
        tracing::debug!(id = %id, "memory record added");
        Ok(id)
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        let removed = self.index.delete(id)?;
        if removed {
            self.rebuild_lexical();
        }
        Ok(removed)
    }

    pub fn count(&self) -> usize {
        self.index.count()
    }

    pub fn export_all(&self) -> Vec<ExportRow> {
        self.index
            .all()
            .into_iter()
            .map(|r| ExportRow {
                id: r.id,
                kind: r.metadata.kind,
                content: r.text,
                access_count: r.metadata.access_count,
                timestamp: r.metadata.timestamp,
                last_accessed: r.metadata.last_accessed,
            })
            .collect()
    }

    /// Search under the given strategy, returning record texts best-first.
    ///
    /// Side effect: every returned record's `access_count` is incremented
    /// and `last_accessed` refreshed; a stats failure never fails the
    /// search.
    pub async fn search(&self, query: &str, k: usize, strategy: SearchStrategy) -> Vec<String> {
        if k == 0 || self.index.count() == 0 {
            return Vec::new();
        }

        let hits = match strategy {
            SearchStrategy::Semantic => self.search_semantic(query, k).await,
            SearchStrategy::HybridTime => self.search_hybrid_time(query, k).await,
            SearchStrategy::HybridLexical => self.search_hybrid_lexical(query, k).await,
        };

        let ids: Vec<String> = hits.iter().map(|r| r.id.clone()).collect();
        if let Err(e) = self.index.record_access(&ids, Utc::now()) {
            tracing::warn!(error = %e, "failed to update memory access stats");
        }

        hits.into_iter().map(|r| r.text).collect()
    }

    /// Maximum combined similarity of any stored record to `text`, in
    /// `[0, 1]`. Used by dedup checks before storing near-identical facts.
    pub async fn similarity(&self, text: &str) -> f32 {
        let all = self.index.all();
        if all.is_empty() {
            return 0.0;
        }

        let query_tokens: HashSet<String> = tokenize(text).into_iter().collect();
        let embedding = match self.embedder.embed(&[text.to_owned()]).await {
            Ok(mut v) if !v.is_empty() => Some(v.remove(0)),
            _ => None,
        };

        let mut best = 0.0f32;
        for record in &all {
            let semantic = match &embedding {
                Some(q) => {
                    let d = l2(q, &record.embedding);
                    1.0 / (1.0 + d)
                }
                None => 0.0,
            };
            let record_tokens: HashSet<String> = tokenize(&record.text).into_iter().collect();
            let lexical = jaccard(&query_tokens, &record_tokens);
            let combined = SEMANTIC_WEIGHT * semantic + SECONDARY_WEIGHT * lexical;
            best = best.max(combined);
        }
        best.clamp(0.0, 1.0)
    }

    // ── Strategies ─────────────────────────────────────────────────

    async fn search_semantic(&self, query: &str, k: usize) -> Vec<MemoryRecord> {
        let Some(vector) = self.embed_query(query).await else {
            return Vec::new();
        };
        self.index
            .nearest(&vector, k)
            .into_iter()
            .map(|(r, _)| r)
            .collect()
    }

    /// Rerank a wider semantic candidate set with a time-decay factor:
    /// `0.7·sim + 0.3·decay`, `decay = 1/(1 + 0.1·age_days)`.
    async fn search_hybrid_time(&self, query: &str, k: usize) -> Vec<MemoryRecord> {
        let Some(vector) = self.embed_query(query).await else {
            return Vec::new();
        };
        let now = Utc::now();
        let mut scored: Vec<(MemoryRecord, f32)> = self
            .index
            .nearest(&vector, k * 3)
            .into_iter()
            .map(|(record, distance)| {
                let semantic = 1.0 / (1.0 + distance);
                let age_days = (now - record.metadata.timestamp).num_days().max(0) as f32;
                let decay = 1.0 / (1.0 + 0.1 * age_days);
                let score = SEMANTIC_WEIGHT * semantic + SECONDARY_WEIGHT * decay;
                (record, score)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored.into_iter().map(|(r, _)| r).collect()
    }

    /// Fuse dense and BM25 rankings: up to `4k` candidates per leg,
    /// min-max normalize each score set, `0.7·semNorm + 0.3·bm25Norm`,
    /// ties broken by the semantic leg.
    async fn search_hybrid_lexical(&self, query: &str, k: usize) -> Vec<MemoryRecord> {
        let candidates_k = k * 4;

        let semantic_raw: Vec<(String, f32)> = match self.embed_query(query).await {
            Some(vector) => self
                .index
                .nearest(&vector, candidates_k)
                .into_iter()
                .map(|(r, d)| (r.id, 1.0 / (1.0 + d)))
                .collect(),
            // Degraded mode: the lexical leg still works without the
            // embedder, so carry on with BM25 alone.
            None => Vec::new(),
        };

        let mut lexical_raw = self.bm25.read().scores(query);
        lexical_raw.truncate(candidates_k);

        if semantic_raw.is_empty() && lexical_raw.is_empty() {
            return Vec::new();
        }

        let semantic_norm = min_max_normalize(&semantic_raw);
        let lexical_norm = min_max_normalize(&lexical_raw);

        let mut candidate_ids: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for (id, _) in semantic_raw.iter().chain(lexical_raw.iter()) {
            if seen.insert(id.clone()) {
                candidate_ids.push(id.clone());
            }
        }

        let by_id: HashMap<String, MemoryRecord> = self
            .index
            .all()
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();

        let mut fused: Vec<(MemoryRecord, f32, f32)> = candidate_ids
            .into_iter()
            .filter_map(|id| {
                let record = by_id.get(&id)?.clone();
                let sem = semantic_norm.get(&id).copied().unwrap_or(0.0);
                let lex = lexical_norm.get(&id).copied().unwrap_or(0.0);
                let score = SEMANTIC_WEIGHT * sem + SECONDARY_WEIGHT * lex;
                Some((record, score, sem))
            })
            .collect();

        fused.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal))
        });
        fused.truncate(k);
        fused.into_iter().map(|(r, _, _)| r).collect()
    }

    // ── Internals ──────────────────────────────────────────────────

    async fn embed_query(&self, query: &str) -> Option<Vec<f32>> {
        match self.embedder.embed(&[query.to_owned()]).await {
            Ok(mut vectors) if !vectors.is_empty() => Some(vectors.remove(0)),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "query embedding failed");
                None
            }
        }
    }

    fn rebuild_lexical(&self) {
        let records = self.index.all();
        let rebuilt = Bm25Index::build(
            records
                .iter()
                .map(|r| (r.id.as_str(), r.text.as_str())),
        );
        *self.bm25.write() = rebuilt;
    }
}

/// Min-max normalize scores into `[0, 1]`. A degenerate set (all equal)
/// maps to 1.0 so a lone strong candidate is not zeroed out.
fn min_max_normalize(scores: &[(String, f32)]) -> HashMap<String, f32> {
    if scores.is_empty() {
        return HashMap::new();
    }
    let min = scores.iter().map(|(_, s)| *s).fold(f32::INFINITY, f32::min);
    let max = scores
        .iter()
        .map(|(_, s)| *s)
        .fold(f32::NEG_INFINITY, f32::max);

    scores
        .iter()
        .map(|(id, s)| {
            let norm = if (max - min).abs() < f32::EPSILON {
                1.0
            } else {
                (s - min) / (max - min)
            };
            (id.clone(), norm)
        })
        .collect()
}

fn l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f32;
    let union = a.union(b).count() as f32;
    intersection / union
}
