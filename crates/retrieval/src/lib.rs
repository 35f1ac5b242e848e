//! Long-term memory: hybrid (dense + lexical) retrieval with access
//! statistics.
//!
//! Records are embedded on ingest and persisted through a [`VectorIndex`].
//! Queries run one of three strategies: plain dense nearest-neighbour,
//! time-decay reranking, or BM25/semantic score fusion. Every search hit
//! bumps the record's access counters.

pub mod bm25;
pub mod embed;
pub mod index;
pub mod record;
pub mod store;

pub use embed::Embedder;
pub use index::{FileVectorIndex, VectorIndex};
pub use record::{MemoryRecord, RecordMetadata};
pub use store::{ExportRow, RetrievalStore};
