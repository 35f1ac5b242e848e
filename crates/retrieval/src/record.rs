use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stored long-term memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub text: String,
    /// Dense embedding. Dimension is opaque to the store but must be
    /// stable across the lifetime of one index.
    pub embedding: Vec<f32>,
    pub metadata: RecordMetadata,
}

/// Record metadata: a typed core plus free-form key/values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Record category: `general`, `user_fact`, `conversation_insight`, ...
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, String>,
}

impl RecordMetadata {
    pub fn new(kind: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            kind: kind.into(),
            timestamp: now,
            last_accessed: now,
            access_count: 0,
            extra: HashMap::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}
