//! Shared application state passed to the runtime and API handlers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use rh_retrieval::RetrievalStore;
use rh_sentinel::SentinelEngine;
use rh_sessions::TranscriptStore;
use rh_skills::SkillRegistry;

use crate::config::ConfigStore;
use crate::embedder::LlmHandle;
use crate::notify::NotificationSink;
use crate::runtime::bridge::ClientHub;
use crate::runtime::cancel::CancelMap;
use crate::runtime::session_lock::SessionLockMap;

/// Active-skill selection per session. Kept per session so concurrent
/// sessions never contaminate each other's tool manifests.
#[derive(Default)]
pub struct ActiveSkillMap {
    inner: Mutex<HashMap<String, String>>,
}

impl ActiveSkillMap {
    pub fn get(&self, session: &str) -> Option<String> {
        self.inner.lock().get(session).cloned()
    }

    pub fn activate(&self, session: &str, skill: &str) {
        self.inner
            .lock()
            .insert(session.to_owned(), skill.to_owned());
    }

    pub fn deactivate(&self, session: &str) -> Option<String> {
        self.inner.lock().remove(session)
    }
}

/// Shared application state.
///
/// Fields group by concern: configuration, the LLM handle, the owning
/// stores (transcripts, retrieval, skills, sentinels), and the bridge
/// primitives (cancel map, session locks, client hub).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConfigStore>,
    pub llm: LlmHandle,

    pub transcripts: Arc<TranscriptStore>,
    pub retrieval: Arc<RetrievalStore>,
    pub skills: Arc<SkillRegistry>,
    pub sentinels: Arc<SentinelEngine>,

    pub active_skills: Arc<ActiveSkillMap>,
    pub cancel_map: Arc<CancelMap>,
    pub session_locks: Arc<SessionLockMap>,
    pub clients: Arc<ClientHub>,
    pub notifier: Arc<dyn NotificationSink>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_skill_state_is_per_session() {
        let map = ActiveSkillMap::default();
        map.activate("s1", "pdf-tools");
        map.activate("s2", "weather");

        assert_eq!(map.get("s1").as_deref(), Some("pdf-tools"));
        assert_eq!(map.get("s2").as_deref(), Some("weather"));
        assert_eq!(map.get("s3"), None);

        assert_eq!(map.deactivate("s1").as_deref(), Some("pdf-tools"));
        assert_eq!(map.get("s1"), None);
        assert_eq!(map.get("s2").as_deref(), Some("weather"));
    }
}
