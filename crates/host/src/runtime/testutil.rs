//! Test support: a scripted LLM client and a fully wired [`AppState`]
//! over temporary directories.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use rh_domain::error::Result;
use rh_domain::stream::{BoxStream, StreamEvent};
use rh_providers::{ChatRequest, ChatResponse, LlmClient};
use rh_retrieval::{FileVectorIndex, RetrievalStore};
use rh_sentinel::{ManualHotkeyBackend, SentinelEngine};
use rh_sessions::TranscriptStore;
use rh_skills::SkillRegistry;

use crate::config::ConfigStore;
use crate::embedder::ProviderEmbedder;
use crate::notify::LogNotificationSink;
use crate::runtime::bridge::ClientHub;
use crate::runtime::cancel::CancelMap;
use crate::runtime::session_lock::SessionLockMap;
use crate::state::{ActiveSkillMap, AppState};

/// Scripted LLM: streams and chat responses pop in FIFO order. An empty
/// queue yields a benign default (`NO_INFO` / immediate `Done`), which
/// the supervisor treats as COMPLETE and the extractor as
/// nothing-to-store.
pub struct MockLlm {
    stream_scripts: Mutex<VecDeque<Vec<StreamEvent>>>,
    chat_scripts: Mutex<VecDeque<String>>,
    /// Every streaming request, captured for assertions.
    pub stream_requests: Mutex<Vec<ChatRequest>>,
    /// Every non-streaming request, captured for assertions.
    pub chat_requests: Mutex<Vec<ChatRequest>>,
}

impl MockLlm {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            stream_scripts: Mutex::new(VecDeque::new()),
            chat_scripts: Mutex::new(VecDeque::new()),
            stream_requests: Mutex::new(Vec::new()),
            chat_requests: Mutex::new(Vec::new()),
        })
    }

    pub fn push_stream(&self, events: Vec<StreamEvent>) {
        self.stream_scripts.lock().push_back(events);
    }

    pub fn push_chat(&self, content: &str) {
        self.chat_scripts.lock().push_back(content.to_owned());
    }
}

#[async_trait::async_trait]
impl LlmClient for MockLlm {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        self.chat_requests.lock().push(req.clone());
        let content = self
            .chat_scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| "NO_INFO".to_owned());
        Ok(ChatResponse {
            content,
            tool_calls: Vec::new(),
            finish_reason: Some("stop".into()),
        })
    }

    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        self.stream_requests.lock().push(req.clone());
        let events = self
            .stream_scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| {
                vec![StreamEvent::Done {
                    finish_reason: Some("stop".into()),
                }]
            });

        let stream = async_stream::stream! {
            for event in events {
                // A small gap per event keeps cancellation observable
                // mid-stream.
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                yield Ok(event);
            }
        };
        Ok(Box::pin(stream))
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_embed(t)).collect())
    }
}

fn hash_embed(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 32];
    for token in text.to_lowercase().split_whitespace() {
        let mut h: u32 = 2166136261;
        for b in token.bytes() {
            h ^= b as u32;
            h = h.wrapping_mul(16777619);
        }
        v[(h % 32) as usize] += 1.0;
    }
    v
}

/// Build an [`AppState`] over a temp directory with the given LLM.
pub async fn test_state_with_llm(
    llm_impl: Arc<MockLlm>,
) -> (tempfile::TempDir, AppState) {
    let tmp = tempfile::tempdir().unwrap();
    let base = tmp.path();

    let config = Arc::new(ConfigStore::load(base).unwrap());
    let llm: crate::embedder::LlmHandle =
        Arc::new(RwLock::new(Some(llm_impl as Arc<dyn LlmClient>)));

    let transcripts = Arc::new(TranscriptStore::new(&config.sessions_dir()).unwrap());
    let index = Arc::new(FileVectorIndex::open(&config.vector_store_dir()).unwrap());
    let retrieval = Arc::new(RetrievalStore::new(
        Arc::new(ProviderEmbedder::new(llm.clone())),
        index,
    ));
    let skills = Arc::new(SkillRegistry::open(&config.skills_dir()).unwrap());
    let sentinels = Arc::new(SentinelEngine::new(
        &config.sentinels_path(),
        Arc::new(ManualHotkeyBackend::new()),
    ));

    let state = AppState {
        config,
        llm,
        transcripts,
        retrieval,
        skills,
        sentinels,
        active_skills: Arc::new(ActiveSkillMap::default()),
        cancel_map: Arc::new(CancelMap::new()),
        session_locks: Arc::new(SessionLockMap::new()),
        clients: Arc::new(ClientHub::new()),
        notifier: Arc::new(LogNotificationSink),
    };
    (tmp, state)
}

/// Convenience: state with an unscripted mock LLM.
pub async fn test_state() -> (tempfile::TempDir, AppState) {
    test_state_with_llm(MockLlm::new()).await
}
