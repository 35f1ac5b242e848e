//! Startup wiring: load config, build the stores, migrate legacy
//! scripts, seed retrieval, and start the sentinel engine.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use rh_domain::error::Result;
use rh_providers::{LlmClient, OpenAiCompatClient};
use rh_retrieval::{FileVectorIndex, RetrievalStore};
use rh_sentinel::{ManualHotkeyBackend, SentinelEngine};
use rh_sessions::TranscriptStore;
use rh_skills::SkillRegistry;

use crate::config::ConfigStore;
use crate::embedder::{LlmHandle, ProviderEmbedder};
use crate::notify::LogNotificationSink;
use crate::runtime::bridge::ClientHub;
use crate::runtime::cancel::CancelMap;
use crate::runtime::session_lock::SessionLockMap;
use crate::state::{ActiveSkillMap, AppState};

/// Build the full application state rooted at `base_dir`.
///
/// A missing or invalid active profile leaves the LLM handle empty:
/// the HTTP surface still serves, and every submitted turn yields an
/// `error` event until a profile is configured.
pub async fn build_state(base_dir: &Path) -> Result<AppState> {
    let config = Arc::new(ConfigStore::load(base_dir)?);

    let llm: LlmHandle = Arc::new(RwLock::new(build_llm_client(&config)));
    if llm.read().is_none() {
        tracing::warn!("no usable LLM profile configured; turns will fail until one is set");
    }

    let transcripts = Arc::new(TranscriptStore::new(&config.sessions_dir())?);

    let index = Arc::new(FileVectorIndex::open(&config.vector_store_dir())?);
    let retrieval = Arc::new(RetrievalStore::new(
        Arc::new(ProviderEmbedder::new(llm.clone())),
        index,
    ));

    let skills = Arc::new(SkillRegistry::open(&config.skills_dir())?);
    migrate_legacy_scripts(&config, &skills);

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
        sentinels: sentinels.clone(),
        active_skills: Arc::new(ActiveSkillMap::default()),
        cancel_map: Arc::new(CancelMap::new()),
        session_locks: Arc::new(SessionLockMap::new()),
        clients: Arc::new(ClientHub::new()),
        notifier: Arc::new(LogNotificationSink),
    };

    // Retrieval degrades to "no memories" when seeding fails (e.g. no
    // embedder yet); it is retried lazily by the first successful add.
    if let Err(e) = state.retrieval.seed_if_empty().await {
        tracing::warn!(error = %e, "retrieval store seeding skipped");
    }

    crate::runtime::install_sentinel_callback(state.clone());
    sentinels.start();

    Ok(state)
}

/// Construct the LLM client for the currently active profile.
pub fn build_llm_client(config: &ConfigStore) -> Option<Arc<dyn LlmClient>> {
    let profile = config.active_provider()?;
    match OpenAiCompatClient::from_profile(&profile) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!(error = %e, "failed to build LLM client");
            None
        }
    }
}

/// Swap the LLM handle after a profile mutation. In-flight turns keep
/// the client they started with.
pub fn refresh_llm_client(state: &AppState) {
    *state.llm.write() = build_llm_client(&state.config);
}

/// One-shot, idempotent rewrite of legacy script entries into skills.
fn migrate_legacy_scripts(config: &ConfigStore, skills: &SkillRegistry) {
    let scripts = config.snapshot().scripts.clone();
    if scripts.is_empty() {
        return;
    }
    match rh_skills::migrate::migrate_legacy_scripts(skills.root(), &scripts) {
        Ok(migrated) => {
            if let Err(e) = config.archive_legacy_scripts() {
                tracing::warn!(error = %e, "failed to archive legacy scripts");
            }
            skills.rescan();
            tracing::info!(count = migrated.len(), "legacy scripts migrated");
        }
        Err(e) => tracing::warn!(error = %e, "legacy script migration failed"),
    }
}
