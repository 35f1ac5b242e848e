//! Host configuration: the system config, LLM profiles, and the user
//! profile, each a YAML document under `config/`.
//!
//! Turns take an immutable snapshot at start; a runtime mutation swaps
//! the snapshot atomically, so in-flight turns keep the view they began
//! with.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use rh_domain::error::{Error, Result};
use rh_domain::SearchStrategy;
use rh_providers::ProviderProfile;
use rh_skills::LegacyScript;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Document shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `config/config.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    /// Profile id selected from `profiles.yaml`.
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub system: SystemConfig,
    /// Legacy script aliases, migrated into skills at startup.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub scripts: HashMap<String, LegacyScript>,
    /// Backup of the migrated legacy entries.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub scripts_backup: HashMap<String, LegacyScript>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_listen")]
    pub listen_addr: String,
    #[serde(default)]
    pub memory: MemoryConfig,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen(),
            memory: MemoryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Sliding-window size for the LLM context.
    #[serde(default = "default_window")]
    pub window_size: usize,
    /// Memories retrieved per turn.
    #[serde(default = "default_top_k")]
    pub retrieve_top_k: usize,
    #[serde(default)]
    pub rag_strategy: SearchStrategy,
    #[serde(default = "default_true")]
    pub enable_summary: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            window_size: default_window(),
            retrieve_top_k: default_top_k(),
            rag_strategy: SearchStrategy::default(),
            enable_summary: true,
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:8762".to_owned()
}
fn default_window() -> usize {
    10
}
fn default_top_k() -> usize {
    3
}
fn default_true() -> bool {
    true
}

/// `config/profiles.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfilesDoc {
    #[serde(default)]
    pub profiles: HashMap<String, ProviderProfile>,
}

/// `config/user_profile.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub user_info: HashMap<String, String>,
    #[serde(default)]
    pub known_projects: HashMap<String, String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Owns the three YAML documents and the data-directory layout.
pub struct ConfigStore {
    base_dir: PathBuf,
    config: RwLock<Arc<HostConfig>>,
    profiles: RwLock<Arc<ProfilesDoc>>,
    user: RwLock<Arc<UserProfile>>,
}

impl ConfigStore {
    /// Load (or default) the three documents under `base_dir/config/`.
    pub fn load(base_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(base_dir.join("config")).map_err(Error::Io)?;

        let config: HostConfig = read_yaml(&base_dir.join("config").join("config.yaml"))?;
        let profiles: ProfilesDoc = read_yaml(&base_dir.join("config").join("profiles.yaml"))?;
        let user: UserProfile = read_yaml(&base_dir.join("config").join("user_profile.yaml"))?;

        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            config: RwLock::new(Arc::new(config)),
            profiles: RwLock::new(Arc::new(profiles)),
            user: RwLock::new(Arc::new(user)),
        })
    }

    // ── Directory layout ───────────────────────────────────────────

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.base_dir.join("sessions")
    }

    pub fn vector_store_dir(&self) -> PathBuf {
        self.base_dir.join("vector_store")
    }

    pub fn skills_dir(&self) -> PathBuf {
        self.base_dir.join("SKILLS")
    }

    pub fn sentinels_path(&self) -> PathBuf {
        self.base_dir.join("sentinels.json")
    }

    fn config_path(&self) -> PathBuf {
        self.base_dir.join("config").join("config.yaml")
    }

    fn profiles_path(&self) -> PathBuf {
        self.base_dir.join("config").join("profiles.yaml")
    }

    fn user_path(&self) -> PathBuf {
        self.base_dir.join("config").join("user_profile.yaml")
    }

    // ── Snapshots ──────────────────────────────────────────────────

    pub fn snapshot(&self) -> Arc<HostConfig> {
        self.config.read().clone()
    }

    pub fn profiles(&self) -> Arc<ProfilesDoc> {
        self.profiles.read().clone()
    }

    pub fn user_profile(&self) -> Arc<UserProfile> {
        self.user.read().clone()
    }

    /// The active provider profile, when one is configured and exists.
    pub fn active_provider(&self) -> Option<ProviderProfile> {
        let config = self.snapshot();
        let id = config.active_profile.as_deref()?;
        self.profiles().profiles.get(id).cloned()
    }

    // ── Mutations (persist, then swap the snapshot) ────────────────

    pub fn update_config(&self, new: HostConfig) -> Result<()> {
        write_yaml(&self.config_path(), &new)?;
        *self.config.write() = Arc::new(new);
        Ok(())
    }

    pub fn update_profiles(&self, new: ProfilesDoc) -> Result<()> {
        write_yaml(&self.profiles_path(), &new)?;
        *self.profiles.write() = Arc::new(new);
        Ok(())
    }

    pub fn switch_active_profile(&self, profile_id: &str) -> Result<()> {
        if !self.profiles().profiles.contains_key(profile_id) {
            return Err(Error::NotFound(format!("profile '{profile_id}'")));
        }
        let mut config = (*self.snapshot()).clone();
        config.active_profile = Some(profile_id.to_owned());
        self.update_config(config)
    }

    /// Store one user fact; the next prompt build picks it up.
    pub fn set_user_fact(&self, key: &str, value: &str) -> Result<()> {
        let mut user = (*self.user_profile()).clone();
        user.user_info.insert(key.to_owned(), value.to_owned());
        write_yaml(&self.user_path(), &user)?;
        *self.user.write() = Arc::new(user);
        Ok(())
    }

    /// Clear migrated legacy scripts, keeping a backup copy.
    pub fn archive_legacy_scripts(&self) -> Result<()> {
        let mut config = (*self.snapshot()).clone();
        if config.scripts.is_empty() {
            return Ok(());
        }
        config.scripts_backup.extend(config.scripts.drain());
        self.update_config(config)
    }
}

fn read_yaml<T: serde::de::DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
    serde_yaml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
}

fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let yaml =
        serde_yaml::to_string(value).map_err(|e| Error::Config(format!("serialize: {e}")))?;
    std::fs::write(path, yaml).map_err(Error::Io)
}
