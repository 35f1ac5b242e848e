//! Skill discovery and activation-time loading.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use rh_domain::error::{Error, Result};
use rh_domain::{CancelToken, ToolDefinition};

use crate::header::parse_skill_md;
use crate::runner;

/// One discovered skill: its header plus on-disk location.
#[derive(Debug, Clone)]
pub struct SkillEntry {
    pub name: String,
    pub description: String,
    pub dir: PathBuf,
    pub extras: HashMap<String, String>,
}

/// Owns the skill root directory. Holds only headers in memory; SOP text
/// and tool schemas load on activation.
pub struct SkillRegistry {
    root: PathBuf,
    skills: RwLock<HashMap<String, SkillEntry>>,
}

impl SkillRegistry {
    /// Open the registry and scan the root once.
    pub fn open(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root).map_err(Error::Io)?;
        let registry = Self {
            root: root.to_path_buf(),
            skills: RwLock::new(HashMap::new()),
        };
        registry.rescan();
        Ok(registry)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Re-scan the root directory. Each subdirectory with a readable
    /// SKILL.md becomes a skill; the directory name backs a missing
    /// `name` key.
    pub fn rescan(&self) {
        let mut found = HashMap::new();
        let entries = match std::fs::read_dir(&self.root) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, root = %self.root.display(), "skill root not readable");
                return;
            }
        };

        for entry in entries.flatten() {
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            let md_path = dir.join("SKILL.md");
            let Ok(content) = std::fs::read_to_string(&md_path) else {
                continue;
            };
            let Some((header, _body)) = parse_skill_md(&content) else {
                tracing::warn!(dir = %dir.display(), "SKILL.md has no valid header, skipping");
                continue;
            };

            let name = if header.name.is_empty() {
                entry.file_name().to_string_lossy().to_string()
            } else {
                header.name.clone()
            };
            found.insert(
                name.clone(),
                SkillEntry {
                    name,
                    description: header.description,
                    dir,
                    extras: header.extras,
                },
            );
        }

        tracing::info!(skills = found.len(), "skill registry scanned");
        *self.skills.write() = found;
    }

    /// Cheap listing for the Discovery phase: `(name, description)` pairs.
    pub fn index(&self) -> Vec<(String, String)> {
        let mut list: Vec<(String, String)> = self
            .skills
            .read()
            .values()
            .map(|s| (s.name.clone(), s.description.clone()))
            .collect();
        list.sort();
        list
    }

    pub fn contains(&self, name: &str) -> bool {
        self.skills.read().contains_key(name)
    }

    fn entry(&self, name: &str) -> Result<SkillEntry> {
        self.skills
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::SkillNotFound(name.to_owned()))
    }

    /// Load a skill's SOP body and optional tool schemas for activation.
    pub fn load_context(&self, name: &str) -> Result<(String, Option<Vec<ToolDefinition>>)> {
        let entry = self.entry(name)?;
        let content =
            std::fs::read_to_string(entry.dir.join("SKILL.md")).map_err(Error::Io)?;
        let (_, body) = parse_skill_md(&content)
            .ok_or_else(|| Error::Other(format!("skill '{name}' has a malformed SKILL.md")))?;

        let tools_path = entry.dir.join("tools.json");
        let tools = if tools_path.exists() {
            let raw = std::fs::read_to_string(&tools_path).map_err(Error::Io)?;
            Some(serde_json::from_str::<Vec<ToolDefinition>>(&raw)?)
        } else {
            None
        };

        Ok((body, tools))
    }

    /// Execute one of a skill's tools through its entrypoint.
    ///
    /// The entrypoint is the header's `entrypoint` extra, else the first
    /// of `main.py` / `run.sh` present. The invoked tool name is passed
    /// as `--tool` ahead of the decoded arguments.
    pub async fn execute(
        &self,
        name: &str,
        tool_name: &str,
        args: &serde_json::Value,
        cancel: &CancelToken,
    ) -> String {
        let entry = match self.entry(name) {
            Ok(e) => e,
            Err(e) => return format!("[Error]: {e}"),
        };

        let entrypoint = match resolve_entrypoint(&entry) {
            Some(ep) => ep,
            None => {
                return format!(
                    "[Error]: Skill '{name}' declares no entrypoint and has no main.py or run.sh."
                )
            }
        };

        let mut full_args = serde_json::Map::new();
        full_args.insert("tool".into(), serde_json::Value::String(tool_name.to_owned()));
        if let Some(map) = args.as_object() {
            for (k, v) in map {
                full_args.insert(k.clone(), v.clone());
            }
        }

        tracing::debug!(skill = name, tool = tool_name, "executing skill entrypoint");
        runner::run_entrypoint(
            &entry.dir,
            &entrypoint,
            &serde_json::Value::Object(full_args),
            cancel,
        )
        .await
    }

    /// Remove a skill's directory and registry entry.
    pub fn delete(&self, name: &str) -> bool {
        let Ok(entry) = self.entry(name) else {
            return false;
        };
        if let Err(e) = std::fs::remove_dir_all(&entry.dir) {
            tracing::warn!(skill = name, error = %e, "failed to remove skill directory");
            return false;
        }
        self.skills.write().remove(name);
        true
    }

    /// Learn a new skill from a repository URL or local directory, then
    /// rescan. Returns `(ok, human-readable message)`.
    pub async fn learn(&self, source: &str) -> (bool, String) {
        let result = crate::learn::learn(&self.root, source).await;
        self.rescan();
        result
    }
}

fn resolve_entrypoint(entry: &SkillEntry) -> Option<String> {
    if let Some(ep) = entry.extras.get("entrypoint") {
        return Some(ep.clone());
    }
    for candidate in ["main.py", "run.sh"] {
        if entry.dir.join(candidate).exists() {
            return Some(candidate.to_owned());
        }
    }
    None
}
