//! Acquiring new skills from a repository URL or a local directory.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::process::Command;

/// Directories never copied into a learned skill.
const COPY_IGNORE: &[&str] = &[".git", "venv", "node_modules", "__pycache__", "target"];

/// Learn a skill: fetch it under the skills root, validate its structure,
/// and attempt dependency installation.
///
/// Invalid structure (no `SKILL.md`) rolls the partial directory back. A
/// failed dependency install is reported in the message but keeps the
/// skill installed.
pub async fn learn(root: &Path, source: &str) -> (bool, String) {
    let name = derive_skill_name(source);
    let target = root.join(&name);

    if source.starts_with("http://") || source.starts_with("https://") {
        if target.exists() {
            return (
                false,
                format!("Skill '{name}' already exists. Delete it first to re-learn."),
            );
        }
        if let Err(msg) = git_clone(source, &target).await {
            rollback(&target);
            return (false, msg);
        }
    } else {
        let src = PathBuf::from(source);
        if !src.exists() {
            return (false, format!("Source path '{source}' does not exist."));
        }
        if target.exists() {
            rollback(&target);
        }
        if let Err(e) = copy_dir_filtered(&src, &target) {
            rollback(&target);
            return (false, format!("Failed to copy skill directory: {e}"));
        }
    }

    // Structural validation: a skill must carry its SOP document.
    if !target.join("SKILL.md").exists() {
        rollback(&target);
        return (
            false,
            format!("Source has no SKILL.md; '{name}' was not installed."),
        );
    }

    let mut message = format!("Learned skill '{name}'.");
    if target.join("requirements.txt").exists() {
        match pip_install(&target).await {
            Ok(()) => message.push_str(" Dependencies installed."),
            Err(e) => message.push_str(&format!(" Dependency installation failed: {e}")),
        }
    }

    (true, message)
}

/// Derive the on-disk directory name. URLs keep their last path segment
/// plus a short content hash so distinct sources never collide.
pub fn derive_skill_name(source: &str) -> String {
    if source.starts_with("http://") || source.starts_with("https://") {
        let base = source
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("skill")
            .trim_end_matches(".git");
        let digest = Sha256::digest(source.as_bytes());
        let suffix: String = digest
            .iter()
            .take(4)
            .map(|b| format!("{b:02x}"))
            .collect();
        format!("{}-{suffix}", sanitize(base))
    } else {
        let base = Path::new(source)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "skill".to_owned());
        sanitize(&base)
    }
}

fn sanitize(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

async fn git_clone(url: &str, target: &Path) -> Result<(), String> {
    let probe = Command::new("git").arg("--version").output().await;
    if probe.is_err() {
        return Err("'git' command not found; install Git to learn from URLs.".to_owned());
    }

    let output = Command::new("git")
        .arg("clone")
        .arg("--depth")
        .arg("1")
        .arg(url)
        .arg(target)
        .output()
        .await
        .map_err(|e| format!("Failed to run git clone: {e}"))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(format!(
            "git clone failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ))
    }
}

async fn pip_install(skill_dir: &Path) -> Result<(), String> {
    let output = Command::new("python3")
        .args(["-m", "pip", "install", "-r", "requirements.txt"])
        .current_dir(skill_dir)
        .output()
        .await
        .map_err(|e| format!("failed to run pip: {e}"))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).trim().to_owned())
    }
}

fn copy_dir_filtered(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if COPY_IGNORE.contains(&name.to_string_lossy().as_ref()) {
            continue;
        }
        let from = entry.path();
        let to = dst.join(&name);
        if from.is_dir() {
            copy_dir_filtered(&from, &to)?;
        } else {
            std::fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

fn rollback(target: &Path) {
    if target.exists() {
        if let Err(e) = std::fs::remove_dir_all(target) {
            tracing::warn!(dir = %target.display(), error = %e, "rollback failed");
        }
    }
}
