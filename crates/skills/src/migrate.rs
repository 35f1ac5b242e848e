//! One-shot migration of legacy "scripts" config entries into skill
//! directories. Runs at startup and must be idempotent: a second startup
//! with no legacy entries is a no-op.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use rh_domain::error::{Error, Result};

/// A legacy script entry from the old `scripts` config section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyScript {
    pub command: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// Rewrite each legacy script into a generated skill directory under
/// `root`: a SKILL.md describing the wrapped command, a tools.json with a
/// single `run` tool, and a `run.sh` entrypoint that execs the command.
///
/// Existing directories are left untouched, so re-running is safe.
/// Returns the aliases that were migrated this run.
pub fn migrate_legacy_scripts(
    root: &Path,
    scripts: &HashMap<String, LegacyScript>,
) -> Result<Vec<String>> {
    let mut migrated = Vec::new();

    for (alias, script) in scripts {
        let dir = root.join(alias);
        if dir.exists() {
            tracing::debug!(alias, "legacy script already migrated, skipping");
            continue;
        }
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;

        let description = script
            .description
            .clone()
            .unwrap_or_else(|| format!("Legacy script wrapper for `{}`", script.command));

        let skill_md = format!(
            "```\nname: {alias}\ndescription: {description}\nentrypoint: run.sh\n```\n\
             # {alias}\n\n\
             This skill wraps the legacy command:\n\n\
             ```sh\n{command}\n```\n\n\
             Invoke the `run` tool with an optional `args` string; it is\n\
             appended to the command line verbatim.\n",
            command = script.command,
        );
        std::fs::write(dir.join("SKILL.md"), skill_md).map_err(Error::Io)?;

        let tools = serde_json::json!([{
            "name": format!("run_{alias}"),
            "description": format!("Run the legacy '{alias}' command. {description}"),
            "parameters": {
                "type": "object",
                "properties": {
                    "args": {
                        "type": "string",
                        "description": "Extra command-line arguments"
                    }
                }
            }
        }]);
        std::fs::write(
            dir.join("tools.json"),
            serde_json::to_string_pretty(&tools)?,
        )
        .map_err(Error::Io)?;

        // The entrypoint receives `--tool <name> [--args <extra>]`; strip
        // the flags and exec the wrapped command.
        let run_sh = format!(
            "#!/bin/sh\n\
             extra=\"\"\n\
             while [ $# -gt 0 ]; do\n\
             \tcase \"$1\" in\n\
             \t\t--args) extra=\"$2\"; shift 2 ;;\n\
             \t\t--*) shift 2 ;;\n\
             \t\t*) shift ;;\n\
             \tesac\n\
             done\n\
             exec {command} $extra\n",
            command = script.command,
        );
        std::fs::write(dir.join("run.sh"), run_sh).map_err(Error::Io)?;

        migrated.push(alias.clone());
    }

    if !migrated.is_empty() {
        tracing::info!(count = migrated.len(), "migrated legacy scripts into skills");
    }
    Ok(migrated)
}
