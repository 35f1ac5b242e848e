//! Tool dispatcher: publishes the callable tool set and routes
//! invocations.
//!
//! Dispatch is keyed by tool name with a typed argument decoder per
//! tool. Unknown names and undecodable arguments come back as textual
//! validation errors, never as crashes; the model reads them and
//! adapts.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use rh_domain::{CancelToken, ToolCallRequest, ToolDefinition};
use rh_retrieval::RecordMetadata;
use rh_sentinel::{SentinelKind, TimeUnit};

use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Manifest
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The tool set currently callable from `session`: the fixed native set,
/// the active skill's tools (deduplicated by name), a legacy-script
/// wrapper while unmigrated entries remain, and sentinel management.
pub fn manifest(state: &AppState, session: &str) -> Vec<ToolDefinition> {
    let mut defs = native_tools();

    if let Some(skill) = state.active_skills.get(session) {
        if let Ok((_sop, Some(tools))) = state.skills.load_context(&skill) {
            for tool in tools {
                if !defs.iter().any(|d| d.name == tool.name) {
                    defs.push(tool);
                }
            }
        }
    }

    if !state.config.snapshot().scripts.is_empty() {
        defs.push(legacy_wrapper_tool());
    }

    defs.extend(sentinel_tools());
    defs
}

fn obj_schema(properties: Value, required: &[&str]) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn native_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "manage_skills".into(),
            description: "Manage skill activation. Actions: 'list_available' to see all skills, \
                          'activate' to focus one skill and load its SOP and tools, \
                          'deactivate_all' to return to general mode."
                .into(),
            parameters: obj_schema(
                serde_json::json!({
                    "action": {
                        "type": "string",
                        "enum": ["list_available", "activate", "deactivate_all"],
                        "description": "What to do"
                    },
                    "skill_name": {
                        "type": "string",
                        "description": "Skill to activate (required for 'activate')"
                    }
                }),
                &["action"],
            ),
        },
        ToolDefinition {
            name: "learn_new_skill".into(),
            description: "Learn a new skill from a git repository URL or a local directory path."
                .into(),
            parameters: obj_schema(
                serde_json::json!({
                    "url_or_path": {
                        "type": "string",
                        "description": "Repository URL (https) or absolute local path"
                    }
                }),
                &["url_or_path"],
            ),
        },
        ToolDefinition {
            name: "browse_url".into(),
            description: "Fetch a web page and return its title plus readable text (scripts and \
                          navigation stripped, up to 8000 chars)."
                .into(),
            parameters: obj_schema(
                serde_json::json!({
                    "url": { "type": "string", "description": "URL to fetch" }
                }),
                &["url"],
            ),
        },
        ToolDefinition {
            name: "list_directory_files".into(),
            description: "List a directory as a tree. Ignores VCS/cache/media entries; caps at \
                          150 entries."
                .into(),
            parameters: obj_schema(
                serde_json::json!({
                    "path": { "type": "string", "description": "Absolute directory path" },
                    "recursive": { "type": "boolean", "description": "Recurse into subdirectories (default true)" },
                    "depth": { "type": "integer", "description": "Recursion depth limit (default 2)" }
                }),
                &["path"],
            ),
        },
        ToolDefinition {
            name: "search_files_by_keyword".into(),
            description: "Case-insensitive substring search over up to 50 text files under a path."
                .into(),
            parameters: obj_schema(
                serde_json::json!({
                    "path": { "type": "string", "description": "Directory to search" },
                    "keyword": { "type": "string", "description": "Substring to look for" }
                }),
                &["path", "keyword"],
            ),
        },
        ToolDefinition {
            name: "read_file_content".into(),
            description: "Read a text file (up to 50 KB). Binary extensions are declined.".into(),
            parameters: obj_schema(
                serde_json::json!({
                    "path": { "type": "string", "description": "File path to read" }
                }),
                &["path"],
            ),
        },
        ToolDefinition {
            name: "execute_shell_command".into(),
            description: "Run a shell command (120 s cap). Returns combined stdout/stderr.".into(),
            parameters: obj_schema(
                serde_json::json!({
                    "command": { "type": "string", "description": "Shell command to execute" }
                }),
                &["command"],
            ),
        },
        ToolDefinition {
            name: "remember_user_fact".into(),
            description: "Store a durable fact about the user in their profile.".into(),
            parameters: obj_schema(
                serde_json::json!({
                    "key": { "type": "string", "description": "Fact name (e.g. 'editor')" },
                    "value": { "type": "string", "description": "Fact value" }
                }),
                &["key", "value"],
            ),
        },
        ToolDefinition {
            name: "search_long_term_memory".into(),
            description: "Query long-term vector memory for relevant stored facts.".into(),
            parameters: obj_schema(
                serde_json::json!({
                    "query": { "type": "string", "description": "What to look for" }
                }),
                &["query"],
            ),
        },
        ToolDefinition {
            name: "add_long_term_memory".into(),
            description: "Save an important finding to long-term memory. Near-duplicates are \
                          rejected."
                .into(),
            parameters: obj_schema(
                serde_json::json!({
                    "text": { "type": "string", "description": "Fact to store" },
                    "tag": { "type": "string", "description": "Category tag (default 'user_fact')" }
                }),
                &["text"],
            ),
        },
        ToolDefinition {
            name: "delete_long_term_memory".into(),
            description: "Delete one long-term memory record by id.".into(),
            parameters: obj_schema(
                serde_json::json!({
                    "memory_id": { "type": "string", "description": "Record id to delete" }
                }),
                &["memory_id"],
            ),
        },
    ]
}

fn sentinel_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "add_time_sentinel".into(),
            description: "Create a periodic trigger that wakes the host every interval.".into(),
            parameters: obj_schema(
                serde_json::json!({
                    "interval": { "type": "integer", "description": "Interval count" },
                    "unit": {
                        "type": "string",
                        "enum": ["seconds", "minutes", "hours", "days"],
                        "description": "Interval unit"
                    },
                    "description": { "type": "string", "description": "What to do when it fires" }
                }),
                &["interval", "unit", "description"],
            ),
        },
        ToolDefinition {
            name: "add_file_sentinel".into(),
            description: "Watch a file or directory; changes wake the host.".into(),
            parameters: obj_schema(
                serde_json::json!({
                    "path": { "type": "string", "description": "Existing file or directory to watch" },
                    "description": { "type": "string", "description": "Why it is watched" }
                }),
                &["path", "description"],
            ),
        },
        ToolDefinition {
            name: "add_behavior_sentinel".into(),
            description: "Register a global hotkey; pressing it wakes the host.".into(),
            parameters: obj_schema(
                serde_json::json!({
                    "key_combo": { "type": "string", "description": "Hotkey combo, e.g. 'ctrl+alt+r'" },
                    "description": { "type": "string", "description": "What the hotkey means" }
                }),
                &["key_combo", "description"],
            ),
        },
        ToolDefinition {
            name: "list_active_sentinels".into(),
            description: "List every registered sentinel by kind and id.".into(),
            parameters: obj_schema(serde_json::json!({}), &[]),
        },
        ToolDefinition {
            name: "remove_sentinel".into(),
            description: "Remove a sentinel by kind ('time' | 'file' | 'behavior') and id.".into(),
            parameters: obj_schema(
                serde_json::json!({
                    "kind": { "type": "string", "description": "Sentinel kind" },
                    "id": { "type": "string", "description": "Sentinel id" }
                }),
                &["kind", "id"],
            ),
        },
    ]
}

fn legacy_wrapper_tool() -> ToolDefinition {
    ToolDefinition {
        name: "invoke_legacy_script".into(),
        description: "Run a script registered in the legacy configuration.".into(),
        parameters: obj_schema(
            serde_json::json!({
                "alias": { "type": "string", "description": "Registered script alias" },
                "args": { "type": "string", "description": "Extra command-line arguments" }
            }),
            &["alias"],
        ),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Argument decoding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parse the raw streamed argument text. Malformed JSON degrades to an
/// empty object; the typed decoder then reports the missing fields.
fn parse_raw_args(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "tool arguments are not valid JSON; using empty object");
            Value::Object(Default::default())
        }
    }
}

fn decode<T: DeserializeOwned>(tool: &str, args: &Value) -> Result<T, String> {
    serde_json::from_value(args.clone())
        .map_err(|e| format!("[Error]: Invalid arguments for '{tool}': {e}"))
}

#[derive(Deserialize)]
struct ManageSkillsArgs {
    action: String,
    #[serde(default)]
    skill_name: Option<String>,
}

#[derive(Deserialize)]
struct LearnSkillArgs {
    url_or_path: String,
}

#[derive(Deserialize)]
struct BrowseArgs {
    url: String,
}

#[derive(Deserialize)]
struct ListDirArgs {
    path: String,
    #[serde(default = "default_recursive")]
    recursive: bool,
    #[serde(default = "default_depth")]
    depth: usize,
}

fn default_recursive() -> bool {
    true
}
fn default_depth() -> usize {
    2
}

#[derive(Deserialize)]
struct SearchFilesArgs {
    path: String,
    keyword: String,
}

#[derive(Deserialize)]
struct ReadFileArgs {
    path: String,
}

#[derive(Deserialize)]
struct ShellArgs {
    command: String,
}

#[derive(Deserialize)]
struct RememberArgs {
    key: String,
    value: String,
}

#[derive(Deserialize)]
struct MemorySearchArgs {
    query: String,
}

#[derive(Deserialize)]
struct MemoryAddArgs {
    text: String,
    #[serde(default)]
    tag: Option<String>,
}

#[derive(Deserialize)]
struct MemoryDeleteArgs {
    memory_id: String,
}

#[derive(Deserialize)]
struct TimeSentinelArgs {
    interval: u64,
    unit: String,
    description: String,
}

#[derive(Deserialize)]
struct FileSentinelArgs {
    path: String,
    description: String,
}

#[derive(Deserialize)]
struct BehaviorSentinelArgs {
    key_combo: String,
    description: String,
}

#[derive(Deserialize)]
struct RemoveSentinelArgs {
    kind: String,
    id: String,
}

#[derive(Deserialize)]
struct LegacyScriptArgs {
    alias: String,
    #[serde(default)]
    args: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Route one tool invocation. Always returns a textual result.
pub async fn dispatch(
    state: &AppState,
    session: &str,
    call: &ToolCallRequest,
    cancel: &CancelToken,
) -> String {
    if cancel.is_cancelled() {
        return "[System]: Tool execution cancelled.".to_owned();
    }

    let args = parse_raw_args(&call.arguments);
    match call.name.as_str() {
        "manage_skills" => match decode::<ManageSkillsArgs>("manage_skills", &args) {
            Ok(a) => manage_skills(state, session, a),
            Err(e) => e,
        },
        "learn_new_skill" => match decode::<LearnSkillArgs>("learn_new_skill", &args) {
            Ok(a) => {
                let (ok, message) = state.skills.learn(&a.url_or_path).await;
                if ok {
                    message
                } else {
                    format!("[Error]: {message}")
                }
            }
            Err(e) => e,
        },
        "browse_url" => match decode::<BrowseArgs>("browse_url", &args) {
            Ok(a) => match rh_tools::browse_url(&a.url).await {
                Ok(page) => page,
                Err(e) => format!("[Error]: Network error: {e}"),
            },
            Err(e) => e,
        },
        "list_directory_files" => match decode::<ListDirArgs>("list_directory_files", &args) {
            Ok(a) => rh_tools::list_directory_files(&a.path, a.recursive, a.depth),
            Err(e) => e,
        },
        "search_files_by_keyword" => {
            match decode::<SearchFilesArgs>("search_files_by_keyword", &args) {
                Ok(a) => rh_tools::search_files_by_keyword(&a.path, &a.keyword, cancel),
                Err(e) => e,
            }
        }
        "read_file_content" => match decode::<ReadFileArgs>("read_file_content", &args) {
            Ok(a) => rh_tools::read_file_content(&a.path),
            Err(e) => e,
        },
        "execute_shell_command" => match decode::<ShellArgs>("execute_shell_command", &args) {
            Ok(a) => {
                rh_tools::execute_shell(&a.command, None, rh_tools::exec::SHELL_TIMEOUT, cancel)
                    .await
            }
            Err(e) => e,
        },
        "remember_user_fact" => match decode::<RememberArgs>("remember_user_fact", &args) {
            Ok(a) => match state.config.set_user_fact(&a.key, &a.value) {
                Ok(()) => format!("Remembered: {} = {}", a.key, a.value),
                Err(e) => format!("[Error]: Failed to update user profile: {e}"),
            },
            Err(e) => e,
        },
        "search_long_term_memory" => {
            match decode::<MemorySearchArgs>("search_long_term_memory", &args) {
                Ok(a) => {
                    let config = state.config.snapshot();
                    let hits = state
                        .retrieval
                        .search(
                            &a.query,
                            config.system.memory.retrieve_top_k,
                            config.system.memory.rag_strategy,
                        )
                        .await;
                    if hits.is_empty() {
                        "No relevant memories found.".to_owned()
                    } else {
                        hits.iter()
                            .map(|h| format!("- {h}"))
                            .collect::<Vec<_>>()
                            .join("\n")
                    }
                }
                Err(e) => e,
            }
        }
        "add_long_term_memory" => match decode::<MemoryAddArgs>("add_long_term_memory", &args) {
            Ok(a) => add_memory(state, a).await,
            Err(e) => e,
        },
        "delete_long_term_memory" => {
            match decode::<MemoryDeleteArgs>("delete_long_term_memory", &args) {
                Ok(a) => match state.retrieval.delete(&a.memory_id) {
                    Ok(true) => format!("Memory '{}' deleted.", a.memory_id),
                    Ok(false) => format!("No memory with id '{}'.", a.memory_id),
                    Err(e) => format!("[Error]: Failed to delete memory: {e}"),
                },
                Err(e) => e,
            }
        }
        "add_time_sentinel" => match decode::<TimeSentinelArgs>("add_time_sentinel", &args) {
            Ok(a) => match a.unit.parse::<TimeUnit>() {
                Ok(unit) => match state.sentinels.add_time(a.interval, unit, &a.description) {
                    Ok(id) => format!("Time sentinel '{id}' registered ({} {}).", a.interval, a.unit),
                    Err(e) => format!("[Error]: {e}"),
                },
                Err(e) => format!("[Error]: {e}"),
            },
            Err(e) => e,
        },
        "add_file_sentinel" => match decode::<FileSentinelArgs>("add_file_sentinel", &args) {
            Ok(a) => match state.sentinels.add_file(&a.path, &a.description) {
                Ok(id) => format!("File sentinel '{id}' registered on {}.", a.path),
                Err(e) => format!("[Error]: {e}"),
            },
            Err(e) => e,
        },
        "add_behavior_sentinel" => {
            match decode::<BehaviorSentinelArgs>("add_behavior_sentinel", &args) {
                Ok(a) => match state.sentinels.add_hotkey(&a.key_combo, &a.description) {
                    Ok(id) => format!("Behavior sentinel '{id}' registered on '{}'.", a.key_combo),
                    Err(e) => format!("[Error]: {e}"),
                },
                Err(e) => e,
            }
        }
        "list_active_sentinels" => {
            let doc = state.sentinels.list();
            if doc.is_empty() {
                "No sentinels registered.".to_owned()
            } else {
                serde_json::to_string_pretty(&doc)
                    .unwrap_or_else(|e| format!("[Error]: Failed to render sentinels: {e}"))
            }
        }
        "remove_sentinel" => match decode::<RemoveSentinelArgs>("remove_sentinel", &args) {
            Ok(a) => match a.kind.parse::<SentinelKind>() {
                Ok(kind) => {
                    if state.sentinels.remove(kind, &a.id) {
                        format!("Sentinel '{}' removed.", a.id)
                    } else {
                        format!("No {} sentinel with id '{}'.", a.kind, a.id)
                    }
                }
                Err(e) => format!("[Error]: {e}"),
            },
            Err(e) => e,
        },
        "invoke_legacy_script" => match decode::<LegacyScriptArgs>("invoke_legacy_script", &args) {
            Ok(a) => invoke_legacy_script(state, a, cancel).await,
            Err(e) => e,
        },
        other => dispatch_skill_tool(state, session, other, &args, cancel).await,
    }
}

fn manage_skills(state: &AppState, session: &str, args: ManageSkillsArgs) -> String {
    match args.action.as_str() {
        "list_available" => {
            let index = state.skills.index();
            if index.is_empty() {
                "No skills installed. Use 'learn_new_skill' to add one.".to_owned()
            } else {
                index
                    .iter()
                    .map(|(name, desc)| format!("- {name}: {desc}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        "activate" => {
            let Some(name) = args.skill_name else {
                return "[Error]: 'activate' requires skill_name.".to_owned();
            };
            match state.skills.load_context(&name) {
                Ok(_) => {
                    state.active_skills.activate(session, &name);
                    format!(
                        "SUCCESS: Skill '{name}' activated. SOP instructions loaded. \
                         Exclusive tools are now visible."
                    )
                }
                Err(e) => format!("[Error]: Skill '{name}' not found or failed to load: {e}"),
            }
        }
        "deactivate_all" => match state.active_skills.deactivate(session) {
            Some(prev) => format!("Skill '{prev}' deactivated. Returned to general mode."),
            None => "No skill was active.".to_owned(),
        },
        other => format!("[Error]: Unknown manage_skills action '{other}'."),
    }
}

async fn add_memory(state: &AppState, args: MemoryAddArgs) -> String {
    // Dedup gate: refuse near-identical facts.
    let similarity = state.retrieval.similarity(&args.text).await;
    if similarity > 0.9 {
        return format!(
            "A very similar memory already exists (similarity {similarity:.2}); not stored."
        );
    }
    let kind = args.tag.unwrap_or_else(|| "user_fact".to_owned());
    match state
        .retrieval
        .add(&args.text, RecordMetadata::new(kind))
        .await
    {
        Ok(id) => format!("Memory stored (id {id})."),
        Err(e) => format!("[Error]: Failed to store memory: {e}"),
    }
}

async fn invoke_legacy_script(
    state: &AppState,
    args: LegacyScriptArgs,
    cancel: &CancelToken,
) -> String {
    let config = state.config.snapshot();
    let Some(script) = config.scripts.get(&args.alias) else {
        return format!("Error: Script '{}' not found in configuration.", args.alias);
    };

    let mut command = script.command.clone();
    if let Some(extra) = &args.args {
        if !extra.is_empty() {
            command.push(' ');
            command.push_str(extra);
        }
    }
    let timeout = std::time::Duration::from_secs(script.timeout.unwrap_or(120));
    let cwd = script.cwd.as_ref().map(std::path::PathBuf::from);
    rh_tools::execute_shell(&command, cwd.as_deref(), timeout, cancel).await
}

async fn dispatch_skill_tool(
    state: &AppState,
    session: &str,
    tool_name: &str,
    args: &Value,
    cancel: &CancelToken,
) -> String {
    if let Some(skill) = state.active_skills.get(session) {
        let declares = state
            .skills
            .load_context(&skill)
            .ok()
            .and_then(|(_, tools)| tools)
            .is_some_and(|tools| tools.iter().any(|t| t.name == tool_name));
        if declares {
            return state.skills.execute(&skill, tool_name, args, cancel).await;
        }
    }
    format!("Error: Unknown tool '{tool_name}'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testutil::test_state;

    fn call(name: &str, arguments: &str) -> ToolCallRequest {
        ToolCallRequest {
            call_id: "c1".into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    fn install_skill_with_tools(state: &AppState) {
        let dir = state.skills.root().join("pdf-tools");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("SKILL.md"),
            "```\nname: pdf-tools\ndescription: PDF handling\nentrypoint: run.sh\n```\nSOP body\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("tools.json"),
            r#"[{"name":"split_pdf","description":"Split a PDF","parameters":{"type":"object","properties":{}}},
                {"name":"merge_pdf","description":"Merge PDFs","parameters":{"type":"object","properties":{}}}]"#,
        )
        .unwrap();
        std::fs::write(dir.join("run.sh"), "echo ran: \"$@\"\n").unwrap();
        state.skills.rescan();
    }

    #[tokio::test]
    async fn manifest_contains_native_and_sentinel_tools() {
        let (_tmp, state) = test_state().await;
        let names: Vec<String> = manifest(&state, "s1").into_iter().map(|d| d.name).collect();
        for expected in [
            "manage_skills",
            "learn_new_skill",
            "browse_url",
            "list_directory_files",
            "search_files_by_keyword",
            "read_file_content",
            "execute_shell_command",
            "remember_user_fact",
            "search_long_term_memory",
            "add_long_term_memory",
            "delete_long_term_memory",
            "add_time_sentinel",
            "add_file_sentinel",
            "add_behavior_sentinel",
            "list_active_sentinels",
            "remove_sentinel",
        ] {
            assert!(names.contains(&expected.to_owned()), "missing {expected}");
        }
        // No skill active, no legacy scripts: nothing else.
        assert!(!names.contains(&"split_pdf".to_owned()));
        assert!(!names.contains(&"invoke_legacy_script".to_owned()));
    }

    #[tokio::test]
    async fn activation_merges_skill_tools_and_deactivation_removes_them() {
        let (_tmp, state) = test_state().await;
        install_skill_with_tools(&state);

        let out = dispatch(
            &state,
            "s1",
            &call(
                "manage_skills",
                r#"{"action":"activate","skill_name":"pdf-tools"}"#,
            ),
            &CancelToken::new(),
        )
        .await;
        assert!(out.contains("SUCCESS"));

        let names: Vec<String> = manifest(&state, "s1").into_iter().map(|d| d.name).collect();
        assert!(names.contains(&"split_pdf".to_owned()));
        assert!(names.contains(&"merge_pdf".to_owned()));

        // Another session's manifest is unaffected.
        let other: Vec<String> = manifest(&state, "s2").into_iter().map(|d| d.name).collect();
        assert!(!other.contains(&"split_pdf".to_owned()));

        let out = dispatch(
            &state,
            "s1",
            &call("manage_skills", r#"{"action":"deactivate_all"}"#),
            &CancelToken::new(),
        )
        .await;
        assert!(out.contains("deactivated"));
        let names: Vec<String> = manifest(&state, "s1").into_iter().map(|d| d.name).collect();
        assert!(!names.contains(&"split_pdf".to_owned()));
        assert!(!names.contains(&"merge_pdf".to_owned()));
    }

    #[tokio::test]
    async fn skill_tool_routes_to_entrypoint_when_active() {
        let (_tmp, state) = test_state().await;
        install_skill_with_tools(&state);

        dispatch(
            &state,
            "s1",
            &call(
                "manage_skills",
                r#"{"action":"activate","skill_name":"pdf-tools"}"#,
            ),
            &CancelToken::new(),
        )
        .await;

        let out = dispatch(
            &state,
            "s1",
            &call("split_pdf", r#"{"file":"a.pdf"}"#),
            &CancelToken::new(),
        )
        .await;
        assert!(out.contains("ran:"), "entrypoint did not run: {out}");
        assert!(out.contains("split_pdf"));
    }

    #[tokio::test]
    async fn unknown_tool_is_a_validation_result() {
        let (_tmp, state) = test_state().await;
        let out = dispatch(&state, "s1", &call("warp_drive", "{}"), &CancelToken::new()).await;
        assert_eq!(out, "Error: Unknown tool 'warp_drive'");
    }

    #[tokio::test]
    async fn malformed_arguments_become_empty_then_fail_decoding() {
        let (_tmp, state) = test_state().await;
        let out = dispatch(
            &state,
            "s1",
            &call("read_file_content", "this is not json"),
            &CancelToken::new(),
        )
        .await;
        assert!(out.contains("Invalid arguments"));
    }

    #[tokio::test]
    async fn shell_tool_runs_commands() {
        let (_tmp, state) = test_state().await;
        let out = dispatch(
            &state,
            "s1",
            &call("execute_shell_command", r#"{"command":"echo dispatched"}"#),
            &CancelToken::new(),
        )
        .await;
        assert!(out.contains("dispatched"));
    }

    #[tokio::test]
    async fn memory_tools_round_trip() {
        let (_tmp, state) = test_state().await;
        let out = dispatch(
            &state,
            "s1",
            &call(
                "add_long_term_memory",
                r#"{"text":"the staging box is 10.1.2.3","tag":"infra"}"#,
            ),
            &CancelToken::new(),
        )
        .await;
        assert!(out.contains("Memory stored"));

        let out = dispatch(
            &state,
            "s1",
            &call("search_long_term_memory", r#"{"query":"staging box"}"#),
            &CancelToken::new(),
        )
        .await;
        assert!(out.contains("10.1.2.3"));

        // Exact duplicate is rejected by the dedup gate.
        let out = dispatch(
            &state,
            "s1",
            &call(
                "add_long_term_memory",
                r#"{"text":"the staging box is 10.1.2.3"}"#,
            ),
            &CancelToken::new(),
        )
        .await;
        assert!(out.contains("similar memory already exists"));
    }

    #[tokio::test]
    async fn sentinel_tools_manage_the_engine() {
        let (_tmp, state) = test_state().await;
        let out = dispatch(
            &state,
            "s1",
            &call(
                "add_time_sentinel",
                r#"{"interval":5,"unit":"minutes","description":"poll builds"}"#,
            ),
            &CancelToken::new(),
        )
        .await;
        assert!(out.contains("registered"));

        let listed = dispatch(
            &state,
            "s1",
            &call("list_active_sentinels", "{}"),
            &CancelToken::new(),
        )
        .await;
        assert!(listed.contains("poll builds"));

        let id = state.sentinels.list().time.keys().next().cloned().unwrap();
        let out = dispatch(
            &state,
            "s1",
            &call(
                "remove_sentinel",
                &format!(r#"{{"kind":"time","id":"{id}"}}"#),
            ),
            &CancelToken::new(),
        )
        .await;
        assert!(out.contains("removed"));
        assert!(state.sentinels.list().is_empty());
    }

    #[tokio::test]
    async fn remember_user_fact_updates_profile() {
        let (_tmp, state) = test_state().await;
        let out = dispatch(
            &state,
            "s1",
            &call("remember_user_fact", r#"{"key":"shell","value":"fish"}"#),
            &CancelToken::new(),
        )
        .await;
        assert!(out.contains("Remembered"));
        assert_eq!(
            state.config.user_profile().user_info.get("shell").unwrap(),
            "fish"
        );
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let (_tmp, state) = test_state().await;
        let cancel = CancelToken::new();
        cancel.cancel();
        let out = dispatch(
            &state,
            "s1",
            &call("execute_shell_command", r#"{"command":"echo nope"}"#),
            &cancel,
        )
        .await;
        assert!(out.contains("cancelled"));
    }
}
