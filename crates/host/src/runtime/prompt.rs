//! System prompt assembly: identity protocol, mission anchor, user
//! profile, JIT skill context, retrieved memories, and the running
//! summary.

use crate::config::UserProfile;

/// Fixed operating protocol, ahead of every dynamic section.
const BASE_IDENTITY: &str = r#"You are Resonance, an advanced local AI Host.

### CORE OPERATING PROTOCOLS (MUST FOLLOW):

1.  **PLAN FIRST (MANDATORY)**:
    For ANY task that is not a simple greeting, you MUST start your response with a structured plan block using the `<plan>` XML tag.

    Format:
    <plan>
    - [ ] Step 1: Description
    - [ ] Step 2: Description (Deliverable: filename.ext)
    </plan>

    *Update this plan in subsequent turns by marking items as [x].*

2.  **DELIVERABLE AWARENESS**:
    Know exactly what files or results you need to produce. Do not stop until the final deliverable is created and verified.

3.  **TOOL USAGE**:
    - Use `list_directory_files` before reading/writing to understand the path.
    - Use `read_file_content` to check content before editing.
    - If a tool fails, analyze the error and try a different approach.

4.  **ACTIVE MEMORY**:
    You have access to a long-term vector memory.
    - Query it with `search_long_term_memory` if context is missing.
    - SAVE important findings with `add_long_term_memory`.
    - DELETE obsolete facts with `delete_long_term_memory`.

5.  **SKILLS**:
    - To use a specialized capability, call `manage_skills` to ACTIVATE it first.
    - Once active, follow the SOP RIGIDLY.

Tool use is bounded per turn. Use calls wisely; if the limit is reached you will get a chance to reflect and continue.
"#;

/// Dynamic inputs gathered at the start of each loop iteration.
pub struct PromptInputs<'a> {
    pub user_profile: &'a UserProfile,
    /// `(name, description)` pairs shown in Discovery mode.
    pub skill_index: &'a [(String, String)],
    /// `(name, sop)` of the activated skill, replacing the index.
    pub active_skill: Option<(&'a str, &'a str)>,
    pub memories: &'a [String],
    pub summary: &'a str,
    /// The verbatim original user request.
    pub mission_anchor: &'a str,
}

pub fn build_system_prompt(inputs: &PromptInputs) -> String {
    let mut prompt = String::from(BASE_IDENTITY);

    if !inputs.mission_anchor.is_empty() {
        prompt.push_str(&format!(
            "\n### CURRENT MISSION ANCHOR\nUser's Original Request: \"{}\"\n\
             (Align all actions to complete this specific request. Do not get distracted.)\n",
            inputs.mission_anchor
        ));
    }

    prompt.push_str("\n### USER PROFILE\n");
    for (key, value) in sorted(&inputs.user_profile.user_info) {
        prompt.push_str(&format!("- {key}: {value}\n"));
    }
    if !inputs.user_profile.known_projects.is_empty() {
        prompt.push_str("- Known Projects:\n");
        for (project, path) in sorted(&inputs.user_profile.known_projects) {
            prompt.push_str(&format!("  * {project}: {path}\n"));
        }
    }

    match inputs.active_skill {
        Some((name, sop)) => {
            prompt.push_str(&format!(
                "\n### ACTIVE SKILL: {name}\n{sop}\nFOLLOW THIS SOP RIGIDLY.\n"
            ));
        }
        None => {
            prompt.push_str("\n### AVAILABLE SKILLS\n");
            if inputs.skill_index.is_empty() {
                prompt.push_str("(none installed)\n");
            } else {
                for (name, description) in inputs.skill_index {
                    prompt.push_str(&format!("- {name}: {description}\n"));
                }
            }
            prompt.push_str("(Use 'manage_skills' to activate one if needed)\n");
        }
    }

    if !inputs.memories.is_empty() {
        prompt.push_str("\n### Long-term Memories (Reference Only)\n");
        for memory in inputs.memories {
            prompt.push_str(&format!("- {memory}\n"));
        }
        prompt.push_str("(Use these ONLY if they help the *current* original intent.)\n");
    }

    if !inputs.summary.is_empty() {
        prompt.push_str(&format!(
            "\n### PREVIOUS CONVERSATION SUMMARY\n{}\n",
            inputs.summary
        ));
    }

    prompt
}

fn sorted(map: &std::collections::HashMap<String, String>) -> Vec<(&String, &String)> {
    let mut pairs: Vec<_> = map.iter().collect();
    pairs.sort_by_key(|(k, _)| k.as_str());
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_inputs<'a>(profile: &'a UserProfile, index: &'a [(String, String)]) -> PromptInputs<'a> {
        PromptInputs {
            user_profile: profile,
            skill_index: index,
            active_skill: None,
            memories: &[],
            summary: "",
            mission_anchor: "list my projects",
        }
    }

    #[test]
    fn discovery_mode_lists_skill_index() {
        let profile = UserProfile::default();
        let index = vec![("pdf-tools".to_owned(), "PDF handling".to_owned())];
        let prompt = build_system_prompt(&base_inputs(&profile, &index));
        assert!(prompt.contains("AVAILABLE SKILLS"));
        assert!(prompt.contains("- pdf-tools: PDF handling"));
        assert!(prompt.contains("manage_skills"));
    }

    #[test]
    fn active_skill_replaces_index_with_sop() {
        let profile = UserProfile::default();
        let index = vec![("pdf-tools".to_owned(), "PDF handling".to_owned())];
        let mut inputs = base_inputs(&profile, &index);
        inputs.active_skill = Some(("pdf-tools", "Step 1: check page counts"));

        let prompt = build_system_prompt(&inputs);
        assert!(prompt.contains("ACTIVE SKILL: pdf-tools"));
        assert!(prompt.contains("Step 1: check page counts"));
        assert!(!prompt.contains("AVAILABLE SKILLS"));
    }

    #[test]
    fn mission_anchor_quotes_the_request() {
        let profile = UserProfile::default();
        let prompt = build_system_prompt(&base_inputs(&profile, &[]));
        assert!(prompt.contains("MISSION ANCHOR"));
        assert!(prompt.contains("\"list my projects\""));
    }

    #[test]
    fn profile_memories_and_summary_sections() {
        let mut profile = UserProfile::default();
        profile.user_info.insert("name".into(), "Sam".into());
        profile
            .known_projects
            .insert("resonance".into(), "/opt/resonance".into());

        let memories = vec!["Sam prefers tabs".to_owned()];
        let mut inputs = base_inputs(&profile, &[]);
        inputs.memories = &memories;
        inputs.summary = "Earlier we set up the dev box.";

        let prompt = build_system_prompt(&inputs);
        assert!(prompt.contains("- name: Sam"));
        assert!(prompt.contains("* resonance: /opt/resonance"));
        assert!(prompt.contains("Sam prefers tabs"));
        assert!(prompt.contains("PREVIOUS CONVERSATION SUMMARY"));
        assert!(prompt.contains("dev box"));
    }
}
