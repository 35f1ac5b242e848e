//! Skill packages: self-contained capability directories discovered on
//! disk, activated just-in-time, and executed out of process.
//!
//! A skill directory holds a `SKILL.md` (fenced key/value header + SOP
//! body), an optional `tools.json` schema list, an optional executable
//! entrypoint, and an optional `requirements.txt` manifest. Only headers
//! stay resident; SOPs load on activation.

pub mod header;
pub mod learn;
pub mod migrate;
pub mod registry;
pub mod runner;

pub use header::SkillHeader;
pub use migrate::LegacyScript;
pub use registry::{SkillEntry, SkillRegistry};
