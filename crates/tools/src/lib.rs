//! Native tool implementations: shell execution, filesystem inspection,
//! and web fetching.
//!
//! Every function returns a plain string. Failures come back as textual
//! results prefixed `[Error]` or `[System]` so the model can read them
//! and adapt; only the surrounding transport treats anything as fatal.
//! Long-running work checks its cancel token between slices.

pub mod exec;
pub mod fs_ops;
pub mod web;

pub use exec::execute_shell;
pub use fs_ops::{list_directory_files, read_file_content, search_files_by_keyword};
pub use web::browse_url;
