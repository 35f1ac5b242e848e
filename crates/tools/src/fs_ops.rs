//! Filesystem inspection tools: tree listing, keyword search, file read.

use std::path::Path;

use rh_domain::CancelToken;

/// Directory names skipped by listing and search.
const IGNORE_DIRS: &[&str] = &[
    ".git",
    ".idea",
    ".vscode",
    "__pycache__",
    "node_modules",
    "venv",
    "target",
    ".obsidian",
];

/// Extensions treated as binary/media and skipped by the tree listing.
const IGNORE_EXTS: &[&str] = &[
    "exe", "dll", "so", "dylib", "class", "pyc", "png", "jpg", "jpeg", "zip", "tar", "gz",
];

/// Extensions the keyword scan considers text.
const TEXT_EXTS: &[&str] = &[
    "md", "txt", "py", "rs", "json", "yaml", "yml", "toml", "csv", "log", "xml", "html", "css",
    "js", "ts", "sh",
];

/// Extensions `read_file_content` declines outright.
const BINARY_READ_EXTS: &[&str] = &["exe", "dll", "png", "jpg", "jpeg", "zip", "pdf", "docx"];

/// Cap on entries rendered by the tree listing.
const MAX_TREE_ENTRIES: usize = 150;

/// Cap on files scanned by the keyword search.
const MAX_SCANNED_FILES: usize = 50;

/// Cap on bytes returned by `read_file_content`.
const MAX_READ_BYTES: usize = 50 * 1024;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tree listing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Render a directory tree, directories first, ignoring VCS/cache/media
/// entries, capped at 150 files.
pub fn list_directory_files(path: &str, recursive: bool, depth: usize) -> String {
    let root = Path::new(path);
    if !root.exists() {
        return format!("Error: Directory '{path}' does not exist.");
    }
    if !root.is_dir() {
        return format!("Error: '{path}' is not a directory.");
    }

    let mut lines = vec![format!("{path}/")];
    let mut file_count = 0usize;
    build_tree(root, recursive, depth, 0, "", &mut lines, &mut file_count);

    if lines.len() <= 1 {
        return format!("Directory '{path}' is empty or contains only ignored items.");
    }
    lines.join("\n")
}

fn build_tree(
    dir: &Path,
    recursive: bool,
    max_depth: usize,
    depth: usize,
    prefix: &str,
    lines: &mut Vec<String>,
    file_count: &mut usize,
) {
    if depth > max_depth {
        return;
    }

    let mut entries: Vec<std::fs::DirEntry> = match std::fs::read_dir(dir) {
        Ok(read) => read.flatten().collect(),
        Err(e) => {
            lines.push(format!("{prefix}[Permission denied: {e}]"));
            return;
        }
    };
    // Directories first, then files, case-insensitive within each group.
    entries.sort_by_key(|e| {
        (
            !e.path().is_dir(),
            e.file_name().to_string_lossy().to_lowercase(),
        )
    });

    let visible: Vec<&std::fs::DirEntry> = entries
        .iter()
        .filter(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            let path = e.path();
            if path.is_dir() {
                !IGNORE_DIRS.contains(&name.as_str())
            } else {
                !has_extension(&path, IGNORE_EXTS)
            }
        })
        .collect();

    for (i, entry) in visible.iter().enumerate() {
        if *file_count >= MAX_TREE_ENTRIES {
            lines.push(format!("{prefix}... [output truncated at {MAX_TREE_ENTRIES} entries]"));
            return;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let path = entry.path();
        let is_last = i == visible.len() - 1;
        let connector = if is_last { "└── " } else { "├── " };

        if path.is_dir() {
            lines.push(format!("{prefix}{connector}{name}/"));
            if recursive && depth < max_depth {
                let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
                build_tree(
                    &path,
                    recursive,
                    max_depth,
                    depth + 1,
                    &child_prefix,
                    lines,
                    file_count,
                );
            }
        } else {
            lines.push(format!("{prefix}{connector}{name}"));
            *file_count += 1;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Keyword search
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Case-insensitive substring scan over up to 50 text files under `path`.
/// The cancel token is checked between files.
pub fn search_files_by_keyword(path: &str, keyword: &str, cancel: &CancelToken) -> String {
    let root = Path::new(path);
    if !root.exists() {
        return format!("Error: Path '{path}' not found.");
    }

    let needle = keyword.to_lowercase();
    let mut found = Vec::new();
    let mut scanned = 0usize;
    let mut stack = vec![root.to_path_buf()];

    'walk: while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(e) => e,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            if cancel.is_cancelled() {
                return "[System]: Search was interrupted by user.".to_owned();
            }
            let entry_path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();

            if entry_path.is_dir() {
                if !IGNORE_DIRS.contains(&name.as_str()) {
                    stack.push(entry_path);
                }
                continue;
            }
            if !has_extension(&entry_path, TEXT_EXTS) {
                continue;
            }
            if scanned >= MAX_SCANNED_FILES {
                break 'walk;
            }
            scanned += 1;

            if let Ok(content) = std::fs::read_to_string(&entry_path) {
                if content.to_lowercase().contains(&needle) {
                    found.push(entry_path.display().to_string());
                }
            }
        }
    }

    if found.is_empty() {
        return format!("{path}: No files found containing '{keyword}' (scanned {scanned} files).");
    }

    let mut result = format!("Found '{keyword}' in the following files:\n");
    for file in &found {
        result.push_str(&format!("- {file}\n"));
    }
    result.push_str("\n(Use 'read_file_content' to inspect specific files from this list.)");
    result
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// File read
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Read a text file, capped at 50 KB. Binary extensions are declined
/// with a warning; undecodable bytes fall back to lossy UTF-8.
pub fn read_file_content(path: &str) -> String {
    let file = Path::new(path);
    if !file.exists() {
        return format!("Error: File '{path}' does not exist.");
    }
    if has_extension(file, BINARY_READ_EXTS) {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_owned());
        return format!(
            "[System Warning]: File '{name}' appears to be binary or requires special parsing. \
             Reading raw text is skipped."
        );
    }

    let bytes = match std::fs::read(file) {
        Ok(b) => b,
        Err(e) => return format!("Error reading file: {e}"),
    };
    let total = bytes.len();
    let truncated = total > MAX_READ_BYTES;
    let slice = if truncated { &bytes[..MAX_READ_BYTES] } else { &bytes[..] };

    let mut content = String::from_utf8_lossy(slice).into_owned();
    if truncated {
        content.push_str(&format!(
            "\n\n[System Warning]: File content truncated (size: {total} bytes). \
             Read first {MAX_READ_BYTES} bytes."
        ));
    }
    content
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("readme.md"), "# hello\nalpha keyword here\n").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "nothing relevant").unwrap();
        std::fs::create_dir_all(tmp.path().join("src")).unwrap();
        std::fs::write(tmp.path().join("src").join("main.rs"), "fn main() {}\n").unwrap();
        std::fs::create_dir_all(tmp.path().join(".git")).unwrap();
        std::fs::write(tmp.path().join(".git").join("HEAD"), "ref").unwrap();
        std::fs::write(tmp.path().join("image.png"), [0x89u8, 0x50]).unwrap();
        tmp
    }

    #[test]
    fn tree_lists_files_and_skips_ignored() {
        let tmp = fixture();
        let out = list_directory_files(tmp.path().to_str().unwrap(), true, 2);
        assert!(out.contains("readme.md"));
        assert!(out.contains("src/"));
        assert!(out.contains("main.rs"));
        assert!(!out.contains(".git"));
        assert!(!out.contains("image.png"));
    }

    #[test]
    fn tree_depth_limits_recursion() {
        let tmp = fixture();
        let out = list_directory_files(tmp.path().to_str().unwrap(), true, 0);
        assert!(out.contains("src/"));
        assert!(!out.contains("main.rs"));
    }

    #[test]
    fn tree_missing_path_is_an_error_string() {
        let out = list_directory_files("/no/such/dir", true, 2);
        assert!(out.starts_with("Error:"));
    }

    #[test]
    fn search_finds_case_insensitive_matches() {
        let tmp = fixture();
        let out = search_files_by_keyword(
            tmp.path().to_str().unwrap(),
            "ALPHA",
            &CancelToken::new(),
        );
        assert!(out.contains("readme.md"));
        assert!(!out.contains("notes.txt"));
    }

    #[test]
    fn search_reports_no_matches_with_scan_count() {
        let tmp = fixture();
        let out = search_files_by_keyword(
            tmp.path().to_str().unwrap(),
            "zzz-not-there",
            &CancelToken::new(),
        );
        assert!(out.contains("No files found"));
    }

    #[test]
    fn search_respects_cancel() {
        let tmp = fixture();
        let cancel = CancelToken::new();
        cancel.cancel();
        let out = search_files_by_keyword(tmp.path().to_str().unwrap(), "alpha", &cancel);
        assert!(out.contains("interrupted"));
    }

    #[test]
    fn read_returns_content() {
        let tmp = fixture();
        let out = read_file_content(tmp.path().join("readme.md").to_str().unwrap());
        assert!(out.contains("# hello"));
    }

    #[test]
    fn read_declines_binary_extensions() {
        let tmp = fixture();
        let out = read_file_content(tmp.path().join("image.png").to_str().unwrap());
        assert!(out.contains("[System Warning]"));
    }

    #[test]
    fn read_truncates_large_files() {
        let tmp = tempfile::tempdir().unwrap();
        let big = "x".repeat(MAX_READ_BYTES + 100);
        std::fs::write(tmp.path().join("big.log"), &big).unwrap();
        let out = read_file_content(tmp.path().join("big.log").to_str().unwrap());
        assert!(out.contains("truncated"));
        assert!(out.len() < big.len() + 200);
    }

    #[test]
    fn read_missing_file_is_an_error_string() {
        assert!(read_file_content("/no/such/file.txt").starts_with("Error:"));
    }
}
