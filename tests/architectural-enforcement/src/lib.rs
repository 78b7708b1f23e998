//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles:
//! - No blocking I/O on the async protocol path
//! - No sleep-based waiting in production code
//! - No panicking shortcuts in production code
//!
//! The helpers here walk the workspace sources and strip what the rules do
//! not apply to: comments and `#[cfg(test)]` modules.

use std::fs;
use std::path::{Path, PathBuf};

/// Root of the workspace
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .canonicalize()
        .unwrap_or_else(|_| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../.."))
}

/// All `.rs` files under a workspace-relative directory
///
/// Panics if the directory is missing so a moved crate cannot silently
/// disable a rule.
#[must_use]
pub fn rust_files(relative: &str) -> Vec<PathBuf> {
    let dir = workspace_root().join(relative);
    assert!(dir.is_dir(), "source directory {} not found", dir.display());

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(&dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();
    files
}

/// A line of production code
#[derive(Debug, Clone)]
pub struct CodeLine {
    /// 1-based line number
    pub number: usize,
    /// The line with any trailing `//` comment removed
    pub code: String,
}

/// Production lines of a source file
///
/// Drops comment lines, trailing comments, and everything from the first
/// test-only gate onwards (test modules sit at the end of each file).
#[must_use]
pub fn production_lines(path: &Path) -> Vec<CodeLine> {
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };

    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| !is_test_gate(line.trim()))
        .filter_map(|(idx, line)| {
            let code = line.split("//").next().unwrap_or(line);
            if code.trim().is_empty() {
                None
            } else {
                Some(CodeLine {
                    number: idx + 1,
                    code: code.to_string(),
                })
            }
        })
        .collect()
}

fn is_test_gate(line: &str) -> bool {
    line.starts_with("#[cfg(test") || line.starts_with("#[cfg(all(test")
}

/// Format a violation for the failure report
#[must_use]
pub fn violation(path: &Path, line: &CodeLine, what: &str) -> String {
    let shown = path
        .strip_prefix(workspace_root())
        .unwrap_or(path)
        .display()
        .to_string();
    format!("{shown}:{} - {what}: {}", line.number, line.code.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_tests() {
        let dir = tempfile_dir();
        let file = dir.join("sample.rs");
        fs::write(
            &file,
            "// header\nfn a() {}\n\nlet x = 1; // note\n#[cfg(test)]\nmod tests { fn t() {} }\n",
        )
        .unwrap();

        let lines = production_lines(&file);
        let numbers: Vec<usize> = lines.iter().map(|l| l.number).collect();
        assert_eq!(numbers, vec![2, 4]);
        assert_eq!(lines[1].code.trim(), "let x = 1;");

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_workspace_root_has_manifest() {
        assert!(workspace_root().join("Cargo.toml").is_file());
    }

    fn tempfile_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("arch-enforcement-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }
}
