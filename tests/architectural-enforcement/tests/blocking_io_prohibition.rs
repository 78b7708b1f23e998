//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Code on the async protocol path (engine, client, mailboxes,
//! executor, editor commands) MUST NOT use blocking I/O.
//! **Required**: `tokio::fs` instead of `std::fs`; no `std::net`.
//!
//! Blocking I/O is acceptable at activation time (directory guard, config
//! loading, PID files), which runs before or outside the invocation path.

use architectural_enforcement::{production_lines, rust_files, violation};

/// Source trees on the async protocol path
const ASYNC_PATHS: &[&str] = &[
    "command-server/core/src/engine.rs",
    "command-server/core/src/client.rs",
    "command-server/core/src/transport/fs_mailbox.rs",
    "command-server/core/src/transport/in_memory.rs",
    "command-server/core/src/transport/frame.rs",
    "command-server/core/src/executor",
    "command-server/core/src/editor",
];

#[test]
fn test_no_blocking_io_on_protocol_path() {
    let violations = find_blocking_io_violations();

    if !violations.is_empty() {
        eprintln!("\n❌ Blocking I/O found on the async protocol path!\n");
        for v in &violations {
            eprintln!("  ❌ {v}");
        }
        eprintln!("\n✅ REQUIRED: tokio::fs::read().await, tokio::fs::write().await");
        eprintln!("✅ ACCEPTABLE: activation-time code (guard, config, PID files), tests");

        panic!(
            "\nFound {} blocking I/O violation(s).\nFix these before merging!",
            violations.len()
        );
    }
}

fn find_blocking_io_violations() -> Vec<String> {
    let mut violations = Vec::new();

    for relative in ASYNC_PATHS {
        for path in files_at(relative) {
            for line in production_lines(&path) {
                if line.code.contains("std::fs") {
                    violations.push(violation(&path, &line, "Blocking file I/O"));
                }
                if line.code.contains("std::net") {
                    violations.push(violation(&path, &line, "Blocking network I/O"));
                }
                if line.code.contains("std::io::stdin()") {
                    violations.push(violation(&path, &line, "Blocking stdin"));
                }
            }
        }
    }

    violations
}

fn files_at(relative: &str) -> Vec<std::path::PathBuf> {
    if relative.ends_with(".rs") {
        let path = architectural_enforcement::workspace_root().join(relative);
        assert!(path.is_file(), "{} not found", path.display());
        vec![path]
    } else {
        rust_files(relative)
    }
}
