//! Integration Test: Production Code Hygiene
//!
//! **Policy**:
//! - No sleep-based waiting. Poll with `tokio::time::interval` or wait on
//!   channels and timeouts instead.
//! - No `.unwrap()` / `.expect()` outside tests. Errors propagate with `?`.
//!
//! Test modules and test files are exempt.

use architectural_enforcement::{production_lines, rust_files, violation};

const PRODUCTION_TREES: &[&str] = &["command-server/core/src", "command-server/host/src"];

#[test]
fn test_no_sleep_in_production_code() {
    let mut violations = Vec::new();

    for tree in PRODUCTION_TREES {
        for path in rust_files(tree) {
            for line in production_lines(&path) {
                if line.code.contains("thread::sleep") || line.code.contains("time::sleep") {
                    violations.push(violation(&path, &line, "Sleep call"));
                }
            }
        }
    }

    report(&violations, "sleep");
}

#[test]
fn test_no_unwrap_in_production_code() {
    let mut violations = Vec::new();

    for tree in PRODUCTION_TREES {
        for path in rust_files(tree) {
            for line in production_lines(&path) {
                if line.code.contains(".unwrap()") || line.code.contains(".expect(") {
                    violations.push(violation(&path, &line, "Panicking shortcut"));
                }
            }
        }
    }

    report(&violations, "unwrap/expect");
}

fn report(violations: &[String], rule: &str) {
    if violations.is_empty() {
        return;
    }

    eprintln!("\n❌ {rule} found in production code!\n");
    for v in violations {
        eprintln!("  ❌ {v}");
    }

    panic!(
        "\nFound {} {rule} violation(s) in production code.\nFix these before merging!",
        violations.len()
    );
}
