//! Structural tests for architectural boundary enforcement.
//!
//! These tests scan source files to verify that the Clean Architecture
//! boundaries hold: domain and application never reach outward, and
//! concrete adapters are only wired up at the edges.

use std::path::Path;

/// Collect all `.rs` files under a directory recursively.
fn collect_rs_files(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                files.extend(collect_rs_files(&path));
            } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
                files.push(path);
            }
        }
    }
    files
}

/// Read a file and strip comment lines to avoid false positives.
fn read_non_comment_lines(path: &Path) -> Vec<String> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    content
        .lines()
        .filter(|l| {
            let trimmed = l.trim();
            !trimmed.starts_with("//") && !trimmed.starts_with("/*") && !trimmed.starts_with('*')
        })
        .map(String::from)
        .collect()
}

/// Track brace depth and return whether a line is inside a `#[cfg(test)]` block.
struct CfgTestTracker {
    in_test_block: bool,
    brace_depth: i32,
    test_block_start_depth: i32,
}

impl CfgTestTracker {
    fn new() -> Self {
        Self {
            in_test_block: false,
            brace_depth: 0,
            test_block_start_depth: 0,
        }
    }

    /// Process a line and return `true` if it's inside a `#[cfg(test)]` block.
    fn process_line(&mut self, line: &str) -> bool {
        let trimmed = line.trim();
        if trimmed.contains("#[cfg(test)]") {
            self.in_test_block = true;
            self.test_block_start_depth = self.brace_depth;
        }
        for ch in line.chars() {
            match ch {
                '{' => self.brace_depth += 1,
                '}' => {
                    self.brace_depth -= 1;
                    if self.in_test_block && self.brace_depth <= self.test_block_start_depth {
                        self.in_test_block = false;
                    }
                }
                _ => {}
            }
        }
        self.in_test_block
    }
}

fn rel(file: &Path) -> String {
    file.strip_prefix(env!("CARGO_MANIFEST_DIR"))
        .unwrap_or(file)
        .display()
        .to_string()
        .replace('\\', "/")
}

fn src_dir(parts: &[&str]) -> std::path::PathBuf {
    let mut dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
    for p in parts {
        dir = dir.join(p);
    }
    dir
}

/// Every non-comment line under `dir` containing one of `needles`.
fn find_imports(dir: &Path, needles: &[&str]) -> Vec<String> {
    let mut violations = Vec::new();
    for file in collect_rs_files(dir) {
        let rel = rel(&file);
        for (i, line) in read_non_comment_lines(&file).iter().enumerate() {
            if needles.iter().any(|n| line.contains(n)) {
                violations.push(format!("{rel}:{}: {line}", i + 1));
            }
        }
    }
    violations
}

// ── Layer boundaries ──────────────────────────────────────────────────────────

#[test]
fn domain_has_no_outer_layer_imports() {
    let violations = find_imports(
        &src_dir(&["domain"]),
        &[
            "crate::application",
            "crate::infra",
            "crate::commands",
            "crate::output",
            "tokio::",
            "std::process",
        ],
    );
    assert!(
        violations.is_empty(),
        "domain/ must stay pure:\n{}",
        violations.join("\n")
    );
}

#[test]
fn application_has_no_infra_commands_or_output_imports() {
    let violations = find_imports(
        &src_dir(&["application"]),
        &["crate::infra", "crate::commands", "crate::output"],
    );
    assert!(
        violations.is_empty(),
        "application/ must only depend on domain/ and its own ports:\n{}",
        violations.join("\n")
    );
}

#[test]
fn infra_has_no_imports_from_commands_or_output() {
    let violations = find_imports(&src_dir(&["infra"]), &["crate::commands", "crate::output"]);
    assert!(
        violations.is_empty(),
        "infra/ must not import from commands/ or output/:\n{}",
        violations.join("\n")
    );
}

#[test]
fn infra_has_no_print_macros_outside_tests() {
    let mut violations: Vec<String> = Vec::new();

    for file in collect_rs_files(&src_dir(&["infra"])) {
        let rel = rel(&file);
        let Ok(content) = std::fs::read_to_string(&file) else {
            continue;
        };

        let mut tracker = CfgTestTracker::new();
        for (i, line) in content.lines().enumerate() {
            let in_test = tracker.process_line(line);
            let trimmed = line.trim();
            if in_test || trimmed.starts_with("//") {
                continue;
            }
            if line.contains("println!") || line.contains("eprintln!") {
                violations.push(format!(
                    "{rel}:{}: print macro in infra/ outside #[cfg(test)]: {line}",
                    i + 1
                ));
            }
        }
    }

    assert!(
        violations.is_empty(),
        "infra/ must not use println!/eprintln! outside #[cfg(test)]:\n{}",
        violations.join("\n")
    );
}

// ── Adapters are wired at the edges ───────────────────────────────────────────

#[test]
fn command_runner_is_only_built_by_infra_and_the_provider_kit() {
    let mut violations: Vec<String> = Vec::new();

    for file in collect_rs_files(&src_dir(&[])) {
        let rel = rel(&file);
        if rel.contains("/infra/") || rel.ends_with("commands/provider.rs") {
            continue;
        }
        for (i, line) in read_non_comment_lines(&file).iter().enumerate() {
            if line.contains("TokioCommandRunner::") {
                violations.push(format!("{rel}:{}: {line}", i + 1));
            }
        }
    }

    assert!(
        violations.is_empty(),
        "TokioCommandRunner constructed outside infra/ or commands/provider.rs:\n{}",
        violations.join("\n")
    );
}

#[test]
fn services_take_ports_not_concrete_adapters() {
    let concrete_types = [
        "TokioCommandRunner",
        "GcloudCli",
        "VastClient",
        "SshClient",
        "TunnelManager",
        "HttpModelEndpoint",
        "LedgerWallet",
        "StripeBilling",
        "StubCompliance",
        "SignalJournal",
        "FileAgentRegistry",
    ];

    let mut violations: Vec<String> = Vec::new();
    for file in collect_rs_files(&src_dir(&["application", "services"])) {
        let rel = rel(&file);
        for (i, line) in read_non_comment_lines(&file).iter().enumerate() {
            for concrete in &concrete_types {
                if line.contains(concrete) {
                    violations.push(format!(
                        "{rel}:{}: concrete adapter `{concrete}` in a service: {line}",
                        i + 1
                    ));
                }
            }
        }
    }

    assert!(
        violations.is_empty(),
        "Found concrete adapters in application/services, use the port traits instead:\n{}",
        violations.join("\n")
    );
}

// ── Command handlers ──────────────────────────────────────────────────────────

/// Handlers that need configuration or adapters receive `&AppContext` rather
/// than building their own.
#[test]
fn command_handlers_do_not_load_config_themselves() {
    let violations = find_imports(
        &src_dir(&["commands"]),
        &["YamlConfigStore", "load_credentials("],
    );
    assert!(
        violations.is_empty(),
        "commands/ must take configuration from AppContext:\n{}",
        violations.join("\n")
    );
}
