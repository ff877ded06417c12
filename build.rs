use std::path::{Path, PathBuf};
use std::process::Command;

const CHECKED_EXTENSIONS: &[&str] = &["rs"];

const EXCLUDED_DIRS: &[&str] = &["target", ".git", "examples"];

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/main");
    println!("cargo:rerun-if-changed=.git/packed-refs");

    let sha = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                String::from_utf8(output.stdout)
                    .ok()
                    .map(|s| s.trim().to_string())
            } else {
                None
            }
        })
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=EXPENSE_TRACKER_GIT_SHA={}", sha);

    let root = PathBuf::from(
        std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR must be set"),
    );
    let mut files = Vec::new();
    walk_directory(&root.join("src"), &root, &mut files);

    enforce_no_dead_code_allows(&root, &files);
    enforce_serial_for_env_mutations(&root, &files);
}

fn walk_directory(dir: &Path, root: &Path, files: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let path = entry.path();

        if path.is_dir() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if EXCLUDED_DIRS.contains(&name) {
                    continue;
                }
            }
            walk_directory(&path, root, files);
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| CHECKED_EXTENSIONS.contains(&ext))
        {
            println!("cargo:rerun-if-changed={}", path.display());
            files.push(path);
        }
    }
}

fn report(title: &str, hint: &[&str], root: &Path, violations: &[(PathBuf, usize, String)]) {
    eprintln!("\n========================================");
    eprintln!("{}", title);
    eprintln!("========================================");
    for (path, line_num, msg) in violations {
        let rel = path.strip_prefix(root).unwrap_or(path);
        eprintln!("  {}:{}", rel.display(), line_num);
        eprintln!("    {}", msg.trim());
    }
    eprintln!("========================================");
    for line in hint {
        eprintln!("{}", line);
    }
    eprintln!("========================================\n");
}

fn enforce_no_dead_code_allows(root: &Path, files: &[PathBuf]) {
    let mut violations = Vec::new();

    for file in files {
        if let Ok(content) = std::fs::read_to_string(file) {
            for (line_num, line) in content.lines().enumerate() {
                let trimmed = line.trim();
                if (trimmed.starts_with("#[allow(") || trimmed.starts_with("#![allow("))
                    && trimmed.contains("dead_code")
                {
                    violations.push((file.clone(), line_num + 1, line.to_string()));
                }
            }
        }
    }

    if !violations.is_empty() {
        report(
            "#[allow(dead_code)] IS NOT ALLOWED",
            &[
                "DELETE unused code entirely.",
                "If the code is for tests, use #[cfg(test)].",
            ],
            root,
            &violations,
        );
        panic!(
            "Build failed: {} #[allow(dead_code)] occurrence(s) found.",
            violations.len()
        );
    }
}

/// Environment variables are process-global; tests that touch them must not
/// run in parallel with each other.
fn enforce_serial_for_env_mutations(root: &Path, files: &[PathBuf]) {
    let mut violations = Vec::new();

    for file in files {
        let Ok(content) = std::fs::read_to_string(file) else {
            continue;
        };
        let lines: Vec<&str> = content.lines().collect();

        let mut in_test_fn = false;
        let mut test_fn_start = 0;
        let mut has_serial = false;
        let mut brace_depth = 0i32;

        for (i, line) in lines.iter().enumerate() {
            let trimmed = line.trim();

            if trimmed == "#[serial]" || trimmed == "#[serial_test::serial]" {
                has_serial = true;
            }

            if trimmed == "#[test]" || trimmed.starts_with("#[tokio::test") {
                in_test_fn = true;
                test_fn_start = i + 1;
                brace_depth = 0;
            }

            if in_test_fn {
                for c in line.chars() {
                    if c == '{' {
                        brace_depth += 1;
                    } else if c == '}' {
                        brace_depth -= 1;
                        if brace_depth == 0 {
                            in_test_fn = false;
                            has_serial = false;
                        }
                    }
                }

                if !has_serial
                    && !trimmed.starts_with("//")
                    && (trimmed.contains("env::set_var") || trimmed.contains("env::remove_var"))
                {
                    violations.push((
                        file.clone(),
                        test_fn_start,
                        "test mutates env without #[serial]".to_string(),
                    ));
                    in_test_fn = false;
                    has_serial = false;
                }
            }
        }
    }

    if !violations.is_empty() {
        report(
            "ENV MUTATIONS REQUIRE #[serial]",
            &["Add `use serial_test::serial;` and mark the test with #[serial]."],
            root,
            &violations,
        );
        panic!(
            "Build failed: {} test(s) mutate env vars without #[serial].",
            violations.len()
        );
    }
}
