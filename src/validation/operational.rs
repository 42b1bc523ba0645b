//! C13 — Operational Validator.
//!
//! Same report shape as C12 (spec §4.13): dependency checks against a
//! manifest + standard-library allowlist, a fail-fast sandbox syntax pass,
//! and a simple cross-file symbol-resolution check for first-party imports.

use std::collections::{HashMap, HashSet};

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::validation::{syntax_hook, ValidationHookRegistry, ValidationInput};

#[derive(Debug, Clone, Serialize)]
pub struct OperationalReport {
    pub passed: bool,
    pub issues: Vec<String>,
    pub check_results: HashMap<String, bool>,
    pub summary: HashMap<String, Value>,
}

fn python_stdlib() -> HashSet<&'static str> {
    [
        "os", "sys", "json", "re", "math", "typing", "collections", "itertools", "functools", "pathlib",
        "datetime", "asyncio", "logging", "unittest", "abc", "enum", "dataclasses", "io", "time", "random",
        "subprocess", "shutil", "hashlib", "uuid", "copy", "traceback", "threading", "socket", "argparse",
    ]
    .into_iter()
    .collect()
}

fn rust_stdlib() -> HashSet<&'static str> {
    ["std", "core", "alloc"].into_iter().collect()
}

fn language_for(path: &str) -> &'static str {
    if path.ends_with(".py") {
        "python"
    } else if path.ends_with(".rs") {
        "rust"
    } else {
        "unknown"
    }
}

struct ImportRef {
    module: String,
    names: Vec<String>,
    first_party: bool,
}

fn extract_imports(content: &str, language: &str) -> Vec<ImportRef> {
    let mut imports = Vec::new();
    match language {
        "python" => {
            let import_re = Regex::new(r"^\s*import\s+([A-Za-z0-9_]+)").unwrap();
            let from_re = Regex::new(r"^\s*from\s+(\.*)([A-Za-z0-9_]*)\s+import\s+(.+)$").unwrap();
            for line in content.lines() {
                if let Some(caps) = import_re.captures(line) {
                    imports.push(ImportRef {
                        module: caps[1].to_string(),
                        names: Vec::new(),
                        first_party: false,
                    });
                } else if let Some(caps) = from_re.captures(line) {
                    let relative = !caps[1].is_empty();
                    let names = caps[3].split(',').map(|n| n.trim().to_string()).collect();
                    imports.push(ImportRef {
                        module: caps[2].to_string(),
                        names,
                        first_party: relative,
                    });
                }
            }
        }
        "rust" => {
            let use_re = Regex::new(r"^\s*use\s+([A-Za-z0-9_]+)::(.+);").unwrap();
            for line in content.lines() {
                if let Some(caps) = use_re.captures(line) {
                    let head = caps[1].to_string();
                    let first_party = head == "crate" || head == "self" || head == "super";
                    let tail = caps[2].trim_end_matches(';');
                    let names = tail
                        .trim_start_matches('{')
                        .trim_end_matches('}')
                        .split(',')
                        .map(|n| n.trim().rsplit("::").next().unwrap_or(n).to_string())
                        .filter(|n| !n.is_empty())
                        .collect();
                    imports.push(ImportRef {
                        module: head,
                        names,
                        first_party,
                    });
                }
            }
        }
        _ => {}
    }
    imports
}

fn parse_manifest_packages(language: &str, manifest: &str) -> HashSet<String> {
    let mut packages = HashSet::new();
    match language {
        "python" => {
            for line in manifest.lines() {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    continue;
                }
                let name = trimmed
                    .split(|c: char| c == '=' || c == '<' || c == '>' || c == '[' || c == ';')
                    .next()
                    .unwrap_or(trimmed)
                    .trim();
                if !name.is_empty() {
                    packages.insert(name.to_string());
                }
            }
        }
        "rust" => {
            let mut in_deps = false;
            for line in manifest.lines() {
                let trimmed = line.trim();
                if trimmed.starts_with('[') {
                    in_deps = trimmed.starts_with("[dependencies");
                    continue;
                }
                if in_deps {
                    if let Some(name) = trimmed.split('=').next() {
                        let name = name.trim();
                        if !name.is_empty() {
                            packages.insert(name.to_string());
                        }
                    }
                }
            }
        }
        _ => {}
    }
    packages
}

pub struct OperationalValidator;

impl OperationalValidator {
    pub fn new() -> Self {
        Self
    }

    fn check_dependencies(&self, modified_files: &HashMap<String, String>, manifests: &HashMap<String, String>) -> Vec<String> {
        let mut issues = Vec::new();
        let python_packages = manifests.get("python").map(|m| parse_manifest_packages("python", m)).unwrap_or_default();
        let rust_packages = manifests.get("rust").map(|m| parse_manifest_packages("rust", m)).unwrap_or_default();
        let python_std = python_stdlib();
        let rust_std = rust_stdlib();

        for (path, content) in modified_files {
            let language = language_for(path);
            if language == "unknown" {
                continue;
            }
            for import in extract_imports(content, language) {
                if import.first_party || import.module.is_empty() {
                    continue;
                }
                let known = match language {
                    "python" => python_std.contains(import.module.as_str()) || python_packages.contains(&import.module),
                    "rust" => rust_std.contains(import.module.as_str()) || rust_packages.contains(&import.module),
                    _ => true,
                };
                if !known {
                    issues.push(format!("{path}: undeclared dependency '{}'", import.module));
                }
            }
        }
        issues
    }

    /// Fails fast: stops at the first file whose syntax hook fails.
    fn check_sandbox_syntax(&self, modified_files: &HashMap<String, String>) -> (HashMap<String, bool>, Vec<String>) {
        let mut results = HashMap::new();
        let mut issues = Vec::new();
        let mut paths: Vec<&String> = modified_files.keys().collect();
        paths.sort();

        for path in paths {
            let content = &modified_files[path];
            let language = language_for(path);
            if language == "unknown" {
                results.insert(path.clone(), true);
                continue;
            }
            let mut hooks = ValidationHookRegistry::new();
            hooks.register(syntax_hook("sandbox-syntax", 10, language));
            let hook_results = hooks.run_validation_hooks(&ValidationInput::Text(content), None);
            let passed = crate::validation::all_pass(&hook_results);
            results.insert(path.clone(), passed);
            if !passed {
                issues.push(format!("{path}: sandbox syntax check failed"));
                break;
            }
        }
        (results, issues)
    }

    /// Every first-party imported name must be defined somewhere in
    /// `all_project_files` (a crude substring/name-presence check, standing
    /// in for real AST symbol resolution).
    fn check_integration(&self, modified_files: &HashMap<String, String>, all_project_files: &HashMap<String, String>) -> Vec<String> {
        let mut issues = Vec::new();
        for (path, content) in modified_files {
            let language = language_for(path);
            if language == "unknown" {
                continue;
            }
            for import in extract_imports(content, language) {
                if !import.first_party {
                    continue;
                }
                for name in &import.names {
                    if name == "*" || name.is_empty() {
                        continue;
                    }
                    let defined = all_project_files.values().chain(modified_files.values()).any(|file_content| {
                        file_content.contains(&format!("def {name}"))
                            || file_content.contains(&format!("class {name}"))
                            || file_content.contains(&format!("fn {name}"))
                            || file_content.contains(&format!("struct {name}"))
                    });
                    if !defined {
                        issues.push(format!("{path}: imported name '{name}' not defined in any first-party module"));
                    }
                }
            }
        }
        issues
    }

    pub fn validate(
        &self,
        modified_files: &HashMap<String, String>,
        manifests: &HashMap<String, String>,
        all_project_files: &HashMap<String, String>,
    ) -> OperationalReport {
        let mut issues = self.check_dependencies(modified_files, manifests);
        let (sandbox_results, mut sandbox_issues) = self.check_sandbox_syntax(modified_files);
        issues.append(&mut sandbox_issues);
        issues.extend(self.check_integration(modified_files, all_project_files));

        let passed = issues.is_empty();
        let mut summary = HashMap::new();
        summary.insert("files_checked".to_string(), Value::from(modified_files.len()));
        summary.insert("issue_count".to_string(), Value::from(issues.len()));

        OperationalReport {
            passed,
            issues,
            check_results: sandbox_results,
            summary,
        }
    }
}

impl Default for OperationalValidator {
    fn default() -> Self {
        Self::new()
    }
}
