//! C9 — Architectural Context Engine.
//!
//! Infers a system type from task text via keyword matching, derives a
//! default architecture pattern, synthesizes modules and placement rules,
//! and injects mandatory constraints (spec §4.9). Keyword tables and the
//! "never mix frontend and backend code in the same file" constraint are
//! carried forward from spec.md §8 scenario 5.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemType {
    FullstackWebApp,
    ApiService,
    CliTool,
    Library,
    DesktopApp,
    Unknown,
}

impl std::fmt::Display for SystemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SystemType::FullstackWebApp => "fullstack_web_app",
            SystemType::ApiService => "api_service",
            SystemType::CliTool => "cli_tool",
            SystemType::Library => "library",
            SystemType::DesktopApp => "desktop_app",
            SystemType::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub boundary_type: String,
    pub languages: Vec<String>,
    pub responsibilities: Vec<String>,
    pub folder_structure: Vec<String>,
    pub base_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchitecturalContext {
    pub system_type: SystemType,
    pub architecture_pattern: String,
    pub modules: HashMap<String, Module>,
    /// role tag -> base path.
    pub file_organization_rules: HashMap<String, String>,
    pub constraints: Vec<String>,
    pub integration_patterns: Vec<String>,
}

/// Detects a system type from the combined task + original-idea text via
/// keyword matching (spec §4.9 step 1). Order matters: the first matching
/// category wins.
pub fn detect_system_type(combined_text: &str) -> SystemType {
    let text = combined_text.to_lowercase();

    const FULLSTACK_TOKENS: &[&str] = &[
        "web app", "frontend", "backend", "react", "fastapi", "flask", "express", "vue", "angular",
    ];
    const CLI_TOKENS: &[&str] = &["cli", "command line", "script", "terminal"];
    const API_TOKENS: &[&str] = &["api", "rest", "endpoint", "microservice"];
    const LIBRARY_TOKENS: &[&str] = &["library", "package", "module"];
    const DESKTOP_TOKENS: &[&str] = &["desktop", "gui", "electron", "tauri", "tkinter"];

    if FULLSTACK_TOKENS.iter().any(|t| text.contains(t)) {
        SystemType::FullstackWebApp
    } else if CLI_TOKENS.iter().any(|t| text.contains(t)) {
        SystemType::CliTool
    } else if API_TOKENS.iter().any(|t| text.contains(t)) {
        SystemType::ApiService
    } else if LIBRARY_TOKENS.iter().any(|t| text.contains(t)) {
        SystemType::Library
    } else if DESKTOP_TOKENS.iter().any(|t| text.contains(t)) {
        SystemType::DesktopApp
    } else {
        SystemType::Unknown
    }
}

fn pattern_for(system_type: SystemType) -> &'static str {
    match system_type {
        SystemType::FullstackWebApp => "fullstack_layered",
        SystemType::CliTool => "single_binary_cli",
        SystemType::ApiService => "rest_api_service",
        SystemType::Library => "modular_library",
        SystemType::DesktopApp => "desktop_mvc",
        // Spec §4.9 step 1: unmatched text falls back to the web_app pattern.
        SystemType::Unknown => "web_app",
    }
}

fn synthesize_modules(system_type: SystemType) -> HashMap<String, Module> {
    let mut modules = HashMap::new();
    match system_type {
        SystemType::FullstackWebApp => {
            modules.insert(
                "frontend".to_string(),
                Module {
                    boundary_type: "ui_layer".to_string(),
                    languages: vec!["javascript".to_string(), "jsx".to_string()],
                    responsibilities: vec!["presentation".to_string(), "client state".to_string()],
                    folder_structure: vec!["src/components".to_string(), "src/pages".to_string(), "src/hooks".to_string()],
                    base_path: "frontend".to_string(),
                },
            );
            modules.insert(
                "backend".to_string(),
                Module {
                    boundary_type: "api_layer".to_string(),
                    languages: vec!["python".to_string()],
                    responsibilities: vec!["business logic".to_string(), "persistence".to_string()],
                    folder_structure: vec!["api".to_string(), "services".to_string(), "models".to_string()],
                    base_path: "backend".to_string(),
                },
            );
        }
        SystemType::CliTool => {
            modules.insert(
                "cli".to_string(),
                Module {
                    boundary_type: "entry_layer".to_string(),
                    languages: vec!["rust".to_string()],
                    responsibilities: vec!["argument parsing".to_string(), "command dispatch".to_string()],
                    folder_structure: vec!["src".to_string()],
                    base_path: "src".to_string(),
                },
            );
        }
        SystemType::ApiService => {
            modules.insert(
                "api".to_string(),
                Module {
                    boundary_type: "api_layer".to_string(),
                    languages: vec!["rust".to_string()],
                    responsibilities: vec!["routing".to_string(), "request handling".to_string()],
                    folder_structure: vec!["src".to_string()],
                    base_path: "src".to_string(),
                },
            );
        }
        SystemType::Library => {
            modules.insert(
                "lib".to_string(),
                Module {
                    boundary_type: "public_api".to_string(),
                    languages: vec!["rust".to_string()],
                    responsibilities: vec!["public surface".to_string()],
                    folder_structure: vec!["src".to_string()],
                    base_path: "src".to_string(),
                },
            );
        }
        SystemType::DesktopApp => {
            modules.insert(
                "app".to_string(),
                Module {
                    boundary_type: "ui_layer".to_string(),
                    languages: vec!["rust".to_string()],
                    responsibilities: vec!["UI".to_string(), "event handling".to_string()],
                    folder_structure: vec!["src".to_string()],
                    base_path: "src".to_string(),
                },
            );
        }
        SystemType::Unknown => {
            modules.insert(
                "app".to_string(),
                Module {
                    boundary_type: "app_layer".to_string(),
                    languages: vec!["rust".to_string()],
                    responsibilities: vec!["general".to_string()],
                    folder_structure: vec![".".to_string()],
                    base_path: ".".to_string(),
                },
            );
        }
    }
    modules
}

fn file_organization_rules(system_type: SystemType, modules: &HashMap<String, Module>) -> HashMap<String, String> {
    let mut rules = HashMap::new();
    match system_type {
        SystemType::FullstackWebApp => {
            rules.insert("ui_components".to_string(), "frontend/src/components".to_string());
            rules.insert("api_routes".to_string(), "backend/api".to_string());
            rules.insert("business_logic".to_string(), "backend/services".to_string());
            rules.insert("data_models".to_string(), "backend/models".to_string());
        }
        _ => {
            // No fullstack split: every role maps onto the single synthesized
            // module's base path.
            if let Some(module) = modules.values().next() {
                for role in ["ui_components", "api_routes", "business_logic", "data_models"] {
                    rules.insert(role.to_string(), module.base_path.clone());
                }
            }
        }
    }
    rules
}

fn mandatory_constraints(system_type: SystemType) -> Vec<String> {
    match system_type {
        SystemType::FullstackWebApp => vec!["never mix frontend and backend code in the same file".to_string()],
        SystemType::CliTool => vec!["keep argument parsing separate from business logic".to_string()],
        SystemType::ApiService => vec!["keep route handlers thin, delegate to a service layer".to_string()],
        SystemType::Library => vec!["expose a stable public API surface, keep internals private".to_string()],
        SystemType::DesktopApp => vec!["separate UI event handlers from application logic".to_string()],
        SystemType::Unknown => vec![],
    }
}

/// Produces an Architectural Context from task + original-idea text (spec
/// §4.9 steps 1-5). `existing_constraints` are appended to, not replaced.
pub fn analyze(task: &str, original_idea: &str, existing_constraints: &[String]) -> ArchitecturalContext {
    let combined = format!("{task} {original_idea}");
    let system_type = detect_system_type(&combined);
    let modules = synthesize_modules(system_type);
    let file_organization_rules = file_organization_rules(system_type, &modules);

    let mut constraints = existing_constraints.to_vec();
    constraints.extend(mandatory_constraints(system_type));

    ArchitecturalContext {
        system_type,
        architecture_pattern: pattern_for(system_type).to_string(),
        modules,
        file_organization_rules,
        constraints,
        integration_patterns: Vec::new(),
    }
}

/// Deterministic fallback used when analysis cannot run at all (e.g. the
/// caller failed to enumerate the project) — spec §4.9 last paragraph.
pub fn fallback_context() -> ArchitecturalContext {
    analyze("", "", &[])
}

const ROLE_KEYWORDS: &[(&str, &[&str])] = &[
    ("ui_components", &["component", "ui", "frontend", "view", "button", "page"]),
    ("api_routes", &["route", "endpoint", "api"]),
    ("business_logic", &["service", "logic", "business"]),
    ("data_models", &["model", "schema", "entity"]),
];

fn detect_role(what: &str) -> Option<&'static str> {
    let lower = what.to_lowercase();
    ROLE_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(role, _)| *role)
}

/// Matches a plan step's intent (`what`) against file-organization rules; if
/// `file` doesn't already live under the matched rule's base path, returns
/// the rewritten path and an architectural note describing the original
/// (spec §4.9 last paragraph / §4.10 step 6).
pub fn resolve_placement(context: &ArchitecturalContext, what: &str, file: &str) -> Option<(String, String)> {
    let role = detect_role(what)?;
    let base_path = context.file_organization_rules.get(role)?;
    if base_path == "." || file.starts_with(base_path.as_str()) {
        return None;
    }
    let basename = file.rsplit('/').next().unwrap_or(file);
    let rewritten = format!("{base_path}/{basename}");
    let note = format!("moved from '{file}' to '{rewritten}' per {role} placement rule");
    Some((rewritten, note))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_fullstack_from_keywords() {
        assert_eq!(
            detect_system_type("create a web app with React frontend and FastAPI backend"),
            SystemType::FullstackWebApp
        );
    }

    #[test]
    fn detects_cli_tool() {
        assert_eq!(detect_system_type("build a command line tool"), SystemType::CliTool);
    }

    #[test]
    fn unmatched_text_is_unknown_with_web_app_pattern() {
        let context = analyze("do something vague", "", &[]);
        assert_eq!(context.system_type, SystemType::Unknown);
        assert_eq!(context.architecture_pattern, "web_app");
    }

    #[test]
    fn fullstack_synthesizes_two_modules_and_constraint() {
        let context = analyze("web app with React frontend and FastAPI backend", "", &[]);
        assert!(context.modules.contains_key("frontend"));
        assert!(context.modules.contains_key("backend"));
        assert!(context
            .constraints
            .iter()
            .any(|c| c.contains("never mix frontend and backend")));
    }

    #[test]
    fn resolve_placement_rewrites_mismatched_path() {
        let context = analyze("web app with React frontend and FastAPI backend", "", &[]);
        let result = resolve_placement(&context, "create a health endpoint", "health.py");
        let (path, note) = result.unwrap();
        assert_eq!(path, "backend/api/health.py");
        assert!(note.contains("health.py"));
    }

    #[test]
    fn resolve_placement_leaves_correct_path_untouched() {
        let context = analyze("web app with React frontend and FastAPI backend", "", &[]);
        let result = resolve_placement(&context, "add an api route", "backend/api/health.py");
        assert!(result.is_none());
    }

    #[test]
    fn resolve_placement_returns_none_for_unmatched_role() {
        let context = analyze("web app with React frontend and FastAPI backend", "", &[]);
        assert!(resolve_placement(&context, "write documentation", "README.md").is_none());
    }
}
