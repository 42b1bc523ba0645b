//! Code sanitation for generated step output (spec §4.11 "Code sanitation").
//!
//! Strips markdown fences, attempts a syntax check (reusing C5's crude
//! parser stand-in), runs a bounded auto-fix pass, and falls back to a
//! minimal template when the fix doesn't take.

use crate::validation::{syntax_hook, ValidationInput};

pub struct SanitizedCode {
    pub content: String,
    pub fallback_applied: bool,
}

/// Strips a leading/trailing ``` fence (with or without a language tag) and
/// any bare language-name prefix line a model sometimes emits on its own.
pub fn strip_markdown_fences(text: &str) -> String {
    let trimmed = text.trim();
    let without_fences = if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.trim_start_matches(|c: char| c.is_alphanumeric());
        let rest = rest.trim_start_matches('\n');
        rest.strip_suffix("```").unwrap_or(rest).trim_end()
    } else {
        trimmed
    };

    const LANGUAGE_PREFIXES: &[&str] = &["python", "rust", "javascript", "typescript", "json", "toml"];
    let mut lines = without_fences.lines();
    if let Some(first) = lines.clone().next() {
        if LANGUAGE_PREFIXES.contains(&first.trim().to_lowercase().as_str()) {
            lines.next();
            return lines.collect::<Vec<_>>().join("\n");
        }
    }
    without_fences.to_string()
}

fn parses_ok(text: &str, language: &str) -> bool {
    let hook = syntax_hook("sanitize-check", 0, language);
    let mut registry = crate::validation::ValidationHookRegistry::new();
    registry.register(hook);
    let results = registry.run_validation_hooks(&ValidationInput::Text(text), None);
    crate::validation::all_pass(&results)
}

/// Tab-to-space normalization and missing-colon insertion for Python-style
/// headers — the two auto-fixes spec §4.11 names explicitly. Shared with
/// C14's `auto_fix_syntax` healing strategy.
pub(crate) fn auto_fix(text: &str, language: &str) -> String {
    let tabs_fixed = text.replace('\t', "    ");
    if language != "python" {
        return tabs_fixed;
    }

    const HEADERS: &[&str] = &["def ", "class ", "if ", "elif ", "else", "for ", "while ", "with ", "try", "except"];
    tabs_fixed
        .lines()
        .map(|line| {
            let trimmed = line.trim_end();
            let stripped = trimmed.trim_start();
            let is_header = HEADERS.iter().any(|h| stripped.starts_with(h));
            if is_header && !trimmed.ends_with(':') && !stripped.is_empty() {
                format!("{trimmed}:")
            } else {
                trimmed.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn minimal_template(language: &str) -> String {
    match language {
        "python" => "# could not generate valid code for this step\npass\n".to_string(),
        "rust" => "// could not generate valid code for this step\n".to_string(),
        _ => "// could not generate valid code for this step\n".to_string(),
    }
}

/// Runs the full sanitation pipeline (spec §4.11): strip fences, check
/// syntax, auto-fix once, and fall back to a minimal template if the fix
/// doesn't take.
pub fn sanitize_generated_code(raw: &str, language: &str) -> SanitizedCode {
    let stripped = strip_markdown_fences(raw);

    if parses_ok(&stripped, language) {
        return SanitizedCode {
            content: stripped,
            fallback_applied: false,
        };
    }

    let fixed = auto_fix(&stripped, language);
    if parses_ok(&fixed, language) {
        return SanitizedCode {
            content: fixed,
            fallback_applied: false,
        };
    }

    SanitizedCode {
        content: minimal_template(language),
        fallback_applied: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fenced_code_with_language_tag() {
        let input = "```python\ndef f(x):\n    return x\n```";
        assert_eq!(strip_markdown_fences(input), "def f(x):\n    return x");
    }

    #[test]
    fn valid_code_passes_through_unchanged() {
        let result = sanitize_generated_code("def f(x):\n    return x\n", "python");
        assert!(!result.fallback_applied);
        assert!(result.content.contains("def f(x):"));
    }

    #[test]
    fn missing_colon_is_auto_fixed() {
        let result = sanitize_generated_code("def f(x)\n    return x", "python");
        assert!(!result.fallback_applied);
        assert!(result.content.contains("def f(x):"));
    }

    #[test]
    fn unfixable_syntax_falls_back_to_template() {
        let result = sanitize_generated_code("def f(x)\n    return (x", "python");
        assert!(result.fallback_applied);
        assert!(result.content.contains("could not generate"));
    }

    #[test]
    fn tabs_are_normalized_to_spaces() {
        let result = sanitize_generated_code("def f(x):\n\treturn x\n", "python");
        assert!(!result.content.contains('\t'));
    }
}
