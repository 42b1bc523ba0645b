//! Minimal unified-diff application for modifier output that returns a
//! patch instead of a full file body (spec §4.11). Supports the standard
//! `@@ -start,len +start,len @@` hunk header with context/add/remove lines;
//! anything else is rejected rather than guessed at.

pub fn looks_like_unified_diff(text: &str) -> bool {
    text.lines().any(|l| l.starts_with("@@ "))
}

struct Hunk {
    old_start: usize,
    lines: Vec<(char, String)>,
}

fn parse_hunk_header(line: &str) -> Option<usize> {
    // "@@ -old_start,old_len +new_start,new_len @@"
    let rest = line.strip_prefix("@@ -")?;
    let old_part = rest.split(' ').next()?;
    let start = old_part.split(',').next()?;
    start.parse::<usize>().ok()
}

fn parse_hunks(diff: &str) -> Vec<Hunk> {
    let mut hunks = Vec::new();
    let mut current: Option<Hunk> = None;

    for line in diff.lines() {
        if line.starts_with("@@ ") {
            let old_start = match parse_hunk_header(line) {
                Some(v) => v,
                None => continue,
            };
            if let Some(hunk) = current.take() {
                hunks.push(hunk);
            }
            current = Some(Hunk { old_start, lines: Vec::new() });
            continue;
        }
        if line.starts_with("--- ") || line.starts_with("+++ ") {
            continue;
        }
        if let Some(hunk) = current.as_mut() {
            if let Some(rest) = line.strip_prefix('+') {
                hunk.lines.push(('+', rest.to_string()));
            } else if let Some(rest) = line.strip_prefix('-') {
                hunk.lines.push(('-', rest.to_string()));
            } else {
                let rest = line.strip_prefix(' ').unwrap_or(line);
                hunk.lines.push((' ', rest.to_string()));
            }
        }
    }
    if let Some(hunk) = current.take() {
        hunks.push(hunk);
    }
    hunks
}

/// Applies `diff` to `original`. Returns an error string (not a
/// `FactoryError`, since the caller decides how to report a patch failure
/// alongside the step it belongs to) if a hunk's context doesn't match.
pub fn apply_unified_diff(original: &str, diff: &str) -> Result<String, String> {
    let original_lines: Vec<&str> = original.lines().collect();
    let hunks = parse_hunks(diff);
    if hunks.is_empty() {
        return Err("no hunks found in diff".to_string());
    }

    let mut output: Vec<String> = Vec::new();
    let mut cursor = 0usize; // 0-indexed position into original_lines

    for hunk in hunks {
        let hunk_start = hunk.old_start.saturating_sub(1);
        if hunk_start < cursor || hunk_start > original_lines.len() {
            return Err(format!("hunk start {} out of order or out of range", hunk.old_start));
        }
        output.extend(original_lines[cursor..hunk_start].iter().map(|s| s.to_string()));
        cursor = hunk_start;

        for (tag, text) in &hunk.lines {
            match tag {
                ' ' => {
                    if original_lines.get(cursor) != Some(&text.as_str()) {
                        return Err(format!("context mismatch at line {}", cursor + 1));
                    }
                    output.push(text.clone());
                    cursor += 1;
                }
                '-' => {
                    if original_lines.get(cursor) != Some(&text.as_str()) {
                        return Err(format!("removal mismatch at line {}", cursor + 1));
                    }
                    cursor += 1;
                }
                '+' => {
                    output.push(text.clone());
                }
                _ => unreachable!(),
            }
        }
    }
    output.extend(original_lines[cursor..].iter().map(|s| s.to_string()));

    Ok(output.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_unified_diff_marker() {
        assert!(looks_like_unified_diff("@@ -1,2 +1,2 @@\n line\n-old\n+new\n"));
        assert!(!looks_like_unified_diff("def f(x):\n    return x\n"));
    }

    #[test]
    fn applies_simple_single_line_replacement() {
        let original = "line one\nline two\nline three";
        let diff = "@@ -2,1 +2,1 @@\n-line two\n+line TWO\n";
        let result = apply_unified_diff(original, diff).unwrap();
        assert_eq!(result, "line one\nline TWO\nline three");
    }

    #[test]
    fn applies_pure_addition() {
        let original = "a\nb";
        let diff = "@@ -2,1 +2,2 @@\n b\n+c\n";
        let result = apply_unified_diff(original, diff).unwrap();
        assert_eq!(result, "a\nb\nc");
    }

    #[test]
    fn context_mismatch_errors() {
        let original = "a\nb\nc";
        let diff = "@@ -2,1 +2,1 @@\n-wrong line\n+new\n";
        assert!(apply_unified_diff(original, diff).is_err());
    }
}
