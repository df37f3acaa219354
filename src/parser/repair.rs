// SPDX-License-Identifier: PMPL-1.0-or-later

//! Extraction and syntax repair for model-emitted JSON

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static TRIPLE_QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?s)"""(.*?)""""#).unwrap());

static GREEDY_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\{[\s\S]*\}"#).unwrap());

/// Marker lines that only ever appear as corruption in model output
const TEMPLATE_MARKERS: &[&str] = &["PROMPT_TEMPLATE"];

fn brace_delta(line: &str) -> i64 {
    line.matches('{').count() as i64 - line.matches('}').count() as i64
}

/// Capture the first JSON-looking block: from a ```json fence or the first
/// line with an unbalanced `{`, until the brace depth returns to zero after
/// opening or a closing fence is reached. Prose such as `{user}` never starts
/// a capture.
pub fn capture_block(text: &str) -> Option<String> {
    let mut captured: Vec<&str> = Vec::new();
    let mut inside = false;
    let mut opened = false;
    let mut depth: i64 = 0;

    for line in text.lines() {
        let trimmed = line.trim();
        if !inside {
            if trimmed.starts_with("```json") {
                inside = true;
                continue;
            }
            if brace_delta(line) <= 0 {
                continue;
            }
            inside = true;
        } else if trimmed == "```" {
            break;
        }

        captured.push(line);
        depth += brace_delta(line);
        if line.contains('{') {
            opened = true;
        }
        if opened && depth <= 0 {
            break;
        }
    }

    let block = captured.join("\n");
    let block = block.trim();
    if block.is_empty() {
        None
    } else {
        Some(block.to_string())
    }
}

/// Substring from the first `{` to the last `}`.
pub fn boundary_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Greedy `{...}` span.
pub fn greedy_span(text: &str) -> Option<&str> {
    GREEDY_OBJECT.find(text).map(|m| m.as_str())
}

fn escape_json_string(content: &str) -> String {
    content
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

fn is_artifact_line(trimmed: &str) -> bool {
    const BARE_QUOTES: &[&str] = &["\"\"\"", "\"\"\",", "\"\"\"\"\"", "\"\"\"\"\","];
    BARE_QUOTES.contains(&trimmed) || TEMPLATE_MARKERS.iter().any(|m| trimmed.contains(m))
}

/// Drop commas directly before `]` or `}`, leaving string contents alone.
fn strip_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
        } else if c == '"' {
            in_string = true;
        } else if c == ',' {
            let rest = text[i + 1..].trim_start();
            if rest.starts_with(']') || rest.starts_with('}') {
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Rewrite the usual corruption: triple-quoted literals become JSON strings,
/// stray triple-quote and template lines are dropped, trailing commas go.
pub fn repair(text: &str) -> String {
    let requoted = TRIPLE_QUOTED.replace_all(text, |caps: &Captures| {
        format!("\"{}\"", escape_json_string(&caps[1]))
    });

    let kept: Vec<&str> = requoted
        .lines()
        .filter(|line| !is_artifact_line(line.trim()))
        .collect();

    strip_trailing_commas(&kept.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_from_fence() {
        let text = "Here you go:\n```json\n{\n  \"a\": {\"b\": 1}\n}\n```\nThanks";
        assert_eq!(capture_block(text).unwrap(), "{\n  \"a\": {\"b\": 1}\n}");
    }

    #[test]
    fn test_capture_blank_line_after_fence() {
        let text = "```json\n\n{\"a\": 1}\n```";
        assert_eq!(capture_block(text).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn test_capture_without_fence() {
        let text = "prose\n{\"a\": [1,\n 2]}\ntrailing prose {";
        assert_eq!(capture_block(text).unwrap(), "{\"a\": [1,\n 2]}");
    }

    #[test]
    fn test_capture_skips_balanced_prose_braces() {
        let text = "Prompts use {user} and {tools}.\n```json\n{\"a\": 1}\n```";
        assert_eq!(capture_block(text).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn test_trailing_commas_inside_strings_survive() {
        let fixed = strip_trailing_commas("{\"s\": \"[1, 2,] {a,}\", \"q\": \"\\\",]\", \"l\": [1,],}");
        assert_eq!(fixed, "{\"s\": \"[1, 2,] {a,}\", \"q\": \"\\\",]\", \"l\": [1]}");
    }

    #[test]
    fn test_boundary_span() {
        assert_eq!(boundary_span("x {a} y {b} z"), Some("{a} y {b}"));
        assert_eq!(boundary_span("} backwards {"), None);
        assert_eq!(boundary_span("none"), None);
    }

    #[test]
    fn test_repair_triple_quotes() {
        let fixed = repair("{\"code\": \"\"\"def f():\n    return 'x'\"\"\"}");
        let value: serde_json::Value = serde_json::from_str(&fixed).unwrap();
        assert_eq!(value["code"], "def f():\n    return 'x'");
    }

    #[test]
    fn test_repair_drops_artifacts_and_trailing_commas() {
        let fixed = repair("{\n\"a\": [1, 2,],\nPROMPT_TEMPLATE = \"\"\n\"b\": 3,\n}");
        let value: serde_json::Value = serde_json::from_str(&fixed).unwrap();
        assert_eq!(value["b"], 3);
    }
}
