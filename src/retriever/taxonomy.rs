// SPDX-License-Identifier: PMPL-1.0-or-later

//! Markdown threat taxonomy parsing

use serde::{Deserialize, Serialize};

/// Lines starting with these are formatting, not threat content
const SKIP_MARKERS: &[&str] = &[
    "######",
    "**Figure",
    "**References**",
    "**Example ATTACK SCENARIOS**",
];

/// One numbered taxonomy section before embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatSection {
    pub title: String,
    pub body: String,
}

impl ThreatSection {
    /// Text that gets embedded: title line then body.
    pub fn embedding_text(&self) -> String {
        format!("{}\n{}", self.title, self.body)
    }
}

/// Title of a numbered heading such as `#### 1. Tool Misuse`.
fn numbered_heading(line: &str) -> Option<&str> {
    let hashes = line.len() - line.trim_start_matches('#').len();
    if hashes == 0 || hashes > 5 {
        return None;
    }
    let title = line[hashes..].strip_prefix(' ')?.trim();
    title
        .starts_with(|c: char| c.is_ascii_digit())
        .then_some(title)
}

fn is_marker(line: &str) -> bool {
    SKIP_MARKERS.iter().any(|m| line.starts_with(m))
}

/// Split taxonomy markdown into numbered sections. Sections without any
/// content lines are dropped.
pub fn parse_sections(markdown: &str) -> Vec<ThreatSection> {
    let mut sections = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in markdown.lines() {
        let trimmed = line.trim();
        if let Some(title) = numbered_heading(trimmed) {
            if let Some(done) = current.take() {
                sections.extend(finish(done));
            }
            current = Some((title.to_string(), Vec::new()));
        } else if let Some((_, body)) = current.as_mut() {
            if !trimmed.is_empty() && !is_marker(trimmed) {
                body.push(line);
            }
        }
    }
    if let Some(done) = current {
        sections.extend(finish(done));
    }
    sections
}

fn finish((title, body): (String, Vec<&str>)) -> Option<ThreatSection> {
    let body = body.join("\n").trim().to_string();
    (!body.is_empty()).then_some(ThreatSection { title, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_headings_only() {
        let md = "# Intro\ntext\n#### 1. Tool Misuse\nbody one\n\n**Figure 1: x**\nmore\n\
                  ###### 2. Not a section\n#### Unnumbered\nstill one\n### 2. Injection\nbody two\n";
        let sections = parse_sections(md);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].title, "1. Tool Misuse");
        assert_eq!(sections[0].body, "body one\nmore\n#### Unnumbered\nstill one");
        assert_eq!(sections[1].title, "2. Injection");
    }

    #[test]
    fn test_empty_sections_dropped() {
        let md = "#### 1. Empty\n\n**References**\n#### 2. Full\ncontent\n";
        let sections = parse_sections(md);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].embedding_text(), "2. Full\ncontent");
    }
}
