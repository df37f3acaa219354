// SPDX-License-Identifier: PMPL-1.0-or-later

//! Risk merge and in-place annotation
//!
//! Findings are grouped by file and written back as two-line comment blocks
//! directly above the line they point at. Blocks are inserted bottom-up so
//! earlier line numbers stay valid, and every line number is checked against
//! the file as it was before any insertion.
//!
//! Annotation is idempotent: a block already present in the comment run
//! directly above its target is not inserted again, and an existing summary
//! header is left alone.
//!
//! A target inside a backslash continuation or a triple-quoted string is
//! moved up to the first line of its statement, since a comment line there
//! would break the statement or change the string.

use crate::error::AuditError;
use crate::types::Finding;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const HEADER_MARKER: &str = "# [BOT] AI Security Analysis Summary";
const HEADER_SUBTITLE: &str = "# Generated by autoharden with model analysis";
const TIP_PREFIX: &str = "# [TIP] ";
const HEADER_SNIPPET_LIMIT: usize = 3;

static CODING_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[ \t\f]*#.*?coding[:=][ \t]*[-\w.]+").unwrap());

/// Findings grouped for annotation
#[derive(Debug, Clone, Default)]
pub struct MergedFindings {
    pub by_file: BTreeMap<PathBuf, Vec<Finding>>,
    /// Model findings with no file; reported, never written
    pub unattached: Vec<Finding>,
}

pub fn merge(static_findings: &[Finding], model_findings: &[Finding]) -> MergedFindings {
    let mut merged = MergedFindings::default();
    for finding in static_findings.iter().chain(model_findings) {
        match &finding.source_path {
            Some(path) => merged
                .by_file
                .entry(path.clone())
                .or_default()
                .push(finding.clone()),
            None => merged.unattached.push(finding.clone()),
        }
    }
    merged
}

/// Per-file annotation counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAnnotation {
    pub path: PathBuf,
    pub inserted_blocks: usize,
    pub inserted_lines: usize,
    /// Line 0 or past the end of the file
    pub out_of_range: usize,
    /// Already annotated by an earlier run
    pub already_present: usize,
    /// Moved up to the start of a continued statement or multi-line string
    pub relocated: usize,
    pub header_added: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationFailure {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationReport {
    pub files: Vec<FileAnnotation>,
    pub failures: Vec<AnnotationFailure>,
    pub unattached: usize,
}

impl AnnotationReport {
    pub fn inserted_lines(&self) -> usize {
        self.files.iter().map(|f| f.inserted_lines).sum()
    }
}

/// Result of annotating text in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedText {
    pub text: String,
    pub stats: FileAnnotation,
}

fn split_ending(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}

fn leading_whitespace(line: &str) -> &str {
    let trimmed = line.trim_start_matches([' ', '\t']);
    &line[..line.len() - trimmed.len()]
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

/// Comment lines directly above `index`, nearest first
fn comment_run_above(lines: &[String], index: usize) -> Vec<&str> {
    lines[..index]
        .iter()
        .rev()
        .map(|l| split_ending(l).0)
        .take_while(|l| is_comment(l))
        .map(str::trim)
        .collect()
}

/// Triple-quote delimiter still open at the end of `line`, given the one
/// open at its start.
fn open_triple_quote(line: &str, mut open: Option<char>) -> Option<char> {
    let chars: Vec<char> = line.chars().collect();
    let mut single: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if open.is_some() || single.is_some() {
            if c == '\\' {
                i += 2;
                continue;
            }
            if let Some(q) = open {
                if chars[i..].starts_with(&[q, q, q]) {
                    open = None;
                    i += 3;
                    continue;
                }
            } else if single == Some(c) {
                single = None;
            }
        } else {
            match c {
                '#' => break,
                '"' | '\'' if chars[i..].starts_with(&[c, c, c]) => {
                    open = Some(c);
                    i += 3;
                    continue;
                }
                '"' | '\'' => single = Some(c),
                _ => {}
            }
        }
        i += 1;
    }
    open
}

/// Index of the line each line's statement starts on. Lines inside a
/// triple-quoted string or after a backslash continuation map back to the
/// line that opened them.
fn statement_starts(lines: &[String]) -> Vec<usize> {
    let mut starts = Vec::with_capacity(lines.len());
    let mut open = None;
    let mut continued = false;
    let mut start = 0;

    for (i, line) in lines.iter().enumerate() {
        if open.is_none() && !continued {
            start = i;
        }
        starts.push(start);
        let body = split_ending(line).0;
        open = open_triple_quote(body, open);
        continued = open.is_none() && body.ends_with('\\');
    }
    starts
}

fn block_present(lines: &[String], index: usize, message: &str, tip: &str) -> bool {
    let run = comment_run_above(lines, index);
    // `run` is nearest-first, so a block reads (tip, message) here
    run.windows(2).any(|pair| pair[0] == tip && pair[1] == message)
}

/// Lines the header must stay below: a shebang and an encoding declaration.
fn preamble_len(lines: &[String]) -> usize {
    let mut len = 0;
    if lines.first().is_some_and(|l| l.starts_with("#!")) {
        len = 1;
    }
    while len < lines.len().min(2) && CODING_LINE.is_match(split_ending(&lines[len]).0) {
        len += 1;
    }
    len
}

fn header_lines(snippets: &[String], eol: &str) -> Vec<String> {
    let mut header = vec![
        format!("{}{}", HEADER_MARKER, eol),
        format!("{}{}", HEADER_SUBTITLE, eol),
        format!("#{}", eol),
        format!("# Key security improvements:{}", eol),
    ];
    for (i, snippet) in snippets.iter().take(HEADER_SNIPPET_LIMIT).enumerate() {
        let snippet = snippet.strip_prefix('#').map(str::trim).unwrap_or(snippet.as_str());
        let mut snippet_lines = snippet.lines();
        let first = snippet_lines.next().unwrap_or("");
        header.push(format!("# {}. {}{}", i + 1, first.trim_end(), eol));
        for rest in snippet_lines {
            header.push(format!("#    {}{}", rest.trim_end(), eol));
        }
    }
    header.push(format!("#{}", eol));
    header
}

/// Annotate `source` with `findings` and, when given, a summary header built
/// from the first hardened snippets.
pub fn annotate_source(source: &str, findings: &[Finding], snippets: &[String]) -> AnnotatedText {
    let mut lines: Vec<String> = source.split_inclusive('\n').map(str::to_string).collect();
    let original_len = lines.len();
    let default_eol = lines
        .first()
        .map(|l| split_ending(l).1)
        .filter(|eol| !eol.is_empty())
        .unwrap_or("\n")
        .to_string();

    let mut stats = FileAnnotation::default();
    let starts = statement_starts(&lines);

    // Ascending by (anchor, line, severity desc, message) and applied in
    // reverse, so the output does not depend on the order findings arrive in.
    let mut targets: Vec<(usize, &Finding)> = Vec::new();
    for finding in findings {
        if finding.line_number == 0 || finding.line_number > original_len {
            stats.out_of_range += 1;
            continue;
        }
        let anchor = starts[finding.line_number - 1];
        if anchor != finding.line_number - 1 {
            stats.relocated += 1;
        }
        targets.push((anchor, finding));
    }
    targets.sort_by(|(x, a), (y, b)| {
        x.cmp(y)
            .then(a.line_number.cmp(&b.line_number))
            .then(b.severity.cmp(&a.severity))
            .then_with(|| a.message.cmp(&b.message))
            .then_with(|| a.remediation.cmp(&b.remediation))
    });
    targets.dedup_by(|(x, a), (y, b)| {
        x == y && a.message == b.message && a.remediation == b.remediation
    });

    for &(index, finding) in targets.iter().rev() {
        let (body, eol) = split_ending(&lines[index]);
        let eol = if eol.is_empty() { default_eol.as_str() } else { eol };
        let indent = leading_whitespace(body).to_string();

        let message = format!("# {}", finding.message);
        let tip = format!("{}{}", TIP_PREFIX, finding.remediation);
        if block_present(&lines, index, &message, &tip) {
            stats.already_present += 1;
            continue;
        }

        let message_line = format!("{}{}{}", indent, message, eol);
        let tip_line = format!("{}{}{}", indent, tip, eol);
        lines.insert(index, tip_line);
        lines.insert(index, message_line);
        stats.inserted_blocks += 1;
        stats.inserted_lines += 2;
    }

    if !snippets.is_empty() {
        let at = preamble_len(&lines);
        let has_header = lines
            .iter()
            .skip(at)
            .take_while(|l| is_comment(split_ending(l).0))
            .any(|l| split_ending(l).0.trim() == HEADER_MARKER);
        if !has_header {
            // A last line without a newline must not swallow the header
            if at > 0 && split_ending(&lines[at - 1]).1.is_empty() {
                lines[at - 1].push_str(&default_eol);
            }
            let header = header_lines(snippets, &default_eol);
            stats.inserted_lines += header.len();
            let tail = lines.split_off(at);
            lines.extend(header);
            lines.extend(tail);
            stats.header_added = true;
        }
    }

    AnnotatedText {
        text: lines.concat(),
        stats,
    }
}

/// Annotate one file in place.
pub fn annotate_file(
    path: &Path,
    findings: &[Finding],
    snippets: &[String],
) -> Result<FileAnnotation, AuditError> {
    let raw = fs::read(path).map_err(|e| AuditError::file_access(path, e))?;
    let source = String::from_utf8(raw).map_err(|_| {
        AuditError::file_access(
            path,
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "annotation requires UTF-8 source",
            ),
        )
    })?;

    let annotated = annotate_source(&source, findings, snippets);
    if annotated.text != source {
        fs::write(path, &annotated.text).map_err(|e| AuditError::file_access(path, e))?;
    }

    let mut stats = annotated.stats;
    stats.path = path.to_path_buf();
    Ok(stats)
}

/// Merge static and model findings and annotate every target file that has
/// at least one finding. A failure on one file never stops the others.
pub fn merge_and_annotate(
    static_findings: &[Finding],
    model_findings: &[Finding],
    target_files: &[PathBuf],
    snippets: &[String],
) -> AnnotationReport {
    let merged = merge(static_findings, model_findings);
    let mut report = AnnotationReport {
        unattached: merged.unattached.len(),
        ..Default::default()
    };

    for path in target_files {
        let Some(findings) = merged.by_file.get(path) else {
            continue;
        };
        match annotate_file(path, findings, snippets) {
            Ok(stats) => {
                info!(
                    path = %path.display(),
                    blocks = stats.inserted_blocks,
                    skipped = stats.out_of_range,
                    relocated = stats.relocated,
                    "annotated"
                );
                report.files.push(stats);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "annotation failed");
                report.failures.push(AnnotationFailure {
                    path: path.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    report
}
