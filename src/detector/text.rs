// SPDX-License-Identifier: PMPL-1.0-or-later

//! Line-oriented regex passes over raw source text
//!
//! These catch what the tree walk cannot see: literals, debug leftovers,
//! query strings and configuration flags. Secrets are searched on every line,
//! comments included; the other passes skip comment lines.

use crate::types::{Finding, RiskCategory, Severity};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

struct LineRule {
    regex: Regex,
    category: RiskCategory,
    severity: Severity,
    message: &'static str,
    remediation: &'static str,
}

fn rule(
    pattern: &str,
    category: RiskCategory,
    severity: Severity,
    message: &'static str,
    remediation: &'static str,
) -> LineRule {
    LineRule {
        regex: Regex::new(pattern).unwrap(),
        category,
        severity,
        message,
        remediation,
    }
}

/// First match wins per line
static SECRET_RULES: Lazy<Vec<LineRule>> = Lazy::new(|| {
    use RiskCategory::Secrets;
    use Severity::Critical;
    let remediation = "Load secrets from the environment or a secret manager";
    vec![
        rule(
            r#"-----BEGIN (RSA |EC |DSA |OPENSSH )?PRIVATE KEY-----"#,
            Secrets,
            Critical,
            "Critical: embedded private key",
            remediation,
        ),
        rule(
            r#"\bAKIA[0-9A-Z]{16}\b"#,
            Secrets,
            Critical,
            "Critical: AWS access key id in source",
            remediation,
        ),
        rule(
            r#"\bAIza[0-9A-Za-z_\-]{35}\b"#,
            Secrets,
            Critical,
            "Critical: Google API key in source",
            remediation,
        ),
        rule(
            r#"["']sk-[A-Za-z0-9_\-]{20,}["']"#,
            Secrets,
            Critical,
            "Critical: API secret key literal in source",
            remediation,
        ),
        rule(
            r#"(?i)(api[_-]?key|api[_-]?secret|password|passwd|secret[_-]?key|access[_-]?token|private[_-]?key)\s*[=:]\s*["'][^"']{8,}"#,
            Secrets,
            Critical,
            "Critical: possible hardcoded secret",
            remediation,
        ),
    ]
});

/// Every matching rule reports
static CODE_RULES: Lazy<Vec<LineRule>> = Lazy::new(|| {
    use RiskCategory::*;
    use Severity::*;
    vec![
        rule(
            r#"\bpdb\.set_trace\(|\bbreakpoint\(\)"#,
            Debug,
            Low,
            "Low risk: debugger breakpoint left in code",
            "Remove debugger hooks before deployment",
        ),
        rule(
            r#"^\s*import\s+pdb\b|^\s*from\s+pdb\s+import\b"#,
            Debug,
            Low,
            "Low risk: pdb imported",
            "Remove debugger imports before deployment",
        ),
        rule(
            r#"\btraceback\.print_exc\("#,
            Debug,
            Low,
            "Low risk: traceback printed to output",
            "Log exceptions instead of printing stack traces to users",
        ),
        rule(
            r#"^\s*DEBUG\s*=\s*True\b"#,
            Configuration,
            Medium,
            "Medium risk: debug mode enabled",
            "Drive DEBUG from the environment and default it to False",
        ),
        rule(
            r#"\bverify\s*=\s*False\b"#,
            Configuration,
            Medium,
            "Medium risk: TLS certificate verification disabled",
            "Keep certificate verification on",
        ),
        rule(
            r#"\bssl\._create_unverified_context\b"#,
            Configuration,
            Medium,
            "Medium risk: unverified SSL context",
            "Use ssl.create_default_context()",
        ),
        rule(
            r#"\bALLOWED_HOSTS\s*=\s*\[\s*["']\*["']"#,
            Configuration,
            Medium,
            "Medium risk: wildcard ALLOWED_HOSTS",
            "List the hostnames the service answers for",
        ),
        rule(
            r#"(?i)allow_origins\s*=\s*\[\s*["']\*["']|CORS_ORIGIN_ALLOW_ALL\s*=\s*True|Access-Control-Allow-Origin["']?\s*[:,]\s*["']\*"#,
            Configuration,
            Medium,
            "Medium risk: CORS allows every origin",
            "Restrict allowed origins to known front ends",
        ),
        rule(
            r#"["']0\.0\.0\.0["']"#,
            Configuration,
            Low,
            "Low risk: service binds all interfaces",
            "Bind to localhost unless external access is intended",
        ),
    ]
});

static SQL_FORMATTED_EXECUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\.execute(many)?\(\s*(f["']|["'][^"']*["']\s*(%|\+|\.format\())"#).unwrap()
});

static SQL_CONCATENATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(["']\s*(SELECT|INSERT|UPDATE|DELETE)\b[^"']*["']\s*\+|\bf["']\s*(SELECT|INSERT|UPDATE|DELETE)\b[^"']*\{)"#)
        .unwrap()
});

static HTTP_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"http://[a-zA-Z0-9]"#).unwrap());

static HTTP_LOCAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"http://(localhost|127\.0\.0\.1|0\.0\.0\.0|\[::1\])"#).unwrap());

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

/// Run every text pass over `source`.
pub fn scan_text(path: &Path, source: &str) -> Vec<Finding> {
    let mut findings = Vec::new();

    for (index, line) in source.lines().enumerate() {
        let line_number = index + 1;
        let mut emit = |rule: &LineRule| {
            findings.push(Finding::new_static(
                path,
                line_number,
                rule.category,
                rule.severity,
                rule.message,
                rule.remediation,
            ));
        };

        if let Some(rule) = SECRET_RULES.iter().find(|r| r.regex.is_match(line)) {
            emit(rule);
        }

        if is_comment(line) {
            continue;
        }

        for rule in CODE_RULES.iter().filter(|r| r.regex.is_match(line)) {
            emit(rule);
        }

        if SQL_FORMATTED_EXECUTE.is_match(line) {
            findings.push(Finding::new_static(
                path,
                line_number,
                RiskCategory::Database,
                Severity::Critical,
                "Critical: SQL query built from a formatted string",
                "Use parameterised queries with placeholders",
            ));
        } else if SQL_CONCATENATION.is_match(line) {
            findings.push(Finding::new_static(
                path,
                line_number,
                RiskCategory::Database,
                Severity::Medium,
                "Medium risk: SQL assembled by string concatenation",
                "Use parameterised queries with placeholders",
            ));
        }

        let http_total = HTTP_URL.find_iter(line).count();
        let http_local = HTTP_LOCAL.find_iter(line).count();
        if http_total > http_local {
            findings.push(Finding::new_static(
                path,
                line_number,
                RiskCategory::Network,
                Severity::Low,
                "Low risk: plain HTTP URL",
                "Use HTTPS for non-local endpoints",
            ));
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(src: &str) -> Vec<Finding> {
        scan_text(Path::new("agent.py"), src)
    }

    #[test]
    fn test_secret_in_comment_still_found() {
        let findings = scan("# api_key = \"abcdefgh12345\"\n");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].category, RiskCategory::Secrets);
        assert_eq!(findings[0].line_number, 1);
    }

    #[test]
    fn test_one_secret_finding_per_line() {
        let findings = scan("OPENAI_API_KEY = 'sk-abcdefghijklmnopqrstuvwx'\n");
        assert_eq!(
            findings.iter().filter(|f| f.category == RiskCategory::Secrets).count(),
            1
        );
    }

    #[test]
    fn test_comment_lines_skip_code_rules() {
        assert!(scan("# DEBUG = True\n# requests.get('http://example.com')\n").is_empty());
    }

    #[test]
    fn test_sql_formatted_execute_is_critical() {
        let findings = scan("cursor.execute(f\"SELECT * FROM users WHERE id={uid}\")\n");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Critical);

        let findings = scan("q = \"SELECT * FROM t WHERE a=\" + name\n");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Medium);
    }

    #[test]
    fn test_http_local_is_fine() {
        assert!(scan("URL = 'http://localhost:5001/api'\n").is_empty());
        let findings = scan("URL = 'http://example.com/api'\n");
        assert_eq!(findings[0].category, RiskCategory::Network);
    }

    #[test]
    fn test_config_flags() {
        let findings = scan("DEBUG = True\nrequests.get(u, verify=False)\napp.run(host=\"0.0.0.0\")\n");
        let lines: Vec<usize> = findings.iter().map(|f| f.line_number).collect();
        assert_eq!(lines, vec![1, 2, 3]);
    }
}
