// SPDX-License-Identifier: PMPL-1.0-or-later

//! Risk pattern tables
//!
//! Static rule data for the structural matcher. Call rules are consulted in
//! declaration order and the first match wins, so tier order here is the
//! lookup priority: critical, medium, low, then the context-gated tiers.

use crate::types::{RiskCategory, Severity};
use once_cell::sync::Lazy;

/// Bumped whenever a rule is added, removed or re-tiered.
pub const RULESET_VERSION: &str = "2026.2";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Critical,
    Medium,
    Low,
    /// Only consulted when the profile reports prompt-injection exposure
    UserInput,
    /// Only consulted when the profile reports dynamic tool routing
    ToolRouting,
}

impl Tier {
    pub fn base_severity(self) -> Severity {
        match self {
            Tier::Critical | Tier::ToolRouting => Severity::Critical,
            Tier::Medium | Tier::UserInput => Severity::Medium,
            Tier::Low => Severity::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    Exact,
    Substring,
}

/// Profile flag a gated rule depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    PromptInjection,
    DynamicToolRouting,
}

#[derive(Debug, Clone)]
pub struct CallRule {
    pub tier: Tier,
    pub matcher: Matcher,
    pub signature: &'static str,
    pub category: RiskCategory,
    pub remediation: &'static str,
    pub gate: Option<Gate>,
}

impl CallRule {
    pub fn matches(&self, signature: &str) -> bool {
        match self.matcher {
            Matcher::Exact => signature == self.signature,
            Matcher::Substring => signature.contains(self.signature),
        }
    }
}

/// Module or name rule used for imports and assignments
#[derive(Debug, Clone)]
pub struct NameRule {
    pub name: &'static str,
    pub severity: Severity,
    pub category: RiskCategory,
    pub remediation: &'static str,
}

fn call(
    tier: Tier,
    matcher: Matcher,
    signature: &'static str,
    category: RiskCategory,
    remediation: &'static str,
) -> CallRule {
    let gate = match tier {
        Tier::UserInput => Some(Gate::PromptInjection),
        Tier::ToolRouting => Some(Gate::DynamicToolRouting),
        _ => None,
    };
    CallRule {
        tier,
        matcher,
        signature,
        category,
        remediation,
        gate,
    }
}

pub static CALL_RULES: Lazy<Vec<CallRule>> = Lazy::new(|| {
    use Matcher::{Exact, Substring};
    use RiskCategory::{Database, Execution, Filesystem, Network};
    use Tier::{Critical, Low, Medium};

    vec![
        // Code execution
        call(Critical, Exact, "eval", Execution, "Avoid eval: use ast.literal_eval or safe parsing"),
        call(Critical, Exact, "exec", Execution, "Avoid exec: use function dispatch or sandboxing"),
        call(Critical, Exact, "compile", Execution, "Avoid compile with user input: validate code source"),
        call(Critical, Exact, "__import__", Execution, "Import modules statically instead of by runtime name"),
        // Process and filesystem operations
        call(Critical, Exact, "subprocess.call", Execution, "Validate shell commands and avoid shell=True"),
        call(Critical, Exact, "subprocess.Popen", Execution, "Pass argument lists and never build commands from input"),
        call(Critical, Exact, "Popen", Execution, "Pass argument lists and never build commands from input"),
        call(Critical, Exact, "os.system", Execution, "Use subprocess with argument lists instead"),
        call(Critical, Exact, "os.popen", Execution, "Use subprocess with argument lists instead"),
        call(Critical, Exact, "os.remove", Filesystem, "Validate file paths to prevent directory traversal"),
        call(Critical, Exact, "os.unlink", Filesystem, "Validate file paths to prevent directory traversal"),
        call(Critical, Exact, "shutil.rmtree", Filesystem, "Validate paths and use absolute paths only"),
        // Unsafe deserialization
        call(Critical, Exact, "pickle.loads", Execution, "Never unpickle untrusted data; use JSON"),
        call(Critical, Exact, "pickle.load", Execution, "Never unpickle untrusted data; use JSON"),
        call(Critical, Exact, "marshal.loads", Execution, "Never unmarshal untrusted data"),
        // Medium
        call(Medium, Substring, "bind_tools", RiskCategory::ToolRouting, "Validate tools before binding to LLM"),
        call(Medium, Substring, "tools_by_name", RiskCategory::ToolRouting, "Sanitize tool names from user input"),
        call(Medium, Substring, "subprocess.run", Execution, "Pass argument lists and check return codes"),
        call(Medium, Substring, "yaml.load", Execution, "Use yaml.safe_load"),
        call(Medium, Substring, "tempfile.mktemp", Filesystem, "Use tempfile.mkstemp or NamedTemporaryFile"),
        call(Medium, Substring, "cursor.execute", Database, "Use parameterised queries"),
        call(Medium, Substring, "executescript", Database, "Never run scripts assembled from input"),
        call(Medium, Substring, "open", Filesystem, "Sanitize file paths and restrict destinations"),
        // Low
        call(Low, Substring, "requests.get", Network, "Use HTTPS and validate URLs"),
        call(Low, Substring, "requests.post", Network, "Use HTTPS and validate URLs"),
        call(Low, Substring, "urllib.request", Network, "Validate URLs and use secure protocols"),
        call(Low, Substring, "httpx.", Network, "Use HTTPS and validate URLs"),
        // Gated on prompt-injection exposure
        call(Tier::UserInput, Substring, "raw_input", RiskCategory::UserInput, "Use input() with proper validation"),
        call(Tier::UserInput, Substring, "getpass", RiskCategory::UserInput, "Validate password input securely"),
        call(Tier::UserInput, Substring, "input", RiskCategory::UserInput, "Validate and sanitize user input"),
        // Gated on dynamic tool routing
        call(Tier::ToolRouting, Substring, "tools_by_name", RiskCategory::ToolRouting, "Sanitize tool names from user input"),
        call(Tier::ToolRouting, Substring, "bind_tools", RiskCategory::ToolRouting, "Validate tools before binding to LLM"),
        call(Tier::ToolRouting, Substring, "get_tool", RiskCategory::ToolRouting, "Validate tool selection dynamically"),
        call(Tier::ToolRouting, Substring, "execute_tool", RiskCategory::ToolRouting, "Validate tool execution parameters"),
    ]
});

pub static DANGEROUS_IMPORTS: Lazy<Vec<NameRule>> = Lazy::new(|| {
    let rule = |name, severity, remediation| NameRule {
        name,
        severity,
        category: RiskCategory::Dependency,
        remediation,
    };
    vec![
        rule("pickle", Severity::Medium, "Prefer json for data exchange"),
        rule("marshal", Severity::Medium, "Prefer json for data exchange"),
        rule("shelve", Severity::Medium, "Shelve unpickles on read; keep files trusted"),
        rule("dill", Severity::Medium, "Prefer json for data exchange"),
        rule("subprocess", Severity::Low, "Audit every subprocess call site"),
        rule("ctypes", Severity::Medium, "Native calls bypass interpreter safety"),
        rule("pty", Severity::Medium, "Pseudo-terminals enable interactive shells"),
        rule("telnetlib", Severity::Medium, "Telnet is unencrypted; use SSH"),
        rule("ftplib", Severity::Low, "FTP is unencrypted; use SFTP"),
    ]
});

pub static DANGEROUS_ASSIGNMENTS: Lazy<Vec<NameRule>> = Lazy::new(|| {
    let rule = |name, severity, category, remediation| NameRule {
        name,
        severity,
        category,
        remediation,
    };
    vec![
        rule("__builtins__", Severity::Critical, RiskCategory::Execution, "Never rebind interpreter builtins"),
        rule("__import__", Severity::Critical, RiskCategory::Execution, "Never replace the import hook"),
        rule("__globals__", Severity::Critical, RiskCategory::Execution, "Do not write to function globals"),
        rule("__code__", Severity::Critical, RiskCategory::Execution, "Do not swap code objects at runtime"),
        rule("sys.modules", Severity::Medium, RiskCategory::Execution, "Avoid patching the module cache"),
        rule("os.environ", Severity::Medium, RiskCategory::Configuration, "Pass configuration explicitly instead of mutating the environment"),
    ]
});

/// Substrings that make a function name worth a second look
pub const SUSPICIOUS_NAME_KEYWORDS: &[&str] =
    &["exec", "eval", "shell", "command", "inject", "bypass", "sudo"];

/// Parameter names that usually carry untrusted input in agent code
pub const TAINTED_PARAMETERS: &[&str] = &["user_input", "data", "payload", "query", "content"];

/// Calls whose first argument is a path or command
pub const SINK_SIGNATURES: &[&str] = &[
    "open",
    "os.system",
    "os.popen",
    "os.remove",
    "os.unlink",
    "shutil.rmtree",
    "subprocess.call",
    "subprocess.run",
    "subprocess.Popen",
    "subprocess.check_output",
    "subprocess.check_call",
];

/// Calls where `shell=` is meaningful
pub fn is_shell_capable(signature: &str) -> bool {
    signature.starts_with("subprocess.") || signature == "Popen" || signature.ends_with(".Popen")
}

/// First matching call rule honouring gates, in priority order.
pub fn lookup_call(
    signature: &str,
    prompt_injection: bool,
    dynamic_routing: bool,
) -> Option<&'static CallRule> {
    CALL_RULES.iter().find(|rule| {
        let gate_open = match rule.gate {
            None => true,
            Some(Gate::PromptInjection) => prompt_injection,
            Some(Gate::DynamicToolRouting) => dynamic_routing,
        };
        gate_open && rule.matches(signature)
    })
}

/// Root of a dotted module path (`os.path` -> `os`).
pub fn lookup_import(module: &str) -> Option<&'static NameRule> {
    let root = module.split('.').next().unwrap_or(module);
    DANGEROUS_IMPORTS.iter().find(|rule| rule.name == root)
}

/// Assignment targets match on the full name or on their final component,
/// so `func.__globals__` and `__builtins__` both hit.
pub fn lookup_assignment(target: &str) -> Option<&'static NameRule> {
    let last = target.rsplit('.').next().unwrap_or(target);
    DANGEROUS_ASSIGNMENTS
        .iter()
        .find(|rule| rule.name == target || (!rule.name.contains('.') && rule.name == last))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_beats_medium_for_shared_signature() {
        // `os.popen` is a critical exact entry and also contains "open"
        let rule = lookup_call("os.popen", false, false).unwrap();
        assert_eq!(rule.tier, Tier::Critical);
    }

    #[test]
    fn test_substring_tiers() {
        let rule = lookup_call("self.llm.bind_tools", false, false).unwrap();
        assert_eq!(rule.tier, Tier::Medium);
        let rule = lookup_call("requests.get", false, false).unwrap();
        assert_eq!(rule.tier, Tier::Low);
        assert!(lookup_call("print", false, false).is_none());
    }

    #[test]
    fn test_gated_tiers_require_flags() {
        assert!(lookup_call("input", false, false).is_none());
        assert_eq!(lookup_call("input", true, false).unwrap().tier, Tier::UserInput);
        assert!(lookup_call("registry.get_tool", false, false).is_none());
        let rule = lookup_call("registry.get_tool", false, true).unwrap();
        assert_eq!(rule.tier.base_severity(), Severity::Critical);
        assert_eq!(rule.category, RiskCategory::ToolRouting);
    }

    #[test]
    fn test_gated_rules_carry_matching_categories() {
        for rule in CALL_RULES.iter() {
            match rule.tier {
                Tier::UserInput => {
                    assert_eq!(rule.category, RiskCategory::UserInput);
                    assert_eq!(rule.gate, Some(Gate::PromptInjection));
                }
                Tier::ToolRouting => {
                    assert_eq!(rule.category, RiskCategory::ToolRouting);
                    assert_eq!(rule.gate, Some(Gate::DynamicToolRouting));
                }
                _ => assert_eq!(rule.gate, None),
            }
        }
    }

    #[test]
    fn test_exact_tier_does_not_match_substrings() {
        // `evaluate` must not hit the exact `eval` rule
        assert!(lookup_call("evaluate", false, false).is_none());
    }

    #[test]
    fn test_import_and_assignment_lookup() {
        assert!(lookup_import("pickle").is_some());
        assert!(lookup_import("os.path").is_none());
        assert!(lookup_assignment("os.environ").is_some());
        assert!(lookup_assignment("fn.__globals__").is_some());
        assert!(lookup_assignment("environ").is_none());
    }
}
