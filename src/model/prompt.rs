// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prompt construction for guardrail analysis

use serde::Serialize;
use serde_json::Value;
use std::path::Path;

const SYSTEM: &str = "You are a security auditor for LLM agent systems. You find \
vulnerabilities in agent code and answer with precise, actionable guardrails as \
structured JSON.";

const RESPONSE_FORMAT: &str = r##"```json
{
  "constraints": [
    {"description": "Constraint the agent must enforce", "severity": "critical|medium|low"}
  ],
  "risks": [
    {"description": "Risk present in the code", "severity": "critical|medium|low", "impact": "What an attacker gains"}
  ],
  "hardened_code": [
    "# Comment explaining the fix",
    "def secure_function(value):",
    "    return validate(value)"
  ]
}
```"##;

/// A system instruction plus the user turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Metadata sent alongside the source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentCard {
    pub name: String,
    pub description: String,
    pub file_path: String,
    /// Contents of the `<stem>_card.yaml` sidecar, when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card: Option<Value>,
}

impl AgentCard {
    pub fn for_file(path: &Path, card: Option<Value>) -> Self {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            description: format!("AI agent from {}", path.display()),
            file_path: path.display().to_string(),
            card,
        }
    }
}

/// Guardrail analysis prompt: card, tool schema, the agent source and any
/// retrieved threat context.
pub fn analysis_prompt(card: &AgentCard, tool_schema: &Value, source: &str, context: &str) -> Prompt {
    let card = serde_json::to_string_pretty(card).unwrap_or_default();
    let tools = serde_json::to_string_pretty(tool_schema).unwrap_or_default();
    let context = if context.trim().is_empty() {
        "(none)"
    } else {
        context
    };

    let user = format!(
        "Audit the AI agent below.

First understand the code: what the agent is for, how it is structured, which
user input it accepts, and how it handles security, privacy and data.

Then identify vulnerabilities, in particular:
- prompt injection (missing or overly broad prompts, agents with wide powers)
- tool misuse and dynamic tool routing
- sensitive code execution without human validation
- unsafe use of external APIs, MCP servers or other services

Write Python code that mitigates each risk. Every fix carries a clear comment.
The code must be valid and fit the existing codebase; minimal working code is
better than ambitious broken code. Do not use emojis.

Severity levels, and only these:
- critical: code execution, data breach, system compromise
- medium: privilege escalation, data exposure, service disruption
- low: information disclosure, weak validation, configuration concerns

Answer with ONLY this JSON inside triple backticks, complete and valid:

{RESPONSE_FORMAT}

Agent card:
{card}

Tool schema:
{tools}

Routing logic:
{source}

Threat context:
{context}
"
    );

    Prompt {
        system: SYSTEM.to_string(),
        user,
    }
}

/// Follow-up asking the model to re-emit unparseable output as strict JSON.
pub fn repair_prompt(previous: &str) -> Prompt {
    Prompt {
        system: SYSTEM.to_string(),
        user: format!(
            "Your previous answer could not be parsed as JSON. Re-emit the same \
content as a single strictly valid JSON object with the keys \"constraints\", \
\"risks\" and \"hardened_code\". Use plain JSON strings, no triple quotes, no \
trailing commas, no text outside the object.\n\nPrevious answer:\n{previous}\n"
        ),
    }
}

/// Default tool schema when the agent declares none
pub fn default_tool_schema() -> Value {
    serde_json::json!({ "tools": "Various tools and functions defined in the agent" })
}
