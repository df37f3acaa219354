// SPDX-License-Identifier: PMPL-1.0-or-later

//! Source tree walker
//!
//! Parses one Python file with tree-sitter and walks the tree depth-first in
//! source order, emitting the handful of structural events the detector
//! cares about: calls, imports, assignments, function and class definitions.

use crate::error::{AuditError, Result};
use std::path::Path;
use tree_sitter::{Node, Parser, Tree};

/// A parsed Python file that is known to be free of syntax errors.
pub struct SourceTree {
    tree: Tree,
    source: String,
}

impl SourceTree {
    /// Parse `source`. A tree containing error or missing nodes is rejected,
    /// matching an interpreter that refuses to compile the file.
    pub fn parse(path: &Path, source: &str) -> Result<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| AuditError::parse_structural(path, e.to_string()))?;

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| AuditError::parse_structural(path, "parser returned no tree"))?;

        let root = tree.root_node();
        if root.has_error() {
            let line = first_error_line(root).unwrap_or(0);
            return Err(AuditError::parse_structural(
                path,
                format!("syntax error near line {}", line),
            ));
        }

        Ok(Self {
            tree,
            source: source.to_string(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn line_count(&self) -> usize {
        self.source.lines().count()
    }

    /// Walk the tree, handing every event to `visitor` in source order.
    pub fn walk(&self, visitor: &mut dyn Visitor) {
        let bytes = self.source.as_bytes();
        let mut stack = vec![self.tree.root_node()];

        while let Some(node) = stack.pop() {
            for event in events_for(node, bytes) {
                visitor.visit(&event);
            }
            let mut cursor = node.walk();
            let children: Vec<Node> = node.named_children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
    }
}

fn first_error_line(node: Node) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row + 1);
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|child| child.has_error())
        .find_map(first_error_line)
}

/// Receives walker events. The detector's matchers implement this.
pub trait Visitor {
    fn visit(&mut self, event: &SourceEvent);
}

/// Structural events, each carrying its 1-based line
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    Call(CallSite),
    Import {
        /// Full dotted module path as written
        module: String,
        line: usize,
    },
    Assign {
        /// Resolved target signatures (`x`, `os.environ`, `__builtins__`)
        targets: Vec<String>,
        line: usize,
    },
    FunctionDef {
        name: String,
        params: Vec<String>,
        line: usize,
    },
    ClassDef {
        name: String,
        line: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallSite {
    /// Dotted signature such as `subprocess.run` or `self.llm.bind_tools`
    pub signature: String,
    pub line: usize,
    pub positional: Vec<ArgValue>,
    pub keywords: Vec<(String, ArgValue)>,
}

impl CallSite {
    pub fn keyword(&self, name: &str) -> Option<&ArgValue> {
        self.keywords
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}

/// Shallow view of an argument expression
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Name(String),
    Bool(bool),
    Int(i64),
    None,
    Str,
    Other,
}

impl ArgValue {
    /// Literal constant that Python would treat as true
    pub fn is_truthy_literal(&self) -> bool {
        match self {
            ArgValue::Bool(value) => *value,
            ArgValue::Int(value) => *value != 0,
            _ => false,
        }
    }
}

fn events_for(node: Node, src: &[u8]) -> Vec<SourceEvent> {
    let line = node.start_position().row + 1;
    if node.kind() == "import_statement" {
        return imported_modules(node, src)
            .into_iter()
            .map(|module| SourceEvent::Import { module, line })
            .collect();
    }
    event_for(node, src, line).into_iter().collect()
}

fn event_for(node: Node, src: &[u8], line: usize) -> Option<SourceEvent> {
    match node.kind() {
        "call" => {
            let function = node.child_by_field_name("function")?;
            let signature = resolve_signature(function, src)?;
            let (positional, keywords) = node
                .child_by_field_name("arguments")
                .map(|args| collect_arguments(args, src))
                .unwrap_or_default();
            Some(SourceEvent::Call(CallSite {
                signature,
                line,
                positional,
                keywords,
            }))
        }
        "import_from_statement" => {
            let module = node.child_by_field_name("module_name")?;
            if module.kind() == "relative_import" {
                return None;
            }
            Some(SourceEvent::Import {
                module: text(module, src).to_string(),
                line,
            })
        }
        "assignment" | "augmented_assignment" => {
            let left = node.child_by_field_name("left")?;
            let targets = assignment_targets(left, src);
            if targets.is_empty() {
                None
            } else {
                Some(SourceEvent::Assign { targets, line })
            }
        }
        "function_definition" => {
            let name = node.child_by_field_name("name").map(|n| text(n, src))?;
            let params = node
                .child_by_field_name("parameters")
                .map(|p| parameter_names(p, src))
                .unwrap_or_default();
            Some(SourceEvent::FunctionDef {
                name: name.to_string(),
                params,
                line,
            })
        }
        "class_definition" => {
            let name = node.child_by_field_name("name").map(|n| text(n, src))?;
            Some(SourceEvent::ClassDef {
                name: name.to_string(),
                line,
            })
        }
        _ => None,
    }
}

fn text<'a>(node: Node, src: &'a [u8]) -> &'a str {
    node.utf8_text(src).unwrap_or("")
}

/// Resolve a call target into a dotted signature.
///
/// Attribute chains are followed down to their root name. When the root is
/// not a plain name (`get_client().post`), the resolvable suffix is used.
pub fn resolve_signature(node: Node, src: &[u8]) -> Option<String> {
    match node.kind() {
        "identifier" => Some(text(node, src).to_string()),
        "attribute" => {
            let attr = text(node.child_by_field_name("attribute")?, src);
            match node
                .child_by_field_name("object")
                .and_then(|object| resolve_signature(object, src))
            {
                Some(prefix) => Some(format!("{}.{}", prefix, attr)),
                None => Some(attr.to_string()),
            }
        }
        _ => None,
    }
}

fn collect_arguments(args: Node, src: &[u8]) -> (Vec<ArgValue>, Vec<(String, ArgValue)>) {
    let mut positional = Vec::new();
    let mut keywords = Vec::new();
    let mut cursor = args.walk();
    for child in args.named_children(&mut cursor) {
        match child.kind() {
            "keyword_argument" => {
                let name = child
                    .child_by_field_name("name")
                    .map(|n| text(n, src).to_string())
                    .unwrap_or_default();
                let value = child
                    .child_by_field_name("value")
                    .map(|v| arg_value(v, src))
                    .unwrap_or(ArgValue::Other);
                keywords.push((name, value));
            }
            "comment" => {}
            _ => positional.push(arg_value(child, src)),
        }
    }
    (positional, keywords)
}

fn arg_value(node: Node, src: &[u8]) -> ArgValue {
    match node.kind() {
        "identifier" => ArgValue::Name(text(node, src).to_string()),
        "true" => ArgValue::Bool(true),
        "false" => ArgValue::Bool(false),
        "none" => ArgValue::None,
        "integer" => text(node, src)
            .replace('_', "")
            .parse::<i64>()
            .map(ArgValue::Int)
            .unwrap_or(ArgValue::Other),
        "string" | "concatenated_string" => ArgValue::Str,
        _ => ArgValue::Other,
    }
}

fn imported_modules(node: Node, src: &[u8]) -> Vec<String> {
    let mut modules = Vec::new();
    let mut cursor = node.walk();
    for child in node.children_by_field_name("name", &mut cursor) {
        let module = match child.kind() {
            "aliased_import" => child
                .child_by_field_name("name")
                .map(|n| text(n, src).to_string()),
            _ => Some(text(child, src).to_string()),
        };
        if let Some(module) = module.filter(|m| !m.is_empty()) {
            modules.push(module);
        }
    }
    modules
}

fn assignment_targets(left: Node, src: &[u8]) -> Vec<String> {
    match left.kind() {
        "identifier" | "attribute" => resolve_signature(left, src).into_iter().collect(),
        "subscript" => left
            .child_by_field_name("value")
            .and_then(|value| resolve_signature(value, src))
            .into_iter()
            .collect(),
        "pattern_list" | "tuple_pattern" | "list_pattern" => {
            let mut cursor = left.walk();
            let children: Vec<Node> = left.named_children(&mut cursor).collect();
            children
                .into_iter()
                .flat_map(|child| assignment_targets(child, src))
                .collect()
        }
        _ => Vec::new(),
    }
}

fn parameter_names(params: Node, src: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    let mut cursor = params.walk();
    for param in params.named_children(&mut cursor) {
        let name = match param.kind() {
            "identifier" => Some(text(param, src)),
            "default_parameter" | "typed_default_parameter" => {
                param.child_by_field_name("name").map(|n| text(n, src))
            }
            "typed_parameter" | "list_splat_pattern" | "dictionary_splat_pattern" => {
                let mut inner = param.walk();
                let found = param
                    .named_children(&mut inner)
                    .find(|c| c.kind() == "identifier")
                    .map(|n| text(n, src));
                found
            }
            _ => None,
        };
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            names.push(name.to_string());
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Vec<SourceEvent>);

    impl Visitor for Recorder {
        fn visit(&mut self, event: &SourceEvent) {
            self.0.push(event.clone());
        }
    }

    fn events(src: &str) -> Vec<SourceEvent> {
        let tree = SourceTree::parse(Path::new("t.py"), src).expect("valid python");
        let mut recorder = Recorder::default();
        tree.walk(&mut recorder);
        recorder.0
    }

    fn call_signatures(src: &str) -> Vec<String> {
        events(src)
            .into_iter()
            .filter_map(|e| match e {
                SourceEvent::Call(call) => Some(call.signature),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_resolves_nested_attribute_chains() {
        let sigs = call_signatures("self.llm.bind_tools(tools)\nos.path.join(a, b)\n");
        assert_eq!(sigs, vec!["self.llm.bind_tools", "os.path.join"]);
    }

    #[test]
    fn test_call_on_call_uses_suffix() {
        let sigs = call_signatures("get_client().post(url)\n");
        assert_eq!(sigs, vec!["post", "get_client"]);
    }

    #[test]
    fn test_keyword_and_positional_arguments() {
        let evs = events("subprocess.run(cmd, shell=True, check=1)\n");
        let SourceEvent::Call(call) = &evs[0] else {
            panic!("expected call event");
        };
        assert_eq!(call.positional, vec![ArgValue::Name("cmd".into())]);
        assert_eq!(call.keyword("shell"), Some(&ArgValue::Bool(true)));
        assert!(call.keyword("check").unwrap().is_truthy_literal());
    }

    #[test]
    fn test_imports_and_assignments() {
        let evs = events("import pickle\nfrom os import path\nfrom . import local\nos.environ['X'] = '1'\n");
        assert!(evs.contains(&SourceEvent::Import { module: "pickle".into(), line: 1 }));
        assert!(evs.contains(&SourceEvent::Import { module: "os".into(), line: 2 }));
        assert!(!evs.iter().any(|e| matches!(e, SourceEvent::Import { line: 3, .. })));
        assert!(evs.contains(&SourceEvent::Assign { targets: vec!["os.environ".into()], line: 4 }));
    }

    #[test]
    fn test_function_parameters() {
        let evs = events("def handle(self, user_input: str, data=None, *args, **kwargs):\n    pass\n");
        let SourceEvent::FunctionDef { name, params, line } = &evs[0] else {
            panic!("expected function event");
        };
        assert_eq!(name, "handle");
        assert_eq!(*line, 1);
        assert_eq!(params, &vec!["self", "user_input", "data", "args", "kwargs"]);
    }

    #[test]
    fn test_multi_import_statement() {
        let evs = events("import os, pickle as pk\n");
        assert_eq!(
            evs,
            vec![
                SourceEvent::Import { module: "os".into(), line: 1 },
                SourceEvent::Import { module: "pickle".into(), line: 1 },
            ]
        );
    }

    #[test]
    fn test_syntax_error_is_rejected() {
        let err = SourceTree::parse(Path::new("bad.py"), "def broken(:\n    pass\n");
        assert!(matches!(err, Err(AuditError::ParseStructural { .. })));
    }
}
