// ABOUTME: Offline suggestion generator built on tree-sitter-python inspection
// ABOUTME: Findings are ordered by severity so truncation keeps the most important

use async_trait::async_trait;
use codereview_core::{AnalysisSettings, Suggestion};
use codereview_metrics::{for_each_node, node_complexity, parse_python};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use tree_sitter::Node;

use crate::generator::{GenerationError, SuggestionGenerator};
use crate::llm_provider::LLMError;

lazy_static! {
    static ref SNAKE_CASE: Regex = Regex::new(r"^[a-z_][a-z0-9_]*$").unwrap();
    static ref PASCAL_CASE: Regex = Regex::new(r"^_?[A-Z][a-zA-Z0-9]*$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone)]
struct Finding {
    severity: Severity,
    line: Option<usize>,
    message: String,
}

impl Finding {
    fn at(severity: Severity, node: Node<'_>, message: String) -> Self {
        Self {
            severity,
            line: Some(node.start_position().row + 1),
            message,
        }
    }

    fn into_suggestion(self) -> Suggestion {
        match self.line {
            Some(line) => Suggestion::new(format!("Line {}: {}", line, self.message)),
            None => Suggestion::new(self.message),
        }
    }
}

/// Static-analysis generator for running without an inference provider.
#[derive(Debug, Clone)]
pub struct RuleBasedGenerator {
    pub max_line_length: usize,
    pub complexity_threshold: u32,
    pub max_parameters: usize,
}

impl Default for RuleBasedGenerator {
    fn default() -> Self {
        Self {
            max_line_length: 88,
            complexity_threshold: 10,
            max_parameters: 5,
        }
    }
}

impl RuleBasedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// All findings for `code`, most severe first; ties keep source order.
    pub fn review(&self, code: &str, settings: &AnalysisSettings) -> Vec<Suggestion> {
        let mut findings = Vec::new();

        for (index, line) in code.lines().enumerate() {
            let length = line.chars().count();
            if length > self.max_line_length {
                findings.push(Finding {
                    severity: Severity::Low,
                    line: Some(index + 1),
                    message: format!(
                        "Line too long ({} characters); break it up using parentheses.",
                        length
                    ),
                });
            }
        }

        if let Some(tree) = parse_python(code) {
            let source = code.as_bytes();
            let root = tree.root_node();
            if settings.security {
                self.check_dangerous_calls(root, source, &mut findings);
            }
            if settings.performance {
                self.check_performance(root, &mut findings);
            }
            self.check_definitions(root, source, &mut findings);
            self.check_unused_imports(root, source, &mut findings);
        }

        findings.sort_by_key(|finding| finding.severity);
        findings
            .into_iter()
            .map(Finding::into_suggestion)
            .collect()
    }

    fn check_dangerous_calls(&self, root: Node<'_>, source: &[u8], findings: &mut Vec<Finding>) {
        for_each_node(root, |node| {
            if node.kind() != "call" {
                return;
            }
            let callee = node
                .child_by_field_name("function")
                .filter(|f| f.kind() == "identifier")
                .and_then(|f| f.utf8_text(source).ok());
            match callee {
                Some("eval") => findings.push(Finding::at(
                    Severity::Critical,
                    node,
                    "Usage of eval() poses security risks; use ast.literal_eval() or parse the input explicitly.".to_string(),
                )),
                Some("exec") => findings.push(Finding::at(
                    Severity::Critical,
                    node,
                    "Usage of exec() poses security risks; avoid it or strictly sanitize its input.".to_string(),
                )),
                _ => {}
            }
        });
    }

    fn check_performance(&self, root: Node<'_>, findings: &mut Vec<Finding>) {
        let mut reported_loops = HashSet::new();
        for_each_node(root, |node| match node.kind() {
            "for_statement" => {
                let mut concatenates = false;
                for_each_node(node, |child| {
                    if child.kind() == "augmented_assignment"
                        && child
                            .child_by_field_name("operator")
                            .map(|op| op.kind() == "+=")
                            .unwrap_or(false)
                    {
                        concatenates = true;
                    }
                });
                if concatenates && reported_loops.insert(node.start_position().row) {
                    findings.push(Finding::at(
                        Severity::Medium,
                        node,
                        "Avoid concatenation with += inside loops; use list.extend(), str.join() or a comprehension.".to_string(),
                    ));
                }
            }
            "global_statement" => findings.push(Finding::at(
                Severity::Low,
                node,
                "Global variables hurt performance and maintainability; pass values as parameters or use class attributes.".to_string(),
            )),
            _ => {}
        });
    }

    fn check_definitions(&self, root: Node<'_>, source: &[u8], findings: &mut Vec<Finding>) {
        for_each_node(root, |node| {
            let is_function = match node.kind() {
                "function_definition" => true,
                "class_definition" => false,
                _ => return,
            };
            let Some(name) = node
                .child_by_field_name("name")
                .and_then(|n| n.utf8_text(source).ok())
            else {
                return;
            };

            if is_function {
                let complexity = node_complexity(node);
                if complexity > self.complexity_threshold {
                    findings.push(Finding::at(
                        Severity::High,
                        node,
                        format!(
                            "Function '{}' has high cyclomatic complexity ({}); split it into smaller functions.",
                            name, complexity
                        ),
                    ));
                }

                let parameters = node
                    .child_by_field_name("parameters")
                    .map(|p| {
                        let mut cursor = p.walk();
                        p.named_children(&mut cursor)
                            .filter(|c| c.kind() != "comment")
                            .count()
                    })
                    .unwrap_or(0);
                if parameters > self.max_parameters {
                    findings.push(Finding::at(
                        Severity::Medium,
                        node,
                        format!(
                            "Function '{}' has too many parameters ({}); group related values into a dataclass or object.",
                            name, parameters
                        ),
                    ));
                }

                if !SNAKE_CASE.is_match(name) {
                    findings.push(Finding::at(
                        Severity::Low,
                        node,
                        format!(
                            "Function name '{}' doesn't follow snake_case; rename it to '{}'.",
                            name,
                            to_snake_case(name)
                        ),
                    ));
                }
            } else if !PASCAL_CASE.is_match(name) {
                findings.push(Finding::at(
                    Severity::Low,
                    node,
                    format!("Class name '{}' doesn't follow PascalCase.", name),
                ));
            }

            if !has_docstring(node) {
                let what = if is_function { "Function" } else { "Class" };
                findings.push(Finding::at(
                    Severity::Low,
                    node,
                    format!("{} '{}' is missing a docstring.", what, name),
                ));
            }
        });
    }

    fn check_unused_imports(&self, root: Node<'_>, source: &[u8], findings: &mut Vec<Finding>) {
        let mut imports = Vec::new();
        for_each_node(root, |node| {
            if matches!(node.kind(), "import_statement" | "import_from_statement") {
                imports.push(node);
            }
        });
        if imports.is_empty() {
            return;
        }

        let inside_import = |node: Node<'_>| {
            imports
                .iter()
                .any(|imp| node.start_byte() >= imp.start_byte() && node.end_byte() <= imp.end_byte())
        };
        let mut used = HashSet::new();
        for_each_node(root, |node| {
            if node.kind() == "identifier" && !inside_import(node) {
                if let Ok(text) = node.utf8_text(source) {
                    used.insert(text);
                }
            }
        });

        for import in &imports {
            for binding in import_bindings(*import, source) {
                if !used.contains(binding) {
                    findings.push(Finding::at(
                        Severity::Low,
                        *import,
                        format!("Import '{}' appears to be unused; remove it.", binding),
                    ));
                }
            }
        }
    }
}

#[async_trait]
impl SuggestionGenerator for RuleBasedGenerator {
    async fn generate(
        &self,
        code: &str,
        settings: &AnalysisSettings,
        limit: usize,
    ) -> Result<Vec<Suggestion>, GenerationError> {
        // Tree-sitter parsing is CPU-bound; keep it off the async workers.
        let generator = self.clone();
        let code = code.to_string();
        let settings = *settings;
        let mut suggestions =
            tokio::task::spawn_blocking(move || generator.review(&code, &settings))
                .await
                .map_err(|e| {
                    GenerationError::Provider(LLMError::Config(format!(
                        "rule-based review task failed: {}",
                        e
                    )))
                })?;
        suggestions.truncate(limit);
        Ok(suggestions)
    }

    fn name(&self) -> &str {
        "rules"
    }
}

/// Names an import statement binds in the module namespace.
fn import_bindings<'s>(import: Node<'_>, source: &'s [u8]) -> Vec<&'s str> {
    let mut cursor = import.walk();
    let targets: Vec<Node<'_>> = if import.kind() == "import_from_statement" {
        import.children_by_field_name("name", &mut cursor).collect()
    } else {
        import.named_children(&mut cursor).collect()
    };

    targets
        .into_iter()
        .filter_map(|target| match target.kind() {
            "aliased_import" => target
                .child_by_field_name("alias")
                .and_then(|alias| alias.utf8_text(source).ok()),
            // `import a.b` binds `a`
            "dotted_name" => target
                .utf8_text(source)
                .ok()
                .and_then(|text| text.split('.').next()),
            _ => None,
        })
        .collect()
}

fn has_docstring(definition: Node<'_>) -> bool {
    let Some(body) = definition.child_by_field_name("body") else {
        return false;
    };
    let mut cursor = body.walk();
    let first = body
        .named_children(&mut cursor)
        .find(|child| child.kind() != "comment");
    first
        .filter(|stmt| stmt.kind() == "expression_statement")
        .and_then(|stmt| stmt.named_child(0))
        .map(|expr| expr.kind() == "string")
        .unwrap_or(false)
}

fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut previous: Option<char> = None;
    for ch in name.chars() {
        if ch.is_uppercase() {
            if previous.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit()) {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
        previous = Some(ch);
    }
    out
}
