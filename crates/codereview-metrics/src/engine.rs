use codereview_core::Metrics;
use std::collections::HashSet;
use tree_sitter::Tree;

use crate::complexity::{cyclomatic_complexity, for_each_node, parse_python};

/// Pure, synchronous metrics computation. Never fails: input that does not
/// parse cleanly still yields an exact line count and best-effort scores.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsEngine;

impl MetricsEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn compute(&self, code: &str) -> Metrics {
        let tree = parse_python(code);
        let lines = LineCounts::classify(code, tree.as_ref());
        let complexity = cyclomatic_complexity(tree.as_ref());

        Metrics {
            lines_of_code: lines.total,
            cyclomatic_complexity: complexity,
            maintainability_index: maintainability_index(complexity, &lines),
            code_coverage_estimate: coverage_estimate(tree.as_ref(), code),
        }
    }
}

/// Line breakdown used by the maintainability heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineCounts {
    pub total: u32,
    pub code: u32,
    pub comment: u32,
    pub blank: u32,
}

impl LineCounts {
    pub fn classify(code: &str, tree: Option<&Tree>) -> Self {
        let doc_rows = tree.map(docstring_rows).unwrap_or_default();
        let mut counts = LineCounts::default();

        for (row, line) in code.lines().enumerate() {
            counts.total += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                counts.blank += 1;
            } else if trimmed.starts_with('#') || doc_rows.contains(&row) {
                counts.comment += 1;
            } else {
                counts.code += 1;
            }
        }

        counts
    }

    fn comment_ratio(&self) -> f64 {
        let documented = self.code + self.comment;
        if documented == 0 {
            0.0
        } else {
            self.comment as f64 / documented as f64
        }
    }
}

/// Rows covered by bare string statements (docstrings and block strings).
fn docstring_rows(tree: &Tree) -> HashSet<usize> {
    let mut rows = HashSet::new();
    for_each_node(tree.root_node(), |node| {
        if node.kind() != "expression_statement" || node.named_child_count() != 1 {
            return;
        }
        let is_string = node
            .named_child(0)
            .map(|child| child.kind() == "string")
            .unwrap_or(false);
        if is_string {
            rows.extend(node.start_position().row..=node.end_position().row);
        }
    });
    rows
}

/// Normalized 0-100 score:
/// (171 - 0.23*CC - 16.2*ln(SLOC) + 50*sin(sqrt(2.4*comment_ratio))) * 100/171
///
/// Non-increasing in CC and SLOC, non-decreasing in comment ratio
/// (sqrt(2.4) < pi/2 keeps the sine term monotonic on [0, 1]).
pub fn maintainability_index(complexity: u32, lines: &LineCounts) -> f64 {
    let sloc = lines.code.max(1) as f64;
    let raw = 171.0 - 0.23 * complexity as f64 - 16.2 * sloc.ln()
        + 50.0 * (2.4 * lines.comment_ratio()).sqrt().sin();
    round2((raw * 100.0 / 171.0).clamp(0.0, 100.0))
}

/// Speculative estimate; no tests are run. Counts test functions and
/// assertions found in the snippet against the other functions it defines.
pub fn coverage_estimate(tree: Option<&Tree>, code: &str) -> f64 {
    let Some(tree) = tree else {
        return 0.0;
    };

    let source = code.as_bytes();
    let mut functions = 0u32;
    let mut test_functions = 0u32;
    let mut assertions = 0u32;

    for_each_node(tree.root_node(), |node| match node.kind() {
        "function_definition" => {
            functions += 1;
            let is_test = node
                .child_by_field_name("name")
                .and_then(|name| name.utf8_text(source).ok())
                .map(|name| name.starts_with("test"))
                .unwrap_or(false);
            if is_test {
                test_functions += 1;
            }
        }
        "assert_statement" => assertions += 1,
        _ => {}
    });

    if test_functions == 0 && assertions == 0 {
        return 0.0;
    }

    let subjects = functions.saturating_sub(test_functions).max(1) as f64;
    let exercised = test_functions as f64 + assertions as f64 * 0.5;
    round2((exercised / subjects * 100.0).min(100.0))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
