// ABOUTME: Cyclomatic complexity calculation from tree-sitter-python syntax trees
// ABOUTME: Iterative traversal so deeply nested snippets cannot exhaust the stack

use tree_sitter::{Node, Parser, Tree};

/// Complexity reported when no syntax tree is available.
pub const BASELINE_COMPLEXITY: u32 = 1;

/// Parse a snippet as Python. tree-sitter recovers from syntax errors, so
/// this only returns `None` if the grammar cannot be loaded.
pub fn parse_python(code: &str) -> Option<Tree> {
    let mut parser = Parser::new();
    if let Err(e) = parser.set_language(&tree_sitter_python::LANGUAGE.into()) {
        tracing::warn!("Failed to load Python grammar: {}", e);
        return None;
    }
    parser.parse(code, None)
}

/// Formula: 1 + count(decision_points) over the whole snippet.
pub fn cyclomatic_complexity(tree: Option<&Tree>) -> u32 {
    match tree {
        Some(tree) => BASELINE_COMPLEXITY + count_decision_points(tree.root_node()),
        None => BASELINE_COMPLEXITY,
    }
}

/// Complexity of a single subtree, e.g. one function definition.
pub fn node_complexity(node: Node<'_>) -> u32 {
    BASELINE_COMPLEXITY + count_decision_points(node)
}

pub fn count_decision_points(root: Node<'_>) -> u32 {
    let mut count = 0;
    for_each_node(root, |node| {
        if is_decision_point(node.kind()) {
            count += 1;
        }
    });
    count
}

/// Pre-order visit of every node below (and including) `root`.
pub fn for_each_node<'t>(root: Node<'t>, mut visit: impl FnMut(Node<'t>)) {
    let mut cursor = root.walk();
    loop {
        visit(cursor.node());
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return;
            }
        }
    }
}

/// Branches in Python control flow. Each `boolean_operator` node holds
/// exactly one `and`/`or`, so chains count once per operator.
fn is_decision_point(kind: &str) -> bool {
    matches!(
        kind,
        "if_statement"
            | "elif_clause"
            | "for_statement"
            | "while_statement"
            | "except_clause"
            | "conditional_expression"
            | "boolean_operator"
            // Comprehensions
            | "for_in_clause"
            | "if_clause"
            // match (3.10+)
            | "case_clause"
    )
}
