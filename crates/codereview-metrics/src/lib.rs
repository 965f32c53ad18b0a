pub mod complexity;
pub mod engine;

pub use complexity::{
    count_decision_points, cyclomatic_complexity, for_each_node, node_complexity, parse_python,
    BASELINE_COMPLEXITY,
};
pub use engine::{coverage_estimate, maintainability_index, LineCounts, MetricsEngine};
