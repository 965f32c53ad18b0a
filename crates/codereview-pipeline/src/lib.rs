pub mod health;
pub mod orchestrator;

pub use health::{spawn_inference_probe, InferenceHealth, InferenceState, InferenceStatus};
pub use orchestrator::{build_summary, AnalysisOutcome, AnalysisPipeline, PipelineConfig};
