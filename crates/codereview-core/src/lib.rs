pub mod config;
pub mod error;
pub mod types;

pub use config::{
    AnalysisConfig, HistoryBackend, HistoryConfig, InferenceConfig, LoggingConfig, ServerConfig,
    Settings,
};
pub use error::*;
pub use types::*;
