use crate::{handlers, health, metrics, AppState};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Analysis
        .route("/analyze-code", post(handlers::analyze_code))
        // History
        .route("/analysis-history", get(handlers::analysis_history))
        .route("/analysis-history/{id}", get(handlers::analysis_by_id))
        // Operations
        .route("/health", get(health::health_check))
        .route("/agent-status", get(handlers::agent_status))
        .route("/metrics", get(metrics::metrics_handler))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(TraceLayer::new_for_http())
}
