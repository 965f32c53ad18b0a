use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use std::sync::Once;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref ANALYSES_TOTAL: Counter =
        Counter::with_opts(Opts::new("codereview_analyses_total", "Total number of completed analyses"))
            .unwrap();

    pub static ref ANALYSIS_FAILURES_TOTAL: CounterVec = CounterVec::new(
        Opts::new("codereview_analysis_failures_total", "Failed analyses by error kind"),
        &["kind"]
    )
    .unwrap();

    pub static ref HISTORY_PERSISTENCE_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "codereview_history_persistence_failures_total",
        "Analyses returned to the caller but not recorded in history"
    ))
    .unwrap();

    pub static ref ANALYSIS_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "codereview_analysis_duration_seconds",
            "Wall-clock duration of the analysis pipeline in seconds"
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0])
    )
    .unwrap();
}

static REGISTER: Once = Once::new();

/// Register all collectors once per process.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(ANALYSES_TOTAL.clone()),
            Box::new(ANALYSIS_FAILURES_TOTAL.clone()),
            Box::new(HISTORY_PERSISTENCE_FAILURES_TOTAL.clone()),
            Box::new(ANALYSIS_DURATION_SECONDS.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                tracing::warn!("Failed to register metric: {}", e);
            }
        }

        #[cfg(target_os = "linux")]
        if let Err(e) = REGISTRY.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        )) {
            tracing::warn!("Failed to register process metrics: {}", e);
        }
    });
}

pub fn record_success(duration_secs: f64, history_persisted: bool) {
    ANALYSES_TOTAL.inc();
    ANALYSIS_DURATION_SECONDS.observe(duration_secs);
    if !history_persisted {
        HISTORY_PERSISTENCE_FAILURES_TOTAL.inc();
    }
}

pub fn record_failure(kind: &str) {
    ANALYSIS_FAILURES_TOTAL.with_label_values(&[kind]).inc();
}

/// Prometheus text exposition of the registry.
pub async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {}", e),
        )
            .into_response();
    }

    (
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}
