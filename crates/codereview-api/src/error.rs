use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use codereview_core::{ReviewError, UpstreamKind};
use codereview_history::HistoryError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Review(#[from] ReviewError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Review(err) => match err {
                ReviewError::Validation(_) => StatusCode::BAD_REQUEST,
                ReviewError::Upstream {
                    kind: UpstreamKind::Timeout,
                    ..
                } => StatusCode::GATEWAY_TIMEOUT,
                ReviewError::Upstream { .. } | ReviewError::UpstreamFormat(_) => {
                    StatusCode::BAD_GATEWAY
                }
                ReviewError::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
                ReviewError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Review(err) => err.kind(),
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "validation",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<HistoryError> for ApiError {
    fn from(err: HistoryError) -> Self {
        ApiError::Review(err.into())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
