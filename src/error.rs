use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Engine-wide error taxonomy. Every handler returns one of these; the
/// router maps it onto an HTTP status and a `{"error": …}` envelope.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Upstream market-data or bridge call failed or timed out.
    #[error("upstream unavailable: {0}")]
    Upstream(String),

    /// Upstream refused the call because of its rate limit; retryable.
    #[error("upstream rate limited: {0}")]
    RateLimited(String),

    /// The request payload is missing or malformed.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Not enough candles for the requested analysis.
    #[error("insufficient data: need at least {required} candles, have {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// A store read or write failed.
    #[error("store failure: {0}")]
    Store(String),

    /// The execution provider reported a failure for one endpoint.
    #[error("provider failure at {endpoint}: {message}")]
    Provider { endpoint: String, message: String },

    /// A required configuration value is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The action router received an action it does not know.
    #[error("unknown action: {0}")]
    UnknownAction(String),
}

impl EngineError {
    pub fn provider(endpoint: &str, message: impl Into<String>) -> Self {
        Self::Provider {
            endpoint: endpoint.to_string(),
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::UnknownAction(_) => StatusCode::BAD_REQUEST,
            Self::InsufficientData { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Store(_) | Self::Provider { .. } | Self::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Store(e.to_string())
    }
}

impl From<garde::Report> for EngineError {
    fn from(report: garde::Report) -> Self {
        Self::Validation(report.to_string())
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_taxonomy() {
        assert_eq!(
            EngineError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            EngineError::UnknownAction("nope".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            EngineError::RateLimited("slow down".into()).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            EngineError::Upstream("timeout".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            EngineError::InsufficientData {
                required: 27,
                actual: 3
            }
            .status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            EngineError::provider("/order/execute", "rejected").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn provider_error_names_the_endpoint() {
        let e = EngineError::provider("/order/close", "ticket not found");
        assert!(e.to_string().contains("/order/close"));
        assert!(e.to_string().contains("ticket not found"));
    }
}
