use axum::{ http::StatusCode, response::{ IntoResponse, Response }, Json };
use log::{ error, warn };
use serde_json::json;
use thiserror::Error;

pub const UPSTREAM_FAILURE_MESSAGE: &str = "Failed to generate response";
pub const STREAM_FAILURE_MESSAGE: &str = "Error generating streaming response";
pub const MISSING_KEY_MESSAGE: &str = "Upstream API key not configured";

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("upstream transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream timed out")]
    Timeout,

    #[error("method not allowed")]
    MethodNotAllowed,
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            RelayError::Configuration(_)
            | RelayError::Upstream(_)
            | RelayError::Http(_)
            | RelayError::Timeout => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand back to the caller. Upstream details stay in the log.
    pub fn public_message(&self) -> String {
        match self {
            RelayError::InvalidRequest(msg) => msg.clone(),
            RelayError::MethodNotAllowed => "Method not allowed".to_string(),
            RelayError::Configuration(_) => MISSING_KEY_MESSAGE.to_string(),
            RelayError::Upstream(_) | RelayError::Http(_) | RelayError::Timeout => {
                UPSTREAM_FAILURE_MESSAGE.to_string()
            }
        }
    }

    pub fn report(&self) {
        if self.status().is_server_error() {
            error!("Relay request failed: {}", self);
        } else {
            warn!("Relay request rejected: {}", self);
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        self.report();
        (self.status(), Json(json!({ "error": self.public_message() }))).into_response()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conversation '{0}' not found")]
    NotFound(String),

    #[error("store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
