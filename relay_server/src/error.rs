//! Relay error type and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use connectors_common::errors::ConnectorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("upstream error: {0}")]
    Connector(#[from] ConnectorError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bad request: {0}")]
    BadRequest(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Connector(_) => StatusCode::BAD_GATEWAY,
            RelayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::warn!("request failed: {}", self);
        }
        (status, Json(serde_json::json!({ "ok": false, "error": self.to_string() }))).into_response()
    }
}
