use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Faults the gateway reports on its own behalf.
///
/// A declined credential check or missing session is not an error here;
/// those are status translations handled by the forwarding path. This enum
/// covers the cases where the gateway cannot complete the forward at all.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("upstream call failed: {0}")]
    Upstream(String),
    #[error("internal server error")]
    Internal,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetails<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorDetails<'a> {
    code: &'a str,
    message: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            GatewayError::Upstream(message) => {
                (StatusCode::BAD_GATEWAY, "upstream_error", message.clone())
            }
            GatewayError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                self.to_string(),
            ),
        };

        let mut response = Json(ErrorBody {
            error: ErrorDetails { code, message },
        })
        .into_response();
        *response.status_mut() = status;
        response
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            GatewayError::Upstream("request to auth service timed out".to_string())
        } else if error.is_connect() {
            GatewayError::Upstream("auth service is unreachable".to_string())
        } else {
            GatewayError::Upstream(error.to_string())
        }
    }
}
