//! Error handling

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::info;

use crate::caption::CaptionError;
use crate::constants::GENERATION_FAILED_MESSAGE;

/// definitions for the web side of the application.
#[derive(Debug)]
pub enum CaptionAiError {
    /// When you didn't do the right thing
    BadRequest(String),
    /// Missing or invalid session/CSRF token
    Unauthorized,
    /// When a requested resource is not found
    NotFound(String),
    /// When an internal server error occurs
    InternalServerError(String),
    /// A caption request failed; the detail is logged, never returned
    Generation(CaptionError),
}

impl std::fmt::Display for CaptionAiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(reason) => write!(f, "Bad request: {reason}"),
            Self::Unauthorized => write!(f, "Unauthorized"),
            Self::NotFound(what) => write!(f, "Not found: {what}"),
            Self::InternalServerError(message) => write!(f, "Internal server error: {message}"),
            Self::Generation(err) => write!(f, "Caption generation failed: {err}"),
        }
    }
}

impl std::error::Error for CaptionAiError {}

impl From<axum::http::Error> for CaptionAiError {
    fn from(err: axum::http::Error) -> Self {
        CaptionAiError::InternalServerError(err.to_string())
    }
}

impl From<tower_sessions::session::Error> for CaptionAiError {
    fn from(err: tower_sessions::session::Error) -> Self {
        CaptionAiError::InternalServerError(format!("session: {err}"))
    }
}

impl From<CaptionError> for CaptionAiError {
    fn from(err: CaptionError) -> Self {
        CaptionAiError::Generation(err)
    }
}

impl IntoResponse for CaptionAiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            CaptionAiError::BadRequest(reason) => {
                info!("Bad request received: {reason}");
                (StatusCode::BAD_REQUEST, "Bad Request").into_response()
            }
            CaptionAiError::Unauthorized => {
                info!("Unauthorized request received");
                (
                    StatusCode::UNAUTHORIZED,
                    "Unauthorized: invalid or missing session.",
                )
                    .into_response()
            }
            CaptionAiError::NotFound(what) => {
                tracing::debug!("404 {what}");
                (StatusCode::NOT_FOUND, "Not Found").into_response()
            }
            CaptionAiError::InternalServerError(message) => {
                tracing::error!("Internal server error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
            CaptionAiError::Generation(err) => {
                let status = match err {
                    CaptionError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                    CaptionError::Generation(_) | CaptionError::OutputValidation(_) => {
                        StatusCode::BAD_GATEWAY
                    }
                };
                (status, Json(json!({ "error": GENERATION_FAILED_MESSAGE }))).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_errors_hide_their_detail() {
        let response = CaptionAiError::from(CaptionError::OutputValidation(
            "missing field `hashtags`".to_string(),
        ))
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let response =
            CaptionAiError::from(CaptionError::InvalidInput("empty".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
