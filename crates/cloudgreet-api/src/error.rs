//! HTTP error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cloudgreet_common::Error;
use serde::Serialize;
use tracing::error;

/// Error body returned by every endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Handler error; wraps the shared error taxonomy
#[derive(Debug)]
pub struct ApiError(pub Error);

/// Convenience type alias for handler return values
pub type ApiResult<T> = Result<T, ApiError>;

impl<E> From<E> for ApiError
where
    E: Into<Error>,
{
    fn from(err: E) -> Self {
        ApiError(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = if self.0.is_client_error() {
            self.0.to_string()
        } else {
            error!(code = self.0.code(), error = %self.0, "Request failed");
            match &self.0 {
                Error::Dispatch(_) => "Upstream provider error".to_string(),
                _ => "An internal error occurred".to_string(),
            }
        };

        let body = ErrorResponse {
            error: message,
            code: self.0.code().to_string(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(err: Error) -> (StatusCode, serde_json::Value) {
        let response = ApiError(err).into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn client_errors_keep_their_message() {
        let (status, body) = body_of(Error::validation("Sequence name is required")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "Sequence name is required");
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let (status, body) = body_of(Error::InvalidTransition {
            from: "active".into(),
            to: "draft".into(),
        })
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "INVALID_TRANSITION");
    }

    #[tokio::test]
    async fn server_errors_are_sanitized() {
        let (status, body) = body_of(Error::Database("password authentication failed".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "An internal error occurred");
        assert_eq!(body["code"], "DATABASE_ERROR");
    }
}
