//! JSON error envelopes for [`AppError`].
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::core::error::AppError;

const INTERNAL_MESSAGE: &str = "the server encountered a problem and could not process your request";

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Denied => StatusCode::TOO_MANY_REQUESTS,
            AppError::InvalidCredential
            | AppError::InvalidLogin
            | AppError::AuthenticationRequired
            | AppError::InactiveAccount => StatusCode::UNAUTHORIZED,
            AppError::NotPermitted => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::EditConflict => StatusCode::CONFLICT,
            AppError::FailedValidation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            AppError::FailedValidation(fields) => json!({ "error": fields }),
            AppError::Internal(detail) => {
                tracing::error!(error = %detail, "Internal error");
                json!({ "error": INTERNAL_MESSAGE })
            }
            other => json!({ "error": other.to_string() }),
        };

        let mut response = (status, Json(body)).into_response();
        if matches!(self, AppError::InvalidCredential) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// The generic 500 envelope, without logging.
pub fn internal_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": INTERNAL_MESSAGE })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_credential_carries_challenge() {
        let response = AppError::InvalidCredential.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
        assert_eq!(
            body_json(response).await["error"],
            "invalid or missing authentication token"
        );
    }

    #[tokio::test]
    async fn test_internal_detail_is_hidden() {
        let response = AppError::internal("connection pool exhausted").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"], INTERNAL_MESSAGE);
    }

    #[tokio::test]
    async fn test_validation_errors_are_a_field_map() {
        let response = AppError::invalid_field("title", "must be provided").into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await["error"]["title"], "must be provided");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::Denied.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(AppError::EditConflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::NotPermitted.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::InactiveAccount.status_code(), StatusCode::UNAUTHORIZED);
    }
}
