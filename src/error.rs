use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Error taxonomy for the API. Everything except `Internal` is operational:
/// it carries a stable, user-facing message. `Internal` is logged with full
/// detail server-side and surfaced as a generic failure.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("You are not logged in! Please log in to get access.")]
    Unauthenticated,
    #[error("Invalid token. Please log in again!")]
    InvalidToken,
    #[error("Your token has expired! Please log in again.")]
    TokenExpired,
    #[error("User recently changed password! Please log in again.")]
    StaleCredential,
    #[error("The user belonging to this token does no longer exist.")]
    UserGone,
    #[error("Incorrect email or password!")]
    IncorrectCredentials,
    #[error("You do not have permission to perform this action!")]
    Forbidden,
    #[error("Your current password is wrong!")]
    WrongPassword,
    #[error("Token is invalid or has expired!")]
    InvalidOrExpired,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("There was an error sending the email. Try again later!")]
    DispatchFailed,
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated
            | ApiError::InvalidToken
            | ApiError::TokenExpired
            | ApiError::StaleCredential
            | ApiError::UserGone
            | ApiError::IncorrectCredentials
            | ApiError::WrongPassword => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::InvalidOrExpired | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::DispatchFailed | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        if matches!(err, sqlx::Error::RowNotFound) {
            return ApiError::NotFound("No document found with that ID".into());
        }
        if let sqlx::Error::Database(db) = &err {
            // 23505 = unique_violation
            if db.code().as_deref() == Some("23505") {
                return ApiError::Conflict("Duplicate field value. Please use another value!".into());
            }
        }
        ApiError::Internal(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Internal(err) => {
                error!(error = ?err, "unhandled internal error");
                "Something went very wrong!".to_string()
            }
            other => other.to_string(),
        };
        let label = if status.is_client_error() { "fail" } else { "error" };
        (status, Json(json!({ "status": label, "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_failures_are_unauthorized() {
        for err in [
            ApiError::Unauthenticated,
            ApiError::InvalidToken,
            ApiError::TokenExpired,
            ApiError::StaleCredential,
            ApiError::UserGone,
            ApiError::IncorrectCredentials,
            ApiError::WrongPassword,
        ] {
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn status_mapping_for_remaining_kinds() {
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::InvalidOrExpired.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::DispatchFailed.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err = ApiError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn internal_keeps_source_chain() {
        let err = ApiError::from(anyhow::anyhow!("boom"));
        assert!(matches!(err, ApiError::Internal(_)));
        assert_eq!(err.to_string(), "boom");
    }
}
