use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Machine-readable codes sent as `code` in error bodies.
pub mod error_code {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const ALREADY_EXISTS: &str = "ALREADY_EXISTS";
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";
    pub const PERMISSION_DENIED: &str = "PERMISSION_DENIED";
    pub const INTERNAL: &str = "INTERNAL";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
}

/// Errors returned by site and approval operations.
///
/// Renders as `{"code": ..., "message": ...}`. An anonymous or unapproved
/// write is `PermissionDenied`; `Unauthorized` means a bearer token was sent
/// and rejected.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    /// Id already taken on insert.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    /// A policy check failed.
    #[error("{0}")]
    PermissionDenied(String),

    /// The KV backend failed; nothing was written.
    #[error("{0}")]
    Storage(String),

    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => error_code::NOT_FOUND,
            ServiceError::Conflict(_) => error_code::ALREADY_EXISTS,
            ServiceError::Validation(_) => error_code::VALIDATION_FAILED,
            ServiceError::Unauthorized(_) => error_code::UNAUTHENTICATED,
            ServiceError::PermissionDenied(_) => error_code::PERMISSION_DENIED,
            ServiceError::Storage(_) => error_code::STORAGE_ERROR,
            ServiceError::Internal(_) => error_code::INTERNAL,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ServiceError::Storage(_) | ServiceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, ServiceError::PermissionDenied(_))
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({
            "code": self.error_code(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_statuses() {
        let cases = [
            (ServiceError::NotFound("x".into()), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (ServiceError::Conflict("x".into()), StatusCode::CONFLICT, "ALREADY_EXISTS"),
            (ServiceError::Validation("x".into()), StatusCode::BAD_REQUEST, "VALIDATION_FAILED"),
            (ServiceError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
            (ServiceError::PermissionDenied("x".into()), StatusCode::FORBIDDEN, "PERMISSION_DENIED"),
            (ServiceError::Storage("x".into()), StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            (ServiceError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status_code(), status, "{:?}", err);
            assert_eq!(err.error_code(), code, "{:?}", err);
        }
    }

    #[test]
    fn only_policy_failures_are_denials() {
        assert!(ServiceError::PermissionDenied("no".into()).is_permission_denied());
        assert!(!ServiceError::Unauthorized("bad token".into()).is_permission_denied());
    }

    #[test]
    fn denial_renders_forbidden() {
        let resp = ServiceError::PermissionDenied("write on sites denied".into()).into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn display_is_just_message() {
        assert_eq!(ServiceError::NotFound("site 'blue' not found".into()).to_string(), "site 'blue' not found");
    }
}
