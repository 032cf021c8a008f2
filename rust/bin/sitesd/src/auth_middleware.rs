//! JWT middleware: resolves every request into a `Caller`.
//!
//! No `Authorization` header means an anonymous caller; reads still work and
//! writes are refused by the store's policies. A header that is present but
//! malformed, badly signed or expired is rejected here with 401.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sites_core::ServiceError;
use sites_store::Caller;

/// JWT claims payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: user id.
    pub sub: String,
    /// Email claim checked against the approval list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Issued at (unix timestamp).
    #[serde(default)]
    pub iat: i64,
    /// Expiration (unix timestamp).
    pub exp: i64,
}

impl Claims {
    pub fn into_caller(self) -> Caller {
        Caller::authenticated(self.sub, self.email)
    }
}

/// Shared JWT configuration for the middleware.
#[derive(Clone)]
pub struct JwtState {
    pub decoding_key: DecodingKey,
    pub validation: Validation,
}

impl JwtState {
    pub fn from_secret(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }
}

/// Decode the bearer token, if any, and store the `Caller` in request extensions.
pub async fn auth_middleware(
    State(jwt_state): State<Arc<JwtState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let caller = match request.headers().get(AUTHORIZATION) {
        None => Caller::Anonymous,
        Some(value) => {
            let token = value
                .to_str()
                .ok()
                .and_then(|v| v.strip_prefix("Bearer "))
                .ok_or_else(|| {
                    ServiceError::Unauthorized("malformed authorization header".into())
                })?;

            let token_data = jsonwebtoken::decode::<Claims>(
                token,
                &jwt_state.decoding_key,
                &jwt_state.validation,
            )
            .map_err(|e| ServiceError::Unauthorized(format!("invalid token: {}", e)))?;

            token_data.claims.into_caller()
        }
    };

    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}
