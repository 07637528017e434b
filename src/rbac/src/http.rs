//! axum integration: credential extraction and rejection responses

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::claims::{Claims, PermissionMap};
use crate::engine::{AccessEngine, Rejection};
use crate::error::RbacError;
use crate::token::{bearer_token, TokenVerifier};

/// Shared access-control state for handlers
#[derive(Clone)]
pub struct RbacState {
    pub verifier: Arc<TokenVerifier>,
    pub engine: Arc<AccessEngine>,
}

impl RbacState {
    pub fn new(verifier: TokenVerifier, engine: AccessEngine) -> Self {
        Self {
            verifier: Arc::new(verifier),
            engine: Arc::new(engine),
        }
    }
}

/// Verified caller identity, extracted from the `Authorization` header
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: Claims,
}

impl AuthContext {
    /// Permissions embedded in the caller's credential, if any
    pub fn permissions(&self) -> Option<PermissionMap> {
        PermissionMap::from_claims(&self.claims)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    RbacState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Rejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let rbac = RbacState::from_ref(state);

        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let token = bearer_token(header)
            .map_err(|_| Rejection::Unauthenticated("No token provided".to_string()))?;

        let claims = rbac.verifier.verify(token).map_err(|e| {
            warn!("Rejected credential on {}: {}", parts.uri.path(), e);
            match e {
                RbacError::InvalidCredential(_) => {
                    Rejection::Unauthenticated("Invalid or expired token".to_string())
                }
                other => Rejection::from(other),
            }
        })?;

        Ok(Self { claims })
    }
}

/// Error response body
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Rejection::Forbidden(_) => StatusCode::FORBIDDEN,
            Rejection::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            Rejection::Unauthenticated(_) => "unauthenticated",
            Rejection::Forbidden(_) => "forbidden",
            Rejection::Internal(_) => "internal_error",
        };

        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: self.message().to_string(),
        });

        if status == StatusCode::UNAUTHORIZED {
            (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}
