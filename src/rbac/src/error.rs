//! Error types for the access-control core

use thiserror::Error;

/// Access-control errors
#[derive(Debug, Error)]
pub enum RbacError {
    /// No credential was presented with the request
    #[error("Missing credential")]
    MissingCredential,

    /// Credential is malformed, badly signed or expired
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// Role does not exist in the permission store
    #[error("Role not found: {0}")]
    RoleNotFound(String),

    /// Permission does not exist in the permission store
    #[error("Permission not found: {0}")]
    PermissionNotFound(String),

    /// Uniqueness constraint of the permission model would be violated
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Permission string could not be decoded
    #[error("Invalid permission string: {0}")]
    InvalidPermissionString(String),

    /// Permission store could not be reached or timed out
    #[error("Permission store unavailable: {0}")]
    StoreUnavailable(String),

    /// Valid credential without the required grant
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Credential signing failed
    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RbacError {
    /// Whether the error is an infrastructure failure rather than an
    /// authentication or authorization outcome.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            RbacError::StoreUnavailable(_) | RbacError::Token(_) | RbacError::Config(_)
        )
    }

    /// Whether the error means the caller is not authenticated.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            RbacError::MissingCredential | RbacError::InvalidCredential(_)
        )
    }
}

/// Result type for access-control operations
pub type Result<T> = std::result::Result<T, RbacError>;
