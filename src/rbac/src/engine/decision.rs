//! Access decision types and outward rejection signals

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RbacError;

/// Which stage of the engine produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionPath {
    /// Permissions embedded in the credential
    Token,

    /// Live lookup through the permission cache and store
    Store,

    /// Role membership check
    Role,
}

/// Access decision with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessDecision {
    /// Unique decision ID
    pub id: String,

    /// Whether the request is allowed
    pub allowed: bool,

    /// Stage that decided
    pub path: DecisionPath,

    /// Reason for the decision
    pub reason: String,

    /// Decision timestamp (milliseconds since epoch)
    pub timestamp: i64,
}

impl AccessDecision {
    /// Create an allow decision
    pub fn allow(path: DecisionPath, reason: impl Into<String>) -> Self {
        Self::new(true, path, reason.into())
    }

    /// Create a deny decision
    pub fn deny(path: DecisionPath, reason: impl Into<String>) -> Self {
        Self::new(false, path, reason.into())
    }

    fn new(allowed: bool, path: DecisionPath, reason: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            allowed,
            path,
            reason,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// Outcome of the fast path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastPath {
    /// Embedded permissions grant the request
    Granted,

    /// Embedded permissions are present but do not grant the request
    NoMatch,

    /// The credential carries no usable permission claim
    NoClaims,
}

/// The three distinguishable ways a request can be turned away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// No credential, or the credential failed verification
    Unauthenticated(String),

    /// Valid credential without the required grant
    Forbidden(String),

    /// Infrastructure failure; never treated as an allow
    Internal(String),
}

impl Rejection {
    pub fn message(&self) -> &str {
        match self {
            Rejection::Unauthenticated(msg) | Rejection::Forbidden(msg) | Rejection::Internal(msg) => msg,
        }
    }
}

impl From<RbacError> for Rejection {
    fn from(err: RbacError) -> Self {
        if err.is_unauthenticated() {
            Rejection::Unauthenticated(err.to_string())
        } else if err.is_internal() {
            Rejection::Internal(err.to_string())
        } else {
            Rejection::Forbidden(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_decision() {
        let decision = AccessDecision::allow(DecisionPath::Token, "granted by credential");

        assert!(decision.allowed);
        assert_eq!(decision.path, DecisionPath::Token);
        assert!(!decision.id.is_empty());
        assert!(decision.timestamp > 0);
    }

    #[test]
    fn test_deny_decision() {
        let decision = AccessDecision::deny(DecisionPath::Store, "no grant");

        assert!(!decision.allowed);
        assert_eq!(decision.path, DecisionPath::Store);
    }

    #[test]
    fn test_decision_serializes_path() {
        let decision = AccessDecision::allow(DecisionPath::Role, "role allowed");
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["path"], "role");
    }

    #[test]
    fn test_rejection_from_error() {
        assert!(matches!(
            Rejection::from(RbacError::MissingCredential),
            Rejection::Unauthenticated(_)
        ));
        assert!(matches!(
            Rejection::from(RbacError::StoreUnavailable("down".into())),
            Rejection::Internal(_)
        ));
        assert!(matches!(
            Rejection::from(RbacError::PermissionDenied("invoices:DELETE".into())),
            Rejection::Forbidden(_)
        ));
    }
}
