//! Credential issuance and verification
//!
//! Credentials are HS256 JWTs carrying [`Claims`]. Expiry is checked here
//! rather than by `jsonwebtoken` so that a credential is rejected at exactly
//! `exp`, with no leeway.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::time::Duration;
use tracing::{debug, warn};

use crate::claims::{Claims, PermissionMap};
use crate::error::{RbacError, Result};
use crate::resolver::PermissionResolver;
use crate::types::{PermissionSet, SubjectId};

/// Default credential lifetime
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Longest credential lifetime an issuer accepts
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

const BEARER_SCHEME: &str = "bearer";

/// Signs credentials for authenticated subjects
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], ttl: Duration) -> Result<Self> {
        if secret.is_empty() {
            return Err(RbacError::Config("signing secret is empty".to_string()));
        }
        if ttl.is_zero() || ttl > MAX_TOKEN_TTL {
            return Err(RbacError::Config(format!(
                "token lifetime must be between 1s and {}s, got {}s",
                MAX_TOKEN_TTL.as_secs(),
                ttl.as_secs()
            )));
        }
        if secret.len() < 32 {
            warn!("Signing secret is shorter than recommended (32 bytes)");
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            ttl,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a credential valid from now for the configured lifetime
    pub fn issue(&self, user_id: SubjectId, role: &str, permissions: &PermissionSet) -> Result<String> {
        self.issue_at(user_id, role, permissions, Utc::now().timestamp())
    }

    /// Issue a credential as if the current time were `now` (seconds since epoch)
    pub fn issue_at(
        &self,
        user_id: SubjectId,
        role: &str,
        permissions: &PermissionSet,
        now: i64,
    ) -> Result<String> {
        let ttl = i64::try_from(self.ttl.as_secs())
            .map_err(|_| RbacError::Config("token lifetime out of range".to_string()))?;
        let exp = now
            .checked_add(ttl)
            .ok_or_else(|| RbacError::Config(format!("credential expiry overflows at iat {}", now)))?;
        let claims = Claims::new(user_id, role)
            .with_permissions(PermissionMap::encode(permissions))
            .with_validity(now, exp);

        self.sign(&claims)
    }

    /// Sign arbitrary claims as given
    pub fn sign(&self, claims: &Claims) -> Result<String> {
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)?;
        debug!("Issued credential for subject {} (role '{}')", claims.id, claims.role);
        Ok(token)
    }
}

/// Validates credentials and yields trusted claims
#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;

        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Verify signature, payload shape and expiry against the current time
    pub fn verify(&self, token: &str) -> Result<Claims> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verify as if the current time were `now` (seconds since epoch)
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                debug!("Rejected credential: {}", e);
                RbacError::InvalidCredential(e.to_string())
            })?;

        let claims = data.claims;
        if claims.is_expired_at(now) {
            debug!("Rejected credential for subject {}: expired at {}", claims.id, claims.exp);
            return Err(RbacError::InvalidCredential("credential expired".to_string()));
        }

        Ok(claims)
    }
}

/// Extract the credential from an `Authorization` header value.
///
/// The scheme is matched case-insensitively. A missing header, another scheme
/// or an empty credential count as no credential at all.
pub fn bearer_token(header: Option<&str>) -> Result<&str> {
    let header = header.ok_or(RbacError::MissingCredential)?.trim();
    let (scheme, token) = header.split_once(' ').ok_or(RbacError::MissingCredential)?;

    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        return Err(RbacError::MissingCredential);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(RbacError::MissingCredential);
    }
    Ok(token)
}

/// Login-time issuance: resolves a role's permissions and signs them
#[derive(Clone)]
pub struct TokenService {
    issuer: TokenIssuer,
    resolver: PermissionResolver,
}

impl TokenService {
    pub fn new(issuer: TokenIssuer, resolver: PermissionResolver) -> Self {
        Self { issuer, resolver }
    }

    /// Issue a credential for an authenticated user.
    ///
    /// A role without grants yields a credential with an empty permission
    /// list; a store failure is returned as is.
    pub async fn login(&self, user_id: SubjectId, role: &str) -> Result<String> {
        let permissions = self.resolver.permissions_for_role(role).await?;
        self.issuer.issue(user_id, role, &permissions)
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }
}
