//! Runtime configuration

use std::time::Duration;

use crate::cache::DEFAULT_CACHE_TTL;
use crate::error::{RbacError, Result};
use crate::resolver::DEFAULT_STORE_TIMEOUT;
use crate::token::{TokenIssuer, TokenVerifier, DEFAULT_TOKEN_TTL, MAX_TOKEN_TTL};

/// Access-control configuration
#[derive(Debug, Clone)]
pub struct RbacConfig {
    /// HS256 signing secret for credentials
    pub jwt_secret: String,

    /// Lifetime of a cached role permission set
    pub cache_ttl: Duration,

    /// Lifetime of an issued credential
    pub token_ttl: Duration,

    /// Upper bound on one permission store call
    pub store_timeout: Duration,

    /// Permission store connection string (`postgres://` or `mysql://`);
    /// the in-memory store is used when unset
    pub database_url: Option<String>,

    /// HTTP listen port
    pub port: u16,
}

impl Default for RbacConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            cache_ttl: DEFAULT_CACHE_TTL,
            token_ttl: DEFAULT_TOKEN_TTL,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            database_url: None,
            port: 8080,
        }
    }
}

impl RbacConfig {
    /// Load configuration from the process environment
    ///
    /// Environment variables:
    /// - `JWT_SECRET` - signing secret (required)
    /// - `RBAC_CACHE_TTL_SECS` - permission cache TTL (default: 300)
    /// - `RBAC_TOKEN_TTL_SECS` - credential lifetime (default: 86400)
    /// - `RBAC_STORE_TIMEOUT_MS` - store call timeout (default: 2000)
    /// - `DATABASE_URL` - Postgres or MySQL permission store (default: in-memory)
    /// - `PORT` - HTTP server port (default: 8080)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| RbacError::Config("JWT_SECRET must be set".to_string()))?;

        let cache_ttl = parse_var(&lookup, "RBAC_CACHE_TTL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.cache_ttl);
        let token_ttl = parse_var(&lookup, "RBAC_TOKEN_TTL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.token_ttl);
        let store_timeout = parse_var(&lookup, "RBAC_STORE_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.store_timeout);
        let port = parse_var(&lookup, "PORT")?.unwrap_or(defaults.port);

        if token_ttl.is_zero() || token_ttl > MAX_TOKEN_TTL {
            return Err(RbacError::Config(format!(
                "RBAC_TOKEN_TTL_SECS must be between 1 and {}",
                MAX_TOKEN_TTL.as_secs()
            )));
        }

        Ok(Self {
            jwt_secret,
            cache_ttl,
            token_ttl,
            store_timeout,
            database_url: lookup("DATABASE_URL").filter(|s| !s.is_empty()),
            port,
        })
    }

    /// Credential issuer for the configured secret and lifetime
    pub fn token_issuer(&self) -> Result<TokenIssuer> {
        TokenIssuer::new(self.jwt_secret.as_bytes(), self.token_ttl)
    }

    /// Credential verifier for the configured secret
    pub fn token_verifier(&self) -> TokenVerifier {
        TokenVerifier::new(self.jwt_secret.as_bytes())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| RbacError::Config(format!("{}='{}': {}", key, raw, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RbacConfig::from_lookup(lookup(&[("JWT_SECRET", "s3cret")])).unwrap();

        assert_eq!(config.jwt_secret, "s3cret");
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.token_ttl, Duration::from_secs(24 * 60 * 60));
        assert_eq!(config.store_timeout, Duration::from_secs(2));
        assert_eq!(config.database_url, None);
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_overrides() {
        let config = RbacConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("RBAC_CACHE_TTL_SECS", "60"),
            ("RBAC_TOKEN_TTL_SECS", "3600"),
            ("RBAC_STORE_TIMEOUT_MS", "250"),
            ("DATABASE_URL", "postgresql://localhost/clinic"),
            ("PORT", "9000"),
        ]))
        .unwrap();

        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.token_ttl, Duration::from_secs(3600));
        assert_eq!(config.store_timeout, Duration::from_millis(250));
        assert_eq!(config.database_url.as_deref(), Some("postgresql://localhost/clinic"));
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn test_missing_secret() {
        let result = RbacConfig::from_lookup(lookup(&[]));
        assert!(matches!(result, Err(RbacError::Config(_))));

        let result = RbacConfig::from_lookup(lookup(&[("JWT_SECRET", "  ")]));
        assert!(matches!(result, Err(RbacError::Config(_))));
    }

    #[test]
    fn test_unparseable_values() {
        let result = RbacConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("RBAC_CACHE_TTL_SECS", "five minutes"),
        ]));
        assert!(matches!(result, Err(RbacError::Config(_))));

        let result = RbacConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("RBAC_TOKEN_TTL_SECS", "0"),
        ]));
        assert!(matches!(result, Err(RbacError::Config(_))));
    }

    #[test]
    fn test_token_ttl_out_of_range() {
        for raw in ["18446744073709551615", "9223372036854775808", "31536001"] {
            let result = RbacConfig::from_lookup(lookup(&[
                ("JWT_SECRET", "s3cret"),
                ("RBAC_TOKEN_TTL_SECS", raw),
            ]));
            assert!(matches!(result, Err(RbacError::Config(_))), "accepted {}", raw);
        }

        let config = RbacConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("RBAC_TOKEN_TTL_SECS", "31536000"),
        ]))
        .unwrap();
        assert_eq!(config.token_ttl, MAX_TOKEN_TTL);
    }

    #[test]
    fn test_token_helpers_use_configured_lifetime() {
        let config = RbacConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret-that-is-long-enough-for-hs256"),
            ("RBAC_TOKEN_TTL_SECS", "120"),
        ]))
        .unwrap();

        let issuer = config.token_issuer().unwrap();
        assert_eq!(issuer.ttl(), Duration::from_secs(120));

        let token = issuer
            .issue_at(7, "client", &crate::types::PermissionSet::empty(), 1_000)
            .unwrap();
        let claims = config.token_verifier().verify_at(&token, 1_000).unwrap();
        assert_eq!(claims.exp, 1_120);
    }
}
