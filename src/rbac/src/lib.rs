//! # Clinic RBAC
//!
//! Role-based access control core for the clinic backend.
//!
//! ## Features
//!
//! - **Permission store** trait with in-memory and PostgreSQL backends
//! - **TTL permission cache** shared across requests, invalidated on writes
//! - **Signed credentials** embedding compact `resource:ACTION,...` claims
//! - **Two-stage decisions**: credential claims first, then the store
//! - **axum extractor** and 401/403/500 rejection responses
//!
//! ## Example
//!
//! ```rust
//! use clinic_rbac::{
//!     AccessEngine, Action, InMemoryPermissionStore, PermissionCache, PermissionResolver,
//!     TokenIssuer, TokenService, TokenVerifier,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(InMemoryPermissionStore::clinic_defaults().await?);
//!     let resolver = PermissionResolver::new(store, Arc::new(PermissionCache::default()));
//!
//!     let secret = b"an-hs256-secret-of-at-least-32-bytes";
//!     let tokens = TokenService::new(TokenIssuer::new(secret, Duration::from_secs(3600))?, resolver.clone());
//!     let token = tokens.login(42, "client").await?;
//!
//!     let claims = TokenVerifier::new(secret).verify(&token)?;
//!     let engine = AccessEngine::new(resolver);
//!
//!     let decision = engine.authorize(&claims, "appointments", Action::Read).await?;
//!     assert!(decision.allowed);
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod claims;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod resolver;
pub mod store;
pub mod token;
pub mod types;

// Re-export commonly used types
pub use cache::{CacheStats, PermissionCache};
pub use claims::{Claims, PermissionMap};
pub use config::RbacConfig;
pub use engine::{AccessDecision, AccessEngine, DecisionPath, EngineMetrics, FastPath, Rejection};
pub use error::{RbacError, Result};
pub use http::{AuthContext, RbacState};
pub use resolver::PermissionResolver;
pub use store::{InMemoryPermissionStore, PermissionStore};
pub use token::{bearer_token, TokenIssuer, TokenService, TokenVerifier};
pub use types::{Action, Permission, PermissionSet, Role};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
