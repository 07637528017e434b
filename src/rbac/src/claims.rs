//! Credential claims and the compact permission-string codec
//!
//! Permission strings carry one entry per resource:
//!
//! ```text
//! "invoices:CREATE,READ"
//! "appointments:READ"
//! ```
//!
//! Decoding is typed: each entry becomes a resource key and a set of
//! [`Action`] values, and checks use exact set membership. An action token is
//! only ever compared as a whole (`READ` never matches inside `BREAD`).

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::error::{RbacError, Result};
use crate::types::{Action, PermissionSet, SubjectId};

/// Separates the resource from its action list
const RESOURCE_DELIMITER: char = ':';

/// Separates actions within one entry
const ACTION_DELIMITER: &str = ",";

/// Verified credential payload.
///
/// Wire shape: `{id, role, permissions, iat, exp}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user) identifier
    pub id: SubjectId,

    /// Role name at issuance time
    pub role: String,

    /// Embedded permission strings.
    ///
    /// `None` when the claim is absent or not an array of strings.
    #[serde(
        default,
        deserialize_with = "lenient_permissions",
        skip_serializing_if = "Option::is_none"
    )]
    pub permissions: Option<Vec<String>>,

    /// Issued-at, seconds since epoch
    pub iat: i64,

    /// Expiry, seconds since epoch (exclusive)
    pub exp: i64,
}

impl Claims {
    /// Claims for a subject without embedded permissions
    pub fn new(id: SubjectId, role: impl Into<String>) -> Self {
        Self {
            id,
            role: role.into(),
            permissions: None,
            iat: 0,
            exp: 0,
        }
    }

    pub fn with_permissions(mut self, permissions: Vec<String>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn with_validity(mut self, iat: i64, exp: i64) -> Self {
        self.iat = iat;
        self.exp = exp;
        self
    }

    /// Whether the credential has expired at `now` (expiry is exclusive)
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.exp
    }
}

fn lenient_permissions<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                serde_json::Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => None,
    })
}

/// Typed view of permission strings: resource → granted actions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PermissionMap {
    grants: BTreeMap<String, BTreeSet<Action>>,
}

impl PermissionMap {
    /// Encode a permission set into permission strings.
    ///
    /// Resources are sorted and actions appear in canonical order, so equal
    /// sets always produce identical strings.
    pub fn encode(set: &PermissionSet) -> Vec<String> {
        set.by_resource()
            .into_iter()
            .map(|(resource, actions)| {
                let actions: Vec<&str> = actions.iter().map(|a| a.as_str()).collect();
                format!("{}{}{}", resource, RESOURCE_DELIMITER, actions.join(ACTION_DELIMITER))
            })
            .collect()
    }

    /// Parse one `resource:ACTION[,ACTION...]` entry
    pub fn parse_entry(entry: &str) -> Result<(String, BTreeSet<Action>)> {
        let (resource, actions) = entry
            .split_once(RESOURCE_DELIMITER)
            .ok_or_else(|| RbacError::InvalidPermissionString(format!("missing ':' in '{}'", entry)))?;

        let resource = resource.trim();
        if resource.is_empty() {
            return Err(RbacError::InvalidPermissionString(format!(
                "empty resource in '{}'",
                entry
            )));
        }

        let actions = actions
            .split(ACTION_DELIMITER)
            .map(|token| token.trim().parse::<Action>())
            .collect::<Result<BTreeSet<Action>>>()?;

        Ok((resource.to_string(), actions))
    }

    /// Decode permission strings, skipping entries that do not parse.
    ///
    /// Repeated resources are merged.
    pub fn decode<S: AsRef<str>>(entries: &[S]) -> Self {
        let mut grants: BTreeMap<String, BTreeSet<Action>> = BTreeMap::new();
        for entry in entries {
            match Self::parse_entry(entry.as_ref()) {
                Ok((resource, actions)) => grants.entry(resource).or_default().extend(actions),
                Err(e) => debug!("Skipping permission entry: {}", e),
            }
        }
        Self { grants }
    }

    /// Decoded permissions embedded in claims, if any
    pub fn from_claims(claims: &Claims) -> Option<Self> {
        claims.permissions.as_deref().map(Self::decode)
    }

    /// Whether `action` is granted on `resource`
    pub fn allows(&self, resource: &str, action: Action) -> bool {
        self.grants
            .get(resource)
            .map(|actions| actions.contains(&action))
            .unwrap_or(false)
    }

    /// Granted actions for one resource
    pub fn actions(&self, resource: &str) -> Option<&BTreeSet<Action>> {
        self.grants.get(resource)
    }

    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.grants.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}
