//! Time-bounded role → permission-set cache

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::types::PermissionSet;

/// Default time-to-live for cached permission sets
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Cached entry with absolute expiry
#[derive(Clone)]
struct CacheEntry {
    permissions: Arc<PermissionSet>,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(permissions: PermissionSet, ttl: Duration) -> Self {
        Self {
            permissions: Arc::new(permissions),
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Shared cache of permission sets keyed by role name.
///
/// Entries are replaced whole and never mutated in place. There is no size
/// bound or LRU eviction: the key space is the set of roles. Concurrent
/// misses for the same role may each read the store and `put`; the last
/// write wins.
pub struct PermissionCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

impl PermissionCache {
    /// Create a cache whose entries live for `ttl` after population
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Cached permission set for a role, or `None` on miss or expiry
    pub fn get(&self, role: &str) -> Option<Arc<PermissionSet>> {
        if let Some(entry) = self.entries.get(role) {
            if !entry.is_expired() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(Arc::clone(&entry.permissions));
            }
            drop(entry);

            // Only drop the entry if nobody refreshed it meanwhile
            if self.entries.remove_if(role, |_, e| e.is_expired()).is_some() {
                self.expirations.fetch_add(1, Ordering::Relaxed);
                debug!("Permission cache entry for '{}' expired", role);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store (or replace) the permission set for a role
    pub fn put(&self, role: &str, permissions: PermissionSet) -> Arc<PermissionSet> {
        let entry = CacheEntry::new(permissions, self.ttl);
        let shared = Arc::clone(&entry.permissions);
        self.entries.insert(role.to_string(), entry);
        shared
    }

    /// Drop every entry; the next lookup of any role repopulates from the store
    pub fn invalidate_all(&self) {
        self.entries.clear();
        info!("Permission cache invalidated");
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}

impl Default for PermissionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub entries: usize,
}

impl CacheStats {
    /// Calculate cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Action, Permission};

    fn set_with(resource: &str, action: Action) -> PermissionSet {
        PermissionSet::new(vec![Permission {
            id: 1,
            name: format!("{}_{}", resource, action.as_str().to_lowercase()),
            resource: resource.to_string(),
            action,
            description: None,
        }])
    }

    #[test]
    fn test_cache_put_get() {
        let cache = PermissionCache::default();

        assert!(cache.get("client").is_none());
        cache.put("client", set_with("appointments", Action::Read));

        let cached = cache.get("client").unwrap();
        assert!(cached.allows("appointments", Action::Read));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn test_put_replaces_whole_entry() {
        let cache = PermissionCache::default();
        cache.put("employee", set_with("invoices", Action::Read));
        cache.put("employee", set_with("inventory", Action::Update));

        let cached = cache.get("employee").unwrap();
        assert!(!cached.allows("invoices", Action::Read));
        assert!(cached.allows("inventory", Action::Update));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_ttl() {
        let cache = PermissionCache::new(Duration::from_millis(30));
        cache.put("client", set_with("appointments", Action::Read));
        assert!(cache.get("client").is_some());

        std::thread::sleep(Duration::from_millis(60));

        assert!(cache.get("client").is_none());
        assert_eq!(cache.stats().expirations, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_ttl_never_hits() {
        let cache = PermissionCache::new(Duration::ZERO);
        cache.put("admin", set_with("users", Action::Delete));
        assert!(cache.get("admin").is_none());
    }

    #[test]
    fn test_invalidate_all() {
        let cache = PermissionCache::default();
        cache.put("client", set_with("appointments", Action::Read));
        cache.put("admin", set_with("users", Action::Delete));
        assert_eq!(cache.len(), 2);

        cache.invalidate_all();
        assert!(cache.is_empty());
        assert!(cache.get("client").is_none());
        assert!(cache.get("admin").is_none());
    }

    #[test]
    fn test_repeated_population_after_invalidation() {
        let cache = PermissionCache::default();
        cache.put("client", set_with("appointments", Action::Read));
        cache.invalidate_all();

        assert!(cache.get("client").is_none());
        cache.put("client", set_with("appointments", Action::Read));
        assert!(cache.get("client").is_some());
        // A racing second population writes the same value again
        cache.put("client", set_with("appointments", Action::Read));

        assert_eq!(cache.len(), 1);
        assert_eq!(
            *cache.get("client").unwrap(),
            set_with("appointments", Action::Read)
        );
    }
}
