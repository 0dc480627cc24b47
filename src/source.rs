//! Pluggable per-principal limit strategies.
//!
//! A [`RateLimitSource`] answers "what limit applies to this principal right
//! now?". Answering `None` is not an error: the limiter quietly falls back to its
//! static limit for that call. That makes "static for everyone, overrides for a
//! few known principals" a one-liner.

use crate::config::Limit;
use crate::dynamic::DynamicConfig;
use std::collections::HashMap;

/// Strategy supplying the effective limit for a principal.
///
/// Called on every `allow`, while the limiter's registry lock is held, so
/// implementations must be quick and must never call back into the limiter.
///
/// A source already shared as `Arc<dyn RateLimitSource>` is handed over with
/// [`RateLimiter::with_shared_source`](crate::RateLimiter::with_shared_source).
pub trait RateLimitSource: Send + Sync {
    /// `Some(limit)` to override, `None` to defer to the limiter's static limit.
    fn limit(&self, principal: &str) -> Option<Limit>;
}

impl<F> RateLimitSource for F
where
    F: Fn(&str) -> Option<Limit> + Send + Sync,
{
    fn limit(&self, principal: &str) -> Option<Limit> {
        self(principal)
    }
}

/// Same limit for every principal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticSource {
    limit: Limit,
}

impl StaticSource {
    pub fn new(limit: Limit) -> Self {
        Self { limit }
    }
}

impl RateLimitSource for StaticSource {
    fn limit(&self, _principal: &str) -> Option<Limit> {
        Some(self.limit)
    }
}

/// Explicit per-principal overrides that can be changed while the limiter runs.
///
/// Reads are lock-free ([`DynamicConfig`]); writers copy the table. Clones share the
/// same table, so keep one clone to administer tiers and hand another to the
/// limiter. Principals without an entry defer to the limiter's static limit.
#[derive(Debug, Clone, Default)]
pub struct TieredSource {
    tiers: DynamicConfig<HashMap<String, Limit>>,
}

impl TieredSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an initial set of overrides.
    pub fn from_tiers<I, K>(tiers: I) -> Self
    where
        I: IntoIterator<Item = (K, Limit)>,
        K: Into<String>,
    {
        let map: HashMap<String, Limit> = tiers.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self { tiers: DynamicConfig::new(map) }
    }

    /// Add or replace the override for `principal`.
    pub fn set(&self, principal: impl Into<String>, limit: Limit) {
        let principal = principal.into();
        self.tiers.update(|cur| {
            let mut next = cur.clone();
            next.insert(principal.clone(), limit);
            next
        });
    }

    /// Drop the override for `principal`; returns whether one existed.
    pub fn remove(&self, principal: &str) -> bool {
        let prev = self.tiers.update(|cur| {
            let mut next = cur.clone();
            next.remove(principal);
            next
        });
        prev.contains_key(principal)
    }

    /// Swap in a whole new table.
    pub fn replace_all<I, K>(&self, tiers: I)
    where
        I: IntoIterator<Item = (K, Limit)>,
        K: Into<String>,
    {
        let map: HashMap<String, Limit> = tiers.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self.tiers.set(map);
    }

    pub fn len(&self) -> usize {
        self.tiers.with(HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.with(HashMap::is_empty)
    }
}

impl RateLimitSource for TieredSource {
    fn limit(&self, principal: &str) -> Option<Limit> {
        self.tiers.with(|tiers| tiers.get(principal).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limit(rate: f64, burst: u32) -> Limit {
        Limit::new(rate, burst).unwrap()
    }

    #[test]
    fn static_source_ignores_principal() {
        let source = StaticSource::new(limit(10.0, 20));
        for principal in ["anything", "", "203.0.113.9", "tenant/42"] {
            assert_eq!(source.limit(principal), Some(limit(10.0, 20)));
        }
    }

    #[test]
    fn tiered_source_defers_for_unknown_principals() {
        let source = TieredSource::from_tiers([("premium", limit(1000.0, 1000))]);
        assert_eq!(source.limit("premium"), Some(limit(1000.0, 1000)));
        assert_eq!(source.limit("someone-else"), None);
    }

    #[test]
    fn tiered_source_updates_are_visible_to_clones() {
        let admin = TieredSource::new();
        let reader = admin.clone();
        assert!(reader.is_empty());

        admin.set("free", limit(1.0, 1));
        assert_eq!(reader.limit("free"), Some(limit(1.0, 1)));

        admin.set("free", limit(2.0, 5));
        assert_eq!(reader.limit("free"), Some(limit(2.0, 5)));

        assert!(admin.remove("free"));
        assert!(!admin.remove("free"));
        assert_eq!(reader.limit("free"), None);

        admin.replace_all([("a", limit(1.0, 1)), ("b", limit(3.0, 3))]);
        assert_eq!(reader.len(), 2);
    }

    #[test]
    fn closures_are_sources() {
        let source = |p: &str| p.starts_with("vip-").then(|| limit(50.0, 50));
        assert_eq!(source.limit("vip-1"), Some(limit(50.0, 50)));
        assert_eq!(source.limit("guest"), None);

        let shared: Arc<dyn RateLimitSource> = Arc::new(source);
        assert_eq!(shared.limit("vip-2"), Some(limit(50.0, 50)));
    }
}
