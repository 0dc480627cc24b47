//! Validated limiter configuration.

use crate::error::ConfigError;
use std::time::Duration;

/// How often `allow` is allowed to trigger an eviction sweep.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// How long a principal may stay idle before its bucket is evicted.
pub const DEFAULT_STALE_TTL: Duration = Duration::from_secs(30 * 60);

/// Effective token-bucket parameters for one principal.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Limit {
    /// Tokens added per second.
    pub rate: f64,
    /// Bucket capacity; the longest run admitted without waiting.
    pub burst: u32,
}

impl Limit {
    /// Create a limit, rejecting a non-positive or non-finite rate and a zero burst.
    ///
    /// # Examples
    /// ```
    /// use tollgate::Limit;
    /// let limit = Limit::new(10.0, 20).unwrap();
    /// assert_eq!(limit.burst, 20);
    /// assert!(Limit::new(0.0, 1).is_err());
    /// ```
    pub fn new(rate: f64, burst: u32) -> Result<Self, ConfigError> {
        let limit = Self { rate, burst };
        limit.validate()?;
        Ok(limit)
    }

    /// Check the invariants `new` enforces; useful after deserializing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.rate.is_finite() || self.rate <= 0.0 {
            return Err(ConfigError::InvalidRate { provided: self.rate });
        }
        if self.burst == 0 {
            return Err(ConfigError::InvalidBurst { provided: self.burst });
        }
        Ok(())
    }
}

/// Limiter configuration: static fallback limit plus sweep tuning.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LimiterConfig {
    limit: Limit,
    cleanup_interval: Duration,
    stale_ttl: Duration,
}

impl LimiterConfig {
    /// Config with the given static limit and default sweep settings.
    pub fn new(limit: Limit) -> Result<Self, ConfigError> {
        Self::builder().limit(limit).build()
    }

    /// Start building a config. The builder defaults to 1 request/second with a
    /// burst of 1.
    pub fn builder() -> LimiterConfigBuilder {
        LimiterConfigBuilder::default()
    }

    /// Re-check every field. `build` already does this; call it on configs that
    /// arrived through deserialization.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.limit.validate()?;
        if self.cleanup_interval.is_zero() {
            return Err(ConfigError::InvalidCleanupInterval(self.cleanup_interval));
        }
        if self.stale_ttl.is_zero() {
            return Err(ConfigError::InvalidStaleTtl(self.stale_ttl));
        }
        Ok(())
    }

    /// Static fallback limit.
    pub fn limit(&self) -> Limit {
        self.limit
    }

    /// Minimum time between two eviction sweeps.
    pub fn cleanup_interval(&self) -> Duration {
        self.cleanup_interval
    }

    /// Idle time after which a bucket is evicted.
    pub fn stale_ttl(&self) -> Duration {
        self.stale_ttl
    }
}

/// Builder for [`LimiterConfig`].
#[derive(Debug, Clone)]
pub struct LimiterConfigBuilder {
    rate: f64,
    burst: u32,
    cleanup_interval: Duration,
    stale_ttl: Duration,
}

impl Default for LimiterConfigBuilder {
    fn default() -> Self {
        Self {
            rate: 1.0,
            burst: 1,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            stale_ttl: DEFAULT_STALE_TTL,
        }
    }
}

impl LimiterConfigBuilder {
    /// Requests per second for principals without an override.
    pub fn rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    /// Burst for principals without an override.
    pub fn burst(mut self, burst: u32) -> Self {
        self.burst = burst;
        self
    }

    /// Set rate and burst together.
    pub fn limit(mut self, limit: Limit) -> Self {
        self.rate = limit.rate;
        self.burst = limit.burst;
        self
    }

    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn stale_ttl(mut self, ttl: Duration) -> Self {
        self.stale_ttl = ttl;
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<LimiterConfig, ConfigError> {
        let cfg = LimiterConfig {
            limit: Limit { rate: self.rate, burst: self.burst },
            cleanup_interval: self.cleanup_interval,
            stale_ttl: self.stale_ttl,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}
