//! Error types for limiter configuration and the admission middleware.
//!
//! The limiter itself never fails: `allow` answers yes or no. Errors only exist
//! at the edges, when a configuration is built and when a wrapped service needs
//! to tell its caller why a request never reached the inner service.
use std::time::Duration;

/// Rejected limiter configuration.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Refill rate must be finite and > 0.
    #[error("rate must be a finite number > 0 (got {provided})")]
    InvalidRate {
        /// Value provided by caller.
        provided: f64,
    },
    /// Burst must be >= 1 or the bucket could never admit anything.
    #[error("burst must be >= 1 (got {provided})")]
    InvalidBurst {
        /// Value provided by caller.
        provided: u32,
    },
    /// Sweep interval must be > 0.
    #[error("cleanup_interval must be > 0 (got {0:?})")]
    InvalidCleanupInterval(Duration),
    /// Stale TTL must be > 0.
    #[error("stale_ttl must be > 0 (got {0:?})")]
    InvalidStaleTtl(Duration),
}

/// Error surfaced by [`RateLimitService`](crate::middleware::RateLimitService).
#[derive(thiserror::Error, Debug, Clone)]
pub enum AdmissionError<E> {
    /// The principal's bucket is empty.
    #[error("rate limited principal '{principal}' (retry after {retry_after:?})")]
    RateLimited {
        /// Principal that was denied.
        principal: String,
        /// Estimated wait before a token is available.
        retry_after: Duration,
    },
    /// No principal could be resolved from the request; the limiter was not consulted.
    #[error("request carries no resolvable principal")]
    UnresolvedPrincipal,
    /// The wrapped service failed.
    #[error(transparent)]
    Inner(E),
}

impl<E> AdmissionError<E> {
    /// Check if this error is a rate-limit denial.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Check if the principal could not be resolved.
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::UnresolvedPrincipal)
    }

    /// Wait estimate for a denial.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Wait estimate rounded for a `Retry-After` header: whole seconds, at least 1.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after().map(crate::limiter::ceil_secs)
    }

    /// Get the inner error if this is an Inner variant.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Borrow the inner error if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}
