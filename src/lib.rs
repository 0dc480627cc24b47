#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Tollgate
//!
//! Per-principal admission control for Rust services: a token-bucket rate
//! limiter keyed by an arbitrary caller-supplied identity (client IP,
//! authenticated subject, tenant ID, ...).
//!
//! ## Features
//!
//! - **Immediate decisions**: `allow` never blocks or queues; it answers yes or no
//! - **Independent buckets** per principal, created full on first sight
//! - **Dynamic limits** via a pluggable [`RateLimitSource`], applied in place
//!   without resetting accumulated tokens
//! - **Bounded memory**: idle principals are evicted by an inline sweep
//! - **Read-only retry estimates** for `Retry-After` headers
//! - **Injectable clock** for deterministic tests
//! - **Tower middleware** for gating any `Service` by principal
//!
//! ## Quick Start
//!
//! ```rust
//! use tollgate::{Limit, RateLimiter, TieredSource};
//!
//! let tiers = TieredSource::from_tiers([("premium", Limit::new(1000.0, 1000).unwrap())]);
//! let limiter = RateLimiter::new(Limit::new(1.0, 1).unwrap())
//!     .unwrap()
//!     .with_source(tiers);
//!
//! assert!(limiter.allow("premium"));
//! assert!(limiter.allow("premium"));
//!
//! assert!(limiter.allow("free"));
//! if !limiter.allow("free") {
//!     let wait = limiter.retry_after_secs("free");
//!     assert_eq!(wait, 1);
//! }
//! ```

pub mod bucket;
pub mod clock;
pub mod config;
pub mod dynamic;
pub mod error;
pub mod limiter;
pub mod middleware;
pub mod registry;
pub mod source;
pub mod telemetry;

// Re-exports
pub use bucket::TokenBucket;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{Limit, LimiterConfig, LimiterConfigBuilder};
pub use dynamic::DynamicConfig;
pub use error::{AdmissionError, ConfigError};
pub use limiter::RateLimiter;
pub use middleware::{PrincipalResolver, RateLimitLayer, RateLimitService};
pub use registry::{EntrySnapshot, SweepStats};
pub use source::{RateLimitSource, StaticSource, TieredSource};
pub use telemetry::{EventSink, LimiterEvent, LogSink, MemorySink, NullSink};
