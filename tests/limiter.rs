use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tollgate::{
    Limit, LimiterConfig, LimiterEvent, ManualClock, MemorySink, NullSink, RateLimitSource,
    RateLimiter, StaticSource, TieredSource,
};

fn limit(rate: f64, burst: u32) -> Limit {
    Limit::new(rate, burst).expect("valid limit")
}

fn manual(rate: f64, burst: u32) -> (RateLimiter, ManualClock) {
    let clock = ManualClock::new();
    let limiter = RateLimiter::new(limit(rate, burst))
        .expect("valid limiter")
        .with_clock(clock.clone())
        .with_sink(NullSink);
    (limiter, clock)
}

#[test]
fn first_burst_calls_succeed_then_deny() {
    for burst in [1u32, 2, 7, 64] {
        let (limiter, _) = manual(3.0, burst);
        for i in 0..burst {
            assert!(limiter.allow("p"), "call {} of burst {} denied", i + 1, burst);
        }
        assert!(!limiter.allow("p"), "call {} should be denied", burst + 1);
    }
}

#[test]
fn exhausting_one_principal_leaves_others_alone() {
    let (limiter, _) = manual(1.0, 3);
    while limiter.allow("A") {}
    for _ in 0..3 {
        assert!(limiter.allow("B"));
    }
    assert!(!limiter.allow("A"));
}

#[test]
fn waiting_one_over_rate_readmits() {
    for rate in [0.5, 1.0, 4.0, 250.0] {
        let (limiter, clock) = manual(rate, 1);
        assert!(limiter.allow("p"));
        assert!(!limiter.allow("p"));
        // A nanosecond of slack absorbs float rounding in 1/rate.
        clock.advance(Duration::from_secs_f64(1.0 / rate) + Duration::from_nanos(1));
        assert!(limiter.allow("p"), "rate {rate} did not refill");
    }
}

#[test]
fn retry_after_tracks_rate() {
    let (limiter, _) = manual(1.0, 1);
    assert_eq!(limiter.retry_after("unseen"), Duration::ZERO);
    assert!(limiter.allow("p"));
    assert_eq!(limiter.retry_after("p"), Duration::from_secs(1));
    assert_eq!(limiter.retry_after_secs("p"), 1);

    let (slow, _) = manual(0.25, 1);
    assert!(slow.allow("p"));
    assert_eq!(slow.retry_after_secs("p"), 4);
}

#[test]
fn scenario_one_rps_burst_two_real_time() {
    let limiter = RateLimiter::new(limit(1.0, 2)).unwrap().with_sink(NullSink);
    assert!(limiter.allow("u1"));
    assert!(limiter.allow("u1"));
    assert!(!limiter.allow("u1"));
    thread::sleep(Duration::from_millis(1100));
    assert!(limiter.allow("u1"));
}

#[test]
fn scenario_static_source() {
    let source = StaticSource::new(limit(10.0, 20));
    assert_eq!(source.limit("anything"), Some(limit(10.0, 20)));
    assert_eq!(source.limit("something-else"), Some(limit(10.0, 20)));
}

#[test]
fn scenario_tiered_plans() {
    let tiers =
        TieredSource::from_tiers([("premium", limit(1000.0, 1000)), ("free", limit(1.0, 1))]);
    let (limiter, _) = manual(5.0, 5);
    let limiter = limiter.with_source(tiers);

    for i in 0..50 {
        assert!(limiter.allow("premium"), "premium call {} denied", i + 1);
    }
    assert!(limiter.allow("free"));
    assert!(!limiter.allow("free"));
}

#[test]
fn source_fallback_and_later_override() {
    let tiers = TieredSource::new();
    let (limiter, _) = manual(1.0, 1);
    let limiter = limiter.with_source(tiers.clone());

    // No override yet: static 1/1 applies.
    assert!(limiter.allow("p"));
    assert!(!limiter.allow("p"));

    // The new answer is applied on the next call. Tokens are preserved (still
    // empty), so the bigger burst does not help yet.
    tiers.set("p", limit(100.0, 10));
    assert!(!limiter.allow("p"));
    assert_eq!(limiter.snapshot()[0].limit, limit(100.0, 10));
}

#[test]
fn eviction_leaves_only_recent_principal() {
    let config = LimiterConfig::builder()
        .rate(1.0)
        .burst(1)
        .cleanup_interval(Duration::from_millis(10))
        .stale_ttl(Duration::from_millis(20))
        .build()
        .unwrap();
    let sink = MemorySink::new();
    let limiter = RateLimiter::with_config(config).with_sink(sink.clone());

    limiter.allow("a");
    limiter.allow("b");
    thread::sleep(Duration::from_millis(30));
    limiter.allow("c");

    let tracked: Vec<_> = limiter.snapshot().into_iter().map(|s| s.principal).collect();
    assert_eq!(tracked, vec!["c"]);
    assert!(sink.events().contains(&LimiterEvent::Swept { removed: 2, remaining: 1 }));
}

#[test]
fn evicted_principal_comes_back_full() {
    let config = LimiterConfig::builder()
        .rate(1.0)
        .burst(2)
        .cleanup_interval(Duration::from_secs(1))
        .stale_ttl(Duration::from_secs(2))
        .build()
        .unwrap();
    let clock = ManualClock::new();
    let limiter = RateLimiter::with_config(config).with_clock(clock.clone()).with_sink(NullSink);

    assert!(limiter.allow("p"));
    assert!(limiter.allow("p"));
    clock.advance(Duration::from_secs(3));
    limiter.allow("other");
    assert!(!limiter.contains("p"));
    assert!(limiter.allow("p"));
    assert!(limiter.allow("p"));
    assert!(!limiter.allow("p"));
}

#[test]
fn concurrent_callers_never_exceed_burst() {
    let (limiter, _) = manual(1.0, 100);
    let threads = 8;
    let per_thread = 50;
    let admitted = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let limiter = limiter.clone();
            let admitted = admitted.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..per_thread {
                    if limiter.allow("shared") {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker panicked");
    }

    assert_eq!(admitted.load(Ordering::SeqCst), 100);
    assert_eq!(limiter.len(), 1);
}

#[test]
fn concurrent_distinct_principals_each_get_one_bucket() {
    let (limiter, _) = manual(1.0, 1);
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let limiter = limiter.clone();
            thread::spawn(move || limiter.allow(&format!("client-{}", i % 4)))
        })
        .collect();
    let admitted =
        handles.into_iter().map(|h| h.join().expect("worker panicked")).filter(|ok| *ok).count();

    assert_eq!(admitted, 4);
    assert_eq!(limiter.len(), 4);
}
