use futures::future::join_all;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tollgate::{
    AdmissionError, Limit, ManualClock, NullSink, RateLimitLayer, RateLimiter, TieredSource,
};
use tower::{service_fn, Layer, ServiceBuilder, ServiceExt};

/// Stand-in for an accepted connection.
#[derive(Debug, Clone)]
struct Conn {
    peer: SocketAddr,
    subject: Option<String>,
}

fn conn(last_octet: u8) -> Conn {
    Conn {
        peer: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, last_octet)), 40000),
        subject: None,
    }
}

fn by_peer_ip(conn: &Conn) -> Option<String> {
    Some(conn.peer.ip().to_string())
}

fn by_subject(conn: &Conn) -> Option<String> {
    conn.subject.clone()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_connections_from_one_ip_share_a_bucket() {
    let limiter = RateLimiter::new(Limit::new(1.0, 5).unwrap())
        .unwrap()
        .with_clock(ManualClock::new())
        .with_sink(NullSink);
    let svc = ServiceBuilder::new()
        .layer(RateLimitLayer::new(limiter.clone(), by_peer_ip))
        .service(service_fn(|c: Conn| async move { Ok::<_, std::io::Error>(c.peer) }));

    let tasks = (0..40).map(|_| {
        let svc = svc.clone();
        tokio::spawn(async move { svc.oneshot(conn(7)).await })
    });
    let results = join_all(tasks).await;

    let accepted = results.iter().filter(|r| r.as_ref().expect("join error").is_ok()).count();
    let limited = results
        .iter()
        .filter(|r| {
            matches!(r.as_ref().expect("join error"), Err(AdmissionError::RateLimited { .. }))
        })
        .count();
    assert_eq!(accepted, 5);
    assert_eq!(limited, 35);

    // A different address is untouched.
    assert!(svc.oneshot(conn(8)).await.is_ok());
    assert_eq!(limiter.len(), 2);
}

#[tokio::test]
async fn denial_carries_header_ready_wait() {
    let limiter = RateLimiter::new(Limit::new(0.5, 1).unwrap())
        .unwrap()
        .with_clock(ManualClock::new())
        .with_sink(NullSink);
    let svc = RateLimitLayer::new(limiter, by_peer_ip)
        .layer(service_fn(|_c: Conn| async { Ok::<_, std::io::Error>(()) }));

    assert!(svc.clone().oneshot(conn(1)).await.is_ok());
    match svc.oneshot(conn(1)).await {
        Err(AdmissionError::RateLimited { principal, retry_after }) => {
            assert_eq!(principal, "192.0.2.1");
            assert_eq!(retry_after, Duration::from_secs(2));
        }
        other => panic!("expected RateLimited, got {:?}", other),
    }
}

#[tokio::test]
async fn subject_tiers_apply_through_the_layer() {
    let tiers = TieredSource::from_tiers([("svc-batch", Limit::new(100.0, 3).unwrap())]);
    let limiter = RateLimiter::new(Limit::new(1.0, 1).unwrap())
        .unwrap()
        .with_source(tiers)
        .with_clock(ManualClock::new())
        .with_sink(NullSink);
    let svc = RateLimitLayer::new(limiter, by_subject)
        .layer(service_fn(|_c: Conn| async { Ok::<_, std::io::Error>(()) }));

    let batch = Conn { subject: Some("svc-batch".into()), ..conn(1) };
    for _ in 0..3 {
        assert!(svc.clone().oneshot(batch.clone()).await.is_ok());
    }
    assert!(svc.clone().oneshot(batch).await.unwrap_err().is_rate_limited());

    let anonymous = conn(2);
    assert!(svc.oneshot(anonymous).await.unwrap_err().is_unresolved());
}
