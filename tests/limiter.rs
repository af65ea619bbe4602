use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures::future::join_all;
use warden::ratelimit::{ClientStore, Clock, ManualClock, Policy, RateLimiter};

fn start_clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2024, 2, 29, 18, 30, 0).unwrap())
}

#[tokio::test]
async fn parallel_requests_admit_exactly_capacity() {
    let limiter = Arc::new(RateLimiter::sliding_window(3, Duration::from_secs(30)).unwrap());

    let tasks = (0..5).map(|_| {
        let limiter = Arc::clone(&limiter);
        tokio::task::spawn_blocking(move || limiter.is_allowed("client1"))
    });

    let results: Vec<bool> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|&&r| r).count(), 3);
    assert_eq!(results.iter().filter(|&&r| !r).count(), 2);
}

#[test]
fn heavy_contention_has_no_lost_updates() {
    const THREADS: usize = 16;
    const CALLS_PER_THREAD: usize = 250;
    const CAPACITY: usize = 1_000;

    let clock = start_clock();
    let limiter = Arc::new(
        RateLimiter::sliding_window(CAPACITY, Duration::from_secs(3600))
            .unwrap()
            .with_clock(Arc::new(clock)),
    );

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            std::thread::spawn(move || {
                (0..CALLS_PER_THREAD)
                    .filter(|_| limiter.is_allowed("hot-client"))
                    .count()
            })
        })
        .collect();

    let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(admitted, CAPACITY);
    assert_eq!(
        limiter.store().snapshot("hot-client").unwrap().len(),
        CAPACITY
    );
}

#[test]
fn concurrent_clients_do_not_interfere() {
    let limiter = Arc::new(RateLimiter::sliding_window(5, Duration::from_secs(60)).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let limiter = Arc::clone(&limiter);
            std::thread::spawn(move || {
                let client = format!("client-{}", i);
                (0..20).filter(|_| limiter.is_allowed(&client)).count()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 5);
    }
    assert_eq!(limiter.store().len(), 8);
}

#[test]
fn window_frees_capacity_after_it_elapses() {
    let clock = start_clock();
    let limiter = RateLimiter::sliding_window(3, Duration::from_secs(30))
        .unwrap()
        .with_clock(Arc::new(clock.clone()));

    for _ in 0..3 {
        assert!(limiter.is_allowed("c1"));
    }
    assert!(!limiter.is_allowed("c1"));

    clock.advance(chrono::Duration::seconds(31));
    assert!(limiter.is_allowed("c1"));
    assert!(limiter.is_allowed("c1"));
    assert!(limiter.is_allowed("c1"));
    assert!(!limiter.is_allowed("c1"));
}

#[test]
fn composition_admits_only_when_every_rule_admits() {
    let clock = start_clock();
    let limiter = RateLimiter::with_rules([
        Policy::cooldown(Duration::from_secs(10)).unwrap(),
        Policy::daily_quota(10),
    ])
    .with_clock(Arc::new(clock.clone()));

    // Cooldown admits and records, then the quota counts that entry too.
    assert!(limiter.is_allowed("c1"));
    // Cooldown denies; the quota still admits and records.
    assert!(!limiter.is_allowed("c1"));

    clock.advance(chrono::Duration::seconds(10));
    assert!(limiter.is_allowed("c1"));

    limiter.remove_all();
    for _ in 0..50 {
        assert!(limiter.is_allowed("c1"));
    }
}

#[test]
fn daily_quota_rolls_over_at_midnight_utc() {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 0).unwrap());
    let limiter = RateLimiter::daily_quota(2).with_clock(Arc::new(clock.clone()));

    assert!(limiter.is_allowed("c1"));
    assert!(limiter.is_allowed("c1"));
    assert!(!limiter.is_allowed("c1"));

    clock.advance(chrono::Duration::minutes(1));
    assert!(limiter.is_allowed("c1"));
    assert!(limiter.is_allowed("c1"));
    assert!(!limiter.is_allowed("c1"));
}

#[test]
fn explicit_timestamps_bypass_the_clock() {
    let limiter = RateLimiter::cooldown(Duration::from_secs(5)).unwrap();
    let t0 = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();

    assert!(limiter.is_allowed_at("c1", t0));
    assert!(!limiter.is_allowed_at("c1", t0 + chrono::Duration::seconds(4)));
    assert!(limiter.is_allowed_at("c1", t0 + chrono::Duration::seconds(5)));
}

#[test]
fn idle_clients_can_be_swept() {
    let clock = start_clock();
    let store = Arc::new(ClientStore::new());
    let limiter = RateLimiter::daily_quota(100)
        .with_store(Arc::clone(&store))
        .with_clock(Arc::new(clock.clone()));

    assert!(limiter.is_allowed("old"));
    clock.advance(chrono::Duration::hours(2));
    assert!(limiter.is_allowed("recent"));

    let evicted = store.evict_idle(clock.now(), chrono::Duration::hours(1));

    assert_eq!(evicted, 1);
    assert!(!store.contains("old"));
    assert!(store.contains("recent"));
}

#[test]
fn sweep_shorter_than_window_resets_the_limit() {
    let clock = start_clock();
    let limiter = RateLimiter::sliding_window(1, Duration::from_secs(3600))
        .unwrap()
        .with_clock(Arc::new(clock.clone()));

    assert!(limiter.is_allowed("c1"));
    clock.advance(chrono::Duration::minutes(30));
    assert!(!limiter.is_allowed("c1"));

    // Idle threshold as long as the window keeps the client limited.
    assert_eq!(
        limiter.store().evict_idle(clock.now(), chrono::Duration::hours(1)),
        0
    );
    assert!(!limiter.is_allowed("c1"));

    // A shorter threshold forgets the client and frees its capacity.
    assert_eq!(
        limiter.store().evict_idle(clock.now(), chrono::Duration::minutes(10)),
        1
    );
    assert!(limiter.is_allowed("c1"));
}
