//! View counting against the embedded SQLite counters store.

use std::sync::Arc;

use time::{Duration, macros::datetime};

use atelier::application::views::ViewCounter;
use atelier::application::visitor::VisitorId;
use atelier::domain::types::PostType;
use atelier::domain::view_counts::ViewKey;
use atelier::infra::counters::SqliteViewCounts;
use atelier::util::clock::ManualClock;

const WINDOW: Duration = Duration::hours(1);

fn visitor(seed: char) -> VisitorId {
    VisitorId::parse(&seed.to_string().repeat(32)).expect("well-formed visitor id")
}

async fn counter() -> (ViewCounter, Arc<ManualClock>) {
    let store = SqliteViewCounts::connect("sqlite::memory:", 1)
        .await
        .expect("in-memory counters");
    let clock = Arc::new(ManualClock::new(datetime!(2026-05-01 09:00:00 UTC)));
    let counter = ViewCounter::new(Arc::new(store), clock.clone(), WINDOW);
    (counter, clock)
}

#[tokio::test]
async fn repeat_views_inside_window_count_once() {
    let (views, clock) = counter().await;
    let alice = visitor('a');

    assert!(views.increment(42, PostType::Single, &alice, WINDOW).await.expect("first"));
    clock.advance(Duration::minutes(10));
    assert!(!views.increment(42, PostType::Single, &alice, WINDOW).await.expect("second"));

    assert_eq!(views.count(ViewKey::single(42)).await.expect("count"), 1);
}

#[tokio::test]
async fn views_further_apart_than_window_count_twice() {
    let (views, clock) = counter().await;
    let alice = visitor('a');

    assert!(views.increment(42, PostType::Single, &alice, WINDOW).await.expect("first"));
    clock.advance(WINDOW + Duration::seconds(1));
    assert!(views.increment(42, PostType::Single, &alice, WINDOW).await.expect("second"));

    assert_eq!(views.count(ViewKey::single(42)).await.expect("count"), 2);
}

#[tokio::test]
async fn another_visitor_is_always_counted() {
    let (views, _clock) = counter().await;

    assert!(views.increment(7, PostType::Group, &visitor('a'), WINDOW).await.expect("a"));
    assert!(views.increment(7, PostType::Group, &visitor('b'), WINDOW).await.expect("b"));
    assert!(views.increment(7, PostType::Group, &visitor('a'), WINDOW).await.expect("a again"));

    assert_eq!(views.count(ViewKey::group(7)).await.expect("count"), 3);
}

#[tokio::test]
async fn single_and_group_with_same_id_are_separate() {
    let (views, _clock) = counter().await;
    let alice = visitor('a');

    views.increment(5, PostType::Single, &alice, WINDOW).await.expect("single");
    views.increment(5, PostType::Group, &alice, WINDOW).await.expect("group");

    let counts = views
        .counts(&[ViewKey::single(5), ViewKey::group(5), ViewKey::single(6)])
        .await
        .expect("counts");
    assert_eq!(counts.get(&ViewKey::single(5)), Some(&1));
    assert_eq!(counts.get(&ViewKey::group(5)), Some(&1));
    assert_eq!(counts.get(&ViewKey::single(6)).copied().unwrap_or(0), 0);
}

#[tokio::test]
async fn zero_window_disables_dedup() {
    let (views, _clock) = counter().await;
    let alice = visitor('a');

    for _ in 0..3 {
        views
            .increment(9, PostType::Single, &alice, Duration::ZERO)
            .await
            .expect("increment");
    }
    assert_eq!(views.count(ViewKey::single(9)).await.expect("count"), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_increments_lose_no_updates() {
    const VISITORS: u64 = 32;

    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("counters.db").display());
    let store = SqliteViewCounts::connect(&url, 4)
        .await
        .expect("file-backed counters");
    let clock = Arc::new(ManualClock::new(datetime!(2026-05-01 09:00:00 UTC)));
    let views = ViewCounter::new(Arc::new(store), clock, WINDOW);

    let tasks: Vec<_> = (1..=VISITORS)
        .map(|n| {
            let views = views.clone();
            let visitor = VisitorId::parse(&format!("{n:032x}")).expect("visitor id");
            tokio::spawn(async move {
                views
                    .increment(77, PostType::Single, &visitor, WINDOW)
                    .await
                    .expect("increment")
            })
        })
        .collect();

    for task in tasks {
        assert!(task.await.expect("increment task"));
    }
    assert_eq!(views.count(ViewKey::single(77)).await.expect("count"), VISITORS);
}
