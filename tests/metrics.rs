mod common;

use std::collections::HashSet;
use std::sync::Arc;

use metrics_util::debugging::DebuggingRecorder;
use time::Duration;

use atelier::application::gallery::GalleryService;
use atelier::application::rate_limit::{RateLimitPolicy, RateLimiter};
use atelier::application::repos::PostListFilter;
use atelier::application::views::ViewCounter;
use atelier::application::visitor::VisitorId;
use atelier::cache::{CacheConfig, CacheManager, CacheTrigger};
use atelier::domain::types::PostType;
use atelier::util::clock::SystemClock;

use common::{MemoryContent, MemoryViewCounts};

#[tokio::test]
async fn hot_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let dir = tempfile::tempdir().expect("tempdir");
    let cache = CacheManager::new(&CacheConfig {
        enabled: true,
        directory: dir.path().join("cache"),
    })
    .expect("cache");
    let content = Arc::new(MemoryContent::default());
    content.seed_single("Harbour", &[]).await;

    let views = ViewCounter::new(
        Arc::new(MemoryViewCounts::default()),
        Arc::new(SystemClock),
        Duration::hours(1),
    );
    let gallery = GalleryService::new(content, views.clone(), cache.clone(), 24);

    // Miss then hit on the cached listing.
    let first_page = PostListFilter::first_page(24);
    gallery.list(&first_page).await.expect("listing");
    gallery.list(&first_page).await.expect("listing");

    CacheTrigger::new(cache).single_post_upserted(1);

    let visitor = VisitorId::parse(&"c".repeat(32)).expect("visitor id");
    views
        .increment(1, PostType::Single, &visitor, Duration::hours(1))
        .await
        .expect("view");

    let limiter = RateLimiter::open(
        dir.path().join("ratelimit"),
        RateLimitPolicy::new(1, Duration::seconds(60)),
    )
    .expect("limiter");
    limiter.attempt("198.51.100.1", "view");
    limiter.attempt("198.51.100.1", "view");

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "atelier_cache_hit_total",
        "atelier_cache_miss_total",
        "atelier_cache_invalidate_ms",
        "atelier_view_increment_total",
        "atelier_rate_limit_rejected_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
