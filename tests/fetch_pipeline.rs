mod common;

use chrono::{Duration, Utc};
use common::{post, recent, setup_pool, RecordingProvider, RecordingTranslator};
use x_watchbot::db;
use x_watchbot::error::PipelineError;
use x_watchbot::model::{RunStatus, RunType, ScopeSettings};

#[tokio::test]
async fn refetching_the_same_timeline_is_idempotent() {
    let (_td, pool) = setup_pool().await;
    let provider = RecordingProvider::default();
    let service = common::service(&pool, &provider, &RecordingTranslator::default());
    service.add_member(1, "alice", None).await.unwrap();
    provider
        .set_timeline("alice", (0..5).map(|i| recent(&format!("a{i}"), "alice")).collect())
        .await;

    let first = service.fetch_now(1).await.unwrap();
    assert_eq!(first.attempted, 1);
    assert_eq!(first.inserted, 5);
    assert_eq!(first.skipped, 0);

    let second = service.fetch_now(1).await.unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.skipped, 5);
    assert_eq!(db::count_posts(&pool, 1).await.unwrap(), 5);
    assert_eq!(
        second.summary(),
        "fetched 0 new posts from 1 accounts, 5 skipped, 0 purged, 0 errors"
    );
}

#[tokio::test]
async fn overlapping_fetches_store_each_post_once() {
    let (_td, pool) = setup_pool().await;
    let provider = RecordingProvider::default();
    let service = common::service(&pool, &provider, &RecordingTranslator::default());
    service.add_member(1, "alice", None).await.unwrap();
    service.add_member(1, "bob", None).await.unwrap();
    // "shared" shows up in both timelines (a retweet).
    let mut alice: Vec<_> = (0..6).map(|i| recent(&format!("a{i}"), "alice")).collect();
    alice.push(recent("shared", "carol"));
    let bob = vec![recent("b0", "bob"), recent("shared", "carol")];
    provider.set_timeline("alice", alice).await;
    provider.set_timeline("bob", bob).await;

    let (r1, r2) = tokio::join!(service.fetch_now(1), service.fetch_now(1));
    let (r1, r2) = (r1.unwrap(), r2.unwrap());

    assert_eq!(r1.inserted + r2.inserted, 8);
    assert_eq!(db::count_posts(&pool, 1).await.unwrap(), 8);
    // Every returned post is either inserted once or skipped.
    assert_eq!(r1.inserted + r1.skipped + r2.inserted + r2.skipped, 18);
}

#[tokio::test]
async fn one_failing_account_does_not_stop_the_batch() {
    let (_td, pool) = setup_pool().await;
    let provider = RecordingProvider::default();
    let service = common::service(&pool, &provider, &RecordingTranslator::default());
    for handle in ["alice", "bob", "carol"] {
        service.add_member(1, handle, None).await.unwrap();
        provider
            .set_timeline(handle, vec![recent(&format!("{handle}-1"), handle)])
            .await;
    }
    provider.fail("bob").await;

    let report = service.fetch_now(1).await.unwrap();
    assert_eq!(report.attempted, 3);
    assert_eq!(report.inserted, 2);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].starts_with("@bob: "), "{:?}", report.errors);
    assert_eq!(provider.calls().await, vec!["alice", "bob", "carol"]);

    let logs = service.operation_logs(1, 10).await.unwrap();
    assert_eq!(logs.len(), 1);
    let entry = &logs[0];
    assert_eq!(entry.run_type, RunType::Fetch);
    assert_eq!(entry.status, RunStatus::Succeeded);
    assert_eq!(entry.run_id, report.run_id);
    assert_eq!((entry.attempted, entry.succeeded, entry.error_count), (3, 2, 1));
    assert_eq!(entry.errors, report.errors);
}

#[tokio::test]
async fn missing_credentials_fail_before_any_io() {
    let (_td, pool) = setup_pool().await;
    let provider = RecordingProvider::unconfigured();
    let service = common::service(&pool, &provider, &RecordingTranslator::default());
    service.add_member(1, "alice", None).await.unwrap();

    let err = service.fetch_now(1).await.unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)), "{err:?}");
    assert!(provider.calls().await.is_empty());
    assert!(service.operation_logs(1, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn stale_posts_are_inserted_then_aged_out_by_the_purge() {
    let (_td, pool) = setup_pool().await;
    let provider = RecordingProvider::default();
    let service = common::service(&pool, &provider, &RecordingTranslator::default());
    service.add_member(1, "alice", None).await.unwrap();
    service
        .update_settings(ScopeSettings {
            scope_id: 1,
            fetch_interval_minutes: 0,
            retention_days: 1,
        })
        .await
        .unwrap();
    let now = Utc::now();
    provider
        .set_timeline(
            "alice",
            vec![
                post("fresh", "alice", now - Duration::hours(2)),
                post("stale", "alice", now - Duration::hours(30)),
                post("", "alice", now),
            ],
        )
        .await;

    let report = service.fetch_now(1).await.unwrap();
    assert_eq!(report.inserted, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.purged, 1);
    let page = service.posts(1, 1, 10).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.posts[0].tweet_id, "fresh");

    let logs = service.operation_logs(1, 1).await.unwrap();
    assert_eq!((logs[0].succeeded, logs[0].skipped, logs[0].purged), (2, 1, 1));
}

#[tokio::test]
async fn removed_member_posts_are_purged_by_the_next_cycle() {
    let (_td, pool) = setup_pool().await;
    let provider = RecordingProvider::default();
    let service = common::service(&pool, &provider, &RecordingTranslator::default());
    for handle in ["a", "b", "c"] {
        service.add_member(1, handle, None).await.unwrap();
        provider
            .set_timeline(handle, vec![recent(&format!("p{handle}"), handle)])
            .await;
    }
    assert_eq!(service.fetch_now(1).await.unwrap().inserted, 3);

    assert!(service.remove_member(1, "@C").await.unwrap());
    assert_eq!(db::count_posts(&pool, 1).await.unwrap(), 3);

    let report = service.fetch_now(1).await.unwrap();
    assert_eq!(report.attempted, 2);
    assert_eq!(report.purged, 1);
    let mut left: Vec<_> = service
        .posts(1, 1, 10)
        .await
        .unwrap()
        .posts
        .into_iter()
        .map(|p| p.tweet_id)
        .collect();
    left.sort();
    assert_eq!(left, vec!["pa", "pb"]);
}

#[tokio::test]
async fn empty_watchlist_clears_the_scope() {
    let (_td, pool) = setup_pool().await;
    let provider = RecordingProvider::default();
    let service = common::service(&pool, &provider, &RecordingTranslator::default());
    service.add_member(1, "a", None).await.unwrap();
    provider
        .set_timeline("a", vec![recent("1", "a"), recent("2", "a")])
        .await;
    service.fetch_now(1).await.unwrap();
    service.remove_member(1, "a").await.unwrap();

    let report = service.fetch_now(1).await.unwrap();
    assert_eq!(report.attempted, 0);
    assert_eq!(report.purged, 2);
    assert_eq!(db::count_posts(&pool, 1).await.unwrap(), 0);
}

#[tokio::test]
async fn storage_failure_aborts_the_run() {
    let (_td, pool) = setup_pool().await;
    let provider = RecordingProvider::default();
    let service = common::service(&pool, &provider, &RecordingTranslator::default());
    service.add_member(1, "alice", None).await.unwrap();
    provider.set_timeline("alice", vec![recent("1", "alice")]).await;
    pool.close().await;

    let err = service.fetch_now(1).await.unwrap_err();
    assert!(matches!(err, PipelineError::Storage(_)), "{err:?}");
}

#[tokio::test]
async fn watchlist_edits_separate_bad_input_from_storage_errors() {
    let (_td, pool) = setup_pool().await;
    let provider = RecordingProvider::default();
    let service = common::service(&pool, &provider, &RecordingTranslator::default());
    service.add_member(1, "alice", None).await.unwrap();

    let err = service.add_member(1, "@Alice", None).await.unwrap_err();
    assert!(matches!(err, PipelineError::Invalid(_)), "{err:?}");
    let err = service.add_member(1, "has space", None).await.unwrap_err();
    assert!(matches!(err, PipelineError::Invalid(_)), "{err:?}");
    let err = service.remove_member(1, "").await.unwrap_err();
    assert!(matches!(err, PipelineError::Invalid(_)), "{err:?}");

    pool.close().await;
    let err = service.add_member(1, "bob", None).await.unwrap_err();
    assert!(matches!(err, PipelineError::Storage(_)), "{err:?}");
    let err = service.remove_member(1, "alice").await.unwrap_err();
    assert!(matches!(err, PipelineError::Storage(_)), "{err:?}");
}
