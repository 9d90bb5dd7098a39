//! Retention policy: the age window and the two purge sweeps.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument};

use crate::db::{self, Pool};

/// Deleted-row counts of one purge pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub expired: u64,
    pub orphaned: u64,
}

impl PurgeReport {
    pub fn total(&self) -> u64 {
        self.expired + self.orphaned
    }
}

/// Oldest creation time that is still retained, or `None` when age purging is off.
pub fn retention_cutoff(now: DateTime<Utc>, retention_days: u32) -> Option<DateTime<Utc>> {
    (retention_days > 0).then(|| now - Duration::days(i64::from(retention_days)))
}

/// A post exactly at the cutoff is kept; only strictly older posts expire.
pub fn is_expired(created_at: DateTime<Utc>, cutoff: Option<DateTime<Utc>>) -> bool {
    cutoff.is_some_and(|c| created_at < c)
}

/// Run both sweeps for a scope. Both are idempotent.
#[instrument(skip_all, fields(scope_id, retention_days))]
pub async fn purge_scope(
    pool: &Pool,
    scope_id: i64,
    retention_days: u32,
    now: DateTime<Utc>,
) -> Result<PurgeReport> {
    let expired = match retention_cutoff(now, retention_days) {
        Some(cutoff) => db::purge_posts_created_before(pool, scope_id, cutoff).await?,
        None => 0,
    };
    let orphaned = db::purge_orphaned_posts(pool, scope_id).await?;
    let report = PurgeReport { expired, orphaned };
    if report.total() > 0 {
        info!(expired, orphaned, "purged posts");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::tests::setup_pool;
    use crate::model::{NormalizedPost, PostAuthor, PostMetrics};

    fn post(id: &str, created_at: DateTime<Utc>) -> NormalizedPost {
        NormalizedPost {
            id: id.into(),
            text: id.into(),
            author: PostAuthor {
                username: "a".into(),
                name: None,
            },
            created_at,
            lang: None,
            metrics: PostMetrics::default(),
            quoted: None,
        }
    }

    #[test]
    fn cutoff_boundary_is_exclusive() {
        let now = Utc::now();
        let cutoff = retention_cutoff(now, 1);
        assert!(!is_expired(now - Duration::hours(23), cutoff));
        assert!(!is_expired(now - Duration::hours(24), cutoff));
        assert!(is_expired(now - Duration::hours(25), cutoff));
        assert!(!is_expired(now - Duration::days(400), retention_cutoff(now, 0)));
    }

    #[tokio::test]
    async fn age_purge_keeps_23h_and_24h_drops_25h() {
        let (_td, pool) = setup_pool().await;
        let member = db::add_member(&pool, 1, "a", None).await.unwrap();
        let now = Utc::now();
        let posts = vec![
            post("23h", now - Duration::hours(23)),
            post("24h", now - Duration::hours(24)),
            post("25h", now - Duration::hours(25)),
        ];
        db::insert_posts(&pool, 1, Some(member.id), &posts, now, 10)
            .await
            .unwrap();

        let report = purge_scope(&pool, 1, 1, now).await.unwrap();
        assert_eq!(report, PurgeReport { expired: 1, orphaned: 0 });
        let mut left: Vec<_> = db::list_posts(&pool, 1, 1, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.tweet_id)
            .collect();
        left.sort();
        assert_eq!(left, vec!["23h", "24h"]);

        // Idempotent.
        assert_eq!(purge_scope(&pool, 1, 1, now).await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn zero_retention_disables_age_purge() {
        let (_td, pool) = setup_pool().await;
        let member = db::add_member(&pool, 1, "a", None).await.unwrap();
        let now = Utc::now();
        db::insert_posts(&pool, 1, Some(member.id), &[post("old", now - Duration::days(90))], now, 10)
            .await
            .unwrap();
        assert_eq!(purge_scope(&pool, 1, 0, now).await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn scope_without_members_loses_all_posts() {
        let (_td, pool) = setup_pool().await;
        let now = Utc::now();
        let gone = db::add_member(&pool, 1, "gone", None).await.unwrap();
        db::insert_posts(&pool, 1, Some(gone.id), &[post("1", now), post("2", now)], now, 10)
            .await
            .unwrap();
        db::insert_posts(&pool, 1, None, &[post("3", now)], now, 10)
            .await
            .unwrap();
        db::remove_member(&pool, 1, "gone").await.unwrap();
        // Another scope's posts are untouched.
        db::insert_posts(&pool, 2, None, &[post("1", now)], now, 10)
            .await
            .unwrap();

        let report = purge_scope(&pool, 1, 0, now).await.unwrap();
        assert_eq!(report.orphaned, 3);
        assert_eq!(db::count_posts(&pool, 1).await.unwrap(), 0);
        assert_eq!(db::count_posts(&pool, 2).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn removed_member_posts_are_the_only_orphans() {
        let (_td, pool) = setup_pool().await;
        let now = Utc::now();
        let a = db::add_member(&pool, 1, "a", None).await.unwrap();
        let b = db::add_member(&pool, 1, "b", None).await.unwrap();
        let c = db::add_member(&pool, 1, "c", None).await.unwrap();
        for (m, id) in [(&a, "pa"), (&b, "pb"), (&c, "pc")] {
            db::insert_posts(&pool, 1, Some(m.id), &[post(id, now)], now, 10)
                .await
                .unwrap();
        }
        db::remove_member(&pool, 1, "c").await.unwrap();
        // Posts outlive their member until the sweep runs.
        assert_eq!(db::count_posts(&pool, 1).await.unwrap(), 3);

        let report = purge_scope(&pool, 1, 0, now).await.unwrap();
        assert_eq!(report.orphaned, 1);
        let left: Vec<_> = db::list_posts(&pool, 1, 1, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.tweet_id)
            .collect();
        assert!(left.contains(&"pa".to_string()) && left.contains(&"pb".to_string()));
        assert!(!left.contains(&"pc".to_string()));
    }
}
