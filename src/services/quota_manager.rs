use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    clock::Clock,
    errors::{AppError, Result},
    models::{ledger_key, UserLedger},
    store::TransactionRunner,
};

/// Keeps the per-day ad counter aligned with the calendar day.
pub struct QuotaManager {
    runner: TransactionRunner,
    clock: Arc<dyn Clock>,
    daily_limit: u32,
}

impl QuotaManager {
    pub fn new(runner: TransactionRunner, clock: Arc<dyn Clock>, daily_limit: u32) -> Self {
        Self {
            runner,
            clock,
            daily_limit,
        }
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    /// Zeroes a counter left over from an earlier day and returns the
    /// current ledger. Writes only when the stored day is stale, so repeated
    /// or concurrent refreshes reset at most once.
    pub async fn refresh(&self, uid: Uuid) -> Result<UserLedger> {
        let today = self.clock.today();
        let key = ledger_key(uid);
        let key = key.as_str();

        self.runner
            .run("refresh_quota", |mut tx| async move {
                let mut ledger: UserLedger = tx.get(key).await?.ok_or(AppError::NotFound)?;

                if ledger.roll_over(today) {
                    tx.update(key, &ledger)?;
                    tx.commit().await?;
                    tracing::debug!(%uid, %today, "Reset daily ad counter");
                }

                Ok(ledger)
            })
            .await
    }

    pub fn status(&self, ledger: &UserLedger) -> QuotaMetric {
        QuotaMetric::new(ledger.ads_watched_on(self.clock.today()), self.daily_limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct QuotaMetric {
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
    pub percentage: u32,
}

impl QuotaMetric {
    pub fn new(used: u32, limit: u32) -> Self {
        let percentage = if limit == 0 {
            100
        } else {
            (used as f64 / limit as f64 * 100.0) as u32
        };

        Self {
            used,
            limit,
            remaining: limit.saturating_sub(used),
            percentage,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        models::Role,
        services::metrics::MetricsService,
        store::{DocumentStore, MemoryStore, RetryPolicy, Transaction},
    };
    use chrono::{Duration, TimeZone, Utc};

    async fn seeded(clock: &ManualClock, watched: u32) -> (QuotaManager, Arc<dyn DocumentStore>, Uuid) {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let uid = Uuid::new_v4();

        let mut ledger = UserLedger::open("u@example.com", Role::User, clock.today());
        ledger.ads_watched_today = watched;
        let mut tx = Transaction::new(store.clone());
        tx.insert(&ledger_key(uid), &ledger).unwrap();
        tx.commit().await.unwrap();

        let runner = TransactionRunner::new(
            store.clone(),
            RetryPolicy::default(),
            Arc::new(MetricsService::new()),
        );
        let quota = QuotaManager::new(runner, Arc::new(clock.clone()), 20);
        (quota, store, uid)
    }

    #[tokio::test]
    async fn test_refresh_same_day_does_not_write() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap());
        let (quota, store, uid) = seeded(&clock, 7).await;

        let ledger = quota.refresh(uid).await.unwrap();
        assert_eq!(ledger.ads_watched_today, 7);
        assert_eq!(store.get(&ledger_key(uid)).await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_refresh_next_day_resets_once() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 23, 0, 0).unwrap());
        let (quota, store, uid) = seeded(&clock, 20).await;
        clock.advance(Duration::hours(2));

        let ledger = quota.refresh(uid).await.unwrap();
        assert_eq!(ledger.ads_watched_today, 0);
        assert_eq!(ledger.last_ad_watch_date, Some(clock.today()));

        quota.refresh(uid).await.unwrap();
        assert_eq!(store.get(&ledger_key(uid)).await.unwrap().unwrap().version, 2);
    }

    #[test]
    fn test_metric_math() {
        let metric = QuotaMetric::new(5, 20);
        assert_eq!(metric.remaining, 15);
        assert_eq!(metric.percentage, 25);
        assert!(!metric.is_exhausted());
        assert!(QuotaMetric::new(20, 20).is_exhausted());
    }
}
