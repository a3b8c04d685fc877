use std::sync::Arc;

use chrono::NaiveDate;
use futures::{stream::BoxStream, StreamExt};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    clock::Clock,
    config::RewardRules,
    errors::{AppError, Result},
    models::{ad_history_key, ad_history_prefix, ledger_key, AdHistoryEntry, AdReward, UserLedger},
    services::{access::MemberAccess, metrics::MetricsService},
    store::{watch_collection, TransactionRunner},
};

/// Credits completed ad views against the daily limit.
pub struct AdRewardProcessor {
    runner: TransactionRunner,
    clock: Arc<dyn Clock>,
    rules: RewardRules,
    metrics: Arc<MetricsService>,
}

impl AdRewardProcessor {
    pub fn new(
        runner: TransactionRunner,
        clock: Arc<dyn Clock>,
        rules: RewardRules,
        metrics: Arc<MetricsService>,
    ) -> Self {
        Self {
            runner,
            clock,
            rules,
            metrics,
        }
    }

    /// Credits one ad view. The counter check, the credit and the history
    /// entry commit together or not at all.
    pub async fn watch_ad(&self, member: &MemberAccess) -> Result<AdReward> {
        let uid = member.uid();
        let now = self.clock.now();
        let today = now.date_naive();
        let RewardRules {
            daily_ad_limit,
            ad_reward,
            min_ad_interval_secs,
            ..
        } = self.rules;
        let key = ledger_key(uid);
        let key = key.as_str();
        // Reused across attempts so a retry after an unacknowledged commit
        // finds its own entry instead of crediting twice.
        let entry = AdHistoryEntry {
            id: Uuid::new_v4(),
            reward: ad_reward,
            timestamp: now,
        };
        let entry = &entry;
        let entry_key = ad_history_key(uid, entry.id);
        let entry_key = entry_key.as_str();

        let outcome = self
            .runner
            .run("watch_ad", |mut tx| async move {
                // Read before the ledger so a found entry implies the ledger
                // already carries its credit.
                let committed = tx.get::<AdHistoryEntry>(entry_key).await?.is_some();
                let mut ledger: UserLedger = tx.get(key).await?.ok_or(AppError::NotFound)?;
                if committed {
                    return Ok(credited(&ledger, today, ad_reward, daily_ad_limit));
                }

                ledger.roll_over(today);

                if ledger.ads_watched_today >= daily_ad_limit {
                    return Err(AppError::QuotaExceeded {
                        limit: daily_ad_limit,
                    });
                }

                if let Some(last) = ledger.last_ad_credited_at {
                    let ready_at = last + chrono::Duration::seconds(min_ad_interval_secs as i64);
                    if min_ad_interval_secs > 0 && now < ready_at {
                        let wait_ms = (ready_at - now).num_milliseconds();
                        return Err(AppError::AdCooldown {
                            retry_after_secs: ((wait_ms + 999) / 1000) as u64,
                        });
                    }
                }

                ledger.balance += ad_reward;
                ledger.ads_watched_today += 1;
                ledger.last_ad_watch_date = Some(today);
                ledger.last_ad_credited_at = Some(now);

                tx.update(key, &ledger)?;
                tx.insert(entry_key, entry)?;
                tx.commit().await?;

                Ok(credited(&ledger, today, ad_reward, daily_ad_limit))
            })
            .await;

        match &outcome {
            Ok(reward) => {
                self.metrics.record_ad_watched();
                tracing::info!(
                    %uid,
                    reward = %reward.reward,
                    balance = %reward.balance,
                    watched_today = reward.ads_watched_today,
                    "Ad reward credited"
                );
            }
            Err(AppError::QuotaExceeded { limit }) => {
                self.metrics.record_quota_rejection();
                tracing::warn!(%uid, limit, "Daily ad limit reached");
            }
            Err(AppError::AdCooldown { retry_after_secs }) => {
                tracing::warn!(%uid, retry_after_secs, "Ad claimed before the minimum interval");
            }
            Err(_) => {}
        }

        outcome
    }

    /// The member's accepted ad views, newest first.
    pub async fn history(&self, member: &MemberAccess) -> Result<Vec<AdHistoryEntry>> {
        let prefix = ad_history_prefix(member.uid());
        let prefix = prefix.as_str();

        let mut entries: Vec<AdHistoryEntry> = self
            .runner
            .run("ad_history", |mut tx| async move { tx.list(prefix).await })
            .await?;

        newest_first(&mut entries);
        Ok(entries)
    }

    pub fn watch_history(&self, member: &MemberAccess) -> BoxStream<'static, Result<Vec<AdHistoryEntry>>> {
        watch_collection::<AdHistoryEntry, _>(
            self.runner.store().clone(),
            ad_history_prefix(member.uid()),
            |_| true,
        )
        .map(|snapshot| {
            snapshot.map_err(AppError::from).map(|mut entries| {
                newest_first(&mut entries);
                entries
            })
        })
        .boxed()
    }
}

fn credited(ledger: &UserLedger, today: NaiveDate, reward: Decimal, daily_ad_limit: u32) -> AdReward {
    let watched = ledger.ads_watched_on(today);
    AdReward {
        reward,
        balance: ledger.balance,
        ads_watched_today: watched,
        remaining_today: daily_ad_limit.saturating_sub(watched),
    }
}

fn newest_first(entries: &mut [AdHistoryEntry]) {
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}
