use std::sync::Arc;

use anyhow::anyhow;
use futures::{stream::BoxStream, StreamExt};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    clock::Clock,
    config::RewardRules,
    errors::{AppError, Result},
    models::{
        ledger_key, withdrawal_key, AdminQueue, CreateWithdrawalRequest, Decision, UserLedger,
        WithdrawalRequest, WithdrawalStatus, WithdrawalViolation, WITHDRAWALS_PREFIX,
    },
    services::{
        access::{AdminAccess, MemberAccess},
        metrics::MetricsService,
    },
    store::{watch_collection, TransactionRunner},
};

/// Submission and resolution of withdrawal requests.
///
/// Funds leave the balance when a request is submitted, not when it is
/// approved: approval only records the verdict, rejection puts the amount
/// back. Each of those steps is a single commit over the request and the
/// owning ledger.
pub struct WithdrawalService {
    runner: TransactionRunner,
    clock: Arc<dyn Clock>,
    min_withdrawal: Decimal,
    metrics: Arc<MetricsService>,
}

impl WithdrawalService {
    pub fn new(
        runner: TransactionRunner,
        clock: Arc<dyn Clock>,
        rules: RewardRules,
        metrics: Arc<MetricsService>,
    ) -> Self {
        Self {
            runner,
            clock,
            min_withdrawal: rules.min_withdrawal,
            metrics,
        }
    }

    fn validate(&self, amount: Decimal, account_info: &str) -> std::result::Result<(), WithdrawalViolation> {
        if amount <= Decimal::ZERO {
            return Err(WithdrawalViolation::NonPositiveAmount);
        }
        if amount < self.min_withdrawal {
            return Err(WithdrawalViolation::BelowMinimum {
                minimum: self.min_withdrawal,
            });
        }
        if account_info.trim().is_empty() {
            return Err(WithdrawalViolation::MissingAccountInfo);
        }
        Ok(())
    }

    pub async fn create_request(
        &self,
        member: &MemberAccess,
        request: CreateWithdrawalRequest,
    ) -> Result<WithdrawalRequest> {
        self.validate(request.amount, &request.account_info)?;

        let uid = member.uid();
        let key = ledger_key(uid);
        let key = key.as_str();
        let pending = WithdrawalRequest {
            id: Uuid::new_v4(),
            uid,
            email: member.email().to_string(),
            amount: request.amount,
            method: request.method,
            account_info: request.account_info.trim().to_string(),
            status: WithdrawalStatus::Pending,
            timestamp: self.clock.now(),
            resolved_at: None,
            resolved_by: None,
        };
        let pending = &pending;
        let request_key = withdrawal_key(pending.id);
        let request_key = request_key.as_str();

        let created = self
            .runner
            .run("create_withdrawal", |mut tx| async move {
                // An earlier attempt may have committed without hearing back.
                if let Some(committed) = tx.get::<WithdrawalRequest>(request_key).await? {
                    return Ok(committed);
                }

                let mut ledger: UserLedger = tx.get(key).await?.ok_or(AppError::NotFound)?;

                if pending.amount > ledger.balance {
                    return Err(WithdrawalViolation::ExceedsBalance {
                        balance: ledger.balance,
                    }
                    .into());
                }

                ledger.balance -= pending.amount;
                tx.update(key, &ledger)?;
                tx.insert(request_key, pending)?;
                tx.commit().await?;

                Ok(pending.clone())
            })
            .await?;

        self.metrics.record_withdrawal_created();
        tracing::info!(
            %uid,
            request_id = %created.id,
            amount = %created.amount,
            method = ?created.method,
            "Withdrawal request submitted"
        );

        Ok(created)
    }

    /// Moves a pending request to its terminal state. A rejection credits
    /// the amount back to the owner's balance as it stands now.
    pub async fn resolve_request(
        &self,
        admin: &AdminAccess,
        request_id: Uuid,
        decision: Decision,
    ) -> Result<WithdrawalRequest> {
        let admin_uid = admin.uid();
        let now = self.clock.now();
        let key = withdrawal_key(request_id);
        let key = key.as_str();

        let resolved = self
            .runner
            .run("resolve_withdrawal", |mut tx| async move {
                let mut request: WithdrawalRequest =
                    tx.get(key).await?.ok_or(AppError::NotFound)?;

                if request.status.is_terminal() {
                    // Our own earlier attempt, committed but unacknowledged.
                    let ours = request.resolved_by == Some(admin_uid)
                        && request.resolved_at == Some(now)
                        && request.status == WithdrawalStatus::from(decision);
                    if ours {
                        return Ok(request);
                    }
                    return Err(AppError::AlreadyResolved(request_id));
                }

                request.status = decision.into();
                request.resolved_at = Some(now);
                request.resolved_by = Some(admin_uid);
                tx.update(key, &request)?;

                if decision == Decision::Rejected {
                    let owner_key = ledger_key(request.uid);
                    let mut ledger: UserLedger = tx.get(&owner_key).await?.ok_or_else(|| {
                        AppError::Internal(anyhow!(
                            "ledger for user {} is missing, cannot refund request {}",
                            request.uid,
                            request_id
                        ))
                    })?;
                    ledger.balance += request.amount;
                    tx.update(&owner_key, &ledger)?;
                }

                tx.commit().await?;
                Ok(request)
            })
            .await?;

        self.metrics.record_withdrawal_resolved(decision.as_str());
        tracing::info!(
            request_id = %request_id,
            admin = %admin_uid,
            decision = decision.as_str(),
            amount = %resolved.amount,
            "Withdrawal request resolved"
        );

        Ok(resolved)
    }

    /// The member's own requests, newest first.
    pub async fn list_for_member(&self, member: &MemberAccess) -> Result<Vec<WithdrawalRequest>> {
        let uid = member.uid();
        let all = self.list_all("list_withdrawals").await?;

        let mut own: Vec<_> = all.into_iter().filter(|request| request.uid == uid).collect();
        own.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(own)
    }

    pub async fn admin_queue(&self, _admin: &AdminAccess) -> Result<AdminQueue> {
        let all = self.list_all("admin_queue").await?;
        Ok(AdminQueue::from_requests(all))
    }

    async fn list_all(&self, operation: &'static str) -> Result<Vec<WithdrawalRequest>> {
        self.runner
            .run(operation, |mut tx| async move { tx.list(WITHDRAWALS_PREFIX).await })
            .await
    }

    pub fn watch_member(&self, member: &MemberAccess) -> BoxStream<'static, Result<Vec<WithdrawalRequest>>> {
        let uid = member.uid();

        watch_collection::<WithdrawalRequest, _>(
            self.runner.store().clone(),
            WITHDRAWALS_PREFIX,
            move |request| request.uid == uid,
        )
        .map(|snapshot| {
            snapshot.map_err(AppError::from).map(|mut own| {
                own.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                own
            })
        })
        .boxed()
    }

    pub fn watch_queue(&self, _admin: &AdminAccess) -> BoxStream<'static, Result<AdminQueue>> {
        watch_collection::<WithdrawalRequest, _>(self.runner.store().clone(), WITHDRAWALS_PREFIX, |_| true)
            .map(|snapshot| snapshot.map(AdminQueue::from_requests).map_err(AppError::from))
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::SystemClock,
        models::WithdrawalMethod,
        store::{MemoryStore, RetryPolicy},
    };

    fn service() -> WithdrawalService {
        let metrics = Arc::new(MetricsService::new());
        let runner = TransactionRunner::new(Arc::new(MemoryStore::new()), RetryPolicy::default(), metrics.clone());
        WithdrawalService::new(runner, Arc::new(SystemClock), RewardRules::default(), metrics)
    }

    #[test]
    fn test_validation_order() {
        let withdrawals = service();

        assert_eq!(
            withdrawals.validate(Decimal::ZERO, ""),
            Err(WithdrawalViolation::NonPositiveAmount)
        );
        assert_eq!(
            withdrawals.validate(Decimal::from(99), ""),
            Err(WithdrawalViolation::BelowMinimum {
                minimum: Decimal::from(100)
            })
        );
        assert_eq!(
            withdrawals.validate(Decimal::from(100), "   "),
            Err(WithdrawalViolation::MissingAccountInfo)
        );
        assert_eq!(withdrawals.validate(Decimal::from(100), "0300 1234567"), Ok(()));
    }

    #[test]
    fn test_method_is_an_opaque_label() {
        let parsed: WithdrawalMethod = serde_json::from_str("\"Jazzcash\"").unwrap();
        assert_eq!(parsed, WithdrawalMethod::Jazzcash);
    }
}
