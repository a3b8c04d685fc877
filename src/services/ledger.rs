use std::sync::Arc;

use futures::{stream::BoxStream, StreamExt};
use uuid::Uuid;

use crate::{
    clock::Clock,
    errors::{AppError, Result},
    models::{ledger_key, normalize_email, Identity, Role, UserLedger},
    store::{watch_document, TransactionRunner},
};

pub struct LedgerService {
    runner: TransactionRunner,
    clock: Arc<dyn Clock>,
    admin_email: String,
}

impl LedgerService {
    pub fn new(runner: TransactionRunner, clock: Arc<dyn Clock>, admin_email: &str) -> Self {
        Self {
            runner,
            clock,
            admin_email: normalize_email(admin_email),
        }
    }

    fn role_for(&self, email: &str) -> Role {
        if normalize_email(email) == self.admin_email {
            Role::Admin
        } else {
            Role::User
        }
    }

    /// Returns the ledger for `identity`, creating it first if it does not
    /// exist yet. Safe to call on every sign-in.
    pub async fn ensure_ledger(&self, identity: &Identity) -> Result<UserLedger> {
        let key = ledger_key(identity.uid);
        let key = key.as_str();
        let fresh = UserLedger::open(&identity.email, self.role_for(&identity.email), self.clock.today());
        let fresh = &fresh;

        self.runner
            .run("ensure_ledger", |mut tx| async move {
                if let Some(existing) = tx.get::<UserLedger>(key).await? {
                    return Ok(existing);
                }

                tx.insert(key, fresh)?;
                tx.commit().await?;

                tracing::info!(
                    email = %fresh.email,
                    role = ?fresh.role,
                    "Created ledger"
                );
                Ok(fresh.clone())
            })
            .await
    }

    pub async fn get(&self, uid: Uuid) -> Result<UserLedger> {
        let key = ledger_key(uid);
        let key = key.as_str();

        self.runner
            .run("get_ledger", |mut tx| async move {
                tx.get::<UserLedger>(key).await?.ok_or(AppError::NotFound)
            })
            .await
    }

    /// The ledger as it changes.
    pub fn watch(&self, uid: Uuid) -> BoxStream<'static, Result<Option<UserLedger>>> {
        watch_document::<UserLedger>(self.runner.store().clone(), ledger_key(uid))
            .map(|update| update.map_err(AppError::from))
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::SystemClock,
        services::metrics::MetricsService,
        store::{MemoryStore, RetryPolicy},
    };
    use rust_decimal::Decimal;

    fn service() -> LedgerService {
        let runner = TransactionRunner::new(
            Arc::new(MemoryStore::new()),
            RetryPolicy::default(),
            Arc::new(MetricsService::new()),
        );
        LedgerService::new(runner, Arc::new(SystemClock), "Admin@PKR.com")
    }

    fn identity(email: &str) -> Identity {
        Identity {
            uid: Uuid::new_v4(),
            email: email.to_string(),
        }
    }

    #[tokio::test]
    async fn test_ensure_ledger_is_idempotent() {
        let ledgers = service();
        let identity = identity("user@example.com");

        let first = ledgers.ensure_ledger(&identity).await.unwrap();
        assert_eq!(first.balance, Decimal::ZERO);
        assert_eq!(first.role, Role::User);

        let again = ledgers.ensure_ledger(&identity).await.unwrap();
        assert_eq!(again, first);
        assert_eq!(again, ledgers.get(identity.uid).await.unwrap());
    }

    #[tokio::test]
    async fn test_admin_email_gets_admin_role() {
        let ledgers = service();
        let ledger = ledgers
            .ensure_ledger(&identity("admin@pkr.com"))
            .await
            .unwrap();

        assert_eq!(ledger.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_missing_ledger_is_not_found() {
        let result = service().get(Uuid::new_v4()).await;
        assert!(matches!(result, Err(AppError::NotFound)));
    }
}
