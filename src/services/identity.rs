use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
    auth::PasswordService,
    clock::Clock,
    errors::{AppError, Result},
    models::{identity_key, normalize_email, revoked_session_key, Account, Identity},
    store::TransactionRunner,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedUp(Identity),
    SignedIn(Identity),
    SignedOut { session_id: Uuid },
}

/// Email/password authentication. The rest of the service only ever sees
/// the resulting [`Identity`].
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity>;

    async fn sign_out(&self, session_id: Uuid) -> Result<()>;

    async fn is_revoked(&self, session_id: Uuid) -> Result<bool>;

    fn on_auth_change(&self) -> broadcast::Receiver<AuthEvent>;
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RevokedSession {
    revoked_at: chrono::DateTime<chrono::Utc>,
}

/// Credentials kept in the document store next to the ledgers.
pub struct LocalIdentityProvider {
    runner: TransactionRunner,
    clock: Arc<dyn Clock>,
    hash_cost: u32,
    events: broadcast::Sender<AuthEvent>,
}

impl LocalIdentityProvider {
    pub fn new(runner: TransactionRunner, clock: Arc<dyn Clock>, hash_cost: u32) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            runner,
            clock,
            hash_cost,
            events,
        }
    }

    fn publish(&self, event: AuthEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}

fn validate_email(email: &str) -> Result<()> {
    let (local, domain) = email
        .split_once('@')
        .ok_or_else(|| AppError::Validation("Invalid email format".to_string()))?;

    if local.is_empty() || domain.is_empty() || email.chars().any(char::is_whitespace) {
        return Err(AppError::Validation("Invalid email format".to_string()));
    }
    Ok(())
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity> {
        let email = normalize_email(email);
        validate_email(&email)?;
        PasswordService::validate_password(password)?;

        let password = password.to_string();
        let cost = self.hash_cost;
        let password_hash = tokio::task::spawn_blocking(move || PasswordService::hash_password(&password, cost))
            .await
            .map_err(|e| AppError::Internal(e.into()))??;

        let account = Account {
            uid: Uuid::new_v4(),
            email: email.clone(),
            password_hash,
            created_at: self.clock.now(),
        };
        let account = &account;
        let key = identity_key(&email);
        let key = key.as_str();

        self.runner
            .run("sign_up", |mut tx| async move {
                if let Some(existing) = tx.get::<Account>(key).await? {
                    // Written by an earlier attempt of this same sign-up.
                    if existing.uid == account.uid {
                        return Ok(());
                    }
                    return Err(AppError::Validation(
                        "An account with this email already exists".to_string(),
                    ));
                }
                tx.insert(key, account)?;
                tx.commit().await
            })
            .await?;

        let identity = Identity {
            uid: account.uid,
            email,
        };
        tracing::info!(uid = %identity.uid, "Account created");
        self.publish(AuthEvent::SignedUp(identity.clone()));

        Ok(identity)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        let key = identity_key(email);
        let key = key.as_str();

        let account = self
            .runner
            .run("sign_in", |mut tx| async move { tx.get::<Account>(key).await })
            .await?
            .ok_or_else(|| AppError::Auth("Invalid email or password".to_string()))?;

        let password = password.to_string();
        let password_hash = account.password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || PasswordService::verify_password(&password, &password_hash))
            .await
            .map_err(|e| AppError::Internal(e.into()))??;

        if !valid {
            tracing::warn!(uid = %account.uid, "Rejected sign-in with wrong password");
            return Err(AppError::Auth("Invalid email or password".to_string()));
        }

        let identity = Identity {
            uid: account.uid,
            email: account.email,
        };
        self.publish(AuthEvent::SignedIn(identity.clone()));

        Ok(identity)
    }

    async fn sign_out(&self, session_id: Uuid) -> Result<()> {
        let key = revoked_session_key(session_id);
        let key = key.as_str();
        let record = RevokedSession {
            revoked_at: self.clock.now(),
        };
        let record = &record;

        self.runner
            .run("sign_out", |mut tx| async move {
                if tx.get::<RevokedSession>(key).await?.is_some() {
                    return Ok(());
                }
                tx.insert(key, record)?;
                tx.commit().await
            })
            .await?;

        self.publish(AuthEvent::SignedOut { session_id });
        Ok(())
    }

    async fn is_revoked(&self, session_id: Uuid) -> Result<bool> {
        let key = revoked_session_key(session_id);
        let key = key.as_str();

        self.runner
            .run("check_session", |mut tx| async move {
                Ok(tx.get::<RevokedSession>(key).await?.is_some())
            })
            .await
    }

    fn on_auth_change(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
