use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    auth::JwtService,
    clock::Clock,
    config::Config,
    services::{
        metrics::MetricsService, AdRewardProcessor, IdentityProvider, LedgerService,
        LocalIdentityProvider, QuotaManager, WithdrawalService,
    },
    store::{DocumentStore, TransactionRunner},
};

pub mod admin;
pub mod ads;
pub mod auth;
pub mod docs;
pub mod health;
pub mod metrics;
pub mod stream;
pub mod user;
pub mod withdrawals;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn DocumentStore>,
    pub clock: Arc<dyn Clock>,
    pub identity: Arc<dyn IdentityProvider>,
    pub jwt: Arc<JwtService>,
    pub ledgers: Arc<LedgerService>,
    pub quota: Arc<QuotaManager>,
    pub rewards: Arc<AdRewardProcessor>,
    pub withdrawals: Arc<WithdrawalService>,
    pub metrics: Arc<MetricsService>,
    /// Cancelled when the server starts shutting down; ends open event streams.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        let metrics = Arc::new(MetricsService::new());
        let runner = TransactionRunner::new(store.clone(), config.retry, metrics.clone());

        Self {
            identity: Arc::new(LocalIdentityProvider::new(
                runner.clone(),
                clock.clone(),
                config.password_hash_cost,
            )),
            jwt: Arc::new(JwtService::new(&config.jwt_secret, config.access_token_ttl_minutes)),
            ledgers: Arc::new(LedgerService::new(runner.clone(), clock.clone(), &config.admin_email)),
            quota: Arc::new(QuotaManager::new(
                runner.clone(),
                clock.clone(),
                config.rules.daily_ad_limit,
            )),
            rewards: Arc::new(AdRewardProcessor::new(
                runner.clone(),
                clock.clone(),
                config.rules,
                metrics.clone(),
            )),
            withdrawals: Arc::new(WithdrawalService::new(runner, clock.clone(), config.rules, metrics.clone())),
            config: Arc::new(config),
            store,
            clock,
            metrics,
            shutdown: CancellationToken::new(),
        }
    }
}
