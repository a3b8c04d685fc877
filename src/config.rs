use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use std::{env, str::FromStr, time::Duration};

use crate::store::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            other => bail!("unknown STORE_BACKEND '{}'", other),
        }
    }
}

/// The tunable business constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardRules {
    pub daily_ad_limit: u32,
    pub ad_reward: Decimal,
    pub min_withdrawal: Decimal,
    /// Minimum seconds between two credited ads; 0 disables the check.
    pub min_ad_interval_secs: u64,
}

impl Default for RewardRules {
    fn default() -> Self {
        Self {
            daily_ad_limit: 20,
            ad_reward: Decimal::from(5),
            min_withdrawal: Decimal::from(100),
            min_ad_interval_secs: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub store_backend: StoreBackend,
    pub database_url: String,
    pub jwt_secret: String,
    pub access_token_ttl_minutes: i64,
    pub password_hash_cost: u32,
    pub admin_email: String,
    pub currency: String,
    pub rules: RewardRules,
    pub retry: RetryPolicy,
    pub request_timeout_secs: u64,
    pub max_concurrent_requests: usize,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T>(name: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var_or(name, default)
        .trim()
        .parse()
        .with_context(|| format!("invalid value for {}", name))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let rules = RewardRules {
            daily_ad_limit: parse_var("DAILY_AD_LIMIT", "20")?,
            ad_reward: parse_var("AD_REWARD", "5")?,
            min_withdrawal: parse_var("MIN_WITHDRAWAL", "100")?,
            min_ad_interval_secs: parse_var("AD_MIN_INTERVAL_SECS", "0")?,
        };
        if rules.ad_reward <= Decimal::ZERO {
            bail!("AD_REWARD must be positive");
        }
        if rules.min_withdrawal <= Decimal::ZERO {
            bail!("MIN_WITHDRAWAL must be positive");
        }

        let retry = RetryPolicy {
            max_attempts: parse_var::<u32>("TRANSACTION_MAX_ATTEMPTS", "5")?.max(1),
            base_delay: Duration::from_millis(parse_var("TRANSACTION_BASE_DELAY_MS", "20")?),
            attempt_timeout: Duration::from_millis(parse_var("STORE_TIMEOUT_MS", "5000")?),
        };

        Ok(Config {
            port: parse_var("PORT", "3000")?,
            store_backend: var_or("STORE_BACKEND", "memory").parse()?,
            database_url: var_or("DATABASE_URL", "postgresql://localhost/ad_rewards"),
            jwt_secret: var_or("JWT_SECRET", "your-secret-key"),
            access_token_ttl_minutes: parse_var("ACCESS_TOKEN_TTL_MINUTES", "60")?,
            password_hash_cost: parse_var("BCRYPT_COST", &bcrypt::DEFAULT_COST.to_string())?,
            admin_email: var_or("ADMIN_EMAIL", "admin@pkr.com").trim().to_lowercase(),
            currency: var_or("CURRENCY", "PKR"),
            rules,
            retry,
            request_timeout_secs: parse_var("REQUEST_TIMEOUT_SECS", "30")?,
            max_concurrent_requests: parse_var("MAX_CONCURRENT_REQUESTS", "1024")?,
        })
    }

    /// Defaults with an in-memory store; what tests and benchmarks start from.
    pub fn for_tests() -> Self {
        Config {
            port: 0,
            store_backend: StoreBackend::Memory,
            database_url: String::new(),
            jwt_secret: "test-secret".to_string(),
            access_token_ttl_minutes: 60,
            password_hash_cost: 4,
            admin_email: "admin@pkr.com".to_string(),
            currency: "PKR".to_string(),
            rules: RewardRules::default(),
            retry: RetryPolicy {
                max_attempts: 10,
                base_delay: Duration::from_millis(1),
                attempt_timeout: Duration::from_secs(5),
            },
            request_timeout_secs: 30,
            max_concurrent_requests: 1024,
        }
    }
}
