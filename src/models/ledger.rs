use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// Per-user balance and daily ad counters, stored at `users/{uid}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLedger {
    pub email: String,
    pub balance: Decimal,
    #[serde(default)]
    pub ads_watched_today: u32,
    /// Missing or unparseable dates read as `None`, which never equals today.
    #[serde(default, deserialize_with = "lenient_day")]
    pub last_ad_watch_date: Option<NaiveDate>,
    /// Instant of the most recent credited ad.
    #[serde(default)]
    pub last_ad_credited_at: Option<DateTime<Utc>>,
    pub role: Role,
}

impl UserLedger {
    pub fn open(email: &str, role: Role, today: NaiveDate) -> Self {
        Self {
            email: email.to_string(),
            balance: Decimal::ZERO,
            ads_watched_today: 0,
            last_ad_watch_date: Some(today),
            last_ad_credited_at: None,
            role,
        }
    }

    /// Counter value that applies on `today`; a stale counter counts as zero.
    pub fn ads_watched_on(&self, today: NaiveDate) -> u32 {
        if self.last_ad_watch_date == Some(today) {
            self.ads_watched_today
        } else {
            0
        }
    }

    /// Zeroes the counter when the stored day is not `today`. Returns whether
    /// anything changed, so callers can skip the write on an already-current
    /// record.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if self.last_ad_watch_date == Some(today) {
            return false;
        }
        self.ads_watched_today = 0;
        self.last_ad_watch_date = Some(today);
        true
    }
}

fn lenient_day<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(|value| value.as_str())
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()))
}

pub fn ledger_key(uid: Uuid) -> String {
    format!("users/{}", uid)
}

/// Two fraction digits, the only way amounts are rendered.
pub fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LedgerResponse {
    pub uid: Uuid,
    pub email: String,
    pub role: Role,
    pub balance: Decimal,
    pub balance_display: String,
    pub ads_watched_today: u32,
    pub last_ad_watch_date: Option<NaiveDate>,
}

impl LedgerResponse {
    pub fn new(uid: Uuid, ledger: &UserLedger, today: NaiveDate, currency: &str) -> Self {
        Self {
            uid,
            email: ledger.email.clone(),
            role: ledger.role,
            balance: ledger.balance,
            balance_display: format!("{} {}", currency, format_amount(ledger.balance)),
            ads_watched_today: ledger.ads_watched_on(today),
            last_ad_watch_date: ledger.last_ad_watch_date,
        }
    }
}
