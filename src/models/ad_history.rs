use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// One accepted ad view. Stored at `adHistory/{uid}/{id}` and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdHistoryEntry {
    pub id: Uuid,
    pub reward: Decimal,
    pub timestamp: DateTime<Utc>,
}

pub fn ad_history_prefix(uid: Uuid) -> String {
    format!("adHistory/{}/", uid)
}

pub fn ad_history_key(uid: Uuid, entry_id: Uuid) -> String {
    format!("adHistory/{}/{}", uid, entry_id)
}

/// Outcome of an accepted ad view.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AdReward {
    pub reward: Decimal,
    pub balance: Decimal,
    pub ads_watched_today: u32,
    pub remaining_today: u32,
}
