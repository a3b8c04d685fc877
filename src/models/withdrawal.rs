use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

pub const WITHDRAWALS_PREFIX: &str = "withdrawals/";

/// Payout channel. Treated as an opaque label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum WithdrawalMethod {
    Easypaisa,
    Jazzcash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
}

impl WithdrawalStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, WithdrawalStatus::Pending)
    }
}

/// Administrator verdict on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Approved => "approved",
            Decision::Rejected => "rejected",
        }
    }
}

impl From<Decision> for WithdrawalStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approved => WithdrawalStatus::Approved,
            Decision::Rejected => WithdrawalStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRequest {
    pub id: Uuid,
    pub uid: Uuid,
    pub email: String,
    pub amount: Decimal,
    pub method: WithdrawalMethod,
    pub account_info: String,
    pub status: WithdrawalStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<Uuid>,
}

pub fn withdrawal_key(id: Uuid) -> String {
    format!("{}{}", WITHDRAWALS_PREFIX, id)
}

/// The withdrawal constraint a submission failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WithdrawalViolation {
    #[error("Please enter a valid amount")]
    NonPositiveAmount,

    #[error("Minimum withdrawal amount is {minimum}")]
    BelowMinimum { minimum: Decimal },

    #[error("Withdrawal amount cannot exceed your current balance of {balance}")]
    ExceedsBalance { balance: Decimal },

    #[error("Please enter your account information")]
    MissingAccountInfo,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateWithdrawalRequest {
    pub amount: Decimal,
    pub method: WithdrawalMethod,
    pub account_info: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResolveWithdrawalRequest {
    pub decision: Decision,
}

/// Everything an administrator sees, split the way the admin panel shows it.
#[derive(Debug, Serialize, ToSchema)]
pub struct AdminQueue {
    /// Oldest first.
    pub pending: Vec<WithdrawalRequest>,
    /// Newest first.
    pub processed: Vec<WithdrawalRequest>,
}

impl AdminQueue {
    pub fn from_requests(requests: Vec<WithdrawalRequest>) -> Self {
        let (mut pending, mut processed): (Vec<_>, Vec<_>) = requests
            .into_iter()
            .partition(|request| request.status == WithdrawalStatus::Pending);
        pending.sort_by_key(|request| request.timestamp);
        processed.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Self { pending, processed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn request(status: WithdrawalStatus, minutes_ago: i64) -> WithdrawalRequest {
        WithdrawalRequest {
            id: Uuid::new_v4(),
            uid: Uuid::new_v4(),
            email: "u@example.com".to_string(),
            amount: Decimal::from(100),
            method: WithdrawalMethod::Easypaisa,
            account_info: "03001234567".to_string(),
            status,
            timestamp: Utc::now() - Duration::minutes(minutes_ago),
            resolved_at: None,
            resolved_by: None,
        }
    }

    #[test]
    fn test_admin_queue_ordering() {
        let old_pending = request(WithdrawalStatus::Pending, 30);
        let new_pending = request(WithdrawalStatus::Pending, 5);
        let old_done = request(WithdrawalStatus::Rejected, 40);
        let new_done = request(WithdrawalStatus::Approved, 1);

        let queue = AdminQueue::from_requests(vec![
            new_pending.clone(),
            old_done.clone(),
            old_pending.clone(),
            new_done.clone(),
        ]);

        assert_eq!(queue.pending, vec![old_pending, new_pending]);
        assert_eq!(queue.processed, vec![new_done, old_done]);
    }

    #[test]
    fn test_wire_format() {
        let value = serde_json::to_value(request(WithdrawalStatus::Pending, 0)).unwrap();
        assert_eq!(value["status"], json!("pending"));
        assert_eq!(value["method"], json!("Easypaisa"));
        assert!(value.get("accountInfo").is_some());
        assert!(value.get("resolvedAt").is_none());
    }

    #[test]
    fn test_only_pending_is_not_terminal() {
        assert!(!WithdrawalStatus::Pending.is_terminal());
        assert!(WithdrawalStatus::Approved.is_terminal());
        assert!(WithdrawalStatus::Rejected.is_terminal());
    }
}
