use axum::{extract::State, response::{IntoResponse, Json}};
use futures::StreamExt;
use serde_json::json;

use crate::{
    errors::{AppError, Result},
    handlers::{stream::snapshot_events, AppState},
    middleware::auth::Session,
    models::LedgerResponse,
    services::Access,
};

/// Current ledger, with yesterday's counter already rolled over.
#[utoipa::path(
    get,
    path = "/api/v1/me",
    responses(
        (status = 200, description = "Ledger of the signed-in user", body = LedgerResponse),
        (status = 401, description = "Not signed in")
    ),
    security(("bearer" = [])),
    tag = "user"
)]
pub async fn me(State(state): State<AppState>, session: Session) -> Result<Json<serde_json::Value>> {
    let ledger = state.quota.refresh(session.user.uid).await?;
    let today = state.clock.today();

    Ok(Json(json!({
        "data": {
            "ledger": LedgerResponse::new(session.user.uid, &ledger, today, &state.config.currency),
            "quota": state.quota.status(&ledger),
        }
    })))
}

pub async fn me_stream(State(state): State<AppState>, session: Session) -> impl IntoResponse {
    let uid = session.user.uid;
    let currency = state.config.currency.clone();
    let clock = state.clock.clone();

    let updates = state
        .ledgers
        .watch(uid)
        .map(move |update| {
            update
                .and_then(|ledger| ledger.ok_or(AppError::NotFound))
                .map(|ledger| LedgerResponse::new(uid, &ledger, clock.today(), &currency))
        })
        .boxed();

    snapshot_events(updates, state.shutdown.clone())
}

/// Role-specific landing data: the withdrawal queue for administrators, the
/// ledger and quota for members.
#[utoipa::path(
    get,
    path = "/api/v1/dashboard",
    responses(
        (status = 200, description = "Admin queue or member overview"),
        (status = 401, description = "Not signed in")
    ),
    security(("bearer" = [])),
    tag = "user"
)]
pub async fn dashboard(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<serde_json::Value>> {
    match &session.access {
        Access::Admin(admin) => {
            let queue = state.withdrawals.admin_queue(admin).await?;
            Ok(Json(json!({
                "data": {
                    "role": "admin",
                    "queue": queue,
                }
            })))
        }
        Access::Member(_) => {
            let ledger = state.quota.refresh(session.user.uid).await?;
            let today = state.clock.today();
            let quota = state.quota.status(&ledger);

            Ok(Json(json!({
                "data": {
                    "role": "user",
                    "ledger": LedgerResponse::new(session.user.uid, &ledger, today, &state.config.currency),
                    "quota": quota,
                    "canWatchAd": !quota.is_exhausted(),
                    "canWithdraw": ledger.balance >= state.config.rules.min_withdrawal,
                    "minWithdrawal": state.config.rules.min_withdrawal,
                }
            })))
        }
    }
}
