use axum::{extract::State, response::{IntoResponse, Json}};
use serde_json::json;

use crate::{
    errors::Result,
    handlers::{stream::snapshot_events, AppState},
    middleware::auth::MemberSession,
    models::{format_amount, AdHistoryEntry, AdReward},
};

#[utoipa::path(
    post,
    path = "/api/v1/ads/watch",
    responses(
        (status = 200, description = "Reward credited", body = AdReward),
        (status = 403, description = "Administrators cannot watch ads"),
        (status = 429, description = "Daily ad limit reached"),
        (status = 503, description = "Store unavailable, retry later")
    ),
    security(("bearer" = [])),
    tag = "ads"
)]
pub async fn watch_ad(
    State(state): State<AppState>,
    MemberSession(member): MemberSession,
) -> Result<Json<serde_json::Value>> {
    let reward = state.rewards.watch_ad(&member).await?;

    Ok(Json(json!({
        "message": format!(
            "You earned {} {}",
            state.config.currency,
            format_amount(reward.reward)
        ),
        "data": reward
    })))
}

#[utoipa::path(
    get,
    path = "/api/v1/ads/history",
    responses((status = 200, description = "Accepted ad views, newest first", body = [AdHistoryEntry])),
    security(("bearer" = [])),
    tag = "ads"
)]
pub async fn history(
    State(state): State<AppState>,
    MemberSession(member): MemberSession,
) -> Result<Json<serde_json::Value>> {
    let entries = state.rewards.history(&member).await?;

    Ok(Json(json!({
        "data": entries
    })))
}

pub async fn history_stream(
    State(state): State<AppState>,
    MemberSession(member): MemberSession,
) -> impl IntoResponse {
    snapshot_events(state.rewards.watch_history(&member), state.shutdown.clone())
}
