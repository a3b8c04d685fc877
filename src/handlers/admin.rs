use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    errors::Result,
    handlers::{stream::snapshot_events, AppState},
    middleware::auth::AdminSession,
    models::{AdminQueue, ResolveWithdrawalRequest, WithdrawalRequest},
};

#[utoipa::path(
    get,
    path = "/api/v1/admin/withdrawals",
    responses(
        (status = 200, description = "Pending (oldest first) and processed (newest first) requests", body = AdminQueue),
        (status = 403, description = "Not an administrator")
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
pub async fn list_queue(
    State(state): State<AppState>,
    AdminSession(admin): AdminSession,
) -> Result<Json<serde_json::Value>> {
    let queue = state.withdrawals.admin_queue(&admin).await?;

    Ok(Json(json!({
        "data": queue
    })))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/withdrawals/{id}/resolve",
    params(("id" = Uuid, Path, description = "Withdrawal request id")),
    request_body = ResolveWithdrawalRequest,
    responses(
        (status = 200, description = "Request resolved", body = WithdrawalRequest),
        (status = 404, description = "No such request"),
        (status = 409, description = "Request was already resolved")
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
pub async fn resolve_withdrawal(
    State(state): State<AppState>,
    AdminSession(admin): AdminSession,
    Path(request_id): Path<Uuid>,
    Json(request): Json<ResolveWithdrawalRequest>,
) -> Result<Json<serde_json::Value>> {
    let resolved = state
        .withdrawals
        .resolve_request(&admin, request_id, request.decision)
        .await?;

    Ok(Json(json!({
        "message": format!("Withdrawal request {}", request.decision.as_str()),
        "data": resolved
    })))
}

pub async fn queue_stream(
    State(state): State<AppState>,
    AdminSession(admin): AdminSession,
) -> impl IntoResponse {
    snapshot_events(state.withdrawals.watch_queue(&admin), state.shutdown.clone())
}
