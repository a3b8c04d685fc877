use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

use crate::{
    errors::Result,
    handlers::{stream::snapshot_events, AppState},
    middleware::auth::MemberSession,
    models::{format_amount, CreateWithdrawalRequest, WithdrawalRequest},
};

#[utoipa::path(
    post,
    path = "/api/v1/withdrawals",
    request_body = CreateWithdrawalRequest,
    responses(
        (status = 201, description = "Request submitted and amount debited", body = WithdrawalRequest),
        (status = 400, description = "Amount or account information invalid"),
        (status = 403, description = "Administrators cannot withdraw")
    ),
    security(("bearer" = [])),
    tag = "withdrawals"
)]
pub async fn create_withdrawal(
    State(state): State<AppState>,
    MemberSession(member): MemberSession,
    Json(request): Json<CreateWithdrawalRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let created = state.withdrawals.create_request(&member, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": format!(
                "Withdrawal request for {} {} submitted",
                state.config.currency,
                format_amount(created.amount)
            ),
            "data": created
        })),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/withdrawals",
    responses((status = 200, description = "Own requests, newest first", body = [WithdrawalRequest])),
    security(("bearer" = [])),
    tag = "withdrawals"
)]
pub async fn list_withdrawals(
    State(state): State<AppState>,
    MemberSession(member): MemberSession,
) -> Result<Json<serde_json::Value>> {
    let requests = state.withdrawals.list_for_member(&member).await?;

    Ok(Json(json!({
        "data": requests
    })))
}

pub async fn withdrawals_stream(
    State(state): State<AppState>,
    MemberSession(member): MemberSession,
) -> impl IntoResponse {
    snapshot_events(state.withdrawals.watch_member(&member), state.shutdown.clone())
}
