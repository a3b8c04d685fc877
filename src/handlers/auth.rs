use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::json;

use crate::{
    auth::PasswordService,
    errors::Result,
    handlers::AppState,
    middleware::auth::AuthenticatedUser,
    models::{AuthResponse, CreateUserRequest, Identity, LoginRequest, UserResponse},
};

async fn issue_session(state: &AppState, identity: &Identity) -> Result<AuthResponse> {
    // Creating the ledger here as well repairs an account whose first
    // sign-up stopped between the credential and the ledger write.
    let ledger = state.ledgers.ensure_ledger(identity).await?;
    let access_token = state.jwt.generate_access_token(identity)?;

    Ok(AuthResponse {
        access_token,
        user: UserResponse {
            uid: identity.uid,
            email: identity.email.clone(),
            role: ledger.role,
        },
    })
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Account created and signed in", body = AuthResponse),
        (status = 400, description = "Invalid email, weak password or mismatched confirmation")
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    PasswordService::validate_password(&request.password)?;
    PasswordService::validate_confirmation(&request.password, &request.confirm_password)?;

    let identity = state.identity.sign_up(&request.email, &request.password).await?;
    let response = issue_session(&state, &identity).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User registered successfully",
            "data": response
        })),
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Invalid email or password")
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>> {
    let identity = state.identity.sign_in(&request.email, &request.password).await?;
    let response = issue_session(&state, &identity).await?;

    Ok(Json(json!({
        "message": "Login successful",
        "data": response
    })))
}

/// Revokes the session the request was made with; other sessions of the
/// same user stay valid.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    responses((status = 200, description = "Session revoked")),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<serde_json::Value>> {
    state.identity.sign_out(user.session_id).await?;

    Ok(Json(json!({
        "message": "Logged out successfully"
    })))
}
