use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::AppState;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health::liveness,
        crate::handlers::health::readiness,
        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::auth::logout,
        crate::handlers::user::me,
        crate::handlers::user::dashboard,
        crate::handlers::ads::watch_ad,
        crate::handlers::ads::history,
        crate::handlers::withdrawals::create_withdrawal,
        crate::handlers::withdrawals::list_withdrawals,
        crate::handlers::admin::list_queue,
        crate::handlers::admin::resolve_withdrawal,
    ),
    components(
        schemas(
            crate::models::CreateUserRequest,
            crate::models::LoginRequest,
            crate::models::UserResponse,
            crate::models::AuthResponse,
            crate::models::Role,
            crate::models::LedgerResponse,
            crate::models::AdReward,
            crate::models::AdHistoryEntry,
            crate::models::WithdrawalMethod,
            crate::models::WithdrawalStatus,
            crate::models::WithdrawalRequest,
            crate::models::CreateWithdrawalRequest,
            crate::models::Decision,
            crate::models::ResolveWithdrawalRequest,
            crate::models::AdminQueue,
            crate::services::QuotaMetric,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Sign-up, sign-in and sign-out"),
        (name = "user", description = "Ledger and dashboard of the signed-in user"),
        (name = "ads", description = "Ad rewards"),
        (name = "withdrawals", description = "Member withdrawal requests"),
        (name = "admin", description = "Withdrawal review"),
        (name = "health", description = "Health check endpoints")
    ),
    info(
        title = "Ad Rewards API",
        version = "1.0.0",
        description = "Earn balance by watching ads, request payouts, review them as an administrator"
    )
)]
pub struct ApiDoc;

pub fn create_docs_router() -> Router<AppState> {
    Router::new().merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
