use std::{future::Future, time::Duration};

use axum::{
    error_handling::HandleErrorLayer,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    BoxError, Json, Router,
};
use serde_json::json;
use tower::{limit::GlobalConcurrencyLimitLayer, ServiceBuilder};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod auth;
pub mod clock;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;

use handlers::{admin, ads, auth as auth_handlers, docs, health, metrics, user, withdrawals, AppState};

async fn handle_overload(error: BoxError) -> impl IntoResponse {
    let (status, message) = if error.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, "Request timed out")
    } else if error.is::<tower::load_shed::error::Overloaded>() {
        (StatusCode::SERVICE_UNAVAILABLE, "Server is overloaded, please try again")
    } else {
        tracing::error!("Unhandled middleware error: {}", error);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    };

    (
        status,
        Json(json!({
            "error": message,
            "status": status.as_u16()
        })),
    )
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(auth_handlers::register))
        .route("/auth/login", post(auth_handlers::login))
        .route("/auth/logout", post(auth_handlers::logout))
        .route("/me", get(user::me))
        .route("/dashboard", get(user::dashboard))
        .route("/ads/watch", post(ads::watch_ad))
        .route("/ads/history", get(ads::history))
        .route(
            "/withdrawals",
            post(withdrawals::create_withdrawal).get(withdrawals::list_withdrawals),
        )
        .route("/admin/withdrawals", get(admin::list_queue))
        .route("/admin/withdrawals/:id/resolve", post(admin::resolve_withdrawal))
}

// Long-lived event streams stay outside the request timeout.
fn stream_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/me/stream", get(user::me_stream))
        .route("/api/v1/ads/history/stream", get(ads::history_stream))
        .route("/api/v1/withdrawals/stream", get(withdrawals::withdrawals_stream))
        .route("/api/v1/admin/withdrawals/stream", get(admin::queue_stream))
}

pub fn create_app(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.config.request_timeout_secs);
    let max_concurrent = state.config.max_concurrent_requests;

    let bounded = Router::new()
        .route("/health", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/metrics", get(metrics::metrics_handler))
        .nest("/api/v1", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_overload))
                .load_shed()
                .layer(GlobalConcurrencyLimitLayer::new(max_concurrent))
                .timeout(request_timeout),
        );

    Router::new()
        .merge(bounded)
        .merge(stream_routes())
        .merge(docs::create_docs_router())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the app until `signal` resolves, then ends open event streams and
/// waits for in-flight requests to finish.
pub async fn serve<S>(listener: tokio::net::TcpListener, state: AppState, signal: S) -> std::io::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let shutdown = state.shutdown.clone();
    let app = create_app(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            shutdown.cancel();
        })
        .await
}
