//! HTTP gateway
//!
//! - `/api/v1/health`: public
//! - `/api/v1/user/*`: JWT
//! - `/api/v1/admin/*`: JWT + admin role
//! - `/ws?token=`: live push channel
//! - `/docs`: Swagger UI

pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod state;
pub mod types;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::websocket::ws_handler;
use state::AppState;

/// Build the complete router
pub fn router(state: Arc<AppState>) -> Router {
    // Protected by JWT
    let user_routes = Router::new()
        .route("/profile", get(handlers::get_profile))
        .route(
            "/contracts",
            get(handlers::list_contracts).post(handlers::purchase_contract),
        )
        .route("/contracts/{id}/resume", post(handlers::resume_contract))
        .route("/machines", get(handlers::list_machines))
        .route("/transactions", get(handlers::list_transactions))
        .route("/deposit", post(handlers::request_deposit))
        .route("/withdraw", post(handlers::request_withdrawal))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::jwt_auth_middleware,
        ));

    // JWT + admin role; layers run outermost-last, so auth wraps the admin check
    let admin_routes = Router::new()
        .route("/transactions", get(handlers::list_pending_transactions))
        .route(
            "/transactions/{id}/approve",
            post(handlers::approve_transaction),
        )
        .route("/transactions/{id}/reject", post(handlers::reject_transaction))
        .route("/users/{id}/balance", post(handlers::adjust_balance))
        .route("/users/{id}/status", post(handlers::set_user_status))
        .layer(from_fn(middleware::admin_only_middleware))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::jwt_auth_middleware,
        ));

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/v1/health", get(handlers::health_check))
        .nest("/api/v1/user", user_routes)
        .nest("/api/v1/admin", admin_routes)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
        .with_state(state)
}

/// Serve until `shutdown` resolves; in-flight requests are drained first
pub async fn run_server(
    host: &str,
    port: u16,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;

    tracing::info!(%addr, "Gateway listening");
    tracing::info!("WebSocket endpoint: ws://{}/ws?token=<jwt>", addr);
    tracing::info!("API docs: http://{}/docs", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
