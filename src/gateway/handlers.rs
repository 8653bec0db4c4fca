use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use std::sync::Arc;
use validator::Validate;

use super::state::AppState;
use super::types::{
    AmountRequest, ApiError, ApiResponse, ApiResult, BalanceAdjustRequest, ContractView,
    HealthResponse, PurchaseRequest, UserStatusRequest, error_codes, ok,
};
use crate::auth::Actor;
use crate::models::{ContractId, Machine, Transaction, TransactionId, User, UserId};

/// `GET /api/v1/health`
///
/// 503 when the database is configured but does not answer.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse, content_type = "application/json"),
        (status = 503, description = "Database unreachable")
    ),
    tag = "System"
)]
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<HealthResponse>>) {
    if let Some(db) = &state.pg_db
        && let Err(e) = db.health_check().await
    {
        tracing::error!(error = %e, "Health check failed");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse {
                code: error_codes::SERVICE_UNAVAILABLE,
                msg: "unavailable".to_string(),
                data: None,
            }),
        );
    }

    (
        StatusCode::OK,
        Json(ApiResponse::success(HealthResponse {
            timestamp_ms: Utc::now().timestamp_millis(),
            live_sessions: state.ws_manager.stats().1,
        })),
    )
}

// ============================================================================
// User
// ============================================================================

/// `GET /user/profile`: runs offline catch-up before the balance is served
#[utoipa::path(
    get,
    path = "/api/v1/user/profile",
    responses(
        (status = 200, description = "User record after idle earnings are credited"),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_jwt" = [])),
    tag = "Funds"
)]
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<User> {
    ok(state.catch_up.refresh(actor.user_id).await?)
}

#[utoipa::path(
    get,
    path = "/api/v1/user/contracts",
    responses(
        (status = 200, description = "Caller's contracts in every state")
    ),
    security(("bearer_jwt" = [])),
    tag = "Contracts"
)]
pub async fn list_contracts(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Vec<ContractView>> {
    let contracts = state.engine.list_contracts(&actor).await?;
    ok(contracts.into_iter().map(ContractView::from).collect())
}

#[utoipa::path(
    post,
    path = "/api/v1/user/contracts",
    request_body = PurchaseRequest,
    responses(
        (status = 200, description = "Contract opened, principal debited"),
        (status = 400, description = "Amount below the minimum deposit"),
        (status = 422, description = "Insufficient balance")
    ),
    security(("bearer_jwt" = [])),
    tag = "Contracts"
)]
pub async fn purchase_contract(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<PurchaseRequest>,
) -> ApiResult<ContractView> {
    req.validate()?;
    let amount = req.amount()?;
    let contract = state
        .engine
        .purchase(&actor, req.machine_id, amount, req.auto_reinvest)
        .await?;
    ok(contract.into())
}

#[utoipa::path(
    post,
    path = "/api/v1/user/contracts/{id}/resume",
    params(("id" = i64, Path, description = "Contract id")),
    responses(
        (status = 200, description = "Fee paid, window restarted"),
        (status = 409, description = "Contract is not suspended"),
        (status = 422, description = "Insufficient balance")
    ),
    security(("bearer_jwt" = [])),
    tag = "Contracts"
)]
pub async fn resume_contract(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(contract_id): Path<ContractId>,
) -> ApiResult<ContractView> {
    ok(state.engine.resume(&actor, contract_id).await?.into())
}

#[utoipa::path(
    get,
    path = "/api/v1/user/machines",
    responses(
        (status = 200, description = "Active machine catalog")
    ),
    security(("bearer_jwt" = [])),
    tag = "Contracts"
)]
pub async fn list_machines(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Machine>> {
    ok(state.engine.list_machines().await?)
}

#[utoipa::path(
    get,
    path = "/api/v1/user/transactions",
    responses(
        (status = 200, description = "Caller's deposits and withdrawals, newest first")
    ),
    security(("bearer_jwt" = [])),
    tag = "Funds"
)]
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Vec<Transaction>> {
    ok(state.settlement.history(&actor).await?)
}

#[utoipa::path(
    post,
    path = "/api/v1/user/deposit",
    request_body = AmountRequest,
    responses(
        (status = 200, description = "Deposit recorded as pending"),
        (status = 400, description = "Invalid amount")
    ),
    security(("bearer_jwt" = [])),
    tag = "Funds"
)]
pub async fn request_deposit(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<AmountRequest>,
) -> ApiResult<Transaction> {
    req.validate()?;
    let amount = req.amount()?;
    ok(state
        .settlement
        .request_deposit(&actor, amount, req.note)
        .await?)
}

#[utoipa::path(
    post,
    path = "/api/v1/user/withdraw",
    request_body = AmountRequest,
    responses(
        (status = 200, description = "Funds locked, withdrawal pending review"),
        (status = 403, description = "KYC approval required"),
        (status = 422, description = "Insufficient balance")
    ),
    security(("bearer_jwt" = [])),
    tag = "Funds"
)]
pub async fn request_withdrawal(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<AmountRequest>,
) -> ApiResult<Transaction> {
    req.validate()?;
    let amount = req.amount()?;
    ok(state
        .settlement
        .request_withdrawal(&actor, amount, req.note)
        .await?)
}

// ============================================================================
// Admin
// ============================================================================

#[utoipa::path(
    get,
    path = "/api/v1/admin/transactions",
    responses(
        (status = 200, description = "Every pending transaction"),
        (status = 403, description = "Admin role required")
    ),
    security(("bearer_jwt" = [])),
    tag = "Admin"
)]
pub async fn list_pending_transactions(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Vec<Transaction>> {
    ok(state.settlement.pending(&actor).await?)
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/transactions/{id}/approve",
    params(("id" = i64, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Transaction approved"),
        (status = 409, description = "Already settled")
    ),
    security(("bearer_jwt" = [])),
    tag = "Admin"
)]
pub async fn approve_transaction(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<TransactionId>,
) -> ApiResult<Transaction> {
    ok(state.settlement.approve(&actor, id).await?)
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/transactions/{id}/reject",
    params(("id" = i64, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Transaction rejected"),
        (status = 409, description = "Already settled")
    ),
    security(("bearer_jwt" = [])),
    tag = "Admin"
)]
pub async fn reject_transaction(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<TransactionId>,
) -> ApiResult<Transaction> {
    ok(state.settlement.reject(&actor, id).await?)
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/users/{id}/balance",
    params(("id" = i64, Path, description = "User id")),
    request_body = BalanceAdjustRequest,
    responses(
        (status = 200, description = "New balance"),
        (status = 422, description = "Debit exceeds balance")
    ),
    security(("bearer_jwt" = [])),
    tag = "Admin"
)]
pub async fn adjust_balance(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(user_id): Path<UserId>,
    Json(req): Json<BalanceAdjustRequest>,
) -> ApiResult<rust_decimal::Decimal> {
    req.validate()?;
    let delta = req.delta()?;
    ok(state
        .admin
        .adjust_balance(&actor, user_id, delta, &req.reason)
        .await?)
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/users/{id}/status",
    params(("id" = i64, Path, description = "User id")),
    request_body = UserStatusRequest,
    responses(
        (status = 200, description = "Updated user record"),
        (status = 409, description = "Admins cannot suspend themselves")
    ),
    security(("bearer_jwt" = [])),
    tag = "Admin"
)]
pub async fn set_user_status(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(user_id): Path<UserId>,
    Json(req): Json<UserStatusRequest>,
) -> ApiResult<User> {
    if req.status.is_none() && req.kyc_status.is_none() {
        return Err(ApiError::bad_request("status or kycStatus required"));
    }

    let mut user = None;
    if let Some(status) = req.status {
        user = Some(state.admin.set_user_status(&actor, user_id, status).await?);
    }
    if let Some(kyc) = req.kyc_status {
        user = Some(state.admin.set_kyc_status(&actor, user_id, kyc).await?);
    }
    user.map_or_else(|| Err(ApiError::bad_request("nothing to update")), ok)
}
