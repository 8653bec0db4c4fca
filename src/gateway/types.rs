//! Gateway wire types: the response envelope, error codes and request bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use validator::Validate;

use crate::error::EngineError;
use crate::models::{Contract, ContractStatus, KycStatus, MachineId, UserStatus};
use crate::money::{LEDGER_SCALE, parse_amount};

/// Unified API response envelope
/// - code: 0 for success, non-zero for errors
/// - msg: short message description
/// - data: actual data (success) or absent (error)
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: error_codes::SUCCESS,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

pub mod error_codes {
    // Success
    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;
    pub const INSUFFICIENT_BALANCE: i32 = 1002;
    pub const INVALID_STATE: i32 = 1003;

    // Auth errors (2xxx)
    pub const MISSING_AUTH: i32 = 2001;
    pub const AUTH_FAILED: i32 = 2002;
    pub const FORBIDDEN: i32 = 2003;

    // Resource errors (4xxx)
    pub const NOT_FOUND: i32 = 4004;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const SERVICE_UNAVAILABLE: i32 = 5001;
}

/// Handler error: an engine error rendered into the envelope
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: i32,
    pub msg: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: i32, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            msg: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error_codes::INVALID_PARAMETER, msg)
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let code = match &e {
            EngineError::InvalidAmount(_) => error_codes::INVALID_PARAMETER,
            EngineError::InsufficientBalance { .. } => error_codes::INSUFFICIENT_BALANCE,
            EngineError::InvalidState(_) => error_codes::INVALID_STATE,
            EngineError::Unauthorized => error_codes::AUTH_FAILED,
            EngineError::Forbidden(_) => error_codes::FORBIDDEN,
            EngineError::Persistence(_) => error_codes::INTERNAL_ERROR,
            e if e.is_not_found() => error_codes::NOT_FOUND,
            _ => error_codes::INTERNAL_ERROR,
        };
        let status =
            StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // storage details stay in the log
        let msg = if let EngineError::Persistence(detail) = &e {
            tracing::error!(error = %detail, "Request failed on persistence");
            "internal error".to_string()
        } else {
            tracing::debug!(code = e.code(), error = %e, "Request rejected");
            e.to_string()
        };
        Self { status, code, msg }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(e: validator::ValidationErrors) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.code, self.msg))).into_response()
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    #[schema(example = 1)]
    pub machine_id: MachineId,
    /// Deposit for rented machines; ignored for purchases
    #[serde(default)]
    #[schema(example = "100")]
    pub amount: Option<String>,
    #[serde(default)]
    pub auto_reinvest: bool,
}

impl PurchaseRequest {
    pub fn amount(&self) -> Result<Option<Decimal>, ApiError> {
        self.amount
            .as_deref()
            .map(|a| parse_amount(a).map_err(|e| ApiError::bad_request(e.to_string())))
            .transpose()
    }
}

/// Deposit or withdrawal request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AmountRequest {
    #[schema(example = "250.5")]
    pub amount: String,
    /// Wallet address (withdrawal) or payment reference (deposit)
    #[validate(length(min = 1, max = 128))]
    pub note: Option<String>,
}

impl AmountRequest {
    pub fn amount(&self) -> Result<Decimal, ApiError> {
        parse_amount(&self.amount).map_err(|e| ApiError::bad_request(e.to_string()))
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct BalanceAdjustRequest {
    /// Signed amount, e.g. `"-12.5"`
    #[schema(example = "-12.5")]
    pub delta: String,
    #[validate(length(min = 1, max = 256))]
    pub reason: String,
}

impl BalanceAdjustRequest {
    pub fn delta(&self) -> Result<Decimal, ApiError> {
        let delta = Decimal::from_str(self.delta.trim())
            .map_err(|_| ApiError::bad_request(format!("not a decimal: {}", self.delta)))?;
        if delta.normalize().scale() > LEDGER_SCALE {
            return Err(ApiError::bad_request(format!(
                "at most {} decimals allowed",
                LEDGER_SCALE
            )));
        }
        Ok(delta)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusRequest {
    /// `active`, `suspended` or `banned`
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "suspended")]
    pub status: Option<UserStatus>,
    /// `none`, `pending`, `approved` or `rejected`
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "approved")]
    pub kyc_status: Option<KycStatus>,
}

// ============================================================================
// Responses
// ============================================================================

/// Contract plus the action the client should offer, if any
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractView {
    #[serde(flatten)]
    pub contract: Contract,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_required: Option<String>,
    pub read_only: bool,
}

impl From<Contract> for ContractView {
    fn from(contract: Contract) -> Self {
        let (action_required, read_only) = match contract.status {
            ContractStatus::Suspended => (
                Some("insufficient balance, action required: resume".to_string()),
                false,
            ),
            ContractStatus::Expired => (None, true),
            ContractStatus::Active => (None, false),
        };
        Self {
            contract,
            action_required,
            read_only,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Server timestamp in milliseconds
    #[schema(example = 1735689600000_i64)]
    pub timestamp_ms: i64,
    /// Open live-channel sessions
    pub live_sessions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_mapping() {
        let err: ApiError = EngineError::InsufficientBalance {
            required: Decimal::from(3),
            available: Decimal::from(2),
        }
        .into();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code, error_codes::INSUFFICIENT_BALANCE);

        let err: ApiError = EngineError::ContractNotFound(4).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.code, error_codes::NOT_FOUND);

        let err: ApiError = EngineError::Persistence("connection refused".into()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.msg, "internal error");
    }

    #[test]
    fn test_adjust_delta_accepts_sign() {
        let req = BalanceAdjustRequest {
            delta: "-12.5".into(),
            reason: "chargeback".into(),
        };
        assert_eq!(req.delta().unwrap(), Decimal::new(-125, 1));

        let req = BalanceAdjustRequest {
            delta: "0.00001".into(),
            reason: "dust".into(),
        };
        assert!(req.delta().is_err());
    }

    #[test]
    fn test_note_length_validated() {
        let req = AmountRequest {
            amount: "10".into(),
            note: Some("x".repeat(200)),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_suspended_contract_view_offers_resume() {
        let now = chrono::Utc::now();
        let contract = Contract {
            id: 1,
            user_id: 1,
            machine_id: 1,
            amount: Decimal::from(100),
            start_date: now,
            end_date: now,
            status: ContractStatus::Suspended,
            accumulated_rewards: Decimal::ZERO,
            auto_reinvest: false,
            last_accrued_at: now,
            accrual_carry: Decimal::ZERO,
        };
        let view = ContractView::from(contract);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "suspended");
        assert!(json["actionRequired"].as_str().unwrap().contains("resume"));
        assert!(json.get("accrualCarry").is_none());
    }
}
