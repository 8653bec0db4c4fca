//! Engine Error Types
//!
//! One taxonomy for every user-initiated and background operation. Background
//! callers log and skip per contract; gateway handlers map to HTTP via
//! [`EngineError::http_status`].

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{ContractId, MachineId, TransactionId, UserId};
use crate::money::MoneyError;
use crate::store::StoreError;

#[derive(Error, Debug, Clone)]
pub enum EngineError {
    // === Not Found ===
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Machine not found: {0}")]
    MachineNotFound(MachineId),

    #[error("Contract not found: {0}")]
    ContractNotFound(ContractId),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    // === Funds ===
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    // === Validation ===
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    // === Authorization ===
    #[error("User not authenticated")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    // === System ===
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl EngineError {
    /// Error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::UserNotFound(_) => "USER_NOT_FOUND",
            EngineError::MachineNotFound(_) => "MACHINE_NOT_FOUND",
            EngineError::ContractNotFound(_) => "CONTRACT_NOT_FOUND",
            EngineError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            EngineError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            EngineError::InvalidAmount(_) => "INVALID_AMOUNT",
            EngineError::InvalidState(_) => "INVALID_STATE",
            EngineError::Unauthorized => "UNAUTHORIZED",
            EngineError::Forbidden(_) => "FORBIDDEN",
            EngineError::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }

    /// HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            EngineError::Unauthorized => 401,
            EngineError::Forbidden(_) => 403,
            EngineError::UserNotFound(_)
            | EngineError::MachineNotFound(_)
            | EngineError::ContractNotFound(_)
            | EngineError::TransactionNotFound(_) => 404,
            EngineError::InvalidAmount(_) => 400,
            EngineError::InvalidState(_) => 409,
            EngineError::InsufficientBalance { .. } => 422,
            EngineError::Persistence(_) => 500,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.http_status() == 404
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UserNotFound(id) => EngineError::UserNotFound(id),
            other => EngineError::Persistence(other.to_string()),
        }
    }
}

impl From<MoneyError> for EngineError {
    fn from(e: MoneyError) -> Self {
        EngineError::InvalidAmount(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(EngineError::ContractNotFound(3).code(), "CONTRACT_NOT_FOUND");
        assert_eq!(
            EngineError::InsufficientBalance {
                required: Decimal::from(3),
                available: Decimal::from(2),
            }
            .code(),
            "INSUFFICIENT_BALANCE"
        );
        assert_eq!(EngineError::Forbidden("x".into()).code(), "FORBIDDEN");
    }

    #[test]
    fn test_http_status() {
        assert_eq!(EngineError::Unauthorized.http_status(), 401);
        assert_eq!(EngineError::Forbidden("admin only".into()).http_status(), 403);
        assert_eq!(EngineError::MachineNotFound(1).http_status(), 404);
        assert_eq!(EngineError::InvalidState("expired".into()).http_status(), 409);
        assert_eq!(EngineError::Persistence("down".into()).http_status(), 500);
        assert!(EngineError::UserNotFound(9).is_not_found());
    }

    #[test]
    fn test_store_error_mapping() {
        let mapped: EngineError = StoreError::UserNotFound(42).into();
        assert!(matches!(mapped, EngineError::UserNotFound(42)));

        let mapped: EngineError = StoreError::Unavailable("pool closed".into()).into();
        assert!(matches!(mapped, EngineError::Persistence(_)));
    }

    #[test]
    fn test_display() {
        let err = EngineError::InsufficientBalance {
            required: Decimal::from(3),
            available: Decimal::from(2),
        };
        assert_eq!(err.to_string(), "Insufficient balance: required 3, available 2");
    }
}
