//! Live channel wire format
//!
//! Every frame is a JSON object with a `type` discriminator.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{ContractId, TransactionStatus, UserId};

/// State-change events fanned out to live sessions.
///
/// Every session receives every event, so payloads (support messages and
/// amounts included) are visible to all connected users. Clients keep only
/// the events whose `userId` is their own; `PROFIT_GENERATED` is matched by
/// `contractId` against the caller's contract list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PushEvent {
    #[serde(rename_all = "camelCase")]
    ProfitGenerated {
        contract_id: ContractId,
        accumulated: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    BalanceUpdate { user_id: UserId },
    #[serde(rename_all = "camelCase")]
    TransactionUpdate {
        user_id: UserId,
        message: String,
        status: TransactionStatus,
    },
    #[serde(rename_all = "camelCase")]
    ContractSuspended {
        user_id: UserId,
        contract_id: ContractId,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    SupportMessage {
        user_id: UserId,
        subject: String,
        message: String,
    },
}

impl PushEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            PushEvent::ProfitGenerated { .. } => "PROFIT_GENERATED",
            PushEvent::BalanceUpdate { .. } => "BALANCE_UPDATE",
            PushEvent::TransactionUpdate { .. } => "TRANSACTION_UPDATE",
            PushEvent::ContractSuspended { .. } => "CONTRACT_SUSPENDED",
            PushEvent::SupportMessage { .. } => "SUPPORT_MESSAGE",
        }
    }
}

/// Session control frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    #[serde(rename_all = "camelCase")]
    Connected { user_id: UserId },
    Pong,
    Error { message: String },
}

/// Frames accepted from clients
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
}
