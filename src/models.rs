//! Domain records: users, catalog machines, mining contracts, settlement transactions.
//!
//! Status enums are stored as lowercase text in PostgreSQL; `as_str` / `FromStr`
//! are the only conversions between the two.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type UserId = i64;
pub type MachineId = i64;
pub type ContractId = i64;
pub type TransactionId = i64;

// ============================================================================
// User
// ============================================================================

/// Account standing; only `Active` users may open contracts or move funds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Suspended,
    Banned,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Suspended => "suspended",
            UserStatus::Banned => "banned",
        }
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(UserStatus::Active),
            "suspended" => Ok(UserStatus::Suspended),
            "banned" => Ok(UserStatus::Banned),
            _ => Err(format!("Invalid user status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KycStatus {
    #[default]
    None,
    Pending,
    Approved,
    Rejected,
}

impl KycStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KycStatus::None => "none",
            KycStatus::Pending => "pending",
            KycStatus::Approved => "approved",
            KycStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for KycStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(KycStatus::None),
            "pending" => Ok(KycStatus::Pending),
            "approved" => Ok(KycStatus::Approved),
            "rejected" => Ok(KycStatus::Rejected),
            _ => Err(format!("Invalid KYC status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub balance: Decimal,
    pub last_earnings_update: Option<DateTime<Utc>>,
    pub kyc_status: KycStatus,
    pub status: UserStatus,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Start of the idle interval the catch-up calculator measures
    pub fn earnings_reference(&self) -> DateTime<Utc> {
        self.last_earnings_update.unwrap_or(self.created_at)
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

// ============================================================================
// Machine catalog
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineType {
    /// Leased: user-chosen deposit is the principal, recurring fee per window
    Rent,
    /// Purchased: buy price is the principal, matures after one window
    Buy,
}

impl MachineType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineType::Rent => "rent",
            MachineType::Buy => "buy",
        }
    }
}

impl fmt::Display for MachineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MachineType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rent" => Ok(MachineType::Rent),
            "buy" => Ok(MachineType::Buy),
            _ => Err(format!("Invalid machine type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    pub id: MachineId,
    pub name: String,
    pub machine_type: MachineType,
    /// Percent of principal earned per 24h
    pub daily_rate: Decimal,
    /// Billing window (rent) or maturity period (buy)
    pub duration_days: i32,
    pub monthly_fee: Decimal,
    pub min_deposit: Decimal,
    pub rental_price: Decimal,
    pub buy_price: Decimal,
    pub is_active: bool,
}

impl Machine {
    pub fn duration(&self) -> Duration {
        Duration::days(i64::from(self.duration_days.max(0)))
    }
}

// ============================================================================
// Contract
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    Active,
    /// Monthly fee could not be paid; waits for an explicit resume
    Suspended,
    /// Terminal: matured buy contract
    Expired,
}

impl ContractStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, ContractStatus::Expired)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Active => "active",
            ContractStatus::Suspended => "suspended",
            ContractStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(ContractStatus::Active),
            "suspended" => Ok(ContractStatus::Suspended),
            "expired" => Ok(ContractStatus::Expired),
            _ => Err(format!("Invalid contract status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub id: ContractId,
    pub user_id: UserId,
    pub machine_id: MachineId,
    /// Principal: buy price for buy machines, deposit for rented ones
    pub amount: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: ContractStatus,
    pub accumulated_rewards: Decimal,
    pub auto_reinvest: bool,
    /// Instant up to which profit has been credited
    pub last_accrued_at: DateTime<Utc>,
    /// Sub-precision remainder carried into the next accrual
    #[serde(skip_serializing, default)]
    pub accrual_carry: Decimal,
}

/// Insert payload for a freshly purchased contract
#[derive(Debug, Clone)]
pub struct NewContract {
    pub user_id: UserId,
    pub machine_id: MachineId,
    pub amount: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub auto_reinvest: bool,
}

impl NewContract {
    pub fn into_contract(self, id: ContractId) -> Contract {
        Contract {
            id,
            user_id: self.user_id,
            machine_id: self.machine_id,
            amount: self.amount,
            start_date: self.start_date,
            end_date: self.end_date,
            status: ContractStatus::Active,
            accumulated_rewards: Decimal::ZERO,
            auto_reinvest: self.auto_reinvest,
            last_accrued_at: self.start_date,
            accrual_carry: Decimal::ZERO,
        }
    }
}

// ============================================================================
// Transactions (deposit / withdrawal settlement)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "deposit" => Ok(TransactionKind::Deposit),
            "withdrawal" => Ok(TransactionKind::Withdrawal),
            _ => Err(format!("Invalid transaction kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Rejected,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Approved => "approved",
            TransactionStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TransactionStatus::Pending),
            "approved" => Ok(TransactionStatus::Approved),
            "rejected" => Ok(TransactionStatus::Rejected),
            _ => Err(format!("Invalid transaction status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub status: TransactionStatus,
    /// Wallet address for withdrawals, payment reference for deposits
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}
