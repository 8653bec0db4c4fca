//! Storage collaborator for the engine.
//!
//! Every balance change is an atomic increment at the storage layer; every
//! contract transition is a compare-and-set on the row it replaces. Two
//! backends implement [`Store`]:
//! - [`PgStore`]: PostgreSQL via sqlx, one transaction per fused operation
//! - [`MemoryStore`]: in-process, single lock, used by tests and the dev profile

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{
    Contract, ContractId, ContractStatus, KycStatus, Machine, MachineId, NewContract, Transaction,
    TransactionId, TransactionStatus, User, UserId, UserStatus,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of an operation that debits a balance only when it covers the amount
#[derive(Debug, Clone, PartialEq)]
pub enum Debit<T> {
    Applied(T),
    Insufficient { balance: Decimal },
    /// The row changed underneath the caller (cursor or status no longer matches)
    Conflict,
}

/// Claim of one accrual window on one contract.
///
/// Applied only if the contract is still `active` and its cursor still equals
/// `expected_cursor`; the contract counters and the user balance move together.
#[derive(Debug, Clone, PartialEq)]
pub struct AccrualCommit {
    pub contract_id: ContractId,
    pub user_id: UserId,
    pub expected_cursor: DateTime<Utc>,
    pub new_cursor: DateTime<Utc>,
    pub credited: Decimal,
    pub carry: Decimal,
}

/// Result of a claimed window
#[derive(Debug, Clone, PartialEq)]
pub struct AccrualReceipt {
    pub accumulated: Decimal,
    pub balance: Decimal,
}

/// Catch-up for every active contract of one user, stamped in the same unit
#[derive(Debug, Clone, PartialEq)]
pub struct CatchUpCommit {
    pub user_id: UserId,
    pub stamped_at: DateTime<Utc>,
    pub accruals: Vec<AccrualCommit>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CatchUpReceipt {
    /// Sum credited as a single balance delta
    pub credited: Decimal,
    /// Contracts whose window was claimed by this commit
    pub claimed: Vec<ContractId>,
}

/// Fee-bearing window reset, used both for renewal and for resume.
///
/// Renewal requires an `active` contract, resume a `suspended` one;
/// `expected_start` guards against a concurrent reset of the same window.
#[derive(Debug, Clone, PartialEq)]
pub struct Renewal {
    pub contract_id: ContractId,
    pub user_id: UserId,
    pub expected_start: DateTime<Utc>,
    pub fee: Decimal,
    pub new_start: DateTime<Utc>,
    pub new_end: DateTime<Utc>,
}

/// Terminal bookkeeping for a pending transaction
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub transaction_id: TransactionId,
    pub status: TransactionStatus,
    /// Credited to the owner together with the status change (zero for none)
    pub balance_delta: Decimal,
    pub processed_at: DateTime<Utc>,
}

#[async_trait]
pub trait Store: Send + Sync {
    // --- reads ---
    async fn get_user(&self, user_id: UserId) -> StoreResult<Option<User>>;
    async fn get_machine(&self, machine_id: MachineId) -> StoreResult<Option<Machine>>;
    async fn list_machines(&self) -> StoreResult<Vec<Machine>>;
    async fn get_contract(&self, contract_id: ContractId) -> StoreResult<Option<Contract>>;
    async fn list_active_contracts(&self) -> StoreResult<Vec<Contract>>;
    async fn list_user_contracts(
        &self,
        user_id: UserId,
        status: Option<ContractStatus>,
    ) -> StoreResult<Vec<Contract>>;
    async fn get_transaction(&self, id: TransactionId) -> StoreResult<Option<Transaction>>;
    async fn list_transactions(
        &self,
        user_id: Option<UserId>,
        status: Option<TransactionStatus>,
    ) -> StoreResult<Vec<Transaction>>;

    // --- ledger primitives ---
    /// `balance = balance + delta`; returns the new balance
    async fn apply_balance_delta(&self, user_id: UserId, delta: Decimal) -> StoreResult<Decimal>;
    /// `balance = balance - amount WHERE balance >= amount`
    async fn debit_if_sufficient(&self, user_id: UserId, amount: Decimal)
    -> StoreResult<Debit<Decimal>>;
    /// `None` when the window was already claimed or the contract left `active`
    async fn commit_accrual(&self, commit: &AccrualCommit) -> StoreResult<Option<AccrualReceipt>>;
    async fn commit_catch_up(&self, commit: &CatchUpCommit) -> StoreResult<CatchUpReceipt>;

    // --- contract transitions ---
    /// Debit principal and insert the contract as one unit
    async fn open_contract(&self, new: &NewContract, cost: Decimal) -> StoreResult<Debit<Contract>>;
    /// `active -> active`: debit the fee, reset the window and the accrual cursor
    async fn renew_contract(&self, renewal: &Renewal) -> StoreResult<Debit<Contract>>;
    /// `suspended -> active`: same debit and reset as a renewal
    async fn resume_contract(&self, renewal: &Renewal) -> StoreResult<Debit<Contract>>;
    /// `active -> suspended`; false unless still active in the window that
    /// started at `expected_start`
    async fn suspend_contract(
        &self,
        contract_id: ContractId,
        expected_start: DateTime<Utc>,
    ) -> StoreResult<bool>;
    /// `active -> expired`; same guard as suspension
    async fn expire_contract(
        &self,
        contract_id: ContractId,
        expected_start: DateTime<Utc>,
    ) -> StoreResult<bool>;

    // --- settlement ---
    /// Lock `amount` from the balance and record a pending withdrawal
    async fn create_withdrawal(
        &self,
        user_id: UserId,
        amount: Decimal,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> StoreResult<Debit<Transaction>>;
    /// Record a pending deposit; the balance moves on approval
    async fn create_deposit(
        &self,
        user_id: UserId,
        amount: Decimal,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> StoreResult<Transaction>;
    /// `pending -> status` plus the balance delta; `None` if no longer pending
    async fn settle_transaction(&self, settlement: &Settlement) -> StoreResult<Option<Transaction>>;

    // --- user administration ---
    async fn set_user_status(&self, user_id: UserId, status: UserStatus) -> StoreResult<bool>;
    async fn set_kyc_status(&self, user_id: UserId, status: KycStatus) -> StoreResult<bool>;
}
