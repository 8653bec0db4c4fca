//! hashlease - accrual and lifecycle engine for virtual mining contracts
//!
//! Users rent or buy hashing machines from a catalog; a periodic driver credits
//! pro-rata profit, bills rental windows and retires matured purchases.
//!
//! # Modules
//!
//! - [`engine`] - profit arithmetic, contract lifecycle, catch-up, driver
//! - [`ledger`] - the only path that mutates balances
//! - [`store`] - persistence seam (in-memory and PostgreSQL)
//! - [`settlement`] - deposit and withdrawal review
//! - [`admin`] - privileged account operations
//! - [`notify`] - support messages (mail relay + live channel)
//! - [`websocket`] - live push channel
//! - [`gateway`] - HTTP API

pub mod admin;
pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod money;
pub mod notify;
pub mod settlement;
pub mod store;
pub mod websocket;

// Convenient re-exports at crate root
pub use auth::{Actor, TokenVerifier};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{AccrualDriver, CatchUpCalculator, ContractEngine, TickReport};
pub use error::EngineError;
pub use ledger::Ledger;
pub use models::{
    Contract, ContractStatus, Machine, MachineType, Transaction, TransactionKind,
    TransactionStatus, User,
};
pub use store::{MemoryStore, PgStore, Store};
