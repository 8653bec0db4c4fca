//! Accrual and lifecycle engine
//!
//! - [`accrual`]: profit arithmetic shared by both accrual paths
//! - [`ContractEngine`]: periodic pass, purchase, resume
//! - [`CatchUpCalculator`]: idle-time earnings on profile reads
//! - [`AccrualDriver`]: the periodic task

pub mod accrual;
pub mod catch_up;
pub mod driver;
pub mod lifecycle;

pub use catch_up::CatchUpCalculator;
pub use driver::AccrualDriver;
pub use lifecycle::{ContractEngine, TickReport};
