//! Ledger - the single entry point for balance mutation.
//!
//! Amounts are rounded to ledger precision here and handed to the store's
//! atomic primitives; nothing above this layer touches a balance directly.

use rust_decimal::Decimal;
use std::sync::Arc;

use crate::error::EngineError;
use crate::models::{Contract, NewContract, Transaction, UserId};
use crate::money::round_ledger;
use crate::store::{
    AccrualCommit, AccrualReceipt, CatchUpCommit, CatchUpReceipt, Debit, Renewal, Store,
};

/// Outcome of a fee-bearing window reset
#[derive(Debug, Clone, PartialEq)]
pub enum ChargeOutcome {
    Charged(Contract),
    Insufficient { balance: Decimal },
    /// Window already reset or status changed by another writer
    Stale,
}

impl From<Debit<Contract>> for ChargeOutcome {
    fn from(debit: Debit<Contract>) -> Self {
        match debit {
            Debit::Applied(c) => ChargeOutcome::Charged(c),
            Debit::Insufficient { balance } => ChargeOutcome::Insufficient { balance },
            Debit::Conflict => ChargeOutcome::Stale,
        }
    }
}

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
}

impl Ledger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Atomically add a (possibly negative) amount; returns the new balance
    pub async fn apply_delta(
        &self,
        user_id: UserId,
        amount: Decimal,
    ) -> Result<Decimal, EngineError> {
        let delta = round_ledger(amount);
        let balance = self.store.apply_balance_delta(user_id, delta).await?;
        tracing::debug!(user_id, %delta, %balance, "Balance delta applied");
        Ok(balance)
    }

    /// Conditional decrement; `InsufficientBalance` when it does not cover `amount`
    pub async fn debit_if_sufficient(
        &self,
        user_id: UserId,
        amount: Decimal,
    ) -> Result<Decimal, EngineError> {
        let amount = round_ledger(amount);
        match self.store.debit_if_sufficient(user_id, amount).await? {
            Debit::Applied(balance) => Ok(balance),
            Debit::Insufficient { balance } => Err(EngineError::InsufficientBalance {
                required: amount,
                available: balance,
            }),
            Debit::Conflict => Err(EngineError::InvalidState("balance changed".into())),
        }
    }

    /// Claim an accrual window and credit the owner; `None` if already claimed
    pub async fn commit_accrual(
        &self,
        commit: &AccrualCommit,
    ) -> Result<Option<AccrualReceipt>, EngineError> {
        Ok(self.store.commit_accrual(commit).await?)
    }

    pub async fn commit_catch_up(
        &self,
        commit: &CatchUpCommit,
    ) -> Result<CatchUpReceipt, EngineError> {
        Ok(self.store.commit_catch_up(commit).await?)
    }

    /// Debit principal and insert the contract as one unit
    pub async fn open_contract(
        &self,
        new: &NewContract,
        cost: Decimal,
    ) -> Result<Contract, EngineError> {
        let cost = round_ledger(cost);
        match self.store.open_contract(new, cost).await? {
            Debit::Applied(contract) => Ok(contract),
            Debit::Insufficient { balance } => Err(EngineError::InsufficientBalance {
                required: cost,
                available: balance,
            }),
            Debit::Conflict => Err(EngineError::InvalidState("contract insert conflict".into())),
        }
    }

    /// Fee debit fused with the `active -> active` window reset
    pub async fn charge_renewal(&self, renewal: &Renewal) -> Result<ChargeOutcome, EngineError> {
        let renewal = Renewal {
            fee: round_ledger(renewal.fee),
            ..renewal.clone()
        };
        Ok(self.store.renew_contract(&renewal).await?.into())
    }

    /// Fee debit fused with the `suspended -> active` transition
    pub async fn charge_resume(&self, renewal: &Renewal) -> Result<ChargeOutcome, EngineError> {
        let renewal = Renewal {
            fee: round_ledger(renewal.fee),
            ..renewal.clone()
        };
        Ok(self.store.resume_contract(&renewal).await?.into())
    }

    /// Lock funds for a withdrawal and record it as pending
    pub async fn lock_withdrawal(
        &self,
        user_id: UserId,
        amount: Decimal,
        note: Option<String>,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Transaction, EngineError> {
        let amount = round_ledger(amount);
        match self.store.create_withdrawal(user_id, amount, note, at).await? {
            Debit::Applied(tx) => Ok(tx),
            Debit::Insufficient { balance } => Err(EngineError::InsufficientBalance {
                required: amount,
                available: balance,
            }),
            Debit::Conflict => Err(EngineError::InvalidState("withdrawal conflict".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{KycStatus, Role, User, UserStatus};
    use crate::store::MemoryStore;
    use chrono::Utc;

    fn setup(balance: Decimal) -> (Arc<MemoryStore>, Ledger) {
        let store = Arc::new(MemoryStore::new());
        store.insert_user(User {
            id: 1,
            email: "a@example.com".into(),
            balance,
            last_earnings_update: None,
            kyc_status: KycStatus::None,
            status: UserStatus::Active,
            role: Role::User,
            created_at: Utc::now(),
        });
        let ledger = Ledger::new(store.clone());
        (store, ledger)
    }

    #[tokio::test]
    async fn test_apply_delta_rounds_half_up() {
        let (_, ledger) = setup(Decimal::ZERO);
        let balance = ledger.apply_delta(1, Decimal::new(12345, 8)).await.unwrap(); // 0.00012345
        assert_eq!(balance, Decimal::new(1, 4));

        let balance = ledger.apply_delta(1, Decimal::new(-5, 5)).await.unwrap(); // -0.00005
        assert_eq!(balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_debit_if_sufficient() {
        let (_, ledger) = setup(Decimal::from(5));
        assert_eq!(
            ledger.debit_if_sufficient(1, Decimal::from(3)).await.unwrap(),
            Decimal::from(2)
        );

        let err = ledger
            .debit_if_sufficient(1, Decimal::from(3))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientBalance { available, .. } if available == Decimal::from(2)
        ));
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let (_, ledger) = setup(Decimal::ZERO);
        let err = ledger.apply_delta(99, Decimal::ONE).await.unwrap_err();
        assert!(matches!(err, EngineError::UserNotFound(99)));
    }

    #[tokio::test]
    async fn test_unavailable_store_is_persistence_error() {
        let (store, ledger) = setup(Decimal::ZERO);
        store.set_unavailable(true);
        let err = ledger.apply_delta(1, Decimal::ONE).await.unwrap_err();
        assert_eq!(err.http_status(), 500);
    }
}
