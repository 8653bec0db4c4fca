//! Transaction Settlement
//!
//! Deposits and withdrawals are requested by users and settled by admins:
//!
//! | kind       | at request      | approve       | reject        |
//! |------------|-----------------|---------------|---------------|
//! | withdrawal | balance −amount | no change     | balance +amount |
//! | deposit    | no change       | balance +amount | no change   |
//!
//! Settlement is a compare-and-set on `pending`; a second approve/reject of the
//! same transaction returns `InvalidState`. Every outcome publishes
//! `TRANSACTION_UPDATE` and sends a best-effort notification.

pub mod deposit;
pub mod withdraw;

use rust_decimal::Decimal;
use std::sync::Arc;

use crate::admin::verify_admin;
use crate::auth::Actor;
use crate::clock::Clock;
use crate::error::EngineError;
use crate::ledger::Ledger;
use crate::models::{Transaction, TransactionId, TransactionKind, TransactionStatus, User, UserId};
use crate::money::format_ledger;
use crate::notify::SupportBridge;
use crate::store::{Settlement, Store};

pub struct SettlementService {
    store: Arc<dyn Store>,
    ledger: Ledger,
    support: Arc<SupportBridge>,
    clock: Arc<dyn Clock>,
    require_kyc_for_withdrawal: bool,
}

impl SettlementService {
    pub fn new(
        store: Arc<dyn Store>,
        support: Arc<SupportBridge>,
        clock: Arc<dyn Clock>,
        require_kyc_for_withdrawal: bool,
    ) -> Self {
        Self {
            ledger: Ledger::new(store.clone()),
            store,
            support,
            clock,
            require_kyc_for_withdrawal,
        }
    }

    async fn active_user(&self, user_id: UserId) -> Result<User, EngineError> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or(EngineError::UserNotFound(user_id))?;
        if !user.is_active() {
            return Err(EngineError::Forbidden(format!(
                "account is {}",
                user.status.as_str()
            )));
        }
        Ok(user)
    }

    /// Admin: `pending -> approved`
    pub async fn approve(
        &self,
        actor: &Actor,
        id: TransactionId,
    ) -> Result<Transaction, EngineError> {
        self.settle(actor, id, TransactionStatus::Approved).await
    }

    /// Admin: `pending -> rejected`
    pub async fn reject(
        &self,
        actor: &Actor,
        id: TransactionId,
    ) -> Result<Transaction, EngineError> {
        self.settle(actor, id, TransactionStatus::Rejected).await
    }

    async fn settle(
        &self,
        actor: &Actor,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<Transaction, EngineError> {
        verify_admin(self.store.as_ref(), actor).await?;

        let tx = self
            .store
            .get_transaction(id)
            .await?
            .ok_or(EngineError::TransactionNotFound(id))?;
        if tx.status != TransactionStatus::Pending {
            return Err(already_settled(&tx));
        }

        let balance_delta = settlement_delta(tx.kind, status, tx.amount);
        let settled = self
            .store
            .settle_transaction(&Settlement {
                transaction_id: id,
                status,
                balance_delta,
                processed_at: self.clock.now(),
            })
            .await?;

        let Some(settled) = settled else {
            // lost the CAS to a concurrent settlement
            let current = self
                .store
                .get_transaction(id)
                .await?
                .ok_or(EngineError::TransactionNotFound(id))?;
            return Err(already_settled(&current));
        };

        tracing::info!(
            transaction_id = id,
            user_id = settled.user_id,
            kind = %settled.kind,
            status = %settled.status,
            amount = %settled.amount,
            admin_id = actor.user_id,
            "Transaction settled"
        );

        let message = outcome_message(&settled);
        self.support
            .transaction_update(settled.user_id, settled.status, &message)
            .await;
        Ok(settled)
    }

    /// The caller's transactions, newest first
    pub async fn history(&self, actor: &Actor) -> Result<Vec<Transaction>, EngineError> {
        Ok(self.store.list_transactions(Some(actor.user_id), None).await?)
    }

    /// Admin: every pending transaction
    pub async fn pending(&self, actor: &Actor) -> Result<Vec<Transaction>, EngineError> {
        verify_admin(self.store.as_ref(), actor).await?;
        Ok(self
            .store
            .list_transactions(None, Some(TransactionStatus::Pending))
            .await?)
    }
}

/// Balance movement applied together with the status change
fn settlement_delta(kind: TransactionKind, status: TransactionStatus, amount: Decimal) -> Decimal {
    match (kind, status) {
        (TransactionKind::Withdrawal, TransactionStatus::Rejected) => amount,
        (TransactionKind::Deposit, TransactionStatus::Approved) => amount,
        _ => Decimal::ZERO,
    }
}

fn already_settled(tx: &Transaction) -> EngineError {
    EngineError::InvalidState(format!("transaction #{} is already {}", tx.id, tx.status))
}

fn outcome_message(tx: &Transaction) -> String {
    let amount = format_ledger(tx.amount);
    match (tx.kind, tx.status) {
        (TransactionKind::Withdrawal, TransactionStatus::Approved) => {
            format!("Your withdrawal of {} has been approved.", amount)
        }
        (TransactionKind::Withdrawal, TransactionStatus::Rejected) => format!(
            "Your withdrawal of {} was rejected and the funds returned to your balance.",
            amount
        ),
        (TransactionKind::Deposit, TransactionStatus::Approved) => {
            format!("Your deposit of {} has been credited.", amount)
        }
        (TransactionKind::Deposit, TransactionStatus::Rejected) => {
            format!("Your deposit of {} was rejected.", amount)
        }
        (kind, TransactionStatus::Pending) => {
            format!("Your {} of {} is pending review.", kind, amount)
        }
    }
}
