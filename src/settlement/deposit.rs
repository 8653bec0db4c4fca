use rust_decimal::Decimal;

use super::SettlementService;
use crate::auth::Actor;
use crate::error::EngineError;
use crate::models::{Transaction, TransactionStatus};
use crate::money::{format_ledger, round_ledger};

impl SettlementService {
    /// Record a pending deposit; the balance is credited only on approval
    pub async fn request_deposit(
        &self,
        actor: &Actor,
        amount: Decimal,
        reference: Option<String>,
    ) -> Result<Transaction, EngineError> {
        if amount <= Decimal::ZERO || round_ledger(amount) != amount {
            return Err(EngineError::InvalidAmount(format!(
                "deposit amount must be positive with at most 4 decimals, got {}",
                amount
            )));
        }

        let user = self.active_user(actor.user_id).await?;
        let tx = self
            .store
            .create_deposit(user.id, amount, reference, self.clock.now())
            .await?;

        tracing::info!(
            transaction_id = tx.id,
            user_id = user.id,
            amount = %amount,
            "Deposit requested"
        );
        self.support
            .transaction_update(
                user.id,
                TransactionStatus::Pending,
                &format!("Your deposit of {} is pending review.", format_ledger(amount)),
            )
            .await;
        Ok(tx)
    }
}
