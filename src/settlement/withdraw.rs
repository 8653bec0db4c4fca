use rust_decimal::Decimal;

use super::SettlementService;
use crate::auth::Actor;
use crate::error::EngineError;
use crate::models::{KycStatus, Transaction, TransactionStatus};
use crate::money::{format_ledger, round_ledger};

impl SettlementService {
    /// Lock `amount` from the caller's balance and queue the withdrawal for review
    pub async fn request_withdrawal(
        &self,
        actor: &Actor,
        amount: Decimal,
        address: Option<String>,
    ) -> Result<Transaction, EngineError> {
        if amount <= Decimal::ZERO || round_ledger(amount) != amount {
            return Err(EngineError::InvalidAmount(format!(
                "withdrawal amount must be positive with at most 4 decimals, got {}",
                amount
            )));
        }

        let user = self.active_user(actor.user_id).await?;
        if self.require_kyc_for_withdrawal && user.kyc_status != KycStatus::Approved {
            return Err(EngineError::Forbidden("KYC approval required for withdrawals".into()));
        }

        let tx = self
            .ledger
            .lock_withdrawal(user.id, amount, address, self.clock.now())
            .await?;

        tracing::info!(
            transaction_id = tx.id,
            user_id = user.id,
            amount = %amount,
            "Withdrawal requested, funds locked"
        );
        self.support
            .transaction_update(
                user.id,
                TransactionStatus::Pending,
                &format!(
                    "Your withdrawal of {} is pending review.",
                    format_ledger(amount)
                ),
            )
            .await;
        Ok(tx)
    }
}
