//! Offline catch-up: credits idle time when a user record is read.
//!
//! The user-level `last_earnings_update` throttles how often this runs; the
//! amount owed per contract is measured from the contract's own accrual cursor,
//! so a window the periodic tick already claimed is never paid twice.

use rust_decimal::Decimal;
use std::sync::Arc;

use super::accrual;
use crate::clock::Clock;
use crate::error::EngineError;
use crate::ledger::Ledger;
use crate::models::{ContractStatus, User, UserId};
use crate::store::{AccrualCommit, CatchUpCommit, Store};
use crate::websocket::{ConnectionManager, PushEvent};

pub struct CatchUpCalculator {
    store: Arc<dyn Store>,
    ledger: Ledger,
    broadcaster: Arc<ConnectionManager>,
    clock: Arc<dyn Clock>,
    min_hours: Decimal,
}

impl CatchUpCalculator {
    pub fn new(
        store: Arc<dyn Store>,
        broadcaster: Arc<ConnectionManager>,
        clock: Arc<dyn Clock>,
        min_hours: Decimal,
    ) -> Self {
        Self {
            ledger: Ledger::new(store.clone()),
            store,
            broadcaster,
            clock,
            min_hours,
        }
    }

    /// Reconcile idle earnings, then return the refreshed user
    pub async fn refresh(&self, user_id: UserId) -> Result<User, EngineError> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or(EngineError::UserNotFound(user_id))?;

        let now = self.clock.now();
        let elapsed = accrual::elapsed_hours(user.earnings_reference(), now);
        if elapsed < self.min_hours {
            return Ok(user);
        }

        let contracts = self
            .store
            .list_user_contracts(user_id, Some(ContractStatus::Active))
            .await?;

        let mut accruals = Vec::with_capacity(contracts.len());
        for contract in &contracts {
            let Some(machine) = self.store.get_machine(contract.machine_id).await? else {
                tracing::warn!(
                    contract_id = contract.id,
                    machine_id = contract.machine_id,
                    "Machine missing, contract skipped in catch-up"
                );
                continue;
            };
            if let Some(quote) = accrual::quote(contract, &machine, now) {
                accruals.push(AccrualCommit {
                    contract_id: contract.id,
                    user_id,
                    expected_cursor: contract.last_accrued_at,
                    new_cursor: quote.new_cursor,
                    credited: quote.credited,
                    carry: quote.carry,
                });
            }
        }

        let receipt = self
            .ledger
            .commit_catch_up(&CatchUpCommit {
                user_id,
                stamped_at: now,
                accruals,
            })
            .await?;

        if receipt.credited > Decimal::ZERO {
            tracing::info!(
                user_id,
                idle_hours = %elapsed.round_dp(4),
                credited = %receipt.credited,
                contracts = receipt.claimed.len(),
                "Offline earnings credited"
            );
            self.broadcaster
                .publish(&PushEvent::BalanceUpdate { user_id });
        }

        self.store
            .get_user(user_id)
            .await?
            .ok_or(EngineError::UserNotFound(user_id))
    }
}
