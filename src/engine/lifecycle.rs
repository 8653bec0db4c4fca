//! Contract Lifecycle Engine
//!
//! Owns contract state transitions and the periodic accrual pass:
//!
//! ```text
//! active ──[window elapsed, rent, fee paid]──────► active (window reset)
//! active ──[window elapsed, rent, fee unpaid]────► suspended
//! active ──[window elapsed, buy]─────────────────► expired (terminal)
//! suspended ──[resume, fee paid]─────────────────► active
//! ```
//!
//! Within one contract, accrual runs before the fee/expiry check. Each
//! contract fails independently; a failure is logged and the pass continues.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::watch;

use super::accrual;
use crate::admin::verify_admin;
use crate::auth::Actor;
use crate::clock::Clock;
use crate::error::EngineError;
use crate::ledger::{ChargeOutcome, Ledger};
use crate::models::{
    Contract, ContractId, ContractStatus, Machine, MachineId, MachineType, NewContract,
};
use crate::money::{format_ledger, round_ledger};
use crate::notify::SupportBridge;
use crate::store::{AccrualCommit, Renewal, Store};
use crate::websocket::{ConnectionManager, PushEvent};

/// Counters for one pass over the active contracts
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickReport {
    pub scanned: usize,
    /// Contracts credited a positive amount
    pub credited: usize,
    pub total_credited: Decimal,
    /// Window already claimed by a concurrent catch-up
    pub contended: usize,
    pub renewed: usize,
    pub suspended: usize,
    pub expired: usize,
    /// Missing machine
    pub skipped: usize,
    pub failed: usize,
    /// Pass stopped early on shutdown
    pub interrupted: bool,
}

pub struct ContractEngine {
    store: Arc<dyn Store>,
    ledger: Ledger,
    broadcaster: Arc<ConnectionManager>,
    support: Arc<SupportBridge>,
    clock: Arc<dyn Clock>,
}

impl ContractEngine {
    pub fn new(
        store: Arc<dyn Store>,
        broadcaster: Arc<ConnectionManager>,
        support: Arc<SupportBridge>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger: Ledger::new(store.clone()),
            store,
            broadcaster,
            support,
            clock,
        }
    }

    /// One full accrual pass at `clock.now()`
    pub async fn tick_once(&self) -> Result<TickReport, EngineError> {
        self.run_tick(None).await
    }

    /// Like [`tick_once`](Self::tick_once), but stops between contracts once
    /// `shutdown` flips to true.
    pub async fn run_tick(
        &self,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<TickReport, EngineError> {
        let now = self.clock.now();
        let contracts = self.store.list_active_contracts().await?;
        let mut report = TickReport::default();

        for contract in &contracts {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                report.interrupted = true;
                tracing::info!(
                    processed = report.scanned,
                    remaining = contracts.len() - report.scanned,
                    "Tick interrupted by shutdown"
                );
                break;
            }

            report.scanned += 1;
            if let Err(e) = self.process_contract(contract, now, &mut report).await {
                report.failed += 1;
                tracing::warn!(
                    contract_id = contract.id,
                    user_id = contract.user_id,
                    error = %e,
                    "Contract processing failed, continuing"
                );
            }
        }

        tracing::debug!(
            scanned = report.scanned,
            credited = report.credited,
            total = %report.total_credited,
            renewed = report.renewed,
            suspended = report.suspended,
            expired = report.expired,
            failed = report.failed,
            "Tick complete"
        );
        Ok(report)
    }

    /// Accrue, then run the fee/maturity check, for one active contract
    pub async fn process_contract(
        &self,
        contract: &Contract,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> Result<(), EngineError> {
        let Some(machine) = self.store.get_machine(contract.machine_id).await? else {
            report.skipped += 1;
            tracing::warn!(
                contract_id = contract.id,
                machine_id = contract.machine_id,
                "Machine missing, contract skipped"
            );
            return Ok(());
        };

        self.accrue(contract, &machine, now, report).await?;

        if accrual::days_active(contract.start_date, now) >= i64::from(machine.duration_days) {
            match machine.machine_type {
                MachineType::Buy => self.mature(contract, report).await?,
                MachineType::Rent => self.bill(contract, &machine, now, report).await?,
            }
        }
        Ok(())
    }

    async fn accrue(
        &self,
        contract: &Contract,
        machine: &Machine,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> Result<(), EngineError> {
        let Some(quote) = accrual::quote(contract, machine, now) else {
            return Ok(());
        };

        let commit = AccrualCommit {
            contract_id: contract.id,
            user_id: contract.user_id,
            expected_cursor: contract.last_accrued_at,
            new_cursor: quote.new_cursor,
            credited: quote.credited,
            carry: quote.carry,
        };

        let Some(receipt) = self.ledger.commit_accrual(&commit).await? else {
            report.contended += 1;
            tracing::debug!(contract_id = contract.id, "Accrual window already claimed");
            return Ok(());
        };

        if quote.credited > Decimal::ZERO {
            report.credited += 1;
            report.total_credited += quote.credited;
            self.broadcaster.publish(&PushEvent::ProfitGenerated {
                contract_id: contract.id,
                accumulated: receipt.accumulated,
            });
            self.broadcaster.publish(&PushEvent::BalanceUpdate {
                user_id: contract.user_id,
            });
        }
        Ok(())
    }

    async fn mature(
        &self,
        contract: &Contract,
        report: &mut TickReport,
    ) -> Result<(), EngineError> {
        if self
            .store
            .expire_contract(contract.id, contract.start_date)
            .await?
        {
            report.expired += 1;
            tracing::info!(
                contract_id = contract.id,
                user_id = contract.user_id,
                accumulated = %contract.accumulated_rewards,
                "Contract matured and expired"
            );
        }
        Ok(())
    }

    async fn bill(
        &self,
        contract: &Contract,
        machine: &Machine,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> Result<(), EngineError> {
        let renewal = Renewal {
            contract_id: contract.id,
            user_id: contract.user_id,
            expected_start: contract.start_date,
            fee: machine.monthly_fee,
            new_start: now,
            new_end: now + machine.duration(),
        };

        match self.ledger.charge_renewal(&renewal).await? {
            ChargeOutcome::Charged(renewed) => {
                report.renewed += 1;
                tracing::info!(
                    contract_id = contract.id,
                    fee = %renewal.fee,
                    end_date = %renewed.end_date,
                    "Rental window renewed"
                );
                if renewal.fee > Decimal::ZERO {
                    self.broadcaster.publish(&PushEvent::BalanceUpdate {
                        user_id: contract.user_id,
                    });
                }
            }
            ChargeOutcome::Insufficient { balance } => {
                if self
                    .store
                    .suspend_contract(contract.id, contract.start_date)
                    .await?
                {
                    report.suspended += 1;
                    tracing::info!(
                        contract_id = contract.id,
                        user_id = contract.user_id,
                        fee = %renewal.fee,
                        %balance,
                        "Contract suspended for unpaid fee"
                    );
                    let message = format!(
                        "Insufficient balance to pay the monthly fee of {} for contract #{}. \
                         Top up and resume the contract to continue mining.",
                        format_ledger(renewal.fee),
                        contract.id
                    );
                    self.support
                        .contract_suspended(contract.user_id, contract.id, &message)
                        .await;
                }
            }
            ChargeOutcome::Stale => {
                tracing::debug!(
                    contract_id = contract.id,
                    "Renewal raced, window already reset"
                );
            }
        }
        Ok(())
    }

    /// Open a contract: principal debited atomically with the insert.
    ///
    /// Rent takes the user-chosen `amount` (at least `min_deposit`); buy always
    /// uses the machine's buy price.
    pub async fn purchase(
        &self,
        actor: &Actor,
        machine_id: MachineId,
        amount: Option<Decimal>,
        auto_reinvest: bool,
    ) -> Result<Contract, EngineError> {
        let user = self
            .store
            .get_user(actor.user_id)
            .await?
            .ok_or(EngineError::UserNotFound(actor.user_id))?;
        if !user.is_active() {
            return Err(EngineError::Forbidden(format!(
                "account is {}",
                user.status.as_str()
            )));
        }

        let machine = self
            .store
            .get_machine(machine_id)
            .await?
            .filter(|m| m.is_active)
            .ok_or(EngineError::MachineNotFound(machine_id))?;

        let principal = match machine.machine_type {
            MachineType::Buy => machine.buy_price,
            MachineType::Rent => {
                let amount = amount
                    .ok_or_else(|| EngineError::InvalidAmount("deposit amount required".into()))?;
                if amount < machine.min_deposit {
                    return Err(EngineError::InvalidAmount(format!(
                        "minimum deposit is {}",
                        format_ledger(machine.min_deposit)
                    )));
                }
                amount
            }
        };
        let principal = round_ledger(principal);
        if principal <= Decimal::ZERO {
            return Err(EngineError::InvalidAmount("principal must be positive".into()));
        }

        let now = self.clock.now();
        let new = NewContract {
            user_id: user.id,
            machine_id,
            amount: principal,
            start_date: now,
            end_date: now + machine.duration(),
            auto_reinvest,
        };
        let contract = self.ledger.open_contract(&new, principal).await?;

        tracing::info!(
            contract_id = contract.id,
            user_id = user.id,
            machine_id,
            machine_type = %machine.machine_type,
            principal = %principal,
            "Contract opened"
        );
        self.broadcaster
            .publish(&PushEvent::BalanceUpdate { user_id: user.id });
        Ok(contract)
    }

    /// `suspended -> active` after paying the monthly fee now
    ///
    /// Only the owner, or an admin on their behalf, may resume.
    pub async fn resume(
        &self,
        actor: &Actor,
        contract_id: ContractId,
    ) -> Result<Contract, EngineError> {
        let contract = self
            .store
            .get_contract(contract_id)
            .await?
            .ok_or(EngineError::ContractNotFound(contract_id))?;
        if !actor.can_act_for(contract.user_id) {
            return Err(EngineError::Forbidden("not the contract owner".into()));
        }
        if actor.user_id != contract.user_id {
            verify_admin(self.store.as_ref(), actor).await?;
        }
        if contract.status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "contract #{} has expired",
                contract_id
            )));
        }
        if contract.status != ContractStatus::Suspended {
            return Err(EngineError::InvalidState(format!(
                "contract is {}, only suspended contracts can be resumed",
                contract.status
            )));
        }

        let machine = self
            .store
            .get_machine(contract.machine_id)
            .await?
            .ok_or(EngineError::MachineNotFound(contract.machine_id))?;

        let now = self.clock.now();
        let renewal = Renewal {
            contract_id,
            user_id: contract.user_id,
            expected_start: contract.start_date,
            fee: machine.monthly_fee,
            new_start: now,
            new_end: now + machine.duration(),
        };

        match self.ledger.charge_resume(&renewal).await? {
            ChargeOutcome::Charged(resumed) => {
                tracing::info!(
                    contract_id,
                    user_id = contract.user_id,
                    fee = %renewal.fee,
                    "Contract resumed"
                );
                self.broadcaster.publish(&PushEvent::BalanceUpdate {
                    user_id: contract.user_id,
                });
                Ok(resumed)
            }
            ChargeOutcome::Insufficient { balance } => Err(EngineError::InsufficientBalance {
                required: round_ledger(renewal.fee),
                available: balance,
            }),
            ChargeOutcome::Stale => Err(EngineError::InvalidState(
                "contract changed while resuming".into(),
            )),
        }
    }

    /// The caller's contracts in every state
    pub async fn list_contracts(&self, actor: &Actor) -> Result<Vec<Contract>, EngineError> {
        Ok(self.store.list_user_contracts(actor.user_id, None).await?)
    }

    pub async fn list_machines(&self) -> Result<Vec<Machine>, EngineError> {
        let mut machines = self.store.list_machines().await?;
        machines.retain(|m| m.is_active);
        Ok(machines)
    }
}
