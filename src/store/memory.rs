//! In-process store.
//!
//! One mutex guards all tables, so each trait method is atomic by construction.
//! Used by the integration tests and by `storage.backend: memory`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{
    AccrualCommit, AccrualReceipt, CatchUpCommit, CatchUpReceipt, Debit, Renewal, Settlement,
    Store, StoreError, StoreResult,
};
use crate::models::{
    Contract, ContractId, ContractStatus, KycStatus, Machine, MachineId, NewContract, Transaction,
    TransactionId, TransactionKind, TransactionStatus, User, UserId, UserStatus,
};

#[derive(Default)]
struct State {
    users: BTreeMap<UserId, User>,
    machines: BTreeMap<MachineId, Machine>,
    contracts: BTreeMap<ContractId, Contract>,
    transactions: BTreeMap<TransactionId, Transaction>,
    next_contract_id: ContractId,
    next_transaction_id: TransactionId,
}

impl State {
    fn user_mut(&mut self, user_id: UserId) -> StoreResult<&mut User> {
        self.users
            .get_mut(&user_id)
            .ok_or(StoreError::UserNotFound(user_id))
    }

    /// CAS check shared by the tick and catch-up paths
    fn claimable(&self, commit: &AccrualCommit) -> bool {
        self.contracts.get(&commit.contract_id).is_some_and(|c| {
            c.status == ContractStatus::Active
                && c.user_id == commit.user_id
                && c.last_accrued_at == commit.expected_cursor
        })
    }

    fn claim(&mut self, commit: &AccrualCommit) -> Option<Decimal> {
        let contract = self.contracts.get_mut(&commit.contract_id)?;
        contract.accumulated_rewards += commit.credited;
        contract.accrual_carry = commit.carry;
        contract.last_accrued_at = commit.new_cursor;
        Some(contract.accumulated_rewards)
    }

    fn reset_window(
        &mut self,
        renewal: &Renewal,
        from: ContractStatus,
    ) -> StoreResult<Debit<Contract>> {
        let matches = self.contracts.get(&renewal.contract_id).is_some_and(|c| {
            c.status == from
                && c.user_id == renewal.user_id
                && c.start_date == renewal.expected_start
        });
        if !matches {
            return Ok(Debit::Conflict);
        }

        let user = self.user_mut(renewal.user_id)?;
        if renewal.fee > Decimal::ZERO {
            if user.balance < renewal.fee {
                return Ok(Debit::Insufficient {
                    balance: user.balance,
                });
            }
            user.balance -= renewal.fee;
        }

        let Some(contract) = self.contracts.get_mut(&renewal.contract_id) else {
            return Ok(Debit::Conflict);
        };
        contract.status = ContractStatus::Active;
        contract.start_date = renewal.new_start;
        contract.end_date = renewal.new_end;
        contract.last_accrued_at = renewal.new_start;
        Ok(Debit::Applied(contract.clone()))
    }

    fn transition(
        &mut self,
        contract_id: ContractId,
        expected_start: DateTime<Utc>,
        to: ContractStatus,
    ) -> bool {
        match self.contracts.get_mut(&contract_id) {
            Some(c) if c.status == ContractStatus::Active && c.start_date == expected_start => {
                c.status = to;
                true
            }
            _ => false,
        }
    }

    fn push_transaction(
        &mut self,
        user_id: UserId,
        kind: TransactionKind,
        amount: Decimal,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> Transaction {
        self.next_transaction_id += 1;
        let tx = Transaction {
            id: self.next_transaction_id,
            user_id,
            kind,
            amount,
            status: TransactionStatus::Pending,
            note,
            created_at: at,
            processed_at: None,
        };
        self.transactions.insert(tx.id, tx.clone());
        tx
    }
}

pub struct MemoryStore {
    state: Mutex<State>,
    /// Every call fails with `Unavailable` while set
    unavailable: AtomicBool,
    /// Writes touching these contracts fail with `Unavailable`
    failing_contracts: Mutex<HashSet<ContractId>>,
    write_count: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            unavailable: AtomicBool::new(false),
            failing_contracts: Mutex::new(HashSet::new()),
            write_count: AtomicUsize::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        Ok(())
    }

    fn begin_write(&self, contract_id: Option<ContractId>) -> StoreResult<()> {
        self.check_available()?;
        if let Some(id) = contract_id {
            let failing = self
                .failing_contracts
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if failing.contains(&id) {
                return Err(StoreError::Unavailable(format!("contract {} write rejected", id)));
            }
        }
        self.write_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    // --- seeding ---

    pub fn insert_user(&self, user: User) {
        self.state().users.insert(user.id, user);
    }

    pub fn insert_machine(&self, machine: Machine) {
        self.state().machines.insert(machine.id, machine);
    }

    /// Insert a contract as-is (no debit); ids allocated later never collide with it
    pub fn insert_contract(&self, contract: Contract) {
        let mut state = self.state();
        state.next_contract_id = state.next_contract_id.max(contract.id);
        state.contracts.insert(contract.id, contract);
    }

    // --- failure injection ---

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn fail_writes_for_contract(&self, contract_id: ContractId) {
        self.failing_contracts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(contract_id);
    }

    /// Number of successful write calls so far
    pub fn write_count(&self) -> usize {
        self.write_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_user(&self, user_id: UserId) -> StoreResult<Option<User>> {
        self.check_available()?;
        Ok(self.state().users.get(&user_id).cloned())
    }

    async fn get_machine(&self, machine_id: MachineId) -> StoreResult<Option<Machine>> {
        self.check_available()?;
        Ok(self.state().machines.get(&machine_id).cloned())
    }

    async fn list_machines(&self) -> StoreResult<Vec<Machine>> {
        self.check_available()?;
        Ok(self.state().machines.values().cloned().collect())
    }

    async fn get_contract(&self, contract_id: ContractId) -> StoreResult<Option<Contract>> {
        self.check_available()?;
        Ok(self.state().contracts.get(&contract_id).cloned())
    }

    async fn list_active_contracts(&self) -> StoreResult<Vec<Contract>> {
        self.check_available()?;
        Ok(self
            .state()
            .contracts
            .values()
            .filter(|c| c.status == ContractStatus::Active)
            .cloned()
            .collect())
    }

    async fn list_user_contracts(
        &self,
        user_id: UserId,
        status: Option<ContractStatus>,
    ) -> StoreResult<Vec<Contract>> {
        self.check_available()?;
        Ok(self
            .state()
            .contracts
            .values()
            .filter(|c| c.user_id == user_id && status.is_none_or(|s| c.status == s))
            .cloned()
            .collect())
    }

    async fn get_transaction(&self, id: TransactionId) -> StoreResult<Option<Transaction>> {
        self.check_available()?;
        Ok(self.state().transactions.get(&id).cloned())
    }

    async fn list_transactions(
        &self,
        user_id: Option<UserId>,
        status: Option<TransactionStatus>,
    ) -> StoreResult<Vec<Transaction>> {
        self.check_available()?;
        Ok(self
            .state()
            .transactions
            .values()
            .rev()
            .filter(|t| user_id.is_none_or(|u| t.user_id == u))
            .filter(|t| status.is_none_or(|s| t.status == s))
            .cloned()
            .collect())
    }

    async fn apply_balance_delta(&self, user_id: UserId, delta: Decimal) -> StoreResult<Decimal> {
        self.begin_write(None)?;
        let mut state = self.state();
        let user = state.user_mut(user_id)?;
        user.balance += delta;
        Ok(user.balance)
    }

    async fn debit_if_sufficient(
        &self,
        user_id: UserId,
        amount: Decimal,
    ) -> StoreResult<Debit<Decimal>> {
        self.begin_write(None)?;
        let mut state = self.state();
        let user = state.user_mut(user_id)?;
        if user.balance < amount {
            return Ok(Debit::Insufficient {
                balance: user.balance,
            });
        }
        user.balance -= amount;
        Ok(Debit::Applied(user.balance))
    }

    async fn commit_accrual(&self, commit: &AccrualCommit) -> StoreResult<Option<AccrualReceipt>> {
        self.begin_write(Some(commit.contract_id))?;
        let mut state = self.state();
        if !state.claimable(commit) {
            return Ok(None);
        }
        // balance first: a missing user must leave the contract untouched
        let balance = {
            let user = state.user_mut(commit.user_id)?;
            user.balance += commit.credited;
            user.balance
        };
        let accumulated = state.claim(commit).unwrap_or_default();
        Ok(Some(AccrualReceipt {
            accumulated,
            balance,
        }))
    }

    async fn commit_catch_up(&self, commit: &CatchUpCommit) -> StoreResult<CatchUpReceipt> {
        self.begin_write(None)?;
        {
            let failing = self
                .failing_contracts
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if let Some(a) = commit.accruals.iter().find(|a| failing.contains(&a.contract_id)) {
                return Err(StoreError::Unavailable(format!(
                    "contract {} write rejected",
                    a.contract_id
                )));
            }
        }

        let mut state = self.state();
        state.user_mut(commit.user_id)?;

        let mut receipt = CatchUpReceipt::default();
        for accrual in &commit.accruals {
            if state.claimable(accrual) && state.claim(accrual).is_some() {
                receipt.credited += accrual.credited;
                receipt.claimed.push(accrual.contract_id);
            }
        }

        let user = state.user_mut(commit.user_id)?;
        user.balance += receipt.credited;
        user.last_earnings_update = Some(commit.stamped_at);
        Ok(receipt)
    }

    async fn open_contract(
        &self,
        new: &NewContract,
        cost: Decimal,
    ) -> StoreResult<Debit<Contract>> {
        self.begin_write(None)?;
        let mut state = self.state();
        let user = state.user_mut(new.user_id)?;
        if user.balance < cost {
            return Ok(Debit::Insufficient {
                balance: user.balance,
            });
        }
        user.balance -= cost;

        state.next_contract_id += 1;
        let contract = new.clone().into_contract(state.next_contract_id);
        state.contracts.insert(contract.id, contract.clone());
        Ok(Debit::Applied(contract))
    }

    async fn renew_contract(&self, renewal: &Renewal) -> StoreResult<Debit<Contract>> {
        self.begin_write(Some(renewal.contract_id))?;
        self.state().reset_window(renewal, ContractStatus::Active)
    }

    async fn resume_contract(&self, renewal: &Renewal) -> StoreResult<Debit<Contract>> {
        self.begin_write(Some(renewal.contract_id))?;
        self.state().reset_window(renewal, ContractStatus::Suspended)
    }

    async fn suspend_contract(
        &self,
        contract_id: ContractId,
        expected_start: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.begin_write(Some(contract_id))?;
        Ok(self
            .state()
            .transition(contract_id, expected_start, ContractStatus::Suspended))
    }

    async fn expire_contract(
        &self,
        contract_id: ContractId,
        expected_start: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.begin_write(Some(contract_id))?;
        Ok(self
            .state()
            .transition(contract_id, expected_start, ContractStatus::Expired))
    }

    async fn create_withdrawal(
        &self,
        user_id: UserId,
        amount: Decimal,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> StoreResult<Debit<Transaction>> {
        self.begin_write(None)?;
        let mut state = self.state();
        let user = state.user_mut(user_id)?;
        if user.balance < amount {
            return Ok(Debit::Insufficient {
                balance: user.balance,
            });
        }
        user.balance -= amount;
        Ok(Debit::Applied(state.push_transaction(
            user_id,
            TransactionKind::Withdrawal,
            amount,
            note,
            at,
        )))
    }

    async fn create_deposit(
        &self,
        user_id: UserId,
        amount: Decimal,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> StoreResult<Transaction> {
        self.begin_write(None)?;
        let mut state = self.state();
        state.user_mut(user_id)?;
        Ok(state.push_transaction(user_id, TransactionKind::Deposit, amount, note, at))
    }

    async fn settle_transaction(
        &self,
        settlement: &Settlement,
    ) -> StoreResult<Option<Transaction>> {
        self.begin_write(None)?;
        let mut state = self.state();
        let user_id = match state.transactions.get(&settlement.transaction_id) {
            Some(tx) if tx.status == TransactionStatus::Pending => tx.user_id,
            _ => return Ok(None),
        };

        if !settlement.balance_delta.is_zero() {
            state.user_mut(user_id)?.balance += settlement.balance_delta;
        }

        let Some(tx) = state.transactions.get_mut(&settlement.transaction_id) else {
            return Ok(None);
        };
        tx.status = settlement.status;
        tx.processed_at = Some(settlement.processed_at);
        Ok(Some(tx.clone()))
    }

    async fn set_user_status(&self, user_id: UserId, status: UserStatus) -> StoreResult<bool> {
        self.begin_write(None)?;
        Ok(match self.state().users.get_mut(&user_id) {
            Some(user) => {
                user.status = status;
                true
            }
            None => false,
        })
    }

    async fn set_kyc_status(&self, user_id: UserId, status: KycStatus) -> StoreResult<bool> {
        self.begin_write(None)?;
        Ok(match self.state().users.get_mut(&user_id) {
            Some(user) => {
                user.kyc_status = status;
                true
            }
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MachineType, Role};
    use chrono::Duration;

    fn user(id: UserId, balance: i64) -> User {
        User {
            id,
            email: format!("u{}@example.com", id),
            balance: Decimal::from(balance),
            last_earnings_update: None,
            kyc_status: KycStatus::None,
            status: UserStatus::Active,
            role: Role::User,
            created_at: Utc::now(),
        }
    }

    fn new_contract(user_id: UserId, start: DateTime<Utc>) -> NewContract {
        NewContract {
            user_id,
            machine_id: 1,
            amount: Decimal::from(100),
            start_date: start,
            end_date: start + Duration::days(30),
            auto_reinvest: false,
        }
    }

    #[tokio::test]
    async fn test_open_contract_debits_atomically() {
        let store = MemoryStore::new();
        store.insert_user(user(1, 150));
        let start = Utc::now();

        let opened = store
            .open_contract(&new_contract(1, start), Decimal::from(100))
            .await
            .unwrap();
        assert!(matches!(opened, Debit::Applied(ref c) if c.id == 1));

        let second = store
            .open_contract(&new_contract(1, start), Decimal::from(100))
            .await
            .unwrap();
        assert_eq!(
            second,
            Debit::Insufficient {
                balance: Decimal::from(50)
            }
        );
        assert_eq!(store.list_user_contracts(1, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_commit_accrual_claims_window_once() {
        let store = MemoryStore::new();
        store.insert_user(user(1, 0));
        let start = Utc::now();
        store
            .open_contract(&new_contract(1, start), Decimal::ZERO)
            .await
            .unwrap();

        let commit = AccrualCommit {
            contract_id: 1,
            user_id: 1,
            expected_cursor: start,
            new_cursor: start + Duration::seconds(10),
            credited: Decimal::new(15, 4),
            carry: Decimal::ZERO,
        };
        let receipt = store.commit_accrual(&commit).await.unwrap().unwrap();
        assert_eq!(receipt.accumulated, Decimal::new(15, 4));
        assert_eq!(receipt.balance, Decimal::new(15, 4));

        // same expected cursor: already claimed
        assert!(store.commit_accrual(&commit).await.unwrap().is_none());
        let u = store.get_user(1).await.unwrap().unwrap();
        assert_eq!(u.balance, Decimal::new(15, 4));
    }

    #[tokio::test]
    async fn test_renew_requires_matching_window() {
        let store = MemoryStore::new();
        store.insert_user(user(1, 10));
        let start = Utc::now();
        store
            .open_contract(&new_contract(1, start), Decimal::ZERO)
            .await
            .unwrap();

        let now = start + Duration::days(30);
        let renewal = Renewal {
            contract_id: 1,
            user_id: 1,
            expected_start: start,
            fee: Decimal::from(3),
            new_start: now,
            new_end: now + Duration::days(30),
        };
        let renewed = store.renew_contract(&renewal).await.unwrap();
        assert!(matches!(
            renewed,
            Debit::Applied(ref c) if c.start_date == now && c.last_accrued_at == now
        ));

        // replay against the old window is a conflict, not a second charge
        assert_eq!(store.renew_contract(&renewal).await.unwrap(), Debit::Conflict);
        assert_eq!(store.get_user(1).await.unwrap().unwrap().balance, Decimal::from(7));

        // active contract cannot be resumed
        let resume = Renewal {
            expected_start: now,
            ..renewal
        };
        assert_eq!(store.resume_contract(&resume).await.unwrap(), Debit::Conflict);
    }

    #[tokio::test]
    async fn test_suspend_skips_window_renewed_in_between() {
        let store = MemoryStore::new();
        store.insert_user(user(1, 2));
        let start = Utc::now();
        store
            .open_contract(&new_contract(1, start), Decimal::ZERO)
            .await
            .unwrap();

        let now = start + Duration::days(30);
        let renewal = Renewal {
            contract_id: 1,
            user_id: 1,
            expected_start: start,
            fee: Decimal::from(3),
            new_start: now,
            new_end: now + Duration::days(30),
        };
        assert_eq!(
            store.renew_contract(&renewal).await.unwrap(),
            Debit::Insufficient {
                balance: Decimal::from(2)
            }
        );

        // deposit lands and another pass renews before the suspension is written
        store.apply_balance_delta(1, Decimal::from(5)).await.unwrap();
        assert!(matches!(
            store.renew_contract(&renewal).await.unwrap(),
            Debit::Applied(_)
        ));

        assert!(!store.suspend_contract(1, start).await.unwrap());
        let c = store.get_contract(1).await.unwrap().unwrap();
        assert_eq!(c.status, ContractStatus::Active);
        assert_eq!(c.start_date, now);
        assert_eq!(store.get_user(1).await.unwrap().unwrap().balance, Decimal::from(4));

        // current window still suspends
        assert!(store.suspend_contract(1, now).await.unwrap());
        assert!(!store.expire_contract(1, now).await.unwrap());
    }

    #[tokio::test]
    async fn test_settle_only_pending() {
        let store = MemoryStore::new();
        store.insert_user(user(1, 0));
        let tx = store
            .create_deposit(1, Decimal::from(20), None, Utc::now())
            .await
            .unwrap();

        let settlement = Settlement {
            transaction_id: tx.id,
            status: TransactionStatus::Approved,
            balance_delta: Decimal::from(20),
            processed_at: Utc::now(),
        };
        assert!(store.settle_transaction(&settlement).await.unwrap().is_some());
        assert!(store.settle_transaction(&settlement).await.unwrap().is_none());
        assert_eq!(store.get_user(1).await.unwrap().unwrap().balance, Decimal::from(20));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryStore::new();
        store.insert_user(user(1, 0));
        store.insert_machine(Machine {
            id: 1,
            name: "S19".into(),
            machine_type: MachineType::Buy,
            daily_rate: Decimal::new(28, 1),
            duration_days: 30,
            monthly_fee: Decimal::ZERO,
            min_deposit: Decimal::ZERO,
            rental_price: Decimal::ZERO,
            buy_price: Decimal::from(450),
            is_active: true,
        });

        store.fail_writes_for_contract(9);
        assert!(matches!(
            store.expire_contract(9, Utc::now()).await,
            Err(StoreError::Unavailable(_))
        ));

        store.set_unavailable(true);
        assert!(store.get_machine(1).await.is_err());
        store.set_unavailable(false);
        assert!(store.get_machine(1).await.unwrap().is_some());
    }
}
