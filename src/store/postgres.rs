//! PostgreSQL store.
//!
//! Every fused operation runs in one sqlx transaction; balance changes are
//! `balance = balance + $delta` updates, never read-modify-write in memory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row};
use std::str::FromStr;

use super::{
    AccrualCommit, AccrualReceipt, CatchUpCommit, CatchUpReceipt, Debit, Renewal, Settlement,
    Store, StoreError, StoreResult,
};
use crate::models::{
    Contract, ContractId, ContractStatus, KycStatus, Machine, MachineId, MachineType, NewContract,
    Role, Transaction, TransactionId, TransactionKind, TransactionStatus, User, UserId, UserStatus,
};

const USER_COLUMNS: &str =
    "id, email, balance, last_earnings_update, kyc_status, status, role, created_at";
const MACHINE_COLUMNS: &str = "id, name, machine_type, daily_rate, duration_days, monthly_fee, \
     min_deposit, rental_price, buy_price, is_active";
const CONTRACT_COLUMNS: &str = "id, user_id, machine_id, amount, start_date, end_date, status, \
     accumulated_rewards, auto_reinvest, last_accrued_at, accrual_carry";
const TRANSACTION_COLUMNS: &str =
    "id, user_id, kind, amount, status, note, created_at, processed_at";

fn parse_text<T: FromStr<Err = String>>(row: &PgRow, column: &str) -> StoreResult<T> {
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(StoreError::Corrupt)
}

fn user_from_row(row: &PgRow) -> StoreResult<User> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        balance: row.try_get("balance")?,
        last_earnings_update: row.try_get("last_earnings_update")?,
        kyc_status: parse_text::<KycStatus>(row, "kyc_status")?,
        status: parse_text::<UserStatus>(row, "status")?,
        role: parse_text::<Role>(row, "role")?,
        created_at: row.try_get("created_at")?,
    })
}

fn machine_from_row(row: &PgRow) -> StoreResult<Machine> {
    Ok(Machine {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        machine_type: parse_text::<MachineType>(row, "machine_type")?,
        daily_rate: row.try_get("daily_rate")?,
        duration_days: row.try_get("duration_days")?,
        monthly_fee: row.try_get("monthly_fee")?,
        min_deposit: row.try_get("min_deposit")?,
        rental_price: row.try_get("rental_price")?,
        buy_price: row.try_get("buy_price")?,
        is_active: row.try_get("is_active")?,
    })
}

fn contract_from_row(row: &PgRow) -> StoreResult<Contract> {
    Ok(Contract {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        machine_id: row.try_get("machine_id")?,
        amount: row.try_get("amount")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        status: parse_text::<ContractStatus>(row, "status")?,
        accumulated_rewards: row.try_get("accumulated_rewards")?,
        auto_reinvest: row.try_get("auto_reinvest")?,
        last_accrued_at: row.try_get("last_accrued_at")?,
        accrual_carry: row.try_get("accrual_carry")?,
    })
}

fn transaction_from_row(row: &PgRow) -> StoreResult<Transaction> {
    Ok(Transaction {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        kind: parse_text::<TransactionKind>(row, "kind")?,
        amount: row.try_get("amount")?,
        status: parse_text::<TransactionStatus>(row, "status")?,
        note: row.try_get("note")?,
        created_at: row.try_get("created_at")?,
        processed_at: row.try_get("processed_at")?,
    })
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Conditional decrement inside an open transaction.
    ///
    /// Returns the balance on shortfall; a missing user is `UserNotFound`.
    async fn debit_in(
        conn: &mut sqlx::PgConnection,
        user_id: UserId,
        amount: Decimal,
    ) -> StoreResult<Result<Decimal, Decimal>> {
        let debited: Option<Decimal> = sqlx::query_scalar(
            "UPDATE users SET balance = balance - $1 WHERE id = $2 AND balance >= $1 RETURNING balance",
        )
        .bind(amount)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(balance) = debited {
            return Ok(Ok(balance));
        }

        let balance: Option<Decimal> = sqlx::query_scalar("SELECT balance FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;
        balance.map(Err).ok_or(StoreError::UserNotFound(user_id))
    }

    /// Cursor CAS plus counter update; `None` if the window is gone
    async fn claim_in(
        conn: &mut sqlx::PgConnection,
        commit: &AccrualCommit,
    ) -> StoreResult<Option<Decimal>> {
        let accumulated: Option<Decimal> = sqlx::query_scalar(
            r#"
            UPDATE contracts
            SET accumulated_rewards = accumulated_rewards + $1,
                accrual_carry = $2,
                last_accrued_at = $3
            WHERE id = $4 AND user_id = $5 AND status = 'active' AND last_accrued_at = $6
            RETURNING accumulated_rewards
            "#,
        )
        .bind(commit.credited)
        .bind(commit.carry)
        .bind(commit.new_cursor)
        .bind(commit.contract_id)
        .bind(commit.user_id)
        .bind(commit.expected_cursor)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(accumulated)
    }

    async fn reset_window(
        &self,
        renewal: &Renewal,
        from: ContractStatus,
    ) -> StoreResult<Debit<Contract>> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<ContractId> = sqlx::query_scalar(
            "SELECT id FROM contracts WHERE id = $1 AND user_id = $2 AND status = $3 AND start_date = $4 FOR UPDATE",
        )
        .bind(renewal.contract_id)
        .bind(renewal.user_id)
        .bind(from.as_str())
        .bind(renewal.expected_start)
        .fetch_optional(&mut *tx)
        .await?;
        if locked.is_none() {
            return Ok(Debit::Conflict);
        }

        if renewal.fee > Decimal::ZERO
            && let Err(balance) = Self::debit_in(&mut tx, renewal.user_id, renewal.fee).await?
        {
            return Ok(Debit::Insufficient { balance });
        }

        let row = sqlx::query(&format!(
            "UPDATE contracts SET status = 'active', start_date = $1, end_date = $2, last_accrued_at = $1 \
             WHERE id = $3 RETURNING {}",
            CONTRACT_COLUMNS
        ))
        .bind(renewal.new_start)
        .bind(renewal.new_end)
        .bind(renewal.contract_id)
        .fetch_one(&mut *tx)
        .await?;
        let contract = contract_from_row(&row)?;

        tx.commit().await?;
        Ok(Debit::Applied(contract))
    }

    async fn transition(
        &self,
        contract_id: ContractId,
        expected_start: DateTime<Utc>,
        to: ContractStatus,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE contracts SET status = $1 \
             WHERE id = $2 AND status = 'active' AND start_date = $3",
        )
        .bind(to.as_str())
        .bind(contract_id)
        .bind(expected_start)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_transaction<'c, E>(
        executor: E,
        user_id: UserId,
        kind: TransactionKind,
        amount: Decimal,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> StoreResult<Transaction>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        let row = sqlx::query(&format!(
            "INSERT INTO transactions (user_id, kind, amount, status, note, created_at) \
             VALUES ($1, $2, $3, 'pending', $4, $5) RETURNING {}",
            TRANSACTION_COLUMNS
        ))
        .bind(user_id)
        .bind(kind.as_str())
        .bind(amount)
        .bind(note)
        .bind(at)
        .fetch_one(executor)
        .await?;
        transaction_from_row(&row)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_user(&self, user_id: UserId) -> StoreResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn get_machine(&self, machine_id: MachineId) -> StoreResult<Option<Machine>> {
        let row = sqlx::query(&format!("SELECT {} FROM machines WHERE id = $1", MACHINE_COLUMNS))
            .bind(machine_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(machine_from_row).transpose()
    }

    async fn list_machines(&self) -> StoreResult<Vec<Machine>> {
        let rows = sqlx::query(&format!("SELECT {} FROM machines ORDER BY id", MACHINE_COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(machine_from_row).collect()
    }

    async fn get_contract(&self, contract_id: ContractId) -> StoreResult<Option<Contract>> {
        let row = sqlx::query(&format!("SELECT {} FROM contracts WHERE id = $1", CONTRACT_COLUMNS))
            .bind(contract_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(contract_from_row).transpose()
    }

    async fn list_active_contracts(&self) -> StoreResult<Vec<Contract>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM contracts WHERE status = 'active' ORDER BY id",
            CONTRACT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(contract_from_row).collect()
    }

    async fn list_user_contracts(
        &self,
        user_id: UserId,
        status: Option<ContractStatus>,
    ) -> StoreResult<Vec<Contract>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM contracts WHERE user_id = $1 AND ($2::TEXT IS NULL OR status = $2) ORDER BY id",
            CONTRACT_COLUMNS
        ))
        .bind(user_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(contract_from_row).collect()
    }

    async fn get_transaction(&self, id: TransactionId) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM transactions WHERE id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn list_transactions(
        &self,
        user_id: Option<UserId>,
        status: Option<TransactionStatus>,
    ) -> StoreResult<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM transactions
            WHERE ($1::BIGINT IS NULL OR user_id = $1) AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY id DESC
            LIMIT 200
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(user_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(transaction_from_row).collect()
    }

    async fn apply_balance_delta(&self, user_id: UserId, delta: Decimal) -> StoreResult<Decimal> {
        let balance: Option<Decimal> =
            sqlx::query_scalar("UPDATE users SET balance = balance + $1 WHERE id = $2 RETURNING balance")
                .bind(delta)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        balance.ok_or(StoreError::UserNotFound(user_id))
    }

    async fn debit_if_sufficient(
        &self,
        user_id: UserId,
        amount: Decimal,
    ) -> StoreResult<Debit<Decimal>> {
        let mut conn = self.pool.acquire().await?;
        Ok(match Self::debit_in(&mut conn, user_id, amount).await? {
            Ok(balance) => Debit::Applied(balance),
            Err(balance) => Debit::Insufficient { balance },
        })
    }

    async fn commit_accrual(&self, commit: &AccrualCommit) -> StoreResult<Option<AccrualReceipt>> {
        let mut tx = self.pool.begin().await?;

        let Some(accumulated) = Self::claim_in(&mut tx, commit).await? else {
            return Ok(None);
        };

        let balance: Option<Decimal> =
            sqlx::query_scalar("UPDATE users SET balance = balance + $1 WHERE id = $2 RETURNING balance")
                .bind(commit.credited)
                .bind(commit.user_id)
                .fetch_optional(&mut *tx)
                .await?;
        let balance = balance.ok_or(StoreError::UserNotFound(commit.user_id))?;

        tx.commit().await?;
        Ok(Some(AccrualReceipt {
            accumulated,
            balance,
        }))
    }

    async fn commit_catch_up(&self, commit: &CatchUpCommit) -> StoreResult<CatchUpReceipt> {
        let mut tx = self.pool.begin().await?;

        let mut receipt = CatchUpReceipt::default();
        for accrual in &commit.accruals {
            if Self::claim_in(&mut tx, accrual).await?.is_some() {
                receipt.credited += accrual.credited;
                receipt.claimed.push(accrual.contract_id);
            }
        }

        let updated = sqlx::query(
            "UPDATE users SET balance = balance + $1, last_earnings_update = $2 WHERE id = $3",
        )
        .bind(receipt.credited)
        .bind(commit.stamped_at)
        .bind(commit.user_id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::UserNotFound(commit.user_id));
        }

        tx.commit().await?;
        Ok(receipt)
    }

    async fn open_contract(
        &self,
        new: &NewContract,
        cost: Decimal,
    ) -> StoreResult<Debit<Contract>> {
        let mut tx = self.pool.begin().await?;

        if let Err(balance) = Self::debit_in(&mut tx, new.user_id, cost).await? {
            return Ok(Debit::Insufficient { balance });
        }

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO contracts
                (user_id, machine_id, amount, start_date, end_date, status, auto_reinvest, last_accrued_at)
            VALUES ($1, $2, $3, $4, $5, 'active', $6, $4)
            RETURNING {}
            "#,
            CONTRACT_COLUMNS
        ))
        .bind(new.user_id)
        .bind(new.machine_id)
        .bind(new.amount)
        .bind(new.start_date)
        .bind(new.end_date)
        .bind(new.auto_reinvest)
        .fetch_one(&mut *tx)
        .await?;
        let contract = contract_from_row(&row)?;

        tx.commit().await?;
        Ok(Debit::Applied(contract))
    }

    async fn renew_contract(&self, renewal: &Renewal) -> StoreResult<Debit<Contract>> {
        self.reset_window(renewal, ContractStatus::Active).await
    }

    async fn resume_contract(&self, renewal: &Renewal) -> StoreResult<Debit<Contract>> {
        self.reset_window(renewal, ContractStatus::Suspended).await
    }

    async fn suspend_contract(
        &self,
        contract_id: ContractId,
        expected_start: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.transition(contract_id, expected_start, ContractStatus::Suspended)
            .await
    }

    async fn expire_contract(
        &self,
        contract_id: ContractId,
        expected_start: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.transition(contract_id, expected_start, ContractStatus::Expired)
            .await
    }

    async fn create_withdrawal(
        &self,
        user_id: UserId,
        amount: Decimal,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> StoreResult<Debit<Transaction>> {
        let mut tx = self.pool.begin().await?;

        if let Err(balance) = Self::debit_in(&mut tx, user_id, amount).await? {
            return Ok(Debit::Insufficient { balance });
        }
        let record = Self::insert_transaction(
            &mut *tx,
            user_id,
            TransactionKind::Withdrawal,
            amount,
            note,
            at,
        )
        .await?;

        tx.commit().await?;
        Ok(Debit::Applied(record))
    }

    async fn create_deposit(
        &self,
        user_id: UserId,
        amount: Decimal,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> StoreResult<Transaction> {
        if self.get_user(user_id).await?.is_none() {
            return Err(StoreError::UserNotFound(user_id));
        }
        Self::insert_transaction(&self.pool, user_id, TransactionKind::Deposit, amount, note, at)
            .await
    }

    async fn settle_transaction(
        &self,
        settlement: &Settlement,
    ) -> StoreResult<Option<Transaction>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "UPDATE transactions SET status = $1, processed_at = $2 \
             WHERE id = $3 AND status = 'pending' RETURNING {}",
            TRANSACTION_COLUMNS
        ))
        .bind(settlement.status.as_str())
        .bind(settlement.processed_at)
        .bind(settlement.transaction_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let record = transaction_from_row(&row)?;

        if !settlement.balance_delta.is_zero() {
            let updated = sqlx::query("UPDATE users SET balance = balance + $1 WHERE id = $2")
                .bind(settlement.balance_delta)
                .bind(record.user_id)
                .execute(&mut *tx)
                .await?;
            if updated.rows_affected() == 0 {
                return Err(StoreError::UserNotFound(record.user_id));
            }
        }

        tx.commit().await?;
        Ok(Some(record))
    }

    async fn set_user_status(&self, user_id: UserId, status: UserStatus) -> StoreResult<bool> {
        let updated = sqlx::query("UPDATE users SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(updated.rows_affected() == 1)
    }

    async fn set_kyc_status(&self, user_id: UserId, status: KycStatus) -> StoreResult<bool> {
        let updated = sqlx::query("UPDATE users SET kyc_status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(updated.rows_affected() == 1)
    }
}

/// Seed the machine catalog; existing ids are left untouched
pub async fn seed_machines(pool: &PgPool, machines: &[Machine]) -> StoreResult<()> {
    for m in machines {
        sqlx::query(
            r#"
            INSERT INTO machines
                (id, name, machine_type, daily_rate, duration_days, monthly_fee,
                 min_deposit, rental_price, buy_price, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(m.id)
        .bind(&m.name)
        .bind(m.machine_type.as_str())
        .bind(m.daily_rate)
        .bind(m.duration_days)
        .bind(m.monthly_fee)
        .bind(m.min_deposit)
        .bind(m.rental_price)
        .bind(m.buy_price)
        .bind(m.is_active)
        .execute(pool)
        .await?;
    }
    Ok(())
}
