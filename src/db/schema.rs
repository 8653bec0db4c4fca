use anyhow::Result;
use sqlx::PgPool;

/// Create tables if missing. Status columns hold the lowercase `as_str` forms.
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    tracing::info!("Initializing PostgreSQL schema...");

    for (name, ddl) in [
        ("users", CREATE_USERS_TABLE),
        ("machines", CREATE_MACHINES_TABLE),
        ("contracts", CREATE_CONTRACTS_TABLE),
        ("transactions", CREATE_TRANSACTIONS_TABLE),
        ("contracts_status_idx", CREATE_CONTRACTS_STATUS_INDEX),
    ] {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create {}: {}", name, e))?;
    }

    tracing::info!("PostgreSQL schema initialized successfully");
    Ok(())
}

const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id                   BIGSERIAL PRIMARY KEY,
    email                TEXT NOT NULL UNIQUE,
    balance              NUMERIC(20, 4) NOT NULL DEFAULT 0,
    last_earnings_update TIMESTAMPTZ,
    kyc_status           TEXT NOT NULL DEFAULT 'none',
    status               TEXT NOT NULL DEFAULT 'active',
    role                 TEXT NOT NULL DEFAULT 'user',
    created_at           TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_MACHINES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS machines (
    id            BIGSERIAL PRIMARY KEY,
    name          TEXT NOT NULL,
    machine_type  TEXT NOT NULL,            -- rent | buy
    daily_rate    NUMERIC(10, 4) NOT NULL,  -- percent of principal per 24h
    duration_days INTEGER NOT NULL,
    monthly_fee   NUMERIC(20, 4) NOT NULL DEFAULT 0,
    min_deposit   NUMERIC(20, 4) NOT NULL DEFAULT 0,
    rental_price  NUMERIC(20, 4) NOT NULL DEFAULT 0,
    buy_price     NUMERIC(20, 4) NOT NULL DEFAULT 0,
    is_active     BOOLEAN NOT NULL DEFAULT TRUE
)
"#;

const CREATE_CONTRACTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS contracts (
    id                  BIGSERIAL PRIMARY KEY,
    user_id             BIGINT NOT NULL REFERENCES users(id),
    machine_id          BIGINT NOT NULL,
    amount              NUMERIC(20, 4) NOT NULL,
    start_date          TIMESTAMPTZ NOT NULL,
    end_date            TIMESTAMPTZ NOT NULL,
    status              TEXT NOT NULL DEFAULT 'active',
    accumulated_rewards NUMERIC(20, 4) NOT NULL DEFAULT 0,
    auto_reinvest       BOOLEAN NOT NULL DEFAULT FALSE,
    last_accrued_at     TIMESTAMPTZ NOT NULL,
    accrual_carry       NUMERIC(24, 12) NOT NULL DEFAULT 0
)
"#;

const CREATE_CONTRACTS_STATUS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS contracts_user_status_idx ON contracts (user_id, status)";

const CREATE_TRANSACTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transactions (
    id           BIGSERIAL PRIMARY KEY,
    user_id      BIGINT NOT NULL REFERENCES users(id),
    kind         TEXT NOT NULL,              -- deposit | withdrawal
    amount       NUMERIC(20, 4) NOT NULL,
    status       TEXT NOT NULL DEFAULT 'pending',
    note         TEXT,
    created_at   TIMESTAMPTZ NOT NULL,
    processed_at TIMESTAMPTZ
)
"#;
