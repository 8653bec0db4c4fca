//! Shared fixture for the integration tests: an in-memory store, a manual
//! clock, a live-channel registry and a notifier that records what it sends.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use hashlease::admin::AdminService;
use hashlease::auth::Actor;
use hashlease::clock::{Clock, ManualClock};
use hashlease::engine::{CatchUpCalculator, ContractEngine};
use hashlease::models::{
    Contract, ContractId, ContractStatus, KycStatus, Machine, MachineId, MachineType, Role, User,
    UserId, UserStatus,
};
use hashlease::notify::{NotificationError, Notifier, SupportBridge};
use hashlease::settlement::SettlementService;
use hashlease::store::{MemoryStore, Store};
use hashlease::websocket::ConnectionManager;

pub const ADMIN_ID: UserId = 1;

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(UserId, String, String)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(UserId, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        user_id: UserId,
        subject: &str,
        body: &str,
    ) -> Result<(), NotificationError> {
        self.sent
            .lock()
            .unwrap()
            .push((user_id, subject.to_string(), body.to_string()));
        Ok(())
    }
}

pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub ws: Arc<ConnectionManager>,
    pub notifier: Arc<RecordingNotifier>,
    pub engine: ContractEngine,
    pub catch_up: CatchUpCalculator,
    pub settlement: SettlementService,
    pub admin: AdminService,
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_kyc_gate(false)
    }

    pub fn with_kyc_gate(require_kyc: bool) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let ws = Arc::new(ConnectionManager::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let support = Arc::new(SupportBridge::new(notifier.clone(), ws.clone()));

        let dyn_store: Arc<dyn Store> = store.clone();
        let dyn_clock: Arc<dyn Clock> = clock.clone();

        let engine = ContractEngine::new(
            dyn_store.clone(),
            ws.clone(),
            support.clone(),
            dyn_clock.clone(),
        );
        let catch_up =
            CatchUpCalculator::new(dyn_store.clone(), ws.clone(), dyn_clock.clone(), dec("0.01"));
        let settlement =
            SettlementService::new(dyn_store.clone(), support.clone(), dyn_clock, require_kyc);
        let admin = AdminService::new(dyn_store, ws.clone(), support);

        store.insert_user(user_with_role(ADMIN_ID, Decimal::ZERO, Role::Admin));

        Self {
            store,
            clock,
            ws,
            notifier,
            engine,
            catch_up,
            settlement,
            admin,
        }
    }

    pub fn add_user(&self, id: UserId, balance: Decimal) {
        self.store
            .insert_user(user_with_role(id, balance, Role::User));
    }

    pub fn add_machine(&self, machine: Machine) {
        self.store.insert_machine(machine);
    }

    /// Open a live session for `user_id`; frames arrive as JSON strings
    pub fn connect(&self, user_id: UserId) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.ws.add_connection(user_id, tx);
        rx
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn balance(&self, user_id: UserId) -> Decimal {
        self.store.get_user(user_id).await.unwrap().unwrap().balance
    }

    pub async fn contract(&self, id: ContractId) -> Contract {
        self.store.get_contract(id).await.unwrap().unwrap()
    }

    pub fn admin_actor(&self) -> Actor {
        Actor::admin(ADMIN_ID)
    }
}

pub fn user_with_role(id: UserId, balance: Decimal, role: Role) -> User {
    User {
        id,
        email: format!("user{}@example.com", id),
        balance,
        last_earnings_update: None,
        kyc_status: KycStatus::None,
        status: UserStatus::Active,
        role,
        created_at: t0(),
    }
}

pub fn rent_machine(id: MachineId, daily_rate: &str, monthly_fee: &str) -> Machine {
    Machine {
        id,
        name: format!("Rig {}", id),
        machine_type: MachineType::Rent,
        daily_rate: dec(daily_rate),
        duration_days: 30,
        monthly_fee: dec(monthly_fee),
        min_deposit: dec("30"),
        rental_price: dec(monthly_fee),
        buy_price: Decimal::ZERO,
        is_active: true,
    }
}

pub fn buy_machine(
    id: MachineId,
    daily_rate: &str,
    buy_price: &str,
    duration_days: i32,
) -> Machine {
    Machine {
        id,
        name: format!("Rig {}", id),
        machine_type: MachineType::Buy,
        daily_rate: dec(daily_rate),
        duration_days,
        monthly_fee: Decimal::ZERO,
        min_deposit: Decimal::ZERO,
        rental_price: Decimal::ZERO,
        buy_price: dec(buy_price),
        is_active: true,
    }
}

/// Active contract starting at `start`, seeded without a debit
pub fn seeded_contract(
    id: ContractId,
    user_id: UserId,
    machine_id: MachineId,
    amount: &str,
    start: DateTime<Utc>,
) -> Contract {
    Contract {
        id,
        user_id,
        machine_id,
        amount: dec(amount),
        start_date: start,
        end_date: start + Duration::days(30),
        status: ContractStatus::Active,
        accumulated_rewards: Decimal::ZERO,
        auto_reinvest: false,
        last_accrued_at: start,
        accrual_carry: Decimal::ZERO,
    }
}

/// Drain every frame currently queued on a session, parsed as JSON
pub fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<serde_json::Value> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(serde_json::from_str(&frame).unwrap());
    }
    frames
}

pub fn types_of(frames: &[serde_json::Value]) -> Vec<String> {
    frames
        .iter()
        .map(|f| f["type"].as_str().unwrap_or_default().to_string())
        .collect()
}
