//! Administration: manual balance adjustments and account standing.
//!
//! Every operation requires an admin actor whose stored record is also an
//! active admin.

use rust_decimal::Decimal;
use std::sync::Arc;

use crate::auth::Actor;
use crate::error::EngineError;
use crate::ledger::Ledger;
use crate::models::{KycStatus, Role, User, UserId, UserStatus};
use crate::notify::SupportBridge;
use crate::store::Store;
use crate::websocket::{ConnectionManager, PushEvent};

/// The token role must say admin, and so must the stored user record
pub async fn verify_admin(store: &dyn Store, actor: &Actor) -> Result<(), EngineError> {
    actor.require_admin()?;
    match store.get_user(actor.user_id).await? {
        Some(user) if user.role == Role::Admin && user.is_active() => Ok(()),
        _ => Err(EngineError::Forbidden("admin role required".into())),
    }
}

pub struct AdminService {
    store: Arc<dyn Store>,
    ledger: Ledger,
    broadcaster: Arc<ConnectionManager>,
    support: Arc<SupportBridge>,
}

impl AdminService {
    pub fn new(
        store: Arc<dyn Store>,
        broadcaster: Arc<ConnectionManager>,
        support: Arc<SupportBridge>,
    ) -> Self {
        Self {
            ledger: Ledger::new(store.clone()),
            store,
            broadcaster,
            support,
        }
    }

    pub async fn ensure_admin(&self, actor: &Actor) -> Result<(), EngineError> {
        verify_admin(self.store.as_ref(), actor).await
    }

    async fn target(&self, user_id: UserId) -> Result<User, EngineError> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or(EngineError::UserNotFound(user_id))
    }

    /// Credit or debit a user through the ledger; returns the new balance.
    ///
    /// A debit may not take the balance below zero.
    pub async fn adjust_balance(
        &self,
        actor: &Actor,
        user_id: UserId,
        delta: Decimal,
        reason: &str,
    ) -> Result<Decimal, EngineError> {
        self.ensure_admin(actor).await?;
        if delta.is_zero() {
            return Err(EngineError::InvalidAmount("adjustment must be non-zero".into()));
        }
        self.target(user_id).await?;

        let balance = if delta.is_sign_negative() {
            self.ledger.debit_if_sufficient(user_id, -delta).await?
        } else {
            self.ledger.apply_delta(user_id, delta).await?
        };

        tracing::info!(
            user_id,
            admin_id = actor.user_id,
            %delta,
            %balance,
            reason,
            "Manual balance adjustment"
        );
        self.broadcaster.publish(&PushEvent::BalanceUpdate { user_id });
        self.support
            .notify(
                user_id,
                "Balance adjusted",
                &format!("Your balance was adjusted by {}: {}", delta, reason),
            )
            .await;
        Ok(balance)
    }

    pub async fn set_user_status(
        &self,
        actor: &Actor,
        user_id: UserId,
        status: UserStatus,
    ) -> Result<User, EngineError> {
        self.ensure_admin(actor).await?;
        if actor.user_id == user_id && status != UserStatus::Active {
            return Err(EngineError::InvalidState("admins cannot suspend themselves".into()));
        }
        if !self.store.set_user_status(user_id, status).await? {
            return Err(EngineError::UserNotFound(user_id));
        }
        tracing::info!(
            user_id,
            admin_id = actor.user_id,
            status = status.as_str(),
            "User status changed"
        );
        self.target(user_id).await
    }

    pub async fn set_kyc_status(
        &self,
        actor: &Actor,
        user_id: UserId,
        status: KycStatus,
    ) -> Result<User, EngineError> {
        self.ensure_admin(actor).await?;
        if !self.store.set_kyc_status(user_id, status).await? {
            return Err(EngineError::UserNotFound(user_id));
        }
        tracing::info!(
            user_id,
            admin_id = actor.user_id,
            kyc = status.as_str(),
            "KYC status changed"
        );
        self.support
            .notify(
                user_id,
                "Verification update",
                &format!("Your identity verification status is now {}.", status.as_str()),
            )
            .await;
        self.target(user_id).await
    }
}
