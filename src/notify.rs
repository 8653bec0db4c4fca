//! Support/notification bridge.
//!
//! Human-readable messages about settlement and contract events go out on two
//! channels: the [`Notifier`] (email) and the live `SUPPORT_MESSAGE` stream.
//! Delivery failures are logged and never propagated to the caller.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::models::{ContractId, TransactionStatus, UserId};
use crate::websocket::{ConnectionManager, PushEvent};

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Relay request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Relay rejected message: HTTP {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: UserId, subject: &str, body: &str)
    -> Result<(), NotificationError>;
}

/// Writes notifications to the log only
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        user_id: UserId,
        subject: &str,
        body: &str,
    ) -> Result<(), NotificationError> {
        tracing::info!(user_id, subject, body, "Notification");
        Ok(())
    }
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    user_id: UserId,
    subject: &'a str,
    body: &'a str,
}

/// POSTs notifications as JSON to a mail relay
pub struct HttpRelayNotifier {
    client: reqwest::Client,
    url: String,
}

impl HttpRelayNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for HttpRelayNotifier {
    async fn notify(
        &self,
        user_id: UserId,
        subject: &str,
        body: &str,
    ) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(&self.url)
            .json(&RelayPayload {
                user_id,
                subject,
                body,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

pub struct SupportBridge {
    notifier: Arc<dyn Notifier>,
    broadcaster: Arc<ConnectionManager>,
}

impl SupportBridge {
    pub fn new(notifier: Arc<dyn Notifier>, broadcaster: Arc<ConnectionManager>) -> Self {
        Self {
            notifier,
            broadcaster,
        }
    }

    /// Email the user and publish `SUPPORT_MESSAGE`
    pub async fn notify(&self, user_id: UserId, subject: &str, body: &str) {
        self.broadcaster.publish(&PushEvent::SupportMessage {
            user_id,
            subject: subject.to_string(),
            message: body.to_string(),
        });
        self.deliver(user_id, subject, body).await;
    }

    /// Settlement outcome: `TRANSACTION_UPDATE` plus an email
    pub async fn transaction_update(
        &self,
        user_id: UserId,
        status: TransactionStatus,
        message: &str,
    ) {
        self.broadcaster.publish(&PushEvent::TransactionUpdate {
            user_id,
            message: message.to_string(),
            status,
        });
        self.deliver(user_id, &format!("Transaction {}", status), message)
            .await;
    }

    /// Fee shortfall: `CONTRACT_SUSPENDED` plus an email with the resume hint
    pub async fn contract_suspended(
        &self,
        user_id: UserId,
        contract_id: ContractId,
        message: &str,
    ) {
        self.broadcaster.publish(&PushEvent::ContractSuspended {
            user_id,
            contract_id,
            message: message.to_string(),
        });
        self.deliver(user_id, "Contract suspended", message).await;
    }

    async fn deliver(&self, user_id: UserId, subject: &str, body: &str) {
        if let Err(e) = self.notifier.notify(user_id, subject, body).await {
            tracing::warn!(user_id, subject, error = %e, "Notification delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    /// Records deliveries; can be switched to fail
    #[derive(Default)]
    struct MockNotifier {
        sent: Mutex<Vec<(UserId, String, String)>>,
        attempts: AtomicUsize,
        fail: Mutex<bool>,
    }

    impl MockNotifier {
        fn set_fail(&self, fail: bool) {
            *self.fail.lock().unwrap() = fail;
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Notifier for MockNotifier {
        async fn notify(
            &self,
            user_id: UserId,
            subject: &str,
            body: &str,
        ) -> Result<(), NotificationError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if *self.fail.lock().unwrap() {
                return Err(NotificationError::Rejected(503));
            }
            self.sent
                .lock()
                .unwrap()
                .push((user_id, subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_bridge_publishes_and_notifies() {
        let notifier = Arc::new(MockNotifier::default());
        let manager = Arc::new(ConnectionManager::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.add_connection(5, tx);

        let bridge = SupportBridge::new(notifier.clone(), manager);
        bridge.notify(5, "Welcome", "Your account is ready").await;

        assert!(rx.try_recv().unwrap().contains("SUPPORT_MESSAGE"));
        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "Welcome");
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let notifier = Arc::new(MockNotifier::default());
        notifier.set_fail(true);
        let manager = Arc::new(ConnectionManager::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.add_connection(5, tx);

        let bridge = SupportBridge::new(notifier.clone(), manager);
        bridge
            .transaction_update(5, TransactionStatus::Rejected, "Withdrawal rejected")
            .await;

        // live event still delivered, email attempted once
        assert!(rx.try_recv().unwrap().contains("TRANSACTION_UPDATE"));
        assert_eq!(notifier.attempts(), 1);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        assert!(LogNotifier.notify(1, "s", "b").await.is_ok());
    }
}
