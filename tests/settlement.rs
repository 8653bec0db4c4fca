mod common;

use rust_decimal::Decimal;

use common::{TestHarness, dec, drain, types_of};
use hashlease::auth::Actor;
use hashlease::error::EngineError;
use hashlease::Store;
use hashlease::models::{KycStatus, TransactionKind, TransactionStatus, UserStatus};

#[tokio::test]
async fn test_withdrawal_locks_funds_and_rejection_refunds() {
    let h = TestHarness::new();
    h.add_user(2, dec("100"));
    let mut session = h.connect(2);

    let tx = h
        .settlement
        .request_withdrawal(&Actor::user(2), dec("40"), Some("bc1qexample".into()))
        .await
        .unwrap();
    assert_eq!(tx.kind, TransactionKind::Withdrawal);
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert_eq!(h.balance(2).await, dec("60"));

    let rejected = h.settlement.reject(&h.admin_actor(), tx.id).await.unwrap();
    assert_eq!(rejected.status, TransactionStatus::Rejected);
    assert_eq!(rejected.processed_at, Some(h.now()));
    assert_eq!(h.balance(2).await, dec("100"));

    let frames = drain(&mut session);
    assert_eq!(
        types_of(&frames),
        vec!["TRANSACTION_UPDATE", "TRANSACTION_UPDATE"]
    );
    assert_eq!(frames[1]["status"], "rejected");

    let err = h.settlement.reject(&h.admin_actor(), tx.id).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
    let err = h.settlement.approve(&h.admin_actor(), tx.id).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
    assert_eq!(h.balance(2).await, dec("100"));
}

#[tokio::test]
async fn test_approved_withdrawal_keeps_funds_out() {
    let h = TestHarness::new();
    h.add_user(2, dec("100"));

    let tx = h
        .settlement
        .request_withdrawal(&Actor::user(2), dec("30"), None)
        .await
        .unwrap();
    h.settlement.approve(&h.admin_actor(), tx.id).await.unwrap();
    assert_eq!(h.balance(2).await, dec("70"));

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent[1].2.contains("approved"));
}

#[tokio::test]
async fn test_withdrawal_beyond_balance_is_refused() {
    let h = TestHarness::new();
    h.add_user(2, dec("10"));

    let err = h
        .settlement
        .request_withdrawal(&Actor::user(2), dec("10.0001"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientBalance { .. }));
    assert_eq!(h.balance(2).await, dec("10"));
    assert!(h.settlement.history(&Actor::user(2)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_deposit_credits_only_on_approval() {
    let h = TestHarness::new();
    h.add_user(2, dec("5"));

    let tx = h
        .settlement
        .request_deposit(&Actor::user(2), dec("50"), Some("wire-778".into()))
        .await
        .unwrap();
    assert_eq!(tx.kind, TransactionKind::Deposit);
    assert_eq!(h.balance(2).await, dec("5"));

    let pending = h.settlement.pending(&h.admin_actor()).await.unwrap();
    assert_eq!(pending.len(), 1);

    h.settlement.approve(&h.admin_actor(), tx.id).await.unwrap();
    assert_eq!(h.balance(2).await, dec("55"));
    assert!(h.settlement.pending(&h.admin_actor()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_deposit_leaves_balance() {
    let h = TestHarness::new();
    h.add_user(2, dec("5"));

    let tx = h
        .settlement
        .request_deposit(&Actor::user(2), dec("50"), None)
        .await
        .unwrap();
    h.settlement.reject(&h.admin_actor(), tx.id).await.unwrap();
    assert_eq!(h.balance(2).await, dec("5"));
}

#[tokio::test]
async fn test_non_admin_cannot_settle_or_list_pending() {
    let h = TestHarness::new();
    h.add_user(2, dec("100"));
    let tx = h
        .settlement
        .request_withdrawal(&Actor::user(2), dec("10"), None)
        .await
        .unwrap();

    let err = h.settlement.approve(&Actor::user(2), tx.id).await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    // a forged admin claim for a plain user is refused too
    let err = h.settlement.approve(&Actor::admin(2), tx.id).await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    let err = h.settlement.pending(&Actor::user(2)).await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    assert_eq!(
        h.store.get_transaction(tx.id).await.unwrap().unwrap().status,
        TransactionStatus::Pending
    );
}

#[tokio::test]
async fn test_settling_unknown_transaction() {
    let h = TestHarness::new();
    let err = h.settlement.approve(&h.admin_actor(), 77).await.unwrap_err();
    assert!(matches!(err, EngineError::TransactionNotFound(77)));
}

#[tokio::test]
async fn test_amount_validation() {
    let h = TestHarness::new();
    h.add_user(2, dec("100"));

    for amount in [Decimal::ZERO, dec("-1"), dec("0.00001")] {
        let err = h
            .settlement
            .request_withdrawal(&Actor::user(2), amount, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidAmount(_)));
    }
}

#[tokio::test]
async fn test_kyc_gate_on_withdrawals() {
    let h = TestHarness::with_kyc_gate(true);
    h.add_user(2, dec("100"));

    let err = h
        .settlement
        .request_withdrawal(&Actor::user(2), dec("10"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    h.admin
        .set_kyc_status(&h.admin_actor(), 2, KycStatus::Approved)
        .await
        .unwrap();
    h.settlement
        .request_withdrawal(&Actor::user(2), dec("10"), None)
        .await
        .unwrap();
    assert_eq!(h.balance(2).await, dec("90"));
}

#[tokio::test]
async fn test_suspended_user_cannot_move_funds() {
    let h = TestHarness::new();
    h.add_user(2, dec("100"));
    h.admin
        .set_user_status(&h.admin_actor(), 2, UserStatus::Suspended)
        .await
        .unwrap();

    let err = h
        .settlement
        .request_deposit(&Actor::user(2), dec("10"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
}
