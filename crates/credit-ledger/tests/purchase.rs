//! Purchase intent creation tests.

mod common;

use common::{TestHarness, INITIAL_STATUS};
use credit_ledger::{ErrorKind, LedgerError};
use credit_ledger_core::PaymentIntentId;
use credit_ledger_store::Store;

#[tokio::test]
async fn creates_intent_for_offered_package() {
    let harness = TestHarness::new();
    harness.open("user_1").await;

    let created = harness
        .ledger
        .create_purchase_intent("user_1", 500)
        .await
        .unwrap();

    assert_eq!(created.credits, 500);
    assert_eq!(created.price_cents, 4999);
    assert_eq!(created.intent_id.as_str(), "pi_test_1");
    assert_eq!(created.client_secret.as_deref(), Some("pi_test_1_secret_test"));

    let requests = harness.provider.created();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].amount_cents, 4999);
    assert_eq!(requests[0].currency, "usd");
    assert_eq!(requests[0].metadata["account_id"], "user_1");
    assert_eq!(requests[0].metadata["credits"], "500");

    let stored = harness
        .memory
        .get_purchase_intent(&created.intent_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.credits, 500);
    assert_eq!(stored.amount_cents, 4999);
    assert_eq!(stored.status, INITIAL_STATUS);
    assert!(!stored.confirmed);
}

#[tokio::test]
async fn invalid_package_lists_valid_amounts_and_skips_provider() {
    let harness = TestHarness::new();
    harness.open("user_1").await;
    let lookups_before = harness.store.account_lookups();

    let err = harness
        .ledger
        .create_purchase_intent("user_1", 250)
        .await
        .unwrap_err();

    assert!(matches!(
        &err,
        LedgerError::InvalidPackage { requested: 250, valid } if valid == &vec![100, 500, 1000]
    ));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("100, 500, 1000"));

    // The account lookup still happens before the package check.
    assert_eq!(harness.store.account_lookups(), lookups_before + 1);
    assert!(harness.provider.created().is_empty());
    assert_eq!(harness.store.intent_writes(), 0);
}

#[tokio::test]
async fn invalid_package_wins_over_missing_account() {
    let harness = TestHarness::new();

    let err = harness
        .ledger
        .create_purchase_intent("ghost", 7)
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::InvalidPackage { requested: 7, .. }));
    assert_eq!(harness.store.account_lookups(), 1);
}

#[tokio::test]
async fn missing_account_is_not_found() {
    let harness = TestHarness::new();

    let err = harness
        .ledger
        .create_purchase_intent("ghost", 100)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LedgerError::AccountNotFound { ref account_id } if account_id == "ghost"
    ));
    assert!(harness.provider.created().is_empty());
}

#[tokio::test]
async fn empty_account_id_is_rejected_without_io() {
    let harness = TestHarness::new();

    let err = harness
        .ledger
        .create_purchase_intent("", 100)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(harness.store.account_lookups(), 0);
    assert!(harness.provider.created().is_empty());
}

#[tokio::test]
async fn provider_failure_persists_nothing() {
    let harness = TestHarness::new();
    harness.open("user_1").await;
    harness.provider.fail_create();

    let err = harness
        .ledger
        .create_purchase_intent("user_1", 100)
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::PaymentProvider(_)));
    assert_eq!(err.code(), "payment_provider_error");
    assert_eq!(harness.store.intent_writes(), 0);
    assert!(harness
        .memory
        .get_purchase_intent(&PaymentIntentId::new("pi_test_1").unwrap())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn failed_intent_write_after_provider_success_is_storage_error() {
    let harness = TestHarness::new();
    harness.open("user_1").await;
    harness.store.fail_intent_writes();

    let err = harness
        .ledger
        .create_purchase_intent("user_1", 100)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Storage);
    assert!(matches!(err, LedgerError::Storage(_)));
    // The provider intent exists but nothing was recorded locally.
    assert_eq!(harness.provider.created().len(), 1);
    assert_eq!(harness.store.intent_writes(), 1);
    assert!(harness
        .memory
        .get_purchase_intent(&PaymentIntentId::new("pi_test_1").unwrap())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn intent_uses_account_currency() {
    let harness = TestHarness::new();
    let ledger = harness.ledger.clone().with_default_currency("EUR");
    ledger.open_account("user_eu").await.unwrap();

    let created = ledger.create_purchase_intent("user_eu", 100).await.unwrap();

    assert_eq!(harness.provider.created()[0].currency, "eur");
    let stored = ledger
        .get_purchase_intent(created.intent_id.as_str(), "user_eu")
        .await
        .unwrap();
    assert_eq!(stored.currency, "eur");
}

#[tokio::test]
async fn purchase_lookup_is_scoped_to_owner() {
    let harness = TestHarness::new();
    harness.open("user_1").await;
    let created = harness
        .ledger
        .create_purchase_intent("user_1", 1000)
        .await
        .unwrap();

    let intent = harness
        .ledger
        .get_purchase_intent(created.intent_id.as_str(), "user_1")
        .await
        .unwrap();
    assert_eq!(intent.credits, 1000);

    let err = harness
        .ledger
        .get_purchase_intent(created.intent_id.as_str(), "user_2")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::PurchaseNotFound { .. }));
}
