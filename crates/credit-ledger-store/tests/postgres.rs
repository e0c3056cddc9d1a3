//! `PostgreSQL` backend tests.
//!
//! These need a live database and are ignored by default. Run with:
//!
//! ```text
//! DATABASE_URL=postgres://localhost/ledger_test cargo test -p credit-ledger-store -- --ignored
//! ```

use chrono::Utc;
use credit_ledger_core::{
    Account, AccountId, CreditTransaction, PaymentIntentId, PurchaseIntent, TransactionKind,
    TransactionId,
};
use credit_ledger_store::{PgStore, PurchaseConfirmation, Store, StoreError};

async fn store() -> PgStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let store = PgStore::connect(&url).await.unwrap();
    store.migrate().await.unwrap();
    store
}

/// Account ids unique to one test run, so reruns don't collide.
fn unique_account() -> AccountId {
    AccountId::new(format!("user_{}", TransactionId::generate())).unwrap()
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn account_with_bonus_and_history() {
    let store = store().await;
    let id = unique_account();
    let grant = CreditTransaction::earned(id.clone(), 100, "Registration bonus".into());

    let account = store
        .create_account(&Account::new(id.clone()), Some(&grant))
        .await
        .unwrap();
    assert_eq!(account.balance, 100);

    let spend =
        CreditTransaction::spend(id.clone(), 40, "Image generation".into(), Some("flux".into()));
    assert_eq!(store.spend_credits(&spend).await.unwrap(), 60);

    let history = store.list_transactions(&id, 10, 0).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, spend.id);
    assert_eq!(history[0].related_model.as_deref(), Some("flux"));
    assert_eq!(store.count_transactions(&id).await.unwrap(), 2);
    assert_eq!(
        store.sum_transactions(&id, TransactionKind::Earned).await.unwrap(),
        100
    );
    assert_eq!(
        store.sum_transactions(&id, TransactionKind::Purchased).await.unwrap(),
        0
    );
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn overdraft_is_rejected() {
    let store = store().await;
    let id = unique_account();
    store.create_account(&Account::new(id.clone()), None).await.unwrap();

    let spend = CreditTransaction::spend(id.clone(), 1, "Image edit".into(), None);
    assert!(matches!(
        store.spend_credits(&spend).await,
        Err(StoreError::InsufficientCredits { balance: 0, required: 1 })
    ));
    assert_eq!(store.count_transactions(&id).await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn concurrent_confirmations_grant_once() {
    let store = store().await;
    let id = unique_account();
    let intent_id = PaymentIntentId::new(format!("pi_{}", TransactionId::generate())).unwrap();
    let intent =
        PurchaseIntent::pending(intent_id.clone(), id.clone(), 100, 999, "usd", "succeeded");
    store.put_purchase_intent(&intent).await.unwrap();

    let confirmation = |store: PgStore| {
        let confirmation = PurchaseConfirmation {
            intent_id: intent_id.clone(),
            account_id: id.clone(),
            transaction: CreditTransaction::purchase(id.clone(), 100, 999),
            status: "succeeded".into(),
            currency: "usd".into(),
            confirmed_at: Utc::now(),
        };
        async move { store.confirm_purchase(&confirmation).await }
    };

    let (a, b) = tokio::join!(confirmation(store.clone()), confirmation(store.clone()));
    assert_eq!(usize::from(a.is_ok()) + usize::from(b.is_ok()), 1);

    let account = store.get_account(&id).await.unwrap().unwrap();
    assert_eq!(account.balance, 100);
    assert_eq!(store.count_transactions(&id).await.unwrap(), 1);
    assert!(store.get_purchase_intent(&intent_id).await.unwrap().unwrap().confirmed);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn overflowing_grant_is_rejected() {
    let store = store().await;
    let id = unique_account();
    let grant = CreditTransaction::earned(id.clone(), 100, "Registration bonus".into());
    store
        .create_account(&Account::new(id.clone()), Some(&grant))
        .await
        .unwrap();

    let huge = CreditTransaction::earned(id.clone(), i64::MAX, "huge".into());
    assert!(matches!(
        store.add_credits(&huge).await,
        Err(StoreError::Overflow { .. })
    ));
    assert_eq!(store.get_account(&id).await.unwrap().unwrap().balance, 100);
    assert_eq!(store.count_transactions(&id).await.unwrap(), 1);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn confirmed_purchases_listed_newest_first() {
    let store = store().await;
    let id = unique_account();

    let mut older = PurchaseIntent::pending(
        PaymentIntentId::new(format!("pi_{}", TransactionId::generate())).unwrap(),
        id.clone(),
        100,
        999,
        "usd",
        "succeeded",
    );
    older.created_at -= chrono::Duration::minutes(5);
    older.confirmed = true;
    let mut newer = PurchaseIntent::pending(
        PaymentIntentId::new(format!("pi_{}", TransactionId::generate())).unwrap(),
        id.clone(),
        500,
        4999,
        "usd",
        "succeeded",
    );
    newer.confirmed = true;
    let open = PurchaseIntent::pending(
        PaymentIntentId::new(format!("pi_{}", TransactionId::generate())).unwrap(),
        id.clone(),
        1000,
        9999,
        "usd",
        "requires_payment_method",
    );
    for intent in [&older, &newer, &open] {
        store.put_purchase_intent(intent).await.unwrap();
    }

    let confirmed = store.list_purchase_intents(&id, true).await.unwrap();
    let ids: Vec<_> = confirmed.iter().map(|intent| intent.id.clone()).collect();
    assert_eq!(ids, vec![newer.id.clone(), older.id.clone()]);
    assert_eq!(store.list_purchase_intents(&id, false).await.unwrap().len(), 3);
}
