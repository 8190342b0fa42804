//! End-to-end tests through the public API on the in-memory store

use std::sync::Arc;

use bank_ledger::handlers::{DepositCommand, TransferCommand};
use bank_ledger::jobs::{purge_expired_idempotency_keys, JobScheduler};
use bank_ledger::{
    AccountStatus, AccountType, Ledger, LedgerError, LedgerStore, MemoryLedgerStore,
    OperationContext, TransactionKind,
};
use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use uuid::Uuid;

#[tokio::test]
async fn test_customer_lifecycle() {
    let ledger = Ledger::in_memory();

    let alice = ledger
        .register_user("alice", "alice@example.com", "hash-a")
        .await
        .unwrap()
        .user_id;
    let bob = ledger
        .register_user("bob", "bob@example.com", "hash-b")
        .await
        .unwrap()
        .user_id;

    let savings = ledger
        .open_account(alice, AccountType::Savings, dec!(1000))
        .await
        .unwrap()
        .account
        .id();
    let checking = ledger
        .open_account(bob, AccountType::Checking, dec!(0))
        .await
        .unwrap()
        .account
        .id();

    ledger.deposit(savings, dec!(250.25), "paycheck").await.unwrap();
    ledger
        .transfer(savings, checking, dec!(400), "rent share", alice)
        .await
        .unwrap();
    ledger
        .withdraw(checking, dec!(100), "atm", bob)
        .await
        .unwrap();

    assert_eq!(
        ledger.get_account(savings).await.unwrap().balance().value(),
        dec!(850.25)
    );
    assert_eq!(
        ledger.get_account(checking).await.unwrap().balance().value(),
        dec!(300)
    );

    let kinds: Vec<TransactionKind> = ledger
        .list_transactions(checking, None, None)
        .await
        .unwrap()
        .iter()
        .map(|t| t.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![TransactionKind::Withdrawal, TransactionKind::TransferIn]
    );

    let found = ledger.find_user_by_username("bob").await.unwrap().unwrap();
    assert_eq!(found.id, bob);
    assert!(ledger.find_user_by_username("carol").await.unwrap().is_none());

    // Drain and close
    ledger.withdraw(checking, dec!(300), "", bob).await.unwrap();
    let closed = ledger.close_account(checking, bob).await.unwrap();
    assert_eq!(closed.status(), AccountStatus::Closed);

    let stats = ledger.stats().await.unwrap();
    assert_eq!(stats.users, 2);
    assert_eq!(stats.active_accounts, 1);
    assert_eq!(stats.total_active_balance, dec!(850.25));

    for account in [savings, checking] {
        assert!(ledger.reconcile_account(account).await.unwrap().is_consistent());
    }
}

#[tokio::test]
async fn test_transactions_in_range() {
    let ledger = Ledger::in_memory();
    let user = ledger
        .register_user("dana", "dana@example.com", "hash")
        .await
        .unwrap()
        .user_id;
    let account = ledger
        .open_account(user, AccountType::Checking, dec!(0))
        .await
        .unwrap()
        .account
        .id();

    let start = Utc::now() - Duration::seconds(1);
    ledger.deposit(account, dec!(5), "").await.unwrap();
    ledger.deposit(account, dec!(7), "").await.unwrap();
    let end = Utc::now() + Duration::seconds(1);

    let in_range = ledger
        .transactions_in_range(account, start, end)
        .await
        .unwrap();
    assert_eq!(in_range.len(), 2);

    let none = ledger
        .transactions_in_range(account, end, end + Duration::hours(1))
        .await
        .unwrap();
    assert!(none.is_empty());

    let err = ledger
        .transactions_in_range(account, end, start)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_idempotency_keys_expire_after_purge() {
    let store = Arc::new(MemoryLedgerStore::new());
    let ledger = Ledger::new(store.clone());
    let user = ledger
        .register_user("erin", "erin@example.com", "hash")
        .await
        .unwrap()
        .user_id;
    let account = ledger
        .open_account(user, AccountType::Savings, dec!(0))
        .await
        .unwrap()
        .account
        .id();

    let context = OperationContext::new().with_idempotency_key(Uuid::new_v4());
    ledger
        .deposits()
        .execute(DepositCommand::new(account, dec!(10)), &context)
        .await
        .unwrap();
    ledger
        .deposits()
        .execute(DepositCommand::new(account, dec!(10)), &context)
        .await
        .unwrap();
    assert_eq!(
        ledger.get_account(account).await.unwrap().balance().value(),
        dec!(10)
    );

    let purged = purge_expired_idempotency_keys(store.as_ref(), Duration::zero())
        .await
        .unwrap();
    assert_eq!(purged, 1);

    // With the record gone the key is fresh again
    ledger
        .deposits()
        .execute(DepositCommand::new(account, dec!(10)), &context)
        .await
        .unwrap();
    assert_eq!(
        ledger.get_account(account).await.unwrap().balance().value(),
        dec!(20)
    );
}

#[tokio::test]
async fn test_maintenance_report() {
    let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedgerStore::new());
    let ledger = Ledger::new(store.clone());
    let user = ledger
        .register_user("frank", "frank@example.com", "hash")
        .await
        .unwrap()
        .user_id;
    let from = ledger
        .open_account(user, AccountType::Savings, dec!(90))
        .await
        .unwrap()
        .account
        .id();
    let to = ledger
        .open_account(user, AccountType::Checking, dec!(10))
        .await
        .unwrap()
        .account
        .id();
    ledger
        .transfers()
        .execute(
            TransferCommand::new(from, to, dec!(30)),
            &OperationContext::for_user(user).with_idempotency_key(Uuid::new_v4()),
        )
        .await
        .unwrap();

    let report = JobScheduler::new(store).run_all_once().await;

    assert!(report.errors.is_empty());
    // Fresh keys survive the default retention window
    assert_eq!(report.idempotency_keys_deleted, 0);
    let stats = report.stats.unwrap();
    assert_eq!(stats.users, 1);
    assert_eq!(stats.active_accounts, 2);
    assert_eq!(stats.transactions, 4);
    assert_eq!(stats.total_active_balance, dec!(100));
}
