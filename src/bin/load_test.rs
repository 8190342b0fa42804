//! Load Testing Tool
//!
//! Fires random concurrent transfers between a pool of accounts, then checks
//! that money was conserved and every account still reconciles.
//!
//! Run with: cargo run --bin load_test --release -- --accounts 20 --transfers 5000
//! Uses PostgreSQL when DATABASE_URL is set, the in-memory store otherwise.

use std::sync::Arc;
use std::time::Instant;

use rand::Rng;
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;

use bank_ledger::{
    AccountId, AccountType, Ledger, LedgerError, LedgerStore, MemoryLedgerStore, PgLedgerStore,
    UserId,
};

const INITIAL_BALANCE: i64 = 10_000;

fn arg_or(args: &[String], name: &str, default: usize) -> usize {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let account_count = arg_or(&args, "--accounts", 20).max(2);
    let transfer_count = arg_or(&args, "--transfers", 5000);
    let concurrency = arg_or(&args, "--concurrency", 32).max(1);

    let store: Arc<dyn LedgerStore> = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            println!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(concurrency as u32 + 2)
                .connect(&database_url)
                .await?;
            Arc::new(PgLedgerStore::new(pool))
        }
        Err(_) => {
            println!("DATABASE_URL not set, using the in-memory store");
            Arc::new(MemoryLedgerStore::new())
        }
    };
    let ledger = Arc::new(Ledger::new(store));

    println!(
        "Load Test - {} transfers across {} accounts ({} in flight)",
        transfer_count, account_count, concurrency
    );

    // Each run gets its own users so repeated runs against one database work
    let run_tag = &uuid::Uuid::new_v4().simple().to_string()[..8];
    let mut accounts: Vec<(AccountId, UserId)> = Vec::with_capacity(account_count);
    for i in 0..account_count {
        let username = format!("load-{}-{}", run_tag, i);
        let user = ledger
            .register_user(&username, &format!("{}@load.test", username), "load-test-hash")
            .await?;
        let opened = ledger
            .open_account(
                user.user_id,
                AccountType::Checking,
                Decimal::from(INITIAL_BALANCE),
            )
            .await?;
        accounts.push((opened.account.id(), user.user_id));
    }
    let expected_total = Decimal::from(INITIAL_BALANCE) * Decimal::from(account_count as i64);

    // Plan every transfer up front; amounts are 0.01 to 500.00
    let plan: Vec<(usize, usize, Decimal)> = {
        let mut rng = rand::thread_rng();
        (0..transfer_count)
            .map(|_| {
                let from = rng.gen_range(0..account_count);
                let mut to = rng.gen_range(0..account_count - 1);
                if to >= from {
                    to += 1;
                }
                let cents: i64 = rng.gen_range(1..=50_000);
                (from, to, Decimal::new(cents, 2))
            })
            .collect()
    };

    let start = Instant::now();
    let semaphore = Arc::new(tokio::sync::Semaphore::new(concurrency));
    let accounts = Arc::new(accounts);
    let mut tasks = Vec::with_capacity(transfer_count);

    for (from, to, amount) in plan {
        let permit = semaphore.clone().acquire_owned().await?;
        let ledger = ledger.clone();
        let accounts = accounts.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = permit;
            let (from_account, owner) = accounts[from];
            let (to_account, _) = accounts[to];
            ledger
                .transfer(from_account, to_account, amount, "load test", owner)
                .await
        }));
    }

    let mut success_count = 0u64;
    let mut insufficient_count = 0u64;
    let mut retryable_count = 0u64;
    let mut other_errors = 0u64;
    for task in tasks {
        match task.await? {
            Ok(_) => success_count += 1,
            Err(LedgerError::InsufficientFunds { .. }) => insufficient_count += 1,
            Err(e) if e.is_retryable() => retryable_count += 1,
            Err(e) => {
                other_errors += 1;
                eprintln!("Unexpected error: {}", e);
            }
        }
    }

    let elapsed = start.elapsed();
    let rate = success_count as f64 / elapsed.as_secs_f64();

    let mut total = Decimal::ZERO;
    let mut inconsistent = 0usize;
    for (account_id, _) in accounts.iter() {
        total += ledger.get_account(*account_id).await?.balance().value();
        let reconciliation = ledger.reconcile_account(*account_id).await?;
        if !reconciliation.is_consistent() {
            inconsistent += 1;
            eprintln!(
                "Account {} drifted by {}",
                account_id,
                reconciliation.drift()
            );
        }
    }

    println!("\n=== Load Test Results ===");
    println!("Total transfers: {}", transfer_count);
    println!("Successful: {}", success_count);
    println!("Insufficient funds: {}", insufficient_count);
    println!("Retryable failures: {}", retryable_count);
    println!("Other errors: {}", other_errors);
    println!("Time: {:.2}s", elapsed.as_secs_f64());
    println!("Rate: {:.0} transfers/sec", rate);
    println!("Total balance: {} (expected {})", total, expected_total);
    println!("Inconsistent accounts: {}", inconsistent);

    if total != expected_total || inconsistent > 0 {
        anyhow::bail!("ledger invariants violated under load");
    }

    Ok(())
}
