//! Common test utilities

#![allow(dead_code)]

use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tokio::sync::OnceCell;

static SCHEMA_APPLIED: OnceCell<()> = OnceCell::const_new();

/// Connect to the test database and make sure the schema exists.
///
/// Returns `None` when DATABASE_URL is not set so PostgreSQL tests can skip.
/// Tests share the database; each one works on its own freshly created users
/// and accounts instead of truncating tables under its neighbours.
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("DATABASE_URL not set, skipping PostgreSQL test");
            return None;
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    SCHEMA_APPLIED
        .get_or_init(|| async {
            pool.execute(include_str!("../../schema/ledger.sql"))
                .await
                .expect("Failed to apply schema");
        })
        .await;

    Some(pool)
}

/// Username unique across test runs
pub fn unique_name(prefix: &str) -> String {
    format!("{}-{}", prefix, &uuid::Uuid::new_v4().simple().to_string()[..12])
}
