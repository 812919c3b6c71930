#![deny(warnings)]

use persistence::{default_sqlite_url, ensure_parent_dir, init_db, sqlite_url};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::args()
        .nth(1)
        .map(|loc| sqlite_url(&loc))
        .unwrap_or_else(|| default_sqlite_url().to_string());
    ensure_parent_dir(&url)?;
    let pool = init_db(&url).await?;
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kv_store")
        .fetch_one(&pool)
        .await?;
    pool.close().await;
    println!("DB migrated at {} ({} stored keys)", url, rows);
    Ok(())
}
