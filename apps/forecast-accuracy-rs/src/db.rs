use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::config::MEMORY_DATABASE_URL;
use crate::store::{MemoryReadingStore, PgReadingStore, SharedStore};

pub fn connect_lazy(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(8))
        .connect_lazy(database_url)
        .with_context(|| format!("Failed to create lazy database pool for {database_url}"))
}

/// Picks the store backend for `database_url`. No connection is opened here;
/// the Postgres schema is prepared on first use.
pub fn build_store(database_url: &str) -> Result<SharedStore> {
    if database_url == MEMORY_DATABASE_URL {
        tracing::warn!("using in-process reading store; data is lost on exit");
        return Ok(Arc::new(MemoryReadingStore::new()));
    }
    let pool = connect_lazy(database_url)?;
    Ok(Arc::new(PgReadingStore::new(pool)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_url_selects_in_process_store() {
        let store = build_store(MEMORY_DATABASE_URL).expect("store");
        let indexes = store.rebuild_indexes().await.expect("indexes");
        assert_eq!(indexes.len(), 1);
    }

    #[tokio::test]
    async fn postgres_url_builds_lazily() {
        assert!(build_store("postgresql://postgres@localhost/postgres").is_ok());
    }
}
