//! The symbol store engine
//!
//! Holds one lazily opened SQLite connection per handle. Every operation
//! keeps the connection state read-locked while it runs; opening and
//! closing take the write lock, so there is exactly one physical open per
//! connection lifetime and `close` waits for in-flight operations.

use crate::clock::{Clock, SystemClock};
use crate::config::SymbolStoreConfig;
use crate::error::{Result, SymbolStoreError};
use crate::eviction::{self, AgeCutoff};
use crate::migrate;
use crate::types::{from_millis, pack_u32s, to_millis, StoreStats, SymbolTable, SymbolTableRow};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Sqlite, Transaction};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
/// Wait for the single connection before giving up with `PoolTimedOut`
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

const LAST_AGE_SWEEP_KEY: &str = "last_age_sweep_at";
const LAST_COUNT_SWEEP_KEY: &str = "last_count_sweep_at";

/// Persistent, count- and age-bounded symbol table cache
pub struct SymbolStoreDb {
    config: SymbolStoreConfig,
    clock: Arc<dyn Clock>,
    /// `None` until first use and again after `close`
    pool: RwLock<Option<SqlitePool>>,
    opens: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SymbolStoreDb {
    /// Create a store handle. Nothing touches the disk until the first
    /// operation.
    pub fn new(config: SymbolStoreConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: SymbolStoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            pool: RwLock::new(None),
            opens: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &SymbolStoreConfig {
        &self.config
    }

    /// Store a symbol table, replacing any previous one for the same key.
    ///
    /// The write makes the entry the most recently used. Afterwards the
    /// oldest entries beyond `max_count` are evicted; a failing eviction is
    /// logged and does not fail the store.
    pub async fn store_symbol_table(
        &self,
        debug_name: &str,
        breakpad_id: &str,
        table: &SymbolTable,
    ) -> Result<()> {
        let pool = self.connection().await?;
        let now = to_millis(self.clock.now());

        let mut tx = pool.begin().await?;
        let insertion_order = sqlx::query(
            r#"
            INSERT OR REPLACE INTO symbol_tables
                (debug_name, breakpad_id, addrs, idx, buffer, last_used_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(debug_name)
        .bind(breakpad_id)
        .bind(pack_u32s(&table.addrs))
        .bind(pack_u32s(&table.index))
        .bind(&table.buffer)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        tx.commit().await?;

        debug!(
            debug_name,
            breakpad_id,
            insertion_order,
            size = table.byte_len(),
            "Stored symbol table"
        );

        if let Err(e) = self.evict_over_capacity_in(&pool).await {
            warn!(
                store = %self.config.store_name,
                error = %e,
                "Count eviction failed after store"
            );
        }

        Ok(())
    }

    /// Look up a symbol table.
    ///
    /// A hit makes the entry the most recently used. Missing and evicted
    /// entries both fail with `NotFound`.
    pub async fn get_symbol_table(
        &self,
        debug_name: &str,
        breakpad_id: &str,
    ) -> Result<SymbolTable> {
        let pool = self.connection().await?;
        let now = to_millis(self.clock.now());

        let mut tx = pool.begin().await?;
        let row: Option<SymbolTableRow> = sqlx::query_as(
            r#"
            SELECT insertion_order, addrs, idx, buffer
            FROM symbol_tables
            WHERE debug_name = ? AND breakpad_id = ?
            "#,
        )
        .bind(debug_name)
        .bind(breakpad_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(debug_name, breakpad_id, "Symbol table miss");
            return Err(SymbolStoreError::not_found(debug_name, breakpad_id));
        };

        let table = match row.to_symbol_table() {
            Ok(table) => table,
            Err(e) => {
                warn!(
                    debug_name,
                    breakpad_id,
                    error = %e,
                    insertion_order = row.insertion_order,
                    "Corrupt symbol table"
                );
                // Left in place; the next store for this key replaces it
                tx.rollback().await?;
                return Err(e);
            }
        };

        // Re-insert to move the entry to the most recent end
        let insertion_order = sqlx::query(
            r#"
            INSERT OR REPLACE INTO symbol_tables
                (debug_name, breakpad_id, addrs, idx, buffer, last_used_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(debug_name)
        .bind(breakpad_id)
        .bind(&row.addrs)
        .bind(&row.idx)
        .bind(&row.buffer)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        tx.commit().await?;

        self.hits.fetch_add(1, Ordering::Relaxed);
        debug!(
            debug_name,
            breakpad_id,
            previous_order = row.insertion_order,
            insertion_order,
            "Symbol table hit"
        );

        Ok(table)
    }

    /// Delete a symbol table, returning whether one was resident
    pub async fn delete_symbol_table(&self, debug_name: &str, breakpad_id: &str) -> Result<bool> {
        let pool = self.connection().await?;
        let result =
            sqlx::query("DELETE FROM symbol_tables WHERE debug_name = ? AND breakpad_id = ?")
                .bind(debug_name)
                .bind(breakpad_id)
                .execute(&*pool)
                .await?;
        let deleted = result.rows_affected() > 0;
        debug!(debug_name, breakpad_id, deleted, "Deleted symbol table");
        Ok(deleted)
    }

    /// Evict the least recently used entries beyond `max_count`.
    /// Returns the number of entries removed.
    pub async fn evict_over_capacity(&self) -> Result<usize> {
        let pool = self.connection().await?;
        self.evict_over_capacity_in(&pool).await
    }

    /// Evict entries older than `max_age`. Also runs whenever the
    /// connection is opened. Returns the number of entries removed.
    pub async fn evict_expired(&self) -> Result<usize> {
        let pool = self.connection().await?;
        self.evict_expired_in(&pool).await
    }

    /// Get current store statistics
    pub async fn stats(&self) -> Result<StoreStats> {
        let pool = self.connection().await?;

        let entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM symbol_tables")
            .fetch_one(&*pool)
            .await?;
        let metadata: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM store_metadata")
                .fetch_all(&*pool)
                .await?;

        let timestamp = |key: &str| {
            metadata
                .iter()
                .find(|(k, _)| k == key)
                .and_then(|(_, v)| v.parse::<i64>().ok())
                .and_then(from_millis)
        };

        Ok(StoreStats {
            entries: entries as usize,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            opens: self.opens.load(Ordering::Relaxed),
            last_age_sweep_at: timestamp(LAST_AGE_SWEEP_KEY),
            last_count_sweep_at: timestamp(LAST_COUNT_SWEEP_KEY),
        })
    }

    /// Close the connection once in-flight operations have finished.
    ///
    /// Closing an unopened or already closed store does nothing. The next
    /// operation reopens the store.
    pub async fn close(&self) {
        let mut state = self.pool.write().await;
        if let Some(pool) = state.take() {
            pool.close().await;
            info!(store = %self.config.store_name, "Symbol store closed");
        }
    }

    pub async fn is_open(&self) -> bool {
        self.pool.read().await.is_some()
    }

    /// Get the open connection, opening it first if needed
    async fn connection(&self) -> Result<RwLockReadGuard<'_, SqlitePool>> {
        loop {
            let state = self.pool.read().await;
            if let Ok(pool) = RwLockReadGuard::try_map(state, |s| s.as_ref()) {
                return Ok(pool);
            }

            let mut state = self.pool.write().await;
            // Another caller may have opened it while we waited
            if state.is_none() {
                *state = Some(self.open().await?);
            }
            if let Ok(pool) = RwLockReadGuard::try_map(state.downgrade(), |s| s.as_ref()) {
                return Ok(pool);
            }
        }
    }

    /// Physically open the database: create it if missing, bring the schema
    /// up to date and run the age sweep.
    async fn open(&self) -> Result<SqlitePool> {
        let path = self.config.database_path();
        fs::create_dir_all(&self.config.store_dir).await?;

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await?;

        if let Err(e) = self.prepare(&pool).await {
            pool.close().await;
            return Err(e);
        }

        self.opens.fetch_add(1, Ordering::Relaxed);
        info!(
            store = %self.config.store_name,
            path = ?path,
            max_count = self.config.max_count,
            max_age_secs = ?self.config.max_age.map(|d| d.as_secs_f64()),
            "Symbol store opened"
        );
        Ok(pool)
    }

    async fn prepare(&self, pool: &SqlitePool) -> Result<()> {
        migrate::migrate(pool).await?;
        self.evict_expired_in(pool).await?;
        Ok(())
    }

    async fn evict_over_capacity_in(&self, pool: &SqlitePool) -> Result<usize> {
        let now = self.clock.now();
        let mut tx = pool.begin().await?;

        let orders: Vec<i64> = sqlx::query_scalar(
            "SELECT insertion_order FROM symbol_tables ORDER BY insertion_order ASC",
        )
        .fetch_all(&mut *tx)
        .await?;

        let victims = eviction::count_victims(&orders, self.config.max_count);
        // Victims are a prefix of the ordering, so one range delete covers them
        if let Some(&newest_victim) = victims.last() {
            sqlx::query("DELETE FROM symbol_tables WHERE insertion_order <= ?")
                .bind(newest_victim)
                .execute(&mut *tx)
                .await?;
        }
        set_metadata(&mut tx, LAST_COUNT_SWEEP_KEY, to_millis(now)).await?;
        tx.commit().await?;

        if !victims.is_empty() {
            info!(
                store = %self.config.store_name,
                evicted = victims.len(),
                max_count = self.config.max_count,
                "Evicted least recently used symbol tables"
            );
        }
        Ok(victims.len())
    }

    async fn evict_expired_in(&self, pool: &SqlitePool) -> Result<usize> {
        let now = self.clock.now();
        let delete_before = match eviction::age_cutoff(now, self.config.max_age) {
            AgeCutoff::Unbounded => return Ok(0),
            AgeCutoff::Everything => None,
            AgeCutoff::Before(cutoff) => Some(to_millis(cutoff)),
        };

        let mut tx = pool.begin().await?;
        let result = match delete_before {
            None => {
                sqlx::query("DELETE FROM symbol_tables")
                    .execute(&mut *tx)
                    .await?
            }
            Some(cutoff) => {
                sqlx::query("DELETE FROM symbol_tables WHERE last_used_at < ?")
                    .bind(cutoff)
                    .execute(&mut *tx)
                    .await?
            }
        };
        set_metadata(&mut tx, LAST_AGE_SWEEP_KEY, to_millis(now)).await?;
        tx.commit().await?;

        let evicted = result.rows_affected() as usize;
        if evicted > 0 {
            info!(
                store = %self.config.store_name,
                evicted,
                "Evicted expired symbol tables"
            );
        }
        Ok(evicted)
    }
}

async fn set_metadata(tx: &mut Transaction<'_, Sqlite>, key: &str, value: i64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO store_metadata (key, value) VALUES (?, ?)
        ON CONFLICT (key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value.to_string())
    .execute(&mut **tx)
    .await?;
    Ok(())
}
