//! Attempt-count storage backends.
//!
//! The persistent store is SQLite; the in-memory map is the degrade path and
//! is only correct for a single-process deployment.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("attempt store unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a gated increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bump {
    /// Attempt admitted; contains the count after the increment.
    Allowed(u32),
    /// Ceiling already reached within the live window; nothing written.
    Denied,
}

/// Per-user attempt counts scoped to an expiring window.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Current count for `user_id`; 0 when absent or expired.
    async fn get(&self, user_id: i64) -> Result<u32, StoreError>;

    /// Store `count` for `user_id`, expiring `ttl_secs` from now.
    async fn set_with_expiry(&self, user_id: i64, count: u32, ttl_secs: u64)
    -> Result<(), StoreError>;

    /// Increment within the window without exceeding `ceiling`.
    ///
    /// The default implementation is read-then-write and therefore racy
    /// across workers; stores that can do better override it.
    async fn bump(&self, user_id: i64, ceiling: u32, window_secs: u64) -> Result<Bump, StoreError> {
        let current = self.get(user_id).await?;
        if current >= ceiling {
            return Ok(Bump::Denied);
        }
        self.set_with_expiry(user_id, current + 1, window_secs).await?;
        Ok(Bump::Allowed(current + 1))
    }
}

pub(crate) fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

// ── SQLite ──────────────────────────────────────────────────────────────────

/// SQLite-backed attempt store, shared across bot processes on one host.
pub struct SqliteAttemptStore {
    pool: sqlx::SqlitePool,
}

impl SqliteAttemptStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the schema if it does not exist yet.
    pub async fn migrate(pool: &sqlx::SqlitePool) -> Result<(), StoreError> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS rate_limits (
                user_id  INTEGER PRIMARY KEY,
                attempts INTEGER NOT NULL,
                reset_at INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    /// One guarded update: lazily resets an expired window, increments only
    /// below the ceiling. Returns the new count, or `None` when the row is
    /// missing or the ceiling is reached (the WHERE clause filters both).
    async fn try_update(
        &self,
        user_id: i64,
        ceiling: u32,
        window_secs: u64,
        now: i64,
    ) -> Result<Option<u32>, StoreError> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"UPDATE rate_limits SET
                 attempts = CASE WHEN reset_at <= ?2 THEN 1 ELSE attempts + 1 END,
                 reset_at = CASE WHEN reset_at <= ?2 THEN ?3 ELSE reset_at END
               WHERE user_id = ?1 AND (reset_at <= ?2 OR attempts < ?4)
               RETURNING attempts"#,
        )
        .bind(user_id)
        .bind(now)
        .bind(now + window_secs as i64)
        .bind(i64::from(ceiling))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(attempts,)| attempts as u32))
    }
}

#[async_trait]
impl AttemptStore for SqliteAttemptStore {
    async fn get(&self, user_id: i64) -> Result<u32, StoreError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT attempts FROM rate_limits WHERE user_id = ? AND reset_at > ?",
        )
        .bind(user_id)
        .bind(now_epoch())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(attempts,)| attempts as u32).unwrap_or(0))
    }

    async fn set_with_expiry(
        &self,
        user_id: i64,
        count: u32,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO rate_limits (user_id, attempts, reset_at) VALUES (?1, ?2, ?3)
               ON CONFLICT(user_id) DO UPDATE SET
                 attempts = excluded.attempts,
                 reset_at = excluded.reset_at"#,
        )
        .bind(user_id)
        .bind(i64::from(count))
        .bind(now_epoch() + ttl_secs as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Atomic variant: each statement is a single guarded write, so counts
    /// are never lost or pushed past the ceiling by concurrent workers.
    async fn bump(&self, user_id: i64, ceiling: u32, window_secs: u64) -> Result<Bump, StoreError> {
        let now = now_epoch();

        if let Some(attempts) = self.try_update(user_id, ceiling, window_secs, now).await? {
            return Ok(Bump::Allowed(attempts));
        }

        // No row updated: either the user has no record yet, or the window is
        // live at the ceiling. A conflict-free insert decides which.
        let inserted: Option<(i64,)> = sqlx::query_as(
            r#"INSERT INTO rate_limits (user_id, attempts, reset_at) VALUES (?1, 1, ?2)
               ON CONFLICT(user_id) DO NOTHING
               RETURNING attempts"#,
        )
        .bind(user_id)
        .bind(now + window_secs as i64)
        .fetch_optional(&self.pool)
        .await?;
        if inserted.is_some() {
            return Ok(Bump::Allowed(1));
        }

        // The row exists after all; retry the guarded update once in case a
        // concurrent worker created it between the two statements.
        match self.try_update(user_id, ceiling, window_secs, now).await? {
            Some(attempts) => Ok(Bump::Allowed(attempts)),
            None => Ok(Bump::Denied),
        }
    }
}

// ── In-memory fallback ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Record {
    attempts: u32,
    reset_at: i64,
}

/// Process-local attempt store. Window reset is lazy: an expired record is
/// reinitialised on read before the increment is applied.
#[derive(Default)]
pub struct MemoryAttemptStore {
    records: Mutex<HashMap<i64, Record>>,
}

impl MemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<i64, Record>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn live(record: Option<Record>, now: i64) -> Option<Record> {
        record.filter(|r| r.reset_at > now)
    }

    pub(crate) fn bump_sync(&self, user_id: i64, ceiling: u32, window_secs: u64) -> Bump {
        let now = now_epoch();
        let mut records = self.lock();
        let current = Self::live(records.get(&user_id).copied(), now);
        match current {
            Some(record) if record.attempts >= ceiling => Bump::Denied,
            Some(record) => {
                let next = Record {
                    attempts: record.attempts + 1,
                    reset_at: record.reset_at,
                };
                records.insert(user_id, next);
                Bump::Allowed(next.attempts)
            },
            None => {
                records.insert(user_id, Record {
                    attempts: 1,
                    reset_at: now + window_secs as i64,
                });
                Bump::Allowed(1)
            },
        }
    }

    /// Test hook: rewrite the reset timestamp for `user_id`.
    #[cfg(test)]
    pub(crate) fn force_reset_at(&self, user_id: i64, reset_at: i64) {
        if let Some(record) = self.lock().get_mut(&user_id) {
            record.reset_at = reset_at;
        }
    }
}

#[async_trait]
impl AttemptStore for MemoryAttemptStore {
    async fn get(&self, user_id: i64) -> Result<u32, StoreError> {
        let now = now_epoch();
        let records = self.lock();
        Ok(Self::live(records.get(&user_id).copied(), now)
            .map(|r| r.attempts)
            .unwrap_or(0))
    }

    async fn set_with_expiry(
        &self,
        user_id: i64,
        count: u32,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        self.lock().insert(user_id, Record {
            attempts: count,
            reset_at: now_epoch() + ttl_secs as i64,
        });
        Ok(())
    }

    async fn bump(&self, user_id: i64, ceiling: u32, window_secs: u64) -> Result<Bump, StoreError> {
        Ok(self.bump_sync(user_id, ceiling, window_secs))
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> sqlx::SqlitePool {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        SqliteAttemptStore::migrate(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn sqlite_bump_counts_up_to_ceiling() {
        let store = SqliteAttemptStore::new(test_pool().await);
        for expected in 1..=5 {
            assert_eq!(
                store.bump(42, 5, 3600).await.unwrap(),
                Bump::Allowed(expected)
            );
        }
        assert_eq!(store.bump(42, 5, 3600).await.unwrap(), Bump::Denied);
        // Denied attempts must not move the counter.
        assert_eq!(store.get(42).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn sqlite_bump_resets_expired_window() {
        let pool = test_pool().await;
        let store = SqliteAttemptStore::new(pool.clone());
        for _ in 0..5 {
            store.bump(7, 5, 3600).await.unwrap();
        }
        assert_eq!(store.bump(7, 5, 3600).await.unwrap(), Bump::Denied);

        // Move the window into the past; the next bump starts a fresh one.
        sqlx::query("UPDATE rate_limits SET reset_at = ? WHERE user_id = ?")
            .bind(now_epoch() - 1)
            .bind(7i64)
            .execute(&pool)
            .await
            .unwrap();
        assert_eq!(store.bump(7, 5, 3600).await.unwrap(), Bump::Allowed(1));
    }

    #[tokio::test]
    async fn sqlite_get_ignores_expired_rows() {
        let pool = test_pool().await;
        let store = SqliteAttemptStore::new(pool.clone());
        store.set_with_expiry(9, 3, 3600).await.unwrap();
        assert_eq!(store.get(9).await.unwrap(), 3);

        sqlx::query("UPDATE rate_limits SET reset_at = ? WHERE user_id = ?")
            .bind(now_epoch() - 1)
            .bind(9i64)
            .execute(&pool)
            .await
            .unwrap();
        assert_eq!(store.get(9).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sqlite_users_are_independent() {
        let store = SqliteAttemptStore::new(test_pool().await);
        for _ in 0..5 {
            store.bump(1, 5, 3600).await.unwrap();
        }
        assert_eq!(store.bump(1, 5, 3600).await.unwrap(), Bump::Denied);
        assert_eq!(store.bump(2, 5, 3600).await.unwrap(), Bump::Allowed(1));
    }

    #[tokio::test]
    async fn memory_bump_counts_up_to_ceiling() {
        let store = MemoryAttemptStore::new();
        for expected in 1..=5 {
            assert_eq!(store.bump_sync(42, 5, 3600), Bump::Allowed(expected));
        }
        assert_eq!(store.bump_sync(42, 5, 3600), Bump::Denied);
        assert_eq!(store.get(42).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn memory_lazy_reset_after_window() {
        let store = MemoryAttemptStore::new();
        for _ in 0..5 {
            store.bump_sync(42, 5, 3600);
        }
        assert_eq!(store.bump_sync(42, 5, 3600), Bump::Denied);

        store.force_reset_at(42, now_epoch() - 1);
        assert_eq!(store.bump_sync(42, 5, 3600), Bump::Allowed(1));
        assert_eq!(store.get(42).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn default_bump_via_trait_methods() {
        // Exercise the trait's default read-then-write path on the memory
        // store's get/set pair.
        struct Plain(MemoryAttemptStore);

        #[async_trait]
        impl AttemptStore for Plain {
            async fn get(&self, user_id: i64) -> Result<u32, StoreError> {
                self.0.get(user_id).await
            }
            async fn set_with_expiry(
                &self,
                user_id: i64,
                count: u32,
                ttl_secs: u64,
            ) -> Result<(), StoreError> {
                self.0.set_with_expiry(user_id, count, ttl_secs).await
            }
        }

        let store = Plain(MemoryAttemptStore::new());
        for expected in 1..=3 {
            assert_eq!(
                store.bump(8, 3, 3600).await.unwrap(),
                Bump::Allowed(expected)
            );
        }
        assert_eq!(store.bump(8, 3, 3600).await.unwrap(), Bump::Denied);
    }
}
