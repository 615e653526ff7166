//! Per-user attempt rate limiting with a pluggable backing store.
//!
//! The persistent store is tried first; any failure there silently degrades
//! to an in-process map for that call. Denying a legitimate user because the
//! database hiccuped would be worse than briefly counting in memory.

pub mod store;

use std::sync::Arc;

use tracing::{debug, warn};

pub use store::{AttemptStore, Bump, MemoryAttemptStore, SqliteAttemptStore, StoreError};

/// Gate for session-generation attempts.
pub struct RateLimiter {
    primary: Option<Arc<dyn AttemptStore>>,
    fallback: MemoryAttemptStore,
    enabled: bool,
    ceiling: u32,
    window_secs: u64,
}

impl RateLimiter {
    pub fn new(primary: Option<Arc<dyn AttemptStore>>, ceiling: u32, window_secs: u64) -> Self {
        Self {
            primary,
            fallback: MemoryAttemptStore::new(),
            enabled: true,
            ceiling,
            window_secs,
        }
    }

    /// Build a limiter that admits everything (rate limiting disabled).
    pub fn disabled() -> Self {
        Self {
            primary: None,
            fallback: MemoryAttemptStore::new(),
            enabled: false,
            ceiling: 0,
            window_secs: 0,
        }
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    /// Record an attempt for `user_id`. Returns false once the ceiling is
    /// reached within the current window; denied attempts are not counted.
    pub async fn attempt(&self, user_id: i64) -> bool {
        if !self.enabled {
            return true;
        }
        if self.ceiling == 0 {
            return false;
        }

        if let Some(primary) = &self.primary {
            match primary.bump(user_id, self.ceiling, self.window_secs).await {
                Ok(Bump::Allowed(count)) => {
                    debug!(user_id, count, ceiling = self.ceiling, "attempt admitted");
                    return true;
                },
                Ok(Bump::Denied) => return false,
                Err(e) => {
                    warn!(user_id, error = %e, "primary attempt store failed, using in-memory fallback");
                },
            }
        }

        matches!(
            self.fallback
                .bump_sync(user_id, self.ceiling, self.window_secs),
            Bump::Allowed(_)
        )
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {super::*, async_trait::async_trait};

    /// Store that fails every call, to exercise the degrade path.
    struct BrokenStore;

    #[async_trait]
    impl AttemptStore for BrokenStore {
        async fn get(&self, _user_id: i64) -> Result<u32, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn set_with_expiry(
            &self,
            _user_id: i64,
            _count: u32,
            _ttl_secs: u64,
        ) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn five_attempts_then_denied() {
        let limiter = RateLimiter::new(None, 5, 3600);
        for _ in 0..5 {
            assert!(limiter.attempt(42).await);
        }
        assert!(!limiter.attempt(42).await);
        // Other users are unaffected.
        assert!(limiter.attempt(43).await);
    }

    #[tokio::test]
    async fn window_expiry_reopens_the_gate() {
        let limiter = RateLimiter::new(None, 5, 3600);
        for _ in 0..5 {
            assert!(limiter.attempt(42).await);
        }
        assert!(!limiter.attempt(42).await);

        limiter
            .fallback
            .force_reset_at(42, store::now_epoch() - 1);
        assert!(limiter.attempt(42).await);
    }

    #[tokio::test]
    async fn broken_primary_degrades_to_memory() {
        let limiter = RateLimiter::new(Some(Arc::new(BrokenStore)), 2, 3600);
        assert!(limiter.attempt(1).await);
        assert!(limiter.attempt(1).await);
        // The fallback keeps honest counts even while the primary is down.
        assert!(!limiter.attempt(1).await);
    }

    #[tokio::test]
    async fn sqlite_primary_counts() {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        SqliteAttemptStore::migrate(&pool).await.unwrap();
        let limiter = RateLimiter::new(Some(Arc::new(SqliteAttemptStore::new(pool))), 3, 3600);
        assert!(limiter.attempt(5).await);
        assert!(limiter.attempt(5).await);
        assert!(limiter.attempt(5).await);
        assert!(!limiter.attempt(5).await);
    }

    #[tokio::test]
    async fn zero_ceiling_denies_everything() {
        let limiter = RateLimiter::new(None, 0, 3600);
        assert!(!limiter.attempt(42).await);
    }

    #[tokio::test]
    async fn disabled_limiter_admits_everything() {
        let limiter = RateLimiter::disabled();
        for _ in 0..100 {
            assert!(limiter.attempt(42).await);
        }
    }
}
