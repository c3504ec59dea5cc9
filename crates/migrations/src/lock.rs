//! Advisory lock held while migrations write
//!
//! Two processes running `migrate` against the same store would otherwise
//! race on the pending set and double-apply. The lock is taken through the
//! data store, so it is shared by every process using that store.

use std::time::{Duration, Instant};

use crate::error::{MigrationError, MigrationResult};
use crate::store::DataStore;

/// Delay between lock attempts
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A held migration lock
///
/// Release is asynchronous, so it cannot happen in `Drop`; callers must call
/// [`MigrationLock::release`] on every path. [`MigrationLock::run`] does that.
#[must_use = "the lock must be released with `release()`"]
pub struct MigrationLock<'a> {
    store: &'a dyn DataStore,
    key: String,
}

impl<'a> MigrationLock<'a> {
    /// Poll until the lock is acquired or `timeout` elapses
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::LockTimeout` if another holder keeps the lock
    /// past the timeout, or `MigrationError::Store` if the store fails.
    pub async fn acquire(
        store: &'a dyn DataStore,
        key: &str,
        timeout: Duration,
    ) -> MigrationResult<MigrationLock<'a>> {
        let start = Instant::now();

        loop {
            if store.try_lock(key).await? {
                tracing::debug!(lock = %key, "Acquired migration lock");
                return Ok(Self {
                    store,
                    key: key.to_string(),
                });
            }

            if start.elapsed() >= timeout {
                return Err(MigrationError::LockTimeout {
                    key: key.to_string(),
                    timeout_secs: timeout.as_secs(),
                });
            }

            tracing::debug!(lock = %key, "Migration lock held elsewhere, waiting");
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Lock key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the lock
    pub async fn release(self) -> MigrationResult<()> {
        self.store.unlock(&self.key).await?;
        tracing::debug!(lock = %self.key, "Released migration lock");
        Ok(())
    }

    /// Run `work` while holding the lock, releasing it whatever the outcome
    ///
    /// A failed release is logged and never replaces the result of `work`.
    pub async fn run<T, F>(
        store: &'a dyn DataStore,
        key: &str,
        timeout: Duration,
        work: F,
    ) -> MigrationResult<T>
    where
        F: std::future::Future<Output = MigrationResult<T>>,
    {
        let lock = Self::acquire(store, key, timeout).await?;
        let outcome = work.await;

        if let Err(e) = lock.release().await {
            tracing::warn!(lock = %key, error = %e, "Failed to release migration lock");
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_acquire_and_release() {
        let store = MemoryStore::new();
        let lock = MigrationLock::acquire(&store, "folio_migrations", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(lock.key(), "folio_migrations");
        assert!(store.is_locked("folio_migrations").await);

        lock.release().await.unwrap();
        assert!(!store.is_locked("folio_migrations").await);
    }

    #[tokio::test]
    async fn test_times_out_while_held() {
        let store = MemoryStore::new();
        assert!(store.try_lock("folio_migrations").await.unwrap());

        let result =
            MigrationLock::acquire(&store, "folio_migrations", Duration::from_millis(250)).await;
        assert!(matches!(
            result,
            Err(MigrationError::LockTimeout { ref key, .. }) if key == "folio_migrations"
        ));
    }

    #[tokio::test]
    async fn test_run_releases_after_failure() {
        let store = MemoryStore::new();

        let result: MigrationResult<()> = MigrationLock::run(
            &store,
            "folio_migrations",
            Duration::from_secs(1),
            async { Err(MigrationError::discovery("boom")) },
        )
        .await;

        assert!(matches!(result, Err(MigrationError::Discovery { .. })));
        assert!(!store.is_locked("folio_migrations").await);
    }
}
