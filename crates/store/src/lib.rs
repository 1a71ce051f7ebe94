//! Persisted relational store.
//!
//! Backs the durable tables named in spec §6: `runs`, `threads`, `projects`,
//! `messages`, `tasks`. Every operation here competes with concurrent
//! writers across the fleet (multiple gateway/worker processes share one
//! Postgres instance), so updates are either single-row `UPDATE ... WHERE`
//! statements or explicit retry loops — never read-modify-write across an
//! in-process lock.

pub mod messages;
pub mod projects;
pub mod runs;
pub mod tasks;
pub mod threads;

use sa_domain::config::StoreConfig;
use sa_domain::error::{Error, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

#[derive(Clone)]
pub struct Store {
    pub(crate) pool: PgPool,
    pub(crate) retry_attempts: u32,
    pub(crate) retry_base_delay_ms: u64,
}

impl Store {
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .map_err(|e| Error::Store(format!("connect: {e}")))?;

        Ok(Self {
            pool,
            retry_attempts: config.finalize_retry_attempts,
            retry_base_delay_ms: config.finalize_retry_base_delay_ms,
        })
    }

    #[cfg(any(test, feature = "test-util"))]
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            retry_attempts: 3,
            retry_base_delay_ms: 100,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run `op` up to `self.retry_attempts` times with exponential backoff,
    /// per §4.7 step 10 ("up to 3 retries on conflict, exponential
    /// backoff"). Used for the finalize-run write, which races the Control
    /// Plane's `stop` write to the same row.
    pub(crate) async fn with_retry<F, Fut, T>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if attempt + 1 < self.retry_attempts => {
                    let delay = self.retry_base_delay_ms * 2u64.pow(attempt);
                    tracing::warn!(attempt, error = %e, "store write failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
