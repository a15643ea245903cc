use std::fmt;
use std::time::Duration;

use deadpool::managed::PoolError;
use deadpool_sqlite::{Config as SqliteConfig, Runtime};

use crate::connection::Connection;
use crate::error::RelayError;

/// Options for the connection pool facade.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub db_path: String,
    pub max_size: usize,
    pub acquire_timeout: Duration,
}

impl PoolConfig {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            max_size: 8,
            acquire_timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    #[must_use]
    pub fn acquire_timeout(mut self, acquire_timeout: Duration) -> Self {
        self.acquire_timeout = acquire_timeout;
        self
    }
}

/// Bounded pool of SQLite connections. Hands out exclusive [`Connection`]
/// handles; acquisition suspends until a connection is free or the configured
/// timeout maps to [`RelayError::PoolExhausted`].
#[derive(Clone)]
pub struct Pool {
    inner: deadpool_sqlite::Pool,
    acquire_timeout: Duration,
}

impl Pool {
    /// Create the pool and verify connectivity with an initial checkout.
    ///
    /// # Errors
    /// Returns `RelayError::Connection` if the pool cannot be created or the
    /// initial connection fails.
    pub async fn new(config: PoolConfig) -> Result<Self, RelayError> {
        let mut cfg = SqliteConfig::new(config.db_path.clone());
        cfg.pool = Some(deadpool::managed::PoolConfig::new(config.max_size));
        let inner = cfg.create_pool(Runtime::Tokio1).map_err(|err| {
            RelayError::Connection(format!("failed to create SQLite pool: {err}"))
        })?;

        // WAL so concurrent QuerySpecs reading and writing do not block each
        // other at the file level.
        {
            let object = inner.get().await.map_err(|err| {
                RelayError::Connection(format!("failed to open initial connection: {err}"))
            })?;
            object
                .interact(|conn| conn.execute_batch("PRAGMA journal_mode = WAL;"))
                .await
                .map_err(|err| RelayError::Connection(format!("SQLite interact error: {err}")))?
                .map_err(RelayError::from)?;
        }

        Ok(Self {
            inner,
            acquire_timeout: config.acquire_timeout,
        })
    }

    /// Check out an exclusive connection handle.
    ///
    /// # Errors
    /// Returns `RelayError::PoolExhausted` when no connection becomes
    /// available within the configured timeout.
    pub async fn acquire(&self) -> Result<Connection, RelayError> {
        let object = match tokio::time::timeout(self.acquire_timeout, self.inner.get()).await {
            Ok(Ok(object)) => object,
            Ok(Err(PoolError::Timeout(_))) | Err(_) => {
                return Err(RelayError::PoolExhausted(format!(
                    "no connection available within {:?}",
                    self.acquire_timeout
                )));
            }
            Ok(Err(err)) => {
                return Err(RelayError::Connection(format!(
                    "failed to check out connection: {err}"
                )));
            }
        };
        tracing::debug!("connection checked out");
        Connection::new(object)
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}
