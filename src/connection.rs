use std::fmt;
use std::sync::Arc;

use deadpool_sqlite::Object;
use deadpool_sqlite::rusqlite::types::Value;

use crate::error::RelayError;
use crate::results::Row;
use crate::worker::Worker;

/// Exclusive handle to one checked-out connection, backed by a worker thread.
///
/// Cloning shares the same underlying connection; the pooled object is
/// returned once every clone (and any open [`Cursor`]) has been dropped.
#[derive(Clone)]
pub struct Connection {
    worker: Arc<Worker>,
}

impl Connection {
    pub(crate) fn new(object: Object) -> Result<Self, RelayError> {
        let worker = Worker::spawn(object)?;
        Ok(Self {
            worker: Arc::new(worker),
        })
    }

    /// Execute raw SQL (one or more statements, no parameters). Used for DDL
    /// setup and for the coordinator's BEGIN/COMMIT/ROLLBACK.
    ///
    /// # Errors
    /// Returns `RelayError` if the database rejects the batch or the worker
    /// channel is closed.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), RelayError> {
        self.worker.execute_batch(sql.to_owned()).await
    }

    /// Fire-and-forget batch, for `Drop` paths that cannot await.
    pub(crate) fn fire_batch(&self, sql: &str) {
        self.worker.fire_batch(sql.to_owned());
    }

    /// Execute a write statement with bound values, returning rows affected.
    ///
    /// # Errors
    /// Returns `RelayError` if binding or execution fails.
    pub async fn execute_dml(&self, sql: Arc<String>, params: Vec<Value>) -> Result<usize, RelayError> {
        self.worker.execute_dml(sql, params).await
    }

    /// Execute a read statement and return a lazy, forward-only cursor. The
    /// worker holds the prepared statement open until the cursor is exhausted
    /// or dropped; only one cursor can be open per connection.
    ///
    /// # Errors
    /// Returns `RelayError` if preparing or running the statement fails.
    pub async fn open_cursor(&self, sql: Arc<String>, params: Vec<Value>) -> Result<Cursor, RelayError> {
        let columns = self.worker.open_cursor(sql, params).await?;
        Ok(Cursor {
            conn: self.clone(),
            columns,
            open: true,
        })
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("object_id", &self.worker.object_id())
            .finish()
    }
}

/// Forward-only row cursor. Dropping it mid-stream closes the server-side
/// statement promptly; the release happens exactly once.
pub struct Cursor {
    conn: Connection,
    columns: Arc<Vec<String>>,
    open: bool,
}

impl Cursor {
    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// Advance the underlying cursor by one row. `Ok(None)` signals
    /// end-of-rows; after that (or after an error) the statement is closed.
    ///
    /// # Errors
    /// Returns `RelayError` if stepping the cursor fails; the statement is
    /// still closed on the worker side.
    pub async fn fetch(&mut self) -> Result<Option<Row>, RelayError> {
        if !self.open {
            return Ok(None);
        }
        match self.conn.worker.fetch_row().await {
            Ok(Some(values)) => Ok(Some(Row::new(Arc::clone(&self.columns), values))),
            Ok(None) => {
                self.open = false;
                Ok(None)
            }
            Err(err) => {
                self.open = false;
                Err(err)
            }
        }
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        if self.open {
            self.conn.worker.close_cursor();
        }
    }
}
