use std::sync::Arc;
use std::sync::mpsc::Receiver;

use deadpool_sqlite::Object;
use deadpool_sqlite::rusqlite::{self, types::Value};

use crate::error::RelayError;
use crate::params::from_sql_value;
use crate::types::ParamValue;

use super::channel::Command;

pub(super) fn run_worker(object: &Object, receiver: &Receiver<Command>) {
    let conn_guard = match object.lock() {
        Ok(guard) => guard,
        Err(err) => {
            tracing::error!("SQLite connection mutex poisoned: {err}");
            return;
        }
    };

    while let Ok(command) = receiver.recv() {
        match command {
            Command::Shutdown => break,
            Command::ExecuteBatch { sql, respond_to } => {
                let result = conn_guard.execute_batch(&sql).map_err(RelayError::from);
                let _ = respond_to.send(result);
            }
            Command::ExecuteDml {
                sql,
                params,
                respond_to,
            } => {
                let _ = respond_to.send(execute_dml(&conn_guard, &sql, &params));
            }
            Command::OpenCursor {
                sql,
                params,
                respond_to,
            } => {
                // Blocks this worker in the cursor loop until the cursor is
                // exhausted or closed; the statement never outlives the loop.
                if !run_cursor(&conn_guard, &sql, &params, respond_to, receiver) {
                    break;
                }
            }
            // No cursor is open; a stray close is harmless, a stray fetch is not.
            Command::CloseCursor => {}
            Command::FetchRow { respond_to } => {
                let _ = respond_to.send(Err(RelayError::Connection(
                    "no open cursor on this connection".into(),
                )));
            }
        }
    }

    // Never hand a connection back to the pool with an explicit transaction
    // still open (possible when a transaction is dropped while a member
    // cursor holds the connection).
    if !conn_guard.is_autocommit() {
        if let Err(err) = conn_guard.execute_batch("ROLLBACK") {
            tracing::warn!(error = %err, "rollback on worker shutdown failed");
        }
    }
}

/// Returns `false` when a shutdown was requested while the cursor was open.
fn run_cursor(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &[Value],
    respond_to: tokio::sync::oneshot::Sender<Result<Arc<Vec<String>>, RelayError>>,
    receiver: &Receiver<Command>,
) -> bool {
    let mut stmt = match conn.prepare(sql) {
        Ok(stmt) => stmt,
        Err(err) => {
            let _ = respond_to.send(Err(err.into()));
            return true;
        }
    };
    let columns: Arc<Vec<String>> = Arc::new(
        stmt.column_names()
            .iter()
            .map(std::string::ToString::to_string)
            .collect(),
    );
    let param_refs = values_as_tosql(params);
    let mut rows = match stmt.query(&param_refs[..]) {
        Ok(rows) => rows,
        Err(err) => {
            let _ = respond_to.send(Err(err.into()));
            return true;
        }
    };
    let _ = respond_to.send(Ok(Arc::clone(&columns)));

    while let Ok(command) = receiver.recv() {
        match command {
            Command::FetchRow { respond_to } => {
                let fetched = next_row(&mut rows, columns.len());
                let finished = !matches!(fetched, Ok(Some(_)));
                let _ = respond_to.send(fetched);
                if finished {
                    break;
                }
            }
            Command::CloseCursor => break,
            Command::Shutdown => return false,
            // Anything else is a protocol violation while a cursor is open.
            Command::ExecuteBatch { respond_to, .. } => {
                let _ = respond_to.send(Err(cursor_busy()));
            }
            Command::ExecuteDml { respond_to, .. } => {
                let _ = respond_to.send(Err(cursor_busy()));
            }
            Command::OpenCursor { respond_to, .. } => {
                let _ = respond_to.send(Err(cursor_busy()));
            }
        }
    }
    true
}

fn cursor_busy() -> RelayError {
    RelayError::Connection("cursor already open on this connection".into())
}

fn next_row(
    rows: &mut rusqlite::Rows<'_>,
    column_count: usize,
) -> Result<Option<Vec<ParamValue>>, RelayError> {
    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    let mut values = Vec::with_capacity(column_count);
    for index in 0..column_count {
        let value: Value = row.get(index).map_err(RelayError::from)?;
        values.push(from_sql_value(value));
    }
    Ok(Some(values))
}

fn execute_dml(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &[Value],
) -> Result<usize, RelayError> {
    let mut stmt = conn.prepare(sql)?;
    let param_refs = values_as_tosql(params);
    Ok(stmt.execute(&param_refs[..])?)
}

fn values_as_tosql(values: &[Value]) -> Vec<&dyn rusqlite::ToSql> {
    values.iter().map(|v| v as &dyn rusqlite::ToSql).collect()
}
