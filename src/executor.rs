//! The query executor: runs a [`QuerySpec`] as a lazy stream of result
//! elements, batch by batch.

use std::pin::pin;
use std::sync::Arc;

use async_stream::stream;
use futures_util::{Stream, StreamExt};

use crate::batch;
use crate::error::RelayError;
use crate::gate;
use crate::params;
use crate::query::QuerySpec;
use crate::results::ResultElement;
use crate::transaction::TxHandle;
use crate::types::StatementKind;

/// Execute a query spec, producing result elements lazily: one row element
/// per fetched row for reads, one affected-count element per batch for
/// writes.
///
/// Ordering guarantees:
/// - nothing runs before every dependency in the spec has completed;
/// - batches execute strictly in sequence, never concurrently with each
///   other; elements of batch *k* are fully emitted (or the batch fails)
///   before batch *k+1* begins;
/// - rows are emitted in the database's native cursor order.
///
/// Connections: inside a transaction every batch reuses the transaction's
/// connection (serialized with its other members); outside one, each batch
/// checks out a fresh pooled connection and releases it when the batch ends.
///
/// Dropping the stream mid-flight releases the in-flight cursor, statement,
/// and connection promptly and starts no further batches; a cancelled
/// transactional statement marks its transaction for rollback.
///
/// The stream ends with at most one `Err` item; elements already emitted
/// before a mid-stream failure remain valid.
pub fn execute(spec: QuerySpec) -> impl Stream<Item = Result<ResultElement, RelayError>> + Send {
    stream! {
        let QuerySpec {
            sql,
            kind,
            placeholder_count,
            parameters,
            dependencies,
            context,
        } = spec;
        let (pool, transaction) = context.into_parts();

        let mut member = None;
        let mut failure = None;
        match transaction.as_ref().map(TxHandle::register).transpose() {
            Ok(registered) => member = registered,
            Err(err) => failure = Some(err),
        }

        if failure.is_none() {
            if let Err(err) = gate::wait_all(dependencies).await {
                failure = Some(err);
            }
        }

        if failure.is_none() {
            let sql = Arc::new(sql);
            let mut batches = pin!(batch::batches(parameters, placeholder_count));
            let mut index = 0usize;
            'batches: while let Some(next) = batches.next().await {
                let parameters = match next {
                    Ok(batch) => batch,
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                };
                let values = match params::bind_positional(&parameters, placeholder_count) {
                    Ok(values) => values,
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                };
                // Inside a transaction, hold its statement lock for the whole
                // batch so members never interleave on the shared connection.
                let stmt_guard = match &transaction {
                    Some(handle) => Some(handle.lock_statements().await),
                    None => None,
                };
                let conn = match &transaction {
                    Some(handle) => match handle.connection() {
                        Ok(conn) => conn,
                        Err(err) => {
                            failure = Some(err);
                            break;
                        }
                    },
                    None => match pool.acquire().await {
                        Ok(conn) => conn,
                        Err(err) => {
                            failure = Some(err);
                            break;
                        }
                    },
                };
                tracing::debug!(batch = index, kind = ?kind, "executing statement batch");
                match kind {
                    StatementKind::Dml => {
                        match conn.execute_dml(Arc::clone(&sql), values).await {
                            Ok(count) => yield Ok(ResultElement::RowsAffected(count)),
                            Err(err) => {
                                failure = Some(err);
                                break 'batches;
                            }
                        }
                    }
                    StatementKind::Select => {
                        let mut cursor = match conn.open_cursor(Arc::clone(&sql), values).await {
                            Ok(cursor) => cursor,
                            Err(err) => {
                                failure = Some(err);
                                break 'batches;
                            }
                        };
                        loop {
                            match cursor.fetch().await {
                                Ok(Some(row)) => yield Ok(ResultElement::Row(row)),
                                Ok(None) => break,
                                Err(err) => {
                                    failure = Some(err);
                                    break 'batches;
                                }
                            }
                        }
                    }
                }
                // Cursor, then pooled connection, then the statement lock.
                drop(conn);
                drop(stmt_guard);
                index += 1;
            }
        }

        match failure {
            Some(err) => {
                if let Some(member) = member.take() {
                    member.fail(err.to_string());
                }
                tracing::warn!(error = %err, "query execution failed");
                yield Err(err);
            }
            None => {
                if let Some(member) = member.take() {
                    member.succeed();
                }
            }
        }
    }
}
