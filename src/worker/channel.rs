use std::sync::Arc;

use deadpool_sqlite::rusqlite::types::Value;
use tokio::sync::oneshot;

use crate::error::RelayError;
use crate::types::ParamValue;

pub(super) enum Command {
    ExecuteBatch {
        sql: String,
        respond_to: oneshot::Sender<Result<(), RelayError>>,
    },
    ExecuteDml {
        sql: Arc<String>,
        params: Vec<Value>,
        respond_to: oneshot::Sender<Result<usize, RelayError>>,
    },
    /// Prepare and run a read statement, then hold the open cursor on the
    /// worker thread. Replies with the column names; subsequent `FetchRow`
    /// commands step the cursor until end-of-rows or `CloseCursor`.
    OpenCursor {
        sql: Arc<String>,
        params: Vec<Value>,
        respond_to: oneshot::Sender<Result<Arc<Vec<String>>, RelayError>>,
    },
    FetchRow {
        respond_to: oneshot::Sender<Result<Option<Vec<ParamValue>>, RelayError>>,
    },
    CloseCursor,
    Shutdown,
}
