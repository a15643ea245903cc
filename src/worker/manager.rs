use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread;

use deadpool::managed::ObjectId;
use deadpool_sqlite::Object;
use deadpool_sqlite::rusqlite::types::Value;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::error::RelayError;
use crate::types::ParamValue;

use super::channel::Command;
use super::dispatcher::run_worker;

/// Dedicated thread owning one checked-out connection. The pooled object is
/// released (returned to the pool) when the thread exits after `Shutdown`.
pub(crate) struct Worker {
    sender: Sender<Command>,
    object_id: ObjectId,
}

impl Worker {
    pub(crate) fn spawn(object: Object) -> Result<Self, RelayError> {
        let (sender, receiver) = mpsc::channel::<Command>();
        let object_id = Object::id(&object);
        let handle = Handle::try_current().ok();
        thread::Builder::new()
            .name(format!("sql-relay-conn-{object_id}"))
            .spawn(move || {
                // Returning the object to the pool on drop needs the runtime.
                let runtime_guard = handle.as_ref().map(Handle::enter);
                run_worker(&object, &receiver);
                drop(runtime_guard);
            })
            .map_err(|err| {
                RelayError::Connection(format!("failed to spawn connection worker thread: {err}"))
            })?;

        Ok(Self { sender, object_id })
    }

    pub(crate) fn object_id(&self) -> ObjectId {
        self.object_id
    }

    fn send_command(&self, command: Command) -> Result<(), RelayError> {
        self.sender
            .send(command)
            .map_err(|_| connection_error("connection worker closed"))
    }

    /// Fire-and-forget send, for `Drop` paths that cannot await a reply.
    fn fire(&self, command: Command) {
        let _ = self.sender.send(command);
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, RelayError>>) -> Command,
        drop_message: &'static str,
    ) -> Result<T, RelayError> {
        let (tx, rx) = oneshot::channel();
        self.send_command(build(tx))?;
        rx.await.map_err(|_| connection_error(drop_message))?
    }

    pub(crate) async fn execute_batch(&self, sql: String) -> Result<(), RelayError> {
        self.request(
            |respond_to| Command::ExecuteBatch { sql, respond_to },
            "connection worker dropped while executing batch",
        )
        .await
    }

    pub(crate) fn fire_batch(&self, sql: String) {
        let (respond_to, _) = oneshot::channel();
        self.fire(Command::ExecuteBatch { sql, respond_to });
    }

    pub(crate) async fn execute_dml(
        &self,
        sql: Arc<String>,
        params: Vec<Value>,
    ) -> Result<usize, RelayError> {
        self.request(
            |respond_to| Command::ExecuteDml {
                sql,
                params,
                respond_to,
            },
            "connection worker dropped while executing dml",
        )
        .await
    }

    pub(crate) async fn open_cursor(
        &self,
        sql: Arc<String>,
        params: Vec<Value>,
    ) -> Result<Arc<Vec<String>>, RelayError> {
        self.request(
            |respond_to| Command::OpenCursor {
                sql,
                params,
                respond_to,
            },
            "connection worker dropped while opening cursor",
        )
        .await
    }

    pub(crate) async fn fetch_row(&self) -> Result<Option<Vec<ParamValue>>, RelayError> {
        self.request(
            |respond_to| Command::FetchRow { respond_to },
            "connection worker dropped while fetching row",
        )
        .await
    }

    pub(crate) fn close_cursor(&self) {
        self.fire(Command::CloseCursor);
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let _ = self.sender.send(Command::Shutdown);
    }
}

fn connection_error(message: &str) -> RelayError {
    RelayError::Connection(message.into())
}
