//! Worker-thread ownership of checked-out connections.
//!
//! rusqlite handles (`Connection`, `Statement`, `Rows`) are `!Send`, so each
//! checked-out connection lives on a dedicated thread and async callers talk
//! to it over a command channel. This is also what makes a lazy, forward-only
//! row cursor possible: the worker parks inside the cursor loop and steps the
//! native cursor once per `FetchRow`.

mod channel;
mod dispatcher;
mod manager;

pub(crate) use manager::Worker;
