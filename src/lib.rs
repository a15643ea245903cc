//! Asynchronous, dependency-ordered execution of parameterized SQL over
//! pooled SQLite connections.
//!
//! The core pieces, leaf to root:
//! - [`pool::Pool`]: bounded facade handing out exclusive connection handles;
//! - [`batch`]: groups a flat parameter stream into per-execution batches;
//! - [`gate`]: delays execution until upstream operations complete;
//! - [`transaction::Transaction`]: serializes members on one connection and
//!   publishes the commit/rollback outcome as a value;
//! - [`executor::execute`]: runs a [`query::QuerySpec`] as a lazy stream of
//!   [`results::ResultElement`]s, releasing statements, cursors, and
//!   connections on every exit path, cancellation included.
//!
//! ```rust,no_run
//! use futures_util::StreamExt;
//! use sql_relay::prelude::*;
//!
//! # async fn demo() -> Result<(), RelayError> {
//! let pool = Pool::new(PoolConfig::new("relay.db")).await?;
//! let ctx = ExecutionContext::new(pool.clone());
//!
//! let mut spec = QuerySpec::new("INSERT INTO t VALUES (?1, ?2)", StatementKind::Dml, 2, ctx);
//! spec.parameters = positional_parameters(
//!     vec![
//!         ParamValue::Int(1), ParamValue::Text("a".into()),
//!         ParamValue::Int(2), ParamValue::Text("b".into()),
//!     ],
//!     2,
//! );
//!
//! // Two batches, executed strictly in order.
//! let mut results = std::pin::pin!(execute(spec));
//! while let Some(element) = results.next().await {
//!     assert_eq!(element?.rows_affected(), Some(1));
//! }
//! # Ok(()) }
//! ```

pub mod batch;
mod connection;
pub mod error;
pub mod executor;
pub mod gate;
mod params;
pub mod pool;
pub mod prelude;
pub mod query;
pub mod results;
pub mod transaction;
pub mod types;
mod worker;

pub use connection::{Connection, Cursor};
pub use error::RelayError;
pub use executor::execute;
pub use gate::Dependency;
pub use pool::{Pool, PoolConfig};
pub use query::{ExecutionContext, QuerySpec, positional_parameters};
pub use results::{ResultElement, Row};
pub use transaction::{Transaction, TxHandle, TxOutcomeState, TxOutcomeSubscription};
pub use types::{ParamValue, Parameter, StatementKind};
