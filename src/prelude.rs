//! Common imports for crate users.

pub use crate::error::RelayError;
pub use crate::executor::execute;
pub use crate::gate::Dependency;
pub use crate::pool::{Pool, PoolConfig};
pub use crate::query::{ExecutionContext, QuerySpec, positional_parameters};
pub use crate::results::{ResultElement, Row};
pub use crate::transaction::{Transaction, TxOutcomeSubscription};
pub use crate::types::{ParamValue, Parameter, StatementKind};
