//! Query configuration.
//!
//! A [`QuerySpec`] is an explicit configuration struct built once and passed
//! by value into [`crate::executor::execute`]; it is never mutated after
//! execution starts.

use futures_util::stream::{self, BoxStream, StreamExt};

use crate::gate::Dependency;
use crate::pool::Pool;
use crate::transaction::TxHandle;
use crate::types::{ParamValue, Parameter, StatementKind};

/// Execution environment shared by the statements of one logical unit of
/// work: the pool, plus the active transaction when there is one.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pool: Pool,
    transaction: Option<TxHandle>,
}

impl ExecutionContext {
    /// Context for standalone statements; each batch runs on a fresh pooled
    /// connection.
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            transaction: None,
        }
    }

    /// Context for statements that are members of `transaction`; every batch
    /// runs serialized on the transaction's connection.
    #[must_use]
    pub fn transactional(pool: Pool, transaction: TxHandle) -> Self {
        Self {
            pool,
            transaction: Some(transaction),
        }
    }

    pub(crate) fn into_parts(self) -> (Pool, Option<TxHandle>) {
        (self.pool, self.transaction)
    }
}

/// Everything needed to run one parameterized statement: text, parameter
/// source, dependency set, and owning context. More parameters than one
/// execution needs means the statement executes once per batch.
pub struct QuerySpec {
    pub sql: String,
    pub kind: StatementKind,
    /// The statement's placeholder count; every batch must match it exactly.
    pub placeholder_count: usize,
    /// Lazy source of bound parameters, consumed in order.
    pub parameters: BoxStream<'static, Parameter>,
    /// Upstream operations that must complete before execution starts.
    pub dependencies: Vec<Dependency>,
    pub context: ExecutionContext,
}

impl QuerySpec {
    /// A spec with no parameters and no dependencies; fill in the public
    /// fields before handing it to the executor.
    #[must_use]
    pub fn new(
        sql: impl Into<String>,
        kind: StatementKind,
        placeholder_count: usize,
        context: ExecutionContext,
    ) -> Self {
        Self {
            sql: sql.into(),
            kind,
            placeholder_count,
            parameters: stream::empty().boxed(),
            dependencies: Vec::new(),
            context,
        }
    }

    /// Bind a flat value list, positions implied by order (see
    /// [`positional_parameters`]).
    #[must_use]
    pub fn with_values(mut self, values: Vec<ParamValue>) -> Self {
        self.parameters = positional_parameters(values, self.placeholder_count);
        self
    }
}

/// Turn a flat value list into a positional parameter stream: positions cycle
/// `1..=placeholder_count`, so a list longer than one batch drives multiple
/// executions of the statement.
#[must_use]
pub fn positional_parameters(
    values: Vec<ParamValue>,
    placeholder_count: usize,
) -> BoxStream<'static, Parameter> {
    stream::iter(values.into_iter().enumerate().map(move |(index, value)| {
        let position = if placeholder_count == 0 {
            1
        } else {
            index % placeholder_count + 1
        };
        Parameter::new(position, value)
    }))
    .boxed()
}
