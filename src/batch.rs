//! Groups a flat, ordered parameter stream into fixed-size batches, one batch
//! per statement execution.

use std::pin::pin;

use async_stream::try_stream;
use futures_util::{Stream, StreamExt};

use crate::error::RelayError;
use crate::types::Parameter;

/// One full set of positional values for a single statement execution.
pub type ParameterBatch = Vec<Parameter>;

/// Adapt a parameter stream into batches of exactly `size` values, in input
/// order. Batch boundaries are a pure function of position.
///
/// Edge cases, reported when the offending batch would be executed:
/// - total length not a multiple of `size` ends the stream with a
///   `BindingCount` error naming expected vs. actual counts;
/// - an empty source with `size == 0` yields exactly one empty batch (a
///   zero-placeholder statement still executes once);
/// - an empty source with `size > 0` is a `BindingCount` error, as is any
///   value supplied when `size == 0`; the latter is reported on the first
///   value, leaving the rest of the source unconsumed.
pub fn batches<S>(
    source: S,
    size: usize,
) -> impl Stream<Item = Result<ParameterBatch, RelayError>> + Send
where
    S: Stream<Item = Parameter> + Send + 'static,
{
    try_stream! {
        let mut source = pin!(source);
        if size == 0 {
            // One value is enough to reject; never drain the source for a
            // count that is already provably wrong.
            if source.next().await.is_some() {
                Err(RelayError::BindingCount {
                    expected: 0,
                    actual: 1,
                })?;
            }
            yield ParameterBatch::new();
        } else {
            let mut current = ParameterBatch::with_capacity(size);
            let mut total = 0usize;
            while let Some(parameter) = source.next().await {
                total += 1;
                current.push(parameter);
                if current.len() == size {
                    yield std::mem::replace(&mut current, ParameterBatch::with_capacity(size));
                }
            }
            if total == 0 {
                Err(RelayError::BindingCount {
                    expected: size,
                    actual: 0,
                })?;
            } else if !current.is_empty() {
                Err(RelayError::BindingCount {
                    expected: size,
                    actual: current.len(),
                })?;
            }
        }
    }
}
