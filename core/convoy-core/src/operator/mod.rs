//! Pull-based operator execution model.
//!
//! Every dataflow node implements [`Operator`]: a fixed schema, zero or
//! more children, a lifecycle (`Uninitialized → Open → Closed`) and two
//! fetch modes. `fetch_next` may block until data arrives, a child signals
//! end-of-stream or an error occurs; `fetch_next_ready` never blocks and
//! is the building block for cooperatively multiplexing many operators on
//! few threads. End-of-stream is terminal and sticky.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ConvoyError, ConvoyResult};
use crate::tuple::{Schema, TupleBatch};

pub mod consumer;
pub mod failure_injector;
pub mod filter;
pub mod source;
pub mod sqlite_insert;

pub use consumer::Consumer;
pub use failure_injector::FailureInjector;
pub use filter::Filter;
pub use source::BatchSource;
pub use sqlite_insert::SqliteInsert;

/// String-keyed init properties handed to every operator in a plan.
pub type OperatorConfig = HashMap<String, serde_json::Value>;

/// Operator lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorState {
    Uninitialized,
    Open,
    Closed,
}

/// Outcome of one fetch call.
#[derive(Debug)]
pub enum Fetch {
    /// One batch of tuples.
    Batch(TupleBatch),
    /// No data yet; only `fetch_next_ready` returns this.
    Pending,
    /// Terminal: no batch will ever follow.
    Eos,
}

/// A node in the dataflow DAG.
pub trait Operator: Send {
    /// Shape of the batches this node produces.
    fn schema(&self) -> &Arc<Schema>;

    /// Child operators, in input order.
    fn children(&self) -> &[Box<dyn Operator>];

    /// Replace the children. Fails with a usage error if the arity does
    /// not fit the node.
    fn set_children(&mut self, children: Vec<Box<dyn Operator>>) -> ConvoyResult<()>;

    /// `Uninitialized → Open`. Acquires whatever resources fetching needs.
    fn init(&mut self, config: &OperatorConfig) -> ConvoyResult<()>;

    /// `Open → Closed`. Stops and joins background work before returning;
    /// fetching afterwards is a usage error.
    fn cleanup(&mut self) -> ConvoyResult<()>;

    /// Blocking fetch. Never returns [`Fetch::Pending`].
    fn fetch_next(&mut self) -> ConvoyResult<Fetch>;

    /// Non-blocking fetch; returns [`Fetch::Pending`] instead of waiting.
    fn fetch_next_ready(&mut self) -> ConvoyResult<Fetch>;
}

/// Lifecycle guard shared by the concrete operators.
pub(crate) fn check_transition(
    state: OperatorState,
    expected: OperatorState,
    action: &str,
) -> ConvoyResult<()> {
    if state != expected {
        return Err(ConvoyError::InvalidOperation {
            message: format!("cannot {action}"),
            context: format!("operator is {state:?}, must be {expected:?}"),
        });
    }
    Ok(())
}

/// Fetching is only valid while open.
pub(crate) fn check_open(state: OperatorState) -> ConvoyResult<()> {
    check_transition(state, OperatorState::Open, "fetch")
}
