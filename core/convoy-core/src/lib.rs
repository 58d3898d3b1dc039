//! # Convoy — Parallel Query Execution Core
//!
//! Convoy is the execution core of a shared-nothing parallel query
//! engine: columnar tuple batches, a pull-based operator model, a durable
//! SQLite sink and the worker/master IPC transport that moves batches
//! between nodes.
//!
//! ## Quick start
//!
//! Accumulate rows into batches, run them through an operator tree:
//!
//! ```rust
//! use std::sync::Arc;
//! use convoy_core::operator::{BatchSource, Fetch, Filter, Operator, OperatorConfig};
//! use convoy_core::predicate::NotEqualsPredicate;
//! use convoy_core::tuple::{Schema, TupleBatchBuffer, TupleType, Value};
//!
//! # fn main() -> convoy_core::ConvoyResult<()> {
//! let schema = Arc::new(Schema::from_pairs(&[("id", TupleType::Long)]));
//! let mut buffer = TupleBatchBuffer::new(Arc::clone(&schema));
//! for id in [1i64, 2, 3] {
//!     buffer.put(0, Value::Long(id))?;
//! }
//!
//! let source = Box::new(BatchSource::from_buffer(buffer));
//! let predicate = Box::new(NotEqualsPredicate::new(0, Value::Long(2)));
//! let mut filter = Filter::new(predicate, source);
//!
//! filter.init(&OperatorConfig::new())?;
//! let Fetch::Batch(batch) = filter.fetch_next()? else { unreachable!() };
//! assert_eq!(batch.num_rows(), 2);
//! filter.cleanup()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Layout
//!
//! - [`tuple`] — columnar batches and the row-accumulating buffer
//! - [`operator`] — the pull-based operator contract and the concrete
//!   operators (source, consumer, filter, failure injector, SQLite sink)
//! - [`ipc`] — compressed, framed, validated transport between workers
//!   and the master
//! - [`storage`] — the single-writer SQLite queue and typed scans
//! - [`predicate`] — row predicates and their construction registry
//! - [`catalog`] — relation naming and coordinator-facing traits
//!
//! Within a connection message order is preserved end-to-end; data only
//! crosses from network threads to execution threads through the hand-off
//! queue.

pub mod catalog;
pub mod error;
pub mod ipc;
pub mod logging;
pub mod operator;
pub mod predicate;
pub mod storage;
pub mod tuple;

pub use catalog::RelationKey;
pub use error::{ConvoyError, ConvoyResult};
pub use ipc::{IpcConnection, IpcServer, MessageWrapper, TransportMessage, WorkerId};
pub use operator::{Fetch, Operator, OperatorConfig};
pub use tuple::{Schema, TupleBatch, TupleBatchBuffer, TupleType, Value};
