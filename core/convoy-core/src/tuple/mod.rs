//! Columnar tuple storage — schemas, typed columns, sealed batches and the
//! mutable accumulation buffer that produces them.

pub mod batch;
pub mod buffer;
pub mod column;
pub mod schema;
pub mod types;

pub use batch::TupleBatch;
pub use buffer::{BATCH_SIZE, TupleBatchBuffer};
pub use column::{Column, allocate_columns};
pub use schema::{Field, Schema};
pub use types::{TupleType, Value};
