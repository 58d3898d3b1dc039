//! Mutable accumulator turning row-by-row column writes into a FIFO of
//! sealed, fixed-capacity batches plus one in-progress partial batch.
//!
//! A buffer instance is not safe for concurrent mutation; callers serialize
//! access to one instance. The batches it produces are freely shared.

use std::collections::VecDeque;
use std::sync::Arc;

use super::batch::TupleBatch;
use super::column::{Column, allocate_columns};
use super::schema::Schema;
use super::types::Value;
use crate::error::{ConvoyError, ConvoyResult};
use crate::ipc::message::{TransportMessage, normal_data_message};

/// Default number of rows per sealed batch.
pub const BATCH_SIZE: usize = 100;

/// Accumulates tuples for a fixed schema and emits them as sealed batches.
pub struct TupleBatchBuffer {
    /// Shape of the emitted batches.
    schema: Arc<Schema>,
    /// Rows per sealed batch. [`BATCH_SIZE`] unless overridden.
    capacity: usize,
    /// Convenience constant; always equals `schema.num_columns()`.
    num_columns: usize,
    /// FIFO of sealed column-sets, each exactly `capacity` rows.
    ready: VecDeque<Vec<Column>>,
    /// Columns of the in-progress batch.
    current: Vec<Column>,
    /// Which columns of the current row have been written.
    columns_ready: Vec<bool>,
    /// Count of set bits in `columns_ready`.
    num_columns_ready: usize,
    /// Complete rows accumulated in `current`.
    in_progress: usize,
}

impl TupleBatchBuffer {
    /// Empty buffer emitting batches of [`BATCH_SIZE`] rows.
    pub fn new(schema: Arc<Schema>) -> Self {
        Self::with_capacity(schema, BATCH_SIZE)
    }

    /// Empty buffer with an explicit rows-per-batch capacity (must be > 0).
    pub fn with_capacity(schema: Arc<Schema>, capacity: usize) -> Self {
        assert!(capacity > 0, "batch capacity must be positive");
        let num_columns = schema.num_columns();
        let current = allocate_columns(&schema, capacity);
        Self {
            schema,
            capacity,
            num_columns,
            ready: VecDeque::new(),
            current,
            columns_ready: vec![false; num_columns],
            num_columns_ready: 0,
            in_progress: 0,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total logical rows currently buffered (sealed + in-progress). O(1).
    pub fn num_tuples(&self) -> usize {
        self.ready.len() * self.capacity + self.in_progress
    }

    /// Whether a sealed batch is ready for [`TupleBatchBuffer::pop_filled`].
    pub fn has_filled(&self) -> bool {
        !self.ready.is_empty()
    }

    /// Append `value` to the in-progress column at `column`.
    ///
    /// A column index may be written at most once per current row; a second
    /// write before the row completes is a protocol violation and leaves
    /// the buffer untouched. Completing a row may seal a batch as a side
    /// effect once `capacity` rows are in progress.
    pub fn put(&mut self, column: usize, value: Value) -> ConvoyResult<()> {
        if column >= self.num_columns {
            return Err(ConvoyError::ProtocolViolation(format!(
                "column index {column} out of range for {} columns",
                self.num_columns
            )));
        }
        if self.columns_ready[column] {
            return Err(ConvoyError::ProtocolViolation(format!(
                "column {column} already written; finish the current row before starting a new one"
            )));
        }
        self.current[column].append(value)?;
        self.columns_ready[column] = true;
        self.num_columns_ready += 1;
        if self.num_columns_ready == self.num_columns {
            self.in_progress += 1;
            self.num_columns_ready = 0;
            self.columns_ready.fill(false);
            if self.in_progress == self.capacity {
                self.finish_batch()?;
            }
        }
        Ok(())
    }

    /// Seal the in-progress columns into the ready FIFO and allocate a
    /// fresh in-progress set. Returns whether any rows were sealed.
    fn finish_batch(&mut self) -> ConvoyResult<bool> {
        if self.num_columns_ready != 0 {
            return Err(ConvoyError::ProtocolViolation(
                "cannot seal a batch with a partially-written row".to_string(),
            ));
        }
        if self.in_progress == 0 {
            return Ok(false);
        }
        let sealed = std::mem::replace(&mut self.current, allocate_columns(&self.schema, self.capacity));
        self.ready.push_back(sealed);
        self.in_progress = 0;
        Ok(true)
    }

    /// Random access across sealed and in-progress storage.
    pub fn get(&self, column: usize, row: usize) -> ConvoyResult<Value> {
        if column >= self.num_columns {
            return Err(ConvoyError::ProtocolViolation(format!(
                "column index {column} out of range for {} columns",
                self.num_columns
            )));
        }
        let batch_index = row / self.capacity;
        let row_index = row % self.capacity;
        if batch_index > self.ready.len()
            || (batch_index == self.ready.len() && row_index >= self.in_progress)
        {
            return Err(ConvoyError::IndexOutOfBounds {
                index: row,
                len: self.num_tuples(),
            });
        }
        let col = if batch_index < self.ready.len() {
            &self.ready[batch_index][column]
        } else {
            &self.current[column]
        };
        col.get(row_index).ok_or(ConvoyError::IndexOutOfBounds {
            index: row,
            len: self.num_tuples(),
        })
    }

    /// Remove and return the oldest sealed batch, or `None` if nothing is
    /// sealed yet. Never returns a partial batch and never blocks.
    pub fn pop_filled(&mut self) -> Option<TupleBatch> {
        self.ready
            .pop_front()
            .map(|columns| TupleBatch::sealed(Arc::clone(&self.schema), columns, self.capacity))
    }

    /// Like [`TupleBatchBuffer::pop_filled`], but drains the stream's tail:
    /// if nothing is sealed and rows are in progress, they are forcibly
    /// sealed and returned as a partial batch.
    pub fn pop_any(&mut self) -> Option<TupleBatch> {
        if let Some(batch) = self.pop_filled() {
            return Some(batch);
        }
        if self.in_progress > 0 {
            let size = self.in_progress;
            // Sealing with a half-written row is a caller bug; abort loudly
            // rather than losing the partial row.
            self.finish_batch()
                .expect("pop_any called with a partially-written row");
            let columns = self.ready.pop_front()?;
            return Some(TupleBatch::sealed(Arc::clone(&self.schema), columns, size));
        }
        None
    }

    /// Oldest sealed batch as a ready-to-send data message, or `None`.
    pub fn pop_filled_as_message(&mut self) -> Option<TransportMessage> {
        self.ready
            .pop_front()
            .map(|columns| normal_data_message(columns, self.capacity))
    }

    /// Oldest sealed batch — or the forcibly-sealed tail — as a data
    /// message, or `None` when empty.
    pub fn pop_any_as_message(&mut self) -> Option<TransportMessage> {
        if let Some(msg) = self.pop_filled_as_message() {
            return Some(msg);
        }
        if self.in_progress > 0 {
            let size = self.in_progress;
            self.finish_batch()
                .expect("pop_any_as_message called with a partially-written row");
            let columns = self.ready.pop_front()?;
            return Some(normal_data_message(columns, size));
        }
        None
    }

    /// Snapshot of everything buffered (sealed batches plus a synthesized
    /// partial batch if rows are in progress) without mutating state. Used
    /// for diagnostics and tests.
    pub fn get_all(&self) -> Vec<TupleBatch> {
        let mut out = Vec::with_capacity(self.ready.len() + 1);
        for columns in &self.ready {
            out.push(TupleBatch::sealed(
                Arc::clone(&self.schema),
                columns.clone(),
                self.capacity,
            ));
        }
        if self.in_progress > 0 {
            out.push(TupleBatch::sealed(
                Arc::clone(&self.schema),
                self.current.clone(),
                self.in_progress,
            ));
        }
        out
    }

    /// Non-destructive snapshot as wire messages.
    pub fn get_all_as_messages(&self) -> Vec<TransportMessage> {
        let mut out = Vec::with_capacity(self.ready.len() + 1);
        for columns in &self.ready {
            out.push(normal_data_message(columns.clone(), self.capacity));
        }
        if self.in_progress > 0 {
            out.push(normal_data_message(self.current.clone(), self.in_progress));
        }
        out
    }

    /// Append another buffer's contents into this one.
    ///
    /// Sealed column-sets are carried over wholesale (requires matching
    /// schema and capacity); only the source's in-progress rows are
    /// replayed through [`TupleBatchBuffer::put`]. The source is left
    /// unchanged.
    pub fn merge(&mut self, other: &TupleBatchBuffer) -> ConvoyResult<()> {
        if other.schema != self.schema {
            return Err(ConvoyError::ProtocolViolation(
                "cannot merge buffers with different schemas".to_string(),
            ));
        }
        if other.capacity != self.capacity {
            return Err(ConvoyError::ProtocolViolation(format!(
                "cannot merge buffers with different capacities ({} vs {})",
                other.capacity, self.capacity
            )));
        }
        for columns in &other.ready {
            self.ready.push_back(columns.clone());
        }
        for row in 0..other.in_progress {
            for column in 0..other.num_columns {
                let value = other.current[column].get(row).ok_or_else(|| {
                    ConvoyError::ProtocolViolation(format!(
                        "merge source column {column} shorter than its row count"
                    ))
                })?;
                self.put(column, value)?;
            }
        }
        Ok(())
    }

    /// Reset to empty, discarding all sealed and in-progress data.
    pub fn clear(&mut self) {
        self.ready.clear();
        self.current = allocate_columns(&self.schema, self.capacity);
        self.columns_ready.fill(false);
        self.num_columns_ready = 0;
        self.in_progress = 0;
    }
}
