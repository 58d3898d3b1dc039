//! Typed, append-only column storage.
//!
//! A column never mixes types but grows without bound on its own; the
//! rows-per-batch cap is enforced by the owning
//! [`TupleBatchBuffer`](super::buffer::TupleBatchBuffer)'s seal logic (the
//! allocation capacity is only a hint). Once a column is handed to a
//! [`TupleBatch`](super::batch::TupleBatch) it is sealed and only read.

use serde::{Deserialize, Serialize};

use super::schema::Schema;
use super::types::{TupleType, Value};
use crate::error::{ConvoyError, ConvoyResult};

/// Contiguous storage for one column of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Bool(Vec<bool>),
    Int(Vec<i32>),
    Long(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Str(Vec<String>),
}

impl Column {
    /// Allocate an empty column of the given type, pre-sized for
    /// `capacity` values. The size is not a cap; the owning buffer seals
    /// batches before a column outgrows it.
    pub fn allocate(ty: TupleType, capacity: usize) -> Self {
        match ty {
            TupleType::Bool => Column::Bool(Vec::with_capacity(capacity)),
            TupleType::Int => Column::Int(Vec::with_capacity(capacity)),
            TupleType::Long => Column::Long(Vec::with_capacity(capacity)),
            TupleType::Float => Column::Float(Vec::with_capacity(capacity)),
            TupleType::Double => Column::Double(Vec::with_capacity(capacity)),
            TupleType::Str => Column::Str(Vec::with_capacity(capacity)),
        }
    }

    pub fn tuple_type(&self) -> TupleType {
        match self {
            Column::Bool(_) => TupleType::Bool,
            Column::Int(_) => TupleType::Int,
            Column::Long(_) => TupleType::Long,
            Column::Float(_) => TupleType::Float,
            Column::Double(_) => TupleType::Double,
            Column::Str(_) => TupleType::Str,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Bool(v) => v.len(),
            Column::Int(v) => v.len(),
            Column::Long(v) => v.len(),
            Column::Float(v) => v.len(),
            Column::Double(v) => v.len(),
            Column::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append one value. The value's type must match the column's type.
    pub fn append(&mut self, value: Value) -> ConvoyResult<()> {
        match (self, value) {
            (Column::Bool(v), Value::Bool(x)) => v.push(x),
            (Column::Int(v), Value::Int(x)) => v.push(x),
            (Column::Long(v), Value::Long(x)) => v.push(x),
            (Column::Float(v), Value::Float(x)) => v.push(x),
            (Column::Double(v), Value::Double(x)) => v.push(x),
            (Column::Str(v), Value::Str(x)) => v.push(x),
            (col, value) => {
                return Err(ConvoyError::TypeMismatch {
                    expected: col.tuple_type().to_string(),
                    actual: value.tuple_type().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Read the value at `row`, or `None` past the end.
    pub fn get(&self, row: usize) -> Option<Value> {
        match self {
            Column::Bool(v) => v.get(row).copied().map(Value::Bool),
            Column::Int(v) => v.get(row).copied().map(Value::Int),
            Column::Long(v) => v.get(row).copied().map(Value::Long),
            Column::Float(v) => v.get(row).copied().map(Value::Float),
            Column::Double(v) => v.get(row).copied().map(Value::Double),
            Column::Str(v) => v.get(row).cloned().map(Value::Str),
        }
    }
}

/// Allocate one empty column per schema field.
pub fn allocate_columns(schema: &Schema, capacity: usize) -> Vec<Column> {
    schema
        .fields()
        .iter()
        .map(|f| Column::allocate(f.tuple_type(), capacity))
        .collect()
}
