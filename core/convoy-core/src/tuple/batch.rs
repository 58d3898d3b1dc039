//! Sealed batches — the immutable unit of data transfer.

use std::sync::Arc;

use super::column::Column;
use super::schema::Schema;
use super::types::Value;
use crate::error::{ConvoyError, ConvoyResult};

/// An immutable chunk of columnar rows: a schema reference, one sealed
/// column per field and an explicit row count. Only the last batch of a
/// stream may hold fewer rows than the producing buffer's capacity.
///
/// Safe to share across threads.
#[derive(Debug, Clone)]
pub struct TupleBatch {
    schema: Arc<Schema>,
    columns: Vec<Column>,
    num_rows: usize,
}

impl TupleBatch {
    /// Build a batch, validating that the columns match the schema and hold
    /// at least `num_rows` values each.
    pub fn new(schema: Arc<Schema>, columns: Vec<Column>, num_rows: usize) -> ConvoyResult<Self> {
        if columns.len() != schema.num_columns() {
            return Err(ConvoyError::ProtocolViolation(format!(
                "batch has {} columns, schema expects {}",
                columns.len(),
                schema.num_columns()
            )));
        }
        for (i, col) in columns.iter().enumerate() {
            if col.tuple_type() != schema.column_type(i) {
                return Err(ConvoyError::TypeMismatch {
                    expected: schema.column_type(i).to_string(),
                    actual: col.tuple_type().to_string(),
                });
            }
            if col.len() < num_rows {
                return Err(ConvoyError::ProtocolViolation(format!(
                    "column {} holds {} values, batch claims {} rows",
                    i,
                    col.len(),
                    num_rows
                )));
            }
        }
        Ok(Self {
            schema,
            columns,
            num_rows,
        })
    }

    /// Internal constructor for columns the buffer has already validated.
    pub(crate) fn sealed(schema: Arc<Schema>, columns: Vec<Column>, num_rows: usize) -> Self {
        Self {
            schema,
            columns,
            num_rows,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Read one cell. Both indices are bounds-checked, so a bad column
    /// from untrusted input (e.g. a predicate configuration) comes back as
    /// a catchable error rather than aborting the pull thread.
    pub fn value(&self, column: usize, row: usize) -> ConvoyResult<Value> {
        if column >= self.columns.len() {
            return Err(ConvoyError::IndexOutOfBounds {
                index: column,
                len: self.columns.len(),
            });
        }
        if row >= self.num_rows {
            return Err(ConvoyError::IndexOutOfBounds {
                index: row,
                len: self.num_rows,
            });
        }
        self.columns[column].get(row).ok_or_else(|| {
            ConvoyError::ProtocolViolation(format!(
                "column {column} shorter than batch row count {}",
                self.num_rows
            ))
        })
    }

    /// Decompose into raw parts for wire encoding.
    pub fn into_parts(self) -> (Arc<Schema>, Vec<Column>, usize) {
        (self.schema, self.columns, self.num_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::types::TupleType;

    fn id_name_schema() -> Arc<Schema> {
        Arc::new(Schema::from_pairs(&[
            ("id", TupleType::Long),
            ("name", TupleType::Str),
        ]))
    }

    #[test]
    fn batch_exposes_values() {
        let schema = id_name_schema();
        let columns = vec![
            Column::Long(vec![1, 2]),
            Column::Str(vec!["a".into(), "b".into()]),
        ];
        let batch = TupleBatch::new(schema, columns, 2).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.value(0, 1).unwrap(), Value::Long(2));
        assert_eq!(batch.value(1, 0).unwrap(), Value::Str("a".into()));
    }

    #[test]
    fn row_past_count_is_out_of_bounds() {
        let schema = id_name_schema();
        let columns = vec![Column::Long(vec![1]), Column::Str(vec!["a".into()])];
        let batch = TupleBatch::new(schema, columns, 1).unwrap();
        let err = batch.value(0, 1).unwrap_err();
        assert!(matches!(err, ConvoyError::IndexOutOfBounds { index: 1, len: 1 }));
    }

    #[test]
    fn column_past_count_is_out_of_bounds_not_a_panic() {
        let schema = id_name_schema();
        let columns = vec![
            Column::Long(vec![1, 2]),
            Column::Str(vec!["a".into(), "b".into()]),
        ];
        let batch = TupleBatch::new(schema, columns, 2).unwrap();
        let err = batch.value(9, 0).unwrap_err();
        assert!(matches!(err, ConvoyError::IndexOutOfBounds { index: 9, len: 2 }));
    }

    #[test]
    fn column_count_mismatch_rejected() {
        let schema = id_name_schema();
        let err = TupleBatch::new(schema, vec![Column::Long(vec![1])], 1).unwrap_err();
        assert!(matches!(err, ConvoyError::ProtocolViolation(_)));
    }

    #[test]
    fn short_column_rejected() {
        let schema = id_name_schema();
        let columns = vec![Column::Long(vec![1]), Column::Str(vec![])];
        let err = TupleBatch::new(schema, columns, 1).unwrap_err();
        assert!(matches!(err, ConvoyError::ProtocolViolation(_)));
    }
}
