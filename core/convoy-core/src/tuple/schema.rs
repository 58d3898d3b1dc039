//! Tuple schemas — the immutable description of a batch's shape.

use serde::{Deserialize, Serialize};

use super::types::TupleType;

/// One named, typed column position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    name: String,
    ty: TupleType,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: TupleType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tuple_type(&self) -> TupleType {
        self.ty
    }
}

/// Ordered sequence of fields. Immutable once constructed; shared via
/// `Arc<Schema>` wherever batches of this shape exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Convenience constructor from parallel `(name, type)` pairs.
    pub fn from_pairs(pairs: &[(&str, TupleType)]) -> Self {
        Self::new(
            pairs
                .iter()
                .map(|(name, ty)| Field::new(*name, *ty))
                .collect(),
        )
    }

    pub fn num_columns(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, index: usize) -> &Field {
        &self.fields[index]
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn column_type(&self, index: usize) -> TupleType {
        self.fields[index].ty
    }

    pub fn column_name(&self, index: usize) -> &str {
        &self.fields[index].name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_shape() {
        let schema = Schema::from_pairs(&[("id", TupleType::Long), ("name", TupleType::Str)]);
        assert_eq!(schema.num_columns(), 2);
        assert_eq!(schema.column_name(0), "id");
        assert_eq!(schema.column_type(1), TupleType::Str);
    }

    #[test]
    fn schemas_compare_structurally() {
        let a = Schema::from_pairs(&[("x", TupleType::Int)]);
        let b = Schema::from_pairs(&[("x", TupleType::Int)]);
        let c = Schema::from_pairs(&[("x", TupleType::Long)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
