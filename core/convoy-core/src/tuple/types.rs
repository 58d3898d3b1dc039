//! Primitive types and runtime values.

use serde::{Deserialize, Serialize};

/// Primitive type of a single column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TupleType {
    Bool,
    Int,
    Long,
    Float,
    Double,
    Str,
}

impl std::fmt::Display for TupleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool => write!(f, "Bool"),
            Self::Int => write!(f, "Int"),
            Self::Long => write!(f, "Long"),
            Self::Float => write!(f, "Float"),
            Self::Double => write!(f, "Double"),
            Self::Str => write!(f, "Str"),
        }
    }
}

impl TupleType {
    /// All supported primitive types, for enumeration in tests.
    pub const ALL: &'static [TupleType] = &[
        TupleType::Bool,
        TupleType::Int,
        TupleType::Long,
        TupleType::Float,
        TupleType::Double,
        TupleType::Str,
    ];
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
}

impl Value {
    /// The primitive type this value belongs to.
    pub fn tuple_type(&self) -> TupleType {
        match self {
            Value::Bool(_) => TupleType::Bool,
            Value::Int(_) => TupleType::Int,
            Value::Long(_) => TupleType::Long,
            Value::Float(_) => TupleType::Float,
            Value::Double(_) => TupleType::Double,
            Value::Str(_) => TupleType::Str,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_reports_its_type() {
        assert_eq!(Value::Long(1).tuple_type(), TupleType::Long);
        assert_eq!(Value::from("a").tuple_type(), TupleType::Str);
        assert_eq!(Value::Bool(true).tuple_type(), TupleType::Bool);
    }

    #[test]
    fn type_display_names() {
        assert_eq!(TupleType::Double.to_string(), "Double");
        assert_eq!(TupleType::Str.to_string(), "Str");
    }

    #[test]
    fn all_types_enumerated() {
        assert_eq!(TupleType::ALL.len(), 6);
    }
}
