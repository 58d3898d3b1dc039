//! Name-keyed predicate construction.
//!
//! Plans arriving over the wire name predicates by string and carry their
//! arguments as JSON; the registry maps names to constructors so new
//! predicates can be added without touching the deserialization path.

use std::collections::HashMap;

use serde_json::Value as Json;

use super::{EqualsPredicate, NotEqualsPredicate, Predicate};
use crate::error::{ConvoyError, ConvoyResult};
use crate::tuple::Value;

type Builder = fn(&Json) -> ConvoyResult<Box<dyn Predicate>>;

pub struct PredicateRegistry {
    builders: HashMap<String, Builder>,
}

impl PredicateRegistry {
    /// Empty registry, no names known.
    pub fn new() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// Registry preloaded with the built-in comparison predicates.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register("equals", |config| {
                let (column, value) = column_value_args(config)?;
                Ok(Box::new(EqualsPredicate::new(column, value)))
            })
            .expect("builtin names are unique");
        registry
            .register("not_equals", |config| {
                let (column, value) = column_value_args(config)?;
                Ok(Box::new(NotEqualsPredicate::new(column, value)))
            })
            .expect("builtin names are unique");
        registry
    }

    /// Register a constructor under `name`. Names are claimed once.
    pub fn register(&mut self, name: &str, builder: Builder) -> ConvoyResult<()> {
        if self.builders.contains_key(name) {
            return Err(ConvoyError::InvalidArguments(format!(
                "predicate name already registered: {name}"
            )));
        }
        self.builders.insert(name.to_string(), builder);
        Ok(())
    }

    /// Build a predicate by name from its JSON arguments.
    pub fn construct(&self, name: &str, config: &Json) -> ConvoyResult<Box<dyn Predicate>> {
        match self.builders.get(name) {
            Some(builder) => builder(config),
            None => Err(ConvoyError::UnknownPredicate(name.to_string())),
        }
    }
}

impl Default for PredicateRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Pull `{"column": n, "value": v}` out of a JSON argument object.
fn column_value_args(config: &Json) -> ConvoyResult<(usize, Value)> {
    let column = config
        .get("column")
        .and_then(Json::as_u64)
        .ok_or_else(|| ConvoyError::InvalidArguments("missing integer field: column".to_string()))?
        as usize;
    let value = match config.get("value") {
        Some(Json::Bool(b)) => Value::Bool(*b),
        Some(Json::Number(n)) if n.is_i64() => Value::Long(n.as_i64().unwrap_or_default()),
        Some(Json::Number(n)) => Value::Double(n.as_f64().unwrap_or_default()),
        Some(Json::String(s)) => Value::Str(s.clone()),
        Some(other) => {
            return Err(ConvoyError::InvalidArguments(format!(
                "unsupported value literal: {other}"
            )));
        }
        None => {
            return Err(ConvoyError::InvalidArguments(
                "missing field: value".to_string(),
            ));
        }
    };
    Ok((column, value))
}
