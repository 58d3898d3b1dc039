//! In-memory batch source — a leaf operator draining a prepared queue of
//! sealed batches.

use std::collections::VecDeque;
use std::sync::Arc;

use super::{Fetch, Operator, OperatorConfig, OperatorState, check_open, check_transition};
use crate::error::{ConvoyError, ConvoyResult};
use crate::tuple::{Schema, TupleBatch, TupleBatchBuffer};

/// Leaf operator producing a fixed sequence of batches, then EOS.
pub struct BatchSource {
    schema: Arc<Schema>,
    pending: VecDeque<TupleBatch>,
    state: OperatorState,
    eos: bool,
}

impl BatchSource {
    pub fn new(schema: Arc<Schema>, batches: Vec<TupleBatch>) -> ConvoyResult<Self> {
        for batch in &batches {
            if batch.schema() != &schema {
                return Err(ConvoyError::ProtocolViolation(
                    "source batch schema does not match the operator schema".to_string(),
                ));
            }
        }
        Ok(Self {
            schema,
            pending: batches.into(),
            state: OperatorState::Uninitialized,
            eos: false,
        })
    }

    /// Drain a buffer (including its partial tail) into a source.
    pub fn from_buffer(mut buffer: TupleBatchBuffer) -> Self {
        let schema = Arc::clone(buffer.schema());
        let mut pending = VecDeque::new();
        while let Some(batch) = buffer.pop_any() {
            pending.push_back(batch);
        }
        Self {
            schema,
            pending,
            state: OperatorState::Uninitialized,
            eos: false,
        }
    }

    fn next_batch(&mut self) -> ConvoyResult<Fetch> {
        check_open(self.state)?;
        if self.eos {
            return Ok(Fetch::Eos);
        }
        match self.pending.pop_front() {
            Some(batch) => Ok(Fetch::Batch(batch)),
            None => {
                self.eos = true;
                Ok(Fetch::Eos)
            }
        }
    }
}

impl Operator for BatchSource {
    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn children(&self) -> &[Box<dyn Operator>] {
        &[]
    }

    fn set_children(&mut self, children: Vec<Box<dyn Operator>>) -> ConvoyResult<()> {
        if children.is_empty() {
            return Ok(());
        }
        Err(ConvoyError::InvalidOperation {
            message: "batch source is a leaf".to_string(),
            context: format!("got {} children", children.len()),
        })
    }

    fn init(&mut self, _config: &OperatorConfig) -> ConvoyResult<()> {
        check_transition(self.state, OperatorState::Uninitialized, "init")?;
        self.state = OperatorState::Open;
        Ok(())
    }

    fn cleanup(&mut self) -> ConvoyResult<()> {
        check_transition(self.state, OperatorState::Open, "cleanup")?;
        self.state = OperatorState::Closed;
        Ok(())
    }

    fn fetch_next(&mut self) -> ConvoyResult<Fetch> {
        self.next_batch()
    }

    // All data is local, so the non-blocking path is the blocking path.
    fn fetch_next_ready(&mut self) -> ConvoyResult<Fetch> {
        self.next_batch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::{TupleType, Value};

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::from_pairs(&[("v", TupleType::Int)]))
    }

    fn source_with_rows(rows: usize, capacity: usize) -> BatchSource {
        let mut buffer = TupleBatchBuffer::with_capacity(schema(), capacity);
        for i in 0..rows {
            buffer.put(0, Value::Int(i as i32)).unwrap();
        }
        BatchSource::from_buffer(buffer)
    }

    #[test]
    fn drains_batches_then_sticky_eos() {
        let mut source = source_with_rows(5, 2);
        source.init(&OperatorConfig::new()).unwrap();

        let mut rows = 0;
        loop {
            match source.fetch_next().unwrap() {
                Fetch::Batch(batch) => rows += batch.num_rows(),
                Fetch::Eos => break,
                Fetch::Pending => unreachable!("blocking fetch returned pending"),
            }
        }
        assert_eq!(rows, 5);
        // EOS is sticky.
        assert!(matches!(source.fetch_next().unwrap(), Fetch::Eos));
        assert!(matches!(source.fetch_next_ready().unwrap(), Fetch::Eos));
        source.cleanup().unwrap();
    }

    #[test]
    fn fetch_requires_open() {
        let mut source = source_with_rows(1, 2);
        assert!(matches!(
            source.fetch_next(),
            Err(ConvoyError::InvalidOperation { .. })
        ));
        source.init(&OperatorConfig::new()).unwrap();
        source.cleanup().unwrap();
        assert!(matches!(
            source.fetch_next(),
            Err(ConvoyError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn double_init_is_a_usage_error() {
        let mut source = source_with_rows(1, 2);
        source.init(&OperatorConfig::new()).unwrap();
        assert!(matches!(
            source.init(&OperatorConfig::new()),
            Err(ConvoyError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn mismatched_batch_schema_rejected() {
        let other = Arc::new(Schema::from_pairs(&[("x", TupleType::Long)]));
        let mut buffer = TupleBatchBuffer::with_capacity(Arc::clone(&other), 2);
        buffer.put(0, Value::Long(1)).unwrap();
        let batch = buffer.pop_any().unwrap();
        assert!(BatchSource::new(schema(), vec![batch]).is_err());
    }
}
