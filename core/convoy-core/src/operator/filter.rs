//! Row-filtering operator.
//!
//! Pulls batches from its child, keeps the rows its predicate accepts and
//! re-accumulates them so downstream sees full batches again regardless of
//! the selectivity. The partial tail is only flushed once the child hits
//! end-of-stream.

use std::collections::VecDeque;
use std::sync::Arc;

use super::{Fetch, Operator, OperatorConfig, OperatorState, check_open, check_transition};
use crate::error::{ConvoyError, ConvoyResult};
use crate::predicate::Predicate;
use crate::tuple::{Schema, TupleBatch, TupleBatchBuffer};

pub struct Filter {
    child: Vec<Box<dyn Operator>>,
    predicate: Box<dyn Predicate>,
    buffer: TupleBatchBuffer,
    ready: VecDeque<TupleBatch>,
    state: OperatorState,
    eos: bool,
}

impl Filter {
    pub fn new(predicate: Box<dyn Predicate>, child: Box<dyn Operator>) -> Self {
        let schema = Arc::clone(child.schema());
        Self {
            child: vec![child],
            predicate,
            buffer: TupleBatchBuffer::new(schema),
            ready: VecDeque::new(),
            state: OperatorState::Uninitialized,
            eos: false,
        }
    }

    /// Run the predicate over one child batch, re-accumulating the rows it
    /// keeps and queueing every batch that fills up along the way.
    fn absorb(&mut self, batch: &TupleBatch) -> ConvoyResult<()> {
        let num_columns = batch.schema().num_columns();
        for row in 0..batch.num_rows() {
            if self.predicate.evaluate(batch, row)? {
                for column in 0..num_columns {
                    self.buffer.put(column, batch.value(column, row)?)?;
                }
            }
        }
        while let Some(full) = self.buffer.pop_filled() {
            self.ready.push_back(full);
        }
        Ok(())
    }

    /// Child stream ended: flush the partial tail and latch EOS.
    fn finish(&mut self) {
        while let Some(batch) = self.buffer.pop_any() {
            self.ready.push_back(batch);
        }
        self.eos = true;
    }

    fn emit(&mut self) -> Option<Fetch> {
        if let Some(batch) = self.ready.pop_front() {
            return Some(Fetch::Batch(batch));
        }
        if self.eos {
            return Some(Fetch::Eos);
        }
        None
    }
}

impl Operator for Filter {
    fn schema(&self) -> &Arc<Schema> {
        self.child[0].schema()
    }

    fn children(&self) -> &[Box<dyn Operator>] {
        &self.child
    }

    fn set_children(&mut self, children: Vec<Box<dyn Operator>>) -> ConvoyResult<()> {
        if children.len() != 1 {
            return Err(ConvoyError::InvalidOperation {
                message: "filter takes exactly one child".to_string(),
                context: format!("got {} children", children.len()),
            });
        }
        self.child = children;
        self.buffer = TupleBatchBuffer::new(Arc::clone(self.child[0].schema()));
        Ok(())
    }

    fn init(&mut self, config: &OperatorConfig) -> ConvoyResult<()> {
        check_transition(self.state, OperatorState::Uninitialized, "init")?;
        self.child[0].init(config)?;
        self.state = OperatorState::Open;
        Ok(())
    }

    fn cleanup(&mut self) -> ConvoyResult<()> {
        check_transition(self.state, OperatorState::Open, "cleanup")?;
        self.child[0].cleanup()?;
        self.state = OperatorState::Closed;
        Ok(())
    }

    fn fetch_next(&mut self) -> ConvoyResult<Fetch> {
        check_open(self.state)?;
        loop {
            if let Some(out) = self.emit() {
                return Ok(out);
            }
            match self.child[0].fetch_next()? {
                Fetch::Batch(batch) => self.absorb(&batch)?,
                Fetch::Eos => self.finish(),
                Fetch::Pending => {
                    return Err(ConvoyError::ProtocolViolation(
                        "blocking child fetch returned pending".to_string(),
                    ));
                }
            }
        }
    }

    fn fetch_next_ready(&mut self) -> ConvoyResult<Fetch> {
        check_open(self.state)?;
        loop {
            if let Some(out) = self.emit() {
                return Ok(out);
            }
            match self.child[0].fetch_next_ready()? {
                Fetch::Batch(batch) => self.absorb(&batch)?,
                Fetch::Eos => self.finish(),
                Fetch::Pending => return Ok(Fetch::Pending),
            }
        }
    }
}
