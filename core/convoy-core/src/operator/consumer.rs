//! Network-fed source — pulls data messages off the hand-off queue and
//! rebuilds them into batches.
//!
//! This is the execution side of the network/execution thread boundary:
//! reader threads push [`MessageWrapper`]s, one `Consumer` pulls them.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, TryRecvError};

use tracing::debug;

use super::{Fetch, Operator, OperatorConfig, OperatorState, check_open, check_transition};
use crate::error::{ConvoyError, ConvoyResult};
use crate::ipc::message::{DataMessage, MessageWrapper, TransportMessage, WorkerId};
use crate::tuple::{Schema, TupleBatch};

/// Leaf operator consuming data messages from the hand-off queue.
///
/// The queue may be fed by several connections; end-of-stream is tracked
/// per sender, and the operator only latches sticky EOS once every
/// expected stream has ended (a lone sender's EOS must not swallow the
/// other workers' remaining batches). [`Consumer::new`] expects a single
/// stream; use [`Consumer::with_streams`] for fan-in. The queue closing
/// underneath us is an orderly shutdown, not a fault, and also yields
/// sticky EOS.
pub struct Consumer {
    schema: Arc<Schema>,
    receiver: Receiver<MessageWrapper>,
    expected_streams: usize,
    eos_seen: HashSet<WorkerId>,
    state: OperatorState,
    eos: bool,
}

impl Consumer {
    /// Consumer over a single data stream.
    pub fn new(schema: Arc<Schema>, receiver: Receiver<MessageWrapper>) -> Self {
        Self::with_streams(schema, receiver, 1)
    }

    /// Consumer over `expected_streams` fan-in senders (must be > 0); EOS
    /// is reported once each distinct sender has sent its end marker.
    pub fn with_streams(
        schema: Arc<Schema>,
        receiver: Receiver<MessageWrapper>,
        expected_streams: usize,
    ) -> Self {
        assert!(expected_streams > 0, "consumer needs at least one stream");
        Self {
            schema,
            receiver,
            expected_streams,
            eos_seen: HashSet::new(),
            state: OperatorState::Uninitialized,
            eos: false,
        }
    }

    /// Rebuild a batch from decoded columns, revalidating against this
    /// operator's schema (the validation stage is schema-agnostic).
    /// `Ok(None)` means a stream ended but others are still live.
    fn absorb(&mut self, wrapper: MessageWrapper) -> ConvoyResult<Option<Fetch>> {
        match wrapper.message {
            TransportMessage::Data(DataMessage::Normal { columns, num_rows }) => {
                let batch = TupleBatch::new(Arc::clone(&self.schema), columns, num_rows)?;
                Ok(Some(Fetch::Batch(batch)))
            }
            TransportMessage::Data(DataMessage::Eos) => {
                self.eos_seen.insert(wrapper.sender);
                debug!(
                    sender = %wrapper.sender,
                    ended = self.eos_seen.len(),
                    expected = self.expected_streams,
                    "stream end"
                );
                if self.eos_seen.len() >= self.expected_streams {
                    self.eos = true;
                    Ok(Some(Fetch::Eos))
                } else {
                    Ok(None)
                }
            }
            TransportMessage::Control(_) => Err(ConvoyError::MalformedMessage(
                "control message on the data hand-off queue".to_string(),
            )),
        }
    }
}

impl Operator for Consumer {
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
            message: "consumer is a leaf".to_string(),
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
        check_open(self.state)?;
        loop {
            if self.eos {
                return Ok(Fetch::Eos);
            }
            match self.receiver.recv() {
                Ok(wrapper) => {
                    if let Some(fetch) = self.absorb(wrapper)? {
                        return Ok(fetch);
                    }
                }
                // All senders dropped: the network side shut down.
                Err(_) => {
                    self.eos = true;
                    return Ok(Fetch::Eos);
                }
            }
        }
    }

    fn fetch_next_ready(&mut self) -> ConvoyResult<Fetch> {
        check_open(self.state)?;
        loop {
            if self.eos {
                return Ok(Fetch::Eos);
            }
            match self.receiver.try_recv() {
                Ok(wrapper) => {
                    if let Some(fetch) = self.absorb(wrapper)? {
                        return Ok(fetch);
                    }
                }
                Err(TryRecvError::Empty) => return Ok(Fetch::Pending),
                Err(TryRecvError::Disconnected) => {
                    self.eos = true;
                    return Ok(Fetch::Eos);
                }
            }
        }
    }
}
