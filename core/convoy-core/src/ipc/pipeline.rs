//! The ordered decode pipeline shared by all connection roles.
//!
//! Stages run strictly in order per connection: deframe, decode, validate,
//! route. Decompression sits in front of the pipeline at the socket (see
//! [`connection`](super::connection)); validation rejects malformed and
//! out-of-protocol input before it reaches any stateful handler. A
//! "client" pipeline is identical to the corresponding "server" pipeline —
//! the protocol is symmetric once a connection is up, only the control
//! semantics differ by role.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;

use tracing::{debug, info, warn};

use super::frame::Deframer;
use super::membership::WorkerRegistry;
use super::message::{
    ControlMessage, DataMessage, MessageWrapper, TransportMessage, WorkerId, decode_message,
};
use crate::error::{ConvoyError, ConvoyResult};

/// Role-specific handling of control messages. Data never reaches a
/// control handler.
pub trait ControlHandler: Send {
    fn handle(&mut self, sender: WorkerId, message: &ControlMessage) -> ConvoyResult<()>;
}

/// Control handling on a worker process: remembers a shutdown request and
/// logs the rest.
pub struct WorkerControlHandler {
    shutdown: Arc<AtomicBool>,
}

impl WorkerControlHandler {
    pub fn new(shutdown: Arc<AtomicBool>) -> Self {
        Self { shutdown }
    }
}

impl ControlHandler for WorkerControlHandler {
    fn handle(&mut self, sender: WorkerId, message: &ControlMessage) -> ConvoyResult<()> {
        match message {
            ControlMessage::Connect(id) => {
                debug!(peer = %id, "peer connected");
            }
            ControlMessage::Disconnect(id) => {
                debug!(peer = %id, "peer disconnected");
            }
            ControlMessage::Shutdown => {
                info!(from = %sender, "shutdown requested");
                self.shutdown.store(true, Ordering::SeqCst);
            }
        }
        Ok(())
    }
}

/// Control handling on the master process: maintains the alive-worker
/// registry.
pub struct MasterControlHandler {
    registry: Arc<WorkerRegistry>,
}

impl MasterControlHandler {
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self { registry }
    }
}

impl ControlHandler for MasterControlHandler {
    fn handle(&mut self, sender: WorkerId, message: &ControlMessage) -> ConvoyResult<()> {
        match message {
            ControlMessage::Connect(id) => {
                info!(worker = %id, "worker alive");
                self.registry.register(*id);
            }
            ControlMessage::Disconnect(id) => {
                info!(worker = %id, "worker gone");
                self.registry.unregister(*id);
            }
            ControlMessage::Shutdown => {
                // Workers do not shut the master down.
                return Err(ConvoyError::MalformedMessage(format!(
                    "shutdown sent to master by {sender}"
                )));
            }
        }
        Ok(())
    }
}

/// Structural checks against protocol expectations, independent of any
/// schema knowledge.
pub struct MessageValidator;

impl MessageValidator {
    pub fn validate(&self, message: &TransportMessage) -> ConvoyResult<()> {
        match message {
            TransportMessage::Data(DataMessage::Normal { columns, num_rows }) => {
                if columns.is_empty() {
                    return Err(ConvoyError::MalformedMessage(
                        "data message with no columns".to_string(),
                    ));
                }
                if *num_rows == 0 {
                    return Err(ConvoyError::MalformedMessage(
                        "data message with zero rows".to_string(),
                    ));
                }
                for (i, col) in columns.iter().enumerate() {
                    if col.len() != *num_rows {
                        return Err(ConvoyError::MalformedMessage(format!(
                            "column {i} holds {} values but the message claims {num_rows} rows",
                            col.len()
                        )));
                    }
                }
                Ok(())
            }
            TransportMessage::Data(DataMessage::Eos) | TransportMessage::Control(_) => Ok(()),
        }
    }
}

/// Final stage: control messages to the role's handler, data messages
/// wrapped with the sender identity onto the hand-off queue.
pub struct MessageRouter {
    peer: Option<WorkerId>,
    control: Box<dyn ControlHandler>,
    queue: Sender<MessageWrapper>,
}

impl MessageRouter {
    pub fn new(control: Box<dyn ControlHandler>, queue: Sender<MessageWrapper>) -> Self {
        Self {
            peer: None,
            control,
            queue,
        }
    }

    /// Identity learned from the connection's `Connect` message.
    pub fn peer(&self) -> Option<WorkerId> {
        self.peer
    }

    pub fn route(&mut self, message: TransportMessage) -> ConvoyResult<()> {
        match message {
            TransportMessage::Control(ctrl) => {
                let sender = match (&ctrl, self.peer) {
                    (ControlMessage::Connect(id), None) => {
                        self.peer = Some(*id);
                        *id
                    }
                    (ControlMessage::Connect(id), Some(existing)) => {
                        return Err(ConvoyError::MalformedMessage(format!(
                            "connection already identified as {existing}, got second connect from {id}"
                        )));
                    }
                    (_, Some(id)) => id,
                    (_, None) => {
                        return Err(ConvoyError::MalformedMessage(
                            "control message before connect".to_string(),
                        ));
                    }
                };
                self.control.handle(sender, &ctrl)
            }
            TransportMessage::Data(data) => {
                let sender = self.peer.ok_or_else(|| {
                    ConvoyError::MalformedMessage("data message before connect".to_string())
                })?;
                self.queue
                    .send(MessageWrapper {
                        sender,
                        message: TransportMessage::Data(data),
                    })
                    .map_err(|_| {
                        ConvoyError::Interrupted("hand-off queue consumer is gone".to_string())
                    })
            }
        }
    }
}

/// Per-connection decode pipeline: deframe → decode → validate → route.
/// Constructed once per connection, not via a framework registry.
pub struct DecodePipeline {
    deframer: Deframer,
    validator: MessageValidator,
    router: MessageRouter,
}

impl DecodePipeline {
    pub fn new(control: Box<dyn ControlHandler>, queue: Sender<MessageWrapper>) -> Self {
        Self {
            deframer: Deframer::new(),
            validator: MessageValidator,
            router: MessageRouter::new(control, queue),
        }
    }

    /// Push one chunk of the decompressed stream through every stage, in
    /// order. Errors mean the connection must be reset.
    pub fn feed(&mut self, chunk: &[u8]) -> ConvoyResult<()> {
        self.deframer.push(chunk);
        while let Some(frame) = self.deframer.next_frame()? {
            let message = decode_message(&frame)?;
            self.validator.validate(&message)?;
            self.router.route(message)?;
        }
        Ok(())
    }

    pub fn peer(&self) -> Option<WorkerId> {
        self.router.peer()
    }

    /// Invoked when the underlying connection goes away, cleanly or not.
    /// Synthesizes a disconnect so role state (e.g. the alive-worker
    /// registry) does not leak dead peers.
    pub fn connection_closed(&mut self) {
        if let Some(peer) = self.router.peer.take() {
            let msg = ControlMessage::Disconnect(peer);
            if let Err(e) = self.router.control.handle(peer, &msg) {
                warn!(peer = %peer, error = %e, "disconnect handling failed");
            }
        }
    }
}

/// Pipeline for a worker accepting connections.
pub fn worker_server_pipeline(
    queue: Sender<MessageWrapper>,
    shutdown: Arc<AtomicBool>,
) -> DecodePipeline {
    DecodePipeline::new(Box::new(WorkerControlHandler::new(shutdown)), queue)
}

/// Pipeline for a worker's outbound connections; the stage list is the
/// server's, the protocol being symmetric.
pub fn worker_client_pipeline(
    queue: Sender<MessageWrapper>,
    shutdown: Arc<AtomicBool>,
) -> DecodePipeline {
    worker_server_pipeline(queue, shutdown)
}

/// Pipeline for the master accepting connections.
pub fn master_server_pipeline(
    queue: Sender<MessageWrapper>,
    registry: Arc<WorkerRegistry>,
) -> DecodePipeline {
    DecodePipeline::new(Box::new(MasterControlHandler::new(registry)), queue)
}

/// Pipeline for the master's outbound connections; identical stage list.
pub fn master_client_pipeline(
    queue: Sender<MessageWrapper>,
    registry: Arc<WorkerRegistry>,
) -> DecodePipeline {
    master_server_pipeline(queue, registry)
}
