//! Worker/master IPC transport stack.
//!
//! Per-connection ordered processing stages shared by all four connection
//! roles (worker/master x server/client): zstd stream compression, length
//! prefix framing, bincode message decoding, protocol validation and
//! control-vs-data dispatch. Data messages cross the network/execution
//! thread boundary through a single hand-off queue.

pub mod connection;
pub mod frame;
pub mod membership;
pub mod message;
pub mod pipeline;

pub use connection::{IpcConnection, IpcServer};
pub use membership::WorkerRegistry;
pub use message::{
    ControlMessage, DataMessage, MASTER_ID, MessageWrapper, TransportMessage, WorkerId,
};
pub use pipeline::{
    ControlHandler, DecodePipeline, master_client_pipeline, master_server_pipeline,
    worker_client_pipeline, worker_server_pipeline,
};
