//! Connection-owning loops around the decode pipeline.
//!
//! One event-driven reader thread per active connection feeds the decode
//! pipeline; the encode path is the exact mirror of the decode path:
//! serialize, length-prefix, compress. Within one connection, message
//! order is preserved end-to-end.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use super::frame::frame;
use super::message::{
    ControlMessage, TransportMessage, WorkerId, batch_message, encode_message, eos_message,
};
use super::pipeline::DecodePipeline;
use crate::error::{ConvoyError, ConvoyResult};
use crate::tuple::TupleBatch;

/// zstd level for the wire. Level 3 is the speed/ratio default the rest of
/// the stack uses.
pub const COMPRESSION_LEVEL: i32 = 3;

/// Drive one connection's decode side to completion: decompress, then feed
/// every chunk through the staged pipeline. Protocol errors reset the
/// connection (the loop exits and the socket drops) instead of crashing
/// the process.
pub(crate) fn run_decode_loop<R: Read>(reader: R, mut pipeline: DecodePipeline) {
    let mut decoder = match zstd::stream::read::Decoder::new(reader) {
        Ok(d) => d,
        Err(e) => {
            warn!(error = %e, "failed to set up stream decompression");
            return;
        }
    };
    let mut buf = [0u8; 8192];
    loop {
        match decoder.read(&mut buf) {
            Ok(0) => {
                debug!(peer = ?pipeline.peer(), "connection closed by peer");
                pipeline.connection_closed();
                return;
            }
            Ok(n) => {
                if let Err(e) = pipeline.feed(&buf[..n]) {
                    match e {
                        ConvoyError::Interrupted(_) => {
                            debug!(peer = ?pipeline.peer(), "hand-off queue gone, dropping connection")
                        }
                        e => {
                            warn!(peer = ?pipeline.peer(), error = %e, "protocol error, resetting connection")
                        }
                    }
                    pipeline.connection_closed();
                    return;
                }
            }
            Err(e) => {
                debug!(peer = ?pipeline.peer(), error = %e, "read failed, dropping connection");
                pipeline.connection_closed();
                return;
            }
        }
    }
}

/// Listening endpoint. Accepts connections and gives each one a reader
/// thread running a freshly constructed pipeline.
pub struct IpcServer {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    accept_handle: Option<JoinHandle<()>>,
    /// One entry per accepted connection: a handle on its socket (so stop
    /// can unblock the reader) and the reader thread itself.
    readers: Arc<Mutex<Vec<(TcpStream, JoinHandle<()>)>>>,
}

impl IpcServer {
    /// Bind and start accepting. `make_pipeline` is invoked once per
    /// accepted connection (see the role constructors in
    /// [`pipeline`](super::pipeline)).
    #[instrument(skip(addr, make_pipeline))]
    pub fn bind<A, F>(addr: A, make_pipeline: F) -> ConvoyResult<Self>
    where
        A: ToSocketAddrs,
        F: Fn() -> DecodePipeline + Send + 'static,
    {
        let listener = TcpListener::bind(addr)?;
        // Non-blocking accept so the loop can observe shutdown.
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "listening");

        let shutdown = Arc::new(AtomicBool::new(false));
        let readers = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::clone(&shutdown);
        let reader_handles = Arc::clone(&readers);
        let accept_handle = thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, peer)) => {
                        debug!(%peer, "accepted connection");
                        if let Err(e) = stream.set_nonblocking(false) {
                            warn!(%peer, error = %e, "failed to configure socket");
                            continue;
                        }
                        let socket = match stream.try_clone() {
                            Ok(s) => s,
                            Err(e) => {
                                warn!(%peer, error = %e, "failed to clone socket");
                                continue;
                            }
                        };
                        let pipeline = make_pipeline();
                        let handle = thread::spawn(move || run_decode_loop(stream, pipeline));
                        reader_handles.lock().push((socket, handle));
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(10));
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        thread::sleep(Duration::from_millis(10));
                    }
                }
            }
        });

        Ok(Self {
            local_addr,
            shutdown,
            accept_handle: Some(accept_handle),
            readers,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting new connections, join the accept loop, then shut
    /// every remaining peer socket so its blocked reader wakes up, and
    /// join the readers. Returns once all connection threads are gone.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.join();
        }
        let readers: Vec<(TcpStream, JoinHandle<()>)> = std::mem::take(&mut *self.readers.lock());
        for (socket, handle) in readers {
            let _ = socket.shutdown(Shutdown::Both);
            let _ = handle.join();
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Outbound connection. Owns the encode path (serialize → length-prefix →
/// compress, flushed per message) and a reader thread running the decode
/// pipeline for the symmetric return direction.
pub struct IpcConnection {
    local_id: WorkerId,
    encoder: Option<zstd::stream::write::Encoder<'static, TcpStream>>,
    stream: TcpStream,
    reader: Option<JoinHandle<()>>,
}

impl IpcConnection {
    /// Connect and identify: the first message on every connection is
    /// `Connect` with the local identity.
    #[instrument(skip(addr, pipeline))]
    pub fn connect<A: ToSocketAddrs>(
        addr: A,
        local_id: WorkerId,
        pipeline: DecodePipeline,
    ) -> ConvoyResult<Self> {
        let stream = TcpStream::connect(addr)?;
        let read_half = stream.try_clone()?;
        let reader = thread::spawn(move || run_decode_loop(read_half, pipeline));

        let write_half = stream.try_clone()?;
        let encoder = zstd::stream::write::Encoder::new(write_half, COMPRESSION_LEVEL)?;
        let mut conn = Self {
            local_id,
            encoder: Some(encoder),
            stream,
            reader: Some(reader),
        };
        conn.send(&TransportMessage::Control(ControlMessage::Connect(
            local_id,
        )))?;
        debug!(id = %local_id, "connected");
        Ok(conn)
    }

    /// Encode and transmit one message, flushing the compressor so the
    /// peer's decoder can see the complete frame immediately.
    pub fn send(&mut self, message: &TransportMessage) -> ConvoyResult<()> {
        let encoder = self.encoder.as_mut().ok_or_else(|| {
            ConvoyError::InvalidOperation {
                message: "send on a closed connection".to_string(),
                context: format!("connection {}", self.local_id),
            }
        })?;
        let payload = encode_message(message)?;
        let framed = frame(&payload)?;
        encoder.write_all(&framed)?;
        encoder.flush()?;
        Ok(())
    }

    /// Ship one sealed batch as a data message.
    pub fn send_batch(&mut self, batch: TupleBatch) -> ConvoyResult<()> {
        self.send(&batch_message(batch))
    }

    /// Mark the end of the data stream on this connection.
    pub fn send_eos(&mut self) -> ConvoyResult<()> {
        self.send(&eos_message())
    }

    /// Orderly teardown: announce the disconnect, finish the compressed
    /// stream, close the socket and join the reader thread.
    pub fn close(mut self) -> ConvoyResult<()> {
        let id = self.local_id;
        self.send(&TransportMessage::Control(ControlMessage::Disconnect(id)))?;
        if let Some(encoder) = self.encoder.take() {
            encoder.finish()?;
        }
        let _ = self.stream.shutdown(Shutdown::Both);
        if let Some(reader) = self.reader.take() {
            reader
                .join()
                .map_err(|_| ConvoyError::Interrupted("connection reader panicked".to_string()))?;
        }
        Ok(())
    }
}

impl Drop for IpcConnection {
    fn drop(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            let _ = encoder.finish();
        }
        let _ = self.stream.shutdown(Shutdown::Both);
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::message::{DataMessage, MessageWrapper, normal_data_message};
    use crate::ipc::pipeline::worker_server_pipeline;
    use crate::tuple::Column;
    use std::io::Cursor;
    use std::sync::mpsc::{self, Receiver};

    /// Encode messages the way IpcConnection does, into a memory buffer.
    fn encode_stream(messages: &[TransportMessage]) -> Vec<u8> {
        let mut encoder =
            zstd::stream::write::Encoder::new(Vec::new(), COMPRESSION_LEVEL).unwrap();
        for message in messages {
            let framed = frame(&encode_message(message).unwrap()).unwrap();
            encoder.write_all(&framed).unwrap();
            encoder.flush().unwrap();
        }
        encoder.finish().unwrap()
    }

    fn decode_stream(bytes: Vec<u8>) -> Receiver<MessageWrapper> {
        let (tx, rx) = mpsc::channel();
        let pipeline = worker_server_pipeline(tx, Arc::new(AtomicBool::new(false)));
        run_decode_loop(Cursor::new(bytes), pipeline);
        rx
    }

    #[test]
    fn compressed_stream_round_trips_in_order() {
        let batches = vec![
            normal_data_message(vec![Column::Long(vec![1, 2, 3])], 3),
            normal_data_message(vec![Column::Long(vec![4])], 1),
            eos_message(),
        ];
        let mut messages = vec![TransportMessage::Control(ControlMessage::Connect(
            WorkerId(7),
        ))];
        messages.extend(batches.iter().cloned());

        let rx = decode_stream(encode_stream(&messages));
        let received: Vec<MessageWrapper> = rx.try_iter().collect();
        assert_eq!(received.len(), 3);
        for (wrapper, expected) in received.iter().zip(&batches) {
            assert_eq!(wrapper.sender, WorkerId(7));
            assert_eq!(&wrapper.message, expected);
        }
        assert!(matches!(
            received[2].message,
            TransportMessage::Data(DataMessage::Eos)
        ));
    }

    #[test]
    fn corrupt_stream_drops_connection_without_routing() {
        // Valid zstd stream whose decompressed payload is not a frame.
        let mut encoder =
            zstd::stream::write::Encoder::new(Vec::new(), COMPRESSION_LEVEL).unwrap();
        encoder.write_all(&u32::MAX.to_be_bytes()).unwrap();
        let bytes = encoder.finish().unwrap();

        let rx = decode_stream(bytes);
        assert!(rx.try_iter().next().is_none());
    }
}
