//! Length-prefixed framing over the (already decompressed) byte stream.

use crate::error::{ConvoyError, ConvoyResult};

/// Upper bound on a single frame. Anything larger is malformed input, not
/// a legitimate batch.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Prepend the 4-byte big-endian length prefix.
pub fn frame(payload: &[u8]) -> ConvoyResult<Vec<u8>> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(ConvoyError::ProtocolViolation(format!(
            "frame of {} bytes exceeds the {} byte limit",
            payload.len(),
            MAX_FRAME_LEN
        )));
    }
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Incremental deframer: fed arbitrary chunks of the decompressed stream,
/// yields complete frames in order. Small-state, one per connection.
#[derive(Default)]
pub struct Deframer {
    buf: Vec<u8>,
}

impl Deframer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer another chunk from the stream.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Strip and return the next complete frame, `None` until one is whole.
    pub fn next_frame(&mut self) -> ConvoyResult<Option<Vec<u8>>> {
        if self.buf.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if len > MAX_FRAME_LEN {
            return Err(ConvoyError::MalformedMessage(format!(
                "declared frame length {len} exceeds the {MAX_FRAME_LEN} byte limit"
            )));
        }
        if self.buf.len() < 4 + len {
            return Ok(None);
        }
        let frame = self.buf[4..4 + len].to_vec();
        self.buf.drain(..4 + len);
        Ok(Some(frame))
    }

    /// Bytes buffered but not yet yielded.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_round_trip_through_split_chunks() {
        let a = frame(b"hello").unwrap();
        let b = frame(b"").unwrap();
        let c = frame(&[7u8; 300]).unwrap();
        let stream: Vec<u8> = [a, b, c].concat();

        let mut deframer = Deframer::new();
        let mut frames = Vec::new();
        // Feed one byte at a time to exercise partial-prefix handling.
        for byte in stream {
            deframer.push(&[byte]);
            while let Some(f) = deframer.next_frame().unwrap() {
                frames.push(f);
            }
        }
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], b"hello");
        assert!(frames[1].is_empty());
        assert_eq!(frames[2], vec![7u8; 300]);
        assert_eq!(deframer.pending_len(), 0);
    }

    #[test]
    fn oversized_declared_length_is_malformed() {
        let mut deframer = Deframer::new();
        deframer.push(&u32::MAX.to_be_bytes());
        let err = deframer.next_frame().unwrap_err();
        assert!(matches!(err, ConvoyError::MalformedMessage(_)));
    }

    #[test]
    fn oversized_payload_rejected_on_encode() {
        let payload = vec![0u8; MAX_FRAME_LEN + 1];
        assert!(frame(&payload).is_err());
    }
}
