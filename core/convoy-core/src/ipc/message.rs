//! Wire envelope types and their bincode encoding.

use serde::{Deserialize, Serialize};

use crate::error::{ConvoyError, ConvoyResult};
use crate::tuple::{Column, TupleBatch};

/// Identity of a process in the cluster. The master is
/// [`MASTER_ID`]; workers get positive ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(pub u32);

/// Reserved id of the master process.
pub const MASTER_ID: WorkerId = WorkerId(0);

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Connection lifecycle and non-data signaling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMessage {
    /// First message on every connection: identifies the sender.
    Connect(WorkerId),
    /// Orderly teardown of the sending side.
    Disconnect(WorkerId),
    /// Master tells a worker to stop.
    Shutdown,
}

/// One batch's worth of sealed columns, or a stream end marker.
///
/// A normal message carries its explicit row count, so a final partial
/// batch is distinguishable from a full one on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataMessage {
    Normal { columns: Vec<Column>, num_rows: usize },
    Eos,
}

/// Tagged wire envelope: control or data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransportMessage {
    Control(ControlMessage),
    Data(DataMessage),
}

/// A decoded message paired with the identity of the connection it arrived
/// on; the unit placed on the hand-off queue between network and execution
/// threads.
#[derive(Debug)]
pub struct MessageWrapper {
    pub sender: WorkerId,
    pub message: TransportMessage,
}

/// Wrap sealed columns into a data message.
pub fn normal_data_message(columns: Vec<Column>, num_rows: usize) -> TransportMessage {
    TransportMessage::Data(DataMessage::Normal { columns, num_rows })
}

/// Stream end marker.
pub fn eos_message() -> TransportMessage {
    TransportMessage::Data(DataMessage::Eos)
}

/// Convert a sealed batch into its wire form.
pub fn batch_message(batch: TupleBatch) -> TransportMessage {
    let (_, columns, num_rows) = batch.into_parts();
    normal_data_message(columns, num_rows)
}

/// Serialize one message for framing.
pub fn encode_message(message: &TransportMessage) -> ConvoyResult<Vec<u8>> {
    Ok(bincode::serialize(message)?)
}

/// Decode one complete frame into a structured message. Undecodable input
/// is malformed by definition, not a serialization bug on our side.
pub fn decode_message(frame: &[u8]) -> ConvoyResult<TransportMessage> {
    bincode::deserialize(frame)
        .map_err(|e| ConvoyError::MalformedMessage(format!("undecodable frame: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::TupleType;

    #[test]
    fn control_messages_round_trip() {
        for msg in [
            TransportMessage::Control(ControlMessage::Connect(WorkerId(3))),
            TransportMessage::Control(ControlMessage::Disconnect(WorkerId(3))),
            TransportMessage::Control(ControlMessage::Shutdown),
            eos_message(),
        ] {
            let bytes = encode_message(&msg).unwrap();
            assert_eq!(decode_message(&bytes).unwrap(), msg);
        }
    }

    #[test]
    fn data_round_trip_covers_every_primitive_type() {
        let columns = vec![
            Column::Bool(vec![true, false]),
            Column::Int(vec![-1, 2]),
            Column::Long(vec![i64::MIN, i64::MAX]),
            Column::Float(vec![0.5, -2.25]),
            Column::Double(vec![1e300, -0.0]),
            Column::Str(vec!["".into(), "héllo".into()]),
        ];
        assert_eq!(columns.len(), TupleType::ALL.len());

        let msg = normal_data_message(columns.clone(), 2);
        let decoded = decode_message(&encode_message(&msg).unwrap()).unwrap();
        match decoded {
            TransportMessage::Data(DataMessage::Normal {
                columns: got,
                num_rows,
            }) => {
                assert_eq!(num_rows, 2);
                assert_eq!(got, columns);
            }
            other => panic!("expected data message, got {other:?}"),
        }
    }

    #[test]
    fn partial_batch_keeps_its_row_count() {
        let msg = normal_data_message(vec![Column::Long(vec![7])], 1);
        let decoded = decode_message(&encode_message(&msg).unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn garbage_is_malformed() {
        let err = decode_message(&[0xff; 16]).unwrap_err();
        assert!(matches!(err, ConvoyError::MalformedMessage(_)));
    }
}
