//! Record-data sub-message codec (payload of the `/R` channel).
//!
//! Request, big-endian:
//!
//! ```text
//! ┌─────────┬────────────┬────────────┬──────────────────────────┐
//! │ u16 cmd │ u16 hw_id  │ u32 ident  │ command-specific tail    │
//! └─────────┴────────────┴────────────┴──────────────────────────┘
//!
//!   PollRead    (1)  -
//!   PollWrite   (2)  -
//!   ReadResult  (3)  u16 index, u32 length, u8[length] data
//!   WriteResult (4)  u16 index, u32 length
//! ```
//!
//! Reply: either the single fallback byte `0x00`, or
//!
//! ```text
//! ┌─────────┬─────────┬────────────┬────────────┬───────────────────┐
//! │ u8 0x01 │ u16 cmd │ u16 hw_id  │ u32 ident  │ tail-out          │
//! └─────────┴─────────┴────────────┴────────────┴───────────────────┘
//!
//!   PollRead    u16 index, u32 length
//!   PollWrite   u16 index, u32 length, u8[length] data
//!   ReadResult  -
//!   WriteResult -
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use simio_common::consts::{RECORD_FALLBACK_STATUS, RECORD_OK_STATUS};
use simio_common::record::SubscriptionKey;
use thiserror::Error;

/// Size of the request header (`cmd`, `hw_id`, `ident`).
pub const HEADER_LEN: usize = 8;

/// Errors decoding a record sub-message or reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordWireError {
    /// Fewer bytes than the message layout requires.
    #[error("Record message truncated: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes required for the next field
        needed: usize,
        /// Bytes left
        available: usize,
    },

    /// Command code outside 1..=4.
    #[error("Unknown record command {0}")]
    UnknownCommand(u16),

    /// Identifier does not fit in 16 bits.
    #[error("Record identifier {0:#x} exceeds 16 bits")]
    IdentifierOutOfRange(u32),

    /// Data length disagrees with the declared length.
    #[error("Record data length mismatch: declared {declared}, got {actual}")]
    LengthMismatch {
        /// Declared length
        declared: u32,
        /// Bytes present
        actual: usize,
    },

    /// Reply status byte is neither fallback nor ok.
    #[error("Unknown record reply status {0:#04x}")]
    UnknownStatus(u8),
}

/// Record sub-protocol command code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum RecordCommand {
    /// Peer asks for a pending read.
    PollRead = 1,
    /// Peer asks for a pending write.
    PollWrite = 2,
    /// Peer delivers read data.
    ReadResult = 3,
    /// Peer confirms a write.
    WriteResult = 4,
}

impl TryFrom<u16> for RecordCommand {
    type Error = RecordWireError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::PollRead),
            2 => Ok(Self::PollWrite),
            3 => Ok(Self::ReadResult),
            4 => Ok(Self::WriteResult),
            other => Err(RecordWireError::UnknownCommand(other)),
        }
    }
}

/// Decoded peer → correlator message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordMessage {
    /// Poll for the next pending read of `key`.
    PollRead(SubscriptionKey),
    /// Poll for the next pending write of `key`.
    PollWrite(SubscriptionKey),
    /// Read completed with `data`.
    ReadResult {
        /// Addressed sub-device
        key: SubscriptionKey,
        /// Record index
        index: u16,
        /// Delivered record bytes
        data: Vec<u8>,
    },
    /// Write completed.
    WriteResult {
        /// Addressed sub-device
        key: SubscriptionKey,
        /// Record index
        index: u16,
        /// Written length
        length: u32,
    },
}

impl RecordMessage {
    /// Command code of this message.
    pub fn command(&self) -> RecordCommand {
        match self {
            Self::PollRead(_) => RecordCommand::PollRead,
            Self::PollWrite(_) => RecordCommand::PollWrite,
            Self::ReadResult { .. } => RecordCommand::ReadResult,
            Self::WriteResult { .. } => RecordCommand::WriteResult,
        }
    }

    /// Addressed sub-device.
    pub fn key(&self) -> SubscriptionKey {
        match self {
            Self::PollRead(key) | Self::PollWrite(key) => *key,
            Self::ReadResult { key, .. } | Self::WriteResult { key, .. } => *key,
        }
    }

    /// Decode a `/R` payload.
    ///
    /// # Errors
    /// Any [`RecordWireError`] except `UnknownStatus`.
    pub fn decode(payload: &[u8]) -> Result<Self, RecordWireError> {
        let mut buf = payload;
        need(&buf, HEADER_LEN)?;
        let command = RecordCommand::try_from(buf.get_u16())?;
        let hardware_id = buf.get_u16();
        let identifier = buf.get_u32();
        let key = SubscriptionKey::from_wire(identifier, hardware_id)
            .ok_or(RecordWireError::IdentifierOutOfRange(identifier))?;

        match command {
            RecordCommand::PollRead => Ok(Self::PollRead(key)),
            RecordCommand::PollWrite => Ok(Self::PollWrite(key)),
            RecordCommand::ReadResult => {
                let (index, length) = get_index_length(&mut buf)?;
                if buf.remaining() as u64 != u64::from(length) {
                    return Err(RecordWireError::LengthMismatch {
                        declared: length,
                        actual: buf.remaining(),
                    });
                }
                Ok(Self::ReadResult {
                    key,
                    index,
                    data: buf.to_vec(),
                })
            }
            RecordCommand::WriteResult => {
                let (index, length) = get_index_length(&mut buf)?;
                Ok(Self::WriteResult { key, index, length })
            }
        }
    }

    /// Encode as the peer would send it.
    pub fn encode(&self) -> Bytes {
        let key = self.key();
        let mut buf = BytesMut::with_capacity(HEADER_LEN + 6);
        buf.put_u16(self.command() as u16);
        buf.put_u16(key.hardware_id());
        buf.put_u32(u32::from(key.identifier()));
        match self {
            Self::PollRead(_) | Self::PollWrite(_) => {}
            Self::ReadResult { index, data, .. } => {
                buf.put_u16(*index);
                buf.put_u32(data.len() as u32);
                buf.put_slice(data);
            }
            Self::WriteResult { index, length, .. } => {
                buf.put_u16(*index);
                buf.put_u32(*length);
            }
        }
        buf.freeze()
    }
}

/// Correlator → peer reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordReply {
    /// Nothing pending, or the request could not be completed.
    Fallback,
    /// Pending read handed to the peer.
    Read {
        /// Addressed sub-device
        key: SubscriptionKey,
        /// Record index
        index: u16,
        /// Requested length
        length: u32,
    },
    /// Pending write handed to the peer.
    Write {
        /// Addressed sub-device
        key: SubscriptionKey,
        /// Record index
        index: u16,
        /// Data to write
        data: Vec<u8>,
    },
    /// Result accepted.
    Ack {
        /// `ReadResult` or `WriteResult`
        command: RecordCommand,
        /// Addressed sub-device
        key: SubscriptionKey,
    },
}

impl RecordReply {
    /// Encode for the response frame.
    pub fn encode(&self) -> Bytes {
        let (command, key) = match self {
            Self::Fallback => return Bytes::from_static(&[RECORD_FALLBACK_STATUS]),
            Self::Read { key, .. } => (RecordCommand::PollRead, *key),
            Self::Write { key, .. } => (RecordCommand::PollWrite, *key),
            Self::Ack { command, key } => (*command, *key),
        };

        let mut buf = BytesMut::with_capacity(1 + HEADER_LEN + 6);
        buf.put_u8(RECORD_OK_STATUS);
        buf.put_u16(command as u16);
        buf.put_u16(key.hardware_id());
        buf.put_u32(u32::from(key.identifier()));
        match self {
            Self::Read { index, length, .. } => {
                buf.put_u16(*index);
                buf.put_u32(*length);
            }
            Self::Write { index, data, .. } => {
                buf.put_u16(*index);
                buf.put_u32(data.len() as u32);
                buf.put_slice(data);
            }
            Self::Fallback | Self::Ack { .. } => {}
        }
        buf.freeze()
    }

    /// Decode a reply payload (peer side).
    ///
    /// # Errors
    /// `UnknownStatus`, `Truncated`, `UnknownCommand`, `LengthMismatch`.
    pub fn decode(payload: &[u8]) -> Result<Self, RecordWireError> {
        let mut buf = payload;
        need(&buf, 1)?;
        match buf.get_u8() {
            RECORD_FALLBACK_STATUS => return Ok(Self::Fallback),
            RECORD_OK_STATUS => {}
            other => return Err(RecordWireError::UnknownStatus(other)),
        }

        need(&buf, HEADER_LEN)?;
        let command = RecordCommand::try_from(buf.get_u16())?;
        let hardware_id = buf.get_u16();
        let identifier = buf.get_u32();
        let key = SubscriptionKey::from_wire(identifier, hardware_id)
            .ok_or(RecordWireError::IdentifierOutOfRange(identifier))?;

        match command {
            RecordCommand::PollRead => {
                let (index, length) = get_index_length(&mut buf)?;
                Ok(Self::Read { key, index, length })
            }
            RecordCommand::PollWrite => {
                let (index, length) = get_index_length(&mut buf)?;
                if buf.remaining() as u64 != u64::from(length) {
                    return Err(RecordWireError::LengthMismatch {
                        declared: length,
                        actual: buf.remaining(),
                    });
                }
                Ok(Self::Write {
                    key,
                    index,
                    data: buf.to_vec(),
                })
            }
            RecordCommand::ReadResult | RecordCommand::WriteResult => Ok(Self::Ack { command, key }),
        }
    }
}

fn need(buf: &&[u8], n: usize) -> Result<(), RecordWireError> {
    if buf.remaining() < n {
        return Err(RecordWireError::Truncated {
            needed: n,
            available: buf.remaining(),
        });
    }
    Ok(())
}

fn get_index_length(buf: &mut &[u8]) -> Result<(u16, u32), RecordWireError> {
    need(buf, 6)?;
    Ok((buf.get_u16(), buf.get_u32()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_read_layout() {
        let key = SubscriptionKey::new(0x0102, 0x0304);
        let bytes = RecordMessage::PollRead(key).encode();
        assert_eq!(bytes.as_ref(), &[0, 1, 0x03, 0x04, 0, 0, 0x01, 0x02]);
        assert_eq!(RecordMessage::decode(&bytes).unwrap(), RecordMessage::PollRead(key));
    }

    #[test]
    fn read_reply_is_nine_plus_bytes() {
        let key = SubscriptionKey::new(7, 3);
        let reply = RecordReply::Read {
            key,
            index: 0x10,
            length: 4,
        }
        .encode();
        assert_eq!(reply.len(), 1 + HEADER_LEN + 6);
        assert_eq!(reply[0], RECORD_OK_STATUS);
        assert_eq!(&reply[1..3], &[0, 1]);
        assert_eq!(&reply[9..11], &[0, 0x10]);
        assert_eq!(&reply[11..15], &[0, 0, 0, 4]);
    }

    #[test]
    fn fallback_is_single_byte() {
        let reply = RecordReply::Fallback.encode();
        assert_eq!(reply.as_ref(), &[RECORD_FALLBACK_STATUS]);
        assert_eq!(RecordReply::decode(&reply).unwrap(), RecordReply::Fallback);
    }

    #[test]
    fn truncated_header() {
        assert_eq!(
            RecordMessage::decode(&[0, 1, 0]),
            Err(RecordWireError::Truncated {
                needed: HEADER_LEN,
                available: 3
            })
        );
    }

    #[test]
    fn unknown_command() {
        assert_eq!(
            RecordMessage::decode(&[0, 9, 0, 0, 0, 0, 0, 0]),
            Err(RecordWireError::UnknownCommand(9))
        );
    }

    #[test]
    fn identifier_above_16_bits_is_malformed() {
        assert_eq!(
            RecordMessage::decode(&[0, 1, 0, 0, 0, 1, 0, 0]),
            Err(RecordWireError::IdentifierOutOfRange(0x0001_0000))
        );
    }

    #[test]
    fn read_result_data_must_match_length() {
        let mut raw = RecordMessage::ReadResult {
            key: SubscriptionKey::new(1, 1),
            index: 2,
            data: vec![1, 2, 3],
        }
        .encode()
        .to_vec();
        raw.pop();
        assert_eq!(
            RecordMessage::decode(&raw),
            Err(RecordWireError::LengthMismatch {
                declared: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn write_reply_carries_data() {
        let key = SubscriptionKey::new(5, 6);
        let reply = RecordReply::Write {
            key,
            index: 1,
            data: vec![0xAA, 0xBB],
        };
        assert_eq!(RecordReply::decode(&reply.encode()).unwrap(), reply);
    }
}
