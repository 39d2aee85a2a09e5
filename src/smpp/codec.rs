//! SMPP v3.4 codec primitives.
//!
//! Separates the wire format from the PDU domain models: the 16-byte header,
//! command identifiers and statuses, and the helpers for the fixed-size
//! C-octet string fields every PDU is built from.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use std::io::Cursor;
use thiserror::Error;

/// Maximum allowed PDU size to prevent memory exhaustion.
pub const MAX_PDU_SIZE: u32 = 65536;

/// SMPP v3.4 command identifiers used by the hub's client sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CommandId {
    BindReceiver = 0x0000_0001,
    BindTransmitter = 0x0000_0002,
    SubmitSm = 0x0000_0004,
    DeliverSm = 0x0000_0005,
    Unbind = 0x0000_0006,
    BindTransceiver = 0x0000_0009,
    EnquireLink = 0x0000_0015,
    GenericNack = 0x8000_0000,
    BindReceiverResp = 0x8000_0001,
    BindTransmitterResp = 0x8000_0002,
    SubmitSmResp = 0x8000_0004,
    DeliverSmResp = 0x8000_0005,
    UnbindResp = 0x8000_0006,
    BindTransceiverResp = 0x8000_0009,
    EnquireLinkResp = 0x8000_0015,
}

impl CommandId {
    /// Check if this command_id represents a response PDU.
    pub fn is_response(&self) -> bool {
        (*self as u32) & 0x8000_0000 != 0
    }
}

impl TryFrom<u32> for CommandId {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0x0000_0001 => Ok(Self::BindReceiver),
            0x0000_0002 => Ok(Self::BindTransmitter),
            0x0000_0004 => Ok(Self::SubmitSm),
            0x0000_0005 => Ok(Self::DeliverSm),
            0x0000_0006 => Ok(Self::Unbind),
            0x0000_0009 => Ok(Self::BindTransceiver),
            0x0000_0015 => Ok(Self::EnquireLink),
            0x8000_0000 => Ok(Self::GenericNack),
            0x8000_0001 => Ok(Self::BindReceiverResp),
            0x8000_0002 => Ok(Self::BindTransmitterResp),
            0x8000_0004 => Ok(Self::SubmitSmResp),
            0x8000_0005 => Ok(Self::DeliverSmResp),
            0x8000_0006 => Ok(Self::UnbindResp),
            0x8000_0009 => Ok(Self::BindTransceiverResp),
            0x8000_0015 => Ok(Self::EnquireLinkResp),
            other => Err(other),
        }
    }
}

/// SMPP v3.4 command status codes the hub classifies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandStatus {
    Ok,
    InvalidMsgLength,
    InvalidCommandLength,
    InvalidCommandId,
    InvalidBindStatus,
    AlreadyBound,
    SystemError,
    InvalidSourceAddress,
    InvalidDestAddress,
    InvalidMessageId,
    BindFailed,
    InvalidPassword,
    InvalidSystemId,
    MessageQueueFull,
    SubmitFailed,
    Throttled,
    /// Any status code without a dedicated variant
    Other(u32),
}

impl CommandStatus {
    pub fn as_u32(&self) -> u32 {
        match self {
            Self::Ok => 0x0000_0000,
            Self::InvalidMsgLength => 0x0000_0001,
            Self::InvalidCommandLength => 0x0000_0002,
            Self::InvalidCommandId => 0x0000_0003,
            Self::InvalidBindStatus => 0x0000_0004,
            Self::AlreadyBound => 0x0000_0005,
            Self::SystemError => 0x0000_0008,
            Self::InvalidSourceAddress => 0x0000_000A,
            Self::InvalidDestAddress => 0x0000_000B,
            Self::InvalidMessageId => 0x0000_000C,
            Self::BindFailed => 0x0000_000D,
            Self::InvalidPassword => 0x0000_000E,
            Self::InvalidSystemId => 0x0000_000F,
            Self::MessageQueueFull => 0x0000_0014,
            Self::SubmitFailed => 0x0000_0045,
            Self::Throttled => 0x0000_0058,
            Self::Other(v) => *v,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// SMPP name of this status, for error messages.
    pub fn name(&self) -> String {
        match self {
            Self::Ok => "ESME_ROK".into(),
            Self::InvalidMsgLength => "ESME_RINVMSGLEN".into(),
            Self::InvalidCommandLength => "ESME_RINVCMDLEN".into(),
            Self::InvalidCommandId => "ESME_RINVCMDID".into(),
            Self::InvalidBindStatus => "ESME_RINVBNDSTS".into(),
            Self::AlreadyBound => "ESME_RALYBND".into(),
            Self::SystemError => "ESME_RSYSERR".into(),
            Self::InvalidSourceAddress => "ESME_RINVSRCADR".into(),
            Self::InvalidDestAddress => "ESME_RINVDSTADR".into(),
            Self::InvalidMessageId => "ESME_RINVMSGID".into(),
            Self::BindFailed => "ESME_RBINDFAIL".into(),
            Self::InvalidPassword => "ESME_RINVPASWD".into(),
            Self::InvalidSystemId => "ESME_RINVSYSID".into(),
            Self::MessageQueueFull => "ESME_RMSGQFUL".into(),
            Self::SubmitFailed => "ESME_RSUBMITFAIL".into(),
            Self::Throttled => "ESME_RTHROTTLED".into(),
            Self::Other(v) => format!("{v:#010x}"),
        }
    }
}

impl From<u32> for CommandStatus {
    fn from(value: u32) -> Self {
        match value {
            0x0000_0000 => Self::Ok,
            0x0000_0001 => Self::InvalidMsgLength,
            0x0000_0002 => Self::InvalidCommandLength,
            0x0000_0003 => Self::InvalidCommandId,
            0x0000_0004 => Self::InvalidBindStatus,
            0x0000_0005 => Self::AlreadyBound,
            0x0000_0008 => Self::SystemError,
            0x0000_000A => Self::InvalidSourceAddress,
            0x0000_000B => Self::InvalidDestAddress,
            0x0000_000C => Self::InvalidMessageId,
            0x0000_000D => Self::BindFailed,
            0x0000_000E => Self::InvalidPassword,
            0x0000_000F => Self::InvalidSystemId,
            0x0000_0014 => Self::MessageQueueFull,
            0x0000_0045 => Self::SubmitFailed,
            0x0000_0058 => Self::Throttled,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// SMPP v3.4 PDU header (16 bytes, common to all PDUs).
#[derive(Debug, Clone, PartialEq)]
pub struct PduHeader {
    pub command_length: u32,
    pub command_id: CommandId,
    pub command_status: CommandStatus,
    pub sequence_number: u32,
}

impl PduHeader {
    pub const SIZE: usize = 16;

    /// Decode a PDU header from the buffer with validation.
    pub fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        if buf.remaining() < Self::SIZE {
            return Err(CodecError::Incomplete);
        }

        let command_length = buf.get_u32();
        let command_id_raw = buf.get_u32();
        let command_status = CommandStatus::from(buf.get_u32());
        let sequence_number = buf.get_u32();

        if command_length < Self::SIZE as u32 || command_length > MAX_PDU_SIZE {
            return Err(CodecError::InvalidPduLength {
                length: command_length,
                min: Self::SIZE as u32,
                max: MAX_PDU_SIZE,
            });
        }

        let command_id = CommandId::try_from(command_id_raw)
            .map_err(CodecError::UnknownCommandId)?;

        Ok(PduHeader {
            command_length,
            command_id,
            command_status,
            sequence_number,
        })
    }

    /// Encode the header; the length field is fixed up by [`finish_pdu`].
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.command_length);
        buf.put_u32(self.command_id as u32);
        buf.put_u32(self.command_status.as_u32());
        buf.put_u32(self.sequence_number);
    }
}

/// Codec errors with context for debugging.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("incomplete PDU: need more data")]
    Incomplete,

    #[error("unknown command_id: {0:#010x}")]
    UnknownCommandId(u32),

    #[error("invalid PDU length: {length}, must be {min}-{max}")]
    InvalidPduLength { length: u32, min: u32, max: u32 },

    #[error("field '{field}' truncated")]
    Truncated { field: &'static str },

    #[error("unexpected command_id: expected {expected:?}, got {actual:?}")]
    UnexpectedCommandId {
        expected: CommandId,
        actual: CommandId,
    },
}

/// Decode a fixed-maximum C-octet string field.
pub fn decode_cstring(
    buf: &mut Cursor<&[u8]>,
    max_len: usize,
    field: &'static str,
) -> Result<String, CodecError> {
    let mut bytes = Vec::new();

    loop {
        if buf.remaining() == 0 {
            return Err(CodecError::Truncated { field });
        }
        let b = buf.get_u8();
        if b == 0 {
            break;
        }
        if bytes.len() + 1 > max_len {
            return Err(CodecError::Truncated { field });
        }
        bytes.push(b);
    }

    // Non-UTF8 system ids are tolerated; the hub only logs them.
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Encode a C-octet string with its null terminator, truncating to fit.
pub fn encode_cstring(buf: &mut BytesMut, value: &str, max_len: usize) {
    let bytes = value.as_bytes();
    let actual_len = bytes.len().min(max_len.saturating_sub(1));
    buf.put_slice(&bytes[..actual_len]);
    buf.put_u8(0);
}

pub fn decode_u8(buf: &mut Cursor<&[u8]>, field: &'static str) -> Result<u8, CodecError> {
    if buf.remaining() < 1 {
        return Err(CodecError::Truncated { field });
    }
    Ok(buf.get_u8())
}

pub fn decode_u16(buf: &mut Cursor<&[u8]>, field: &'static str) -> Result<u16, CodecError> {
    if buf.remaining() < 2 {
        return Err(CodecError::Truncated { field });
    }
    Ok(buf.get_u16())
}

/// Start a PDU buffer with a header whose length is fixed up later.
pub fn start_pdu(
    command_id: CommandId,
    command_status: CommandStatus,
    sequence_number: u32,
) -> BytesMut {
    let mut buf = BytesMut::with_capacity(64);
    PduHeader {
        command_length: 0,
        command_id,
        command_status,
        sequence_number,
    }
    .encode(&mut buf);
    buf
}

/// Fix the command_length field and freeze the buffer.
pub fn finish_pdu(mut buf: BytesMut) -> Bytes {
    let length = buf.len() as u32;
    buf[0..4].copy_from_slice(&length.to_be_bytes());
    buf.freeze()
}
