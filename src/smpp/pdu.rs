//! SMPP v3.4 PDU domain models.
//!
//! Covers the client-session surface the hub speaks: bind_* and responses,
//! submit_sm/submit_sm_resp, deliver_sm/deliver_sm_resp, enquire_link,
//! unbind and generic_nack. Each PDU encodes itself after a header whose
//! length field is fixed up at the end.

use bytes::{Buf, Bytes, BytesMut};
use std::io::Cursor;

use super::codec::{
    decode_cstring, decode_u8, encode_cstring, finish_pdu, start_pdu, CodecError, CommandId,
    CommandStatus, PduHeader,
};
use crate::config::BindType;

/// SMPP v3.4 interface version.
const INTERFACE_VERSION: u8 = 0x34;

/// Optional parameter (TLV).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv {
    pub tag: u16,
    pub value: Vec<u8>,
}

/// TLV tag: message_payload
pub const TLV_MESSAGE_PAYLOAD: u16 = 0x0424;
/// TLV tag: receipted_message_id
pub const TLV_RECEIPTED_MESSAGE_ID: u16 = 0x001E;
/// TLV tag: message_state
pub const TLV_MESSAGE_STATE: u16 = 0x0427;

/// Find a TLV value by tag.
pub fn find_tlv<'a>(tlvs: &'a [Tlv], tag: u16) -> Option<&'a [u8]> {
    tlvs.iter().find(|t| t.tag == tag).map(|t| t.value.as_slice())
}

fn decode_tlvs(buf: &mut Cursor<&[u8]>) -> Vec<Tlv> {
    let mut tlvs = Vec::new();

    while buf.remaining() >= 4 {
        let tag = buf.get_u16();
        let len = buf.get_u16() as usize;
        if buf.remaining() < len {
            break;
        }
        let value = buf.copy_to_bytes(len).to_vec();
        tlvs.push(Tlv { tag, value });
    }

    tlvs
}

fn encode_tlvs(buf: &mut BytesMut, tlvs: &[Tlv]) {
    use bytes::BufMut;

    for tlv in tlvs {
        buf.put_u16(tlv.tag);
        buf.put_u16(tlv.value.len() as u16);
        buf.put_slice(&tlv.value);
    }
}

/// bind_transmitter / bind_receiver / bind_transceiver request.
#[derive(Debug, Clone)]
pub struct BindRequest {
    pub sequence_number: u32,
    pub bind_type: BindType,
    pub system_id: String,
    pub password: String,
    pub system_type: String,
    pub address_range: String,
}

impl BindRequest {
    pub fn new(
        sequence_number: u32,
        bind_type: BindType,
        system_id: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            sequence_number,
            bind_type,
            system_id: system_id.into(),
            password: password.into(),
            system_type: String::new(),
            address_range: String::new(),
        }
    }

    pub fn command_id(&self) -> CommandId {
        match self.bind_type {
            BindType::Transmitter => CommandId::BindTransmitter,
            BindType::Receiver => CommandId::BindReceiver,
            BindType::Transceiver => CommandId::BindTransceiver,
        }
    }

    /// command_id of the matching response.
    pub fn response_command_id(&self) -> CommandId {
        match self.bind_type {
            BindType::Transmitter => CommandId::BindTransmitterResp,
            BindType::Receiver => CommandId::BindReceiverResp,
            BindType::Transceiver => CommandId::BindTransceiverResp,
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        use bytes::BufMut;

        let mut buf = start_pdu(self.command_id(), CommandStatus::Ok, self.sequence_number);
        encode_cstring(&mut buf, &self.system_id, 16);
        encode_cstring(&mut buf, &self.password, 9);
        encode_cstring(&mut buf, &self.system_type, 13);
        buf.put_u8(INTERFACE_VERSION);
        buf.put_u8(0); // addr_ton
        buf.put_u8(0); // addr_npi
        encode_cstring(&mut buf, &self.address_range, 41);
        finish_pdu(buf)
    }
}

/// bind_*_resp.
#[derive(Debug, Clone)]
pub struct BindResponse {
    pub sequence_number: u32,
    pub command_status: CommandStatus,
    pub system_id: String,
}

impl BindResponse {
    pub fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        // An error response may carry an empty body.
        let system_id = if buf.remaining() > 0 {
            decode_cstring(buf, 16, "system_id")?
        } else {
            String::new()
        };

        Ok(Self {
            sequence_number: header.sequence_number,
            command_status: header.command_status,
            system_id,
        })
    }
}

/// submit_sm request.
#[derive(Debug, Clone)]
pub struct SubmitSm {
    pub sequence_number: u32,
    pub service_type: String,
    pub source_addr_ton: u8,
    pub source_addr_npi: u8,
    pub source_addr: String,
    pub dest_addr_ton: u8,
    pub dest_addr_npi: u8,
    pub dest_addr: String,
    pub esm_class: u8,
    pub protocol_id: u8,
    pub priority_flag: u8,
    pub schedule_delivery_time: String,
    pub validity_period: String,
    pub registered_delivery: u8,
    pub replace_if_present_flag: u8,
    pub data_coding: u8,
    pub sm_default_msg_id: u8,
    pub short_message: Vec<u8>,
    pub tlvs: Vec<Tlv>,
}

impl SubmitSm {
    pub fn new(
        sequence_number: u32,
        source_addr: impl Into<String>,
        dest_addr: impl Into<String>,
        short_message: Vec<u8>,
    ) -> Self {
        Self {
            sequence_number,
            service_type: String::new(),
            source_addr_ton: 0,
            source_addr_npi: 0,
            source_addr: source_addr.into(),
            dest_addr_ton: 0,
            dest_addr_npi: 0,
            dest_addr: dest_addr.into(),
            esm_class: 0,
            protocol_id: 0,
            priority_flag: 0,
            schedule_delivery_time: String::new(),
            validity_period: String::new(),
            registered_delivery: 0,
            replace_if_present_flag: 0,
            data_coding: 0,
            sm_default_msg_id: 0,
            short_message,
            tlvs: Vec::new(),
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        use bytes::BufMut;

        let mut buf = start_pdu(CommandId::SubmitSm, CommandStatus::Ok, self.sequence_number);
        encode_cstring(&mut buf, &self.service_type, 6);
        buf.put_u8(self.source_addr_ton);
        buf.put_u8(self.source_addr_npi);
        encode_cstring(&mut buf, &self.source_addr, 21);
        buf.put_u8(self.dest_addr_ton);
        buf.put_u8(self.dest_addr_npi);
        encode_cstring(&mut buf, &self.dest_addr, 21);
        buf.put_u8(self.esm_class);
        buf.put_u8(self.protocol_id);
        buf.put_u8(self.priority_flag);
        encode_cstring(&mut buf, &self.schedule_delivery_time, 17);
        encode_cstring(&mut buf, &self.validity_period, 17);
        buf.put_u8(self.registered_delivery);
        buf.put_u8(self.replace_if_present_flag);
        buf.put_u8(self.data_coding);
        buf.put_u8(self.sm_default_msg_id);
        buf.put_u8(self.short_message.len().min(254) as u8);
        buf.put_slice(&self.short_message[..self.short_message.len().min(254)]);
        encode_tlvs(&mut buf, &self.tlvs);
        finish_pdu(buf)
    }

    pub fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let service_type = decode_cstring(buf, 6, "service_type")?;
        let source_addr_ton = decode_u8(buf, "source_addr_ton")?;
        let source_addr_npi = decode_u8(buf, "source_addr_npi")?;
        let source_addr = decode_cstring(buf, 21, "source_addr")?;
        let dest_addr_ton = decode_u8(buf, "dest_addr_ton")?;
        let dest_addr_npi = decode_u8(buf, "dest_addr_npi")?;
        let dest_addr = decode_cstring(buf, 21, "destination_addr")?;
        let esm_class = decode_u8(buf, "esm_class")?;
        let protocol_id = decode_u8(buf, "protocol_id")?;
        let priority_flag = decode_u8(buf, "priority_flag")?;
        let schedule_delivery_time = decode_cstring(buf, 17, "schedule_delivery_time")?;
        let validity_period = decode_cstring(buf, 17, "validity_period")?;
        let registered_delivery = decode_u8(buf, "registered_delivery")?;
        let replace_if_present_flag = decode_u8(buf, "replace_if_present_flag")?;
        let data_coding = decode_u8(buf, "data_coding")?;
        let sm_default_msg_id = decode_u8(buf, "sm_default_msg_id")?;
        let sm_length = decode_u8(buf, "sm_length")? as usize;

        if buf.remaining() < sm_length {
            return Err(CodecError::Truncated {
                field: "short_message",
            });
        }
        let short_message = buf.copy_to_bytes(sm_length).to_vec();
        let tlvs = decode_tlvs(buf);

        Ok(Self {
            sequence_number: header.sequence_number,
            service_type,
            source_addr_ton,
            source_addr_npi,
            source_addr,
            dest_addr_ton,
            dest_addr_npi,
            dest_addr,
            esm_class,
            protocol_id,
            priority_flag,
            schedule_delivery_time,
            validity_period,
            registered_delivery,
            replace_if_present_flag,
            data_coding,
            sm_default_msg_id,
            short_message,
            tlvs,
        })
    }
}

/// submit_sm_resp.
#[derive(Debug, Clone)]
pub struct SubmitSmResponse {
    pub sequence_number: u32,
    pub command_status: CommandStatus,
    pub message_id: String,
}

impl SubmitSmResponse {
    pub fn new(sequence_number: u32, message_id: impl Into<String>) -> Self {
        Self {
            sequence_number,
            command_status: CommandStatus::Ok,
            message_id: message_id.into(),
        }
    }

    pub fn error(sequence_number: u32, status: CommandStatus) -> Self {
        Self {
            sequence_number,
            command_status: status,
            message_id: String::new(),
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = start_pdu(
            CommandId::SubmitSmResp,
            self.command_status,
            self.sequence_number,
        );
        encode_cstring(&mut buf, &self.message_id, 65);
        finish_pdu(buf)
    }

    pub fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        // Error responses may omit the message_id field entirely.
        let message_id = if buf.remaining() > 0 {
            decode_cstring(buf, 65, "message_id")?
        } else {
            String::new()
        };

        Ok(Self {
            sequence_number: header.sequence_number,
            command_status: header.command_status,
            message_id,
        })
    }
}

/// deliver_sm — mobile-originated message or delivery receipt.
#[derive(Debug, Clone)]
pub struct DeliverSm {
    pub sequence_number: u32,
    pub service_type: String,
    pub source_addr: String,
    pub dest_addr: String,
    pub esm_class: u8,
    pub registered_delivery: u8,
    pub data_coding: u8,
    pub short_message: Vec<u8>,
    pub tlvs: Vec<Tlv>,
}

impl DeliverSm {
    /// esm_class bit 2 marks an SMSC delivery receipt.
    pub fn is_delivery_receipt(&self) -> bool {
        self.esm_class & 0x04 != 0
    }

    /// Extract the receipt text: short_message bytes first, then the
    /// message_payload TLV.
    pub fn receipt_text(&self) -> String {
        if !self.short_message.is_empty() {
            return String::from_utf8_lossy(&self.short_message).into_owned();
        }
        if let Some(payload) = find_tlv(&self.tlvs, TLV_MESSAGE_PAYLOAD) {
            return String::from_utf8_lossy(payload).into_owned();
        }
        format!("{self:?}")
    }

    pub fn to_bytes(&self) -> Bytes {
        use bytes::BufMut;

        let mut buf = start_pdu(CommandId::DeliverSm, CommandStatus::Ok, self.sequence_number);
        encode_cstring(&mut buf, &self.service_type, 6);
        buf.put_u8(0);
        buf.put_u8(0);
        encode_cstring(&mut buf, &self.source_addr, 21);
        buf.put_u8(0);
        buf.put_u8(0);
        encode_cstring(&mut buf, &self.dest_addr, 21);
        buf.put_u8(self.esm_class);
        buf.put_u8(0); // protocol_id
        buf.put_u8(0); // priority_flag
        encode_cstring(&mut buf, "", 1); // schedule_delivery_time
        encode_cstring(&mut buf, "", 1); // validity_period
        buf.put_u8(self.registered_delivery);
        buf.put_u8(0); // replace_if_present_flag
        buf.put_u8(self.data_coding);
        buf.put_u8(0); // sm_default_msg_id
        buf.put_u8(self.short_message.len().min(254) as u8);
        buf.put_slice(&self.short_message[..self.short_message.len().min(254)]);
        encode_tlvs(&mut buf, &self.tlvs);
        finish_pdu(buf)
    }

    pub fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let service_type = decode_cstring(buf, 6, "service_type")?;
        let _source_addr_ton = decode_u8(buf, "source_addr_ton")?;
        let _source_addr_npi = decode_u8(buf, "source_addr_npi")?;
        let source_addr = decode_cstring(buf, 21, "source_addr")?;
        let _dest_addr_ton = decode_u8(buf, "dest_addr_ton")?;
        let _dest_addr_npi = decode_u8(buf, "dest_addr_npi")?;
        let dest_addr = decode_cstring(buf, 21, "destination_addr")?;
        let esm_class = decode_u8(buf, "esm_class")?;
        let _protocol_id = decode_u8(buf, "protocol_id")?;
        let _priority_flag = decode_u8(buf, "priority_flag")?;
        let _schedule = decode_cstring(buf, 17, "schedule_delivery_time")?;
        let _validity = decode_cstring(buf, 17, "validity_period")?;
        let registered_delivery = decode_u8(buf, "registered_delivery")?;
        let _replace = decode_u8(buf, "replace_if_present_flag")?;
        let data_coding = decode_u8(buf, "data_coding")?;
        let _default_msg_id = decode_u8(buf, "sm_default_msg_id")?;
        let sm_length = decode_u8(buf, "sm_length")? as usize;

        if buf.remaining() < sm_length {
            return Err(CodecError::Truncated {
                field: "short_message",
            });
        }
        let short_message = buf.copy_to_bytes(sm_length).to_vec();
        let tlvs = decode_tlvs(buf);

        Ok(Self {
            sequence_number: header.sequence_number,
            service_type,
            source_addr,
            dest_addr,
            esm_class,
            registered_delivery,
            data_coding,
            short_message,
            tlvs,
        })
    }
}

/// deliver_sm_resp.
#[derive(Debug, Clone)]
pub struct DeliverSmResponse {
    pub sequence_number: u32,
    pub command_status: CommandStatus,
}

impl DeliverSmResponse {
    pub fn new(sequence_number: u32) -> Self {
        Self {
            sequence_number,
            command_status: CommandStatus::Ok,
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = start_pdu(
            CommandId::DeliverSmResp,
            self.command_status,
            self.sequence_number,
        );
        encode_cstring(&mut buf, "", 1); // message_id, unused
        finish_pdu(buf)
    }

    pub fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        if buf.remaining() > 0 {
            let _ = decode_cstring(buf, 65, "message_id")?;
        }
        Ok(Self {
            sequence_number: header.sequence_number,
            command_status: header.command_status,
        })
    }
}

/// enquire_link keep-alive.
#[derive(Debug, Clone, PartialEq)]
pub struct EnquireLink {
    pub sequence_number: u32,
}

impl EnquireLink {
    pub fn new(sequence_number: u32) -> Self {
        Self { sequence_number }
    }

    pub fn to_bytes(&self) -> Bytes {
        finish_pdu(start_pdu(
            CommandId::EnquireLink,
            CommandStatus::Ok,
            self.sequence_number,
        ))
    }
}

/// enquire_link_resp.
#[derive(Debug, Clone, PartialEq)]
pub struct EnquireLinkResponse {
    pub sequence_number: u32,
    pub command_status: CommandStatus,
}

impl EnquireLinkResponse {
    pub fn new(sequence_number: u32) -> Self {
        Self {
            sequence_number,
            command_status: CommandStatus::Ok,
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        finish_pdu(start_pdu(
            CommandId::EnquireLinkResp,
            self.command_status,
            self.sequence_number,
        ))
    }
}

/// unbind.
#[derive(Debug, Clone, PartialEq)]
pub struct Unbind {
    pub sequence_number: u32,
}

impl Unbind {
    pub fn new(sequence_number: u32) -> Self {
        Self { sequence_number }
    }

    pub fn to_bytes(&self) -> Bytes {
        finish_pdu(start_pdu(
            CommandId::Unbind,
            CommandStatus::Ok,
            self.sequence_number,
        ))
    }
}

/// unbind_resp.
#[derive(Debug, Clone, PartialEq)]
pub struct UnbindResponse {
    pub sequence_number: u32,
    pub command_status: CommandStatus,
}

impl UnbindResponse {
    pub fn new(sequence_number: u32) -> Self {
        Self {
            sequence_number,
            command_status: CommandStatus::Ok,
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        finish_pdu(start_pdu(
            CommandId::UnbindResp,
            self.command_status,
            self.sequence_number,
        ))
    }
}

/// generic_nack.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericNack {
    pub sequence_number: u32,
    pub command_status: CommandStatus,
}

/// Generic frame holding any PDU the session can see.
#[derive(Debug)]
pub enum Frame {
    BindResp(BindResponse),
    SubmitSm(SubmitSm),
    SubmitSmResp(SubmitSmResponse),
    DeliverSm(Box<DeliverSm>),
    DeliverSmResp(DeliverSmResponse),
    EnquireLink(EnquireLink),
    EnquireLinkResp(EnquireLinkResponse),
    Unbind(Unbind),
    UnbindResp(UnbindResponse),
    GenericNack(GenericNack),
    /// Unknown PDU retained for forward compatibility
    Unknown { header: PduHeader, body: Bytes },
}

/// Frame-level errors during check/parse.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("incomplete frame")]
    Incomplete,

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl Frame {
    /// Check whether the buffer holds a complete PDU.
    pub fn check(buf: &mut Cursor<&[u8]>) -> Result<usize, FrameError> {
        if buf.remaining() < PduHeader::SIZE {
            return Err(FrameError::Incomplete);
        }

        let pos = buf.position();
        let command_length = buf.get_u32();
        buf.set_position(pos);

        if command_length < PduHeader::SIZE as u32 || command_length > super::codec::MAX_PDU_SIZE {
            return Err(FrameError::Codec(CodecError::InvalidPduLength {
                length: command_length,
                min: PduHeader::SIZE as u32,
                max: super::codec::MAX_PDU_SIZE,
            }));
        }

        if buf.remaining() < command_length as usize {
            return Err(FrameError::Incomplete);
        }

        Ok(command_length as usize)
    }

    /// Parse one complete PDU from the buffer.
    pub fn parse(buf: &mut Cursor<&[u8]>) -> Result<Frame, FrameError> {
        let start = buf.position() as usize;

        let header = match PduHeader::decode(buf) {
            Ok(h) => h,
            Err(CodecError::UnknownCommandId(_)) => {
                // Skip the unknown PDU body so the session survives.
                buf.set_position(start as u64);
                let command_length = buf.get_u32() as usize;
                let _command_id = buf.get_u32();
                let command_status = CommandStatus::from(buf.get_u32());
                let sequence_number = buf.get_u32();
                let body_len = command_length - PduHeader::SIZE;
                if buf.remaining() < body_len {
                    return Err(FrameError::Incomplete);
                }
                let body = buf.copy_to_bytes(body_len);
                tracing::warn!(sequence = sequence_number, "unknown PDU command, treating as opaque");
                return Ok(Frame::Unknown {
                    header: PduHeader {
                        command_length: command_length as u32,
                        command_id: CommandId::GenericNack,
                        command_status,
                        sequence_number,
                    },
                    body,
                });
            }
            Err(e) => return Err(FrameError::Codec(e)),
        };

        let body_len = header.command_length as usize - PduHeader::SIZE;
        let body_end = start + header.command_length as usize;

        let frame = match header.command_id {
            CommandId::BindTransmitterResp
            | CommandId::BindReceiverResp
            | CommandId::BindTransceiverResp => Frame::BindResp(BindResponse::decode(header, buf)?),
            CommandId::SubmitSm => Frame::SubmitSm(SubmitSm::decode(header, buf)?),
            CommandId::SubmitSmResp => Frame::SubmitSmResp(SubmitSmResponse::decode(header, buf)?),
            CommandId::DeliverSm => Frame::DeliverSm(Box::new(DeliverSm::decode(header, buf)?)),
            CommandId::DeliverSmResp => {
                Frame::DeliverSmResp(DeliverSmResponse::decode(header, buf)?)
            }
            CommandId::EnquireLink => Frame::EnquireLink(EnquireLink {
                sequence_number: header.sequence_number,
            }),
            CommandId::EnquireLinkResp => Frame::EnquireLinkResp(EnquireLinkResponse {
                sequence_number: header.sequence_number,
                command_status: header.command_status,
            }),
            CommandId::Unbind => Frame::Unbind(Unbind {
                sequence_number: header.sequence_number,
            }),
            CommandId::UnbindResp => Frame::UnbindResp(UnbindResponse {
                sequence_number: header.sequence_number,
                command_status: header.command_status,
            }),
            CommandId::GenericNack => Frame::GenericNack(GenericNack {
                sequence_number: header.sequence_number,
                command_status: header.command_status,
            }),
            CommandId::BindTransmitter | CommandId::BindReceiver | CommandId::BindTransceiver => {
                // The hub is always the initiator; skip inbound binds.
                let _ = buf.copy_to_bytes(body_len.min(buf.remaining()));
                Frame::Unknown {
                    header,
                    body: Bytes::new(),
                }
            }
        };

        // Skip any trailing body bytes (e.g. optional TLVs we did not read).
        if (buf.position() as usize) < body_end {
            buf.set_position(body_end as u64);
        }

        Ok(frame)
    }

    /// Serialize this frame for the wire.
    pub fn to_bytes(&self) -> Option<Bytes> {
        match self {
            Frame::SubmitSm(pdu) => Some(pdu.to_bytes()),
            Frame::SubmitSmResp(pdu) => Some(pdu.to_bytes()),
            Frame::DeliverSm(pdu) => Some(pdu.to_bytes()),
            Frame::DeliverSmResp(pdu) => Some(pdu.to_bytes()),
            Frame::EnquireLink(pdu) => Some(pdu.to_bytes()),
            Frame::EnquireLinkResp(pdu) => Some(pdu.to_bytes()),
            Frame::Unbind(pdu) => Some(pdu.to_bytes()),
            Frame::UnbindResp(pdu) => Some(pdu.to_bytes()),
            Frame::BindResp(_) | Frame::GenericNack(_) | Frame::Unknown { .. } => None,
        }
    }

    /// Sequence number of this frame.
    pub fn sequence_number(&self) -> u32 {
        match self {
            Frame::BindResp(pdu) => pdu.sequence_number,
            Frame::SubmitSm(pdu) => pdu.sequence_number,
            Frame::SubmitSmResp(pdu) => pdu.sequence_number,
            Frame::DeliverSm(pdu) => pdu.sequence_number,
            Frame::DeliverSmResp(pdu) => pdu.sequence_number,
            Frame::EnquireLink(pdu) => pdu.sequence_number,
            Frame::EnquireLinkResp(pdu) => pdu.sequence_number,
            Frame::Unbind(pdu) => pdu.sequence_number,
            Frame::UnbindResp(pdu) => pdu.sequence_number,
            Frame::GenericNack(pdu) => pdu.sequence_number,
            Frame::Unknown { header, .. } => header.sequence_number,
        }
    }

    /// Check if this frame is a response PDU.
    pub fn is_response(&self) -> bool {
        matches!(
            self,
            Frame::BindResp(_)
                | Frame::SubmitSmResp(_)
                | Frame::DeliverSmResp(_)
                | Frame::EnquireLinkResp(_)
                | Frame::UnbindResp(_)
                | Frame::GenericNack(_)
        )
    }
}
