use bytes::{BufMut, BytesMut};

use crate::codec::{Adu, MbapHeader, Pdu, MAX_PDU_SIZE, MBAP_HEADER_SIZE, MODBUS_PROTOCOL_ID};
use crate::errors::{FrameErrorKind, ModbusError, ProtocolErrorKind};

/// Header fields of an inbound MBAP frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrameHeader {
    pub header: MbapHeader,
    pub unit_id: u8,
    /// Bytes following the header: function code and payload
    pub pdu_len: usize,
}

impl FrameHeader {
    pub fn frame_len(&self) -> usize {
        MBAP_HEADER_SIZE + self.pdu_len
    }
}

/// Encodes a full MBAP frame. Messages without a header go out with
/// transaction id 0.
pub(crate) fn encode<P: Pdu>(message: &Adu<P>) -> Result<BytesMut, ModbusError> {
    let pdu = message.pdu.to_bytes();
    check_pdu_len(pdu.len())?;

    let header = message.header.unwrap_or(MbapHeader::new(0));
    let mut frame = BytesMut::with_capacity(MBAP_HEADER_SIZE + pdu.len());
    frame.put_u16(header.transaction_id);
    frame.put_u16(header.protocol_id);
    frame.put_u16((pdu.len() + 1) as u16);
    frame.put_u8(message.unit_id);
    frame.put_slice(&pdu);

    Ok(frame)
}

pub(crate) fn check_pdu_len(len: usize) -> Result<(), ModbusError> {
    if len > MAX_PDU_SIZE {
        return Err(ModbusError::frame(
            FrameErrorKind::TooLong,
            format!("PDU of {} bytes exceeds {} byte limit", len, MAX_PDU_SIZE),
            None,
        ));
    }
    Ok(())
}

/// Parses the 7-byte MBAP header.
pub(crate) fn decode_header(bytes: &[u8]) -> Result<FrameHeader, ModbusError> {
    if bytes.len() < MBAP_HEADER_SIZE {
        return Err(ModbusError::frame(
            FrameErrorKind::TooShort,
            format!("MBAP header needs {} bytes, got {}", MBAP_HEADER_SIZE, bytes.len()),
            Some(bytes.to_vec()),
        ));
    }

    let transaction_id = u16::from_be_bytes([bytes[0], bytes[1]]);
    let protocol_id = u16::from_be_bytes([bytes[2], bytes[3]]);
    let length = u16::from_be_bytes([bytes[4], bytes[5]]) as usize;
    let unit_id = bytes[6];

    if protocol_id != MODBUS_PROTOCOL_ID {
        return Err(ModbusError::protocol(
            ProtocolErrorKind::InvalidProtocolId,
            format!("protocol id {} in transaction {}", protocol_id, transaction_id),
        ));
    }

    // Length covers the unit id and at least a function code
    if !(2..=MAX_PDU_SIZE + 1).contains(&length) {
        return Err(ModbusError::frame(
            FrameErrorKind::LengthMismatch,
            format!("MBAP length field {} out of range", length),
            Some(bytes[..MBAP_HEADER_SIZE].to_vec()),
        ));
    }

    Ok(FrameHeader {
        header: MbapHeader {
            transaction_id,
            protocol_id,
        },
        unit_id,
        pdu_len: length - 1,
    })
}

/// Splits a complete datagram into its header and PDU.
pub(crate) fn decode_frame(frame: &[u8]) -> Result<(FrameHeader, &[u8]), ModbusError> {
    let header = decode_header(frame)?;
    if frame.len() != header.frame_len() {
        return Err(ModbusError::frame(
            FrameErrorKind::LengthMismatch,
            format!(
                "MBAP length declares {} bytes, datagram has {}",
                header.frame_len(),
                frame.len()
            ),
            Some(frame.to_vec()),
        ));
    }
    Ok((header, &frame[MBAP_HEADER_SIZE..]))
}
