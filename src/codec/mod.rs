//! Modbus PDU model and wire encoding shared by every transport.
//!
//! Requests and responses are tagged enums; an [`Adu`] wraps either one with
//! the addressing a transport needs (unit id and, for TCP/UDP, the MBAP
//! header). Framing (MBAP, RTU CRC, ASCII LRC) lives in the transports.

mod checksum;
mod device_id;
mod event_log;
mod exception;
mod function;
pub(crate) mod reader;
pub(crate) mod records;
mod request;
mod response;

use bytes::BytesMut;

pub use checksum::{crc16, crc16_bytes, lrc, verify_crc, verify_lrc};
pub use device_id::{DeviceIdentification, DeviceObject};
pub use event_log::{CommEventLog, MAX_COMM_EVENTS};
pub use exception::ExceptionCode;
pub use function::{FunctionCode, EXCEPTION_FLAG, MEI_READ_DEVICE_ID};
pub use records::{
    FileRecord, ReadFileRecordRequest, RecordRequest, FILE_REFERENCE_TYPE,
    MAX_RECORD_NUMBER, MAX_RECORD_REQUEST_SIZE,
};
pub use request::Request;
pub use response::Response;

/// Largest PDU (function code + payload) a frame may carry.
pub const MAX_PDU_SIZE: usize = 253;

/// Largest RTU frame: unit id + PDU + CRC.
pub const MAX_RTU_FRAME_SIZE: usize = 256;

/// Transaction id, protocol id, length and unit id.
pub const MBAP_HEADER_SIZE: usize = 7;

/// Protocol id carried by every Modbus MBAP header.
pub const MODBUS_PROTOCOL_ID: u16 = 0;

/// Something that encodes to a PDU.
pub trait Pdu {
    fn function_code(&self) -> u8;

    /// Appends function code and payload to `buf`.
    fn encode(&self, buf: &mut BytesMut);

    fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(MAX_PDU_SIZE);
        self.encode(&mut buf);
        buf
    }
}

impl<P: Pdu + ?Sized> Pdu for &P {
    fn function_code(&self) -> u8 {
        (**self).function_code()
    }

    fn encode(&self, buf: &mut BytesMut) {
        (**self).encode(buf)
    }
}

/// TCP/UDP framing fields of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
}

impl MbapHeader {
    pub fn new(transaction_id: u16) -> Self {
        Self {
            transaction_id,
            protocol_id: MODBUS_PROTOCOL_ID,
        }
    }
}

/// Application data unit: a PDU plus its addressing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adu<P> {
    /// Present on TCP and UDP only.
    pub header: Option<MbapHeader>,
    pub unit_id: u8,
    pub pdu: P,
}

pub type RequestAdu = Adu<Request>;
pub type ResponseAdu = Adu<Response>;

impl<P> Adu<P> {
    pub fn new(unit_id: u8, pdu: P) -> Self {
        Self {
            header: None,
            unit_id,
            pdu,
        }
    }

    pub fn with_header(mut self, header: MbapHeader) -> Self {
        self.header = Some(header);
        self
    }

    pub fn transaction_id(&self) -> Option<u16> {
        self.header.map(|header| header.transaction_id)
    }

    /// Builds the answer to this message, keeping its addressing.
    pub fn reply<R>(&self, pdu: R) -> Adu<R> {
        Adu {
            header: self.header,
            unit_id: self.unit_id,
            pdu,
        }
    }
}
