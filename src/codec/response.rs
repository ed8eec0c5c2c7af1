use bytes::{BufMut, BytesMut};

use super::reader::{coil_to_wire, pack_bits, PduReader};
use super::records::{encode_file_records, encode_record_data};
use super::request::put_registers;
use super::{
    CommEventLog, DeviceIdentification, ExceptionCode, FileRecord, FunctionCode, Pdu, Request,
    EXCEPTION_FLAG,
};
use crate::errors::{FrameErrorKind, ModbusError};
use crate::registry;

/// A slave response, including exception responses.
///
/// Bit reads carry every bit of the received bytes; a transaction trims them
/// to the requested quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    ReadCoils(Vec<bool>),
    ReadDiscreteInputs(Vec<bool>),
    ReadHoldingRegisters(Vec<u16>),
    ReadInputRegisters(Vec<u16>),
    WriteSingleCoil { address: u16, value: bool },
    WriteSingleRegister { address: u16, value: u16 },
    ReadExceptionStatus(u8),
    Diagnostics { sub_function: u16, data: u16 },
    GetCommEventCounter { status: u16, event_count: u16 },
    GetCommEventLog(CommEventLog),
    WriteMultipleCoils { address: u16, quantity: u16 },
    WriteMultipleRegisters { address: u16, quantity: u16 },
    ReportSlaveId(Vec<u8>),
    /// Record data per sub-request, in request order.
    ReadFileRecord(Vec<Vec<u16>>),
    WriteFileRecord(Vec<FileRecord>),
    MaskWriteRegister { address: u16, and_mask: u16, or_mask: u16 },
    ReadWriteMultipleRegisters(Vec<u16>),
    ReadFifoQueue(Vec<u16>),
    ReadDeviceIdentification(DeviceIdentification),
    /// `function` is the request's function code, without the exception flag.
    Exception { function: u8, code: ExceptionCode },
}

impl Response {
    /// Decodes a response PDU (function code followed by its payload).
    ///
    /// Exception responses are recognised before the registry is consulted.
    pub fn decode(pdu: &[u8]) -> Result<Self, ModbusError> {
        let (&code, payload) = pdu.split_first().ok_or_else(|| {
            ModbusError::frame(FrameErrorKind::TooShort, "empty response PDU", None)
        })?;

        if code & EXCEPTION_FLAG != 0 {
            let mut reader = PduReader::new(code, payload);
            let exception = reader.read_u8("exception code")?;
            reader.finish()?;
            return Ok(Self::Exception {
                function: code & !EXCEPTION_FLAG,
                code: ExceptionCode::from(exception),
            });
        }

        registry::lookup(code)?.decode(payload)
    }

    pub fn is_exception(&self) -> bool {
        matches!(self, Self::Exception { .. })
    }

    pub fn function(&self) -> Option<FunctionCode> {
        let function = match self {
            Self::ReadCoils(_) => FunctionCode::ReadCoils,
            Self::ReadDiscreteInputs(_) => FunctionCode::ReadDiscreteInputs,
            Self::ReadHoldingRegisters(_) => FunctionCode::ReadHoldingRegisters,
            Self::ReadInputRegisters(_) => FunctionCode::ReadInputRegisters,
            Self::WriteSingleCoil { .. } => FunctionCode::WriteSingleCoil,
            Self::WriteSingleRegister { .. } => FunctionCode::WriteSingleRegister,
            Self::ReadExceptionStatus(_) => FunctionCode::ReadExceptionStatus,
            Self::Diagnostics { .. } => FunctionCode::Diagnostics,
            Self::GetCommEventCounter { .. } => FunctionCode::GetCommEventCounter,
            Self::GetCommEventLog(_) => FunctionCode::GetCommEventLog,
            Self::WriteMultipleCoils { .. } => FunctionCode::WriteMultipleCoils,
            Self::WriteMultipleRegisters { .. } => FunctionCode::WriteMultipleRegisters,
            Self::ReportSlaveId(_) => FunctionCode::ReportSlaveId,
            Self::ReadFileRecord(_) => FunctionCode::ReadFileRecord,
            Self::WriteFileRecord(_) => FunctionCode::WriteFileRecord,
            Self::MaskWriteRegister { .. } => FunctionCode::MaskWriteRegister,
            Self::ReadWriteMultipleRegisters(_) => FunctionCode::ReadWriteMultipleRegisters,
            Self::ReadFifoQueue(_) => FunctionCode::ReadFifoQueue,
            Self::ReadDeviceIdentification(_) => FunctionCode::EncapsulatedInterface,
            Self::Exception { function, .. } => return FunctionCode::try_from(*function).ok(),
        };
        Some(function)
    }

    /// Function code of the request this answers.
    pub fn request_function_code(&self) -> u8 {
        self.function_code() & !EXCEPTION_FLAG
    }

    /// Drops the padding bits of a coil or discrete input read.
    pub(crate) fn truncate_to(&mut self, request: &Request) {
        match (self, request) {
            (Self::ReadCoils(bits), Request::ReadCoils { quantity, .. })
            | (Self::ReadDiscreteInputs(bits), Request::ReadDiscreteInputs { quantity, .. }) => {
                bits.truncate(*quantity as usize)
            }
            _ => {}
        }
    }
}

impl Pdu for Response {
    fn function_code(&self) -> u8 {
        match self {
            Self::Exception { function, .. } => function | EXCEPTION_FLAG,
            other => other.function().map_or(0, FunctionCode::code),
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.function_code());
        match self {
            Self::ReadCoils(bits) | Self::ReadDiscreteInputs(bits) => {
                let packed = pack_bits(bits);
                buf.put_u8(packed.len() as u8);
                buf.put_slice(&packed);
            }
            Self::ReadHoldingRegisters(values)
            | Self::ReadInputRegisters(values)
            | Self::ReadWriteMultipleRegisters(values) => put_registers(buf, values),
            Self::WriteSingleCoil { address, value } => {
                buf.put_u16(*address);
                buf.put_u16(coil_to_wire(*value));
            }
            Self::WriteSingleRegister { address, value } => {
                buf.put_u16(*address);
                buf.put_u16(*value);
            }
            Self::ReadExceptionStatus(status) => buf.put_u8(*status),
            Self::Diagnostics { sub_function, data } => {
                buf.put_u16(*sub_function);
                buf.put_u16(*data);
            }
            Self::GetCommEventCounter {
                status,
                event_count,
            } => {
                buf.put_u16(*status);
                buf.put_u16(*event_count);
            }
            Self::GetCommEventLog(log) => log.encode(buf),
            Self::WriteMultipleCoils { address, quantity }
            | Self::WriteMultipleRegisters { address, quantity } => {
                buf.put_u16(*address);
                buf.put_u16(*quantity);
            }
            Self::ReportSlaveId(data) => {
                buf.put_u8(data.len() as u8);
                buf.put_slice(data);
            }
            Self::ReadFileRecord(records) => encode_record_data(records, buf),
            Self::WriteFileRecord(records) => encode_file_records(records, buf),
            Self::MaskWriteRegister {
                address,
                and_mask,
                or_mask,
            } => {
                buf.put_u16(*address);
                buf.put_u16(*and_mask);
                buf.put_u16(*or_mask);
            }
            Self::ReadFifoQueue(values) => {
                buf.put_u16((2 + values.len() * 2) as u16);
                buf.put_u16(values.len() as u16);
                for &value in values {
                    buf.put_u16(value);
                }
            }
            Self::ReadDeviceIdentification(identification) => identification.encode(buf),
            Self::Exception { code, .. } => buf.put_u8(code.code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DeviceObject;

    #[test]
    fn test_decode_exception_response() {
        let response = Response::decode(&[0x83, 0x02]).unwrap();
        assert_eq!(
            response,
            Response::Exception {
                function: 0x03,
                code: ExceptionCode::IllegalDataAddress
            }
        );
        assert!(response.is_exception());
        assert_eq!(response.function_code(), 0x83);
        assert_eq!(response.request_function_code(), 0x03);
        assert_eq!(response.function(), Some(FunctionCode::ReadHoldingRegisters));

        // Exactly one payload byte
        assert!(Response::decode(&[0x83]).is_err());
        assert!(Response::decode(&[0x83, 0x02, 0x00]).is_err());
    }

    #[test]
    fn test_decode_unknown_function() {
        match Response::decode(&[0x41, 0x00]) {
            Err(ModbusError::UnsupportedFunction { function: 0x41 }) => {}
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_decode_read_holding_registers() {
        let response = Response::decode(&[0x03, 0x04, 0x00, 0x0A, 0x00, 0x14]).unwrap();
        assert_eq!(response, Response::ReadHoldingRegisters(vec![10, 20]));

        // Declared byte count larger than the payload
        assert!(Response::decode(&[0x03, 0x06, 0x00, 0x0A, 0x00, 0x14]).is_err());
    }

    #[test]
    fn test_coil_padding_is_trimmed() {
        let mut response = Response::decode(&[0x01, 0x01, 0x05]).unwrap();
        assert_eq!(
            response,
            Response::ReadCoils(vec![true, false, true, false, false, false, false, false])
        );

        response.truncate_to(&Request::ReadCoils {
            address: 0,
            quantity: 3,
        });
        assert_eq!(response, Response::ReadCoils(vec![true, false, true]));
    }

    #[test]
    fn test_decode_fixed_size_responses() {
        assert_eq!(
            Response::decode(&[0x05, 0x00, 0xAC, 0xFF, 0x00]).unwrap(),
            Response::WriteSingleCoil {
                address: 0xAC,
                value: true
            }
        );
        assert_eq!(
            Response::decode(&[0x0B, 0xFF, 0xFF, 0x01, 0x08]).unwrap(),
            Response::GetCommEventCounter {
                status: 0xFFFF,
                event_count: 0x0108
            }
        );
        assert_eq!(
            Response::decode(&[0x16, 0x00, 0x04, 0x00, 0xF2, 0x00, 0x25]).unwrap(),
            Response::MaskWriteRegister {
                address: 4,
                and_mask: 0x00F2,
                or_mask: 0x0025
            }
        );
        assert_eq!(
            Response::decode(&[0x07, 0x6D]).unwrap(),
            Response::ReadExceptionStatus(0x6D)
        );
    }

    #[test]
    fn test_device_identification_response() {
        let response = Response::ReadDeviceIdentification(DeviceIdentification {
            read_code: 4,
            conformity_level: 0x81,
            objects: vec![DeviceObject::new(0x01, "MX-200")],
            ..Default::default()
        });
        let bytes = response.to_bytes();
        assert_eq!(&bytes[..4], &[0x2B, 0x0E, 0x04, 0x81]);
        assert_eq!(Response::decode(&bytes).unwrap(), response);
    }

    #[test]
    fn test_fifo_wire_format() {
        let bytes = Response::ReadFifoQueue(vec![0x01B8, 0x1284]).to_bytes();
        assert_eq!(
            &bytes[..],
            &[0x18, 0x00, 0x06, 0x00, 0x02, 0x01, 0xB8, 0x12, 0x84]
        );
    }
}
