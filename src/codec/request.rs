use bytes::{BufMut, BytesMut};

use super::device_id::expect_mei_type;
use super::reader::{coil_from_wire, coil_to_wire, pack_bits, unpack_bits, PduReader};
use super::records::{decode_file_records, encode_file_records};
use super::{
    ExceptionCode, FileRecord, FunctionCode, Pdu, ReadFileRecordRequest, Response,
    MAX_COMM_EVENTS, MEI_READ_DEVICE_ID,
};
use crate::errors::{FrameErrorKind, ModbusError};
use crate::image::{ImageResult, ProcessImage};

const MAX_READ_BITS: u16 = 2000;
const MAX_READ_REGISTERS: u16 = 125;
const MAX_WRITE_BITS: u16 = 1968;
const MAX_WRITE_REGISTERS: u16 = 123;
const MAX_READ_WRITE_REGISTERS: u16 = 121;
const MAX_FIFO_COUNT: usize = 31;

/// Diagnostics sub-function that echoes the request data.
const RETURN_QUERY_DATA: u16 = 0x0000;

/// A master request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    ReadCoils {
        address: u16,
        quantity: u16,
    },
    ReadDiscreteInputs {
        address: u16,
        quantity: u16,
    },
    ReadHoldingRegisters {
        address: u16,
        quantity: u16,
    },
    ReadInputRegisters {
        address: u16,
        quantity: u16,
    },
    WriteSingleCoil {
        address: u16,
        value: bool,
    },
    WriteSingleRegister {
        address: u16,
        value: u16,
    },
    ReadExceptionStatus,
    Diagnostics {
        sub_function: u16,
        data: u16,
    },
    GetCommEventCounter,
    GetCommEventLog,
    WriteMultipleCoils {
        address: u16,
        values: Vec<bool>,
    },
    WriteMultipleRegisters {
        address: u16,
        values: Vec<u16>,
    },
    ReportSlaveId,
    ReadFileRecord(ReadFileRecordRequest),
    WriteFileRecord(Vec<FileRecord>),
    MaskWriteRegister {
        address: u16,
        and_mask: u16,
        or_mask: u16,
    },
    ReadWriteMultipleRegisters {
        read_address: u16,
        read_quantity: u16,
        write_address: u16,
        values: Vec<u16>,
    },
    ReadFifoQueue {
        address: u16,
    },
    /// Encapsulated interface transport, MEI type 0x0E.
    ReadDeviceIdentification {
        read_code: u8,
        object_id: u8,
    },
    /// A function code this engine does not model. Slaves answer it with an
    /// Illegal Function exception.
    Unsupported {
        function: u8,
        payload: Vec<u8>,
    },
}

impl Request {
    /// `None` for [`Request::Unsupported`].
    pub fn function(&self) -> Option<FunctionCode> {
        let function = match self {
            Self::ReadCoils { .. } => FunctionCode::ReadCoils,
            Self::ReadDiscreteInputs { .. } => FunctionCode::ReadDiscreteInputs,
            Self::ReadHoldingRegisters { .. } => FunctionCode::ReadHoldingRegisters,
            Self::ReadInputRegisters { .. } => FunctionCode::ReadInputRegisters,
            Self::WriteSingleCoil { .. } => FunctionCode::WriteSingleCoil,
            Self::WriteSingleRegister { .. } => FunctionCode::WriteSingleRegister,
            Self::ReadExceptionStatus => FunctionCode::ReadExceptionStatus,
            Self::Diagnostics { .. } => FunctionCode::Diagnostics,
            Self::GetCommEventCounter => FunctionCode::GetCommEventCounter,
            Self::GetCommEventLog => FunctionCode::GetCommEventLog,
            Self::WriteMultipleCoils { .. } => FunctionCode::WriteMultipleCoils,
            Self::WriteMultipleRegisters { .. } => FunctionCode::WriteMultipleRegisters,
            Self::ReportSlaveId => FunctionCode::ReportSlaveId,
            Self::ReadFileRecord(_) => FunctionCode::ReadFileRecord,
            Self::WriteFileRecord(_) => FunctionCode::WriteFileRecord,
            Self::MaskWriteRegister { .. } => FunctionCode::MaskWriteRegister,
            Self::ReadWriteMultipleRegisters { .. } => FunctionCode::ReadWriteMultipleRegisters,
            Self::ReadFifoQueue { .. } => FunctionCode::ReadFifoQueue,
            Self::ReadDeviceIdentification { .. } => FunctionCode::EncapsulatedInterface,
            Self::Unsupported { .. } => return None,
        };
        Some(function)
    }

    /// Decodes a request PDU (function code followed by its payload).
    ///
    /// Unknown function codes decode to [`Request::Unsupported`] so a slave can
    /// still answer them.
    pub fn decode(pdu: &[u8]) -> Result<Self, ModbusError> {
        let (&code, payload) = pdu.split_first().ok_or_else(|| {
            ModbusError::frame(FrameErrorKind::TooShort, "empty request PDU", None)
        })?;

        let Ok(function) = FunctionCode::try_from(code) else {
            return Ok(Self::Unsupported {
                function: code,
                payload: payload.to_vec(),
            });
        };

        let mut r = PduReader::new(code, payload);
        let request = match function {
            FunctionCode::ReadCoils => Self::ReadCoils {
                address: r.read_u16("address")?,
                quantity: r.read_u16("quantity")?,
            },
            FunctionCode::ReadDiscreteInputs => Self::ReadDiscreteInputs {
                address: r.read_u16("address")?,
                quantity: r.read_u16("quantity")?,
            },
            FunctionCode::ReadHoldingRegisters => Self::ReadHoldingRegisters {
                address: r.read_u16("address")?,
                quantity: r.read_u16("quantity")?,
            },
            FunctionCode::ReadInputRegisters => Self::ReadInputRegisters {
                address: r.read_u16("address")?,
                quantity: r.read_u16("quantity")?,
            },
            FunctionCode::WriteSingleCoil => Self::WriteSingleCoil {
                address: r.read_u16("address")?,
                value: coil_from_wire(code, r.read_u16("coil value")?)?,
            },
            FunctionCode::WriteSingleRegister => Self::WriteSingleRegister {
                address: r.read_u16("address")?,
                value: r.read_u16("register value")?,
            },
            FunctionCode::ReadExceptionStatus => Self::ReadExceptionStatus,
            FunctionCode::Diagnostics => Self::Diagnostics {
                sub_function: r.read_u16("sub-function")?,
                data: r.read_u16("diagnostic data")?,
            },
            FunctionCode::GetCommEventCounter => Self::GetCommEventCounter,
            FunctionCode::GetCommEventLog => Self::GetCommEventLog,
            FunctionCode::WriteMultipleCoils => {
                let address = r.read_u16("address")?;
                let quantity = r.read_u16("quantity")? as usize;
                let byte_count = r.read_u8("byte count")? as usize;
                expect_byte_count(code, byte_count, quantity.div_ceil(8))?;
                let packed = r.read_bytes(byte_count, "coil values")?;
                Self::WriteMultipleCoils {
                    address,
                    values: unpack_bits(packed, quantity),
                }
            }
            FunctionCode::WriteMultipleRegisters => {
                let address = r.read_u16("address")?;
                let quantity = r.read_u16("quantity")? as usize;
                let byte_count = r.read_u8("byte count")? as usize;
                expect_byte_count(code, byte_count, quantity * 2)?;
                Self::WriteMultipleRegisters {
                    address,
                    values: r.read_registers(quantity, "register values")?,
                }
            }
            FunctionCode::ReportSlaveId => Self::ReportSlaveId,
            FunctionCode::ReadFileRecord => {
                Self::ReadFileRecord(ReadFileRecordRequest::decode(&mut r)?)
            }
            FunctionCode::WriteFileRecord => Self::WriteFileRecord(decode_file_records(&mut r)?),
            FunctionCode::MaskWriteRegister => Self::MaskWriteRegister {
                address: r.read_u16("address")?,
                and_mask: r.read_u16("AND mask")?,
                or_mask: r.read_u16("OR mask")?,
            },
            FunctionCode::ReadWriteMultipleRegisters => {
                let read_address = r.read_u16("read address")?;
                let read_quantity = r.read_u16("read quantity")?;
                let write_address = r.read_u16("write address")?;
                let write_quantity = r.read_u16("write quantity")? as usize;
                let byte_count = r.read_u8("byte count")? as usize;
                expect_byte_count(code, byte_count, write_quantity * 2)?;
                Self::ReadWriteMultipleRegisters {
                    read_address,
                    read_quantity,
                    write_address,
                    values: r.read_registers(write_quantity, "register values")?,
                }
            }
            FunctionCode::ReadFifoQueue => Self::ReadFifoQueue {
                address: r.read_u16("FIFO pointer address")?,
            },
            FunctionCode::EncapsulatedInterface => {
                expect_mei_type(r.read_u8("MEI type")?)?;
                Self::ReadDeviceIdentification {
                    read_code: r.read_u8("read device id code")?,
                    object_id: r.read_u8("object id")?,
                }
            }
        };
        r.finish()?;

        Ok(request)
    }

    /// Builds the response to this request against a process image.
    ///
    /// Out of range quantities and every error the image reports become
    /// exception responses.
    pub fn respond(&self, image: &dyn ProcessImage) -> Response {
        self.execute(image)
            .unwrap_or_else(|code| self.exception(code))
    }

    /// Exception response to this request.
    pub fn exception(&self, code: ExceptionCode) -> Response {
        Response::Exception {
            function: self.function_code(),
            code,
        }
    }

    fn execute(&self, image: &dyn ProcessImage) -> ImageResult<Response> {
        let response = match self {
            Self::ReadCoils { address, quantity } => {
                check_span(*address, *quantity, MAX_READ_BITS)?;
                let bits = image.read_coils(*address, *quantity)?;
                Response::ReadCoils(expect_len(bits, *quantity)?)
            }
            Self::ReadDiscreteInputs { address, quantity } => {
                check_span(*address, *quantity, MAX_READ_BITS)?;
                let bits = image.read_discrete_inputs(*address, *quantity)?;
                Response::ReadDiscreteInputs(expect_len(bits, *quantity)?)
            }
            Self::ReadHoldingRegisters { address, quantity } => {
                check_span(*address, *quantity, MAX_READ_REGISTERS)?;
                let words = image.read_holding_registers(*address, *quantity)?;
                Response::ReadHoldingRegisters(expect_len(words, *quantity)?)
            }
            Self::ReadInputRegisters { address, quantity } => {
                check_span(*address, *quantity, MAX_READ_REGISTERS)?;
                let words = image.read_input_registers(*address, *quantity)?;
                Response::ReadInputRegisters(expect_len(words, *quantity)?)
            }
            Self::WriteSingleCoil { address, value } => {
                image.write_coil(*address, *value)?;
                Response::WriteSingleCoil {
                    address: *address,
                    value: *value,
                }
            }
            Self::WriteSingleRegister { address, value } => {
                image.write_register(*address, *value)?;
                Response::WriteSingleRegister {
                    address: *address,
                    value: *value,
                }
            }
            Self::ReadExceptionStatus => {
                Response::ReadExceptionStatus(image.read_exception_status()?)
            }
            Self::Diagnostics { sub_function, data } => {
                let data = match *sub_function {
                    RETURN_QUERY_DATA => *data,
                    _ => image.diagnostics(*sub_function, *data)?,
                };
                Response::Diagnostics {
                    sub_function: *sub_function,
                    data,
                }
            }
            Self::GetCommEventCounter => {
                let (status, event_count) = image.comm_event_counter()?;
                Response::GetCommEventCounter {
                    status,
                    event_count,
                }
            }
            Self::GetCommEventLog => {
                let log = image.comm_event_log()?;
                if log.events.len() > MAX_COMM_EVENTS {
                    return Err(ExceptionCode::ServerDeviceFailure);
                }
                Response::GetCommEventLog(log)
            }
            Self::WriteMultipleCoils { address, values } => {
                let quantity = quantity_of(values.len())?;
                check_span(*address, quantity, MAX_WRITE_BITS)?;
                image.write_coils(*address, values)?;
                Response::WriteMultipleCoils {
                    address: *address,
                    quantity,
                }
            }
            Self::WriteMultipleRegisters { address, values } => {
                let quantity = quantity_of(values.len())?;
                check_span(*address, quantity, MAX_WRITE_REGISTERS)?;
                image.write_registers(*address, values)?;
                Response::WriteMultipleRegisters {
                    address: *address,
                    quantity,
                }
            }
            Self::ReportSlaveId => Response::ReportSlaveId(image.report_slave_id()?),
            Self::ReadFileRecord(request) => {
                if request.is_empty() {
                    return Err(ExceptionCode::IllegalDataValue);
                }
                let records = request
                    .records()
                    .iter()
                    .map(|record| {
                        let words = image.read_file_record(
                            record.file_number,
                            record.record_number,
                            record.word_count,
                        )?;
                        expect_len(words, record.word_count)
                    })
                    .collect::<ImageResult<Vec<_>>>()?;
                Response::ReadFileRecord(records)
            }
            Self::WriteFileRecord(records) => {
                if records.is_empty() {
                    return Err(ExceptionCode::IllegalDataValue);
                }
                for record in records {
                    image.write_file_record(record.file_number, record.record_number, &record.data)?;
                }
                Response::WriteFileRecord(records.clone())
            }
            Self::MaskWriteRegister {
                address,
                and_mask,
                or_mask,
            } => {
                let current = image
                    .read_holding_registers(*address, 1)?
                    .first()
                    .copied()
                    .ok_or(ExceptionCode::ServerDeviceFailure)?;
                image.write_register(*address, (current & and_mask) | (or_mask & !and_mask))?;
                Response::MaskWriteRegister {
                    address: *address,
                    and_mask: *and_mask,
                    or_mask: *or_mask,
                }
            }
            Self::ReadWriteMultipleRegisters {
                read_address,
                read_quantity,
                write_address,
                values,
            } => {
                check_span(*read_address, *read_quantity, MAX_READ_REGISTERS)?;
                check_span(*write_address, quantity_of(values.len())?, MAX_READ_WRITE_REGISTERS)?;
                // The write is performed before the read
                image.write_registers(*write_address, values)?;
                let words = image.read_holding_registers(*read_address, *read_quantity)?;
                Response::ReadWriteMultipleRegisters(expect_len(words, *read_quantity)?)
            }
            Self::ReadFifoQueue { address } => {
                let values = image.read_fifo_queue(*address)?;
                if values.len() > MAX_FIFO_COUNT {
                    return Err(ExceptionCode::IllegalDataValue);
                }
                Response::ReadFifoQueue(values)
            }
            Self::ReadDeviceIdentification {
                read_code,
                object_id,
            } => {
                if !(1..=4).contains(read_code) {
                    return Err(ExceptionCode::IllegalDataValue);
                }
                Response::ReadDeviceIdentification(
                    image.device_identification(*read_code, *object_id)?,
                )
            }
            Self::Unsupported { .. } => return Err(ExceptionCode::IllegalFunction),
        };

        Ok(response)
    }
}

impl Pdu for Request {
    fn function_code(&self) -> u8 {
        match self {
            Self::Unsupported { function, .. } => *function,
            other => other.function().map_or(0, FunctionCode::code),
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.function_code());
        match self {
            Self::ReadCoils { address, quantity }
            | Self::ReadDiscreteInputs { address, quantity }
            | Self::ReadHoldingRegisters { address, quantity }
            | Self::ReadInputRegisters { address, quantity } => {
                buf.put_u16(*address);
                buf.put_u16(*quantity);
            }
            Self::WriteSingleCoil { address, value } => {
                buf.put_u16(*address);
                buf.put_u16(coil_to_wire(*value));
            }
            Self::WriteSingleRegister { address, value } => {
                buf.put_u16(*address);
                buf.put_u16(*value);
            }
            Self::Diagnostics { sub_function, data } => {
                buf.put_u16(*sub_function);
                buf.put_u16(*data);
            }
            Self::ReadExceptionStatus
            | Self::GetCommEventCounter
            | Self::GetCommEventLog
            | Self::ReportSlaveId => {}
            Self::WriteMultipleCoils { address, values } => {
                let packed = pack_bits(values);
                buf.put_u16(*address);
                buf.put_u16(values.len() as u16);
                buf.put_u8(packed.len() as u8);
                buf.put_slice(&packed);
            }
            Self::WriteMultipleRegisters { address, values } => {
                buf.put_u16(*address);
                buf.put_u16(values.len() as u16);
                put_registers(buf, values);
            }
            Self::ReadFileRecord(request) => request.encode(buf),
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
            Self::ReadWriteMultipleRegisters {
                read_address,
                read_quantity,
                write_address,
                values,
            } => {
                buf.put_u16(*read_address);
                buf.put_u16(*read_quantity);
                buf.put_u16(*write_address);
                buf.put_u16(values.len() as u16);
                put_registers(buf, values);
            }
            Self::ReadFifoQueue { address } => buf.put_u16(*address),
            Self::ReadDeviceIdentification {
                read_code,
                object_id,
            } => {
                buf.put_u8(MEI_READ_DEVICE_ID);
                buf.put_u8(*read_code);
                buf.put_u8(*object_id);
            }
            Self::Unsupported { payload, .. } => buf.put_slice(payload),
        }
    }
}

/// Byte count followed by big-endian registers.
pub(crate) fn put_registers(buf: &mut BytesMut, values: &[u16]) {
    buf.put_u8((values.len() * 2) as u8);
    for &value in values {
        buf.put_u16(value);
    }
}

fn expect_byte_count(function: u8, declared: usize, expected: usize) -> Result<(), ModbusError> {
    if declared != expected {
        return Err(ModbusError::frame(
            FrameErrorKind::LengthMismatch,
            format!(
                "function 0x{:02X}: byte count {} does not match quantity ({} expected)",
                function, declared, expected
            ),
            None,
        ));
    }
    Ok(())
}

/// Quantity must be within 1..=limit and the span must stay inside the
/// 16-bit address space.
fn check_span(address: u16, quantity: u16, limit: u16) -> ImageResult<()> {
    if quantity == 0 || quantity > limit {
        return Err(ExceptionCode::IllegalDataValue);
    }
    if address as u32 + quantity as u32 > 0x1_0000 {
        return Err(ExceptionCode::IllegalDataAddress);
    }
    Ok(())
}

fn quantity_of(len: usize) -> ImageResult<u16> {
    u16::try_from(len).map_err(|_| ExceptionCode::IllegalDataValue)
}

/// An image answering with the wrong amount of data is a device failure.
fn expect_len<T>(values: Vec<T>, quantity: u16) -> ImageResult<Vec<T>> {
    if values.len() != quantity as usize {
        return Err(ExceptionCode::ServerDeviceFailure);
    }
    Ok(values)
}
