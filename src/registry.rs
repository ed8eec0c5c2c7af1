//! Function code to response codec table.
//!
//! The serial readers use [`FrameShape`] to work out how many bytes follow the
//! function code of a frame that carries no length field; every transport then
//! decodes the PDU through the same entry.

use crate::codec::reader::{bytes_to_registers, coil_from_wire, unpack_bits, PduReader};
use crate::codec::{CommEventLog, DeviceIdentification, FunctionCode, Response, EXCEPTION_FLAG};
use crate::codec::records::{decode_file_records, decode_record_data};
use crate::errors::{FrameErrorKind, ModbusError};

/// How the length of a response payload is found on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameShape {
    /// Exactly this many payload bytes.
    Fixed(usize),
    /// One byte count followed by that many bytes.
    ByteCount,
    /// Two-byte byte count followed by that many bytes.
    WordCount,
    /// MEI Read Device Identification: five header bytes, then a counted
    /// list of objects, or one error byte when the count is zero.
    DeviceIdentification,
}

/// Exception responses carry a single exception code.
pub const EXCEPTION_SHAPE: FrameShape = FrameShape::Fixed(1);

type DecodeFn = fn(&mut PduReader<'_>) -> Result<Response, ModbusError>;

pub struct ResponseCodec {
    pub function: FunctionCode,
    pub shape: FrameShape,
    decode: DecodeFn,
}

impl ResponseCodec {
    /// Decodes a response payload (the bytes after the function code).
    pub fn decode(&self, payload: &[u8]) -> Result<Response, ModbusError> {
        let mut reader = PduReader::new(self.function.code(), payload);
        let response = (self.decode)(&mut reader)?;
        reader.finish()?;
        Ok(response)
    }
}

impl std::fmt::Debug for ResponseCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCodec")
            .field("function", &self.function)
            .field("shape", &self.shape)
            .finish()
    }
}

const fn codec(function: FunctionCode, shape: FrameShape, decode: DecodeFn) -> ResponseCodec {
    ResponseCodec {
        function,
        shape,
        decode,
    }
}

static CODECS: [ResponseCodec; 19] = [
    codec(FunctionCode::ReadCoils, FrameShape::ByteCount, read_coils),
    codec(FunctionCode::ReadDiscreteInputs, FrameShape::ByteCount, read_discrete_inputs),
    codec(FunctionCode::ReadHoldingRegisters, FrameShape::ByteCount, read_holding_registers),
    codec(FunctionCode::ReadInputRegisters, FrameShape::ByteCount, read_input_registers),
    codec(FunctionCode::WriteSingleCoil, FrameShape::Fixed(4), write_single_coil),
    codec(FunctionCode::WriteSingleRegister, FrameShape::Fixed(4), write_single_register),
    codec(FunctionCode::ReadExceptionStatus, FrameShape::Fixed(1), read_exception_status),
    codec(FunctionCode::Diagnostics, FrameShape::Fixed(4), diagnostics),
    codec(FunctionCode::GetCommEventCounter, FrameShape::Fixed(4), get_comm_event_counter),
    codec(FunctionCode::GetCommEventLog, FrameShape::ByteCount, get_comm_event_log),
    codec(FunctionCode::WriteMultipleCoils, FrameShape::Fixed(4), write_multiple_coils),
    codec(FunctionCode::WriteMultipleRegisters, FrameShape::Fixed(4), write_multiple_registers),
    codec(FunctionCode::ReportSlaveId, FrameShape::ByteCount, report_slave_id),
    codec(FunctionCode::ReadFileRecord, FrameShape::ByteCount, read_file_record),
    codec(FunctionCode::WriteFileRecord, FrameShape::ByteCount, write_file_record),
    codec(FunctionCode::MaskWriteRegister, FrameShape::Fixed(6), mask_write_register),
    codec(FunctionCode::ReadWriteMultipleRegisters, FrameShape::ByteCount, read_write_multiple_registers),
    codec(FunctionCode::ReadFifoQueue, FrameShape::WordCount, read_fifo_queue),
    codec(FunctionCode::EncapsulatedInterface, FrameShape::DeviceIdentification, read_device_identification),
];

/// Finds the codec for a (non-exception) response function code.
pub fn lookup(function: u8) -> Result<&'static ResponseCodec, ModbusError> {
    CODECS
        .iter()
        .find(|codec| codec.function.code() == function)
        .ok_or_else(|| ModbusError::unsupported_function(function))
}

/// Payload shape of a response, exception responses included.
pub fn response_shape(function: u8) -> Result<FrameShape, ModbusError> {
    if function & EXCEPTION_FLAG != 0 {
        return Ok(EXCEPTION_SHAPE);
    }
    lookup(function).map(|codec| codec.shape)
}

fn read_bits(r: &mut PduReader<'_>) -> Result<Vec<bool>, ModbusError> {
    let byte_count = r.read_u8("byte count")? as usize;
    let packed = r.read_bytes(byte_count, "bit values")?;
    Ok(unpack_bits(packed, byte_count * 8))
}

fn read_coils(r: &mut PduReader<'_>) -> Result<Response, ModbusError> {
    Ok(Response::ReadCoils(read_bits(r)?))
}

fn read_discrete_inputs(r: &mut PduReader<'_>) -> Result<Response, ModbusError> {
    Ok(Response::ReadDiscreteInputs(read_bits(r)?))
}

fn read_holding_registers(r: &mut PduReader<'_>) -> Result<Response, ModbusError> {
    Ok(Response::ReadHoldingRegisters(
        r.read_counted_registers("register values")?,
    ))
}

fn read_input_registers(r: &mut PduReader<'_>) -> Result<Response, ModbusError> {
    Ok(Response::ReadInputRegisters(
        r.read_counted_registers("register values")?,
    ))
}

fn write_single_coil(r: &mut PduReader<'_>) -> Result<Response, ModbusError> {
    let address = r.read_u16("address")?;
    let value = coil_from_wire(FunctionCode::WriteSingleCoil.code(), r.read_u16("coil value")?)?;
    Ok(Response::WriteSingleCoil { address, value })
}

fn write_single_register(r: &mut PduReader<'_>) -> Result<Response, ModbusError> {
    Ok(Response::WriteSingleRegister {
        address: r.read_u16("address")?,
        value: r.read_u16("register value")?,
    })
}

fn read_exception_status(r: &mut PduReader<'_>) -> Result<Response, ModbusError> {
    Ok(Response::ReadExceptionStatus(r.read_u8("exception status")?))
}

fn diagnostics(r: &mut PduReader<'_>) -> Result<Response, ModbusError> {
    Ok(Response::Diagnostics {
        sub_function: r.read_u16("sub-function")?,
        data: r.read_u16("diagnostic data")?,
    })
}

fn get_comm_event_counter(r: &mut PduReader<'_>) -> Result<Response, ModbusError> {
    Ok(Response::GetCommEventCounter {
        status: r.read_u16("status")?,
        event_count: r.read_u16("event count")?,
    })
}

fn get_comm_event_log(r: &mut PduReader<'_>) -> Result<Response, ModbusError> {
    Ok(Response::GetCommEventLog(CommEventLog::decode(r)?))
}

fn write_multiple_coils(r: &mut PduReader<'_>) -> Result<Response, ModbusError> {
    Ok(Response::WriteMultipleCoils {
        address: r.read_u16("address")?,
        quantity: r.read_u16("quantity")?,
    })
}

fn write_multiple_registers(r: &mut PduReader<'_>) -> Result<Response, ModbusError> {
    Ok(Response::WriteMultipleRegisters {
        address: r.read_u16("address")?,
        quantity: r.read_u16("quantity")?,
    })
}

fn report_slave_id(r: &mut PduReader<'_>) -> Result<Response, ModbusError> {
    let byte_count = r.read_u8("byte count")? as usize;
    Ok(Response::ReportSlaveId(
        r.read_bytes(byte_count, "slave id data")?.to_vec(),
    ))
}

fn read_file_record(r: &mut PduReader<'_>) -> Result<Response, ModbusError> {
    Ok(Response::ReadFileRecord(decode_record_data(r)?))
}

fn write_file_record(r: &mut PduReader<'_>) -> Result<Response, ModbusError> {
    Ok(Response::WriteFileRecord(decode_file_records(r)?))
}

fn mask_write_register(r: &mut PduReader<'_>) -> Result<Response, ModbusError> {
    Ok(Response::MaskWriteRegister {
        address: r.read_u16("address")?,
        and_mask: r.read_u16("AND mask")?,
        or_mask: r.read_u16("OR mask")?,
    })
}

fn read_write_multiple_registers(r: &mut PduReader<'_>) -> Result<Response, ModbusError> {
    Ok(Response::ReadWriteMultipleRegisters(
        r.read_counted_registers("register values")?,
    ))
}

fn read_fifo_queue(r: &mut PduReader<'_>) -> Result<Response, ModbusError> {
    let byte_count = r.read_u16("byte count")? as usize;
    let fifo_count = r.read_u16("FIFO count")? as usize;
    if byte_count != 2 + fifo_count * 2 {
        return Err(ModbusError::frame(
            FrameErrorKind::LengthMismatch,
            format!(
                "FIFO byte count {} does not match {} queued registers",
                byte_count, fifo_count
            ),
            None,
        ));
    }
    let values = r.read_bytes(fifo_count * 2, "FIFO values")?;
    Ok(Response::ReadFifoQueue(bytes_to_registers(values)))
}

fn read_device_identification(r: &mut PduReader<'_>) -> Result<Response, ModbusError> {
    Ok(Response::ReadDeviceIdentification(
        DeviceIdentification::decode(r)?,
    ))
}
