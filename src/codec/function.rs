use crate::errors::ModbusError;

/// Bit set in the function code of an exception response.
pub const EXCEPTION_FLAG: u8 = 0x80;

/// MEI type of the Read Device Identification request, the only
/// encapsulated interface transport supported.
pub const MEI_READ_DEVICE_ID: u8 = 0x0E;

/// Function codes this engine knows how to frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FunctionCode {
    ReadCoils = 0x01,
    ReadDiscreteInputs = 0x02,
    ReadHoldingRegisters = 0x03,
    ReadInputRegisters = 0x04,
    WriteSingleCoil = 0x05,
    WriteSingleRegister = 0x06,
    ReadExceptionStatus = 0x07,
    /// Serial line diagnostics, selected by a sub-function
    Diagnostics = 0x08,
    GetCommEventCounter = 0x0B,
    GetCommEventLog = 0x0C,
    WriteMultipleCoils = 0x0F,
    WriteMultipleRegisters = 0x10,
    ReportSlaveId = 0x11,
    /// Read File Record, also used to read log entries
    ReadFileRecord = 0x14,
    /// Write File Record, also used to write log entries
    WriteFileRecord = 0x15,
    MaskWriteRegister = 0x16,
    ReadWriteMultipleRegisters = 0x17,
    ReadFifoQueue = 0x18,
    EncapsulatedInterface = 0x2B,
}

impl FunctionCode {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Function code carried by an exception response to this function.
    pub fn exception_code(self) -> u8 {
        self.code() | EXCEPTION_FLAG
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = ModbusError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        let function = match code {
            0x01 => Self::ReadCoils,
            0x02 => Self::ReadDiscreteInputs,
            0x03 => Self::ReadHoldingRegisters,
            0x04 => Self::ReadInputRegisters,
            0x05 => Self::WriteSingleCoil,
            0x06 => Self::WriteSingleRegister,
            0x07 => Self::ReadExceptionStatus,
            0x08 => Self::Diagnostics,
            0x0B => Self::GetCommEventCounter,
            0x0C => Self::GetCommEventLog,
            0x0F => Self::WriteMultipleCoils,
            0x10 => Self::WriteMultipleRegisters,
            0x11 => Self::ReportSlaveId,
            0x14 => Self::ReadFileRecord,
            0x15 => Self::WriteFileRecord,
            0x16 => Self::MaskWriteRegister,
            0x17 => Self::ReadWriteMultipleRegisters,
            0x18 => Self::ReadFifoQueue,
            0x2B => Self::EncapsulatedInterface,
            _ => return Err(ModbusError::unsupported_function(code)),
        };

        Ok(function)
    }
}

impl From<FunctionCode> for u8 {
    fn from(function: FunctionCode) -> Self {
        function.code()
    }
}

impl std::fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ReadCoils => "Read Coils",
            Self::ReadDiscreteInputs => "Read Discrete Inputs",
            Self::ReadHoldingRegisters => "Read Holding Registers",
            Self::ReadInputRegisters => "Read Input Registers",
            Self::WriteSingleCoil => "Write Single Coil",
            Self::WriteSingleRegister => "Write Single Register",
            Self::ReadExceptionStatus => "Read Exception Status",
            Self::Diagnostics => "Diagnostics",
            Self::GetCommEventCounter => "Get Comm Event Counter",
            Self::GetCommEventLog => "Get Comm Event Log",
            Self::WriteMultipleCoils => "Write Multiple Coils",
            Self::WriteMultipleRegisters => "Write Multiple Registers",
            Self::ReportSlaveId => "Report Slave ID",
            Self::ReadFileRecord => "Read File Record",
            Self::WriteFileRecord => "Write File Record",
            Self::MaskWriteRegister => "Mask Write Register",
            Self::ReadWriteMultipleRegisters => "Read/Write Multiple Registers",
            Self::ReadFifoQueue => "Read FIFO Queue",
            Self::EncapsulatedInterface => "Encapsulated Interface Transport",
        };
        write!(f, "{} (0x{:02X})", name, self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_code_conversion() {
        for code in 0u8..=0x7F {
            if let Ok(function) = FunctionCode::try_from(code) {
                assert_eq!(function.code(), code);
            }
        }

        assert_eq!(
            FunctionCode::try_from(0x03).unwrap(),
            FunctionCode::ReadHoldingRegisters
        );
        assert_eq!(FunctionCode::ReadHoldingRegisters.exception_code(), 0x83);
        assert_eq!(FunctionCode::try_from(0x08).unwrap(), FunctionCode::Diagnostics);
        assert_eq!(FunctionCode::GetCommEventLog.to_string(), "Get Comm Event Log (0x0C)");
    }

    #[test]
    fn test_unknown_function_code() {
        match FunctionCode::try_from(0x42) {
            Err(ModbusError::UnsupportedFunction { function }) => assert_eq!(function, 0x42),
            other => panic!("Expected UnsupportedFunction, got {:?}", other),
        }
    }
}
