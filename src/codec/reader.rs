use bytes::Buf;

use crate::errors::{FrameErrorKind, ModbusError};

/// Bounds-checked cursor over a PDU payload.
///
/// Every read states what it expects so a truncated frame reports which field
/// ran past the end instead of panicking inside `Buf`.
pub(crate) struct PduReader<'a> {
    function: u8,
    buf: &'a [u8],
}

impl<'a> PduReader<'a> {
    pub fn new(function: u8, buf: &'a [u8]) -> Self {
        Self { function, buf }
    }

    fn ensure(&self, needed: usize, field: &str) -> Result<(), ModbusError> {
        if self.buf.remaining() < needed {
            return Err(ModbusError::frame(
                FrameErrorKind::TooShort,
                format!(
                    "function 0x{:02X}: {} needs {} bytes, {} available",
                    self.function,
                    field,
                    needed,
                    self.buf.remaining()
                ),
                None,
            ));
        }
        Ok(())
    }

    pub fn read_u8(&mut self, field: &str) -> Result<u8, ModbusError> {
        self.ensure(1, field)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_u16(&mut self, field: &str) -> Result<u16, ModbusError> {
        self.ensure(2, field)?;
        Ok(self.buf.get_u16())
    }

    pub fn read_bytes(&mut self, len: usize, field: &str) -> Result<&'a [u8], ModbusError> {
        self.ensure(len, field)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    pub fn read_registers(&mut self, count: usize, field: &str) -> Result<Vec<u16>, ModbusError> {
        let bytes = self.read_bytes(count * 2, field)?;
        Ok(bytes_to_registers(bytes))
    }

    /// Reads a byte-count prefixed block of registers.
    pub fn read_counted_registers(&mut self, field: &str) -> Result<Vec<u16>, ModbusError> {
        let byte_count = self.read_u8("byte count")? as usize;
        if byte_count % 2 != 0 {
            return Err(ModbusError::frame(
                FrameErrorKind::LengthMismatch,
                format!(
                    "function 0x{:02X}: odd byte count {} for {}",
                    self.function, byte_count, field
                ),
                None,
            ));
        }
        self.read_registers(byte_count / 2, field)
    }

    pub fn is_empty(&self) -> bool {
        !self.buf.has_remaining()
    }

    /// Fails if the payload carries bytes beyond what its fields declare.
    pub fn finish(self) -> Result<(), ModbusError> {
        if self.buf.has_remaining() {
            return Err(ModbusError::frame(
                FrameErrorKind::LengthMismatch,
                format!(
                    "function 0x{:02X}: {} unexpected trailing bytes",
                    self.function,
                    self.buf.remaining()
                ),
                Some(self.buf.to_vec()),
            ));
        }
        Ok(())
    }
}

/// Wire value of a coil switched on by Write Single Coil.
pub(crate) const COIL_ON: u16 = 0xFF00;

pub(crate) fn coil_to_wire(value: bool) -> u16 {
    if value {
        COIL_ON
    } else {
        0x0000
    }
}

pub(crate) fn coil_from_wire(function: u8, raw: u16) -> Result<bool, ModbusError> {
    match raw {
        COIL_ON => Ok(true),
        0x0000 => Ok(false),
        other => Err(ModbusError::frame(
            FrameErrorKind::InvalidFormat,
            format!(
                "function 0x{:02X}: coil value 0x{:04X} is neither 0xFF00 nor 0x0000",
                function, other
            ),
            None,
        )),
    }
}

pub(crate) fn bytes_to_registers(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}

/// Packs coil states LSB first, eight per byte.
pub(crate) fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut packed = vec![0u8; bits.len().div_ceil(8)];
    for (index, _) in bits.iter().enumerate().filter(|(_, &bit)| bit) {
        packed[index / 8] |= 1 << (index % 8);
    }
    packed
}

pub(crate) fn unpack_bits(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count)
        .map(|index| bytes[index / 8] & (1 << (index % 8)) != 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_reports_truncation() {
        let mut reader = PduReader::new(0x03, &[0x04, 0x00]);
        assert_eq!(reader.read_u8("byte count").unwrap(), 4);
        let err = reader.read_registers(2, "registers").unwrap_err();
        assert!(err.to_string().contains("registers needs 4 bytes"), "{}", err);
    }

    #[test]
    fn test_reader_rejects_trailing_bytes() {
        let mut reader = PduReader::new(0x06, &[0x00, 0x01, 0x00, 0x02, 0xFF]);
        reader.read_u16("address").unwrap();
        reader.read_u16("value").unwrap();
        assert!(reader.finish().is_err());
    }

    #[test]
    fn test_coil_values() {
        assert_eq!(coil_to_wire(true), 0xFF00);
        assert!(coil_from_wire(0x05, 0xFF00).unwrap());
        assert!(!coil_from_wire(0x05, 0x0000).unwrap());
        assert!(coil_from_wire(0x05, 0x00FF).is_err());
    }

    #[test]
    fn test_bit_packing() {
        let bits = [true, false, true, true, false, false, true, true, true, false];
        let packed = pack_bits(&bits);
        assert_eq!(packed, vec![0xCD, 0x01]);
        assert_eq!(unpack_bits(&packed, bits.len()), bits.to_vec());
        assert!(pack_bits(&[]).is_empty());
    }
}
