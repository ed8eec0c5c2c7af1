use bytes::{BufMut, BytesMut};

use super::reader::PduReader;
use crate::errors::{FrameErrorKind, ModbusError};

/// Reference type every file record sub-request carries.
pub const FILE_REFERENCE_TYPE: u8 = 6;

/// Largest running size a Read File Record request may reach.
pub const MAX_RECORD_REQUEST_SIZE: usize = 248;

/// Record numbers are limited to 0..=9999.
pub const MAX_RECORD_NUMBER: u16 = 9999;

const SUB_REQUEST_LEN: usize = 7;

/// One sub-request of a Read File Record (0x14) request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordRequest {
    pub file_number: u16,
    pub record_number: u16,
    pub word_count: u16,
}

impl RecordRequest {
    pub fn new(file_number: u16, record_number: u16, word_count: u16) -> Self {
        Self {
            file_number,
            record_number,
            word_count,
        }
    }

    /// Bytes this sub-request accounts for against [`MAX_RECORD_REQUEST_SIZE`].
    pub fn size(&self) -> usize {
        SUB_REQUEST_LEN + self.word_count as usize * 2
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(FILE_REFERENCE_TYPE);
        buf.put_u16(self.file_number);
        buf.put_u16(self.record_number);
        buf.put_u16(self.word_count);
    }
}

/// Ordered list of record sub-requests packed into one PDU.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadFileRecordRequest {
    records: Vec<RecordRequest>,
}

impl ReadFileRecordRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sub-request, refusing it when the request would grow past
    /// [`MAX_RECORD_REQUEST_SIZE`].
    pub fn add(&mut self, record: RecordRequest) -> Result<(), ModbusError> {
        let size = self.size() + record.size();
        if size > MAX_RECORD_REQUEST_SIZE {
            return Err(ModbusError::frame(
                FrameErrorKind::TooLong,
                format!(
                    "read file record request would grow to {} bytes, limit is {}",
                    size, MAX_RECORD_REQUEST_SIZE
                ),
                None,
            ));
        }
        self.records.push(record);
        Ok(())
    }

    /// Running size: the byte count field plus every sub-request.
    pub fn size(&self) -> usize {
        1 + self.records.iter().map(RecordRequest::size).sum::<usize>()
    }

    pub fn records(&self) -> &[RecordRequest] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8((self.records.len() * SUB_REQUEST_LEN) as u8);
        for record in &self.records {
            record.encode(buf);
        }
    }

    pub(crate) fn decode(reader: &mut PduReader<'_>) -> Result<Self, ModbusError> {
        let byte_count = reader.read_u8("byte count")? as usize;
        if byte_count % SUB_REQUEST_LEN != 0 {
            return Err(ModbusError::frame(
                FrameErrorKind::LengthMismatch,
                format!(
                    "read file record byte count {} is not a multiple of {}",
                    byte_count, SUB_REQUEST_LEN
                ),
                None,
            ));
        }

        let mut records = Vec::with_capacity(byte_count / SUB_REQUEST_LEN);
        for _ in 0..byte_count / SUB_REQUEST_LEN {
            expect_reference_type(reader.read_u8("reference type")?)?;
            let file_number = reader.read_u16("file number")?;
            let record_number = reader.read_u16("record number")?;
            if record_number > MAX_RECORD_NUMBER {
                return Err(ModbusError::frame(
                    FrameErrorKind::InvalidFormat,
                    format!("record number {} out of range", record_number),
                    None,
                ));
            }
            let word_count = reader.read_u16("record length")?;
            records.push(RecordRequest::new(file_number, record_number, word_count));
        }

        Ok(Self { records })
    }
}

/// Record written by Write File Record (0x15) and echoed in its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub file_number: u16,
    pub record_number: u16,
    pub data: Vec<u16>,
}

impl FileRecord {
    pub fn new(file_number: u16, record_number: u16, data: Vec<u16>) -> Self {
        Self {
            file_number,
            record_number,
            data,
        }
    }

    fn size(&self) -> usize {
        SUB_REQUEST_LEN + self.data.len() * 2
    }
}

pub(crate) fn encode_file_records(records: &[FileRecord], buf: &mut BytesMut) {
    let byte_count: usize = records.iter().map(FileRecord::size).sum();
    buf.put_u8(byte_count as u8);
    for record in records {
        buf.put_u8(FILE_REFERENCE_TYPE);
        buf.put_u16(record.file_number);
        buf.put_u16(record.record_number);
        buf.put_u16(record.data.len() as u16);
        for &word in &record.data {
            buf.put_u16(word);
        }
    }
}

pub(crate) fn decode_file_records(
    reader: &mut PduReader<'_>,
) -> Result<Vec<FileRecord>, ModbusError> {
    let byte_count = reader.read_u8("byte count")? as usize;
    let mut block = PduReader::new(
        0x15,
        reader.read_bytes(byte_count, "file record data")?,
    );

    let mut records = Vec::new();
    while !block.is_empty() {
        expect_reference_type(block.read_u8("reference type")?)?;
        let file_number = block.read_u16("file number")?;
        let record_number = block.read_u16("record number")?;
        let length = block.read_u16("record length")? as usize;
        let data = block.read_registers(length, "record data")?;
        records.push(FileRecord::new(file_number, record_number, data));
    }

    Ok(records)
}

/// Encodes the sub-responses of a Read File Record response.
pub(crate) fn encode_record_data(records: &[Vec<u16>], buf: &mut BytesMut) {
    let byte_count: usize = records.iter().map(|words| 2 + words.len() * 2).sum();
    buf.put_u8(byte_count as u8);
    for words in records {
        buf.put_u8((1 + words.len() * 2) as u8);
        buf.put_u8(FILE_REFERENCE_TYPE);
        for &word in words {
            buf.put_u16(word);
        }
    }
}

pub(crate) fn decode_record_data(reader: &mut PduReader<'_>) -> Result<Vec<Vec<u16>>, ModbusError> {
    let byte_count = reader.read_u8("byte count")? as usize;
    let mut block = PduReader::new(
        0x14,
        reader.read_bytes(byte_count, "file record data")?,
    );

    let mut records = Vec::new();
    while !block.is_empty() {
        let length = block.read_u8("sub-response length")? as usize;
        if length == 0 || length % 2 == 0 {
            return Err(ModbusError::frame(
                FrameErrorKind::LengthMismatch,
                format!("invalid file record sub-response length {}", length),
                None,
            ));
        }
        expect_reference_type(block.read_u8("reference type")?)?;
        records.push(block.read_registers((length - 1) / 2, "record data")?);
    }

    Ok(records)
}

fn expect_reference_type(reference: u8) -> Result<(), ModbusError> {
    if reference != FILE_REFERENCE_TYPE {
        return Err(ModbusError::frame(
            FrameErrorKind::InvalidFormat,
            format!(
                "file record reference type {} (expected {})",
                reference, FILE_REFERENCE_TYPE
            ),
            None,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_size_limit() {
        let mut request = ReadFileRecordRequest::new();
        assert_eq!(request.size(), 1);

        // 1 + 2 * (7 + 2 * 60) = 255 would exceed the limit
        request.add(RecordRequest::new(4, 1, 60)).unwrap();
        assert_eq!(request.size(), 128);
        assert!(request.add(RecordRequest::new(4, 2, 60)).is_err());
        assert_eq!(request.len(), 1);

        // 128 + 7 + 2 * 56 = 247 still fits
        request.add(RecordRequest::new(4, 2, 56)).unwrap();
        assert_eq!(request.size(), 247);
    }

    #[test]
    fn test_request_encoding() {
        let mut request = ReadFileRecordRequest::new();
        request.add(RecordRequest::new(4, 1, 2)).unwrap();
        request.add(RecordRequest::new(3, 9, 2)).unwrap();

        let mut buf = BytesMut::new();
        request.encode(&mut buf);
        assert_eq!(
            &buf[..],
            &[
                0x0E, 0x06, 0x00, 0x04, 0x00, 0x01, 0x00, 0x02, 0x06, 0x00, 0x03, 0x00, 0x09,
                0x00, 0x02
            ]
        );

        let mut reader = PduReader::new(0x14, &buf);
        let decoded = ReadFileRecordRequest::decode(&mut reader).unwrap();
        reader.finish().unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_request_decode_validation() {
        // Reference type 5
        let payload = [0x07, 0x05, 0x00, 0x04, 0x00, 0x01, 0x00, 0x02];
        assert!(ReadFileRecordRequest::decode(&mut PduReader::new(0x14, &payload)).is_err());

        // Record number 10000
        let payload = [0x07, 0x06, 0x00, 0x04, 0x27, 0x10, 0x00, 0x02];
        assert!(ReadFileRecordRequest::decode(&mut PduReader::new(0x14, &payload)).is_err());

        // Byte count not a multiple of 7
        let payload = [0x06, 0x06, 0x00, 0x04, 0x00, 0x01, 0x00];
        assert!(ReadFileRecordRequest::decode(&mut PduReader::new(0x14, &payload)).is_err());
    }

    #[test]
    fn test_record_data_decoding() {
        // Two sub-responses from the Modbus application protocol example
        let payload = [
            0x0C, 0x05, 0x06, 0x0D, 0xFE, 0x00, 0x20, 0x05, 0x06, 0x33, 0xCD, 0x00, 0x40,
        ];
        let mut reader = PduReader::new(0x14, &payload);
        let records = decode_record_data(&mut reader).unwrap();
        reader.finish().unwrap();
        assert_eq!(records, vec![vec![0x0DFE, 0x0020], vec![0x33CD, 0x0040]]);

        let mut buf = BytesMut::new();
        encode_record_data(&records, &mut buf);
        assert_eq!(&buf[..], &payload);
    }
}
