use bytes::{BufMut, BytesMut};

use super::reader::PduReader;
use crate::errors::{FrameErrorKind, ModbusError};

/// Most event bytes a Get Comm Event Log response carries.
pub const MAX_COMM_EVENTS: usize = 64;

/// Body of a Get Comm Event Log (0x0C) response. `events` holds the most
/// recent event byte first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommEventLog {
    pub status: u16,
    pub event_count: u16,
    pub message_count: u16,
    pub events: Vec<u8>,
}

impl CommEventLog {
    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8((6 + self.events.len()) as u8);
        buf.put_u16(self.status);
        buf.put_u16(self.event_count);
        buf.put_u16(self.message_count);
        buf.put_slice(&self.events);
    }

    pub(crate) fn decode(r: &mut PduReader<'_>) -> Result<Self, ModbusError> {
        let byte_count = r.read_u8("byte count")? as usize;
        if byte_count < 6 {
            return Err(ModbusError::frame(
                FrameErrorKind::LengthMismatch,
                format!("event log byte count {} is below the 6 fixed bytes", byte_count),
                None,
            ));
        }

        Ok(Self {
            status: r.read_u16("status")?,
            event_count: r.read_u16("event count")?,
            message_count: r.read_u16("message count")?,
            events: r.read_bytes(byte_count - 6, "events")?.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_event_log() {
        let payload = [0x08, 0x00, 0x00, 0x01, 0x08, 0x01, 0x21, 0x20, 0x00];
        let mut reader = PduReader::new(0x0C, &payload);
        let log = CommEventLog::decode(&mut reader).unwrap();
        reader.finish().unwrap();

        assert_eq!(log.event_count, 0x0108);
        assert_eq!(log.message_count, 0x0121);
        assert_eq!(log.events, vec![0x20, 0x00]);

        let mut buf = BytesMut::new();
        log.encode(&mut buf);
        assert_eq!(&buf[..], &payload[..]);
    }

    #[test]
    fn test_byte_count_covers_fixed_fields() {
        let payload = [0x04, 0x00, 0x00, 0x01, 0x08];
        let mut reader = PduReader::new(0x0C, &payload);
        assert!(CommEventLog::decode(&mut reader).is_err());
    }
}
