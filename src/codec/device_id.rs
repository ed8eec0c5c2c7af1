use bytes::{BufMut, BytesMut};

use super::function::MEI_READ_DEVICE_ID;
use super::reader::PduReader;
use crate::errors::{FrameErrorKind, ModbusError};

/// One identification object, e.g. VendorName (0x00) or ProductCode (0x01).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceObject {
    pub id: u8,
    pub value: Vec<u8>,
}

impl DeviceObject {
    pub fn new(id: u8, value: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            value: value.into(),
        }
    }

    /// Object value as text, replacing invalid UTF-8.
    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}

/// Body of a Read Device Identification (0x2B / 0x0E) response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceIdentification {
    pub read_code: u8,
    pub conformity_level: u8,
    pub more_follows: bool,
    pub next_object_id: u8,
    pub objects: Vec<DeviceObject>,
    /// Trailing error byte a device may send in place of an empty object list.
    pub error: Option<u8>,
}

impl DeviceIdentification {
    pub fn object(&self, id: u8) -> Option<&DeviceObject> {
        self.objects.iter().find(|object| object.id == id)
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(MEI_READ_DEVICE_ID);
        buf.put_u8(self.read_code);
        buf.put_u8(self.conformity_level);
        buf.put_u8(if self.more_follows { 0xFF } else { 0x00 });
        buf.put_u8(self.next_object_id);
        buf.put_u8(self.objects.len() as u8);
        for object in &self.objects {
            buf.put_u8(object.id);
            buf.put_u8(object.value.len() as u8);
            buf.put_slice(&object.value);
        }
        if self.objects.is_empty() {
            buf.put_u8(self.error.unwrap_or(0));
        }
    }

    pub(crate) fn decode(reader: &mut PduReader<'_>) -> Result<Self, ModbusError> {
        expect_mei_type(reader.read_u8("MEI type")?)?;

        let read_code = reader.read_u8("read device id code")?;
        let conformity_level = reader.read_u8("conformity level")?;
        let more_follows = reader.read_u8("more follows")? != 0;
        let next_object_id = reader.read_u8("next object id")?;
        let count = reader.read_u8("object count")?;

        let mut objects = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let id = reader.read_u8("object id")?;
            let len = reader.read_u8("object length")? as usize;
            objects.push(DeviceObject::new(id, reader.read_bytes(len, "object value")?));
        }

        let error = if count == 0 {
            Some(reader.read_u8("error code")?)
        } else {
            None
        };

        Ok(Self {
            read_code,
            conformity_level,
            more_follows,
            next_object_id,
            objects,
            error,
        })
    }
}

pub(crate) fn expect_mei_type(mei_type: u8) -> Result<(), ModbusError> {
    if mei_type != MEI_READ_DEVICE_ID {
        return Err(ModbusError::frame(
            FrameErrorKind::UnsupportedSubFunction,
            format!(
                "MEI type 0x{:02X}, only 0x{:02X} is supported",
                mei_type, MEI_READ_DEVICE_ID
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
    fn test_decode_basic_identification() {
        let payload = [
            0x0E, 0x01, 0x01, 0x00, 0x00, 0x02, 0x00, 0x04, b'A', b'C', b'M', b'E', 0x01, 0x02,
            b'X', b'1',
        ];
        let mut reader = PduReader::new(0x2B, &payload);
        let id = DeviceIdentification::decode(&mut reader).unwrap();
        reader.finish().unwrap();

        assert_eq!(id.read_code, 1);
        assert!(!id.more_follows);
        assert_eq!(id.objects.len(), 2);
        assert_eq!(id.object(0x00).unwrap().as_str(), "ACME");
        assert_eq!(id.object(0x01).unwrap().as_str(), "X1");
        assert_eq!(id.error, None);

        let mut buf = BytesMut::new();
        id.encode(&mut buf);
        assert_eq!(&buf[..], &payload);
    }

    #[test]
    fn test_empty_object_list_carries_error_byte() {
        let payload = [0x0E, 0x04, 0x01, 0x00, 0x00, 0x00, 0x02];
        let mut reader = PduReader::new(0x2B, &payload);
        let id = DeviceIdentification::decode(&mut reader).unwrap();
        reader.finish().unwrap();
        assert!(id.objects.is_empty());
        assert_eq!(id.error, Some(0x02));
    }

    #[test]
    fn test_rejects_other_mei_types() {
        let payload = [0x0D, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00];
        let err = DeviceIdentification::decode(&mut PduReader::new(0x2B, &payload)).unwrap_err();
        assert!(err.to_string().contains("MEI type 0x0D"), "{}", err);
    }
}
