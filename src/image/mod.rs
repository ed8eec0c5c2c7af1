//! Slave-side data the listeners answer requests from.
//!
//! A [`ProcessImage`] owns the registers, coils and files of one unit. Every
//! method defaults to [`ExceptionCode::IllegalFunction`], so an image only
//! implements the functions its device supports. Locking is the image's own
//! business; the listeners call it from concurrent connection tasks.

mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use crate::codec::{CommEventLog, DeviceIdentification, ExceptionCode};

pub use memory::MemoryImage;

pub type ImageResult<T> = Result<T, ExceptionCode>;

pub trait ProcessImage: Send + Sync {
    fn read_coils(&self, _address: u16, _quantity: u16) -> ImageResult<Vec<bool>> {
        Err(ExceptionCode::IllegalFunction)
    }

    fn read_discrete_inputs(&self, _address: u16, _quantity: u16) -> ImageResult<Vec<bool>> {
        Err(ExceptionCode::IllegalFunction)
    }

    fn read_holding_registers(&self, _address: u16, _quantity: u16) -> ImageResult<Vec<u16>> {
        Err(ExceptionCode::IllegalFunction)
    }

    fn read_input_registers(&self, _address: u16, _quantity: u16) -> ImageResult<Vec<u16>> {
        Err(ExceptionCode::IllegalFunction)
    }

    fn write_coil(&self, _address: u16, _value: bool) -> ImageResult<()> {
        Err(ExceptionCode::IllegalFunction)
    }

    fn write_coils(&self, _address: u16, _values: &[bool]) -> ImageResult<()> {
        Err(ExceptionCode::IllegalFunction)
    }

    fn write_register(&self, _address: u16, _value: u16) -> ImageResult<()> {
        Err(ExceptionCode::IllegalFunction)
    }

    fn write_registers(&self, _address: u16, _values: &[u16]) -> ImageResult<()> {
        Err(ExceptionCode::IllegalFunction)
    }

    fn read_exception_status(&self) -> ImageResult<u8> {
        Err(ExceptionCode::IllegalFunction)
    }

    /// Answer data of a Diagnostics sub-function. Return Query Data (0x0000)
    /// is echoed without calling this.
    fn diagnostics(&self, _sub_function: u16, _data: u16) -> ImageResult<u16> {
        Err(ExceptionCode::IllegalFunction)
    }

    /// Status word and event count for Get Comm Event Counter.
    fn comm_event_counter(&self) -> ImageResult<(u16, u16)> {
        Err(ExceptionCode::IllegalFunction)
    }

    fn comm_event_log(&self) -> ImageResult<CommEventLog> {
        Err(ExceptionCode::IllegalFunction)
    }

    /// Device specific Report Slave ID payload (slave id, run indicator, ...).
    fn report_slave_id(&self) -> ImageResult<Vec<u8>> {
        Err(ExceptionCode::IllegalFunction)
    }

    fn read_file_record(&self, _file: u16, _record: u16, _count: u16) -> ImageResult<Vec<u16>> {
        Err(ExceptionCode::IllegalFunction)
    }

    fn write_file_record(&self, _file: u16, _record: u16, _data: &[u16]) -> ImageResult<()> {
        Err(ExceptionCode::IllegalFunction)
    }

    fn read_fifo_queue(&self, _address: u16) -> ImageResult<Vec<u16>> {
        Err(ExceptionCode::IllegalFunction)
    }

    fn device_identification(
        &self,
        _read_code: u8,
        _object_id: u8,
    ) -> ImageResult<DeviceIdentification> {
        Err(ExceptionCode::IllegalFunction)
    }
}

/// Resolves the process image a request addressed to `unit_id` runs against.
///
/// `None` means no image is available and the request is answered with an
/// Illegal Function exception.
pub trait ProcessImageSource: Send + Sync + 'static {
    fn process_image(&self, unit_id: u8) -> Option<Arc<dyn ProcessImage>>;
}

/// One image shared by every unit id.
impl ProcessImageSource for Arc<dyn ProcessImage> {
    fn process_image(&self, _unit_id: u8) -> Option<Arc<dyn ProcessImage>> {
        Some(Arc::clone(self))
    }
}

impl ProcessImageSource for Option<Arc<dyn ProcessImage>> {
    fn process_image(&self, _unit_id: u8) -> Option<Arc<dyn ProcessImage>> {
        self.clone()
    }
}

/// Gateway style: one image per unit id, unknown units have none.
impl ProcessImageSource for HashMap<u8, Arc<dyn ProcessImage>> {
    fn process_image(&self, unit_id: u8) -> Option<Arc<dyn ProcessImage>> {
        self.get(&unit_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Registers;

    impl ProcessImage for Registers {
        fn read_holding_registers(&self, address: u16, quantity: u16) -> ImageResult<Vec<u16>> {
            Ok((address..address + quantity).collect())
        }
    }

    #[test]
    fn test_default_methods_report_illegal_function() {
        let image = Registers;
        assert_eq!(image.read_holding_registers(2, 3), Ok(vec![2, 3, 4]));
        assert_eq!(image.read_coils(0, 1), Err(ExceptionCode::IllegalFunction));
        assert_eq!(image.write_register(0, 1), Err(ExceptionCode::IllegalFunction));
        assert_eq!(image.report_slave_id(), Err(ExceptionCode::IllegalFunction));
    }

    #[test]
    fn test_sources() {
        let image: Arc<dyn ProcessImage> = Arc::new(Registers);

        assert!(image.process_image(7).is_some());
        assert!(None::<Arc<dyn ProcessImage>>.process_image(1).is_none());

        let mut units = HashMap::new();
        units.insert(1u8, Arc::clone(&image));
        assert!(units.process_image(1).is_some());
        assert!(units.process_image(2).is_none());
    }
}
