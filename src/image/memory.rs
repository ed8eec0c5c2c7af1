use std::sync::RwLock;

use super::{ImageResult, ProcessImage};
use crate::codec::ExceptionCode;

#[derive(Debug, Default)]
struct Tables {
    coils: Vec<bool>,
    discrete_inputs: Vec<bool>,
    holding_registers: Vec<u16>,
    input_registers: Vec<u16>,
}

/// Fixed-size in-memory process image.
///
/// Each table starts zeroed; accesses outside a table answer Illegal Data
/// Address. Useful as a simulator and for tests.
#[derive(Debug, Default)]
pub struct MemoryImage {
    tables: RwLock<Tables>,
}

impl MemoryImage {
    pub fn new(
        coils: usize,
        discrete_inputs: usize,
        holding_registers: usize,
        input_registers: usize,
    ) -> Self {
        Self {
            tables: RwLock::new(Tables {
                coils: vec![false; coils],
                discrete_inputs: vec![false; discrete_inputs],
                holding_registers: vec![0; holding_registers],
                input_registers: vec![0; input_registers],
            }),
        }
    }

    pub fn set_discrete_inputs(&self, address: u16, values: &[bool]) -> ImageResult<()> {
        let mut tables = self.write()?;
        store(&mut tables.discrete_inputs, address, values)
    }

    pub fn set_input_registers(&self, address: u16, values: &[u16]) -> ImageResult<()> {
        let mut tables = self.write()?;
        store(&mut tables.input_registers, address, values)
    }

    fn read(&self) -> ImageResult<std::sync::RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| ExceptionCode::ServerDeviceFailure)
    }

    fn write(&self) -> ImageResult<std::sync::RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| ExceptionCode::ServerDeviceFailure)
    }
}

fn range(len: usize, address: u16, quantity: usize) -> ImageResult<std::ops::Range<usize>> {
    let start = address as usize;
    let end = start + quantity;
    if end > len {
        return Err(ExceptionCode::IllegalDataAddress);
    }
    Ok(start..end)
}

fn load<T: Copy>(table: &[T], address: u16, quantity: u16) -> ImageResult<Vec<T>> {
    Ok(table[range(table.len(), address, quantity as usize)?].to_vec())
}

fn store<T: Copy>(table: &mut [T], address: u16, values: &[T]) -> ImageResult<()> {
    let range = range(table.len(), address, values.len())?;
    table[range].copy_from_slice(values);
    Ok(())
}

impl ProcessImage for MemoryImage {
    fn read_coils(&self, address: u16, quantity: u16) -> ImageResult<Vec<bool>> {
        load(&self.read()?.coils, address, quantity)
    }

    fn read_discrete_inputs(&self, address: u16, quantity: u16) -> ImageResult<Vec<bool>> {
        load(&self.read()?.discrete_inputs, address, quantity)
    }

    fn read_holding_registers(&self, address: u16, quantity: u16) -> ImageResult<Vec<u16>> {
        load(&self.read()?.holding_registers, address, quantity)
    }

    fn read_input_registers(&self, address: u16, quantity: u16) -> ImageResult<Vec<u16>> {
        load(&self.read()?.input_registers, address, quantity)
    }

    fn write_coil(&self, address: u16, value: bool) -> ImageResult<()> {
        store(&mut self.write()?.coils, address, &[value])
    }

    fn write_coils(&self, address: u16, values: &[bool]) -> ImageResult<()> {
        store(&mut self.write()?.coils, address, values)
    }

    fn write_register(&self, address: u16, value: u16) -> ImageResult<()> {
        store(&mut self.write()?.holding_registers, address, &[value])
    }

    fn write_registers(&self, address: u16, values: &[u16]) -> ImageResult<()> {
        store(&mut self.write()?.holding_registers, address, values)
    }
}
