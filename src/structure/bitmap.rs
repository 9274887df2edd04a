use log::{trace, warn};

use crate::consts::BlockPointer;
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::util::error::{FsError, Resource, Result};

/// One-block free map, bit `i` set means unit `i` is in use.
pub struct Bitmap {
    pub(crate) block: BlockPointer,
    capacity: u32,
    resource: Resource,
    data: Vec<u8>,
}

impl Bitmap {
    pub fn new(block: BlockPointer, capacity: u32, resource: Resource, block_size: usize) -> Bitmap {
        debug_assert!(capacity as usize <= block_size * 8);
        Bitmap { block, capacity, resource, data: vec![0; block_size] }
    }

    pub fn read<A: DeviceDriver>(io: &IO<A>, block: BlockPointer, capacity: u32, resource: Resource) -> Result<Bitmap> {
        let data = io.read_block(block)?;
        Ok(Bitmap { block, capacity, resource, data })
    }

    /// Replaces the in-memory copy with the persisted one.
    pub fn reload<A: DeviceDriver>(&mut self, io: &IO<A>) -> Result<()> {
        self.data = io.read_block(self.block)?;
        Ok(())
    }

    pub fn write<A: DeviceDriver>(&self, io: &mut IO<A>) -> Result<()> {
        io.write_block(self.block, &self.data)?;
        Ok(())
    }

    /// Claims the lowest free unit. Exhaustion leaves the map untouched.
    pub fn allocate<A: DeviceDriver>(&mut self, io: &mut IO<A>) -> Result<u32> {
        self.reload(io)?;
        match (0..self.capacity).find(|&index| !self.is_set(index)) {
            Some(index) => {
                self.mark_used(io, index)?;
                trace!("allocated {} #{}", self.resource, index);
                Ok(index)
            }
            None => {
                warn!("no free {} left", self.resource);
                Err(FsError::Exhausted(self.resource))
            }
        }
    }

    pub fn is_set(&self, index: u32) -> bool {
        self.data[(index / 8) as usize] & (1 << (index % 8)) != 0
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn count_used(&self) -> u32 {
        (0..self.capacity).filter(|&index| self.is_set(index)).count() as u32
    }

    pub(crate) fn mark_used_mem(&mut self, index: u32) {
        self.data[(index / 8) as usize] |= 1 << (index % 8);
    }

    pub(crate) fn mark_used<A: DeviceDriver>(&mut self, io: &mut IO<A>, index: u32) -> Result<()> {
        self.check_index(index)?;
        self.mark_used_mem(index);
        self.write(io)
    }

    fn mark_free_mem(&mut self, index: u32) {
        self.data[(index / 8) as usize] &= !(1 << (index % 8));
    }

    /// Releases a unit. Freeing an already free unit is a no-op at the bit level.
    pub fn free<A: DeviceDriver>(&mut self, io: &mut IO<A>, index: u32) -> Result<()> {
        self.check_index(index)?;
        self.mark_free_mem(index);
        trace!("freed {} #{}", self.resource, index);
        self.write(io)
    }

    fn check_index(&self, index: u32) -> Result<()> {
        if index >= self.capacity {
            return Err(FsError::Invalid(format!("{} #{} out of range", self.resource, index)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::memory_drive::MemoryDrive;

    fn io() -> IO<MemoryDrive> {
        IO::new(MemoryDrive::new(16 * 1024, 512), 1024).unwrap()
    }

    #[test]
    fn read_write() {
        let mut io = io();
        let mut bitmap = Bitmap::new(1, 100, Resource::Block, 1024);
        bitmap.mark_used_mem(0);
        bitmap.mark_used_mem(42);
        bitmap.write(&mut io).unwrap();

        let read = Bitmap::read(&io, 1, 100, Resource::Block).unwrap();
        assert_eq!(bitmap.data, read.data);
        assert!(read.is_set(42));
        assert_eq!(read.count_used(), 2);
    }

    #[test]
    fn allocate_lowest_first() {
        let mut io = io();
        let mut bitmap = Bitmap::new(1, 100, Resource::Block, 1024);
        bitmap.write(&mut io).unwrap();

        assert_eq!(bitmap.allocate(&mut io).unwrap(), 0);
        assert_eq!(bitmap.allocate(&mut io).unwrap(), 1);
        assert_eq!(bitmap.allocate(&mut io).unwrap(), 2);

        bitmap.free(&mut io, 1).unwrap();
        assert!(!bitmap.is_set(1));
        assert_eq!(bitmap.allocate(&mut io).unwrap(), 1);
        assert_eq!(bitmap.data, Bitmap::read(&io, 1, 100, Resource::Block).unwrap().data);
    }

    #[test]
    fn allocate_until_exhausted() {
        let mut io = io();
        let mut bitmap = Bitmap::new(2, 10, Resource::Inode, 1024);
        bitmap.write(&mut io).unwrap();

        let mut seen = Vec::new();
        for _ in 0..10 {
            let index = bitmap.allocate(&mut io).unwrap();
            assert!(!seen.contains(&index));
            seen.push(index);
        }
        let before = io.read_block(2).unwrap();
        assert!(matches!(bitmap.allocate(&mut io), Err(FsError::Exhausted(Resource::Inode))));
        assert_eq!(io.read_block(2).unwrap(), before);
    }

    #[test]
    fn allocate_sees_persisted_state() {
        let mut io = io();
        let mut bitmap = Bitmap::new(1, 100, Resource::Block, 1024);
        bitmap.write(&mut io).unwrap();

        let mut other = Bitmap::read(&io, 1, 100, Resource::Block).unwrap();
        other.allocate(&mut io).unwrap();

        assert_eq!(bitmap.allocate(&mut io).unwrap(), 1);
    }

    #[test]
    fn free_is_idempotent() {
        let mut io = io();
        let mut bitmap = Bitmap::new(1, 100, Resource::Block, 1024);
        bitmap.free(&mut io, 5).unwrap();
        bitmap.free(&mut io, 5).unwrap();
        assert!(!bitmap.is_set(5));
        assert!(bitmap.free(&mut io, 100).is_err());
    }
}
