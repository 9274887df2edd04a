use std::io;

pub mod file_drive;
pub mod memory_drive;

/// A sector-addressed backing store.
pub trait DeviceDriver {
    fn get_sector_count(&self) -> u64;
    fn get_sector_size(&self) -> usize;
    fn read_sector(&self, index: u64, buffer: &mut [u8]) -> io::Result<()>;
    fn write_sector(&mut self, index: u64, data: &[u8]) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;

    fn get_size(&self) -> u64 {
        self.get_sector_count() * self.get_sector_size() as u64
    }
}
