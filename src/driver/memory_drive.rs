use std::io;

use crate::driver::DeviceDriver;

/// A volatile drive kept entirely in memory.
pub struct MemoryDrive {
    data: Vec<u8>,
    sector_size: usize,
}

impl MemoryDrive {
    pub fn new(bytes: u64, sector_size: usize) -> MemoryDrive {
        MemoryDrive { data: vec![0; bytes as usize], sector_size }
    }

    fn range(&self, index: u64, len: usize) -> io::Result<std::ops::Range<usize>> {
        if len != self.sector_size || index >= self.get_sector_count() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("bad sector access: index {} length {}", index, len),
            ));
        }
        let start = index as usize * self.sector_size;
        Ok(start..start + self.sector_size)
    }
}

impl DeviceDriver for MemoryDrive {
    fn get_sector_count(&self) -> u64 {
        (self.data.len() / self.sector_size) as u64
    }

    fn get_sector_size(&self) -> usize {
        self.sector_size
    }

    fn read_sector(&self, index: u64, buffer: &mut [u8]) -> io::Result<()> {
        let range = self.range(index, buffer.len())?;
        buffer.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write_sector(&mut self, index: u64, data: &[u8]) -> io::Result<()> {
        let range = self.range(index, data.len())?;
        self.data[range].copy_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
