use std::io;

use log::trace;

use crate::consts::BlockPointer;
use crate::driver::DeviceDriver;
use raw::{raw_read_block, raw_write_block};

mod raw;

/// Block-granularity access on top of a sector device.
pub struct IO<A: DeviceDriver> {
    device: A,
    pub block_size: usize,
    pub block_count: u64,
}

impl<A: DeviceDriver> IO<A> {
    pub fn new(device: A, block_size: usize) -> io::Result<IO<A>> {
        let sector_size = device.get_sector_size();
        if block_size < sector_size || block_size % sector_size != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("block size {} must be a multiple of sector size {}", block_size, sector_size),
            ));
        }

        let block_count = device.get_size() / block_size as u64;
        Ok(IO { device, block_size, block_count })
    }

    pub fn write_block(&mut self, index: BlockPointer, block: &[u8]) -> io::Result<()> {
        if block.len() != self.block_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("block size mismatch - expected {}, got {}", self.block_size, block.len()),
            ));
        }
        self.check_index(index)?;

        trace!("write block {}", index);
        raw_write_block(&mut self.device, self.block_size, block, index)
    }

    pub fn read_block(&self, index: BlockPointer) -> io::Result<Vec<u8>> {
        self.check_index(index)?;

        trace!("read block {}", index);
        raw_read_block(&self.device, self.block_size, index)
    }

    pub fn zero_block(&mut self, index: BlockPointer) -> io::Result<()> {
        let zeros = vec![0; self.block_size];
        self.write_block(index, &zeros)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.device.flush()
    }

    pub fn into_device(self) -> A {
        self.device
    }

    fn check_index(&self, index: BlockPointer) -> io::Result<()> {
        if index as u64 >= self.block_count {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("block index {} out of range", index),
            ));
        }
        Ok(())
    }
}
