use crate::consts::{
    BlockPointer, BLOCK_SIZE, DATA_BITMAP_INDEX, DATA_REGION_INDEX, INODE_BITMAP_INDEX, INODE_TABLE_INDEX,
    MAX_DNUM, MAX_INUM, SUPERBLOCK_INDEX,
};
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::util::error::{FsError, Result};
use crate::util::serializable::{u32_at, ByteSerializable, KnownSize};

const MAGIC: u32 = 0x5c3a_11f5;

#[derive(Debug, PartialEq, Clone)]
pub struct SuperBlock {
    pub magic: u32,
    pub block_size: u32,
    pub max_inum: u32,
    pub max_dnum: u32,
    pub i_bitmap_blk: BlockPointer,
    pub d_bitmap_blk: BlockPointer,
    pub i_start_blk: BlockPointer,
    pub d_start_blk: BlockPointer,
}

impl SuperBlock {
    /// The superblock describing the fixed layout this build understands.
    pub fn new() -> SuperBlock {
        SuperBlock {
            magic: MAGIC,
            block_size: BLOCK_SIZE as u32,
            max_inum: MAX_INUM,
            max_dnum: MAX_DNUM,
            i_bitmap_blk: INODE_BITMAP_INDEX,
            d_bitmap_blk: DATA_BITMAP_INDEX,
            i_start_blk: INODE_TABLE_INDEX,
            d_start_blk: DATA_REGION_INDEX,
        }
    }

    /// Returns `None` when block 0 carries no magic number, i.e. the device is unformatted.
    pub fn read<A: DeviceDriver>(io: &IO<A>) -> Result<Option<SuperBlock>> {
        let buffer = io.read_block(SUPERBLOCK_INDEX)?;
        if u32_at(&buffer, 0) != MAGIC {
            return Ok(None);
        }
        Ok(Some(SuperBlock::from_bytes(&buffer)))
    }

    pub fn write<A: DeviceDriver>(&self, io: &mut IO<A>) -> Result<()> {
        let mut buffer = self.to_bytes();
        buffer.resize(io.block_size, 0);
        io.write_block(SUPERBLOCK_INDEX, &buffer)?;
        Ok(())
    }

    /// Checks that an on-disk superblock matches the compiled layout and fits the device.
    pub fn validate(&self, device_blocks: u64) -> Result<()> {
        let expected = SuperBlock::new();
        if *self != expected {
            return Err(FsError::Invalid(format!("unsupported volume layout: {:?}", self)));
        }
        let required = self.d_start_blk as u64 + self.max_dnum as u64;
        if device_blocks < required {
            return Err(FsError::Invalid(format!(
                "device holds {} blocks, volume needs {}",
                device_blocks, required
            )));
        }
        Ok(())
    }
}

impl Default for SuperBlock {
    fn default() -> Self {
        SuperBlock::new()
    }
}

impl KnownSize for SuperBlock {
    fn size_on_disk() -> usize {
        8 * std::mem::size_of::<u32>()
    }
}

impl ByteSerializable for SuperBlock {
    fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(SuperBlock::size_on_disk());
        for value in [
            self.magic,
            self.block_size,
            self.max_inum,
            self.max_dnum,
            self.i_bitmap_blk,
            self.d_bitmap_blk,
            self.i_start_blk,
            self.d_start_blk,
        ] {
            buffer.extend_from_slice(&value.to_le_bytes());
        }
        buffer
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        SuperBlock {
            magic: u32_at(bytes, 0),
            block_size: u32_at(bytes, 4),
            max_inum: u32_at(bytes, 8),
            max_dnum: u32_at(bytes, 12),
            i_bitmap_blk: u32_at(bytes, 16),
            d_bitmap_blk: u32_at(bytes, 20),
            i_start_blk: u32_at(bytes, 24),
            d_start_blk: u32_at(bytes, 28),
        }
    }
}
