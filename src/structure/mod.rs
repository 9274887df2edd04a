use log::{debug, info};

use crate::consts::{BlockPointer, InodePointer, BLOCK_SIZE, ROOT_INODE};
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::ops::meta::{Metadata, Owner};
use crate::structure::bitmap::Bitmap;
use crate::structure::inode::Inode;
use crate::structure::inode_table::InodeTable;
use crate::structure::superblock::SuperBlock;
use crate::util::error::{FsError, Resource, Result};
use crate::util::format::PrettySize;
use crate::util::mode::directory_mode;

pub mod bitmap;
pub mod inode;
pub mod inode_table;
pub mod superblock;

/// Everything a mounted volume keeps in memory: the device, the superblock and both bitmaps.
pub struct Structure<A: DeviceDriver> {
    pub(crate) io: IO<A>,
    pub(crate) superblock: SuperBlock,
    pub(crate) inode_map: Bitmap,
    pub(crate) data_map: Bitmap,
    inode_table: InodeTable,
}

impl<A: DeviceDriver> Structure<A> {
    pub fn is_initialized(io: &IO<A>) -> Result<bool> {
        Ok(SuperBlock::read(io)?.is_some())
    }

    /// Lays out an empty volume: superblock, bitmaps, inode table and the root directory.
    pub fn format(mut io: IO<A>, owner: Owner) -> Result<Structure<A>> {
        let superblock = SuperBlock::new();
        superblock.validate(io.block_count)?;
        superblock.write(&mut io)?;

        let mut inode_map = Bitmap::new(superblock.i_bitmap_blk, superblock.max_inum, Resource::Inode, io.block_size);
        inode_map.write(&mut io)?;
        let mut data_map = Bitmap::new(superblock.d_bitmap_blk, superblock.max_dnum, Resource::Block, io.block_size);
        data_map.write(&mut io)?;

        inode_map.mark_used(&mut io, ROOT_INODE)?;
        data_map.mark_used(&mut io, 0)?;

        let inode_table = InodeTable::new(superblock.i_start_blk, superblock.max_inum);
        inode_table.clear(&mut io)?;
        io.zero_block(superblock.d_start_blk)?;

        let mut root = Inode::new(ROOT_INODE, directory_mode(0o755), 2, Metadata::new(owner));
        root.size = BLOCK_SIZE as u64;
        root.direct[0] = Some(superblock.d_start_blk);
        inode_table.write_inode(&mut io, &root)?;
        io.flush()?;

        info!(
            "formatted volume: {} inodes, {} data blocks ({})",
            superblock.max_inum,
            superblock.max_dnum,
            PrettySize(superblock.max_dnum as u64 * io.block_size as u64)
        );
        Ok(Structure { io, superblock, inode_map, data_map, inode_table })
    }

    /// Loads superblock and bitmaps, formatting the device first when it carries no volume.
    pub fn mount(io: IO<A>, owner: Owner) -> Result<Structure<A>> {
        let superblock = match SuperBlock::read(&io)? {
            Some(superblock) => superblock,
            None => {
                info!("no volume found, formatting");
                return Structure::format(io, owner);
            }
        };
        superblock.validate(io.block_count)?;

        let inode_map = Bitmap::read(&io, superblock.i_bitmap_blk, superblock.max_inum, Resource::Inode)?;
        let data_map = Bitmap::read(&io, superblock.d_bitmap_blk, superblock.max_dnum, Resource::Block)?;
        let inode_table = InodeTable::new(superblock.i_start_blk, superblock.max_inum);
        info!(
            "mounted volume: {}/{} inodes, {}/{} data blocks in use",
            inode_map.count_used(),
            superblock.max_inum,
            data_map.count_used(),
            superblock.max_dnum
        );
        Ok(Structure { io, superblock, inode_map, data_map, inode_table })
    }

    pub fn sync(&mut self) -> Result<()> {
        self.io.flush()?;
        Ok(())
    }

    /// Flushes the device and hands it back. In-memory state is dropped.
    pub fn unmount(mut self) -> Result<A> {
        self.io.flush()?;
        info!("unmounted volume");
        Ok(self.io.into_device())
    }

    pub fn get_block_size(&self) -> usize {
        self.io.block_size
    }

    pub fn allocate_inode(&mut self) -> Result<InodePointer> {
        self.inode_map.allocate(&mut self.io)
    }

    /// Returns an absolute block number inside the data region.
    pub fn allocate_block(&mut self) -> Result<BlockPointer> {
        let index = self.data_map.allocate(&mut self.io)?;
        Ok(self.superblock.d_start_blk + index)
    }

    pub fn allocate_zeroed_block(&mut self) -> Result<BlockPointer> {
        let block = self.allocate_block()?;
        if let Err(e) = self.io.zero_block(block) {
            self.free_block(block)?;
            return Err(e.into());
        }
        Ok(block)
    }

    pub fn free_inode(&mut self, index: InodePointer) -> Result<()> {
        debug!("free inode {}", index);
        self.inode_map.free(&mut self.io, index)
    }

    pub fn free_block(&mut self, block: BlockPointer) -> Result<()> {
        let index = block
            .checked_sub(self.superblock.d_start_blk)
            .ok_or_else(|| FsError::Invalid(format!("block {} is not a data block", block)))?;
        self.data_map.free(&mut self.io, index)
    }

    pub fn read_inode(&self, index: InodePointer) -> Result<Inode> {
        self.inode_table.read_inode(&self.io, index)
    }

    pub fn write_inode(&mut self, inode: &Inode) -> Result<()> {
        self.inode_table.write_inode(&mut self.io, inode)
    }

    pub fn read_block(&self, index: BlockPointer) -> Result<Vec<u8>> {
        Ok(self.io.read_block(index)?)
    }

    pub fn write_block(&mut self, index: BlockPointer, block: &[u8]) -> Result<()> {
        Ok(self.io.write_block(index, block)?)
    }

    pub fn free_inode_count(&self) -> u32 {
        self.inode_map.capacity() - self.inode_map.count_used()
    }

    pub fn free_block_count(&self) -> u32 {
        self.data_map.capacity() - self.data_map.count_used()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::consts::{DATA_REGION_INDEX, DISK_SIZE, MAX_DNUM, MAX_INUM, SECTOR_SIZE};
    use crate::driver::memory_drive::MemoryDrive;

    pub(crate) fn formatted() -> Structure<MemoryDrive> {
        let io = IO::new(MemoryDrive::new(DISK_SIZE, SECTOR_SIZE), BLOCK_SIZE).unwrap();
        Structure::format(io, Owner::default()).unwrap()
    }

    #[test]
    fn format_creates_root() {
        let structure = formatted();
        let root = structure.read_inode(ROOT_INODE).unwrap();
        assert_eq!(root.id, 0);
        assert!(root.valid);
        assert!(root.is_directory());
        assert_eq!(root.link, 2);
        assert_eq!(root.size, BLOCK_SIZE as u64);
        assert_eq!(root.direct[0], Some(DATA_REGION_INDEX));
        assert!(root.direct[1..].iter().all(Option::is_none));
        assert!(root.indirect.iter().all(Option::is_none));

        assert!(structure.inode_map.is_set(0));
        assert_eq!(structure.inode_map.count_used(), 1);
        assert!(structure.data_map.is_set(0));
        assert_eq!(structure.data_map.count_used(), 1);
    }

    #[test]
    fn mount_formats_blank_device() {
        let io = IO::new(MemoryDrive::new(DISK_SIZE, SECTOR_SIZE), BLOCK_SIZE).unwrap();
        assert!(!Structure::is_initialized(&io).unwrap());
        let structure = Structure::mount(io, Owner::default()).unwrap();
        assert!(Structure::is_initialized(&structure.io).unwrap());
        assert!(structure.read_inode(ROOT_INODE).unwrap().is_directory());
    }

    #[test]
    fn remount_keeps_bitmaps() {
        let mut structure = formatted();
        assert_eq!(structure.allocate_inode().unwrap(), 1);
        assert_eq!(structure.allocate_block().unwrap(), DATA_REGION_INDEX + 1);

        let device = structure.unmount().unwrap();
        let io = IO::new(device, BLOCK_SIZE).unwrap();
        let mut structure = Structure::mount(io, Owner::default()).unwrap();
        assert_eq!(structure.free_inode_count(), MAX_INUM - 2);
        assert_eq!(structure.free_block_count(), MAX_DNUM - 2);
        assert_eq!(structure.allocate_inode().unwrap(), 2);
    }

    #[test]
    fn inode_exhaustion() {
        let mut structure = formatted();
        for expected in 1..MAX_INUM {
            assert_eq!(structure.allocate_inode().unwrap(), expected);
        }
        assert!(matches!(structure.allocate_inode(), Err(FsError::Exhausted(Resource::Inode))));

        structure.free_inode(7).unwrap();
        assert_eq!(structure.allocate_inode().unwrap(), 7);
    }

    #[test]
    fn free_block_rejects_metadata_blocks() {
        let mut structure = formatted();
        assert!(matches!(structure.free_block(2), Err(FsError::Invalid(_))));
    }

    #[test]
    fn mount_rejects_small_device() {
        let io = IO::new(MemoryDrive::new(64 * BLOCK_SIZE as u64, SECTOR_SIZE), BLOCK_SIZE).unwrap();
        assert!(matches!(Structure::format(io, Owner::default()), Err(FsError::Invalid(_))));
    }
}
