use crate::consts::{BlockPointer, InodePointer};
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::structure::inode::Inode;
use crate::util::error::{FsError, Result};
use crate::util::serializable::{ByteSerializable, KnownSize};

/// Fixed-slot array of inode records starting at `table_index`.
pub struct InodeTable {
    table_index: BlockPointer,
    pub(crate) inode_count: u32,
}

impl InodeTable {
    pub fn new(table_index: BlockPointer, inode_count: u32) -> InodeTable {
        InodeTable { table_index, inode_count }
    }

    pub fn block_count(&self, block_size: usize) -> u32 {
        self.inode_count.div_ceil(Self::inodes_per_block(block_size))
    }

    /// Zeroes every table block, leaving all slots invalid.
    pub fn clear<A: DeviceDriver>(&self, io: &mut IO<A>) -> Result<()> {
        for i in 0..self.block_count(io.block_size) {
            io.zero_block(self.table_index + i)?;
        }
        Ok(())
    }

    pub fn read_inode<A: DeviceDriver>(&self, io: &IO<A>, index: InodePointer) -> Result<Inode> {
        self.check_index(index)?;
        let inode_block = self.inode_block(index, io.block_size);
        let offset = Self::inode_offset(index, io.block_size);

        let block = io.read_block(inode_block)?;
        Ok(Inode::from_bytes(&block[offset..offset + Inode::size_on_disk()]))
    }

    /// Read-modify-write of the block holding the record; neighbours are preserved.
    pub fn write_inode<A: DeviceDriver>(&self, io: &mut IO<A>, inode: &Inode) -> Result<()> {
        self.check_index(inode.id)?;
        let inode_block = self.inode_block(inode.id, io.block_size);
        let offset = Self::inode_offset(inode.id, io.block_size);

        let mut block = io.read_block(inode_block)?;
        block[offset..offset + Inode::size_on_disk()].copy_from_slice(&inode.to_bytes());
        io.write_block(inode_block, &block)?;
        Ok(())
    }

    #[inline]
    fn inodes_per_block(block_size: usize) -> u32 {
        (block_size / Inode::size_on_disk()) as u32
    }

    #[inline]
    fn inode_block(&self, index: InodePointer, block_size: usize) -> BlockPointer {
        self.table_index + index / Self::inodes_per_block(block_size)
    }

    #[inline]
    fn inode_offset(index: InodePointer, block_size: usize) -> usize {
        (index % Self::inodes_per_block(block_size)) as usize * Inode::size_on_disk()
    }

    fn check_index(&self, index: InodePointer) -> Result<()> {
        if index >= self.inode_count {
            return Err(FsError::Invalid(format!("inode {} out of range", index)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{BLOCK_SIZE, DISK_SIZE, INODE_TABLE_INDEX, MAX_INUM, SECTOR_SIZE};
    use crate::driver::memory_drive::MemoryDrive;
    use crate::ops::meta::{Metadata, Owner};
    use crate::util::mode::file_mode;

    fn setup() -> (IO<MemoryDrive>, InodeTable) {
        let mut io = IO::new(MemoryDrive::new(DISK_SIZE, SECTOR_SIZE), BLOCK_SIZE).unwrap();
        let table = InodeTable::new(INODE_TABLE_INDEX, MAX_INUM);
        table.clear(&mut io).unwrap();
        (io, table)
    }

    #[test]
    fn table_geometry() {
        let (_, table) = setup();
        assert_eq!(table.block_count(BLOCK_SIZE), 5);
        assert_eq!(table.inode_block(0, BLOCK_SIZE), 3);
        assert_eq!(table.inode_block(16, BLOCK_SIZE), 4);
        assert_eq!(InodeTable::inode_offset(17, BLOCK_SIZE), 256);
        assert_eq!(table.inode_block(MAX_INUM - 1, BLOCK_SIZE), 7);
    }

    #[test]
    fn read_write_inode() {
        let (mut io, table) = setup();

        let mut first = Inode::new(16, file_mode(0o644), 1, Metadata::new(Owner::default()));
        let mut second = Inode::new(17, file_mode(0o600), 1, Metadata::new(Owner::default()));
        first.size = 10;
        second.direct[0] = Some(12);
        table.write_inode(&mut io, &first).unwrap();
        table.write_inode(&mut io, &second).unwrap();

        assert_eq!(table.read_inode(&io, 16).unwrap(), first);
        assert_eq!(table.read_inode(&io, 17).unwrap(), second);

        first.size = 20;
        table.write_inode(&mut io, &first).unwrap();
        assert_eq!(table.read_inode(&io, 16).unwrap().size, 20);
        assert_eq!(table.read_inode(&io, 17).unwrap(), second);
        assert!(!table.read_inode(&io, 18).unwrap().valid);
    }

    #[test]
    fn rejects_out_of_range() {
        let (mut io, table) = setup();
        assert!(matches!(table.read_inode(&io, MAX_INUM), Err(FsError::Invalid(_))));
        let inode = Inode::new(MAX_INUM, file_mode(0o644), 1, Metadata::new(Owner::default()));
        assert!(table.write_inode(&mut io, &inode).is_err());
    }
}
