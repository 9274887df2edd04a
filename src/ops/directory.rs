use log::debug;

use crate::consts::{BlockPointer, InodePointer, DIRENTS_PER_BLOCK, DIRENT_SIZE, FILE_NAME_LENGTH};
use crate::driver::DeviceDriver;
use crate::structure::inode::Inode;
use crate::structure::Structure;
use crate::util::error::{FsError, Resource, Result};
use crate::util::serializable::{u16_at, u32_at, ByteSerializable, KnownSize};

const VALID_OFFSET: usize = 4;
const LENGTH_OFFSET: usize = 6;
const NAME_OFFSET: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct DirEntry {
    pub ino: InodePointer,
    pub valid: bool,
    pub name: Vec<u8>,
}

impl DirEntry {
    pub fn new(ino: InodePointer, name: &[u8]) -> DirEntry {
        DirEntry { ino, valid: true, name: name.to_vec() }
    }
}

impl KnownSize for DirEntry {
    fn size_on_disk() -> usize {
        DIRENT_SIZE
    }
}

impl ByteSerializable for DirEntry {
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; DIRENT_SIZE];
        let length = self.name.len().min(FILE_NAME_LENGTH);
        bytes[0..4].copy_from_slice(&self.ino.to_le_bytes());
        bytes[VALID_OFFSET] = self.valid as u8;
        bytes[LENGTH_OFFSET..LENGTH_OFFSET + 2].copy_from_slice(&(length as u16).to_le_bytes());
        bytes[NAME_OFFSET..NAME_OFFSET + length].copy_from_slice(&self.name[..length]);
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        let length = (u16_at(bytes, LENGTH_OFFSET) as usize).min(FILE_NAME_LENGTH);
        DirEntry {
            ino: u32_at(bytes, 0),
            valid: bytes[VALID_OFFSET] != 0,
            name: bytes[NAME_OFFSET..NAME_OFFSET + length].to_vec(),
        }
    }
}

/// Rejects names that cannot be stored in a directory slot.
pub fn validate_name(name: &[u8]) -> Result<()> {
    if name.is_empty() || name == b"." || name == b".." || name.contains(&b'/') || name.contains(&0) {
        return Err(FsError::Invalid(format!("bad file name {:?}", String::from_utf8_lossy(name))));
    }
    if name.len() > FILE_NAME_LENGTH {
        return Err(FsError::NameTooLong);
    }
    Ok(())
}

fn slot_range(slot: usize) -> std::ops::Range<usize> {
    slot * DIRENT_SIZE..(slot + 1) * DIRENT_SIZE
}

struct Location {
    block: BlockPointer,
    slot: usize,
    entry: DirEntry,
}

/// A directory inode and the dirent arrays in its direct blocks.
pub struct Directory {
    pub inode: Inode,
}

impl Directory {
    pub fn from_inode(inode: Inode) -> Result<Directory> {
        if !inode.is_directory() {
            return Err(FsError::NotDirectory);
        }
        Ok(Directory { inode })
    }

    pub fn read<A: DeviceDriver>(structure: &Structure<A>, ino: InodePointer) -> Result<Directory> {
        Directory::from_inode(structure.read_inode(ino)?)
    }

    fn find<A: DeviceDriver>(&self, structure: &Structure<A>, name: &[u8]) -> Result<Option<Location>> {
        for block in self.inode.direct_blocks() {
            let data = structure.read_block(block)?;
            for slot in 0..DIRENTS_PER_BLOCK {
                let entry = DirEntry::from_bytes(&data[slot_range(slot)]);
                if entry.valid && entry.name == name {
                    return Ok(Some(Location { block, slot, entry }));
                }
            }
        }
        Ok(None)
    }

    pub fn lookup<A: DeviceDriver>(&self, structure: &Structure<A>, name: &[u8]) -> Result<DirEntry> {
        match self.find(structure, name)? {
            Some(location) => Ok(location.entry),
            None => Err(FsError::NotFound),
        }
    }

    /// Links `name` to `target`. Free slots in existing blocks are reused before a new block is bound.
    pub fn insert<A: DeviceDriver>(&mut self, structure: &mut Structure<A>, name: &[u8], target: InodePointer) -> Result<()> {
        validate_name(name)?;
        if self.find(structure, name)?.is_some() {
            return Err(FsError::AlreadyExists);
        }
        let entry = DirEntry::new(target, name);

        let blocks: Vec<BlockPointer> = self.inode.direct_blocks().collect();
        for block in blocks {
            let mut data = structure.read_block(block)?;
            let free = (0..DIRENTS_PER_BLOCK).find(|&slot| !DirEntry::from_bytes(&data[slot_range(slot)]).valid);
            if let Some(slot) = free {
                data[slot_range(slot)].copy_from_slice(&entry.to_bytes());
                structure.write_block(block, &data)?;
                debug!("dir {}: linked {:?} -> {} in block {} slot {}", self.inode.id, String::from_utf8_lossy(name), target, block, slot);
                return self.touch(structure);
            }
        }

        let pointer = self
            .inode
            .direct
            .iter()
            .position(Option::is_none)
            .ok_or(FsError::Exhausted(Resource::DirectorySlot))?;
        let block = structure.allocate_block()?;
        let mut data = vec![0u8; structure.get_block_size()];
        data[slot_range(0)].copy_from_slice(&entry.to_bytes());
        if let Err(e) = structure.write_block(block, &data) {
            structure.free_block(block)?;
            return Err(e);
        }

        self.inode.direct[pointer] = Some(block);
        self.inode.size += structure.get_block_size() as u64;
        debug!("dir {}: linked {:?} -> {} in new block {}", self.inode.id, String::from_utf8_lossy(name), target, block);
        self.touch(structure)
    }

    /// Invalidates the entry in place. Blocks are kept for later inserts.
    pub fn remove<A: DeviceDriver>(&mut self, structure: &mut Structure<A>, name: &[u8]) -> Result<DirEntry> {
        let location = self.find(structure, name)?.ok_or(FsError::NotFound)?;
        let mut data = structure.read_block(location.block)?;
        let mut entry = location.entry.clone();
        entry.valid = false;
        data[slot_range(location.slot)].copy_from_slice(&entry.to_bytes());
        structure.write_block(location.block, &data)?;
        debug!("dir {}: unlinked {:?}", self.inode.id, String::from_utf8_lossy(name));
        self.touch(structure)?;
        Ok(location.entry)
    }

    pub fn entries<A: DeviceDriver>(&self, structure: &Structure<A>) -> Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for block in self.inode.direct_blocks() {
            let data = structure.read_block(block)?;
            entries.extend(
                data.chunks_exact(DIRENT_SIZE)
                    .map(DirEntry::from_bytes)
                    .filter(|entry| entry.valid),
            );
        }
        Ok(entries)
    }

    pub fn is_empty<A: DeviceDriver>(&self, structure: &Structure<A>) -> Result<bool> {
        Ok(self.entries(structure)?.is_empty())
    }

    fn touch<A: DeviceDriver>(&mut self, structure: &mut Structure<A>) -> Result<()> {
        self.inode.meta.touch_modified();
        structure.write_inode(&self.inode)
    }
}
