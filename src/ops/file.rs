use log::{debug, warn};

use crate::consts::{BlockPointer, DIRECT_POINTERS, INDIRECT_POINTERS, MAX_FILE_SIZE, POINTERS_PER_BLOCK};
use crate::driver::DeviceDriver;
use crate::structure::inode::{decode_pointer, encode_pointer, Inode};
use crate::structure::Structure;
use crate::util::error::{FsError, Result};
use crate::util::serializable::u32_at;

/// Where the pointer for a logical block lives.
#[derive(Debug, PartialEq)]
enum Slot {
    Direct(usize),
    Indirect(usize, usize),
}

fn slot(logical: u64) -> Result<Slot> {
    if logical < DIRECT_POINTERS as u64 {
        return Ok(Slot::Direct(logical as usize));
    }
    let index = (logical - DIRECT_POINTERS as u64) as usize;
    if index / POINTERS_PER_BLOCK >= INDIRECT_POINTERS {
        return Err(FsError::FileTooLarge);
    }
    Ok(Slot::Indirect(index / POINTERS_PER_BLOCK, index % POINTERS_PER_BLOCK))
}

fn pointer_range(entry: usize) -> std::ops::Range<usize> {
    entry * 4..entry * 4 + 4
}

fn block_pointer<A: DeviceDriver>(structure: &Structure<A>, inode: &Inode, logical: u64) -> Result<Option<BlockPointer>> {
    match slot(logical)? {
        Slot::Direct(i) => Ok(inode.direct[i]),
        Slot::Indirect(i, entry) => match inode.indirect[i] {
            Some(table) => {
                let data = structure.read_block(table)?;
                Ok(decode_pointer(u32_at(&data, entry * 4)))
            }
            None => Ok(None),
        },
    }
}

/// Returns the block behind `logical`, binding a zeroed one (and its pointer block) when missing.
fn ensure_block<A: DeviceDriver>(structure: &mut Structure<A>, inode: &mut Inode, logical: u64) -> Result<BlockPointer> {
    if let Some(block) = block_pointer(structure, inode, logical)? {
        return Ok(block);
    }

    match slot(logical)? {
        Slot::Direct(i) => {
            let block = structure.allocate_zeroed_block()?;
            inode.direct[i] = Some(block);
            Ok(block)
        }
        Slot::Indirect(i, entry) => {
            let table = match inode.indirect[i] {
                Some(table) => table,
                None => {
                    let table = structure.allocate_zeroed_block()?;
                    inode.indirect[i] = Some(table);
                    table
                }
            };
            let block = structure.allocate_zeroed_block()?;
            let mut data = structure.read_block(table)?;
            data[pointer_range(entry)].copy_from_slice(&encode_pointer(Some(block)).to_le_bytes());
            if let Err(e) = structure.write_block(table, &data) {
                structure.free_block(block)?;
                return Err(e);
            }
            Ok(block)
        }
    }
}

/// Frees every data block at logical index `keep` or above, and pointer blocks left empty.
fn shrink_to<A: DeviceDriver>(structure: &mut Structure<A>, inode: &mut Inode, keep: u64) -> Result<()> {
    for i in (keep.min(DIRECT_POINTERS as u64) as usize)..DIRECT_POINTERS {
        if let Some(block) = inode.direct[i].take() {
            structure.free_block(block)?;
        }
    }

    for i in 0..INDIRECT_POINTERS {
        let Some(table) = inode.indirect[i] else {
            continue;
        };
        let base = (DIRECT_POINTERS + i * POINTERS_PER_BLOCK) as u64;
        let mut data = structure.read_block(table)?;
        let mut changed = false;
        for entry in 0..POINTERS_PER_BLOCK {
            if base + (entry as u64) < keep {
                continue;
            }
            if let Some(block) = decode_pointer(u32_at(&data, entry * 4)) {
                structure.free_block(block)?;
                data[pointer_range(entry)].fill(0);
                changed = true;
            }
        }

        if keep <= base {
            inode.indirect[i] = None;
            structure.free_block(table)?;
        } else if changed {
            structure.write_block(table, &data)?;
        }
    }
    Ok(())
}

/// Returns all data and pointer blocks of `inode` to the free map. The inode is not persisted.
pub fn release_blocks<A: DeviceDriver>(structure: &mut Structure<A>, inode: &mut Inode) -> Result<()> {
    shrink_to(structure, inode, 0)
}

/// Byte-range I/O over a regular file's block pointers.
pub struct File {
    pub inode: Inode,
}

impl File {
    pub fn from_inode(inode: Inode) -> Result<File> {
        if inode.is_directory() {
            return Err(FsError::IsDirectory);
        }
        Ok(File { inode })
    }

    /// Reads up to `length` bytes at `offset`, never past the recorded size.
    /// A logical block without a pointer contributes nothing.
    pub fn read<A: DeviceDriver>(&self, structure: &Structure<A>, offset: u64, length: usize) -> Result<Vec<u8>> {
        let size = self.inode.size;
        if offset >= size || length == 0 {
            return Ok(Vec::new());
        }
        let block_size = structure.get_block_size() as u64;
        let end = size.min(offset + length as u64);
        let first = offset / block_size;
        let last = (end - 1) / block_size;

        let mut result = Vec::with_capacity((end - offset) as usize);
        for logical in first..=last {
            let Some(block) = block_pointer(structure, &self.inode, logical)? else {
                continue;
            };
            let block_start = logical * block_size;
            let start = offset.max(block_start) - block_start;
            let stop = end.min(block_start + block_size) - block_start;
            let data = structure.read_block(block)?;
            result.extend_from_slice(&data[start as usize..stop as usize]);
        }
        Ok(result)
    }

    /// Writes `data` at `offset`, allocating blocks as needed so the file never has holes.
    /// Running out of space part way gives a short write; nothing written at all is an error.
    pub fn write<A: DeviceDriver>(&mut self, structure: &mut Structure<A>, offset: u64, data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        if offset >= MAX_FILE_SIZE {
            return Err(FsError::FileTooLarge);
        }
        let block_size = structure.get_block_size() as u64;
        let end = MAX_FILE_SIZE.min(offset + data.len() as u64);
        let first = offset / block_size;
        let last = (end - 1) / block_size;

        let mut written = 0usize;
        let mut failure = None;

        for logical in self.inode.size.div_ceil(block_size)..first {
            if let Err(e) = ensure_block(structure, &mut self.inode, logical) {
                failure = Some(e);
                break;
            }
        }

        if failure.is_none() {
            for logical in first..=last {
                let block_start = logical * block_size;
                let start = (offset.max(block_start) - block_start) as usize;
                let stop = (end.min(block_start + block_size) - block_start) as usize;
                let outcome = ensure_block(structure, &mut self.inode, logical).and_then(|block| {
                    let mut buffer = structure.read_block(block)?;
                    buffer[start..stop].copy_from_slice(&data[written..written + (stop - start)]);
                    structure.write_block(block, &buffer)
                });
                if let Err(e) = outcome {
                    failure = Some(e);
                    break;
                }
                written += stop - start;
            }
        }

        if written > 0 {
            self.inode.size = self.inode.size.max(offset + written as u64);
            self.inode.meta.touch_modified();
        }
        structure.write_inode(&self.inode)?;

        match failure {
            Some(e) if written == 0 => Err(e),
            Some(e) => {
                warn!("inode {}: short write of {}/{} bytes: {}", self.inode.id, written, data.len(), e);
                Ok(written)
            }
            None => {
                debug!("inode {}: wrote {} bytes at {}", self.inode.id, written, offset);
                Ok(written)
            }
        }
    }

    /// Sets the file size, freeing blocks past the end or binding zeroed blocks up to it.
    pub fn truncate<A: DeviceDriver>(&mut self, structure: &mut Structure<A>, size: u64) -> Result<()> {
        if size > MAX_FILE_SIZE {
            return Err(FsError::FileTooLarge);
        }
        let block_size = structure.get_block_size() as u64;
        let keep = size.div_ceil(block_size);

        if size < self.inode.size {
            shrink_to(structure, &mut self.inode, keep)?;
            let tail = (size % block_size) as usize;
            if tail != 0 {
                if let Some(block) = block_pointer(structure, &self.inode, keep - 1)? {
                    let mut buffer = structure.read_block(block)?;
                    buffer[tail..].fill(0);
                    structure.write_block(block, &buffer)?;
                }
            }
        } else if size > self.inode.size {
            for logical in 0..keep {
                if let Err(e) = ensure_block(structure, &mut self.inode, logical) {
                    structure.write_inode(&self.inode)?;
                    return Err(e);
                }
            }
        }

        debug!("inode {}: truncated from {} to {}", self.inode.id, self.inode.size, size);
        self.inode.size = size;
        self.inode.meta.touch_modified();
        structure.write_inode(&self.inode)
    }
}
