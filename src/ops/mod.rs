use std::time::SystemTime;

use log::{debug, info};

use crate::consts::{InodePointer, BLOCK_SIZE, FILE_NAME_LENGTH, ROOT_INODE};
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::ops::directory::{validate_name, DirEntry, Directory};
use crate::ops::file::{release_blocks, File};
use crate::ops::meta::{Metadata, Owner};
use crate::structure::inode::Inode;
use crate::structure::Structure;
use crate::util::error::{FsError, Result};
use crate::util::mode::{directory_mode, file_mode, ModeBits, ModeBitsHelper};

pub mod directory;
pub mod file;
pub mod meta;
pub mod path;

/// Volume-wide counters for `statfs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFs {
    pub blocks: u64,
    pub free_blocks: u64,
    pub files: u64,
    pub free_files: u64,
    pub block_size: u32,
    pub name_length: u32,
}

/// A mounted volume. Mutating operations take `&mut self`, so callers sharing a volume
/// across threads must wrap it in a single lock.
pub struct BlockFS<D: DeviceDriver> {
    structure: Structure<D>,
    owner: Owner,
}

impl<D: DeviceDriver> BlockFS<D> {
    /// Mounts the volume on `device`, formatting it first when it holds none.
    pub fn mount(device: D, owner: Owner) -> Result<BlockFS<D>> {
        let io = IO::new(device, BLOCK_SIZE)?;
        let structure = Structure::mount(io, owner)?;
        Ok(BlockFS { structure, owner })
    }

    /// Builds an empty volume on `device`, discarding whatever it held.
    pub fn format(device: D, owner: Owner) -> Result<BlockFS<D>> {
        let io = IO::new(device, BLOCK_SIZE)?;
        let structure = Structure::format(io, owner)?;
        Ok(BlockFS { structure, owner })
    }

    pub fn unmount(self) -> Result<D> {
        self.structure.unmount()
    }

    /// Pushes buffered writes down to the device without unmounting.
    pub fn sync(&mut self) -> Result<()> {
        self.structure.sync()
    }

    pub fn get_block_size(&self) -> usize {
        self.structure.get_block_size()
    }

    pub fn root(&self) -> InodePointer {
        ROOT_INODE
    }

    /// Numbers past the table and freed records are both reported as missing.
    pub fn get_inode(&self, ino: InodePointer) -> Result<Inode> {
        if ino >= self.structure.superblock.max_inum {
            return Err(FsError::NotFound);
        }
        let inode = self.structure.read_inode(ino)?;
        if !inode.valid {
            return Err(FsError::NotFound);
        }
        Ok(inode)
    }

    pub fn resolve(&self, path: &str) -> Result<Inode> {
        path::resolve(&self.structure, path, ROOT_INODE)
    }

    pub fn lookup(&self, parent: InodePointer, name: &[u8]) -> Result<Inode> {
        let entry = self.directory(parent)?.lookup(&self.structure, name)?;
        self.get_inode(entry.ino)
    }

    pub fn readdir(&self, ino: InodePointer) -> Result<Vec<DirEntry>> {
        self.directory(ino)?.entries(&self.structure)
    }

    pub fn mkdir(&mut self, parent: InodePointer, name: &[u8], permissions: ModeBits, owner: Owner) -> Result<Inode> {
        let mut directory = self.directory(parent)?;
        let inode = self.link_new(&mut directory, name, directory_mode(permissions), owner)?;
        directory.inode.link += 1;
        self.structure.write_inode(&directory.inode)?;
        info!("mkdir {:?} in {} -> inode {}", String::from_utf8_lossy(name), parent, inode.id);
        Ok(inode)
    }

    pub fn create(&mut self, parent: InodePointer, name: &[u8], permissions: ModeBits, owner: Owner) -> Result<Inode> {
        let mut directory = self.directory(parent)?;
        let inode = self.link_new(&mut directory, name, file_mode(permissions), owner)?;
        info!("create {:?} in {} -> inode {}", String::from_utf8_lossy(name), parent, inode.id);
        Ok(inode)
    }

    pub fn rmdir(&mut self, parent: InodePointer, name: &[u8]) -> Result<()> {
        let mut directory = self.directory(parent)?;
        let entry = directory.lookup(&self.structure, name)?;
        let target = self.directory(entry.ino)?;
        if !target.is_empty(&self.structure)? {
            return Err(FsError::NotEmpty);
        }

        directory.remove(&mut self.structure, name)?;
        directory.inode.link = directory.inode.link.saturating_sub(1);
        self.structure.write_inode(&directory.inode)?;
        self.discard(target.inode)?;
        info!("rmdir {:?} in {}", String::from_utf8_lossy(name), parent);
        Ok(())
    }

    pub fn unlink(&mut self, parent: InodePointer, name: &[u8]) -> Result<()> {
        let mut directory = self.directory(parent)?;
        let entry = directory.lookup(&self.structure, name)?;
        let mut inode = self.get_inode(entry.ino)?;
        if inode.is_directory() {
            return Err(FsError::IsDirectory);
        }

        directory.remove(&mut self.structure, name)?;
        inode.link = inode.link.saturating_sub(1);
        if inode.link == 0 {
            self.discard(inode)?;
        } else {
            inode.meta.touch_changed();
            self.structure.write_inode(&inode)?;
        }
        info!("unlink {:?} in {}", String::from_utf8_lossy(name), parent);
        Ok(())
    }

    pub fn read(&self, ino: InodePointer, offset: u64, size: usize) -> Result<Vec<u8>> {
        File::from_inode(self.get_inode(ino)?)?.read(&self.structure, offset, size)
    }

    pub fn write(&mut self, ino: InodePointer, offset: u64, data: &[u8]) -> Result<usize> {
        File::from_inode(self.get_inode(ino)?)?.write(&mut self.structure, offset, data)
    }

    pub fn truncate(&mut self, ino: InodePointer, size: u64) -> Result<Inode> {
        let mut file = File::from_inode(self.get_inode(ino)?)?;
        file.truncate(&mut self.structure, size)?;
        Ok(file.inode)
    }

    pub fn set_times(&mut self, ino: InodePointer, accessed: Option<SystemTime>, modified: Option<SystemTime>) -> Result<Inode> {
        let mut inode = self.get_inode(ino)?;
        if let Some(time) = accessed {
            inode.meta.accessed_at = time;
        }
        if let Some(time) = modified {
            inode.meta.modified_at = time;
        }
        inode.meta.touch_changed();
        self.structure.write_inode(&inode)?;
        Ok(inode)
    }

    pub fn statfs(&self) -> StatFs {
        let superblock = &self.structure.superblock;
        StatFs {
            blocks: superblock.max_dnum as u64,
            free_blocks: self.structure.free_block_count() as u64,
            files: superblock.max_inum as u64,
            free_files: self.structure.free_inode_count() as u64,
            block_size: superblock.block_size,
            name_length: FILE_NAME_LENGTH as u32,
        }
    }

    pub fn mkdir_path(&mut self, path: &str, permissions: ModeBits) -> Result<Inode> {
        let (parent, name) = path::split_parent(path)?;
        let parent = self.resolve(parent)?;
        self.mkdir(parent.id, name.as_bytes(), permissions, self.owner)
    }

    pub fn create_path(&mut self, path: &str, permissions: ModeBits) -> Result<Inode> {
        let (parent, name) = path::split_parent(path)?;
        let parent = self.resolve(parent)?;
        self.create(parent.id, name.as_bytes(), permissions, self.owner)
    }

    pub fn rmdir_path(&mut self, path: &str) -> Result<()> {
        let (parent, name) = path::split_parent(path)?;
        let parent = self.resolve(parent)?;
        self.rmdir(parent.id, name.as_bytes())
    }

    pub fn unlink_path(&mut self, path: &str) -> Result<()> {
        let (parent, name) = path::split_parent(path)?;
        let parent = self.resolve(parent)?;
        self.unlink(parent.id, name.as_bytes())
    }

    fn directory(&self, ino: InodePointer) -> Result<Directory> {
        Directory::from_inode(self.get_inode(ino)?)
    }

    /// Allocates and persists a new inode, then links it into `directory`.
    /// Directories get one zeroed data block. Everything is rolled back if linking fails.
    fn link_new(&mut self, directory: &mut Directory, name: &[u8], mode: ModeBits, owner: Owner) -> Result<Inode> {
        validate_name(name)?;
        if directory.lookup(&self.structure, name).is_ok() {
            return Err(FsError::AlreadyExists);
        }

        let ino = self.structure.allocate_inode()?;
        let is_directory = mode.is_directory();
        let mut inode = Inode::new(ino, mode, if is_directory { 2 } else { 1 }, Metadata::new(owner));
        if is_directory {
            match self.structure.allocate_zeroed_block() {
                Ok(block) => {
                    inode.direct[0] = Some(block);
                    inode.size = self.structure.get_block_size() as u64;
                }
                Err(e) => {
                    self.structure.free_inode(ino)?;
                    return Err(e);
                }
            }
        }

        let linked = self
            .structure
            .write_inode(&inode)
            .and_then(|_| directory.insert(&mut self.structure, name, ino));
        if let Err(e) = linked {
            debug!("rolling back inode {}: {}", ino, e);
            self.discard(inode)?;
            return Err(e);
        }
        Ok(inode)
    }

    /// Frees the inode's blocks, marks its record invalid and clears its bitmap bit.
    fn discard(&mut self, mut inode: Inode) -> Result<()> {
        release_blocks(&mut self.structure, &mut inode)?;
        inode.valid = false;
        inode.link = 0;
        inode.size = 0;
        self.structure.write_inode(&inode)?;
        self.structure.free_inode(inode.id)
    }
}
