use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use libc::c_int;
use log::{debug, info, warn};

use crate::consts::{InodePointer, MAX_INUM};
use crate::driver::DeviceDriver;
use crate::ops::meta::Owner;
use crate::ops::BlockFS;
use crate::structure::inode::Inode;
use crate::util::error::{FsError, Result};
use crate::util::mode::ModeBitsHelper;

const TTL: Duration = Duration::new(1, 0);

/// FUSE numbers inodes from 1, the volume from 0. Numbers the volume cannot hold are unknown.
fn to_inode(fuse_ino: u64) -> Result<InodePointer> {
    fuse_ino
        .checked_sub(1)
        .and_then(|ino| InodePointer::try_from(ino).ok())
        .filter(|&ino| ino < MAX_INUM)
        .ok_or(FsError::NotFound)
}

fn to_fuse_ino(ino: InodePointer) -> u64 {
    ino as u64 + 1
}

fn to_system_time(time: TimeOrNow) -> SystemTime {
    match time {
        TimeOrNow::SpecificTime(time) => time,
        TimeOrNow::Now => SystemTime::now(),
    }
}

fn to_offset(offset: i64) -> Result<u64> {
    u64::try_from(offset).map_err(|_| FsError::Invalid(format!("negative offset {}", offset)))
}

fn errno(operation: &str, error: FsError) -> c_int {
    match error {
        FsError::Io(_) | FsError::Exhausted(_) => warn!("{} failed: {}", operation, error),
        _ => debug!("{} failed: {}", operation, error),
    }
    error.errno()
}

pub struct FuseDriver<D: DeviceDriver> {
    fs: BlockFS<D>,
}

impl<D: DeviceDriver> FuseDriver<D> {
    pub fn new(fs: BlockFS<D>) -> FuseDriver<D> {
        FuseDriver { fs }
    }

    fn inode_to_fileattr(&self, inode: &Inode) -> FileAttr {
        FileAttr {
            ino: to_fuse_ino(inode.id),
            size: inode.size,
            blocks: inode.sectors(),
            atime: inode.meta.accessed_at,
            mtime: inode.meta.modified_at,
            ctime: inode.meta.changed_at,
            crtime: inode.meta.created_at,
            kind: if inode.is_directory() { FileType::Directory } else { FileType::RegularFile },
            perm: inode.mode.get_permissions(),
            nlink: inode.link,
            uid: inode.meta.user_id,
            gid: inode.meta.group_id,
            rdev: inode.meta.rdev,
            flags: 0,
            blksize: self.fs.get_block_size() as u32,
        }
    }

    fn set_attributes(
        &mut self,
        ino: u64,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
    ) -> Result<Inode> {
        let ino = to_inode(ino)?;
        let mut inode = self.fs.get_inode(ino)?;
        if let Some(size) = size {
            inode = self.fs.truncate(ino, size)?;
        }
        if atime.is_some() || mtime.is_some() {
            inode = self.fs.set_times(ino, atime.map(to_system_time), mtime.map(to_system_time))?;
        }
        Ok(inode)
    }

    fn list(&self, ino: u64) -> Result<Vec<(u64, FileType, Vec<u8>)>> {
        let ino = to_inode(ino)?;
        let mut listing = vec![
            (to_fuse_ino(ino), FileType::Directory, b".".to_vec()),
            (to_fuse_ino(ino), FileType::Directory, b"..".to_vec()),
        ];
        for entry in self.fs.readdir(ino)? {
            let kind = if self.fs.get_inode(entry.ino)?.is_directory() {
                FileType::Directory
            } else {
                FileType::RegularFile
            };
            listing.push((to_fuse_ino(entry.ino), kind, entry.name));
        }
        Ok(listing)
    }
}

impl<D: DeviceDriver> Filesystem for FuseDriver<D> {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> std::result::Result<(), c_int> {
        let stat = self.fs.statfs();
        info!(
            "filesystem ready: {} of {} inodes and {} of {} blocks free",
            stat.free_files, stat.files, stat.free_blocks, stat.blocks
        );
        Ok(())
    }

    fn destroy(&mut self) {
        match self.fs.sync() {
            Ok(()) => info!("filesystem released"),
            Err(e) => warn!("flushing volume failed: {}", e),
        }
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match to_inode(parent).and_then(|parent| self.fs.lookup(parent, name.as_bytes())) {
            Ok(inode) => reply.entry(&TTL, &self.inode_to_fileattr(&inode), 0),
            Err(e) => reply.error(errno("lookup", e)),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        match to_inode(ino).and_then(|ino| self.fs.get_inode(ino)) {
            Ok(inode) => reply.attr(&TTL, &self.inode_to_fileattr(&inode)),
            Err(e) => reply.error(errno("getattr", e)),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        if mode.is_some() {
            debug!("setattr: mode changes are not stored");
        }
        match self.set_attributes(ino, size, atime, mtime) {
            Ok(inode) => reply.attr(&TTL, &self.inode_to_fileattr(&inode)),
            Err(e) => reply.error(errno("setattr", e)),
        }
    }

    fn mkdir(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, mode: u32, umask: u32, reply: ReplyEntry) {
        let owner = Owner::new(req.uid(), req.gid());
        match to_inode(parent).and_then(|parent| self.fs.mkdir(parent, name.as_bytes(), mode & !umask, owner)) {
            Ok(inode) => reply.entry(&TTL, &self.inode_to_fileattr(&inode), 0),
            Err(e) => reply.error(errno("mkdir", e)),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        match to_inode(parent).and_then(|parent| self.fs.unlink(parent, name.as_bytes())) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno("unlink", e)),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        match to_inode(parent).and_then(|parent| self.fs.rmdir(parent, name.as_bytes())) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno("rmdir", e)),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match to_inode(ino).and_then(|ino| self.fs.get_inode(ino)) {
            Ok(inode) if inode.is_directory() => reply.error(libc::EISDIR),
            Ok(_) => reply.opened(0, 0),
            Err(e) => reply.error(errno("open", e)),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let data = to_inode(ino)
            .and_then(|ino| Ok((ino, to_offset(offset)?)))
            .and_then(|(ino, offset)| self.fs.read(ino, offset, size as usize));
        match data {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(errno("read", e)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let written = to_inode(ino)
            .and_then(|ino| Ok((ino, to_offset(offset)?)))
            .and_then(|(ino, offset)| self.fs.write(ino, offset, data));
        match written {
            Ok(written) => reply.written(written as u32),
            Err(e) => reply.error(errno("write", e)),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match to_inode(ino).and_then(|ino| self.fs.get_inode(ino)) {
            Ok(inode) if inode.is_directory() => reply.opened(0, 0),
            Ok(_) => reply.error(libc::ENOTDIR),
            Err(e) => reply.error(errno("opendir", e)),
        }
    }

    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let listing = match self.list(ino) {
            Ok(listing) => listing,
            Err(e) => return reply.error(errno("readdir", e)),
        };
        let skip = usize::try_from(offset).unwrap_or(0);
        for (i, (entry_ino, kind, name)) in listing.into_iter().enumerate().skip(skip) {
            // the offset handed back is where the next call resumes
            if reply.add(entry_ino, (i + 1) as i64, kind, OsStr::from_bytes(&name)) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let stat = self.fs.statfs();
        reply.statfs(
            stat.blocks,
            stat.free_blocks,
            stat.free_blocks,
            stat.files,
            stat.free_files,
            stat.block_size,
            stat.name_length,
            stat.block_size,
        );
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let owner = Owner::new(req.uid(), req.gid());
        match to_inode(parent).and_then(|parent| self.fs.create(parent, name.as_bytes(), mode & !umask, owner)) {
            Ok(inode) => reply.created(&TTL, &self.inode_to_fileattr(&inode), 0, 0, 0),
            Err(e) => reply.error(errno("create", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{BLOCK_SIZE, DISK_SIZE, SECTOR_SIZE};
    use crate::driver::memory_drive::MemoryDrive;

    fn driver() -> FuseDriver<MemoryDrive> {
        let fs = BlockFS::mount(MemoryDrive::new(DISK_SIZE, SECTOR_SIZE), Owner::new(1000, 1000)).unwrap();
        FuseDriver::new(fs)
    }

    #[test]
    fn inode_numbers_are_shifted() {
        assert_eq!(to_inode(1).unwrap(), 0);
        assert_eq!(to_fuse_ino(0), 1);
        assert_eq!(to_inode(MAX_INUM as u64).unwrap(), MAX_INUM - 1);
        assert!(matches!(to_inode(0), Err(FsError::NotFound)));
        assert!(matches!(to_inode(MAX_INUM as u64 + 1), Err(FsError::NotFound)));
        assert!(matches!(to_inode(u64::MAX), Err(FsError::NotFound)));
        assert_eq!(FsError::NotFound.errno(), libc::ENOENT);
    }

    #[test]
    fn stale_inodes_are_not_found() {
        let mut driver = driver();
        let file = driver.fs.create_path("/f", 0o644).unwrap();
        driver.fs.unlink_path("/f").unwrap();
        let stale = to_fuse_ino(file.id);
        assert!(matches!(driver.set_attributes(stale, Some(0), None, None), Err(FsError::NotFound)));
        assert!(matches!(driver.list(stale), Err(FsError::NotFound)));
        assert!(matches!(driver.list(MAX_INUM as u64 + 1), Err(FsError::NotFound)));
    }

    #[test]
    fn root_attributes() {
        let driver = driver();
        let root = driver.fs.get_inode(0).unwrap();
        let attr = driver.inode_to_fileattr(&root);
        assert_eq!(attr.ino, 1);
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!(attr.perm, 0o755);
        assert_eq!(attr.nlink, 2);
        assert_eq!(attr.uid, 1000);
        assert_eq!(attr.size, BLOCK_SIZE as u64);
        assert_eq!(attr.blocks, 8);
        assert_eq!(attr.blksize, BLOCK_SIZE as u32);
    }

    #[test]
    fn listing_includes_dot_entries() {
        let mut driver = driver();
        driver.fs.mkdir_path("/dir", 0o755).unwrap();
        driver.fs.create_path("/file", 0o644).unwrap();

        let listing = driver.list(1).unwrap();
        let names: Vec<&[u8]> = listing.iter().map(|(_, _, name)| name.as_slice()).collect();
        assert_eq!(names, vec![&b"."[..], b"..", b"dir", b"file"]);
        assert_eq!(listing[2].0, 2);
        assert_eq!(listing[2].1, FileType::Directory);
        assert_eq!(listing[3].1, FileType::RegularFile);
        assert!(matches!(driver.list(3), Err(FsError::NotDirectory)));
    }

    #[test]
    fn setattr_truncates_and_sets_times() {
        let mut driver = driver();
        let file = driver.fs.create_path("/f", 0o644).unwrap();
        driver.fs.write(file.id, 0, b"abcdef").unwrap();

        let when = SystemTime::UNIX_EPOCH + Duration::from_secs(42);
        let inode = driver
            .set_attributes(to_fuse_ino(file.id), Some(2), None, Some(TimeOrNow::SpecificTime(when)))
            .unwrap();
        assert_eq!(inode.size, 2);
        assert_eq!(inode.meta.modified_at, when);
        assert_eq!(driver.fs.read(file.id, 0, 10).unwrap(), b"ab");
    }

    #[test]
    fn negative_offsets_are_invalid() {
        assert!(matches!(to_offset(-1), Err(FsError::Invalid(_))));
        assert_eq!(to_offset(10).unwrap(), 10);
    }
}
