use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::{debug, info};

use crate::driver::DeviceDriver;

/// A disk image file split into fixed-size sectors.
pub struct FileDrive {
    file: File,
    bytes: u64,
    sector_size: usize,
}

impl FileDrive {
    /// Creates a new image of `bytes` bytes, failing if the file already exists.
    pub fn create<P: AsRef<Path>>(path: P, bytes: u64, sector_size: usize) -> io::Result<FileDrive> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path.as_ref())?;
        file.set_len(bytes)?;
        info!("created disk image {} ({} bytes)", path.as_ref().display(), bytes);
        Ok(FileDrive { file, bytes, sector_size })
    }

    pub fn open<P: AsRef<Path>>(path: P, sector_size: usize) -> io::Result<FileDrive> {
        let file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;
        let bytes = file.metadata()?.len();
        debug!("opened disk image {} ({} bytes)", path.as_ref().display(), bytes);
        Ok(FileDrive { file, bytes, sector_size })
    }

    /// Opens the image, creating it with `bytes` bytes when missing.
    /// An image shorter than `bytes` is extended.
    pub fn open_or_create<P: AsRef<Path>>(path: P, bytes: u64, sector_size: usize) -> io::Result<FileDrive> {
        match FileDrive::open(path.as_ref(), sector_size) {
            Ok(mut drive) => {
                if drive.bytes < bytes {
                    drive.file.set_len(bytes)?;
                    drive.bytes = bytes;
                }
                Ok(drive)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => FileDrive::create(path, bytes, sector_size),
            Err(e) => Err(e),
        }
    }

    pub fn close(mut self) -> io::Result<()> {
        self.flush()
    }

    fn check_range(&self, index: u64, len: usize) -> io::Result<()> {
        if len != self.sector_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("sector size mismatch - expected {}, got {}", self.sector_size, len),
            ));
        }
        if index >= self.get_sector_count() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("sector {} out of range", index),
            ));
        }
        Ok(())
    }
}

impl DeviceDriver for FileDrive {
    fn get_sector_count(&self) -> u64 {
        self.bytes / self.sector_size as u64
    }

    fn get_sector_size(&self) -> usize {
        self.sector_size
    }

    fn read_sector(&self, index: u64, buffer: &mut [u8]) -> io::Result<()> {
        self.check_range(index, buffer.len())?;
        let mut file = &self.file;
        file.seek(SeekFrom::Start(index * self.sector_size as u64))?;
        file.read_exact(buffer)
    }

    fn write_sector(&mut self, index: u64, data: &[u8]) -> io::Result<()> {
        self.check_range(index, data.len())?;
        self.file.seek(SeekFrom::Start(index * self.sector_size as u64))?;
        self.file.write_all(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_sectors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drive.img");
        let mut drive = FileDrive::create(&path, 1024 * 512, 512).unwrap();

        let sector0 = vec![0x42; 512];
        let sector1023 = vec![0x52; 512];
        drive.write_sector(0, &sector0).unwrap();
        drive.write_sector(1023, &sector1023).unwrap();

        let mut buffer = vec![0; 512];
        drive.read_sector(0, &mut buffer).unwrap();
        assert_eq!(buffer, sector0);
        drive.read_sector(1023, &mut buffer).unwrap();
        assert_eq!(buffer, sector1023);
        drive.read_sector(2, &mut buffer).unwrap();
        assert_eq!(buffer, vec![0; 512]);

        assert!(drive.read_sector(1024, &mut buffer).is_err());
        assert!(drive.write_sector(0, &[0; 100]).is_err());
    }

    #[test]
    fn create_refuses_existing_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drive.img");
        FileDrive::create(&path, 4096, 512).unwrap().close().unwrap();
        assert_eq!(
            FileDrive::create(&path, 4096, 512).err().map(|e| e.kind()),
            Some(io::ErrorKind::AlreadyExists)
        );
    }

    #[test]
    fn open_or_create_reuses_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drive.img");
        {
            let mut drive = FileDrive::open_or_create(&path, 8 * 512, 512).unwrap();
            drive.write_sector(3, &vec![7; 512]).unwrap();
            drive.close().unwrap();
        }
        let drive = FileDrive::open_or_create(&path, 8 * 512, 512).unwrap();
        let mut buffer = vec![0; 512];
        drive.read_sector(3, &mut buffer).unwrap();
        assert_eq!(buffer, vec![7; 512]);
        assert_eq!(drive.get_size(), 8 * 512);
    }
}
