use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::util::serializable::{u32_at, u64_at, ByteSerializable, KnownSize};

pub type UserId = u32;
pub type GroupId = u32;

const TIMESTAMP_SIZE: usize = 12;

/// Who a new inode belongs to. Stored and reported, never enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Owner {
    pub user_id: UserId,
    pub group_id: GroupId,
}

impl Owner {
    pub fn new(user_id: UserId, group_id: GroupId) -> Owner {
        Owner { user_id, group_id }
    }

    /// Whoever owns the file at `path`. A new volume's root takes the owner of its image.
    pub fn of_path<P: AsRef<Path>>(path: P) -> io::Result<Owner> {
        let metadata = fs::metadata(path)?;
        Ok(Owner::new(metadata.uid(), metadata.gid()))
    }
}

/// Attribute fields cached in the inode for stat reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub user_id: UserId,
    pub group_id: GroupId,
    pub rdev: u32,
    pub created_at: SystemTime,
    pub modified_at: SystemTime,
    pub changed_at: SystemTime,
    pub accessed_at: SystemTime,
}

impl Metadata {
    pub fn new(owner: Owner) -> Metadata {
        let now = SystemTime::now();

        Metadata {
            user_id: owner.user_id,
            group_id: owner.group_id,
            rdev: 0,
            created_at: now,
            modified_at: now,
            changed_at: now,
            accessed_at: now,
        }
    }

    pub fn touch_modified(&mut self) {
        let now = SystemTime::now();
        self.modified_at = now;
        self.changed_at = now;
    }

    pub fn touch_changed(&mut self) {
        self.changed_at = SystemTime::now();
    }
}

impl ByteSerializable for SystemTime {
    fn to_bytes(&self) -> Vec<u8> {
        // times before the epoch are clamped to it
        let since_unix = self.duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
        let mut result = Vec::<u8>::with_capacity(TIMESTAMP_SIZE);
        result.extend_from_slice(&since_unix.as_secs().to_le_bytes());
        result.extend_from_slice(&since_unix.subsec_nanos().to_le_bytes());
        result
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        let nanos = u32_at(bytes, 8).min(999_999_999);
        SystemTime::UNIX_EPOCH + Duration::new(u64_at(bytes, 0), nanos)
    }
}

impl KnownSize for Metadata {
    fn size_on_disk() -> usize {
        3 * std::mem::size_of::<u32>() + 4 * TIMESTAMP_SIZE
    }
}

impl ByteSerializable for Metadata {
    fn to_bytes(&self) -> Vec<u8> {
        let mut result = Vec::<u8>::with_capacity(Metadata::size_on_disk());
        result.extend_from_slice(&self.user_id.to_le_bytes());
        result.extend_from_slice(&self.group_id.to_le_bytes());
        result.extend_from_slice(&self.rdev.to_le_bytes());
        result.extend_from_slice(&self.accessed_at.to_bytes());
        result.extend_from_slice(&self.modified_at.to_bytes());
        result.extend_from_slice(&self.changed_at.to_bytes());
        result.extend_from_slice(&self.created_at.to_bytes());
        result
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        Metadata {
            user_id: u32_at(bytes, 0),
            group_id: u32_at(bytes, 4),
            rdev: u32_at(bytes, 8),
            accessed_at: SystemTime::from_bytes(&bytes[12..24]),
            modified_at: SystemTime::from_bytes(&bytes[24..36]),
            changed_at: SystemTime::from_bytes(&bytes[36..48]),
            created_at: SystemTime::from_bytes(&bytes[48..60]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_of_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("DISKFILE");
        fs::write(&path, b"").unwrap();

        let metadata = fs::metadata(&path).unwrap();
        assert_eq!(Owner::of_path(&path).unwrap(), Owner::new(metadata.uid(), metadata.gid()));
        assert_eq!(
            Owner::of_path(dir.path().join("missing")).err().map(|e| e.kind()),
            Some(io::ErrorKind::NotFound)
        );
    }

    #[test]
    fn metadata_bytes() {
        let mut meta = Metadata::new(Owner::new(1000, 100));
        meta.modified_at = SystemTime::UNIX_EPOCH + Duration::new(1_700_000_000, 123);

        let bytes = meta.to_bytes();
        assert_eq!(bytes.len(), Metadata::size_on_disk());
        assert_eq!(Metadata::from_bytes(&bytes), meta);
    }

    #[test]
    fn pre_epoch_time_clamps() {
        let before = SystemTime::UNIX_EPOCH - Duration::from_secs(10);
        assert_eq!(SystemTime::from_bytes(&before.to_bytes()), SystemTime::UNIX_EPOCH);
    }
}
