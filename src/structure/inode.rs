use crate::consts::{
    BlockPointer, DirectPointers, IndirectPointers, InodePointer, BLOCK_SIZE, DIRECT_POINTERS, INDIRECT_POINTERS,
    INODE_SIZE,
};
use crate::ops::meta::Metadata;
use crate::util::mode::{ModeBits, ModeBitsHelper};
use crate::util::serializable::{u32_at, u64_at, ByteSerializable, KnownSize};

const NULL_POINTER: u32 = 0;

const VALID_OFFSET: usize = 4;
const MODE_OFFSET: usize = 8;
const LINK_OFFSET: usize = 12;
const SIZE_OFFSET: usize = 16;
const DIRECT_OFFSET: usize = 24;
const INDIRECT_OFFSET: usize = DIRECT_OFFSET + DIRECT_POINTERS * 4;
const META_OFFSET: usize = INDIRECT_OFFSET + INDIRECT_POINTERS * 4;

#[inline]
pub(crate) fn encode_pointer(pointer: Option<BlockPointer>) -> u32 {
    pointer.unwrap_or(NULL_POINTER)
}

#[inline]
pub(crate) fn decode_pointer(raw: u32) -> Option<BlockPointer> {
    if raw == NULL_POINTER {
        None
    } else {
        Some(raw)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Inode {
    pub id: InodePointer,
    pub valid: bool,
    pub mode: ModeBits,
    pub link: u32,
    pub size: u64,
    pub direct: DirectPointers,
    pub indirect: IndirectPointers,
    pub meta: Metadata,
}

impl Inode {
    pub fn new(id: InodePointer, mode: ModeBits, link: u32, meta: Metadata) -> Inode {
        Inode {
            id,
            valid: true,
            mode,
            link,
            size: 0,
            direct: [None; DIRECT_POINTERS],
            indirect: [None; INDIRECT_POINTERS],
            meta,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.mode.is_directory()
    }

    pub fn is_file(&self) -> bool {
        self.mode.is_file()
    }

    pub fn direct_blocks(&self) -> impl Iterator<Item = BlockPointer> + '_ {
        self.direct.iter().filter_map(|pointer| *pointer)
    }

    /// Blocks this inode accounts for, in 512-byte units as `stat` reports them.
    pub fn sectors(&self) -> u64 {
        self.size.div_ceil(BLOCK_SIZE as u64) * (BLOCK_SIZE as u64 / 512)
    }
}

impl KnownSize for Inode {
    fn size_on_disk() -> usize {
        INODE_SIZE
    }
}

impl ByteSerializable for Inode {
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; INODE_SIZE];
        bytes[0..4].copy_from_slice(&self.id.to_le_bytes());
        bytes[VALID_OFFSET] = self.valid as u8;
        bytes[MODE_OFFSET..MODE_OFFSET + 4].copy_from_slice(&self.mode.to_le_bytes());
        bytes[LINK_OFFSET..LINK_OFFSET + 4].copy_from_slice(&self.link.to_le_bytes());
        bytes[SIZE_OFFSET..SIZE_OFFSET + 8].copy_from_slice(&self.size.to_le_bytes());
        for (i, pointer) in self.direct.iter().chain(self.indirect.iter()).enumerate() {
            let offset = DIRECT_OFFSET + i * 4;
            bytes[offset..offset + 4].copy_from_slice(&encode_pointer(*pointer).to_le_bytes());
        }
        let meta = self.meta.to_bytes();
        bytes[META_OFFSET..META_OFFSET + meta.len()].copy_from_slice(&meta);
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        let mut direct = [None; DIRECT_POINTERS];
        for (i, pointer) in direct.iter_mut().enumerate() {
            *pointer = decode_pointer(u32_at(bytes, DIRECT_OFFSET + i * 4));
        }
        let mut indirect = [None; INDIRECT_POINTERS];
        for (i, pointer) in indirect.iter_mut().enumerate() {
            *pointer = decode_pointer(u32_at(bytes, INDIRECT_OFFSET + i * 4));
        }

        Inode {
            id: u32_at(bytes, 0),
            valid: bytes[VALID_OFFSET] != 0,
            mode: u32_at(bytes, MODE_OFFSET),
            link: u32_at(bytes, LINK_OFFSET),
            size: u64_at(bytes, SIZE_OFFSET),
            direct,
            indirect,
            meta: Metadata::from_bytes(&bytes[META_OFFSET..META_OFFSET + Metadata::size_on_disk()]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::meta::Owner;
    use crate::util::mode::directory_mode;

    #[test]
    fn layout_fits_record() {
        assert!(META_OFFSET + Metadata::size_on_disk() <= INODE_SIZE);
    }

    #[test]
    fn inode_bytes() {
        let mut inode = Inode::new(42, directory_mode(0o755), 2, Metadata::new(Owner::new(1, 2)));
        inode.size = 3 * BLOCK_SIZE as u64;
        inode.direct[0] = Some(8);
        inode.direct[1] = Some(9);
        inode.direct[15] = Some(4000);
        inode.indirect[7] = Some(77);

        let bytes = inode.to_bytes();
        assert_eq!(bytes.len(), Inode::size_on_disk());

        let decoded = Inode::from_bytes(&bytes);
        assert_eq!(decoded, inode);
        assert!(decoded.is_directory());
        assert_eq!(decoded.direct_blocks().collect::<Vec<_>>(), vec![8, 9, 4000]);
    }

    #[test]
    fn zeroed_record_is_invalid_and_empty() {
        let inode = Inode::from_bytes(&[0u8; INODE_SIZE]);
        assert!(!inode.valid);
        assert!(inode.direct.iter().all(Option::is_none));
        assert!(inode.indirect.iter().all(Option::is_none));
    }
}
