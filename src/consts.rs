pub const BLOCK_SIZE: usize = 4096;
pub const SECTOR_SIZE: usize = 512;

pub const SUPERBLOCK_INDEX: BlockPointer = 0;
pub const INODE_BITMAP_INDEX: BlockPointer = 1;
pub const DATA_BITMAP_INDEX: BlockPointer = 2;
pub const INODE_TABLE_INDEX: BlockPointer = 3;
pub const INODE_TABLE_BLOCKS: u32 = 5;
pub const DATA_REGION_INDEX: BlockPointer = INODE_TABLE_INDEX + INODE_TABLE_BLOCKS;

pub const INODE_SIZE: usize = 256;
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;
pub const MAX_INUM: u32 = INODE_TABLE_BLOCKS * INODES_PER_BLOCK as u32;
pub const MAX_DNUM: u32 = 8184;
pub const DISK_BLOCKS: u64 = DATA_REGION_INDEX as u64 + MAX_DNUM as u64;
pub const DISK_SIZE: u64 = DISK_BLOCKS * BLOCK_SIZE as u64;

pub const DIRECT_POINTERS: usize = 16;
pub const INDIRECT_POINTERS: usize = 8;
pub const POINTERS_PER_BLOCK: usize = BLOCK_SIZE / std::mem::size_of::<u32>();
pub const MAX_FILE_BLOCKS: u64 = (DIRECT_POINTERS + INDIRECT_POINTERS * POINTERS_PER_BLOCK) as u64;
pub const MAX_FILE_SIZE: u64 = MAX_FILE_BLOCKS * BLOCK_SIZE as u64;

pub const DIRENT_SIZE: usize = 256;
pub const DIRENTS_PER_BLOCK: usize = BLOCK_SIZE / DIRENT_SIZE;
pub const FILE_NAME_LENGTH: usize = 248;

pub const ROOT_INODE: InodePointer = 0;

pub type BlockPointer = u32;
pub type InodePointer = u32;
pub type DirectPointers = [Option<BlockPointer>; DIRECT_POINTERS];
pub type IndirectPointers = [Option<BlockPointer>; INDIRECT_POINTERS];
