pub mod consts;
pub mod driver;
pub mod fuse;
pub mod io;
pub mod ops;
pub mod structure;
pub mod util;

pub use crate::driver::file_drive::FileDrive;
pub use crate::driver::memory_drive::MemoryDrive;
pub use crate::driver::DeviceDriver;
pub use crate::fuse::filesystem::FuseDriver;
pub use crate::ops::meta::Owner;
pub use crate::ops::BlockFS;
pub use crate::util::error::{FsError, Result};
