use std::fmt;
use std::io;
use std::os::raw::c_int;

use thiserror::Error;

type ErrorNum = c_int;

/// Which allocatable unit ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Inode,
    Block,
    DirectorySlot,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Inode => write!(f, "inodes"),
            Resource::Block => write!(f, "data blocks"),
            Resource::DirectorySlot => write!(f, "directory slots"),
        }
    }
}

#[derive(Debug, Error)]
pub enum FsError {
    #[error("no free {0}")]
    Exhausted(Resource),

    #[error("no such file or directory")]
    NotFound,

    #[error("name already exists")]
    AlreadyExists,

    #[error("invalid argument: {0}")]
    Invalid(String),

    #[error("file name too long")]
    NameTooLong,

    #[error("not a directory")]
    NotDirectory,

    #[error("is a directory")]
    IsDirectory,

    #[error("directory not empty")]
    NotEmpty,

    #[error("file too large")]
    FileTooLarge,

    #[error("device I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FsError {
    pub fn invalid(message: &str) -> FsError {
        FsError::Invalid(message.to_string())
    }

    /// The errno handed back to the kernel for this error.
    pub fn errno(&self) -> ErrorNum {
        match self {
            FsError::Exhausted(_) => libc::ENOSPC,
            FsError::NotFound => libc::ENOENT,
            FsError::AlreadyExists => libc::EEXIST,
            FsError::Invalid(_) => libc::EINVAL,
            FsError::NameTooLong => libc::ENAMETOOLONG,
            FsError::NotDirectory => libc::ENOTDIR,
            FsError::IsDirectory => libc::EISDIR,
            FsError::NotEmpty => libc::ENOTEMPTY,
            FsError::FileTooLarge => libc::EFBIG,
            FsError::Io(_) => libc::EIO,
        }
    }
}

pub type Result<T> = std::result::Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping() {
        assert_eq!(FsError::Exhausted(Resource::Block).errno(), libc::ENOSPC);
        assert_eq!(FsError::NotFound.errno(), libc::ENOENT);
        assert_eq!(FsError::AlreadyExists.errno(), libc::EEXIST);
        assert_eq!(FsError::invalid("bad").errno(), libc::EINVAL);
        assert_eq!(FsError::NotEmpty.errno(), libc::ENOTEMPTY);
        assert_eq!(FsError::from(io::Error::from(io::ErrorKind::UnexpectedEof)).errno(), libc::EIO);
    }

    #[test]
    fn display() {
        assert_eq!(FsError::Exhausted(Resource::Inode).to_string(), "no free inodes");
        assert_eq!(FsError::invalid("bad path").to_string(), "invalid argument: bad path");
    }
}
