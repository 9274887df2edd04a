use log::trace;

use crate::consts::InodePointer;
use crate::driver::DeviceDriver;
use crate::ops::directory::Directory;
use crate::structure::inode::Inode;
use crate::structure::Structure;
use crate::util::error::{FsError, Result};

/// The name components of a slash-separated path, root marker and empty segments skipped.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|component| !component.is_empty())
}

/// Splits an absolute path into its parent path and final name, like `dirname`/`basename`.
pub fn split_parent(path: &str) -> Result<(&str, &str)> {
    if !path.starts_with('/') {
        return Err(FsError::Invalid(format!("path {:?} is not absolute", path)));
    }
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(index) if index + 1 < trimmed.len() => {
            let parent = if index == 0 { "/" } else { &trimmed[..index] };
            Ok((parent, &trimmed[index + 1..]))
        }
        _ => Err(FsError::invalid("the root directory has no parent")),
    }
}

/// Walks `path` from `start`. Any missing component fails the whole resolution.
pub fn resolve<A: DeviceDriver>(structure: &Structure<A>, path: &str, start: InodePointer) -> Result<Inode> {
    let mut current = structure.read_inode(start)?;
    for component in components(path) {
        let directory = Directory::from_inode(current)?;
        let entry = directory.lookup(structure, component.as_bytes())?;
        trace!("resolve {:?}: {} -> {}", path, component, entry.ino);
        current = structure.read_inode(entry.ino)?;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::ROOT_INODE;
    use crate::ops::meta::{Metadata, Owner};
    use crate::structure::tests::formatted;
    use crate::util::mode::{directory_mode, file_mode};

    #[test]
    fn split_components() {
        assert_eq!(components("/").count(), 0);
        assert_eq!(components("/a/b/c").collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(components("//a///b/").collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(components("a/b").collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn parent_and_name() {
        assert_eq!(split_parent("/a").unwrap(), ("/", "a"));
        assert_eq!(split_parent("/a/b").unwrap(), ("/a", "b"));
        assert_eq!(split_parent("/a/b/").unwrap(), ("/a", "b"));
        assert!(split_parent("/").is_err());
        assert!(split_parent("a/b").is_err());
    }

    #[test]
    fn resolve_root() {
        let structure = formatted();
        let root = resolve(&structure, "/", ROOT_INODE).unwrap();
        assert_eq!(root.id, ROOT_INODE);
        assert!(root.is_directory());
    }

    #[test]
    fn resolve_nested() {
        let mut structure = formatted();
        let a = structure.allocate_inode().unwrap();
        let b = structure.allocate_inode().unwrap();
        let mut a_inode = Inode::new(a, directory_mode(0o755), 2, Metadata::new(Owner::default()));
        a_inode.direct[0] = Some(structure.allocate_zeroed_block().unwrap());
        structure.write_inode(&a_inode).unwrap();
        structure.write_inode(&Inode::new(b, file_mode(0o644), 1, Metadata::new(Owner::default()))).unwrap();

        Directory::read(&structure, ROOT_INODE).unwrap().insert(&mut structure, b"a", a).unwrap();
        Directory::read(&structure, a).unwrap().insert(&mut structure, b"b", b).unwrap();

        assert_eq!(resolve(&structure, "/a", ROOT_INODE).unwrap().id, a);
        assert_eq!(resolve(&structure, "/a/b", ROOT_INODE).unwrap().id, b);
        assert_eq!(resolve(&structure, "b", a).unwrap().id, b);
        assert!(matches!(resolve(&structure, "/a/b/c", ROOT_INODE), Err(FsError::NotDirectory)));
    }

    #[test]
    fn missing_component_changes_nothing() {
        let structure = formatted();
        let before = structure.read_block(structure.superblock.d_bitmap_blk).unwrap();
        assert!(matches!(resolve(&structure, "/nope/deeper", ROOT_INODE), Err(FsError::NotFound)));
        assert_eq!(structure.read_block(structure.superblock.d_bitmap_blk).unwrap(), before);
        assert_eq!(structure.inode_map.count_used(), 1);
    }
}
