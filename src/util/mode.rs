pub type ModeBits = u32;

const PERMISSIONS_MASK: ModeBits = 0o7777;
const TYPE_MASK: ModeBits = 0o170000;
const IS_DIR_MASK: ModeBits = 0o040000;
const IS_FILE_MASK: ModeBits = 0o100000;

pub trait ModeBitsHelper {
    fn get_permissions(&self) -> u16;
    fn is_directory(&self) -> bool;
    fn is_file(&self) -> bool;
}

impl ModeBitsHelper for ModeBits {
    fn get_permissions(&self) -> u16 {
        (self & PERMISSIONS_MASK) as u16
    }

    fn is_directory(&self) -> bool {
        (self & TYPE_MASK) == IS_DIR_MASK
    }

    fn is_file(&self) -> bool {
        (self & TYPE_MASK) == IS_FILE_MASK
    }
}

pub fn directory_mode(permissions: ModeBits) -> ModeBits {
    IS_DIR_MASK | (permissions & PERMISSIONS_MASK)
}

pub fn file_mode(permissions: ModeBits) -> ModeBits {
    IS_FILE_MASK | (permissions & PERMISSIONS_MASK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_bits() {
        let dir = directory_mode(0o755);
        assert!(dir.is_directory());
        assert!(!dir.is_file());
        assert_eq!(dir.get_permissions(), 0o755);

        // type bits passed in by the caller are replaced
        let file = file_mode(0o040644);
        assert!(file.is_file());
        assert!(!file.is_directory());
        assert_eq!(file.get_permissions(), 0o644);
    }
}
