//! A stand-in for `/` when a backend refuses to open its own root.

use std::io::{self, Read};

use crate::*;

/// An always-present, always-empty, read-only root directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyRootDir;

impl EmptyRootDir {
    pub fn info() -> FileInfo {
        SyntheticStat::EmptyRoot.file_info()
    }
}

impl Read for EmptyRootDir {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::IsADirectory,
            "read /: is a directory",
        ))
    }
}

impl VirtualFile for EmptyRootDir {
    fn stat(&self) -> Result<FileInfo> {
        Ok(Self::info())
    }

    fn read_dir(&mut self, _max: usize) -> Result<Vec<DirEntry>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod test_empty_root {
    use std::io::{self, Read};

    use pretty_assertions::assert_eq;

    use crate::{EmptyRootDir, FileType, VirtualFile};

    #[test]
    fn test_stat() {
        let dir = EmptyRootDir;
        let info = dir.stat().unwrap();
        assert_eq!(info.name, "/");
        assert!(info.is_dir());
        assert_eq!(info.file_type(), FileType::Directory);
        assert_eq!(info.mode.perm(), 0o555);
        assert_eq!(info.len, 0);
        assert_eq!(info.modified, 0);
    }

    #[test]
    fn test_listing_is_empty() {
        let mut dir = EmptyRootDir;
        assert!(dir.read_dir(0).unwrap().is_empty());
        assert!(dir.read_dir(16).unwrap().is_empty());
    }

    #[test]
    fn test_read_is_a_directory() {
        let mut dir = EmptyRootDir;
        let err = dir.read(&mut [0u8; 8]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::IsADirectory);
    }

    #[test]
    fn test_close_is_noop() {
        let mut dir = EmptyRootDir;
        assert_eq!(dir.close(), Ok(()));
        assert_eq!(dir.close(), Ok(()));
        assert!(dir.as_writer().is_none());
    }
}
