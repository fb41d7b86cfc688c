//! When no file system is mounted at the root this is used as a placeholder -
//! as the name suggests it always returns file not found.

use std::path::Path;

use tracing::trace;

use crate::*;

#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyFileSystem {}

impl FileSystem for EmptyFileSystem {
    fn open(&self, path: &Path) -> Result<Box<dyn VirtualFile>> {
        // Malformed paths are reported as such even though nothing exists.
        if !is_valid_path(path) {
            trace!(path = %path.display(), "rejecting invalid path");
            return Err(FsError::InvalidInput);
        }
        Err(FsError::EntryNotFound)
    }
}

#[cfg(test)]
mod test_empty_fs {
    use std::path::Path;

    use pretty_assertions::assert_eq;

    use crate::{EmptyFileSystem, FileSystem, FsError};

    #[test]
    fn test_open_valid_path_not_found() {
        let fs = EmptyFileSystem::default();
        for path in [".", "a", "a/b/c.txt"] {
            assert_eq!(
                fs.open(Path::new(path)).unwrap_err(),
                FsError::EntryNotFound,
                "{path}",
            );
        }
    }

    #[test]
    fn test_open_invalid_path() {
        let fs = EmptyFileSystem::default();
        for path in ["/", "/a", "../a", "a/../b", "a/"] {
            assert_eq!(
                fs.open(Path::new(path)).unwrap_err(),
                FsError::InvalidInput,
                "{path}",
            );
        }
    }

    #[test]
    fn test_is_empty_fs() {
        let fs: std::sync::Arc<dyn FileSystem> = std::sync::Arc::new(EmptyFileSystem::default());
        assert!(fs.is_empty_fs());

        let fs: std::sync::Arc<dyn FileSystem> =
            std::sync::Arc::new(crate::StaticFileSystem::new());
        assert!(!fs.is_empty_fs());
    }
}
