use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, MutexGuard};
use tracing::trace;
use virtual_fs::{DirEntry, FileInfo, FsError, VirtualFile};

/// An open file (or directory) stored under a descriptor number.
///
/// Lock order is `read_dir` before `file`.
pub struct FileEntry {
    /// Base name of the file at the time it was opened. For the root
    /// (`FD_ROOT`) this is `/`.
    name: String,

    /// Always present, even for the root.
    file: Mutex<Box<dyn VirtualFile>>,

    /// Present once the entry has been listed as a directory.
    read_dir: Mutex<Option<ReadDir>>,

    /// Set once the descriptor was closed; handles still holding the entry
    /// then fail with [`FsError::InvalidFd`].
    closed: AtomicBool,
}

/// Progress of a directory listing through a [`FileEntry`].
///
/// Backend listings cannot be rewound, so anything fetched but not yet
/// handed to the caller is kept here until the next call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadDir {
    /// Entries delivered to callers so far, summed over every backend
    /// listing call made for this descriptor.
    pub count_read: u64,

    /// Entries fetched from the backend that have not been delivered yet.
    pub entries: VecDeque<DirEntry>,
}

impl ReadDir {
    fn take(&mut self, max: usize) -> Vec<DirEntry> {
        let n = if max == 0 {
            self.entries.len()
        } else {
            max.min(self.entries.len())
        };
        self.count_read += n as u64;
        self.entries.drain(..n).collect()
    }
}

impl FileEntry {
    pub(crate) fn new(name: impl Into<String>, file: Box<dyn VirtualFile>) -> Self {
        Self {
            name: name.into(),
            file: Mutex::new(file),
            read_dir: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Locks and returns the underlying capability, or fails with
    /// [`FsError::InvalidFd`] once the descriptor has been closed.
    pub fn file(&self) -> Result<MutexGuard<'_, Box<dyn VirtualFile>>, FsError> {
        let file = self.file.lock();
        if self.is_closed() {
            return Err(FsError::InvalidFd);
        }
        Ok(file)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn stat(&self) -> Result<FileInfo, FsError> {
        self.file()?.stat()
    }

    pub fn is_writable(&self) -> bool {
        self.file().is_ok_and(|mut file| file.as_writer().is_some())
    }

    /// A copy of the listing state, if this entry was ever listed.
    pub fn read_dir_state(&self) -> Option<ReadDir> {
        self.read_dir.lock().clone()
    }

    /// Returns up to `max` directory entries (all remaining ones when `max`
    /// is zero).
    ///
    /// Entries cached from an earlier backend call are served first and
    /// exclusively; the backend is only asked again once the cache is
    /// drained. An empty result means the listing is exhausted.
    pub fn read_dir(&self, max: usize) -> Result<Vec<DirEntry>, FsError> {
        let mut state = self.read_dir.lock();
        if self.is_closed() {
            return Err(FsError::InvalidFd);
        }
        let state = state.get_or_insert_with(ReadDir::default);

        if state.entries.is_empty() {
            let fetched = self.file()?.read_dir(max)?;
            trace!(
                name = %self.name,
                fetched = fetched.len(),
                "fetched directory entries from backend"
            );
            state.entries.extend(fetched);
        }

        Ok(state.take(max))
    }

    /// Closes the capability and forgets any cached listing.
    pub(crate) fn close(&self) -> Result<(), FsError> {
        let mut read_dir = self.read_dir.lock();
        let mut file = self.file.lock();
        read_dir.take();
        self.closed.store(true, Ordering::SeqCst);
        file.close()
    }
}

impl fmt::Debug for FileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("FileEntry");
        s.field("name", &self.name);
        // Never block: the entry may be formatted while a listing or a
        // read holds one of its locks.
        match self.file.try_lock() {
            Some(file) => s.field("file", &*file),
            None => s.field("file", &"<locked>"),
        };
        match self.read_dir.try_lock() {
            Some(read_dir) => s.field("read_dir", &*read_dir),
            None => s.field("read_dir", &"<locked>"),
        };
        s.field("closed", &self.is_closed()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use pretty_assertions::assert_eq;
    use virtual_fs::{DirEntry, FileSystem, FileType, FsError, StaticFileSystem};

    use super::*;

    fn open(fs: &StaticFileSystem, path: &str) -> FileEntry {
        FileEntry::new(path, fs.open(Path::new(path)).unwrap())
    }

    #[test]
    fn test_listing_serves_cache_before_backend() {
        let fs = StaticFileSystem::new()
            .with_file("a", "")
            .with_file("b", "")
            .with_file("c", "")
            .with_listing_batch(2);
        let entry = open(&fs, ".");

        // The backend hands out two entries; only one is wanted.
        assert_eq!(
            entry.read_dir(1).unwrap(),
            vec![DirEntry::new("a", FileType::RegularFile)]
        );
        let state = entry.read_dir_state().unwrap();
        assert_eq!(state.count_read, 1);
        assert_eq!(state.entries.len(), 1);

        // The leftover is served on its own, even if more is asked for.
        assert_eq!(
            entry.read_dir(5).unwrap(),
            vec![DirEntry::new("b", FileType::RegularFile)]
        );
        assert_eq!(
            entry.read_dir(5).unwrap(),
            vec![DirEntry::new("c", FileType::RegularFile)]
        );
        assert!(entry.read_dir(5).unwrap().is_empty());
        assert_eq!(entry.read_dir_state().unwrap().count_read, 3);
    }

    #[test]
    fn test_listing_a_file_fails() {
        let fs = StaticFileSystem::new().with_file("a.txt", "text");
        let entry = open(&fs, "a.txt");
        assert_eq!(entry.read_dir(1).unwrap_err(), FsError::NotADirectory);
        assert_eq!(entry.read_dir_state().unwrap().count_read, 0);
    }

    #[test]
    fn test_close_discards_cache() {
        let fs = StaticFileSystem::new()
            .with_file("a", "")
            .with_file("b", "");
        let entry = open(&fs, ".");
        entry.read_dir(1).unwrap();
        assert!(entry.read_dir_state().is_some());

        entry.close().unwrap();
        assert!(entry.read_dir_state().is_none());
    }

    #[test]
    fn test_closed_entry_rejects_use() {
        let fs = StaticFileSystem::new().with_file("a.txt", "text");
        let entry = open(&fs, "a.txt");
        assert!(!entry.is_closed());
        entry.close().unwrap();

        assert!(entry.is_closed());
        assert_eq!(entry.stat().unwrap_err(), FsError::InvalidFd);
        assert!(entry.file().is_err());
        assert_eq!(entry.read_dir(1).unwrap_err(), FsError::InvalidFd);
        assert!(entry.read_dir_state().is_none());
    }

    #[test]
    fn test_debug_does_not_block_on_held_locks() {
        let fs = StaticFileSystem::new().with_file("a", "");
        let entry = open(&fs, ".");

        let file = entry.file().unwrap();
        let formatted = format!("{entry:?}");
        assert!(formatted.contains("<locked>"), "{formatted}");
        drop(file);

        assert!(!format!("{entry:?}").contains("<locked>"));
    }

    #[test]
    fn test_debug_while_listing_concurrently() {
        let mut fs = StaticFileSystem::new().with_listing_batch(1);
        for i in 0..200 {
            fs = fs.with_file(format!("f{i:03}"), "");
        }
        let entry = open(&fs, ".");

        std::thread::scope(|scope| {
            let lister = scope.spawn(|| {
                let mut listed = 0;
                while !entry.read_dir(1).unwrap().is_empty() {
                    listed += 1;
                }
                listed
            });
            scope.spawn(|| {
                for _ in 0..200 {
                    let _ = format!("{entry:?}");
                }
            });
            assert_eq!(lister.join().unwrap(), 200);
        });
    }
}
