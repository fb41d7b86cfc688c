//! A read-only file system whose contents are fixed when it is built.
//!
//! Useful for embedding a handful of files into a guest and for exercising
//! descriptor tables without touching the host disk.

use std::collections::{BTreeMap, VecDeque};
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use tracing::trace;

use crate::*;

const ROOT: &str = ".";

#[derive(Debug, Clone)]
enum Node {
    File(Arc<[u8]>),
    Dir,
}

/// Custom file system holding a static tree of files and directories
#[derive(Debug, Clone, Default)]
pub struct StaticFileSystem {
    nodes: BTreeMap<String, Node>,
    listing_batch: Option<usize>,
}

impl StaticFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file, creating any missing parent directories.
    pub fn with_file(mut self, path: impl AsRef<str>, contents: impl Into<Vec<u8>>) -> Self {
        let key = normalize_key(path.as_ref());
        let contents: Vec<u8> = contents.into();
        self.insert_parents(&key);
        self.nodes
            .insert(key, Node::File(Arc::from(contents.into_boxed_slice())));
        self
    }

    /// Adds an empty directory, creating any missing parent directories.
    pub fn with_dir(mut self, path: impl AsRef<str>) -> Self {
        let key = normalize_key(path.as_ref());
        if key != ROOT {
            self.insert_parents(&key);
            self.nodes.insert(key, Node::Dir);
        }
        self
    }

    /// Caps how many entries a single directory listing call returns, which
    /// mimics backends that page their listings.
    pub fn with_listing_batch(mut self, batch: usize) -> Self {
        self.listing_batch = (batch > 0).then_some(batch);
        self
    }

    fn insert_parents(&mut self, key: &str) {
        let mut parent = parent_of(key);
        while parent != ROOT {
            self.nodes.entry(parent.to_string()).or_insert(Node::Dir);
            parent = parent_of(parent);
        }
    }

    fn children(&self, dir: &str) -> VecDeque<DirEntry> {
        self.nodes
            .iter()
            .filter(|(key, _)| parent_of(key) == dir)
            .map(|(key, node)| {
                let file_type = match node {
                    Node::File(_) => FileType::RegularFile,
                    Node::Dir => FileType::Directory,
                };
                DirEntry::new(base_of(key), file_type)
            })
            .collect()
    }
}

impl FileSystem for StaticFileSystem {
    fn open(&self, path: &Path) -> Result<Box<dyn VirtualFile>> {
        if !is_valid_path(path) {
            return Err(FsError::InvalidInput);
        }
        let key = path.to_str().ok_or(FsError::InvalidInput)?;
        trace!(path = key, "static fs open");

        if key == ROOT {
            return Ok(Box::new(StaticDir {
                name: ROOT.to_string(),
                entries: self.children(ROOT),
                listing_batch: self.listing_batch,
            }));
        }

        match self.nodes.get(key).ok_or(FsError::EntryNotFound)? {
            Node::File(data) => Ok(Box::new(StaticFile {
                name: base_of(key).to_string(),
                data: data.clone(),
                cursor: 0,
            })),
            Node::Dir => Ok(Box::new(StaticDir {
                name: base_of(key).to_string(),
                entries: self.children(key),
                listing_batch: self.listing_batch,
            })),
        }
    }
}

#[derive(Debug)]
pub struct StaticFile {
    name: String,
    data: Arc<[u8]>,
    cursor: usize,
}

impl Read for StaticFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.data[self.cursor.min(self.data.len())..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.cursor += n;
        Ok(n)
    }
}

impl VirtualFile for StaticFile {
    fn stat(&self) -> Result<FileInfo> {
        Ok(FileInfo {
            name: self.name.clone(),
            len: self.data.len() as u64,
            mode: FileMode::empty().with_perm(0o444),
            modified: 0,
        })
    }
}

#[derive(Debug)]
pub struct StaticDir {
    name: String,
    // Entries not handed out yet; listings only move forward.
    entries: VecDeque<DirEntry>,
    listing_batch: Option<usize>,
}

impl Read for StaticDir {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::IsADirectory,
            format!("read {}: is a directory", self.name),
        ))
    }
}

impl VirtualFile for StaticDir {
    fn stat(&self) -> Result<FileInfo> {
        Ok(FileInfo {
            name: self.name.clone(),
            len: 0,
            mode: FileMode::DIR.with_perm(0o555),
            modified: 0,
        })
    }

    fn read_dir(&mut self, max: usize) -> Result<Vec<DirEntry>> {
        let mut n = if max == 0 { self.entries.len() } else { max };
        if let Some(batch) = self.listing_batch {
            n = n.min(batch);
        }
        let n = n.min(self.entries.len());
        Ok(self.entries.drain(..n).collect())
    }
}

fn normalize_key(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        ROOT.to_string()
    } else {
        trimmed.to_string()
    }
}

fn parent_of(key: &str) -> &str {
    match key.rfind('/') {
        Some(idx) => &key[..idx],
        None => ROOT,
    }
}

fn base_of(key: &str) -> &str {
    match key.rfind('/') {
        Some(idx) => &key[idx + 1..],
        None => key,
    }
}

#[cfg(test)]
mod test_static_fs {
    use std::io::Read;
    use std::path::Path;

    use pretty_assertions::assert_eq;

    use crate::{DirEntry, FileSystem, FileType, FsError, StaticFileSystem};

    fn fixture() -> StaticFileSystem {
        StaticFileSystem::new()
            .with_file("/animals/cat.txt", "meow")
            .with_file("animals/dog.txt", "woof")
            .with_file("readme.md", "# hello")
            .with_dir("empty")
    }

    #[test]
    fn test_open_and_read_file() {
        let fs = fixture();
        let mut file = fs.open(Path::new("animals/cat.txt")).unwrap();
        let mut buf = String::new();
        file.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "meow");

        let info = file.stat().unwrap();
        assert_eq!(info.name, "cat.txt");
        assert_eq!(info.len, 4);
        assert_eq!(info.file_type(), FileType::RegularFile);
    }

    #[test]
    fn test_open_missing_and_invalid() {
        let fs = fixture();
        assert_eq!(
            fs.open(Path::new("animals/cow.txt")).unwrap_err(),
            FsError::EntryNotFound
        );
        assert_eq!(
            fs.open(Path::new("/readme.md")).unwrap_err(),
            FsError::InvalidInput
        );
    }

    #[test]
    fn test_root_listing() {
        let fs = fixture();
        let mut root = fs.open(Path::new(".")).unwrap();
        assert!(root.stat().unwrap().is_dir());
        assert_eq!(
            root.read_dir(0).unwrap(),
            vec![
                DirEntry::new("animals", FileType::Directory),
                DirEntry::new("empty", FileType::Directory),
                DirEntry::new("readme.md", FileType::RegularFile),
            ]
        );
        assert!(root.read_dir(0).unwrap().is_empty());
    }

    #[test]
    fn test_listing_is_batched() {
        let fs = fixture().with_listing_batch(1);
        let mut dir = fs.open(Path::new("animals")).unwrap();
        assert_eq!(
            dir.read_dir(10).unwrap(),
            vec![DirEntry::new("cat.txt", FileType::RegularFile)]
        );
        assert_eq!(
            dir.read_dir(10).unwrap(),
            vec![DirEntry::new("dog.txt", FileType::RegularFile)]
        );
        assert!(dir.read_dir(10).unwrap().is_empty());
    }

    #[test]
    fn test_read_directory_fails() {
        let fs = fixture();
        let mut dir = fs.open(Path::new("empty")).unwrap();
        let err = dir.read(&mut [0u8; 4]).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::IsADirectory);
        assert!(dir.read_dir(4).unwrap().is_empty());
    }

    #[test]
    fn test_file_is_not_listable() {
        let fs = fixture();
        let mut file = fs.open(Path::new("readme.md")).unwrap();
        assert_eq!(file.read_dir(1).unwrap_err(), FsError::NotADirectory);
        assert!(file.as_writer().is_none());
    }
}
