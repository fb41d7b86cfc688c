//! Capability contract between a descriptor table and whatever file system
//! backs a sandboxed guest.
//!
//! A [`FileSystem`] only knows how to open relative, already normalized paths.
//! Everything it hands out is a [`VirtualFile`]: something that can be
//! stat'ed, read, closed and, for directories, listed.

use std::any::Any;
use std::fmt;
use std::io::{self, Read, Write};
use std::path::Path;

use bitflags::bitflags;
use thiserror::Error;

mod fs;
pub mod static_fs;

pub use fs::empty::EmptyFileSystem;
pub use fs::empty_root::EmptyRootDir;
pub use fs::synthetic::SyntheticStat;
pub use static_fs::StaticFileSystem;

pub type Result<T> = std::result::Result<T, FsError>;

/// Opens files and directories relative to the root of a mount.
///
/// Paths handed to [`FileSystem::open`] never start with `/` and have
/// already been lexically cleaned; `"."` names the root itself.
pub trait FileSystem: fmt::Debug + Send + Sync + Upcastable + 'static {
    fn open(&self, path: &Path) -> Result<Box<dyn VirtualFile>>;
}

/// An open file or directory owned by whoever opened it.
///
/// Dropping a `VirtualFile` without calling [`VirtualFile::close`] must not
/// leak host resources, but only `close` reports errors.
pub trait VirtualFile: fmt::Debug + Send + Read + Upcastable + 'static {
    /// Describes the file at the time of the call.
    fn stat(&self) -> Result<FileInfo>;

    /// Releases the underlying resource.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Returns at most `max` further entries of a directory listing, or all
    /// remaining entries when `max` is zero. An empty result means the
    /// listing is exhausted. Listings are forward-only.
    fn read_dir(&mut self, _max: usize) -> Result<Vec<DirEntry>> {
        Err(FsError::NotADirectory)
    }

    /// Returns a writer when this file was opened for writing.
    fn as_writer(&mut self) -> Option<&mut dyn Write> {
        None
    }
}

// Implementation of `Upcastable` taken from https://users.rust-lang.org/t/why-does-downcasting-not-work-for-subtraits/33286/7 .
/// Trait needed to get downcasting from `VirtualFile` and `FileSystem` to work.
pub trait Upcastable {
    fn upcast_any_ref(&'_ self) -> &'_ dyn Any;
    fn upcast_any_mut(&'_ mut self) -> &'_ mut dyn Any;
    fn upcast_any_box(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any + fmt::Debug + 'static> Upcastable for T {
    #[inline]
    fn upcast_any_ref(&'_ self) -> &'_ dyn Any {
        self
    }
    #[inline]
    fn upcast_any_mut(&'_ mut self) -> &'_ mut dyn Any {
        self
    }
    #[inline]
    fn upcast_any_box(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl dyn VirtualFile + 'static {
    #[inline]
    pub fn downcast_ref<T: 'static>(&'_ self) -> Option<&'_ T> {
        self.upcast_any_ref().downcast_ref::<T>()
    }
    #[inline]
    pub fn downcast_mut<T: 'static>(&'_ mut self) -> Option<&'_ mut T> {
        self.upcast_any_mut().downcast_mut::<T>()
    }
}

impl dyn FileSystem + 'static {
    #[inline]
    pub fn downcast_ref<T: 'static>(&'_ self) -> Option<&'_ T> {
        self.upcast_any_ref().downcast_ref::<T>()
    }

    /// Whether this is the [`EmptyFileSystem`] placeholder, meaning no root
    /// is mounted at all.
    pub fn is_empty_fs(&self) -> bool {
        self.upcast_any_ref().is::<EmptyFileSystem>()
    }
}

bitflags! {
    /// File type and permission bits. The low nine bits are the usual
    /// `rwxrwxrwx` permissions and are carried through untouched.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FileMode: u32 {
        const DIR = 1 << 31;
        const SYMLINK = 1 << 27;
        const DEVICE = 1 << 26;
        const CHAR_DEVICE = 1 << 21;
    }
}

impl FileMode {
    pub const PERM_MASK: u32 = 0o777;

    /// Builds a mode from type flags plus permission bits.
    pub const fn with_perm(self, perm: u32) -> Self {
        Self::from_bits_retain(self.bits() | (perm & Self::PERM_MASK))
    }

    pub const fn perm(self) -> u32 {
        self.bits() & Self::PERM_MASK
    }

    pub fn file_type(self) -> FileType {
        if self.contains(FileMode::DIR) {
            FileType::Directory
        } else if self.contains(FileMode::SYMLINK) {
            FileType::Symlink
        } else if self.contains(FileMode::CHAR_DEVICE) {
            FileType::CharDevice
        } else if self.contains(FileMode::DEVICE) {
            FileType::Device
        } else {
            FileType::RegularFile
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    RegularFile,
    Directory,
    Symlink,
    /// An interactive terminal.
    CharDevice,
    /// Any other device, including pipes standing in for stdio.
    Device,
}

/// What `stat` reports about a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Base name of the file.
    pub name: String,
    /// Size in bytes.
    pub len: u64,
    pub mode: FileMode,
    /// Last modification time in nanoseconds as a UNIX timestamp.
    pub modified: u64,
}

impl FileInfo {
    pub fn is_dir(&self) -> bool {
        self.mode.contains(FileMode::DIR)
    }

    pub fn file_type(&self) -> FileType {
        self.mode.file_type()
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub file_type: FileType,
}

impl DirEntry {
    pub fn new(name: impl Into<String>, file_type: FileType) -> Self {
        Self {
            name: name.into(),
            file_type,
        }
    }
}

/// Reports whether `path` is acceptable to [`FileSystem::open`]: unrooted,
/// slash separated, without empty, `.` or `..` elements. The lone `"."`
/// names the root and is valid.
pub fn is_valid_path(path: &Path) -> bool {
    let Some(path) = path.to_str() else {
        return false;
    };
    if path == "." {
        return true;
    }
    !path.is_empty()
        && path
            .split('/')
            .all(|elem| !elem.is_empty() && elem != "." && elem != "..")
}

/// Error type for external users
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum FsError {
    /// Expected a directory but found something else
    #[error("not a directory")]
    NotADirectory,
    /// Expected a file but found a directory
    #[error("is a directory")]
    IsADirectory,
    /// The fd given was not usable
    #[error("invalid fd")]
    InvalidFd,
    /// File exists
    #[error("file exists")]
    AlreadyExists,
    /// Something failed when doing IO. These errors can generally not be handled.
    /// It may work if tried again.
    #[error("io error")]
    IOError,
    /// The operation was interrupted before it could finish
    #[error("operation interrupted")]
    Interrupted,
    /// Invalid internal data, if the argument data is invalid, use `InvalidInput`
    #[error("invalid internal data")]
    InvalidData,
    /// The provided data is invalid
    #[error("invalid input")]
    InvalidInput,
    /// The requested file or directory could not be found
    #[error("entry not found")]
    EntryNotFound,
    /// Caller was not allowed to perform this operation
    #[error("permission denied")]
    PermissionDenied,
    /// The operation did not complete within the given amount of time
    #[error("time out")]
    TimedOut,
    /// Found EOF when EOF was not expected
    #[error("unexpected eof")]
    UnexpectedEof,
    /// Operation would block, this error lets the caller know that they can try again
    #[error("blocking operation. try again")]
    WouldBlock,
    /// A call to write returned 0
    #[error("write returned 0")]
    WriteZero,
    /// The backend does not implement this operation
    #[error("unsupported operation")]
    Unsupported,
    /// Some other unhandled error. If you see this, it's probably a bug.
    #[error("unknown error found")]
    UnknownError,
}

impl From<io::Error> for FsError {
    fn from(io_error: io::Error) -> Self {
        // Errors that started out as an `FsError` convert back losslessly.
        if let Some(fs_error) = io_error
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<FsError>())
        {
            return *fs_error;
        }
        match io_error.kind() {
            io::ErrorKind::AlreadyExists => FsError::AlreadyExists,
            io::ErrorKind::Interrupted => FsError::Interrupted,
            io::ErrorKind::InvalidData => FsError::InvalidData,
            io::ErrorKind::InvalidInput => FsError::InvalidInput,
            io::ErrorKind::IsADirectory => FsError::IsADirectory,
            io::ErrorKind::NotADirectory => FsError::NotADirectory,
            io::ErrorKind::NotFound => FsError::EntryNotFound,
            io::ErrorKind::PermissionDenied => FsError::PermissionDenied,
            io::ErrorKind::TimedOut => FsError::TimedOut,
            io::ErrorKind::UnexpectedEof => FsError::UnexpectedEof,
            io::ErrorKind::Unsupported => FsError::Unsupported,
            io::ErrorKind::WouldBlock => FsError::WouldBlock,
            io::ErrorKind::WriteZero => FsError::WriteZero,
            io::ErrorKind::Other => FsError::IOError,
            // if the following triggers, a new error type was added to this non-exhaustive enum
            _ => FsError::UnknownError,
        }
    }
}

impl From<FsError> for io::Error {
    fn from(val: FsError) -> Self {
        let kind = match val {
            FsError::NotADirectory => io::ErrorKind::NotADirectory,
            FsError::IsADirectory => io::ErrorKind::IsADirectory,
            FsError::InvalidFd => io::ErrorKind::InvalidInput,
            FsError::AlreadyExists => io::ErrorKind::AlreadyExists,
            FsError::IOError => io::ErrorKind::Other,
            FsError::Interrupted => io::ErrorKind::Interrupted,
            FsError::InvalidData => io::ErrorKind::InvalidData,
            FsError::InvalidInput => io::ErrorKind::InvalidInput,
            FsError::EntryNotFound => io::ErrorKind::NotFound,
            FsError::PermissionDenied => io::ErrorKind::PermissionDenied,
            FsError::TimedOut => io::ErrorKind::TimedOut,
            FsError::UnexpectedEof => io::ErrorKind::UnexpectedEof,
            FsError::WouldBlock => io::ErrorKind::WouldBlock,
            FsError::WriteZero => io::ErrorKind::WriteZero,
            FsError::Unsupported => io::ErrorKind::Unsupported,
            FsError::UnknownError => io::ErrorKind::Other,
        };
        io::Error::new(kind, val)
    }
}
