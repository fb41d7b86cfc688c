use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};
use virtual_fs::{
    DirEntry, EmptyRootDir, FileInfo, FileSystem, FsError, SyntheticStat, VirtualFile,
    is_valid_path,
};

use crate::entry::FileEntry;
use crate::stdio::{Stderr, Stdin, Stdout};
use crate::{FD_ROOT, FD_STDERR, FD_STDIN, FD_STDOUT};

type SharedReader = Arc<Mutex<Box<dyn Read + Send>>>;
type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// The descriptor table of one sandboxed instance.
///
/// Every method takes `&self`; the table can be shared between the threads
/// of a multi-threaded guest.
pub struct FsContext {
    /// The root (`/`) mount.
    fs: Arc<dyn FileSystem>,

    stdin: SharedReader,
    stdout: SharedWriter,
    stderr: SharedWriter,
    stdin_stat: SyntheticStat,
    stdout_stat: SyntheticStat,
    stderr_stat: SyntheticStat,

    /// Open files (or directories) keyed by descriptor, `>= FD_ROOT`.
    /// Allocating a number and inserting its entry happen under this lock.
    opened_files: Mutex<BTreeMap<u32, Arc<FileEntry>>>,

    /// Highest descriptor handed out so far. Only advanced by `next_fd`.
    last_fd: AtomicU32,
}

impl FsContext {
    /// Creates a table over the given streams and root file system.
    ///
    /// Missing streams read as end of file and discard writes. When `fs` is
    /// an [`virtual_fs::EmptyFileSystem`] there is no root and no
    /// descriptor `FD_ROOT`. Otherwise the root is opened as `"."`; if the
    /// backend reports it as missing, invalid, forbidden, not a directory or
    /// unknown, an empty directory stands in for it.
    ///
    /// Fails with any other open error, or if the root cannot be stat'ed or
    /// is not a directory.
    pub fn new(
        stdin: Option<Stdin>,
        stdout: Option<Stdout>,
        stderr: Option<Stderr>,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Self, FsError> {
        let stdin = stdin.unwrap_or_default();
        let stdout = stdout.unwrap_or_default();
        let stderr = stderr.unwrap_or_default();

        let mut ctx = Self {
            stdin_stat: SyntheticStat::for_stream(stdin.is_terminal),
            stdout_stat: SyntheticStat::for_stream(stdout.is_terminal),
            stderr_stat: SyntheticStat::for_stream(stderr.is_terminal),
            stdin: Arc::new(Mutex::new(stdin.reader)),
            stdout: Arc::new(Mutex::new(stdout.writer)),
            stderr: Arc::new(Mutex::new(stderr.writer)),
            fs,
            opened_files: Mutex::new(BTreeMap::new()),
            last_fd: AtomicU32::new(FD_STDERR),
        };

        if ctx.fs.is_empty_fs() {
            debug!("no root file system mounted");
            return Ok(ctx);
        }

        // "/" means nothing to a `FileSystem`, the root is "." there.
        let mut root_dir: Box<dyn VirtualFile> = match ctx.fs.open(Path::new(".")) {
            Ok(dir) => dir,
            Err(err) if substitutes_empty_root(err) => {
                // Special-purpose file systems may only serve specific names.
                warn!(error = %err, "root file system cannot open \".\", using an empty root");
                Box::new(EmptyRootDir)
            }
            Err(err) => {
                debug!(error = %err, "opening the root directory failed");
                return Err(err);
            }
        };

        let stat = match root_dir.stat() {
            Ok(stat) => stat,
            Err(err) => {
                debug!(error = %err, "unable to stat the root directory");
                let _ = root_dir.close();
                return Err(err);
            }
        };
        if !stat.is_dir() {
            debug!(name = %stat.name, "root is not a directory");
            let _ = root_dir.close();
            return Err(FsError::NotADirectory);
        }

        ctx.opened_files
            .get_mut()
            .insert(FD_ROOT, Arc::new(FileEntry::new("/", root_dir)));
        ctx.last_fd.store(FD_ROOT, Ordering::SeqCst);

        Ok(ctx)
    }

    /// Returns the file system mounted at `/`.
    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub fn has_root(&self) -> bool {
        self.opened_files.lock().contains_key(&FD_ROOT)
    }

    /// Hands out the next descriptor number, or `None` once the counter
    /// reached `u32::MAX`. Numbers are never reused.
    pub fn next_fd(&self) -> Option<u32> {
        self.last_fd
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |fd| fd.checked_add(1))
            .ok()
            .map(|prev| prev + 1)
    }

    /// Opens `path` read-only and returns its new descriptor.
    ///
    /// A single leading `/` is stripped and `.`/`..` segments are cleaned
    /// lexically before the root file system sees the path. Backend errors
    /// are returned unchanged; running out of descriptors closes the file
    /// again and fails with [`FsError::InvalidFd`].
    pub fn open_file(&self, path: &str) -> Result<u32, FsError> {
        let resolved = resolve(path)?;
        let file = self.fs.open(&resolved).inspect_err(|err| {
            debug!(path, error = %err, "open failed");
        })?;
        self.insert_file(entry_name(&resolved), file)
    }

    fn insert_file(&self, name: String, mut file: Box<dyn VirtualFile>) -> Result<u32, FsError> {
        let mut opened_files = self.opened_files.lock();
        let Some(fd) = self.next_fd() else {
            drop(opened_files);
            warn!(name = %name, "out of file descriptors");
            if let Err(err) = file.close() {
                debug!(name = %name, error = %err, "closing unassigned file failed");
            }
            return Err(FsError::InvalidFd);
        };

        trace!(fd, name = %name, "file opened");
        let previous = opened_files.insert(fd, Arc::new(FileEntry::new(name, file)));
        debug_assert!(previous.is_none(), "descriptor {fd} handed out twice");
        Ok(fd)
    }

    /// Stats `path` without keeping it open.
    pub fn stat_path(&self, path: &str) -> Result<FileInfo, FsError> {
        let resolved = resolve(path)?;
        let mut file = self.fs.open(&resolved)?;
        let stat = file.stat();
        if let Err(err) = file.close() {
            debug!(path, error = %err, "closing probed file failed");
        }
        stat
    }

    /// Stats an open descriptor. The standard streams report a synthetic
    /// device; unknown descriptors fail with [`FsError::InvalidFd`].
    pub fn stat_file(&self, fd: u32) -> Result<FileInfo, FsError> {
        match fd {
            FD_STDIN => Ok(self.stdin_stat.file_info()),
            FD_STDOUT => Ok(self.stdout_stat.file_info()),
            FD_STDERR => Ok(self.stderr_stat.file_info()),
            _ => self.opened_file(fd).ok_or(FsError::InvalidFd)?.stat(),
        }
    }

    /// Returns the entry of an open descriptor, or `None` (`EBADF`).
    pub fn opened_file(&self, fd: u32) -> Option<Arc<FileEntry>> {
        self.opened_files.lock().get(&fd).cloned()
    }

    /// Lists up to `max` entries of an open directory (all remaining ones
    /// when `max` is zero), resuming wherever the previous call stopped.
    pub fn read_dir(&self, fd: u32, max: usize) -> Result<Vec<DirEntry>, FsError> {
        self.opened_file(fd).ok_or(FsError::InvalidFd)?.read_dir(max)
    }

    /// Returns a writer for the descriptor, or `None` (`EBADF`).
    ///
    /// The root is a directory and never writable; other files only when
    /// their capability was opened for writing.
    pub fn fd_writer(&self, fd: u32) -> Option<FdWriter> {
        match fd {
            FD_STDOUT => Some(FdWriter::Stdio(self.stdout.clone())),
            FD_STDERR => Some(FdWriter::Stdio(self.stderr.clone())),
            FD_ROOT => None,
            _ => {
                // Like a host write(2): present but not writable is EBADF too.
                let entry = self.opened_file(fd)?;
                entry.is_writable().then_some(FdWriter::File(entry))
            }
        }
    }

    /// Returns a reader for the descriptor, or `None` (`EBADF`).
    pub fn fd_reader(&self, fd: u32) -> Option<FdReader> {
        match fd {
            FD_STDIN => Some(FdReader::Stdin(self.stdin.clone())),
            FD_ROOT => None,
            _ => self.opened_file(fd).map(FdReader::File),
        }
    }

    /// Removes the descriptor and closes its file.
    ///
    /// Returns `false` if the descriptor was unknown or the close failed. The
    /// descriptor is gone from the table in both cases.
    pub fn close_file(&self, fd: u32) -> bool {
        let Some(entry) = self.opened_files.lock().remove(&fd) else {
            trace!(fd, "close of unknown descriptor");
            return false;
        };

        match entry.close() {
            Ok(()) => {
                trace!(fd, name = entry.name(), "file closed");
                true
            }
            Err(err) => {
                debug!(fd, name = entry.name(), error = %err, "close failed");
                false
            }
        }
    }

    /// Closes every open descriptor, root included.
    ///
    /// All closes are attempted; the error of the last one that failed is
    /// returned. The table is empty afterwards either way.
    pub fn close(&self) -> Result<(), FsError> {
        let opened_files = std::mem::take(&mut *self.opened_files.lock());

        let mut result = Ok(());
        for (fd, entry) in opened_files {
            if let Err(err) = entry.close() {
                debug!(fd, name = entry.name(), error = %err, "close failed");
                result = Err(err);
            }
        }
        result
    }

    #[cfg(test)]
    pub(crate) fn set_last_fd(&self, fd: u32) {
        self.last_fd.store(fd, Ordering::SeqCst);
    }
}

impl fmt::Debug for FsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsContext")
            .field("fs", &self.fs)
            .field("stdin_stat", &self.stdin_stat)
            .field("stdout_stat", &self.stdout_stat)
            .field("stderr_stat", &self.stderr_stat)
            .field("opened_fds", &self.opened_files.lock().keys().collect::<Vec<_>>())
            .field("last_fd", &self.last_fd.load(Ordering::SeqCst))
            .finish()
    }
}

/// Open errors on `"."` that mean the backend has no usable root of its
/// own, as opposed to a failure of the backend itself.
fn substitutes_empty_root(err: FsError) -> bool {
    matches!(
        err,
        FsError::EntryNotFound
            | FsError::InvalidInput
            | FsError::PermissionDenied
            | FsError::NotADirectory
            | FsError::UnknownError
    )
}

/// Maps a guest path onto the relative, cleaned form a [`FileSystem`]
/// expects, e.g. `"/sub/."` becomes `"sub"` and `"/"` becomes `"."`.
///
/// Paths that would still be rooted or climb above the root after cleaning
/// fail with [`FsError::InvalidInput`] and never reach the backend.
fn resolve(path: &str) -> Result<PathBuf, FsError> {
    if path.is_empty() {
        return Err(FsError::EntryNotFound);
    }
    let relative = path.strip_prefix('/').unwrap_or(path);
    let cleaned = path_clean::clean(relative);
    let resolved = if cleaned.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        cleaned
    };
    if !is_valid_path(&resolved) {
        trace!(path, resolved = %resolved.display(), "rejecting path outside the root");
        return Err(FsError::InvalidInput);
    }
    Ok(resolved)
}

fn entry_name(resolved: &Path) -> String {
    match resolved.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None if resolved == Path::new(".") => "/".to_string(),
        None => resolved.to_string_lossy().into_owned(),
    }
}

/// A readable stream behind a descriptor.
pub enum FdReader {
    Stdin(SharedReader),
    File(Arc<FileEntry>),
}

impl fmt::Debug for FdReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FdReader::Stdin(_) => write!(f, "stdin"),
            FdReader::File(entry) => write!(f, "file({})", entry.name()),
        }
    }
}

impl Read for FdReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            FdReader::Stdin(stdin) => stdin.lock().read(buf),
            FdReader::File(entry) => entry.file()?.read(buf),
        }
    }
}

/// A writable stream behind a descriptor.
pub enum FdWriter {
    Stdio(SharedWriter),
    File(Arc<FileEntry>),
}

impl fmt::Debug for FdWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FdWriter::Stdio(_) => write!(f, "stdio"),
            FdWriter::File(entry) => write!(f, "file({})", entry.name()),
        }
    }
}

impl Write for FdWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            FdWriter::Stdio(out) => out.lock().write(buf),
            FdWriter::File(entry) => entry
                .file()?
                .as_writer()
                .ok_or_else(|| io::Error::from(FsError::PermissionDenied))?
                .write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            FdWriter::Stdio(out) => out.lock().flush(),
            FdWriter::File(entry) => match entry.file()?.as_writer() {
                Some(writer) => writer.flush(),
                None => Ok(()),
            },
        }
    }
}
