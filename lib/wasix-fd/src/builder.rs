//! Builder system for configuring a [`FsContext`] and creating it.

use std::fmt;
use std::sync::Arc;

use virtual_fs::{EmptyFileSystem, FileSystem, FsError};

use crate::context::FsContext;
use crate::stdio::{Stderr, Stdin, Stdout};

/// Builder API for configuring the descriptor table of one instance.
///
/// Usage:
/// ```
/// # use wasix_fd::{FsContextBuilder, Stdout};
/// # use virtual_fs::StaticFileSystem;
/// let ctx = FsContextBuilder::new()
///     .stdout(Stdout::from_writer(Vec::new()))
///     .fs(StaticFileSystem::new().with_file("hello.txt", "hi"))
///     .build()
///     .unwrap();
/// assert!(ctx.has_root());
/// ```
#[derive(Default)]
pub struct FsContextBuilder {
    stdin: Option<Stdin>,
    stdout: Option<Stdout>,
    stderr: Option<Stderr>,
    fs: Option<Arc<dyn FileSystem>>,
}

impl fmt::Debug for FsContextBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsContextBuilder")
            .field("stdin_override exists", &self.stdin.is_some())
            .field("stdout_override exists", &self.stdout.is_some())
            .field("stderr_override exists", &self.stderr.is_some())
            .field("fs", &self.fs)
            .finish()
    }
}

impl FsContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the default stdin, which is always at end of file.
    pub fn stdin(mut self, stdin: Stdin) -> Self {
        self.set_stdin(stdin);
        self
    }

    pub fn set_stdin(&mut self, stdin: Stdin) {
        self.stdin = Some(stdin);
    }

    /// Overwrite the default stdout, which discards its output.
    pub fn stdout(mut self, stdout: Stdout) -> Self {
        self.set_stdout(stdout);
        self
    }

    pub fn set_stdout(&mut self, stdout: Stdout) {
        self.stdout = Some(stdout);
    }

    /// Overwrite the default stderr, which discards its output.
    pub fn stderr(mut self, stderr: Stderr) -> Self {
        self.set_stderr(stderr);
        self
    }

    pub fn set_stderr(&mut self, stderr: Stderr) {
        self.stderr = Some(stderr);
    }

    /// Use the host process' own standard streams.
    pub fn inherit_stdio(self) -> Self {
        self.stdin(Stdin::inherit())
            .stdout(Stdout::inherit())
            .stderr(Stderr::inherit())
    }

    /// Sets the file system mounted at `/`. Without one the instance has no
    /// root directory at all.
    pub fn fs(mut self, fs: impl FileSystem) -> Self {
        self.set_fs(Arc::new(fs));
        self
    }

    pub fn set_fs(&mut self, fs: Arc<dyn FileSystem>) {
        self.fs = Some(fs);
    }

    /// Creates the table, opening the root directory if one was configured.
    pub fn build(self) -> Result<FsContext, FsError> {
        let fs = self
            .fs
            .unwrap_or_else(|| Arc::new(EmptyFileSystem::default()));
        FsContext::new(self.stdin, self.stdout, self.stderr, fs)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use virtual_fs::{FileType, StaticFileSystem};

    use super::*;
    use crate::{FD_ROOT, FD_STDIN, FD_STDOUT};

    #[test]
    fn test_defaults_have_no_root() {
        let ctx = FsContextBuilder::new().build().unwrap();
        assert!(!ctx.has_root());
        assert!(ctx.opened_file(FD_ROOT).is_none());
        assert_eq!(
            ctx.stat_file(FD_STDIN).unwrap().file_type(),
            FileType::Device
        );
    }

    #[test]
    fn test_configured_fs_is_mounted() {
        let ctx = FsContextBuilder::new()
            .stdout(Stdout::from_writer(Vec::new()))
            .fs(StaticFileSystem::new().with_file("a.txt", "a"))
            .build()
            .unwrap();
        assert!(ctx.has_root());
        assert_eq!(ctx.opened_file(FD_ROOT).unwrap().name(), "/");
        assert!(ctx.fd_writer(FD_STDOUT).is_some());
    }

    #[test]
    fn test_explicit_empty_fs_has_no_root() {
        let ctx = FsContextBuilder::new()
            .fs(EmptyFileSystem::default())
            .build()
            .unwrap();
        assert!(!ctx.has_root());
    }
}
