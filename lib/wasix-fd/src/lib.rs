//! The file descriptor table a sandboxed guest sees.
//!
//! Guests only understand small integer handles. [`FsContext`] maps those
//! numbers onto the standard streams and onto files opened through a single
//! rooted [`virtual_fs::FileSystem`], following POSIX numbering: stdio takes
//! `0..=2`, the preopened root directory is `3`, and every later open gets a
//! fresh, never reused number.

mod builder;
mod context;
mod entry;
mod stdio;

pub use builder::FsContextBuilder;
pub use context::{FdReader, FdWriter, FsContext};
pub use entry::{FileEntry, ReadDir};
pub use stdio::{Stderr, Stdin, Stdout};

pub const FD_STDIN: u32 = 0;
pub const FD_STDOUT: u32 = 1;
pub const FD_STDERR: u32 = 2;

/// The file descriptor of the root (`/`) file system.
///
/// wasi-libc allocates descriptors POSIX style, handing out the lowest free
/// number. With `0..=2` taken by the standard streams the preopened root has
/// to be `3` for guests to find it.
pub const FD_ROOT: u32 = 3;
