//! `stat` results for things that are not backed by a real file.

use crate::{FileInfo, FileMode};

/// The closed set of fabricated file infos. They only differ in name and
/// mode; sizes are zero and the modification time is the UNIX epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntheticStat {
    /// A standard stream attached to an interactive terminal.
    CharDevice,
    /// A standard stream attached to anything else (pipe, buffer, sink).
    Device,
    /// The placeholder `/` used when a backend cannot open its own root.
    EmptyRoot,
}

impl SyntheticStat {
    pub fn for_stream(is_terminal: bool) -> Self {
        if is_terminal {
            SyntheticStat::CharDevice
        } else {
            SyntheticStat::Device
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SyntheticStat::CharDevice | SyntheticStat::Device => "",
            SyntheticStat::EmptyRoot => "/",
        }
    }

    pub fn mode(self) -> FileMode {
        match self {
            SyntheticStat::CharDevice => FileMode::CHAR_DEVICE,
            SyntheticStat::Device => FileMode::DEVICE,
            SyntheticStat::EmptyRoot => FileMode::DIR.with_perm(0o555),
        }
    }

    pub fn file_info(self) -> FileInfo {
        FileInfo {
            name: self.name().to_string(),
            len: 0,
            mode: self.mode(),
            modified: 0,
        }
    }
}

impl From<SyntheticStat> for FileInfo {
    fn from(stat: SyntheticStat) -> Self {
        stat.file_info()
    }
}
