//! Standard streams handed to a [`FsContext`](crate::FsContext).
//!
//! Besides the byte stream each wrapper remembers whether the handle was an
//! interactive terminal when it was configured, which is all `stat` on a
//! standard stream reports.

use std::fmt;
use std::io::{self, Read, Write};

use is_terminal::IsTerminal;

pub struct Stdin {
    pub(crate) reader: Box<dyn Read + Send>,
    pub(crate) is_terminal: bool,
}

impl Stdin {
    /// The host process' own stdin.
    pub fn inherit() -> Self {
        Self::from_handle(io::stdin())
    }

    /// Any handle that can be probed for a terminal, e.g. a [`std::fs::File`].
    pub fn from_handle<R>(handle: R) -> Self
    where
        R: Read + IsTerminal + Send + 'static,
    {
        let is_terminal = handle.is_terminal();
        Self {
            reader: Box::new(handle),
            is_terminal,
        }
    }

    /// An in-process reader; never considered a terminal.
    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            is_terminal: false,
        }
    }

    /// A source that is always at end of file.
    pub fn empty() -> Self {
        Self::from_reader(io::empty())
    }

    pub fn is_terminal(&self) -> bool {
        self.is_terminal
    }
}

impl Default for Stdin {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Stdin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stdin")
            .field("is_terminal", &self.is_terminal)
            .finish_non_exhaustive()
    }
}

macro_rules! impl_output_stream {
    ($name:ident, $host:expr, $stream:literal) => {
        pub struct $name {
            pub(crate) writer: Box<dyn Write + Send>,
            pub(crate) is_terminal: bool,
        }

        impl $name {
            #[doc = concat!("The host process' own ", $stream, ".")]
            pub fn inherit() -> Self {
                Self::from_handle($host)
            }

            /// Any handle that can be probed for a terminal, e.g. a [`std::fs::File`].
            pub fn from_handle<W>(handle: W) -> Self
            where
                W: Write + IsTerminal + Send + 'static,
            {
                let is_terminal = handle.is_terminal();
                Self {
                    writer: Box::new(handle),
                    is_terminal,
                }
            }

            /// An in-process writer; never considered a terminal.
            pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
                Self {
                    writer: Box::new(writer),
                    is_terminal: false,
                }
            }

            /// A sink that discards everything written to it.
            pub fn sink() -> Self {
                Self::from_writer(io::sink())
            }

            pub fn is_terminal(&self) -> bool {
                self.is_terminal
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::sink()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("is_terminal", &self.is_terminal)
                    .finish_non_exhaustive()
            }
        }
    };
}

impl_output_stream!(Stdout, io::stdout(), "stdout");
impl_output_stream!(Stderr, io::stderr(), "stderr");

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    #[test]
    fn test_in_process_streams_are_not_terminals() {
        assert!(!Stdin::from_reader(&b"hello"[..]).is_terminal());
        assert!(!Stdin::empty().is_terminal());
        assert!(!Stdout::from_writer(Vec::new()).is_terminal());
        assert!(!Stdout::sink().is_terminal());
        assert!(!Stderr::from_writer(Vec::new()).is_terminal());
        assert!(!Stderr::sink().is_terminal());
    }

    #[test]
    fn test_empty_stdin_is_eof() {
        let mut stdin = Stdin::default();
        let mut buf = [0u8; 8];
        assert_eq!(stdin.reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_sink_accepts_everything() {
        let mut stdout = Stdout::default();
        assert_eq!(stdout.writer.write(b"discarded").unwrap(), 9);
        let mut stderr = Stderr::default();
        assert_eq!(stderr.writer.write(b"discarded").unwrap(), 9);
    }

    #[test]
    fn test_debug_names_the_stream() {
        assert!(format!("{:?}", Stdout::sink()).starts_with("Stdout"));
        assert!(format!("{:?}", Stderr::sink()).starts_with("Stderr"));
    }
}
