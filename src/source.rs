//! Mapping Source



use std::os::fd::{AsRawFd, RawFd};

use crate::{map::os, Result};



/// How a file handle was opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    pub fn readable(self) -> bool {
        !matches!(self, AccessMode::WriteOnly)
    }

    pub fn writable(self) -> bool {
        !matches!(self, AccessMode::ReadOnly)
    }
}

/// A borrowed file handle backing a mapping.
///
/// The source does not own the descriptor. Opening and closing it is up to the
/// caller, and a descriptor closed before [`crate::map`] is reported as
/// [`crate::Error::InvalidFileHandle`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Source {
    fd: RawFd,
}

impl Source {
    pub fn from_fd(fd: RawFd) -> Self {
        Self { fd }
    }

    pub fn from_file(file: &impl AsRawFd) -> Self {
        Self { fd: file.as_raw_fd() }
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// The access mode the handle was opened with. Fails if the handle is unusable.
    pub fn access_mode(&self) -> Result<AccessMode> {
        os::access_mode(self.fd)
    }

    /// Current size of the underlying file in bytes.
    pub fn size(&self) -> Result<u64> {
        os::file_size(self.fd)
    }
}
