//! Persistent-memory-aware file mapping
//!
//! Turns a file handle plus an offset/length request into a registered
//! virtual-memory [`Mapping`] and reports the store granularity callers must
//! honor when flushing it.



pub mod config;
pub mod granularity;
pub mod map;
pub mod registry;
pub mod source;

pub use config::*;
pub use granularity::*;
pub use map::{Mapper, Mapping, PlatformMapper, RawMapper};
pub use registry::Registry;
pub use source::*;



pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The config has no file handle attached.
    #[error("no file handle set in the config")]
    FileHandleNotSet,
    /// The attached file handle is closed or otherwise unusable.
    #[error("invalid file handle")]
    InvalidFileHandle,
    /// The file handle does not refer to a regular file.
    #[error("file handle does not refer to a regular file")]
    InvalidFileType,
    #[error("offset {offset:#x} is not a multiple of the alignment {alignment:#x}")]
    OffsetUnaligned { offset: u64, alignment: usize },
    #[error("length {length:#x} is not a multiple of the alignment {alignment:#x}")]
    LengthUnaligned { length: usize, alignment: usize },
    /// The requested range does not fit in the file.
    #[error("range offset={offset:#x} length={length:#x} exceeds file size {file_size:#x}")]
    MapRange { offset: u64, length: u64, file_size: u64 },
    /// The resolved range is empty.
    #[error("attempted to create a mapping of length zero")]
    MapSizeZero,
    /// The handle's access mode does not permit the mapping.
    #[error("access denied")]
    AccessDenied,
    /// The OS refused a fixed placement because the address range is taken.
    #[error("address range already in use")]
    AddressInUse,
    /// The registry refused a range overlapping a live mapping.
    #[error("mapping overlaps an existing mapping")]
    MappingExists,
    /// No live mapping has exactly this range.
    #[error("mapping not found")]
    MappingNotFound,
    /// The mapping handle is structurally malformed.
    #[error("invalid mapping")]
    Invalid,
    #[error("os error: {0}")]
    Os(#[source] nix::errno::Errno),
}

impl From<nix::errno::Errno> for Error {
    fn from(errno: nix::errno::Errno) -> Self {
        use nix::errno::Errno;

        match errno {
            Errno::EACCES => Error::AccessDenied,
            Errno::EEXIST => Error::AddressInUse,
            Errno::EBADF => Error::InvalidFileHandle,
            other => Error::Os(other),
        }
    }
}



/// Map the range described by `config` using the platform mapper and the
/// process-wide registry.
pub fn map(config: &Config) -> Result<Mapping> {
    Mapper::platform().map(config)
}

/// Unmap a mapping created by [`map`], clearing `mapping` on success.
pub fn unmap(mapping: &mut Option<Mapping>) -> Result<()> {
    Mapper::platform().unmap(mapping)
}
