//! Unix Implementation



use std::{
    num::NonZeroUsize,
    os::fd::{BorrowedFd, RawFd},
    ptr::NonNull,
    sync::OnceLock,
};

use nix::{
    errno::Errno,
    fcntl::{fcntl, FcntlArg},
    sys::{
        mman::{mmap, munmap, MapFlags, ProtFlags},
        stat::fstat,
    },
    unistd::{sysconf, SysconfVar},
};

use crate::{
    config::Placement,
    map::RawMapper,
    source::{AccessMode, Source},
    Error, Result,
};



#[cfg(target_os = "linux")]
const MAP_FIXED_NOREPLACE: MapFlags = MapFlags::MAP_FIXED_NOREPLACE;

// Without the flag the address is passed as a hint, and the mapper rejects any
// other placement the kernel picks.
#[cfg(not(target_os = "linux"))]
const MAP_FIXED_NOREPLACE: MapFlags = MapFlags::empty();

const FALLBACK_PAGE_SIZE: usize = 4096;

/// The system page size, queried once.
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

    *PAGE_SIZE.get_or_init(|| match sysconf(SysconfVar::PAGE_SIZE) {
        Ok(Some(size)) if size > 0 => size as usize,
        _ => FALLBACK_PAGE_SIZE,
    })
}

pub fn access_mode(fd: RawFd) -> Result<AccessMode> {
    let flags = fcntl(fd, FcntlArg::F_GETFL)?;

    Ok(match flags & libc::O_ACCMODE {
        libc::O_RDONLY => AccessMode::ReadOnly,
        libc::O_WRONLY => AccessMode::WriteOnly,
        _ => AccessMode::ReadWrite,
    })
}

pub fn file_size(fd: RawFd) -> Result<u64> {
    let stat = fstat(fd)?;
    if stat.st_mode & libc::S_IFMT != libc::S_IFREG {
        return Err(Error::InvalidFileType);
    }

    Ok(stat.st_size as u64)
}

/// Shared file mappings through `mmap(2)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlatformMapper;

impl RawMapper for PlatformMapper {
    fn alignment(&self) -> usize {
        page_size()
    }

    fn reserve_and_map(
        &self,
        source: &Source,
        offset: u64,
        length: usize,
        hint: Option<NonZeroUsize>,
        placement: Placement,
    ) -> Result<NonNull<u8>> {
        let prot = if source.access_mode()?.writable() {
            ProtFlags::PROT_READ | ProtFlags::PROT_WRITE
        } else {
            ProtFlags::PROT_READ
        };
        let mut flags = MapFlags::MAP_SHARED;
        if placement == Placement::FixedNoReplace {
            flags |= MAP_FIXED_NOREPLACE;
        }
        let length = NonZeroUsize::new(length).ok_or(Error::MapSizeZero)?;
        let offset = libc::off_t::try_from(offset).map_err(|_| Error::Os(Errno::EOVERFLOW))?;

        // SAFETY: `access_mode` just succeeded on the descriptor, so it is open,
        // and a fresh shared mapping aliases no Rust object.
        let addr = unsafe {
            let fd = BorrowedFd::borrow_raw(source.fd());
            mmap(hint, length, prot, flags, fd, offset)?
        };

        Ok(addr.cast())
    }

    unsafe fn release(&self, addr: NonNull<u8>, length: usize) -> Result<()> {
        munmap(addr.cast(), length)?;

        Ok(())
    }
}
