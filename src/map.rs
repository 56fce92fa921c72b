//! Mapping



#[cfg(any(target_os="linux", target_os="freebsd", target_os="macos"))]
pub(crate) mod unix;

#[cfg(any(target_os="linux", target_os="freebsd", target_os="macos"))]
pub(crate) use unix as os;

pub use os::PlatformMapper;

use std::{num::NonZeroUsize, ops::Range, ptr::NonNull};

use log::{debug, warn};

use crate::{
    config::{Config, Placement},
    granularity::{negotiate, DefaultMedium, Granularity, Medium},
    registry::Registry,
    source::Source,
    Error, Result,
};



/// The OS-level half of mapping: reserve address space backed by a file and
/// give it back.
pub trait RawMapper {
    /// Alignment the OS requires for offsets and lengths.
    fn alignment(&self) -> usize;

    /// Map `length` bytes of `source` starting at `offset`.
    ///
    /// Fails with [`Error::AccessDenied`] when the handle's access mode does not
    /// allow the mapping, and with [`Error::AddressInUse`] when a fixed
    /// placement collides with something already mapped.
    fn reserve_and_map(
        &self,
        source: &Source,
        offset: u64,
        length: usize,
        hint: Option<NonZeroUsize>,
        placement: Placement,
    ) -> Result<NonNull<u8>>;

    /// Give back a range obtained from [`RawMapper::reserve_and_map`].
    ///
    /// # Safety
    /// Nothing may access the range afterwards.
    unsafe fn release(&self, addr: NonNull<u8>, length: usize) -> Result<()>;
}

/// A live, registered mapping of a file into the address space.
///
/// Only [`Mapper::map`] creates one, and only [`Mapper::unmap`] ends it.
/// Dropping a `Mapping` without unmapping it leaves the range mapped and
/// registered.
#[derive(Debug)]
pub struct Mapping {
    address: NonNull<u8>,
    reserved_length: usize,
    content_length: usize,
    effective_granularity: Granularity,
}

// The mapping only describes a region; it never dereferences the address itself.
unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}

impl Mapping {
    pub fn address(&self) -> NonNull<u8> {
        self.address
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.address.as_ptr()
    }

    /// Usable bytes starting at [`Mapping::address`].
    pub fn size(&self) -> usize {
        self.content_length
    }

    /// Bytes of address space held by the mapping.
    pub fn reserved_length(&self) -> usize {
        self.reserved_length
    }

    /// The granularity stores to this mapping must be flushed at to be durable.
    pub fn store_granularity(&self) -> Granularity {
        self.effective_granularity
    }

    #[cfg(test)]
    pub(crate) fn from_raw_parts(
        address: NonNull<u8>,
        reserved_length: usize,
        content_length: usize,
        effective_granularity: Granularity,
    ) -> Self {
        Self {
            address,
            reserved_length,
            content_length,
            effective_granularity,
        }
    }
}

/// Creates and destroys [`Mapping`]s, keeping the OS and the registry in agreement.
pub struct Mapper<'r, O = PlatformMapper, M = DefaultMedium> {
    os: O,
    medium: M,
    registry: &'r Registry,
}

impl Mapper<'static> {
    /// The platform's mapper, bound to the process-wide registry.
    pub fn platform() -> Self {
        Self::new(PlatformMapper, DefaultMedium, Registry::global())
    }
}

impl<'r, O: RawMapper, M: Medium> Mapper<'r, O, M> {
    pub fn new(os: O, medium: M, registry: &'r Registry) -> Self {
        Self {
            os,
            medium,
            registry,
        }
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    pub fn map(&self, config: &Config) -> Result<Mapping> {
        let alignment = self.os.alignment();
        let source = config.validate(alignment)?;
        let range = config.resolve_range(source.size()?, alignment)?;
        let granularity = negotiate(config.requested_max_granularity(), self.medium.capability());

        let mut registry = self.registry.lock();

        let address = self.os.reserve_and_map(
            &source,
            range.offset,
            range.reserved_length,
            config.desired_address(),
            config.placement(),
        )?;
        let mapping = Mapping {
            address,
            reserved_length: range.reserved_length,
            content_length: range.content_length,
            effective_granularity: granularity,
        };

        if let (Placement::FixedNoReplace, Some(desired)) = (config.placement(), config.desired_address()) {
            if desired.get() != address.as_ptr() as usize {
                warn!("fixed placement at {:#x} was not honored, got {address:p}", desired.get());
                self.discard(&mapping);
                return Err(Error::AddressInUse);
            }
        }

        let span = match self.span(&mapping) {
            Ok(span) => span,
            Err(e) => {
                warn!("OS returned a misaligned mapping at {address:p}");
                self.discard(&mapping);
                return Err(e);
            }
        };
        if let Err(e) = registry.register(span.clone()) {
            warn!("registry refused {:#x}..{:#x} after the OS mapped it: {e}", span.start, span.end);
            self.discard(&mapping);
            return Err(e);
        }

        debug!(
            "mapped {:#x}..{:#x} (content {:#x}, offset {:#x}, {:?})",
            span.start, span.end, mapping.content_length, range.offset, granularity,
        );

        Ok(mapping)
    }

    /// Unmap `mapping` and clear it. A cleared handle reports
    /// [`Error::MappingNotFound`].
    pub fn unmap(&self, mapping: &mut Option<Mapping>) -> Result<()> {
        let target = mapping.as_ref().ok_or(Error::MappingNotFound)?;
        let span = self.span(target)?;

        let mut registry = self.registry.lock();
        registry.unregister(span.clone())?;

        // SAFETY: the registry held exactly this range, so it came from `map` and
        // has not been released yet.
        if let Err(e) = unsafe { self.os.release(target.address, target.reserved_length) } {
            warn!("failed to release {:#x}..{:#x}: {e}", span.start, span.end);
            let restored = registry.register(span);
            debug_assert!(restored.is_ok());
            return Err(e);
        }
        drop(registry);

        debug!("unmapped {:#x}..{:#x}", span.start, span.end);
        *mapping = None;

        Ok(())
    }

    /// The address range of a structurally sound mapping.
    ///
    /// OS mappings start on a page boundary whatever their store granularity,
    /// and a page boundary satisfies every granularity's alignment.
    fn span(&self, mapping: &Mapping) -> Result<Range<usize>> {
        let start = mapping.address.as_ptr() as usize;
        let page = self.os.alignment();
        let alignment = mapping.effective_granularity.alignment(page).max(page);
        if mapping.reserved_length == 0 || start % alignment != 0 {
            return Err(Error::Invalid);
        }
        let end = start.checked_add(mapping.reserved_length).ok_or(Error::Invalid)?;

        Ok(start..end)
    }

    /// Release a mapping that was never handed out.
    fn discard(&self, mapping: &Mapping) {
        // SAFETY: the mapping was created by the current `map` call and never escaped it.
        if let Err(e) = unsafe { self.os.release(mapping.address, mapping.reserved_length) } {
            warn!("failed to release rejected mapping at {:p}: {e}", mapping.address);
        }
    }
}
