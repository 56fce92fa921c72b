//! Mapping Configuration



use std::{num::NonZeroUsize, ptr::NonNull};

use crate::{granularity::Granularity, map::os, source::Source, Error, Result};



/// What to do with a desired address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Placement {
    /// The address is only a hint; the OS may place the mapping elsewhere.
    #[default]
    Hint,
    /// Map exactly at the address, failing instead of replacing anything there.
    FixedNoReplace,
}

/// A mapping request.
#[derive(Clone, Debug)]
pub struct Config {
    source: Option<Source>,
    offset: u64,
    length: usize,
    requested_max_granularity: Granularity,
    desired_addr: Option<NonZeroUsize>,
    placement: Placement,
}

/// The byte range a [`Config`] resolves to against a concrete file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedRange {
    pub offset: u64,
    /// Bytes to reserve, always a multiple of the alignment.
    pub reserved_length: usize,
    /// Bytes backed by the file.
    pub content_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// A config mapping the whole file with page granularity and no address preference.
    pub fn new() -> Self {
        Self {
            source: None,
            offset: 0,
            length: 0,
            requested_max_granularity: Granularity::Page,
            desired_addr: None,
            placement: Placement::Hint,
        }
    }

    pub fn source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Bytes to map. Zero maps everything from the offset to the end of the file.
    pub fn length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    /// The coarsest store granularity the caller is prepared to honor.
    pub fn granularity(mut self, requested_max: Granularity) -> Self {
        self.requested_max_granularity = requested_max;
        self
    }

    pub fn address(mut self, addr: NonNull<u8>, placement: Placement) -> Self {
        self.desired_addr = NonZeroUsize::new(addr.as_ptr() as usize);
        self.placement = placement;
        self
    }

    pub fn get_source(&self) -> Option<Source> {
        self.source
    }

    pub fn get_offset(&self) -> u64 {
        self.offset
    }

    pub fn get_length(&self) -> usize {
        self.length
    }

    pub fn requested_max_granularity(&self) -> Granularity {
        self.requested_max_granularity
    }

    pub fn desired_address(&self) -> Option<NonZeroUsize> {
        self.desired_addr
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    /// Alignment the medium requires for the offset and length.
    pub fn alignment(&self) -> Result<usize> {
        self.source.ok_or(Error::FileHandleNotSet)?;
        Ok(os::page_size())
    }

    /// Check the request before anything touches the OS.
    ///
    /// Errors are reported in order: missing source, unusable handle,
    /// unaligned offset, unaligned explicit length.
    pub fn validate(&self, alignment: usize) -> Result<Source> {
        let source = self.source.ok_or(Error::FileHandleNotSet)?;
        source.access_mode()?;

        if self.offset % alignment as u64 != 0 {
            return Err(Error::OffsetUnaligned {
                offset: self.offset,
                alignment,
            });
        }
        if self.length != 0 && self.length % alignment != 0 {
            return Err(Error::LengthUnaligned {
                length: self.length,
                alignment,
            });
        }

        Ok(source)
    }

    /// Compute the effective range for a file of `file_size` bytes.
    ///
    /// The end of the range may reach the file size rounded up to `alignment`,
    /// so the tail page of an unaligned file stays mappable.
    pub fn resolve_range(&self, file_size: u64, alignment: usize) -> Result<ResolvedRange> {
        let out_of_range = |length: u64| Error::MapRange {
            offset: self.offset,
            length,
            file_size,
        };

        let alignment = alignment as u64;
        let aligned_file_size = file_size
            .checked_next_multiple_of(alignment)
            .ok_or_else(|| out_of_range(self.length as u64))?;

        if self.offset > file_size {
            return Err(out_of_range(self.length as u64));
        }

        let content = match self.length {
            0 => file_size - self.offset,
            length => length as u64,
        };
        let end = self.offset.checked_add(content).ok_or_else(|| out_of_range(content))?;
        if end > aligned_file_size {
            return Err(out_of_range(content));
        }
        if content == 0 {
            return Err(Error::MapSizeZero);
        }

        let reserved = content
            .checked_next_multiple_of(alignment)
            .and_then(|r| usize::try_from(r).ok())
            .ok_or_else(|| out_of_range(content))?;
        let content = usize::try_from(content).map_err(|_| out_of_range(content))?;

        Ok(ResolvedRange {
            offset: self.offset,
            reserved_length: reserved,
            content_length: content,
        })
    }
}



#[cfg(test)]
mod tests {
    use super::*;

    const KIB: usize = 1 << 10;
    const MIB: usize = 1 << 20;
    const ALIGN: usize = 4 * KIB;

    fn with_source() -> (std::fs::File, Config) {
        let file = tempfile::tempfile().unwrap();
        let config = Config::new().source(Source::from_file(&file));
        (file, config)
    }

    #[test]
    fn defaults() {
        let config = Config::new();
        assert_eq!(config.get_source(), None);
        assert_eq!(config.get_offset(), 0);
        assert_eq!(config.get_length(), 0);
        assert_eq!(config.requested_max_granularity(), Granularity::Page);
        assert_eq!(config.desired_address(), None);
        assert_eq!(config.placement(), Placement::Hint);
    }

    #[test]
    fn validate_precedence() {
        let no_source = Config::new().offset(1).length(1);
        assert!(matches!(no_source.validate(ALIGN), Err(Error::FileHandleNotSet)));

        let bad_handle = Config::new().source(Source::from_fd(-1)).offset(1).length(1);
        assert!(matches!(bad_handle.validate(ALIGN), Err(Error::InvalidFileHandle)));

        let (_file, config) = with_source();
        let both = config.clone().offset(KIB as u64).length(1);
        assert!(matches!(both.validate(ALIGN), Err(Error::OffsetUnaligned { offset, .. }) if offset == KIB as u64));

        let length = config.clone().length(ALIGN + 1);
        assert!(matches!(length.validate(ALIGN), Err(Error::LengthUnaligned { .. })));

        assert!(config.offset(2 * MIB as u64).length(2 * MIB).validate(ALIGN).is_ok());
    }

    #[test]
    fn zero_length_is_not_checked_for_alignment() {
        let (_file, config) = with_source();
        assert!(config.validate(ALIGN).is_ok());
    }

    #[test]
    fn alignment_needs_a_source() {
        assert!(matches!(Config::new().alignment(), Err(Error::FileHandleNotSet)));

        let (_file, config) = with_source();
        let alignment = config.alignment().unwrap();
        assert!(alignment.is_power_of_two());
    }

    #[test]
    fn resolve_whole_and_partial() {
        let size = (4 * MIB) as u64;
        let config = Config::new();

        let whole = config.clone().resolve_range(size, ALIGN).unwrap();
        assert_eq!(whole.content_length, 4 * MIB);
        assert_eq!(whole.reserved_length, 4 * MIB);

        let explicit = config.clone().length(4 * MIB).resolve_range(size, ALIGN).unwrap();
        assert_eq!(explicit.content_length, 4 * MIB);

        let tail = config.clone().offset(2 * MIB as u64).length(2 * MIB).resolve_range(size, ALIGN).unwrap();
        assert_eq!(tail.offset, 2 * MIB as u64);
        assert_eq!(tail.content_length, 2 * MIB);

        let rest = config.offset(2 * MIB as u64).resolve_range(size, ALIGN).unwrap();
        assert_eq!(rest.content_length, 2 * MIB);
    }

    #[test]
    fn resolve_out_of_range() {
        let size = (4 * MIB) as u64;

        let past_end = Config::new().offset(6 * MIB as u64);
        assert!(matches!(past_end.resolve_range(size, ALIGN), Err(Error::MapRange { .. })));

        let too_long = Config::new().offset(size / 2 + 4 * MIB as u64).length(2 * MIB);
        assert!(matches!(too_long.resolve_range(size, ALIGN), Err(Error::MapRange { .. })));

        let overflow = Config::new().offset(u64::MAX - ALIGN as u64 + 1).length(2 * ALIGN);
        assert!(matches!(overflow.resolve_range(u64::MAX, ALIGN), Err(Error::MapRange { .. })));
    }

    #[test]
    fn resolve_empty_range() {
        let size = (4 * MIB) as u64;
        let at_end = Config::new().offset(size);
        assert!(matches!(at_end.resolve_range(size, ALIGN), Err(Error::MapSizeZero)));
    }

    #[test]
    fn unaligned_file_tail() {
        let size = (2 * ALIGN + 100) as u64;

        let rest = Config::new().resolve_range(size, ALIGN).unwrap();
        assert_eq!(rest.content_length, 2 * ALIGN + 100);
        assert_eq!(rest.reserved_length, 3 * ALIGN);

        let rounded = Config::new().length(3 * ALIGN).resolve_range(size, ALIGN).unwrap();
        assert_eq!(rounded.content_length, 3 * ALIGN);
        assert_eq!(rounded.reserved_length, 3 * ALIGN);

        let beyond = Config::new().length(4 * ALIGN).resolve_range(size, ALIGN);
        assert!(matches!(beyond, Err(Error::MapRange { .. })));
    }
}
