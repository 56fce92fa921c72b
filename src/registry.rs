//! Mapping Registry
//!
//! The process-wide record of live mapping address ranges. It is the library's
//! own authority on which ranges are taken, independent of what the kernel
//! reports, and is what lets `unmap` tell a live mapping from a stale or forged
//! one.
//!
//! The global instance is constant-initialized, so there is no init step, and
//! it lives until the process exits. Mappings still registered at that point
//! are simply never released. Every mutation goes through [`Registry::lock`],
//! which callers hold across the matching OS call so the pair is atomic with
//! respect to other map/unmap calls.



use std::{
    collections::BTreeMap,
    ops::Range,
    sync::{Mutex, MutexGuard, PoisonError},
};

use crate::{Error, Result};



static GLOBAL: Registry = Registry::new();

#[derive(Debug, Default)]
pub struct Registry {
    /// Start address to end address, non-overlapping.
    entries: Mutex<BTreeMap<usize, usize>>,
}

/// Exclusive access to the registry's entries.
pub struct Entries<'a> {
    map: MutexGuard<'a, BTreeMap<usize, usize>>,
}

impl Registry {
    pub const fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// The registry shared by every mapper in the process.
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    /// Take the registry lock.
    ///
    /// A panic while the lock was held cannot leave the map half-updated, so a
    /// poisoned lock is recovered.
    pub fn lock(&self) -> Entries<'_> {
        Entries {
            map: self.entries.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    pub fn register(&self, range: Range<usize>) -> Result<()> {
        self.lock().register(range)
    }

    pub fn unregister(&self, range: Range<usize>) -> Result<()> {
        self.lock().unregister(range)
    }

    pub fn contains(&self, range: &Range<usize>) -> bool {
        self.lock().contains(range)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Entries<'_> {
    /// Record a live range. Fails if it overlaps, fully or partially, any range
    /// already recorded.
    pub fn register(&mut self, range: Range<usize>) -> Result<()> {
        if range.is_empty() {
            return Err(Error::Invalid);
        }
        if self.overlapping(&range).is_some() {
            return Err(Error::MappingExists);
        }

        self.map.insert(range.start, range.end);

        Ok(())
    }

    /// Forget a range. Only an exact match counts.
    pub fn unregister(&mut self, range: Range<usize>) -> Result<()> {
        if !self.contains(&range) {
            return Err(Error::MappingNotFound);
        }

        self.map.remove(&range.start);

        Ok(())
    }

    pub fn contains(&self, range: &Range<usize>) -> bool {
        self.map.get(&range.start) == Some(&range.end)
    }

    /// The recorded range overlapping `range`, if any.
    ///
    /// Entries never overlap each other, so the only candidate is the last one
    /// starting before `range.end`.
    pub fn overlapping(&self, range: &Range<usize>) -> Option<Range<usize>> {
        self.map
            .range(..range.end)
            .next_back()
            .filter(|&(_, &end)| end > range.start)
            .map(|(&start, &end)| start..end)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}



#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    #[test]
    fn register_and_unregister() {
        let registry = Registry::new();
        registry.register(0x1000..0x3000).unwrap();
        assert!(registry.contains(&(0x1000..0x3000)));
        assert_eq!(registry.len(), 1);

        registry.unregister(0x1000..0x3000).unwrap();
        assert!(!registry.contains(&(0x1000..0x3000)));
        assert!(registry.is_empty());
    }

    #[test]
    fn overlaps_are_rejected() {
        let registry = Registry::new();
        registry.register(0x10000..0x20000).unwrap();

        // full, inner, head and tail overlaps
        for range in [0x10000..0x20000, 0x11000..0x12000, 0xf000..0x11000, 0x1f000..0x21000] {
            assert!(matches!(registry.register(range), Err(Error::MappingExists)));
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn adjacent_ranges_do_not_overlap() {
        let registry = Registry::new();
        registry.register(0x2000..0x3000).unwrap();
        registry.register(0x1000..0x2000).unwrap();
        registry.register(0x3000..0x4000).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.lock().overlapping(&(0x2800..0x3800)), Some(0x3000..0x4000));
    }

    #[test]
    fn unregister_needs_exact_range() {
        let registry = Registry::new();
        registry.register(0x1000..0x3000).unwrap();

        assert!(matches!(registry.unregister(0x1000..0x2000), Err(Error::MappingNotFound)));
        assert!(matches!(registry.unregister(0x1001..0x3000), Err(Error::MappingNotFound)));
        registry.unregister(0x1000..0x3000).unwrap();
        assert!(matches!(registry.unregister(0x1000..0x3000), Err(Error::MappingNotFound)));
    }

    #[test]
    fn empty_range_is_invalid() {
        let registry = Registry::new();
        assert!(matches!(registry.register(0x1000..0x1000), Err(Error::Invalid)));
    }

    #[test]
    fn concurrent_overlapping_registrations() {
        let registry = Arc::new(Registry::new());
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    let start = 0x100000 + i * 0x800;
                    registry.register(start..start + 0x4000).is_ok()
                })
            })
            .collect();

        let won = handles.into_iter().map(|h| h.join().unwrap()).filter(|ok| *ok).count();
        assert!(won >= 1);

        let entries = registry.lock();
        let ranges: Vec<_> = entries.map.iter().map(|(&s, &e)| s..e).collect();
        for pair in ranges.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
        assert_eq!(ranges.len(), won);
    }
}
