//! Store Granularity



use std::str::FromStr;

use log::{debug, warn};



/// Environment variable overriding the capability reported by [`DefaultMedium`].
pub const FORCE_GRANULARITY_ENV: &str = "PMAP_FORCE_GRANULARITY";

/// Size of a CPU cache line, the flush unit for [`Granularity::CacheLine`].
pub const CACHE_LINE_SIZE: usize = 64;

/// The smallest unit of a store that needs an explicit flush to become durable.
///
/// Ordered from the finest to the coarsest: `Byte < CacheLine < Page`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Granularity {
    /// Stores are durable once they leave the CPU caches' store buffers.
    Byte,
    /// Cache lines must be flushed.
    CacheLine,
    /// Whole pages must be written back through the page cache.
    Page,
}

impl Granularity {
    /// Byte alignment a mapping address of this granularity must have.
    pub fn alignment(self, page_size: usize) -> usize {
        match self {
            Granularity::Byte => 1,
            Granularity::CacheLine => CACHE_LINE_SIZE,
            Granularity::Page => page_size,
        }
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "byte" => Ok(Granularity::Byte),
            "cache_line" | "cacheline" => Ok(Granularity::CacheLine),
            "page" => Ok(Granularity::Page),
            other => Err(format!("unknown granularity `{other}`")),
        }
    }
}

/// A storage medium's persistence capability.
pub trait Medium {
    /// The finest granularity the medium can guarantee.
    fn capability(&self) -> Granularity;
}

/// A file reached through the page cache. Durability needs page write-back.
#[derive(Clone, Copy, Debug, Default)]
pub struct PageCache;

impl Medium for PageCache {
    fn capability(&self) -> Granularity {
        Granularity::Page
    }
}

/// A medium with a fixed, externally known capability.
#[derive(Clone, Copy, Debug)]
pub struct Forced(pub Granularity);

impl Medium for Forced {
    fn capability(&self) -> Granularity {
        self.0
    }
}

/// The page cache, unless [`FORCE_GRANULARITY_ENV`] says otherwise.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultMedium;

impl Medium for DefaultMedium {
    fn capability(&self) -> Granularity {
        match std::env::var(FORCE_GRANULARITY_ENV) {
            Ok(value) => match value.parse() {
                Ok(granularity) => granularity,
                Err(e) => {
                    warn!("ignoring {FORCE_GRANULARITY_ENV}: {e}");
                    PageCache.capability()
                }
            },
            Err(_) => PageCache.capability(),
        }
    }
}

/// Reconcile the coarsest granularity a caller accepts with what the medium
/// guarantees.
///
/// The result is the finer of the two, `min(requested_max, capability)`, except
/// that it never claims more than the medium delivers: a `Page`-only medium
/// always yields `Page`, and a request finer than the medium is degraded to the
/// medium's capability. Never fails.
pub fn negotiate(requested_max: Granularity, capability: Granularity) -> Granularity {
    if capability == Granularity::Page {
        return Granularity::Page;
    }
    if capability > requested_max {
        debug!("degrading store granularity from {requested_max:?} to {capability:?}");
        return capability;
    }

    requested_max.min(capability)
}
