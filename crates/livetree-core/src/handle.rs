#![forbid(unsafe_code)]

//! Opaque identities for externally-owned nodes.
//!
//! A [`Handle`] names a node of the observed tree without owning it. The
//! engine never dereferences a handle; it only compares, hashes, and orders
//! them. Ordering is by raw value, which gives the strict total order the
//! mirror store needs for its sorted child lists.
//!
//! # Generations
//!
//! Raw identities can be reused once the observed application frees a
//! node. Sources that own their node storage should hand out
//! generation-tagged handles via [`Handle::from_parts`], so that a reused
//! slot produces a different identity. Sources that can only expose raw
//! addresses use [`Handle::from_raw`]; consumers of such handles must go
//! through the validity guard before trusting them.

use std::fmt;

/// Totally-ordered identity of an external node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(u64);

impl Handle {
    /// Wrap a raw identity value (for example an address).
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Build a generation-tagged handle from a slot index and generation.
    ///
    /// The index occupies the high 32 bits, so handles order by slot first.
    #[must_use]
    pub const fn from_parts(index: u32, generation: u32) -> Self {
        Self(((index as u64) << 32) | generation as u64)
    }

    /// Raw identity value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Slot index for generation-tagged handles.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Generation for generation-tagged handles.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.0 as u32
    }

    /// Address-like display string, used when a node has no label.
    #[must_use]
    pub fn address_string(self) -> String {
        format!("0x{:x}", self.0)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl From<u64> for Handle {
    fn from(raw: u64) -> Self {
        Self::from_raw(raw)
    }
}
