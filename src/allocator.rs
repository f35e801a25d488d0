//! Allocator interface
//!
//! The operations a surrounding allocator abstraction dispatches to. The
//! bucket engine implements this trait; thread and sub-heap hooks exist
//! only so that callers get an explicit `Unsupported` error instead of a
//! silent no-op.

use crate::error::{Error, Result};
use crate::slab::SlotPtr;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::error;

/// A single allocator feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Individual allocations can be released
    Free,
    /// Allocations can be resized in place or by copying
    Resize,
    /// Arbitrary pointers can be tested for ownership
    Ownership,
    /// All allocations can be dropped at once
    BulkReset,
    /// Isolated heaps can be created and destroyed
    SubHeap,
}

impl Capability {
    const ALL: [Capability; 5] = [
        Capability::Free,
        Capability::Resize,
        Capability::Ownership,
        Capability::BulkReset,
        Capability::SubHeap,
    ];

    const fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// Set of [`Capability`] flags
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn with(self, capability: Capability) -> Self {
        Self(self.0 | capability.bit())
    }

    pub const fn supports(self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL.into_iter().filter(move |&c| self.supports(c))
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Name and version reported next to the capabilities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatorIdentity {
    pub name: String,
    pub version: String,
}

impl fmt::Display for AllocatorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

/// Allocation interface
///
/// Sizes are signed so that non-positive requests surface as
/// `Error::InvalidSize` rather than being unrepresentable.
pub trait Allocator {
    /// Allocate at least `size` bytes
    fn allocate(&mut self, size: isize) -> Result<SlotPtr>;

    /// Resize `ptr` to at least `new_size` bytes, moving it if needed
    ///
    /// `old_size` is a hint; implementations may derive the current size
    /// from `ptr` instead.
    fn reallocate(&mut self, ptr: SlotPtr, new_size: isize, old_size: isize) -> Result<SlotPtr>;

    /// Release `ptr`
    fn free(&mut self, ptr: SlotPtr) -> Result<()>;

    /// Whether `ptr` lies in memory managed by this allocator
    fn is_owned(&self, ptr: SlotPtr) -> bool;

    fn capabilities(&self) -> Capabilities;

    fn identity(&self) -> AllocatorIdentity;

    /// Prepare per-thread state for the calling thread
    fn thread_start(&mut self) -> Result<()> {
        Err(unsupported("thread_start"))
    }

    /// Tear down per-thread state for the calling thread
    fn thread_stop(&mut self) -> Result<()> {
        Err(unsupported("thread_stop"))
    }

    /// Create an isolated heap, returning its handle
    fn create_heap(&mut self) -> Result<usize> {
        Err(unsupported("create_heap"))
    }

    /// Destroy a heap created by `create_heap`
    fn destroy_heap(&mut self, _heap: usize) -> Result<()> {
        Err(unsupported("destroy_heap"))
    }
}

fn unsupported(operation: &'static str) -> Error {
    error!(operation, "Unsupported allocator operation");
    Error::Unsupported(operation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_set() {
        let caps: Capabilities = [Capability::Free, Capability::Ownership].into_iter().collect();
        assert!(caps.supports(Capability::Free));
        assert!(caps.supports(Capability::Ownership));
        assert!(!caps.supports(Capability::Resize));
        assert!(!caps.supports(Capability::SubHeap));
        assert_eq!(caps.iter().count(), 2);
    }

    #[test]
    fn test_empty_capabilities() {
        let caps = Capabilities::empty();
        assert!(Capability::ALL.iter().all(|&c| !caps.supports(c)));
        assert_eq!(format!("{:?}", caps), "{}");
    }

    #[test]
    fn test_identity_display() {
        let identity = AllocatorIdentity {
            name: "bucket".to_string(),
            version: "1.2.3".to_string(),
        };
        assert_eq!(identity.to_string(), "bucket 1.2.3");
    }
}
